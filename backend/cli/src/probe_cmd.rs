//! `ocrgate probe`: resolve the configured backend without extracting
//! anything, and show what a dispatch would try.

use anyhow::Result;

use ocrgate_backends::{build_supervisor, resolve_capability};
use ocrgate_config::{redact, validate, OcrGateConfig};

use crate::terminal_output::{note_error, note_info, note_success, note_warn, render_pairs};

pub fn run(config: OcrGateConfig) -> Result<()> {
    println!("\n🔍 Probing ocrgate backend...\n");

    for warning in validate(&config).warnings {
        note_warn(&format!("{}: {}", warning.path, warning.message));
    }

    let capability = match resolve_capability(&config.backend()) {
        Ok(capability) => capability,
        Err(e) => {
            note_error(&format!("Backend could not be resolved: {e}"));
            return Err(e.into());
        }
    };
    let supervisor = build_supervisor(&config.dispatch(), &capability)?;
    let catalog = supervisor.catalog();

    let dispatch = config.dispatch();
    let shapes: Vec<&str> = capability.shapes().iter().map(|s| s.as_str()).collect();
    print!(
        "{}",
        render_pairs(&[
            ("backend", capability.name().to_string()),
            ("declared shapes", shapes.join(", ")),
            ("strategies", catalog.names().join(" → ")),
            ("attempt timeout", format!("{:?}", dispatch.attempt_timeout())),
            ("deadline", format!("{:?}", dispatch.deadline())),
        ])
    );
    println!();

    if catalog.is_empty() {
        note_warn("No applicable strategy: every extraction will fail immediately");
    } else {
        note_success(&format!("{} strategies ready", catalog.len()));
    }

    note_info("Effective configuration (secrets masked):");
    println!("{}", serde_json::to_string_pretty(&redact(&serde_json::to_value(&config)?))?);
    Ok(())
}
