mod convert_cmd;
mod extract_cmd;
mod probe_cmd;
mod status_cmd;
mod terminal_output;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ocrgate_backends::Runtime;
use ocrgate_config::OcrGateConfig;
use ocrgate_gateway::{start_server, GatewayState};

#[derive(Parser)]
#[command(name = "ocrgate")]
#[command(about = "ocrgate: image-to-text gateway over heterogeneous OCR backends")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file (defaults to $OCRGATE_CONFIG or ~/.ocrgate/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Extract text from one image with the configured backend
    Extract {
        image: PathBuf,
        /// Instruction passed to prompt-aware backends
        #[arg(short, long)]
        instruction: Option<String>,
        /// Seconds allowed for each strategy attempt
        #[arg(long)]
        attempt_timeout: Option<f64>,
        /// Seconds allowed for the whole extraction
        #[arg(long)]
        deadline: Option<f64>,
    },
    /// Convert a document through the remote conversion service
    Convert {
        file: PathBuf,
        /// Output format requested from the service (markdown, json, html)
        #[arg(long)]
        output_format: Option<String>,
        /// Processing mode (fast, balanced, accurate)
        #[arg(long)]
        mode: Option<String>,
    },
    /// Resolve the configured backend and show the strategies it would use
    Probe,
    /// Query a running gateway's health endpoint
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = ocrgate_config::load_and_prepare(cli.config.as_deref()).await?;

    let logging = loaded.config.logging();
    let _log_guard = ocrgate_logging::init_logger(logging.level(), logging.dir.as_deref())?;
    loaded.log_warnings();
    let config = loaded.config;

    match cli.command {
        Commands::Serve { port } => run_server(config, port).await,
        Commands::Extract { image, instruction, attempt_timeout, deadline } => {
            extract_cmd::run(config, &image, instruction, attempt_timeout, deadline).await
        }
        Commands::Convert { file, output_format, mode } => {
            convert_cmd::run(config, &file, output_format, mode).await
        }
        Commands::Probe => probe_cmd::run(config),
        Commands::Status => status_cmd::run(&config).await,
    }
}

async fn run_server(config: OcrGateConfig, port: Option<u16>) -> Result<()> {
    let gateway = config.gateway();
    let port = port.unwrap_or_else(|| gateway.port());
    let addr = bind_addr(gateway.bind(), port)?;

    let runtime = Runtime::from_config(config)?;
    info!(
        %addr,
        backend = %runtime.capability().name(),
        strategies = ?runtime.catalog().names(),
        "Starting ocrgate gateway"
    );
    start_server(addr, GatewayState::new(runtime)).await
}

/// Accepts bare IPv4/IPv6 addresses, with or without brackets.
fn bind_addr(bind: &str, port: u16) -> Result<SocketAddr> {
    let host = bind.trim_start_matches('[').trim_end_matches(']');
    let ip: IpAddr = host
        .parse()
        .with_context(|| format!("Invalid bind address {bind}"))?;
    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_accepts_ipv4_and_ipv6() {
        assert_eq!(bind_addr("0.0.0.0", 5000).unwrap().to_string(), "0.0.0.0:5000");
        assert_eq!(bind_addr("::", 5000).unwrap().to_string(), "[::]:5000");
        assert_eq!(bind_addr("[::1]", 8080).unwrap().to_string(), "[::1]:8080");
    }

    #[test]
    fn bind_rejects_hostnames() {
        assert!(bind_addr("localhost", 5000).is_err());
    }
}
