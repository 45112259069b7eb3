//! Local OCR executable backend.
//!
//! Each calling shape is an argument template. `{path}` and `{prompt}` are
//! substituted per call; nothing goes through a shell.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use ocrgate_config::CommandConfig;
use ocrgate_core::{
    CallingShape, ImagePayload, InferenceCapability, InvokeError, OcrError, PromptedImage,
    DEFAULT_INSTRUCTION,
};
use ocrgate_logging::redact_sensitive_data;

/// Longest stderr excerpt carried in an error.
const MAX_STDERR_CHARS: usize = 2_000;

pub struct CommandCapability {
    program: PathBuf,
    batch_args: Option<Vec<String>>,
    prompt_args: Option<Vec<String>>,
    image_args: Option<Vec<String>>,
    path_args: Option<Vec<String>>,
    env: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct BatchItem<'a> {
    path: String,
    prompt: &'a str,
}

impl CommandCapability {
    /// Resolve the program up front so a missing binary fails at startup.
    pub fn new(config: &CommandConfig) -> Result<Self, OcrError> {
        let program = find_program(&config.program).ok_or_else(|| {
            OcrError::Config(format!(
                "command `{}` not found on PATH",
                config.program
            ))
        })?;
        Ok(Self {
            program,
            batch_args: config.batch_args.clone(),
            prompt_args: config.prompt_args.clone(),
            image_args: config.image_args.clone(),
            path_args: config.path_args.clone(),
            env: config.env.clone(),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, args: Vec<String>, stdin: Option<Vec<u8>>) -> Result<String, InvokeError> {
        debug!(program = %self.program.display(), ?args, "Running OCR command");

        let mut child = Command::new(&self.program)
            .args(&args)
            .envs(&self.env)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A detached attempt lets the child finish; an aborted one kills it.
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (pipe, stdin) {
                pipe.write_all(&bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output
            .with_context(|| format!("failed to wait for {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            return Err(InvokeError::Backend(redact_sensitive_data(&format!(
                "{} exited with {}: {stderr}",
                self.program.display(),
                output.status
            ))));
        }
        if let Err(e) = fed {
            // The child may legitimately exit without reading stdin.
            debug!(error = %e, "OCR command did not consume stdin");
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

#[async_trait]
impl InferenceCapability for CommandCapability {
    fn name(&self) -> &str {
        "command"
    }

    fn shapes(&self) -> Vec<CallingShape> {
        CallingShape::ALL
            .into_iter()
            .filter(|shape| self.template(*shape).is_some())
            .collect()
    }

    async fn infer_batch(&self, items: Vec<PromptedImage>) -> Result<Vec<String>, InvokeError> {
        let template = self.require(CallingShape::BatchItem)?;
        let first = items.first().ok_or(InvokeError::EmptyOutput)?;
        let args = expand(template, &first.image.path, &first.instruction);
        let batch: Vec<BatchItem<'_>> = items
            .iter()
            .map(|item| BatchItem {
                path: item.image.path.display().to_string(),
                prompt: &item.instruction,
            })
            .collect();
        let input = serde_json::to_vec(&batch).context("failed to encode batch input")?;

        let stdout = self.run(args, Some(input)).await?;
        serde_json::from_str::<Vec<String>>(&stdout).map_err(|e| {
            InvokeError::Backend(format!("batch output is not a JSON array of strings: {e}"))
        })
    }

    async fn infer_prompted(
        &self,
        image: &ImagePayload,
        instruction: &str,
    ) -> Result<String, InvokeError> {
        let template = self.require(CallingShape::ImageWithPrompt)?;
        self.run(expand(template, &image.path, instruction), None).await
    }

    async fn infer_image(&self, image: &ImagePayload) -> Result<String, InvokeError> {
        let template = self.require(CallingShape::ImageOnly)?;
        let args = expand(template, &image.path, DEFAULT_INSTRUCTION);
        self.run(args, Some(image.data.to_vec())).await
    }

    async fn infer_path(&self, path: &Path) -> Result<String, InvokeError> {
        let template = self.require(CallingShape::PathOnly)?;
        self.run(expand(template, path, DEFAULT_INSTRUCTION), None).await
    }
}

impl CommandCapability {
    fn template(&self, shape: CallingShape) -> Option<&[String]> {
        match shape {
            CallingShape::BatchItem => self.batch_args.as_deref(),
            CallingShape::ImageWithPrompt => self.prompt_args.as_deref(),
            CallingShape::ImageOnly => self.image_args.as_deref(),
            CallingShape::PathOnly => self.path_args.as_deref(),
        }
    }

    fn require(&self, shape: CallingShape) -> Result<&[String], InvokeError> {
        self.template(shape).ok_or(InvokeError::Unsupported(shape))
    }
}

fn expand(template: &[String], path: &Path, prompt: &str) -> Vec<String> {
    let path = path.display().to_string();
    template
        .iter()
        .map(|arg| arg.replace("{path}", &path).replace("{prompt}", prompt))
        .collect()
}

/// Locate an executable the way a shell would: paths as given, bare names on `PATH`.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let program = program.trim();
    if program.is_empty() {
        return None;
    }
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
