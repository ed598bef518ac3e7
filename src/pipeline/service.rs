//! Generation service boundary.
//!
//! Stages 2-5 hand structured JSON to a [`GenerationService`] and decode the
//! structured JSON it returns. The orchestrator never retries; a client that
//! wants retries implements them behind this trait.

use crate::errors::ServiceError;
use crate::pipeline::PipelineStageKind;
use crate::util::extract_json_object;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn invoke(&self, stage: PipelineStageKind, input: Value) -> Result<Value, ServiceError>;
}

/// Runs a shell command per invocation.
///
/// The request `{"stage": "...", "input": {...}}` is written to the command's
/// stdin and the first JSON object printed on stdout is the response. The
/// stage slug is also exported as `TESTSMITH_STAGE`.
pub struct CommandGenerationService {
    command: Option<String>,
    working_dir: PathBuf,
}

impl CommandGenerationService {
    pub fn new(command: Option<String>, working_dir: impl AsRef<Path>) -> Self {
        Self {
            command,
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.command.is_some()
    }
}

#[async_trait]
impl GenerationService for CommandGenerationService {
    async fn invoke(&self, stage: PipelineStageKind, input: Value) -> Result<Value, ServiceError> {
        let command = self.command.as_deref().ok_or(ServiceError::NotConfigured)?;
        let request = json!({
            "stage": stage.name(),
            "input": input,
        });
        let request = serde_json::to_vec(&request)
            .map_err(|e| ServiceError::InvalidResponse(format!("unserializable request: {}", e)))?;

        debug!(stage = %stage, command, "invoking generation command");

        // kill_on_drop lets a timeout or cancellation tear the process down
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("TESTSMITH_STAGE", stage.slug())
            .kill_on_drop(true)
            .spawn()
            .map_err(ServiceError::SpawnFailed)?;

        // Feed stdin while stdout is drained; a filter like `cat` would otherwise
        // fill both pipes on a large request and never finish.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&request).await {
                // A command that ignores stdin may close it early.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        fed?;

        if !output.status.success() {
            return Err(ServiceError::NonZeroExit {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let object = extract_json_object(&stdout).ok_or_else(|| {
            ServiceError::InvalidResponse(format!(
                "no JSON object in output of {}",
                stage.slug()
            ))
        })?;
        serde_json::from_str(&object).map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}
