// SPDX-License-Identifier: MIT

//! CLI engine adapter: drives an agent binary as a subprocess.

use super::{Engine, EngineError, EngineMetadata, EngineRequest, EngineResponse};
use crate::subprocess::PROBE_TIMEOUT;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Engine that spawns a CLI agent, pipes the prompt to stdin, and
/// captures stdout/stderr. The subprocess is killed when the wall-clock
/// timeout expires.
pub struct CliEngine {
    metadata: EngineMetadata,
    program: String,
    args: Vec<String>,
    /// Flag used to pass the model name, e.g. `--model`. None = engine
    /// has no model selection.
    model_flag: Option<String>,
}

impl CliEngine {
    pub fn new(metadata: EngineMetadata, program: impl Into<String>) -> Self {
        Self {
            metadata,
            program: program.into(),
            args: Vec::new(),
            model_flag: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_model_flag(mut self, flag: impl Into<String>) -> Self {
        self.model_flag = Some(flag.into());
        self
    }
}

#[async_trait]
impl Engine for CliEngine {
    fn metadata(&self) -> &EngineMetadata {
        &self.metadata
    }

    async fn check_availability(&self) -> bool {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(PROBE_TIMEOUT, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(engine = %self.metadata.id, error = %e, "availability probe failed");
                false
            }
            Err(_) => {
                warn!(engine = %self.metadata.id, "availability probe timed out");
                false
            }
        }
    }

    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let (Some(flag), Some(model)) = (&self.model_flag, &request.model) {
            cmd.arg(flag).arg(model);
        }
        cmd.current_dir(&request.working_dir)
            .envs(request.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request.prompt.as_bytes()).await?;
            // Close stdin so the agent sees EOF on the prompt.
            drop(stdin);
        }

        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                // kill_on_drop reaps the child when the future is dropped.
                return Err(EngineError::Timeout(request.timeout.as_secs()));
            }
        };

        Ok(EngineResponse {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
