//! Gateway backed by an external agent process
//!
//! The prompt is written to the child's stdin and the generated text read
//! from its stdout, e.g. `claude -p`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{AgentGateway, GatewayError};
use crate::config::GatewayConfig;

/// Spawns one agent process per prompt
#[derive(Debug, Clone)]
pub struct CommandGateway {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandGateway {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }

    /// Run the agent inside `dir`
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    async fn run(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| GatewayError::Spawn(format!("{}: {}", self.program, e)))?;

        // prompt is written while stdout and stderr drain
        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => Ok(()),
                // the agent exited without reading; its status tells the story
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("CommandGateway::run: agent closed stdin early");
                    Ok(())
                }
                Err(e) => Err(GatewayError::Spawn(format!("writing prompt: {}", e))),
            }
            // stdin drops here, closing the prompt
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        written?;
        let output = output.map_err(|e| GatewayError::Spawn(format!("waiting for agent: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GatewayError::Failed {
                status: output.status.code().unwrap_or(-1),
                message: stderr.trim().chars().take(500).collect(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            return Err(GatewayError::Empty);
        }
        Ok(text)
    }
}

#[async_trait]
impl AgentGateway for CommandGateway {
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError> {
        debug!(program = %self.program, prompt_len = prompt.len(), ?timeout, "CommandGateway::generate: called");
        let start = Instant::now();

        match tokio::time::timeout(timeout, self.run(prompt)).await {
            Ok(result) => {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "CommandGateway::generate: finished"
                );
                result
            }
            Err(_) => {
                warn!(program = %self.program, ?timeout, "CommandGateway::generate: timed out");
                Err(GatewayError::Timeout(timeout))
            }
        }
    }
}
