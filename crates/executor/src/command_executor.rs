use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Captured result of one backend invocation.
///
/// `status` is `None` when the process never produced an exit code
/// (spawn failure, timeout, killed by a signal).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            status: None,
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Blank stdout means "no data", regardless of the exit status.
    pub fn stdout_is_blank(&self) -> bool {
        self.stdout.trim().is_empty()
    }
}

/// Single chokepoint for every external management command.
///
/// Implementations never fail: problems surface as a non-success status and
/// empty stdout so callers only ever reason about missing data.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecutorError> {
        let mut command = tokio::process::Command::new(program);
        command.args(args).kill_on_drop(true);

        let spawned = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| ExecutorError::Timeout(limit))?,
            None => command.output().await,
        };

        let output = spawned.map_err(|e| ExecutorError::SpawnFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status.code(),
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, program: &str, args: &[String]) -> CommandOutput {
        tracing::debug!("Executing command: {} {:?}", program, args);

        match self.run(program, args).await {
            Ok(output) => {
                if !output.success() {
                    tracing::warn!(
                        "Command {} {:?} exited with {:?}: {}",
                        program,
                        args,
                        output.status,
                        output.stderr.trim()
                    );
                }
                output
            }
            Err(e) => {
                tracing::warn!("Command {} {:?} failed: {}", program, args, e);
                CommandOutput::failed(e.to_string())
            }
        }
    }
}
