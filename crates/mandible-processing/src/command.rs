//! External command execution with a timeout contract.
//!
//! The image tools write their output to a path passed in argv, so the
//! runner only has to supervise the process: impose a deadline, capture
//! stderr for the logs and report success, timeout or failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Default deadline for one processor tool invocation.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout_secs}s")]
    TimedOut { program: String, timeout_secs: u64 },

    #[error("{program} exited with status {code:?}")]
    CommandFailed { program: String, code: Option<i32> },

    #[error("unsupported file type")]
    UnsupportedType,

    #[error("{0}")]
    Stage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProcessError> for mandible_core::AppError {
    fn from(err: ProcessError) -> Self {
        mandible_core::AppError::Upstream(err.to_string())
    }
}

/// Run one external tool to completion under the default deadline.
pub async fn run_command(program: &str, args: &[String]) -> Result<(), ProcessError> {
    run_command_with_timeout(program, args, DEFAULT_COMMAND_TIMEOUT).await
}

/// Run one external tool to completion. On deadline expiry the child is
/// killed and reaped (`kill_on_drop`); on non-zero exit its stderr goes to
/// the logs and the caller gets a failure.
pub async fn run_command_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
) -> Result<(), ProcessError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            // Dropping the in-flight future killed and reaped the child.
            return Err(ProcessError::TimedOut {
                program: program.to_string(),
                timeout_secs: limit.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::error!(
            program = %program,
            code = ?output.status.code(),
            stderr = %stderr.trim(),
            "processor command failed"
        );
        return Err(ProcessError::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
        });
    }

    Ok(())
}

/// Derive an output path by appending `suffix` to the input path. The
/// working files are extension-less temp files, so plain concatenation is
/// the convention.
pub fn suffixed_path(input: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", input.display(), suffix))
}
