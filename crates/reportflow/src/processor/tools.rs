//! External command invocation (`qpdf`, `gs`, `pdftoppm`, `tesseract`).

use std::ffi::{OsStr, OsString};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("`{program}` is not installed or not on PATH")]
    NotFound { program: String },

    #[error("`{program}` exited with {}: {stderr}", status_label(.status))]
    Failed {
        program: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Failed to run `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl ToolError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolError::NotFound { .. })
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Turns a non-zero exit into [`ToolError::Failed`].
    pub fn require_success(self, program: &str) -> Result<ToolOutput, ToolError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolError::Failed {
                program: program.to_string(),
                status: self.status,
                stderr: String::from_utf8_lossy(&self.stderr).trim().to_string(),
            })
        }
    }
}

/// Runs an external program to completion.
///
/// Implementations return `Ok` for any exit status; only a failure to spawn
/// is an error. A binary missing from `PATH` must map to
/// [`ToolError::NotFound`].
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError>;

    /// Whether `program` can be spawned at all.
    async fn is_available(&self, program: &str, probe_arg: &str) -> bool {
        match self.run(program, &[OsString::from(probe_arg)]).await {
            Ok(_) => true,
            Err(e) => {
                log::debug!("Probe of `{}` failed: {}", program, e);
                false
            }
        }
    }
}

/// Spawns real processes through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError> {
        log::debug!("Running {} {}", program, display_args(args));

        let output = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotFound {
                        program: program.to_string(),
                    }
                } else {
                    ToolError::Io {
                        program: program.to_string(),
                        source: e,
                    }
                }
            })?;

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Builds an argument vector from mixed string and path pieces.
pub fn args<I, S>(items: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_os_string())
        .collect()
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| crate::sanitize::redact_path(std::path::Path::new(a)))
        .collect::<Vec<_>>()
        .join(" ")
}
