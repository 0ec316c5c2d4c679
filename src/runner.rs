//! External command execution
//!
//! For actions, non-zero exits are warnings, not errors: the runner logs the
//! reconstructed command line with its status and hands the status back. Only
//! an action that cannot be started (or outlives its configured timeout) is an
//! `Err`. Queries are different: their output is only meaningful when the
//! command succeeded, so a non-zero exit fails the query.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::SyncError;

/// Status reported when a process was terminated by a signal
pub const SIGNALLED: i32 = -1;

/// Executes external commands on behalf of every component
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv`, returning its exit status
    async fn run(&self, argv: &[String]) -> Result<i32>;

    /// Run `argv` and return its standard output; a non-zero exit is an `Err`
    async fn capture(&self, argv: &[String]) -> Result<String>;
}

/// Runs commands as child processes inside the workspace root
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self, argv: &[String]) -> Result<AsyncCommand> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| SyncError::EmptyCommand(command_line(argv)))?;

        let mut command = AsyncCommand::new(program);
        command.args(args).current_dir(&self.workdir).kill_on_drop(true);
        Ok(command)
    }

    async fn bounded<F, T>(&self, argv: &[String], future: F) -> Result<T>
    where
        F: std::future::Future<Output = std::io::Result<T>>,
    {
        let result = match self.timeout {
            Some(limit) => timeout(limit, future).await.map_err(|_| {
                anyhow!(
                    "`{}` timed out after {}s",
                    command_line(argv),
                    limit.as_secs()
                )
            })?,
            None => future.await,
        };

        result.with_context(|| format!("Failed to start `{}`", command_line(argv)))
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: &[String]) -> Result<i32> {
        let mut command = self.command(argv)?;
        debug!("Running `{}`", command_line(argv));

        let status = self.bounded(argv, command.status()).await?;
        let code = status.code().unwrap_or(SIGNALLED);

        report_status(argv, code);
        Ok(code)
    }

    async fn capture(&self, argv: &[String]) -> Result<String> {
        let mut command = self.command(argv)?;
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        debug!("Querying `{}`", command_line(argv));

        let output = self.bounded(argv, command.output()).await?;
        let code = output.status.code().unwrap_or(SIGNALLED);

        if code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::QueryFailed {
                command: command_line(argv),
                code,
                stderr: stderr.trim().lines().collect::<Vec<_>>().join(" / "),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Emit the warning for a non-zero exit
pub fn report_status(argv: &[String], code: i32) {
    if code != 0 {
        warn!("Command `{}` exited with status {}", command_line(argv), code);
    }
}

/// Reconstruct a shell-readable command line from `argv`
pub fn command_line(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%{}".contains(c));

    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
