//! Fatal error conditions that end a `ds` invocation with exit status 1.
//!
//! External-command warnings and protocol faults are never represented here;
//! they are logged where they happen and execution continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Watch mode was requested but no project was given or detected.
    #[error("watch mode requires at least one project; none given and none detected")]
    NoProjects,

    /// Upstream conflicts always need a human and block downstream automation.
    #[error("{} upstream conflict(s) must be resolved manually: {}", .0.len(), .0.join(", "))]
    UpstreamConflicts(Vec<String>),

    /// Entries still unresolved after the downstream remediation pass.
    #[error("conflicts remain unresolved, manual intervention required: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    /// A query command exited non-zero, so its output cannot be trusted.
    #[error("`{command}` exited with status {code}: {stderr}")]
    QueryFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// A configured command template has no program.
    #[error("configured command `{0}` is empty")]
    EmptyCommand(String),

    /// The notification service closed its output stream.
    #[error("notification service closed the event stream")]
    ServiceClosed,
}
