//! ds - keeps downstream project trees aligned with an upstream tree
//!
//! A workspace holds one upstream subtree per project under
//! `static_upstream/<project>/` and derived copies under
//! `.../downstream/<project>/`. `ds` propagates upstream changes by running
//! per-project update and re-sign commands, in one of three modes:
//!
//! - **One-shot sync** of named projects, or of every project with pending
//!   upstream changes
//! - **Watch**: continuous sync driven by a file-change notification stream
//! - **Resolve**: automated remediation of downstream merge conflicts,
//!   blocked whenever an upstream conflict exists
//!
//! ## Modules
//!
//! - [`config`]: YAML configuration with XDG lookup
//! - [`logger`]: serialized status line output
//! - [`runner`]: external command execution
//! - [`executor`]: parallel fan-out with a join barrier
//! - [`projects`]: working-set resolution
//! - [`sync`]: per-project sync action and engine
//! - [`watcher`] / [`frame`]: notification-driven sync
//! - [`conflicts`]: conflict classification and resolution

pub mod config;
pub mod conflicts;
pub mod error;
pub mod executor;
pub mod frame;
pub mod layout;
pub mod logger;
pub mod projects;
pub mod runner;
pub mod signals;
pub mod sync;
pub mod vcs;
pub mod watcher;

pub use config::Config;
pub use conflicts::{ConflictEntry, ConflictResolver, ConflictStatus};
pub use error::SyncError;
pub use executor::{ParallelExecutor, TaskOutcome};
pub use layout::Layout;
pub use projects::ProjectResolver;
pub use runner::{CommandRunner, ProcessRunner};
pub use sync::{ProjectSync, SyncEngine, SyncReport, SyncSummary};
pub use vcs::Vcs;
pub use watcher::{ChangeWatcher, WatchState};
