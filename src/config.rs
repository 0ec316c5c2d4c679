use anyhow::{Context, Result};
use dirs::config_dir;
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for ds
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// Workspace layout
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Version-control commands
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Per-project sync commands
    #[serde(default)]
    pub sync: SyncConfig,

    /// File-change notification service
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the upstream and downstream trees live
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkspaceConfig {
    /// Workspace root; detected through `vcs.root` when unset
    #[serde(default)]
    pub root: Option<String>,

    /// Directory holding one upstream subtree per project
    #[serde(default = "default_upstream_prefix")]
    pub upstream_prefix: String,

    /// Path segment preceding the project name in downstream paths
    #[serde(default = "default_downstream_marker")]
    pub downstream_marker: String,
}

/// Version-control commands, as argv lists
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VcsConfig {
    #[serde(default = "default_vcs_root")]
    pub root: Vec<String>,

    /// Pending-change query, one `<STATUS> <path>` line per file
    #[serde(default = "default_vcs_status")]
    pub status: Vec<String>,

    /// Conflict list query, one `<U|R> <path>` line per merge item
    #[serde(default = "default_vcs_conflicts")]
    pub conflicts: Vec<String>,

    /// Mark-resolved command; the conflicted path is appended
    #[serde(default = "default_vcs_mark_resolved")]
    pub mark_resolved: Vec<String>,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Site variants every project is updated and re-signed for
    #[serde(default = "default_sites")]
    pub sites: Vec<String>,

    /// Update command template (`{project}`, `{site}` are substituted)
    #[serde(default = "default_update_command")]
    pub update: Vec<String>,

    /// Re-sign command template (`{project}`, `{site}` are substituted)
    #[serde(default = "default_resign_command")]
    pub resign: Vec<String>,

    /// Maximum concurrent projects, 0 means one task per project
    #[serde(default)]
    pub max_parallel: usize,

    /// Timeout for a single external command in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Notification service configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Command started as the persistent service connection
    #[serde(default = "default_watch_command")]
    pub command: Vec<String>,

    /// Name submitted with the subscription query
    #[serde(default = "default_subscription")]
    pub subscription: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Enable colored output
    #[serde(default)]
    pub color: bool,

    /// strftime format for line timestamps
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

// Default value functions
fn default_upstream_prefix() -> String {
    "static_upstream".to_string()
}
fn default_downstream_marker() -> String {
    "downstream".to_string()
}
fn default_vcs_root() -> Vec<String> {
    argv(&["hg", "root"])
}
fn default_vcs_status() -> Vec<String> {
    argv(&["hg", "status"])
}
fn default_vcs_conflicts() -> Vec<String> {
    argv(&["hg", "resolve", "--list"])
}
fn default_vcs_mark_resolved() -> Vec<String> {
    argv(&["hg", "resolve", "--mark"])
}
fn default_sites() -> Vec<String> {
    argv(&["desktop", "mobile"])
}
fn default_update_command() -> Vec<String> {
    argv(&["bin/update-downstream", "--site", "{site}", "{project}"])
}
fn default_resign_command() -> Vec<String> {
    argv(&["bin/resign-downstream", "--site", "{site}", "{project}"])
}
fn default_watch_command() -> Vec<String> {
    argv(&["watchman", "--json-command", "--persistent"])
}
fn default_subscription() -> String {
    "ds".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timestamp_format() -> String {
    "%H:%M:%S".to_string()
}

// Default implementations
impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            upstream_prefix: default_upstream_prefix(),
            downstream_marker: default_downstream_marker(),
        }
    }
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            root: default_vcs_root(),
            status: default_vcs_status(),
            conflicts: default_vcs_conflicts(),
            mark_resolved: default_vcs_mark_resolved(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sites: default_sites(),
            update: default_update_command(),
            resign: default_resign_command(),
            max_parallel: 0,
            timeout: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            command: default_watch_command(),
            subscription: default_subscription(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            color: false,
            timestamp_format: default_timestamp_format(),
        }
    }
}

impl SyncConfig {
    /// Per-command timeout, if one is configured
    pub fn command_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the default location, falling back to built-in defaults
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            tracing::debug!("No configuration at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("ds").join("config.yml"))
    }

    /// Expand environment variables and `~` in the workspace root
    pub fn expand_paths(&mut self) -> Result<()> {
        if let Some(root) = &self.workspace.root {
            let expanded = shellexpand::full(root)
                .context("Failed to expand workspace root path")?;
            self.workspace.root = Some(
                PathBuf::from(expanded.as_ref())
                    .clean()
                    .to_string_lossy()
                    .into_owned(),
            );
        }

        Ok(())
    }
}
