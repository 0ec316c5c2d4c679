use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::config::VcsConfig;
use crate::runner::CommandRunner;

/// One `<STATUS-CHAR> <path>` line from a status or conflict-list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub code: char,
    pub path: String,
}

/// Version-control queries used by the resolver and conflict flow
#[derive(Clone)]
pub struct Vcs {
    runner: Arc<dyn CommandRunner>,
    config: VcsConfig,
}

impl Vcs {
    pub fn new(runner: Arc<dyn CommandRunner>, config: VcsConfig) -> Self {
        Self { runner, config }
    }

    /// Ask the version-control tool for the workspace root
    pub async fn root(&self) -> Result<PathBuf> {
        let output = self.runner.capture(&self.config.root).await?;
        let root = output.trim();

        if root.is_empty() {
            return Err(anyhow!("Could not determine the workspace root"));
        }

        Ok(PathBuf::from(root))
    }

    /// Pending changes in the working copy
    pub async fn status(&self) -> Result<Vec<StatusEntry>> {
        let output = self
            .runner
            .capture(&self.config.status)
            .await
            .context("Could not query pending changes")?;
        Ok(parse_status_lines(&output))
    }

    /// Current merge-conflict list
    pub async fn conflicts(&self) -> Result<Vec<StatusEntry>> {
        let output = self
            .runner
            .capture(&self.config.conflicts)
            .await
            .context("Could not list merge conflicts")?;
        Ok(parse_status_lines(&output))
    }

    /// Mark one conflicted path resolved, returning the command's exit status
    pub async fn mark_resolved(&self, path: &str) -> Result<i32> {
        let mut argv = self.config.mark_resolved.clone();
        argv.push(path.to_string());
        self.runner.run(&argv).await
    }
}

fn status_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\S)\s+(.+)$").expect("status line pattern is valid"))
}

/// Parse query output, skipping lines that are not `<STATUS-CHAR> <path>`
pub fn parse_status_lines(output: &str) -> Vec<StatusEntry> {
    output
        .lines()
        .filter_map(|line| {
            let captures = status_line_pattern().captures(line.trim_end())?;
            let code = captures[1].chars().next()?;
            Some(StatusEntry {
                code,
                path: captures[2].to_string(),
            })
        })
        .collect()
}
