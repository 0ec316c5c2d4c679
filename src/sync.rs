//! Sync Engine - per-project update and re-sign, fanned out over a working set
//!
//! A project sync is four external commands: update for each site variant,
//! then re-sign for each site variant (an update can leave signatures stale).
//! Every command runs even when an earlier one failed.

use crate::config::SyncConfig;
use crate::executor::ParallelExecutor;
use crate::runner::{command_line, CommandRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outcome of syncing one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub project: String,
    /// Commands that exited non-zero or could not be started
    pub failed_steps: Vec<String>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed_steps.is_empty()
    }
}

/// Results from syncing a working set
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub total_projects: usize,
    pub clean_projects: usize,
    pub projects_with_warnings: usize,
    pub duration: Duration,
    pub reports: Vec<SyncReport>,
}

impl SyncSummary {
    pub fn report(&self, project: &str) -> Option<&SyncReport> {
        self.reports.iter().find(|report| report.project == project)
    }
}

/// The per-project unit of work
#[derive(Clone)]
pub struct ProjectSync {
    runner: Arc<dyn CommandRunner>,
    config: Arc<SyncConfig>,
}

impl ProjectSync {
    pub fn new(runner: Arc<dyn CommandRunner>, config: SyncConfig) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    /// Commands for one project, in execution order
    pub fn plan(&self, project: &str) -> Vec<Vec<String>> {
        let updates = self
            .config
            .sites
            .iter()
            .map(|site| render(&self.config.update, project, site));
        let resigns = self
            .config
            .sites
            .iter()
            .map(|site| render(&self.config.resign, project, site));

        updates.chain(resigns).collect()
    }

    pub async fn sync(&self, project: &str) -> SyncReport {
        info!("Syncing {}", project);
        let mut failed_steps = Vec::new();

        for argv in self.plan(project) {
            match self.runner.run(&argv).await {
                Ok(0) => {}
                // The runner has already logged the warning.
                Ok(code) => failed_steps.push(format!("{} (status {})", command_line(&argv), code)),
                Err(e) => {
                    error!("{}: {:#}", project, e);
                    failed_steps.push(format!("{} ({})", command_line(&argv), e));
                }
            }
        }

        if failed_steps.is_empty() {
            debug!("Synced {}", project);
        } else {
            warn!("Synced {} with {} failed command(s)", project, failed_steps.len());
        }

        SyncReport {
            project: project.to_string(),
            failed_steps,
        }
    }
}

fn render(template: &[String], project: &str, site: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{project}", project).replace("{site}", site))
        .collect()
}

/// Fans project syncs out over a working set
#[derive(Clone)]
pub struct SyncEngine {
    project_sync: ProjectSync,
    executor: ParallelExecutor,
}

impl SyncEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, config: SyncConfig) -> Self {
        let executor = ParallelExecutor::new(config.max_parallel);
        Self {
            project_sync: ProjectSync::new(runner, config),
            executor,
        }
    }

    /// Sync every distinct project concurrently and wait for all of them
    pub async fn sync_projects(&self, projects: &[String]) -> SyncSummary {
        let start_time = Instant::now();
        let working_set = distinct(projects);

        if working_set.is_empty() {
            info!("Nothing to sync");
        } else {
            info!(
                "Syncing {} project(s): {}",
                working_set.len(),
                working_set.join(", ")
            );
        }

        let project_sync = self.project_sync.clone();
        let outcomes = self
            .executor
            .run_all(working_set, move |project: String| {
                let project_sync = project_sync.clone();
                async move { Ok::<_, anyhow::Error>(project_sync.sync(&project).await) }
            })
            .await;

        let reports = outcomes
            .into_iter()
            .map(|outcome| match outcome.result {
                Ok(report) => report,
                Err(e) => {
                    error!("Sync of {} did not complete: {:#}", outcome.item, e);
                    SyncReport {
                        project: outcome.item,
                        failed_steps: vec![e.to_string()],
                    }
                }
            })
            .collect();

        let summary = compile_summary(reports, start_time.elapsed());

        if summary.total_projects > 0 {
            info!(
                "Sync completed in {:.2}s: {} project(s), {} clean, {} with warnings",
                summary.duration.as_secs_f64(),
                summary.total_projects,
                summary.clean_projects,
                summary.projects_with_warnings
            );
        }

        summary
    }
}

/// Drop repeated identifiers, keeping the first occurrence
fn distinct(projects: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(projects.len());
    for project in projects {
        if !seen.contains(project) {
            seen.push(project.clone());
        }
    }
    seen
}

fn compile_summary(reports: Vec<SyncReport>, duration: Duration) -> SyncSummary {
    let clean_projects = reports.iter().filter(|report| report.is_clean()).count();

    SyncSummary {
        total_projects: reports.len(),
        clean_projects,
        projects_with_warnings: reports.len() - clean_projects,
        duration,
        reports,
    }
}
