//! Conflict Resolver - automated remediation for the dual-tree merge layout
//!
//! Upstream conflicts always need a human: if any exist, nothing downstream is
//! touched. Otherwise every downstream project with an unresolved entry is
//! re-synced, its conflicted paths are marked resolved when the sync came
//! back clean, and the conflict list is queried again to confirm that every
//! entry now reads resolved.

use anyhow::Result;
use tracing::{error, info, warn};

use crate::error::SyncError;
use crate::layout::Layout;
use crate::sync::SyncEngine;
use crate::vcs::{StatusEntry, Vcs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStatus {
    Unresolved,
    Resolved,
    Other(char),
}

impl From<char> for ConflictStatus {
    fn from(code: char) -> Self {
        match code {
            'U' => ConflictStatus::Unresolved,
            'R' => ConflictStatus::Resolved,
            other => ConflictStatus::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEntry {
    pub status: ConflictStatus,
    pub path: String,
}

impl ConflictEntry {
    pub fn new(status: ConflictStatus, path: impl Into<String>) -> Self {
        Self {
            status,
            path: path.into(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        self.status == ConflictStatus::Unresolved
    }
}

impl From<StatusEntry> for ConflictEntry {
    fn from(entry: StatusEntry) -> Self {
        Self {
            status: entry.code.into(),
            path: entry.path,
        }
    }
}

/// Unresolved entries sorted by namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictReport {
    pub upstream: Vec<ConflictEntry>,
    /// Distinct downstream projects, in first-seen order
    pub downstream: Vec<String>,
    /// `(project, path)` for every unresolved downstream entry
    pub downstream_paths: Vec<(String, String)>,
    /// Unresolved entries in neither namespace
    pub unclassified: Vec<ConflictEntry>,
}

impl ConflictReport {
    pub fn paths_for<'a>(&'a self, project: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.downstream_paths
            .iter()
            .filter(move |(owner, _)| owner == project)
            .map(|(_, path)| path.as_str())
    }
}

pub fn classify(entries: &[ConflictEntry], layout: &Layout) -> ConflictReport {
    let mut report = ConflictReport::default();

    for entry in entries.iter().filter(|entry| entry.is_unresolved()) {
        if layout.is_upstream(&entry.path) {
            report.upstream.push(entry.clone());
        } else if let Some(project) = layout.downstream_project(&entry.path) {
            if !report.downstream.iter().any(|known| known == project) {
                report.downstream.push(project.to_string());
            }
            report
                .downstream_paths
                .push((project.to_string(), entry.path.clone()));
        } else {
            report.unclassified.push(entry.clone());
        }
    }

    report
}

/// Every entry explicitly reads resolved
pub fn all_resolved(entries: &[ConflictEntry]) -> bool {
    entries
        .iter()
        .all(|entry| entry.status == ConflictStatus::Resolved)
}

/// What a successful resolution pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub synced_projects: Vec<String>,
    pub marked_paths: usize,
}

pub struct ConflictResolver {
    vcs: Vcs,
    engine: SyncEngine,
    layout: Layout,
}

impl ConflictResolver {
    pub fn new(vcs: Vcs, engine: SyncEngine, layout: Layout) -> Self {
        Self {
            vcs,
            engine,
            layout,
        }
    }

    pub async fn query(&self) -> Result<Vec<ConflictEntry>> {
        let entries = self.vcs.conflicts().await?;
        Ok(entries.into_iter().map(ConflictEntry::from).collect())
    }

    pub async fn resolve(&self) -> Result<Resolution> {
        let entries = self.query().await?;
        let report = classify(&entries, &self.layout);

        if !report.upstream.is_empty() {
            for entry in &report.upstream {
                error!("Upstream conflict needs manual resolution: {}", entry.path);
            }
            let paths = report.upstream.into_iter().map(|entry| entry.path).collect();
            return Err(SyncError::UpstreamConflicts(paths).into());
        }

        for entry in &report.unclassified {
            warn!("Conflict outside upstream and downstream trees: {}", entry.path);
        }

        let mut marked_paths = 0;

        if report.downstream.is_empty() {
            info!("No downstream conflicts to resolve");
        } else {
            info!(
                "Resolving downstream conflicts in {} project(s): {}",
                report.downstream.len(),
                report.downstream.join(", ")
            );

            let summary = self.engine.sync_projects(&report.downstream).await;

            // The working copy is locked per command; mark paths one at a time.
            for sync_report in &summary.reports {
                if !sync_report.is_clean() {
                    warn!(
                        "Leaving conflicts in {} unresolved: sync reported {} failure(s)",
                        sync_report.project,
                        sync_report.failed_steps.len()
                    );
                    continue;
                }

                for path in report.paths_for(&sync_report.project) {
                    match self.vcs.mark_resolved(path).await {
                        Ok(0) => marked_paths += 1,
                        Ok(_) => {}
                        Err(e) => error!("Could not mark {} resolved: {:#}", path, e),
                    }
                }
            }
        }

        let remaining = self.query().await?;

        if all_resolved(&remaining) {
            info!("All conflicts resolved");
            Ok(Resolution {
                synced_projects: report.downstream,
                marked_paths,
            })
        } else {
            let unresolved: Vec<String> = remaining
                .into_iter()
                .filter(|entry| entry.status != ConflictStatus::Resolved)
                .map(|entry| entry.path)
                .collect();
            for path in &unresolved {
                error!("Still unresolved: {}", path);
            }
            Err(SyncError::Unresolved(unresolved).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Layout {
        Layout::new("static_upstream", "downstream")
    }

    #[test]
    fn test_classify_by_namespace() {
        let entries = vec![
            ConflictEntry::new(ConflictStatus::Unresolved, "static_upstream/x/a"),
            ConflictEntry::new(ConflictStatus::Unresolved, "sites/desktop/downstream/y/b"),
            ConflictEntry::new(ConflictStatus::Unresolved, "sites/mobile/downstream/y/c"),
            ConflictEntry::new(ConflictStatus::Resolved, "sites/desktop/downstream/z/d"),
            ConflictEntry::new(ConflictStatus::Unresolved, "Makefile"),
        ];

        let report = classify(&entries, &layout());

        assert_eq!(report.upstream.len(), 1);
        assert_eq!(report.upstream[0].path, "static_upstream/x/a");
        assert_eq!(report.downstream, vec!["y"]);
        assert_eq!(
            report.paths_for("y").collect::<Vec<_>>(),
            vec!["sites/desktop/downstream/y/b", "sites/mobile/downstream/y/c"]
        );
        assert_eq!(report.unclassified.len(), 1);
    }

    #[test]
    fn test_nested_upstream_conflict_is_upstream() {
        let entries = vec![
            ConflictEntry::new(ConflictStatus::Unresolved, "web/static_upstream/x/a"),
            ConflictEntry::new(ConflictStatus::Unresolved, "web/downstream/y/b"),
        ];

        let report = classify(&entries, &layout());

        assert_eq!(report.upstream.len(), 1);
        assert_eq!(report.upstream[0].path, "web/static_upstream/x/a");
        assert!(report.unclassified.is_empty());
    }

    #[test]
    fn test_all_resolved_checks_every_entry() {
        assert!(all_resolved(&[]));
        assert!(all_resolved(&[ConflictEntry::new(ConflictStatus::Resolved, "a")]));
        assert!(!all_resolved(&[
            ConflictEntry::new(ConflictStatus::Resolved, "a"),
            ConflictEntry::new(ConflictStatus::Unresolved, "b"),
        ]));
        assert!(!all_resolved(&[ConflictEntry::new(ConflictStatus::Other('?'), "c")]));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ConflictStatus::from('U'), ConflictStatus::Unresolved);
        assert_eq!(ConflictStatus::from('R'), ConflictStatus::Resolved);
        assert_eq!(ConflictStatus::from('X'), ConflictStatus::Other('X'));
    }
}
