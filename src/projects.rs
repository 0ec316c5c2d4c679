//! Working-set resolution
//!
//! Projects come from the command line when given; otherwise they are the
//! upstream directories with pending changes in the working copy.

use anyhow::Result;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::layout::Layout;
use crate::vcs::{StatusEntry, Vcs};

/// Status codes that mark an upstream file as pending (modified, added, unknown)
const PENDING_CODES: &[char] = &['M', 'A', '?'];

pub struct ProjectResolver {
    vcs: Vcs,
    layout: Layout,
    detected: OnceCell<Vec<String>>,
}

impl ProjectResolver {
    pub fn new(vcs: Vcs, layout: Layout) -> Self {
        Self {
            vcs,
            layout,
            detected: OnceCell::new(),
        }
    }

    /// Explicit projects are returned verbatim; an empty list triggers detection.
    ///
    /// Detection queries the working copy at most once per resolver.
    pub async fn resolve(&self, explicit: &[String]) -> Result<Vec<String>> {
        if !explicit.is_empty() {
            debug!("Using {} project(s) from the command line", explicit.len());
            return Ok(explicit.to_vec());
        }

        let detected = self
            .detected
            .get_or_try_init(|| async {
                let entries = self.vcs.status().await?;
                let projects = changed_projects(&entries, &self.layout);
                info!(
                    "Detected {} changed project(s): {}",
                    projects.len(),
                    projects.join(", ")
                );
                Ok::<_, anyhow::Error>(projects)
            })
            .await?;

        Ok(detected.clone())
    }
}

/// Distinct projects with pending upstream changes, in first-seen order
pub fn changed_projects(entries: &[StatusEntry], layout: &Layout) -> Vec<String> {
    let mut projects: Vec<String> = Vec::new();

    for entry in entries {
        if !PENDING_CODES.contains(&entry.code) {
            continue;
        }
        if let Some(project) = layout.upstream_project(&entry.path) {
            if !projects.iter().any(|known| known == project) {
                projects.push(project.to_string());
            }
        }
    }

    projects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::parse_status_lines;

    #[test]
    fn test_changed_projects_deduplicates() {
        let entries = parse_status_lines(
            "M static_upstream/foo/x.txt\n? static_upstream/bar/y.txt\nM static_upstream/foo/z.txt\n",
        );
        let layout = Layout::new("static_upstream", "downstream");

        assert_eq!(changed_projects(&entries, &layout), vec!["foo", "bar"]);
    }

    #[test]
    fn test_changed_projects_ignores_other_codes_and_paths() {
        let entries = parse_status_lines(
            "R static_upstream/gone/x.txt\nM sites/downstream/foo/x.txt\nM README\nA static_upstream/new/index.js\n",
        );
        let layout = Layout::new("static_upstream", "downstream");

        assert_eq!(changed_projects(&entries, &layout), vec!["new"]);
    }
}
