//! Path-to-project mapping for the upstream and downstream trees
//!
//! A project `widgets` lives at `static_upstream/widgets/...` upstream and at
//! `<anything>/downstream/widgets/...` downstream. The project name is always
//! a directory segment; a path naming the prefix directory itself, or a file
//! directly inside it, belongs to no project.

use crate::config::WorkspaceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    upstream_prefix: String,
    downstream_marker: String,
}

impl Layout {
    pub fn new(upstream_prefix: impl Into<String>, downstream_marker: impl Into<String>) -> Self {
        Self {
            upstream_prefix: upstream_prefix.into().trim_matches('/').to_string(),
            downstream_marker: downstream_marker.into().trim_matches('/').to_string(),
        }
    }

    pub fn from_config(workspace: &WorkspaceConfig) -> Self {
        Self::new(&workspace.upstream_prefix, &workspace.downstream_marker)
    }

    pub fn upstream_prefix(&self) -> &str {
        &self.upstream_prefix
    }

    /// Upstream directory of a project, relative to the workspace root
    pub fn upstream_dir(&self, project: &str) -> String {
        format!("{}/{}", self.upstream_prefix, project)
    }

    /// Whether a path lies under the upstream prefix, matched the same way as
    /// [`Layout::upstream_project`] (as whole segments anywhere in the path)
    pub fn is_upstream(&self, path: &str) -> bool {
        let marker: Vec<&str> = self.upstream_prefix.split('/').collect();
        let segments: Vec<&str> = path.split('/').collect();
        let n = marker.len();

        segments
            .windows(n + 1)
            .any(|window| window[..n] == marker[..] && !window[n].is_empty())
    }

    /// Project named by the segment following the upstream prefix
    pub fn upstream_project<'a>(&self, path: &'a str) -> Option<&'a str> {
        project_after(path, &self.upstream_prefix)
    }

    /// Project named by the segment following the downstream marker
    pub fn downstream_project<'a>(&self, path: &'a str) -> Option<&'a str> {
        project_after(path, &self.downstream_marker)
    }

    /// First watched project whose upstream directory occurs in `path`
    pub fn watched_project<'p>(&self, path: &str, projects: &'p [String]) -> Option<&'p str> {
        projects
            .iter()
            .find(|project| path.contains(&format!("{}/", self.upstream_dir(project))))
            .map(String::as_str)
    }
}

fn project_after<'a>(path: &'a str, marker: &str) -> Option<&'a str> {
    let marker: Vec<&str> = marker.split('/').collect();
    let segments: Vec<&'a str> = path.split('/').collect();
    let n = marker.len();

    segments
        .windows(n + 2)
        .find(|window| window[..n] == marker[..] && !window[n].is_empty())
        .map(|window| window[n])
}
