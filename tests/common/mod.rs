//! Common test utilities and helpers for ds tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use downstream_sync::config::{SyncConfig, VcsConfig};
use downstream_sync::runner::{command_line, report_status};
use downstream_sync::{CommandRunner, Layout, SyncEngine, Vcs};

/// Command runner that records every call and replays scripted output
///
/// `capture` answers from queued outputs per command line; the last queued
/// output repeats once the queue is down to one entry. `run` returns 0 unless
/// the command line contains a registered failure needle.
#[derive(Default)]
pub struct ScriptedRunner {
    runs: Mutex<Vec<String>>,
    captures: Mutex<Vec<String>>,
    outputs: Mutex<HashMap<String, VecDeque<String>>>,
    failures: Mutex<Vec<(String, i32)>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, argv: &[&str], outputs: &[&str]) -> Self {
        let key = command_line(&strings(argv));
        self.outputs.lock().unwrap().insert(
            key,
            outputs.iter().map(|output| output.to_string()).collect(),
        );
        self
    }

    pub fn failing_when(self, needle: &str, code: i32) -> Self {
        self.failures.lock().unwrap().push((needle.to_string(), code));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Command lines passed to `run`, in call order
    pub fn runs(&self) -> Vec<String> {
        self.runs.lock().unwrap().clone()
    }

    pub fn runs_containing(&self, needle: &str) -> Vec<String> {
        self.runs()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }

    /// Command lines passed to `capture`, in call order
    pub fn captures(&self) -> Vec<String> {
        self.captures.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, argv: &[String]) -> Result<i32> {
        let line = command_line(argv);
        self.runs.lock().unwrap().push(line.clone());

        let code = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, code)| *code)
            .unwrap_or(0);

        report_status(argv, code);
        Ok(code)
    }

    async fn capture(&self, argv: &[String]) -> Result<String> {
        let line = command_line(argv);
        self.captures.lock().unwrap().push(line.clone());

        let mut outputs = self.outputs.lock().unwrap();
        let output = match outputs.get_mut(&line) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => String::new(),
        };
        Ok(output)
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

pub fn layout() -> Layout {
    Layout::new("static_upstream", "downstream")
}

pub fn engine(runner: Arc<ScriptedRunner>) -> SyncEngine {
    SyncEngine::new(runner, SyncConfig::default())
}

pub fn vcs(runner: Arc<ScriptedRunner>) -> Vcs {
    Vcs::new(runner, VcsConfig::default())
}

/// The four default commands for one project, in execution order
pub fn expected_plan(project: &str) -> Vec<String> {
    vec![
        format!("bin/update-downstream --site desktop {}", project),
        format!("bin/update-downstream --site mobile {}", project),
        format!("bin/resign-downstream --site desktop {}", project),
        format!("bin/resign-downstream --site mobile {}", project),
    ]
}

/// Calls from `runs` that belong to one project, in order
pub fn runs_for(runs: &[String], project: &str) -> Vec<String> {
    let suffix = format!(" {}", project);
    runs.iter()
        .filter(|line| line.ends_with(&suffix))
        .cloned()
        .collect()
}

/// Temporary workspace with a config file for driving the binary
pub struct TestWorkspace {
    pub temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Write `config.yml` with the workspace root pointing at this directory
    pub fn write_config(&self, body: &str) -> PathBuf {
        let content = format!(
            "workspace:\n  root: \"{}\"\n{}",
            self.temp_dir.path().display(),
            body
        );
        let path = self.temp_dir.path().join("config.yml");
        std::fs::write(&path, content).expect("Failed to write test config");
        path
    }
}

pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
