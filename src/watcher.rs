//! Change Watcher - continuous sync driven by the notification service
//!
//! The session moves through `Idle -> Subscribed -> Streaming` and ends
//! either `Interrupted` (the shutdown future resolved) or `Terminated` (the
//! service closed its output). Each file-list notification is mapped back to
//! watched projects and synced before the next frame is read, so batches
//! never overlap. Service errors and malformed frames are logged and the
//! session carries on.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::SyncError;
use crate::frame::FrameDecoder;
use crate::layout::Layout;
use crate::runner::command_line;
use crate::sync::{SyncEngine, SyncSummary};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Subscribed,
    Streaming,
    Terminated,
    Interrupted,
}

/// The subscription submitted once at session start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionQuery {
    root: String,
    name: String,
    dirnames: Vec<String>,
}

impl SubscriptionQuery {
    /// One `dirname` term per watched project; an empty project set is a usage error
    pub fn new(root: &Path, name: &str, projects: &[String], layout: &Layout) -> Result<Self> {
        if projects.is_empty() {
            return Err(SyncError::NoProjects.into());
        }

        Ok(Self {
            root: root.to_string_lossy().into_owned(),
            name: name.to_string(),
            dirnames: projects
                .iter()
                .map(|project| layout.upstream_dir(project))
                .collect(),
        })
    }

    pub fn to_json(&self) -> Value {
        let mut expression = vec![json!("anyof")];
        expression.extend(self.dirnames.iter().map(|dir| json!(["dirname", dir])));

        json!([
            "subscribe",
            self.root,
            self.name,
            {
                "expression": expression,
                "fields": ["name"],
            }
        ])
    }
}

/// One decoded frame from the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchMessage {
    Error(String),
    SubscribeAck,
    Files { subscription: String, files: Vec<String> },
    Other,
}

#[derive(Deserialize)]
struct FileNotification {
    subscription: String,
    files: Vec<FileField>,
}

/// `fields: ["name"]` yields bare names; richer field lists yield objects
#[derive(Deserialize)]
#[serde(untagged)]
enum FileField {
    Name(String),
    Object { name: String },
}

impl FileField {
    fn into_name(self) -> String {
        match self {
            FileField::Name(name) | FileField::Object { name } => name,
        }
    }
}

impl WatchMessage {
    pub fn parse(frame: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(frame)?;

        if !value.is_object() {
            return Err(anyhow!("expected a JSON object"));
        }

        if let Some(error) = value.get("error") {
            let message = error.as_str().map(str::to_string).unwrap_or_else(|| error.to_string());
            return Ok(WatchMessage::Error(message));
        }

        if value.get("subscription").is_some() && value.get("files").is_some() {
            let notification: FileNotification = serde_json::from_value(value)?;
            return Ok(WatchMessage::Files {
                subscription: notification.subscription,
                files: notification
                    .files
                    .into_iter()
                    .map(FileField::into_name)
                    .collect(),
            });
        }

        if value.get("subscribe").is_some() {
            return Ok(WatchMessage::SubscribeAck);
        }

        Ok(WatchMessage::Other)
    }
}

/// Distinct watched projects touched by a file list, in first-seen order
pub fn changed_projects(files: &[String], projects: &[String], layout: &Layout) -> Vec<String> {
    let mut changed: Vec<String> = Vec::new();

    for file in files {
        match layout.watched_project(file, projects) {
            Some(project) if !changed.iter().any(|known| known == project) => {
                changed.push(project.to_string());
            }
            Some(_) => {}
            None => debug!("Ignoring change outside watched projects: {}", file),
        }
    }

    changed
}

pub struct ChangeWatcher {
    engine: SyncEngine,
    layout: Layout,
    config: WatchConfig,
    root: PathBuf,
    state: WatchState,
}

impl ChangeWatcher {
    pub fn new(engine: SyncEngine, layout: Layout, config: WatchConfig, root: PathBuf) -> Self {
        Self {
            engine,
            layout,
            config,
            root,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    fn transition(&mut self, next: WatchState) {
        debug!("Watch session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Start the service, subscribe, and sync changes until interrupted
    pub async fn run(
        &mut self,
        projects: &[String],
        shutdown: impl Future<Output = ()>,
    ) -> Result<WatchState> {
        let query = SubscriptionQuery::new(&self.root, &self.config.subscription, projects, &self.layout)?;

        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| SyncError::EmptyCommand("watch.command".to_string()))?;

        info!(
            "Watching {} project(s) under {}: {}",
            projects.len(),
            self.root.display(),
            projects.join(", ")
        );

        let mut child = AsyncCommand::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start `{}`", command_line(&self.config.command)))?;

        let mut stdin = child
            .stdin
            .take()
            .context("Notification service stdin unavailable")?;
        let stdout = child
            .stdout
            .take()
            .context("Notification service stdout unavailable")?;

        let result = match self.subscribe(&mut stdin, &query).await {
            Ok(()) => self.stream(stdout, projects, shutdown).await,
            Err(e) => Err(e),
        };

        // Close the connection on every exit path.
        drop(stdin);
        if let Err(e) = child.kill().await {
            debug!("Notification service already gone: {}", e);
        }

        match result? {
            WatchState::Terminated => Err(SyncError::ServiceClosed.into()),
            state => Ok(state),
        }
    }

    /// Submit the subscription query on the service's input
    pub async fn subscribe<W>(&mut self, writer: &mut W, query: &SubscriptionQuery) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut line = query.to_json().to_string();
        line.push('\n');

        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to send subscription to notification service")?;
        writer.flush().await?;

        self.transition(WatchState::Subscribed);
        Ok(())
    }

    /// Read frames until the shutdown future resolves or the stream ends
    pub async fn stream<R>(
        &mut self,
        mut reader: R,
        projects: &[String],
        shutdown: impl Future<Output = ()>,
    ) -> Result<WatchState>
    where
        R: AsyncRead + Unpin,
    {
        tokio::pin!(shutdown);
        self.transition(WatchState::Streaming);

        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Watch session interrupted, shutting down");
                    self.transition(WatchState::Interrupted);
                    return Ok(WatchState::Interrupted);
                }
                read = reader.read(&mut buf) => {
                    read.context("Failed to read from notification service")?
                }
            };

            if read == 0 {
                if let Some(rest) = decoder.finish() {
                    self.handle_frame(&rest, projects).await;
                }
                error!("Notification service closed the event stream");
                self.transition(WatchState::Terminated);
                return Ok(WatchState::Terminated);
            }

            for frame in decoder.push(&buf[..read]) {
                self.handle_frame(&frame, projects).await;
            }
        }
    }

    async fn handle_frame(&self, frame: &str, projects: &[String]) -> Option<SyncSummary> {
        let message = match WatchMessage::parse(frame) {
            Ok(message) => message,
            Err(e) => {
                error!(
                    "Malformed frame from notification service ({}): {}",
                    e,
                    frame.trim().escape_debug()
                );
                return None;
            }
        };

        match message {
            WatchMessage::Error(message) => {
                error!("Notification service error: {}", message.escape_debug());
                None
            }
            WatchMessage::SubscribeAck => {
                debug!("Subscription acknowledged");
                None
            }
            WatchMessage::Files {
                subscription,
                files,
            } => {
                if subscription != self.config.subscription {
                    warn!("Ignoring notification for unknown subscription {}", subscription);
                    return None;
                }

                let batch = changed_projects(&files, projects, &self.layout);
                if batch.is_empty() {
                    debug!("{} changed file(s), none in watched projects", files.len());
                    return None;
                }

                Some(self.engine.sync_projects(&batch).await)
            }
            WatchMessage::Other => {
                debug!("Ignoring frame: {}", frame.trim().escape_debug());
                None
            }
        }
    }
}
