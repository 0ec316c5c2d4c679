//! Status line output
//!
//! Every status line goes through `tracing`. The subscriber installed here
//! writes through a [`StatusWriter`], which owns the one output lock of the
//! process: an event is formatted into a private buffer and the whole line is
//! written under a single lock acquisition, so lines from concurrent tasks
//! never interleave.

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::Subscriber;
use tracing_subscriber::fmt::{self, time::ChronoLocal, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

use crate::config::LoggingConfig;

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Serializing writer handed to the `fmt` layer
#[derive(Clone)]
pub struct StatusWriter {
    sink: Sink,
}

/// One buffered status line, flushed to the shared sink on drop
pub struct StatusLine {
    buf: Vec<u8>,
    sink: Sink,
}

impl StatusWriter {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

fn lock_sink(sink: &Sink) -> MutexGuard<'_, Box<dyn Write + Send>> {
    // A panic while holding the lock cannot leave a half-written line behind.
    sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Write for StatusLine {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let mut sink = lock_sink(&self.sink);
        // Output failures are best-effort.
        let _ = sink.write_all(&self.buf);
        let _ = sink.flush();
    }
}

impl<'a> MakeWriter<'a> for StatusWriter {
    type Writer = StatusLine;

    fn make_writer(&'a self) -> Self::Writer {
        StatusLine {
            buf: Vec::with_capacity(256),
            sink: Arc::clone(&self.sink),
        }
    }
}

/// In-memory sink, used to inspect log output in tests
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut buf = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn status_layer<S>(writer: StatusWriter, logging: &LoggingConfig) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(logging.color)
        .with_target(false)
        .with_timer(ChronoLocal::new(logging.timestamp_format.clone()))
}

/// Install the global subscriber writing status lines to stdout
pub fn init(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(status_layer(StatusWriter::stdout(), logging))
        .with(filter)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}

/// Build a subscriber that records every line into the returned buffer
pub fn capture() -> (impl Subscriber + Send + Sync, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let subscriber = tracing_subscriber::registry()
        .with(status_layer(
            StatusWriter::new(buffer.clone()),
            &LoggingConfig::default(),
        ))
        .with(EnvFilter::new("debug"));

    (subscriber, buffer)
}
