//! Durable session log
//!
//! Appends the events retained at the configured verbosity to a JSON-lines
//! file, one event per line. The file is opened in append mode so several
//! runs can share one log.

use super::event_log::{EventLog, LogEvent};
use anyhow::{Context, Result};
use bookfeed_common::config::Verbosity;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

pub struct SessionLogWriter {
    path: PathBuf,
    verbosity: Verbosity,
    /// Serializes appends from concurrently finishing records
    lock: Mutex<()>,
}

impl SessionLogWriter {
    pub fn new(path: impl Into<PathBuf>, verbosity: Verbosity) -> Self {
        Self {
            path: path.into(),
            verbosity,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Append the retained events of one record's log
    ///
    /// Returns the number of lines written.
    pub async fn append(&self, log: &EventLog) -> Result<usize> {
        let events = log.retained(self.verbosity);
        self.append_events(&events).await
    }

    pub async fn append_events(&self, events: &[LogEvent]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut buffer = String::new();
        for event in events {
            let line = serde_json::to_string(event).context("Failed to serialize log event")?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open session log {}", self.path.display()))?;
        file.write_all(buffer.as_bytes())
            .await
            .context("Failed to write session log")?;
        file.flush().await.context("Failed to flush session log")?;

        debug!(path = %self.path.display(), lines = events.len(), "Session log appended");
        Ok(events.len())
    }
}

/// Read a session log back into events
pub async fn read_session_log(path: &Path) -> Result<Vec<LogEvent>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read session log {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid session log line {}", i + 1))
        })
        .collect()
}
