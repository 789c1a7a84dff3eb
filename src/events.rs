//! Event output for external integrations.
//!
//! Watcher lifecycle events are emitted as JSON lines to stdout or a
//! configured file.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::watcher::WatcherEvent;

pub const EVENT_SCHEMA_VERSION: &str = "mdsync.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// High-level event kinds emitted by mdsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WatcherStarted,
    WatcherStopped,
    SyncCompleted,
    SyncSkipped,
    SyncFailed,
    DocumentWritten,
    RewriteDiscarded,
    IdsWritten,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event: EventKind, project: Option<String>) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            project,
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Map a watcher notification onto an event.
    pub fn from_watcher(event: &WatcherEvent, project: &str) -> Result<Self> {
        let project = Some(project.to_string());
        match event {
            WatcherEvent::SyncCompleted(report) => {
                Event::new(EventKind::SyncCompleted, project).with_data(report)
            }
            WatcherEvent::SyncSkipped { source } => {
                Event::new(EventKind::SyncSkipped, project).with_data(json!({ "source": source }))
            }
            WatcherEvent::SyncFailed { source, message } => {
                Event::new(EventKind::SyncFailed, project)
                    .with_data(json!({ "source": source, "error": message }))
            }
            WatcherEvent::DocumentWritten { tasks } => {
                Event::new(EventKind::DocumentWritten, project).with_data(json!({ "tasks": tasks }))
            }
            WatcherEvent::RewriteDiscarded => Ok(Event::new(EventKind::RewriteDiscarded, project)),
            WatcherEvent::IdsWritten { count } => {
                Event::new(EventKind::IdsWritten, project).with_data(json!({ "count": count }))
            }
        }
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}
