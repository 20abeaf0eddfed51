//! Structured event sinks.
//!
//! Presence events are recorded as JSON Lines: one object per line,
//! appended to `<log_dir>/devices.log` by default.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::PresenceEvent;

/// Default file name for the event log inside the log directory.
pub const DEFAULT_EVENTS_FILE: &str = "devices.log";

/// Errors raised while recording events.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The event log could not be opened.
    #[error("Failed to open event log {}: {source}", path.display())]
    OpenError {
        /// Event log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An event could not be written.
    #[error("Failed to write event to {}: {source}", path.display())]
    WriteError {
        /// Event log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An event could not be serialized.
    #[error("Failed to serialize event: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// Result type for sink operations.
pub type SinkResult<T> = std::result::Result<T, SinkError>;

/// Append-only destination for presence events.
pub trait EventSink {
    /// Record one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be persisted.
    fn record(&mut self, event: &PresenceEvent) -> SinkResult<()>;
}

/// JSON Lines file sink.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Open (or create) the event log at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::OpenError`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> SinkResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::OpenError {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    /// Open `file_name` inside `log_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::OpenError`] if the file cannot be opened.
    pub fn in_dir(log_dir: impl AsRef<Path>, file_name: &str) -> SinkResult<Self> {
        Self::open(log_dir.as_ref().join(file_name))
    }

    /// Path of the event log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonLinesSink {
    fn record(&mut self, event: &PresenceEvent) -> SinkResult<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|source| SinkError::WriteError {
                path: self.path.clone(),
                source,
            })
    }
}

/// Sink that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Vec<PresenceEvent>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    #[must_use]
    pub fn events(&self) -> &[PresenceEvent] {
        &self.events
    }
}

impl EventSink for MemorySink {
    fn record(&mut self, event: &PresenceEvent) -> SinkResult<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PresenceStatus, Signal};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn event(address: &str, status: PresenceStatus) -> PresenceEvent {
        PresenceEvent {
            address: address.to_string(),
            name: String::new(),
            rssi: Signal::Unknown,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 3, 30, 0).unwrap(),
            status,
        }
    }

    #[test]
    fn test_writes_one_json_object_per_line() {
        let dir = TempDir::new().unwrap();
        let mut sink = JsonLinesSink::in_dir(dir.path(), DEFAULT_EVENTS_FILE).unwrap();

        sink.record(&event("AA", PresenceStatus::Found)).unwrap();
        sink.record(&event("AA", PresenceStatus::Lost)).unwrap();

        let content = std::fs::read_to_string(dir.path().join("devices.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            r#"{"address":"AA","name":"","rssi":"N/A","timestamp":"2025-01-15 03:30:00","status":"FOUND"}"#
        );
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["status"], "LOST");
    }

    #[test]
    fn test_appends_to_existing_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "previous\n").unwrap();

        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.record(&event("BB", PresenceStatus::Found)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous\n"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_open_in_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let err = JsonLinesSink::in_dir(dir.path().join("missing"), DEFAULT_EVENTS_FILE).unwrap_err();
        assert!(matches!(err, SinkError::OpenError { .. }));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.record(&event("AA", PresenceStatus::Found)).unwrap();
        sink.record(&event("BB", PresenceStatus::Found)).unwrap();

        let addresses: Vec<&str> = sink.events().iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["AA", "BB"]);
    }
}
