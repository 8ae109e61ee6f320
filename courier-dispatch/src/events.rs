//! Append-only audit trail of dispatch events
//!
//! Every line the engine records is kept for the lifetime of the engine and
//! mirrored to `tracing` at INFO. Entries from one dispatch appear in the
//! order that dispatch produced them; lines from concurrent dispatches may
//! interleave.

use std::{fmt, sync::Arc, time::SystemTime};

use chrono::{DateTime, SecondsFormat, Utc};
use courier_common::{Clock, tracing};
use parking_lot::Mutex;

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl LogEntry {
    #[must_use]
    pub fn new(timestamp: SystemTime, text: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            text: text.into(),
        }
    }
}

/// Formats as `[2026-10-18T12:00:00.000Z] text`
impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.text
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Debug)]
pub struct EventSink {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<LogEntry>>,
}

impl EventSink {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append `text`, stamped with the clock's wall time
    pub fn record(&self, text: impl Into<String>) {
        let entry = LogEntry::new(self.clock.now_system(), text);
        tracing::info!("{}", entry.text);
        self.entries.lock().push(entry);
    }

    /// Just the text of every entry so far
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.text.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// All entries, formatted and joined with newlines
    pub fn dump(&self) -> String {
        self.entries
            .lock()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
