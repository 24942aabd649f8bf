//! # Storage Module - Append-Only Message Log
//!
//! The received-message log is a plain UTF-8 text file, one [`LogEntry`] per line:
//!
//! ```text
//! message: <text> | sent_at: <RFC 3339 or n/a> | received_at: <RFC 3339> | delay_s: <seconds or n/a>
//! ```
//!
//! Lines are only ever appended; nothing in this crate rewrites or truncates the log.
//! The mapper (`crate::mapper`) is the consumer of this format.
//!
//! A second, optional file receives a JSON-lines trace of every distinct packet seen
//! ([`TraceSink`]), before any filtering happens.
//!
//! ```rust,no_run
//! use meshtrack::storage::{LogEntry, LogStore};
//! use chrono::Utc;
//!
//! # fn demo() -> Result<(), meshtrack::storage::StorageError> {
//! let mut store = LogStore::new("meshtastic_messages.log");
//! store.append(&LogEntry::unsent("hello", Utc::now()))?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Literal written for an unknown `sent_at` or `delay_s`.
pub const NOT_AVAILABLE: &str = "n/a";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to append to {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize trace record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One line of the message log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub message: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub delay_s: Option<f64>,
}

impl LogEntry {
    /// Entry with no recoverable send time.
    pub fn unsent(message: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            sent_at: None,
            received_at,
            delay_s: None,
        }
    }
}

fn iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Embedded line breaks would split one entry across several log lines.
        let message: String = self
            .message
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let sent = self.sent_at.as_ref().map_or_else(|| NOT_AVAILABLE.to_string(), iso);
        let delay = self
            .delay_s
            .map_or_else(|| NOT_AVAILABLE.to_string(), |d| format!("{:.3}", d));
        write!(
            f,
            "message: {} | sent_at: {} | received_at: {} | delay_s: {}",
            message,
            sent,
            iso(&self.received_at),
            delay
        )
    }
}

/// Append `text` to `path` followed by exactly one newline.
///
/// Parent directories are created as needed. Trailing newlines already present in
/// `text` are collapsed so each call adds exactly one line.
pub fn append_line(path: &Path, text: &str) -> Result<(), StorageError> {
    let wrap = |source| StorageError::Append {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(wrap)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(wrap)?;
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text.trim_end_matches(['\n', '\r']));
    line.push('\n');
    file.write_all(line.as_bytes()).map_err(wrap)?;
    file.flush().map_err(wrap)
}

/// `path` with `.txt` added when it has no extension.
pub fn with_default_suffix(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.extension().is_some() {
        path
    } else {
        let mut s = path.into_os_string();
        s.push(".txt");
        PathBuf::from(s)
    }
}

/// The durable message log.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    written: u64,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries appended through this handle since it was opened.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn append(&mut self, entry: &LogEntry) -> Result<(), StorageError> {
        append_line(&self.path, &entry.to_string())?;
        self.written += 1;
        Ok(())
    }
}

/// JSON-lines diagnostic trace of raw packets.
#[derive(Debug)]
pub struct TraceSink {
    path: PathBuf,
}

impl TraceSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record<T: Serialize + ?Sized>(&self, record: &T) -> Result<(), StorageError> {
        let line = serde_json::to_string(record)?;
        append_line(&self.path, &line)
    }
}
