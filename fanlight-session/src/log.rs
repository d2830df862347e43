//! Bounded, timestamped session log for observers

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;

/// Entries kept before the oldest are dropped
pub const LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Send,
    Receive,
    Error,
    Info,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Send => "TX",
            Self::Receive => "RX",
            Self::Error => "ERR",
            Self::Info => "INFO",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub kind: LogKind,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self
            .timestamp
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        write!(f, "[{secs:.3}] {:<4} {}", self.kind, self.message)
    }
}

/// Append-only log shared between the controller and its heartbeat task
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: LogKind, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() == LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            timestamp: SystemTime::now(),
            kind,
            message: message.into(),
        });
    }

    pub fn send(&self, message: impl Into<String>) {
        self.push(LogKind::Send, message);
    }

    pub fn receive(&self, message: impl Into<String>) {
        self.push(LogKind::Receive, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.push(LogKind::Error, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(LogKind::Info, message);
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
