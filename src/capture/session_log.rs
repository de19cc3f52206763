use std::collections::VecDeque;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LOG_CAPACITY: usize = 15;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionEvent {
    pub plate_text: String,
    /// Local wall-clock time, `HH:MM:SS`.
    pub timestamp: String,
    pub matched: bool,
    pub severity: Severity,
}

impl RecognitionEvent {
    pub fn sighting(plate_text: impl Into<String>, matched: bool, at: DateTime<Local>) -> Self {
        Self {
            plate_text: plate_text.into(),
            timestamp: format_time(at),
            matched,
            severity: if matched {
                Severity::Success
            } else {
                Severity::Info
            },
        }
    }

    pub fn signal_loss(at: DateTime<Local>) -> Self {
        Self {
            plate_text: "signal loss".into(),
            timestamp: format_time(at),
            matched: false,
            severity: Severity::Error,
        }
    }
}

fn format_time(at: DateTime<Local>) -> String {
    at.format("%H:%M:%S").to_string()
}

/// Most-recent-first ring of recognition events.
#[derive(Debug, Clone)]
pub struct SessionLog {
    entries: VecDeque<RecognitionEvent>,
    capacity: usize,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl SessionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: RecognitionEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    pub fn entries(&self) -> Vec<RecognitionEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
