//! Message history tracking for debugging and diagnostics.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type of message in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// A command written to the device
    Send,
    /// A result read from the device
    Receive,
    /// An unsolicited props notification
    Push,
}

/// A recorded message in the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub msg_type: MessageType,
    pub method: String,
    pub message: Value,
    /// Seconds since history creation
    pub timestamp: f64,
}

/// Tracks message history for debugging.
#[derive(Debug, Clone)]
pub struct MessageHistory {
    counts: HashMap<MessageType, usize>,
    last_error: Option<String>,
    start_time: Instant,
    entries: Vec<HistoryEntry>,
    max_entries: usize,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHistory {
    pub const DEFAULT_MAX_ENTRIES: usize = 100;

    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            last_error: None,
            start_time: Instant::now(),
            entries: Vec::new(),
            max_entries: Self::DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Self::new()
        }
    }

    pub fn record(&mut self, msg_type: MessageType, method: &str, message: Value) {
        *self.counts.entry(msg_type).or_default() += 1;

        self.entries.push(HistoryEntry {
            msg_type,
            method: method.to_string(),
            message,
            timestamp: self.start_time.elapsed().as_secs_f64(),
        });

        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.entries.clear();
        self.last_error = None;
    }

    pub fn summary(&self) -> HistorySummary {
        let count = |t: MessageType| self.counts.get(&t).copied().unwrap_or(0);
        HistorySummary {
            send_count: count(MessageType::Send),
            receive_count: count(MessageType::Receive),
            push_count: count(MessageType::Push),
            total_entries: self.entries.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Summary of message history for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySummary {
    pub send_count: usize,
    pub receive_count: usize,
    pub push_count: usize,
    pub total_entries: usize,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_message() {
        let mut history = MessageHistory::new();
        history.record(
            MessageType::Send,
            "toggle",
            json!({"id": 1, "method": "toggle", "params": []}),
        );

        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].method, "toggle");
    }

    #[test]
    fn test_record_error() {
        let mut history = MessageHistory::new();
        history.record_error("Connection reset");
        assert_eq!(history.last_error(), Some("Connection reset"));
    }

    #[test]
    fn test_max_entries() {
        let mut history = MessageHistory::with_max_entries(2);
        for i in 0..5 {
            history.record(MessageType::Push, "props", json!({"params": {"hue": i}}));
        }
        assert_eq!(history.len(), 2);
        // Counts keep growing past the retained window.
        assert_eq!(history.summary().push_count, 5);
    }

    #[test]
    fn test_clear() {
        let mut history = MessageHistory::new();
        history.record(MessageType::Receive, "result", json!({"id": 1}));
        history.record_error("boom");
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.summary().receive_count, 0);
        assert_eq!(history.last_error(), None);
    }
}
