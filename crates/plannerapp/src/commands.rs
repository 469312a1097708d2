//! # Structured Returns
//!
//! Sync operations do no rendering. They return data plus [`SyncMessage`]s with a
//! level, and the UI decides how to show them (toast, banner, stderr line).
//!
//! Write-path failures are never silent: every failed create or edit produces a
//! message. Read-path failures degrade to [`LoadOutcome::Degraded`] and at most an
//! info-level note.

use serde::Serialize;

use crate::model::RecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncMessage {
    pub level: MessageLevel,
    pub content: String,
    /// The record the message is about, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
}

impl SyncMessage {
    fn new(level: MessageLevel, content: impl Into<String>) -> Self {
        Self {
            level,
            content: content.into(),
            record_id: None,
        }
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, content)
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::new(MessageLevel::Success, content)
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, content)
    }

    pub fn for_record(mut self, id: &RecordId) -> Self {
        self.record_id = Some(id.clone());
        self
    }
}

/// Where the visible records of a load came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Served from a fresh cache entry; no request was made.
    Cache,
    /// Fetched from the Data Store and reconciled.
    Remote,
    /// The fetch failed; whatever was visible before stays visible.
    Degraded,
    /// The response arrived after the surface moved on and was dropped.
    Discarded,
    /// There was no further page to load.
    Exhausted,
}

/// What one dispatch of pending edits did.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    /// Requests sent, retries included.
    pub requests: usize,
    pub confirmed: Vec<RecordId>,
    pub failed: Vec<RecordId>,
    pub messages: Vec<SyncMessage>,
}

impl SyncReport {
    pub fn add_message(&mut self, message: SyncMessage) {
        self.messages.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold a later report into this one.
    pub fn absorb(&mut self, other: SyncReport) {
        self.requests += other.requests;
        self.confirmed.extend(other.confirmed);
        self.failed.extend(other.failed);
        self.messages.extend(other.messages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_level_lowercase() {
        let message = SyncMessage::warning("Saved locally").for_record(&RecordId::new("tmp-1"));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["record_id"], "tmp-1");

        let plain = serde_json::to_value(SyncMessage::info("hi")).unwrap();
        assert!(plain.get("record_id").is_none());
    }

    #[test]
    fn test_report_absorb() {
        let mut first = SyncReport {
            requests: 1,
            confirmed: vec![RecordId::new("1")],
            ..Default::default()
        };
        let mut second = SyncReport {
            requests: 2,
            failed: vec![RecordId::new("2")],
            ..Default::default()
        };
        second.add_message(SyncMessage::error("boom"));
        first.absorb(second);
        assert_eq!(first.requests, 3);
        assert!(!first.is_clean());
        assert_eq!(first.messages.len(), 1);
    }
}
