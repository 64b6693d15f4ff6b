//! Structured event log
//!
//! Every mapping decision, computation fall-through, completion attempt and
//! validation result is appended here with a kind and a severity. The log is
//! append-only and shareable across concurrent completions; each event is
//! mirrored to `tracing` at the matching level.
//!
//! Verbosity decides which events reach the durable session log:
//! - **minimal**: warning and above, plus major decisions
//! - **normal**: everything except computation fall-throughs and timings
//! - **detailed**: everything

use crate::types::Severity;
use bookfeed_common::config::Verbosity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MappingDecision,
    ComputationFallthrough,
    CompletionAttempt,
    CompletionFailure,
    Validation,
    AutoCorrection,
    Performance,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MappingDecision => "mapping_decision",
            EventKind::ComputationFallthrough => "computation_fallthrough",
            EventKind::CompletionAttempt => "completion_attempt",
            EventKind::CompletionFailure => "completion_failure",
            EventKind::Validation => "validation",
            EventKind::AutoCorrection => "auto_correction",
            EventKind::Performance => "performance",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logged event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub record_id: Option<Uuid>,
    pub kind: EventKind,
    pub severity: Severity,
    pub field: Option<String>,
    pub message: String,
    /// Decisions an operator should see even at minimal verbosity
    pub major: bool,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl LogEvent {
    pub fn new(kind: EventKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            record_id: None,
            kind,
            severity,
            field: None,
            message: message.into(),
            major: false,
            details: serde_json::Value::Null,
        }
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn major(mut self) -> Self {
        self.major = true;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Whether this event is kept at a verbosity level
    pub fn retained_at(&self, verbosity: Verbosity) -> bool {
        match verbosity {
            Verbosity::Detailed => true,
            Verbosity::Normal => !matches!(
                self.kind,
                EventKind::ComputationFallthrough | EventKind::Performance
            ) || self.severity >= Severity::Warning,
            Verbosity::Minimal => self.major || self.severity >= Severity::Warning,
        }
    }
}

/// Append-only event log for one record
#[derive(Debug, Default)]
pub struct EventLog {
    record_id: Option<Uuid>,
    events: Mutex<Vec<LogEvent>>,
}

impl EventLog {
    pub fn new(record_id: Uuid) -> Self {
        Self {
            record_id: Some(record_id),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Log not tied to a record (batch-level events)
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn record_id(&self) -> Option<Uuid> {
        self.record_id
    }

    pub fn record(&self, mut event: LogEvent) {
        if event.record_id.is_none() {
            event.record_id = self.record_id;
        }
        mirror_to_tracing(&event);
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }

    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events kept at a verbosity level, in order
    pub fn retained(&self, verbosity: Verbosity) -> Vec<LogEvent> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.retained_at(verbosity))
            .collect()
    }

    pub fn count_by_kind(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for event in self
            .events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
        {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.count_by_kind().get(&kind).copied().unwrap_or(0)
    }
}

fn mirror_to_tracing(event: &LogEvent) {
    let field = event.field.as_deref().unwrap_or("-");
    let kind = event.kind.as_str();
    match event.severity {
        Severity::Critical | Severity::Error => {
            error!(kind, field, severity = %event.severity, "{}", event.message)
        }
        Severity::Warning => warn!(kind, field, "{}", event.message),
        Severity::Info if event.major => info!(kind, field, "{}", event.message),
        Severity::Info => debug!(kind, field, "{}", event.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated_log() -> EventLog {
        let log = EventLog::new(Uuid::new_v4());
        log.record(
            LogEvent::new(EventKind::MappingDecision, Severity::Info, "passthrough")
                .field("title"),
        );
        log.record(
            LogEvent::new(EventKind::MappingDecision, Severity::Info, "override applied")
                .field("contributor_bio")
                .major(),
        );
        log.record(LogEvent::new(
            EventKind::ComputationFallthrough,
            Severity::Info,
            "missing page_count",
        ));
        log.record(LogEvent::new(
            EventKind::CompletionAttempt,
            Severity::Warning,
            "rate limited",
        ));
        log.record(LogEvent::new(EventKind::Performance, Severity::Info, "12ms"));
        log
    }

    #[test]
    fn test_verbosity_filtering() {
        let log = populated_log();
        assert_eq!(log.retained(Verbosity::Detailed).len(), 5);
        assert_eq!(log.retained(Verbosity::Normal).len(), 3);

        let minimal = log.retained(Verbosity::Minimal);
        assert_eq!(minimal.len(), 2);
        assert!(minimal.iter().all(|e| e.major || e.severity >= Severity::Warning));
    }

    #[test]
    fn test_record_id_stamped() {
        let id = Uuid::new_v4();
        let log = EventLog::new(id);
        log.record(LogEvent::new(EventKind::Error, Severity::Error, "boom"));
        assert_eq!(log.snapshot()[0].record_id, Some(id));
    }

    #[test]
    fn test_counts_by_kind() {
        let log = populated_log();
        assert_eq!(log.count(EventKind::MappingDecision), 2);
        assert_eq!(log.count(EventKind::AutoCorrection), 0);
    }

    #[test]
    fn test_event_serializes_without_null_details() {
        let event = LogEvent::new(EventKind::Validation, Severity::Critical, "bad code");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["severity"], "critical");
        assert!(json.get("details").is_none());
    }
}
