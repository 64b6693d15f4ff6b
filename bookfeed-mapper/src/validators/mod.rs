//! Record validation
//!
//! Runs after mapping and produces severity-tagged results.
//!
//! # Validators
//! 1. **field_rules**: completeness, kind, pattern, vocabulary and length per field
//! 2. **consistency_validator**: cross-field checks (prices, dates, spine, ISBN pair)
//!
//! # Export readiness
//! A failed rule of `critical` severity (only raised for hard-required
//! fields) marks the record not export-ready. Errors, warnings and info
//! results are reported but never block export.
//!
//! # Auto-correct
//! When enabled, the first suggestion for each failing field replaces its
//! value (provenance kept, `auto_corrected` set) and the record is validated
//! once more. The second pass never corrects, so a field is changed at most
//! once per run.

pub mod consistency_validator;
pub mod field_rules;

pub use consistency_validator::ConsistencyValidator;

use crate::error::MapperResult;
use crate::layers::ComputationSettings;
use crate::record::MetadataRecord;
use crate::reporting::event_log::{EventKind, EventLog, LogEvent};
use crate::schema::FieldSchema;
use crate::types::{FieldValue, Severity};
use bookfeed_common::config::ValidationConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of one rule on one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub field: String,
    pub rule: String,
    pub is_valid: bool,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<FieldValue>,
}

impl ValidationResult {
    pub fn pass(field: &str, rule: &str) -> Self {
        Self {
            field: field.to_string(),
            rule: rule.to_string(),
            is_valid: true,
            severity: Severity::Info,
            message: "ok".to_string(),
            suggested_value: None,
        }
    }

    pub fn fail(field: &str, rule: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            rule: rule.to_string(),
            is_valid: false,
            severity,
            message: message.into(),
            suggested_value: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_suggestion(mut self, value: FieldValue) -> Self {
        self.suggested_value = Some(value);
        self
    }

    /// Failed with `critical` severity
    pub fn is_blocking(&self) -> bool {
        !self.is_valid && self.severity == Severity::Critical
    }
}

/// Value replaced by a validator suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoCorrection {
    pub field: String,
    pub rule: String,
    pub from: FieldValue,
    pub to: FieldValue,
}

/// Results of the validation pass for one record
///
/// Built once by [`Validator::validate`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    record_id: Uuid,
    results: Vec<ValidationResult>,
    corrections: Vec<AutoCorrection>,
    export_ready: bool,
}

impl ValidationReport {
    fn new(record_id: Uuid, results: Vec<ValidationResult>, corrections: Vec<AutoCorrection>) -> Self {
        let export_ready = !results.iter().any(ValidationResult::is_blocking);
        Self {
            record_id,
            results,
            corrections,
            export_ready,
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn results(&self) -> &[ValidationResult] {
        &self.results
    }

    pub fn corrections(&self) -> &[AutoCorrection] {
        &self.corrections
    }

    pub fn is_export_ready(&self) -> bool {
        self.export_ready
    }

    /// Failed results, most severe first
    pub fn failures(&self) -> Vec<&ValidationResult> {
        let mut failures: Vec<&ValidationResult> =
            self.results.iter().filter(|r| !r.is_valid).collect();
        failures.sort_by(|a, b| b.severity.cmp(&a.severity));
        failures
    }

    /// Failures that block export
    pub fn blocking(&self) -> Vec<&ValidationResult> {
        self.results.iter().filter(|r| r.is_blocking()).collect()
    }

    pub fn results_for(&self, field: &str) -> Vec<&ValidationResult> {
        self.results.iter().filter(|r| r.field == field).collect()
    }

    /// Failure count per severity
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for result in self.results.iter().filter(|r| !r.is_valid) {
            *counts.entry(result.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.severity_counts().get(&severity).copied().unwrap_or(0)
    }
}

/// Applies the schema's field rules and the cross-field checks
pub struct Validator {
    schema: Arc<FieldSchema>,
    computation: ComputationSettings,
    config: ValidationConfig,
}

impl Validator {
    pub fn new(schema: Arc<FieldSchema>, computation: ComputationSettings, config: ValidationConfig) -> Self {
        Self {
            schema,
            computation,
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a mapped record
    ///
    /// Values change only in auto-correct mode.
    pub fn validate(&self, record: &mut MetadataRecord, events: &EventLog) -> MapperResult<ValidationReport> {
        let mut results = self.check_all(record);
        let mut corrections = Vec::new();

        if self.config.auto_correct {
            let mut corrected: HashSet<String> = HashSet::new();
            for result in &results {
                let Some(suggestion) = result.suggested_value.as_ref().filter(|_| !result.is_valid) else {
                    continue;
                };
                if corrected.contains(&result.field) {
                    continue;
                }
                let Some(current) = record.value(&result.field).cloned() else {
                    continue;
                };
                if &current == suggestion {
                    continue;
                }

                record.apply_correction(&result.field, suggestion.clone())?;
                corrected.insert(result.field.clone());
                events.record(
                    LogEvent::new(
                        EventKind::AutoCorrection,
                        Severity::Warning,
                        format!(
                            "Auto-corrected '{}' to '{}' ({})",
                            current.render(),
                            suggestion.render(),
                            result.rule
                        ),
                    )
                    .field(result.field.clone())
                    .major(),
                );
                corrections.push(AutoCorrection {
                    field: result.field.clone(),
                    rule: result.rule.clone(),
                    from: current,
                    to: suggestion.clone(),
                });
            }

            if !corrections.is_empty() {
                debug!(corrections = corrections.len(), "Revalidating after auto-correction");
                results = self.check_all(record);
            }
        }

        for result in &results {
            let event = LogEvent::new(
                EventKind::Validation,
                if result.is_valid { Severity::Info } else { result.severity },
                format!("{}: {}", result.rule, result.message),
            )
            .field(result.field.clone());
            let event = match &result.suggested_value {
                Some(suggestion) => event.details(json!({ "suggested_value": suggestion.render() })),
                None => event,
            };
            events.record(event);
        }

        let report = ValidationReport::new(record.id(), results, corrections);
        events.record(
            LogEvent::new(
                EventKind::Validation,
                if report.is_export_ready() {
                    Severity::Info
                } else {
                    Severity::Critical
                },
                if report.is_export_ready() {
                    "Record is export-ready".to_string()
                } else {
                    format!(
                        "Record not export-ready: {} blocking failure(s)",
                        report.blocking().len()
                    )
                },
            )
            .major(),
        );
        info!(
            record_id = %record.id(),
            export_ready = report.is_export_ready(),
            failures = report.failures().len(),
            corrections = report.corrections().len(),
            "Record validated"
        );
        Ok(report)
    }

    fn check_all(&self, record: &MetadataRecord) -> Vec<ValidationResult> {
        let mut results: Vec<ValidationResult> = self
            .schema
            .fields()
            .iter()
            .flat_map(|spec| field_rules::check_field(spec, record.value(&spec.name), &self.schema, &self.config))
            .collect();
        results.extend(ConsistencyValidator::new(&self.computation, &self.config).check(record));
        results
    }
}
