//! Completeness reports
//!
//! One [`CompletenessReport`] per processed record, built from the mapped
//! record, its mapping summary and its validation report. A batch folds its
//! reports into a [`BatchSummary`].

use crate::record::MetadataRecord;
use crate::registry::MappingSummary;
use crate::schema::FieldSchema;
use crate::types::{Provenance, Severity};
use crate::validators::{AutoCorrection, ValidationReport, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use uuid::Uuid;

/// Fields listed inline in a recommendation before eliding
const MAX_LISTED_FIELDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub record_id: Uuid,
    pub title: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Fields holding a value other than the null-valid marker
    pub populated: usize,
    pub total: usize,
    pub by_provenance: BTreeMap<Provenance, usize>,
    pub fallback_fields: Vec<String>,
    pub generative_failures: Vec<String>,
    pub completion_calls: u32,
    /// Failed validation results, most severe first
    pub flagged: Vec<ValidationResult>,
    pub corrections: Vec<AutoCorrection>,
    pub recommendations: Vec<String>,
    pub export_ready: bool,
    pub elapsed_ms: u64,
}

impl CompletenessReport {
    /// Build the report for a mapped and validated record
    ///
    /// `layer_label` names the most specific configuration layer (usually the
    /// imprint) in recommendations.
    pub fn build(
        record: &MetadataRecord,
        schema: &FieldSchema,
        summary: &MappingSummary,
        validation: &ValidationReport,
        layer_label: Option<&str>,
    ) -> Self {
        let mut by_provenance = BTreeMap::new();
        let mut populated = 0;
        let mut fallback_fields = Vec::new();

        for spec in schema.fields() {
            let Some(entry) = record.entry(&spec.name) else {
                continue;
            };
            *by_provenance.entry(entry.provenance).or_insert(0) += 1;
            if !entry.value.is_null_valid() && !entry.value.is_empty() {
                populated += 1;
            }
            if entry.provenance == Provenance::Fallback {
                fallback_fields.push(spec.name.clone());
            }
        }

        let flagged: Vec<ValidationResult> = validation.failures().into_iter().cloned().collect();
        let recommendations = recommend(
            &fallback_fields,
            &summary.generative_failures,
            &flagged,
            layer_label,
        );

        Self {
            record_id: record.id(),
            title: record.text("title"),
            generated_at: Utc::now(),
            populated,
            total: schema.len(),
            by_provenance,
            fallback_fields,
            generative_failures: summary.generative_failures.clone(),
            completion_calls: summary.completion_calls,
            flagged,
            corrections: validation.corrections().to_vec(),
            recommendations,
            export_ready: validation.is_export_ready(),
            elapsed_ms: summary.elapsed_ms,
        }
    }

    /// Populated share of the schema, 0-100
    pub fn completeness_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.populated as f64 * 100.0 / self.total as f64
    }

    pub fn provenance_count(&self, provenance: Provenance) -> usize {
        self.by_provenance.get(&provenance).copied().unwrap_or(0)
    }

    pub fn flagged_with_severity(&self, severity: Severity) -> usize {
        self.flagged.iter().filter(|r| r.severity == severity).count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Record {} {}",
            self.record_id,
            self.title.as_deref().map(|t| format!("\"{}\"", t)).unwrap_or_default()
        );
        let _ = writeln!(
            out,
            "Completeness: {}/{} fields ({:.1}%)",
            self.populated,
            self.total,
            self.completeness_percent()
        );
        let _ = writeln!(
            out,
            "Export ready: {}",
            if self.export_ready { "yes" } else { "NO" }
        );

        out.push_str("\nProvenance:\n");
        for (provenance, count) in &self.by_provenance {
            let _ = writeln!(out, "  {:<14} {}", provenance.as_str(), count);
        }

        if !self.fallback_fields.is_empty() {
            let _ = writeln!(out, "\nFallback fields: {}", self.fallback_fields.join(", "));
        }
        if !self.generative_failures.is_empty() {
            let _ = writeln!(
                out,
                "Generative failures: {}",
                self.generative_failures.join(", ")
            );
        }

        if !self.flagged.is_empty() {
            out.push_str("\nFlagged:\n");
            for result in &self.flagged {
                let _ = write!(
                    out,
                    "  [{}] {} ({}): {}",
                    result.severity, result.field, result.rule, result.message
                );
                if let Some(suggestion) = &result.suggested_value {
                    let _ = write!(out, " -> suggest '{}'", suggestion.render());
                }
                out.push('\n');
            }
        }

        if !self.corrections.is_empty() {
            out.push_str("\nAuto-corrected:\n");
            for c in &self.corrections {
                let _ = writeln!(
                    out,
                    "  {}: '{}' -> '{}' ({})",
                    c.field,
                    c.from.render(),
                    c.to.render(),
                    c.rule
                );
            }
        }

        if !self.recommendations.is_empty() {
            out.push_str("\nRecommendations:\n");
            for r in &self.recommendations {
                let _ = writeln!(out, "  - {}", r);
            }
        }
        out
    }
}

fn list_fields(fields: &[String]) -> String {
    if fields.len() <= MAX_LISTED_FIELDS {
        return fields.join(", ");
    }
    format!(
        "{} and {} more",
        fields[..MAX_LISTED_FIELDS].join(", "),
        fields.len() - MAX_LISTED_FIELDS
    )
}

fn recommend(
    fallback_fields: &[String],
    generative_failures: &[String],
    flagged: &[ValidationResult],
    layer_label: Option<&str>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    let blocking: Vec<String> = flagged
        .iter()
        .filter(|r| r.is_blocking())
        .map(|r| r.field.clone())
        .collect();
    if !blocking.is_empty() {
        recommendations.push(format!(
            "Resolve {} critical failure(s) before export: {}",
            blocking.len(),
            list_fields(&blocking)
        ));
    }

    if !fallback_fields.is_empty() {
        let target = match layer_label {
            Some(label) => format!(" for {}", label),
            None => String::new(),
        };
        recommendations.push(format!(
            "{} field(s) used synthesized fallbacks; consider adding explicit defaults{}: {}",
            fallback_fields.len(),
            target,
            list_fields(fallback_fields)
        ));
    }

    if !generative_failures.is_empty() {
        recommendations.push(format!(
            "Generative completion failed for {}; check provider availability or supply the text directly",
            list_fields(generative_failures)
        ));
    }

    let suggestible = flagged.iter().filter(|r| r.suggested_value.is_some()).count();
    if suggestible > 0 {
        recommendations.push(format!(
            "{} flagged value(s) have suggested corrections; review them or enable auto-correct",
            suggestible
        ));
    }

    recommendations
}

/// Aggregate of one batch's reports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub records: usize,
    pub export_ready: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub by_provenance: BTreeMap<Provenance, usize>,
    pub critical_failures: usize,
    pub generative_failures: usize,
    pub completion_calls: u32,
    /// Fields that fell back in more than one record, with their counts
    pub recurring_fallbacks: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn add(&mut self, report: &CompletenessReport) {
        self.records += 1;
        if report.export_ready {
            self.export_ready += 1;
        }
        for (provenance, count) in &report.by_provenance {
            *self.by_provenance.entry(*provenance).or_insert(0) += count;
        }
        self.critical_failures += report.flagged_with_severity(Severity::Critical);
        self.generative_failures += report.generative_failures.len();
        self.completion_calls += report.completion_calls;
        for field in &report.fallback_fields {
            *self.recurring_fallbacks.entry(field.clone()).or_insert(0) += 1;
        }
    }

    pub fn add_cancelled(&mut self) {
        self.cancelled += 1;
    }

    pub fn add_failed(&mut self) {
        self.failed += 1;
    }

    /// Drop single-occurrence fallbacks once the batch is complete
    pub fn finish(&mut self, elapsed_ms: u64) {
        self.recurring_fallbacks.retain(|_, count| *count > 1);
        self.elapsed_ms = elapsed_ms;
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Batch: {} record(s), {} export-ready, {} cancelled, {} failed ({} ms)",
            self.records, self.export_ready, self.cancelled, self.failed, self.elapsed_ms
        );
        let _ = writeln!(
            out,
            "Critical failures: {}, generative failures: {}, provider calls: {}",
            self.critical_failures, self.generative_failures, self.completion_calls
        );
        for (provenance, count) in &self.by_provenance {
            let _ = writeln!(out, "  {:<14} {}", provenance.as_str(), count);
        }
        if !self.recurring_fallbacks.is_empty() {
            out.push_str("Recurring fallbacks:\n");
            for (field, count) in &self.recurring_fallbacks {
                let _ = writeln!(out, "  {} ({} records)", field, count);
            }
        }
        out
    }
}
