//! Field mapping registry
//!
//! Decides, per schema field, where its value comes from. The strategy
//! table is built once from the schema and the computed-rule set and holds
//! no record state, so one registry serves every record of a run.
//!
//! # Resolution chain
//! Evaluated in this order for each field, stopping at the first success:
//! 1. **Passthrough**: the record already holds a non-empty value, unless an
//!    override of strictly higher precedence than the value's own is configured
//! 2. **Override**: a layer forces a value
//! 3. **Computed**: the field's rule derives a value from resolved fields
//! 4. **Generative**: subjective field and a provider is configured
//! 5. **Default**: a layer supplies a default
//! 6. **Fallback**: the schema's deterministic template, or null-valid
//!
//! Subjective fields reaching step 4 are collected during the sequential
//! pass and completed concurrently (bounded), against a snapshot of the
//! record; results are applied afterwards in resolution order. A field
//! whose completion exhausts takes its configured default if one exists and
//! its fallback otherwise, and is reported as a generative failure.
//!
//! # Example
//! ```rust,ignore
//! let registry = MappingRegistry::new(schema, layers, normalizer)?
//!     .with_completion(service, 4);
//! let events = EventLog::new(record.id());
//! let summary = registry.map_record(&mut record, Some(book_text), &events).await?;
//! ```

mod ordering;
pub mod summary;

pub use summary::{FieldDecision, MappingSummary};

use crate::completion::{AttemptRecorder, CompletionOutcome, CompletionService};
use crate::error::{MapperError, MapperResult};
use crate::layers::{ConfigResolver, LayerSet};
use crate::normalizer::FieldNameNormalizer;
use crate::record::MetadataRecord;
use crate::reporting::event_log::{EventKind, EventLog, LogEvent};
use crate::schema::{FieldSchema, FieldSpec};
use crate::strategies::fallback::fallback_value;
use crate::strategies::{builtin_rules, ComputedRule, MappingStrategy};
use crate::types::{FieldValue, Provenance, Severity};
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Strategies available to one field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStrategies {
    pub computed: Option<ComputedRule>,
    pub subjective: bool,
}

pub struct MappingRegistry {
    schema: Arc<FieldSchema>,
    layers: Arc<LayerSet>,
    normalizer: Arc<FieldNameNormalizer>,
    table: BTreeMap<String, FieldStrategies>,
    order: Vec<String>,
    completion: Option<Arc<CompletionService>>,
    max_concurrent: usize,
}

impl MappingRegistry {
    /// Build the strategy table for a schema
    ///
    /// Built-in computed rules are registered for the fields the schema
    /// declares; rules for fields outside the schema are skipped.
    pub fn new(
        schema: Arc<FieldSchema>,
        layers: Arc<LayerSet>,
        normalizer: Arc<FieldNameNormalizer>,
    ) -> MapperResult<Self> {
        if let Some(name) = schema.names().find(|n| normalizer.normalize(n) != *n) {
            return Err(MapperError::ConfigurationLoad(format!(
                "Schema field '{}' normalizes to '{}'; build the normalizer with the schema's canonical names",
                name,
                normalizer.normalize(name)
            )));
        }

        let mut table: BTreeMap<String, FieldStrategies> = schema
            .fields()
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    FieldStrategies {
                        computed: None,
                        subjective: spec.subjective,
                    },
                )
            })
            .collect();

        for (field, rule) in builtin_rules(layers.computation()) {
            match table.get_mut(&field) {
                Some(strategies) => strategies.computed = Some(rule),
                None => debug!(field = %field, "Computed rule has no schema column, skipped"),
            }
        }

        let order = ordering::resolution_order(&schema, &table)?;
        info!(
            fields = order.len(),
            computed = table.values().filter(|s| s.computed.is_some()).count(),
            subjective = table.values().filter(|s| s.subjective).count(),
            "Mapping registry built"
        );

        Ok(Self {
            schema,
            layers,
            normalizer,
            table,
            order,
            completion: None,
            max_concurrent: 4,
        })
    }

    /// Enable generative completion with a concurrency bound
    pub fn with_completion(mut self, service: Arc<CompletionService>, max_concurrent: usize) -> Self {
        self.completion = Some(service);
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Register (or replace) the computed rule for a field
    ///
    /// Registering the same rule twice leaves the table unchanged.
    pub fn register_computed(&mut self, field: &str, rule: ComputedRule) -> MapperResult<()> {
        let field = self.normalizer.normalize(field);
        let Some(current) = self.table.get(&field) else {
            return Err(MapperError::InvalidInput(format!(
                "Cannot register a rule for '{}': not a schema field",
                field
            )));
        };
        if current.computed.as_ref() == Some(&rule) {
            return Ok(());
        }

        let mut table = self.table.clone();
        if let Some(strategies) = table.get_mut(&field) {
            if let Some(previous) = strategies.computed.replace(rule.clone()) {
                warn!(field = %field, previous = %previous, rule = %rule, "Computed rule replaced");
            }
        }
        self.order = ordering::resolution_order(&self.schema, &table)?;
        self.table = table;
        Ok(())
    }

    pub fn strategies_for(&self, field: &str) -> Option<&FieldStrategies> {
        self.table.get(field)
    }

    /// Field order used by `map_record`
    pub fn resolution_order(&self) -> &[String] {
        &self.order
    }

    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    pub fn layers(&self) -> &Arc<LayerSet> {
        &self.layers
    }

    pub fn normalizer(&self) -> &Arc<FieldNameNormalizer> {
        &self.normalizer
    }

    pub fn completion(&self) -> Option<&Arc<CompletionService>> {
        self.completion.as_ref()
    }

    /// Resolve every schema field of a record
    ///
    /// Fails only when the record is sealed or the provider proved
    /// unreachable for the whole run; every per-field problem falls through
    /// the chain.
    pub async fn map_record(
        &self,
        record: &mut MetadataRecord,
        context: Option<&str>,
        events: &EventLog,
    ) -> MapperResult<MappingSummary> {
        let started = Instant::now();
        let mut summary = MappingSummary {
            record_id: Some(record.id()),
            ..Default::default()
        };

        summary.discarded_inputs = record.canonicalize(&self.normalizer)?;
        for name in &summary.discarded_inputs {
            events.record(
                LogEvent::new(
                    EventKind::MappingDecision,
                    Severity::Warning,
                    format!("Input '{}' duplicates another spelling of the same field and was ignored", name),
                )
                .field(name.clone()),
            );
        }

        let resolver = self.layers.resolver();
        let mut pending: Vec<(usize, &FieldSpec)> = Vec::new();

        for field in &self.order {
            let Some(spec) = self.schema.get(field) else {
                continue;
            };
            let strategy = self.resolve_field(spec, record, &resolver, events)?;
            if strategy == MappingStrategy::Generative {
                pending.push((summary.decisions.len(), spec));
            }
            summary.decisions.push(FieldDecision {
                field: field.clone(),
                strategy,
            });
        }

        if let (Some(service), false) = (&self.completion, pending.is_empty()) {
            let outcomes = self
                .complete_pending(service, &pending, record, context, events)
                .await;

            for ((index, spec), (outcome, recorder)) in pending.iter().zip(outcomes) {
                // Attempts land on the record before the value is chosen
                record.append_attempts(&spec.name, recorder.drain())?;
                summary.completion_calls += outcome.attempts;

                let strategy = match outcome.value {
                    Some(value) => {
                        let value = coerce(spec, value);
                        record.assign(&spec.name, value, Provenance::LlmCompleted, None)?;
                        events.record(
                            LogEvent::new(
                                EventKind::MappingDecision,
                                Severity::Info,
                                format!("Generated after {} attempt(s)", outcome.attempts),
                            )
                            .field(spec.name.clone())
                            .major(),
                        );
                        MappingStrategy::Generative
                    }
                    None => {
                        summary.generative_failures.push(spec.name.clone());
                        self.default_or_fallback(spec, record, &resolver, events)?
                    }
                };
                summary.decisions[*index].strategy = strategy;
            }

            service.health().check(service.provider_name())?;
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        events.record(
            LogEvent::new(
                EventKind::Performance,
                Severity::Info,
                format!("Mapped {} fields in {} ms", summary.decisions.len(), summary.elapsed_ms),
            )
            .details(json!({
                "fields": summary.decisions.len(),
                "completion_calls": summary.completion_calls,
                "elapsed_ms": summary.elapsed_ms,
            })),
        );
        debug!(
            record_id = %record.id(),
            fields = summary.decisions.len(),
            generative_failures = summary.generative_failures.len(),
            elapsed_ms = summary.elapsed_ms,
            "Record mapped"
        );
        Ok(summary)
    }

    /// Steps 1 to 3, deferring subjective fields
    fn resolve_field(
        &self,
        spec: &FieldSpec,
        record: &mut MetadataRecord,
        resolver: &ConfigResolver<'_>,
        events: &EventLog,
    ) -> MapperResult<MappingStrategy> {
        let field = spec.name.as_str();
        let forced = resolver.resolve_override(field);

        // 1. Passthrough
        if let Some(entry) = record.entry(field).filter(|e| !e.value.is_empty()) {
            let outranked = forced
                .as_ref()
                .is_some_and(|o| o.scope.rank() > entry.override_rank());
            if !outranked {
                let coerced = coerce(spec, entry.value.clone());
                if coerced != entry.value {
                    record.retype(field, coerced)?;
                }
                events.record(
                    LogEvent::new(EventKind::MappingDecision, Severity::Info, "Existing value kept")
                        .field(field),
                );
                return Ok(MappingStrategy::Passthrough);
            }
        }

        // 2. Override
        if let Some(resolution) = forced {
            record.assign(
                field,
                coerce(spec, resolution.value),
                Provenance::Override,
                Some(resolution.scope),
            )?;
            events.record(
                LogEvent::new(
                    EventKind::MappingDecision,
                    Severity::Info,
                    format!("Override from {} layer applied", resolution.scope),
                )
                .field(field)
                .major(),
            );
            return Ok(MappingStrategy::Override {
                scope: resolution.scope,
            });
        }

        // 3. Computed
        if let Some(rule) = self.table.get(field).and_then(|s| s.computed.as_ref()) {
            match rule.compute(record, self.layers.computation()) {
                Ok(value) => {
                    let rendered = value.render();
                    record.assign(field, coerce(spec, value), Provenance::Computed, None)?;
                    events.record(
                        LogEvent::new(
                            EventKind::MappingDecision,
                            Severity::Info,
                            format!("Computed by {}: {}", rule, rendered),
                        )
                        .field(field),
                    );
                    return Ok(MappingStrategy::Computed { rule: rule.clone() });
                }
                Err(reason) => {
                    events.record(
                        LogEvent::new(
                            EventKind::ComputationFallthrough,
                            Severity::Info,
                            format!("{} not applicable: {}", rule, reason),
                        )
                        .field(field),
                    );
                }
            }
        }

        // 4. Generative, completed after the sequential pass
        if spec.subjective && self.completion.is_some() {
            return Ok(MappingStrategy::Generative);
        }

        self.default_or_fallback(spec, record, resolver, events)
    }

    /// Steps 5 and 6
    fn default_or_fallback(
        &self,
        spec: &FieldSpec,
        record: &mut MetadataRecord,
        resolver: &ConfigResolver<'_>,
        events: &EventLog,
    ) -> MapperResult<MappingStrategy> {
        let field = spec.name.as_str();

        if let Some(resolution) = resolver.resolve_default(field) {
            record.assign(
                field,
                coerce(spec, resolution.value),
                Provenance::Default,
                Some(resolution.scope),
            )?;
            events.record(
                LogEvent::new(
                    EventKind::MappingDecision,
                    Severity::Info,
                    format!("Default from {} layer applied", resolution.scope),
                )
                .field(field),
            );
            return Ok(MappingStrategy::Default {
                scope: resolution.scope,
            });
        }

        let value = fallback_value(spec, record, &self.schema);
        let message = if value.is_null_valid() {
            "No source available, marked null-valid".to_string()
        } else {
            format!("Fallback value '{}' used", value.render())
        };
        record.assign(field, value, Provenance::Fallback, None)?;
        let severity = if spec.hard_required {
            Severity::Warning
        } else {
            Severity::Info
        };
        events.record(
            LogEvent::new(EventKind::MappingDecision, severity, message)
                .field(field)
                .major(),
        );
        Ok(MappingStrategy::Fallback)
    }

    /// Complete deferred subjective fields, preserving their order
    async fn complete_pending(
        &self,
        service: &CompletionService,
        pending: &[(usize, &FieldSpec)],
        snapshot: &MetadataRecord,
        context: Option<&str>,
        events: &EventLog,
    ) -> Vec<(CompletionOutcome, AttemptRecorder)> {
        debug!(
            fields = pending.len(),
            max_concurrent = self.max_concurrent,
            "Starting generative completions"
        );
        stream::iter(pending.iter().map(|(_, spec)| {
            let recorder = AttemptRecorder::new(spec.name.clone());
            async move {
                let outcome = service
                    .attempt_completion(spec, snapshot, context, &recorder, events)
                    .await;
                (outcome, recorder)
            }
        }))
        .buffered(self.max_concurrent)
        .collect()
        .await
    }
}

fn coerce(spec: &FieldSpec, value: FieldValue) -> FieldValue {
    value.coerce(spec.kind, spec.currency.as_deref().unwrap_or("USD"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::ConfigurationLayer;
    use crate::types::Scope;

    fn registry(layers: Vec<ConfigurationLayer>) -> MappingRegistry {
        let schema = FieldSchema::builtin().unwrap();
        let normalizer = FieldNameNormalizer::builder()
            .canonical_names(schema.names())
            .build();
        MappingRegistry::new(
            Arc::new(schema),
            Arc::new(LayerSet::new(layers).unwrap()),
            Arc::new(normalizer),
        )
        .unwrap()
    }

    #[test]
    fn test_normalizer_without_canonical_names_rejected() {
        let result = MappingRegistry::new(
            Arc::new(FieldSchema::builtin().unwrap()),
            Arc::new(LayerSet::empty()),
            Arc::new(FieldNameNormalizer::builtin()),
        );
        // table_of_contents loses its stop word
        assert!(matches!(result, Err(MapperError::ConfigurationLoad(_))));
    }

    fn scenario_record() -> MetadataRecord {
        MetadataRecord::new()
            .with_field("isbn", "9780306406157")
            .with_field("title", "Atlas of Rain")
            .with_field("contributor_one", "Mara Quell")
            .with_field("page_count", 320)
            .with_field("trim_size", "6x9")
    }

    #[tokio::test]
    async fn test_every_schema_field_populated() {
        let registry = registry(vec![]);
        let mut record = scenario_record();
        let events = EventLog::new(record.id());

        let summary = registry.map_record(&mut record, None, &events).await.unwrap();

        assert_eq!(summary.decisions.len(), registry.schema().len());
        for spec in registry.schema().fields() {
            assert!(record.entry(&spec.name).is_some(), "{} missing", spec.name);
        }
        assert_eq!(summary.completion_calls, 0);
    }

    #[tokio::test]
    async fn test_spine_width_computed() {
        let registry = registry(vec![]);
        let mut record = scenario_record();
        let events = EventLog::new(record.id());
        registry.map_record(&mut record, None, &events).await.unwrap();

        assert_eq!(record.provenance("spine_width"), Some(Provenance::Computed));
        assert_eq!(record.text("spine_width").as_deref(), Some("0.721"));
        assert_eq!(record.provenance("title"), Some(Provenance::Explicit));
        assert!(events.count(EventKind::ComputationFallthrough) > 0);
    }

    #[tokio::test]
    async fn test_imprint_override_beats_publisher_and_explicit() {
        let publisher = ConfigurationLayer::empty(Scope::Publisher)
            .with_override("imprint", "Publisher Imprint");
        let imprint = ConfigurationLayer::empty(Scope::Imprint)
            .with_override("imprint", "Rainfall Books");
        let registry = registry(vec![publisher, imprint]);
        let mut record = scenario_record().with_field("imprint", "Explicit Imprint");
        let events = EventLog::new(record.id());

        let summary = registry.map_record(&mut record, None, &events).await.unwrap();

        assert_eq!(record.text("imprint").as_deref(), Some("Rainfall Books"));
        assert_eq!(
            summary.strategy_for("imprint"),
            Some(&MappingStrategy::Override {
                scope: Scope::Imprint
            })
        );
    }

    #[tokio::test]
    async fn test_default_used_when_nothing_else_applies() {
        let global = ConfigurationLayer::empty(Scope::Global).with_default("publisher", "Quell House");
        let registry = registry(vec![global]);
        let mut record = scenario_record();
        registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap();

        let entry = record.entry("publisher").unwrap();
        assert_eq!(entry.provenance, Provenance::Default);
        assert_eq!(entry.scope, Some(Scope::Global));
    }

    #[tokio::test]
    async fn test_without_provider_subjective_fields_fall_back() {
        let registry = registry(vec![]);
        let mut record = scenario_record();
        let summary = registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap();

        assert_eq!(record.provenance("contributor_bio"), Some(Provenance::Fallback));
        assert_eq!(
            record.text("contributor_bio").as_deref(),
            Some("Mara Quell is the author of Atlas of Rain.")
        );
        // No provider means no generative failure either
        assert!(summary.generative_failures.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let imprint = ConfigurationLayer::empty(Scope::Imprint).with_override("contributor_bio", "N/A");
        let registry = registry(vec![imprint]);
        let mut record = scenario_record();
        registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap();
        let first = record.clone();

        let summary = registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap();

        for spec in registry.schema().fields() {
            let a = first.entry(&spec.name).unwrap();
            let b = record.entry(&spec.name).unwrap();
            assert_eq!(a.value, b.value, "{}", spec.name);
            assert_eq!(a.provenance, b.provenance, "{}", spec.name);
        }
        assert_eq!(summary.count("passthrough"), registry.schema().len());
    }

    #[tokio::test]
    async fn test_explicit_values_coerced_to_kind() {
        let registry = registry(vec![]);
        let mut record = scenario_record()
            .with_field("list_price", "$19.99")
            .with_field("publication_date", "20250301");
        registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap();

        assert!(matches!(record.value("list_price"), Some(FieldValue::Price { .. })));
        assert_eq!(record.text("publication_date").as_deref(), Some("2025-03-01"));
        assert_eq!(record.provenance("list_price"), Some(Provenance::Explicit));
        assert_eq!(record.text("uk_list_price").as_deref(), Some("15.79"));
    }

    #[test]
    fn test_register_computed_is_idempotent() {
        let mut registry = registry(vec![]);
        let before = registry.resolution_order().to_vec();
        registry
            .register_computed("spine_width", ComputedRule::SpineWidth)
            .unwrap();
        registry
            .register_computed("Spine Width", ComputedRule::SpineWidth)
            .unwrap();
        assert_eq!(registry.resolution_order(), before.as_slice());
        assert_eq!(
            registry.strategies_for("spine_width").unwrap().computed,
            Some(ComputedRule::SpineWidth)
        );
        assert!(registry
            .register_computed("not_a_field", ComputedRule::Weight)
            .is_err());
    }

    #[tokio::test]
    async fn test_sealed_record_rejected() {
        let registry = registry(vec![]);
        let mut record = scenario_record();
        record.export_row(registry.schema()).unwrap();
        let err = registry
            .map_record(&mut record, None, &EventLog::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, MapperError::RecordSealed(_)));
    }
}
