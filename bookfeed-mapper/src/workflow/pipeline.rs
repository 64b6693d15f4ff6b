//! Pipeline Orchestrator
//!
//! Runs records through mapping, validation and reporting, one at a time or
//! as a parallel batch.
//!
//! # Architecture
//! - **Phase 1**: Mapping on a working copy of the record
//! - **Phase 2**: Validation (auto-correct at most once per field)
//! - **Phase 3**: Completeness report
//! - **Phase 4**: Session log append (failures logged, never fatal)
//!
//! # Error Handling
//! - Per-record isolation: a sealed or malformed record is marked failed and
//!   the batch continues
//! - Fatal errors (configuration, unreachable provider) cancel the rest of
//!   the batch and are returned to the caller
//! - Cancellation returns each unfinished record exactly as submitted
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::with_events(stages, tx);
//! let outcome = pipeline.process_batch(jobs, CancellationToken::new()).await?;
//! println!("{}", outcome.summary.render_text());
//! ```

use super::{PipelineEvent, ProcessedRecord, RecordJob, RecordStatus};
use crate::error::{MapperError, MapperResult};
use crate::registry::{MappingRegistry, MappingSummary};
use crate::reporting::event_log::{EventKind, EventLog, LogEvent};
use crate::reporting::report::{BatchSummary, CompletenessReport};
use crate::reporting::session_log::SessionLogWriter;
use crate::types::Severity;
use crate::validators::Validator;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared, immutable stages of a run
#[derive(Clone)]
pub struct PipelineStages {
    pub registry: Arc<MappingRegistry>,
    pub validator: Arc<Validator>,
    pub session_log: Option<Arc<SessionLogWriter>>,
    /// Records processed concurrently in a batch
    pub max_parallel_records: usize,
}

/// Records of one batch in submission order, with their aggregate
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub records: Vec<ProcessedRecord>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    pub fn completed(&self) -> impl Iterator<Item = &ProcessedRecord> {
        self.records.iter().filter(|r| r.is_completed())
    }

    pub fn reports(&self) -> Vec<CompletenessReport> {
        self.records.iter().filter_map(|r| r.report.clone()).collect()
    }
}

pub struct Pipeline {
    stages: PipelineStages,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(stages: PipelineStages) -> Self {
        Self {
            stages,
            event_tx: None,
        }
    }

    /// Create pipeline with event channel for progress reporting
    pub fn with_events(stages: PipelineStages, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            stages,
            event_tx: Some(event_tx),
        }
    }

    pub fn stages(&self) -> &PipelineStages {
        &self.stages
    }

    /// Process one record
    ///
    /// Returns `Err` only for fatal errors. A cancelled or rejected record
    /// comes back unmodified with its status set.
    pub async fn process_record(
        &self,
        index: usize,
        job: RecordJob,
        cancel: &CancellationToken,
    ) -> MapperResult<ProcessedRecord> {
        let started = Instant::now();
        let record_id = job.record.id();
        let events = EventLog::new(record_id);

        self.emit_event(PipelineEvent::RecordStarted { index, record_id })
            .await;

        if cancel.is_cancelled() {
            return Ok(self.cancelled(index, job, &events).await);
        }

        // Phase 1: mapping runs on a copy so cancellation leaves the input intact
        let mut working = job.record.clone();
        let mapped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.stages.registry.map_record(&mut working, job.context.as_deref(), &events) => Some(result),
        };

        let mapping = match mapped {
            None => return Ok(self.cancelled(index, job, &events).await),
            Some(Ok(summary)) => summary,
            Some(Err(e)) if e.is_fatal() => {
                error!(index, record_id = %record_id, error = %e, "Fatal error while mapping record");
                events.record(LogEvent::new(EventKind::Error, Severity::Critical, e.to_string()).major());
                self.persist(&events).await;
                self.emit_event(PipelineEvent::Error {
                    index: Some(index),
                    message: e.to_string(),
                })
                .await;
                return Err(e);
            }
            Some(Err(e)) => return Ok(self.failed(index, job, &events, e).await),
        };
        self.emit_mapping(index, record_id, &mapping).await;

        // Phase 2: validation
        let validation = match self.stages.validator.validate(&mut working, &events) {
            Ok(report) => report,
            Err(e) => return Ok(self.failed(index, job, &events, e).await),
        };
        self.emit_event(PipelineEvent::ValidationCompleted {
            index,
            record_id,
            failures: validation.failures().len(),
            corrections: validation.corrections().len(),
            export_ready: validation.is_export_ready(),
        })
        .await;

        // Phase 3: report
        let layer_label = self.stages.registry.layers().most_specific_label();
        let report = CompletenessReport::build(
            &working,
            self.stages.registry.schema(),
            &mapping,
            &validation,
            layer_label.as_deref(),
        );

        let elapsed_ms = started.elapsed().as_millis() as u64;
        events.record(
            LogEvent::new(
                EventKind::Performance,
                Severity::Info,
                format!("Record processed in {} ms", elapsed_ms),
            )
            .details(serde_json::json!({
                "mapping_ms": mapping.elapsed_ms,
                "total_ms": elapsed_ms,
                "completion_calls": mapping.completion_calls,
            })),
        );

        // Phase 4: session log
        self.persist(&events).await;

        info!(
            index,
            record_id = %record_id,
            export_ready = validation.is_export_ready(),
            populated = report.populated,
            total = report.total,
            elapsed_ms,
            "Record processed"
        );
        self.emit_event(PipelineEvent::RecordCompleted {
            index,
            record_id,
            export_ready: validation.is_export_ready(),
            elapsed_ms,
        })
        .await;

        Ok(ProcessedRecord {
            index,
            status: RecordStatus::Completed,
            record: working,
            mapping: Some(mapping),
            validation: Some(validation),
            report: Some(report),
            events: events.snapshot(),
            error: None,
        })
    }

    /// Process a batch with up to `max_parallel_records` records in flight
    ///
    /// Results come back in submission order. A fatal error cancels the
    /// records still running and is returned once they have stopped.
    pub async fn process_batch(
        &self,
        jobs: Vec<RecordJob>,
        cancel: CancellationToken,
    ) -> MapperResult<BatchOutcome> {
        let started = Instant::now();
        let total = jobs.len();
        info!(total, parallel = self.stages.max_parallel_records, "Batch started");
        self.emit_event(PipelineEvent::BatchStarted {
            total_records: total,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        let batch_token = cancel.child_token();
        let mut results = stream::iter(jobs.into_iter().enumerate())
            .map(|(index, job)| {
                let token = batch_token.clone();
                async move { self.process_record(index, job, &token).await }
            })
            .buffer_unordered(self.stages.max_parallel_records.max(1));

        let mut records = Vec::with_capacity(total);
        let mut fatal: Option<MapperError> = None;
        while let Some(result) = results.next().await {
            match result {
                Ok(processed) => records.push(processed),
                Err(e) => {
                    if fatal.is_none() {
                        warn!(error = %e, "Cancelling remaining records after fatal error");
                        batch_token.cancel();
                        fatal = Some(e);
                    }
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        records.sort_by_key(|r| r.index);

        let mut summary = BatchSummary::default();
        for processed in &records {
            match (&processed.status, &processed.report) {
                (RecordStatus::Completed, Some(report)) => summary.add(report),
                (RecordStatus::Cancelled, _) => summary.add_cancelled(),
                _ => summary.add_failed(),
            }
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        summary.finish(elapsed_ms);

        info!(
            processed = summary.records,
            export_ready = summary.export_ready,
            cancelled = summary.cancelled,
            failed = summary.failed,
            elapsed_ms,
            "Batch complete"
        );
        self.emit_event(PipelineEvent::BatchCompleted {
            processed: summary.records,
            export_ready: summary.export_ready,
            cancelled: summary.cancelled,
            failed: summary.failed,
            elapsed_ms,
            timestamp: chrono::Utc::now().timestamp(),
        })
        .await;

        Ok(BatchOutcome { records, summary })
    }

    async fn cancelled(&self, index: usize, job: RecordJob, events: &EventLog) -> ProcessedRecord {
        debug!(index, record_id = %job.record.id(), "Record cancelled");
        events.record(
            LogEvent::new(
                EventKind::Error,
                Severity::Warning,
                "Processing cancelled; record returned unmodified",
            )
            .major(),
        );
        self.persist(events).await;
        self.emit_event(PipelineEvent::RecordCancelled {
            index,
            record_id: job.record.id(),
        })
        .await;

        ProcessedRecord {
            index,
            status: RecordStatus::Cancelled,
            record: job.record,
            mapping: None,
            validation: None,
            report: None,
            events: events.snapshot(),
            error: None,
        }
    }

    async fn failed(
        &self,
        index: usize,
        job: RecordJob,
        events: &EventLog,
        error: MapperError,
    ) -> ProcessedRecord {
        warn!(index, record_id = %job.record.id(), error = %error, "Record rejected");
        events.record(LogEvent::new(EventKind::Error, Severity::Error, error.to_string()).major());
        self.persist(events).await;
        self.emit_event(PipelineEvent::Error {
            index: Some(index),
            message: error.to_string(),
        })
        .await;

        ProcessedRecord {
            index,
            status: RecordStatus::Failed,
            record: job.record,
            mapping: None,
            validation: None,
            report: None,
            events: events.snapshot(),
            error: Some(error.to_string()),
        }
    }

    async fn persist(&self, events: &EventLog) {
        if let Some(writer) = &self.stages.session_log {
            if let Err(e) = writer.append(events).await {
                warn!(path = %writer.path().display(), error = %e, "Failed to append session log");
            }
        }
    }

    async fn emit_mapping(&self, index: usize, record_id: uuid::Uuid, mapping: &MappingSummary) {
        self.emit_event(PipelineEvent::MappingCompleted {
            index,
            record_id,
            passthrough: mapping.count("passthrough"),
            overridden: mapping.count("override"),
            computed: mapping.count("computed"),
            generative: mapping.count("generative"),
            defaulted: mapping.count("default"),
            fallback: mapping.count("fallback"),
            generative_failures: mapping.generative_failures.len(),
        })
        .await;
    }

    /// Emit pipeline event if channel configured
    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerSet;
    use crate::normalizer::FieldNameNormalizer;
    use crate::record::MetadataRecord;
    use crate::schema::FieldSchema;
    use crate::types::Provenance;
    use bookfeed_common::config::ValidationConfig;

    fn stages() -> PipelineStages {
        let schema = Arc::new(FieldSchema::builtin().unwrap());
        let layers = Arc::new(LayerSet::empty());
        let normalizer = Arc::new(
            FieldNameNormalizer::builder()
                .canonical_names(schema.names())
                .build(),
        );
        let registry = MappingRegistry::new(schema.clone(), layers.clone(), normalizer).unwrap();
        let validator = Validator::new(
            schema,
            layers.computation().clone(),
            ValidationConfig::default(),
        );
        PipelineStages {
            registry: Arc::new(registry),
            validator: Arc::new(validator),
            session_log: None,
            max_parallel_records: 2,
        }
    }

    fn record(title: &str) -> MetadataRecord {
        MetadataRecord::new()
            .with_field("isbn", "9780306406157")
            .with_field("title", title)
            .with_field("contributor_one", "Mara Quell")
            .with_field("page_count", 320)
    }

    #[tokio::test]
    async fn test_process_record_completes() {
        let pipeline = Pipeline::new(stages());
        let processed = pipeline
            .process_record(0, RecordJob::new(record("Atlas of Rain")), &CancellationToken::new())
            .await
            .unwrap();

        assert!(processed.is_completed());
        assert_eq!(processed.record.provenance("title"), Some(Provenance::Explicit));
        assert_eq!(processed.record.provenance("spine_width"), Some(Provenance::Computed));
        assert!(processed.report.is_some());
        assert!(!processed.events.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_record_returned_unmodified() {
        let pipeline = Pipeline::new(stages());
        let input = record("Atlas of Rain");
        let token = CancellationToken::new();
        token.cancel();

        let processed = pipeline
            .process_record(0, RecordJob::new(input.clone()), &token)
            .await
            .unwrap();

        assert_eq!(processed.status, RecordStatus::Cancelled);
        assert_eq!(processed.record, input);
        assert!(processed.events.iter().any(|e| e.kind == EventKind::Error));
    }

    #[tokio::test]
    async fn test_sealed_record_fails_without_stopping_batch() {
        let pipeline = Pipeline::new(stages());
        let schema = FieldSchema::builtin().unwrap();
        let mut sealed = record("Sealed");
        sealed.export_row(&schema).unwrap();

        let outcome = pipeline
            .process_batch(
                vec![sealed.into(), record("Open").into()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].status, RecordStatus::Failed);
        assert!(outcome.records[1].is_completed());
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.summary.records, 1);
    }

    #[tokio::test]
    async fn test_batch_preserves_order_and_emits_events() {
        let (tx, mut rx) = mpsc::channel(256);
        let pipeline = Pipeline::with_events(stages(), tx);
        let jobs: Vec<RecordJob> = (0..5)
            .map(|i| record(&format!("Volume {}", i)).into())
            .collect();

        let outcome = pipeline
            .process_batch(jobs, CancellationToken::new())
            .await
            .unwrap();
        drop(pipeline);

        let titles: Vec<String> = outcome
            .records
            .iter()
            .map(|r| r.record.text("title").unwrap())
            .collect();
        assert_eq!(titles, vec!["Volume 0", "Volume 1", "Volume 2", "Volume 3", "Volume 4"]);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert!(matches!(received.first(), Some(PipelineEvent::BatchStarted { total_records: 5, .. })));
        assert!(matches!(received.last(), Some(PipelineEvent::BatchCompleted { processed: 5, .. })));
    }
}
