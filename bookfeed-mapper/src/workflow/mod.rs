//! Record processing workflow
//!
//! Drives records through the engine stages:
//! 1. Map every schema field (registry)
//! 2. Validate, optionally auto-correcting once
//! 3. Build the completeness report
//! 4. Persist retained events to the session log
//!
//! Records are mapped sequentially field by field; a batch runs several
//! records at once.

pub mod pipeline;

pub use pipeline::{BatchOutcome, Pipeline, PipelineStages};

use crate::error::{MapperError, MapperResult};
use crate::record::MetadataRecord;
use crate::registry::MappingSummary;
use crate::reporting::event_log::LogEvent;
use crate::reporting::report::CompletenessReport;
use crate::validators::ValidationReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One record submitted for processing
#[derive(Debug, Clone)]
pub struct RecordJob {
    pub record: MetadataRecord,
    /// Book text handed to generative prompts
    pub context: Option<String>,
}

impl RecordJob {
    pub fn new(record: MetadataRecord) -> Self {
        Self {
            record,
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl From<MetadataRecord> for RecordJob {
    fn from(record: MetadataRecord) -> Self {
        Self::new(record)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Completed,
    /// Cancelled before mapping finished; the record is the unmodified input
    Cancelled,
    /// Rejected by a non-fatal error; the record is the unmodified input
    Failed,
}

/// Result of processing one record
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    /// Position in the submitted batch
    pub index: usize,
    pub status: RecordStatus,
    pub record: MetadataRecord,
    pub mapping: Option<MappingSummary>,
    pub validation: Option<ValidationReport>,
    pub report: Option<CompletenessReport>,
    /// Full audit trail regardless of session log verbosity
    pub events: Vec<LogEvent>,
    pub error: Option<String>,
}

impl ProcessedRecord {
    pub fn record_id(&self) -> Uuid {
        self.record.id()
    }

    pub fn is_completed(&self) -> bool {
        self.status == RecordStatus::Completed
    }

    pub fn is_export_ready(&self) -> bool {
        self.validation
            .as_ref()
            .map(ValidationReport::is_export_ready)
            .unwrap_or(false)
    }

    /// Error for records that did not complete
    pub fn ensure_completed(&self) -> MapperResult<()> {
        match self.status {
            RecordStatus::Completed => Ok(()),
            RecordStatus::Cancelled => Err(MapperError::Cancelled),
            RecordStatus::Failed => Err(MapperError::InvalidInput(
                self.error
                    .clone()
                    .unwrap_or_else(|| "Record processing failed".to_string()),
            )),
        }
    }
}

/// Progress events for callers following a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    BatchStarted {
        total_records: usize,
        /// Unix timestamp (seconds since epoch)
        timestamp: i64,
    },

    RecordStarted {
        index: usize,
        record_id: Uuid,
    },

    MappingCompleted {
        index: usize,
        record_id: Uuid,
        passthrough: usize,
        overridden: usize,
        computed: usize,
        generative: usize,
        defaulted: usize,
        fallback: usize,
        generative_failures: usize,
    },

    ValidationCompleted {
        index: usize,
        record_id: Uuid,
        failures: usize,
        corrections: usize,
        export_ready: bool,
    },

    RecordCompleted {
        index: usize,
        record_id: Uuid,
        export_ready: bool,
        elapsed_ms: u64,
    },

    RecordCancelled {
        index: usize,
        record_id: Uuid,
    },

    Error {
        /// Batch position if the error concerns one record
        index: Option<usize>,
        message: String,
    },

    BatchCompleted {
        processed: usize,
        export_ready: usize,
        cancelled: usize,
        failed: usize,
        elapsed_ms: u64,
        timestamp: i64,
    },
}
