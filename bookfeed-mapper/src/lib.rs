//! bookfeed-mapper: catalog metadata field resolution and validation
//!
//! Turns a partially populated book metadata record into a complete,
//! schema-conformant row for a distributor's catalog feed, with a per-field
//! audit trail and a completeness report.
//!
//! # Architecture
//! - **normalizer / schema / record**: canonical field names, the distributor
//!   field list and the typed record
//! - **layers**: global, publisher and imprint configuration with precedence
//! - **strategies**: deterministic computed fields and fallbacks
//! - **completion**: generative completion of subjective fields with retry
//! - **registry**: per-field strategy chain
//! - **validators**: field rules, cross-field consistency, auto-correct
//! - **reporting**: structured event log, session log, reports
//! - **workflow / engine**: record and batch orchestration

pub mod completion;
pub mod engine;
pub mod error;
pub mod layers;
pub mod normalizer;
pub mod record;
pub mod registry;
pub mod reporting;
pub mod schema;
pub mod strategies;
pub mod template;
pub mod types;
pub mod validators;
pub mod workflow;

pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::{MapperError, MapperResult};
pub use crate::record::MetadataRecord;
pub use crate::types::{FieldKind, FieldValue, Provenance, Scope, Severity};
pub use crate::workflow::{PipelineEvent, ProcessedRecord, RecordJob, RecordStatus};
