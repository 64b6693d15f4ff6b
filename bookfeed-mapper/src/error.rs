//! Error types for the mapping engine

use thiserror::Error;
use uuid::Uuid;

/// Engine errors
///
/// Only [`MapperError::ConfigurationLoad`] and
/// [`MapperError::ProviderUnreachable`] abort a run; every per-field problem
/// is absorbed by the strategy chain and surfaces in the reports instead.
#[derive(Debug, Error)]
pub enum MapperError {
    /// Configuration layer or schema could not be loaded
    #[error("Configuration load failed: {0}")]
    ConfigurationLoad(String),

    /// Generative provider could not be reached at all during this run
    #[error("Generative provider unreachable: {0}")]
    ProviderUnreachable(String),

    /// Mutation attempted after the record was exported
    #[error("Record {0} is sealed after export")]
    RecordSealed(Uuid),

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Batch run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Shared settings error
    #[error(transparent)]
    Common(#[from] bookfeed_common::Error),
}

impl MapperError {
    /// Errors that stop the whole run rather than a single record
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MapperError::ConfigurationLoad(_) | MapperError::ProviderUnreachable(_)
        )
    }
}

/// Result type for engine operations
pub type MapperResult<T> = Result<T, MapperError>;
