//! Completion provider abstraction

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One request to the generative provider
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub field: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_tokens: u32,
}

/// Provider call failures
///
/// Timeouts, rate limits, unavailability and connection failures are
/// transient; everything else is returned to the caller at once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Connection could not be established
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("content filtered by provider: {0}")]
    ContentFiltered(String),

    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable(_)
                | ProviderError::Unreachable(_)
                | ProviderError::InvalidResponse(_)
        )
    }

    /// Stable identifier for logs and attempt records
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            ProviderError::RateLimited { .. } => "rate_limited",
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::Unreachable(_) => "unreachable",
            ProviderError::InvalidResponse(_) => "invalid_response",
            ProviderError::InvalidRequest(_) => "invalid_request",
            ProviderError::ContentFiltered(_) => "content_filtered",
            ProviderError::Authentication(_) => "authentication",
        }
    }

    /// Server-requested delay before the next call
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Generative text provider
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Raw completion text for a request
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}
