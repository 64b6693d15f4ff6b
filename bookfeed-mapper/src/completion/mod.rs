//! Generative completion
//!
//! Subjective fields (biographies, descriptions, subject codes) have no
//! deterministic derivation and are synthesized by an external text
//! provider.
//!
//! # Architecture
//! - [`provider`]: `CompletionProvider` trait and the provider error taxonomy
//! - [`anthropic_client`]: Messages API implementation (reqwest + governor)
//! - [`prompts`]: per-field prompt templates with ordered variants
//! - [`retry`]: exponential backoff policy
//! - [`service`]: attempt loop, response cleanup, run-wide provider health
//!
//! # Audit invariant
//! Every provider call is appended to the field's [`AttemptRecorder`] as
//! soon as it returns, before the response is cleaned, checked or discarded.
//! The recorder is the only path by which attempts reach the record, so the
//! history length always equals the number of calls made.

pub mod anthropic_client;
pub mod prompts;
pub mod provider;
pub mod retry;
pub mod service;

pub use anthropic_client::AnthropicClient;
pub use prompts::{PromptTemplates, RenderedPrompt};
pub use provider::{CompletionProvider, CompletionRequest, ProviderError};
pub use retry::RetryPolicy;
pub use service::{CompletionOutcome, CompletionService, ProviderHealth};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Result of one provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Raw provider text, before any cleanup
    Response { text: String },
    Error {
        kind: String,
        message: String,
        retryable: bool,
    },
}

impl AttemptOutcome {
    pub fn is_response(&self) -> bool {
        matches!(self, AttemptOutcome::Response { .. })
    }
}

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionAttempt {
    /// 1-based attempt number within this field's run
    pub attempt_number: u32,
    /// Index of the prompt variant used
    pub prompt_variant: usize,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only attempt history for one field
///
/// Cloning shares the same history; each field gets its own lock so
/// concurrent completions never contend.
#[derive(Debug, Clone)]
pub struct AttemptRecorder {
    field: String,
    attempts: Arc<Mutex<Vec<CompletionAttempt>>>,
}

impl AttemptRecorder {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            attempts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn append(&self, attempt: CompletionAttempt) {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<CompletionAttempt> {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Move recorded attempts out, leaving the history empty
    pub fn drain(&self) -> Vec<CompletionAttempt> {
        std::mem::take(
            &mut *self
                .attempts
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}
