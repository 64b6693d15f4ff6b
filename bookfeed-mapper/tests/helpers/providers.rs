//! Scripted completion providers
//!
//! Completions for one record run concurrently, so scripts are kept per
//! field rather than as one global sequence.

use async_trait::async_trait;
use bookfeed_mapper::completion::{CompletionProvider, CompletionRequest, ProviderError};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

type Step = Result<String, ProviderError>;

pub struct FieldScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, u32>>,
    /// Returned for fields without (or past the end of) a script; None gives a canned answer
    otherwise: Option<ProviderError>,
    delay: Option<Duration>,
}

impl FieldScriptedProvider {
    /// Unscripted fields get a canned valid answer
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            otherwise: None,
            delay: None,
        }
    }

    /// Every unscripted call fails with `error`
    pub fn failing(error: ProviderError) -> Self {
        Self {
            otherwise: Some(error),
            ..Self::new()
        }
    }

    pub fn script(self, field: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(field.to_string(), steps.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls_for(&self, field: &str) -> u32 {
        self.calls.lock().unwrap().get(field).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn canned(field: &str) -> String {
        if field.starts_with("subject_code") {
            "FIC019000".to_string()
        } else {
            format!("Generated {} text.", field.replace('_', " "))
        }
    }
}

impl Default for FieldScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for FieldScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(request.field.clone())
            .or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.field)
            .and_then(VecDeque::pop_front);
        match (scripted, &self.otherwise) {
            (Some(step), _) => step,
            (None, Some(error)) => Err(error.clone()),
            (None, None) => Ok(Self::canned(&request.field)),
        }
    }

    fn provider_name(&self) -> &str {
        "field-scripted"
    }

    fn model_name(&self) -> &str {
        "test"
    }
}

pub fn rate_limited() -> Step {
    Err(ProviderError::RateLimited { retry_after: None })
}

pub fn unavailable() -> Step {
    Err(ProviderError::Unavailable("503 Service Unavailable".into()))
}
