//! Generative completion service
//!
//! Runs the attempt loop for one subjective field: render the prompt
//! variant for the attempt, call the provider under a timeout, record the
//! attempt, clean the response, and back off before retrying.
//!
//! **Attempt loop:**
//! 1. Render prompt variant `min(n - 1, len - 1)`
//! 2. Call provider with the per-call timeout
//! 3. Append the attempt to the field's recorder (raw text or error)
//! 4. Clean the response; a usable value ends the loop
//! 5. Non-retryable error: stop at once
//! 6. Otherwise sleep `delay_for(n)` and try again, up to `max_attempts`
//!
//! Exhaustion is not an error: the caller receives `None` and applies the
//! field's default or deterministic fallback.
//!
//! # Example
//! ```rust,ignore
//! let service = CompletionService::new(provider, schema.clone())
//!     .with_policy(RetryPolicy::from_config(&settings.completion));
//! let recorder = AttemptRecorder::new("contributor_bio");
//! let (value, provenance) = service
//!     .complete("contributor_bio", &record, Some(book_text), &recorder, &events)
//!     .await;
//! ```

use super::prompts::PromptTemplates;
use super::provider::{CompletionProvider, CompletionRequest, ProviderError};
use super::retry::RetryPolicy;
use super::{AttemptOutcome, AttemptRecorder, CompletionAttempt};
use crate::error::{MapperError, MapperResult};
use crate::record::MetadataRecord;
use crate::reporting::event_log::{EventKind, EventLog, LogEvent};
use crate::schema::{FieldSchema, FieldSpec};
use crate::strategies::fallback::fallback_value;
use crate::types::{FieldValue, Provenance, Severity};
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Provider health
// ============================================================================

/// Run-wide provider reachability
///
/// Counts the unreachable failures that occur before the provider has ever
/// answered. Once `threshold` leading calls have all failed to connect, the
/// run is considered unable to reach the provider at all.
#[derive(Debug)]
pub struct ProviderHealth {
    threshold: u32,
    calls: AtomicU32,
    successes: AtomicU32,
    leading_unreachable: AtomicU32,
    reached: AtomicBool,
}

impl ProviderHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            calls: AtomicU32::new(0),
            successes: AtomicU32::new(0),
            leading_unreachable: AtomicU32::new(0),
            reached: AtomicBool::new(false),
        }
    }

    pub fn observe(&self, result: &Result<String, ProviderError>) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match result {
            Err(ProviderError::Unreachable(_)) => {
                if !self.reached.load(Ordering::SeqCst) {
                    self.leading_unreachable.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(_) => {
                self.successes.fetch_add(1, Ordering::SeqCst);
                self.reached.store(true, Ordering::SeqCst);
            }
            // Any answer, even an error status, proves the provider is reachable
            Err(_) => self.reached.store(true, Ordering::SeqCst),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn is_unreachable(&self) -> bool {
        self.threshold > 0
            && !self.reached.load(Ordering::SeqCst)
            && self.leading_unreachable.load(Ordering::SeqCst) >= self.threshold
    }

    /// Fails with `ProviderUnreachable` once the threshold is crossed
    pub fn check(&self, provider: &str) -> MapperResult<()> {
        if self.is_unreachable() {
            return Err(MapperError::ProviderUnreachable(format!(
                "{} failed to connect on the first {} calls of this run",
                provider,
                self.leading_unreachable.load(Ordering::SeqCst)
            )));
        }
        Ok(())
    }
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(5)
    }
}

// ============================================================================
// Service
// ============================================================================

/// Result of the attempt loop for one field
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    pub field: String,
    /// Cleaned value, `None` when every attempt failed
    pub value: Option<FieldValue>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl CompletionOutcome {
    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

pub struct CompletionService {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
    prompts: PromptTemplates,
    schema: Arc<FieldSchema>,
    health: Arc<ProviderHealth>,
    max_tokens: u32,
}

impl CompletionService {
    pub fn new(provider: Arc<dyn CompletionProvider>, schema: Arc<FieldSchema>) -> Self {
        Self {
            provider,
            policy: RetryPolicy::default(),
            prompts: PromptTemplates::builtin(),
            schema,
            health: Arc::new(ProviderHealth::default()),
            max_tokens: 1024,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_health(mut self, health: Arc<ProviderHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn health(&self) -> &Arc<ProviderHealth> {
        &self.health
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Value and provenance for a subjective field
    ///
    /// Exhaustion yields the field's deterministic fallback with `fallback`
    /// provenance.
    pub async fn complete(
        &self,
        field: &str,
        record: &MetadataRecord,
        context: Option<&str>,
        recorder: &AttemptRecorder,
        events: &EventLog,
    ) -> (FieldValue, Provenance) {
        let Some(spec) = self.schema.get(field) else {
            warn!(field, "Completion requested for a field outside the schema");
            return (FieldValue::NullValid, Provenance::Fallback);
        };

        let outcome = self
            .attempt_completion(spec, record, context, recorder, events)
            .await;
        match outcome.value {
            Some(value) => (value, Provenance::LlmCompleted),
            None => (fallback_value(spec, record, &self.schema), Provenance::Fallback),
        }
    }

    /// Run the attempt loop, recording every provider call
    pub async fn attempt_completion(
        &self,
        spec: &FieldSpec,
        record: &MetadataRecord,
        context: Option<&str>,
        recorder: &AttemptRecorder,
        events: &EventLog,
    ) -> CompletionOutcome {
        let field = spec.name.as_str();
        let pattern = self.schema.pattern(field);
        let mut last_error: Option<String> = None;
        let mut attempts = 0u32;

        for attempt_number in 1..=self.policy.max_attempts {
            if self.health.is_unreachable() {
                debug!(field, "Provider marked unreachable, skipping further attempts");
                break;
            }

            let prompt = self
                .prompts
                .render(spec, attempt_number, record, &self.schema, context);
            let request = CompletionRequest {
                field: field.to_string(),
                system_prompt: prompt.system,
                user_prompt: prompt.user,
                max_tokens: self.max_tokens,
            };

            let started = Instant::now();
            let result = match tokio::time::timeout(
                self.policy.request_timeout,
                self.provider.complete(&request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.policy.request_timeout)),
            };
            let latency_ms = started.elapsed().as_millis() as u64;
            attempts = attempt_number;
            self.health.observe(&result);

            // Recorded before the response is looked at
            recorder.append(CompletionAttempt {
                attempt_number,
                prompt_variant: prompt.variant,
                outcome: match &result {
                    Ok(text) => AttemptOutcome::Response { text: text.clone() },
                    Err(e) => AttemptOutcome::Error {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                },
                latency_ms,
                timestamp: Utc::now(),
            });

            let provider_error = match result {
                Ok(text) => match clean_response(&text, spec, pattern) {
                    Ok(value) => {
                        events.record(
                            LogEvent::new(
                                EventKind::CompletionAttempt,
                                Severity::Info,
                                format!("Attempt {} produced a usable value", attempt_number),
                            )
                            .field(field)
                            .details(json!({
                                "attempt": attempt_number,
                                "variant": prompt.variant,
                                "latency_ms": latency_ms,
                            })),
                        );
                        if attempt_number > 1 {
                            debug!(field, attempt = attempt_number, latency_ms, "Completion succeeded after retry");
                        }
                        return CompletionOutcome {
                            field: field.to_string(),
                            value: Some(value),
                            attempts,
                            last_error,
                        };
                    }
                    Err(reason) => {
                        events.record(
                            LogEvent::new(
                                EventKind::CompletionAttempt,
                                Severity::Warning,
                                format!("Attempt {} response rejected: {}", attempt_number, reason),
                            )
                            .field(field)
                            .details(json!({ "attempt": attempt_number, "variant": prompt.variant })),
                        );
                        last_error = Some(reason);
                        None
                    }
                },
                Err(e) => {
                    events.record(
                        LogEvent::new(
                            EventKind::CompletionAttempt,
                            Severity::Warning,
                            format!("Attempt {} failed: {}", attempt_number, e),
                        )
                        .field(field)
                        .details(json!({
                            "attempt": attempt_number,
                            "error_kind": e.kind(),
                            "retryable": e.is_retryable(),
                            "latency_ms": latency_ms,
                        })),
                    );
                    last_error = Some(e.to_string());
                    if !e.is_retryable() {
                        warn!(field, attempt = attempt_number, error = %e, "Non-retryable provider error");
                        break;
                    }
                    Some(e)
                }
            };

            if attempt_number < self.policy.max_attempts {
                let delay = self.policy.delay_for(attempt_number, provider_error.as_ref());
                warn!(
                    field,
                    attempt = attempt_number,
                    backoff_ms = delay.as_millis() as u64,
                    "Completion attempt failed, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }

        events.record(
            LogEvent::new(
                EventKind::CompletionFailure,
                Severity::Warning,
                format!(
                    "Generative completion exhausted after {} attempt(s): {}",
                    attempts,
                    last_error.as_deref().unwrap_or("no attempt made")
                ),
            )
            .field(field)
            .major(),
        );

        CompletionOutcome {
            field: field.to_string(),
            value: None,
            attempts,
            last_error,
        }
    }
}

// ============================================================================
// Response cleanup
// ============================================================================

/// Turn raw provider text into a field value
///
/// Strips markdown fences and wrapping quotes. Fields with a pattern take
/// the first token that matches it. Empty or over-length responses are
/// rejected so the loop can retry.
pub fn clean_response(
    raw: &str,
    spec: &FieldSpec,
    pattern: Option<&Regex>,
) -> Result<FieldValue, String> {
    let text = strip_quotes(strip_fences(raw.trim()).trim()).trim().to_string();
    if text.is_empty() {
        return Err("empty response".to_string());
    }

    let text = match pattern {
        Some(re) if re.is_match(&text) => text,
        Some(re) => text
            .split(|c: char| c.is_whitespace() || ",;:()[]\"'".contains(c))
            .map(|token| token.trim_end_matches('.'))
            .find(|token| !token.is_empty() && re.is_match(token))
            .map(str::to_string)
            .ok_or_else(|| "response does not contain a value in the required format".to_string())?,
        None => text,
    };

    if let Some(max) = spec.max_length {
        let len = text.chars().count();
        if len > max {
            return Err(format!("response is {} characters, limit is {}", len, max));
        }
    }

    let currency = spec.currency.as_deref().unwrap_or("USD");
    Ok(FieldValue::Text(text).coerce(spec.kind, currency))
}

fn strip_fences(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an info string such as ```text
    let inner = match inner.find('\n') {
        Some(idx) => &inner[idx + 1..],
        None => inner,
    };
    inner.strip_suffix("```").unwrap_or(inner)
}

fn strip_quotes(text: &str) -> &str {
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        calls: AtomicU32,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Unavailable("script exhausted".into())))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "test"
        }
    }

    fn rate_limited() -> Result<String, ProviderError> {
        Err(ProviderError::RateLimited { retry_after: None })
    }

    fn service(provider: Arc<ScriptedProvider>) -> CompletionService {
        let schema = Arc::new(FieldSchema::builtin().unwrap());
        CompletionService::new(provider, schema).with_policy(RetryPolicy::immediate(3))
    }

    fn record() -> MetadataRecord {
        MetadataRecord::new()
            .with_field("title", "Atlas of Rain")
            .with_field("contributor_one", "Mara Quell")
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            rate_limited(),
            rate_limited(),
            Ok("Mara Quell is a meteorologist.".into()),
        ]));
        let svc = service(provider.clone());
        let recorder = AttemptRecorder::new("contributor_bio");
        let events = EventLog::detached();

        let (value, provenance) = svc
            .complete("contributor_bio", &record(), None, &recorder, &events)
            .await;

        assert_eq!(provenance, Provenance::LlmCompleted);
        assert_eq!(value.render(), "Mara Quell is a meteorologist.");
        let history = recorder.snapshot();
        assert_eq!(history.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            history.iter().map(|a| a.prompt_variant).collect::<Vec<_>>(),
            vec![0, 1, 1]
        );
        assert!(history[2].outcome.is_response());
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::ContentFiltered("policy".into()),
        )]));
        let svc = service(provider.clone());
        let recorder = AttemptRecorder::new("annotation");
        let events = EventLog::detached();

        let (value, provenance) = svc
            .complete("annotation", &record(), None, &recorder, &events)
            .await;

        assert_eq!(provenance, Provenance::Fallback);
        assert_eq!(value.render(), "Atlas of Rain by Mara Quell.");
        assert_eq!(recorder.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(events.count(EventKind::CompletionFailure), 1);
    }

    #[tokio::test]
    async fn test_unusable_responses_are_recorded_and_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok("   ".into()),
            Ok("I think the best fit is FIC019000.".into()),
        ]));
        let svc = service(provider);
        let schema = FieldSchema::builtin().unwrap();
        let recorder = AttemptRecorder::new("subject_code");
        let events = EventLog::detached();

        let outcome = svc
            .attempt_completion(
                schema.get("subject_code").unwrap(),
                &record(),
                None,
                &recorder,
                &events,
            )
            .await;

        assert_eq!(outcome.value, Some(FieldValue::Text("FIC019000".into())));
        assert_eq!(outcome.attempts, 2);
        let history = recorder.snapshot();
        assert_eq!(
            history[0].outcome,
            AttemptOutcome::Response { text: "   ".into() }
        );
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_every_attempt() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            rate_limited(),
            Err(ProviderError::Timeout(Duration::from_secs(1))),
            rate_limited(),
        ]));
        let svc = service(provider.clone());
        let schema = FieldSchema::builtin().unwrap();
        let recorder = AttemptRecorder::new("contributor_bio");
        let events = EventLog::detached();

        let outcome = svc
            .attempt_completion(
                schema.get("contributor_bio").unwrap(),
                &record(),
                None,
                &recorder,
                &events,
            )
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(recorder.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(events.count(EventKind::CompletionAttempt), 3);
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let provider = Arc::new(ScriptedProvider {
            delay: Some(Duration::from_millis(200)),
            ..ScriptedProvider::new(vec![Ok("late".into())])
        });
        let schema = Arc::new(FieldSchema::builtin().unwrap());
        let svc = CompletionService::new(provider, schema.clone()).with_policy(
            RetryPolicy::immediate(1).with_request_timeout(Duration::from_millis(10)),
        );
        let recorder = AttemptRecorder::new("keywords");

        let outcome = svc
            .attempt_completion(
                schema.get("keywords").unwrap(),
                &record(),
                None,
                &recorder,
                &EventLog::detached(),
            )
            .await;

        assert!(outcome.value.is_none());
        assert!(matches!(
            &recorder.snapshot()[0].outcome,
            AttemptOutcome::Error { kind, retryable: true, .. } if kind == "timeout"
        ));
    }

    #[tokio::test]
    async fn test_health_aborts_after_leading_unreachable_calls() {
        let unreachable = || Err(ProviderError::Unreachable("connection refused".into()));
        let provider = Arc::new(ScriptedProvider::new(vec![
            unreachable(),
            unreachable(),
            unreachable(),
        ]));
        let health = Arc::new(ProviderHealth::new(2));
        let svc = service(provider.clone()).with_health(health.clone());
        let recorder = AttemptRecorder::new("keywords");

        svc.complete("keywords", &record(), None, &recorder, &EventLog::detached())
            .await;

        // Loop stops once the threshold is crossed
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(recorder.len(), 2);
        assert!(matches!(
            health.check("scripted"),
            Err(MapperError::ProviderUnreachable(_))
        ));
    }

    #[test]
    fn test_health_reached_provider_never_trips() {
        let health = ProviderHealth::new(1);
        health.observe(&Err(ProviderError::Unavailable("503".into())));
        health.observe(&Err(ProviderError::Unreachable("refused".into())));
        assert!(!health.is_unreachable());
        assert!(health.check("p").is_ok());
        assert_eq!(health.calls(), 2);
    }

    #[test]
    fn test_clean_response_strips_wrapping() {
        let schema = FieldSchema::builtin().unwrap();
        let spec = schema.get("short_description").unwrap();
        assert_eq!(
            clean_response("```\n\"A storm chaser's atlas.\"\n```", spec, None).unwrap(),
            FieldValue::Text("A storm chaser's atlas.".into())
        );
        assert!(clean_response("``` ```", spec, None).is_err());
    }

    #[test]
    fn test_clean_response_enforces_length_and_pattern() {
        let schema = FieldSchema::builtin().unwrap();
        let short = schema.get("short_description").unwrap();
        assert!(clean_response(&"x".repeat(351), short, None).is_err());

        let code = schema.get("subject_code").unwrap();
        let pattern = schema.pattern("subject_code");
        assert!(clean_response("Literary fiction", code, pattern).is_err());
        assert_eq!(
            clean_response("Code: SCI042000.", code, pattern).unwrap(),
            FieldValue::Text("SCI042000".into())
        );
    }
}
