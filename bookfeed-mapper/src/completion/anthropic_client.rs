//! Anthropic Messages API provider
//!
//! Requests are paced by a governor rate limiter (requests per minute from
//! the completion settings). HTTP status codes map onto [`ProviderError`] so
//! the service can tell transient failures from permanent ones.

use super::provider::{CompletionProvider, CompletionRequest, ProviderError};
use crate::error::{MapperError, MapperResult};
use async_trait::async_trait;
use bookfeed_common::config::CompletionConfig;
use governor::{Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

/// Anthropic Claude client
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl AnthropicClient {
    pub fn new(api_key: String, config: &CompletionConfig) -> MapperResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                MapperError::ConfigurationLoad(format!("Failed to build HTTP client: {}", e))
            })?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            MapperError::ConfigurationLoad(
                "completion.requests_per_minute must be at least 1".to_string(),
            )
        })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            endpoint: config
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(Duration::ZERO)
    } else if err.is_connect() {
        ProviderError::Unreachable(err.to_string())
    } else {
        ProviderError::Unavailable(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: String, retry_after: Option<Duration>) -> ProviderError {
    match status.as_u16() {
        429 => ProviderError::RateLimited { retry_after },
        408 => ProviderError::Timeout(Duration::ZERO),
        401 | 403 => ProviderError::Authentication(format!("{}: {}", status, body)),
        500..=599 => ProviderError::Unavailable(format!("{}: {}", status, body)),
        _ => ProviderError::InvalidRequest(format!("{}: {}", status, body)),
    }
}

fn extract_text(response: ApiResponse) -> Result<String, ProviderError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(ProviderError::ContentFiltered(
            "model declined the request".to_string(),
        ));
    }
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();
    Ok(text.join(""))
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.rate_limiter.until_ready().await;

        debug!(field = %request.field, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": &self.model,
                "max_tokens": request.max_tokens,
                "system": &request.system_prompt,
                "messages": [{"role": "user", "content": &request.user_prompt}]
            }))
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body, retry_after));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        extract_text(api_response)
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
