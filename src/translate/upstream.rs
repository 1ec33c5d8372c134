use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::failure::{FailureKind, DEFAULT_RETRY_AFTER};
use super::interface::ChatMessage;
use crate::config::UpstreamConfig;

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 4096;

/// A single-shot chat completion endpoint.
///
/// Implementations perform exactly one call per invocation and classify the
/// outcome; retrying is the caller's business.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, FailureKind>;
}

#[derive(Debug, Serialize)]
struct CompletionPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    reasoning: Reasoning,
}

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: &'static str,
}

/// OpenRouter-compatible completion client
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    referer: Option<String>,
    title: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::try_from_secs_f64(config.request_timeout_seconds)?)
            .build()?;

        info!(
            "Initialized OpenRouterClient: model={}, base_url={}, timeout={}s",
            config.model, config.base_url, config.request_timeout_seconds
        );

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, FailureKind> {
        let payload = CompletionPayload {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            reasoning: Reasoning { effort: "none" },
        };

        let mut request = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);
        if let Some(referer) = &self.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            request = request.header("X-Title", title);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(classify_transport_error)?;

        debug!("Upstream responded: status={}, body_len={}", status, body.len());
        classify_response(status, &headers, &body)
    }
}

fn classify_transport_error(err: reqwest::Error) -> FailureKind {
    if err.is_timeout()
        || err.is_connect()
        || err.is_request()
        || err.is_body()
        || err.is_decode()
    {
        FailureKind::TransientConnection(err.to_string())
    } else {
        FailureKind::Unexpected(err.to_string())
    }
}

/// Turn a completed HTTP exchange into the translated text or a failure kind
pub fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<String, FailureKind> {
    if status == StatusCode::PAYMENT_REQUIRED {
        return Err(FailureKind::PaymentRequired(body.to_string()));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(rate_limited_from_headers(headers));
    }
    if status.as_u16() >= 400 {
        return Err(FailureKind::NonRetryableUpstream {
            status: Some(status.as_u16()),
            message: body.to_string(),
        });
    }

    let data: Value = serde_json::from_str(body)
        .map_err(|e| FailureKind::Unexpected(format!("invalid JSON body: {e}")))?;

    if let Some(error) = data.get("error") {
        return Err(match error.get("code").and_then(Value::as_i64) {
            Some(402) => FailureKind::PaymentRequired(error.to_string()),
            Some(429) => FailureKind::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER,
            },
            _ => FailureKind::NonRetryableUpstream {
                status: None,
                message: error.to_string(),
            },
        });
    }

    let first_choice = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or_else(|| FailureKind::EmptyResponse("no choices in response".to_string()))?;

    let content = first_choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim();
    if content.is_empty() {
        return Err(FailureKind::EmptyResponse(
            "empty content in response".to_string(),
        ));
    }

    Ok(content.to_string())
}

fn rate_limited_from_headers(headers: &HeaderMap) -> FailureKind {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(FailureKind::rate_limited_secs)
        .unwrap_or(FailureKind::RateLimited {
            retry_after: DEFAULT_RETRY_AFTER,
        })
}
