//! reqwest-backed [`Transport`] for an OpenAI-compatible chat endpoint.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use super::{ChatRequest, InferenceError, Transport, TransportResponse};

pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mealscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

/// Delay-seconds form of `Retry-After`. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, InferenceError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or_else(|_| {
            tracing::debug!("Non-JSON response body (HTTP {status})");
            serde_json::Value::Null
        });

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}
