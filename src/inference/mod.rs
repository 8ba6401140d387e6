/// Vision-model inference: request shapes, transport seam and result types.
///
/// [`InferenceClient`] drives the retry state machine; the actual POST goes
/// through a [`Transport`] so tests can script server behaviour.
pub mod backoff;
pub mod client;
pub mod http;
pub mod image;
pub mod mock;
pub mod prompt;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use client::{ClientOptions, InferenceClient};

/// Message reported when every attempt failed.
pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";

/// Errors raised while preparing or performing a single attempt.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to preprocess image {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: ::image::ImageError,
    },

    #[error("image task failed: {0}")]
    Task(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("missing API key: environment variable {0} is not set")]
    MissingApiKey(String),
}

/// Chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// System turn plus a user turn carrying text and a base64 JPEG.
    pub fn vision(
        model: &str,
        system: &str,
        user_text: &str,
        jpeg_base64: &str,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(system.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: user_text.to_string(),
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl {
                                url: format!("data:image/jpeg;base64,{jpeg_base64}"),
                            },
                        },
                    ]),
                },
            ],
            max_tokens,
        }
    }
}

/// What came back from one POST, before interpretation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed `Retry-After` header, if the server sent one.
    pub retry_after: Option<Duration>,
    /// JSON body; `Null` when the body was not JSON.
    pub body: serde_json::Value,
}

/// Sends one chat request to the inference service.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, InferenceError>;
}

/// Outcome of estimating one image.
#[derive(Debug, Clone, Serialize)]
pub struct InferenceResult {
    pub image_path: PathBuf,
    pub success: bool,
    /// Model reply on success, error description otherwise.
    pub raw_text: String,
    pub attempts: u32,
    /// Sleeps taken between attempts, in order.
    #[serde(skip)]
    pub delays: Vec<Duration>,
}

/// How a response should be handled by the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Content(String),
    /// Server asked us to slow down; carries its suggested delay if any.
    RateLimited(Option<Duration>),
}

/// Interpret a raw response.
pub(crate) fn classify(response: &TransportResponse) -> Result<Reply, InferenceError> {
    if response.status == 429 {
        return Ok(Reply::RateLimited(response.retry_after));
    }

    let error_message = response.body.get("error").map(|e| {
        e.get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| e.to_string())
    });

    let rate_limited = error_message
        .as_deref()
        .is_some_and(|m| m.to_lowercase().contains("rate limit"));
    if rate_limited {
        return Ok(Reply::RateLimited(None));
    }

    if !(200..300).contains(&response.status) {
        return Err(InferenceError::Status {
            status: response.status,
            message: error_message.unwrap_or_default(),
        });
    }

    if let Some(message) = error_message {
        return Err(InferenceError::Api(message));
    }

    response
        .body
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| Reply::Content(c.to_string()))
        .ok_or_else(|| {
            InferenceError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status,
            retry_after: None,
            body,
        }
    }

    #[test]
    fn test_vision_request_shape() {
        let req = ChatRequest::vision("gpt-4o-mini", "sys", "look", "QUJD", 150);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["max_tokens"], 150);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][0]["content"], "sys");
        assert_eq!(value["messages"][1]["content"][0]["type"], "text");
        assert_eq!(value["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            value["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn test_classify_success() {
        let r = response(
            200,
            json!({"choices": [{"message": {"content": "CALORIES: 450"}}]}),
        );
        assert_eq!(
            classify(&r).unwrap(),
            Reply::Content("CALORIES: 450".to_string())
        );
    }

    #[test]
    fn test_classify_429_uses_retry_after() {
        let mut r = response(429, serde_json::Value::Null);
        r.retry_after = Some(Duration::from_secs(7));
        assert_eq!(
            classify(&r).unwrap(),
            Reply::RateLimited(Some(Duration::from_secs(7)))
        );
    }

    #[test]
    fn test_classify_rate_limit_payload() {
        let r = response(
            200,
            json!({"error": {"message": "Rate limit reached for requests"}}),
        );
        assert_eq!(classify(&r).unwrap(), Reply::RateLimited(None));
    }

    #[test]
    fn test_classify_errors() {
        let r = response(200, json!({"error": {"message": "invalid image"}}));
        assert!(matches!(classify(&r), Err(InferenceError::Api(_))));

        let r = response(500, serde_json::Value::Null);
        assert!(matches!(
            classify(&r),
            Err(InferenceError::Status { status: 500, .. })
        ));

        let r = response(200, json!({"choices": []}));
        assert!(matches!(
            classify(&r),
            Err(InferenceError::MalformedResponse(_))
        ));
    }
}
