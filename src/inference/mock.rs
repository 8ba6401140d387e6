/// Scripted transport for testing the retry loop without a network.
///
/// Replies are served in order; once the script runs out the fallback
/// reply (if any) repeats forever.
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{ChatRequest, InferenceError, Transport, TransportResponse};

/// One scripted server behaviour.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 200 with the given completion text.
    Content(String),
    /// 429, optionally with a `Retry-After` delay.
    TooManyRequests(Option<Duration>),
    /// 200 carrying an `error` object with this message.
    ErrorPayload(String),
    /// Bare status code with no body.
    Status(u16),
    /// Connection-level failure.
    NetworkError(String),
}

impl MockReply {
    pub fn content(text: &str) -> Self {
        Self::Content(text.to_string())
    }

    fn into_response(self) -> Result<TransportResponse, InferenceError> {
        let (status, retry_after, body) = match self {
            Self::Content(text) => (
                200,
                None,
                json!({"choices": [{"message": {"role": "assistant", "content": text}}]}),
            ),
            Self::TooManyRequests(delay) => (429, delay, serde_json::Value::Null),
            Self::ErrorPayload(message) => (200, None, json!({"error": {"message": message}})),
            Self::Status(code) => (code, None, serde_json::Value::Null),
            Self::NetworkError(message) => return Err(InferenceError::Transport(message)),
        };
        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<MockReply>>,
    fallback: Option<MockReply>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(script: Vec<MockReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Serve `reply` for every call.
    #[must_use]
    pub fn always(reply: MockReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// Hold each call open for `latency` before replying.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        scripted
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| MockReply::NetworkError("script exhausted".to_string()))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest) -> Result<TransportResponse, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_reply().into_response()
    }
}
