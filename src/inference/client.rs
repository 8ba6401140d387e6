use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::backoff::Backoff;
use super::http::HttpTransport;
use super::image::encode_image;
use super::prompt::{SYSTEM_PROMPT, USER_PROMPT};
use super::{
    ChatRequest, InferenceError, InferenceResult, MAX_RETRIES_EXCEEDED, Reply, Transport, classify,
};
use crate::config::{BatchConfig, InferenceConfig};

/// Runtime settings for [`InferenceClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub model: String,
    pub max_tokens: u32,
    pub max_concurrent: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_image_edge: u32,
    pub jpeg_quality: u8,
    pub batch_size: usize,
    pub batch_pause: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&InferenceConfig::default(), &BatchConfig::default())
    }
}

impl ClientOptions {
    pub fn from_config(inference: &InferenceConfig, batch: &BatchConfig) -> Self {
        Self {
            model: inference.model.clone(),
            max_tokens: inference.max_tokens,
            max_concurrent: inference.max_concurrent,
            max_retries: inference.max_retries,
            initial_backoff: Duration::from_secs_f64(inference.initial_backoff_secs),
            max_backoff: Duration::from_secs_f64(inference.max_backoff_secs),
            max_image_edge: inference.max_image_edge,
            jpeg_quality: inference.jpeg_quality,
            batch_size: batch.batch_size,
            batch_pause: Duration::from_secs_f64(batch.batch_pause_secs),
        }
    }
}

/// Sends meal images to the vision model.
///
/// At most `max_concurrent` requests are in flight per client; a request
/// holds its slot across retries and sleeps and releases it on every exit
/// path when the permit drops.
pub struct InferenceClient {
    transport: Arc<dyn Transport>,
    gate: Arc<Semaphore>,
    options: ClientOptions,
}

impl InferenceClient {
    pub fn new(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let gate = Arc::new(Semaphore::new(options.max_concurrent.max(1)));
        Self {
            transport,
            gate,
            options,
        }
    }

    /// Client talking HTTP to `config.api_url`, keyed from the environment.
    pub fn from_config(
        inference: &InferenceConfig,
        batch: &BatchConfig,
    ) -> Result<Self, InferenceError> {
        let api_key = std::env::var(&inference.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::MissingApiKey(inference.api_key_env.clone()))?;
        if !api_key.starts_with("sk-") {
            warn!(
                "{} does not look like an OpenAI key (expected sk- or sk-proj- prefix)",
                inference.api_key_env
            );
        }
        let transport = HttpTransport::new(
            &inference.api_url,
            &api_key,
            Duration::from_secs(inference.request_timeout_secs),
        )?;
        info!(
            "Inference client ready (model: {}, concurrency: {})",
            inference.model, inference.max_concurrent
        );
        Ok(Self::new(
            Arc::new(transport),
            ClientOptions::from_config(inference, batch),
        ))
    }

    /// Estimate one image using the configured retry budget.
    pub async fn estimate(&self, path: &Path) -> InferenceResult {
        self.estimate_with_retries(path, self.options.max_retries)
            .await
    }

    /// Estimate one image with at most `max_retries` attempts.
    ///
    /// Never fails: errors end up in `raw_text` with `success == false`.
    pub async fn estimate_with_retries(&self, path: &Path, max_retries: u32) -> InferenceResult {
        let mut result = InferenceResult {
            image_path: path.to_path_buf(),
            success: false,
            raw_text: String::new(),
            attempts: 0,
            delays: Vec::new(),
        };

        let Ok(_permit) = self.gate.acquire().await else {
            result.raw_text = "inference client is shut down".to_string();
            return result;
        };

        let encoded = match self.prepare_image(path).await {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Skipping {}: {e}", path.display());
                result.raw_text = e.to_string();
                return result;
            }
        };
        let request = ChatRequest::vision(
            &self.options.model,
            SYSTEM_PROMPT,
            USER_PROMPT,
            &encoded,
            self.options.max_tokens,
        );

        let mut backoff = Backoff::new(self.options.initial_backoff, self.options.max_backoff);
        let mut retry_count = 0;

        while retry_count < max_retries {
            result.attempts += 1;
            let outcome = match self.transport.send(&request).await {
                Ok(response) => classify(&response),
                Err(e) => Err(e),
            };

            let delay = match outcome {
                Ok(Reply::Content(text)) => {
                    debug!(
                        "Estimated {} after {} attempt(s)",
                        path.display(),
                        result.attempts
                    );
                    result.success = true;
                    result.raw_text = text;
                    return result;
                }
                Ok(Reply::RateLimited(suggested)) => {
                    let delay = suggested.unwrap_or_else(|| backoff.current());
                    warn!(
                        "Rate limited on {}; waiting {:.1}s",
                        path.display(),
                        delay.as_secs_f64()
                    );
                    delay
                }
                Err(e) => {
                    error!(
                        "Attempt {} for {} failed: {e}",
                        result.attempts,
                        path.display()
                    );
                    if retry_count + 1 >= max_retries {
                        break;
                    }
                    backoff.current()
                }
            };

            tokio::time::sleep(delay).await;
            result.delays.push(delay);
            backoff.advance();
            retry_count += 1;
        }

        result.raw_text = MAX_RETRIES_EXCEEDED.to_string();
        result
    }

    /// Estimate images in chunks of `batch_size`, pausing between chunks.
    /// Results come back in input order.
    pub async fn estimate_batch<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<InferenceResult> {
        self.estimate_batch_with(paths, |_| {}).await
    }

    /// Like [`estimate_batch`](Self::estimate_batch), calling `on_result`
    /// for each result as its chunk completes.
    pub async fn estimate_batch_with<P, F>(&self, paths: &[P], mut on_result: F) -> Vec<InferenceResult>
    where
        P: AsRef<Path>,
        F: FnMut(&InferenceResult),
    {
        let chunk_size = self.options.batch_size.max(1);
        let chunk_count = paths.len().div_ceil(chunk_size);
        let mut results = Vec::with_capacity(paths.len());

        for (i, chunk) in paths.chunks(chunk_size).enumerate() {
            debug!("Batch {}/{chunk_count} ({} images)", i + 1, chunk.len());
            let chunk_results = join_all(chunk.iter().map(|p| self.estimate(p.as_ref()))).await;
            for r in &chunk_results {
                on_result(r);
            }
            results.extend(chunk_results);

            if i + 1 < chunk_count && !self.options.batch_pause.is_zero() {
                tokio::time::sleep(self.options.batch_pause).await;
            }
        }
        results
    }

    async fn prepare_image(&self, path: &Path) -> Result<String, InferenceError> {
        let path: PathBuf = path.to_path_buf();
        let max_edge = self.options.max_image_edge;
        let quality = self.options.jpeg_quality;
        tokio::task::spawn_blocking(move || encode_image(&path, max_edge, quality))
            .await
            .map_err(|e| InferenceError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::mock::{MockReply, ScriptedTransport};
    use image::{Rgb, RgbImage};
    use tempfile::{TempDir, tempdir};

    const REPLY: &str = "CALORIES: 450\nProtein: 25g";

    fn write_image(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::from_pixel(32, 24, Rgb([180, 90, 30]))
            .save(&path)
            .unwrap();
        path
    }

    fn client(transport: Arc<ScriptedTransport>, options: ClientOptions) -> InferenceClient {
        InferenceClient::new(transport, options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::new(vec![MockReply::content(REPLY)]));
        let c = client(transport.clone(), ClientOptions::default());

        let result = c.estimate(&img).await;
        assert!(result.success);
        assert_eq!(result.raw_text, REPLY);
        assert_eq!(result.attempts, 1);
        assert!(result.delays.is_empty());

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 150);
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert!(
            body["messages"][1]["content"][1]["image_url"]["url"]
                .as_str()
                .unwrap()
                .starts_with("data:image/jpeg;base64,")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_429_then_success() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::new(vec![
            MockReply::TooManyRequests(None),
            MockReply::TooManyRequests(None),
            MockReply::content(REPLY),
        ]));
        let c = client(transport.clone(), ClientOptions::default());

        let result = c.estimate(&img).await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(
            result.delays,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(result.delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(result.delays.iter().all(|d| *d <= Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_header_wins() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::new(vec![
            MockReply::TooManyRequests(Some(Duration::from_secs(5))),
            MockReply::TooManyRequests(None),
            MockReply::content(REPLY),
        ]));
        let c = client(transport, ClientOptions::default());

        let result = c.estimate(&img).await;
        assert!(result.success);
        // backoff still doubles after a server-directed wait
        assert_eq!(
            result.delays,
            vec![Duration::from_secs(5), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_payload_is_retried() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::new(vec![
            MockReply::ErrorPayload("Rate limit reached for gpt-4o-mini".to_string()),
            MockReply::content(REPLY),
        ]));
        let c = client(transport, ClientOptions::default());

        let result = c.estimate(&img).await;
        assert!(result.success);
        assert_eq!(result.delays, vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_stops_at_budget() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::always(MockReply::NetworkError(
            "connection reset".to_string(),
        )));
        let c = client(transport.clone(), ClientOptions::default());

        let result = c.estimate_with_retries(&img, 2).await;
        assert!(!result.success);
        assert_eq!(result.raw_text, MAX_RETRIES_EXCEEDED);
        assert_eq!(result.attempts, 2);
        assert_eq!(transport.calls(), 2);
        assert_eq!(result.delays, vec![Duration::from_secs(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_errors_exhaust_default_budget() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::always(MockReply::Status(503)));
        let c = client(transport.clone(), ClientOptions::default());

        let result = c.estimate(&img).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 5);
        assert_eq!(result.delays.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_capped() {
        let dir = tempdir().unwrap();
        let img = write_image(&dir, "meal.png");
        let transport = Arc::new(ScriptedTransport::always(MockReply::TooManyRequests(None)));
        let options = ClientOptions {
            initial_backoff: Duration::from_secs(40),
            ..ClientOptions::default()
        };
        let c = client(transport, options);

        let result = c.estimate_with_retries(&img, 4).await;
        assert!(!result.success);
        assert_eq!(result.raw_text, MAX_RETRIES_EXCEEDED);
        assert_eq!(
            result.delays,
            vec![
                Duration::from_secs(40),
                Duration::from_secs(60),
                Duration::from_secs(60),
                Duration::from_secs(60),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_image_fails_without_request() {
        let dir = tempdir().unwrap();
        let bogus = dir.path().join("not-an-image.jpg");
        std::fs::write(&bogus, b"plain text").unwrap();
        let transport = Arc::new(ScriptedTransport::always(MockReply::content(REPLY)));
        let c = client(transport.clone(), ClientOptions::default());

        let result = c.estimate(&bogus).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert_eq!(transport.calls(), 0);
        assert!(result.raw_text.contains("not-an-image.jpg"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_gate() {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..8)
            .map(|i| write_image(&dir, &format!("meal{i}.png")))
            .collect();
        let transport = Arc::new(
            ScriptedTransport::always(MockReply::content(REPLY))
                .with_latency(Duration::from_millis(200)),
        );
        let c = client(transport.clone(), ClientOptions::default());

        let results = join_all(paths.iter().map(|p| c.estimate(p))).await;
        assert!(results.iter().all(|r| r.success));
        assert_eq!(transport.calls(), 8);
        assert!(transport.peak_in_flight() <= 3);
        assert!(transport.peak_in_flight() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_order_and_pause() {
        let dir = tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..5)
            .map(|i| write_image(&dir, &format!("meal{i}.png")))
            .collect();
        let transport = Arc::new(ScriptedTransport::always(MockReply::content(REPLY)));
        let options = ClientOptions {
            batch_size: 2,
            batch_pause: Duration::from_secs(2),
            ..ClientOptions::default()
        };
        let c = client(transport, options);

        let mut seen = 0;
        let start = tokio::time::Instant::now();
        let results = c.estimate_batch_with(&paths, |_| seen += 1).await;

        assert_eq!(seen, 5);
        let returned: Vec<_> = results.iter().map(|r| r.image_path.clone()).collect();
        assert_eq!(returned, paths);
        // three chunks, two pauses
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
