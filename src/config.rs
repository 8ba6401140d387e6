/// Configuration module for mealscope.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::matcher::MatchConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_food_db_path() -> String {
    "food_db.json".to_string()
}

fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_secs() -> f64 {
    1.0
}

fn default_max_backoff_secs() -> f64 {
    60.0
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_image_edge() -> u32 {
    768
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_pause_secs() -> f64 {
    2.0
}

fn default_results_dir() -> String {
    "estimation_results".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Reference food database (JSON array of foods).
    #[serde(default = "default_food_db_path")]
    pub food_db_path: String,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub matching: MatchConfig,

    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InferenceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Requests in flight at once, per client.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: f64,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: f64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Longer image edge is scaled down to this before upload.
    #[serde(default = "default_max_image_edge")]
    pub max_image_edge: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive batches.
    #[serde(default = "default_batch_pause_secs")]
    pub batch_pause_secs: f64,

    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            food_db_path: default_food_db_path(),
            inference: InferenceConfig::default(),
            matching: MatchConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            max_image_edge: default_max_image_edge(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_secs: default_batch_pause_secs(),
            results_dir: default_results_dir(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template when the default path was used.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let inf = &self.inference;
        anyhow::ensure!(!inf.api_url.is_empty(), "inference.api_url must be set");
        anyhow::ensure!(!inf.model.is_empty(), "inference.model must be set");
        anyhow::ensure!(
            inf.max_concurrent > 0,
            "inference.max_concurrent must be positive"
        );
        anyhow::ensure!(inf.max_retries > 0, "inference.max_retries must be positive");
        anyhow::ensure!(
            inf.initial_backoff_secs.is_finite() && inf.initial_backoff_secs >= 0.0,
            "inference.initial_backoff_secs must be non-negative"
        );
        anyhow::ensure!(
            inf.max_backoff_secs.is_finite() && inf.max_backoff_secs >= inf.initial_backoff_secs,
            "inference.max_backoff_secs must be at least initial_backoff_secs"
        );
        anyhow::ensure!(
            inf.max_image_edge > 0,
            "inference.max_image_edge must be positive"
        );
        anyhow::ensure!(
            (1..=100).contains(&inf.jpeg_quality),
            "inference.jpeg_quality must be between 1 and 100"
        );

        let m = &self.matching;
        anyhow::ensure!(
            (0.0..=100.0).contains(&m.threshold),
            "matching.threshold must be between 0 and 100"
        );
        anyhow::ensure!(
            m.suggestion_margin >= 0.0,
            "matching.suggestion_margin must be non-negative"
        );

        anyhow::ensure!(self.batch.batch_size > 0, "batch.batch_size must be positive");
        anyhow::ensure!(
            self.batch.batch_pause_secs.is_finite() && self.batch.batch_pause_secs >= 0.0,
            "batch.batch_pause_secs must be non-negative"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
