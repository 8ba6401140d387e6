use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mealscope::batch::{self, DEFAULT_LABELS_FILE};
use mealscope::config::Config;
use mealscope::enhance;
use mealscope::inference::InferenceClient;
use mealscope::matcher::NutritionMatcher;
use mealscope::matcher::text::TextRules;
use mealscope::mcp::server::{McpContext, McpServer};
use mealscope::response::{ReplyParser, TextContractParser};
use mealscope::store::NutrientStore;

#[derive(Parser)]
#[command(
    name = "mealscope",
    version,
    about = "Estimate meal nutrition from photos",
    long_about = "Estimates calories and macronutrients from meal photos with a vision model and cross-checks the listed food items against a reference food database."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the JSON config file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate one or more meal photos
    Estimate {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },

    /// Match food phrases against the reference database
    Match {
        /// e.g. "Brown rice (150g)"
        #[arg(required = true)]
        phrases: Vec<String>,
    },

    /// Run an evaluation over a labelled dataset
    Evaluate {
        /// Directory holding the images
        #[arg(long)]
        dataset: PathBuf,

        /// Labels CSV with img_path and calories columns
        #[arg(long)]
        labels: Option<PathBuf>,
    },

    /// Serve the tools over MCP stdio
    Serve,
}

fn load_matcher(config: &Config) -> Result<NutritionMatcher> {
    let store = NutrientStore::load(&config.food_db_path)
        .with_context(|| format!("failed to load food database {}", config.food_db_path))?;
    Ok(NutritionMatcher::new(
        Arc::new(store),
        TextRules::default(),
        config.matching.clone(),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout is reserved for results and the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Command::Estimate { images } => {
            let client = InferenceClient::from_config(&config.inference, &config.batch)?;
            let matcher = match load_matcher(&config) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("{e:#}; reporting model estimates only");
                    None
                }
            };
            let parser = TextContractParser;

            let reports =
                enhance::analyze_images(&client, matcher.as_ref(), &parser, images.as_slice())
                    .await;
            print_json(&reports)?;
        }

        Command::Match { phrases } => {
            let matcher = load_matcher(&config)?;
            print_json(&matcher.analyze_meal(phrases.as_slice()))?;
        }

        Command::Evaluate { dataset, labels } => {
            let client = InferenceClient::from_config(&config.inference, &config.batch)?;
            let labels = labels.unwrap_or_else(|| dataset.join(DEFAULT_LABELS_FILE));
            let summary = batch::run_evaluation(
                &client,
                &TextContractParser,
                &dataset,
                &labels,
                Path::new(&config.batch.results_dir),
            )
            .await?;
            info!(
                "Evaluated {} of {} labelled images ({} failed, {} missing)",
                summary.rows.len(),
                summary.labelled,
                summary.failed,
                summary.missing_images
            );
        }

        Command::Serve => {
            let client = match InferenceClient::from_config(&config.inference, &config.batch) {
                Ok(c) => Some(Arc::new(c)),
                Err(e) => {
                    warn!("{e}; estimate_meal will be unavailable");
                    None
                }
            };
            let matcher = match load_matcher(&config) {
                Ok(m) => Some(Arc::new(m)),
                Err(e) => {
                    warn!("{e:#}; analyze_food_items will be unavailable");
                    None
                }
            };
            let parser: Arc<dyn ReplyParser> = Arc::new(TextContractParser);

            let ctx = McpContext {
                config: Arc::new(config),
                client,
                matcher,
                parser,
            };
            McpServer::new(ctx).start().await?;
        }
    }

    Ok(())
}
