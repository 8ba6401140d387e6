//! Evaluation runs: estimate a labelled photo set and compare against the
//! ground-truth calories.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::inference::InferenceClient;
use crate::response::ReplyParser;

/// Labels file looked up inside the dataset directory when none is given.
pub const DEFAULT_LABELS_FILE: &str = "processed_labels.csv";

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("labels file not found: {0}")]
    LabelsNotFound(PathBuf),

    #[error("failed to read labels {path}: {source}")]
    ReadLabels {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write results {path}: {source}")]
    WriteResults {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One row of the labels file. Extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Label {
    pub img_path: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub calories: Option<f64>,
}

/// One line of the results file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationRow {
    pub image: String,
    pub actual_calories: f64,
    pub estimated_calories: f64,
    pub estimated_carbs: Option<f64>,
    pub estimated_protein: Option<f64>,
    pub estimated_fat: Option<f64>,
    pub estimated_fiber: Option<f64>,
    pub calorie_difference: f64,
    pub llm_output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationSummary {
    /// Labelled rows with a calorie value.
    pub labelled: usize,
    /// Rows skipped because the image file does not exist.
    pub missing_images: usize,
    /// Images whose estimate failed or carried no calorie value.
    pub failed: usize,
    pub rows: Vec<EvaluationRow>,
    pub mean_difference: Option<f64>,
    pub median_difference: Option<f64>,
    pub output_path: Option<PathBuf>,
}

/// Read labels, dropping rows without a usable calorie value.
pub fn read_labels(path: &Path) -> Result<Vec<Label>, BatchError> {
    if !path.exists() {
        return Err(BatchError::LabelsNotFound(path.to_path_buf()));
    }
    let read_err = |source| BatchError::ReadLabels {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
    let mut labels = Vec::new();
    for record in reader.deserialize::<Label>() {
        let label = record.map_err(read_err)?;
        if label.calories.is_some() {
            labels.push(label);
        }
    }
    Ok(labels)
}

pub fn write_results(path: &Path, rows: &[EvaluationRow]) -> Result<(), BatchError> {
    let write_err = |source| BatchError::WriteResults {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    for row in rows {
        writer.serialize(row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| write_err(csv::Error::from(e)))?;
    Ok(())
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Middle value; the average of the two middle values for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Estimate every labelled image under `dataset_dir` and write a results
/// CSV into `results_dir`.
pub async fn run_evaluation(
    client: &InferenceClient,
    parser: &dyn ReplyParser,
    dataset_dir: &Path,
    labels_path: &Path,
    results_dir: &Path,
) -> Result<EvaluationSummary> {
    let labels = read_labels(labels_path)?;
    let mut summary = EvaluationSummary {
        labelled: labels.len(),
        ..EvaluationSummary::default()
    };

    let mut present = Vec::with_capacity(labels.len());
    for label in labels {
        let path = dataset_dir.join(&label.img_path);
        if path.exists() {
            present.push((path, label));
        } else {
            warn!("Image not found, skipping: {}", path.display());
            summary.missing_images += 1;
        }
    }
    info!(
        "Evaluating {} images ({} missing)",
        present.len(),
        summary.missing_images
    );

    let pb = ProgressBar::new(present.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("█▓░"),
    );

    let paths: Vec<&Path> = present.iter().map(|(p, _)| p.as_path()).collect();
    let results = client.estimate_batch_with(&paths, |_| pb.inc(1)).await;
    pb.finish_and_clear();

    for (result, (path, label)) in results.into_iter().zip(&present) {
        let Some(actual) = label.calories else {
            continue;
        };
        let fields = result
            .success
            .then(|| parser.extract_nutrition(&result.raw_text));
        let Some(estimated) = fields.and_then(|f| f.calories) else {
            error!(
                "Error processing {}: {}",
                path.display(),
                result.raw_text
            );
            summary.failed += 1;
            continue;
        };
        let fields = fields.unwrap_or_default();

        summary.rows.push(EvaluationRow {
            image: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| label.img_path.clone()),
            actual_calories: actual,
            estimated_calories: estimated,
            estimated_carbs: fields.carbohydrates,
            estimated_protein: fields.protein,
            estimated_fat: fields.fat,
            estimated_fiber: fields.fiber,
            calorie_difference: (estimated - actual).abs(),
            llm_output: result.raw_text,
        });
    }

    if summary.rows.is_empty() {
        warn!("No results were generated");
        return Ok(summary);
    }

    std::fs::create_dir_all(results_dir)
        .with_context(|| format!("failed to create {}", results_dir.display()))?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let output = results_dir.join(format!("estimation_openai_{timestamp}.csv"));
    write_results(&output, &summary.rows)?;
    info!("Results saved to {}", output.display());

    let differences: Vec<f64> = summary.rows.iter().map(|r| r.calorie_difference).collect();
    summary.mean_difference = mean(&differences);
    summary.median_difference = median(&differences);
    if let (Some(mean), Some(median)) = (summary.mean_difference, summary.median_difference) {
        info!("Average calorie difference: {mean:.2}");
        info!("Median calorie difference: {median:.2}");
    }
    summary.output_path = Some(output);

    Ok(summary)
}
