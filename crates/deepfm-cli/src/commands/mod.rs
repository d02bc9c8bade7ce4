//! CLI Command Implementations
//!
//! - [`TrainCommand`]: model training through the DeepFM estimator
//! - [`EvaluateCommand`]: loss and AUC over a labelled file
//! - [`PredictCommand`]: scores for every example of a file

mod evaluate;
mod predict;
mod train;

pub use evaluate::EvaluateCommand;
pub use predict::PredictCommand;
pub use train::TrainCommand;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deepfm_models::{batches, read_examples, DeepFmParams, FeatureBatch};

/// Reads the params file, applying a model directory override.
pub(crate) fn load_params(config: &Path, model_dir: Option<&PathBuf>) -> Result<DeepFmParams> {
    let mut params = DeepFmParams::from_json_file(config)
        .with_context(|| format!("Failed to load params from {}", config.display()))?;
    if let Some(dir) = model_dir {
        params.model_dir = dir.clone();
    }
    params.validate().context("Invalid params")?;
    Ok(params)
}

/// Reads a JSON-lines data file into batches of `params.batch_size`.
pub(crate) fn load_batches(path: &Path, params: &DeepFmParams) -> Result<Vec<FeatureBatch>> {
    let examples = read_examples(path)
        .with_context(|| format!("Failed to read examples from {}", path.display()))?;
    let input = batches(&examples, params.batch_size)
        .with_context(|| format!("Failed to batch examples from {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        examples = examples.len(),
        batches = input.len(),
        "Loaded data"
    );
    Ok(input)
}
