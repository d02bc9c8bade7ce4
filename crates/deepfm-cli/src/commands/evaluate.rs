//! Evaluate Command Implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deepfm_models::model_estimator;

use super::{load_batches, load_params};

/// Evaluate the latest checkpoint on a labelled data file
#[derive(Args, Debug, Clone)]
pub struct EvaluateCommand {
    /// Path to the params file (JSON format)
    #[arg(long, short = 'c', env = "DEEPFM_CONFIG_PATH")]
    pub config: PathBuf,

    /// Labelled data, one JSON example per line
    #[arg(long, short = 'd')]
    pub data: PathBuf,

    /// Overrides `model_dir` from the params file
    #[arg(long, env = "DEEPFM_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,
}

impl EvaluateCommand {
    /// Execute the evaluate command
    pub fn run(&self) -> Result<()> {
        let params = load_params(&self.config, self.model_dir.as_ref())?;
        let input = load_batches(&self.data, &params)?;
        let mut estimator = model_estimator(&params).context("Failed to create estimator")?;
        let result = estimator.evaluate(input).context("Evaluation failed")?;

        let report = serde_json::json!({
            "global_step": result.global_step,
            "loss": result.metrics.loss,
            "auc": result.metrics.auc,
            "accuracy": result.metrics.accuracy,
            "num_examples": result.num_examples,
        });
        println!("{report}");
        Ok(())
    }
}
