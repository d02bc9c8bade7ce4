//! Train Command Implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deepfm_models::model_estimator;
use tracing::info;

use super::{load_batches, load_params};

/// Train a DeepFM model
///
/// Training resumes from the newest checkpoint in the model directory.
/// Without `--steps` the data file is read once; with it, the file is
/// cycled until that many steps have run.
///
/// # Example
///
/// ```bash
/// deepfm train --config params.json --data train.jsonl --steps 10000
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    /// Path to the params file (JSON format)
    #[arg(long, short = 'c', env = "DEEPFM_CONFIG_PATH")]
    pub config: PathBuf,

    /// Training data, one JSON example per line
    #[arg(long, short = 'd')]
    pub data: PathBuf,

    /// Evaluation data to score after training
    #[arg(long)]
    pub eval_data: Option<PathBuf>,

    /// Number of training steps to run
    #[arg(long, short = 's')]
    pub steps: Option<u64>,

    /// Overrides `model_dir` from the params file
    #[arg(long, env = "DEEPFM_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,
}

impl TrainCommand {
    /// Execute the train command
    pub fn run(&self) -> Result<()> {
        let params = load_params(&self.config, self.model_dir.as_ref())?;
        info!(
            model_dir = %params.model_dir.display(),
            variant = ?params.variant,
            optimizer = params.optimizer.name(),
            "Starting training"
        );

        let train = load_batches(&self.data, &params)?;
        let mut estimator = model_estimator(&params).context("Failed to create estimator")?;

        let result = match self.steps {
            Some(steps) => estimator.train(train.iter().cloned().cycle(), Some(steps)),
            None => estimator.train(train, None),
        }
        .context("Training failed")?;

        info!(
            global_step = result.global_step,
            average_loss = result.average_loss,
            stopped_early = result.stopped_early,
            "Training finished"
        );

        if let Some(path) = &self.eval_data {
            let eval = load_batches(path, &params)?;
            let eval_result = estimator.evaluate(eval).context("Evaluation failed")?;
            info!(
                step = eval_result.global_step,
                loss = eval_result.metrics.loss,
                auc = ?eval_result.metrics.auc,
                examples = eval_result.num_examples,
                "Evaluation after training"
            );
        }
        Ok(())
    }
}
