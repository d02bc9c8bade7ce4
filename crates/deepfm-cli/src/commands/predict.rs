//! Predict Command Implementation

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deepfm_models::{model_estimator, SCORE};
use tracing::info;

use super::{load_batches, load_params};

/// Score every example of a data file with the latest checkpoint
///
/// Writes one `{"score": p}` line per example to `--output`, or to stdout.
#[derive(Args, Debug, Clone)]
pub struct PredictCommand {
    /// Path to the params file (JSON format)
    #[arg(long, short = 'c', env = "DEEPFM_CONFIG_PATH")]
    pub config: PathBuf,

    /// Examples to score, one JSON object per line; labels are ignored
    #[arg(long, short = 'd')]
    pub data: PathBuf,

    /// Output file for scores
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Overrides `model_dir` from the params file
    #[arg(long, env = "DEEPFM_MODEL_DIR")]
    pub model_dir: Option<PathBuf>,
}

impl PredictCommand {
    /// Execute the predict command
    pub fn run(&self) -> Result<()> {
        let params = load_params(&self.config, self.model_dir.as_ref())?;
        let input = load_batches(&self.data, &params)?;
        let mut estimator = model_estimator(&params).context("Failed to create estimator")?;
        let result = estimator.predict(input).context("Prediction failed")?;

        let mut out: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(BufWriter::new(File::create(path).with_context(|| {
                format!("Failed to create output file {}", path.display())
            })?)),
            None => Box::new(BufWriter::new(io::stdout().lock())),
        };
        write_scores(&mut out, &result.predictions)?;
        out.flush().context("Failed to flush scores")?;

        info!(
            examples = result.num_examples,
            step = estimator.global_step(),
            "Prediction finished"
        );
        Ok(())
    }
}

fn write_scores(out: &mut dyn Write, scores: &[f32]) -> Result<()> {
    for score in scores {
        serde_json::to_writer(&mut *out, &serde_json::json!({ SCORE: score }))?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_scores_one_line_each() {
        let mut buf = Vec::new();
        write_scores(&mut buf, &[0.25, 0.5]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "{\"score\":0.25}\n{\"score\":0.5}\n");
    }
}
