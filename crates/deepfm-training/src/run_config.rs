//! Run configuration for the estimator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::DEFAULT_SEED;

/// Errors from [`RunConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunConfigError {
    /// `model_dir` is empty.
    #[error("model_dir must not be empty")]
    EmptyModelDir,

    /// `log_step_count_steps` is zero.
    #[error("log_step_count_steps must be positive")]
    ZeroLogStepCount,
}

/// Result type for run configuration.
pub type Result<T> = std::result::Result<T, RunConfigError>;

/// Where the estimator writes its output and how often.
///
/// ```
/// use deepfm_training::RunConfig;
///
/// let config = RunConfig::new("/tmp/deepfm")
///     .with_save_checkpoints_steps(500)
///     .with_keep_checkpoint_max(3);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.log_step_count_steps, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Directory for checkpoints and summaries.
    pub model_dir: PathBuf,
    /// GPUs requested. Recorded only; all computation runs on the CPU.
    pub gpu_device_count: usize,
    /// Steps between training log lines.
    pub log_step_count_steps: u64,
    /// Steps between checkpoints. 0 disables periodic checkpoints.
    pub save_checkpoints_steps: u64,
    /// Checkpoints kept on disk. 0 keeps all.
    pub keep_checkpoint_max: usize,
    /// Steps between summary records. 0 disables summaries.
    pub save_summary_steps: u64,
    /// Seed of the model build.
    pub random_seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("./model"),
            gpu_device_count: 0,
            log_step_count_steps: 100,
            save_checkpoints_steps: 1000,
            keep_checkpoint_max: 5,
            save_summary_steps: 100,
            random_seed: DEFAULT_SEED,
        }
    }
}

impl RunConfig {
    /// Default configuration writing to `model_dir`.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            ..Default::default()
        }
    }

    /// Sets the GPU count.
    pub fn with_gpu_device_count(mut self, count: usize) -> Self {
        self.gpu_device_count = count;
        self
    }

    /// Sets the logging interval.
    pub fn with_log_step_count_steps(mut self, steps: u64) -> Self {
        self.log_step_count_steps = steps;
        self
    }

    /// Sets the checkpoint interval.
    pub fn with_save_checkpoints_steps(mut self, steps: u64) -> Self {
        self.save_checkpoints_steps = steps;
        self
    }

    /// Sets how many checkpoints are retained.
    pub fn with_keep_checkpoint_max(mut self, max: usize) -> Self {
        self.keep_checkpoint_max = max;
        self
    }

    /// Sets the summary interval.
    pub fn with_save_summary_steps(mut self, steps: u64) -> Self {
        self.save_summary_steps = steps;
        self
    }

    /// Sets the random seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Checks the configuration for values the estimator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.model_dir.as_os_str().is_empty() {
            return Err(RunConfigError::EmptyModelDir);
        }
        if self.log_step_count_steps == 0 {
            return Err(RunConfigError::ZeroLogStepCount);
        }
        Ok(())
    }

    /// Path of the summary file.
    pub fn summary_path(&self) -> PathBuf {
        self.model_dir.join("summaries.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.log_step_count_steps, 100);
        assert_eq!(config.save_checkpoints_steps, 1000);
        assert_eq!(config.keep_checkpoint_max, 5);
        assert_eq!(config.save_summary_steps, 100);
        assert_eq!(config.random_seed, 2019);
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            RunConfig::new("").validate(),
            Err(RunConfigError::EmptyModelDir)
        );
        assert_eq!(
            RunConfig::new("/tmp/m")
                .with_log_step_count_steps(0)
                .validate(),
            Err(RunConfigError::ZeroLogStepCount)
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RunConfig =
            serde_json::from_str(r#"{"model_dir": "/data/m", "keep_checkpoint_max": 0}"#).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/data/m"));
        assert_eq!(config.keep_checkpoint_max, 0);
        assert_eq!(config.save_checkpoints_steps, 1000);
        assert_eq!(config.summary_path(), PathBuf::from("/data/m/summaries.jsonl"));
    }
}
