//! The DeepFM parameter bundle.
//!
//! Parameters arrive as one JSON object. Field names follow the usual
//! DeepFM conventions (`cont_field_size`, `dropout_keep_fm`, `is_GPU`, ...);
//! everything beyond the feature sizes and `hidden_units` has a default.

use std::path::{Path, PathBuf};

use deepfm_optimizer::OptimizerConfig;
use deepfm_training::{RunConfig, DEFAULT_SEED};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Which branches feed the scoring layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// FM first- and second-order terms only.
    FmOnly,
    /// Deep branch only.
    DeepOnly,
    /// FM terms and deep branch side by side.
    #[default]
    Combined,
}

impl ModelVariant {
    /// Whether the FM terms are computed.
    pub fn uses_fm(self) -> bool {
        matches!(self, ModelVariant::FmOnly | ModelVariant::Combined)
    }

    /// Whether the deep branch is computed.
    pub fn uses_deep(self) -> bool {
        matches!(self, ModelVariant::DeepOnly | ModelVariant::Combined)
    }

    /// Input width of the scoring layer given the FM and deep output widths.
    pub fn fan_in(self, fm_width: usize, deep_width: usize) -> usize {
        match self {
            ModelVariant::FmOnly => fm_width,
            ModelVariant::DeepOnly => deep_width,
            ModelVariant::Combined => fm_width + deep_width,
        }
    }
}

fn default_keep() -> [f32; 2] {
    [1.0, 1.0]
}

fn default_model_dir() -> PathBuf {
    RunConfig::default().model_dir
}

fn default_log_steps() -> u64 {
    RunConfig::default().log_step_count_steps
}

fn default_checkpoint_steps() -> u64 {
    RunConfig::default().save_checkpoints_steps
}

fn default_keep_max() -> usize {
    RunConfig::default().keep_checkpoint_max
}

fn default_summary_steps() -> u64 {
    RunConfig::default().save_summary_steps
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_batch_size() -> usize {
    256
}

/// Hyperparameters and run settings of one DeepFM build.
///
/// ```
/// use deepfm_models::DeepFmParams;
///
/// let params = DeepFmParams::from_json_str(r#"{
///     "cont_field_size": 2,
///     "cate_field_size": 2,
///     "cate_feats_size": 10,
///     "embedding_size": 4,
///     "hidden_units": [8, 4],
///     "is_GPU": 1
/// }"#).unwrap();
/// assert_eq!(params.is_gpu, 1);
/// assert_eq!(params.fm_width(), 2 + 2 + 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepFmParams {
    /// Number of continuous fields.
    pub cont_field_size: usize,
    /// Number of categorical fields.
    pub cate_field_size: usize,
    /// Size of the categorical id vocabulary.
    pub cate_feats_size: usize,
    /// Embedding width `k`.
    pub embedding_size: usize,
    /// Widths of the deep branch layers, in order.
    pub hidden_units: Vec<usize>,
    /// Keep-probabilities of the first- and second-order FM dropouts.
    #[serde(default = "default_keep")]
    pub dropout_keep_fm: [f32; 2],
    /// `[start, end)` ranges of multi-valued categorical fields.
    #[serde(default)]
    pub multi_feats_range: Vec<(usize, usize)>,
    /// GPUs requested.
    #[serde(default, alias = "is_GPU")]
    pub is_gpu: usize,
    /// Steps between training log lines.
    #[serde(default = "default_log_steps")]
    pub log_step_count_steps: u64,
    /// Steps between checkpoints.
    #[serde(default = "default_checkpoint_steps")]
    pub save_checkpoints_steps: u64,
    /// Checkpoints retained on disk.
    #[serde(default = "default_keep_max")]
    pub keep_checkpoint_max: usize,
    /// Steps between summary records.
    #[serde(default = "default_summary_steps")]
    pub save_summary_steps: u64,
    /// Checkpoint and summary directory.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Width of the dense side-feature vector fed to the deep branch.
    #[serde(default)]
    pub vector_feats_size: usize,
    /// Branch selection.
    #[serde(default)]
    pub variant: ModelVariant,
    /// Optimizer applied to every parameter.
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// L2 coefficient on the dense kernels.
    #[serde(default)]
    pub l2_reg: f32,
    /// Seed of the build context.
    #[serde(default = "default_seed")]
    pub random_seed: u64,
    /// Examples per batch when reading data files.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl DeepFmParams {
    /// Parameters with the given feature layout and defaults elsewhere.
    pub fn new(
        cont_field_size: usize,
        cate_field_size: usize,
        cate_feats_size: usize,
        embedding_size: usize,
        hidden_units: Vec<usize>,
    ) -> Self {
        Self {
            cont_field_size,
            cate_field_size,
            cate_feats_size,
            embedding_size,
            hidden_units,
            dropout_keep_fm: default_keep(),
            multi_feats_range: Vec::new(),
            is_gpu: 0,
            log_step_count_steps: default_log_steps(),
            save_checkpoints_steps: default_checkpoint_steps(),
            keep_checkpoint_max: default_keep_max(),
            save_summary_steps: default_summary_steps(),
            model_dir: default_model_dir(),
            vector_feats_size: 0,
            variant: ModelVariant::default(),
            optimizer: OptimizerConfig::default(),
            l2_reg: 0.0,
            random_seed: DEFAULT_SEED,
            batch_size: default_batch_size(),
        }
    }

    /// Sets the model directory.
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Sets the FM dropout keep-probabilities.
    pub fn with_dropout_keep_fm(mut self, keep: [f32; 2]) -> Self {
        self.dropout_keep_fm = keep;
        self
    }

    /// Sets the branch selection.
    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Sets the optimizer.
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the vector feature width.
    pub fn with_vector_feats_size(mut self, size: usize) -> Self {
        self.vector_feats_size = size;
        self
    }

    /// Sets the L2 coefficient.
    pub fn with_l2_reg(mut self, l2: f32) -> Self {
        self.l2_reg = l2;
        self
    }

    /// Sets the build seed.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Parses a JSON parameter object.
    pub fn from_json_str(json: &str) -> ModelResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ModelError::InvalidParams(format!("malformed params JSON: {e}")))
    }

    /// Reads a JSON parameter file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Rejects bundles no model can be built from.
    pub fn validate(&self) -> ModelResult<()> {
        let sizes = [
            ("cont_field_size", self.cont_field_size),
            ("cate_field_size", self.cate_field_size),
            ("cate_feats_size", self.cate_feats_size),
            ("embedding_size", self.embedding_size),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ModelError::InvalidParams(format!("{name} must be positive")));
            }
        }
        if self.hidden_units.is_empty() {
            return Err(ModelError::InvalidParams(
                "hidden_units must name at least one layer".to_string(),
            ));
        }
        if let Some(pos) = self.hidden_units.iter().position(|&u| u == 0) {
            return Err(ModelError::InvalidParams(format!(
                "hidden_units[{pos}] must be positive"
            )));
        }
        for (i, keep) in self.dropout_keep_fm.iter().enumerate() {
            if !(*keep > 0.0 && *keep <= 1.0) {
                return Err(ModelError::InvalidParams(format!(
                    "dropout_keep_fm[{i}] must be in (0, 1], got {keep}"
                )));
            }
        }
        for &(start, end) in &self.multi_feats_range {
            if start >= end || end > self.cate_field_size {
                return Err(ModelError::InvalidParams(format!(
                    "multi_feats_range [{start}, {end}) is not a range within {} categorical fields",
                    self.cate_field_size
                )));
            }
        }
        if self.l2_reg.is_nan() || self.l2_reg < 0.0 {
            return Err(ModelError::InvalidParams(format!(
                "l2_reg must be non-negative, got {}",
                self.l2_reg
            )));
        }
        if self.batch_size == 0 {
            return Err(ModelError::InvalidParams("batch_size must be positive".to_string()));
        }
        self.optimizer.validate()?;
        Ok(())
    }

    /// Rows of each embedding table: continuous slots follow the vocabulary.
    pub fn embedding_rows(&self) -> usize {
        self.cate_feats_size + self.cont_field_size
    }

    /// Width of the concatenated FM output.
    pub fn fm_width(&self) -> usize {
        self.cont_field_size + self.cate_field_size + self.embedding_size
    }

    /// Input width of the deep branch.
    pub fn deep_input_width(&self) -> usize {
        self.cont_field_size + self.vector_feats_size + self.cate_field_size * self.embedding_size
    }

    /// Output width of the deep branch.
    pub fn deep_output_width(&self) -> usize {
        self.hidden_units.last().copied().unwrap_or(0)
    }

    /// Input width of the scoring layer.
    pub fn fan_in(&self) -> usize {
        self.variant.fan_in(self.fm_width(), self.deep_output_width())
    }

    /// Run configuration derived from these parameters.
    pub fn run_config(&self) -> RunConfig {
        RunConfig::new(&self.model_dir)
            .with_gpu_device_count(self.is_gpu)
            .with_log_step_count_steps(self.log_step_count_steps)
            .with_save_checkpoints_steps(self.save_checkpoints_steps)
            .with_keep_checkpoint_max(self.keep_checkpoint_max)
            .with_save_summary_steps(self.save_summary_steps)
            .with_random_seed(self.random_seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DeepFmParams {
        DeepFmParams::new(2, 3, 10, 4, vec![8, 4])
    }

    #[test]
    fn test_widths() {
        let p = params();
        assert_eq!(p.embedding_rows(), 12);
        assert_eq!(p.fm_width(), 9);
        assert_eq!(p.deep_input_width(), 2 + 3 * 4);
        assert_eq!(p.with_vector_feats_size(5).deep_input_width(), 2 + 5 + 12);
    }

    #[test]
    fn test_fan_in_per_variant() {
        let p = params();
        assert_eq!(p.clone().with_variant(ModelVariant::FmOnly).fan_in(), 9);
        assert_eq!(p.clone().with_variant(ModelVariant::DeepOnly).fan_in(), 4);
        assert_eq!(p.with_variant(ModelVariant::Combined).fan_in(), 13);
    }

    #[test]
    fn test_validate_rejects_bad_bundles() {
        assert!(params().validate().is_ok());

        let mut p = params();
        p.embedding_size = 0;
        assert!(p.validate().is_err());

        let mut p = params();
        p.hidden_units.clear();
        assert!(p.validate().is_err());

        let mut p = params();
        p.hidden_units = vec![8, 0];
        assert!(p.validate().is_err());

        assert!(params().with_dropout_keep_fm([0.0, 1.0]).validate().is_err());
        assert!(params().with_dropout_keep_fm([0.5, 1.1]).validate().is_err());

        let mut p = params();
        p.multi_feats_range = vec![(1, 1)];
        assert!(p.validate().is_err());
        p.multi_feats_range = vec![(1, 4)];
        assert!(p.validate().is_err());
        p.multi_feats_range = vec![(1, 3)];
        assert!(p.validate().is_ok());

        assert!(params().with_l2_reg(-1.0).validate().is_err());
        assert!(params()
            .with_optimizer(OptimizerConfig::Sgd { learning_rate: 0.0 })
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_defaults_and_alias() {
        let p = DeepFmParams::from_json_str(
            r#"{
                "cont_field_size": 2,
                "cate_field_size": 2,
                "cate_feats_size": 10,
                "embedding_size": 4,
                "hidden_units": [8, 4],
                "dropout_keep_fm": [0.9, 0.8],
                "multi_feats_range": [[0, 2]],
                "is_GPU": 2,
                "model_dir": "/tmp/deepfm",
                "variant": "fm_only",
                "optimizer": {"type": "sgd", "learning_rate": 0.1}
            }"#,
        )
        .unwrap();
        assert_eq!(p.is_gpu, 2);
        assert_eq!(p.dropout_keep_fm, [0.9, 0.8]);
        assert_eq!(p.multi_feats_range, vec![(0, 2)]);
        assert_eq!(p.variant, ModelVariant::FmOnly);
        assert_eq!(p.optimizer, OptimizerConfig::Sgd { learning_rate: 0.1 });
        assert_eq!(p.random_seed, 2019);
        assert_eq!(p.save_checkpoints_steps, 1000);

        let run = p.run_config();
        assert_eq!(run.gpu_device_count, 2);
        assert_eq!(run.model_dir, PathBuf::from("/tmp/deepfm"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = DeepFmParams::from_json_str(r#"{"cont_field_size": 2}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidParams(_)));
    }
}
