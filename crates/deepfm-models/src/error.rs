//! Error type for model construction and execution.

use std::path::PathBuf;

use deepfm_checkpoint::CheckpointError;
use deepfm_layers::LayerError;
use deepfm_optimizer::OptimizerError;
use deepfm_training::EstimatorError;
use thiserror::Error;

/// Errors raised while building or running a DeepFM model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The parameter bundle is malformed.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A feature tensor does not match the configured field count.
    #[error("Feature '{name}' has {actual} values, expected {expected}")]
    FeatureShape {
        /// Feature name (`cont_feats`, `cate_feats`, ...).
        name: &'static str,
        /// Expected number of values.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// A categorical id falls outside `[0, cate_feats_size)`.
    #[error("Categorical id {id} out of range [0, {cate_feats_size})")]
    CategoryOutOfRange {
        /// Offending id.
        id: usize,
        /// Size of the categorical vocabulary.
        cate_feats_size: usize,
    },

    /// Training or evaluation requires labels.
    #[error("Labels are required in {0} mode")]
    MissingLabels(&'static str),

    /// Malformed input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A data file line could not be parsed.
    #[error("Parse error at {path}:{line}: {source}")]
    Parse {
        /// File being read.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// I/O error while reading data or params.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Layer-level failure.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Optimizer failure.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Checkpoint failure.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Estimator failure.
    #[error("Estimator error: {0}")]
    Estimator(#[from] EstimatorError),
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<ModelError> for EstimatorError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Estimator(inner) => inner,
            ModelError::Checkpoint(inner) => EstimatorError::Checkpoint(inner),
            other => EstimatorError::model(other),
        }
    }
}
