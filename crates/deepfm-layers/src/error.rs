//! Error types for the deepfm-layers crate.
//!
//! Shape mismatches, bad lookups and configuration problems are reported
//! through [`LayerError`] instead of panicking.

use thiserror::Error;

/// Error type for layer operations.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Shape mismatch between expected and actual tensor shapes.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected shape
        expected: Vec<usize>,
        /// The actual shape that was provided
        actual: Vec<usize>,
    },

    /// Tensor rank differs from what the operation requires.
    #[error("Rank mismatch: expected {expected}D tensor, got {actual}D")]
    RankMismatch {
        /// The required rank
        expected: usize,
        /// The rank that was provided
        actual: usize,
    },

    /// Invalid input dimension for the layer.
    #[error("Invalid input dimension: expected {expected}, got {actual}")]
    InvalidInputDimension {
        /// The expected input dimension
        expected: usize,
        /// The actual input dimension
        actual: usize,
    },

    /// Invalid output dimension for the layer.
    #[error("Invalid output dimension: expected {expected}, got {actual}")]
    InvalidOutputDimension {
        /// The expected output dimension
        expected: usize,
        /// The actual output dimension
        actual: usize,
    },

    /// Error during weight initialization.
    #[error("Initialization error: {message}")]
    InitializationError {
        /// Description of the initialization error
        message: String,
    },

    /// Layer has not cached a training forward pass.
    #[error("Layer not initialized: forward_train must be called before backward")]
    NotInitialized,

    /// Configuration error for the layer.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// Embedding row index outside the table.
    #[error("Embedding lookup in '{table}': index {index} out of range for {rows} rows")]
    IndexOutOfRange {
        /// Table name
        table: String,
        /// Offending row index
        index: usize,
        /// Number of rows in the table
        rows: usize,
    },

    /// Error raised by the ndarray backend.
    #[error(transparent)]
    Backend(#[from] ndarray::ShapeError),
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
