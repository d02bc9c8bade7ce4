//! Checkpoint serialization for DeepFM.
//!
//! # Core Components
//!
//! - [`Checkpointer`]: trait for checkpoint serialization implementations
//! - [`JsonCheckpointer`]: `checkpoint-<step>.json` files
//! - [`CheckpointManager`]: save, restore and rotation of old checkpoints
//! - [`ModelState`]: everything needed to resume training
//!
//! # Example
//!
//! ```no_run
//! use deepfm_checkpoint::{CheckpointConfig, CheckpointManager, JsonCheckpointer, ModelState};
//!
//! fn main() -> deepfm_checkpoint::Result<()> {
//!     let config = CheckpointConfig::new("/tmp/deepfm").with_max_to_keep(5);
//!     let mut manager = CheckpointManager::new(config, JsonCheckpointer::new());
//!
//!     let mut state = ModelState::new(1000);
//!     state.add_dense_param("output/kernel", vec![0.1, -0.2]);
//!     manager.save(&state)?;
//!
//!     let restored = manager.restore_latest()?;
//!     assert_eq!(restored.global_step, 1000);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod checkpointer;
pub mod manager;
pub mod state;

pub use checkpointer::{Checkpointer, JsonCheckpointer};
pub use manager::{CheckpointConfig, CheckpointInfo, CheckpointManager};
pub use state::{ModelState, CHECKPOINT_VERSION};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// I/O error during checkpoint operations.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint file not found.
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    /// Error during serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Error during deserialization.
    #[error("Deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Checkpoint version mismatch.
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version.
        expected: u32,
        /// Found version.
        found: u32,
    },

    /// Checkpoint content does not fit the model it is restored into.
    #[error("Corrupted checkpoint: {0}")]
    Corrupted(String),
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// File name used for the checkpoint at `step`.
pub fn checkpoint_filename(step: u64) -> String {
    format!("checkpoint-{}.json", step)
}

/// Parses the step out of a `checkpoint-<step>.json` file name.
pub fn parse_step(filename: &str) -> Option<u64> {
    filename
        .strip_prefix("checkpoint-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_round_trip() {
        assert_eq!(checkpoint_filename(42), "checkpoint-42.json");
        assert_eq!(parse_step("checkpoint-42.json"), Some(42));
        assert_eq!(parse_step("checkpoint-0.json"), Some(0));
        assert_eq!(parse_step("checkpoint-abc.json"), None);
        assert_eq!(parse_step("summaries.jsonl"), None);
    }

    #[test]
    fn test_error_display() {
        let err = CheckpointError::VersionMismatch {
            expected: 1,
            found: 2,
        };
        assert_eq!(err.to_string(), "Version mismatch: expected 1, found 2");
    }
}
