//! Checkpointer trait and the JSON implementation.
//!
//! A [`Checkpointer`] knows how to write one [`ModelState`] to a path, read it
//! back, and find the newest checkpoint in a directory.

use std::path::{Path, PathBuf};

use crate::state::ModelState;
use crate::{parse_step, CheckpointError, Result};

/// Serialization backend for checkpoints.
///
/// # Example
///
/// ```no_run
/// use deepfm_checkpoint::{Checkpointer, JsonCheckpointer, ModelState};
/// use std::path::Path;
///
/// fn main() -> deepfm_checkpoint::Result<()> {
///     let checkpointer = JsonCheckpointer::new();
///     let state = ModelState::new(1000);
///     checkpointer.save(Path::new("/tmp/deepfm/checkpoint-1000.json"), &state)?;
///     let restored = checkpointer.restore(Path::new("/tmp/deepfm/checkpoint-1000.json"))?;
///     assert_eq!(restored.global_step, 1000);
///     Ok(())
/// }
/// ```
pub trait Checkpointer: Send + Sync {
    /// Writes `state` to `path`, creating parent directories as needed.
    fn save(&self, path: &Path, state: &ModelState) -> Result<()>;

    /// Reads a state previously written by [`Checkpointer::save`].
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] if `path` does not exist, and
    /// [`CheckpointError::VersionMismatch`] for other format versions.
    fn restore(&self, path: &Path) -> Result<ModelState>;

    /// Path of the highest-step checkpoint in `dir`, if any.
    fn latest(&self, dir: &Path) -> Option<PathBuf>;
}

/// JSON-based checkpoint implementation.
#[derive(Debug, Clone, Default)]
pub struct JsonCheckpointer {
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl JsonCheckpointer {
    /// Create a new JSON checkpointer.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Create a new JSON checkpointer with pretty printing.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Checkpointer for JsonCheckpointer {
    fn save(&self, path: &Path, state: &ModelState) -> Result<()> {
        tracing::info!(path = %path.display(), step = state.global_step, "Saving checkpoint");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CheckpointError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let json = if self.pretty {
            serde_json::to_string_pretty(state)
        } else {
            serde_json::to_string(state)
        }
        .map_err(CheckpointError::Serialization)?;

        std::fs::write(path, json).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(
            path = %path.display(),
            size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            "Checkpoint saved"
        );

        Ok(())
    }

    fn restore(&self, path: &Path) -> Result<ModelState> {
        tracing::info!(path = %path.display(), "Restoring checkpoint");

        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }

        let json = std::fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let state: ModelState =
            serde_json::from_str(&json).map_err(CheckpointError::Deserialization)?;
        state.check_version()?;

        tracing::info!(
            path = %path.display(),
            step = state.global_step,
            params = state.dense_params.len(),
            slots = state.optimizer_slots.len(),
            "Checkpoint restored"
        );

        Ok(state)
    }

    fn latest(&self, dir: &Path) -> Option<PathBuf> {
        let entries = std::fs::read_dir(dir).ok()?;
        entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let step = path.file_name().and_then(|f| f.to_str()).and_then(parse_step)?;
                Some((step, path))
            })
            .max_by_key(|(step, _)| *step)
            .map(|(_, path)| path)
    }
}
