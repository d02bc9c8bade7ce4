//! Checkpoint lifecycle: saving, restoring, and rotating old checkpoints.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::checkpointer::Checkpointer;
use crate::state::ModelState;
use crate::{checkpoint_filename, parse_step, CheckpointError, Result};

/// Information about a saved checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    /// Path to the checkpoint file.
    pub path: PathBuf,

    /// Global step at which this checkpoint was saved.
    pub global_step: u64,

    /// Unix epoch seconds; 0 for checkpoints discovered on disk.
    pub timestamp: u64,
}

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// Directory where checkpoints are stored.
    pub checkpoint_dir: PathBuf,

    /// Maximum number of checkpoints to keep. 0 keeps all of them.
    pub max_to_keep: usize,

    /// Steps between automatic checkpoints. 0 disables them.
    pub checkpoint_interval: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            max_to_keep: 5,
            checkpoint_interval: 1000,
        }
    }
}

impl CheckpointConfig {
    /// Configuration rooted at `checkpoint_dir` with default limits.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the maximum number of checkpoints to keep.
    pub fn with_max_to_keep(mut self, max_to_keep: usize) -> Self {
        self.max_to_keep = max_to_keep;
        self
    }

    /// Set the checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: u64) -> Self {
        self.checkpoint_interval = interval;
        self
    }
}

/// Manages checkpoint lifecycle including saving, restoring, and cleanup.
///
/// ```no_run
/// use deepfm_checkpoint::{CheckpointConfig, CheckpointManager, JsonCheckpointer, ModelState};
///
/// fn main() -> deepfm_checkpoint::Result<()> {
///     let config = CheckpointConfig::new("/tmp/deepfm").with_max_to_keep(3);
///     let mut manager = CheckpointManager::new(config, JsonCheckpointer::new());
///     manager.initialize()?;
///     manager.save(&ModelState::new(1000))?;
///     let restored = manager.restore_latest()?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct CheckpointManager<C: Checkpointer> {
    config: CheckpointConfig,
    checkpointer: C,
    /// Oldest first.
    checkpoint_history: VecDeque<CheckpointInfo>,
}

impl<C: Checkpointer> CheckpointManager<C> {
    /// Creates a manager with an empty history. Call
    /// [`CheckpointManager::initialize`] to pick up files already on disk.
    pub fn new(config: CheckpointConfig, checkpointer: C) -> Self {
        Self {
            config,
            checkpointer,
            checkpoint_history: VecDeque::new(),
        }
    }

    /// Get the checkpoint directory.
    pub fn checkpoint_dir(&self) -> &Path {
        &self.config.checkpoint_dir
    }

    /// Get the number of tracked checkpoints.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoint_history.len()
    }

    /// Get the configuration.
    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    /// Saves `state` as `checkpoint-<step>.json` and prunes old files.
    ///
    /// Saving the same step twice overwrites the file and keeps a single
    /// history entry.
    pub fn save(&mut self, state: &ModelState) -> Result<CheckpointInfo> {
        let path = self
            .config
            .checkpoint_dir
            .join(checkpoint_filename(state.global_step));

        self.checkpointer.save(&path, state)?;

        let info = CheckpointInfo {
            path,
            global_step: state.global_step,
            timestamp: state.timestamp,
        };
        self.checkpoint_history
            .retain(|c| c.global_step != info.global_step);
        self.checkpoint_history.push_back(info.clone());

        self.cleanup_old()?;

        Ok(info)
    }

    /// Restores the highest-step checkpoint in the directory.
    pub fn restore_latest(&self) -> Result<ModelState> {
        let latest_path = self
            .latest()
            .ok_or_else(|| CheckpointError::NotFound(self.config.checkpoint_dir.clone()))?;
        self.checkpointer.restore(&latest_path)
    }

    /// Path of the highest-step checkpoint in the directory, if any.
    pub fn latest(&self) -> Option<PathBuf> {
        self.checkpointer.latest(&self.config.checkpoint_dir)
    }

    /// Restore a specific checkpoint by path.
    pub fn restore(&self, path: &Path) -> Result<ModelState> {
        self.checkpointer.restore(path)
    }

    /// Removes the oldest checkpoints beyond `max_to_keep`.
    pub fn cleanup_old(&mut self) -> Result<()> {
        if self.config.max_to_keep == 0 {
            return Ok(());
        }
        while self.checkpoint_history.len() > self.config.max_to_keep {
            if let Some(old) = self.checkpoint_history.pop_front() {
                tracing::info!(
                    path = %old.path.display(),
                    step = old.global_step,
                    "Removing old checkpoint"
                );

                if old.path.exists() {
                    std::fs::remove_file(&old.path).map_err(|e| CheckpointError::Io {
                        path: old.path.clone(),
                        source: e,
                    })?;
                }
            }
        }

        Ok(())
    }

    /// All checkpoints in the directory, sorted by step.
    pub fn list_checkpoints(&self) -> Vec<CheckpointInfo> {
        let mut checkpoints: Vec<CheckpointInfo> = match std::fs::read_dir(&self.config.checkpoint_dir) {
            Ok(entries) => entries
                .flatten()
                .filter_map(|entry| {
                    let path = entry.path();
                    let step = path.file_name().and_then(|f| f.to_str()).and_then(parse_step)?;
                    Some(CheckpointInfo {
                        path,
                        global_step: step,
                        timestamp: 0,
                    })
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        checkpoints.sort_by_key(|c| c.global_step);
        checkpoints
    }

    /// Whether `step` falls on the checkpoint interval.
    pub fn should_checkpoint(&self, step: u64) -> bool {
        let interval = self.config.checkpoint_interval;
        interval > 0 && step > 0 && step % interval == 0
    }

    /// Loads the history from checkpoint files already in the directory, so
    /// rotation also covers checkpoints from earlier runs.
    pub fn initialize(&mut self) -> Result<()> {
        self.checkpoint_history = self.list_checkpoints().into();
        tracing::info!(
            dir = %self.config.checkpoint_dir.display(),
            count = self.checkpoint_history.len(),
            "Initialized checkpoint manager"
        );
        self.cleanup_old()
    }
}
