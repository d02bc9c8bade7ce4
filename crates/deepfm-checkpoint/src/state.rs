//! Serializable model state.

use std::collections::BTreeMap;

use deepfm_optimizer::OptimizerState;
use serde::{Deserialize, Serialize};

use crate::{CheckpointError, Result};

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Complete model state for checkpointing.
///
/// Parameters are flattened row-major; their shapes come from the model the
/// state is restored into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    /// Format version.
    pub version: u32,

    /// Global training step.
    pub global_step: u64,

    /// Unix epoch seconds at creation.
    pub timestamp: u64,

    /// Trainable parameters (dense kernels, biases and embedding tables), by name.
    pub dense_params: BTreeMap<String, Vec<f32>>,

    /// Optimizer name the slots belong to.
    #[serde(default)]
    pub optimizer: String,

    /// Per-key optimizer slot state.
    #[serde(default)]
    pub optimizer_slots: BTreeMap<String, OptimizerState>,

    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ModelState {
    /// Creates an empty state at `global_step`.
    pub fn new(global_step: u64) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            global_step,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            dense_params: BTreeMap::new(),
            optimizer: String::new(),
            optimizer_slots: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn add_dense_param(&mut self, name: impl Into<String>, values: Vec<f32>) {
        self.dense_params.insert(name.into(), values);
    }

    /// Sets a metadata value.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Returns the parameter `name`, which must hold exactly `len` values.
    pub fn param(&self, name: &str, len: usize) -> Result<&[f32]> {
        let values = self
            .dense_params
            .get(name)
            .ok_or_else(|| CheckpointError::Corrupted(format!("missing parameter '{name}'")))?;
        if values.len() != len {
            return Err(CheckpointError::Corrupted(format!(
                "parameter '{name}' has {} values, expected {len}",
                values.len()
            )));
        }
        Ok(values)
    }

    /// Total number of stored parameter values.
    pub fn num_values(&self) -> usize {
        self.dense_params.values().map(Vec::len).sum()
    }

    /// Fails unless the state was written by this format version.
    pub fn check_version(&self) -> Result<()> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: CHECKPOINT_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }
}
