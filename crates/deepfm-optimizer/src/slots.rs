//! Keyed optimizer instances.
//!
//! Dense tensors and individual embedding rows each get their own optimizer
//! instance, created lazily the first time a key receives a gradient.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::{create_optimizer, OptimizerConfig, OptimizerDyn, OptimizerError, OptimizerState};

/// One optimizer instance per parameter key, all sharing one configuration.
///
/// ```
/// use deepfm_optimizer::{OptimizerConfig, SlotOptimizers};
///
/// let mut slots = SlotOptimizers::new(OptimizerConfig::Sgd { learning_rate: 0.5 }).unwrap();
/// let mut w = vec![1.0, 1.0];
/// slots.apply("dense/kernel", &mut w, &[1.0, -1.0]).unwrap();
/// assert_eq!(w, vec![0.5, 1.5]);
/// ```
pub struct SlotOptimizers {
    config: OptimizerConfig,
    slots: BTreeMap<String, Box<dyn OptimizerDyn>>,
}

impl std::fmt::Debug for SlotOptimizers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotOptimizers")
            .field("config", &self.config)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl SlotOptimizers {
    /// Validates `config` and creates an empty registry.
    pub fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        config.validate()?;
        Ok(Self {
            config,
            slots: BTreeMap::new(),
        })
    }

    /// Shared configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Number of keys that own an optimizer instance.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key has been updated yet.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Applies `grads` to `params` using the instance stored under `key`.
    pub fn apply(&mut self, key: &str, params: &mut [f32], grads: &[f32]) -> Result<(), OptimizerError> {
        if params.len() != grads.len() {
            return Err(OptimizerError::LengthMismatch {
                key: key.to_string(),
                params: params.len(),
                grads: grads.len(),
            });
        }
        let optimizer = match self.slots.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(create_optimizer(self.config.clone())?),
        };
        optimizer.apply_gradients(params, grads);
        Ok(())
    }

    /// Snapshot of every instance's slot state, by key.
    pub fn export_state(&self) -> BTreeMap<String, OptimizerState> {
        self.slots
            .iter()
            .map(|(key, opt)| (key.clone(), opt.state()))
            .collect()
    }

    /// Replaces all instances with ones restored from `states`.
    pub fn import_state(
        &mut self,
        states: BTreeMap<String, OptimizerState>,
    ) -> Result<(), OptimizerError> {
        let mut slots = BTreeMap::new();
        for (key, state) in states {
            let mut optimizer = create_optimizer(self.config.clone())?;
            optimizer.load_state(state)?;
            slots.insert(key, optimizer);
        }
        tracing::debug!(slots = slots.len(), optimizer = self.config.name(), "Restored optimizer slots");
        self.slots = slots;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_created_per_key() {
        let mut slots = SlotOptimizers::new(OptimizerConfig::default()).unwrap();
        assert!(slots.is_empty());
        let mut a = vec![1.0];
        let mut b = vec![1.0, 2.0];
        slots.apply("a", &mut a, &[1.0]).unwrap();
        slots.apply("b", &mut b, &[1.0, 1.0]).unwrap();
        slots.apply("a", &mut a, &[1.0]).unwrap();
        assert_eq!(slots.len(), 2);

        let state = slots.export_state();
        assert_eq!(state["a"].step, 2);
        assert_eq!(state["b"].step, 1);
    }

    #[test]
    fn test_length_mismatch_is_an_error() {
        let mut slots = SlotOptimizers::new(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
        let mut p = vec![0.0; 3];
        assert!(matches!(
            slots.apply("k", &mut p, &[1.0]),
            Err(OptimizerError::LengthMismatch { params: 3, grads: 1, .. })
        ));
    }

    #[test]
    fn test_import_state_resumes_updates() {
        let config = OptimizerConfig::Adagrad {
            learning_rate: 0.1,
            initial_accumulator: 0.1,
            weight_decay: 0.0,
        };
        let mut original = SlotOptimizers::new(config.clone()).unwrap();
        let mut p1 = vec![1.0];
        original.apply("row/3", &mut p1, &[0.5]).unwrap();

        let mut restored = SlotOptimizers::new(config).unwrap();
        restored.import_state(original.export_state()).unwrap();
        let mut p2 = p1.clone();
        original.apply("row/3", &mut p1, &[0.5]).unwrap();
        restored.apply("row/3", &mut p2, &[0.5]).unwrap();
        assert_eq!(p1, p2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(SlotOptimizers::new(OptimizerConfig::Sgd { learning_rate: 0.0 }).is_err());
    }
}
