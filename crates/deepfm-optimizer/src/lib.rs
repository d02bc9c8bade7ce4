//! Parameter optimizers for DeepFM.
//!
//! Each optimizer implements the [`Optimizer`] trait and keeps per-instance
//! slot state (moments, accumulators). [`SlotOptimizers`] owns one optimizer
//! instance per named parameter or embedding row.
//!
//! # Available Optimizers
//!
//! - [`Sgd`] - Stochastic Gradient Descent
//! - [`Adagrad`] - Adaptive Gradient Algorithm
//! - [`Adam`] - Adaptive Moment Estimation
//! - [`Ftrl`] - Follow The Regularized Leader
//!
//! # Example
//!
//! ```
//! use deepfm_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let config = OptimizerConfig::Sgd { learning_rate: 0.01 };
//! let mut optimizer = Sgd::new(config).unwrap();
//!
//! let mut weights = vec![1.0, 2.0, 3.0];
//! let gradients = vec![0.1, 0.2, 0.3];
//!
//! optimizer.apply_gradients(&mut weights, &gradients);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adagrad;
mod adam;
mod ftrl;
mod sgd;
mod slots;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use ftrl::Ftrl;
pub use sgd::Sgd;
pub use slots::SlotOptimizers;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch {
        /// Optimizer that was being built.
        expected: String,
        /// Config variant that was supplied.
        got: String,
    },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Parameter and gradient buffers differ in length.
    #[error("Length mismatch for '{key}': {params} parameters, {grads} gradients")]
    LengthMismatch {
        /// Slot key.
        key: String,
        /// Parameter count.
        params: usize,
        /// Gradient count.
        grads: usize,
    },

    /// Restored slot state does not fit the optimizer.
    #[error("Invalid optimizer state: {0}")]
    InvalidState(String),
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-8
}

fn default_initial_accumulator() -> f32 {
    0.1
}

fn default_learning_rate_power() -> f32 {
    -0.5
}

/// Configuration for different optimizer types.
///
/// Serialized with a `type` tag, e.g.
/// `{"type": "adam", "learning_rate": 0.001}`; omitted hyperparameters take
/// their usual defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },

    /// Adagrad configuration.
    Adagrad {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Initial value for the accumulator.
        #[serde(default = "default_initial_accumulator")]
        initial_accumulator: f32,
        /// Weight decay (L2 regularization) coefficient.
        #[serde(default)]
        weight_decay: f32,
    },

    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        #[serde(default = "default_beta1")]
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        #[serde(default = "default_beta2")]
        beta2: f32,
        /// Small constant for numerical stability.
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },

    /// FTRL configuration.
    Ftrl {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Power for learning rate schedule (typically -0.5).
        #[serde(default = "default_learning_rate_power")]
        learning_rate_power: f32,
        /// L1 regularization strength.
        #[serde(default)]
        l1_reg: f32,
        /// L2 regularization strength.
        #[serde(default)]
        l2_reg: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Adam {
            learning_rate: 1e-3,
            beta1: default_beta1(),
            beta2: default_beta2(),
            epsilon: default_epsilon(),
        }
    }
}

impl OptimizerConfig {
    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adagrad { .. } => "Adagrad",
            OptimizerConfig::Adam { .. } => "Adam",
            OptimizerConfig::Ftrl { .. } => "Ftrl",
        }
    }

    /// Returns the learning rate for the optimizer.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate }
            | OptimizerConfig::Adagrad { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. }
            | OptimizerConfig::Ftrl { learning_rate, .. } => *learning_rate,
        }
    }

    /// Checks hyperparameter ranges.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "{}: learning_rate must be positive, got {lr}",
                self.name()
            )));
        }
        match *self {
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "Adam: betas must be in [0, 1), got ({beta1}, {beta2})"
                    )));
                }
                if epsilon <= 0.0 {
                    return Err(OptimizerError::InvalidParameter(
                        "Adam: epsilon must be positive".to_string(),
                    ));
                }
            }
            OptimizerConfig::Adagrad {
                initial_accumulator,
                ..
            } if initial_accumulator <= 0.0 => {
                return Err(OptimizerError::InvalidParameter(
                    "Adagrad: initial_accumulator must be positive".to_string(),
                ));
            }
            OptimizerConfig::Ftrl { l1_reg, l2_reg, .. } if l1_reg < 0.0 || l2_reg < 0.0 => {
                return Err(OptimizerError::InvalidParameter(
                    "Ftrl: regularization strengths must be non-negative".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Serializable slot state of one optimizer instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Update counter (used by bias-corrected optimizers).
    pub step: u64,
    /// Named slot buffers, e.g. `m` and `v` for Adam.
    pub slots: BTreeMap<String, Vec<f32>>,
}

/// Trait for parameter optimizers.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update `params` in place.
    ///
    /// Slot state is sized on first use; `params` and `gradients` are
    /// expected to have equal lengths.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Snapshot of the slot state.
    fn state(&self) -> OptimizerState;

    /// Restores a snapshot taken by [`Optimizer::state`].
    fn load_state(&mut self, state: OptimizerState) -> Result<(), OptimizerError>;
}

/// Takes a named slot out of a snapshot.
pub(crate) fn take_slot(state: &mut OptimizerState, name: &str) -> Result<Vec<f32>, OptimizerError> {
    state
        .slots
        .remove(name)
        .ok_or_else(|| OptimizerError::InvalidState(format!("missing slot '{name}'")))
}

/// Creates an optimizer from the given configuration.
///
/// # Example
///
/// ```
/// use deepfm_optimizer::{create_optimizer, OptimizerConfig};
///
/// let mut optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
/// let mut weights = vec![1.0];
/// optimizer.apply_gradients(&mut weights, &[1.0]);
/// assert!(weights[0] < 1.0);
/// ```
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adagrad { .. } => Box::new(Adagrad::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
        OptimizerConfig::Ftrl { .. } => Box::new(Ftrl::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send + Sync {
    /// Applies gradients to update `params` in place.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Snapshot of the slot state.
    fn state(&self) -> OptimizerState;

    /// Restores a snapshot.
    fn load_state(&mut self, state: OptimizerState) -> Result<(), OptimizerError>;
}

impl<T: Optimizer + Send + Sync> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }

    fn state(&self) -> OptimizerState {
        Optimizer::state(self)
    }

    fn load_state(&mut self, state: OptimizerState) -> Result<(), OptimizerError> {
        Optimizer::load_state(self, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name_and_learning_rate() {
        let sgd = OptimizerConfig::Sgd { learning_rate: 0.01 };
        assert_eq!(sgd.name(), "Sgd");
        assert!((sgd.learning_rate() - 0.01).abs() < 1e-6);
        assert_eq!(OptimizerConfig::default().name(), "Adam");
    }

    #[test]
    fn test_validate_rejects_bad_hyperparameters() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        assert!(OptimizerConfig::Adam {
            learning_rate: 0.1,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-8
        }
        .validate()
        .is_err());
        assert!(OptimizerConfig::Ftrl {
            learning_rate: 0.1,
            learning_rate_power: -0.5,
            l1_reg: -1.0,
            l2_reg: 0.0
        }
        .validate()
        .is_err());
        assert!(create_optimizer(OptimizerConfig::Sgd { learning_rate: -1.0 }).is_err());
    }

    #[test]
    fn test_create_all_optimizer_types() {
        let configs = vec![
            OptimizerConfig::Sgd { learning_rate: 0.01 },
            OptimizerConfig::Adagrad {
                learning_rate: 0.01,
                initial_accumulator: 0.1,
                weight_decay: 0.0,
            },
            OptimizerConfig::default(),
            OptimizerConfig::Ftrl {
                learning_rate: 0.1,
                learning_rate_power: -0.5,
                l1_reg: 0.0,
                l2_reg: 0.0,
            },
        ];

        for config in configs {
            let optimizer = create_optimizer(config.clone()).unwrap();
            assert_eq!(optimizer.config(), &config);
        }
    }

    #[test]
    fn test_optimizer_config_tagged_json_with_defaults() {
        let config: OptimizerConfig =
            serde_json::from_str(r#"{"type": "adam", "learning_rate": 0.01}"#).unwrap();
        assert_eq!(
            config,
            OptimizerConfig::Adam {
                learning_rate: 0.01,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
            }
        );

        let serialized = serde_json::to_string(&config).unwrap();
        assert!(serialized.contains(r#""type":"adam""#));
        let sgd: OptimizerConfig =
            serde_json::from_str(r#"{"type": "sgd", "learning_rate": 0.5}"#).unwrap();
        assert_eq!(sgd.name(), "Sgd");
    }
}
