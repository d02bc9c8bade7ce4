//! Stochastic Gradient Descent optimizer.

use crate::{Optimizer, OptimizerConfig, OptimizerError, OptimizerState};
use serde::{Deserialize, Serialize};

/// Stochastic Gradient Descent optimizer.
///
/// Updates parameters using the formula:
/// `param = param - learning_rate * gradient`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    config: OptimizerConfig,
}

impl Sgd {
    /// Creates a new SGD optimizer with the given learning rate.
    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            config: OptimizerConfig::Sgd { learning_rate },
        }
    }
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self {
                learning_rate,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        for (p, g) in params.iter_mut().zip(gradients.iter()) {
            *p -= self.learning_rate * g;
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn state(&self) -> OptimizerState {
        OptimizerState::default()
    }

    fn load_state(&mut self, _state: OptimizerState) -> Result<(), OptimizerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_basic_update() {
        let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
        let mut params = vec![1.0, 2.0, 3.0];
        sgd.apply_gradients(&mut params, &[1.0, 1.0, 1.0]);

        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] - 1.9).abs() < 1e-6);
        assert!((params[2] - 2.9).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_config_mismatch() {
        let result = Sgd::new(OptimizerConfig::default());
        result.expect_err("SGD constructor should fail when config variant is not SGD");
    }

    #[test]
    fn test_sgd_with_learning_rate() {
        let sgd = Sgd::with_learning_rate(0.05);
        assert!(matches!(
            sgd.config(),
            OptimizerConfig::Sgd { learning_rate } if (*learning_rate - 0.05).abs() < 1e-6
        ));
        assert!(sgd.state().slots.is_empty());
    }
}
