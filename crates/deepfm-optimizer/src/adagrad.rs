//! Adagrad optimizer.
//!
//! Adagrad adapts the learning rate per coordinate by dividing by the root of
//! the accumulated squared gradients, which suits sparse embedding rows that
//! are updated only occasionally.

use crate::{take_slot, Optimizer, OptimizerConfig, OptimizerError, OptimizerState};
use serde::{Deserialize, Serialize};

/// Adagrad optimizer with per-parameter adaptive learning rates.
///
/// ```text
/// g = gradient + weight_decay * param
/// accumulator = accumulator + g^2
/// param = param - learning_rate * g / sqrt(accumulator)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adagrad {
    learning_rate: f32,
    initial_accumulator: f32,
    weight_decay: f32,
    accumulator: Vec<f32>,
    config: OptimizerConfig,
}

impl Adagrad {
    /// Returns the current accumulator state.
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }
}

impl Optimizer for Adagrad {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adagrad {
                learning_rate,
                initial_accumulator,
                weight_decay,
            } => Ok(Self {
                learning_rate,
                initial_accumulator,
                weight_decay,
                accumulator: Vec::new(),
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adagrad".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.accumulator.len() != params.len() {
            self.accumulator = vec![self.initial_accumulator; params.len()];
        }

        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            let grad = *g + self.weight_decay * *p;
            self.accumulator[i] += grad * grad;
            *p -= self.learning_rate * grad / self.accumulator[i].sqrt();
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn state(&self) -> OptimizerState {
        let mut state = OptimizerState::default();
        state
            .slots
            .insert("accumulator".to_string(), self.accumulator.clone());
        state
    }

    fn load_state(&mut self, mut state: OptimizerState) -> Result<(), OptimizerError> {
        self.accumulator = take_slot(&mut state, "accumulator")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OptimizerConfig {
        OptimizerConfig::Adagrad {
            learning_rate: 0.1,
            initial_accumulator: 0.1,
            weight_decay: 0.0,
        }
    }

    #[test]
    fn test_adagrad_steps_shrink() {
        let mut adagrad = Adagrad::new(config()).unwrap();
        let mut params = vec![0.0];
        adagrad.apply_gradients(&mut params, &[1.0]);
        let first = -params[0];
        let before = params[0];
        adagrad.apply_gradients(&mut params, &[1.0]);
        let second = before - params[0];
        assert!(first > 0.0);
        assert!(second < first);
        assert!((adagrad.accumulator()[0] - 2.1).abs() < 1e-5);
    }

    #[test]
    fn test_adagrad_state_round_trip() {
        let mut a = Adagrad::new(config()).unwrap();
        let mut params = vec![1.0, 2.0];
        a.apply_gradients(&mut params, &[0.5, -0.5]);

        let mut b = Adagrad::new(config()).unwrap();
        b.load_state(a.state()).unwrap();
        assert_eq!(a.accumulator(), b.accumulator());
        assert!(b.load_state(OptimizerState::default()).is_err());
    }
}
