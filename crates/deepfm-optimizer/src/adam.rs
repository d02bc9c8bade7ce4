//! Adam optimizer.
//!
//! Adam (Adaptive Moment Estimation) keeps exponential moving averages of
//! the gradients (first moment) and squared gradients (second moment).
//!
//! # Example
//!
//! ```
//! use deepfm_optimizer::{Adam, Optimizer, OptimizerConfig};
//!
//! let mut adam = Adam::new(OptimizerConfig::default()).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! adam.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]);
//! assert_eq!(adam.timestep(), 1);
//! ```

use crate::{take_slot, Optimizer, OptimizerConfig, OptimizerError, OptimizerState};
use serde::{Deserialize, Serialize};

/// Adam optimizer with adaptive learning rates and momentum.
///
/// ```text
/// m = beta1 * m + (1 - beta1) * gradient
/// v = beta2 * v + (1 - beta2) * gradient^2
/// m_hat = m / (1 - beta1^t)
/// v_hat = v / (1 - beta2^t)
/// param = param - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimates.
    m: Vec<f32>,
    /// Second moment estimates.
    v: Vec<f32>,
    /// Timestep for bias correction.
    t: u64,
    config: OptimizerConfig,
}

impl Adam {
    /// Returns the current first moment state.
    pub fn first_moment(&self) -> &[f32] {
        &self.m
    }

    /// Returns the current second moment state.
    pub fn second_moment(&self) -> &[f32] {
        &self.v
    }

    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Ok(Self {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                m: Vec::new(),
                v: Vec::new(),
                t: 0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }

        self.t += 1;
        let exponent = i32::try_from(self.t).unwrap_or(i32::MAX);
        let bias_correction1 = 1.0 - self.beta1.powi(exponent);
        let bias_correction2 = 1.0 - self.beta2.powi(exponent);

        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn state(&self) -> OptimizerState {
        let mut state = OptimizerState {
            step: self.t,
            ..OptimizerState::default()
        };
        state.slots.insert("m".to_string(), self.m.clone());
        state.slots.insert("v".to_string(), self.v.clone());
        state
    }

    fn load_state(&mut self, mut state: OptimizerState) -> Result<(), OptimizerError> {
        let m = take_slot(&mut state, "m")?;
        let v = take_slot(&mut state, "v")?;
        if m.len() != v.len() {
            return Err(OptimizerError::InvalidState(format!(
                "Adam moments differ in length: {} vs {}",
                m.len(),
                v.len()
            )));
        }
        self.m = m;
        self.v = v;
        self.t = state.step;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(learning_rate: f32) -> OptimizerConfig {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    #[test]
    fn test_adam_basic_update() {
        let mut adam = Adam::new(config(0.1)).unwrap();
        let mut params = vec![1.0, 2.0, 3.0];
        adam.apply_gradients(&mut params, &[1.0, 1.0, 1.0]);

        // first bias-corrected step moves each coordinate by ~learning_rate
        assert!((params[0] - 0.9).abs() < 1e-4);
        assert!((params[2] - 2.9).abs() < 1e-4);
    }

    #[test]
    fn test_adam_timestep_increment() {
        let mut adam = Adam::new(config(0.001)).unwrap();
        let mut params = vec![1.0];
        assert_eq!(adam.timestep(), 0);
        adam.apply_gradients(&mut params, &[1.0]);
        adam.apply_gradients(&mut params, &[1.0]);
        assert_eq!(adam.timestep(), 2);
        assert!(adam.first_moment()[0] > 0.0);
        assert!(adam.second_moment()[0] > 0.0);
    }

    #[test]
    fn test_adam_zero_gradient() {
        let mut adam = Adam::new(config(0.001)).unwrap();
        let mut params = vec![1.0, 2.0, 3.0];
        adam.apply_gradients(&mut params, &[0.0, 0.0, 0.0]);
        assert_eq!(params, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_adam_state_round_trip_continues_identically() {
        let mut a = Adam::new(config(0.05)).unwrap();
        let mut pa = vec![0.5, -0.5];
        a.apply_gradients(&mut pa, &[0.3, -0.1]);

        let mut b = Adam::new(config(0.05)).unwrap();
        b.load_state(a.state()).unwrap();
        let mut pb = pa.clone();

        a.apply_gradients(&mut pa, &[0.2, 0.2]);
        b.apply_gradients(&mut pb, &[0.2, 0.2]);
        assert_eq!(pa, pb);
        assert_eq!(b.timestep(), 2);
    }

    #[test]
    fn test_adam_config_mismatch() {
        assert!(Adam::new(OptimizerConfig::Sgd { learning_rate: 0.01 }).is_err());
    }
}
