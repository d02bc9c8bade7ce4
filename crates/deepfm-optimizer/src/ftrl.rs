//! FTRL (Follow The Regularized Leader) optimizer.
//!
//! FTRL-Proximal is the usual choice for the wide, sparse first-order
//! weights of CTR models; its L1 term drives rarely useful rows to zero.

use crate::{take_slot, Optimizer, OptimizerConfig, OptimizerError, OptimizerState};
use serde::{Deserialize, Serialize};

/// FTRL optimizer for sparse model training.
///
/// ```text
/// n = n + gradient^2
/// sigma = (n^(-p) - n_prev^(-p)) / learning_rate
/// z = z + gradient - sigma * param
/// param = 0                                         if |z| <= l1
/// param = -(z - sign(z) * l1) / (n^(-p) / lr + l2)  otherwise
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ftrl {
    learning_rate: f32,
    learning_rate_power: f32,
    l1_reg: f32,
    l2_reg: f32,
    /// Accumulated squared gradients (n).
    accumulator: Vec<f32>,
    /// Linear term (z).
    linear: Vec<f32>,
    config: OptimizerConfig,
}

impl Ftrl {
    /// Returns the current accumulator state.
    pub fn accumulator(&self) -> &[f32] {
        &self.accumulator
    }

    /// Returns the current linear state.
    pub fn linear(&self) -> &[f32] {
        &self.linear
    }
}

impl Optimizer for Ftrl {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Ftrl {
                learning_rate,
                learning_rate_power,
                l1_reg,
                l2_reg,
            } => Ok(Self {
                learning_rate,
                learning_rate_power,
                l1_reg,
                l2_reg,
                accumulator: Vec::new(),
                linear: Vec::new(),
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Ftrl".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.accumulator.len() != params.len() {
            self.accumulator = vec![0.0; params.len()];
            self.linear = vec![0.0; params.len()];
        }

        let power = -self.learning_rate_power;
        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            if *g == 0.0 {
                continue;
            }
            let n_prev = self.accumulator[i];
            let n_new = n_prev + g * g;
            self.accumulator[i] = n_new;

            let sigma = (n_new.powf(power) - n_prev.powf(power)) / self.learning_rate;
            self.linear[i] += *g - sigma * *p;

            let z = self.linear[i];
            if z.abs() <= self.l1_reg {
                *p = 0.0;
            } else {
                let denominator = n_new.powf(power) / self.learning_rate + self.l2_reg;
                *p = -(z - z.signum() * self.l1_reg) / denominator;
            }
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
        state.slots.insert("linear".to_string(), self.linear.clone());
        state
    }

    fn load_state(&mut self, mut state: OptimizerState) -> Result<(), OptimizerError> {
        self.accumulator = take_slot(&mut state, "accumulator")?;
        self.linear = take_slot(&mut state, "linear")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(l1_reg: f32) -> OptimizerConfig {
        OptimizerConfig::Ftrl {
            learning_rate: 0.1,
            learning_rate_power: -0.5,
            l1_reg,
            l2_reg: 0.0,
        }
    }

    #[test]
    fn test_ftrl_moves_against_gradient() {
        let mut ftrl = Ftrl::new(config(0.0)).unwrap();
        let mut params = vec![0.0];
        ftrl.apply_gradients(&mut params, &[1.0]);
        assert!(params[0] < 0.0);
        assert!((ftrl.accumulator()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ftrl_l1_sparsifies() {
        let mut ftrl = Ftrl::new(config(10.0)).unwrap();
        let mut params = vec![0.5];
        ftrl.apply_gradients(&mut params, &[0.1]);
        assert_eq!(params[0], 0.0);
    }

    #[test]
    fn test_ftrl_skips_untouched_coordinates() {
        let mut ftrl = Ftrl::new(config(0.0)).unwrap();
        let mut params = vec![0.7, 0.7];
        ftrl.apply_gradients(&mut params, &[0.0, 1.0]);
        assert_eq!(params[0], 0.7);
        assert!(params[1] != 0.7);
    }
}
