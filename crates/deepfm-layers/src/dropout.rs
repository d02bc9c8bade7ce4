//! Inverted dropout.
//!
//! Parameterized by keep-probability. In training mode each element survives
//! with probability `keep_prob` and survivors are scaled by `1 / keep_prob`;
//! outside training the layer is the identity.

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Dropout layer with its own seeded random stream.
#[derive(Debug, Clone)]
pub struct Dropout {
    keep_prob: f32,
    training: bool,
    rng: StdRng,
    mask: Option<Tensor>,
    cached: bool,
}

impl Dropout {
    /// Creates a dropout layer keeping each element with probability `keep_prob`.
    ///
    /// # Errors
    ///
    /// `keep_prob` must lie in `(0, 1]`.
    pub fn new(keep_prob: f32, seed: u64) -> LayerResult<Self> {
        if !(keep_prob > 0.0 && keep_prob <= 1.0) {
            return Err(LayerError::ConfigError {
                message: format!("keep probability must be in (0, 1], got {keep_prob}"),
            });
        }
        Ok(Self {
            keep_prob,
            training: true,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
            cached: false,
        })
    }

    /// Keep-probability.
    pub fn keep_prob(&self) -> f32 {
        self.keep_prob
    }

    fn is_active(&self) -> bool {
        self.training && self.keep_prob < 1.0
    }
}

impl Layer for Dropout {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.clone())
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        self.cached = true;
        if !self.is_active() {
            self.mask = None;
            return Ok(input.clone());
        }
        let bernoulli =
            Bernoulli::new(f64::from(self.keep_prob)).map_err(|e| LayerError::ConfigError {
                message: e.to_string(),
            })?;
        let scale = 1.0 / self.keep_prob;
        let data = (0..input.numel())
            .map(|_| {
                if bernoulli.sample(&mut self.rng) {
                    scale
                } else {
                    0.0
                }
            })
            .collect();
        let mask = Tensor::from_data(input.shape(), data)?;
        let output = input.mul(&mask)?;
        self.mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        if !self.cached {
            return Err(LayerError::NotInitialized);
        }
        match &self.mask {
            Some(mask) => grad.mul(mask),
            None => Ok(grad.clone()),
        }
    }

    fn name(&self) -> &str {
        "Dropout"
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}
