//! Weight initialization.
//!
//! Initializers draw from a caller-supplied RNG so that a model built twice
//! from the same seed has identical weights.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, LayerResult};
use crate::tensor::Tensor;

/// Weight initialization schemes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform: `U(-l, l)` with `l = sqrt(6 / (fan_in + fan_out))`.
    #[default]
    GlorotUniform,
    /// Glorot/Xavier normal: `N(0, sqrt(2 / (fan_in + fan_out)))`.
    GlorotNormal,
    /// Gaussian with explicit moments.
    Normal {
        /// Mean of the distribution.
        mean: f32,
        /// Standard deviation of the distribution.
        stddev: f32,
    },
    /// Uniform on `[low, high)`.
    Uniform {
        /// Lower bound.
        low: f32,
        /// Upper bound.
        high: f32,
    },
    /// All zeros.
    Zeros,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Draws a tensor of `shape` from `rng`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::InitializationError`] for degenerate
    /// distribution parameters.
    pub fn initialize<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> LayerResult<Tensor> {
        let numel: usize = shape.iter().product();
        let data = match *self {
            Initializer::Zeros => vec![0.0; numel],
            Initializer::Constant(value) => vec![value; numel],
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                sample_uniform(-limit, limit, numel, rng)?
            }
            Initializer::GlorotNormal => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                sample_normal(0.0, std, numel, rng)?
            }
            Initializer::Normal { mean, stddev } => sample_normal(mean, stddev, numel, rng)?,
            Initializer::Uniform { low, high } => sample_uniform(low, high, numel, rng)?,
        };
        Tensor::from_data(shape, data)
    }
}

fn sample_normal<R: Rng + ?Sized>(
    mean: f32,
    stddev: f32,
    numel: usize,
    rng: &mut R,
) -> LayerResult<Vec<f32>> {
    let dist = Normal::new(mean, stddev).map_err(|e| LayerError::InitializationError {
        message: format!("normal(mean={mean}, stddev={stddev}): {e}"),
    })?;
    Ok((0..numel).map(|_| dist.sample(rng)).collect())
}

fn sample_uniform<R: Rng + ?Sized>(
    low: f32,
    high: f32,
    numel: usize,
    rng: &mut R,
) -> LayerResult<Vec<f32>> {
    if !(low.is_finite() && high.is_finite() && low < high) {
        return Err(LayerError::InitializationError {
            message: format!("uniform bounds must satisfy low < high, got [{low}, {high})"),
        });
    }
    let dist = Uniform::new(low, high);
    Ok((0..numel).map(|_| dist.sample(rng)).collect())
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [dim] => ((*dim).max(1), (*dim).max(1)),
        [fan_in, fan_out, ..] => ((*fan_in).max(1), (*fan_out).max(1)),
    }
}
