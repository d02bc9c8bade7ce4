//! Activation function layers.
//!
//! [`ReLU`] drives the hidden stack of the deep branch and [`Sigmoid`]
//! turns the fused logit into a click probability.

use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Smallest distance a sigmoid output keeps from 0 and 1.
pub const PROB_EPSILON: f32 = 1e-7;

/// Logistic function, computed without overflow and kept inside
/// `[PROB_EPSILON, 1 - PROB_EPSILON]`.
///
/// Infinite logits saturate to those bounds. A NaN logit carries no sign
/// and maps to 0.5.
///
/// ```
/// use deepfm_layers::activation::sigmoid;
///
/// assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
/// assert!(sigmoid(1e4) < 1.0);
/// assert!(sigmoid(-1e4) > 0.0);
/// assert_eq!(sigmoid(f32::NAN), 0.5);
/// ```
pub fn sigmoid(x: f32) -> f32 {
    if x.is_nan() {
        return 0.5;
    }
    let y = if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    };
    y.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON)
}

/// Rectified Linear Unit (ReLU) activation function.
///
/// Computes `f(x) = max(0, x)` element-wise.
///
/// # Example
///
/// ```
/// use deepfm_layers::activation::ReLU;
/// use deepfm_layers::layer::Layer;
/// use deepfm_layers::tensor::Tensor;
///
/// let relu = ReLU::new();
/// let input = Tensor::from_data(&[2, 2], vec![-1.0, 0.0, 1.0, 2.0]).unwrap();
/// let output = relu.forward(&input).unwrap();
/// assert_eq!(output.data(), &[0.0, 0.0, 1.0, 2.0]);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReLU {
    /// Cached input for backward pass
    #[serde(skip)]
    cached_input: Option<Tensor>,
}

impl ReLU {
    /// Creates a new ReLU activation layer.
    pub fn new() -> Self {
        Self { cached_input: None }
    }
}

impl Layer for ReLU {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.map(|x| x.max(0.0)))
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        self.cached_input = Some(input.clone());
        self.forward(input)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        // subgradient at 0 is taken as 0
        let mask = input.map(|x| if x > 0.0 { 1.0 } else { 0.0 });
        grad.mul(&mask)
    }

    fn name(&self) -> &str {
        "ReLU"
    }
}

/// Sigmoid activation function.
///
/// Computes [`sigmoid`] element-wise; the backward pass uses the cached
/// output, `dy/dx = y * (1 - y)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sigmoid {
    #[serde(skip)]
    cached_output: Option<Tensor>,
}

impl Sigmoid {
    /// Creates a new Sigmoid activation layer.
    pub fn new() -> Self {
        Self {
            cached_output: None,
        }
    }
}

impl Layer for Sigmoid {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        Ok(input.map(sigmoid))
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_output = Some(output.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let output = self
            .cached_output
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        grad.mul(&output.map(|y| y * (1.0 - y)))
    }

    fn name(&self) -> &str {
        "Sigmoid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_backward_masks_negative_inputs() {
        let mut relu = ReLU::new();
        let input = Tensor::from_data(&[1, 3], vec![-2.0, 0.0, 3.0]).unwrap();
        relu.forward_train(&input).unwrap();
        let g = relu.backward(&Tensor::ones(&[1, 3])).unwrap();
        assert_eq!(g.data(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_relu_backward_requires_forward() {
        let mut relu = ReLU::new();
        assert!(matches!(
            relu.backward(&Tensor::ones(&[1, 1])),
            Err(LayerError::NotInitialized)
        ));
    }

    #[test]
    fn test_sigmoid_stays_open_interval() {
        for x in [
            f32::NEG_INFINITY,
            -1e30,
            -1e4,
            -50.0,
            -1.0,
            0.0,
            1.0,
            50.0,
            1e4,
            1e30,
            f32::INFINITY,
            f32::NAN,
        ] {
            let y = sigmoid(x);
            assert!(y > 0.0 && y < 1.0, "sigmoid({x}) = {y}");
        }
    }

    #[test]
    fn test_sigmoid_backward() {
        let mut s = Sigmoid::new();
        s.forward_train(&Tensor::zeros(&[1, 1])).unwrap();
        let g = s.backward(&Tensor::ones(&[1, 1])).unwrap();
        assert!((g.data()[0] - 0.25).abs() < 1e-6);
    }
}
