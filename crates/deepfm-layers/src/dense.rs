//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear transformation
//! `y = xW + b` where W is the weight matrix and b is the bias vector.

use crate::error::{LayerError, LayerResult};
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A dense (fully connected) neural network layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[batch_size, in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
/// - `y` is the output tensor of shape `[batch_size, out_features]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    /// L2 penalty coefficient applied to the weights
    l2: f32,
    #[serde(skip)]
    weights_grad: Option<Tensor>,
    #[serde(skip)]
    bias_grad: Option<Tensor>,
    #[serde(skip)]
    cached_input: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Dense {
    /// Creates a new dense layer with Glorot-uniform weights and zero bias.
    ///
    /// # Example
    ///
    /// ```
    /// use deepfm_layers::dense::Dense;
    /// use rand::SeedableRng;
    ///
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    /// let layer = Dense::new(64, 32, &mut rng).unwrap();
    /// assert_eq!(layer.weights().shape(), &[64, 32]);
    /// ```
    pub fn new<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> LayerResult<Self> {
        Self::new_with_initializer(
            in_features,
            out_features,
            Initializer::GlorotUniform,
            Initializer::Zeros,
            rng,
        )
    }

    /// Creates a new dense layer with custom initializers.
    pub fn new_with_initializer<R: Rng + ?Sized>(
        in_features: usize,
        out_features: usize,
        weight_init: Initializer,
        bias_init: Initializer,
        rng: &mut R,
    ) -> LayerResult<Self> {
        if in_features == 0 || out_features == 0 {
            return Err(LayerError::ConfigError {
                message: format!(
                    "dense layer needs positive dimensions, got {in_features}x{out_features}"
                ),
            });
        }
        let weights = weight_init.initialize(&[in_features, out_features], rng)?;
        let bias = bias_init.initialize(&[out_features], rng)?;
        Ok(Self {
            weights,
            bias,
            l2: 0.0,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
        })
    }

    /// Creates a dense layer from existing weights and bias.
    pub fn from_weights(weights: Tensor, bias: Tensor) -> LayerResult<Self> {
        weights.expect_rank(2)?;
        let (in_features, out_features) = (weights.shape()[0], weights.shape()[1]);
        if bias.shape() != [out_features] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![out_features],
                actual: bias.shape().to_vec(),
            });
        }
        Ok(Self {
            weights,
            bias,
            l2: 0.0,
            weights_grad: None,
            bias_grad: None,
            cached_input: None,
            in_features,
            out_features,
        })
    }

    /// Sets the L2 coefficient on the weights; the bias is never penalized.
    pub fn with_l2(mut self, l2: f32) -> Self {
        self.l2 = l2;
        self
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a reference to the bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    /// Returns the weight gradients if available.
    pub fn weights_grad(&self) -> Option<&Tensor> {
        self.weights_grad.as_ref()
    }

    /// Returns the bias gradients if available.
    pub fn bias_grad(&self) -> Option<&Tensor> {
        self.bias_grad.as_ref()
    }

    /// Clears the cached input and gradients.
    pub fn clear_cache(&mut self) {
        self.cached_input = None;
        self.weights_grad = None;
        self.bias_grad = None;
    }

    fn check_input(&self, input: &Tensor) -> LayerResult<()> {
        input.expect_rank(2)?;
        let in_dim = input.shape()[1];
        if in_dim != self.in_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features,
                actual: in_dim,
            });
        }
        Ok(())
    }
}

impl Layer for Dense {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        self.check_input(input)?;
        input.matmul(&self.weights)?.add_row_vector(&self.bias)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;

        grad.expect_rank(2)?;
        if grad.shape() != [input.shape()[0], self.out_features] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![input.shape()[0], self.out_features],
                actual: grad.shape().to_vec(),
            });
        }

        // dL/dW = x^T @ dL/dy
        let mut weights_grad = input.transpose()?.matmul(grad)?;
        if self.l2 > 0.0 {
            weights_grad = weights_grad.add(&self.weights.scale(2.0 * self.l2))?;
        }
        self.weights_grad = Some(weights_grad);

        // dL/db = sum(dL/dy, axis=0)
        self.bias_grad = Some(grad.sum_axis(0)?);

        // dL/dx = dL/dy @ W^T
        grad.matmul(&self.weights.transpose()?)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        vec![self.weights_grad.as_ref(), self.bias_grad.as_ref()]
    }

    fn regularization_loss(&self) -> f32 {
        if self.l2 > 0.0 {
            self.l2 * self.weights.data().iter().map(|w| w * w).sum::<f32>()
        } else {
            0.0
        }
    }

    fn name(&self) -> &str {
        "Dense"
    }
}
