//! Multi-layer perceptron (MLP) implementation.
//!
//! This module provides the [`MLP`] struct, which is a stack of dense layers
//! with activation functions between them.

use crate::activation::{ReLU, Sigmoid};
use crate::dense::Dense;
use crate::error::{LayerError, LayerResult};
use crate::layer::Layer;
use crate::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation function types supported by MLP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ActivationType {
    /// Rectified Linear Unit
    #[default]
    ReLU,
    /// Sigmoid function
    Sigmoid,
    /// No activation (identity)
    None,
}

/// Configuration for building an MLP.
///
/// # Example
///
/// ```
/// use deepfm_layers::mlp::{ActivationType, MLPConfig};
///
/// let config = MLPConfig::new(128)
///     .add_layer(64, ActivationType::ReLU)
///     .add_layer(32, ActivationType::ReLU);
/// assert_eq!(config.output_dim(), Some(32));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Layer configurations: (output_dim, activation)
    pub layers: Vec<(usize, ActivationType)>,
    /// L2 coefficient applied to every kernel
    pub l2: f32,
}

impl MLPConfig {
    /// Creates a new MLP configuration with the specified input dimension.
    pub fn new(input_dim: usize) -> Self {
        Self {
            input_dim,
            layers: Vec::new(),
            l2: 0.0,
        }
    }

    /// Adds a layer to the MLP configuration.
    pub fn add_layer(mut self, output_dim: usize, activation: ActivationType) -> Self {
        self.layers.push((output_dim, activation));
        self
    }

    /// Sets the kernel L2 coefficient.
    pub fn with_l2(mut self, l2: f32) -> Self {
        self.l2 = l2;
        self
    }

    /// Width of the last layer, if any.
    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(|(dim, _)| *dim)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> LayerResult<()> {
        if self.input_dim == 0 {
            return Err(LayerError::ConfigError {
                message: "Input dimension must be positive".to_string(),
            });
        }
        if self.layers.is_empty() {
            return Err(LayerError::ConfigError {
                message: "MLP must have at least one layer".to_string(),
            });
        }
        for (i, (dim, _)) in self.layers.iter().enumerate() {
            if *dim == 0 {
                return Err(LayerError::ConfigError {
                    message: format!("Layer {} has zero output dimension", i),
                });
            }
        }
        if self.l2.is_nan() || self.l2 < 0.0 {
            return Err(LayerError::ConfigError {
                message: format!("L2 coefficient must be non-negative, got {}", self.l2),
            });
        }
        Ok(())
    }

    /// Builds the MLP, drawing initial weights from `rng`.
    pub fn build<R: Rng + ?Sized>(self, rng: &mut R) -> LayerResult<MLP> {
        self.validate()?;
        let mut dense_layers = Vec::with_capacity(self.layers.len());
        let mut activations = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for (out_dim, activation) in &self.layers {
            dense_layers.push(Dense::new(in_dim, *out_dim, rng)?.with_l2(self.l2));
            activations.push(ActivationLayer::from_type(*activation));
            in_dim = *out_dim;
        }
        Ok(MLP {
            config: self,
            dense_layers,
            activations,
        })
    }
}

/// Wrapper for the activation layers an MLP can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum ActivationLayer {
    ReLU(ReLU),
    Sigmoid(Sigmoid),
    None,
}

impl ActivationLayer {
    fn from_type(activation: ActivationType) -> Self {
        match activation {
            ActivationType::ReLU => Self::ReLU(ReLU::new()),
            ActivationType::Sigmoid => Self::Sigmoid(Sigmoid::new()),
            ActivationType::None => Self::None,
        }
    }

    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        match self {
            Self::ReLU(a) => a.forward(input),
            Self::Sigmoid(a) => a.forward(input),
            Self::None => Ok(input.clone()),
        }
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        match self {
            Self::ReLU(a) => a.forward_train(input),
            Self::Sigmoid(a) => a.forward_train(input),
            Self::None => Ok(input.clone()),
        }
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        match self {
            Self::ReLU(a) => a.backward(grad),
            Self::Sigmoid(a) => a.backward(grad),
            Self::None => Ok(grad.clone()),
        }
    }
}

/// A stack of dense layers, each followed by its activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLP {
    config: MLPConfig,
    dense_layers: Vec<Dense>,
    activations: Vec<ActivationLayer>,
}

impl MLP {
    /// Returns the configuration this MLP was built from.
    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    /// Returns the input dimension.
    pub fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    /// Returns the width of the last layer.
    pub fn output_dim(&self) -> usize {
        self.dense_layers
            .last()
            .map(Dense::out_features)
            .unwrap_or(self.config.input_dim)
    }

    /// Number of dense layers.
    pub fn num_layers(&self) -> usize {
        self.dense_layers.len()
    }

    /// The dense layers, input side first.
    pub fn dense_layers(&self) -> &[Dense] {
        &self.dense_layers
    }
}

impl Layer for MLP {
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
        let mut x = input.clone();
        for (dense, activation) in self.dense_layers.iter().zip(self.activations.iter()) {
            x = dense.forward(&x)?;
            x = activation.forward(&x)?;
        }
        Ok(x)
    }

    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        let mut x = input.clone();
        for (dense, activation) in self
            .dense_layers
            .iter_mut()
            .zip(self.activations.iter_mut())
        {
            x = dense.forward_train(&x)?;
            x = activation.forward_train(&x)?;
        }
        Ok(x)
    }

    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
        let mut g = grad.clone();
        for (dense, activation) in self
            .dense_layers
            .iter_mut()
            .zip(self.activations.iter_mut())
            .rev()
        {
            g = activation.backward(&g)?;
            g = dense.backward(&g)?;
        }
        Ok(g)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.dense_layers
            .iter()
            .flat_map(|d| d.parameters())
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.dense_layers
            .iter_mut()
            .flat_map(|d| d.parameters_mut())
            .collect()
    }

    fn gradients(&self) -> Vec<Option<&Tensor>> {
        self.dense_layers
            .iter()
            .flat_map(|d| d.gradients())
            .collect()
    }

    fn regularization_loss(&self) -> f32 {
        self.dense_layers
            .iter()
            .map(|d| d.regularization_loss())
            .sum()
    }

    fn name(&self) -> &str {
        "MLP"
    }
}
