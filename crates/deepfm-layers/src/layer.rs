//! Layer trait definition for neural network layers.
//!
//! Every trainable block in the model implements [`Layer`]: an inference
//! forward pass, a caching training forward pass, and a backward pass that
//! stores parameter gradients and returns the gradient for its input.

use crate::error::LayerResult;
use crate::tensor::Tensor;

/// A neural network layer that supports forward and backward propagation.
///
/// # Example
///
/// ```
/// use deepfm_layers::dense::Dense;
/// use deepfm_layers::layer::Layer;
/// use deepfm_layers::tensor::Tensor;
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let layer = Dense::new(128, 64, &mut rng).unwrap();
/// let input = Tensor::zeros(&[32, 128]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
pub trait Layer: Send + Sync {
    /// Performs an inference forward pass.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`](crate::error::LayerError) if the input shape
    /// is incompatible with the layer.
    fn forward(&self, input: &Tensor) -> LayerResult<Tensor>;

    /// Performs a training forward pass, caching what `backward` needs.
    fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
        self.forward(input)
    }

    /// Takes the gradient with respect to the layer's output, stores the
    /// parameter gradients and returns the gradient with respect to the input.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`](crate::error::LayerError::NotInitialized)
    /// if no training forward pass was cached.
    fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor>;

    /// Learnable parameters, in a stable order.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Learnable parameters, mutably, in the same order as [`Layer::parameters`].
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Gradients from the last backward pass, aligned with [`Layer::parameters`].
    fn gradients(&self) -> Vec<Option<&Tensor>> {
        Vec::new()
    }

    /// Regularization penalty contributed by this layer.
    fn regularization_loss(&self) -> f32 {
        0.0
    }

    /// Returns the name of the layer for debugging and logging purposes.
    fn name(&self) -> &str {
        "Layer"
    }

    /// Whether the layer is in training mode.
    fn is_training(&self) -> bool {
        true
    }

    /// Sets the layer's training mode.
    fn set_training(&mut self, _training: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScaleLayer {
        factor: Tensor,
        grad: Option<Tensor>,
        cached: Option<Tensor>,
    }

    impl Layer for ScaleLayer {
        fn forward(&self, input: &Tensor) -> LayerResult<Tensor> {
            Ok(input.scale(self.factor.data()[0]))
        }

        fn forward_train(&mut self, input: &Tensor) -> LayerResult<Tensor> {
            self.cached = Some(input.clone());
            self.forward(input)
        }

        fn backward(&mut self, grad: &Tensor) -> LayerResult<Tensor> {
            let input = self
                .cached
                .as_ref()
                .ok_or(crate::error::LayerError::NotInitialized)?;
            let g = input.mul(grad)?.sum();
            self.grad = Some(Tensor::from_data(&[1], vec![g])?);
            Ok(grad.scale(self.factor.data()[0]))
        }

        fn parameters(&self) -> Vec<&Tensor> {
            vec![&self.factor]
        }

        fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
            vec![&mut self.factor]
        }

        fn gradients(&self) -> Vec<Option<&Tensor>> {
            vec![self.grad.as_ref()]
        }
    }

    #[test]
    fn test_layer_trait_defaults_and_gradients() {
        let mut layer = ScaleLayer {
            factor: Tensor::full(&[1], 2.0),
            grad: None,
            cached: None,
        };
        assert!(layer.backward(&Tensor::ones(&[2])).is_err());

        let input = Tensor::from_data(&[2], vec![1.0, 3.0]).unwrap();
        let out = layer.forward_train(&input).unwrap();
        assert_eq!(out.data(), &[2.0, 6.0]);

        let dx = layer.backward(&Tensor::ones(&[2])).unwrap();
        assert_eq!(dx.data(), &[2.0, 2.0]);
        assert_eq!(layer.gradients()[0].unwrap().data(), &[4.0]);
        assert_eq!(layer.parameters().len(), layer.gradients().len());
        assert_eq!(layer.name(), "Layer");
        assert_eq!(layer.regularization_loss(), 0.0);
    }
}
