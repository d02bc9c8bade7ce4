//! Neural network layers for DeepFM.
//!
//! This crate provides the building blocks the DeepFM model is assembled from:
//!
//! - **Tensor**: row-major `f32` storage with shape-checked ndarray operations
//! - **Dense / MLP**: fully connected layers and ReLU stacks
//! - **Embeddings**: dense row-indexed tables with sparse gradient scatter
//! - **FM**: field-value scaling and the second-order interaction identity
//! - **Dropout**: inverted dropout driven by keep-probability
//! - **Activations**: ReLU and an overflow-safe Sigmoid
//!
//! # Quick Start
//!
//! ```
//! use deepfm_layers::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(2019);
//! let mlp = MLPConfig::new(16)
//!     .add_layer(8, ActivationType::ReLU)
//!     .add_layer(4, ActivationType::ReLU)
//!     .build(&mut rng)
//!     .unwrap();
//!
//! let output = mlp.forward(&Tensor::ones(&[32, 16])).unwrap();
//! assert_eq!(output.shape(), &[32, 4]);
//! ```
//!
//! # Layer Trait
//!
//! Trainable blocks implement [`Layer`]. `forward_train` caches what
//! `backward` needs; `gradients` lines up with `parameters`.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod activation;
pub mod dense;
pub mod dropout;
pub mod embedding;
pub mod error;
pub mod fm;
pub mod initializer;
pub mod layer;
pub mod mlp;
pub mod tensor;

pub use activation::{sigmoid, ReLU, Sigmoid, PROB_EPSILON};
pub use dense::Dense;
pub use dropout::Dropout;
pub use embedding::EmbeddingTable;
pub use error::{LayerError, LayerResult};
pub use fm::{scale_by_field_values, FmSecondOrder};
pub use initializer::Initializer;
pub use layer::Layer;
pub use mlp::{ActivationType, MLPConfig, MLP};
pub use tensor::Tensor;

/// Commonly used items.
pub mod prelude {
    pub use crate::activation::{sigmoid, ReLU, Sigmoid};
    pub use crate::dense::Dense;
    pub use crate::dropout::Dropout;
    pub use crate::embedding::EmbeddingTable;
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::fm::{scale_by_field_values, FmSecondOrder};
    pub use crate::initializer::Initializer;
    pub use crate::layer::Layer;
    pub use crate::mlp::{ActivationType, MLPConfig, MLP};
    pub use crate::tensor::Tensor;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_embedding_into_mlp_gradient_flow() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut table =
            EmbeddingTable::new("emb", 6, 3, Initializer::GlorotNormal, &mut rng).unwrap();
        let mut mlp = MLPConfig::new(6)
            .add_layer(4, ActivationType::ReLU)
            .add_layer(1, ActivationType::None)
            .build(&mut rng)
            .unwrap();

        let ids = [1usize, 4, 2, 2];
        let emb = table.lookup(&ids, &[2, 2]).unwrap();
        let flat = emb.reshape(&[2, 6]).unwrap();
        let out = mlp.forward_train(&flat).unwrap();
        assert_eq!(out.shape(), &[2, 1]);

        let d_flat = mlp.backward(&Tensor::ones(&[2, 1])).unwrap();
        table.accumulate_grad(&ids, &d_flat).unwrap();
        let grads = table.take_gradients();
        let rows: Vec<usize> = grads.iter().map(|(r, _)| *r).collect();
        assert_eq!(rows, vec![1, 2, 4]);
    }

    #[test]
    fn test_dense_parameters_serialize() {
        let mut rng = StdRng::seed_from_u64(1);
        let dense = Dense::new(3, 2, &mut rng).unwrap();
        let json = serde_json::to_string(&dense).unwrap();
        let restored: Dense = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.weights(), dense.weights());
    }
}
