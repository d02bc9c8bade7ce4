//! DeepFM click-through-rate model.
//!
//! - [`DeepFmParams`]: the parameter bundle, read from JSON
//! - [`FeatureBatch`]: validated continuous, categorical and vector features
//! - [`DeepFm`]: FM first-order and second-order terms, the deep branch and
//!   the sigmoid scoring layer, with a hand-derived backward pass
//! - [`model_optimizer`]: loss, gradients and the optimizer step per mode
//! - [`model_estimator`]: packages a fresh model into an [`Estimator`]
//!
//! # Example
//!
//! ```
//! use deepfm_models::{DeepFm, DeepFmParams, FeatureBatch};
//! use deepfm_training::BuildContext;
//!
//! let params = DeepFmParams::new(2, 2, 10, 4, vec![8, 4]);
//! let model = DeepFm::build(&params, &mut BuildContext::default()).unwrap();
//! let batch = FeatureBatch::new(1, vec![1.0, 2.0], vec![3, 7], Vec::new()).unwrap();
//! let score = model.predict(&batch).unwrap();
//! assert_eq!(score.shape(), &[1, 1]);
//! assert!(score.data()[0] > 0.0 && score.data()[0] < 1.0);
//! ```
//!
//! [`Estimator`]: deepfm_training::Estimator

#![warn(missing_docs)]

pub mod deepfm;
pub mod error;
pub mod estimator;
pub mod features;
pub mod model_op;
pub mod params;

pub use deepfm::{DeepFm, Gradients, FEATS_TABLE, FIRST_ORDER_TABLE};
pub use error::{ModelError, ModelResult};
pub use estimator::{model_estimator, DeepFmModelFn};
pub use features::{batches, read_examples, Example, FeatureBatch};
pub use model_op::{log_loss, model_optimizer, SCORE};
pub use params::{DeepFmParams, ModelVariant};
