//! Loss and the per-mode step routine shared by every estimator call.

use deepfm_layers::{Tensor, PROB_EPSILON};
use deepfm_optimizer::SlotOptimizers;
use deepfm_training::{EstimatorMode, EstimatorSpec};

use crate::deepfm::DeepFm;
use crate::error::{ModelError, ModelResult};
use crate::features::FeatureBatch;

/// Name of the prediction head.
pub const SCORE: &str = "score";

/// Mean binary log loss with probabilities clamped away from 0 and 1.
pub fn log_loss(scores: &[f32], labels: &[f32]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let eps = f64::from(PROB_EPSILON);
    let total: f64 = scores
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = f64::from(p).clamp(eps, 1.0 - eps);
            let y = f64::from(y);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / scores.len() as f64
}

fn required_labels<'a>(batch: &'a FeatureBatch, mode: &'static str) -> ModelResult<&'a [f32]> {
    batch.labels().ok_or(ModelError::MissingLabels(mode))
}

/// Runs `model` on one batch in `mode`.
///
/// - `Train`: forward with dropout, log loss plus L2 penalty, backward and
///   one optimizer step.
/// - `Eval`: forward without dropout and log loss.
/// - `Predict`: scores only; labels are optional.
pub fn model_optimizer(
    model: &mut DeepFm,
    optimizers: &mut SlotOptimizers,
    batch: &FeatureBatch,
    mode: EstimatorMode,
) -> ModelResult<EstimatorSpec> {
    match mode {
        EstimatorMode::Train => {
            let labels = required_labels(batch, "train")?;
            let scores = model.forward_train(batch)?;
            let loss = log_loss(scores.data(), labels)
                + f64::from(model.regularization_loss());

            let n = batch.batch_size() as f32;
            let d_logits = Tensor::from_data(
                &[batch.batch_size(), 1],
                scores
                    .data()
                    .iter()
                    .zip(labels)
                    .map(|(p, y)| (p - y) / n)
                    .collect(),
            )?;
            let grads = model.backward(&d_logits)?;
            model.apply_gradients(&grads, optimizers)?;

            tracing::trace!(loss, batch_size = batch.batch_size(), "Train step");
            Ok(EstimatorSpec::new(mode, SCORE, scores.into_data())
                .with_loss(loss)
                .with_labels(labels.to_vec())
                .with_optimizer(optimizers.config().name()))
        }
        EstimatorMode::Eval => {
            let labels = required_labels(batch, "eval")?;
            let scores = model.predict(batch)?;
            let loss = log_loss(scores.data(), labels);
            Ok(EstimatorSpec::new(mode, SCORE, scores.into_data())
                .with_loss(loss)
                .with_labels(labels.to_vec()))
        }
        EstimatorMode::Predict => {
            let scores = model.predict(batch)?;
            let spec = EstimatorSpec::new(mode, SCORE, scores.into_data());
            Ok(match batch.labels() {
                Some(labels) => spec.with_labels(labels.to_vec()),
                None => spec,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DeepFmParams;
    use deepfm_optimizer::OptimizerConfig;
    use deepfm_training::BuildContext;

    fn setup() -> (DeepFm, SlotOptimizers, FeatureBatch) {
        let params = DeepFmParams::new(2, 2, 10, 4, vec![8, 4]);
        let model = DeepFm::build(&params, &mut BuildContext::default()).unwrap();
        let optimizers = SlotOptimizers::new(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
        let batch = FeatureBatch::new(2, vec![1.0, 2.0, 0.5, -1.0], vec![3, 7, 1, 2], Vec::new())
            .unwrap()
            .with_labels(vec![1.0, 0.0])
            .unwrap();
        (model, optimizers, batch)
    }

    #[test]
    fn test_log_loss() {
        assert!((log_loss(&[0.5], &[1.0]) - std::f64::consts::LN_2).abs() < 1e-9);
        assert!(log_loss(&[1.0], &[0.0]).is_finite());
        assert_eq!(log_loss(&[], &[]), 0.0);
    }

    #[test]
    fn test_train_requires_labels() {
        let (mut model, mut opt, _) = setup();
        let unlabelled = FeatureBatch::new(1, vec![1.0, 2.0], vec![3, 7], Vec::new()).unwrap();
        let err = model_optimizer(&mut model, &mut opt, &unlabelled, EstimatorMode::Train)
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingLabels("train")));
        assert!(model_optimizer(&mut model, &mut opt, &unlabelled, EstimatorMode::Predict).is_ok());
    }

    #[test]
    fn test_train_updates_parameters() {
        let (mut model, mut opt, batch) = setup();
        let before = model.export_params();
        let spec = model_optimizer(&mut model, &mut opt, &batch, EstimatorMode::Train).unwrap();
        assert_eq!(spec.head_name, SCORE);
        assert_eq!(spec.head().len(), 2);
        assert_eq!(spec.optimizer.as_deref(), Some("Sgd"));
        assert_ne!(model.export_params(), before);
        assert!(opt.len() > 0);
    }

    #[test]
    fn test_eval_leaves_parameters_alone() {
        let (mut model, mut opt, batch) = setup();
        let before = model.export_params();
        let spec = model_optimizer(&mut model, &mut opt, &batch, EstimatorMode::Eval).unwrap();
        assert!(spec.loss.unwrap() > 0.0);
        assert_eq!(model.export_params(), before);
        assert!(opt.is_empty());
    }
}
