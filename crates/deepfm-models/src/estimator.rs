//! The DeepFM estimator factory.

use deepfm_checkpoint::{CheckpointError, ModelState};
use deepfm_optimizer::SlotOptimizers;
use deepfm_training::{
    BuildContext, Checkpointable, Estimator, EstimatorMode, EstimatorResult, EstimatorSpec,
    ModelFn,
};

use crate::deepfm::DeepFm;
use crate::error::ModelResult;
use crate::features::FeatureBatch;
use crate::model_op::model_optimizer;
use crate::params::DeepFmParams;

/// A built [`DeepFm`] together with its optimizer slots.
#[derive(Debug)]
pub struct DeepFmModelFn {
    model: DeepFm,
    optimizers: SlotOptimizers,
}

impl DeepFmModelFn {
    /// Builds the model from a fresh context seeded with `params.random_seed`.
    pub fn new(params: &DeepFmParams) -> ModelResult<Self> {
        let mut ctx = BuildContext::new(params.random_seed);
        let model = DeepFm::build(params, &mut ctx)?;
        let optimizers = SlotOptimizers::new(params.optimizer.clone())?;
        Ok(Self { model, optimizers })
    }

    /// The wrapped model.
    pub fn model(&self) -> &DeepFm {
        &self.model
    }

    /// Optimizer slots created so far.
    pub fn optimizers(&self) -> &SlotOptimizers {
        &self.optimizers
    }
}

impl Checkpointable for DeepFmModelFn {
    fn model_state(&self, global_step: u64) -> deepfm_checkpoint::Result<ModelState> {
        let mut state = ModelState::new(global_step);
        for (name, values) in self.model.export_params() {
            state.add_dense_param(name, values);
        }
        state.optimizer = self.optimizers.config().name().to_string();
        state.optimizer_slots = self.optimizers.export_state();

        let params = self.model.params();
        state.set_metadata("variant", format!("{:?}", params.variant));
        state.set_metadata("embedding_size", params.embedding_size.to_string());
        state.set_metadata("cate_feats_size", params.cate_feats_size.to_string());
        Ok(state)
    }

    fn load_model_state(&mut self, state: &ModelState) -> deepfm_checkpoint::Result<()> {
        self.model.load_params(state)?;
        let name = self.optimizers.config().name();
        if state.optimizer == name {
            self.optimizers
                .import_state(state.optimizer_slots.clone())
                .map_err(|e| CheckpointError::Corrupted(e.to_string()))?;
        } else {
            tracing::warn!(
                saved = %state.optimizer,
                configured = name,
                "Checkpoint optimizer differs from configuration; starting with fresh slots"
            );
            self.optimizers = SlotOptimizers::new(self.optimizers.config().clone())
                .map_err(|e| CheckpointError::Corrupted(e.to_string()))?;
        }
        Ok(())
    }
}

impl ModelFn for DeepFmModelFn {
    type Features = FeatureBatch;

    fn call(
        &mut self,
        features: &FeatureBatch,
        mode: EstimatorMode,
    ) -> EstimatorResult<EstimatorSpec> {
        Ok(model_optimizer(
            &mut self.model,
            &mut self.optimizers,
            features,
            mode,
        )?)
    }
}

/// Builds a DeepFM estimator from `params`.
///
/// Every call builds the model from scratch in its own [`BuildContext`], so
/// two estimators made from the same parameters start identical. The run
/// configuration (model directory, GPU count, logging, checkpoint and
/// summary intervals) is derived from `params`.
///
/// ```no_run
/// use deepfm_models::{model_estimator, DeepFmParams, FeatureBatch};
///
/// let params = DeepFmParams::new(2, 2, 10, 4, vec![8, 4]).with_model_dir("/tmp/deepfm");
/// let mut estimator = model_estimator(&params).unwrap();
/// let batch = FeatureBatch::new(1, vec![1.0, 2.0], vec![3, 7], Vec::new())
///     .unwrap()
///     .with_labels(vec![1.0])
///     .unwrap();
/// estimator.train(vec![batch.clone(); 10], None).unwrap();
/// let scores = estimator.predict(vec![batch]).unwrap().predictions;
/// assert!(scores[0] > 0.0 && scores[0] < 1.0);
/// ```
pub fn model_estimator(params: &DeepFmParams) -> ModelResult<Estimator<DeepFmModelFn>> {
    let model_fn = DeepFmModelFn::new(params)?;
    let config = params.run_config();
    tracing::info!(
        model_dir = %config.model_dir.display(),
        gpu_device_count = config.gpu_device_count,
        "Created DeepFM estimator"
    );
    Ok(Estimator::new(config, model_fn)?)
}
