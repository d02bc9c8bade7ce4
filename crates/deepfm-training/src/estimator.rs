//! Estimator pattern for training orchestration.
//!
//! An [`Estimator`] owns a [`ModelFn`] and drives it through training,
//! evaluation and prediction. It restores the newest checkpoint of the model
//! directory before it first touches the model, runs the logging, checkpoint
//! and summary hooks while training, and computes loss and AUC over whole
//! evaluation sets.

use std::collections::BTreeMap;
use std::path::PathBuf;

use deepfm_checkpoint::{
    CheckpointConfig, CheckpointError, CheckpointManager, JsonCheckpointer, ModelState,
};
use thiserror::Error;

use crate::hooks::{CheckpointHook, Hook, HookAction, HookList, LoggingHook, SummaryHook};
use crate::metrics::{accuracy, auc, Metrics, MetricsRecorder};
use crate::run_config::{RunConfig, RunConfigError};

/// Errors that can occur during estimator operations.
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A hook error occurred.
    #[error("Hook error: {0}")]
    Hook(#[from] crate::hooks::HookError),

    /// Saving or restoring a checkpoint failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// The run configuration is invalid.
    #[error("Run config error: {0}")]
    RunConfig(#[from] RunConfigError),

    /// The model function failed.
    #[error("Model error: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The model function returned no loss where one is required.
    #[error("Model function returned no loss in {0:?} mode")]
    MissingLoss(EstimatorMode),

    /// An evaluation error occurred.
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl EstimatorError {
    /// Wraps a model-side error.
    pub fn model(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Model(Box::new(err))
    }
}

/// Result type for estimator operations.
pub type EstimatorResult<T> = Result<T, EstimatorError>;

/// Mode of operation for the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EstimatorMode {
    /// Training mode.
    Train,
    /// Evaluation mode.
    Eval,
    /// Prediction mode.
    Predict,
}

/// What a model function returns for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorSpec {
    /// Mode the batch ran in.
    pub mode: EstimatorMode,
    /// Named per-example outputs.
    pub predictions: BTreeMap<String, Vec<f32>>,
    /// Key of the prediction used for metrics and `predict`.
    pub head_name: String,
    /// Labels of the batch, when it had any.
    pub labels: Option<Vec<f32>>,
    /// Batch loss; required in `Train` and `Eval`.
    pub loss: Option<f64>,
    /// Name of the optimizer that applied the update.
    pub optimizer: Option<String>,
}

impl EstimatorSpec {
    /// Spec whose head prediction `head_name` holds `values`.
    pub fn new(mode: EstimatorMode, head_name: impl Into<String>, values: Vec<f32>) -> Self {
        let head_name = head_name.into();
        let mut predictions = BTreeMap::new();
        predictions.insert(head_name.clone(), values);
        Self {
            mode,
            predictions,
            head_name,
            labels: None,
            loss: None,
            optimizer: None,
        }
    }

    /// Sets the loss.
    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = Some(loss);
        self
    }

    /// Sets the labels.
    pub fn with_labels(mut self, labels: Vec<f32>) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Sets the optimizer name.
    pub fn with_optimizer(mut self, optimizer: impl Into<String>) -> Self {
        self.optimizer = Some(optimizer.into());
        self
    }

    /// The head prediction.
    pub fn head(&self) -> &[f32] {
        self.predictions
            .get(&self.head_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Result of a training run.
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// The final global step.
    pub global_step: u64,
    /// Metrics of the last step, if any step ran.
    pub final_metrics: Option<Metrics>,
    /// Mean loss over the steps of this run.
    pub average_loss: f64,
    /// Whether a hook stopped training early.
    pub stopped_early: bool,
}

/// Result of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvalResult {
    /// The global step at which evaluation was performed.
    pub global_step: u64,
    /// Example-weighted loss, AUC and accuracy.
    pub metrics: Metrics,
    /// Batches evaluated.
    pub num_batches: u64,
    /// Examples evaluated.
    pub num_examples: usize,
}

/// Result of a prediction run.
#[derive(Debug, Clone)]
pub struct PredictResult {
    /// Head predictions, one per example, in input order.
    pub predictions: Vec<f32>,
    /// Number of examples predicted.
    pub num_examples: usize,
}

/// Model parameters that can be written to and read from a [`ModelState`].
pub trait Checkpointable {
    /// Snapshot of all trainable and optimizer state.
    fn model_state(&self, global_step: u64) -> deepfm_checkpoint::Result<ModelState>;

    /// Replaces all state with `state`.
    fn load_model_state(&mut self, state: &ModelState) -> deepfm_checkpoint::Result<()>;
}

/// A model the estimator can drive.
pub trait ModelFn: Checkpointable + Send {
    /// One batch of input.
    type Features;

    /// Runs one batch. `Train` also applies the parameter update.
    fn call(
        &mut self,
        features: &Self::Features,
        mode: EstimatorMode,
    ) -> EstimatorResult<EstimatorSpec>;
}

/// Drives a [`ModelFn`] through training, evaluation and prediction.
///
/// ```no_run
/// # use deepfm_training::{Estimator, ModelFn, RunConfig};
/// # fn run<M: ModelFn>(model_fn: M, train: Vec<M::Features>, eval: Vec<M::Features>)
/// #     -> deepfm_training::EstimatorResult<()> {
/// let mut estimator = Estimator::new(RunConfig::new("/tmp/deepfm"), model_fn)?;
/// estimator.train(train, Some(1000))?;
/// let result = estimator.evaluate(eval)?;
/// println!("loss {} auc {:?}", result.metrics.loss, result.metrics.auc);
/// # Ok(())
/// # }
/// ```
pub struct Estimator<M: ModelFn> {
    config: RunConfig,
    model_fn: M,
    hooks: HookList,
    global_step: u64,
    restored: bool,
}

impl<M: ModelFn> std::fmt::Debug for Estimator<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("global_step", &self.global_step)
            .finish()
    }
}

impl<M: ModelFn> Estimator<M> {
    /// Creates an estimator after validating `config`.
    pub fn new(config: RunConfig, model_fn: M) -> EstimatorResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            model_fn,
            hooks: HookList::new(),
            global_step: 0,
            restored: false,
        })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the current global step.
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// The model function.
    pub fn model_fn(&self) -> &M {
        &self.model_fn
    }

    /// Adds a hook that runs after the built-in ones.
    pub fn add_hook<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.add(hook);
    }

    fn builtin_hooks(&self) -> HookList {
        let mut hooks = HookList::new();
        hooks.add(LoggingHook::new(self.config.log_step_count_steps));
        hooks.add(
            CheckpointHook::new(&self.config.model_dir, self.config.save_checkpoints_steps)
                .with_max_to_keep(self.config.keep_checkpoint_max),
        );
        if self.config.save_summary_steps > 0 {
            hooks.add(SummaryHook::new(
                self.config.summary_path(),
                self.config.save_summary_steps,
            ));
        }
        hooks
    }

    fn checkpoint_manager(&self) -> CheckpointManager<JsonCheckpointer> {
        let config = CheckpointConfig::new(&self.config.model_dir)
            .with_max_to_keep(self.config.keep_checkpoint_max)
            .with_checkpoint_interval(self.config.save_checkpoints_steps);
        CheckpointManager::new(config, JsonCheckpointer::new())
    }

    /// Loads the newest checkpoint of `model_dir`, if there is one, and
    /// returns its step.
    pub fn restore_latest(&mut self) -> EstimatorResult<Option<u64>> {
        self.restored = true;
        let manager = self.checkpoint_manager();
        let Some(path) = manager.latest() else {
            tracing::info!(model_dir = %self.config.model_dir.display(), "No checkpoint to restore");
            return Ok(None);
        };
        let state = manager.restore(&path)?;
        self.model_fn.load_model_state(&state)?;
        self.global_step = state.global_step;
        tracing::info!(step = self.global_step, path = %path.display(), "Restored model");
        Ok(Some(self.global_step))
    }

    fn ensure_restored(&mut self) -> EstimatorResult<()> {
        if !self.restored {
            self.restore_latest()?;
        }
        Ok(())
    }

    /// Trains on `input` until it is exhausted, `steps` more steps have
    /// run, or a hook stops training.
    pub fn train<I>(&mut self, input: I, steps: Option<u64>) -> EstimatorResult<TrainResult>
    where
        I: IntoIterator<Item = M::Features>,
    {
        self.ensure_restored()?;
        let target = steps.map(|s| self.global_step.saturating_add(s));
        let mut builtin = self.builtin_hooks();
        let mut recorder = MetricsRecorder::new();
        let mut last_metrics: Option<Metrics> = None;
        let mut stopped_early = false;

        tracing::info!(
            "Starting training at step {} for {} steps",
            self.global_step,
            steps.map_or_else(|| "unlimited".to_string(), |s| s.to_string())
        );

        builtin.begin(self.global_step)?;
        self.hooks.begin(self.global_step)?;

        for features in input {
            if target.is_some_and(|t| self.global_step >= t) {
                break;
            }
            let spec = self.model_fn.call(&features, EstimatorMode::Train)?;
            let loss = spec
                .loss
                .ok_or(EstimatorError::MissingLoss(EstimatorMode::Train))?;
            self.global_step += 1;

            let metrics = Metrics::new(loss, self.global_step);
            recorder.record(&metrics);

            let builtin_action = builtin.after_step(self.global_step, &metrics, &self.model_fn)?;
            let user_action = self
                .hooks
                .after_step(self.global_step, &metrics, &self.model_fn)?;
            last_metrics = Some(metrics);

            if builtin_action == HookAction::Stop || user_action == HookAction::Stop {
                tracing::info!("Training stopped by hook at step {}", self.global_step);
                stopped_early = true;
                break;
            }
        }

        builtin.end(self.global_step, last_metrics.as_ref(), &self.model_fn)?;
        self.hooks
            .end(self.global_step, last_metrics.as_ref(), &self.model_fn)?;

        Ok(TrainResult {
            global_step: self.global_step,
            final_metrics: last_metrics,
            average_loss: recorder.average_loss(),
            stopped_early,
        })
    }

    /// Evaluates on all of `input`.
    ///
    /// The loss is the example-weighted mean of batch losses; AUC and
    /// accuracy are computed over every labelled example at once.
    pub fn evaluate<I>(&mut self, input: I) -> EstimatorResult<EvalResult>
    where
        I: IntoIterator<Item = M::Features>,
    {
        self.ensure_restored()?;
        tracing::info!("Starting evaluation at step {}", self.global_step);

        let mut loss_sum = 0.0;
        let mut num_batches = 0u64;
        let mut num_examples = 0usize;
        let mut labels = Vec::new();
        let mut scores = Vec::new();

        for features in input {
            let spec = self.model_fn.call(&features, EstimatorMode::Eval)?;
            let loss = spec
                .loss
                .ok_or(EstimatorError::MissingLoss(EstimatorMode::Eval))?;
            let head = spec.head();
            loss_sum += loss * head.len() as f64;
            num_examples += head.len();
            num_batches += 1;
            if let Some(batch_labels) = &spec.labels {
                labels.extend_from_slice(batch_labels);
                scores.extend_from_slice(head);
            }
        }

        if num_examples == 0 {
            return Err(EstimatorError::Evaluation(
                "evaluation input is empty".to_string(),
            ));
        }

        let mut metrics = Metrics::new(loss_sum / num_examples as f64, self.global_step);
        if let Some(value) = auc(&labels, &scores) {
            metrics = metrics.with_auc(value);
        }
        if let Some(value) = accuracy(&labels, &scores) {
            metrics = metrics.with_accuracy(value);
        }

        tracing::info!(
            step = self.global_step,
            examples = num_examples,
            "Evaluation complete: loss = {:.6}, AUC = {}",
            metrics.loss,
            metrics
                .auc
                .map_or_else(|| "n/a".to_string(), |a| format!("{:.4}", a))
        );

        Ok(EvalResult {
            global_step: self.global_step,
            metrics,
            num_batches,
            num_examples,
        })
    }

    /// Head predictions for every example of `input`.
    pub fn predict<I>(&mut self, input: I) -> EstimatorResult<PredictResult>
    where
        I: IntoIterator<Item = M::Features>,
    {
        self.ensure_restored()?;
        let mut predictions = Vec::new();
        for features in input {
            let spec = self.model_fn.call(&features, EstimatorMode::Predict)?;
            predictions.extend_from_slice(spec.head());
        }
        tracing::info!("Predicted {} examples", predictions.len());
        Ok(PredictResult {
            num_examples: predictions.len(),
            predictions,
        })
    }

    /// Writes the current model as a checkpoint and returns its path.
    pub fn export(&mut self) -> EstimatorResult<PathBuf> {
        self.ensure_restored()?;
        let mut manager = self.checkpoint_manager();
        manager.initialize()?;
        let state = self.model_fn.model_state(self.global_step)?;
        let info = manager.save(&state)?;
        tracing::info!(step = self.global_step, path = %info.path.display(), "Exported model");
        Ok(info.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builders() {
        let spec = EstimatorSpec::new(EstimatorMode::Eval, "score", vec![0.2, 0.9])
            .with_loss(0.3)
            .with_labels(vec![0.0, 1.0])
            .with_optimizer("adam");
        assert_eq!(spec.head(), &[0.2, 0.9]);
        assert_eq!(spec.predictions.len(), 1);
        assert_eq!(spec.loss, Some(0.3));
        assert_eq!(spec.optimizer.as_deref(), Some("adam"));
    }

    #[test]
    fn test_missing_head_is_empty() {
        let mut spec = EstimatorSpec::new(EstimatorMode::Predict, "score", vec![0.5]);
        spec.head_name = "other".to_string();
        assert!(spec.head().is_empty());
    }

    #[test]
    fn test_model_error_wraps_source() {
        let err = EstimatorError::model(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert_eq!(err.to_string(), "Model error: boom");
    }
}
