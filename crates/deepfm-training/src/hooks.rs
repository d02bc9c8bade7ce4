//! Training hooks for customizing the training loop.
//!
//! Hooks run at fixed points of [`Estimator::train`](crate::Estimator::train):
//! once at the beginning, after every step, and once at the end. The
//! built-in hooks cover logging, checkpointing and summaries.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use deepfm_checkpoint::{CheckpointConfig, CheckpointError, CheckpointManager, JsonCheckpointer};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::estimator::Checkpointable;
use crate::metrics::Metrics;

/// Errors that can occur during hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkpoint error occurred.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A summary record could not be encoded.
    #[error("Summary encoding error: {0}")]
    Summary(#[from] serde_json::Error),

    /// A custom hook error.
    #[error("Hook error: {0}")]
    Custom(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Action to take after a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Continue training normally.
    Continue,
    /// Stop training early.
    Stop,
}

/// Trait for training hooks.
///
/// `step` is the number of completed training steps, so the first call to
/// `after_step` sees `global_step + 1`.
///
/// ```
/// use deepfm_training::estimator::Checkpointable;
/// use deepfm_training::hooks::{Hook, HookAction, HookResult};
/// use deepfm_training::metrics::Metrics;
///
/// struct StopAt(u64);
///
/// impl Hook for StopAt {
///     fn name(&self) -> &str {
///         "stop_at"
///     }
///
///     fn after_step(
///         &mut self,
///         step: u64,
///         _metrics: &Metrics,
///         _model: &dyn Checkpointable,
///     ) -> HookResult<HookAction> {
///         Ok(if step >= self.0 { HookAction::Stop } else { HookAction::Continue })
///     }
/// }
/// ```
pub trait Hook: Send {
    /// Returns the name of this hook for logging purposes.
    fn name(&self) -> &str;

    /// Called once before the first step of a training run.
    fn begin(&mut self, _global_step: u64) -> HookResult<()> {
        Ok(())
    }

    /// Called after each training step.
    fn after_step(
        &mut self,
        _step: u64,
        _metrics: &Metrics,
        _model: &dyn Checkpointable,
    ) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called at the end of training, including after an early stop.
    fn end(
        &mut self,
        _step: u64,
        _metrics: Option<&Metrics>,
        _model: &dyn Checkpointable,
    ) -> HookResult<()> {
        Ok(())
    }
}

/// Logs step, loss and step rate at a fixed interval.
#[derive(Debug)]
pub struct LoggingHook {
    every_n_steps: u64,
    last_log: Option<(u64, Instant)>,
}

impl LoggingHook {
    /// Logs every `every_n_steps` steps (at least every step).
    pub fn new(every_n_steps: u64) -> Self {
        Self {
            every_n_steps: every_n_steps.max(1),
            last_log: None,
        }
    }

    fn should_log(&self, step: u64) -> bool {
        step == 1 || step % self.every_n_steps == 0
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging_hook"
    }

    fn begin(&mut self, global_step: u64) -> HookResult<()> {
        self.last_log = Some((global_step, Instant::now()));
        Ok(())
    }

    fn after_step(
        &mut self,
        step: u64,
        metrics: &Metrics,
        _model: &dyn Checkpointable,
    ) -> HookResult<HookAction> {
        if !self.should_log(step) {
            return Ok(HookAction::Continue);
        }
        let now = Instant::now();
        let steps_per_sec = match self.last_log {
            Some((last_step, at)) => {
                let elapsed = now.duration_since(at).as_secs_f64();
                if elapsed > 0.0 {
                    step.saturating_sub(last_step) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last_log = Some((step, now));

        let mut msg = format!("Step {}: loss = {:.6}", step, metrics.loss);
        if let Some(auc) = metrics.auc {
            msg.push_str(&format!(", AUC = {:.4}", auc));
        }
        info!(step, steps_per_sec, "{}", msg);

        Ok(HookAction::Continue)
    }

    fn end(
        &mut self,
        step: u64,
        metrics: Option<&Metrics>,
        _model: &dyn Checkpointable,
    ) -> HookResult<()> {
        match metrics {
            Some(m) => info!("Training finished at step {}: final loss = {:.6}", step, m.loss),
            None => info!("Training finished at step {}", step),
        }
        Ok(())
    }
}

/// Saves the model state every `save_every_n_steps` steps and once at the
/// end of training, keeping at most `max_to_keep` files (0 keeps all).
pub struct CheckpointHook {
    manager: CheckpointManager<JsonCheckpointer>,
    save_every_n_steps: u64,
    last_saved: Option<u64>,
}

impl std::fmt::Debug for CheckpointHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointHook")
            .field("model_dir", &self.manager.checkpoint_dir())
            .field("save_every_n_steps", &self.save_every_n_steps)
            .field("max_to_keep", &self.manager.config().max_to_keep)
            .finish()
    }
}

impl CheckpointHook {
    /// Checkpoints into `model_dir`. A `save_every_n_steps` of 0 only saves
    /// at the end of training.
    pub fn new(model_dir: impl Into<PathBuf>, save_every_n_steps: u64) -> Self {
        let config = CheckpointConfig::new(model_dir).with_checkpoint_interval(save_every_n_steps);
        Self {
            manager: CheckpointManager::new(config, JsonCheckpointer::new()),
            save_every_n_steps,
            last_saved: None,
        }
    }

    /// Sets the maximum number of checkpoints to keep.
    pub fn with_max_to_keep(mut self, max: usize) -> Self {
        let config = self.manager.config().clone().with_max_to_keep(max);
        self.manager = CheckpointManager::new(config, JsonCheckpointer::new());
        self
    }

    fn save(&mut self, step: u64, model: &dyn Checkpointable) -> HookResult<()> {
        let state = model.model_state(step)?;
        let info = self.manager.save(&state)?;
        self.last_saved = Some(step);
        info!("Saved checkpoint at step {} to {:?}", step, info.path);
        Ok(())
    }
}

impl Hook for CheckpointHook {
    fn name(&self) -> &str {
        "checkpoint_hook"
    }

    fn begin(&mut self, _global_step: u64) -> HookResult<()> {
        self.last_saved = None;
        self.manager.initialize()?;
        Ok(())
    }

    fn after_step(
        &mut self,
        step: u64,
        _metrics: &Metrics,
        model: &dyn Checkpointable,
    ) -> HookResult<HookAction> {
        if self.manager.should_checkpoint(step) {
            self.save(step, model)?;
        }
        Ok(HookAction::Continue)
    }

    fn end(
        &mut self,
        step: u64,
        _metrics: Option<&Metrics>,
        model: &dyn Checkpointable,
    ) -> HookResult<()> {
        if self.last_saved != Some(step) {
            self.save(step, model)?;
        }
        Ok(())
    }
}

/// One line of `summaries.jsonl`.
#[derive(Debug, Serialize)]
struct SummaryRecord {
    step: u64,
    loss: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    auc: Option<f64>,
}

/// Appends `{step, loss}` records to a JSON-lines file.
#[derive(Debug)]
pub struct SummaryHook {
    path: PathBuf,
    every_n_steps: u64,
}

impl SummaryHook {
    /// Writes to `path` every `every_n_steps` steps (at least every step).
    pub fn new(path: impl Into<PathBuf>, every_n_steps: u64) -> Self {
        Self {
            path: path.into(),
            every_n_steps: every_n_steps.max(1),
        }
    }

    fn append(&self, metrics: &Metrics) -> HookResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let record = SummaryRecord {
            step: metrics.global_step,
            loss: metrics.loss,
            auc: metrics.auc,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        debug!(path = %self.path.display(), step = metrics.global_step, "Wrote summary");
        Ok(())
    }
}

impl Hook for SummaryHook {
    fn name(&self) -> &str {
        "summary_hook"
    }

    fn after_step(
        &mut self,
        step: u64,
        metrics: &Metrics,
        _model: &dyn Checkpointable,
    ) -> HookResult<HookAction> {
        if step % self.every_n_steps == 0 {
            self.append(metrics)?;
        }
        Ok(HookAction::Continue)
    }
}

/// A collection of hooks that are run together.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn Hook>>,
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name()))
            .finish()
    }
}

impl HookList {
    /// Creates a new empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to the list.
    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Moves every hook of `other` to the end of this list.
    pub fn extend(&mut self, other: HookList) {
        self.hooks.extend(other.hooks);
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the list has no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs `begin` on all hooks.
    pub fn begin(&mut self, global_step: u64) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.begin(global_step)?;
        }
        Ok(())
    }

    /// Runs `after_step` on all hooks; `Stop` wins once every hook has run.
    pub fn after_step(
        &mut self,
        step: u64,
        metrics: &Metrics,
        model: &dyn Checkpointable,
    ) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_step(step, metrics, model)? == HookAction::Stop {
                debug!(hook = hook.name(), step, "Hook requested stop");
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs `end` on all hooks.
    pub fn end(
        &mut self,
        step: u64,
        metrics: Option<&Metrics>,
        model: &dyn Checkpointable,
    ) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.end(step, metrics, model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepfm_checkpoint::ModelState;
    use tempfile::tempdir;

    struct FixedModel;

    impl Checkpointable for FixedModel {
        fn model_state(&self, global_step: u64) -> deepfm_checkpoint::Result<ModelState> {
            let mut state = ModelState::new(global_step);
            state.add_dense_param("w", vec![1.0, 2.0]);
            Ok(state)
        }

        fn load_model_state(&mut self, _state: &ModelState) -> deepfm_checkpoint::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_logging_hook() {
        let mut hook = LoggingHook::new(10);
        let metrics = Metrics::new(0.5, 1).with_auc(0.7);

        hook.begin(0).unwrap();
        for step in [1, 5, 10] {
            assert_eq!(
                hook.after_step(step, &metrics, &FixedModel).unwrap(),
                HookAction::Continue
            );
        }
        assert!(hook.end(10, Some(&metrics), &FixedModel).is_ok());
    }

    #[test]
    fn test_checkpoint_hook_interval_and_end() {
        let dir = tempdir().unwrap();
        let mut hook = CheckpointHook::new(dir.path(), 100);
        let metrics = Metrics::new(0.5, 0);
        hook.begin(0).unwrap();

        hook.after_step(50, &metrics, &FixedModel).unwrap();
        assert!(!dir.path().join("checkpoint-50.json").exists());

        hook.after_step(100, &metrics, &FixedModel).unwrap();
        assert!(dir.path().join("checkpoint-100.json").exists());

        hook.end(130, None, &FixedModel).unwrap();
        assert!(dir.path().join("checkpoint-130.json").exists());
    }

    #[test]
    fn test_checkpoint_hook_zero_interval_saves_only_at_end() {
        let dir = tempdir().unwrap();
        let mut hook = CheckpointHook::new(dir.path(), 0);
        hook.begin(0).unwrap();
        for step in 1..=5 {
            hook.after_step(step, &Metrics::new(0.1, step), &FixedModel)
                .unwrap();
        }
        assert!(!dir.path().join("checkpoint-5.json").exists());
        hook.end(5, None, &FixedModel).unwrap();
        assert!(dir.path().join("checkpoint-5.json").exists());
    }

    #[test]
    fn test_checkpoint_hook_max_to_keep() {
        let dir = tempdir().unwrap();
        let mut hook = CheckpointHook::new(dir.path(), 1).with_max_to_keep(2);
        hook.begin(0).unwrap();
        let metrics = Metrics::new(0.5, 0);

        for step in 1..=3 {
            hook.after_step(step, &metrics, &FixedModel).unwrap();
        }
        hook.end(3, Some(&metrics), &FixedModel).unwrap();

        assert!(!dir.path().join("checkpoint-1.json").exists());
        assert!(dir.path().join("checkpoint-2.json").exists());
        assert!(dir.path().join("checkpoint-3.json").exists());
    }

    #[test]
    fn test_summary_hook_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.jsonl");
        let mut hook = SummaryHook::new(&path, 2);
        for step in 1..=5 {
            hook.after_step(step, &Metrics::new(0.25, step), &FixedModel)
                .unwrap();
        }
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["step"], 2);
        assert_eq!(lines[1]["step"], 4);
        assert_eq!(lines[1]["loss"], 0.25);
    }

    #[test]
    fn test_hook_list() {
        let dir = tempdir().unwrap();
        let mut hooks = HookList::new();
        hooks.add(LoggingHook::new(10));
        hooks.add(CheckpointHook::new(dir.path(), 100));
        assert_eq!(hooks.len(), 2);

        let metrics = Metrics::new(0.5, 1);
        hooks.begin(0).unwrap();
        assert_eq!(
            hooks.after_step(1, &metrics, &FixedModel).unwrap(),
            HookAction::Continue
        );
        hooks.end(100, Some(&metrics), &FixedModel).unwrap();
        assert!(dir.path().join("checkpoint-100.json").exists());
    }
}
