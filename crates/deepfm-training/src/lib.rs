//! Training orchestration for DeepFM.
//!
//! - **Estimator**: train, evaluate, predict and export around a [`ModelFn`]
//! - **Hooks**: logging, checkpointing and JSON-lines summaries
//! - **Metrics**: loss averaging and ROC AUC
//! - **Run configuration**: model directory and step intervals
//! - **Build context**: the seeded RNG a model is built from
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      Estimator                        │
//! │  ┌───────────┐  ┌───────────────┐  ┌───────────────┐  │
//! │  │  ModelFn  │  │ Hooks (log,   │  │  RunConfig    │  │
//! │  │           │  │ ckpt, summary)│  │               │  │
//! │  └───────────┘  └───────────────┘  └───────────────┘  │
//! └───────────────────────────────────────────────────────┘
//!                           │
//!           ┌───────────────┼───────────────┐
//!           ▼               ▼               ▼
//!       train()        evaluate()       predict()
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod estimator;
pub mod hooks;
pub mod metrics;
pub mod run_config;

pub use context::{BuildContext, DEFAULT_SEED};
pub use estimator::{
    Checkpointable, EstimatorError, EstimatorMode, EstimatorResult, EstimatorSpec, EvalResult,
    Estimator, ModelFn, PredictResult, TrainResult,
};
pub use hooks::{
    CheckpointHook, Hook, HookAction, HookError, HookList, HookResult, LoggingHook, SummaryHook,
};
pub use metrics::{auc, Metrics, MetricsRecorder};
pub use run_config::{RunConfig, RunConfigError};
