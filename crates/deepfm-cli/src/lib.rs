//! DeepFM CLI Library
//!
//! - **Train**: fit a model on a JSON-lines file, optionally evaluating afterwards
//! - **Evaluate**: log loss and AUC of the latest checkpoint
//! - **Predict**: per-example click probabilities
//!
//! # Example
//!
//! ```bash
//! deepfm train --config params.json --data train.jsonl --eval-data eval.jsonl --steps 10000
//! deepfm evaluate --config params.json --data eval.jsonl
//! deepfm predict --config params.json --data test.jsonl --output scores.jsonl
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{EvaluateCommand, PredictCommand, TrainCommand};

/// DeepFM - factorization-machine and deep click-through-rate model
#[derive(Parser, Debug)]
#[command(name = "deepfm")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model, resuming from the latest checkpoint in its model directory
    Train(TrainCommand),

    /// Evaluate the latest checkpoint
    Evaluate(EvaluateCommand),

    /// Score examples with the latest checkpoint
    Predict(PredictCommand),
}
