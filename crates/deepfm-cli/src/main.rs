//! DeepFM CLI - train, evaluate and score DeepFM models from JSON-lines data.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use deepfm_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("deepfm=info".parse()?))
        .init();

    let cli = Cli::parse();

    info!("DeepFM CLI starting...");

    match cli.command {
        Commands::Train(cmd) => cmd.run()?,
        Commands::Evaluate(cmd) => cmd.run()?,
        Commands::Predict(cmd) => cmd.run()?,
    }

    info!("DeepFM CLI completed successfully");
    Ok(())
}
