mod cli;
mod engine;
mod error;
mod generator;
mod model;
mod orchestrator;
mod text_summary;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries the stage's status lines.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = cli::Cli::parse();
    cli::run(args).await
}
