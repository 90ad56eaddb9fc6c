//! ripple-worker: runs a reactive node topology until stopped.

mod cli;
mod topology;
mod worker;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use ripple_core::config::load_dotenv;
use ripple_core::RippleConfig;
use ripple_graph::Timer;
use tracing::info;

use crate::cli::CliArgs;
use crate::topology::Topology;
use crate::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => RippleConfig::from_file(path)
            .with_context(|| format!("failed to load config {path}"))?,
        None => RippleConfig::from_env(),
    };
    config.log_summary();

    let topology = Topology::from_file(&args.topology)?;
    let timer = Timer::current().context("no async runtime for the timer")?;
    let mut worker = Worker::build(&topology, &config, timer)?;
    worker.start()?;

    match args.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "run duration elapsed");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
    }

    worker.shutdown();
    Ok(())
}
