//! mandelbrot-worker: connects to a manager and computes rows until told to
//! stop.
//!
//! # Usage
//!
//! ```bash
//! mandelbrot-worker 127.0.0.1 5570
//! ```

use anyhow::Context;
use clap::Parser;
use tracing::info;

use taskfarm_dispatch::{DispatchConfig, WorkerClient};
use taskfarm_mandelbrot::MandelbrotTask;

/// Compute Mandelbrot rows for a remote manager.
#[derive(Parser, Debug)]
#[command(name = "mandelbrot-worker", version, about)]
struct Cli {
    /// Manager host name or address.
    host: String,

    /// Manager TCP port.
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut dispatch = DispatchConfig::default();
    dispatch.apply_env_overrides();
    dispatch.validate()?;

    let addr = (cli.host.as_str(), cli.port);
    let client = WorkerClient::<MandelbrotTask>::connect_with(addr, &dispatch.wire)
        .await
        .with_context(|| format!("failed to connect to {}:{}", cli.host, cli.port))?;

    let summary = client.run().await.context("worker session failed")?;
    info!(
        worker = %summary.worker_id,
        rows = summary.tasks_executed,
        "mandelbrot-worker exited cleanly"
    );
    Ok(())
}
