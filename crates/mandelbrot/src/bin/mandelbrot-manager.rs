//! mandelbrot-manager: serves one Mandelbrot row per task to connected
//! workers, then writes the assembled grid.
//!
//! # Usage
//!
//! ```bash
//! mandelbrot-manager 5570
//!
//! # Grid bounds and output path from a config file
//! TASKFARM_CONFIG=taskfarm.toml mandelbrot-manager 5570
//! ```

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use taskfarm_dispatch::ManagerBuilder;
use taskfarm_mandelbrot::{make_tasks, writer, Grid, MandelbrotConfig, MandelbrotTask, RowResult};

/// Distribute a Mandelbrot render across remote workers.
#[derive(Parser, Debug)]
#[command(name = "mandelbrot-manager", version, about)]
struct Cli {
    /// TCP port to listen on.
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
    let mut config = MandelbrotConfig::load().context("failed to load config")?;
    config.dispatch.manager.port = cli.port;

    let params = config.grid;
    info!(
        rows = params.rows(),
        columns = params.columns(),
        max_iterations = params.max_iterations,
        "starting mandelbrot-manager"
    );

    let manager = ManagerBuilder::<MandelbrotTask>::new(config.dispatch.clone())
        .on_result(|worker, row: &RowResult| {
            debug!(worker = %worker, row = row.row, "row received");
        })
        .bind(make_tasks(&params))
        .await
        .with_context(|| format!("failed to start manager on port {}", cli.port))?;

    let report = manager.run().await;
    info!(workers = report.session_count(), "number of workers");
    for session in report.aborted() {
        warn!(
            worker = %session.worker_id,
            peer = %session.peer,
            outcome = ?session.outcome,
            "session aborted"
        );
    }

    let mut grid = Grid::new(params);
    for row in report.into_results() {
        if let Err(e) = grid.insert(row) {
            warn!(error = %e, "discarding malformed row");
        }
    }
    let missing = grid.missing_rows();
    if !missing.is_empty() {
        warn!(
            count = missing.len(),
            rows = ?missing,
            "rows lost with their workers, written as zero"
        );
    }

    let path = config.output.path.clone();
    tokio::task::spawn_blocking(move || writer::write_dat(&path, &grid))
        .await
        .context("writer task failed")?
        .with_context(|| format!("failed to write {}", config.output.path.display()))?;

    info!("mandelbrot-manager exited cleanly");
    Ok(())
}
