mod api;
mod config;
mod db;
mod error;
mod fetcher;
mod grouper;
mod sync;
mod types;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::error::Result;
use crate::fetcher::CoinsClient;
use crate::sync::{PassReport, SyncRunner, SyncScheduler};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = SqliteStore::open(&cfg.db_path).await?;

    // --- Payments API client ---
    let client = CoinsClient::new(&cfg)?;
    info!("Payments API at {}", cfg.api_url);

    let runner = Arc::new(SyncRunner::new(client, store));

    if cfg.sync_once {
        let report = runner.run_pass().await?;
        log_pass(&report);
        return Ok(());
    }

    // Scheduled sync (background, first pass immediately)
    let scheduler = SyncScheduler::new(Arc::clone(&runner), cfg.sync_interval_secs);
    tokio::spawn(async move { scheduler.run().await });
    info!("Sync scheduled every {}s", cfg.sync_interval_secs);

    // HTTP API server
    let app = router(ApiState { runner });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

fn log_pass(report: &PassReport) {
    for skipped in report
        .payments
        .skipped
        .iter()
        .chain(report.sell_orders.skipped.iter())
    {
        info!(record_id = %skipped.id, reason = ?skipped.reason, "record was not stored");
    }
    info!(
        transactions = report.payments.persisted,
        reached_boundary = report.payments.reached_boundary,
        sell_orders = report.sell_orders.persisted,
        "One-shot sync finished"
    );
}
