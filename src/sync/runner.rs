use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::api::health::HealthState;
use crate::db::{SellOrderStore, SqliteStore, TransactionStore};
use crate::error::Result;
use crate::fetcher::{CoinsClient, PaymentsSource};
use crate::sync::{sync_payments, sync_sell_orders, SyncReport};

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub payments: SyncReport,
    pub sell_orders: SyncReport,
}

pub type LedgerRunner = SyncRunner<CoinsClient, SqliteStore>;

/// Owns the remote source and the store; runs one full pass at a time.
pub struct SyncRunner<S, T> {
    source: S,
    store: T,
    /// Held for the whole pass so the scheduler and `POST /sync` never overlap.
    running: Mutex<()>,
    health: HealthState,
}

impl<S, T> SyncRunner<S, T>
where
    S: PaymentsSource,
    T: TransactionStore + SellOrderStore,
{
    pub fn new(source: S, store: T) -> Self {
        Self {
            source,
            store,
            running: Mutex::new(()),
            health: HealthState::new(),
        }
    }

    pub fn store(&self) -> &T {
        &self.store
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub async fn run_pass(&self) -> Result<PassReport> {
        let _guard = self.running.lock().await;
        let result = self.pass().await;
        self.health.record_pass(result.is_ok(), now_secs());
        result
    }

    async fn pass(&self) -> Result<PassReport> {
        let started = Instant::now();

        let payments = sync_payments(&self.source, &self.store).await?;
        let sell_orders = sync_sell_orders(&self.source, &self.store).await?;

        info!(
            transactions = payments.persisted,
            sell_orders = sell_orders.persisted,
            skipped = payments.skipped.len() + sell_orders.skipped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sync pass complete"
        );
        Ok(PassReport {
            payments,
            sell_orders,
        })
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Background task that runs a sync pass every `interval_secs`.
/// The first pass starts immediately.
pub struct SyncScheduler<S, T> {
    runner: Arc<SyncRunner<S, T>>,
    interval_secs: u64,
}

impl<S, T> SyncScheduler<S, T>
where
    S: PaymentsSource,
    T: TransactionStore + SellOrderStore,
{
    pub fn new(runner: Arc<SyncRunner<S, T>>, interval_secs: u64) -> Self {
        Self {
            runner,
            interval_secs,
        }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.runner.run_pass().await {
                error!("Sync pass failed: {e}");
            }
        }
    }
}
