use tracing::{info, warn};

use crate::config::SELL_ORDER_MAX_BATCH;
use crate::db::SellOrderStore;
use crate::error::Result;
use crate::fetcher::PaymentsSource;
use crate::sync::SyncReport;
use crate::types::{RawSellOrder, SellOrderRecord};

/// Fetches the sell orders the local store is missing, judged by count.
pub async fn sync_sell_orders<S, T>(source: &S, store: &T) -> Result<SyncReport>
where
    S: PaymentsSource + ?Sized,
    T: SellOrderStore + ?Sized,
{
    sync_sell_orders_batched(source, store, SELL_ORDER_MAX_BATCH).await
}

pub(crate) async fn sync_sell_orders_batched<S, T>(
    source: &S,
    store: &T,
    max_batch: u32,
) -> Result<SyncReport>
where
    S: PaymentsSource + ?Sized,
    T: SellOrderStore + ?Sized,
{
    let mut report = SyncReport::default();

    let stored = store.count_sell_orders().await?;
    let remote_total = source.fetch_sell_orders(1, 0).await?.meta.pagination.total;
    report.pages_fetched += 1;

    if remote_total == stored {
        info!(total = remote_total, "Sell orders already in sync");
        return Ok(report);
    }
    if remote_total < stored {
        warn!(
            remote_total,
            stored, "Remote reports fewer sell orders than stored, nothing fetched"
        );
        return Ok(report);
    }

    let deficit = remote_total - stored;
    let orders = fetch_deficit(source, deficit, max_batch.max(1), &mut report).await?;

    for order in &orders {
        let record = SellOrderRecord::from_remote(order);
        let outcome = store.validate_and_create_sell_order(&record).await;
        report.record(&record.id, outcome)?;
    }

    info!(
        deficit,
        fetched = orders.len(),
        persisted = report.persisted,
        duplicates = report.duplicates,
        skipped = report.skipped.len(),
        "Sell order sync complete"
    );
    Ok(report)
}

/// Accumulates `deficit` orders from offset 0 in batches of at most `max_batch`.
async fn fetch_deficit<S>(
    source: &S,
    deficit: u64,
    max_batch: u32,
    report: &mut SyncReport,
) -> Result<Vec<RawSellOrder>>
where
    S: PaymentsSource + ?Sized,
{
    let mut orders = Vec::with_capacity(deficit.min(10_000) as usize);
    let mut remaining = deficit;
    let mut offset = 0u64;

    while remaining > 0 {
        let limit = remaining.min(u64::from(max_batch)) as u32;
        let batch = source.fetch_sell_orders(limit, offset).await?;
        report.pages_fetched += 1;

        if batch.orders.is_empty() {
            warn!(offset, remaining, "Sell order listing ended before the deficit was met");
            break;
        }
        orders.extend(batch.orders);
        remaining -= u64::from(limit);
        offset += u64::from(limit);
    }

    Ok(orders)
}
