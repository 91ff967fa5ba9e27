//! Pulls crypto-payments pages newest first and appends the transactions not
//! yet in the ledger.
//!
//! The pass stops at the newest stored record (the boundary id) or when the
//! remote runs out of pages. A reward that ends a page is carried over: the
//! following page is fetched early, its first entry completes the pair, and the
//! rest of that page is buffered for the next iteration.

use std::time::Instant;

use tracing::{debug, info};

use crate::config::{COLD_START_PAGE_SIZE, RESUME_PAGE_SIZE};
use crate::db::TransactionStore;
use crate::error::Result;
use crate::fetcher::PaymentsSource;
use crate::grouper::{complete_pair, group_entries, Grouped};
use crate::sync::{SkipReason, SyncReport};
use crate::types::{NormalizedTransaction, PaymentsPage, RawEntry, ReasonCode};

pub async fn sync_payments<S, T>(source: &S, store: &T) -> Result<SyncReport>
where
    S: PaymentsSource + ?Sized,
    T: TransactionStore + ?Sized,
{
    PaymentsSync::start(source, store).await?.run().await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Boundary,
}

/// Scan state within one page.
enum Phase {
    Scanning,
    /// The page ended on a reward; `carry` waits for its partner on the next page.
    AwaitingCompletion { carry: RawEntry },
}

struct PaymentsSync<'a, S: ?Sized, T: ?Sized> {
    source: &'a S,
    store: &'a T,
    /// Id of the newest stored transaction; `None` on a cold start.
    boundary: Option<String>,
    per_page: u32,
    /// Next page to fetch. `None` once the oldest page has been read.
    cursor: Option<u32>,
    /// Page already fetched while completing a carried reward, minus a consumed
    /// `sell_order` partner.
    buffered: Option<PaymentsPage>,
    report: SyncReport,
}

impl<'a, S, T> PaymentsSync<'a, S, T>
where
    S: PaymentsSource + ?Sized,
    T: TransactionStore + ?Sized,
{
    async fn start(source: &'a S, store: &'a T) -> Result<Self> {
        let boundary = store.latest_transaction_id().await?;
        let per_page = if boundary.is_some() {
            RESUME_PAGE_SIZE
        } else {
            COLD_START_PAGE_SIZE
        };

        Ok(Self {
            source,
            store,
            boundary,
            per_page,
            cursor: Some(1),
            buffered: None,
            report: SyncReport::default(),
        })
    }

    async fn run(mut self) -> Result<SyncReport> {
        let started = Instant::now();
        info!(
            boundary = ?self.boundary,
            per_page = self.per_page,
            "Payments sync starting"
        );

        loop {
            let page = match self.buffered.take() {
                Some(page) => page,
                None => {
                    let Some(page_no) = self.cursor else { break };
                    self.fetch(page_no).await?
                }
            };
            self.cursor = page.meta.next_page;

            if self.process_page(page.entries).await? == Flow::Boundary {
                self.report.reached_boundary = true;
                break;
            }

            if self.cursor.is_none() {
                break;
            }
        }

        info!(
            pages = self.report.pages_fetched,
            persisted = self.report.persisted,
            duplicates = self.report.duplicates,
            skipped = self.report.skipped.len(),
            reached_boundary = self.report.reached_boundary,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Payments sync complete"
        );
        Ok(self.report)
    }

    async fn fetch(&mut self, page_no: u32) -> Result<PaymentsPage> {
        let page = self.source.fetch_payments(page_no, self.per_page).await?;
        self.report.pages_fetched += 1;
        Ok(page)
    }

    async fn process_page(&mut self, entries: Vec<RawEntry>) -> Result<Flow> {
        let mut phase = Phase::Scanning;

        for grouped in group_entries(&entries) {
            match grouped {
                Grouped::Complete(record) => {
                    if self.accept(record).await? == Flow::Boundary {
                        return Ok(Flow::Boundary);
                    }
                }
                Grouped::Partial(carry) => {
                    phase = Phase::AwaitingCompletion { carry };
                    break;
                }
            }
        }

        match phase {
            Phase::Scanning => Ok(Flow::Continue),
            Phase::AwaitingCompletion { carry } => {
                if self.is_boundary(&carry.id) {
                    return Ok(Flow::Boundary);
                }
                match self.complete(carry).await? {
                    Some(record) => self.accept(record).await,
                    None => Ok(Flow::Continue),
                }
            }
        }
    }

    /// Pairs `carry` with the first entry of the next page and buffers the page.
    async fn complete(&mut self, carry: RawEntry) -> Result<Option<NormalizedTransaction>> {
        let Some(page_no) = self.cursor else {
            self.report.skip(&carry.id, SkipReason::Unpaired);
            return Ok(None);
        };

        let mut next = self.fetch(page_no).await?;
        if next.entries.is_empty() {
            self.buffered = Some(next);
            self.report.skip(&carry.id, SkipReason::Unpaired);
            return Ok(None);
        }

        // A `sell_order` partner is consumed here; any other entry stays on the
        // page so it is grouped in its own right.
        let partner = if next.entries[0].reason_code() == &ReasonCode::SellOrder {
            next.entries.remove(0)
        } else {
            next.entries[0].clone()
        };
        debug!(
            reward_id = %carry.id,
            partner_id = %partner.id,
            page = page_no,
            "completing reward split across pages"
        );
        self.buffered = Some(next);

        let completed = complete_pair(carry.clone(), partner);
        if completed.is_none() {
            self.report.skip(&carry.id, SkipReason::Unpaired);
        }
        Ok(completed)
    }

    async fn accept(&mut self, record: NormalizedTransaction) -> Result<Flow> {
        if self.is_boundary(&record.id) {
            debug!(id = %record.id, "reached last synced transaction");
            return Ok(Flow::Boundary);
        }
        let outcome = self.store.validate_and_create(&record).await;
        self.report.record(&record.id, outcome)?;
        Ok(Flow::Continue)
    }

    fn is_boundary(&self, id: &str) -> bool {
        self.boundary.as_deref() == Some(id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::memory_store;
    use crate::error::ValidationError;
    use crate::grouper::tests::entry;
    use crate::sync::fakes::{page, FakeSource, MemoryStore};
    use crate::types::TransactionType;

    fn buy(id: &str) -> RawEntry {
        entry(id, "buy_order", 1.0, 10.0)
    }

    fn normalized(e: RawEntry) -> NormalizedTransaction {
        match group_entries(&[e]).next() {
            Some(Grouped::Complete(tx)) => tx,
            other => panic!("expected a complete record, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cold_start_pulls_everything_with_large_pages() {
        let source = FakeSource::with_pages(vec![
            page(vec![buy("6"), buy("5")], Some(2)),
            page(vec![buy("4")], None),
        ]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["6", "5", "4"]);
        assert_eq!(report.persisted, 3);
        assert!(!report.reached_boundary);
        assert_eq!(source.payment_calls(), vec![(1, COLD_START_PAGE_SIZE), (2, COLD_START_PAGE_SIZE)]);
    }

    #[tokio::test]
    async fn stops_at_boundary_id() {
        let store = MemoryStore::default();
        store.seed_transaction(&normalized(buy("5")));

        let source = FakeSource::with_pages(vec![
            page(vec![buy("7"), buy("6")], Some(2)),
            page(vec![buy("5"), buy("4")], Some(3)),
            page(vec![buy("3")], None),
        ]);

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["5", "7", "6"]);
        assert_eq!(report.persisted, 2);
        assert!(report.reached_boundary);
        assert_eq!(source.payment_calls(), vec![(1, RESUME_PAGE_SIZE), (2, RESUME_PAGE_SIZE)]);
    }

    #[tokio::test]
    async fn reward_split_across_pages_is_completed() {
        let source = FakeSource::with_pages(vec![
            page(vec![buy("10"), entry("9", "reward", 2.0, 100.0)], Some(2)),
            page(vec![entry("8", "sell_order", 10.0, 90.0), buy("7")], None),
        ]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["10", "9", "7"]);
        let sell = store.transaction("9").unwrap();
        assert_eq!(sell.transaction_type, TransactionType::Sell);
        assert_eq!(sell.posted_amount, -8.0);
        assert_eq!(sell.balance_before_reward, Some(90.0));
        // Page 2 is fetched once and then consumed from the buffer.
        assert_eq!(source.payment_calls().len(), 2);
        assert_eq!(report.pages_fetched, 2);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn buffered_page_keeps_paging_forward() {
        let source = FakeSource::with_pages(vec![
            page(vec![entry("9", "reward", 1.0, 50.0)], Some(2)),
            page(vec![entry("8", "sell_order", 4.0, 49.0), entry("7", "reward", 1.0, 46.0)], Some(3)),
            page(vec![entry("6", "sell_order", 3.0, 45.0), buy("5")], None),
        ]);
        let store = MemoryStore::default();

        sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["9", "7", "5"]);
        assert_eq!(store.transaction("7").unwrap().sell_amount, 3.0);
        let pages: Vec<u32> = source.payment_calls().into_iter().map(|(p, _)| p).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn carried_reward_matching_boundary_stops_without_fetching() {
        let store = MemoryStore::default();
        store.seed_transaction(&normalized(buy("9")));
        let source = FakeSource::with_pages(vec![
            page(vec![buy("10"), entry("9", "reward", 2.0, 100.0)], Some(2)),
            page(vec![entry("8", "sell_order", 10.0, 90.0)], None),
        ]);

        let report = sync_payments(&source, &store).await.unwrap();

        assert!(report.reached_boundary);
        assert_eq!(report.persisted, 1);
        assert_eq!(source.payment_calls().len(), 1);
    }

    #[tokio::test]
    async fn split_reward_as_boundary_stops_pass() {
        let store = MemoryStore::default();
        let boundary = crate::grouper::complete_pair(
            entry("9", "reward", 2.0, 100.0),
            entry("8", "sell_order", 10.0, 90.0),
        )
        .unwrap();
        store.seed_transaction(&boundary);

        let source = FakeSource::with_pages(vec![
            page(vec![buy("12"), buy("11")], Some(2)),
            page(vec![buy("10"), entry("9", "reward", 2.0, 100.0)], Some(3)),
            page(vec![entry("8", "sell_order", 10.0, 90.0), buy("7")], None),
        ]);

        let report = sync_payments(&source, &store).await.unwrap();

        assert!(report.reached_boundary);
        assert_eq!(store.transaction_ids(), vec!["9", "12", "11", "10"]);
    }

    #[tokio::test]
    async fn reward_on_last_page_is_reported_unpaired() {
        let source = FakeSource::with_pages(vec![page(
            vec![buy("3"), entry("2", "reward", 1.0, 5.0)],
            None,
        )]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["3"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "2");
        assert_eq!(report.skipped[0].reason, SkipReason::Unpaired);
    }

    #[tokio::test]
    async fn empty_completion_page_reports_reward_unpaired() {
        let source = FakeSource::with_pages(vec![
            page(vec![buy("10"), entry("9", "reward", 2.0, 100.0)], Some(2)),
            page(vec![], None),
        ]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["10"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "9");
        assert_eq!(report.skipped[0].reason, SkipReason::Unpaired);
        assert_eq!(
            source.payment_calls(),
            vec![(1, COLD_START_PAGE_SIZE), (2, COLD_START_PAGE_SIZE)]
        );
    }

    #[tokio::test]
    async fn completion_page_holding_only_the_partner_follows_its_cursor() {
        let source = FakeSource::with_pages(vec![
            page(vec![entry("9", "reward", 2.0, 100.0)], Some(2)),
            page(vec![entry("8", "sell_order", 10.0, 90.0)], Some(3)),
            page(vec![buy("7")], None),
        ]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["9", "7"]);
        assert_eq!(report.pages_fetched, 3);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test]
    async fn buy_after_reward_is_not_lost() {
        let source = FakeSource::with_pages(vec![page(
            vec![
                entry("9", "reward", 2.0, 100.0),
                buy("8"),
                buy("7"),
            ],
            None,
        )]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["9", "8", "7"]);
        assert_eq!(report.persisted, 3);
    }

    #[tokio::test]
    async fn buy_completing_a_split_reward_is_still_stored() {
        let source = FakeSource::with_pages(vec![
            page(vec![buy("10"), entry("9", "reward", 2.0, 100.0)], Some(2)),
            page(vec![buy("8"), buy("7")], None),
        ]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["10", "9", "8", "7"]);
        assert_eq!(store.transaction("9").unwrap().sell_amount, 1.0);
        assert_eq!(report.pages_fetched, 2);
    }

    #[tokio::test]
    async fn invalid_records_are_skipped_and_reported() {
        let mut bad = buy("6");
        bad.account.clear();
        let source = FakeSource::with_pages(vec![page(vec![buy("7"), bad, buy("5")], None)]);
        let store = MemoryStore::default();

        let report = sync_payments(&source, &store).await.unwrap();

        assert_eq!(store.transaction_ids(), vec!["7", "5"]);
        assert_eq!(report.persisted, 2);
        assert_eq!(
            report.skipped[0].reason,
            SkipReason::Invalid(ValidationError::Missing("account"))
        );
    }

    #[tokio::test]
    async fn remote_failure_ends_the_pass() {
        let source = FakeSource::with_pages(vec![page(vec![buy("7")], Some(2))]);
        let store = MemoryStore::default();

        let result = sync_payments(&source, &store).await;

        assert!(result.is_err());
        assert_eq!(store.transaction_ids(), vec!["7"]);
    }

    #[tokio::test]
    async fn second_run_without_new_records_persists_nothing() {
        let store = memory_store().await;
        let pages = vec![
            page(vec![buy("6"), entry("5", "reward", 1.0, 20.0)], Some(2)),
            page(vec![entry("4", "sell_order", 3.0, 19.0), buy("3")], None),
        ];

        let first = sync_payments(&FakeSource::with_pages(pages.clone()), &store)
            .await
            .unwrap();
        assert_eq!(first.persisted, 3);

        let second = sync_payments(&FakeSource::with_pages(pages), &store)
            .await
            .unwrap();
        assert_eq!(second.persisted, 0);
        assert!(second.reached_boundary);
        assert_eq!(store.count_transactions().await.unwrap(), 3);
    }
}
