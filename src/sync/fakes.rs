//! In-memory stand-ins for the payments API and the ledger store.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{Created, SellOrderStore, TransactionStore};
use crate::error::{AppError, Result};
use crate::fetcher::PaymentsSource;
use crate::types::{
    NormalizedTransaction, PageMeta, Pagination, PaymentsPage, RawEntry, RawSellOrder,
    SellOrderRecord, SellOrdersMeta, SellOrdersPage,
};

pub(crate) fn page(entries: Vec<RawEntry>, next_page: Option<u32>) -> PaymentsPage {
    PaymentsPage {
        meta: PageMeta { next_page },
        entries,
    }
}

/// Serves `pages[n - 1]` for page `n`; unknown pages are a remote error.
#[derive(Default)]
pub(crate) struct FakeSource {
    pages: Vec<PaymentsPage>,
    sell_orders: Vec<RawSellOrder>,
    payment_calls: Mutex<Vec<(u32, u32)>>,
    sell_order_calls: Mutex<Vec<(u32, u64)>>,
}

impl FakeSource {
    pub(crate) fn with_pages(pages: Vec<PaymentsPage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub(crate) fn with_sell_orders(sell_orders: Vec<RawSellOrder>) -> Self {
        Self {
            sell_orders,
            ..Self::default()
        }
    }

    pub(crate) fn payment_calls(&self) -> Vec<(u32, u32)> {
        self.payment_calls.lock().unwrap().clone()
    }

    pub(crate) fn sell_order_calls(&self) -> Vec<(u32, u64)> {
        self.sell_order_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentsSource for FakeSource {
    async fn fetch_payments(&self, page: u32, per_page: u32) -> Result<PaymentsPage> {
        self.payment_calls.lock().unwrap().push((page, per_page));
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .cloned()
            .ok_or_else(|| AppError::Remote(format!("page {page} not found")))
    }

    async fn fetch_sell_orders(&self, limit: u32, offset: u64) -> Result<SellOrdersPage> {
        self.sell_order_calls.lock().unwrap().push((limit, offset));
        let orders = self
            .sell_orders
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(SellOrdersPage {
            meta: SellOrdersMeta {
                pagination: Pagination {
                    total: self.sell_orders.len() as u64,
                },
            },
            orders,
        })
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    transactions: Mutex<Vec<NormalizedTransaction>>,
    sell_orders: Mutex<Vec<SellOrderRecord>>,
}

impl MemoryStore {
    pub(crate) fn seed_transaction(&self, tx: &NormalizedTransaction) {
        self.transactions.lock().unwrap().push(tx.clone());
    }

    pub(crate) fn seed_sell_order(&self, order: &SellOrderRecord) {
        self.sell_orders.lock().unwrap().push(order.clone());
    }

    /// Ids in insertion order.
    pub(crate) fn transaction_ids(&self) -> Vec<String> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.id.clone())
            .collect()
    }

    pub(crate) fn transaction(&self, id: &str) -> Option<NormalizedTransaction> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub(crate) fn sell_order_ids(&self) -> Vec<String> {
        self.sell_orders
            .lock()
            .unwrap()
            .iter()
            .map(|o| o.id.clone())
            .collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn count_transactions(&self) -> Result<u64> {
        Ok(self.transactions.lock().unwrap().len() as u64)
    }

    async fn latest_transaction_id(&self) -> Result<Option<String>> {
        // `rev` so ties go to the earliest inserted, like the SQLite store.
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .max_by_key(|t| t.transaction_date)
            .map(|t| t.id.clone()))
    }

    async fn validate_and_create(&self, tx: &NormalizedTransaction) -> Result<Created> {
        tx.validate()?;
        let mut transactions = self.transactions.lock().unwrap();
        if transactions.iter().any(|t| t.id == tx.id) {
            return Ok(Created::Duplicate);
        }
        transactions.push(tx.clone());
        Ok(Created::Inserted)
    }
}

#[async_trait]
impl SellOrderStore for MemoryStore {
    async fn count_sell_orders(&self) -> Result<u64> {
        Ok(self.sell_orders.lock().unwrap().len() as u64)
    }

    async fn validate_and_create_sell_order(&self, order: &SellOrderRecord) -> Result<Created> {
        order.validate()?;
        let mut orders = self.sell_orders.lock().unwrap();
        if orders.iter().any(|o| o.id == order.id) {
            return Ok(Created::Duplicate);
        }
        orders.push(order.clone());
        Ok(Created::Inserted)
    }
}
