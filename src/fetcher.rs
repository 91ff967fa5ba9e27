use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{Config, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{PaymentsPage, SellOrdersPage};

/// Remote listing endpoints the sync passes read from.
#[async_trait]
pub trait PaymentsSource: Send + Sync {
    /// One page of ledger entries, newest first. Pages start at 1.
    async fn fetch_payments(&self, page: u32, per_page: u32) -> Result<PaymentsPage>;

    async fn fetch_sell_orders(&self, limit: u32, offset: u64) -> Result<SellOrdersPage>;
}

/// reqwest-backed client for the coins.ph v3 API.
pub struct CoinsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CoinsClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.api_url.clone(),
            token: cfg.api_token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AppError::Remote(format!("GET {url} returned {status}: {snippet}")));
        }

        // Decode from text so a malformed body surfaces as a JSON error, not an HTTP one.
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl PaymentsSource for CoinsClient {
    async fn fetch_payments(&self, page: u32, per_page: u32) -> Result<PaymentsPage> {
        let url = format!(
            "{}/crypto-payments?page={}&per_page={}",
            self.base_url, page, per_page
        );
        let page: PaymentsPage = self.get_json(&url).await?;
        debug!(
            entries = page.entries.len(),
            next_page = ?page.meta.next_page,
            "fetched crypto-payments page"
        );
        Ok(page)
    }

    async fn fetch_sell_orders(&self, limit: u32, offset: u64) -> Result<SellOrdersPage> {
        let url = format!(
            "{}/sellorders?limit={}&offset={}",
            self.base_url, limit, offset
        );
        let page: SellOrdersPage = self.get_json(&url).await?;
        debug!(
            orders = page.orders.len(),
            total = page.meta.pagination.total,
            "fetched sell orders"
        );
        Ok(page)
    }
}
