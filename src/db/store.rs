use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::db::models::{SellOrderRow, TransactionRow};
use crate::error::{Result, ValidationError};
use crate::types::{NormalizedTransaction, SellOrderRecord};

/// Outcome of a successful `validate_and_create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    Inserted,
    /// A row with the same id already existed; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn count_transactions(&self) -> Result<u64>;

    /// Id of the most recent stored transaction by `transaction_date`, if any.
    async fn latest_transaction_id(&self) -> Result<Option<String>>;

    /// Fails with `AppError::Validation` when the record is refused.
    async fn validate_and_create(&self, tx: &NormalizedTransaction) -> Result<Created>;
}

#[async_trait]
pub trait SellOrderStore: Send + Sync {
    async fn count_sell_orders(&self) -> Result<u64>;

    async fn validate_and_create_sell_order(&self, order: &SellOrderRecord) -> Result<Created>;
}

/// SQLite-backed ledger.
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database file and runs the embedded migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database ready at {db_path}");
        Ok(Self::new(pool))
    }

    pub async fn recent_transactions(
        &self,
        transaction_type: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TransactionRow>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, account, transaction_type, status, reward_amount, sell_amount,
                   posted_amount, buy_amount, running_balance, transaction_date,
                   sell_transaction_date, balance_before_reward
            FROM transactions
            WHERE ?1 IS NULL OR transaction_type = ?1
            ORDER BY transaction_date DESC
            LIMIT ?2
            "#,
        )
        .bind(transaction_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn recent_sell_orders(&self, limit: i64) -> Result<Vec<SellOrderRow>> {
        let rows = sqlx::query_as::<_, SellOrderRow>(
            r#"
            SELECT id, amount, status, fee, order_date, phone_number, network, payment_id
            FROM sell_orders
            ORDER BY order_date DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn count_transactions(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn latest_transaction_id(&self) -> Result<Option<String>> {
        // Ties on transaction_date resolve to the row inserted first, which is the
        // one that came first in the newest-first remote stream.
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM transactions ORDER BY transaction_date DESC, rowid ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn validate_and_create(&self, tx: &NormalizedTransaction) -> Result<Created> {
        tx.validate()?;

        let transaction_type = tx.transaction_type.to_string();
        let transaction_date = to_db_timestamp(&tx.transaction_date);
        let sell_transaction_date = tx.sell_transaction_date.as_ref().map(to_db_timestamp);

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO transactions (
                id, account, transaction_type, status,
                reward_amount, sell_amount, posted_amount, buy_amount, running_balance,
                transaction_date, sell_transaction_date, balance_before_reward
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.account)
        .bind(transaction_type)
        .bind(&tx.status)
        .bind(tx.reward_amount)
        .bind(tx.sell_amount)
        .bind(tx.posted_amount)
        .bind(tx.buy_amount)
        .bind(tx.running_balance)
        .bind(transaction_date)
        .bind(sell_transaction_date)
        .bind(tx.balance_before_reward)
        .execute(&self.pool)
        .await?;

        Ok(created_from(result.rows_affected()))
    }
}

#[async_trait]
impl SellOrderStore for SqliteStore {
    async fn count_sell_orders(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sell_orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn validate_and_create_sell_order(&self, order: &SellOrderRecord) -> Result<Created> {
        order.validate()?;
        let order_date = order
            .order_date
            .as_ref()
            .map(to_db_timestamp)
            .ok_or(ValidationError::Missing("order_date"))?;

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sell_orders (
                id, amount, status, fee, order_date, phone_number, network, payment_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id)
        .bind(order.amount)
        .bind(&order.status)
        .bind(order.fee)
        .bind(order_date)
        .bind(&order.phone_number)
        .bind(&order.network)
        .bind(&order.payment_id)
        .execute(&self.pool)
        .await?;

        Ok(created_from(result.rows_affected()))
    }
}

fn created_from(rows_affected: u64) -> Created {
    if rows_affected == 0 {
        Created::Duplicate
    } else {
        Created::Inserted
    }
}

/// Fixed-width UTC form so text ordering matches time ordering.
fn to_db_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
