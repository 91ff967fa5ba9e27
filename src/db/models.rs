//! Database row types for the `transactions` and `sell_orders` tables
//! (see `migrations/0001_ledger.sql`). Timestamps are RFC 3339 text in UTC.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: String,
    pub account: String,
    pub transaction_type: String,
    pub status: String,
    pub reward_amount: f64,
    pub sell_amount: f64,
    pub posted_amount: f64,
    pub buy_amount: f64,
    pub running_balance: f64,
    pub transaction_date: String,
    pub sell_transaction_date: Option<String>,
    pub balance_before_reward: Option<f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SellOrderRow {
    pub id: String,
    pub amount: f64,
    pub status: String,
    pub fee: f64,
    pub order_date: String,
    pub phone_number: Option<String>,
    pub network: Option<String>,
    pub payment_id: String,
}
