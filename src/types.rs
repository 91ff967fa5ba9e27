use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Raw ledger entries (crypto-payments endpoint)
// ---------------------------------------------------------------------------

/// What produced a ledger entry. Unknown codes are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Option<String>")]
pub enum ReasonCode {
    SellOrder,
    BuyOrder,
    Reward,
    Other(String),
}

impl Default for ReasonCode {
    fn default() -> Self {
        ReasonCode::Other(String::new())
    }
}

impl From<Option<String>> for ReasonCode {
    fn from(code: Option<String>) -> Self {
        match code.as_deref() {
            Some("sell_order") => ReasonCode::SellOrder,
            Some("buy_order") => ReasonCode::BuyOrder,
            Some("reward") => ReasonCode::Reward,
            _ => ReasonCode::Other(code.unwrap_or_default()),
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReasonCode::SellOrder => write!(f, "sell_order"),
            ReasonCode::BuyOrder => write!(f, "buy_order"),
            ReasonCode::Reward => write!(f, "reward"),
            ReasonCode::Other(code) => write!(f, "{code}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub reason_code: ReasonCode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEntry {
    pub id: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub reference: Reference,
    #[serde(default)]
    pub status: String,
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(deserialize_with = "de_amount")]
    pub posted_amount: f64,
    #[serde(deserialize_with = "de_amount")]
    pub running_balance: f64,
    pub created_at: DateTime<Utc>,
}

impl RawEntry {
    pub fn reason_code(&self) -> &ReasonCode {
        &self.reference.reason_code
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageMeta {
    /// Absent on the oldest page.
    #[serde(default)]
    pub next_page: Option<u32>,
}

/// One page of the crypto-payments listing, newest entry first.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsPage {
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(rename = "crypto-payments", default)]
    pub entries: Vec<RawEntry>,
}

// ---------------------------------------------------------------------------
// Raw sell orders (sellorders endpoint)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SellOrderPayment {
    #[serde(default)]
    pub transaction_ref: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSellOrder {
    pub id: String,
    #[serde(deserialize_with = "de_amount")]
    pub amount: f64,
    #[serde(default)]
    pub delivery_status: String,
    #[serde(default, deserialize_with = "de_amount")]
    pub currency_fees: f64,
    /// Unix seconds.
    #[serde(deserialize_with = "de_unix_secs")]
    pub created_time: i64,
    #[serde(default)]
    pub phone_number_load: Option<String>,
    #[serde(default)]
    pub payment_outlet_name: Option<String>,
    #[serde(default)]
    pub payments: Vec<SellOrderPayment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SellOrdersMeta {
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellOrdersPage {
    #[serde(default)]
    pub meta: SellOrdersMeta,
    #[serde(default)]
    pub orders: Vec<RawSellOrder>,
}

// ---------------------------------------------------------------------------
// Normalized records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Buy,
    Sell,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Buy => write!(f, "buy"),
            TransactionType::Sell => write!(f, "sell"),
        }
    }
}

/// A ledger transaction ready for persistence.
///
/// Buy records carry `buy_amount` and zero reward/sell amounts. Sell records
/// carry `reward_amount` + `sell_amount`, a negative `posted_amount`, and the
/// paired sell entry's date and balance.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTransaction {
    pub id: String,
    pub account: String,
    pub transaction_type: TransactionType,
    pub status: String,
    pub reward_amount: f64,
    pub sell_amount: f64,
    pub posted_amount: f64,
    pub buy_amount: f64,
    pub running_balance: f64,
    pub transaction_date: DateTime<Utc>,
    pub sell_transaction_date: Option<DateTime<Utc>>,
    pub balance_before_reward: Option<f64>,
}

impl NormalizedTransaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("id", &self.id)?;
        require_text("account", &self.account)?;
        require_text("status", &self.status)?;

        require_finite("posted_amount", self.posted_amount)?;
        require_finite("running_balance", self.running_balance)?;
        require_amount("reward_amount", self.reward_amount)?;
        require_amount("sell_amount", self.sell_amount)?;
        require_amount("buy_amount", self.buy_amount)?;

        if self.transaction_type == TransactionType::Sell {
            match (self.sell_transaction_date, self.balance_before_reward) {
                (Some(_), Some(balance)) => require_finite("balance_before_reward", balance)?,
                _ => return Err(ValidationError::MissingSellDetails),
            }
        }
        Ok(())
    }
}

/// A fulfilled sell order (cash-out) as stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct SellOrderRecord {
    pub id: String,
    pub amount: f64,
    pub status: String,
    pub fee: f64,
    pub order_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub network: Option<String>,
    pub payment_id: Option<String>,
}

impl SellOrderRecord {
    pub fn from_remote(order: &RawSellOrder) -> Self {
        Self {
            id: order.id.clone(),
            amount: order.amount,
            status: order.delivery_status.clone(),
            fee: order.currency_fees,
            // Unix seconds, read as UTC regardless of the host timezone.
            order_date: DateTime::from_timestamp(order.created_time, 0),
            phone_number: order.phone_number_load.clone(),
            network: order.payment_outlet_name.clone(),
            payment_id: order
                .payments
                .first()
                .and_then(|p| p.transaction_ref.clone()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("id", &self.id)?;
        require_text("status", &self.status)?;
        require_amount("amount", self.amount)?;
        require_amount("fee", self.fee)?;
        if self.order_date.is_none() {
            return Err(ValidationError::Missing("order_date"));
        }
        match self.payment_id.as_deref() {
            Some(p) if !p.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::Missing("payment_id")),
        }
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field, value });
    }
    Ok(())
}

fn require_amount(field: &'static str, value: f64) -> Result<(), ValidationError> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lenient numeric decoding: the API sends amounts as strings
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

fn de_amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match NumOrString::deserialize(d)? {
        NumOrString::Int(n) => Ok(n as f64),
        NumOrString::Float(n) => Ok(n),
        NumOrString::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid amount {s:?}"))),
    }
}

fn de_unix_secs<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match NumOrString::deserialize(d)? {
        NumOrString::Int(n) => Ok(n),
        NumOrString::Float(n) => Ok(n as i64),
        NumOrString::Str(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("invalid unix timestamp {s:?}"))),
    }
}
