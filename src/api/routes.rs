use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::models::{SellOrderRow, TransactionRow};
use crate::db::{SellOrderStore, TransactionStore};
use crate::error::AppError;
use crate::sync::{LedgerRunner, PassReport};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct ApiState {
    pub runner: Arc<LedgerRunner>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/transactions", get(get_transactions))
        .route("/sell-orders", get(get_sell_orders))
        .route("/sync", post(post_sync))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TransactionsQuery {
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SellOrdersQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub last_pass_at: Option<i64>,
    pub last_pass_ok: bool,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub transactions: u64,
    pub sell_orders: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let health = state.runner.health();
    let store = state.runner.store();
    let last_pass_at = health.last_pass_at();

    Ok(Json(HealthResponse {
        status: "ok",
        last_pass_at: (last_pass_at > 0).then_some(last_pass_at),
        last_pass_ok: health.last_pass_ok(),
        passes_completed: health.passes_completed(),
        passes_failed: health.passes_failed(),
        transactions: store.count_transactions().await?,
        sell_orders: store.count_sell_orders().await?,
    }))
}

async fn get_transactions(
    State(state): State<ApiState>,
    Query(params): Query<TransactionsQuery>,
) -> Result<Json<Vec<TransactionRow>>, AppError> {
    let transaction_type = params
        .transaction_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let rows = state
        .runner
        .store()
        .recent_transactions(transaction_type, clamp_limit(params.limit))
        .await?;
    Ok(Json(rows))
}

async fn get_sell_orders(
    State(state): State<ApiState>,
    Query(params): Query<SellOrdersQuery>,
) -> Result<Json<Vec<SellOrderRow>>, AppError> {
    let rows = state
        .runner
        .store()
        .recent_sell_orders(clamp_limit(params.limit))
        .await?;
    Ok(Json(rows))
}

/// Runs one pass now; waits if a scheduled pass is in progress.
async fn post_sync(State(state): State<ApiState>) -> Result<Json<PassReport>, AppError> {
    Ok(Json(state.runner.run_pass().await?))
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}
