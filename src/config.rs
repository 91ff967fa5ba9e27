use crate::error::{AppError, Result};

pub const COINS_API_URL: &str = "https://coins.ph/api/v3";

/// Page size used when the local ledger is empty and the whole history is pulled.
pub const COLD_START_PAGE_SIZE: u32 = 100;

/// Page size used when resuming against a non-empty ledger. Kept small so a warm
/// resume re-fetches little overlap before hitting the boundary id.
pub const RESUME_PAGE_SIZE: u32 = 10;

/// Maximum `limit` the sell-order endpoint accepts per request.
pub const SELL_ORDER_MAX_BATCH: u32 = 200;

/// Timeout for every request to the payments API (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// Bearer token for the payments API (COINS_API_TOKEN)
    pub api_token: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between scheduled sync passes (SYNC_INTERVAL_SECS)
    pub sync_interval_secs: u64,
    /// Run a single pass and exit instead of serving (SYNC_ONCE)
    pub sync_once: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let api_token = std::env::var("COINS_API_TOKEN").unwrap_or_default();
        if api_token.trim().is_empty() {
            return Err(AppError::Config("COINS_API_TOKEN must be set".to_string()));
        }

        Ok(Self {
            api_url: std::env::var("COINS_API_URL")
                .unwrap_or_else(|_| COINS_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_token,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "ledger.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            sync_interval_secs: std::env::var("SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    AppError::Config("SYNC_INTERVAL_SECS must be a whole number of seconds".to_string())
                })?
                .max(1),
            sync_once: std::env::var("SYNC_ONCE")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        })
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
