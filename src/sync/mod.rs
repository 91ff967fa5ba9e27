pub mod payments;
pub mod runner;
pub mod sell_orders;

#[cfg(test)]
pub(crate) mod fakes;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::db::Created;
use crate::error::{AppError, Result, ValidationError};

pub use payments::sync_payments;
pub use runner::{LedgerRunner, PassReport, SyncRunner, SyncScheduler};
pub use sell_orders::sync_sell_orders;

/// What one sync pass did. Skipped records are reported, never fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub pages_fetched: usize,
    pub persisted: usize,
    /// Records whose id was already stored.
    pub duplicates: usize,
    /// True when the pass stopped at the previously synced record.
    pub reached_boundary: bool,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Refused by store validation.
    Invalid(#[serde(serialize_with = "serialize_display")] ValidationError),
    /// Reward whose sell partner never arrived (last page ended on it).
    Unpaired,
}

impl SyncReport {
    fn skip(&mut self, id: &str, reason: SkipReason) {
        warn!(record_id = %id, reason = ?reason, "skipping record");
        self.skipped.push(SkippedRecord {
            id: id.to_string(),
            reason,
        });
    }

    /// Tallies one `validate_and_create` outcome. Only non-validation errors escape.
    fn record(&mut self, id: &str, outcome: Result<Created>) -> Result<()> {
        match outcome {
            Ok(Created::Inserted) => self.persisted += 1,
            Ok(Created::Duplicate) => self.duplicates += 1,
            Err(AppError::Validation(e)) => self.skip(id, SkipReason::Invalid(e)),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn serialize_display<T: std::fmt::Display, S: Serializer>(
    value: &T,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_str(value)
}
