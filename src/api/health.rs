//! Shared health state for the /health endpoint.
//! Updated by `SyncRunner` after every pass.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Unix seconds of the last finished pass (0 = none yet).
    pub last_pass_at: AtomicI64,
    pub last_pass_ok: AtomicBool,
    pub passes_completed: AtomicU64,
    pub passes_failed: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self, ok: bool, at_secs: i64) {
        self.last_pass_at.store(at_secs, Ordering::Relaxed);
        self.last_pass_ok.store(ok, Ordering::Relaxed);
        if ok {
            self.passes_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.passes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn last_pass_at(&self) -> i64 {
        self.last_pass_at.load(Ordering::Relaxed)
    }

    pub fn last_pass_ok(&self) -> bool {
        self.last_pass_ok.load(Ordering::Relaxed)
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    pub fn passes_failed(&self) -> u64 {
        self.passes_failed.load(Ordering::Relaxed)
    }
}
