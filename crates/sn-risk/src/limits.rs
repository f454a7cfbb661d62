//! Per-account risk limit reference data.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use sn_types::RiskLimits;

/// Read-only (to consumers) registry of per-account limits, replaced
/// wholesale by limit-configuration updates from the external feed.
///
/// A global version counter lets the risk engine invalidate published
/// snapshots when any account's limits change.
#[derive(Debug, Default)]
pub struct LimitsRegistry {
    limits: DashMap<String, RiskLimits>,
    version: AtomicU64,
}

impl LimitsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the account's limits.
    pub fn set(&self, account: &str, limits: RiskLimits) {
        self.limits.insert(account.to_string(), limits);
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self, account: &str) -> Option<RiskLimits> {
        self.limits.get(account).map(|l| l.clone())
    }

    pub fn contains(&self, account: &str) -> bool {
        self.limits.contains_key(account)
    }

    /// Global limits version; bumped on every replacement.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
