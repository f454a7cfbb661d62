//! Authoritative store of open positions per account.
//!
//! Fills for one account are serialized on that account's lock; accounts
//! never block each other, and readers take immutable point-in-time copies
//! rather than holding locks across computations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sn_types::{Position, RiskError, RiskResult, Symbol};

#[derive(Debug, Default)]
struct AccountBook {
    positions: HashMap<Symbol, Position>,
    /// Cumulative realized P&L across all fills, closed positions included.
    realized_pnl: Decimal,
}

/// Immutable point-in-time copy of one account's positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account: String,
    /// Positions sorted by symbol for deterministic iteration.
    pub positions: Vec<Position>,
    /// Global book version at copy time.
    pub book_version: u64,
    pub taken_at: DateTime<Utc>,
}

/// What a fill did to the book, for the caller's log line.
#[derive(Debug, Clone, PartialEq)]
pub struct FillReport {
    /// Post-fill position state; flat positions are reported with zero
    /// quantity even though the book has removed them.
    pub position: Position,
    /// Realized P&L delta from this fill alone.
    pub realized_pnl: Decimal,
}

/// Concurrent position book keyed by account.
#[derive(Debug, Default)]
pub struct PositionBook {
    accounts: DashMap<String, RwLock<AccountBook>>,
    version: AtomicU64,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty book for the account. Idempotent.
    pub fn register_account(&self, account: &str) {
        self.accounts
            .entry(account.to_string())
            .or_insert_with(|| RwLock::new(AccountBook::default()));
    }

    pub fn is_registered(&self, account: &str) -> bool {
        self.accounts.contains_key(account)
    }

    /// Apply an executed fill atomically.
    ///
    /// VWAP extension on adds, realized P&L on reductions, flip handling on
    /// sign changes; a position reaching zero quantity is removed from the
    /// book. Bumps the global book version.
    pub fn apply_fill(
        &self,
        account: &str,
        symbol: &Symbol,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> RiskResult<FillReport> {
        if quantity.is_zero() {
            return Err(RiskError::InvalidRequest(format!(
                "zero-quantity fill for {symbol}"
            )));
        }
        if price <= Decimal::ZERO {
            return Err(RiskError::InvalidRequest(format!(
                "non-positive fill price {price} for {symbol}"
            )));
        }

        let book = self
            .accounts
            .get(account)
            .ok_or_else(|| RiskError::UnknownAccount {
                account: account.to_string(),
            })?;

        let mut book = book.write();
        let position = book
            .positions
            .entry(symbol.clone())
            .or_insert_with(|| Position::new(account, symbol.clone()));

        let realized = position.apply_fill(quantity, price, timestamp);
        let snapshot = position.clone();
        if position.is_flat() {
            book.positions.remove(symbol);
        }
        book.realized_pnl += realized;
        drop(book);

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            account,
            %symbol,
            %quantity,
            %price,
            %realized,
            version,
            "fill applied"
        );

        Ok(FillReport {
            position: snapshot,
            realized_pnl: realized,
        })
    }

    /// Immutable copy of the account's open positions at a point in time.
    pub fn snapshot(&self, account: &str) -> RiskResult<AccountSnapshot> {
        let book = self
            .accounts
            .get(account)
            .ok_or_else(|| RiskError::UnknownAccount {
                account: account.to_string(),
            })?;

        let book = book.read();
        let mut positions: Vec<Position> = book.positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        Ok(AccountSnapshot {
            account: account.to_string(),
            positions,
            book_version: self.version.load(Ordering::SeqCst),
            taken_at: Utc::now(),
        })
    }

    /// Current position for one instrument, `None` when flat.
    pub fn position(&self, account: &str, symbol: &Symbol) -> RiskResult<Option<Position>> {
        let book = self
            .accounts
            .get(account)
            .ok_or_else(|| RiskError::UnknownAccount {
                account: account.to_string(),
            })?;
        let guard = book.read();
        Ok(guard.positions.get(symbol).cloned())
    }

    /// Cumulative realized P&L for the account, closed positions included.
    pub fn realized_pnl(&self, account: &str) -> RiskResult<Decimal> {
        let book = self
            .accounts
            .get(account)
            .ok_or_else(|| RiskError::UnknownAccount {
                account: account.to_string(),
            })?;
        let guard = book.read();
        Ok(guard.realized_pnl)
    }

    /// Global book version; bumped on every applied fill.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}
