use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::Symbol;

/// Per-position risk breakdown within a [`RiskSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: Symbol,
    /// Signed quantity at snapshot time.
    pub quantity: Decimal,
    /// Price the position was marked at.
    pub mark_price: Decimal,
    /// Signed notional: quantity × price × multiplier.
    pub notional: Decimal,
    pub unrealized_pnl: Decimal,
    /// Standalone VaR of this position (z × |notional| × volatility).
    pub var_contribution: Decimal,
}

/// A published point-in-time view of one account's aggregate risk.
///
/// Derived purely from the position book, the market-data cache, and the
/// account's limits; replaced on recomputation, never mutated, so concurrent
/// readers always see a consistent view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub id: Uuid,
    pub account: String,
    /// Strictly increasing per account; consumers compare it to detect
    /// staleness.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Sum of absolute position notionals.
    pub gross_exposure: Decimal,
    /// Signed sum of position notionals.
    pub net_exposure: Decimal,
    /// Parametric VaR at the engine's configured confidence.
    pub var: Decimal,
    /// Gross exposure / configured capital.
    pub margin_utilization: Decimal,
    /// Market-data cache version the snapshot's prices were read at.
    pub market_version: u64,
    /// Position-book version the snapshot's positions were copied at.
    pub book_version: u64,
    pub positions: Vec<PositionRisk>,
}

impl RiskSnapshot {
    pub fn position(&self, symbol: &Symbol) -> Option<&PositionRisk> {
        self.positions.iter().find(|p| &p.symbol == symbol)
    }
}
