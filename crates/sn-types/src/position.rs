use chrono::{DateTime, Utc};
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Symbol;

/// An open position for one account/instrument pair.
///
/// Mutated only through [`Position::apply_fill`]; the book removes it once
/// the quantity returns to zero. P&L is tracked in price points × quantity;
/// the contract multiplier is applied where the instrument is in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub symbol: Symbol,
    /// Signed quantity: positive = long, negative = short.
    pub quantity: Decimal,
    /// Volume-weighted average entry price of the open quantity.
    pub average_price: Decimal,
    /// Cumulative realized P&L of this position since it was opened.
    pub realized_pnl: Decimal,
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn new(account: &str, symbol: Symbol) -> Self {
        Self {
            account: account.to_string(),
            symbol,
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_updated: Utc::now(),
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == Decimal::ZERO
    }

    /// Apply an executed fill and return the realized P&L delta.
    ///
    /// Adds extend the VWAP entry; reductions realize P&L on the closed
    /// portion; a fill crossing through zero realizes the whole closed side
    /// and re-opens the residual at the fill price.
    pub fn apply_fill(
        &mut self,
        quantity: Decimal,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Decimal {
        let new_quantity = self.quantity + quantity;
        let mut realized = Decimal::ZERO;

        if self.quantity.is_zero() {
            // Opening from flat
            self.average_price = price;
        } else if self.quantity.signum() == quantity.signum() {
            // Extending: volume-weighted average entry
            let total_cost =
                self.quantity.abs() * self.average_price + quantity.abs() * price;
            self.average_price = total_cost / (self.quantity.abs() + quantity.abs());
        } else {
            // Reducing, closing, or flipping
            let closed = quantity.abs().min(self.quantity.abs());
            realized = (price - self.average_price) * closed * self.quantity.signum();
            self.realized_pnl += realized;

            if new_quantity.is_zero() {
                self.average_price = Decimal::ZERO;
            } else if new_quantity.signum() != self.quantity.signum() {
                // Crossed through zero: the residual is a fresh position
                self.average_price = price;
            }
        }

        self.quantity = new_quantity;
        self.last_updated = timestamp;
        realized
    }

    /// Unrealized P&L at the given mark, in price points × quantity.
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        (mark - self.average_price) * self.quantity
    }

    pub fn total_pnl(&self, mark: Decimal) -> Decimal {
        self.realized_pnl + self.unrealized_pnl(mark)
    }
}
