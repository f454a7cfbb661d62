use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::{Direction, Symbol};

/// A request to size a proposed trade against the account's risk budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingRequest {
    pub account: String,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Desired unsigned quantity. Must be positive.
    pub quantity: Decimal,
}

impl SizingRequest {
    pub fn new(account: &str, symbol: Symbol, direction: Direction, quantity: Decimal) -> Self {
        Self {
            account: account.to_string(),
            symbol,
            direction,
            quantity,
        }
    }
}

/// The limit that capped (or rejected) a sizing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingConstraint {
    GrossExposure,
    InstrumentCap,
    VarBudget,
    MinTradableUnit,
}

impl fmt::Display for SizingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SizingConstraint::GrossExposure => "gross exposure limit",
            SizingConstraint::InstrumentCap => "per-instrument position cap",
            SizingConstraint::VarBudget => "VaR budget",
            SizingConstraint::MinTradableUnit => "minimum tradable unit",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a sizing request — an approved (possibly capped) quantity, or
/// a rejection naming the constraint that left no tradable headroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SizingOutcome {
    Approved {
        quantity: Decimal,
        /// Present when the approved quantity is below the requested one.
        capped_by: Option<SizingConstraint>,
    },
    Rejected {
        constraint: SizingConstraint,
    },
}

impl SizingOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, SizingOutcome::Approved { .. })
    }

    /// Approved quantity, zero when rejected.
    pub fn quantity(&self) -> Decimal {
        match self {
            SizingOutcome::Approved { quantity, .. } => *quantity,
            SizingOutcome::Rejected { .. } => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn approved_accessors() {
        let outcome = SizingOutcome::Approved {
            quantity: dec!(100),
            capped_by: None,
        };
        assert!(outcome.is_approved());
        assert_eq!(outcome.quantity(), dec!(100));
    }

    #[test]
    fn rejected_has_zero_quantity() {
        let outcome = SizingOutcome::Rejected {
            constraint: SizingConstraint::VarBudget,
        };
        assert!(!outcome.is_approved());
        assert_eq!(outcome.quantity(), dec!(0));
    }

    #[test]
    fn constraint_display() {
        assert_eq!(
            format!("{}", SizingConstraint::GrossExposure),
            "gross exposure limit"
        );
    }
}
