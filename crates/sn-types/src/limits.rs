use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::market::Symbol;

/// Per-account risk limit configuration.
///
/// Read-only reference data supplied by an external source; replaced
/// wholesale on every limits update, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Capital allocated to the account; denominator of margin utilization.
    pub capital: Decimal,
    /// Maximum gross notional exposure.
    pub max_gross_exposure: Decimal,
    /// Maximum portfolio VaR at the engine's configured confidence.
    pub max_var: Decimal,
    /// Default cap on absolute position quantity per instrument.
    pub max_position_qty: Decimal,
    /// Per-symbol overrides of the default cap.
    pub instrument_caps: HashMap<Symbol, Decimal>,
}

impl RiskLimits {
    /// The absolute-quantity cap applying to the given instrument.
    pub fn position_cap(&self, symbol: &Symbol) -> Decimal {
        self.instrument_caps
            .get(symbol)
            .copied()
            .unwrap_or(self.max_position_qty)
    }

    pub fn with_instrument_cap(mut self, symbol: Symbol, cap: Decimal) -> Self {
        self.instrument_caps.insert(symbol, cap);
        self
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            capital: Decimal::from(100_000),
            max_gross_exposure: Decimal::from(200_000),
            max_var: Decimal::from(5_000),
            max_position_qty: Decimal::from(10_000),
            instrument_caps: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_cap_applies_without_override() {
        let limits = RiskLimits::default();
        assert_eq!(limits.position_cap(&Symbol::new("AAPL")), dec!(10_000));
    }

    #[test]
    fn override_takes_precedence() {
        let limits = RiskLimits::default().with_instrument_cap(Symbol::new("GME"), dec!(100));
        assert_eq!(limits.position_cap(&Symbol::new("GME")), dec!(100));
        assert_eq!(limits.position_cap(&Symbol::new("AAPL")), dec!(10_000));
    }
}
