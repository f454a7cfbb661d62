use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier, e.g. "AAPL" or "ESZ5".
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: &str) -> Self {
        Self(symbol.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// Static definition of a tradable instrument. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: Symbol,
    /// Minimum price increment.
    pub tick_size: Decimal,
    /// Contract multiplier (1 for cash equities).
    pub multiplier: Decimal,
}

impl Instrument {
    pub fn new(symbol: Symbol, tick_size: Decimal, multiplier: Decimal) -> Self {
        Self {
            symbol,
            tick_size,
            multiplier,
        }
    }

    /// Cash equity: one-cent tick, unit multiplier.
    pub fn equity(symbol: &str) -> Self {
        Self::new(Symbol::new(symbol), Decimal::new(1, 2), Decimal::ONE)
    }

    /// Futures contract with an explicit multiplier.
    pub fn future(symbol: &str, tick_size: Decimal, multiplier: Decimal) -> Self {
        Self::new(Symbol::new(symbol), tick_size, multiplier)
    }
}

/// Latest observed price for one instrument.
///
/// Overwritten on every accepted market update; updates carrying a timestamp
/// at or before the stored one are rejected upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: Symbol,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// EWMA volatility of simple returns, as a fraction. Zero until the
    /// instrument has printed at least twice.
    pub volatility: Decimal,
}

/// Direction of a proposed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => Decimal::ONE,
            Direction::Sell => -Decimal::ONE,
        }
    }

    /// Apply this direction's sign to an unsigned quantity.
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        quantity * self.sign()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        };
        write!(f, "{}", s)
    }
}
