use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::limits::RiskLimits;
use crate::market::Symbol;

/// A market price update from the external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: Symbol,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// An executed trade changing a position's quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillEvent {
    pub account: String,
    pub symbol: Symbol,
    /// Signed quantity: positive = buy, negative = sell.
    pub quantity: Decimal,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Wholesale replacement of an account's risk limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsUpdate {
    pub account: String,
    pub limits: RiskLimits,
}

/// Events consumed from external collaborators over the feed channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedEvent {
    Price(PriceUpdate),
    Fill(FillEvent),
    Limits(LimitsUpdate),
}

impl FeedEvent {
    /// Event timestamp where one exists (limits updates carry none).
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FeedEvent::Price(p) => Some(p.timestamp),
            FeedEvent::Fill(f) => Some(f.timestamp),
            FeedEvent::Limits(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn timestamps() {
        let now = Utc::now();
        let price = FeedEvent::Price(PriceUpdate {
            symbol: Symbol::new("AAPL"),
            price: dec!(150),
            timestamp: now,
        });
        assert_eq!(price.timestamp(), Some(now));

        let limits = FeedEvent::Limits(LimitsUpdate {
            account: "acct".into(),
            limits: RiskLimits::default(),
        });
        assert_eq!(limits.timestamp(), None);
    }
}
