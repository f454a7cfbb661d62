//! Latest-price cache with per-instrument EWMA volatility tracking.
//!
//! One [`PricePoint`] per instrument, replaced atomically on each accepted
//! update. Out-of-order updates are rejected so the stored view only moves
//! forward in feed time. A global version counter lets the risk engine
//! detect whether a previously computed snapshot is still current.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sn_types::{Instrument, PricePoint, RiskError, RiskResult, Symbol};

/// Configuration for the market data cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// Half-life of the volatility EWMA, in seconds of feed time.
    pub vol_half_life_secs: f64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            vol_half_life_secs: 3600.0,
        }
    }
}

#[derive(Debug)]
struct PriceEntry {
    point: PricePoint,
    /// EWMA of squared simple returns.
    variance: f64,
}

/// Concurrent store of the latest price and volatility per instrument.
///
/// Updates to a single instrument are serialized on its own lock; unrelated
/// instruments never block each other.
#[derive(Debug)]
pub struct MarketDataCache {
    instruments: DashMap<Symbol, Instrument>,
    prices: DashMap<Symbol, RwLock<PriceEntry>>,
    version: AtomicU64,
    config: MarketDataConfig,
}

impl MarketDataCache {
    pub fn new(config: MarketDataConfig) -> Self {
        Self {
            instruments: DashMap::new(),
            prices: DashMap::new(),
            version: AtomicU64::new(0),
            config,
        }
    }

    /// Register an instrument definition. Idempotent for an identical
    /// definition; a conflicting redefinition is rejected because
    /// instruments are immutable once registered.
    pub fn register(&self, instrument: Instrument) -> RiskResult<()> {
        if let Some(existing) = self.instruments.get(&instrument.symbol) {
            if *existing != instrument {
                return Err(RiskError::InvalidRequest(format!(
                    "instrument {} already registered with a different definition",
                    instrument.symbol
                )));
            }
            return Ok(());
        }
        self.instruments.insert(instrument.symbol.clone(), instrument);
        Ok(())
    }

    /// Whether the instrument has been registered.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.instruments.contains_key(symbol)
    }

    /// The registered definition for an instrument.
    pub fn instrument(&self, symbol: &Symbol) -> RiskResult<Instrument> {
        self.instruments
            .get(symbol)
            .map(|i| i.clone())
            .ok_or_else(|| RiskError::UnknownInstrument {
                symbol: symbol.to_string(),
            })
    }

    /// Apply a market update.
    ///
    /// Rejects updates for unregistered instruments and updates whose
    /// timestamp is at or before the stored one (`StaleData`, cache
    /// unchanged). On acceptance the price point is replaced, the EWMA
    /// variance is folded forward, and the global version is bumped.
    pub fn update(
        &self,
        symbol: &Symbol,
        price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> RiskResult<()> {
        if !self.contains(symbol) {
            return Err(RiskError::UnknownInstrument {
                symbol: symbol.to_string(),
            });
        }
        if price <= Decimal::ZERO {
            return Err(RiskError::InvalidRequest(format!(
                "non-positive price {price} for {symbol}"
            )));
        }

        match self.prices.entry(symbol.clone()) {
            Entry::Occupied(occupied) => {
                let mut entry = occupied.get().write();
                if timestamp <= entry.point.timestamp {
                    return Err(RiskError::StaleData {
                        symbol: symbol.to_string(),
                        incoming: timestamp,
                        current: entry.point.timestamp,
                    });
                }

                let dt_secs = (timestamp - entry.point.timestamp).num_milliseconds() as f64
                    / 1000.0;
                let ret = ((price - entry.point.price) / entry.point.price)
                    .to_f64()
                    .unwrap_or(0.0);
                entry.variance = ewma_variance(
                    entry.variance,
                    ret,
                    dt_secs,
                    self.config.vol_half_life_secs,
                );

                entry.point = PricePoint {
                    symbol: symbol.clone(),
                    price,
                    timestamp,
                    volatility: Decimal::from_f64_retain(entry.variance.sqrt())
                        .unwrap_or_default(),
                };
            }
            Entry::Vacant(vacant) => {
                // First print: no return history yet, volatility seeds at zero.
                vacant.insert(RwLock::new(PriceEntry {
                    point: PricePoint {
                        symbol: symbol.clone(),
                        price,
                        timestamp,
                        volatility: Decimal::ZERO,
                    },
                    variance: 0.0,
                }));
            }
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(%symbol, %price, version, "market update accepted");
        Ok(())
    }

    /// The current price point for an instrument.
    ///
    /// `UnknownInstrument` when never registered, `MissingMarketData` when
    /// registered but not yet priced.
    pub fn get(&self, symbol: &Symbol) -> RiskResult<PricePoint> {
        if !self.contains(symbol) {
            return Err(RiskError::UnknownInstrument {
                symbol: symbol.to_string(),
            });
        }
        self.prices
            .get(symbol)
            .map(|lock| lock.read().point.clone())
            .ok_or_else(|| RiskError::MissingMarketData {
                symbol: symbol.to_string(),
            })
    }

    /// Global cache version; bumped on every accepted update.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

/// Fold one squared return into the EWMA variance with a time-aware decay:
/// `λ = 2^(-Δt / half_life)`.
fn ewma_variance(variance: f64, ret: f64, dt_secs: f64, half_life_secs: f64) -> f64 {
    let lambda = if half_life_secs > 0.0 && dt_secs > 0.0 {
        (-dt_secs / half_life_secs).exp2()
    } else {
        0.0
    };
    lambda * variance + (1.0 - lambda) * ret * ret
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn cache_with(symbol: &str) -> MarketDataCache {
        let cache = MarketDataCache::new(MarketDataConfig::default());
        cache.register(Instrument::equity(symbol)).unwrap();
        cache
    }

    #[test]
    fn update_requires_registration() {
        let cache = MarketDataCache::new(MarketDataConfig::default());
        let err = cache
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap_err();
        assert!(matches!(err, RiskError::UnknownInstrument { .. }));
    }

    #[test]
    fn conflicting_redefinition_rejected() {
        let cache = cache_with("AAPL");
        // Same definition is idempotent
        cache.register(Instrument::equity("AAPL")).unwrap();
        // Different multiplier is not
        let err = cache
            .register(Instrument::future("AAPL", dec!(0.01), dec!(10)))
            .unwrap_err();
        assert!(matches!(err, RiskError::InvalidRequest(_)));
    }

    #[test]
    fn stale_update_rejected_and_cache_unchanged() {
        let cache = cache_with("AAPL");
        let sym = Symbol::new("AAPL");
        let t0 = Utc::now();
        cache.update(&sym, dec!(150), t0).unwrap();
        let version = cache.version();

        let err = cache
            .update(&sym, dec!(151), t0 - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, RiskError::StaleData { .. }));

        // Equal timestamp is stale too
        let err = cache.update(&sym, dec!(151), t0).unwrap_err();
        assert!(matches!(err, RiskError::StaleData { .. }));

        let point = cache.get(&sym).unwrap();
        assert_eq!(point.price, dec!(150));
        assert_eq!(cache.version(), version);
    }

    #[test]
    fn get_on_unpriced_instrument_is_missing_data() {
        let cache = cache_with("AAPL");
        let err = cache.get(&Symbol::new("AAPL")).unwrap_err();
        assert!(matches!(err, RiskError::MissingMarketData { .. }));
    }

    #[test]
    fn volatility_builds_after_second_print() {
        let cache = cache_with("AAPL");
        let sym = Symbol::new("AAPL");
        let t0 = Utc::now();
        cache.update(&sym, dec!(100), t0).unwrap();
        assert_eq!(cache.get(&sym).unwrap().volatility, dec!(0));

        cache
            .update(&sym, dec!(102), t0 + Duration::seconds(60))
            .unwrap();
        assert!(cache.get(&sym).unwrap().volatility > dec!(0));
    }

    #[test]
    fn version_bumps_only_on_accepted_updates() {
        let cache = cache_with("AAPL");
        let sym = Symbol::new("AAPL");
        let t0 = Utc::now();
        assert_eq!(cache.version(), 0);
        cache.update(&sym, dec!(100), t0).unwrap();
        assert_eq!(cache.version(), 1);
        let _ = cache.update(&sym, dec!(101), t0); // stale
        assert_eq!(cache.version(), 1);
        cache
            .update(&sym, dec!(101), t0 + Duration::seconds(1))
            .unwrap();
        assert_eq!(cache.version(), 2);
    }

    #[test]
    fn ewma_decay_weights_recent_returns() {
        // With a 60 s half-life, a 60 s gap halves the old variance weight.
        let v = ewma_variance(0.0004, 0.0, 60.0, 60.0);
        assert!((v - 0.0002).abs() < 1e-12);

        // Zero half-life degenerates to the instantaneous squared return.
        let v = ewma_variance(0.0004, 0.01, 60.0, 0.0);
        assert!((v - 0.0001).abs() < 1e-12);
    }
}
