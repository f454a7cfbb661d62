//! Pre-trade position sizing against the account's risk budget.
//!
//! [`PositionSizer`] answers "how much of this trade fits" by computing the
//! headroom left under each configured limit and approving the smallest.
//! Every constraint bounds the post-trade *absolute* position, so trades
//! that reduce risk are never blocked until they flip through zero. The
//! computation is pure: it reads snapshots and never mutates the book.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sn_types::{
    RiskError, RiskResult, RiskSnapshot, SizingConstraint, SizingOutcome, SizingRequest, Symbol,
};

use crate::book::PositionBook;
use crate::engine::RiskEngine;
use crate::limits::LimitsRegistry;
use crate::marketdata::MarketDataCache;

/// Configuration for the position sizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizerConfig {
    /// Smallest approvable quantity; approved quantities are floored to a
    /// multiple of it, and caps below one unit reject the request.
    pub min_tradable_unit: Decimal,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            min_tradable_unit: Decimal::ONE,
        }
    }
}

/// Sizes proposed trades so the post-trade portfolio stays inside the
/// account's limits.
pub struct PositionSizer {
    market: Arc<MarketDataCache>,
    book: Arc<PositionBook>,
    limits: Arc<LimitsRegistry>,
    engine: Arc<RiskEngine>,
    config: SizerConfig,
}

impl PositionSizer {
    pub fn new(
        market: Arc<MarketDataCache>,
        book: Arc<PositionBook>,
        limits: Arc<LimitsRegistry>,
        engine: Arc<RiskEngine>,
        config: SizerConfig,
    ) -> Self {
        Self {
            market,
            book,
            limits,
            engine,
            config,
        }
    }

    /// Size a proposed trade.
    ///
    /// Returns the approved quantity (≤ proposed, floored to the minimum
    /// tradable unit) and the constraint that capped it, or a rejection
    /// when no tradable headroom remains.
    pub fn size(&self, request: &SizingRequest) -> RiskResult<SizingOutcome> {
        if request.quantity <= Decimal::ZERO {
            return Err(RiskError::InvalidRequest(format!(
                "proposed quantity {} must be positive",
                request.quantity
            )));
        }
        if !self.book.is_registered(&request.account) {
            return Err(RiskError::UnknownAccount {
                account: request.account.clone(),
            });
        }
        let limits = self.limits.get(&request.account).ok_or_else(|| {
            RiskError::InvalidRequest(format!(
                "no risk limits configured for account {}",
                request.account
            ))
        })?;

        let instrument = self.market.instrument(&request.symbol)?;
        let point = self.market.get(&request.symbol)?;
        let snapshot = self.engine.snapshot(&request.account)?;

        // Mark the target off the snapshot when held so the headroom math
        // is consistent with the gross exposure it was computed from.
        let (mark, current_qty) = match snapshot.position(&request.symbol) {
            Some(pr) => (pr.mark_price, pr.quantity),
            None => (point.price, Decimal::ZERO),
        };
        let unit_notional = mark * instrument.multiplier;
        let signed = request.direction.sign();

        // Headroom under each limit, as additional quantity in the trade
        // direction. `post_cap` is the allowed post-trade absolute quantity.
        let mut caps: Vec<(SizingConstraint, Decimal)> = Vec::with_capacity(3);

        let other_gross =
            (snapshot.gross_exposure - current_qty.abs() * unit_notional).max(Decimal::ZERO);
        let post_cap_gross = ((limits.max_gross_exposure - other_gross) / unit_notional)
            .max(Decimal::ZERO);
        caps.push((
            SizingConstraint::GrossExposure,
            (post_cap_gross - signed * current_qty).max(Decimal::ZERO),
        ));

        let post_cap_instrument = limits.position_cap(&request.symbol).max(Decimal::ZERO);
        caps.push((
            SizingConstraint::InstrumentCap,
            (post_cap_instrument - signed * current_qty).max(Decimal::ZERO),
        ));

        if let Some(post_cap_var) = self.var_post_cap(
            &snapshot,
            limits.max_var,
            point.volatility,
            unit_notional,
            &request.symbol,
        ) {
            caps.push((
                SizingConstraint::VarBudget,
                (post_cap_var - signed * current_qty).max(Decimal::ZERO),
            ));
        }

        let (binding, tightest) = caps
            .iter()
            .min_by(|a, b| a.1.cmp(&b.1))
            .copied()
            .unwrap_or((SizingConstraint::GrossExposure, Decimal::ZERO));

        let approved = request.quantity.min(tightest);
        let unit = self.config.min_tradable_unit;
        let floored = (approved / unit).floor() * unit;

        debug!(
            account = %request.account,
            symbol = %request.symbol,
            direction = %request.direction,
            proposed = %request.quantity,
            %tightest,
            %floored,
            "sizing computed"
        );

        if floored < unit {
            let constraint = if tightest < request.quantity {
                binding
            } else {
                SizingConstraint::MinTradableUnit
            };
            return Ok(SizingOutcome::Rejected { constraint });
        }

        let capped_by = if tightest < request.quantity {
            Some(binding)
        } else {
            None
        };
        Ok(SizingOutcome::Approved {
            quantity: floored,
            capped_by,
        })
    }

    /// Allowed post-trade absolute quantity under the VaR budget, solving
    /// the engine's uniform-correlation model for the target instrument's
    /// notional. `None` when the instrument has no volatility yet — a zero
    /// sigma cannot move the portfolio VaR.
    fn var_post_cap(
        &self,
        snapshot: &RiskSnapshot,
        max_var: Decimal,
        vol: Decimal,
        unit_notional: Decimal,
        symbol: &Symbol,
    ) -> Option<Decimal> {
        let vol = vol.to_f64().unwrap_or(0.0);
        if vol <= 0.0 {
            return None;
        }

        let z = self.engine.config().var_z_score.to_f64().unwrap_or(1.65);
        let rho = self.engine.config().correlation;
        let target_sigma = (max_var.to_f64().unwrap_or(0.0) / z).max(0.0);

        // Sigmas of the other positions, recovered from their published
        // VaR contributions.
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for pr in &snapshot.positions {
            if &pr.symbol == symbol {
                continue;
            }
            let sigma = (pr.var_contribution.to_f64().unwrap_or(0.0) / z).max(0.0);
            sum += sigma;
            sum_sq += sigma * sigma;
        }

        // Solve x² + 2ρLx + ((1−ρ)R + ρL² − T²) ≤ 0 for the target's
        // sigma x = |notional| · vol.
        let c = (1.0 - rho) * sum_sq + rho * sum * sum - target_sigma * target_sigma;
        let disc = rho * sum * rho * sum - c;
        let x_max = if disc <= 0.0 {
            0.0
        } else {
            (disc.sqrt() - rho * sum).max(0.0)
        };

        let qty = x_max / vol / unit_notional.to_f64().unwrap_or(1.0);
        Some(Decimal::from_f64_retain(qty).unwrap_or_default().max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use sn_types::{Direction, Instrument, RiskLimits, Symbol};

    use crate::engine::RiskEngineConfig;
    use crate::marketdata::MarketDataConfig;

    struct Fixture {
        market: Arc<MarketDataCache>,
        book: Arc<PositionBook>,
        limits: Arc<LimitsRegistry>,
        engine: Arc<RiskEngine>,
    }

    impl Fixture {
        fn sizer(&self) -> PositionSizer {
            self.sizer_with(SizerConfig::default())
        }

        fn sizer_with(&self, config: SizerConfig) -> PositionSizer {
            PositionSizer::new(
                self.market.clone(),
                self.book.clone(),
                self.limits.clone(),
                self.engine.clone(),
                config,
            )
        }
    }

    fn fixture(limits: RiskLimits) -> Fixture {
        let market = Arc::new(MarketDataCache::new(MarketDataConfig::default()));
        let book = Arc::new(PositionBook::new());
        let registry = Arc::new(LimitsRegistry::new());
        market.register(Instrument::equity("AAPL")).unwrap();
        book.register_account("acct");
        registry.set("acct", limits);
        let engine = Arc::new(RiskEngine::new(
            market.clone(),
            book.clone(),
            registry.clone(),
            RiskEngineConfig::default(),
        ));
        Fixture {
            market,
            book,
            limits: registry,
            engine,
        }
    }

    fn wide_limits() -> RiskLimits {
        RiskLimits {
            capital: dec!(1_000_000),
            max_gross_exposure: dec!(1_000_000),
            max_var: dec!(1_000_000),
            max_position_qty: dec!(1_000_000),
            ..RiskLimits::default()
        }
    }

    fn buy(qty: Decimal) -> SizingRequest {
        SizingRequest::new("acct", Symbol::new("AAPL"), Direction::Buy, qty)
    }

    #[test]
    fn zero_quantity_is_invalid() {
        let f = fixture(wide_limits());
        let err = f.sizer().size(&buy(dec!(0))).unwrap_err();
        assert!(matches!(err, RiskError::InvalidRequest(_)));
    }

    #[test]
    fn unknown_account_rejected() {
        let f = fixture(wide_limits());
        let mut request = buy(dec!(10));
        request.account = "ghost".into();
        let err = f.sizer().size(&request).unwrap_err();
        assert!(matches!(err, RiskError::UnknownAccount { .. }));
    }

    #[test]
    fn missing_limits_is_invalid_request() {
        let f = fixture(wide_limits());
        f.book.register_account("unlimited");
        let mut request = buy(dec!(10));
        request.account = "unlimited".into();
        let err = f.sizer().size(&request).unwrap_err();
        assert!(matches!(err, RiskError::InvalidRequest(_)));
    }

    #[test]
    fn unpriced_instrument_is_missing_market_data() {
        let f = fixture(wide_limits());
        let err = f.sizer().size(&buy(dec!(10))).unwrap_err();
        assert!(matches!(err, RiskError::MissingMarketData { .. }));
    }

    #[test]
    fn gross_exposure_scenario() {
        // maxGrossExposure = 100,000; AAPL at 150; flat book.
        let f = fixture(RiskLimits {
            max_gross_exposure: dec!(100_000),
            ..wide_limits()
        });
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();

        // Buy 500 fits under the 666-share headroom → approved uncapped.
        let outcome = f.sizer().size(&buy(dec!(500))).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Approved {
                quantity: dec!(500),
                capped_by: None
            }
        );

        // Fill those 500 → gross 75,000; the next 500 caps at 166.
        f.book
            .apply_fill("acct", &Symbol::new("AAPL"), dec!(500), dec!(150), Utc::now())
            .unwrap();
        let outcome = f.sizer().size(&buy(dec!(500))).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Approved {
                quantity: dec!(166),
                capped_by: Some(SizingConstraint::GrossExposure)
            }
        );
    }

    #[test]
    fn sized_quantity_never_breaches_projected_gross() {
        let f = fixture(RiskLimits {
            max_gross_exposure: dec!(100_000),
            ..wide_limits()
        });
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();
        f.book
            .apply_fill("acct", &Symbol::new("AAPL"), dec!(500), dec!(150), Utc::now())
            .unwrap();

        let outcome = f.sizer().size(&buy(dec!(10_000))).unwrap();
        let approved = outcome.quantity();
        assert!(approved <= dec!(10_000));
        // Projected post-trade gross stays inside the limit
        let projected = (dec!(500) + approved) * dec!(150);
        assert!(projected <= dec!(100_000));
    }

    #[test]
    fn instrument_cap_binds() {
        let f = fixture(wide_limits().with_instrument_cap(Symbol::new("AAPL"), dec!(100)));
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();

        let outcome = f.sizer().size(&buy(dec!(500))).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Approved {
                quantity: dec!(100),
                capped_by: Some(SizingConstraint::InstrumentCap)
            }
        );
    }

    #[test]
    fn reducing_trade_allowed_at_gross_limit() {
        // Long 100 @ 150 with the gross limit exactly at 15,000: selling
        // must not be blocked by a cap the sale only relieves.
        let f = fixture(RiskLimits {
            max_gross_exposure: dec!(15_000),
            ..wide_limits()
        });
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();
        f.book
            .apply_fill("acct", &Symbol::new("AAPL"), dec!(100), dec!(150), Utc::now())
            .unwrap();

        let request = SizingRequest::new("acct", Symbol::new("AAPL"), Direction::Sell, dec!(50));
        let outcome = f.sizer().size(&request).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Approved {
                quantity: dec!(50),
                capped_by: None
            }
        );
    }

    #[test]
    fn no_headroom_rejects_with_binding_constraint() {
        // 100 long @ 150 with a 15,100 gross limit leaves 0.67 shares of
        // headroom — below one tradable unit.
        let f = fixture(RiskLimits {
            max_gross_exposure: dec!(15_100),
            ..wide_limits()
        });
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();
        f.book
            .apply_fill("acct", &Symbol::new("AAPL"), dec!(100), dec!(150), Utc::now())
            .unwrap();

        let outcome = f.sizer().size(&buy(dec!(10))).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Rejected {
                constraint: SizingConstraint::GrossExposure
            }
        );
    }

    #[test]
    fn approved_quantity_floors_to_min_unit() {
        let f = fixture(RiskLimits {
            max_gross_exposure: dec!(100_000),
            ..wide_limits()
        });
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();
        f.book
            .apply_fill("acct", &Symbol::new("AAPL"), dec!(500), dec!(150), Utc::now())
            .unwrap();

        // Headroom is 166.67 shares; a 10-share lot floors it to 160.
        let sizer = f.sizer_with(SizerConfig {
            min_tradable_unit: dec!(10),
        });
        let outcome = sizer.size(&buy(dec!(500))).unwrap();
        assert_eq!(
            outcome,
            SizingOutcome::Approved {
                quantity: dec!(160),
                capped_by: Some(SizingConstraint::GrossExposure)
            }
        );
    }

    #[test]
    fn var_budget_binds_and_projection_stays_inside() {
        let f = fixture(RiskLimits {
            max_var: dec!(50),
            ..wide_limits()
        });
        let sym = Symbol::new("AAPL");
        let t0 = Utc::now();
        f.market.update(&sym, dec!(100), t0).unwrap();
        f.market
            .update(&sym, dec!(105), t0 + Duration::seconds(60))
            .unwrap();
        let vol = f.market.get(&sym).unwrap().volatility;
        assert!(vol > dec!(0));

        let outcome = f.sizer().size(&buy(dec!(100_000))).unwrap();
        let approved = match outcome {
            SizingOutcome::Approved {
                quantity,
                capped_by: Some(SizingConstraint::VarBudget),
            } => quantity,
            other => panic!("expected VaR-capped approval, got {other:?}"),
        };

        // Projected VaR of the approved size fits the budget; one more
        // unit would not.
        let z = dec!(1.65);
        let projected = z * approved * dec!(105) * vol;
        assert!(projected <= dec!(50) * dec!(1.001));
        let one_more = z * (approved + dec!(1)) * dec!(105) * vol;
        assert!(one_more > dec!(50));
    }

    #[test]
    fn sizing_is_pure() {
        let f = fixture(wide_limits());
        f.market
            .update(&Symbol::new("AAPL"), dec!(150), Utc::now())
            .unwrap();
        let book_version = f.book.version();
        let market_version = f.market.version();

        f.sizer().size(&buy(dec!(100))).unwrap();

        assert_eq!(f.book.version(), book_version);
        assert_eq!(f.market.version(), market_version);
    }
}
