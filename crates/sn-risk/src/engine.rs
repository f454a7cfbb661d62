//! Aggregate risk computation.
//!
//! [`RiskEngine`] derives a [`RiskSnapshot`] for one account from an
//! immutable position-book copy and a version-stable set of prices. VaR is
//! parametric: per-instrument EWMA volatility combined under a single
//! configurable pairwise correlation. This is an approximation pending real
//! requirements, not a covariance model.
//!
//! Snapshots are published replace-on-update with a monotonic sequence
//! number; a query may reuse the published snapshot while the market-data,
//! position-book, and limits versions are unchanged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::Sender;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use sn_types::{
    Instrument, Position, PositionRisk, PricePoint, RiskError, RiskLimits, RiskResult,
    RiskSnapshot, Symbol,
};

use crate::alerts::{RiskAlert, RiskAlertKind, RiskSeverity};
use crate::book::PositionBook;
use crate::limits::LimitsRegistry;
use crate::marketdata::MarketDataCache;

/// How many times a snapshot computation re-reads the price set when the
/// market moves underneath it.
const PRICE_READ_RETRIES: usize = 3;

/// Configuration for the risk engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEngineConfig {
    /// z-score for the VaR confidence level (1.65 ≈ 95%).
    pub var_z_score: Decimal,
    /// Uniform pairwise correlation assumed between instruments; 0 treats
    /// them as independent.
    pub correlation: f64,
    /// Fraction of a limit at which a warning alert fires (e.g. 0.80).
    pub warning_threshold_pct: Decimal,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            var_z_score: Decimal::new(165, 2),
            correlation: 0.0,
            warning_threshold_pct: Decimal::new(80, 2),
        }
    }
}

/// A published snapshot plus the limits version it was computed under.
#[derive(Debug, Clone)]
struct Published {
    snapshot: RiskSnapshot,
    limits_version: u64,
}

/// Computes and publishes per-account risk snapshots.
///
/// Computations are read-only over the book and cache and may run fully in
/// parallel across accounts; a failed computation is local to its call and
/// never poisons other accounts.
pub struct RiskEngine {
    market: Arc<MarketDataCache>,
    book: Arc<PositionBook>,
    limits: Arc<LimitsRegistry>,
    config: RiskEngineConfig,
    sequence: AtomicU64,
    published: DashMap<String, Published>,
    alert_tx: Option<Sender<RiskAlert>>,
}

impl RiskEngine {
    pub fn new(
        market: Arc<MarketDataCache>,
        book: Arc<PositionBook>,
        limits: Arc<LimitsRegistry>,
        config: RiskEngineConfig,
    ) -> Self {
        Self {
            market,
            book,
            limits,
            config,
            sequence: AtomicU64::new(0),
            published: DashMap::new(),
            alert_tx: None,
        }
    }

    /// Emit limit-breach alerts on the given channel after each successful
    /// computation. Sends are best-effort; a dropped receiver only loses
    /// alerts, never blocks the engine.
    pub fn with_alerts(mut self, tx: Sender<RiskAlert>) -> Self {
        self.alert_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &RiskEngineConfig {
        &self.config
    }

    /// Return the published snapshot if the market-data, position-book, and
    /// limits versions are unchanged since it was computed, otherwise
    /// recompute.
    pub fn snapshot(&self, account: &str) -> RiskResult<RiskSnapshot> {
        if let Some(published) = self.published.get(account) {
            if published.snapshot.market_version == self.market.version()
                && published.snapshot.book_version == self.book.version()
                && published.limits_version == self.limits.version()
            {
                return Ok(published.snapshot.clone());
            }
        }
        self.compute(account)
    }

    /// Compute, publish, and return a fresh snapshot for the account.
    pub fn compute(&self, account: &str) -> RiskResult<RiskSnapshot> {
        let limits_version = self.limits.version();
        let limits = self
            .limits
            .get(account)
            .ok_or_else(|| RiskError::UnknownAccount {
                account: account.to_string(),
            })?;
        let book_snap = self.book.snapshot(account)?;
        let (prices, market_version) = self.stable_prices(&book_snap.positions)?;

        let mut gross_exposure = Decimal::ZERO;
        let mut net_exposure = Decimal::ZERO;
        let mut sigmas: Vec<f64> = Vec::with_capacity(book_snap.positions.len());
        let mut position_risks = Vec::with_capacity(book_snap.positions.len());

        for pos in &book_snap.positions {
            let (instrument, point) = &prices[&pos.symbol];
            let notional = pos.quantity * point.price * instrument.multiplier;
            gross_exposure += notional.abs();
            net_exposure += notional;

            // Per-instrument sigma in currency terms
            let sigma = notional.abs() * point.volatility;
            sigmas.push(sigma.to_f64().unwrap_or(0.0));

            position_risks.push(PositionRisk {
                symbol: pos.symbol.clone(),
                quantity: pos.quantity,
                mark_price: point.price,
                notional,
                unrealized_pnl: pos.unrealized_pnl(point.price) * instrument.multiplier,
                var_contribution: self.config.var_z_score * sigma,
            });
        }

        let sigma_p = portfolio_sigma(&sigmas, self.config.correlation);
        let var = self.config.var_z_score
            * Decimal::from_f64_retain(sigma_p).unwrap_or_default();

        let margin_utilization = if limits.capital > Decimal::ZERO {
            gross_exposure / limits.capital
        } else {
            Decimal::ZERO
        };

        let snapshot = RiskSnapshot {
            id: Uuid::new_v4(),
            account: account.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            gross_exposure,
            net_exposure,
            var,
            margin_utilization,
            market_version,
            book_version: book_snap.book_version,
            positions: position_risks,
        };

        self.publish(snapshot.clone(), limits_version);
        self.check_limits(&snapshot, &limits);
        Ok(snapshot)
    }

    /// Resolve every held instrument's price from a single cache version.
    ///
    /// Any missing price fails the whole call; the engine never substitutes
    /// stale or zero values. If the market keeps moving, the freshest
    /// complete read wins after the last retry so fills are never delayed
    /// by snapshot load.
    fn stable_prices(
        &self,
        positions: &[Position],
    ) -> RiskResult<(HashMap<Symbol, (Instrument, PricePoint)>, u64)> {
        let mut version = self.market.version();
        let mut attempt = 0;
        loop {
            let mut resolved = HashMap::with_capacity(positions.len());
            for pos in positions {
                let instrument = self.market.instrument(&pos.symbol)?;
                let point = self.market.get(&pos.symbol)?;
                resolved.insert(pos.symbol.clone(), (instrument, point));
            }

            let after = self.market.version();
            attempt += 1;
            if after == version || attempt >= PRICE_READ_RETRIES {
                return Ok((resolved, after));
            }
            debug!(attempt, "market moved during snapshot read, retrying");
            version = after;
        }
    }

    /// Replace the published snapshot, keeping sequence numbers monotonic
    /// under racing computations for the same account.
    fn publish(&self, snapshot: RiskSnapshot, limits_version: u64) {
        let published = Published {
            snapshot,
            limits_version,
        };
        match self.published.entry(published.snapshot.account.clone()) {
            Entry::Occupied(mut entry) => {
                if published.snapshot.sequence > entry.get().snapshot.sequence {
                    entry.insert(published);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(published);
            }
        }
    }

    // ---- limit checks ----

    fn check_limits(&self, snap: &RiskSnapshot, limits: &RiskLimits) {
        let warn_at = self.config.warning_threshold_pct;

        let gross = snap.gross_exposure;
        if gross >= limits.max_gross_exposure {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Critical,
                RiskAlertKind::GrossExposureBreach {
                    gross_exposure: gross,
                    limit: limits.max_gross_exposure,
                },
                format!(
                    "gross exposure {gross} exceeds {} limit",
                    limits.max_gross_exposure
                ),
            ));
        } else if gross >= limits.max_gross_exposure * warn_at {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Warning,
                RiskAlertKind::GrossExposureBreach {
                    gross_exposure: gross,
                    limit: limits.max_gross_exposure,
                },
                format!(
                    "gross exposure {gross} approaching {} limit",
                    limits.max_gross_exposure
                ),
            ));
        }

        if snap.var >= limits.max_var {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Critical,
                RiskAlertKind::VarBreach {
                    var: snap.var,
                    limit: limits.max_var,
                },
                format!("VaR {} exceeds {} budget", snap.var, limits.max_var),
            ));
        } else if snap.var >= limits.max_var * warn_at {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Warning,
                RiskAlertKind::VarBreach {
                    var: snap.var,
                    limit: limits.max_var,
                },
                format!("VaR {} approaching {} budget", snap.var, limits.max_var),
            ));
        }

        for pr in &snap.positions {
            let cap = limits.position_cap(&pr.symbol);
            if pr.quantity.abs() >= cap {
                self.emit(RiskAlert::new(
                    &snap.account,
                    RiskSeverity::Critical,
                    RiskAlertKind::InstrumentCapBreach {
                        symbol: pr.symbol.to_string(),
                        quantity: pr.quantity,
                        limit: cap,
                    },
                    format!(
                        "position {} quantity {} at or above {} cap",
                        pr.symbol, pr.quantity, cap
                    ),
                ));
            }
        }

        if snap.margin_utilization >= Decimal::ONE {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Critical,
                RiskAlertKind::MarginExhausted {
                    utilization: snap.margin_utilization,
                },
                format!("margin utilization {} at capital", snap.margin_utilization),
            ));
        } else if snap.margin_utilization >= warn_at {
            self.emit(RiskAlert::new(
                &snap.account,
                RiskSeverity::Warning,
                RiskAlertKind::MarginExhausted {
                    utilization: snap.margin_utilization,
                },
                format!(
                    "margin utilization {} approaching capital",
                    snap.margin_utilization
                ),
            ));
        }
    }

    fn emit(&self, alert: RiskAlert) {
        match alert.severity {
            RiskSeverity::Critical => {
                warn!(account = %alert.account, %alert.message, "RISK CRITICAL")
            }
            RiskSeverity::Warning => {
                warn!(account = %alert.account, %alert.message, "RISK WARNING")
            }
            RiskSeverity::Info => info!(account = %alert.account, %alert.message, "RISK INFO"),
        }
        // Best-effort send; if the receiver is gone we just log.
        if let Some(tx) = &self.alert_tx {
            let _ = tx.try_send(alert);
        }
    }
}

/// Portfolio standard deviation under a uniform pairwise correlation ρ:
/// `σ_p² = (1−ρ)·Σσᵢ² + ρ·(Σσᵢ)²`.
pub(crate) fn portfolio_sigma(sigmas: &[f64], correlation: f64) -> f64 {
    let sum: f64 = sigmas.iter().sum();
    let sum_sq: f64 = sigmas.iter().map(|s| s * s).sum();
    let variance = (1.0 - correlation) * sum_sq + correlation * sum * sum;
    variance.max(0.0).sqrt()
}
