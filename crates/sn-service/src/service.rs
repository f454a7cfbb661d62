//! Boundary service orchestrating the risk components.
//!
//! Owns the market-data cache, position book, limits registry, risk engine,
//! and position sizer, and is the single entry point for both feed events
//! and risk queries. Transport framing, authentication, and health
//! reporting live outside this crate.

use std::sync::Arc;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tracing::info;

use sn_risk::{
    LimitsRegistry, MarketDataCache, MarketDataConfig, PositionBook, PositionSizer, RiskAlert,
    RiskEngine, RiskEngineConfig, SizerConfig,
};
use sn_types::{
    FeedEvent, Instrument, PositionRisk, RiskError, RiskLimits, RiskResult, RiskSnapshot,
    SizingOutcome, SizingRequest, Symbol,
};

/// Configuration for the service and its components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskServiceConfig {
    pub marketdata: MarketDataConfig,
    pub engine: RiskEngineConfig,
    pub sizer: SizerConfig,
}

/// The risk service boundary.
pub struct RiskService {
    market: Arc<MarketDataCache>,
    book: Arc<PositionBook>,
    limits: Arc<LimitsRegistry>,
    engine: Arc<RiskEngine>,
    sizer: PositionSizer,
}

impl RiskService {
    pub fn new(config: RiskServiceConfig) -> Self {
        Self::build(config, None)
    }

    /// Build a service whose engine emits limit-breach alerts on `tx`.
    pub fn with_alerts(config: RiskServiceConfig, tx: Sender<RiskAlert>) -> Self {
        Self::build(config, Some(tx))
    }

    fn build(config: RiskServiceConfig, alert_tx: Option<Sender<RiskAlert>>) -> Self {
        let market = Arc::new(MarketDataCache::new(config.marketdata));
        let book = Arc::new(PositionBook::new());
        let limits = Arc::new(LimitsRegistry::new());

        let mut engine = RiskEngine::new(
            market.clone(),
            book.clone(),
            limits.clone(),
            config.engine,
        );
        if let Some(tx) = alert_tx {
            engine = engine.with_alerts(tx);
        }
        let engine = Arc::new(engine);

        let sizer = PositionSizer::new(
            market.clone(),
            book.clone(),
            limits.clone(),
            engine.clone(),
            config.sizer,
        );

        Self {
            market,
            book,
            limits,
            engine,
            sizer,
        }
    }

    // ---- registration ----

    pub fn register_instrument(&self, instrument: Instrument) -> RiskResult<()> {
        info!(symbol = %instrument.symbol, "registering instrument");
        self.market.register(instrument)
    }

    pub fn register_account(&self, account: &str, limits: RiskLimits) {
        info!(account, "registering account");
        self.book.register_account(account);
        self.limits.set(account, limits);
    }

    // ---- queries ----

    /// Aggregate risk for the account, reusing the published snapshot while
    /// the underlying versions are unchanged.
    pub fn portfolio_risk(&self, account: &str) -> RiskResult<RiskSnapshot> {
        self.engine.snapshot(account)
    }

    /// Risk metrics for a single held position.
    pub fn position_risk(&self, account: &str, symbol: &Symbol) -> RiskResult<PositionRisk> {
        let snapshot = self.engine.snapshot(account)?;
        snapshot
            .position(symbol)
            .cloned()
            .ok_or_else(|| RiskError::UnknownInstrument {
                symbol: symbol.to_string(),
            })
    }

    /// Size a proposed trade against the account's risk budget.
    pub fn position_size(&self, request: &SizingRequest) -> RiskResult<SizingOutcome> {
        self.sizer.size(request)
    }

    // ---- feed ingestion ----

    /// Route one feed event into the owning component.
    ///
    /// `StaleData` is returned to the caller, which is expected to log and
    /// drop it; the cache is untouched. A fill referencing an unregistered
    /// instrument is rejected so every held position always has a price
    /// source.
    pub fn apply(&self, event: FeedEvent) -> RiskResult<()> {
        match event {
            FeedEvent::Price(update) => {
                self.market
                    .update(&update.symbol, update.price, update.timestamp)
            }
            FeedEvent::Fill(fill) => {
                if !self.market.contains(&fill.symbol) {
                    return Err(RiskError::UnknownInstrument {
                        symbol: fill.symbol.to_string(),
                    });
                }
                let report = self.book.apply_fill(
                    &fill.account,
                    &fill.symbol,
                    fill.quantity,
                    fill.price,
                    fill.timestamp,
                )?;
                info!(
                    account = %fill.account,
                    symbol = %fill.symbol,
                    quantity = %fill.quantity,
                    price = %fill.price,
                    realized = %report.realized_pnl,
                    "fill applied"
                );
                Ok(())
            }
            FeedEvent::Limits(update) => {
                info!(account = %update.account, "limits updated");
                self.limits.set(&update.account, update.limits);
                Ok(())
            }
        }
    }

    // ---- component access for diagnostics ----

    pub fn market(&self) -> &MarketDataCache {
        &self.market
    }

    pub fn book(&self) -> &PositionBook {
        &self.book
    }
}
