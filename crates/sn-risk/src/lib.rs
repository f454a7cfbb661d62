//! Portfolio risk core for Sentinel.
//!
//! Provides:
//! - Latest-price market data cache with EWMA volatility tracking
//! - Concurrent position book with VWAP/realized-P&L fill accounting
//! - Per-account risk limit registry
//! - Risk engine computing exposure, parametric VaR, and margin utilization
//! - Pure position sizer respecting the account's risk budget
//! - Limit-breach alerts emitted via channels

pub mod alerts;
pub mod book;
pub mod engine;
pub mod limits;
pub mod marketdata;
pub mod sizer;

pub use alerts::{RiskAlert, RiskAlertKind, RiskSeverity};
pub use book::{AccountSnapshot, FillReport, PositionBook};
pub use engine::{RiskEngine, RiskEngineConfig};
pub use limits::LimitsRegistry;
pub use marketdata::{MarketDataCache, MarketDataConfig};
pub use sizer::{PositionSizer, SizerConfig};
