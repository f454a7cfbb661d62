use chrono::{DateTime, Utc};
use thiserror::Error;

/// Error taxonomy for the risk core.
///
/// Every error is local to the offending account or instrument; no error is
/// fatal to the service and none corrupts unrelated state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("unknown account: {account}")]
    UnknownAccount { account: String },

    #[error("unknown instrument: {symbol}")]
    UnknownInstrument { symbol: String },

    #[error("stale market data for {symbol}: incoming {incoming} <= current {current}")]
    StaleData {
        symbol: String,
        incoming: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("missing market data for {symbol}")]
    MissingMarketData { symbol: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for risk-core operations.
pub type RiskResult<T> = Result<T, RiskError>;
