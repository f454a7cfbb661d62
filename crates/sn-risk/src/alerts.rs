//! Risk alert types and severity levels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a risk alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskSeverity {
    /// Informational — within normal operating range.
    Info,
    /// Warning — approaching a limit.
    Warning,
    /// Critical — limit breached; action required.
    Critical,
}

/// Discriminant for the kind of risk alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RiskAlertKind {
    /// Gross exposure exceeds the account's limit.
    GrossExposureBreach {
        gross_exposure: Decimal,
        limit: Decimal,
    },
    /// Portfolio VaR exceeds the account's budget.
    VarBreach { var: Decimal, limit: Decimal },
    /// A single position exceeds its per-instrument quantity cap.
    InstrumentCapBreach {
        symbol: String,
        quantity: Decimal,
        limit: Decimal,
    },
    /// Margin utilization at or above the account's capital.
    MarginExhausted { utilization: Decimal },
}

/// A single risk alert emitted by the engine after a snapshot computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub severity: RiskSeverity,
    pub kind: RiskAlertKind,
    pub message: String,
    /// Whether the alert has been acknowledged by a human operator.
    pub acknowledged: bool,
}

impl RiskAlert {
    pub fn new(
        account: &str,
        severity: RiskSeverity,
        kind: RiskAlertKind,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            account: account.to_string(),
            severity,
            kind,
            message,
            acknowledged: false,
        }
    }
}
