//! Core error taxonomy.
//!
//! Fatal errors carry enough context (symbol, timeframe, timestamp, field)
//! to reproduce the failure. Risk-limit rejections are NOT errors — they are
//! normal control-flow outcomes counted by the engine (see `risk::RejectReason`).

use chrono::NaiveDateTime;
use thiserror::Error;

/// Input series not sorted / not unique by timestamp. Fatal for the symbol.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "data ordering violation for {symbol} {timeframe}: timestamp {timestamp} \
     at row {index} is not strictly after its predecessor"
)]
pub struct DataOrderingError {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: NaiveDateTime,
    pub index: usize,
}

/// Required field missing or malformed mid-run. Fatal for the symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("{symbol} {timeframe}: ATR missing at {timestamp}, cannot compute stop price")]
    MissingAtr {
        symbol: String,
        timeframe: String,
        timestamp: NaiveDateTime,
    },
    #[error("{symbol} {timeframe}: non-positive {field} at {timestamp}")]
    BadField {
        symbol: String,
        timeframe: String,
        timestamp: NaiveDateTime,
        field: &'static str,
    },
}

/// Anything that aborts a single symbol's backtest pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ordering(#[from] DataOrderingError),
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
}

/// Configuration rejected before any bar is processed. Fatal for the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("EMA length '{which}' must be positive")]
    NonPositiveEmaLength { which: &'static str },
    #[error("percentage '{which}' = {value} out of range [0, 100]")]
    PercentOutOfRange { which: &'static str, value: f64 },
    #[error("'{which}' must be positive, got {value}")]
    NonPositive { which: &'static str, value: f64 },
    #[error("'{which}' must be at least 1")]
    ZeroLimit { which: &'static str },
    #[error("{0}")]
    Invalid(String),
}
