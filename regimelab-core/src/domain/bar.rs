//! Bar — the fundamental market data unit.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::regime::RegimeSnapshot;

/// OHLCV bar for a single symbol at a fixed timeframe.
///
/// Bars arrive already materialized: OHLCV plus the average true range and
/// whatever regime columns the upstream factor pipeline attached. The core
/// never computes ATR or regime fields, only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Average true range at this bar, if the upstream pipeline supplied it.
    /// Required at entry time when an ATR stop is configured.
    pub atr: Option<f64>,
    /// Regime columns from the external classifier, if present.
    pub regime: Option<RegimeSnapshot>,
}

impl Bar {
    /// Basic OHLC sanity check: high >= low, high/low bracket open and close.
    pub fn is_sane(&self) -> bool {
        !self.open.is_nan()
            && !self.high.is_nan()
            && !self.low.is_nan()
            && !self.close.is_nan()
            && self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Bar granularity. The set matches the upstream pipeline's timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5min")]
    M5,
    #[serde(rename = "15min")]
    M15,
    #[serde(rename = "30min")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5min",
            Timeframe::M15 => "15min",
            Timeframe::M30 => "30min",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Bar duration in minutes. Used only for ordering coarse vs fine.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown timeframe '{0}' (expected one of: 5min, 15min, 30min, 1h, 4h, 1d)")]
pub struct TimeframeParseError(pub String);

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5min" => Ok(Timeframe::M5),
            "15min" => Ok(Timeframe::M15),
            "30min" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            symbol: "BTCUSD".into(),
            timeframe: Timeframe::M30,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
            atr: Some(2.5),
            regime: None,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_nan() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(!bar.is_sane());
    }

    #[test]
    fn timeframe_roundtrip() {
        for tf in [
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ] {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn timeframe_ordering_by_minutes() {
        assert!(Timeframe::H4.minutes() > Timeframe::M30.minutes());
    }

    #[test]
    fn bar_serialization_roundtrip() {
        let bar = sample_bar();
        let json = serde_json::to_string(&bar).unwrap();
        let deser: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar.symbol, deser.symbol);
        assert_eq!(bar.timestamp, deser.timestamp);
        assert_eq!(bar.close, deser.close);
        assert_eq!(bar.atr, deser.atr);
    }
}
