//! CSV bar loading for the runner.
//!
//! One file per (symbol, timeframe), named `{symbol}_{timeframe}.csv`, with
//! columns `timestamp, open, high, low, close, volume, atr` and the optional
//! regime columns `q_manip, q_ofi, q_vol, risk_score, risk_regime,
//! high_pressure, factor_box`. The loader enforces strict timestamp ordering
//! and basic field sanity before any bar reaches the engine.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use serde::Deserialize;
use thiserror::Error;

use regimelab_core::domain::{Bar, RegimeSnapshot, RiskRegime, Timeframe};
use regimelab_core::error::{DataIntegrityError, DataOrderingError};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open data file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Ordering(#[from] DataOrderingError),
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),
    #[error("'{path}' row {row}: {reason}")]
    BadRow {
        path: String,
        row: usize,
        reason: String,
    },
}

/// Raw CSV row before validation. Optional columns tolerate absent headers.
#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    atr: Option<f64>,
    #[serde(default)]
    q_manip: Option<f64>,
    #[serde(default)]
    q_ofi: Option<f64>,
    #[serde(default)]
    q_vol: Option<f64>,
    #[serde(default)]
    risk_score: Option<f64>,
    #[serde(default)]
    risk_regime: Option<String>,
    #[serde(default)]
    high_pressure: Option<String>,
    #[serde(default)]
    factor_box: Option<String>,
}

/// Conventional path for a (symbol, timeframe) series under `data_dir`.
pub fn data_path(data_dir: &Path, symbol: &str, timeframe: Timeframe) -> PathBuf {
    data_dir.join(format!("{symbol}_{}.csv", timeframe.as_str()))
}

/// Load one symbol's bars from `path`, filtered to the inclusive date window.
pub fn load_bars(
    path: &Path,
    symbol: &str,
    timeframe: Timeframe,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Vec<Bar>, LoadError> {
    let display_path = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: display_path.clone(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut bars: Vec<Bar> = Vec::new();
    for (row_index, record) in reader.deserialize::<CsvRow>().enumerate() {
        let row = record?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadRow {
            path: display_path.clone(),
            row: row_index + 1,
            reason: format!("unparseable timestamp '{}'", row.timestamp),
        })?;

        if let Some(start) = start {
            if timestamp.date() < start {
                continue;
            }
        }
        if let Some(end) = end {
            if timestamp.date() > end {
                continue;
            }
        }

        let regime = build_snapshot(&row, &display_path, row_index + 1)?;
        let bar = Bar {
            symbol: symbol.to_string(),
            timeframe,
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            atr: row.atr,
            regime,
        };

        if !bar.is_sane() {
            return Err(DataIntegrityError::BadField {
                symbol: symbol.to_string(),
                timeframe: timeframe.as_str().to_string(),
                timestamp,
                field: "ohlc",
            }
            .into());
        }
        if let Some(prev) = bars.last() {
            if bar.timestamp <= prev.timestamp {
                return Err(DataOrderingError {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.as_str().to_string(),
                    timestamp: bar.timestamp,
                    index: row_index + 1,
                }
                .into());
            }
        }
        bars.push(bar);
    }

    info!(
        "loaded {} bars for {symbol} {} from {display_path}",
        bars.len(),
        timeframe.as_str()
    );
    Ok(bars)
}

/// Accept both `2024-01-02 00:30:00` and `2024-01-02T00:30:00`.
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Assemble the regime snapshot, or None when no regime column is present.
fn build_snapshot(
    row: &CsvRow,
    path: &str,
    row_number: usize,
) -> Result<Option<RegimeSnapshot>, LoadError> {
    let risk_regime = match row.risk_regime.as_deref() {
        None | Some("") => None,
        Some(label) => Some(parse_regime(label).ok_or_else(|| LoadError::BadRow {
            path: path.to_string(),
            row: row_number,
            reason: format!("unknown risk_regime '{label}'"),
        })?),
    };
    let high_pressure = match row.high_pressure.as_deref() {
        None | Some("") => false,
        Some(flag) => parse_flag(flag).ok_or_else(|| LoadError::BadRow {
            path: path.to_string(),
            row: row_number,
            reason: format!("unparseable high_pressure flag '{flag}'"),
        })?,
    };
    let factor_box = row.factor_box.clone().filter(|s| !s.is_empty());

    let any_present = row.q_manip.is_some()
        || row.q_ofi.is_some()
        || row.q_vol.is_some()
        || row.risk_score.is_some()
        || risk_regime.is_some()
        || high_pressure
        || factor_box.is_some();
    if !any_present {
        return Ok(None);
    }

    Ok(Some(RegimeSnapshot {
        q_manip: row.q_manip,
        q_ofi: row.q_ofi,
        q_vol: row.q_vol,
        risk_score: row.risk_score,
        risk_regime,
        high_pressure,
        factor_box,
    }))
}

fn parse_regime(label: &str) -> Option<RiskRegime> {
    match label.to_ascii_lowercase().as_str() {
        "low" => Some(RiskRegime::Low),
        "medium" | "mid" => Some(RiskRegime::Medium),
        "high" => Some(RiskRegime::High),
        _ => None,
    }
}

fn parse_flag(flag: &str) -> Option<bool> {
    match flag.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
