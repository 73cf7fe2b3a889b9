//! Ladder trend classification — banded EMAs on running highs and lows.
//!
//! Bands:
//!   fast_upper = EMA(high, fast_len), fast_lower = EMA(low, fast_len)
//!   slow_upper = EMA(high, slow_len), slow_lower = EMA(low, slow_len)
//!
//! States:
//!   Up      = close > fast_upper && close > slow_upper
//!   Down    = close < fast_lower && close < slow_lower
//!   Neutral = otherwise
//!
//! All four bands are recursive single-pass filters: each value depends only
//! on the current bar's high/low and the previous band value.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::error::ConfigValidationError;
use crate::indicators::ema_of_series;

/// Discrete trend state per bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Up,
    Down,
    Neutral,
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::Up => f.write_str("up"),
            TrendState::Down => f.write_str("down"),
            TrendState::Neutral => f.write_str("neutral"),
        }
    }
}

/// Ladder band lengths. Defaults match the production calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderConfig {
    pub fast_len: usize,
    pub slow_len: usize,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            fast_len: 25,
            slow_len: 90,
        }
    }
}

impl LadderConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.fast_len == 0 {
            return Err(ConfigValidationError::NonPositiveEmaLength {
                which: "fast_len",
            });
        }
        if self.slow_len == 0 {
            return Err(ConfigValidationError::NonPositiveEmaLength {
                which: "slow_len",
            });
        }
        Ok(())
    }
}

/// Band values and trend state for a single bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderPoint {
    pub fast_upper: f64,
    pub fast_lower: f64,
    pub slow_upper: f64,
    pub slow_lower: f64,
    pub state: TrendState,
}

/// Compute ladder bands and per-bar trend states.
///
/// Output has the same length as the input. The config must be validated
/// by the caller before any bar is processed; lengths are asserted here.
pub fn compute_ladder(bars: &[Bar], cfg: &LadderConfig) -> Vec<LadderPoint> {
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();

    let fast_upper = ema_of_series(&highs, cfg.fast_len);
    let fast_lower = ema_of_series(&lows, cfg.fast_len);
    let slow_upper = ema_of_series(&highs, cfg.slow_len);
    let slow_lower = ema_of_series(&lows, cfg.slow_len);

    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let state = classify(
                bar.close,
                fast_upper[i],
                fast_lower[i],
                slow_upper[i],
                slow_lower[i],
            );
            LadderPoint {
                fast_upper: fast_upper[i],
                fast_lower: fast_lower[i],
                slow_upper: slow_upper[i],
                slow_lower: slow_lower[i],
                state,
            }
        })
        .collect()
}

/// Convenience: just the per-bar trend states.
pub fn compute_states(bars: &[Bar], cfg: &LadderConfig) -> Vec<TrendState> {
    compute_ladder(bars, cfg).iter().map(|p| p.state).collect()
}

fn classify(close: f64, fast_u: f64, fast_l: f64, slow_u: f64, slow_l: f64) -> TrendState {
    // NaN bands compare false on both sides, landing in Neutral.
    if close > fast_u && close > slow_u {
        TrendState::Up
    } else if close < fast_l && close < slow_l {
        TrendState::Down
    } else {
        TrendState::Neutral
    }
}

/// A maximal run of consecutive bars sharing the same non-Neutral state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSegment {
    pub state: TrendState,
    pub start_ts: NaiveDateTime,
    pub end_ts: NaiveDateTime,
    pub bars: usize,
    /// Close-to-close return from the first to the last bar of the run.
    pub realized_return: f64,
}

/// Extract Up/Down segments for diagnostic analysis. Neutral runs are skipped.
pub fn extract_segments(bars: &[Bar], states: &[TrendState]) -> Vec<TrendSegment> {
    debug_assert_eq!(bars.len(), states.len());
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;

    for i in 0..states.len() {
        let open_run = start.map(|s| states[s]);
        match (open_run, states[i]) {
            (None, TrendState::Neutral) => {}
            (None, _) => start = Some(i),
            (Some(cur), next) if next == cur => {}
            (Some(cur), next) => {
                let s = start.take().unwrap();
                segments.push(make_segment(bars, cur, s, i - 1));
                if next != TrendState::Neutral {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(s) = start {
        segments.push(make_segment(bars, states[s], s, states.len() - 1));
    }

    segments
}

fn make_segment(bars: &[Bar], state: TrendState, start: usize, end: usize) -> TrendSegment {
    let first = &bars[start];
    let last = &bars[end];
    let realized_return = if first.close > 0.0 {
        last.close / first.close - 1.0
    } else {
        0.0
    };
    TrendSegment {
        state,
        start_ts: first.timestamp,
        end_ts: last.timestamp,
        bars: end - start + 1,
        realized_return,
    }
}
