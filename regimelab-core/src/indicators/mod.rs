//! Causal indicator primitives.
//!
//! The ladder bands are the only indicator the engine needs; ATR arrives
//! precomputed on each bar from the upstream pipeline.

pub mod ema;

pub use ema::ema_of_series;

/// Create synthetic 30-minute bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev close (or close for the first bar),
/// high = max(open, close) + 1.0, low = min(open, close) - 1.0, and a
/// constant ATR of 1.0 so stop arithmetic stays hand-checkable.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    use crate::domain::{Bar, Timeframe};
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            Bar {
                symbol: "TEST".to_string(),
                timeframe: Timeframe::M30,
                timestamp: base + chrono::Duration::minutes(30 * i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
                atr: Some(1.0),
                regime: None,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
