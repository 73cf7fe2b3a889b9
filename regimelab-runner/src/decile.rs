//! Single-factor decile profiles over bars.
//!
//! For each configured factor column, bars are ranked by their factor value
//! within the instrument and bucketed into ten deciles. Each (decile,
//! horizon) cell reports how violently price moves after bars in that
//! bucket: mean absolute forward return, and the probability that the move
//! exceeds 2× and 3× the bar's ATR-relative scale. This is a diagnostic of
//! whether the factor sorts future turbulence, independent of any strategy.

use serde::{Deserialize, Serialize};

use regimelab_core::domain::Bar;

use crate::config::FactorColumn;

/// One (factor, horizon, decile) cell of the profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecileRow {
    pub factor: String,
    pub horizon: usize,
    /// Decile bucket, 0 (lowest factor values) through 9 (highest).
    pub decile: usize,
    pub count: usize,
    pub share_pct: f64,
    pub mean_abs_ret: f64,
    /// P(|forward return| > 2 × ATR/close).
    pub tail_prob_2: f64,
    /// P(|forward return| > 3 × ATR/close).
    pub tail_prob_3: f64,
}

/// Pull the configured factor value off a bar.
fn factor_value(bar: &Bar, factor: FactorColumn) -> Option<f64> {
    let regime = bar.regime.as_ref()?;
    match factor {
        FactorColumn::QManip => regime.q_manip,
        FactorColumn::QOfi => regime.q_ofi,
        FactorColumn::QVol => regime.q_vol,
        FactorColumn::RiskScore => regime.risk_score,
    }
}

/// Build the decile profile for one factor over one symbol's bars.
///
/// Bars without the factor value, without ATR, or too close to the end of
/// the series for a horizon are excluded from that horizon's cells.
pub fn decile_profile(bars: &[Bar], factor: FactorColumn, horizons: &[usize]) -> Vec<DecileRow> {
    // Rank within the instrument over all bars carrying the factor.
    let mut values: Vec<f64> = bars
        .iter()
        .filter_map(|b| factor_value(b, factor))
        .filter(|v| v.is_finite())
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    if values.is_empty() {
        return Vec::new();
    }

    let mut rows = Vec::with_capacity(horizons.len() * 10);
    for &horizon in horizons {
        // Per-decile accumulators: count, sum |ret|, tail hits.
        let mut count = [0usize; 10];
        let mut abs_sum = [0.0f64; 10];
        let mut tail2 = [0usize; 10];
        let mut tail3 = [0usize; 10];

        for (t, bar) in bars.iter().enumerate() {
            let Some(value) = factor_value(bar, factor).filter(|v| v.is_finite()) else {
                continue;
            };
            let Some(atr) = bar.atr else { continue };
            if t + horizon >= bars.len() || bar.close <= 0.0 || atr <= 0.0 {
                continue;
            }
            let forward_ret = (bars[t + horizon].close - bar.close) / bar.close;
            let scale = atr / bar.close;
            let d = decile_of(&values, value);
            count[d] += 1;
            abs_sum[d] += forward_ret.abs();
            if forward_ret.abs() > 2.0 * scale {
                tail2[d] += 1;
            }
            if forward_ret.abs() > 3.0 * scale {
                tail3[d] += 1;
            }
        }

        let total: usize = count.iter().sum();
        for d in 0..10 {
            if count[d] == 0 {
                continue;
            }
            let n = count[d] as f64;
            rows.push(DecileRow {
                factor: factor.to_string(),
                horizon,
                decile: d,
                count: count[d],
                share_pct: count[d] as f64 / total as f64 * 100.0,
                mean_abs_ret: abs_sum[d] / n,
                tail_prob_2: tail2[d] as f64 / n,
                tail_prob_3: tail3[d] as f64 / n,
            });
        }
    }
    rows
}

/// Decile bucket from the mid-rank of `value` within the sorted sample.
///
/// Ties take the midpoint of their rank range so a heavily repeated value
/// lands in one consistent bucket.
fn decile_of(sorted: &[f64], value: f64) -> usize {
    let lower = sorted.partition_point(|v| *v < value);
    let upper = sorted.partition_point(|v| *v <= value);
    let mid_rank = (lower + upper) as f64 / 2.0;
    let pct = mid_rank / sorted.len() as f64;
    ((pct * 10.0) as usize).min(9)
}
