//! Run summary metrics — pure functions that reduce one symbol's result.
//!
//! Every metric is a pure function: trade list and/or equity curve in,
//! scalar out. No dependencies on the runner or the engine loop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regimelab_core::domain::{EquityPoint, TradeRecord};
use regimelab_core::engine::SymbolRunResult;
use regimelab_core::risk::RejectReason;

/// Aggregate summary for a single (symbol, timeframe) run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub symbol: String,
    pub timeframe: String,
    pub bar_count: usize,
    pub trade_count: usize,
    pub win_rate_pct: f64,
    pub total_net_pnl: f64,
    pub mean_net_pnl: f64,
    pub total_return_pct: f64,
    /// Annualized from the equity curve's calendar span; None when the span
    /// is shorter than a day.
    pub annualized_return_pct: Option<f64>,
    pub max_drawdown_pct: f64,
    pub mean_r: Option<f64>,
    pub median_r: Option<f64>,
    /// Mean R over std of R, unannualized.
    pub r_sharpe: Option<f64>,
    pub blocked_entries: BTreeMap<RejectReason, usize>,
}

impl RunSummary {
    pub fn compute(result: &SymbolRunResult, initial_equity: f64) -> Self {
        let trades = &result.trades;
        let r_values: Vec<f64> = trades.iter().filter_map(|t| t.r_multiple).collect();
        let total_net_pnl: f64 = trades.iter().map(|t| t.net_pnl).sum();
        Self {
            symbol: result.symbol.clone(),
            timeframe: result.timeframe.as_str().to_string(),
            bar_count: result.bar_count,
            trade_count: trades.len(),
            win_rate_pct: win_rate_pct(trades),
            total_net_pnl,
            mean_net_pnl: if trades.is_empty() {
                0.0
            } else {
                total_net_pnl / trades.len() as f64
            },
            total_return_pct: total_return_pct(&result.equity_curve, initial_equity),
            annualized_return_pct: annualized_return_pct(&result.equity_curve, initial_equity),
            max_drawdown_pct: max_drawdown_pct(&result.equity_curve),
            mean_r: mean(&r_values),
            median_r: median(&r_values),
            r_sharpe: sharpe_like(&r_values),
            blocked_entries: result.blocked_entries.clone(),
        }
    }

    pub fn blocked_total(&self) -> usize {
        self.blocked_entries.values().sum()
    }
}

/// Winning trades as a percentage of all trades. Zero trades → 0.
pub fn win_rate_pct(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64 * 100.0
}

/// Total return over the run as a percentage of initial equity.
pub fn total_return_pct(equity_curve: &[EquityPoint], initial_equity: f64) -> f64 {
    match equity_curve.last() {
        Some(last) if initial_equity > 0.0 => {
            (last.equity - initial_equity) / initial_equity * 100.0
        }
        _ => 0.0,
    }
}

/// Annualize total return over the curve's calendar span.
pub fn annualized_return_pct(equity_curve: &[EquityPoint], initial_equity: f64) -> Option<f64> {
    let first = equity_curve.first()?;
    let last = equity_curve.last()?;
    let days = (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0;
    if days < 1.0 || initial_equity <= 0.0 || last.equity <= 0.0 {
        return None;
    }
    let years = days / 365.25;
    let growth = last.equity / initial_equity;
    Some((growth.powf(1.0 / years) - 1.0) * 100.0)
}

/// Maximum peak-to-trough drawdown as a percentage of the peak.
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            worst = worst.max((peak - point.equity) / peak * 100.0);
        }
    }
    worst
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median with midpoint interpolation for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
    }
}

/// Sample standard deviation. None for fewer than two observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Mean over standard deviation. None when std is zero or undefined.
pub fn sharpe_like(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sd = std_dev(values)?;
    if sd == 0.0 {
        None
    } else {
        Some(m / sd)
    }
}
