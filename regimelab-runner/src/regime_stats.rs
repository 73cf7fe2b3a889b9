//! Regime-conditioned performance tables.
//!
//! Groups completed trades by the regime columns snapshotted at entry and
//! reduces each group to distribution statistics over the R-multiple, the
//! scale-free measure: PnL distributions are not comparable across
//! compounding position sizes, R distributions are. Trades without a label
//! fall into an explicit "unknown" bucket rather than disappearing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use regimelab_core::domain::TradeRecord;

use crate::metrics::{mean, median, sharpe_like, std_dev};

/// Distribution statistics for one group of trades, keyed by a label.
///
/// The distribution columns (mean/median/std, percentiles, Sharpe-like)
/// reduce over the R-multiples of the group's trades; trades without an R
/// (no ATR at entry) are dropped from those columns but still counted in
/// `count` and the PnL columns. All of them are `None` when no trade in
/// the group carries an R.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStat {
    pub key: String,
    pub count: usize,
    /// Group size as a percentage of all trades in the table.
    pub share_pct: f64,
    /// Trades in the group that carry an R-multiple.
    pub r_count: usize,
    pub mean_r: Option<f64>,
    pub median_r: Option<f64>,
    pub std_r: Option<f64>,
    pub p1: Option<f64>,
    pub p5: Option<f64>,
    pub p10: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub win_rate_pct: f64,
    /// Mean R over std of R.
    pub sharpe_like: Option<f64>,
    pub mean_pnl: f64,
    pub total_pnl: f64,
}

/// Performance grouped by the risk regime at entry.
pub fn perf_by_regime(trades: &[TradeRecord]) -> Vec<GroupStat> {
    group_by(trades, |t| {
        t.risk_regime_entry
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    })
}

/// Performance grouped by the high-pressure flag at entry.
pub fn perf_by_pressure(trades: &[TradeRecord]) -> Vec<GroupStat> {
    group_by(trades, |t| {
        if t.high_pressure_entry {
            "high_pressure".to_string()
        } else {
            "normal".to_string()
        }
    })
}

/// Performance grouped by the combined factor box at entry. Boxes with
/// fewer than `min_trades` trades are skipped: their statistics are noise.
pub fn perf_by_box(trades: &[TradeRecord], min_trades: usize) -> Vec<GroupStat> {
    group_by(trades, |t| {
        t.factor_box_entry
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    })
    .into_iter()
    .filter(|g| g.count >= min_trades)
    .collect()
}

fn group_by<F>(trades: &[TradeRecord], key_of: F) -> Vec<GroupStat>
where
    F: Fn(&TradeRecord) -> String,
{
    let mut groups: BTreeMap<String, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        groups.entry(key_of(trade)).or_default().push(trade);
    }
    let total = trades.len();
    groups
        .into_iter()
        .map(|(key, members)| reduce_group(key, &members, total))
        .collect()
}

fn reduce_group(key: String, members: &[&TradeRecord], total: usize) -> GroupStat {
    let rs: Vec<f64> = members.iter().filter_map(|t| t.r_multiple).collect();
    let total_pnl: f64 = members.iter().map(|t| t.net_pnl).sum();
    let winners = members.iter().filter(|t| t.is_winner()).count();
    let mut sorted = rs.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pct = |p: f64| (!sorted.is_empty()).then(|| percentile(&sorted, p));
    GroupStat {
        key,
        count: members.len(),
        share_pct: if total == 0 {
            0.0
        } else {
            members.len() as f64 / total as f64 * 100.0
        },
        r_count: rs.len(),
        mean_r: mean(&rs),
        median_r: median(&rs),
        std_r: std_dev(&rs),
        p1: pct(1.0),
        p5: pct(5.0),
        p10: pct(10.0),
        p90: pct(90.0),
        p95: pct(95.0),
        p99: pct(99.0),
        win_rate_pct: if members.is_empty() {
            0.0
        } else {
            winners as f64 / members.len() as f64 * 100.0
        },
        sharpe_like: sharpe_like(&rs),
        mean_pnl: if members.is_empty() {
            0.0
        } else {
            total_pnl / members.len() as f64
        },
        total_pnl,
    }
}

/// Percentile with linear interpolation between closest ranks.
///
/// `sorted` must be ascending. Empty input returns 0.0; callers never reach
/// that through the grouping path.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
