//! CSV artifact generation.
//!
//! One artifact set per (symbol, timeframe): trade tape, equity curve, run
//! summary, the three regime-conditioned performance tables, and the decile
//! profiles. All writers produce CSV text; `write_artifacts` persists the
//! whole set under `out_dir` with a `{symbol}_{timeframe}` suffix.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regimelab_core::domain::{EquityPoint, TradeRecord};

use crate::decile::DecileRow;
use crate::metrics::RunSummary;
use crate::regime_stats::GroupStat;

/// Export the trade tape as CSV.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "timeframe",
        "entry_time",
        "exit_time",
        "entry_price",
        "exit_price",
        "notional",
        "gross_pnl",
        "costs",
        "net_pnl",
        "return_pct",
        "r_multiple",
        "bars_held",
        "exit_reason",
        "risk_score_entry",
        "risk_regime_entry",
        "high_pressure_entry",
        "factor_box_entry",
        "atr_entry",
    ])?;
    for t in trades {
        wtr.write_record([
            t.symbol.as_str(),
            t.timeframe.as_str(),
            &t.entry_time.to_string(),
            &t.exit_time.to_string(),
            &format!("{:.6}", t.entry_price),
            &format!("{:.6}", t.exit_price),
            &format!("{:.2}", t.notional),
            &format!("{:.4}", t.gross_pnl),
            &format!("{:.4}", t.costs),
            &format!("{:.4}", t.net_pnl),
            &format!("{:.4}", t.return_pct),
            &opt_num(t.r_multiple, 4),
            &t.bars_held.to_string(),
            &t.exit_reason.to_string(),
            &opt_num(t.risk_score_entry, 4),
            &t.risk_regime_entry
                .map(|r| r.to_string())
                .unwrap_or_default(),
            &t.high_pressure_entry.to_string(),
            t.factor_box_entry.as_deref().unwrap_or(""),
            &opt_num(t.atr_entry, 6),
        ])?;
    }
    finish(wtr)
}

/// Export the per-bar equity curve as CSV.
pub fn export_equity_csv(equity_curve: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "equity", "in_position"])?;
    for point in equity_curve {
        wtr.write_record([
            &point.timestamp.to_string(),
            &format!("{:.4}", point.equity),
            &point.in_position.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Export the run summary as a one-row CSV.
pub fn export_summary_csv(summary: &RunSummary) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "timeframe",
        "bar_count",
        "trade_count",
        "win_rate_pct",
        "total_net_pnl",
        "mean_net_pnl",
        "total_return_pct",
        "annualized_return_pct",
        "max_drawdown_pct",
        "mean_r",
        "median_r",
        "r_sharpe",
        "entries_blocked",
    ])?;
    wtr.write_record([
        summary.symbol.as_str(),
        summary.timeframe.as_str(),
        &summary.bar_count.to_string(),
        &summary.trade_count.to_string(),
        &format!("{:.2}", summary.win_rate_pct),
        &format!("{:.4}", summary.total_net_pnl),
        &format!("{:.4}", summary.mean_net_pnl),
        &format!("{:.4}", summary.total_return_pct),
        &opt_num(summary.annualized_return_pct, 4),
        &format!("{:.4}", summary.max_drawdown_pct),
        &opt_num(summary.mean_r, 4),
        &opt_num(summary.median_r, 4),
        &opt_num(summary.r_sharpe, 4),
        &summary.blocked_total().to_string(),
    ])?;
    finish(wtr)
}

/// Export a grouped performance table as CSV.
pub fn export_group_stats_csv(table: &[GroupStat]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "key",
        "count",
        "share_pct",
        "r_count",
        "mean_r",
        "median_r",
        "std_r",
        "p1_r",
        "p5_r",
        "p10_r",
        "p90_r",
        "p95_r",
        "p99_r",
        "win_rate_pct",
        "sharpe_like",
        "mean_pnl",
        "total_pnl",
    ])?;
    for g in table {
        wtr.write_record([
            g.key.as_str(),
            &g.count.to_string(),
            &format!("{:.2}", g.share_pct),
            &g.r_count.to_string(),
            &opt_num(g.mean_r, 4),
            &opt_num(g.median_r, 4),
            &opt_num(g.std_r, 4),
            &opt_num(g.p1, 4),
            &opt_num(g.p5, 4),
            &opt_num(g.p10, 4),
            &opt_num(g.p90, 4),
            &opt_num(g.p95, 4),
            &opt_num(g.p99, 4),
            &format!("{:.2}", g.win_rate_pct),
            &opt_num(g.sharpe_like, 4),
            &format!("{:.4}", g.mean_pnl),
            &format!("{:.4}", g.total_pnl),
        ])?;
    }
    finish(wtr)
}

/// Export the decile profiles as CSV.
pub fn export_deciles_csv(rows: &[DecileRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "factor",
        "horizon",
        "decile",
        "count",
        "share_pct",
        "mean_abs_ret",
        "tail_prob_2",
        "tail_prob_3",
    ])?;
    for r in rows {
        wtr.write_record([
            r.factor.as_str(),
            &r.horizon.to_string(),
            &r.decile.to_string(),
            &r.count.to_string(),
            &format!("{:.2}", r.share_pct),
            &format!("{:.6}", r.mean_abs_ret),
            &format!("{:.4}", r.tail_prob_2),
            &format!("{:.4}", r.tail_prob_3),
        ])?;
    }
    finish(wtr)
}

/// Everything the runner computed for one symbol, ready to persist.
pub struct SymbolArtifacts<'a> {
    pub symbol: &'a str,
    pub timeframe: &'a str,
    pub trades: &'a [TradeRecord],
    pub equity_curve: &'a [EquityPoint],
    pub summary: &'a RunSummary,
    pub perf_by_regime: &'a [GroupStat],
    pub perf_by_pressure: &'a [GroupStat],
    pub perf_by_box: &'a [GroupStat],
    pub deciles: &'a [DecileRow],
}

/// Write the full artifact set for one symbol under `out_dir`.
///
/// Returns the paths written, in a fixed order.
pub fn write_artifacts(out_dir: &Path, artifacts: &SymbolArtifacts<'_>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create output dir '{}'", out_dir.display()))?;
    let suffix = format!("{}_{}", artifacts.symbol, artifacts.timeframe);

    let files = [
        (format!("trades_{suffix}.csv"), export_trades_csv(artifacts.trades)?),
        (format!("equity_{suffix}.csv"), export_equity_csv(artifacts.equity_curve)?),
        (format!("summary_{suffix}.csv"), export_summary_csv(artifacts.summary)?),
        (
            format!("perf_by_regime_{suffix}.csv"),
            export_group_stats_csv(artifacts.perf_by_regime)?,
        ),
        (
            format!("perf_by_pressure_{suffix}.csv"),
            export_group_stats_csv(artifacts.perf_by_pressure)?,
        ),
        (
            format!("perf_by_box_{suffix}.csv"),
            export_group_stats_csv(artifacts.perf_by_box)?,
        ),
        (format!("deciles_{suffix}.csv"), export_deciles_csv(artifacts.deciles)?),
    ];

    let mut paths = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = out_dir.join(name);
        fs::write(&path, content)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        paths.push(path);
    }
    Ok(paths)
}

fn opt_num(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use regimelab_core::domain::{ExitReason, Timeframe};

    fn sample_trade() -> TradeRecord {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        TradeRecord {
            symbol: "BTCUSD".into(),
            timeframe: Timeframe::M30,
            entry_time: ts,
            exit_time: ts + chrono::Duration::hours(2),
            entry_price: 100.0,
            exit_price: 103.0,
            notional: 1000.0,
            gross_pnl: 30.0,
            costs: 1.0,
            net_pnl: 29.0,
            return_pct: 2.9,
            r_multiple: Some(0.9667),
            bars_held: 4,
            exit_reason: ExitReason::SignalExit,
            risk_score_entry: Some(0.42),
            risk_regime_entry: None,
            high_pressure_entry: false,
            factor_box_entry: None,
            atr_entry: Some(1.0),
        }
    }

    #[test]
    fn trades_csv_has_header_and_rows() {
        let csv_text = export_trades_csv(&[sample_trade()]).unwrap();
        let mut lines = csv_text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("symbol,timeframe,entry_time"));
        let row = lines.next().unwrap();
        assert!(row.contains("BTCUSD"));
        assert!(row.contains("signal_exit"));
        // Absent optional columns stay empty, not "None".
        assert!(!row.contains("None"));
    }

    #[test]
    fn equity_csv_round_numbers() {
        let point = EquityPoint {
            timestamp: NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            equity: 100_123.456789,
            in_position: true,
        };
        let csv_text = export_equity_csv(&[point]).unwrap();
        assert!(csv_text.contains("100123.4568,true"));
    }

    #[test]
    fn artifacts_land_on_disk_with_expected_names() {
        let dir = tempfile::tempdir().unwrap();
        let trades = vec![sample_trade()];
        let summary = RunSummary {
            symbol: "BTCUSD".into(),
            timeframe: "30min".into(),
            bar_count: 10,
            trade_count: 1,
            win_rate_pct: 100.0,
            total_net_pnl: 29.0,
            mean_net_pnl: 29.0,
            total_return_pct: 0.029,
            annualized_return_pct: None,
            max_drawdown_pct: 0.0,
            mean_r: Some(0.9667),
            median_r: Some(0.9667),
            r_sharpe: None,
            blocked_entries: Default::default(),
        };
        let artifacts = SymbolArtifacts {
            symbol: "BTCUSD",
            timeframe: "30min",
            trades: &trades,
            equity_curve: &[],
            summary: &summary,
            perf_by_regime: &[],
            perf_by_pressure: &[],
            perf_by_box: &[],
            deciles: &[],
        };
        let paths = write_artifacts(dir.path(), &artifacts).unwrap();
        assert_eq!(paths.len(), 7);
        assert!(dir.path().join("trades_BTCUSD_30min.csv").exists());
        assert!(dir.path().join("perf_by_box_BTCUSD_30min.csv").exists());
        assert!(dir.path().join("deciles_BTCUSD_30min.csv").exists());
    }
}
