//! Run orchestration — wires together loading, signal prep, engine, stats,
//! and artifact export.
//!
//! Symbols are independent runs by default and execute in parallel under
//! rayon, each with its own portfolio. With `shared_portfolio = true` all
//! symbols admit entries against one portfolio; those runs execute
//! sequentially in config order so admission is deterministic.
//!
//! A failed symbol never takes down the run: its error is logged, recorded
//! in the report, and the remaining symbols continue.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{error, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use regimelab_core::align::align_backward;
use regimelab_core::domain::Bar;
use regimelab_core::engine::{run_symbol, EngineParams, SymbolRunResult};
use regimelab_core::error::{ConfigValidationError, EngineError};
use regimelab_core::ladder::{compute_states, TrendState};
use regimelab_core::risk::PortfolioState;

use crate::config::{RunConfig, RunId};
use crate::data_loader::{data_path, load_bars, LoadError};
use crate::decile::{decile_profile, DecileRow};
use crate::export::{write_artifacts, SymbolArtifacts};
use crate::metrics::RunSummary;
use crate::regime_stats::{perf_by_box, perf_by_pressure, perf_by_regime, GroupStat};

/// Errors that abort a single symbol (or, for `Config`, the whole run).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigValidationError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("export error: {0}")]
    Export(#[from] anyhow::Error),
}

/// One symbol's failure, kept alongside the successes in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

/// Outcome of a full run across the configured universe.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub summaries: Vec<RunSummary>,
    pub failures: Vec<SymbolFailure>,
    pub artifact_paths: Vec<PathBuf>,
}

/// Everything computed for one symbol before export.
struct SymbolComputation {
    engine: SymbolRunResult,
    summary: RunSummary,
    by_regime: Vec<GroupStat>,
    by_pressure: Vec<GroupStat>,
    by_box: Vec<GroupStat>,
    deciles: Vec<DecileRow>,
}

/// Execute a full run: validate, backtest every symbol, write artifacts.
pub fn run(config: &RunConfig, data_dir: &Path, out_dir: &Path) -> Result<RunReport, RunError> {
    config.validate()?;
    let run_id = config.run_id();
    info!(
        "starting run {} over {} symbol(s) at {}",
        &run_id[..12],
        config.symbols.len(),
        config.timeframe
    );

    let shared = Mutex::new(PortfolioState::new(config.initial_equity));
    let outcomes: Vec<(String, Result<SymbolComputation, RunError>)> = if config.shared_portfolio {
        config
            .symbols
            .iter()
            .map(|symbol| (symbol.clone(), run_one_symbol(config, data_dir, symbol, &shared)))
            .collect()
    } else {
        config
            .symbols
            .par_iter()
            .map(|symbol| {
                let own = Mutex::new(PortfolioState::new(config.initial_equity));
                (symbol.clone(), run_one_symbol(config, data_dir, symbol, &own))
            })
            .collect()
    };

    let mut summaries = Vec::new();
    let mut failures = Vec::new();
    let mut artifact_paths = Vec::new();
    for (symbol, outcome) in outcomes {
        match outcome {
            Ok(computed) => {
                let artifacts = SymbolArtifacts {
                    symbol: &symbol,
                    timeframe: config.timeframe.as_str(),
                    trades: &computed.engine.trades,
                    equity_curve: &computed.engine.equity_curve,
                    summary: &computed.summary,
                    perf_by_regime: &computed.by_regime,
                    perf_by_pressure: &computed.by_pressure,
                    perf_by_box: &computed.by_box,
                    deciles: &computed.deciles,
                };
                artifact_paths.extend(write_artifacts(out_dir, &artifacts)?);
                info!(
                    "{symbol}: {} trades, {} entries blocked, total return {:.2}%",
                    computed.summary.trade_count,
                    computed.summary.blocked_total(),
                    computed.summary.total_return_pct
                );
                summaries.push(computed.summary);
            }
            Err(err) => {
                error!("{symbol}: run failed: {err}");
                failures.push(SymbolFailure {
                    symbol,
                    error: err.to_string(),
                });
            }
        }
    }

    Ok(RunReport {
        run_id,
        summaries,
        failures,
        artifact_paths,
    })
}

fn run_one_symbol(
    config: &RunConfig,
    data_dir: &Path,
    symbol: &str,
    portfolio: &Mutex<PortfolioState>,
) -> Result<SymbolComputation, RunError> {
    let fine_path = data_path(data_dir, symbol, config.timeframe);
    let bars = load_bars(&fine_path, symbol, config.timeframe, config.start, config.end)?;
    let trend = trend_series(config, data_dir, symbol, &bars)?;

    let params = EngineParams {
        policy: config.policy.clone(),
        risk: config.risk.clone(),
        cost_per_side_pct: config.cost_per_side_pct,
    };
    let engine = run_symbol(&bars, &trend, &params, portfolio)?;

    let summary = RunSummary::compute(&engine, config.initial_equity);
    let by_regime = perf_by_regime(&engine.trades);
    let by_pressure = perf_by_pressure(&engine.trades);
    let by_box = perf_by_box(&engine.trades, config.stats.min_trades_per_box);
    let mut deciles = Vec::new();
    for &factor in &config.stats.decile_factors {
        deciles.extend(decile_profile(&bars, factor, &config.stats.horizons));
    }

    Ok(SymbolComputation {
        engine,
        summary,
        by_regime,
        by_pressure,
        by_box,
        deciles,
    })
}

/// Build the governing trend series for one symbol.
///
/// Single-timeframe policies classify the fine bars directly. MTF policies
/// classify the coarse series and align each coarse state backward onto the
/// fine grid, leaving `None` before the first coarse observation.
fn trend_series(
    config: &RunConfig,
    data_dir: &Path,
    symbol: &str,
    fine_bars: &[Bar],
) -> Result<Vec<Option<TrendState>>, RunError> {
    if !config.policy.uses_coarse_trend() {
        let states = compute_states(fine_bars, &config.ladder);
        return Ok(states.into_iter().map(Some).collect());
    }

    let coarse_tf = config
        .coarse_timeframe
        .ok_or_else(|| ConfigValidationError::Invalid(
            "coarse_timeframe must be set for MTF policies".to_string(),
        ))?;
    let coarse_path = data_path(data_dir, symbol, coarse_tf);
    let coarse_bars = load_bars(&coarse_path, symbol, coarse_tf, config.start, config.end)?;
    let coarse_states = compute_states(&coarse_bars, &config.ladder);
    let coarse_pairs: Vec<_> = coarse_bars
        .iter()
        .zip(coarse_states)
        .map(|(bar, state)| (bar.timestamp, state))
        .collect();

    let fine_ts: Vec<_> = fine_bars.iter().map(|b| b.timestamp).collect();
    let aligned = align_backward(
        &fine_ts,
        &coarse_pairs,
        symbol,
        config.timeframe.as_str(),
    )
    .map_err(LoadError::from)?;
    Ok(aligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StatsConfig;
    use regimelab_core::domain::Timeframe;
    use regimelab_core::ladder::LadderConfig;
    use regimelab_core::policy::StrategyPolicy;
    use regimelab_core::risk::RiskConfig;
    use std::fmt::Write as _;

    fn write_symbol_csv(dir: &Path, symbol: &str, tf: Timeframe, closes: &[f64]) {
        let mut text = String::from("timestamp,open,high,low,close,volume,atr\n");
        let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let step = tf.minutes() as i64;
        for (i, &close) in closes.iter().enumerate() {
            let ts = base + chrono::Duration::minutes(step * i as i64);
            let open = if i == 0 { close } else { closes[i - 1] };
            let high = open.max(close) + 1.0;
            let low = open.min(close) - 1.0;
            writeln!(
                text,
                "{ts},{open},{high},{low},{close},1000,1.0",
                ts = ts.format("%Y-%m-%d %H:%M:%S")
            )
            .unwrap();
        }
        std::fs::write(data_path(dir, symbol, tf), text).unwrap();
    }

    fn base_config(symbols: Vec<String>) -> RunConfig {
        RunConfig {
            symbols,
            timeframe: Timeframe::M30,
            coarse_timeframe: None,
            start: None,
            end: None,
            initial_equity: 100_000.0,
            cost_per_side_pct: 0.0,
            shared_portfolio: false,
            ladder: LadderConfig {
                fast_len: 3,
                slow_len: 8,
            },
            policy: StrategyPolicy::Baseline,
            risk: RiskConfig {
                max_portfolio_exposure_pct: 100.0,
                ..RiskConfig::default()
            },
            stats: StatsConfig::default(),
        }
    }

    /// Steep enough that closes clear the high-based bands past warmup.
    fn trending_closes(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 2.0).collect()
    }

    #[test]
    fn full_run_writes_artifacts_and_reports() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::M30, &trending_closes(60));
        write_symbol_csv(data_dir.path(), "BBB", Timeframe::M30, &trending_closes(60));

        let config = base_config(vec!["AAA".into(), "BBB".into()]);
        let report = run(&config, data_dir.path(), out_dir.path()).unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.summaries.len(), 2);
        assert_eq!(report.artifact_paths.len(), 14);
        assert!(out_dir.path().join("trades_AAA_30min.csv").exists());
        assert!(out_dir.path().join("summary_BBB_30min.csv").exists());
        // A steady uptrend produces at least one completed trade per symbol.
        assert!(report.summaries.iter().all(|s| s.trade_count >= 1));
    }

    #[test]
    fn missing_symbol_fails_alone() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::M30, &trending_closes(60));

        let config = base_config(vec!["AAA".into(), "GHOST".into()]);
        let report = run(&config, data_dir.path(), out_dir.path()).unwrap();

        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "GHOST");
        assert!(report.failures[0].error.contains("GHOST_30min.csv"));
    }

    #[test]
    fn invalid_config_aborts_before_any_bar() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let mut config = base_config(vec!["AAA".into()]);
        config.initial_equity = 0.0;
        let err = run(&config, data_dir.path(), out_dir.path()).unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn mtf_policy_consumes_coarse_series() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::M30, &trending_closes(240));
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::H4, &trending_closes(30));

        let mut config = base_config(vec!["AAA".into()]);
        config.policy = StrategyPolicy::MtfDirectional;
        config.coarse_timeframe = Some(Timeframe::H4);
        let report = run(&config, data_dir.path(), out_dir.path()).unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(report.summaries.len(), 1);
    }

    #[test]
    fn shared_portfolio_carries_equity_across_symbols() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::M30, &trending_closes(60));
        write_symbol_csv(data_dir.path(), "BBB", Timeframe::M30, &trending_closes(60));

        let mut config = base_config(vec!["AAA".into(), "BBB".into()]);
        config.risk.sizing = regimelab_core::risk::SizingMode::Compounding { pct: 10.0 };
        config.risk.stop_r_multiple = None;

        // Independent portfolios: both symbols size off the initial equity.
        let separate = run(&config, data_dir.path(), out_dir.path()).unwrap();
        let bbb_pnl = |report: &RunReport| {
            report
                .summaries
                .iter()
                .find(|s| s.symbol == "BBB")
                .unwrap()
                .total_net_pnl
        };
        let bbb_separate = bbb_pnl(&separate);

        // Shared portfolio: BBB sizes off equity already grown by AAA's
        // realized profit, so its trades carry larger notional and PnL.
        config.shared_portfolio = true;
        let shared = run(&config, data_dir.path(), out_dir.path()).unwrap();
        assert!(shared.failures.is_empty());
        let bbb_shared = bbb_pnl(&shared);
        assert!(bbb_shared > bbb_separate);
    }

    #[test]
    fn shared_portfolio_runs_are_repeatable() {
        let data_dir = tempfile::tempdir().unwrap();
        let out_dir_a = tempfile::tempdir().unwrap();
        let out_dir_b = tempfile::tempdir().unwrap();
        write_symbol_csv(data_dir.path(), "AAA", Timeframe::M30, &trending_closes(80));
        write_symbol_csv(data_dir.path(), "BBB", Timeframe::M30, &trending_closes(80));

        let mut config = base_config(vec!["AAA".into(), "BBB".into()]);
        config.shared_portfolio = true;
        let a = run(&config, data_dir.path(), out_dir_a.path()).unwrap();
        let b = run(&config, data_dir.path(), out_dir_b.path()).unwrap();
        assert_eq!(
            serde_json::to_string(&a.summaries).unwrap(),
            serde_json::to_string(&b.summaries).unwrap()
        );
    }
}
