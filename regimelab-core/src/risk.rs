//! Risk management — sizing, stops, exposure limits, daily loss breaker.
//!
//! The risk layer turns a raw directional intent into an executable order
//! decision. It never mutates engine state itself: `evaluate_entry` is a pure
//! function of the config, the portfolio counters, and the entry bar, and all
//! counter mutation funnels through `PortfolioState` methods so a multi-symbol
//! run can serialize updates behind a single lock.

use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::error::{ConfigValidationError, DataIntegrityError};

/// Position sizing mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SizingMode {
    /// Fixed notional per position regardless of equity.
    Fixed { base_notional: f64 },
    /// Percentage of current equity, recomputed at entry time only.
    Compounding { pct: f64 },
}

/// Risk management configuration. Read-only for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub sizing: SizingMode,
    /// ATR multiple for the fixed stop. None disables the stop entirely.
    pub stop_r_multiple: Option<f64>,
    /// Force-exit after this many bars held.
    pub max_holding_bars: usize,
    pub max_positions_per_symbol: usize,
    pub max_total_positions: usize,
    /// Cap on sum(open notional) / equity, in percent.
    pub max_portfolio_exposure_pct: f64,
    /// Realized losses since day start that trip the breaker, in percent of
    /// day-start equity.
    pub daily_loss_limit_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sizing: SizingMode::Fixed {
                base_notional: 1000.0,
            },
            stop_r_multiple: Some(3.0),
            max_holding_bars: 200,
            max_positions_per_symbol: 1,
            max_total_positions: 3,
            max_portfolio_exposure_pct: 30.0,
            daily_loss_limit_pct: 5.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        match self.sizing {
            SizingMode::Fixed { base_notional } => {
                if base_notional <= 0.0 {
                    return Err(ConfigValidationError::NonPositive {
                        which: "base_notional",
                        value: base_notional,
                    });
                }
            }
            SizingMode::Compounding { pct } => {
                if !(0.0..=100.0).contains(&pct) || pct == 0.0 {
                    return Err(ConfigValidationError::PercentOutOfRange {
                        which: "compound_pct",
                        value: pct,
                    });
                }
            }
        }
        if let Some(r) = self.stop_r_multiple {
            if r <= 0.0 {
                return Err(ConfigValidationError::NonPositive {
                    which: "stop_r_multiple",
                    value: r,
                });
            }
        }
        if self.max_holding_bars == 0 {
            return Err(ConfigValidationError::ZeroLimit {
                which: "max_holding_bars",
            });
        }
        if self.max_positions_per_symbol == 0 {
            return Err(ConfigValidationError::ZeroLimit {
                which: "max_positions_per_symbol",
            });
        }
        if self.max_total_positions == 0 {
            return Err(ConfigValidationError::ZeroLimit {
                which: "max_total_positions",
            });
        }
        for (which, value) in [
            (
                "max_portfolio_exposure_pct",
                self.max_portfolio_exposure_pct,
            ),
            ("daily_loss_limit_pct", self.daily_loss_limit_pct),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigValidationError::PercentOutOfRange { which, value });
            }
        }
        Ok(())
    }
}

/// Why an entry was not placed. Recoverable, expected, counted — not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MaxPositionsPerSymbol,
    MaxTotalPositions,
    ExposureCap,
    DailyLossBreaker,
    /// Regime policy disallows entries in the bar's risk regime.
    RegimeGate,
    /// Regime policy blocks entries under the high-pressure flag.
    HighPressure,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::MaxPositionsPerSymbol => "max_positions_per_symbol",
            RejectReason::MaxTotalPositions => "max_total_positions",
            RejectReason::ExposureCap => "exposure_cap",
            RejectReason::DailyLossBreaker => "daily_loss_breaker",
            RejectReason::RegimeGate => "regime_gate",
            RejectReason::HighPressure => "high_pressure",
        };
        f.write_str(s)
    }
}

/// Outcome of an entry evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryDecision {
    Approved {
        notional: f64,
        stop_price: Option<f64>,
    },
    Rejected(RejectReason),
}

/// Portfolio-level mutable counters shared across symbols in a run.
///
/// The single owner of realized equity, open exposure, position counts and
/// the daily loss accumulator. The engine reads and writes only through
/// these methods; wrap in a `Mutex` when symbols run concurrently.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    equity: f64,
    open_exposure: f64,
    open_total: usize,
    open_per_symbol: HashMap<String, usize>,
    current_day: Option<NaiveDate>,
    day_start_equity: f64,
    daily_realized_pnl: f64,
}

impl PortfolioState {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            equity: initial_equity,
            open_exposure: 0.0,
            open_total: 0,
            open_per_symbol: HashMap::new(),
            current_day: None,
            day_start_equity: initial_equity,
            daily_realized_pnl: 0.0,
        }
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn open_exposure(&self) -> f64 {
        self.open_exposure
    }

    pub fn open_positions(&self, symbol: &str) -> usize {
        self.open_per_symbol.get(symbol).copied().unwrap_or(0)
    }

    pub fn open_positions_total(&self) -> usize {
        self.open_total
    }

    /// Advance the trading-day anchor. Resets the daily loss accumulator and
    /// re-bases the breaker threshold at the first bar of each calendar day.
    pub fn roll_day(&mut self, ts: NaiveDateTime) {
        let day = ts.date();
        if self.current_day != Some(day) {
            self.current_day = Some(day);
            self.day_start_equity = self.equity;
            self.daily_realized_pnl = 0.0;
        }
    }

    /// Whether realized losses since day start have tripped the breaker.
    /// Losses must exceed the limit; hitting it exactly still admits.
    pub fn breaker_tripped(&self, cfg: &RiskConfig) -> bool {
        let limit = self.day_start_equity * (cfg.daily_loss_limit_pct / 100.0);
        self.daily_realized_pnl < -limit
    }

    /// Register an opened position.
    pub fn on_entry(&mut self, symbol: &str, notional: f64) {
        self.open_exposure += notional;
        self.open_total += 1;
        *self.open_per_symbol.entry(symbol.to_string()).or_default() += 1;
    }

    /// Register a closed position and its realized PnL.
    pub fn on_exit(&mut self, symbol: &str, notional: f64, net_pnl: f64) {
        self.open_exposure -= notional;
        self.open_total = self.open_total.saturating_sub(1);
        if let Some(count) = self.open_per_symbol.get_mut(symbol) {
            *count = count.saturating_sub(1);
        }
        self.equity += net_pnl;
        self.daily_realized_pnl += net_pnl;
    }
}

/// Evaluate an entry intent against the risk limits.
///
/// `size_multiplier` comes from the strategy's regime policy (1.0 when no
/// policy applies) and scales the notional after sizing-mode computation.
/// Size and stop are computed here once; the engine freezes them on the
/// position for its whole life.
pub fn evaluate_entry(
    cfg: &RiskConfig,
    portfolio: &PortfolioState,
    bar: &Bar,
    size_multiplier: f64,
) -> Result<EntryDecision, DataIntegrityError> {
    if portfolio.breaker_tripped(cfg) {
        return Ok(EntryDecision::Rejected(RejectReason::DailyLossBreaker));
    }
    if portfolio.open_positions(&bar.symbol) >= cfg.max_positions_per_symbol {
        return Ok(EntryDecision::Rejected(RejectReason::MaxPositionsPerSymbol));
    }
    if portfolio.open_positions_total() >= cfg.max_total_positions {
        return Ok(EntryDecision::Rejected(RejectReason::MaxTotalPositions));
    }

    let notional = match cfg.sizing {
        SizingMode::Fixed { base_notional } => base_notional,
        SizingMode::Compounding { pct } => portfolio.equity() * pct / 100.0,
    } * size_multiplier;

    let max_exposure = portfolio.equity() * (cfg.max_portfolio_exposure_pct / 100.0);
    if portfolio.open_exposure() + notional > max_exposure {
        return Ok(EntryDecision::Rejected(RejectReason::ExposureCap));
    }

    let stop_price = match cfg.stop_r_multiple {
        Some(r) => {
            let atr = bar.atr.ok_or_else(|| DataIntegrityError::MissingAtr {
                symbol: bar.symbol.clone(),
                timeframe: bar.timeframe.as_str().to_string(),
                timestamp: bar.timestamp,
            })?;
            if atr <= 0.0 {
                return Err(DataIntegrityError::BadField {
                    symbol: bar.symbol.clone(),
                    timeframe: bar.timeframe.as_str().to_string(),
                    timestamp: bar.timestamp,
                    field: "atr",
                });
            }
            Some(bar.close - r * atr)
        }
        None => None,
    };

    Ok(EntryDecision::Approved {
        notional,
        stop_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;
    use chrono::NaiveDate;

    fn day(d: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn entry_bar(close: f64, atr: Option<f64>) -> Bar {
        let mut bar = make_bars(&[close]).remove(0);
        bar.symbol = "BTCUSD".into();
        bar.atr = atr;
        bar
    }

    #[test]
    fn default_config_validates() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn config_rejects_bad_percentages() {
        let mut cfg = RiskConfig::default();
        cfg.daily_loss_limit_pct = 120.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::PercentOutOfRange { .. })
        ));
    }

    #[test]
    fn config_rejects_zero_compound_pct() {
        let mut cfg = RiskConfig::default();
        cfg.sizing = SizingMode::Compounding { pct: 0.0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn fixed_sizing_ignores_equity() {
        let cfg = RiskConfig {
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(50_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        match decision {
            EntryDecision::Approved { notional, .. } => assert_eq!(notional, 1000.0),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn compounding_sizes_from_current_equity() {
        let cfg = RiskConfig {
            sizing: SizingMode::Compounding { pct: 2.0 },
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(80_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        match decision {
            EntryDecision::Approved { notional, .. } => assert_eq!(notional, 1600.0),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn size_multiplier_scales_notional() {
        let cfg = RiskConfig {
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(100_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 0.3).unwrap();
        match decision {
            EntryDecision::Approved { notional, .. } => assert!((notional - 300.0).abs() < 1e-12),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn stop_is_close_minus_r_times_atr() {
        let cfg = RiskConfig {
            stop_r_multiple: Some(2.0),
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(100_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(15.0, Some(1.0)), 1.0).unwrap();
        match decision {
            EntryDecision::Approved { stop_price, .. } => assert_eq!(stop_price, Some(13.0)),
            other => panic!("expected approval, got {other:?}"),
        }
    }

    #[test]
    fn missing_atr_is_a_data_integrity_error() {
        let cfg = RiskConfig {
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(100_000.0);
        let err = evaluate_entry(&cfg, &portfolio, &entry_bar(15.0, None), 1.0).unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingAtr { .. }));
    }

    #[test]
    fn disabled_stop_needs_no_atr() {
        let cfg = RiskConfig {
            stop_r_multiple: None,
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let portfolio = PortfolioState::new(100_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(15.0, None), 1.0).unwrap();
        assert!(matches!(
            decision,
            EntryDecision::Approved {
                stop_price: None,
                ..
            }
        ));
    }

    #[test]
    fn per_symbol_cap_rejects() {
        let cfg = RiskConfig::default(); // max_positions_per_symbol = 1
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.on_entry("BTCUSD", 1000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        assert_eq!(
            decision,
            EntryDecision::Rejected(RejectReason::MaxPositionsPerSymbol)
        );
    }

    #[test]
    fn total_cap_rejects_across_symbols() {
        let cfg = RiskConfig {
            max_total_positions: 2,
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.on_entry("ETHUSD", 1000.0);
        portfolio.on_entry("XAUUSD", 1000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        assert_eq!(
            decision,
            EntryDecision::Rejected(RejectReason::MaxTotalPositions)
        );
    }

    #[test]
    fn exposure_cap_counts_projected_notional() {
        let cfg = RiskConfig {
            sizing: SizingMode::Fixed {
                base_notional: 20_000.0,
            },
            max_portfolio_exposure_pct: 30.0,
            max_total_positions: 10,
            ..RiskConfig::default()
        };
        // 30% of 100k = 30k cap; 15k already open, +20k projected = 35k > cap.
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.on_entry("ETHUSD", 15_000.0);
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        assert_eq!(decision, EntryDecision::Rejected(RejectReason::ExposureCap));
    }

    #[test]
    fn daily_breaker_blocks_until_next_day() {
        let cfg = RiskConfig {
            daily_loss_limit_pct: 5.0,
            max_portfolio_exposure_pct: 100.0,
            ..RiskConfig::default()
        };
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.roll_day(day(2, 0));

        // Lose 6% of day-start equity within the day.
        portfolio.on_entry("BTCUSD", 1000.0);
        portfolio.on_exit("BTCUSD", 1000.0, -6000.0);
        assert!(portfolio.breaker_tripped(&cfg));
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        assert_eq!(
            decision,
            EntryDecision::Rejected(RejectReason::DailyLossBreaker)
        );

        // Same day, later bar: still blocked.
        portfolio.roll_day(day(2, 23));
        assert!(portfolio.breaker_tripped(&cfg));

        // Next calendar day: accumulator resets, entries flow again.
        portfolio.roll_day(day(3, 0));
        assert!(!portfolio.breaker_tripped(&cfg));
        let decision = evaluate_entry(&cfg, &portfolio, &entry_bar(100.0, Some(2.0)), 1.0).unwrap();
        assert!(matches!(decision, EntryDecision::Approved { .. }));
    }

    #[test]
    fn breaker_requires_losses_beyond_the_limit() {
        let cfg = RiskConfig {
            daily_loss_limit_pct: 5.0,
            ..RiskConfig::default()
        };
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.roll_day(day(2, 0));

        // Exactly at the limit: still admitting.
        portfolio.on_entry("BTCUSD", 1000.0);
        portfolio.on_exit("BTCUSD", 1000.0, -5000.0);
        assert!(!portfolio.breaker_tripped(&cfg));

        // One more cent of loss trips it.
        portfolio.on_entry("BTCUSD", 1000.0);
        portfolio.on_exit("BTCUSD", 1000.0, -0.01);
        assert!(portfolio.breaker_tripped(&cfg));
    }

    #[test]
    fn zero_loss_limit_does_not_trip_on_a_fresh_day() {
        let cfg = RiskConfig {
            daily_loss_limit_pct: 0.0,
            ..RiskConfig::default()
        };
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.roll_day(day(2, 0));
        assert!(!portfolio.breaker_tripped(&cfg));
    }

    #[test]
    fn roll_day_is_idempotent_within_a_day() {
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.roll_day(day(2, 0));
        portfolio.on_entry("BTCUSD", 1000.0);
        portfolio.on_exit("BTCUSD", 1000.0, -500.0);
        portfolio.roll_day(day(2, 12));
        // Mid-day roll must not reset the accumulator.
        assert_eq!(portfolio.daily_realized_pnl, -500.0);
    }

    #[test]
    fn exit_updates_equity_and_counters() {
        let mut portfolio = PortfolioState::new(100_000.0);
        portfolio.on_entry("BTCUSD", 2000.0);
        assert_eq!(portfolio.open_exposure(), 2000.0);
        assert_eq!(portfolio.open_positions("BTCUSD"), 1);

        portfolio.on_exit("BTCUSD", 2000.0, 150.0);
        assert_eq!(portfolio.open_exposure(), 0.0);
        assert_eq!(portfolio.open_positions("BTCUSD"), 0);
        assert_eq!(portfolio.equity(), 100_150.0);
    }
}
