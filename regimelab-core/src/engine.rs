//! Bar-by-bar event loop — the heart of the backtesting engine.
//!
//! One pass per symbol over its fine-timeframe bars with a precomputed trend
//! series. The machine has two states, Flat and Holding, and every decision
//! happens at a bar boundary:
//!
//! 1. Day rollover: re-base the daily loss breaker on a calendar-day change
//! 2. Exit checks while holding, in priority order: stop breach, signal
//!    loss, regime persistence exit, max holding time
//! 3. Entry check while flat: Up-transition gated by the strategy policy
//!    and the risk limits
//! 4. Mark-to-market: one equity point per bar
//!
//! A position still open after the final bar is closed at the last close
//! with `ExitReason::EndOfData` so the trade and equity tables are complete.

use std::collections::BTreeMap;
use std::sync::Mutex;

use log::debug;

use crate::domain::{
    Bar, EquityPoint, ExitReason, Position, RegimeSnapshot, RiskRegime, Timeframe, TradeRecord,
};
use crate::error::{DataOrderingError, EngineError};
use crate::ladder::TrendState;
use crate::policy::StrategyPolicy;
use crate::risk::{evaluate_entry, EntryDecision, PortfolioState, RejectReason, RiskConfig};

/// Per-run engine parameters, fixed before the first bar.
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub policy: StrategyPolicy,
    pub risk: RiskConfig,
    /// Transaction cost per side as a percentage of notional, charged on
    /// the round trip at exit.
    pub cost_per_side_pct: f64,
}

/// Everything one symbol's pass produces.
#[derive(Debug, Clone)]
pub struct SymbolRunResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub bar_count: usize,
    /// Entry intents rejected by gating or risk limits, counted per reason.
    pub blocked_entries: BTreeMap<RejectReason, usize>,
}

impl SymbolRunResult {
    pub fn blocked_total(&self) -> usize {
        self.blocked_entries.values().sum()
    }
}

/// Run one symbol's backtest over `bars` with its precomputed `trend` series.
///
/// `trend[t]` is the governing trend state at bar `t`: the fine-timeframe
/// ladder state for single-timeframe policies, or the coarse state aligned
/// backward onto the fine grid for MTF policies (`None` before the first
/// coarse observation). `bars` and `trend` must be the same length.
///
/// The portfolio is shared state: callers running symbols concurrently pass
/// the same `Mutex`, callers running independently pass one per symbol. The
/// lock is taken once per decision, never held across bars.
pub fn run_symbol(
    bars: &[Bar],
    trend: &[Option<TrendState>],
    params: &EngineParams,
    portfolio: &Mutex<PortfolioState>,
) -> Result<SymbolRunResult, EngineError> {
    assert_eq!(
        bars.len(),
        trend.len(),
        "trend series length must match bar series length"
    );

    let symbol = bars.first().map(|b| b.symbol.clone()).unwrap_or_default();
    let timeframe = bars.first().map(|b| b.timeframe).unwrap_or(Timeframe::M30);

    let mut open: Option<Position> = None;
    let mut trades: Vec<TradeRecord> = Vec::new();
    let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());
    let mut blocked_entries: BTreeMap<RejectReason, usize> = BTreeMap::new();
    let mut consecutive_high_bars = 0usize;
    let mut prev_trend: Option<TrendState> = None;

    for (t, bar) in bars.iter().enumerate() {
        if t > 0 && bar.timestamp <= bars[t - 1].timestamp {
            return Err(DataOrderingError {
                symbol: bar.symbol.clone(),
                timeframe: bar.timeframe.as_str().to_string(),
                timestamp: bar.timestamp,
                index: t,
            }
            .into());
        }

        {
            let mut pf = portfolio.lock().expect("portfolio lock poisoned");
            pf.roll_day(bar.timestamp);
        }

        // High-regime persistence counter runs only while holding.
        if open.is_some() {
            if bar.regime.as_ref().and_then(|r| r.risk_regime) == Some(RiskRegime::High) {
                consecutive_high_bars += 1;
            } else {
                consecutive_high_bars = 0;
            }
        }

        // ── Exit checks, strictly in priority order ──
        let mut exited_this_bar = false;
        if let Some(pos) = open.as_mut() {
            pos.bars_held += 1;

            let stop_breached = pos.stop_price.is_some_and(|stop| bar.low <= stop);
            let exit = if stop_breached {
                // Gap through the stop fills at the open, not the stop.
                let stop = pos.stop_price.unwrap_or(bar.open);
                Some((stop.min(bar.open), ExitReason::StopHit))
            } else if trend[t] != Some(TrendState::Up) {
                Some((bar.close, ExitReason::SignalExit))
            } else if params.policy.decide_exit(consecutive_high_bars) {
                Some((bar.close, ExitReason::RegimeExit))
            } else if pos.bars_held >= params.risk.max_holding_bars {
                Some((bar.close, ExitReason::MaxHolding))
            } else {
                None
            };

            if let Some((fill, reason)) = exit {
                let pos = open.take().expect("position must exist in exit branch");
                let trade = close_position(pos, bar, fill, reason, params, portfolio);
                debug!(
                    "{} {}: exit {} at {:.4}, net_pnl {:.4}",
                    trade.symbol, trade.timeframe, trade.exit_reason, fill, trade.net_pnl
                );
                trades.push(trade);
                consecutive_high_bars = 0;
                exited_this_bar = true;
            }
        }

        // ── Entry check: Up-transition while flat ──
        // No entry on the final bar: it would be force-closed at the same
        // price one step later and record a zero-move trade.
        let up_transition = trend[t] == Some(TrendState::Up) && prev_trend != Some(TrendState::Up);
        if open.is_none() && !exited_this_bar && up_transition && t + 1 < bars.len() {
            match try_enter(bar, t, params, portfolio)? {
                Ok(pos) => {
                    debug!(
                        "{} {}: entry at {:.4}, notional {:.2}, stop {:?}",
                        pos.symbol, timeframe, pos.entry_price, pos.notional, pos.stop_price
                    );
                    open = Some(pos);
                }
                Err(reason) => {
                    *blocked_entries.entry(reason).or_insert(0) += 1;
                }
            }
        }

        // ── Mark-to-market ──
        let realized = portfolio.lock().expect("portfolio lock poisoned").equity();
        let unrealized = open
            .as_ref()
            .map(|p| p.unrealized_pnl(bar.close))
            .unwrap_or(0.0);
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: realized + unrealized,
            in_position: open.is_some(),
        });

        prev_trend = trend[t];
    }

    // Force-close anything still open so every entry has a matching exit.
    if let Some(pos) = open.take() {
        if let Some(last) = bars.last() {
            let trade = close_position(pos, last, last.close, ExitReason::EndOfData, params, portfolio);
            if let Some(point) = equity_curve.last_mut() {
                point.equity = portfolio.lock().expect("portfolio lock poisoned").equity();
                point.in_position = false;
            }
            trades.push(trade);
        }
    }

    Ok(SymbolRunResult {
        symbol,
        timeframe,
        trades,
        equity_curve,
        bar_count: bars.len(),
        blocked_entries,
    })
}

/// Gate, size, and open a position at the bar's close.
///
/// Outer `Result` is fatal (missing ATR when a stop is required); inner
/// `Result` distinguishes an opened position from a counted rejection.
fn try_enter(
    bar: &Bar,
    bar_index: usize,
    params: &EngineParams,
    portfolio: &Mutex<PortfolioState>,
) -> Result<Result<Position, RejectReason>, EngineError> {
    if let Err(reason) = params.policy.decide_entry(bar.regime.as_ref()) {
        return Ok(Err(reason));
    }
    let multiplier = params.policy.size_multiplier(bar.regime.as_ref());

    // Admission and counter update under one lock so concurrent symbols
    // cannot both pass the same cap.
    let mut pf = portfolio.lock().expect("portfolio lock poisoned");
    let decision = evaluate_entry(&params.risk, &pf, bar, multiplier)?;
    match decision {
        EntryDecision::Approved {
            notional,
            stop_price,
        } => {
            pf.on_entry(&bar.symbol, notional);
            Ok(Ok(Position {
                symbol: bar.symbol.clone(),
                entry_time: bar.timestamp,
                entry_price: bar.close,
                entry_atr: bar.atr,
                notional,
                stop_price,
                opened_bar: bar_index,
                bars_held: 0,
                regime_at_entry: bar.regime.clone().unwrap_or_else(RegimeSnapshot::empty),
            }))
        }
        EntryDecision::Rejected(reason) => Ok(Err(reason)),
    }
}

/// Convert an open position into a trade record and settle it against the
/// portfolio. Costs are charged per side on the frozen notional, both sides
/// at exit.
fn close_position(
    pos: Position,
    bar: &Bar,
    fill: f64,
    reason: ExitReason,
    params: &EngineParams,
    portfolio: &Mutex<PortfolioState>,
) -> TradeRecord {
    let units = pos.units();
    let gross_pnl = units * (fill - pos.entry_price);
    let costs = 2.0 * (params.cost_per_side_pct / 100.0) * pos.notional;
    let net_pnl = gross_pnl - costs;
    let return_pct = if pos.notional > 0.0 {
        net_pnl / pos.notional * 100.0
    } else {
        0.0
    };
    let r_multiple = match (pos.entry_atr, params.risk.stop_r_multiple) {
        (Some(atr), Some(r)) if atr > 0.0 && units > 0.0 => Some(net_pnl / (units * atr * r)),
        _ => None,
    };

    portfolio
        .lock()
        .expect("portfolio lock poisoned")
        .on_exit(&pos.symbol, pos.notional, net_pnl);

    TradeRecord {
        symbol: pos.symbol,
        timeframe: bar.timeframe,
        entry_time: pos.entry_time,
        exit_time: bar.timestamp,
        entry_price: pos.entry_price,
        exit_price: fill,
        notional: pos.notional,
        gross_pnl,
        costs,
        net_pnl,
        return_pct,
        r_multiple,
        bars_held: pos.bars_held,
        exit_reason: reason,
        risk_score_entry: pos.regime_at_entry.risk_score,
        risk_regime_entry: pos.regime_at_entry.risk_regime,
        high_pressure_entry: pos.regime_at_entry.high_pressure,
        factor_box_entry: pos.regime_at_entry.factor_box,
        atr_entry: pos.entry_atr,
    }
}
