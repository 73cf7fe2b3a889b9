//! TradeRecord — a completed round-trip trade with regime attribution.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::bar::Timeframe;
use super::regime::RiskRegime;

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Trend signal lost the Up condition.
    SignalExit,
    /// Bar's low breached the fixed stop price.
    StopHit,
    /// Holding duration reached the configured maximum.
    MaxHolding,
    /// Risk regime stayed High past the policy's persistence limit.
    RegimeExit,
    /// Position force-closed on the final bar of the series.
    EndOfData,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::SignalExit => f.write_str("signal_exit"),
            ExitReason::StopHit => f.write_str("stop_hit"),
            ExitReason::MaxHolding => f.write_str("max_holding"),
            ExitReason::RegimeExit => f.write_str("regime_exit"),
            ExitReason::EndOfData => f.write_str("end_of_data"),
        }
    }
}

/// A complete round-trip trade record: entry → exit.
///
/// Immutable once created. Regime columns are snapshotted at entry time so
/// the aggregation layer can condition performance on the regime the trade
/// was opened in, not the one it closed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub symbol: String,
    pub timeframe: Timeframe,

    // ── Entry / exit ──
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,

    // ── Size ──
    pub notional: f64,

    // ── PnL ──
    pub gross_pnl: f64,
    pub costs: f64,
    pub net_pnl: f64,
    pub return_pct: f64,
    /// Net PnL normalized by the risk unit (units × entry ATR × stop R).
    /// None when the entry bar carried no ATR.
    pub r_multiple: Option<f64>,

    // ── Duration ──
    pub bars_held: usize,
    pub exit_reason: ExitReason,

    // ── Regime attribution at entry ──
    pub risk_score_entry: Option<f64>,
    pub risk_regime_entry: Option<RiskRegime>,
    pub high_pressure_entry: bool,
    pub factor_box_entry: Option<String>,
    pub atr_entry: Option<f64>,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}
