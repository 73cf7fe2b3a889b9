//! Position — open-trade state owned exclusively by the engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::regime::RegimeSnapshot;

/// An open long position. Short positions are not modeled.
///
/// Created on an approved entry, mutated only by the engine's bar loop
/// (holding-time ticks), and destroyed when converted to a `TradeRecord`.
/// Size and stop are frozen at entry and never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    /// ATR at the entry bar, used for the stop and the R-multiple risk unit.
    pub entry_atr: Option<f64>,
    /// Notional committed at entry (frozen for the life of the position).
    pub notional: f64,
    /// Fixed stop price computed once at entry; None when stops are disabled.
    pub stop_price: Option<f64>,
    /// Index of the entry bar within the symbol's bar series.
    pub opened_bar: usize,
    /// Bars held so far, starting at 0 on the entry bar.
    pub bars_held: usize,
    /// Regime columns captured at entry for trade attribution.
    pub regime_at_entry: RegimeSnapshot,
}

impl Position {
    /// Position size in instrument units.
    pub fn units(&self) -> f64 {
        if self.entry_price > 0.0 {
            self.notional / self.entry_price
        } else {
            0.0
        }
    }

    /// Unrealized PnL at a given mark price.
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        self.units() * (mark - self.entry_price)
    }
}
