//! Domain types for regimelab.

pub mod bar;
pub mod equity;
pub mod position;
pub mod regime;
pub mod trade;

pub use bar::{Bar, Timeframe, TimeframeParseError};
pub use equity::EquityPoint;
pub use position::Position;
pub use regime::{RegimeSnapshot, RiskRegime};
pub use trade::{ExitReason, TradeRecord};
