//! RegimeLab Core — engine, domain types, trend signal, regime policies, risk.
//!
//! This crate contains the heart of the regime-conditioned backtester:
//! - Domain types (bars, positions, trades, equity points, regime columns)
//! - Backward as-of alignment of coarse series onto a fine timeframe
//! - Banded-EMA ladder trend indicator and trend-segment extraction
//! - Strategy policies (baseline / regime-gated / MTF variants)
//! - Risk management: sizing, ATR stops, exposure caps, daily loss breaker
//! - Bar-by-bar event loop with a Flat/Holding state machine

pub mod align;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod ladder;
pub mod policy;
pub mod risk;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything crossing the rayon worker boundary is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::TradeRecord>();
        require_sync::<domain::TradeRecord>();
        require_send::<domain::EquityPoint>();
        require_sync::<domain::EquityPoint>();
        require_send::<domain::RegimeSnapshot>();
        require_sync::<domain::RegimeSnapshot>();

        require_send::<ladder::TrendState>();
        require_sync::<ladder::TrendState>();
        require_send::<policy::StrategyPolicy>();
        require_sync::<policy::StrategyPolicy>();
        require_send::<risk::PortfolioState>();
        require_sync::<risk::PortfolioState>();
        require_send::<engine::SymbolRunResult>();
        require_sync::<engine::SymbolRunResult>();
        require_send::<error::EngineError>();
        require_sync::<error::EngineError>();
    }
}
