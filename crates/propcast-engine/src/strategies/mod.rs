//! Candidate strategies.
//!
//! Each strategy is a pure predicate over the `SignalContext`: it either
//! returns a fully formed `ProposalCard` or `None`. A strategy must gate
//! itself on absent or stale inputs; the arbitrator and risk engine never
//! see partial candidates.

mod fake_breakout_reversal;
mod funding_oi_skew;
mod liquidation_follow;
mod vol_breakout;

pub use fake_breakout_reversal::FakeBreakoutReversal;
pub use funding_oi_skew::FundingOiSkew;
pub use liquidation_follow::LiquidationFollow;
pub use vol_breakout::VolBreakout;

use crate::context::SignalContext;
use propcast_core::{ProposalCard, Side};

/// Stop distance in ATRs when a strategy does not override it.
pub(crate) const DEFAULT_STOP_ATR_MULT: f64 = 1.2;

/// A pluggable proposal generator.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self, ctx: &SignalContext) -> Option<ProposalCard>;
}

/// Stop on the risk-adverse side of the entry.
pub(crate) fn default_stop(side: Side, entry: f64, atr: f64) -> f64 {
    match side {
        Side::Long => entry - DEFAULT_STOP_ATR_MULT * atr,
        Side::Short => entry + DEFAULT_STOP_ATR_MULT * atr,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::SignalContext;
    use propcast_core::{Candle1m, ClockState, Freshness};

    /// A warm context every strategy can trigger from, with all data fresh.
    pub fn warm_context() -> SignalContext {
        SignalContext {
            symbol: "BTCUSDT".to_string(),
            now_ms: 1_700_000_000_000,
            price: 100.0,
            ret_5m: Some(0.0),
            atr_15m: Some(1.0),
            atr_15m_baseline: Some(1.0),
            funding_rate: Some(0.0001),
            mark_price: Some(100.05),
            open_interest: Some(80_000.0),
            oi_zscore: Some(0.0),
            oi_delta_15m_pct: Some(0.0),
            last_20m_high: Some(101.0),
            last_20m_low: Some(99.0),
            candles_1m: Vec::new(),
            last_kline_close_ts_ms: Some(1_700_000_000_000 - 10_000),
            freshness: Freshness {
                price_fresh: true,
                kline_fresh: true,
                funding_fresh: true,
                oi_fresh: true,
            },
            clock_state: ClockState::Synced,
        }
    }

    pub fn closed_candle(open_time_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Candle1m {
        Candle1m {
            open_time_ms,
            open,
            high,
            low,
            close,
            volume: 1.0,
            close_time_ms: open_time_ms + Candle1m::WINDOW_MS - 1,
            is_closed: true,
        }
    }
}
