//! Per-tick signal context.
//!
//! Built once per symbol per tick from a datastore snapshot. All indicator
//! fields are optional; absence means the underlying data was missing or
//! insufficient, and strategies gate on that.

use crate::indicators::{
    aggregate_15m, atr_baseline, atr_series, oi_delta_15m_pct, oi_zscore, ret_5m, ATR_PERIOD,
};
use propcast_core::{Candle1m, ClockState, Freshness, OpenInterestSnapshot};

/// Number of closed 1m candles needed for the 20-minute high/low levels
/// (20 lookback candles plus the latest closed candle).
const LEVELS_MIN_CANDLES: usize = 21;

/// Immutable inputs for one context build.
pub struct ContextInputs<'a> {
    pub symbol: &'a str,
    pub now_ms: i64,
    pub price: f64,
    /// Closed 1m candles, oldest first.
    pub candles_1m: &'a [Candle1m],
    pub funding_rate: Option<f64>,
    pub mark_price: Option<f64>,
    pub open_interest: Option<f64>,
    pub oi_history: &'a [OpenInterestSnapshot],
    pub last_kline_close_ts_ms: Option<i64>,
    pub freshness: Freshness,
    pub clock_state: ClockState,
}

/// Indicator-ready view of one symbol at one instant.
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub symbol: String,
    pub now_ms: i64,
    pub price: f64,
    pub ret_5m: Option<f64>,
    pub atr_15m: Option<f64>,
    pub atr_15m_baseline: Option<f64>,
    pub funding_rate: Option<f64>,
    pub mark_price: Option<f64>,
    pub open_interest: Option<f64>,
    pub oi_zscore: Option<f64>,
    pub oi_delta_15m_pct: Option<f64>,
    /// Highest high of the 20 closed candles before the latest one.
    pub last_20m_high: Option<f64>,
    /// Lowest low of the same window.
    pub last_20m_low: Option<f64>,
    pub candles_1m: Vec<Candle1m>,
    pub last_kline_close_ts_ms: Option<i64>,
    pub freshness: Freshness,
    pub clock_state: ClockState,
}

impl SignalContext {
    /// Milliseconds since the last closed candle, if any.
    pub fn kline_close_age_ms(&self) -> Option<i64> {
        self.last_kline_close_ts_ms.map(|ts| self.now_ms - ts)
    }
}

/// Derive every indicator the strategies consume from one snapshot.
pub fn build_signal_context(inputs: ContextInputs<'_>) -> SignalContext {
    let closes: Vec<f64> = inputs.candles_1m.iter().map(|c| c.close).collect();
    let windows = aggregate_15m(inputs.candles_1m);
    let atrs = atr_series(&windows, ATR_PERIOD);

    let (last_20m_high, last_20m_low) = if inputs.candles_1m.len() >= LEVELS_MIN_CANDLES {
        let lookback =
            &inputs.candles_1m[inputs.candles_1m.len() - LEVELS_MIN_CANDLES..inputs.candles_1m.len() - 1];
        (
            Some(lookback.iter().map(|c| c.high).fold(f64::MIN, f64::max)),
            Some(lookback.iter().map(|c| c.low).fold(f64::MAX, f64::min)),
        )
    } else {
        (None, None)
    };

    SignalContext {
        symbol: inputs.symbol.to_string(),
        now_ms: inputs.now_ms,
        price: inputs.price,
        ret_5m: ret_5m(&closes),
        atr_15m: atrs.last().copied(),
        atr_15m_baseline: atr_baseline(&atrs),
        funding_rate: inputs.funding_rate,
        mark_price: inputs.mark_price,
        open_interest: inputs.open_interest,
        oi_zscore: oi_zscore(inputs.oi_history),
        oi_delta_15m_pct: oi_delta_15m_pct(inputs.oi_history, inputs.now_ms),
        last_20m_high,
        last_20m_low,
        candles_1m: inputs.candles_1m.to_vec(),
        last_kline_close_ts_ms: inputs.last_kline_close_ts_ms,
        freshness: inputs.freshness,
        clock_state: inputs.clock_state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open_time_ms: i64, close: f64) -> Candle1m {
        Candle1m {
            open_time_ms,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
            close_time_ms: open_time_ms + Candle1m::WINDOW_MS - 1,
            is_closed: true,
        }
    }

    fn inputs(candles: &[Candle1m]) -> ContextInputs<'_> {
        ContextInputs {
            symbol: "BTCUSDT",
            now_ms: 1_700_000_000_000,
            price: 100.0,
            candles_1m: candles,
            funding_rate: Some(0.0001),
            mark_price: Some(100.1),
            open_interest: Some(80_000.0),
            oi_history: &[],
            last_kline_close_ts_ms: Some(1_700_000_000_000),
            freshness: Freshness {
                price_fresh: true,
                kline_fresh: true,
                funding_fresh: true,
                oi_fresh: true,
            },
            clock_state: ClockState::Synced,
        }
    }

    #[test]
    fn sparse_data_yields_absent_indicators() {
        let candles: Vec<Candle1m> = (0..4).map(|i| candle(i * 60_000, 100.0)).collect();
        let ctx = build_signal_context(inputs(&candles));
        assert!(ctx.ret_5m.is_none());
        assert!(ctx.atr_15m.is_none());
        assert!(ctx.last_20m_high.is_none());
        assert!(ctx.oi_zscore.is_none());
    }

    #[test]
    fn full_warmup_populates_indicators() {
        // 15 full aligned windows plus a tail so ATR and levels resolve.
        let candles: Vec<Candle1m> = (0..240).map(|i| candle(i * 60_000, 100.0)).collect();
        let ctx = build_signal_context(inputs(&candles));
        assert!(ctx.ret_5m.is_some());
        assert!(ctx.atr_15m.is_some());
        assert!(ctx.atr_15m_baseline.is_some());
        assert!(ctx.last_20m_high.is_some());
        assert!(ctx.last_20m_low.is_some());
    }

    #[test]
    fn twenty_minute_levels_exclude_latest_candle() {
        let mut candles: Vec<Candle1m> = (0..21).map(|i| candle(i * 60_000, 100.0)).collect();
        // The latest closed candle spikes; the level window must not see it.
        candles[20] = candle(20 * 60_000, 200.0);
        let ctx = build_signal_context(inputs(&candles));
        assert_eq!(ctx.last_20m_high, Some(101.0));
        assert_eq!(ctx.last_20m_low, Some(99.0));
    }

    #[test]
    fn kline_close_age_is_relative_to_now() {
        let candles: Vec<Candle1m> = (0..6).map(|i| candle(i * 60_000, 100.0)).collect();
        let mut input = inputs(&candles);
        input.last_kline_close_ts_ms = Some(input.now_ms - 45_000);
        let ctx = build_signal_context(input);
        assert_eq!(ctx.kline_close_age_ms(), Some(45_000));
    }
}
