//! Fake breakout reversal: fade a liquidity sweep through the 20-minute
//! range that immediately reclaims.

use super::Strategy;
use crate::context::SignalContext;
use crate::indicators::position_usdt;
use propcast_core::{ProposalCard, Side};

/// Floor for the candle body when computing wick ratios.
const MIN_BODY: f64 = 1e-9;

/// Detects an upward or downward sweep of the prior 20-minute extreme that
/// closes back inside the range with a dominant wick, and proposes the
/// reversal.
#[derive(Debug, Clone)]
pub struct FakeBreakoutReversal {
    /// Minimum overshoot beyond the 20m extreme, as a fraction of it.
    pub sweep_pct: f64,
    /// Minimum wick-to-body ratio on the sweep candle.
    pub wick_body_ratio: f64,
    /// Stop buffer beyond the sweep extreme, in ATRs.
    pub stop_buffer_atr: f64,
    /// Minimum ATR as a fraction of price; filters dead tape.
    pub min_atr_pct: f64,
    /// Maximum age of the latest closed candle.
    pub max_kline_age_ms: i64,
    pub leverage_suggest: u32,
    pub max_risk_usdt: f64,
    pub ttl_minutes: u32,
    pub priority: i32,
}

impl Strategy for FakeBreakoutReversal {
    fn name(&self) -> &'static str {
        "fake_breakout_reversal"
    }

    fn generate(&self, ctx: &SignalContext) -> Option<ProposalCard> {
        let kline_age_ms = ctx.kline_close_age_ms()?;
        if kline_age_ms > self.max_kline_age_ms {
            return None;
        }

        let atr = ctx.atr_15m?;
        if atr < self.min_atr_pct * ctx.price {
            return None;
        }

        let prev_high = ctx.last_20m_high?;
        let prev_low = ctx.last_20m_low?;
        let latest = ctx.candles_1m.last()?;

        let body = (latest.close - latest.open).abs().max(MIN_BODY);
        let upper_wick = (latest.high - latest.open.max(latest.close)).max(0.0);
        let lower_wick = (latest.open.min(latest.close) - latest.low).max(0.0);

        let sweep_high = latest.high > prev_high * (1.0 + self.sweep_pct)
            && latest.close < prev_high
            && upper_wick / body >= self.wick_body_ratio;
        let sweep_low = latest.low < prev_low * (1.0 - self.sweep_pct)
            && latest.close > prev_low
            && lower_wick / body >= self.wick_body_ratio;
        if !(sweep_high || sweep_low) {
            return None;
        }

        let entry = ctx.price;
        let (side, stop, sweep_depth, wick_ratio, reclaim_level) = if sweep_high {
            (
                Side::Short,
                latest.high + self.stop_buffer_atr * atr,
                latest.high / prev_high - 1.0,
                upper_wick / body,
                prev_high,
            )
        } else {
            (
                Side::Long,
                latest.low - self.stop_buffer_atr * atr,
                1.0 - latest.low / prev_low,
                lower_wick / body,
                prev_low,
            )
        };

        let position = position_usdt(entry, stop, self.max_risk_usdt)?;
        let confidence = (50.0 + wick_ratio * 10.0 + sweep_depth * 10_000.0).min(100.0);

        Some(ProposalCard {
            symbol: ctx.symbol.clone(),
            strategy: self.name().to_string(),
            side,
            entry,
            stop,
            leverage_suggest: self.leverage_suggest,
            position_usdt: position,
            max_risk_usdt: self.max_risk_usdt,
            ttl_minutes: self.ttl_minutes,
            rationale: format!(
                "prev_20m_high={prev_high:.4}, prev_20m_low={prev_low:.4}, \
                 sweep_pct={:.4}%, wick_body={wick_ratio:.2}, reclaim={reclaim_level:.4} -> {side}",
                sweep_depth * 100.0
            ),
            priority: self.priority,
            confidence,
            created_at_ms: ctx.now_ms,
        })
    }
}
