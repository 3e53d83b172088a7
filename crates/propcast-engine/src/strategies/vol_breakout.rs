//! Volatility breakout: momentum burst or ATR spike, trend-following.

use super::{default_stop, Strategy};
use crate::context::SignalContext;
use crate::indicators::position_usdt;
use propcast_core::{ProposalCard, Side};

/// Emits when the 5m return clears a threshold or the current ATR spikes
/// above its baseline.
#[derive(Debug, Clone)]
pub struct VolBreakout {
    pub return_threshold: f64,
    pub atr_spike_multiplier: f64,
    pub leverage_suggest: u32,
    pub max_risk_usdt: f64,
    pub ttl_minutes: u32,
    pub priority: i32,
}

impl Strategy for VolBreakout {
    fn name(&self) -> &'static str {
        "vol_breakout_card"
    }

    fn generate(&self, ctx: &SignalContext) -> Option<ProposalCard> {
        let ret_5m = ctx.ret_5m?;
        let atr = ctx.atr_15m?;
        let baseline = ctx.atr_15m_baseline?;

        let return_trigger = ret_5m.abs() > self.return_threshold;
        let atr_trigger = atr > baseline * self.atr_spike_multiplier;
        if !(return_trigger || atr_trigger) {
            return None;
        }

        let side = if ret_5m >= 0.0 { Side::Long } else { Side::Short };
        let entry = ctx.price;
        let stop = default_stop(side, entry, atr);
        let position = position_usdt(entry, stop, self.max_risk_usdt)?;

        let score_return = ret_5m.abs() / self.return_threshold.max(1e-9);
        let score_atr = atr / baseline.max(1e-9);
        let confidence = (40.0 + score_return * 20.0 + score_atr * 10.0).min(100.0);

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
                "return_5m={:.4}% (th={:.2}%), atr_15m={:.4} vs baseline={:.4}",
                ret_5m * 100.0,
                self.return_threshold * 100.0,
                atr,
                baseline
            ),
            priority: self.priority,
            confidence,
            created_at_ms: ctx.now_ms,
        })
    }
}
