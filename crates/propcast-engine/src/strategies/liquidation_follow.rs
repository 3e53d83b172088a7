//! Liquidation follow: ride a move backed by a fast open-interest build
//! with funding agreeing.

use super::{default_stop, Strategy};
use crate::context::SignalContext;
use crate::indicators::position_usdt;
use propcast_core::{ProposalCard, Side};

/// Trend-follow card when open interest grew sharply over 15 minutes, the
/// 5m return is material, and funding points the same way.
#[derive(Debug, Clone)]
pub struct LiquidationFollow {
    pub oi_delta_pct_threshold: f64,
    pub return_threshold: f64,
    pub leverage_suggest: u32,
    pub max_risk_usdt: f64,
    pub ttl_minutes: u32,
    pub priority: i32,
}

impl Strategy for LiquidationFollow {
    fn name(&self) -> &'static str {
        "liquidation_follow"
    }

    fn generate(&self, ctx: &SignalContext) -> Option<ProposalCard> {
        if !ctx.freshness.funding_fresh || !ctx.freshness.oi_fresh {
            return None;
        }
        let oi_delta = ctx.oi_delta_15m_pct?;
        let ret_5m = ctx.ret_5m?;
        let funding = ctx.funding_rate?;
        let atr = ctx.atr_15m?;

        let aligned = (ret_5m > 0.0) == (funding > 0.0);
        if oi_delta < self.oi_delta_pct_threshold
            || ret_5m.abs() < self.return_threshold
            || !aligned
        {
            return None;
        }

        let side = if ret_5m > 0.0 { Side::Long } else { Side::Short };
        let entry = ctx.price;
        let stop = default_stop(side, entry, atr);
        let position = position_usdt(entry, stop, self.max_risk_usdt)?;

        let confidence = (40.0
            + (oi_delta / self.oi_delta_pct_threshold.max(1e-9)) * 25.0
            + ret_5m.abs() * 1000.0)
            .min(100.0);

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
                "oi_delta_15m={:.2}%, funding={funding:.6}, return_5m={:.2}%, aligned_trend={aligned}",
                oi_delta * 100.0,
                ret_5m * 100.0
            ),
            priority: self.priority,
            confidence,
            created_at_ms: ctx.now_ms,
        })
    }
}
