//! Funding/open-interest skew: fade a crowded side when funding is extreme
//! and open interest is stretched.

use super::{default_stop, Strategy};
use crate::context::SignalContext;
use crate::indicators::position_usdt;
use propcast_core::{ProposalCard, Side};

/// Counter-trend card when `|funding|` is extreme, the OI z-score is
/// stretched, and funding agrees with the 5m return (a genuinely crowded
/// move rather than a funding artifact).
#[derive(Debug, Clone)]
pub struct FundingOiSkew {
    pub funding_extreme: f64,
    pub oi_zscore_threshold: f64,
    pub leverage_suggest: u32,
    pub max_risk_usdt: f64,
    pub ttl_minutes: u32,
    pub priority: i32,
}

impl Strategy for FundingOiSkew {
    fn name(&self) -> &'static str {
        "funding_oi_skew"
    }

    fn generate(&self, ctx: &SignalContext) -> Option<ProposalCard> {
        if !ctx.freshness.funding_fresh || !ctx.freshness.oi_fresh {
            return None;
        }
        let funding = ctx.funding_rate?;
        let ret_5m = ctx.ret_5m?;
        let zscore = ctx.oi_zscore?;
        let atr = ctx.atr_15m?;

        if funding.abs() < self.funding_extreme {
            return None;
        }
        if zscore < self.oi_zscore_threshold {
            return None;
        }
        let crowded_long = funding > 0.0 && ret_5m > 0.0;
        let crowded_short = funding < 0.0 && ret_5m < 0.0;
        if !(crowded_long || crowded_short) {
            return None;
        }

        let side = if crowded_long { Side::Short } else { Side::Long };
        let entry = ctx.price;
        let stop = default_stop(side, entry, atr);
        let position = position_usdt(entry, stop, self.max_risk_usdt)?;

        let confidence = (45.0
            + (funding.abs() / self.funding_extreme.max(1e-9)) * 20.0
            + zscore * 10.0)
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
                "funding={funding:.6}, oi_zscore={zscore:.2}, crowded={} -> contrarian {side}",
                if crowded_long { "long" } else { "short" }
            ),
            priority: self.priority,
            confidence,
            created_at_ms: ctx.now_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::test_support::warm_context;

    fn strategy() -> FundingOiSkew {
        FundingOiSkew {
            funding_extreme: 0.001,
            oi_zscore_threshold: 2.0,
            leverage_suggest: 35,
            max_risk_usdt: 10.0,
            ttl_minutes: 12,
            priority: 80,
        }
    }

    #[test]
    fn crowded_long_fades_short() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.002);
        ctx.ret_5m = Some(0.01);
        ctx.oi_zscore = Some(2.5);

        let card = strategy().generate(&ctx).unwrap();
        assert_eq!(card.side, Side::Short);
        assert!(card.stop > card.entry);
        assert!(card.stop_is_risk_adverse());
    }

    #[test]
    fn crowded_short_fades_long() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(-0.002);
        ctx.ret_5m = Some(-0.01);
        ctx.oi_zscore = Some(3.0);

        let card = strategy().generate(&ctx).unwrap();
        assert_eq!(card.side, Side::Long);
        assert!(card.stop < card.entry);
    }

    #[test]
    fn funding_against_trend_is_not_crowded() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.002);
        ctx.ret_5m = Some(-0.01);
        ctx.oi_zscore = Some(3.0);
        assert!(strategy().generate(&ctx).is_none());
    }

    #[test]
    fn mild_funding_gates_out() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.0005);
        ctx.ret_5m = Some(0.01);
        ctx.oi_zscore = Some(3.0);
        assert!(strategy().generate(&ctx).is_none());
    }

    #[test]
    fn low_zscore_gates_out() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.002);
        ctx.ret_5m = Some(0.01);
        ctx.oi_zscore = Some(1.0);
        assert!(strategy().generate(&ctx).is_none());
    }

    #[test]
    fn stale_derivatives_gate_out() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.002);
        ctx.ret_5m = Some(0.01);
        ctx.oi_zscore = Some(3.0);
        ctx.freshness.oi_fresh = false;
        assert!(strategy().generate(&ctx).is_none());

        ctx.freshness.oi_fresh = true;
        ctx.freshness.funding_fresh = false;
        assert!(strategy().generate(&ctx).is_none());
    }

    #[test]
    fn absent_zscore_gates_out() {
        let mut ctx = warm_context();
        ctx.funding_rate = Some(0.002);
        ctx.ret_5m = Some(0.01);
        ctx.oi_zscore = None;
        assert!(strategy().generate(&ctx).is_none());
    }
}
