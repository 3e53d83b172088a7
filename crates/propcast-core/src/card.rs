//! The proposal card: the single decision artifact emitted per symbol.

use serde::{Deserialize, Serialize};

/// Proposed trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Human-readable trade proposal produced by a strategy.
///
/// Invariants: `stop` is on the risk-adverse side of `entry` relative to
/// `side` (LONG implies stop < entry, SHORT implies stop > entry), and
/// `position_usdt` is positive and finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalCard {
    pub symbol: String,
    /// Generating strategy name; also the deterministic arbitration
    /// tie-break of last resort.
    pub strategy: String,
    pub side: Side,
    pub entry: f64,
    pub stop: f64,
    pub leverage_suggest: u32,
    pub position_usdt: f64,
    pub max_risk_usdt: f64,
    pub ttl_minutes: u32,
    pub rationale: String,
    pub priority: i32,
    /// Strategy-internal conviction in `[0, 100]`.
    pub confidence: f64,
    pub created_at_ms: i64,
}

impl ProposalCard {
    /// Check the stop-side invariant for this card.
    pub fn stop_is_risk_adverse(&self) -> bool {
        match self.side {
            Side::Long => self.stop < self.entry,
            Side::Short => self.stop > self.entry,
        }
    }
}
