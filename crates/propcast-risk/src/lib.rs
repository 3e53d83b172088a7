//! Dispatch risk gating with persistent state.
//!
//! Every winning card passes through the ordered gates (kill switch, daily
//! card cap, daily loss cap, per-symbol cooldown) before dispatch. State
//! survives restarts via an atomically rewritten JSON file, and realized
//! PnL events append to a CSV ledger.

pub mod engine;
pub mod error;

pub use engine::{BlockReason, RiskConfig, RiskDecision, RiskEngine, RiskState};
pub use error::{RiskError, RiskResult};
