//! Decision engine: indicators, signal context, strategies, arbitration.
//!
//! Everything here is pure over its inputs. Missing or stale data shows up
//! as absent values in the `SignalContext`, and strategies self-gate by
//! returning `None`.

pub mod arbitrator;
pub mod context;
pub mod indicators;
pub mod strategies;

pub use arbitrator::{Arbitrator, ArbitratorConfig};
pub use context::{ContextInputs, SignalContext};
pub use strategies::{
    FakeBreakoutReversal, FundingOiSkew, LiquidationFollow, Strategy, VolBreakout,
};
