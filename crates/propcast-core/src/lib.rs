//! Core domain types for the propcast signal service.
//!
//! This crate provides the types shared across the pipeline:
//! - `PriceTick`, `Candle1m`, `Candle15m`: market data primitives
//! - `FundingSnapshot`, `OpenInterestSnapshot`: derivative data
//! - `Side`, `ProposalCard`: the decision artifact emitted per symbol
//! - `Freshness`, `ClockState`: data-quality flags carried into strategies

pub mod card;
pub mod types;

pub use card::{ProposalCard, Side};
pub use types::{
    utc_now_ms, Candle15m, Candle1m, ClockState, Freshness, FundingRatePoint, FundingSnapshot,
    OpenInterestSnapshot, PriceTick,
};
