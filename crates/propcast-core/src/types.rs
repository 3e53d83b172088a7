//! Market data primitives.
//!
//! All timestamps are UTC milliseconds (`i64`), taken from the exchange
//! payload when present and from the local clock otherwise. Numeric values
//! are `f64`; undefined derived values are represented as `None`, never as
//! infinities.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current UTC wall-clock time in milliseconds.
pub fn utc_now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Latest traded/quoted price for a symbol.
///
/// Sourced from the `bookTicker` stream (mid of best bid/ask) or the REST
/// ticker endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    /// Exchange event time.
    pub event_time_ms: i64,
    /// Local receive time.
    pub received_time_ms: i64,
}

/// One-minute candle as delivered by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle1m {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time_ms: i64,
    /// Whether the window is final. Only closed candles enter the ring
    /// buffer and advance `last_kline_close_ts_ms`.
    pub is_closed: bool,
}

impl Candle1m {
    /// Duration of one candle window.
    pub const WINDOW_MS: i64 = 60_000;
}

/// Fifteen-minute candle aggregated from 1m candles.
///
/// Window is `[open_time_ms, open_time_ms + 15m)` aligned to 15-minute
/// epoch boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle15m {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle15m {
    /// Duration of one aggregated window.
    pub const WINDOW_MS: i64 = 15 * 60_000;
}

/// Mark price and funding data from the premium-index endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub mark_price: f64,
    pub last_funding_rate: f64,
    pub next_funding_time_ms: i64,
    pub event_time_ms: i64,
}

/// A single historical funding rate observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingRatePoint {
    pub funding_rate: f64,
    pub funding_time_ms: i64,
}

/// Open interest observation for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestSnapshot {
    pub oi_value: f64,
    pub event_time_ms: i64,
}

/// Per-field data freshness computed against configured staleness budgets.
///
/// Strategies self-gate on these flags; the service skips a symbol entirely
/// when `price_fresh` is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Freshness {
    pub price_fresh: bool,
    pub kline_fresh: bool,
    pub funding_fresh: bool,
    pub oi_fresh: bool,
}

/// Local clock quality versus the exchange server clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    /// Skew within the configured error budget; corrected time in use.
    Synced,
    /// Skew exceeded the budget or the server time fetch failed; local
    /// time with the last known offset estimate is in use.
    Degraded,
}

impl std::fmt::Display for ClockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}
