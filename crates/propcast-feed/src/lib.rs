//! Market data feed layer.
//!
//! - `DataStore`: per-symbol thread-safe store of price, candle ring
//!   buffer, funding, mark price, and open interest, each with an
//!   authoritative update timestamp
//! - `SourceManager`: dual-mode controller that drives the WS session when
//!   healthy and REST polling when not, with state-sync on recovery
//! - `ClockSync`: local/server clock skew tracking with a degraded state

pub mod api;
pub mod clock;
pub mod source;
pub mod store;

pub use api::{MarketApi, StreamApi};
pub use clock::{ClockConfig, ClockSync};
pub use source::{SourceConfig, SourceManager, SourceMode};
pub use store::{Ages, DataStore, SymbolState};
