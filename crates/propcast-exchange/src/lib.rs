//! Exchange connectivity for the propcast signal service.
//!
//! Two transports against the derivatives exchange:
//! - `ExchangeClientWs`: a single combined `bookTicker` + `kline_1m`
//!   streaming session for all configured symbols
//! - `ExchangeClientRest`: request/response fetches for price, candles,
//!   premium index, funding history, open interest, and server time
//!
//! Reconnection policy lives in the feed layer; the WS client only reports
//! `StreamError` and lets the owner decide.

pub mod error;
pub mod rest;
pub mod ws;

pub use error::{RestError, StreamError};
pub use rest::ExchangeClientRest;
pub use ws::{ExchangeClientWs, StreamEvent, WsConfig};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
