//! WebSocket market data session.
//!
//! One combined stream carries `bookTicker` and `kline_1m` for every
//! configured symbol. A reader task parses frames into typed events and
//! forwards them over a channel; the owner drains with `try_next` and
//! treats any `Err` item as a session failure.
//!
//! Reconnection is NOT handled here. The source manager closes the client,
//! applies backoff, and calls `start` again.

use crate::error::StreamError;
use futures_util::{SinkExt, StreamExt};
use propcast_core::{utc_now_ms, Candle1m, PriceTick};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Event channel depth. Ticks arrive at book-ticker cadence; the tick loop
/// drains once per second.
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Typed event from the combined stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Book-ticker update; price is the mid of best bid/ask.
    Price(PriceTick),
    /// 1m candle update. `candle.is_closed` marks the final emission for
    /// the window.
    Kline { symbol: String, candle: Candle1m },
}

/// WebSocket session configuration.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Base endpoint, e.g. `wss://fstream.binance.com`.
    pub base_url: String,
    /// Symbols to subscribe, upper-case.
    pub symbols: Vec<String>,
    /// Read deadline; a silent socket past this surfaces as `StreamError`.
    pub read_deadline_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            base_url: "wss://fstream.binance.com".to_string(),
            symbols: Vec::new(),
            read_deadline_ms: 30_000,
        }
    }
}

/// Streaming client for book-ticker prices and 1m candles.
pub struct ExchangeClientWs {
    config: WsConfig,
    events_rx: Option<mpsc::Receiver<Result<StreamEvent, StreamError>>>,
    reader: Option<JoinHandle<()>>,
}

impl ExchangeClientWs {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            events_rx: None,
            reader: None,
        }
    }

    /// Combined-stream URL for the configured symbols.
    fn stream_url(&self) -> String {
        let streams: Vec<String> = self
            .config
            .symbols
            .iter()
            .flat_map(|symbol| {
                let lower = symbol.to_lowercase();
                [format!("{lower}@bookTicker"), format!("{lower}@kline_1m")]
            })
            .collect();
        format!("{}/stream?streams={}", self.config.base_url, streams.join("/"))
    }

    /// Open the session and begin buffering events.
    pub async fn start(&mut self) -> Result<(), StreamError> {
        self.close().await;

        let url = self.stream_url();
        info!(url = %url, "connecting websocket");
        let (ws_stream, _response) = connect_async(&url)
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let deadline = Duration::from_millis(self.config.read_deadline_ms);
        let deadline_ms = self.config.read_deadline_ms;

        let reader = tokio::spawn(async move {
            loop {
                let frame = match tokio::time::timeout(deadline, read.next()).await {
                    Err(_) => {
                        let _ = events_tx
                            .send(Err(StreamError::ReadDeadline(deadline_ms)))
                            .await;
                        return;
                    }
                    Ok(None) => {
                        let _ = events_tx
                            .send(Err(StreamError::Closed("stream ended".to_string())))
                            .await;
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        let _ = events_tx.send(Err(StreamError::Ws(e))).await;
                        return;
                    }
                    Ok(Some(Ok(frame))) => frame,
                };

                match frame {
                    Message::Text(text) => match parse_frame(&text) {
                        Ok(Some(event)) => {
                            if events_tx.send(Ok(event)).await.is_err() {
                                debug!("event receiver dropped, stopping reader");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let _ = events_tx.send(Err(e)).await;
                            return;
                        }
                    },
                    Message::Ping(payload) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            let _ = events_tx.send(Err(StreamError::Ws(e))).await;
                            return;
                        }
                    }
                    Message::Close(frame) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "server close".to_string());
                        let _ = events_tx.send(Err(StreamError::Closed(reason))).await;
                        return;
                    }
                    _ => {}
                }
            }
        });

        self.events_rx = Some(events_rx);
        self.reader = Some(reader);
        Ok(())
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.events_rx.is_some()
    }

    /// Drain one buffered event without blocking.
    ///
    /// `None` means no event is pending; `Some(Err(..))` means the session
    /// failed and the client should be closed.
    pub fn try_next(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        let rx = self.events_rx.as_mut()?;
        match rx.try_recv() {
            Ok(item) => Some(item),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(Err(StreamError::Closed(
                "reader task exited".to_string(),
            ))),
        }
    }

    /// Release the session.
    pub async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            warn!("websocket session closed");
        }
        self.events_rx = None;
    }
}

impl Drop for ExchangeClientWs {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

/// Combined-stream envelope: `{"stream": "...", "data": {...}}`.
/// Raw (non-combined) streams deliver the payload directly.
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    #[serde(default)]
    #[allow(dead_code)]
    stream: Option<String>,
    data: serde_json::Value,
}

/// Book-ticker payload. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct RawBookTicker {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b")]
    bid: String,
    #[serde(rename = "a")]
    ask: String,
    #[serde(rename = "E", default)]
    event_time_ms: Option<i64>,
}

/// Kline event wrapper. Candle timestamps come from the kline payload
/// itself, so the envelope event time is ignored.
#[derive(Debug, Deserialize)]
struct RawKlineEvent {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "k")]
    kline: RawKline,
}

#[derive(Debug, Deserialize)]
struct RawKline {
    #[serde(rename = "t")]
    open_time_ms: i64,
    #[serde(rename = "T")]
    close_time_ms: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "x")]
    is_closed: bool,
}

fn parse_f64(value: &str, field: &str) -> Result<f64, StreamError> {
    value
        .parse::<f64>()
        .map_err(|_| StreamError::Malformed(format!("bad number in field {field}: {value:?}")))
}

/// Parse one text frame into an event.
///
/// Unknown event types and unknown fields are ignored (upstream schema
/// drift); undecodable JSON or bad numeric fields are `Malformed`.
pub(crate) fn parse_frame(text: &str) -> Result<Option<StreamEvent>, StreamError> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| StreamError::Malformed(format!("invalid json: {e}")))?;

    let data = match serde_json::from_value::<CombinedFrame>(value.clone()) {
        Ok(frame) => frame.data,
        Err(_) => value,
    };

    let event_type = data.get("e").and_then(|v| v.as_str());
    match event_type {
        Some("bookTicker") => {
            let raw: RawBookTicker = serde_json::from_value(data)
                .map_err(|e| StreamError::Malformed(format!("bookTicker: {e}")))?;
            let bid = parse_f64(&raw.bid, "b")?;
            let ask = parse_f64(&raw.ask, "a")?;
            let now_ms = utc_now_ms();
            Ok(Some(StreamEvent::Price(PriceTick {
                symbol: raw.symbol.to_uppercase(),
                price: (bid + ask) / 2.0,
                event_time_ms: raw.event_time_ms.unwrap_or(now_ms),
                received_time_ms: now_ms,
            })))
        }
        Some("kline") => {
            let raw: RawKlineEvent = serde_json::from_value(data)
                .map_err(|e| StreamError::Malformed(format!("kline: {e}")))?;
            let candle = Candle1m {
                open_time_ms: raw.kline.open_time_ms,
                open: parse_f64(&raw.kline.open, "k.o")?,
                high: parse_f64(&raw.kline.high, "k.h")?,
                low: parse_f64(&raw.kline.low, "k.l")?,
                close: parse_f64(&raw.kline.close, "k.c")?,
                volume: parse_f64(&raw.kline.volume, "k.v")?,
                close_time_ms: raw.kline.close_time_ms,
                is_closed: raw.kline.is_closed,
            };
            Ok(Some(StreamEvent::Kline {
                symbol: raw.symbol.to_uppercase(),
                candle,
            }))
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_book_ticker_as_mid_price() {
        let text = r#"{"stream":"btcusdt@bookTicker","data":{"e":"bookTicker","u":400900217,"s":"BTCUSDT","b":"50000.10","B":"31.2","a":"50000.30","A":"40.6","T":1700000000100,"E":1700000000123}}"#;
        let event = parse_frame(text).unwrap().unwrap();
        match event {
            StreamEvent::Price(tick) => {
                assert_eq!(tick.symbol, "BTCUSDT");
                assert!((tick.price - 50000.20).abs() < 1e-9);
                assert_eq!(tick.event_time_ms, 1700000000123);
            }
            other => panic!("expected price event, got {other:?}"),
        }
    }

    #[test]
    fn parses_kline_event() {
        let text = r#"{"stream":"ethusdt@kline_1m","data":{"e":"kline","E":1700000060010,"s":"ETHUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"ETHUSDT","i":"1m","o":"3000.0","c":"3010.5","h":"3012.0","l":"2999.0","v":"120.5","x":true}}}"#;
        let event = parse_frame(text).unwrap().unwrap();
        match event {
            StreamEvent::Kline { symbol, candle } => {
                assert_eq!(symbol, "ETHUSDT");
                assert_eq!(candle.open_time_ms, 1700000000000);
                assert_eq!(candle.close_time_ms, 1700000059999);
                assert!(candle.is_closed);
                assert!((candle.close - 3010.5).abs() < 1e-9);
            }
            other => panic!("expected kline event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        let text = r#"{"data":{"e":"markPriceUpdate","s":"BTCUSDT","p":"50000"}}"#;
        assert!(parse_frame(text).unwrap().is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let text = r#"{"data":{"e":"bookTicker","s":"BTCUSDT","b":"1.0","a":"2.0","brand_new_field":42}}"#;
        let event = parse_frame(text).unwrap().unwrap();
        assert!(matches!(event, StreamEvent::Price(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(
            parse_frame("{not json"),
            Err(StreamError::Malformed(_))
        ));
    }

    #[test]
    fn bad_number_is_malformed() {
        let text = r#"{"data":{"e":"bookTicker","s":"BTCUSDT","b":"abc","a":"2.0"}}"#;
        assert!(matches!(
            parse_frame(text),
            Err(StreamError::Malformed(_))
        ));
    }

    #[test]
    fn stream_url_covers_both_channels_per_symbol() {
        let client = ExchangeClientWs::new(WsConfig {
            base_url: "wss://fstream.binance.com".to_string(),
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            read_deadline_ms: 30_000,
        });
        let url = client.stream_url();
        assert!(url.contains("btcusdt@bookTicker"));
        assert!(url.contains("btcusdt@kline_1m"));
        assert!(url.contains("ethusdt@bookTicker"));
        assert!(url.contains("ethusdt@kline_1m"));
    }
}
