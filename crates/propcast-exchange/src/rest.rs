//! REST client for the derivatives exchange.
//!
//! Pure request/response methods with a bounded timeout and no caching;
//! callers own polling cadence. Numeric fields arrive as strings and are
//! parsed to `f64`.

use crate::error::RestError;
use propcast_core::{
    utc_now_ms, Candle1m, FundingRatePoint, FundingSnapshot, OpenInterestSnapshot, PriceTick,
};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request/response client against the futures REST API.
pub struct ExchangeClientRest {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RawTickerPrice {
    price: String,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPremiumIndex {
    #[serde(rename = "markPrice")]
    mark_price: String,
    #[serde(rename = "lastFundingRate")]
    last_funding_rate: String,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: i64,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawFundingRate {
    #[serde(rename = "fundingRate")]
    funding_rate: String,
    #[serde(rename = "fundingTime")]
    funding_time: i64,
}

#[derive(Debug, Deserialize)]
struct RawOpenInterest {
    #[serde(rename = "openInterest")]
    open_interest: String,
    #[serde(default)]
    time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawServerTime {
    #[serde(rename = "serverTime")]
    server_time: i64,
}

impl ExchangeClientRest {
    /// Create a client against the given base URL, e.g.
    /// `https://fapi.binance.com`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RestError> {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| RestError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RestError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .map_err(|e| RestError::Transport(format!("{path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Transport(format!("{path}: HTTP {status}: {body}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RestError::Decode(format!("{path}: {e}")))
    }

    /// Latest price for a symbol.
    pub async fn get_price(&self, symbol: &str) -> Result<PriceTick, RestError> {
        let raw: RawTickerPrice = self
            .get_json("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await?;
        let now_ms = utc_now_ms();
        Ok(PriceTick {
            symbol: symbol.to_string(),
            price: parse_f64(&raw.price, "price")?,
            event_time_ms: raw.time.unwrap_or(now_ms),
            received_time_ms: now_ms,
        })
    }

    /// Recent 1m candles, oldest first. The trailing in-progress candle is
    /// included with `is_closed = false`.
    pub async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Candle1m>, RestError> {
        let rows: Vec<serde_json::Value> = self
            .get_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", "1m".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let now_ms = utc_now_ms();
        let candles = rows
            .iter()
            .map(|row| parse_kline_row(row, now_ms))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(symbol, count = candles.len(), "fetched 1m klines");
        Ok(candles)
    }

    /// Mark price, latest funding rate, and next funding time.
    pub async fn get_premium_index(&self, symbol: &str) -> Result<FundingSnapshot, RestError> {
        let raw: RawPremiumIndex = self
            .get_json("/fapi/v1/premiumIndex", &[("symbol", symbol.to_string())])
            .await?;
        Ok(FundingSnapshot {
            mark_price: parse_f64(&raw.mark_price, "markPrice")?,
            last_funding_rate: parse_f64(&raw.last_funding_rate, "lastFundingRate")?,
            next_funding_time_ms: raw.next_funding_time,
            event_time_ms: raw.time.unwrap_or_else(utc_now_ms),
        })
    }

    /// Recent funding rate history, oldest first.
    pub async fn get_funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRatePoint>, RestError> {
        let raw: Vec<RawFundingRate> = self
            .get_json(
                "/fapi/v1/fundingRate",
                &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
            )
            .await?;
        raw.iter()
            .map(|point| {
                Ok(FundingRatePoint {
                    funding_rate: parse_f64(&point.funding_rate, "fundingRate")?,
                    funding_time_ms: point.funding_time,
                })
            })
            .collect()
    }

    /// Current open interest.
    pub async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterestSnapshot, RestError> {
        let raw: RawOpenInterest = self
            .get_json("/fapi/v1/openInterest", &[("symbol", symbol.to_string())])
            .await?;
        Ok(OpenInterestSnapshot {
            oi_value: parse_f64(&raw.open_interest, "openInterest")?,
            event_time_ms: raw.time.unwrap_or_else(utc_now_ms),
        })
    }

    /// Exchange server time in milliseconds; used for clock sanity.
    pub async fn get_server_time(&self) -> Result<i64, RestError> {
        let raw: RawServerTime = self.get_json("/fapi/v1/time", &[]).await?;
        Ok(raw.server_time)
    }
}

fn parse_f64(value: &str, field: &str) -> Result<f64, RestError> {
    value
        .parse::<f64>()
        .map_err(|_| RestError::Decode(format!("bad number in field {field}: {value:?}")))
}

/// Parse one kline row:
/// `[openTime, open, high, low, close, volume, closeTime, ...]`.
fn parse_kline_row(row: &serde_json::Value, now_ms: i64) -> Result<Candle1m, RestError> {
    let items = row
        .as_array()
        .ok_or_else(|| RestError::Decode("kline row is not an array".to_string()))?;
    if items.len() < 7 {
        return Err(RestError::Decode(format!(
            "kline row has {} fields, expected >= 7",
            items.len()
        )));
    }

    let int_at = |idx: usize| -> Result<i64, RestError> {
        items[idx]
            .as_i64()
            .ok_or_else(|| RestError::Decode(format!("kline row field {idx} is not an integer")))
    };
    let num_at = |idx: usize| -> Result<f64, RestError> {
        let text = items[idx]
            .as_str()
            .ok_or_else(|| RestError::Decode(format!("kline row field {idx} is not a string")))?;
        parse_f64(text, "kline")
    };

    let close_time_ms = int_at(6)?;
    Ok(Candle1m {
        open_time_ms: int_at(0)?,
        open: num_at(1)?,
        high: num_at(2)?,
        low: num_at(3)?,
        close: num_at(4)?,
        volume: num_at(5)?,
        close_time_ms,
        is_closed: close_time_ms <= now_ms,
    })
}
