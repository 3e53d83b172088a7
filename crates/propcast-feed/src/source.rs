//! Dual-mode data source controller.
//!
//! Drives the WS session while it is healthy and falls back to REST
//! polling when it is not. Failover triggers on stream errors, stale
//! prices, or stale candles; recovery back to WS requires a run of
//! consecutive fresh ticks from the reconnected session and a successful
//! REST state-sync of the candle buffer first.
//!
//! Derivative data (mark/funding/open interest) has no stream and is
//! polled on its own cadences in both modes.

use crate::api::{MarketApi, StreamApi};
use crate::clock::{ClockConfig, ClockSync};
use crate::store::DataStore;
use propcast_core::{ClockState, Freshness};
use propcast_exchange::{RestError, StreamError, StreamEvent};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Health summary cadence.
const HEALTH_LOG_INTERVAL_MS: i64 = 60_000;

/// Active transport mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Ws,
    Rest,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ws => write!(f, "ws"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

/// Source manager configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub preferred_mode: SourceMode,
    /// Price staleness budget; past it the WS session is considered dead.
    pub stale_seconds: u64,
    /// Closed-candle staleness budget.
    pub kline_stale_ms: i64,
    pub ws_backoff_min_ms: u64,
    pub ws_backoff_max_ms: u64,
    /// Consecutive fresh WS ticks required before switching back to WS.
    pub ws_recover_good_ticks: u32,
    /// Candles fetched per symbol during state-sync.
    pub state_sync_klines: usize,
    pub rest_price_poll_seconds: u64,
    pub rest_kline_poll_seconds: u64,
    pub premiumindex_poll_seconds: u64,
    pub funding_poll_seconds: u64,
    pub oi_poll_seconds: u64,
    pub funding_history_limit: usize,
    pub funding_stale_ms: i64,
    pub oi_stale_ms: i64,
    pub clock: ClockConfig,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            preferred_mode: SourceMode::Ws,
            stale_seconds: 5,
            kline_stale_ms: 90_000,
            ws_backoff_min_ms: 1_000,
            ws_backoff_max_ms: 60_000,
            ws_recover_good_ticks: 3,
            state_sync_klines: 500,
            rest_price_poll_seconds: 2,
            rest_kline_poll_seconds: 30,
            premiumindex_poll_seconds: 15,
            funding_poll_seconds: 60,
            oi_poll_seconds: 30,
            funding_history_limit: 3,
            funding_stale_ms: 120_000,
            oi_stale_ms: 90_000,
            clock: ClockConfig::default(),
        }
    }
}

/// WS/REST controller. All cadence arithmetic uses caller-supplied local
/// wall-clock milliseconds so the state machine is deterministic in tests.
pub struct SourceManager<R, W> {
    config: SourceConfig,
    symbols: Vec<String>,
    store: Arc<DataStore>,
    rest: R,
    ws: W,
    clock: ClockSync,
    mode: SourceMode,
    ws_good_ticks: u32,
    ws_backoff_ms: u64,
    ws_retry_at_ms: i64,
    last_price_poll_ms: i64,
    last_kline_poll_ms: i64,
    last_premium_poll_ms: i64,
    last_funding_poll_ms: i64,
    last_oi_poll_ms: i64,
    last_health_log_ms: i64,
}

impl<R: MarketApi, W: StreamApi> SourceManager<R, W> {
    pub fn new(
        config: SourceConfig,
        symbols: Vec<String>,
        store: Arc<DataStore>,
        rest: R,
        ws: W,
    ) -> Self {
        let clock = ClockSync::new(config.clock.clone());
        let mode = config.preferred_mode;
        let ws_backoff_ms = config.ws_backoff_min_ms;
        Self {
            config,
            symbols,
            store,
            rest,
            ws,
            clock,
            mode,
            ws_good_ticks: 0,
            ws_backoff_ms,
            ws_retry_at_ms: 0,
            last_price_poll_ms: 0,
            last_kline_poll_ms: 0,
            last_premium_poll_ms: 0,
            last_funding_poll_ms: 0,
            last_oi_poll_ms: 0,
            last_health_log_ms: 0,
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn clock_state(&self) -> ClockState {
        self.clock.state()
    }

    /// Server-corrected time from a local reading.
    pub fn now_corrected(&self, local_now_ms: i64) -> i64 {
        self.clock.now_corrected(local_now_ms)
    }

    /// Initial clock sync, candle backfill, and WS connect.
    pub async fn bootstrap(&mut self, now_ms: i64) {
        self.clock.refresh(&self.rest, now_ms).await;
        if let Err(e) = self.state_sync("bootstrap", now_ms).await {
            warn!(error = %e, "bootstrap state sync failed");
        }
        if self.config.preferred_mode == SourceMode::Ws {
            match self.ws.start().await {
                Ok(()) => info!("ws initial connect ok"),
                Err(e) => {
                    warn!(error = %e, "ws initial connect failed, falling back to rest");
                    self.switch_mode(SourceMode::Rest, "*", "connect_failed", now_ms);
                    self.schedule_ws_retry(now_ms);
                }
            }
        }
    }

    /// One refresh cycle; called once per service tick.
    pub async fn refresh(&mut self, now_ms: i64) {
        self.clock.maybe_refresh(&self.rest, now_ms).await;
        self.drain_ws_events(now_ms).await;
        if self.mode == SourceMode::Ws {
            if let Some((symbol, reason)) = self.find_stale_symbol(now_ms) {
                self.ws.close().await;
                self.ws_good_ticks = 0;
                self.switch_mode(SourceMode::Rest, &symbol, reason, now_ms);
                self.schedule_ws_retry(now_ms);
            }
        }
        self.poll_derivatives(now_ms).await;
        if self.mode == SourceMode::Rest {
            self.poll_rest_prices(now_ms).await;
            self.poll_rest_klines(now_ms).await;
            self.attempt_ws_recover(now_ms).await;
        }
        self.log_health_if_due(now_ms);
    }

    /// Per-field freshness flags for one symbol.
    pub fn freshness(&self, symbol: &str, now_ms: i64) -> Freshness {
        let now_corrected = self.clock.now_corrected(now_ms);
        let ages = self.store.ages(symbol, now_corrected);
        let stale_ms = (self.config.stale_seconds as i64) * 1000;
        Freshness {
            price_fresh: ages.price_age_ms.is_some_and(|age| age <= stale_ms),
            kline_fresh: ages
                .kline_age_ms
                .is_some_and(|age| age <= self.config.kline_stale_ms),
            funding_fresh: ages
                .funding_age_ms
                .is_some_and(|age| age <= self.config.funding_stale_ms),
            oi_fresh: ages
                .oi_age_ms
                .is_some_and(|age| age <= self.config.oi_stale_ms),
        }
    }

    /// Release the streaming session.
    pub async fn shutdown(&mut self) {
        self.ws.close().await;
    }

    async fn drain_ws_events(&mut self, now_ms: i64) {
        if !self.ws.is_connected() {
            return;
        }
        let now_corrected = self.clock.now_corrected(now_ms);
        let stale_ms = (self.config.stale_seconds as i64) * 1000;

        while let Some(item) = self.ws.try_next() {
            match item {
                Ok(StreamEvent::Price(tick)) => {
                    let fresh = now_corrected - tick.event_time_ms <= stale_ms;
                    let symbol = tick.symbol.clone();
                    self.store.update_price(&symbol, tick);
                    if self.mode == SourceMode::Rest {
                        if fresh {
                            self.ws_good_ticks += 1;
                        } else {
                            self.ws_good_ticks = 0;
                        }
                    }
                }
                Ok(StreamEvent::Kline { symbol, candle }) => {
                    self.store.append_candle(&symbol, candle, now_corrected);
                }
                Err(e) => {
                    self.handle_stream_failure(e, now_ms).await;
                    return;
                }
            }
        }
    }

    async fn handle_stream_failure(&mut self, error: StreamError, now_ms: i64) {
        self.ws.close().await;
        self.ws_good_ticks = 0;
        if self.mode == SourceMode::Ws {
            self.switch_mode(SourceMode::Rest, "*", &format!("stream_error:{error}"), now_ms);
        } else {
            warn!(error = %error, "ws failed during recovery");
        }
        self.schedule_ws_retry(now_ms);
    }

    /// First symbol whose price or candle feed has gone stale, if any.
    fn find_stale_symbol(&self, now_ms: i64) -> Option<(String, &'static str)> {
        let now_corrected = self.clock.now_corrected(now_ms);
        let stale_ms = (self.config.stale_seconds as i64) * 1000;
        for symbol in &self.symbols {
            let ages = self.store.ages(symbol, now_corrected);
            if ages.price_age_ms.is_some_and(|age| age > stale_ms) {
                return Some((symbol.clone(), "price_stale"));
            }
            if ages
                .kline_age_ms
                .is_some_and(|age| age > self.config.kline_stale_ms)
            {
                return Some((symbol.clone(), "kline_stale"));
            }
        }
        None
    }

    async fn poll_derivatives(&mut self, now_ms: i64) {
        if self.is_due(self.last_premium_poll_ms, self.config.premiumindex_poll_seconds, now_ms) {
            self.last_premium_poll_ms = now_ms;
            for symbol in self.symbols.clone() {
                match self.rest.get_premium_index(&symbol).await {
                    Ok(snapshot) => self.store.set_funding(&symbol, snapshot),
                    Err(e) => warn!(symbol, error = %e, "premium index poll failed"),
                }
            }
        }

        if self.is_due(self.last_funding_poll_ms, self.config.funding_poll_seconds, now_ms) {
            self.last_funding_poll_ms = now_ms;
            for symbol in self.symbols.clone() {
                match self
                    .rest
                    .get_funding_history(&symbol, self.config.funding_history_limit)
                    .await
                {
                    Ok(history) => self.store.set_funding_history(&symbol, history),
                    Err(e) => warn!(symbol, error = %e, "funding history poll failed"),
                }
            }
        }

        if self.is_due(self.last_oi_poll_ms, self.config.oi_poll_seconds, now_ms) {
            self.last_oi_poll_ms = now_ms;
            for symbol in self.symbols.clone() {
                match self.rest.get_open_interest(&symbol).await {
                    Ok(snapshot) => self.store.set_open_interest(&symbol, snapshot),
                    Err(e) => warn!(symbol, error = %e, "open interest poll failed"),
                }
            }
        }
    }

    async fn poll_rest_prices(&mut self, now_ms: i64) {
        if !self.is_due(self.last_price_poll_ms, self.config.rest_price_poll_seconds, now_ms) {
            return;
        }
        self.last_price_poll_ms = now_ms;
        for symbol in self.symbols.clone() {
            match self.rest.get_price(&symbol).await {
                Ok(tick) => self.store.update_price(&symbol, tick),
                Err(e) => warn!(symbol, error = %e, "rest price poll failed"),
            }
        }
    }

    async fn poll_rest_klines(&mut self, now_ms: i64) {
        if !self.is_due(self.last_kline_poll_ms, self.config.rest_kline_poll_seconds, now_ms) {
            return;
        }
        self.last_kline_poll_ms = now_ms;
        if let Err(e) = self.state_sync("rest_poll", now_ms).await {
            warn!(error = %e, "rest kline poll failed");
        }
    }

    async fn attempt_ws_recover(&mut self, now_ms: i64) {
        if self.config.preferred_mode != SourceMode::Ws {
            return;
        }
        if now_ms < self.ws_retry_at_ms {
            return;
        }

        if !self.ws.is_connected() {
            match self.ws.start().await {
                Ok(()) => {
                    info!("ws reconnected, waiting for fresh ticks");
                    self.ws_backoff_ms = self.config.ws_backoff_min_ms;
                    self.ws_good_ticks = 0;
                }
                Err(e) => {
                    warn!(error = %e, "ws reconnect failed");
                    self.schedule_ws_retry(now_ms);
                    return;
                }
            }
        }

        if self.ws_good_ticks >= self.config.ws_recover_good_ticks {
            match self.state_sync("recovered", now_ms).await {
                Ok(()) => {
                    self.switch_mode(SourceMode::Ws, "*", "recovered", now_ms);
                    self.ws_good_ticks = 0;
                }
                Err(e) => {
                    warn!(error = %e, "state sync failed, staying in rest mode");
                    self.ws_good_ticks = 0;
                }
            }
        }
    }

    /// Backfill the candle buffers from REST. Fails on the first symbol
    /// error so a recovery attempt never flips modes with a partial sync.
    async fn state_sync(&mut self, reason: &str, now_ms: i64) -> Result<(), RestError> {
        let now_corrected = self.clock.now_corrected(now_ms);
        for symbol in self.symbols.clone() {
            let klines = self
                .rest
                .get_klines(&symbol, self.config.state_sync_klines)
                .await?;
            info!(reason, symbol, count = klines.len(), "state sync merged klines");
            self.store.merge_klines(&symbol, &klines, now_corrected);
        }
        Ok(())
    }

    fn is_due(&self, last_ms: i64, interval_sec: u64, now_ms: i64) -> bool {
        last_ms == 0 || now_ms - last_ms >= (interval_sec as i64) * 1000
    }

    fn schedule_ws_retry(&mut self, now_ms: i64) {
        self.ws_retry_at_ms = now_ms + self.ws_backoff_ms as i64;
        self.ws_backoff_ms = (self.ws_backoff_ms * 2).min(self.config.ws_backoff_max_ms);
    }

    fn switch_mode(&mut self, to: SourceMode, symbol: &str, reason: &str, now_ms: i64) {
        if self.mode == to {
            return;
        }
        warn!(
            event = "source_mode_switch",
            from = %self.mode,
            to = %to,
            reason,
            symbol,
            now_ms,
        );
        self.mode = to;
    }

    fn log_health_if_due(&mut self, now_ms: i64) {
        if self.last_health_log_ms != 0
            && now_ms - self.last_health_log_ms < HEALTH_LOG_INTERVAL_MS
        {
            return;
        }
        self.last_health_log_ms = now_ms;

        let now_corrected = self.clock.now_corrected(now_ms);
        for symbol in &self.symbols {
            let ages = self.store.ages(symbol, now_corrected);
            let clamp = |field: &str, age: Option<i64>| -> Option<i64> {
                match age {
                    Some(age) if age < 0 => {
                        warn!(
                            event = "timestamp_in_future",
                            symbol,
                            field,
                            ahead_ms = -age,
                            now_ms = now_corrected,
                        );
                        Some(0)
                    }
                    other => other,
                }
            };
            info!(
                event = "health",
                mode = %self.mode,
                symbol,
                price_age_ms = clamp("price", ages.price_age_ms),
                kline_age_ms = clamp("kline_close", ages.kline_age_ms),
                funding_age_ms = clamp("funding", ages.funding_age_ms),
                oi_age_ms = clamp("open_interest", ages.oi_age_ms),
                buffer_size = self.store.candle_count(symbol),
                clock_state = %self.clock.state(),
                last_server_sync_age_ms = self.clock.last_sync_age_ms(now_ms),
            );
        }
    }

    #[cfg(test)]
    fn force_mode(&mut self, mode: SourceMode) {
        self.mode = mode;
    }
}
