//! Local/server clock sanity tracking.
//!
//! Periodically fetches exchange server time and tracks the skew against
//! the local clock. When skew exceeds the configured budget or the fetch
//! fails, the clock enters a degraded state for at least the configured
//! TTL and retries on a shorter cadence. Age computations keep using the
//! last known offset estimate while degraded.

use crate::api::MarketApi;
use propcast_core::ClockState;
use serde::Deserialize;
use tracing::{info, warn};

/// Clock sanity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub max_clock_error_ms: i64,
    pub server_time_refresh_sec: u64,
    pub server_time_degraded_retry_sec: u64,
    pub clock_degraded_ttl_ms: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            max_clock_error_ms: 1_000,
            server_time_refresh_sec: 60,
            server_time_degraded_retry_sec: 10,
            clock_degraded_ttl_ms: 60_000,
        }
    }
}

/// Skew tracker. All inputs are caller-supplied local wall-clock ms, so
/// the cadence logic is fully deterministic under test.
pub struct ClockSync {
    config: ClockConfig,
    state: ClockState,
    skew_ms: i64,
    last_sync_local_ms: Option<i64>,
    degraded_until_local_ms: Option<i64>,
    next_refresh_local_ms: i64,
}

impl ClockSync {
    pub fn new(config: ClockConfig) -> Self {
        Self {
            config,
            state: ClockState::Degraded,
            skew_ms: 0,
            last_sync_local_ms: None,
            degraded_until_local_ms: None,
            next_refresh_local_ms: 0,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Server-corrected time from a local reading.
    pub fn now_corrected(&self, local_now_ms: i64) -> i64 {
        local_now_ms + self.skew_ms
    }

    /// Age of the last successful server sync.
    pub fn last_sync_age_ms(&self, local_now_ms: i64) -> Option<i64> {
        self.last_sync_local_ms.map(|ts| (local_now_ms - ts).max(0))
    }

    /// Fetch server time when the refresh deadline has passed.
    pub async fn maybe_refresh<R: MarketApi>(&mut self, rest: &R, local_now_ms: i64) {
        if local_now_ms < self.next_refresh_local_ms {
            return;
        }
        self.refresh(rest, local_now_ms).await;
    }

    /// Unconditional refresh attempt.
    pub async fn refresh<R: MarketApi>(&mut self, rest: &R, local_now_ms: i64) {
        match rest.get_server_time().await {
            Ok(server_ms) => {
                self.skew_ms = server_ms - local_now_ms;
                self.last_sync_local_ms = Some(local_now_ms);
                if self.skew_ms.abs() > self.config.max_clock_error_ms {
                    self.enter_degraded(local_now_ms, "skew_exceeded");
                } else if self.state == ClockState::Degraded
                    && self
                        .degraded_until_local_ms
                        .is_some_and(|until| local_now_ms < until)
                {
                    // Minimum degraded dwell not yet served.
                } else {
                    self.transition(ClockState::Synced, "refresh_success");
                    self.degraded_until_local_ms = None;
                }
                info!(
                    event = "server_time_refresh",
                    result = "success",
                    local_ms = local_now_ms,
                    server_ms,
                    skew_ms = self.skew_ms,
                    clock_state = %self.state,
                );
            }
            Err(e) => {
                self.enter_degraded(local_now_ms, "refresh_fail");
                warn!(
                    event = "server_time_refresh",
                    result = "fail",
                    local_ms = local_now_ms,
                    clock_state = %self.state,
                    error = %e,
                );
            }
        }

        let interval_sec = match self.state {
            ClockState::Synced => self.config.server_time_refresh_sec,
            ClockState::Degraded => self.config.server_time_degraded_retry_sec,
        };
        self.next_refresh_local_ms = local_now_ms + (interval_sec as i64) * 1000;
    }

    fn enter_degraded(&mut self, local_now_ms: i64, reason: &str) {
        self.transition(ClockState::Degraded, reason);
        self.degraded_until_local_ms = Some(local_now_ms + self.config.clock_degraded_ttl_ms);
    }

    fn transition(&mut self, to: ClockState, reason: &str) {
        if self.state != to {
            info!(
                event = "clock_state_change",
                from = %self.state,
                to = %to,
                reason,
            );
        }
        self.state = to;
    }
}
