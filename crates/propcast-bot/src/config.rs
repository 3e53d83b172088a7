//! Application configuration.
//!
//! Loaded from a TOML file (path from `--config` or `PROPCAST_CONFIG`,
//! default `config/default.toml`); every field has a default so a missing
//! file still yields a runnable observation setup. Chat credentials may
//! also arrive via `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID`, and
//! `KILL_SWITCH=1` forces the risk kill switch on without editing the
//! file.

use crate::error::{AppError, AppResult};
use propcast_engine::ArbitratorConfig;
use propcast_feed::SourceConfig;
use propcast_risk::RiskConfig;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Symbols to track, upper-case.
    pub symbols: Vec<String>,
    /// Tick loop period.
    pub poll_seconds: f64,
    /// WS endpoint base URL.
    pub ws_url: String,
    /// REST endpoint base URL.
    pub rest_url: String,
    /// WS read deadline before the session counts as dead.
    pub ws_read_deadline_ms: u64,
    pub source: SourceConfig,
    pub strategies: StrategiesConfig,
    pub arbitrator: ArbitratorSection,
    pub risk: RiskConfig,
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            poll_seconds: 1.0,
            ws_url: "wss://fstream.binance.com".to_string(),
            rest_url: "https://fapi.binance.com".to_string(),
            ws_read_deadline_ms: 30_000,
            source: SourceConfig::default(),
            strategies: StrategiesConfig::default(),
            arbitrator: ArbitratorSection::default(),
            risk: RiskConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Strategy thresholds and card fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub max_risk_usdt: f64,
    pub leverage_suggest: u32,
    pub ttl_minutes: u32,
    pub return_threshold: f64,
    pub atr_spike_multiplier: f64,
    pub funding_extreme: f64,
    pub oi_zscore: f64,
    pub oi_delta_pct: f64,
    pub sweep_pct: f64,
    pub wick_body_ratio: f64,
    pub stop_buffer_atr: f64,
    pub min_atr_pct: f64,
    pub priority_fake_breakout: i32,
    pub priority_funding_oi_skew: i32,
    pub priority_liquidation_follow: i32,
    pub priority_vol_breakout: i32,
}

impl Default for StrategiesConfig {
    fn default() -> Self {
        Self {
            max_risk_usdt: 10.0,
            leverage_suggest: 50,
            ttl_minutes: 15,
            return_threshold: 0.012,
            atr_spike_multiplier: 2.0,
            funding_extreme: 0.001,
            oi_zscore: 2.0,
            oi_delta_pct: 0.05,
            sweep_pct: 0.002,
            wick_body_ratio: 1.5,
            stop_buffer_atr: 0.25,
            min_atr_pct: 0.001,
            priority_fake_breakout: 100,
            priority_funding_oi_skew: 80,
            priority_liquidation_follow: 60,
            priority_vol_breakout: 40,
        }
    }
}

/// Arbitration subset.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArbitratorSection {
    pub dedupe_window_seconds: u64,
    pub entry_similar_pct: f64,
    pub stop_similar_pct: f64,
}

impl Default for ArbitratorSection {
    fn default() -> Self {
        Self {
            dedupe_window_seconds: 180,
            entry_similar_pct: 0.002,
            stop_similar_pct: 0.005,
        }
    }
}

impl From<ArbitratorSection> for ArbitratorConfig {
    fn from(section: ArbitratorSection) -> Self {
        Self {
            dedupe_window_seconds: section.dedupe_window_seconds,
            entry_similar_pct: section.entry_similar_pct,
            stop_similar_pct: section.stop_similar_pct,
        }
    }
}

/// Notification settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub postback_url: Option<String>,
}

impl AppConfig {
    /// Resolve the config path and load, falling back to defaults when the
    /// file does not exist.
    pub fn load(cli_path: Option<String>) -> AppResult<Self> {
        let path = cli_path
            .or_else(|| std::env::var("PROPCAST_CONFIG").ok())
            .unwrap_or_else(|| "config/default.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(path = %path, "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }

    fn apply_env_overrides(&mut self) {
        if self.notify.bot_token.is_empty() {
            if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
                self.notify.bot_token = token;
            }
        }
        if self.notify.chat_id.is_empty() {
            if let Ok(chat_id) = std::env::var("TELEGRAM_CHAT_ID") {
                self.notify.chat_id = chat_id;
            }
        }
        if let Ok(value) = std::env::var("KILL_SWITCH") {
            if value == "1" || value.eq_ignore_ascii_case("true") {
                self.risk.kill_switch = true;
            }
        }
    }
}
