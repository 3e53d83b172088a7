//! Risk gate evaluation and state persistence.

use crate::error::RiskResult;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Persistent risk counters. Rewritten atomically (temp file + rename) on
/// every update so a crash never leaves a torn file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskState {
    /// UTC date the counters belong to, `YYYY-MM-DD`.
    pub day_key: String,
    pub cards_today: u32,
    pub realized_pnl_today: f64,
    /// Last dispatch per symbol, for the cooldown gate.
    pub last_trigger_at_ms: BTreeMap<String, i64>,
}

impl RiskState {
    fn for_day(day_key: String) -> Self {
        Self {
            day_key,
            cards_today: 0,
            realized_pnl_today: 0.0,
            last_trigger_at_ms: BTreeMap::new(),
        }
    }
}

/// Risk gate configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub kill_switch: bool,
    pub max_cards_per_day: u32,
    pub max_daily_loss_usdt: f64,
    pub cooldown_after_trigger_minutes: u64,
    pub risk_state_path: PathBuf,
    pub pnl_csv_path: PathBuf,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kill_switch: false,
            max_cards_per_day: 12,
            max_daily_loss_usdt: 30.0,
            cooldown_after_trigger_minutes: 30,
            risk_state_path: PathBuf::from("data/risk_state.json"),
            pnl_csv_path: PathBuf::from("data/pnl.csv"),
        }
    }
}

/// Why a candidate was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    KillSwitch,
    MaxCardsPerDay,
    MaxDailyLoss,
    Cooldown,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KillSwitch => write!(f, "kill_switch"),
            Self::MaxCardsPerDay => write!(f, "max_cards_per_day"),
            Self::MaxDailyLoss => write!(f, "max_daily_loss"),
            Self::Cooldown => write!(f, "cooldown"),
        }
    }
}

/// Outcome of a gate evaluation. Blocking is a structured result, not an
/// error; the service logs and counts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDecision {
    Pass,
    Blocked(BlockReason),
}

impl RiskDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Gatekeeper between arbitration winners and dispatch.
pub struct RiskEngine {
    config: RiskConfig,
    state: Mutex<RiskState>,
}

impl RiskEngine {
    /// Load state from `risk_state_path`, initializing defaults when the
    /// file is missing.
    pub fn load(config: RiskConfig, now_ms: i64) -> RiskResult<Self> {
        let state = match fs::read_to_string(&config.risk_state_path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                RiskState::for_day(day_key(now_ms))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            config,
            state: Mutex::new(state),
        })
    }

    /// Apply the gates in order; the first failure wins.
    pub fn evaluate(&self, symbol: &str, now_ms: i64) -> RiskDecision {
        if self.config.kill_switch {
            return RiskDecision::Blocked(BlockReason::KillSwitch);
        }

        let mut state = self.state.lock();
        self.roll_day(&mut state, now_ms);

        if state.cards_today >= self.config.max_cards_per_day {
            return RiskDecision::Blocked(BlockReason::MaxCardsPerDay);
        }
        if state.realized_pnl_today <= -self.config.max_daily_loss_usdt {
            return RiskDecision::Blocked(BlockReason::MaxDailyLoss);
        }
        if let Some(last_ms) = state.last_trigger_at_ms.get(symbol) {
            let cooldown_ms = (self.config.cooldown_after_trigger_minutes as i64) * 60_000;
            if now_ms - last_ms < cooldown_ms {
                return RiskDecision::Blocked(BlockReason::Cooldown);
            }
        }
        RiskDecision::Pass
    }

    /// Record a dispatched card and persist.
    pub fn record_trigger(&self, symbol: &str, now_ms: i64) -> RiskResult<()> {
        let mut state = self.state.lock();
        self.roll_day(&mut state, now_ms);
        state.cards_today += 1;
        state.last_trigger_at_ms.insert(symbol.to_string(), now_ms);
        self.persist(&state)
    }

    /// Record an external realized-PnL event: append to the CSV ledger and
    /// fold it into today's counter.
    pub fn record_pnl(&self, symbol: &str, usdt: f64, now_ms: i64) -> RiskResult<()> {
        if let Some(parent) = self.config.pnl_csv_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut ledger = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.pnl_csv_path)?;
        writeln!(ledger, "{now_ms},{symbol},{usdt}")?;

        let mut state = self.state.lock();
        self.roll_day(&mut state, now_ms);
        state.realized_pnl_today += usdt;
        self.persist(&state)
    }

    /// Last dispatch time for a symbol; feeds the arbitrator dedupe window.
    pub fn last_trigger_ms(&self, symbol: &str) -> Option<i64> {
        self.state.lock().last_trigger_at_ms.get(symbol).copied()
    }

    /// Write the current state out. Called on graceful shutdown.
    pub fn flush(&self) -> RiskResult<()> {
        let state = self.state.lock();
        self.persist(&state)
    }

    fn roll_day(&self, state: &mut RiskState, now_ms: i64) {
        let today = day_key(now_ms);
        if state.day_key != today {
            info!(
                from = %state.day_key,
                to = %today,
                "utc day rollover, resetting daily counters"
            );
            let triggers = std::mem::take(&mut state.last_trigger_at_ms);
            *state = RiskState::for_day(today);
            state.last_trigger_at_ms = triggers;
            if let Err(e) = self.persist(state) {
                warn!(error = %e, "failed to persist day rollover");
            }
        }
    }

    fn persist(&self, state: &RiskState) -> RiskResult<()> {
        atomic_write_json(&self.config.risk_state_path, state)
    }
}

fn day_key(now_ms: i64) -> String {
    Utc.timestamp_millis_opt(now_ms)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

/// Serialize to a sibling temp file, then rename over the target so a
/// crash between the steps leaves the previous state intact.
fn atomic_write_json(path: &Path, state: &RiskState) -> RiskResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let payload = serde_json::to_vec_pretty(state)?;
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
