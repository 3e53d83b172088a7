//! Tick-loop orchestration.
//!
//! One tick per `poll_seconds`: refresh the sources, then walk each symbol
//! through context building, strategies, arbitration, risk gating, and
//! dispatch. A failure in one symbol's tick is logged with its phase and
//! never stops the loop.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use propcast_core::{utc_now_ms, ProposalCard};
use propcast_engine::{
    context::{build_signal_context, ContextInputs},
    Arbitrator, FakeBreakoutReversal, FundingOiSkew, LiquidationFollow, Strategy, VolBreakout,
};
use propcast_exchange::{ExchangeClientRest, ExchangeClientWs, WsConfig};
use propcast_feed::{DataStore, SourceManager};
use propcast_notify::{card_html, Notifier, PostbackClient};
use propcast_risk::{RiskDecision, RiskEngine};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// 1m bars needed before ATR over 15m windows can resolve.
const ATR_WARMUP_BARS: usize = 15 * 15;

/// Per-symbol tick failure, tagged with the phase that failed.
struct PhaseError {
    phase: &'static str,
    message: String,
}

impl PhaseError {
    fn new(phase: &'static str, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

/// The assembled service.
pub struct SignalService {
    config: AppConfig,
    store: Arc<DataStore>,
    sources: SourceManager<ExchangeClientRest, ExchangeClientWs>,
    strategies: Vec<Box<dyn Strategy>>,
    arbitrator: Arbitrator,
    risk: RiskEngine,
    notifier: Notifier,
    postback: PostbackClient,
    atr_warmup_logged: HashSet<String>,
}

impl SignalService {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let store = Arc::new(DataStore::new(&config.symbols));

        let rest = ExchangeClientRest::new(config.rest_url.clone())
            .map_err(|e| AppError::Init(format!("rest client: {e}")))?;
        let ws = ExchangeClientWs::new(WsConfig {
            base_url: config.ws_url.clone(),
            symbols: config.symbols.clone(),
            read_deadline_ms: config.ws_read_deadline_ms,
        });
        let sources = SourceManager::new(
            config.source.clone(),
            config.symbols.clone(),
            store.clone(),
            rest,
            ws,
        );

        let strategies = build_strategies(&config);
        let arbitrator = Arbitrator::new(config.arbitrator.clone().into());
        let risk = RiskEngine::load(config.risk.clone(), utc_now_ms())?;
        let notifier = Notifier::new(&config.notify.bot_token, &config.notify.chat_id)?;
        let postback = PostbackClient::new(config.notify.postback_url.clone())?;

        Ok(Self {
            config,
            store,
            sources,
            strategies,
            arbitrator,
            risk,
            notifier,
            postback,
            atr_warmup_logged: HashSet::new(),
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(mut self) -> AppResult<()> {
        info!(symbols = ?self.config.symbols, "starting signal service");
        self.sources.bootstrap(utc_now_ms()).await;

        let period = Duration::from_secs_f64(self.config.poll_seconds.max(0.05));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now_ms = utc_now_ms();
                    self.sources.refresh(now_ms).await;
                    for symbol in self.config.symbols.clone() {
                        if let Err(e) = self.evaluate_symbol(&symbol, now_ms).await {
                            warn!(
                                symbol,
                                phase = e.phase,
                                reason = %e.message,
                                "symbol tick failed, continuing"
                            );
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.sources.shutdown().await;
        self.risk.flush()?;
        info!("signal service stopped");
        Ok(())
    }

    /// One symbol through the whole pipeline.
    async fn evaluate_symbol(&mut self, symbol: &str, now_ms: i64) -> Result<(), PhaseError> {
        let Some(snapshot) = self.store.snapshot(symbol) else {
            self.log_decision(symbol, "no_signal", "unknown_symbol");
            return Ok(());
        };
        let Some(price) = snapshot.price.as_ref().map(|p| p.price) else {
            self.log_decision(symbol, "no_signal", "data_not_ready");
            return Ok(());
        };

        let freshness = self.sources.freshness(symbol, now_ms);
        if !freshness.price_fresh {
            self.log_decision(symbol, "no_signal", "price_stale");
            return Ok(());
        }

        let candles: Vec<_> = snapshot.candles.iter().cloned().collect();
        if candles.len() < ATR_WARMUP_BARS {
            if self.atr_warmup_logged.insert(symbol.to_string()) {
                info!(
                    symbol,
                    have_1m_bars = candles.len(),
                    need_1m_bars = ATR_WARMUP_BARS,
                    "atr warmup in progress"
                );
            }
            self.log_decision(symbol, "no_signal", "atr_warmup");
            return Ok(());
        }
        self.atr_warmup_logged.remove(symbol);

        let now_corrected = self.sources.now_corrected(now_ms);
        let oi_history: Vec<_> = snapshot.oi_history.iter().copied().collect();
        let ctx = build_signal_context(ContextInputs {
            symbol,
            now_ms: now_corrected,
            price,
            candles_1m: &candles,
            funding_rate: snapshot.funding.as_ref().map(|f| f.last_funding_rate),
            mark_price: snapshot.funding.as_ref().map(|f| f.mark_price),
            open_interest: snapshot.open_interest.map(|o| o.oi_value),
            oi_history: &oi_history,
            last_kline_close_ts_ms: snapshot.last_kline_close_ts_ms,
            freshness,
            clock_state: self.sources.clock_state(),
        });

        let candidates: Vec<ProposalCard> = self
            .strategies
            .iter()
            .filter_map(|s| s.generate(&ctx))
            .collect();
        if candidates.is_empty() {
            debug!(symbol, "no strategy candidates this tick");
            return Ok(());
        }

        let winner = self.arbitrator.choose_best(
            candidates,
            self.risk.last_trigger_ms(symbol),
            now_corrected,
        );
        let Some(card) = winner else {
            self.log_decision(symbol, "no_signal", "arbitration_empty");
            return Ok(());
        };

        match self.risk.evaluate(symbol, now_corrected) {
            RiskDecision::Blocked(reason) => {
                self.log_decision(symbol, "blocked", &reason.to_string());
                return Ok(());
            }
            RiskDecision::Pass => {}
        }

        self.risk
            .record_trigger(symbol, now_corrected)
            .map_err(|e| PhaseError::new("risk", e.to_string()))?;
        self.log_decision(symbol, "emit", "ok");
        self.dispatch(card).await
    }

    /// Hand the winning card to the notification collaborators.
    async fn dispatch(&self, card: ProposalCard) -> Result<(), PhaseError> {
        let trace_id = format!("card_{}_{}", card.symbol.to_lowercase(), card.created_at_ms);
        let html = card_html(&card);
        info!(
            trace_id,
            symbol = %card.symbol,
            strategy = %card.strategy,
            side = %card.side,
            entry = card.entry,
            stop = card.stop,
            "dispatching proposal card"
        );

        self.notifier
            .send_card(&card, &html)
            .await
            .map_err(|e| PhaseError::new("dispatch", e.to_string()))?;

        if self.postback.is_enabled() {
            let postback = self.postback.clone();
            tokio::spawn(async move {
                postback.post_json(&card).await;
            });
        }
        Ok(())
    }

    fn log_decision(&self, symbol: &str, decision: &str, reason: &str) {
        info!(
            event = "signal_decision",
            symbol,
            decision,
            reason,
            mode = %self.sources.mode(),
            "tick evaluated"
        );
    }
}

fn build_strategies(config: &AppConfig) -> Vec<Box<dyn Strategy>> {
    let s = &config.strategies;
    vec![
        Box::new(FakeBreakoutReversal {
            sweep_pct: s.sweep_pct,
            wick_body_ratio: s.wick_body_ratio,
            stop_buffer_atr: s.stop_buffer_atr,
            min_atr_pct: s.min_atr_pct,
            max_kline_age_ms: 90_000,
            leverage_suggest: s.leverage_suggest,
            max_risk_usdt: s.max_risk_usdt,
            ttl_minutes: 5,
            priority: s.priority_fake_breakout,
        }),
        Box::new(FundingOiSkew {
            funding_extreme: s.funding_extreme,
            oi_zscore_threshold: s.oi_zscore,
            leverage_suggest: 35,
            max_risk_usdt: s.max_risk_usdt,
            ttl_minutes: 12,
            priority: s.priority_funding_oi_skew,
        }),
        Box::new(LiquidationFollow {
            oi_delta_pct_threshold: s.oi_delta_pct,
            return_threshold: s.return_threshold,
            leverage_suggest: 30,
            max_risk_usdt: s.max_risk_usdt,
            ttl_minutes: 10,
            priority: s.priority_liquidation_follow,
        }),
        Box::new(VolBreakout {
            return_threshold: s.return_threshold,
            atr_spike_multiplier: s.atr_spike_multiplier,
            leverage_suggest: s.leverage_suggest,
            max_risk_usdt: s.max_risk_usdt,
            ttl_minutes: s.ttl_minutes,
            priority: s.priority_vol_breakout,
        }),
    ]
}
