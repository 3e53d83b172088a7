//! Per-symbol market data store.
//!
//! Writers are the WS event ingestor, REST poll routines, and state-sync;
//! readers are the context builder and the health summary. Every read
//! returns a deep copy, so callers never observe later mutations, and all
//! mutation for one symbol is serialized behind that symbol's lock.

use dashmap::DashMap;
use parking_lot::RwLock;
use propcast_core::{
    Candle1m, FundingRatePoint, FundingSnapshot, OpenInterestSnapshot, PriceTick,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default closed-candle ring capacity (24h of 1m candles; ATR on 15m
/// aggregation needs 225).
pub const DEFAULT_KLINE_CAPACITY: usize = 1440;

/// Default open-interest history capacity (6h at a 30s poll cadence, which
/// covers 24 full 15m windows).
pub const DEFAULT_OI_HISTORY_CAPACITY: usize = 720;

/// State held for one symbol.
///
/// `candles` contains only closed candles, strictly increasing in
/// `open_time_ms` with no gaps; the in-progress window lives in
/// `live_candle` and never advances `last_kline_close_ts_ms`.
#[derive(Debug, Clone, Default)]
pub struct SymbolState {
    pub price: Option<PriceTick>,
    pub candles: VecDeque<Candle1m>,
    pub live_candle: Option<Candle1m>,
    pub funding: Option<FundingSnapshot>,
    pub funding_history: Vec<FundingRatePoint>,
    pub open_interest: Option<OpenInterestSnapshot>,
    pub oi_history: VecDeque<OpenInterestSnapshot>,
    pub last_kline_close_ts_ms: Option<i64>,
}

/// Raw per-field ages against a caller-supplied `now_ms`.
///
/// Negative values mean the stored timestamp is ahead of `now_ms`; the
/// health log clamps those to zero and warns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ages {
    pub price_age_ms: Option<i64>,
    pub kline_age_ms: Option<i64>,
    pub funding_age_ms: Option<i64>,
    pub oi_age_ms: Option<i64>,
}

/// Thread-safe store of `SymbolState` per symbol.
pub struct DataStore {
    symbols: DashMap<String, Arc<RwLock<SymbolState>>>,
    kline_capacity: usize,
    oi_capacity: usize,
}

impl DataStore {
    pub fn new(symbols: &[String]) -> Self {
        Self::with_capacity(symbols, DEFAULT_KLINE_CAPACITY, DEFAULT_OI_HISTORY_CAPACITY)
    }

    pub fn with_capacity(symbols: &[String], kline_capacity: usize, oi_capacity: usize) -> Self {
        let store = Self {
            symbols: DashMap::new(),
            kline_capacity,
            oi_capacity,
        };
        for symbol in symbols {
            store
                .symbols
                .insert(symbol.clone(), Arc::new(RwLock::new(SymbolState::default())));
        }
        store
    }

    fn entry(&self, symbol: &str) -> Option<Arc<RwLock<SymbolState>>> {
        self.symbols.get(symbol).map(|e| e.value().clone())
    }

    /// Update the latest price. Events older than the stored one are
    /// dropped, so the stored event time is non-decreasing per symbol.
    pub fn update_price(&self, symbol: &str, tick: PriceTick) {
        let Some(entry) = self.entry(symbol) else {
            return;
        };
        let mut state = entry.write();
        if let Some(existing) = &state.price {
            if tick.event_time_ms < existing.event_time_ms {
                debug!(
                    symbol,
                    incoming = tick.event_time_ms,
                    stored = existing.event_time_ms,
                    "dropping out-of-order price event"
                );
                return;
            }
        }
        state.price = Some(tick);
    }

    /// Insert one candle from the stream.
    ///
    /// Closed candles are inserted in order (deduplicated by open time) and
    /// advance `last_kline_close_ts_ms` to `now_ms`. Non-closed updates
    /// replace the in-progress slot only.
    pub fn append_candle(&self, symbol: &str, candle: Candle1m, now_ms: i64) {
        let Some(entry) = self.entry(symbol) else {
            return;
        };
        let mut state = entry.write();

        if !candle.is_closed {
            state.live_candle = Some(candle);
            return;
        }

        match state.candles.back().map(|last| last.open_time_ms) {
            None => state.candles.push_back(candle.clone()),
            Some(last_open) => {
                let expected = last_open + Candle1m::WINDOW_MS;
                if candle.open_time_ms == expected {
                    state.candles.push_back(candle.clone());
                } else if candle.open_time_ms > expected {
                    warn!(
                        symbol,
                        expected_open_time = expected,
                        got_open_time = candle.open_time_ms,
                        "gap in candle stream, resetting buffer"
                    );
                    state.candles.clear();
                    state.candles.push_back(candle.clone());
                } else {
                    // Re-emission of an already buffered window.
                    let front_open = state.candles.front().expect("non-empty").open_time_ms;
                    let offset = candle.open_time_ms - front_open;
                    if offset >= 0 && offset % Candle1m::WINDOW_MS == 0 {
                        let idx = (offset / Candle1m::WINDOW_MS) as usize;
                        if let Some(slot) = state.candles.get_mut(idx) {
                            *slot = candle.clone();
                        }
                    }
                }
            }
        }

        while state.candles.len() > self.kline_capacity {
            state.candles.pop_front();
        }

        if state
            .live_candle
            .as_ref()
            .is_some_and(|live| live.open_time_ms <= candle.open_time_ms)
        {
            state.live_candle = None;
        }
        state.last_kline_close_ts_ms = Some(now_ms);
    }

    /// Bulk merge used by state-sync. Preserves ordering, deduplicates by
    /// open time, and is idempotent: merging the same sequence twice leaves
    /// the buffer identical to one application.
    pub fn merge_klines(&self, symbol: &str, klines: &[Candle1m], now_ms: i64) {
        if klines.is_empty() {
            return;
        }
        let Some(entry) = self.entry(symbol) else {
            return;
        };
        let mut state = entry.write();

        let mut merged: BTreeMap<i64, Candle1m> = state
            .candles
            .iter()
            .map(|c| (c.open_time_ms, c.clone()))
            .collect();
        let mut any_closed = false;
        for candle in klines {
            if candle.is_closed {
                merged.insert(candle.open_time_ms, candle.clone());
                any_closed = true;
            } else if state
                .live_candle
                .as_ref()
                .map_or(true, |live| candle.open_time_ms >= live.open_time_ms)
            {
                state.live_candle = Some(candle.clone());
            }
        }

        // Keep only the contiguous tail so the no-gap invariant holds.
        let mut tail: Vec<Candle1m> = Vec::with_capacity(merged.len());
        for candle in merged.into_values().rev() {
            if let Some(newest_kept) = tail.last() {
                if newest_kept.open_time_ms - candle.open_time_ms != Candle1m::WINDOW_MS {
                    break;
                }
            }
            tail.push(candle);
        }
        tail.reverse();
        if tail.len() > self.kline_capacity {
            tail.drain(..tail.len() - self.kline_capacity);
        }
        state.candles = tail.into();

        let live_superseded = match (&state.live_candle, state.candles.back()) {
            (Some(live), Some(last)) => live.open_time_ms <= last.open_time_ms,
            _ => false,
        };
        if live_superseded {
            state.live_candle = None;
        }
        if any_closed {
            state.last_kline_close_ts_ms = Some(now_ms);
        }
    }

    /// Update mark price / funding. Events older than the stored snapshot
    /// are dropped.
    pub fn set_funding(&self, symbol: &str, snapshot: FundingSnapshot) {
        let Some(entry) = self.entry(symbol) else {
            return;
        };
        let mut state = entry.write();
        if let Some(existing) = &state.funding {
            if snapshot.event_time_ms < existing.event_time_ms {
                return;
            }
        }
        state.funding = Some(snapshot);
    }

    /// Replace the recent funding-rate history.
    pub fn set_funding_history(&self, symbol: &str, history: Vec<FundingRatePoint>) {
        if let Some(entry) = self.entry(symbol) {
            entry.write().funding_history = history;
        }
    }

    /// Update open interest and push it onto the sliding history window.
    pub fn set_open_interest(&self, symbol: &str, snapshot: OpenInterestSnapshot) {
        let Some(entry) = self.entry(symbol) else {
            return;
        };
        let mut state = entry.write();
        if let Some(existing) = &state.open_interest {
            if snapshot.event_time_ms < existing.event_time_ms {
                return;
            }
        }
        state.oi_history.push_back(snapshot);
        while state.oi_history.len() > self.oi_capacity {
            state.oi_history.pop_front();
        }
        state.open_interest = Some(snapshot);
    }

    /// Deep copy of the symbol state, taken under the symbol lock.
    pub fn snapshot(&self, symbol: &str) -> Option<SymbolState> {
        self.entry(symbol).map(|entry| entry.read().clone())
    }

    /// Raw per-field ages against `now_ms`.
    pub fn ages(&self, symbol: &str, now_ms: i64) -> Ages {
        let Some(entry) = self.entry(symbol) else {
            return Ages::default();
        };
        let state = entry.read();
        Ages {
            price_age_ms: state.price.as_ref().map(|p| now_ms - p.event_time_ms),
            kline_age_ms: state.last_kline_close_ts_ms.map(|ts| now_ms - ts),
            funding_age_ms: state.funding.as_ref().map(|f| now_ms - f.event_time_ms),
            oi_age_ms: state.open_interest.as_ref().map(|o| now_ms - o.event_time_ms),
        }
    }

    /// Number of closed candles buffered for a symbol.
    pub fn candle_count(&self, symbol: &str) -> usize {
        self.entry(symbol).map_or(0, |entry| entry.read().candles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols() -> Vec<String> {
        vec!["BTCUSDT".to_string()]
    }

    fn tick(event_time_ms: i64, price: f64) -> PriceTick {
        PriceTick {
            symbol: "BTCUSDT".to_string(),
            price,
            event_time_ms,
            received_time_ms: event_time_ms,
        }
    }

    fn closed(open_time_ms: i64, close: f64) -> Candle1m {
        Candle1m {
            open_time_ms,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1.0,
            close_time_ms: open_time_ms + Candle1m::WINDOW_MS - 1,
            is_closed: true,
        }
    }

    #[test]
    fn price_event_time_is_non_decreasing() {
        let store = DataStore::new(&symbols());
        store.update_price("BTCUSDT", tick(1000, 1.0));
        store.update_price("BTCUSDT", tick(500, 2.0));
        store.update_price("BTCUSDT", tick(2000, 3.0));
        store.update_price("BTCUSDT", tick(1500, 4.0));

        let snap = store.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.price.as_ref().unwrap().event_time_ms, 2000);
        assert_eq!(snap.price.unwrap().price, 3.0);
    }

    #[test]
    fn closed_candles_stay_ordered_and_deduped() {
        let store = DataStore::new(&symbols());
        store.append_candle("BTCUSDT", closed(0, 10.0), 100);
        store.append_candle("BTCUSDT", closed(60_000, 11.0), 200);
        // Re-emit of an existing window replaces in place.
        store.append_candle("BTCUSDT", closed(0, 12.0), 300);

        let snap = store.snapshot("BTCUSDT").unwrap();
        let opens: Vec<i64> = snap.candles.iter().map(|c| c.open_time_ms).collect();
        assert_eq!(opens, vec![0, 60_000]);
        assert_eq!(snap.candles[0].close, 12.0);
    }

    #[test]
    fn gap_resets_buffer() {
        let store = DataStore::new(&symbols());
        store.append_candle("BTCUSDT", closed(0, 1.0), 100);
        store.append_candle("BTCUSDT", closed(60_000, 2.0), 200);
        store.append_candle("BTCUSDT", closed(300_000, 3.0), 300);

        let snap = store.snapshot("BTCUSDT").unwrap();
        let opens: Vec<i64> = snap.candles.iter().map(|c| c.open_time_ms).collect();
        assert_eq!(opens, vec![300_000]);
    }

    #[test]
    fn non_closed_candle_does_not_advance_close_ts() {
        let store = DataStore::new(&symbols());
        store.append_candle("BTCUSDT", closed(0, 1.0), 100);

        let mut live = closed(60_000, 2.0);
        live.is_closed = false;
        store.append_candle("BTCUSDT", live, 200);

        let snap = store.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.last_kline_close_ts_ms, Some(100));
        assert_eq!(snap.candles.len(), 1);
        assert!(snap.live_candle.is_some());
    }

    #[test]
    fn merge_is_idempotent() {
        let store = DataStore::new(&symbols());
        let batch: Vec<Candle1m> = (0..5).map(|i| closed(i * 60_000, i as f64)).collect();

        store.merge_klines("BTCUSDT", &batch, 100);
        let first = store.snapshot("BTCUSDT").unwrap();
        store.merge_klines("BTCUSDT", &batch, 200);
        let second = store.snapshot("BTCUSDT").unwrap();

        assert_eq!(first.candles, second.candles);
        assert_eq!(second.candles.len(), 5);
    }

    #[test]
    fn merge_keeps_contiguous_tail_only() {
        let store = DataStore::new(&symbols());
        let mut batch: Vec<Candle1m> = vec![closed(0, 1.0), closed(60_000, 2.0)];
        batch.push(closed(300_000, 3.0));
        batch.push(closed(360_000, 4.0));

        store.merge_klines("BTCUSDT", &batch, 100);
        let snap = store.snapshot("BTCUSDT").unwrap();
        let opens: Vec<i64> = snap.candles.iter().map(|c| c.open_time_ms).collect();
        assert_eq!(opens, vec![300_000, 360_000]);
    }

    #[test]
    fn merge_overlapping_batches_extends_buffer() {
        let store = DataStore::new(&symbols());
        let first: Vec<Candle1m> = (0..4).map(|i| closed(i * 60_000, i as f64)).collect();
        let second: Vec<Candle1m> = (2..8).map(|i| closed(i * 60_000, i as f64)).collect();

        store.merge_klines("BTCUSDT", &first, 100);
        store.merge_klines("BTCUSDT", &second, 200);

        let snap = store.snapshot("BTCUSDT").unwrap();
        let opens: Vec<i64> = snap.candles.iter().map(|c| c.open_time_ms).collect();
        assert_eq!(opens, (0..8).map(|i| i * 60_000).collect::<Vec<_>>());
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let store = DataStore::new(&symbols());
        store.append_candle("BTCUSDT", closed(0, 1.0), 100);
        let snap = store.snapshot("BTCUSDT").unwrap();

        store.append_candle("BTCUSDT", closed(60_000, 2.0), 200);
        assert_eq!(snap.candles.len(), 1);
        assert_eq!(store.snapshot("BTCUSDT").unwrap().candles.len(), 2);
    }

    #[test]
    fn kline_capacity_is_enforced() {
        let store = DataStore::with_capacity(&symbols(), 3, 10);
        for i in 0..5 {
            store.append_candle("BTCUSDT", closed(i * 60_000, i as f64), 100 + i);
        }
        let snap = store.snapshot("BTCUSDT").unwrap();
        let opens: Vec<i64> = snap.candles.iter().map(|c| c.open_time_ms).collect();
        assert_eq!(opens, vec![120_000, 180_000, 240_000]);
    }

    #[test]
    fn oi_history_is_bounded_and_monotonic() {
        let store = DataStore::with_capacity(&symbols(), 10, 3);
        for i in 0..5i64 {
            store.set_open_interest(
                "BTCUSDT",
                OpenInterestSnapshot {
                    oi_value: i as f64,
                    event_time_ms: i * 1000,
                },
            );
        }
        // Stale update is dropped.
        store.set_open_interest(
            "BTCUSDT",
            OpenInterestSnapshot {
                oi_value: 99.0,
                event_time_ms: 0,
            },
        );

        let snap = store.snapshot("BTCUSDT").unwrap();
        assert_eq!(snap.oi_history.len(), 3);
        assert_eq!(snap.open_interest.unwrap().oi_value, 4.0);
    }

    #[test]
    fn ages_reflect_event_times() {
        let store = DataStore::new(&symbols());
        store.update_price("BTCUSDT", tick(1_000, 1.0));
        store.append_candle("BTCUSDT", closed(0, 1.0), 2_000);

        let ages = store.ages("BTCUSDT", 10_000);
        assert_eq!(ages.price_age_ms, Some(9_000));
        assert_eq!(ages.kline_age_ms, Some(8_000));
        assert_eq!(ages.funding_age_ms, None);
        assert_eq!(ages.oi_age_ms, None);
    }
}
