//! Rolling indicator functions.
//!
//! Pure `f64` math. Results that would require division by zero or
//! insufficient data are `None`.

use propcast_core::{Candle15m, Candle1m, OpenInterestSnapshot};

/// ATR period over 15m windows.
pub const ATR_PERIOD: usize = 14;

/// Maximum number of recent ATR values in the baseline mean (24h of 15m).
pub const ATR_BASELINE_WINDOW: usize = 96;

/// Minimum open-interest samples for a z-score.
pub const OI_ZSCORE_MIN_SAMPLES: usize = 10;

/// Lookback for the open-interest delta.
pub const OI_DELTA_WINDOW_MS: i64 = 15 * 60_000;

/// 5-minute return over closed 1m closes:
/// `(close_n - close_{n-5}) / close_{n-5}`.
///
/// Requires at least 6 closes.
pub fn ret_5m(closes: &[f64]) -> Option<f64> {
    const LOOKBACK: usize = 5;
    if closes.len() < LOOKBACK + 1 {
        return None;
    }
    let current = closes[closes.len() - 1];
    let previous = closes[closes.len() - 1 - LOOKBACK];
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous)
}

/// 1m candles per aggregated window.
const CANDLES_PER_WINDOW: usize = 15;

/// Aggregate closed 1m candles into 15m windows aligned to 15-minute epoch
/// boundaries. Only fully observed windows (all fifteen 1m candles) are
/// emitted; partial leading and trailing windows are dropped.
pub fn aggregate_15m(candles_1m: &[Candle1m]) -> Vec<Candle15m> {
    let mut windows: Vec<Candle15m> = Vec::new();
    let mut bucket: Vec<&Candle1m> = Vec::with_capacity(CANDLES_PER_WINDOW);
    let mut bucket_key: Option<i64> = None;

    for candle in candles_1m.iter().filter(|c| c.is_closed) {
        let key = candle.open_time_ms.div_euclid(Candle15m::WINDOW_MS);
        if bucket_key != Some(key) {
            emit_full_window(&bucket, bucket_key, &mut windows);
            bucket.clear();
            bucket_key = Some(key);
        }
        bucket.push(candle);
    }
    emit_full_window(&bucket, bucket_key, &mut windows);
    windows
}

fn emit_full_window(bucket: &[&Candle1m], key: Option<i64>, out: &mut Vec<Candle15m>) {
    let Some(key) = key else {
        return;
    };
    if bucket.len() != CANDLES_PER_WINDOW {
        return;
    }
    out.push(Candle15m {
        open_time_ms: key * Candle15m::WINDOW_MS,
        open: bucket[0].open,
        high: bucket.iter().map(|c| c.high).fold(f64::MIN, f64::max),
        low: bucket.iter().map(|c| c.low).fold(f64::MAX, f64::min),
        close: bucket[CANDLES_PER_WINDOW - 1].close,
    });
}

/// True range per window: `max(high-low, |high-prev.close|, |low-prev.close|)`.
/// Defined from the second window on.
fn true_ranges(candles: &[Candle15m]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let c = &pair[1];
            (c.high - c.low)
                .max((c.high - prev_close).abs())
                .max((c.low - prev_close).abs())
        })
        .collect()
}

/// ATR series with Wilder smoothing.
///
/// Seed is the mean of the first `period` true ranges; each later value is
/// `(prev * (period - 1) + tr) / period`. Requires at least `period + 1`
/// windows; empty otherwise.
pub fn atr_series(candles: &[Candle15m], period: usize) -> Vec<f64> {
    let trs = true_ranges(candles);
    if period == 0 || trs.len() < period {
        return Vec::new();
    }

    let mut atrs = Vec::with_capacity(trs.len() - period + 1);
    let mut atr: f64 = trs[..period].iter().sum::<f64>() / period as f64;
    atrs.push(atr);
    for tr in &trs[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        atrs.push(atr);
    }
    atrs
}

/// Baseline for spike detection: arithmetic mean of up to
/// `ATR_BASELINE_WINDOW` ATR values preceding the current one. With a
/// single value the baseline is that value itself.
pub fn atr_baseline(atr_values: &[f64]) -> Option<f64> {
    let (last, rest) = atr_values.split_last()?;
    let window = rest.len().min(ATR_BASELINE_WINDOW);
    if window == 0 {
        return Some(*last);
    }
    let tail = &rest[rest.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Z-score of the latest open-interest sample against the sliding window:
/// `(current - mean) / stddev`. Requires at least
/// `OI_ZSCORE_MIN_SAMPLES` samples and nonzero dispersion.
pub fn oi_zscore(history: &[OpenInterestSnapshot]) -> Option<f64> {
    if history.len() < OI_ZSCORE_MIN_SAMPLES {
        return None;
    }
    let n = history.len() as f64;
    let mean = history.iter().map(|s| s.oi_value).sum::<f64>() / n;
    let variance = history
        .iter()
        .map(|s| (s.oi_value - mean).powi(2))
        .sum::<f64>()
        / n;
    let stddev = variance.sqrt();
    if stddev == 0.0 {
        return None;
    }
    let current = history.last()?.oi_value;
    Some((current - mean) / stddev)
}

/// Percentage change of open interest over the last 15 minutes, using the
/// nearest sample that is at most 15 minutes old as the reference.
pub fn oi_delta_15m_pct(history: &[OpenInterestSnapshot], now_ms: i64) -> Option<f64> {
    let current = history.last()?;
    let reference = history
        .iter()
        .find(|s| now_ms - s.event_time_ms <= OI_DELTA_WINDOW_MS)?;
    if reference.event_time_ms >= current.event_time_ms {
        return None;
    }
    if reference.oi_value == 0.0 {
        return None;
    }
    Some((current.oi_value - reference.oi_value) / reference.oi_value)
}

/// Position size from stop distance:
/// `max_risk_usdt / (|entry - stop| / entry)`.
///
/// Undefined when the stop equals the entry or the result would not be a
/// positive finite number.
pub fn position_usdt(entry: f64, stop: f64, max_risk_usdt: f64) -> Option<f64> {
    if entry == 0.0 {
        return None;
    }
    let risk_ratio = (entry - stop).abs() / entry;
    if risk_ratio <= 0.0 {
        return None;
    }
    let size = max_risk_usdt / risk_ratio;
    (size.is_finite() && size > 0.0).then_some(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_1m(open_time_ms: i64, close: f64) -> Candle1m {
        Candle1m {
            open_time_ms,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1.0,
            close_time_ms: open_time_ms + Candle1m::WINDOW_MS - 1,
            is_closed: true,
        }
    }

    fn candle_15m(open_time_ms: i64, high: f64, low: f64, close: f64) -> Candle15m {
        Candle15m {
            open_time_ms,
            open: close,
            high,
            low,
            close,
        }
    }

    fn oi(event_time_ms: i64, value: f64) -> OpenInterestSnapshot {
        OpenInterestSnapshot {
            oi_value: value,
            event_time_ms,
        }
    }

    #[test]
    fn ret_5m_requires_six_closes() {
        assert!(ret_5m(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_none());
        let r = ret_5m(&[100.0, 1.0, 1.0, 1.0, 1.0, 101.5]).unwrap();
        assert!((r - 0.015).abs() < 1e-12);
    }

    #[test]
    fn ret_5m_uses_last_six() {
        let closes = [9.0, 9.0, 100.0, 1.0, 1.0, 1.0, 1.0, 102.0];
        let r = ret_5m(&closes).unwrap();
        assert!((r - 0.02).abs() < 1e-12);
    }

    #[test]
    fn ret_5m_zero_reference_is_absent() {
        assert!(ret_5m(&[0.0, 1.0, 1.0, 1.0, 1.0, 2.0]).is_none());
    }

    #[test]
    fn aggregate_15m_exact_windows_round_trip() {
        // Exactly two aligned windows of fifteen 1m candles.
        let candles: Vec<Candle1m> = (0..30)
            .map(|i| candle_1m(i * Candle1m::WINDOW_MS, 100.0 + i as f64))
            .collect();
        let windows = aggregate_15m(&candles);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].open_time_ms, 0);
        assert_eq!(windows[1].open_time_ms, Candle15m::WINDOW_MS);
        assert_eq!(windows[0].open, candles[0].open);
        assert_eq!(windows[0].close, candles[14].close);
        assert_eq!(windows[1].open, candles[15].open);
        assert_eq!(windows[1].close, candles[29].close);
        assert_eq!(windows[0].high, candles[14].high);
        assert_eq!(windows[0].low, candles[0].low);
    }

    #[test]
    fn aggregate_15m_drops_partial_windows() {
        // Starts 7 minutes into a window and ends 4 minutes into another:
        // only the interior full window survives.
        let candles: Vec<Candle1m> = (7..34)
            .map(|i| candle_1m(i * Candle1m::WINDOW_MS, 50.0))
            .collect();
        let windows = aggregate_15m(&candles);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].open_time_ms, Candle15m::WINDOW_MS);
    }

    #[test]
    fn aggregate_15m_ignores_unclosed_candles() {
        let mut candles: Vec<Candle1m> = (0..15)
            .map(|i| candle_1m(i * Candle1m::WINDOW_MS, 10.0))
            .collect();
        candles[14].is_closed = false;
        assert!(aggregate_15m(&candles).is_empty());
    }

    #[test]
    fn atr_requires_period_plus_one_windows() {
        let candles: Vec<Candle15m> = (0..14)
            .map(|i| candle_15m(i * Candle15m::WINDOW_MS, 101.0, 99.0, 100.0))
            .collect();
        assert!(atr_series(&candles, ATR_PERIOD).is_empty());
    }

    #[test]
    fn atr_constant_range_equals_range() {
        // Identical 2.0-point windows: every TR is 2.0, so ATR is 2.0.
        let candles: Vec<Candle15m> = (0..20)
            .map(|i| candle_15m(i * Candle15m::WINDOW_MS, 101.0, 99.0, 100.0))
            .collect();
        let atrs = atr_series(&candles, ATR_PERIOD);
        assert_eq!(atrs.len(), 20 - ATR_PERIOD);
        for atr in atrs {
            assert!((atr - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn atr_wilder_smoothing_dampens_spikes() {
        let mut candles: Vec<Candle15m> = (0..15)
            .map(|i| candle_15m(i * Candle15m::WINDOW_MS, 101.0, 99.0, 100.0))
            .collect();
        // A 10-point spike window after the seed.
        candles.push(candle_15m(15 * Candle15m::WINDOW_MS, 106.0, 96.0, 100.0));
        let atrs = atr_series(&candles, ATR_PERIOD);
        let last = *atrs.last().unwrap();
        // Wilder: (2.0 * 13 + 10.0) / 14 = 36/14
        assert!((last - 36.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn atr_baseline_excludes_current_value() {
        assert_eq!(atr_baseline(&[]), None);
        assert_eq!(atr_baseline(&[3.0]), Some(3.0));
        let baseline = atr_baseline(&[1.0, 2.0, 9.0]).unwrap();
        assert!((baseline - 1.5).abs() < 1e-12);
    }

    #[test]
    fn oi_zscore_needs_ten_samples() {
        let history: Vec<OpenInterestSnapshot> =
            (0..9).map(|i| oi(i * 1000, i as f64)).collect();
        assert!(oi_zscore(&history).is_none());
    }

    #[test]
    fn oi_zscore_flags_outlier() {
        let mut history: Vec<OpenInterestSnapshot> =
            (0..11).map(|i| oi(i * 1000, 100.0 + (i % 2) as f64)).collect();
        history.push(oi(12_000, 140.0));
        let z = oi_zscore(&history).unwrap();
        assert!(z > 2.0);
    }

    #[test]
    fn oi_zscore_zero_dispersion_is_absent() {
        let history: Vec<OpenInterestSnapshot> =
            (0..12).map(|i| oi(i * 1000, 100.0)).collect();
        assert!(oi_zscore(&history).is_none());
    }

    #[test]
    fn oi_delta_uses_nearest_sample_within_window() {
        let now_ms = 1_000_000_000;
        let history = vec![
            oi(now_ms - 20 * 60_000, 90.0),  // older than 15m: skipped
            oi(now_ms - 14 * 60_000, 100.0), // reference
            oi(now_ms - 7 * 60_000, 104.0),
            oi(now_ms, 110.0),
        ];
        let delta = oi_delta_15m_pct(&history, now_ms).unwrap();
        assert!((delta - 0.10).abs() < 1e-12);
    }

    #[test]
    fn oi_delta_absent_without_history_depth() {
        let now_ms = 1_000_000_000;
        assert!(oi_delta_15m_pct(&[], now_ms).is_none());
        // Single sample: reference would be the current sample itself.
        assert!(oi_delta_15m_pct(&[oi(now_ms, 100.0)], now_ms).is_none());
    }

    #[test]
    fn position_sizing_matches_risk_budget() {
        // 1.2% stop distance on entry 100 with 10 USDT risk.
        let size = position_usdt(100.0, 98.8, 10.0).unwrap();
        assert!((size - 10.0 / 0.012).abs() < 1e-9);
    }

    #[test]
    fn position_sizing_undefined_at_zero_distance() {
        assert!(position_usdt(100.0, 100.0, 10.0).is_none());
        assert!(position_usdt(0.0, 1.0, 10.0).is_none());
    }
}
