//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Two smoothings are available:
//! - `Span`: exponential with alpha = 2/(period+1), seeded with the first TR.
//! - `Wilder`: alpha = 1/period, seeded with the mean of the first `period` TRs.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// Smoothing applied to the true range series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtrSmoothing {
    #[default]
    Span,
    Wilder,
}

/// Compute the True Range series from bars.
/// TR[0] = high[0] - low[0] (no previous close).
/// TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];

    if n == 0 {
        return tr;
    }

    let h = bars[0].high;
    let l = bars[0].low;
    if !(h.is_nan() || l.is_nan()) {
        tr[0] = h - l;
    }

    for i in 1..n {
        let h = bars[i].high;
        let l = bars[i].low;
        let pc = bars[i - 1].close;
        if h.is_nan() || l.is_nan() || pc.is_nan() {
            tr[i] = f64::NAN;
        } else {
            tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
        }
    }

    tr
}

/// Exponential smoothing with alpha = 2/(span+1), seeded with the first value.
///
/// NaN inputs are skipped: the previous smoothed value carries forward and the
/// output at that index is NaN.
pub fn span_smooth(values: &[f64], span: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if span == 0 {
        return result;
    }

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev: Option<f64> = None;

    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let smoothed = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        result[i] = smoothed;
        prev = Some(smoothed);
    }

    result
}

/// Apply Wilder smoothing to a series. Alpha = 1/period.
/// Seed: mean of the first `period` consecutive valid values.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let seed_start = (0..=n - period).find(|&i| values[i..i + period].iter().all(|v| !v.is_nan()));

    let seed_start = match seed_start {
        Some(s) => s,
        None => return result,
    };

    let seed_end = seed_start + period;
    let seed: f64 = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;

    for i in seed_end..n {
        if values[i].is_nan() {
            for val in result.iter_mut().skip(i) {
                *val = f64::NAN;
            }
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

/// ATR series for `bars` using the chosen smoothing.
pub fn atr(bars: &[Bar], period: usize, smoothing: AtrSmoothing) -> Vec<f64> {
    let mut tr = true_range(bars);
    match smoothing {
        AtrSmoothing::Span => span_smooth(&tr, period),
        AtrSmoothing::Wilder => {
            // TR[0] is not a proper true range; start the Wilder seed at TR[1].
            if !tr.is_empty() {
                tr[0] = f64::NAN;
            }
            wilder_smooth(&tr, period)
        }
    }
}

/// Latest finite ATR value, if any.
pub fn latest_atr(bars: &[Bar], period: usize, smoothing: AtrSmoothing) -> Option<f64> {
    atr(bars, period, smoothing)
        .into_iter()
        .rev()
        .find(|v| v.is_finite())
}
