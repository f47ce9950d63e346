//! Simple Moving Average (SMA) and the volume ratio built on it.
//!
//! Rolling mean over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use crate::domain::Bar;

/// Rolling mean of `values` over `period`; NaN until the window is full or
/// while a NaN sits inside the window.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }
    }
    if nan_count == 0 {
        result[period - 1] = sum / period as f64;
    }

    for i in period..n {
        let leaving = values[i - period];
        let entering = values[i];
        if leaving.is_nan() {
            nan_count -= 1;
        } else {
            sum -= leaving;
        }
        if entering.is_nan() {
            nan_count += 1;
        } else {
            sum += entering;
        }
        if nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

/// SMA of bar volume.
pub fn volume_sma(bars: &[Bar], period: usize) -> Vec<f64> {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
    rolling_mean(&volumes, period)
}

/// Last bar's volume divided by the `lookback`-bar average volume
/// (window includes the last bar).
///
/// Returns 0.0 when the average is zero or undefined.
pub fn volume_ratio(bars: &[Bar], lookback: usize) -> f64 {
    let Some(last) = bars.last() else {
        return 0.0;
    };
    let avg = volume_sma(bars, lookback)
        .last()
        .copied()
        .unwrap_or(f64::NAN);
    if avg.is_nan() || avg <= 0.0 {
        return 0.0;
    }
    last.volume as f64 / avg
}
