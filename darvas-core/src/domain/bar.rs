//! Bar: the fundamental market data unit, plus weekly resampling.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single symbol over one period (a trading day or a week).
///
/// Weekly bars carry the date of the period end (the anchor weekday), not the
/// date of the last trading session inside the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// Date of the period end that `date` falls into, for weeks ending on `anchor`.
///
/// A date that is itself the anchor weekday closes its own period.
pub fn period_end(date: NaiveDate, anchor: Weekday) -> NaiveDate {
    let today = date.weekday().num_days_from_monday() as i64;
    let target = anchor.num_days_from_monday() as i64;
    let ahead = (target - today).rem_euclid(7);
    date + Duration::days(ahead)
}

/// Aggregate daily bars into weekly bars ending on `anchor`.
///
/// Each week takes the first open, max high, min low, last close and summed
/// volume of the daily bars inside it. Input must be sorted by date; void
/// bars are skipped so a holiday row does not poison the whole week.
pub fn resample_weekly(daily: &[Bar], anchor: Weekday) -> Vec<Bar> {
    let mut weeks: Vec<Bar> = Vec::new();

    for bar in daily.iter().filter(|b| !b.is_void()) {
        let end = period_end(bar.date, anchor);
        match weeks.last_mut() {
            Some(week) if week.date == end => {
                week.high = week.high.max(bar.high);
                week.low = week.low.min(bar.low);
                week.close = bar.close;
                week.volume += bar.volume;
            }
            _ => weeks.push(Bar {
                symbol: bar.symbol.clone(),
                date: end,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }

    weeks
}
