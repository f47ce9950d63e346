//! Darvas box detector: the ceiling/floor confirmation state machine.
//!
//! Runs over weekly bars. Two pending levels are tracked independently: the
//! ceiling follows highs and the floor follows lows. Each step looks at the
//! previous bar. A level that holds (high not above the pending ceiling, low
//! not below the pending floor) gains one confirmation; a level that breaks is
//! replaced and its counter restarts at zero.
//!
//! A box confirms only when both counters reach their thresholds on the same
//! bar. Confirmation records the pending levels with the current bar's date,
//! then reseeds both levels from the current bar and keeps scanning, so the
//! latest confirmation wins.

use crate::domain::Bar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Confirmation thresholds, in weekly bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxConfig {
    pub ceil_bars: u32,
    pub floor_bars: u32,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            ceil_bars: 3,
            floor_bars: 3,
        }
    }
}

impl BoxConfig {
    /// Fewest weekly bars the detector will accept.
    pub fn min_bars(&self) -> usize {
        self.ceil_bars as usize + self.floor_bars as usize + 2
    }
}

/// A candidate ceiling or floor with its confirmation counter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingLevel {
    pub level: f64,
    pub count: u32,
}

impl PendingLevel {
    fn seed(level: f64) -> Self {
        Self { level, count: 0 }
    }
}

/// A confirmed trading range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DarvasBox {
    pub ceiling: f64,
    pub floor: f64,
    /// Date of the weekly bar on which both levels confirmed.
    pub confirmed_at: NaiveDate,
}

impl DarvasBox {
    /// Box height as a percentage of the floor.
    pub fn width_pct(&self) -> f64 {
        (self.ceiling - self.floor) / self.floor * 100.0
    }

    /// Measured-move target: ceiling plus one box height.
    pub fn target(&self) -> f64 {
        self.ceiling + (self.ceiling - self.floor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoxError {
    #[error("insufficient history: have {have} weekly bars, need {need}")]
    InsufficientHistory { have: usize, need: usize },
}

/// Result of running the detector over a full weekly series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxDetection {
    /// The most recent confirmed box, if any.
    pub current_box: Option<DarvasBox>,
    pub ceiling: Option<PendingLevel>,
    pub floor: Option<PendingLevel>,
    /// Number of confirmations seen over the series.
    pub confirmations: usize,
}

impl BoxDetection {
    pub fn ceil_count(&self) -> u32 {
        self.ceiling.map_or(0, |p| p.count)
    }

    pub fn floor_count(&self) -> u32 {
        self.floor.map_or(0, |p| p.count)
    }
}

/// Step-wise box state machine. Feed weekly bars in date order with [`push`].
///
/// [`push`]: BoxTracker::push
#[derive(Debug, Clone)]
pub struct BoxTracker {
    config: BoxConfig,
    ceiling: Option<PendingLevel>,
    floor: Option<PendingLevel>,
    prev: Option<(f64, f64)>,
    current_box: Option<DarvasBox>,
    confirmations: usize,
}

impl BoxTracker {
    pub fn new(config: BoxConfig) -> Self {
        Self {
            config,
            ceiling: None,
            floor: None,
            prev: None,
            current_box: None,
            confirmations: 0,
        }
    }

    /// Advance one bar. Returns the box confirmed on this bar, if any.
    ///
    /// Void bars are ignored.
    pub fn push(&mut self, bar: &Bar) -> Option<DarvasBox> {
        if bar.is_void() {
            return None;
        }

        let Some((prev_high, prev_low)) = self.prev.replace((bar.high, bar.low)) else {
            return None;
        };

        self.ceiling = Some(match self.ceiling {
            None => PendingLevel::seed(prev_high),
            Some(p) if prev_high <= p.level => PendingLevel {
                level: p.level,
                count: p.count + 1,
            },
            Some(_) => PendingLevel::seed(prev_high),
        });

        self.floor = Some(match self.floor {
            None => PendingLevel::seed(prev_low),
            Some(p) if prev_low >= p.level => PendingLevel {
                level: p.level,
                count: p.count + 1,
            },
            Some(_) => PendingLevel::seed(prev_low),
        });

        let (ceiling, floor) = match (self.ceiling, self.floor) {
            (Some(c), Some(f)) => (c, f),
            _ => return None,
        };

        if ceiling.count >= self.config.ceil_bars && floor.count >= self.config.floor_bars {
            let confirmed = DarvasBox {
                ceiling: ceiling.level,
                floor: floor.level,
                confirmed_at: bar.date,
            };
            self.current_box = Some(confirmed);
            self.confirmations += 1;
            self.ceiling = Some(PendingLevel::seed(bar.high));
            self.floor = Some(PendingLevel::seed(bar.low));
            return Some(confirmed);
        }

        None
    }

    pub fn current_box(&self) -> Option<DarvasBox> {
        self.current_box
    }

    pub fn pending_ceiling(&self) -> Option<PendingLevel> {
        self.ceiling
    }

    pub fn pending_floor(&self) -> Option<PendingLevel> {
        self.floor
    }

    pub fn finish(self) -> BoxDetection {
        BoxDetection {
            current_box: self.current_box,
            ceiling: self.ceiling,
            floor: self.floor,
            confirmations: self.confirmations,
        }
    }
}

/// Run the detector over a weekly series.
///
/// Series shorter than `ceil_bars + floor_bars + 2` are rejected without
/// running the state machine.
pub fn detect_box(weekly: &[Bar], config: &BoxConfig) -> Result<BoxDetection, BoxError> {
    let need = config.min_bars();
    if weekly.len() < need {
        return Err(BoxError::InsufficientHistory {
            have: weekly.len(),
            need,
        });
    }

    let mut tracker = BoxTracker::new(*config);
    for bar in weekly {
        tracker.push(bar);
    }
    Ok(tracker.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn weekly(highs: &[f64], lows: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        highs
            .iter()
            .zip(lows)
            .enumerate()
            .map(|(i, (&h, &l))| Bar {
                symbol: "TEST".into(),
                date: start + Duration::weeks(i as i64),
                open: (h + l) / 2.0,
                high: h,
                low: l,
                close: (h + l) / 2.0,
                volume: 10_000,
            })
            .collect()
    }

    #[test]
    fn first_confirmation_on_flat_range() {
        let bars = weekly(
            &[10.0, 10.0, 10.0, 10.0, 9.0, 9.0, 9.0, 9.0],
            &[5.0, 5.0, 5.0, 5.0, 4.0, 4.0, 4.0, 4.0],
        );
        let mut tracker = BoxTracker::new(BoxConfig::default());
        let mut first = None;
        for (i, bar) in bars.iter().enumerate() {
            if let Some(b) = tracker.push(bar) {
                first = Some((i, b));
                break;
            }
        }
        let (index, b) = first.expect("box should confirm");
        assert_eq!(index, 4);
        assert_eq!(b.ceiling, 10.0);
        assert_eq!(b.floor, 5.0);
        assert_eq!(b.confirmed_at, bars[4].date);
    }

    #[test]
    fn later_confirmation_replaces_earlier() {
        let bars = weekly(
            &[10.0, 10.0, 10.0, 10.0, 9.0, 9.0, 9.0, 9.0],
            &[5.0, 5.0, 5.0, 5.0, 4.0, 4.0, 4.0, 4.0],
        );
        let detection = detect_box(&bars, &BoxConfig::default()).unwrap();
        let b = detection.current_box.unwrap();
        assert_eq!(detection.confirmations, 2);
        assert_eq!(b.ceiling, 9.0);
        assert_eq!(b.floor, 4.0);
        assert_eq!(b.confirmed_at, bars[7].date);
        assert_eq!(detection.ceil_count(), 0);
        assert_eq!(detection.floor_count(), 0);
    }

    #[test]
    fn short_series_is_rejected() {
        let bars = weekly(&[10.0; 7], &[5.0; 7]);
        let err = detect_box(&bars, &BoxConfig::default()).unwrap_err();
        assert_eq!(err, BoxError::InsufficientHistory { have: 7, need: 8 });
    }

    #[test]
    fn ceiling_alone_never_confirms() {
        // Highs hold flat while lows keep falling: floor never confirms.
        let highs = [10.0; 10];
        let lows = [9.0, 8.5, 8.0, 7.5, 7.0, 6.5, 6.0, 5.5, 5.0, 4.5];
        let detection = detect_box(&weekly(&highs, &lows), &BoxConfig::default()).unwrap();
        assert!(detection.current_box.is_none());
        assert!(detection.ceil_count() >= 3);
        assert_eq!(detection.floor_count(), 0);
    }

    #[test]
    fn rising_highs_keep_reseeding_ceiling() {
        let highs = [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0];
        let lows = [5.0; 8];
        let detection = detect_box(&weekly(&highs, &lows), &BoxConfig::default()).unwrap();
        assert!(detection.current_box.is_none());
        assert_eq!(detection.ceiling.unwrap().level, 16.0);
        assert_eq!(detection.ceil_count(), 0);
        assert_eq!(detection.floor_count(), 6);
    }

    #[test]
    fn asymmetric_thresholds() {
        let config = BoxConfig {
            ceil_bars: 2,
            floor_bars: 4,
        };
        let bars = weekly(&[10.0; 8], &[5.0; 8]);
        let mut tracker = BoxTracker::new(config);
        let hit: Vec<usize> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, b)| tracker.push(b).map(|_| i))
            .collect();
        // floor needs 4 confirmations: seeded at 1, count 4 at index 5
        assert_eq!(hit.first(), Some(&5));
    }

    #[test]
    fn box_geometry() {
        let b = DarvasBox {
            ceiling: 110.0,
            floor: 100.0,
            confirmed_at: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert!((b.width_pct() - 10.0).abs() < 1e-12);
        assert_eq!(b.target(), 120.0);
    }
}
