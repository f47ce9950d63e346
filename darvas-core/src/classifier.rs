//! Signal classifier: combines the weekly box with daily volatility and
//! volume into a status and urgency tier.
//!
//! Status priority, evaluated in order:
//! 1. no confirmed box → BOX FORMING
//! 2. box wider than `max_box_width_pct` → excluded
//! 3. breakout (close beyond ceiling + ATR margin) with volume, and the
//!    previous close still inside the box → FRESH BREAKOUT
//! 4. breakout with volume but already through on the previous close → WATCHING
//! 5. close within `proximity_pct` below the ceiling → APPROACHING
//! 6. anything else → WATCHING

use crate::box_detector::{detect_box, BoxConfig, BoxDetection, BoxError};
use crate::domain::{resample_weekly, AlertTier, Bar, ScanResult, ScanStatus};
use crate::indicators::{latest_atr, volume_ratio, AtrSmoothing};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub atr_period: usize,
    pub atr_smoothing: AtrSmoothing,
    /// Breakout margin above the ceiling, in ATRs.
    pub atr_breakout_multiple: f64,
    pub volume_lookback: usize,
    pub volume_surge_multiple: f64,
    pub require_volume_for_breakout: bool,
    pub stop_buffer_pct: f64,
    pub max_box_width_pct: f64,
    pub proximity_pct: f64,
    pub hot_distance_pct: f64,
    pub hot_volume_multiple: f64,
    pub warm_distance_pct: f64,
    pub warm_volume_multiple: f64,
    pub min_daily_bars: usize,
    pub weekly_anchor: Weekday,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_smoothing: AtrSmoothing::Span,
            atr_breakout_multiple: 0.1,
            volume_lookback: 20,
            volume_surge_multiple: 1.5,
            require_volume_for_breakout: true,
            stop_buffer_pct: 0.5,
            max_box_width_pct: 25.0,
            proximity_pct: 5.0,
            hot_distance_pct: 3.0,
            hot_volume_multiple: 1.5,
            warm_distance_pct: 5.0,
            warm_volume_multiple: 1.0,
            min_daily_bars: 60,
            weekly_anchor: Weekday::Fri,
        }
    }
}

/// Outcome of classifying one symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Classified(ScanResult),
    /// Box confirmed but too wide to trade; not reported.
    Excluded { box_width_pct: f64 },
    InsufficientHistory { have: usize, need: usize },
}

/// The numeric inputs of a classification, already reduced from bars.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalInputs {
    pub symbol: String,
    pub close: f64,
    pub prev_close: f64,
    pub atr: f64,
    pub volume_ratio: f64,
    pub detection: BoxDetection,
    pub box_config: BoxConfig,
    /// Date of the last daily bar.
    pub as_of: NaiveDate,
}

/// Classify a symbol from its daily history.
pub fn classify(
    symbol: &str,
    daily: &[Bar],
    config: &ClassifierConfig,
    box_config: &BoxConfig,
) -> Classification {
    if daily.len() < config.min_daily_bars.max(2) {
        return Classification::InsufficientHistory {
            have: daily.len(),
            need: config.min_daily_bars.max(2),
        };
    }

    let weekly = resample_weekly(daily, config.weekly_anchor);
    let detection = match detect_box(&weekly, box_config) {
        Ok(d) => d,
        Err(BoxError::InsufficientHistory { have, need }) => {
            return Classification::InsufficientHistory { have, need }
        }
    };

    let last = &daily[daily.len() - 1];
    let prev = &daily[daily.len() - 2];

    let inputs = SignalInputs {
        symbol: symbol.to_string(),
        close: last.close,
        prev_close: prev.close,
        atr: latest_atr(daily, config.atr_period, config.atr_smoothing).unwrap_or(0.0),
        volume_ratio: volume_ratio(daily, config.volume_lookback),
        detection,
        box_config: *box_config,
        as_of: last.date,
    };

    assess_signal(&inputs, config)
}

/// Assign status, tier and risk figures from reduced inputs.
pub fn assess_signal(inputs: &SignalInputs, config: &ClassifierConfig) -> Classification {
    let detection = &inputs.detection;
    let vr = inputs.volume_ratio;

    let Some(b) = detection.current_box else {
        let weeks_to_confirm = inputs
            .box_config
            .ceil_bars
            .saturating_sub(detection.ceil_count())
            .min(
                inputs
                    .box_config
                    .floor_bars
                    .saturating_sub(detection.floor_count()),
            );
        return Classification::Classified(ScanResult {
            symbol: inputs.symbol.clone(),
            status: ScanStatus::BoxForming,
            tier: None,
            close: inputs.close,
            box_ceiling: None,
            box_floor: None,
            box_width_pct: None,
            dist_to_ceil_pct: None,
            stop_loss: None,
            target: None,
            risk_pct: None,
            reward_risk_ratio: None,
            volume_ratio: vr,
            days_in_box: None,
            ceil_confirm_count: detection.ceil_count(),
            floor_confirm_count: detection.floor_count(),
            weeks_to_confirm: Some(weeks_to_confirm),
        });
    };

    let width = b.width_pct();
    if width > config.max_box_width_pct {
        return Classification::Excluded {
            box_width_pct: width,
        };
    }

    let close = inputs.close;
    let stop_loss = b.floor * (1.0 - config.stop_buffer_pct / 100.0);
    let target = b.target();
    let dist = (b.ceiling - close) / close * 100.0;

    let breakout_raw = close > b.ceiling + inputs.atr * config.atr_breakout_multiple;
    let volume_ok = !config.require_volume_for_breakout || vr >= config.volume_surge_multiple;

    let status = if breakout_raw && volume_ok {
        if inputs.prev_close <= b.ceiling {
            ScanStatus::FreshBreakout
        } else {
            ScanStatus::Watching
        }
    } else if (0.0..=config.proximity_pct).contains(&dist) {
        ScanStatus::Approaching
    } else {
        ScanStatus::Watching
    };

    let risk_pct = (close - stop_loss) / close * 100.0;
    let reward_pct = (target - close) / close * 100.0;
    let reward_risk_ratio = (risk_pct > 0.0).then(|| reward_pct / risk_pct);

    Classification::Classified(ScanResult {
        symbol: inputs.symbol.clone(),
        status,
        tier: assign_tier(status, dist, vr, config),
        close,
        box_ceiling: Some(b.ceiling),
        box_floor: Some(b.floor),
        box_width_pct: Some(width),
        dist_to_ceil_pct: Some(dist),
        stop_loss: Some(stop_loss),
        target: Some(target),
        risk_pct: Some(risk_pct),
        reward_risk_ratio,
        volume_ratio: vr,
        days_in_box: Some((inputs.as_of - b.confirmed_at).num_days()),
        ceil_confirm_count: detection.ceil_count(),
        floor_confirm_count: detection.floor_count(),
        weeks_to_confirm: None,
    })
}

fn assign_tier(
    status: ScanStatus,
    dist: f64,
    vr: f64,
    config: &ClassifierConfig,
) -> Option<AlertTier> {
    match status {
        ScanStatus::Approaching => {
            if dist <= config.hot_distance_pct && vr >= config.hot_volume_multiple {
                Some(AlertTier::Hot)
            } else if dist <= config.warm_distance_pct && vr >= config.warm_volume_multiple {
                Some(AlertTier::Warm)
            } else {
                Some(AlertTier::Watch)
            }
        }
        ScanStatus::Watching if vr >= config.hot_volume_multiple * 1.5 => Some(AlertTier::VolSurge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_detector::{DarvasBox, PendingLevel};

    fn inputs(close: f64, prev_close: f64, atr: f64, vr: f64) -> SignalInputs {
        SignalInputs {
            symbol: "TEST".into(),
            close,
            prev_close,
            atr,
            volume_ratio: vr,
            detection: BoxDetection {
                current_box: Some(DarvasBox {
                    ceiling: 100.0,
                    floor: 90.0,
                    confirmed_at: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                }),
                ceiling: Some(PendingLevel {
                    level: 99.0,
                    count: 1,
                }),
                floor: Some(PendingLevel {
                    level: 95.0,
                    count: 2,
                }),
                confirmations: 1,
            },
            box_config: BoxConfig::default(),
            as_of: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
        }
    }

    fn classified(c: Classification) -> ScanResult {
        match c {
            Classification::Classified(r) => r,
            other => panic!("expected classified, got {other:?}"),
        }
    }

    #[test]
    fn approaching_hot() {
        let r = classified(assess_signal(
            &inputs(99.0, 89.0, 0.5, 2.0),
            &ClassifierConfig::default(),
        ));
        assert_eq!(r.status, ScanStatus::Approaching);
        assert_eq!(r.tier, Some(AlertTier::Hot));
        assert_eq!(r.days_in_box, Some(14));
        assert!((r.dist_to_ceil_pct.unwrap() - 100.0 / 99.0).abs() < 1e-9);
    }

    #[test]
    fn fresh_breakout_needs_prev_close_inside() {
        let config = ClassifierConfig::default();
        let r = classified(assess_signal(&inputs(101.0, 99.0, 0.5, 2.0), &config));
        assert_eq!(r.status, ScanStatus::FreshBreakout);
        assert_eq!(r.tier, None);

        let r = classified(assess_signal(&inputs(101.0, 100.5, 0.5, 2.5), &config));
        assert_eq!(r.status, ScanStatus::Watching);
        assert_eq!(r.tier, Some(AlertTier::VolSurge));
    }

    #[test]
    fn breakout_without_volume_is_watching() {
        let r = classified(assess_signal(
            &inputs(101.0, 99.0, 0.5, 1.0),
            &ClassifierConfig::default(),
        ));
        assert_eq!(r.status, ScanStatus::Watching);
        assert_eq!(r.tier, None);
    }

    #[test]
    fn volume_requirement_can_be_disabled() {
        let config = ClassifierConfig {
            require_volume_for_breakout: false,
            ..ClassifierConfig::default()
        };
        let r = classified(assess_signal(&inputs(101.0, 99.0, 0.5, 0.3), &config));
        assert_eq!(r.status, ScanStatus::FreshBreakout);
    }

    #[test]
    fn atr_margin_blocks_marginal_breakout() {
        // ceiling + 5 * 0.1 = 100.5
        let r = classified(assess_signal(
            &inputs(100.3, 99.0, 5.0, 3.0),
            &ClassifierConfig::default(),
        ));
        assert_ne!(r.status, ScanStatus::FreshBreakout);
    }

    #[test]
    fn warm_and_watch_tiers() {
        let config = ClassifierConfig::default();
        // dist ≈ 4.17%, vr 1.2 → WARM
        let r = classified(assess_signal(&inputs(96.0, 95.0, 0.5, 1.2), &config));
        assert_eq!(r.tier, Some(AlertTier::Warm));
        // dist ≈ 1%, vr 0.5 → WATCH
        let r = classified(assess_signal(&inputs(99.0, 98.0, 0.5, 0.5), &config));
        assert_eq!(r.tier, Some(AlertTier::Watch));
    }

    #[test]
    fn far_below_ceiling_is_watching() {
        let r = classified(assess_signal(
            &inputs(92.0, 92.0, 0.5, 1.0),
            &ClassifierConfig::default(),
        ));
        assert_eq!(r.status, ScanStatus::Watching);
        assert_eq!(r.tier, None);
    }

    #[test]
    fn stop_target_and_risk() {
        let r = classified(assess_signal(
            &inputs(99.0, 89.0, 0.5, 2.0),
            &ClassifierConfig::default(),
        ));
        let stop = 90.0 * 0.995;
        assert!((r.stop_loss.unwrap() - stop).abs() < 1e-9);
        assert_eq!(r.target, Some(110.0));
        let risk = (99.0 - stop) / 99.0 * 100.0;
        let reward = 11.0 / 99.0 * 100.0;
        assert!((r.risk_pct.unwrap() - risk).abs() < 1e-9);
        assert!((r.reward_risk_ratio.unwrap() - reward / risk).abs() < 1e-9);
    }

    #[test]
    fn wide_box_is_excluded() {
        let mut i = inputs(99.0, 89.0, 0.5, 2.0);
        if let Some(b) = i.detection.current_box.as_mut() {
            b.floor = 70.0;
        }
        match assess_signal(&i, &ClassifierConfig::default()) {
            Classification::Excluded { box_width_pct } => {
                assert!((box_width_pct - 30.0 / 70.0 * 100.0).abs() < 1e-9)
            }
            other => panic!("expected exclusion, got {other:?}"),
        }
    }

    #[test]
    fn box_forming_reports_weeks_to_confirm() {
        let mut i = inputs(99.0, 89.0, 0.5, 2.0);
        i.detection.current_box = None;
        let r = classified(assess_signal(&i, &ClassifierConfig::default()));
        assert_eq!(r.status, ScanStatus::BoxForming);
        assert!(!r.has_box());
        // min(3 - 1, 3 - 2)
        assert_eq!(r.weeks_to_confirm, Some(1));
        assert_eq!(r.stop_loss, None);
    }

    #[test]
    fn short_daily_history() {
        let c = classify(
            "TEST",
            &[],
            &ClassifierConfig::default(),
            &BoxConfig::default(),
        );
        assert_eq!(
            c,
            Classification::InsufficientHistory { have: 0, need: 60 }
        );
    }
}
