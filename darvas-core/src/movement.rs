//! Scan-to-scan movement alerts.
//!
//! Compares the latest scan with the previous one and reports symbols that
//! moved toward a breakout.

use crate::domain::{tier_rank, ScanResult, ScanStatus, Symbol};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Minimum drop in distance-to-ceiling (percentage points) for a CLOSER alert.
pub const CLOSER_THRESHOLD_PCT: f64 = 1.5;
/// Minimum volume ratio for a VOL_SURGE alert.
pub const VOL_SURGE_RATIO: f64 = 2.0;
/// Required growth of the volume ratio over the previous scan.
pub const VOL_SURGE_GROWTH: f64 = 1.5;

/// Alert kinds in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    StatusUp,
    TierUp,
    Closer,
    VolSurge,
    NewEntry,
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MovementKind::StatusUp => "STATUS_UP",
            MovementKind::TierUp => "TIER_UP",
            MovementKind::Closer => "CLOSER",
            MovementKind::VolSurge => "VOL_SURGE",
            MovementKind::NewEntry => "NEW_ENTRY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovementAlert {
    pub symbol: Symbol,
    pub kind: MovementKind,
    pub detail: String,
}

fn fmt_opt(v: Option<f64>, suffix: &str) -> String {
    v.map(|x| format!("{x:.2}{suffix}"))
        .unwrap_or_else(|| "-".to_string())
}

/// Alerts for every symbol that advanced between `previous` and `latest`,
/// sorted by kind priority (symbol order within a kind follows `latest`).
pub fn compute_movements(latest: &[ScanResult], previous: &[ScanResult]) -> Vec<MovementAlert> {
    let prev_map: HashMap<&str, &ScanResult> =
        previous.iter().map(|r| (r.symbol.as_str(), r)).collect();
    let mut alerts = Vec::new();

    for curr in latest {
        let summary = format!(
            "dist={} vol={:.2}x rr={}",
            fmt_opt(curr.dist_to_ceil_pct, "%"),
            curr.volume_ratio,
            fmt_opt(curr.reward_risk_ratio, "")
        );

        let Some(prev) = prev_map.get(curr.symbol.as_str()) else {
            if matches!(curr.status, ScanStatus::Approaching | ScanStatus::FreshBreakout) {
                alerts.push(MovementAlert {
                    symbol: curr.symbol.clone(),
                    kind: MovementKind::NewEntry,
                    detail: format!("new entry into {}; {summary}", curr.status),
                });
            }
            continue;
        };

        if curr.status.is_upgrade_from(prev.status) {
            alerts.push(MovementAlert {
                symbol: curr.symbol.clone(),
                kind: MovementKind::StatusUp,
                detail: format!("{} -> {}; {summary}", prev.status, curr.status),
            });
            continue;
        }

        let both_approaching =
            curr.status == ScanStatus::Approaching && prev.status == ScanStatus::Approaching;

        if both_approaching && tier_rank(curr.tier) < tier_rank(prev.tier) {
            alerts.push(MovementAlert {
                symbol: curr.symbol.clone(),
                kind: MovementKind::TierUp,
                detail: format!(
                    "tier {} -> {}; {summary}",
                    prev.tier.map_or("none", |t| t.as_str()),
                    curr.tier.map_or("none", |t| t.as_str())
                ),
            });
        }

        if both_approaching {
            if let (Some(now), Some(was)) = (curr.dist_to_ceil_pct, prev.dist_to_ceil_pct) {
                let improvement = was - now;
                if improvement >= CLOSER_THRESHOLD_PCT {
                    alerts.push(MovementAlert {
                        symbol: curr.symbol.clone(),
                        kind: MovementKind::Closer,
                        detail: format!("{improvement:.1}% closer to ceiling (was {was:.2}%, now {now:.2}%)"),
                    });
                }
            }
        }

        if curr.status == ScanStatus::Approaching
            && curr.volume_ratio >= VOL_SURGE_RATIO
            && curr.volume_ratio > prev.volume_ratio * VOL_SURGE_GROWTH
        {
            alerts.push(MovementAlert {
                symbol: curr.symbol.clone(),
                kind: MovementKind::VolSurge,
                detail: format!(
                    "volume {:.2}x (prev {:.2}x)",
                    curr.volume_ratio, prev.volume_ratio
                ),
            });
        }
    }

    // stable: keeps latest-scan order within a kind
    alerts.sort_by_key(|a| a.kind);
    alerts
}
