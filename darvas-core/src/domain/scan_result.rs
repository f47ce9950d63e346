//! ScanResult: one symbol's classification for one run.

use super::status::{AlertTier, ScanStatus};
use serde::{Deserialize, Serialize};

/// Output of the classifier for a single symbol.
///
/// Box-derived fields are `None` when the status is BOX FORMING. Results are
/// never mutated after the classifier returns them; the run report carries
/// any extra bookkeeping (such as upgrade flags) alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub status: ScanStatus,
    pub tier: Option<AlertTier>,
    pub close: f64,
    pub box_ceiling: Option<f64>,
    pub box_floor: Option<f64>,
    pub box_width_pct: Option<f64>,
    pub dist_to_ceil_pct: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub risk_pct: Option<f64>,
    pub reward_risk_ratio: Option<f64>,
    pub volume_ratio: f64,
    pub days_in_box: Option<i64>,
    pub ceil_confirm_count: u32,
    pub floor_confirm_count: u32,
    /// Weeks until a box could confirm; only set for BOX FORMING.
    pub weeks_to_confirm: Option<u32>,
}

impl ScanResult {
    /// True when the result carries a confirmed box.
    pub fn has_box(&self) -> bool {
        self.box_ceiling.is_some() && self.box_floor.is_some()
    }

    /// Distance to ceiling, with boxless results sorted last.
    pub fn distance_or_max(&self) -> f64 {
        self.dist_to_ceil_pct.unwrap_or(f64::MAX)
    }
}
