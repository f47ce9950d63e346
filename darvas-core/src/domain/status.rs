//! Classification vocabulary: scan status and urgency tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Trade-readiness state assigned to a symbol by the classifier.
///
/// Persisted with the spaced spelling (`FRESH BREAKOUT`, `BOX FORMING`) so
/// scan artifacts stay readable in a spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanStatus {
    #[serde(rename = "FRESH BREAKOUT")]
    FreshBreakout,
    #[serde(rename = "APPROACHING")]
    Approaching,
    #[serde(rename = "WATCHING")]
    Watching,
    #[serde(rename = "BOX FORMING")]
    BoxForming,
}

impl ScanStatus {
    /// Severity rank: lower is more advanced.
    ///
    /// `FRESH BREAKOUT < APPROACHING < WATCHING < BOX FORMING`
    pub fn severity(self) -> u8 {
        match self {
            ScanStatus::FreshBreakout => 0,
            ScanStatus::Approaching => 1,
            ScanStatus::Watching => 2,
            ScanStatus::BoxForming => 3,
        }
    }

    /// True when `self` is strictly more advanced than `other`.
    pub fn is_upgrade_from(self, other: ScanStatus) -> bool {
        self.severity() < other.severity()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::FreshBreakout => "FRESH BREAKOUT",
            ScanStatus::Approaching => "APPROACHING",
            ScanStatus::Watching => "WATCHING",
            ScanStatus::BoxForming => "BOX FORMING",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown value '{0}'")]
pub struct ParseLabelError(pub String);

impl FromStr for ScanStatus {
    type Err = ParseLabelError;

    /// Accepts both the spaced and the underscored spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "FRESH BREAKOUT" => Ok(ScanStatus::FreshBreakout),
            "APPROACHING" => Ok(ScanStatus::Approaching),
            "WATCHING" => Ok(ScanStatus::Watching),
            "BOX FORMING" => Ok(ScanStatus::BoxForming),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

/// Urgency tier for APPROACHING / WATCHING symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertTier {
    #[serde(rename = "HOT")]
    Hot,
    #[serde(rename = "WARM")]
    Warm,
    #[serde(rename = "WATCH")]
    Watch,
    #[serde(rename = "VOL-SURGE")]
    VolSurge,
}

impl AlertTier {
    /// Rank used when sorting or comparing tiers; VOL-SURGE sits level with WARM.
    pub fn rank(self) -> u8 {
        match self {
            AlertTier::Hot => 0,
            AlertTier::Warm | AlertTier::VolSurge => 1,
            AlertTier::Watch => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertTier::Hot => "HOT",
            AlertTier::Warm => "WARM",
            AlertTier::Watch => "WATCH",
            AlertTier::VolSurge => "VOL-SURGE",
        }
    }
}

/// Rank of an optional tier; a missing tier sorts last.
pub fn tier_rank(tier: Option<AlertTier>) -> u8 {
    tier.map_or(3, AlertTier::rank)
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertTier {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', "-").as_str() {
            "HOT" => Ok(AlertTier::Hot),
            "WARM" => Ok(AlertTier::Warm),
            "WATCH" => Ok(AlertTier::Watch),
            "VOL-SURGE" => Ok(AlertTier::VolSurge),
            _ => Err(ParseLabelError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        assert!(ScanStatus::FreshBreakout.is_upgrade_from(ScanStatus::Approaching));
        assert!(ScanStatus::Approaching.is_upgrade_from(ScanStatus::Watching));
        assert!(ScanStatus::Watching.is_upgrade_from(ScanStatus::BoxForming));
        assert!(!ScanStatus::Watching.is_upgrade_from(ScanStatus::Watching));
        assert!(!ScanStatus::BoxForming.is_upgrade_from(ScanStatus::FreshBreakout));
    }

    #[test]
    fn status_parses_both_spellings() {
        assert_eq!("FRESH BREAKOUT".parse(), Ok(ScanStatus::FreshBreakout));
        assert_eq!("fresh_breakout".parse(), Ok(ScanStatus::FreshBreakout));
        assert_eq!("Box Forming".parse(), Ok(ScanStatus::BoxForming));
        assert!("OPEN".parse::<ScanStatus>().is_err());
    }

    #[test]
    fn status_display_matches_serde() {
        let json = serde_json::to_string(&ScanStatus::BoxForming).unwrap();
        assert_eq!(json, "\"BOX FORMING\"");
        assert_eq!(ScanStatus::BoxForming.to_string(), "BOX FORMING");
    }

    #[test]
    fn tier_ranks() {
        assert_eq!(tier_rank(Some(AlertTier::Hot)), 0);
        assert_eq!(tier_rank(Some(AlertTier::VolSurge)), 1);
        assert_eq!(tier_rank(Some(AlertTier::Watch)), 2);
        assert_eq!(tier_rank(None), 3);
        assert_eq!("vol_surge".parse(), Ok(AlertTier::VolSurge));
    }
}
