//! Scanner configuration, loaded from a single TOML file.
//!
//! Every section is optional; missing keys take their defaults, so an empty
//! file is a valid configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use darvas_core::{BoxConfig, ClassifierConfig, MergePolicy, OrderConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "darvas.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// `[scan]`: where data lives and how the universe is fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Bar cache directory (`{SYMBOL}.csv`).
    pub data_dir: PathBuf,
    /// Scan CSVs, manifests and order audit logs.
    pub output_dir: PathBuf,
    /// Calendar days of daily history requested per symbol.
    pub history_days: i64,
    /// Scan worker threads.
    pub workers: usize,
    /// Appended to symbols when querying Yahoo, e.g. ".NS".
    pub symbol_suffix: String,
    /// Never touch the network; use cached bars only.
    pub offline: bool,
    /// Fall back to generated bars when real data is unavailable.
    pub synthetic: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/bars"),
            output_dir: PathBuf::from("output"),
            history_days: 365,
            workers: 8,
            symbol_suffix: ".NS".into(),
            offline: false,
            synthetic: false,
        }
    }
}

/// `[watchlist]`: the persisted cross-run list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistSettings {
    pub path: PathBuf,
    pub expiry_days: i64,
    pub source: String,
}

impl Default for WatchlistSettings {
    fn default() -> Self {
        let policy = MergePolicy::default();
        Self {
            path: PathBuf::from("watchlist.csv"),
            expiry_days: policy.expiry_days,
            source: policy.source,
        }
    }
}

impl WatchlistSettings {
    pub fn policy(&self) -> MergePolicy {
        MergePolicy {
            expiry_days: self.expiry_days,
            source: self.source.clone(),
        }
    }
}

/// `[broker]`: REST order sink settings. Credentials come from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub timeout_secs: u64,
    /// Prefixed to the order date in the broker's remark field.
    pub remark_prefix: String,
    /// Exchange symbol to broker stock code, where the two differ.
    pub stock_codes: BTreeMap<String, String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            remark_prefix: "Darvas".into(),
            stock_codes: BTreeMap::new(),
        }
    }
}

/// Full scanner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarvasConfig {
    pub scan: ScanSettings,
    pub box_detector: BoxConfig,
    pub classifier: ClassifierConfig,
    pub watchlist: WatchlistSettings,
    pub orders: OrderConfig,
    pub broker: BrokerSettings,
}

impl DarvasConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Load `path` if given, else `darvas.toml` when present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: DarvasConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.into(),
            })
        }

        if self.scan.workers == 0 {
            return invalid("scan.workers", "must be at least 1");
        }
        if self.scan.history_days <= 0 {
            return invalid("scan.history_days", "must be positive");
        }
        if self.scan.offline && self.scan.synthetic {
            return invalid("scan.synthetic", "cannot be combined with scan.offline");
        }
        if self.box_detector.ceil_bars == 0 || self.box_detector.floor_bars == 0 {
            return invalid("box_detector", "ceil_bars and floor_bars must be at least 1");
        }

        let c = &self.classifier;
        if c.atr_period == 0 {
            return invalid("classifier.atr_period", "must be at least 1");
        }
        if c.volume_lookback == 0 {
            return invalid("classifier.volume_lookback", "must be at least 1");
        }
        if c.max_box_width_pct <= 0.0 {
            return invalid("classifier.max_box_width_pct", "must be positive");
        }
        if c.hot_distance_pct > c.warm_distance_pct {
            return invalid(
                "classifier.hot_distance_pct",
                format!("{} exceeds warm_distance_pct {}", c.hot_distance_pct, c.warm_distance_pct),
            );
        }
        if c.stop_buffer_pct < 0.0 || c.stop_buffer_pct >= 100.0 {
            return invalid("classifier.stop_buffer_pct", "must be in [0, 100)");
        }

        if self.watchlist.expiry_days < 0 {
            return invalid("watchlist.expiry_days", "must not be negative");
        }

        let o = &self.orders;
        if o.risk_per_trade <= 0.0 {
            return invalid("orders.risk_per_trade", "must be positive");
        }
        if o.max_orders == 0 {
            return invalid("orders.max_orders", "must be at least 1");
        }
        if o.tick_size <= 0.0 {
            return invalid("orders.tick_size", "must be positive");
        }
        if o.entry_buffer_pct < 0.0 {
            return invalid("orders.entry_buffer_pct", "must not be negative");
        }
        if self.broker.timeout_secs == 0 {
            return invalid("broker.timeout_secs", "must be at least 1");
        }
        Ok(())
    }

    /// Deterministic BLAKE3 hash of the effective configuration.
    ///
    /// Two runs with the same hash classified under identical thresholds.
    pub fn config_hash(&self) -> Result<String, ConfigError> {
        let canonical = toml::to_string(self)?;
        Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = DarvasConfig::from_toml("").unwrap();
        assert_eq!(config, DarvasConfig::default());
        assert_eq!(config.box_detector.ceil_bars, 3);
        assert_eq!(config.classifier.min_daily_bars, 60);
        assert_eq!(config.orders.max_orders, 5);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = DarvasConfig::from_toml(
            r#"
            [scan]
            workers = 4
            offline = true

            [classifier]
            atr_smoothing = "wilder"
            proximity_pct = 4.0

            [orders]
            risk_per_trade = 2500.0
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.workers, 4);
        assert!(config.scan.offline);
        assert_eq!(config.scan.history_days, 365);
        assert_eq!(config.classifier.proximity_pct, 4.0);
        assert_eq!(config.classifier.atr_period, 14);
        assert_eq!(config.orders.risk_per_trade, 2500.0);
        assert_eq!(config.orders.exchange, "NSE");
    }

    #[test]
    fn rejects_offline_with_synthetic() {
        let err = DarvasConfig::from_toml("[scan]\noffline = true\nsynthetic = true\n").unwrap_err();
        assert!(err.to_string().contains("scan.synthetic"));
    }

    #[test]
    fn rejects_zero_thresholds() {
        assert!(DarvasConfig::from_toml("[box_detector]\nceil_bars = 0\n").is_err());
        assert!(DarvasConfig::from_toml("[orders]\nmax_orders = 0\n").is_err());
        assert!(DarvasConfig::from_toml("[scan]\nworkers = 0\n").is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            DarvasConfig::from_toml("[scan]\nworkers = \"many\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn config_hash_deterministic_and_sensitive() {
        let a = DarvasConfig::default();
        let mut b = a.clone();
        assert_eq!(a.config_hash().unwrap(), b.config_hash().unwrap());
        b.box_detector.floor_bars = 4;
        assert_ne!(a.config_hash().unwrap(), b.config_hash().unwrap());
    }

    #[test]
    fn broker_stock_codes() {
        let config = DarvasConfig::from_toml("[broker.stock_codes]\nPOLYCAB = \"POLCAB\"\n").unwrap();
        assert_eq!(config.broker.stock_codes["POLYCAB"], "POLCAB");
        assert_eq!(config.broker.timeout_secs, 15);
    }

    #[test]
    fn watchlist_policy_mirrors_settings() {
        let config = DarvasConfig::from_toml("[watchlist]\nexpiry_days = 14\n").unwrap();
        let policy = config.watchlist.policy();
        assert_eq!(policy.expiry_days, 14);
        assert_eq!(policy.source, "darvas_scan");
    }
}
