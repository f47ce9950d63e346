//! Darvas Runner: scan orchestration, watchlist persistence, artifacts and
//! order submission.
//!
//! This crate builds on `darvas-core` to provide:
//! - TOML configuration with validation and a config hash
//! - Bar loading with cache/download/synthetic fallback
//! - The parallel universe scan and its deterministic report
//! - The CSV watchlist store with a run lock and corrupt-file backup
//! - Scan CSV, run manifest and order audit artifacts
//! - Basket and single-symbol order placement through an [`OrderSink`]

pub mod config;
pub mod data_loader;
pub mod export;
pub mod orders;
pub mod runner;
pub mod scan;
pub mod store;

pub use config::{BrokerSettings, ConfigError, DarvasConfig, ScanSettings, WatchlistSettings};
pub use data_loader::{load_bars, load_symbol, network_provider, BatchLoad, LoadError, LoadOptions, LoadedBars};
pub use export::{
    latest_scan_files, load_latest_market_scan, load_latest_scan, load_manifest, read_scan_csv, save_order_log,
    save_scan_artifacts, RunManifest, ScanArtifacts,
};
pub use orders::{
    place_basket, place_single, AuditTag, BasketOutcome, Credentials, CredentialsError, OrderSink, PlaceError,
    RestOrderSink, SinkError, Submission,
};
pub use runner::{run_scan_cycle, RankedResult, RunError, ScanCycle};
pub use scan::{run_scan, ScanError, ScanReport, SkipReason};
pub use store::{LoadReport, RunLock, StoreError, WatchlistStore};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<DarvasConfig>();
        assert_sync::<DarvasConfig>();
        assert_send::<LoadOptions>();
        assert_sync::<LoadOptions>();
    }

    #[test]
    fn scan_report_is_send_sync() {
        assert_send::<ScanReport>();
        assert_sync::<ScanReport>();
        assert_send::<scan::ScanOutcome>();
    }

    #[test]
    fn loaded_bars_are_send_sync() {
        assert_send::<LoadedBars>();
        assert_sync::<LoadedBars>();
    }

    #[test]
    fn order_sink_is_send_sync() {
        assert_send::<RestOrderSink>();
        assert_sync::<RestOrderSink>();
        assert_send::<BasketOutcome>();
    }

    #[test]
    fn scan_cycle_is_send_sync() {
        assert_send::<ScanCycle>();
        assert_sync::<ScanCycle>();
    }
}
