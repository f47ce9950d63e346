//! One scan cycle: lock, read watchlist, scan, annotate, merge, persist.
//!
//! The watchlist is read once at the start and written once at the end while
//! the run lock is held. The order phase is separate (see [`crate::orders`])
//! and only runs after this cycle has persisted everything.

use chrono::{NaiveDate, NaiveDateTime};
use darvas_core::data::{CsvBarStore, DataProvider};
use darvas_core::domain::{ScanResult, ScanStatus};
use darvas_core::{annotate_upgrades, check_add_candidates, rank_results, AddCandidate, MergeReport};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, DarvasConfig};
use crate::data_loader::LoadOptions;
use crate::export::{save_scan_artifacts, ScanArtifacts};
use crate::scan::{run_scan, ScanError, ScanReport};
use crate::store::{LoadReport, StoreError, WatchlistStore};

/// Errors from a scan cycle.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("watchlist error: {0}")]
    Store(#[from] StoreError),
    #[error("export error: {0}")]
    Export(String),
}

/// A result with its upgrade annotation, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    pub result: ScanResult,
    pub baseline: ScanStatus,
    pub upgraded: bool,
}

/// Everything a scan cycle produced.
#[derive(Debug, Clone)]
pub struct ScanCycle {
    pub report: ScanReport,
    /// Results eligible for the watchlist and order baskets.
    pub market: Vec<ScanResult>,
    pub ranked: Vec<RankedResult>,
    pub add_candidates: Vec<AddCandidate>,
    pub merge: MergeReport,
    pub watchlist_load: LoadReport,
    pub watchlist_size: usize,
    pub artifacts: ScanArtifacts,
}

/// Run a full scan cycle over `symbols`.
pub fn run_scan_cycle(
    config: &DarvasConfig,
    symbols: &[&str],
    provider: Option<&dyn DataProvider>,
    today: NaiveDate,
    now: NaiveDateTime,
) -> Result<ScanCycle, RunError> {
    let config_hash = config.config_hash()?;
    let store = WatchlistStore::new(&config.watchlist.path);
    let _lock = store.lock()?;

    let (mut watchlist, watchlist_load) = store.load();
    info!(entries = watchlist.len(), "watchlist loaded");

    let bars = CsvBarStore::new(&config.scan.data_dir);
    let opts = LoadOptions {
        offline: config.scan.offline,
        synthetic: config.scan.synthetic,
        ..LoadOptions::trailing(today, config.scan.history_days)
    };
    let report = run_scan(symbols, &bars, provider, config, &opts)?;

    // Annotation and add-on checks read the watchlist as it was before this run.
    let mut annotated = annotate_upgrades(&watchlist, &report.results);
    rank_results(&mut annotated);
    let ranked = annotated
        .into_iter()
        .map(|a| RankedResult {
            result: a.result.clone(),
            baseline: a.baseline,
            upgraded: a.upgraded,
        })
        .collect();
    let market = report.market_results();
    if report.has_synthetic() {
        warn!(symbols = ?report.synthetic, "synthetic symbols kept out of the watchlist");
    }
    let add_candidates = check_add_candidates(&watchlist, &market);

    let merge = watchlist.merge(&market, today, &config.watchlist.policy());
    info!(
        added = merge.added.len(),
        updated = merge.updated.len(),
        graduated = merge.graduated.len(),
        expired = merge.expired.len(),
        "watchlist merged"
    );

    let artifacts = save_scan_artifacts(&report, &config_hash, &config.scan.output_dir, now)
        .map_err(|e| RunError::Export(format!("{e:#}")))?;
    store.save(&watchlist)?;

    Ok(ScanCycle {
        report,
        market,
        ranked,
        add_candidates,
        merge,
        watchlist_load,
        watchlist_size: watchlist.len(),
        artifacts,
    })
}
