//! Parallel per-symbol scan.
//!
//! Each worker loads one symbol's history and classifies it; the outcome is
//! returned as a message and the collector assembles a [`ScanReport`]. Output
//! order never depends on worker scheduling.

use std::collections::BTreeMap;
use std::fmt;

use darvas_core::data::{CsvBarStore, DataProvider, DataSource};
use darvas_core::domain::{tier_rank, ScanResult, ScanStatus};
use darvas_core::{classify, Classification};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::DarvasConfig;
use crate::data_loader::{load_symbol, LoadOptions};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no symbols to scan")]
    EmptyUniverse,

    #[error("failed to build scan worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Why a symbol produced no result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientHistory { have: usize, need: usize },
    DataUnavailable { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InsufficientHistory { have, need } => {
                write!(f, "insufficient history ({have} bars, need {need})")
            }
            SkipReason::DataUnavailable { message } => write!(f, "data unavailable: {message}"),
        }
    }
}

/// One worker's answer for one symbol.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Result { result: ScanResult, source: DataSource },
    Excluded {
        symbol: String,
        box_width_pct: f64,
        source: DataSource,
    },
    Skipped { symbol: String, reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedSymbol {
    pub symbol: String,
    pub box_width_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Everything one scan produced, deterministically ordered.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Most actionable first: status severity, tier, distance, symbol.
    pub results: Vec<ScanResult>,
    pub excluded: Vec<ExcludedSymbol>,
    pub skipped: Vec<SkippedSymbol>,
    /// Symbols classified or excluded on synthetic bars.
    pub synthetic: Vec<String>,
    pub universe_size: usize,
}

impl ScanReport {
    pub fn from_outcomes(outcomes: Vec<ScanOutcome>) -> Self {
        let mut report = ScanReport {
            universe_size: outcomes.len(),
            ..ScanReport::default()
        };
        for outcome in outcomes {
            match outcome {
                ScanOutcome::Result { result, source } => {
                    if source == DataSource::Synthetic {
                        report.synthetic.push(result.symbol.clone());
                    }
                    report.results.push(result);
                }
                ScanOutcome::Excluded {
                    symbol,
                    box_width_pct,
                    source,
                } => {
                    if source == DataSource::Synthetic {
                        report.synthetic.push(symbol.clone());
                    }
                    report.excluded.push(ExcludedSymbol { symbol, box_width_pct })
                }
                ScanOutcome::Skipped { symbol, reason } => report.skipped.push(SkippedSymbol { symbol, reason }),
            }
        }

        sort_results(&mut report.results);
        report.excluded.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.skipped.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        report.synthetic.sort();
        report
    }

    pub fn has_synthetic(&self) -> bool {
        !self.synthetic.is_empty()
    }

    /// Results classified on market bars. Synthetic symbols never reach the
    /// watchlist or an order basket.
    pub fn market_results(&self) -> Vec<ScanResult> {
        self.results
            .iter()
            .filter(|r| self.synthetic.binary_search(&r.symbol).is_err())
            .cloned()
            .collect()
    }

    /// Result count for every status label, zero counts included.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for status in [
            ScanStatus::FreshBreakout,
            ScanStatus::Approaching,
            ScanStatus::Watching,
            ScanStatus::BoxForming,
        ] {
            let n = self.results.iter().filter(|r| r.status == status).count();
            counts.insert(status.to_string(), n);
        }
        counts
    }
}

/// Severity, then tier, then distance to ceiling, then symbol.
pub fn sort_results(results: &mut [ScanResult]) {
    results.sort_by(|a, b| {
        a.status
            .severity()
            .cmp(&b.status.severity())
            .then_with(|| tier_rank(a.tier).cmp(&tier_rank(b.tier)))
            .then_with(|| a.distance_or_max().total_cmp(&b.distance_or_max()))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}

/// Load and classify one symbol.
pub fn scan_symbol(
    symbol: &str,
    store: &CsvBarStore,
    provider: Option<&dyn DataProvider>,
    config: &DarvasConfig,
    opts: &LoadOptions,
) -> ScanOutcome {
    let loaded = match load_symbol(symbol, store, provider, opts) {
        Ok(loaded) => loaded,
        Err(e) => {
            debug!(%symbol, error = %e, "skipping symbol");
            return ScanOutcome::Skipped {
                symbol: symbol.to_string(),
                reason: SkipReason::DataUnavailable { message: e.to_string() },
            };
        }
    };

    match classify(symbol, &loaded.bars, &config.classifier, &config.box_detector) {
        Classification::Classified(result) => ScanOutcome::Result {
            result,
            source: loaded.source,
        },
        Classification::Excluded { box_width_pct } => ScanOutcome::Excluded {
            symbol: symbol.to_string(),
            box_width_pct,
            source: loaded.source,
        },
        Classification::InsufficientHistory { have, need } => ScanOutcome::Skipped {
            symbol: symbol.to_string(),
            reason: SkipReason::InsufficientHistory { have, need },
        },
    }
}

/// Scan a universe on a private pool of `config.scan.workers` threads.
pub fn run_scan(
    symbols: &[&str],
    store: &CsvBarStore,
    provider: Option<&dyn DataProvider>,
    config: &DarvasConfig,
    opts: &LoadOptions,
) -> Result<ScanReport, ScanError> {
    if symbols.is_empty() {
        return Err(ScanError::EmptyUniverse);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.scan.workers)
        .thread_name(|i| format!("darvas-scan-{i}"))
        .build()?;

    info!(symbols = symbols.len(), workers = config.scan.workers, "scan started");
    let outcomes: Vec<ScanOutcome> = pool.install(|| {
        symbols
            .par_iter()
            .map(|symbol| scan_symbol(symbol, store, provider, config, opts))
            .collect()
    });

    let report = ScanReport::from_outcomes(outcomes);
    info!(
        results = report.results.len(),
        excluded = report.excluded.len(),
        skipped = report.skipped.len(),
        "scan finished"
    );
    Ok(report)
}
