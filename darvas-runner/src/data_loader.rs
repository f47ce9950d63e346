//! Bar loading and data resolution for the runner.
//!
//! Resolves one symbol's daily history with the fallback policy:
//! 1. Cached bars that are current → use them
//! 2. Otherwise, if online and a provider is available → download and cache
//! 3. Download failed but an older cache exists → use it, with a warning
//! 4. No data and `synthetic` → generate synthetic bars (tagged)
//! 5. Otherwise → fail with a clear error
//!
//! Synthetic data is a developer-only mode. Runs that used it are flagged in
//! the run manifest.

use chrono::NaiveDate;
use darvas_core::data::{
    generate_synthetic_bars, normalize_bars, CircuitBreaker, CsvBarStore, DataError, DataProvider, DataSource,
    DownloadProgress, YahooProvider,
};
use darvas_core::domain::Bar;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ScanSettings;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no cached data for '{symbol}' and no network access (use --synthetic for synthetic data)")]
    NoCachedDataOffline { symbol: String },

    #[error("no cached data for '{symbol}' and download failed: {reason}")]
    DownloadFailed { symbol: String, reason: String },

    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Options controlling how bars are loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Never make network requests.
    pub offline: bool,
    /// Generate synthetic bars when real data is unavailable.
    /// Mutually exclusive with `offline` (enforced by config validation).
    pub synthetic: bool,
    /// Re-download even if the cache is current.
    pub force: bool,
}

impl LoadOptions {
    /// The trailing `history_days` window ending on `end`.
    pub fn trailing(end: NaiveDate, history_days: i64) -> Self {
        Self {
            start: end - chrono::Duration::days(history_days),
            end,
            offline: false,
            synthetic: false,
            force: false,
        }
    }
}

/// One symbol's bars plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedBars {
    pub bars: Vec<Bar>,
    pub source: DataSource,
}

/// Result of a batch load: per-symbol successes and failures.
#[derive(Debug, Default)]
pub struct BatchLoad {
    pub loaded: BTreeMap<String, LoadedBars>,
    pub failed: Vec<(String, LoadError)>,
}

impl BatchLoad {
    pub fn has_synthetic(&self) -> bool {
        self.loaded.values().any(|l| l.source == DataSource::Synthetic)
    }
}

/// The network provider for a scan, or `None` when running offline.
pub fn network_provider(settings: &ScanSettings) -> Result<Option<YahooProvider>, DataError> {
    if settings.offline {
        return Ok(None);
    }
    let breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(Some(YahooProvider::new(breaker)?.with_suffix(settings.symbol_suffix.clone())))
}

/// Cache is current when it reaches `end` or was written on/after `end`.
///
/// The second case covers weekends and holidays, where the latest bar
/// legitimately predates today.
fn cache_is_current(store: &CsvBarStore, symbol: &str, end: NaiveDate) -> bool {
    store
        .get_meta(symbol)
        .is_some_and(|meta| meta.end_date >= end || meta.cached_at.date() >= end)
}

fn from_cache(store: &CsvBarStore, symbol: &str, opts: &LoadOptions) -> Option<LoadedBars> {
    match store.load(symbol) {
        Ok(bars) => Some(LoadedBars {
            bars: normalize_bars(bars, opts.start, opts.end),
            source: DataSource::Cache,
        }),
        Err(e) => {
            debug!(%symbol, error = %e, "cache miss");
            None
        }
    }
}

/// Load one symbol's daily bars, applying the fallback policy.
pub fn load_symbol(
    symbol: &str,
    store: &CsvBarStore,
    provider: Option<&dyn DataProvider>,
    opts: &LoadOptions,
) -> Result<LoadedBars, LoadError> {
    // Step 1: current cache
    if !opts.force && (opts.offline || cache_is_current(store, symbol, opts.end)) {
        if let Some(loaded) = from_cache(store, symbol, opts) {
            return Ok(loaded);
        }
    }

    // Step 2: download
    let mut failure: Option<String> = None;
    if !opts.offline {
        match provider {
            Some(prov) if prov.is_available() => match prov.fetch(symbol, opts.start, opts.end) {
                Ok(fetched) if !fetched.bars.is_empty() => {
                    let bars = normalize_bars(fetched.bars, opts.start, opts.end);
                    if let Err(e) = store.write(symbol, &bars, fetched.source) {
                        warn!(%symbol, error = %e, "failed to cache downloaded bars");
                    }
                    return Ok(LoadedBars {
                        bars,
                        source: fetched.source,
                    });
                }
                Ok(_) => failure = Some("provider returned no bars".into()),
                Err(e) => failure = Some(e.to_string()),
            },
            Some(prov) => failure = Some(format!("provider '{}' is unavailable", prov.name())),
            None => failure = Some("no data provider configured".into()),
        }
    }

    // Step 3: stale cache beats nothing
    if let Some(loaded) = from_cache(store, symbol, opts) {
        if let Some(reason) = &failure {
            warn!(%symbol, %reason, "download failed, using stale cache");
        }
        return Ok(loaded);
    }

    // Step 4: synthetic fallback
    if opts.synthetic {
        warn!(%symbol, "generating synthetic data; results will be tagged as synthetic");
        return Ok(LoadedBars {
            bars: generate_synthetic_bars(symbol, opts.start, opts.end),
            source: DataSource::Synthetic,
        });
    }

    // Step 5: fail
    if opts.offline {
        return Err(LoadError::NoCachedDataOffline {
            symbol: symbol.to_string(),
        });
    }
    Err(LoadError::DownloadFailed {
        symbol: symbol.to_string(),
        reason: failure.unwrap_or_else(|| "data not cached and download failed".into()),
    })
}

/// Load many symbols sequentially, reporting progress, collecting failures.
pub fn load_bars(
    symbols: &[&str],
    store: &CsvBarStore,
    provider: Option<&dyn DataProvider>,
    progress: Option<&dyn DownloadProgress>,
    opts: &LoadOptions,
) -> BatchLoad {
    let total = symbols.len();
    let mut batch = BatchLoad::default();

    for (i, symbol) in symbols.iter().enumerate() {
        if let Some(p) = progress {
            p.on_start(symbol, i, total);
        }
        match load_symbol(symbol, store, provider, opts) {
            Ok(loaded) => {
                if let Some(p) = progress {
                    p.on_complete(symbol, i, total, &Ok(()));
                }
                batch.loaded.insert(symbol.to_string(), loaded);
            }
            Err(e) => {
                if let Some(p) = progress {
                    p.on_complete(symbol, i, total, &Err(DataError::Other(e.to_string())));
                }
                batch.failed.push((symbol.to_string(), e));
            }
        }
    }

    if let Some(p) = progress {
        p.on_batch_complete(batch.loaded.len(), batch.failed.len(), total);
    }
    batch
}
