//! CSV bar cache.
//!
//! Layout: `{dir}/{SYMBOL}.csv` with a `{SYMBOL}.meta.json` sidecar.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity check on load (parse every row, at least one bar)
//! - Quarantine for corrupt files (`{SYMBOL}.csv.quarantined`)
//! - Metadata sidecar per symbol (hash, date range, source)

use super::provider::{normalize_bars, DataError, DataProvider, DataSource, FetchResult};
use crate::domain::Bar;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// One row of a cached bar file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Metadata sidecar for a cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub bar_count: usize,
    pub data_hash: String,
    pub source: DataSource,
    pub cached_at: NaiveDateTime,
}

/// How much of a requested range the cache holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageResult {
    FullyCovered,
    PartiallyCovered { cached_start: NaiveDate, cached_end: NaiveDate },
    NotCached,
}

/// Directory of per-symbol CSV bar files.
#[derive(Debug, Clone)]
pub struct CsvBarStore {
    dir: PathBuf,
}

impl CsvBarStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bars_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn meta_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.meta.json"))
    }

    /// Write bars for a symbol, replacing any cached file.
    pub fn write(&self, symbol: &str, bars: &[Bar], source: DataSource) -> Result<(), DataError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(DataError::CacheError("no bars to cache".into()));
        };

        fs::create_dir_all(&self.dir).map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let mut wtr = csv::Writer::from_writer(vec![]);
        for bar in bars {
            wtr.serialize(BarRow {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
            .map_err(|e| DataError::CacheError(format!("csv serialize: {e}")))?;
        }
        let data = wtr
            .into_inner()
            .map_err(|e| DataError::CacheError(format!("csv flush: {e}")))?;

        let path = self.bars_path(symbol);
        write_atomic(&path, &data)?;

        let meta = CacheMeta {
            symbol: symbol.to_string(),
            start_date: first.date,
            end_date: last.date,
            bar_count: bars.len(),
            data_hash: blake3::hash(&data).to_hex().to_string(),
            source,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_vec_pretty(&meta)
            .map_err(|e| DataError::CacheError(format!("meta serialization: {e}")))?;
        write_atomic(&self.meta_path(symbol), &meta_json)?;

        Ok(())
    }

    /// Load every cached bar for a symbol, sorted by date.
    ///
    /// A file that fails to parse is renamed to `.quarantined` so the next
    /// run re-downloads instead of failing again.
    pub fn load(&self, symbol: &str) -> Result<Vec<Bar>, DataError> {
        let path = self.bars_path(symbol);
        if !path.exists() {
            return Err(DataError::NoCachedData {
                symbol: symbol.to_string(),
            });
        }

        match read_bars(&path, symbol) {
            Ok(bars) if !bars.is_empty() => Ok(normalize_bars(bars, NaiveDate::MIN, NaiveDate::MAX)),
            Ok(_) => Err(DataError::CacheError(format!("{}: file has no bars", path.display()))),
            Err(reason) => {
                let quarantine = path.with_extension("csv.quarantined");
                warn!(%symbol, %reason, "quarantining corrupt bar file");
                let _ = fs::rename(&path, &quarantine);
                let _ = fs::remove_file(self.meta_path(symbol));
                Err(DataError::CacheError(format!("{}: {reason}", path.display())))
            }
        }
    }

    pub fn get_meta(&self, symbol: &str) -> Option<CacheMeta> {
        let bytes = fs::read(self.meta_path(symbol)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Check whether the cache holds `[start, end]` for a symbol.
    pub fn covers_range(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> CoverageResult {
        match self.get_meta(symbol) {
            None => CoverageResult::NotCached,
            Some(meta) if meta.start_date <= start && meta.end_date >= end => CoverageResult::FullyCovered,
            Some(meta) => CoverageResult::PartiallyCovered {
                cached_start: meta.start_date,
                cached_end: meta.end_date,
            },
        }
    }
}

fn read_bars(path: &Path, symbol: &str) -> Result<Vec<Bar>, String> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| e.to_string())?;
    rdr.deserialize::<BarRow>()
        .map(|row| {
            row.map(|r| Bar {
                symbol: symbol.to_string(),
                date: r.date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
            })
            .map_err(|e| e.to_string())
        })
        .collect()
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), DataError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data).map_err(|e| DataError::CacheError(format!("write {}: {e}", tmp_path.display())))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::CacheError(format!("atomic rename failed: {e}"))
    })
}

impl DataProvider for CsvBarStore {
    fn name(&self) -> &str {
        "csv_cache"
    }

    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<FetchResult, DataError> {
        let bars = self.load(symbol)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars: normalize_bars(bars, start, end),
            source: DataSource::Cache,
        })
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}
