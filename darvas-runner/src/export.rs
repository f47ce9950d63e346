//! Run artifacts: scan CSV, run manifest JSON and order audit CSV.
//!
//! File names carry a local timestamp so lexical order is chronological:
//! - `darvas_scan_{YYYYMMDD_HHMMSS}.csv` and `.json`
//! - `darvas_orders_{TAG}_{YYYYMMDD_HHMMSS}.csv`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use darvas_core::domain::{Order, ScanResult};
use serde::{Deserialize, Serialize};

use crate::orders::AuditTag;
use crate::scan::{ExcludedSymbol, ScanReport, SkippedSymbol};

/// Current schema version for the run manifest.
pub const SCHEMA_VERSION: u32 = 1;

const SCAN_PREFIX: &str = "darvas_scan_";

// ─── Scan CSV ───────────────────────────────────────────────────────

/// One row per result, columns in [`ScanResult`] field order.
pub fn export_scan_csv(results: &[ScanResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for r in results {
        wtr.serialize(r)
            .with_context(|| format!("failed to serialize scan row for {}", r.symbol))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Parse a scan CSV produced by [`export_scan_csv`].
pub fn import_scan_csv(content: &str) -> Result<Vec<ScanResult>> {
    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("bad scan row {}", i + 1)))
        .collect()
}

pub fn read_scan_csv(path: &Path) -> Result<Vec<ScanResult>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    import_scan_csv(&content).with_context(|| format!("failed to parse {}", path.display()))
}

/// Scan CSVs in `dir`, newest first.
pub fn latest_scan_files(dir: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "csv")
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(SCAN_PREFIX))
        })
        .collect();
    files.sort();
    files.reverse();
    files.truncate(limit);
    Ok(files)
}

/// Newest scan's results, or an error naming the directory when none exists.
pub fn load_latest_scan(dir: &Path) -> Result<(PathBuf, Vec<ScanResult>)> {
    let Some(path) = latest_scan_files(dir, 1)?.into_iter().next() else {
        bail!("no scan CSV found in {}; run `darvas scan` first", dir.display());
    };
    let results = read_scan_csv(&path)?;
    Ok((path, results))
}

/// Newest scan's results without the symbols its manifest marks synthetic.
///
/// A scan CSV without a manifest next to it is taken as is.
pub fn load_latest_market_scan(dir: &Path) -> Result<(PathBuf, Vec<ScanResult>)> {
    let (path, mut results) = load_latest_scan(dir)?;
    let manifest_path = path.with_extension("json");
    if manifest_path.exists() {
        let manifest = load_manifest(&manifest_path)?;
        results.retain(|r| !manifest.synthetic_symbols.contains(&r.symbol));
    }
    Ok((path, results))
}

// ─── Run manifest ───────────────────────────────────────────────────

/// Summary of one scan run, written next to its CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: u32,
    /// BLAKE3 over config hash, timestamp and universe.
    pub run_id: String,
    pub created_at: NaiveDateTime,
    pub config_hash: String,
    pub universe_size: usize,
    pub result_count: usize,
    pub status_counts: std::collections::BTreeMap<String, usize>,
    pub excluded: Vec<ExcludedSymbol>,
    pub skipped: Vec<SkippedSymbol>,
    pub has_synthetic: bool,
    pub synthetic_symbols: Vec<String>,
    pub scan_csv: String,
}

impl RunManifest {
    pub fn new(report: &ScanReport, config_hash: &str, created_at: NaiveDateTime, scan_csv: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(config_hash.as_bytes());
        hasher.update(created_at.to_string().as_bytes());
        for r in &report.results {
            hasher.update(r.symbol.as_bytes());
        }
        for s in &report.skipped {
            hasher.update(s.symbol.as_bytes());
        }
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: hasher.finalize().to_hex().to_string(),
            created_at,
            config_hash: config_hash.to_string(),
            universe_size: report.universe_size,
            result_count: report.results.len(),
            status_counts: report.status_counts(),
            excluded: report.excluded.clone(),
            skipped: report.skipped.clone(),
            has_synthetic: report.has_synthetic(),
            synthetic_symbols: report.synthetic.clone(),
            scan_csv: scan_csv.to_string(),
        }
    }
}

/// Paths written for one scan.
#[derive(Debug, Clone)]
pub struct ScanArtifacts {
    pub csv: PathBuf,
    pub manifest: PathBuf,
    pub run_id: String,
}

/// Write the scan CSV and manifest into `output_dir`.
pub fn save_scan_artifacts(
    report: &ScanReport,
    config_hash: &str,
    output_dir: &Path,
    now: NaiveDateTime,
) -> Result<ScanArtifacts> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let stem = format!("{SCAN_PREFIX}{}", now.format("%Y%m%d_%H%M%S"));
    let csv_path = output_dir.join(format!("{stem}.csv"));
    let manifest_path = output_dir.join(format!("{stem}.json"));

    let csv = export_scan_csv(&report.results)?;
    std::fs::write(&csv_path, csv).with_context(|| format!("failed to write {}", csv_path.display()))?;

    let manifest = RunManifest::new(report, config_hash, now, &format!("{stem}.csv"));
    let json = serde_json::to_string_pretty(&manifest).context("failed to serialize run manifest")?;
    std::fs::write(&manifest_path, json)
        .with_context(|| format!("failed to write {}", manifest_path.display()))?;

    Ok(ScanArtifacts {
        csv: csv_path,
        manifest: manifest_path,
        run_id: manifest.run_id,
    })
}

/// Load a manifest, rejecting unknown schema versions.
pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let json = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let manifest: RunManifest = serde_json::from_str(&json).context("failed to deserialize run manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── Order audit ────────────────────────────────────────────────────

/// Every order of a batch with its outcome.
pub fn export_orders_csv(orders: &[Order]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for o in orders {
        wtr.serialize(o)
            .with_context(|| format!("failed to serialize order for {}", o.symbol))?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write the audit log for a batch. Empty batches write nothing.
pub fn save_order_log(orders: &[Order], tag: AuditTag, output_dir: &Path, now: NaiveDateTime) -> Result<Option<PathBuf>> {
    if orders.is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let path = output_dir.join(format!("darvas_orders_{}_{}.csv", tag, now.format("%Y%m%d_%H%M%S")));
    let csv = export_orders_csv(orders)?;
    std::fs::write(&path, csv).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(Some(path))
}
