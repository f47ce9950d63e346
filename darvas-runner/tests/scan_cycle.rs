//! Integration tests for one full scan cycle against an offline bar cache.
//!
//! Bars are written into a temp cache, the watchlist is seeded by hand, and
//! the cycle's persisted outputs are read back from disk.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use darvas_core::data::{CsvBarStore, DataSource};
use darvas_core::domain::{AlertTier, Bar, ScanStatus};
use darvas_core::WatchlistEntry;
use darvas_runner::export::{load_latest_scan, load_manifest};
use darvas_runner::store::{RunLock, StoreError, WatchlistStore, WATCHLIST_COLUMNS};
use darvas_runner::{run_scan_cycle, DarvasConfig, RunError};
use tempfile::TempDir;

fn weekdays(n: usize) -> Vec<NaiveDate> {
    let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let mut out = Vec::new();
    while out.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(date);
        }
        date += Duration::days(1);
    }
    out
}

fn bar(symbol: &str, date: NaiveDate, low: f64, high: f64, close: f64, volume: u64) -> Bar {
    Bar {
        symbol: symbol.into(),
        date,
        open: close,
        high,
        low,
        close,
        volume,
    }
}

/// Trend into a 90-100 range, last day closing at 98.5 on triple volume.
fn approaching(symbol: &str) -> Vec<Bar> {
    let dates = weekdays(80);
    let mut bars: Vec<Bar> = dates
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            if i < 20 {
                let close = 60.0 + i as f64 * 1.4;
                bar(symbol, date, close - 1.0, close + 1.0, close, 1_000)
            } else {
                bar(symbol, date, 90.0, 100.0, 95.0, 1_000)
            }
        })
        .collect();
    let last = bars.last_mut().unwrap();
    last.close = 98.5;
    last.volume = 3_000;
    bars
}

fn trending(symbol: &str) -> Vec<Bar> {
    weekdays(80)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let close = 100.0 + i as f64;
            bar(symbol, date, close - 1.0, close + 1.0, close, 1_000)
        })
        .collect()
}

fn today() -> NaiveDate {
    *weekdays(80).last().unwrap()
}

fn now() -> NaiveDateTime {
    today().and_hms_opt(16, 5, 0).unwrap()
}

struct Fixture {
    _dir: TempDir,
    config: DarvasConfig,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let mut config = DarvasConfig::default();
    config.scan.data_dir = dir.path().join("bars");
    config.scan.output_dir = dir.path().join("output");
    config.scan.offline = true;
    config.scan.workers = 2;
    config.watchlist.path = dir.path().join("watchlist.csv");

    let store = CsvBarStore::new(&config.scan.data_dir);
    store.write("RANGE", &approaching("RANGE"), DataSource::YahooFinance).unwrap();
    store.write("TREND", &trending("TREND"), DataSource::YahooFinance).unwrap();
    let short: Vec<Bar> = trending("SHORT").into_iter().take(40).collect();
    store.write("SHORT", &short, DataSource::YahooFinance).unwrap();

    Fixture { _dir: dir, config }
}

fn seed_watchlist(config: &DarvasConfig, rows: &[&str]) {
    let mut text = WATCHLIST_COLUMNS.join(",");
    text.push('\n');
    for row in rows {
        text.push_str(row);
        text.push('\n');
    }
    std::fs::write(&config.watchlist.path, text).unwrap();
}

#[test]
fn cycle_classifies_merges_and_persists() {
    let f = fixture();
    seed_watchlist(
        &f.config,
        &[
            "RANGE,2024-04-10,2024-04-12,,WATCHING,100.00,90.00,11.11,88.20,110.00,5,darvas_scan,,,",
            "OLD,2024-02-01,2024-02-01,,WATCHING,50.00,45.00,11.11,44.10,55.00,3,darvas_scan,,,",
            "POS,2024-01-15,,,OPEN,,,,,,,broker,75.5,20,bought on breakout",
        ],
    );

    let symbols = ["RANGE", "TREND", "SHORT", "MISSING"];
    let cycle = run_scan_cycle(&f.config, &symbols, None, today(), now()).unwrap();

    // Classification
    let report = &cycle.report;
    assert_eq!(report.universe_size, 4);
    let statuses: Vec<(&str, ScanStatus)> = report
        .results
        .iter()
        .map(|r| (r.symbol.as_str(), r.status))
        .collect();
    assert_eq!(
        statuses,
        vec![("RANGE", ScanStatus::Approaching), ("TREND", ScanStatus::BoxForming)]
    );
    assert_eq!(report.results[0].tier, Some(AlertTier::Hot));
    let skipped: Vec<&str> = report.skipped.iter().map(|s| s.symbol.as_str()).collect();
    assert_eq!(skipped, vec!["MISSING", "SHORT"]);
    assert!(!report.has_synthetic());

    // Upgrade annotation reads the pre-merge watchlist
    assert_eq!(cycle.ranked[0].result.symbol, "RANGE");
    assert_eq!(cycle.ranked[0].baseline, ScanStatus::Watching);
    assert!(cycle.ranked[0].upgraded);
    assert!(!cycle.ranked[1].upgraded);

    // Merge
    assert_eq!(cycle.merge.updated, vec!["RANGE".to_string()]);
    assert_eq!(cycle.merge.expired, vec!["OLD".to_string()]);
    assert!(cycle.merge.added.is_empty());
    assert_eq!(cycle.watchlist_size, 2);
    assert_eq!(cycle.watchlist_load.rejected_rows, 0);

    // Watchlist on disk
    let store = WatchlistStore::new(&f.config.watchlist.path);
    let (reloaded, load) = store.load();
    assert!(load.backup.is_none());
    assert_eq!(reloaded.len(), 2);
    match reloaded.get("RANGE") {
        Some(WatchlistEntry::Scanner(e)) => {
            assert_eq!(e.status, ScanStatus::Approaching);
            assert_eq!(e.prev_status, Some(ScanStatus::Watching));
            assert_eq!(e.date_updated, today());
            assert_eq!(e.date_added, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        }
        other => panic!("expected scanner entry for RANGE, got {other:?}"),
    }
    let pos = reloaded.get("POS").unwrap();
    assert!(pos.is_protected());
    assert_eq!(pos.to_row().notes, "bought on breakout");
    assert_eq!(pos.to_row().entry_price, "75.5");

    // Artifacts
    assert!(cycle.artifacts.csv.exists());
    let manifest = load_manifest(&cycle.artifacts.manifest).unwrap();
    assert_eq!(manifest.run_id, cycle.artifacts.run_id);
    assert_eq!(manifest.universe_size, 4);
    assert_eq!(manifest.result_count, 2);
    assert_eq!(manifest.status_counts["APPROACHING"], 1);
    assert_eq!(manifest.config_hash, f.config.config_hash().unwrap());
    assert!(!manifest.has_synthetic);

    let (latest, results) = load_latest_scan(&f.config.scan.output_dir).unwrap();
    assert_eq!(latest, cycle.artifacts.csv);
    assert_eq!(results, report.results);

    // Lock released
    assert!(!RunLock::lock_path(&f.config.watchlist.path).exists());
}

#[test]
fn new_symbols_are_added_on_an_empty_watchlist() {
    let f = fixture();
    let cycle = run_scan_cycle(&f.config, &["RANGE", "TREND"], None, today(), now()).unwrap();

    // BOX FORMING symbols are never added
    assert_eq!(cycle.merge.added, vec!["RANGE".to_string()]);
    assert!(!cycle.ranked[0].upgraded);

    let (reloaded, _) = WatchlistStore::new(&f.config.watchlist.path).load();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get("TREND").is_none());
}

#[test]
fn corrupt_watchlist_is_backed_up_and_rebuilt() {
    let f = fixture();
    let mut bytes = WATCHLIST_COLUMNS.join(",").into_bytes();
    bytes.extend_from_slice(b"\nRANGE,2024-04-10,\xff\xfe,,WATCHING,,,,,,,,,,\n");
    std::fs::write(&f.config.watchlist.path, bytes).unwrap();

    let cycle = run_scan_cycle(&f.config, &["RANGE"], None, today(), now()).unwrap();
    let backup = cycle.watchlist_load.backup.clone().expect("corrupt file should be copied aside");
    assert!(backup.exists());
    assert_eq!(cycle.merge.added, vec!["RANGE".to_string()]);

    let (reloaded, load) = WatchlistStore::new(&f.config.watchlist.path).load();
    assert!(load.backup.is_none());
    assert_eq!(reloaded.len(), 1);
}

#[test]
fn held_lock_blocks_a_second_run() {
    let f = fixture();
    let _held = RunLock::acquire(&f.config.watchlist.path).unwrap();

    let err = run_scan_cycle(&f.config, &["RANGE"], None, today(), now()).unwrap_err();
    assert!(matches!(err, RunError::Store(StoreError::Locked { .. })));
    assert!(!f.config.watchlist.path.exists());
}

#[test]
fn synthetic_mode_flags_the_manifest() {
    let f = fixture();
    let mut config = f.config.clone();
    config.scan.offline = false;
    config.scan.synthetic = true;

    let cycle = run_scan_cycle(&config, &["RANGE", "GHOST"], None, today(), now()).unwrap();
    assert_eq!(cycle.report.synthetic, vec!["GHOST".to_string()]);

    let manifest = load_manifest(&cycle.artifacts.manifest).unwrap();
    assert!(manifest.has_synthetic);
    assert_eq!(manifest.synthetic_symbols, vec!["GHOST".to_string()]);
    // Generated bars never reach the watchlist
    assert!(cycle.market.iter().all(|r| r.symbol != "GHOST"));
    assert!(cycle.market.iter().any(|r| r.symbol == "RANGE"));
    assert!(!cycle.merge.added.contains(&"GHOST".to_string()));
    let (reloaded, _) = WatchlistStore::new(&config.watchlist.path).load();
    assert!(reloaded.get("GHOST").is_none());
    assert!(reloaded.get("RANGE").is_some());
}
