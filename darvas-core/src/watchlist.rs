//! Watchlist lifecycle: merging each run's results into durable state.
//!
//! Rows are either scanner-managed (created, updated, graduated and expired
//! by [`Watchlist::merge`]) or externally managed. External rows (open or
//! closed positions, hand-curated names, anything with a status this module
//! does not recognise) are frozen: merge never touches them and they are
//! written back exactly as read.

use crate::domain::{tier_rank, ScanResult, ScanStatus, Symbol};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

const DATE_FMT: &str = "%Y-%m-%d";

/// One persisted watchlist row, every column kept as text.
///
/// Missing columns deserialize as empty strings so older files still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchlistRow {
    pub symbol: String,
    pub date_added: String,
    pub date_updated: String,
    pub prev_status: String,
    pub status: String,
    pub box_ceiling: String,
    pub box_floor: String,
    pub box_width_pct: String,
    pub stop_loss: String,
    pub target: String,
    pub days_in_box: String,
    pub source: String,
    pub entry_price: String,
    pub qty: String,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row has no symbol")]
    MissingSymbol,
    #[error("duplicate scanner row for {symbol}")]
    DuplicateSymbol { symbol: Symbol },
}

/// Closed vocabulary of externally managed statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalKind {
    OpenPosition,
    ClosedPosition,
    Manual,
    /// Status text that is neither a scanner status nor a known external one.
    Unrecognized,
}

impl ExternalKind {
    /// Match a persisted status against the external vocabulary.
    pub fn parse(status: &str) -> Option<ExternalKind> {
        let s = status.trim().to_ascii_uppercase().replace('_', " ");
        match s.as_str() {
            "OPEN" | "OPEN POSITION" | "HOLDING" => Some(ExternalKind::OpenPosition),
            "CLOSED" | "CLOSED POSITION" | "EXITED" => Some(ExternalKind::ClosedPosition),
            "MANUAL" | "MANUAL WATCH" | "CURATED" => Some(ExternalKind::Manual),
            _ => None,
        }
    }
}

/// A row owned by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerEntry {
    pub symbol: Symbol,
    pub date_added: NaiveDate,
    pub date_updated: NaiveDate,
    pub prev_status: Option<ScanStatus>,
    pub status: ScanStatus,
    pub box_ceiling: Option<f64>,
    pub box_floor: Option<f64>,
    pub box_width_pct: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub days_in_box: Option<i64>,
    pub source: String,
    pub notes: String,
}

impl ScannerEntry {
    fn from_result(result: &ScanResult, today: NaiveDate, source: &str) -> Self {
        let mut entry = ScannerEntry {
            symbol: result.symbol.clone(),
            date_added: today,
            date_updated: today,
            prev_status: None,
            status: result.status,
            box_ceiling: None,
            box_floor: None,
            box_width_pct: None,
            stop_loss: None,
            target: None,
            days_in_box: None,
            source: source.to_string(),
            notes: String::new(),
        };
        entry.overwrite_levels(result);
        entry
    }

    fn overwrite_levels(&mut self, result: &ScanResult) {
        self.box_ceiling = result.box_ceiling;
        self.box_floor = result.box_floor;
        self.box_width_pct = result.box_width_pct;
        self.stop_loss = result.stop_loss;
        self.target = result.target;
        self.days_in_box = result.days_in_box;
    }

    fn set_status(&mut self, status: ScanStatus) {
        if self.status != status {
            self.prev_status = Some(self.status);
            self.status = status;
        }
    }

    fn to_row(&self) -> WatchlistRow {
        WatchlistRow {
            symbol: self.symbol.clone(),
            date_added: self.date_added.format(DATE_FMT).to_string(),
            date_updated: self.date_updated.format(DATE_FMT).to_string(),
            prev_status: self.prev_status.map(|s| s.to_string()).unwrap_or_default(),
            status: self.status.to_string(),
            box_ceiling: fmt_price(self.box_ceiling),
            box_floor: fmt_price(self.box_floor),
            box_width_pct: fmt_price(self.box_width_pct),
            stop_loss: fmt_price(self.stop_loss),
            target: fmt_price(self.target),
            days_in_box: self.days_in_box.map(|d| d.to_string()).unwrap_or_default(),
            source: self.source.clone(),
            entry_price: String::new(),
            qty: String::new(),
            notes: self.notes.clone(),
        }
    }
}

/// A frozen row owned by some other process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalEntry {
    pub row: WatchlistRow,
    pub kind: ExternalKind,
}

impl ExternalEntry {
    pub fn symbol(&self) -> &str {
        self.row.symbol.trim()
    }

    pub fn entry_price(&self) -> Option<f64> {
        parse_f64(&self.row.entry_price).filter(|p| *p > 0.0)
    }

    pub fn qty(&self) -> Option<u64> {
        let q = self.row.qty.trim();
        q.parse::<u64>()
            .ok()
            .or_else(|| q.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WatchlistEntry {
    Scanner(ScannerEntry),
    External(ExternalEntry),
}

impl WatchlistEntry {
    /// Interpret a persisted row.
    ///
    /// External vocabulary wins over scanner statuses. A row that claims a
    /// scanner status but lacks a readable `date_added` is kept frozen as
    /// `Unrecognized` rather than guessed at.
    pub fn from_row(row: WatchlistRow) -> Result<WatchlistEntry, RowError> {
        if row.symbol.trim().is_empty() {
            return Err(RowError::MissingSymbol);
        }

        if let Some(kind) = ExternalKind::parse(&row.status) {
            return Ok(WatchlistEntry::External(ExternalEntry { row, kind }));
        }

        let status = row.status.parse::<ScanStatus>().ok();
        let date_added = parse_date(&row.date_added);
        let (Some(status), Some(date_added)) = (status, date_added) else {
            return Ok(WatchlistEntry::External(ExternalEntry {
                row,
                kind: ExternalKind::Unrecognized,
            }));
        };

        Ok(WatchlistEntry::Scanner(ScannerEntry {
            symbol: row.symbol.trim().to_string(),
            date_added,
            date_updated: parse_date(&row.date_updated).unwrap_or(date_added),
            prev_status: row.prev_status.parse().ok(),
            status,
            box_ceiling: parse_f64(&row.box_ceiling),
            box_floor: parse_f64(&row.box_floor),
            box_width_pct: parse_f64(&row.box_width_pct),
            stop_loss: parse_f64(&row.stop_loss),
            target: parse_f64(&row.target),
            days_in_box: row.days_in_box.trim().parse().ok(),
            source: row.source,
            notes: row.notes,
        }))
    }

    pub fn to_row(&self) -> WatchlistRow {
        match self {
            WatchlistEntry::Scanner(e) => e.to_row(),
            WatchlistEntry::External(e) => e.row.clone(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            WatchlistEntry::Scanner(e) => &e.symbol,
            WatchlistEntry::External(e) => e.symbol(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, WatchlistEntry::External(_))
    }
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT).ok()
}

fn fmt_price(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.2}")).unwrap_or_default()
}

/// Lifecycle parameters for a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    /// Scanner entries older than this (from `date_added`) are dropped.
    pub expiry_days: i64,
    /// Recorded on newly created entries.
    pub source: String,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            expiry_days: 30,
            source: "darvas_scan".into(),
        }
    }
}

/// What a merge did, by symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub added: Vec<Symbol>,
    pub updated: Vec<Symbol>,
    pub refreshed: Vec<Symbol>,
    pub graduated: Vec<Symbol>,
    pub expired: Vec<Symbol>,
    pub protected: Vec<Symbol>,
}

/// Durable watchlist keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watchlist {
    entries: BTreeMap<Symbol, WatchlistEntry>,
    /// Further external rows for a symbol whose entry is already external.
    /// Written back verbatim, never merged.
    shadowed: BTreeMap<Symbol, Vec<ExternalEntry>>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted rows. Dropped rows are returned as errors
    /// alongside the watchlist.
    ///
    /// Duplicate symbols never lose an external row: an external row
    /// replaces a scanner row for the same symbol, a scanner row after an
    /// external one is dropped, and repeated external rows are all kept.
    /// Between two scanner rows the later one wins.
    pub fn from_rows(rows: impl IntoIterator<Item = WatchlistRow>) -> (Watchlist, Vec<RowError>) {
        let mut wl = Watchlist::new();
        let mut errors = Vec::new();
        for row in rows {
            let entry = match WatchlistEntry::from_row(row) {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let symbol = entry.symbol().to_string();
            let existing_protected = wl.entries.get(&symbol).map(WatchlistEntry::is_protected);
            match (existing_protected, entry) {
                (None, entry) => wl.insert(entry),
                (Some(true), WatchlistEntry::External(extra)) => {
                    warn!(symbol = %symbol, "duplicate external row kept verbatim");
                    wl.shadowed.entry(symbol).or_default().push(extra);
                }
                (Some(true), WatchlistEntry::Scanner(_)) => {
                    errors.push(RowError::DuplicateSymbol { symbol });
                }
                (Some(false), entry) => {
                    errors.push(RowError::DuplicateSymbol { symbol });
                    wl.insert(entry);
                }
            }
        }
        (wl, errors)
    }

    pub fn to_rows(&self) -> Vec<WatchlistRow> {
        let mut rows = Vec::with_capacity(self.len());
        for (symbol, entry) in &self.entries {
            rows.push(entry.to_row());
            if let Some(extra) = self.shadowed.get(symbol) {
                rows.extend(extra.iter().map(|e| e.row.clone()));
            }
        }
        rows
    }

    pub fn insert(&mut self, entry: WatchlistEntry) {
        self.entries.insert(entry.symbol().to_string(), entry);
    }

    pub fn get(&self, symbol: &str) -> Option<&WatchlistEntry> {
        self.entries.get(symbol)
    }

    /// Row count, repeated external rows included.
    pub fn len(&self) -> usize {
        self.entries.len() + self.shadowed.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WatchlistEntry> {
        self.entries.values()
    }

    /// Fold one run's results into the watchlist.
    pub fn merge(&mut self, results: &[ScanResult], today: NaiveDate, policy: &MergePolicy) -> MergeReport {
        let mut report = MergeReport::default();
        let mut touched: HashSet<Symbol> = HashSet::new();

        for result in results {
            let symbol = result.symbol.as_str();
            touched.insert(symbol.to_string());

            if let Some(WatchlistEntry::External(_)) = self.entries.get(symbol) {
                report.protected.push(symbol.to_string());
                continue;
            }

            match result.status {
                ScanStatus::FreshBreakout => {
                    if self.entries.remove(symbol).is_some() {
                        report.graduated.push(symbol.to_string());
                    }
                }
                ScanStatus::Approaching | ScanStatus::Watching => match self.entries.get_mut(symbol) {
                    Some(WatchlistEntry::Scanner(entry)) => {
                        entry.set_status(result.status);
                        entry.overwrite_levels(result);
                        entry.date_updated = today;
                        report.updated.push(symbol.to_string());
                    }
                    _ => {
                        let entry = ScannerEntry::from_result(result, today, &policy.source);
                        self.entries
                            .insert(symbol.to_string(), WatchlistEntry::Scanner(entry));
                        report.added.push(symbol.to_string());
                    }
                },
                ScanStatus::BoxForming => {
                    if let Some(WatchlistEntry::Scanner(entry)) = self.entries.get_mut(symbol) {
                        entry.status = ScanStatus::BoxForming;
                        entry.date_updated = today;
                        report.refreshed.push(symbol.to_string());
                    }
                }
            }
        }

        self.entries.retain(|symbol, entry| match entry {
            WatchlistEntry::Scanner(e)
                if !touched.contains(symbol)
                    && (today - e.date_added).num_days() > policy.expiry_days =>
            {
                report.expired.push(symbol.clone());
                false
            }
            _ => true,
        });

        report
    }
}

/// An open position whose symbol has formed a higher box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddCandidate {
    pub symbol: Symbol,
    pub entry_price: f64,
    pub qty: Option<u64>,
    pub new_ceiling: f64,
    pub gain_pct: f64,
    pub status: ScanStatus,
}

/// Open positions whose current box ceiling sits above the original entry.
pub fn check_add_candidates(watchlist: &Watchlist, results: &[ScanResult]) -> Vec<AddCandidate> {
    let by_symbol: HashMap<&str, &ScanResult> =
        results.iter().map(|r| (r.symbol.as_str(), r)).collect();

    watchlist
        .entries()
        .filter_map(|entry| match entry {
            WatchlistEntry::External(e) if e.kind == ExternalKind::OpenPosition => Some(e),
            _ => None,
        })
        .filter_map(|e| {
            let entry_price = e.entry_price()?;
            let result = by_symbol.get(e.symbol())?;
            let ceiling = result.box_ceiling?;
            let eligible = matches!(
                result.status,
                ScanStatus::Approaching | ScanStatus::FreshBreakout
            );
            (eligible && ceiling > entry_price).then(|| AddCandidate {
                symbol: e.symbol().to_string(),
                entry_price,
                qty: e.qty(),
                new_ceiling: ceiling,
                gain_pct: (ceiling - entry_price) / entry_price * 100.0,
                status: result.status,
            })
        })
        .collect()
}

/// A result paired with its pre-merge baseline status.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedResult<'a> {
    pub result: &'a ScanResult,
    pub baseline: ScanStatus,
    pub upgraded: bool,
}

/// Flag results whose status is more advanced than the watchlist baseline.
///
/// Call before [`Watchlist::merge`]: the baseline is the entry's current
/// status, which this run's merge records as `prev_status` when it changes.
/// Symbols without a scanner entry use the result's own status.
pub fn annotate_upgrades<'a>(watchlist: &Watchlist, results: &'a [ScanResult]) -> Vec<AnnotatedResult<'a>> {
    results
        .iter()
        .map(|result| {
            let baseline = match watchlist.get(&result.symbol) {
                Some(WatchlistEntry::Scanner(e)) => e.status,
                _ => result.status,
            };
            AnnotatedResult {
                result,
                baseline,
                upgraded: result.status.is_upgrade_from(baseline),
            }
        })
        .collect()
}

/// Order for display: severity, upgrades first, tier, distance, symbol.
pub fn rank_results(annotated: &mut [AnnotatedResult<'_>]) {
    annotated.sort_by(|a, b| {
        a.result
            .status
            .severity()
            .cmp(&b.result.status.severity())
            .then_with(|| b.upgraded.cmp(&a.upgraded))
            .then_with(|| tier_rank(a.result.tier).cmp(&tier_rank(b.result.tier)))
            .then_with(|| a.result.distance_or_max().total_cmp(&b.result.distance_or_max()))
            .then_with(|| a.result.symbol.cmp(&b.result.symbol))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AlertTier;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FMT).unwrap()
    }

    fn result(symbol: &str, status: ScanStatus, ceiling: f64) -> ScanResult {
        let has_box = status != ScanStatus::BoxForming;
        ScanResult {
            symbol: symbol.into(),
            status,
            tier: None,
            close: ceiling * 0.98,
            box_ceiling: has_box.then_some(ceiling),
            box_floor: has_box.then_some(ceiling * 0.9),
            box_width_pct: has_box.then_some(11.11),
            dist_to_ceil_pct: has_box.then_some(2.04),
            stop_loss: has_box.then_some(ceiling * 0.9 * 0.995),
            target: has_box.then_some(ceiling * 1.1),
            risk_pct: has_box.then_some(8.6),
            reward_risk_ratio: has_box.then_some(1.4),
            volume_ratio: 1.2,
            days_in_box: has_box.then_some(10),
            ceil_confirm_count: 1,
            floor_confirm_count: 1,
            weeks_to_confirm: (!has_box).then_some(2),
        }
    }

    fn open_position(symbol: &str, entry: &str, qty: &str) -> WatchlistRow {
        WatchlistRow {
            symbol: symbol.into(),
            date_added: "2023-11-01".into(),
            status: "OPEN_POSITION".into(),
            entry_price: entry.into(),
            qty: qty.into(),
            notes: "bought on breakout".into(),
            ..WatchlistRow::default()
        }
    }

    fn scanner(wl: &Watchlist, symbol: &str) -> ScannerEntry {
        match wl.get(symbol) {
            Some(WatchlistEntry::Scanner(e)) => e.clone(),
            other => panic!("expected scanner entry for {symbol}, got {other:?}"),
        }
    }

    #[test]
    fn new_approaching_entry_is_created() {
        let mut wl = Watchlist::new();
        let today = d("2024-03-15");
        let report = wl.merge(
            &[result("ABC", ScanStatus::Approaching, 100.0)],
            today,
            &MergePolicy::default(),
        );
        assert_eq!(report.added, vec!["ABC"]);
        let e = scanner(&wl, "ABC");
        assert_eq!(e.date_added, today);
        assert_eq!(e.prev_status, None);
        assert_eq!(e.source, "darvas_scan");
        assert_eq!(e.box_ceiling, Some(100.0));
    }

    #[test]
    fn update_records_prev_status() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("ABC", ScanStatus::Watching, 100.0)], d("2024-03-08"), &policy);
        let report = wl.merge(
            &[result("ABC", ScanStatus::Approaching, 101.0)],
            d("2024-03-15"),
            &policy,
        );
        assert_eq!(report.updated, vec!["ABC"]);
        let e = scanner(&wl, "ABC");
        assert_eq!(e.prev_status, Some(ScanStatus::Watching));
        assert_eq!(e.status, ScanStatus::Approaching);
        assert_eq!(e.box_ceiling, Some(101.0));
        assert_eq!(e.date_added, d("2024-03-08"));
        assert_eq!(e.date_updated, d("2024-03-15"));
    }

    #[test]
    fn fresh_breakout_graduates() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("ABC", ScanStatus::Approaching, 100.0)], d("2024-03-08"), &policy);
        let report = wl.merge(
            &[
                result("ABC", ScanStatus::FreshBreakout, 100.0),
                result("NEW", ScanStatus::FreshBreakout, 50.0),
            ],
            d("2024-03-15"),
            &policy,
        );
        assert_eq!(report.graduated, vec!["ABC"]);
        assert!(wl.is_empty());
    }

    #[test]
    fn box_forming_refreshes_but_never_creates() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("ABC", ScanStatus::Watching, 100.0)], d("2024-03-08"), &policy);
        wl.merge(
            &[
                result("ABC", ScanStatus::BoxForming, 0.0),
                result("XYZ", ScanStatus::BoxForming, 0.0),
            ],
            d("2024-03-15"),
            &policy,
        );
        assert!(wl.get("XYZ").is_none());
        let e = scanner(&wl, "ABC");
        assert_eq!(e.status, ScanStatus::BoxForming);
        assert_eq!(e.prev_status, None);
        assert_eq!(e.box_ceiling, Some(100.0));
        assert_eq!(e.date_updated, d("2024-03-15"));
    }

    #[test]
    fn stale_entries_expire() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("OLD", ScanStatus::Watching, 10.0)], d("2024-01-01"), &policy);
        wl.merge(&[result("KEEP", ScanStatus::Watching, 10.0)], d("2024-01-20"), &policy);
        let report = wl.merge(&[], d("2024-02-05"), &policy);
        assert_eq!(report.expired, vec!["OLD"]);
        assert!(wl.get("KEEP").is_some());
    }

    #[test]
    fn touched_entries_do_not_expire() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("OLD", ScanStatus::Watching, 10.0)], d("2024-01-01"), &policy);
        let report = wl.merge(&[result("OLD", ScanStatus::BoxForming, 0.0)], d("2024-03-01"), &policy);
        assert!(report.expired.is_empty());
        assert!(wl.get("OLD").is_some());
    }

    #[test]
    fn protected_rows_are_untouched() {
        let row = open_position("POLYCAB", "5200", "10");
        let (mut wl, errors) = Watchlist::from_rows(vec![row.clone()]);
        assert!(errors.is_empty());
        let report = wl.merge(
            &[result("POLYCAB", ScanStatus::FreshBreakout, 5600.0)],
            d("2025-06-01"),
            &MergePolicy::default(),
        );
        assert_eq!(report.protected, vec!["POLYCAB"]);
        assert!(report.expired.is_empty());
        assert_eq!(wl.to_rows(), vec![row]);
    }

    #[test]
    fn unknown_status_is_frozen_verbatim() {
        let row = WatchlistRow {
            symbol: "ODD".into(),
            status: "PARKED".into(),
            notes: "waiting on results".into(),
            ..WatchlistRow::default()
        };
        let (mut wl, _) = Watchlist::from_rows(vec![row.clone()]);
        assert!(matches!(
            wl.get("ODD"),
            Some(WatchlistEntry::External(ExternalEntry {
                kind: ExternalKind::Unrecognized,
                ..
            }))
        ));
        wl.merge(
            &[result("ODD", ScanStatus::Approaching, 10.0)],
            d("2024-03-15"),
            &MergePolicy::default(),
        );
        assert_eq!(wl.to_rows(), vec![row]);
    }

    #[test]
    fn row_round_trip_for_scanner_entry() {
        let row = WatchlistRow {
            symbol: "ABC".into(),
            date_added: "2024-03-01".into(),
            date_updated: "2024-03-08".into(),
            prev_status: "WATCHING".into(),
            status: "APPROACHING".into(),
            box_ceiling: "100.00".into(),
            box_floor: "90.00".into(),
            box_width_pct: "11.11".into(),
            stop_loss: "89.55".into(),
            target: "110.00".into(),
            days_in_box: "7".into(),
            source: "darvas_scan".into(),
            notes: "sector leader".into(),
            ..WatchlistRow::default()
        };
        let entry = WatchlistEntry::from_row(row.clone()).unwrap();
        assert!(!entry.is_protected());
        assert_eq!(entry.to_row(), row);
    }

    #[test]
    fn row_without_symbol_is_an_error() {
        let (wl, errors) = Watchlist::from_rows(vec![WatchlistRow::default()]);
        assert!(wl.is_empty());
        assert_eq!(errors, vec![RowError::MissingSymbol]);
    }

    #[test]
    fn add_candidate_above_entry() {
        let (wl, _) = Watchlist::from_rows(vec![open_position("POLYCAB", "500", "12")]);
        let c = check_add_candidates(&wl, &[result("POLYCAB", ScanStatus::Approaching, 520.0)]);
        assert_eq!(c.len(), 1);
        assert!((c[0].gain_pct - 4.0).abs() < 1e-9);
        assert_eq!(c[0].qty, Some(12));

        let none = check_add_candidates(&wl, &[result("POLYCAB", ScanStatus::Approaching, 480.0)]);
        assert!(none.is_empty());

        let watching = check_add_candidates(&wl, &[result("POLYCAB", ScanStatus::Watching, 520.0)]);
        assert!(watching.is_empty());
    }

    #[test]
    fn add_candidate_requires_entry_price() {
        let (wl, _) = Watchlist::from_rows(vec![open_position("POLYCAB", "", "")]);
        let c = check_add_candidates(&wl, &[result("POLYCAB", ScanStatus::FreshBreakout, 520.0)]);
        assert!(c.is_empty());
    }

    #[test]
    fn upgrades_use_pre_merge_baseline() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("A", ScanStatus::Watching, 10.0)], d("2024-03-01"), &policy);
        wl.merge(&[result("B", ScanStatus::Approaching, 10.0)], d("2024-03-01"), &policy);

        let today = vec![
            result("A", ScanStatus::Approaching, 10.0),
            result("B", ScanStatus::Approaching, 10.0),
            result("C", ScanStatus::FreshBreakout, 10.0),
        ];
        let annotated = annotate_upgrades(&wl, &today);
        assert!(annotated[0].upgraded);
        assert!(!annotated[1].upgraded);
        assert!(!annotated[2].upgraded);
    }

    #[test]
    fn repeated_status_is_not_an_upgrade() {
        let mut wl = Watchlist::new();
        let policy = MergePolicy::default();
        wl.merge(&[result("A", ScanStatus::Watching, 10.0)], d("2024-03-01"), &policy);
        wl.merge(&[result("A", ScanStatus::Approaching, 10.0)], d("2024-03-08"), &policy);
        assert_eq!(scanner(&wl, "A").prev_status, Some(ScanStatus::Watching));

        let again = vec![result("A", ScanStatus::Approaching, 10.0)];
        let annotated = annotate_upgrades(&wl, &again);
        assert_eq!(annotated[0].baseline, ScanStatus::Approaching);
        assert!(!annotated[0].upgraded);

        wl.merge(&again, d("2024-03-15"), &policy);
        assert!(!annotate_upgrades(&wl, &again)[0].upgraded);
        assert_eq!(scanner(&wl, "A").prev_status, Some(ScanStatus::Watching));
    }

    fn watching_row(symbol: &str) -> WatchlistRow {
        WatchlistRow {
            symbol: symbol.into(),
            date_added: "2024-02-20".into(),
            date_updated: "2024-02-27".into(),
            status: "WATCHING".into(),
            box_ceiling: "520.00".into(),
            source: "darvas_scan".into(),
            ..WatchlistRow::default()
        }
    }

    #[test]
    fn duplicate_scanner_row_never_replaces_open_position() {
        let position = open_position("POLYCAB", "500", "12");
        for rows in [
            vec![position.clone(), watching_row("POLYCAB")],
            vec![watching_row("POLYCAB"), position.clone()],
        ] {
            let (mut wl, errors) = Watchlist::from_rows(rows);
            assert_eq!(
                errors,
                vec![RowError::DuplicateSymbol {
                    symbol: "POLYCAB".into()
                }]
            );
            assert!(wl.get("POLYCAB").unwrap().is_protected());

            let report = wl.merge(
                &[result("POLYCAB", ScanStatus::FreshBreakout, 560.0)],
                d("2024-03-15"),
                &MergePolicy::default(),
            );
            assert_eq!(report.protected, vec!["POLYCAB"]);
            assert!(report.graduated.is_empty());
            assert_eq!(wl.to_rows(), vec![position.clone()]);
        }
    }

    #[test]
    fn repeated_external_rows_are_all_kept() {
        let first = open_position("POLYCAB", "500", "12");
        let second = open_position("POLYCAB", "540", "6");
        let (mut wl, errors) = Watchlist::from_rows(vec![first.clone(), second.clone()]);
        assert!(errors.is_empty());
        assert_eq!(wl.len(), 2);

        wl.merge(
            &[result("POLYCAB", ScanStatus::Approaching, 560.0)],
            d("2024-03-15"),
            &MergePolicy::default(),
        );
        assert_eq!(wl.to_rows(), vec![first, second]);
    }

    #[test]
    fn later_scanner_duplicate_wins() {
        let mut newer = watching_row("ABC");
        newer.status = "APPROACHING".into();
        let (wl, errors) = Watchlist::from_rows(vec![watching_row("ABC"), newer]);
        assert_eq!(errors.len(), 1);
        assert_eq!(scanner(&wl, "ABC").status, ScanStatus::Approaching);
    }

    #[test]
    fn ranking_puts_upgrades_and_hot_first() {
        let mut a = result("A", ScanStatus::Approaching, 10.0);
        a.tier = Some(AlertTier::Watch);
        let mut b = result("B", ScanStatus::Approaching, 10.0);
        b.tier = Some(AlertTier::Hot);
        let c = result("C", ScanStatus::Watching, 10.0);
        let f = result("F", ScanStatus::FreshBreakout, 10.0);
        let results = vec![c, a, b, f];

        let mut wl = Watchlist::new();
        wl.merge(
            &[result("A", ScanStatus::Watching, 10.0)],
            d("2024-03-01"),
            &MergePolicy::default(),
        );
        let mut annotated = annotate_upgrades(&wl, &results);
        rank_results(&mut annotated);
        let order: Vec<&str> = annotated.iter().map(|x| x.result.symbol.as_str()).collect();
        assert_eq!(order, vec!["F", "A", "B", "C"]);
    }
}
