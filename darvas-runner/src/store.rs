//! Persistent watchlist store.
//!
//! - CSV keyed by symbol, one row per entry, fixed column order
//! - Missing file reads as an empty watchlist
//! - Unreadable or corrupt file reads as empty with a warning; the bad file
//!   is copied aside first so the next save does not destroy it
//! - Saves are atomic (write `.tmp`, rename into place)
//! - [`RunLock`] gives one run exclusive ownership for read-merge-write

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use darvas_core::{Watchlist, WatchlistRow};
use thiserror::Error;
use tracing::{info, warn};

/// Column order of the persisted file.
pub const WATCHLIST_COLUMNS: [&str; 15] = [
    "symbol",
    "date_added",
    "date_updated",
    "prev_status",
    "status",
    "box_ceiling",
    "box_floor",
    "box_width_pct",
    "stop_loss",
    "target",
    "days_in_box",
    "source",
    "entry_price",
    "qty",
    "notes",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("watchlist {path} is locked by another run (remove {lock} if no scan is running)")]
    Locked { path: String, lock: String },

    #[error("watchlist I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("watchlist CSV: {0}")]
    Csv(#[from] csv::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// What a load found, beyond the entries themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows dropped for having no symbol.
    pub rejected_rows: usize,
    /// Where a corrupt file was copied before being treated as empty.
    pub backup: Option<PathBuf>,
}

/// CSV-backed watchlist.
#[derive(Debug, Clone)]
pub struct WatchlistStore {
    path: PathBuf,
}

impl WatchlistStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the watchlist. Never fails: every problem degrades to fewer entries.
    pub fn load(&self) -> (Watchlist, LoadReport) {
        let mut report = LoadReport::default();
        if !self.path.exists() {
            info!(path = %self.path.display(), "no watchlist yet, starting empty");
            return (Watchlist::new(), report);
        }

        let rows = match self.read_rows() {
            Ok(rows) => rows,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "watchlist unreadable, starting empty");
                report.backup = self.backup_corrupt();
                return (Watchlist::new(), report);
            }
        };

        let (watchlist, errors) = Watchlist::from_rows(rows);
        for e in &errors {
            warn!(path = %self.path.display(), error = %e, "dropping watchlist row");
        }
        report.rejected_rows = errors.len();
        (watchlist, report)
    }

    fn read_rows(&self) -> Result<Vec<WatchlistRow>, StoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)?;
        let rows = rdr.deserialize::<WatchlistRow>().collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn backup_corrupt(&self) -> Option<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup = self.path.with_extension(format!("csv.corrupt-{stamp}"));
        match fs::copy(&self.path, &backup) {
            Ok(_) => {
                warn!(backup = %backup.display(), "corrupt watchlist copied aside");
                Some(backup)
            }
            Err(e) => {
                warn!(error = %e, "failed to back up corrupt watchlist");
                None
            }
        }
    }

    /// Rewrite the whole file atomically.
    pub fn save(&self, watchlist: &Watchlist) -> Result<(), StoreError> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
        wtr.write_record(WATCHLIST_COLUMNS)?;
        for row in watchlist.to_rows() {
            wtr.serialize(row)?;
        }
        let data = wtr.into_inner().map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            source: e.into_error(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, &data).map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            io_err(&self.path)(e)
        })?;
        info!(path = %self.path.display(), entries = watchlist.len(), "watchlist saved");
        Ok(())
    }

    /// Take the exclusive run lock for this store.
    pub fn lock(&self) -> Result<RunLock, StoreError> {
        RunLock::acquire(&self.path)
    }
}

/// Exclusive lock file next to the watchlist, released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn lock_path(store_path: &Path) -> PathBuf {
        store_path.with_extension("csv.lock")
    }

    pub fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        let path = Self::lock_path(store_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked {
                    path: store_path.display().to_string(),
                    lock: path.display().to_string(),
                })
            }
            Err(e) => return Err(io_err(&path)(e)),
        };
        let _ = writeln!(
            file,
            "pid={} since={}",
            std::process::id(),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
