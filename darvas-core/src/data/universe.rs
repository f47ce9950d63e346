//! Scan universe: the list of symbols to classify.
//!
//! Two file formats are accepted:
//! - plain text, one symbol per line, `#` starts a comment
//! - TOML with sectors: `[sectors]` mapping a sector name to a symbol list

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("read universe file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse universe TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("universe is empty")]
    Empty,
}

/// Symbols grouped by sector. Plain-text files land in a single `all` sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    pub sectors: BTreeMap<String, Vec<String>>,
}

impl Universe {
    /// Load a universe, choosing the format from the file extension.
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        let content = std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml(&content)
        } else {
            Self::from_text(&content)
        }
    }

    /// Parse a sector-organised TOML universe.
    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let mut u: Universe = toml::from_str(content)?;
        for symbols in u.sectors.values_mut() {
            *symbols = symbols.iter().filter_map(|s| clean_symbol(s)).collect();
        }
        if u.ticker_count() == 0 {
            return Err(UniverseError::Empty);
        }
        Ok(u)
    }

    /// Parse a one-symbol-per-line list.
    pub fn from_text(content: &str) -> Result<Self, UniverseError> {
        let symbols: Vec<String> = content
            .lines()
            .map(|line| line.split('#').next().unwrap_or(""))
            .flat_map(|line| line.split(','))
            .filter_map(clean_symbol)
            .collect();
        Self::from_symbols(symbols)
    }

    /// Wrap an explicit symbol list.
    pub fn from_symbols(symbols: impl IntoIterator<Item = String>) -> Result<Self, UniverseError> {
        let symbols: Vec<String> = symbols.into_iter().filter_map(|s| clean_symbol(&s)).collect();
        if symbols.is_empty() {
            return Err(UniverseError::Empty);
        }
        let mut sectors = BTreeMap::new();
        sectors.insert("all".to_string(), symbols);
        Ok(Self { sectors })
    }

    /// Every symbol once, in sector then file order.
    pub fn all_tickers(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.sectors
            .values()
            .flat_map(|tickers| tickers.iter().map(|t| t.as_str()))
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// Get tickers for a specific sector.
    pub fn sector_tickers(&self, sector: &str) -> Option<&[String]> {
        self.sectors.get(sector).map(|v| v.as_slice())
    }

    /// Sector a symbol belongs to, if any.
    pub fn sector_of(&self, symbol: &str) -> Option<&str> {
        self.sectors
            .iter()
            .find(|(_, tickers)| tickers.iter().any(|t| t == symbol))
            .map(|(name, _)| name.as_str())
    }

    /// Total number of tickers (duplicates across sectors counted once).
    pub fn ticker_count(&self) -> usize {
        self.all_tickers().len()
    }
}

fn clean_symbol(raw: &str) -> Option<String> {
    let s = raw.trim().to_ascii_uppercase();
    (!s.is_empty()).then_some(s)
}
