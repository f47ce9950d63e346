//! Bar suppliers: Yahoo Finance, the CSV bar cache, synthetic bars, plus the
//! scan universe.

pub mod circuit_breaker;
pub mod csv_store;
pub mod provider;
pub mod synthetic;
pub mod universe;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_store::{CacheMeta, CoverageResult, CsvBarStore};
pub use provider::{
    normalize_bars, DataError, DataProvider, DataSource, DownloadProgress, FetchResult, StdoutProgress,
};
pub use synthetic::{generate_synthetic_bars, SyntheticProvider};
pub use universe::{Universe, UniverseError};
pub use yahoo::YahooProvider;
