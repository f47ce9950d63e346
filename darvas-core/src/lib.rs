//! Darvas Core: box detection, signal classification, watchlist lifecycle
//! and position sizing.
//!
//! This crate contains the scanner's logic and no I/O beyond the bar
//! suppliers in [`data`]:
//! - Domain types (bars, scan results, orders) and weekly resampling
//! - ATR and volume indicators
//! - The ceiling/floor confirmation state machine
//! - Status and tier classification
//! - Watchlist merge, add-on detection and upgrade ranking
//! - Risk-based sizing and order tickets
//! - Scan-to-scan movement alerts

pub mod box_detector;
pub mod classifier;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod movement;
pub mod sizing;
pub mod watchlist;

pub use box_detector::{detect_box, BoxConfig, BoxDetection, BoxError, BoxTracker, DarvasBox, PendingLevel};
pub use classifier::{assess_signal, classify, Classification, ClassifierConfig, SignalInputs};
pub use movement::{compute_movements, MovementAlert, MovementKind};
pub use sizing::{
    build_order, hot_candidates, quantity_for_risk, round_up_to_tick, select_basket, OrderBuildError, OrderConfig,
};
pub use watchlist::{
    annotate_upgrades, check_add_candidates, rank_results, AddCandidate, AnnotatedResult, ExternalEntry, ExternalKind,
    MergePolicy, MergeReport, RowError, ScannerEntry, Watchlist, WatchlistEntry, WatchlistRow,
};
