//! Domain types for the Darvas scanner

pub mod bar;
pub mod order;
pub mod scan_result;
pub mod status;

pub use bar::{period_end, resample_weekly, Bar};
pub use order::{round2, Order, OrderAction, OrderKind, OrderStatus};
pub use scan_result::ScanResult;
pub use status::{tier_rank, AlertTier, ParseLabelError, ScanStatus};

/// Symbol type alias
pub type Symbol = String;
