//! Order ticket produced by the sizer and consumed by an order sink.

use super::status::AlertTier;
use super::Symbol;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Submission state of an order ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Built, not yet handed to a sink.
    #[serde(rename = "PENDING")]
    Pending,
    /// Recorded without submission.
    #[serde(rename = "DRY_RUN")]
    DryRun,
    /// Accepted by the sink; `order_id` is set.
    #[serde(rename = "PLACED")]
    Placed,
    /// Rejected or failed in transit; `error` is set.
    #[serde(rename = "ERROR")]
    Error,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::DryRun => "DRY_RUN",
            OrderStatus::Placed => "PLACED",
            OrderStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// A buy-limit ticket sized by risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: Symbol,
    pub action: OrderAction,
    pub order_type: OrderKind,
    pub product: String,
    pub exchange: String,
    pub validity: String,
    pub ceiling: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub quantity: u64,
    pub capital: f64,
    pub risk_amount: f64,
    pub reward_amount: f64,
    pub reward_risk_ratio: f64,
    pub tier: Option<AlertTier>,
    pub days_in_box: Option<i64>,
    pub volume_ratio: f64,
    pub status: OrderStatus,
    pub order_id: Option<String>,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Order {
    /// Recompute capital, risk, reward and ratio from price levels and quantity.
    pub(crate) fn recompute_financials(&mut self) {
        let qty = self.quantity as f64;
        let risk_per_share = self.entry_price - self.stop_loss;
        let reward_per_share = self.target - self.entry_price;

        self.capital = round2(self.entry_price * qty);
        self.risk_amount = round2(risk_per_share * qty);
        self.reward_amount = round2(reward_per_share * qty);
        self.reward_risk_ratio = if risk_per_share > 0.0 {
            round2(reward_per_share / risk_per_share)
        } else {
            0.0
        };
    }

    pub fn mark_dry_run(&mut self) {
        self.status = OrderStatus::DryRun;
    }

    pub fn mark_placed(&mut self, order_id: String) {
        self.status = OrderStatus::Placed;
        self.order_id = Some(order_id);
        self.error = None;
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = OrderStatus::Error;
        self.error = Some(message.into());
    }
}

/// Round to two decimal places (currency precision).
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
