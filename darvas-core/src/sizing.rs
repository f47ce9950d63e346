//! Risk-based position sizing and order ticket construction.
//!
//! Quantity is chosen so that a stop-out loses at most `risk_per_trade`.
//! Entry is a buy limit a small buffer above the box ceiling.

use crate::domain::{round2, AlertTier, Order, OrderAction, OrderKind, OrderStatus, ScanResult, ScanStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Order construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderConfig {
    /// Entry limit above the ceiling, in percent.
    pub entry_buffer_pct: f64,
    /// Maximum loss per trade at the stop, in account currency.
    pub risk_per_trade: f64,
    /// Basket cap per run.
    pub max_orders: usize,
    pub product: String,
    pub exchange: String,
    pub validity: String,
    /// Exchange price tick used when submitting a single order.
    pub tick_size: f64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            entry_buffer_pct: 0.3,
            risk_per_trade: 5000.0,
            max_orders: 5,
            product: "cash".into(),
            exchange: "NSE".into(),
            validity: "day".into(),
            tick_size: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderBuildError {
    #[error("{symbol}: result has no confirmed box")]
    MissingBox { symbol: String },

    #[error("{symbol}: quantity must be at least 1")]
    ZeroQuantity { symbol: String },
}

/// Shares to buy so that `(entry - stop) * qty <= max_risk`, floored, min 1.
///
/// Returns 1 when per-share risk is zero or negative.
pub fn quantity_for_risk(entry: f64, stop: f64, max_risk: f64) -> u64 {
    let per_share = entry - stop;
    if per_share <= 0.0 {
        return 1;
    }
    let qty = (max_risk / per_share).floor();
    if qty.is_finite() && qty >= 1.0 {
        qty as u64
    } else {
        1
    }
}

/// Round `price` up to the next multiple of `tick`, at currency precision.
pub fn round_up_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return round2(price);
    }
    // Snap first so representation noise (e.g. 100.00000001) doesn't add a tick.
    let steps = (price / tick * 1e4).round() / 1e4;
    round2(steps.ceil() * tick)
}

/// Results eligible for a breakout-capture basket: APPROACHING with a HOT tier.
pub fn hot_candidates(results: &[ScanResult]) -> Vec<&ScanResult> {
    results
        .iter()
        .filter(|r| r.status == ScanStatus::Approaching && r.tier == Some(AlertTier::Hot))
        .collect()
}

/// Keep at most `max_orders` candidates, closest to their ceiling first.
pub fn select_basket<'a>(mut candidates: Vec<&'a ScanResult>, max_orders: usize) -> Vec<&'a ScanResult> {
    candidates.sort_by(|a, b| {
        a.distance_or_max()
            .total_cmp(&b.distance_or_max())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    candidates.truncate(max_orders);
    candidates
}

/// Build a pending buy-limit order from a classified result.
pub fn build_order(
    result: &ScanResult,
    config: &OrderConfig,
    created_at: NaiveDateTime,
) -> Result<Order, OrderBuildError> {
    let (Some(ceiling), Some(stop_loss), Some(target)) =
        (result.box_ceiling, result.stop_loss, result.target)
    else {
        return Err(OrderBuildError::MissingBox {
            symbol: result.symbol.clone(),
        });
    };

    let entry_price = round2(ceiling * (1.0 + config.entry_buffer_pct / 100.0));
    let stop_loss = round2(stop_loss);
    let target = round2(target);

    let mut order = Order {
        symbol: result.symbol.clone(),
        action: OrderAction::Buy,
        order_type: OrderKind::Limit,
        product: config.product.clone(),
        exchange: config.exchange.clone(),
        validity: config.validity.clone(),
        ceiling: round2(ceiling),
        entry_price,
        stop_loss,
        target,
        quantity: quantity_for_risk(entry_price, stop_loss, config.risk_per_trade),
        capital: 0.0,
        risk_amount: 0.0,
        reward_amount: 0.0,
        reward_risk_ratio: 0.0,
        tier: result.tier,
        days_in_box: result.days_in_box,
        volume_ratio: round2(result.volume_ratio),
        status: OrderStatus::Pending,
        order_id: None,
        error: None,
        created_at,
    };
    order.recompute_financials();
    Ok(order)
}

impl Order {
    /// Replace the risk-derived quantity with a manual one and recompute
    /// capital, risk, reward and ratio.
    pub fn with_quantity(mut self, quantity: u64) -> Result<Order, OrderBuildError> {
        if quantity == 0 {
            return Err(OrderBuildError::ZeroQuantity {
                symbol: self.symbol,
            });
        }
        self.quantity = quantity;
        self.recompute_financials();
        Ok(self)
    }

    /// Snap the entry limit up to the exchange tick and recompute financials.
    pub fn with_entry_tick(mut self, tick: f64) -> Order {
        self.entry_price = round_up_to_tick(self.entry_price, tick);
        self.recompute_financials();
        self
    }
}
