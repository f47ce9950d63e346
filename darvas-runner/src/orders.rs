//! Order phase: basket building, broker submission and the single-order path.
//!
//! Submission goes through the [`OrderSink`] trait so the REST client can be
//! swapped for a mock. Every order's outcome is independent: a rejected or
//! failed order is marked `ERROR` and the rest of the batch continues.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use darvas_core::domain::{Order, OrderStatus, ScanResult};
use darvas_core::{build_order, hot_candidates, select_basket, OrderBuildError, OrderConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::BrokerSettings;

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("order rejected by broker: {0}")]
    Rejected(String),

    #[error("broker returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("broker unreachable: {0}")]
    Transport(String),

    #[error("unexpected broker response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    #[error("missing broker credentials: {}", .vars.join(", "))]
    Missing { vars: Vec<&'static str> },
}

#[derive(Debug, Error)]
pub enum PlaceError {
    #[error("{symbol} not found in latest scan (available: {available})")]
    NotInScan { symbol: String, available: String },

    #[error(transparent)]
    Build(#[from] OrderBuildError),
}

// ─── Audit tags ─────────────────────────────────────────────────────

/// Batch label in the order audit file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditTag {
    #[serde(rename = "DRYRUN")]
    DryRun,
    Live,
    #[serde(rename = "SINGLE_DRYRUN")]
    SingleDryRun,
    SingleLive,
}

impl AuditTag {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditTag::DryRun => "DRYRUN",
            AuditTag::Live => "LIVE",
            AuditTag::SingleDryRun => "SINGLE_DRYRUN",
            AuditTag::SingleLive => "SINGLE_LIVE",
        }
    }
}

impl fmt::Display for AuditTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Sink trait ─────────────────────────────────────────────────────

/// Broker order submission.
pub trait OrderSink: Send + Sync {
    fn name(&self) -> &str;

    /// Submit one order; returns the broker's order id.
    fn submit(&self, order: &Order) -> Result<String, SinkError>;
}

/// How a batch is handled: previewed only, or sent to a sink.
#[derive(Clone, Copy)]
pub enum Submission<'a> {
    DryRun,
    Live(&'a dyn OrderSink),
}

impl Submission<'_> {
    pub fn is_live(&self) -> bool {
        matches!(self, Submission::Live(_))
    }

    pub fn audit_tag(&self, single: bool) -> AuditTag {
        match (self.is_live(), single) {
            (false, false) => AuditTag::DryRun,
            (true, false) => AuditTag::Live,
            (false, true) => AuditTag::SingleDryRun,
            (true, true) => AuditTag::SingleLive,
        }
    }
}

fn submit_one(order: &mut Order, submission: Submission<'_>) {
    match submission {
        Submission::DryRun => order.mark_dry_run(),
        Submission::Live(sink) => match sink.submit(order) {
            Ok(id) => {
                info!(symbol = %order.symbol, order_id = %id, entry = order.entry_price, qty = order.quantity, "order placed");
                order.mark_placed(id);
            }
            Err(e) => {
                error!(symbol = %order.symbol, error = %e, "order failed");
                order.mark_error(e.to_string());
            }
        },
    }
}

// ─── Basket ─────────────────────────────────────────────────────────

/// One basket run.
#[derive(Debug, Clone, Default)]
pub struct BasketOutcome {
    pub orders: Vec<Order>,
    /// HOT candidates before the `max_orders` cap.
    pub candidates: usize,
    /// Candidates dropped by the cap.
    pub capped: usize,
    /// Candidates that could not become orders.
    pub build_errors: Vec<OrderBuildError>,
}

impl BasketOutcome {
    pub fn count(&self, status: OrderStatus) -> usize {
        self.orders.iter().filter(|o| o.status == status).count()
    }

    pub fn total_capital(&self) -> f64 {
        self.orders.iter().map(|o| o.capital).sum()
    }

    pub fn total_risk(&self) -> f64 {
        self.orders.iter().map(|o| o.risk_amount).sum()
    }

    pub fn total_reward(&self) -> f64 {
        self.orders.iter().map(|o| o.reward_amount).sum()
    }
}

/// Build pending orders for the HOT APPROACHING results, capped by distance.
pub fn build_basket(results: &[ScanResult], config: &OrderConfig, now: NaiveDateTime) -> BasketOutcome {
    let candidates = hot_candidates(results);
    let total = candidates.len();
    let selected = select_basket(candidates, config.max_orders);
    let capped = total - selected.len();
    if capped > 0 {
        warn!(candidates = total, max = config.max_orders, "basket capped, keeping closest to ceiling");
    }

    let mut outcome = BasketOutcome {
        candidates: total,
        capped,
        ..BasketOutcome::default()
    };
    for r in selected {
        match build_order(r, config, now) {
            Ok(order) => outcome.orders.push(order),
            Err(e) => {
                warn!(error = %e, "candidate skipped");
                outcome.build_errors.push(e);
            }
        }
    }
    outcome
}

/// Build the basket and submit (or preview) each order independently.
pub fn place_basket(
    results: &[ScanResult],
    config: &OrderConfig,
    submission: Submission<'_>,
    now: NaiveDateTime,
) -> BasketOutcome {
    let mut outcome = build_basket(results, config, now);
    if submission.is_live() {
        info!(orders = outcome.orders.len(), "placing live orders");
    }
    for order in &mut outcome.orders {
        submit_one(order, submission);
    }
    outcome
}

/// One symbol from a scan, with a manual quantity.
///
/// Live orders get their entry limit rounded up to `tick_size`.
pub fn place_single(
    results: &[ScanResult],
    symbol: &str,
    quantity: u64,
    config: &OrderConfig,
    submission: Submission<'_>,
    now: NaiveDateTime,
) -> Result<Order, PlaceError> {
    let Some(result) = results.iter().find(|r| r.symbol.eq_ignore_ascii_case(symbol)) else {
        let available: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
        return Err(PlaceError::NotInScan {
            symbol: symbol.to_uppercase(),
            available: available.join(", "),
        });
    };

    let mut order = build_order(result, config, now)?.with_quantity(quantity)?;
    if submission.is_live() {
        let before = order.entry_price;
        order = order.with_entry_tick(config.tick_size);
        if order.entry_price != before {
            info!(symbol = %order.symbol, from = before, to = order.entry_price, tick = config.tick_size, "entry snapped to tick");
        }
    }
    submit_one(&mut order, submission);
    Ok(order)
}

// ─── Credentials ────────────────────────────────────────────────────

pub const ENV_API_KEY: &str = "DARVAS_BROKER_API_KEY";
pub const ENV_API_SECRET: &str = "DARVAS_BROKER_API_SECRET";
pub const ENV_SESSION_TOKEN: &str = "DARVAS_BROKER_SESSION_TOKEN";
pub const ENV_URL: &str = "DARVAS_BROKER_URL";

/// Broker credentials. The session token is refreshed daily at the broker.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub session_token: String,
    pub base_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("session_token", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, CredentialsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve every variable through `lookup`, reporting all missing ones.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CredentialsError> {
        let mut missing = Vec::new();
        let mut get = |var: &'static str| {
            let value = lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            if value.is_none() {
                missing.push(var);
            }
            value.unwrap_or_default()
        };
        let creds = Credentials {
            api_key: get(ENV_API_KEY),
            api_secret: get(ENV_API_SECRET),
            session_token: get(ENV_SESSION_TOKEN),
            base_url: get(ENV_URL),
        };
        if missing.is_empty() {
            Ok(creds)
        } else {
            Err(CredentialsError::Missing { vars: missing })
        }
    }
}

// ─── REST sink ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct PlaceOrderRequest<'a> {
    stock_code: &'a str,
    exchange_code: &'a str,
    product: &'a str,
    action: &'a str,
    order_type: &'a str,
    quantity: String,
    price: String,
    validity: &'a str,
    user_remark: String,
}

#[derive(Debug, Deserialize)]
struct BrokerResponse {
    #[serde(rename = "Success", default)]
    success: Option<BrokerAck>,
    #[serde(rename = "Error", default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BrokerAck {
    #[serde(default)]
    order_id: Option<String>,
}

/// Posts orders as JSON to `{base_url}/order`.
///
/// Requests are signed with a BLAKE3 checksum over timestamp, body and the
/// API secret.
pub struct RestOrderSink {
    client: reqwest::blocking::Client,
    credentials: Credentials,
    remark_prefix: String,
    stock_codes: BTreeMap<String, String>,
}

impl RestOrderSink {
    pub fn new(credentials: Credentials, settings: &BrokerSettings) -> Result<Self, SinkError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| SinkError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            credentials,
            remark_prefix: settings.remark_prefix.clone(),
            stock_codes: settings.stock_codes.clone(),
        })
    }

    fn stock_code<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.stock_codes.get(symbol).map(String::as_str).unwrap_or(symbol)
    }

    fn request_body(&self, order: &Order) -> Result<String, SinkError> {
        let request = PlaceOrderRequest {
            stock_code: self.stock_code(&order.symbol),
            exchange_code: &order.exchange,
            product: &order.product,
            action: "buy",
            order_type: "limit",
            quantity: order.quantity.to_string(),
            price: format!("{:.2}", order.entry_price),
            validity: &order.validity,
            user_remark: format!("{}{}", self.remark_prefix, order.created_at.format("%Y%m%d")),
        };
        serde_json::to_string(&request).map_err(|e| SinkError::InvalidResponse(format!("encode request: {e}")))
    }

    fn checksum(&self, timestamp: &str, body: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(timestamp.as_bytes());
        hasher.update(body.as_bytes());
        hasher.update(self.credentials.api_secret.as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Interpret the broker's JSON reply.
fn parse_broker_response(body: &str) -> Result<String, SinkError> {
    let resp: BrokerResponse =
        serde_json::from_str(body).map_err(|e| SinkError::InvalidResponse(format!("{e}: {body}")))?;
    match resp.error {
        Some(serde_json::Value::Null) | None => {}
        Some(serde_json::Value::String(msg)) => return Err(SinkError::Rejected(msg)),
        Some(other) => return Err(SinkError::Rejected(other.to_string())),
    }
    resp.success
        .and_then(|ack| ack.order_id)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SinkError::InvalidResponse(format!("no order_id in {body}")))
}

impl OrderSink for RestOrderSink {
    fn name(&self) -> &str {
        "rest"
    }

    fn submit(&self, order: &Order) -> Result<String, SinkError> {
        let body = self.request_body(order)?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S.000Z").to_string();
        let url = format!("{}/order", self.credentials.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("X-AppKey", &self.credentials.api_key)
            .header("X-SessionToken", &self.credentials.session_token)
            .header("X-Timestamp", &timestamp)
            .header("X-Checksum", self.checksum(&timestamp, &body))
            .body(body)
            .send()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().map_err(|e| SinkError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SinkError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        parse_broker_response(&text)
    }
}
