use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata key carrying the lowercase regime label of the order's
/// originating context; selects regime-conditional risk rules and slippage.
pub const METADATA_REGIME: &str = "regime";

/// Metadata key marking a risk-reducing exit order; its presence bypasses
/// risk validation entirely.
pub const METADATA_RISK_EXIT: &str = "risk_exit";

pub type OrderId = u64;
pub type FillId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
    MarketOnClose,
    MarketOnOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
    Gtd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Invalid,
}

/// Order representation shared by the engine, risk gate, and execution
/// models. `limit_price`/`stop_price` of 0 mean "not set".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub tif: TimeInForce,
    pub quantity: f64,
    pub filled_quantity: f64,
    pub limit_price: f64,
    pub stop_price: f64,
    pub avg_fill_price: f64,
    pub status: OrderStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub strategy_id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Order {
    fn new(symbol: impl Into<String>, side: OrderSide, order_type: OrderType, quantity: f64) -> Self {
        Self {
            id: 0,
            symbol: symbol.into(),
            side,
            order_type,
            tif: TimeInForce::Day,
            quantity,
            filled_quantity: 0.0,
            limit_price: 0.0,
            stop_price: 0.0,
            avg_fill_price: 0.0,
            status: OrderStatus::Created,
            created_at: None,
            updated_at: None,
            strategy_id: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self::new(symbol, side, OrderType::Market, quantity)
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, quantity: f64, price: f64) -> Self {
        let mut order = Self::new(symbol, side, OrderType::Limit, quantity);
        order.limit_price = price;
        order
    }

    pub fn stop(symbol: impl Into<String>, side: OrderSide, quantity: f64, stop: f64) -> Self {
        let mut order = Self::new(symbol, side, OrderType::Stop, quantity);
        order.stop_price = stop;
        order
    }

    /// Signed quantity: positive for buys, negative for sells.
    pub fn signed_quantity(&self) -> f64 {
        self.quantity * self.side.sign()
    }

    pub fn regime_label(&self) -> Option<&str> {
        self.metadata.get(METADATA_REGIME).map(String::as_str)
    }

    pub fn is_risk_exit(&self) -> bool {
        self.metadata.contains_key(METADATA_RISK_EXIT)
    }
}

/// A single execution against an order. `quantity` is signed: positive
/// bought, negative sold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub order_id: OrderId,
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub commission: f64,
    pub slippage: f64,
    pub is_maker: bool,
}
