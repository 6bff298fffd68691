use std::collections::HashSet;
use std::sync::Mutex;

use regime_core::{Fill, Order, OrderId};

/// Venue/transaction cost charged per fill, on top of commission.
pub trait TransactionCostModel: Send + Sync {
    fn cost(&self, order: &Order, fill: &Fill) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroTransactionCost;

impl TransactionCostModel for ZeroTransactionCost {
    fn cost(&self, _order: &Order, _fill: &Fill) -> f64 {
        0.0
    }
}

/// Basis points of fill notional.
#[derive(Debug, Clone, Copy)]
pub struct FixedBpsCost {
    bps: f64,
}

impl FixedBpsCost {
    pub fn new(bps: f64) -> Self {
        Self { bps }
    }
}

impl TransactionCostModel for FixedBpsCost {
    fn cost(&self, _order: &Order, fill: &Fill) -> f64 {
        (fill.price * fill.quantity).abs() * self.bps / 10_000.0
    }
}

/// Flat rate per share.
#[derive(Debug, Clone, Copy)]
pub struct PerShareCost {
    rate_per_share: f64,
}

impl PerShareCost {
    pub fn new(rate_per_share: f64) -> Self {
        Self { rate_per_share }
    }
}

impl TransactionCostModel for PerShareCost {
    fn cost(&self, _order: &Order, fill: &Fill) -> f64 {
        fill.quantity.abs() * self.rate_per_share
    }
}

/// Flat cost charged exactly once per distinct order id. The charged set
/// is mutex-guarded; this is one of the few places parallel callers are
/// admitted.
pub struct PerOrderCost {
    cost_per_order: f64,
    charged_orders: Mutex<HashSet<OrderId>>,
}

impl PerOrderCost {
    pub fn new(cost_per_order: f64) -> Self {
        Self {
            cost_per_order,
            charged_orders: Mutex::new(HashSet::new()),
        }
    }
}

impl TransactionCostModel for PerOrderCost {
    fn cost(&self, order: &Order, _fill: &Fill) -> f64 {
        let mut charged = self.charged_orders.lock().expect("charged orders lock");
        if charged.insert(order.id) {
            self.cost_per_order
        } else {
            0.0
        }
    }
}

/// One tier of a tiered bps schedule. `max_notional <= 0` marks the
/// catch-all tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostTier {
    pub max_notional: f64,
    pub bps: f64,
}

/// Tiered basis-points schedule.
///
/// Tiers are supplied in priority order: thresholds ascending, with the
/// optional catch-all (`max_notional <= 0`) last. The first tier covering
/// the notional applies; an unmatched notional falls back to the last
/// tier.
#[derive(Debug, Clone)]
pub struct TieredBpsCost {
    tiers: Vec<CostTier>,
}

impl TieredBpsCost {
    pub fn new(tiers: Vec<CostTier>) -> Self {
        Self { tiers }
    }
}

impl TransactionCostModel for TieredBpsCost {
    fn cost(&self, _order: &Order, fill: &Fill) -> f64 {
        let Some(last) = self.tiers.last() else {
            return 0.0;
        };
        let notional = (fill.price * fill.quantity).abs();
        let mut bps = last.bps;
        for tier in &self.tiers {
            if tier.max_notional <= 0.0 || notional <= tier.max_notional {
                bps = tier.bps;
                break;
            }
        }
        notional * bps / 10_000.0
    }
}
