use regime_core::{Fill, Order};

/// Broker commission charged per fill.
pub trait CommissionModel: Send + Sync {
    fn commission(&self, order: &Order, fill: &Fill) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCommission;

impl CommissionModel for ZeroCommission {
    fn commission(&self, _order: &Order, _fill: &Fill) -> f64 {
        0.0
    }
}

/// Flat amount per fill.
#[derive(Debug, Clone, Copy)]
pub struct FixedPerFillCommission {
    amount: f64,
}

impl FixedPerFillCommission {
    pub fn new(amount: f64) -> Self {
        Self { amount }
    }
}

impl CommissionModel for FixedPerFillCommission {
    fn commission(&self, _order: &Order, _fill: &Fill) -> f64 {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use regime_core::OrderSide;

    fn fill() -> Fill {
        Fill {
            id: 0,
            order_id: 1,
            symbol: "AAA".to_string(),
            quantity: 10.0,
            price: 100.0,
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            commission: 0.0,
            slippage: 0.0,
            is_maker: false,
        }
    }

    #[test]
    fn fixed_per_fill_charges_flat_amount() {
        let order = Order::market("AAA", OrderSide::Buy, 10.0);
        assert_eq!(ZeroCommission.commission(&order, &fill()), 0.0);
        assert_eq!(
            FixedPerFillCommission::new(1.25).commission(&order, &fill()),
            1.25
        );
    }
}
