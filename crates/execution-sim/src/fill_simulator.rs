use std::sync::Arc;

use chrono::{DateTime, Utc};
use regime_core::{Fill, Order};

use crate::slippage::SlippageModel;

/// Produces one signed fill per order at the slippage-adjusted price.
///
/// Commission is left at zero here; the execution path layers commission
/// and transaction cost on afterwards.
pub struct FillSimulator {
    slippage: Arc<dyn SlippageModel>,
}

impl FillSimulator {
    pub fn new(slippage: Arc<dyn SlippageModel>) -> Self {
        Self { slippage }
    }

    pub fn simulate(
        &self,
        order: &Order,
        reference_price: f64,
        timestamp: DateTime<Utc>,
        is_maker: bool,
    ) -> Fill {
        let price = self.slippage.execution_price(order, reference_price);
        Fill {
            id: 0,
            order_id: order.id,
            symbol: order.symbol.clone(),
            quantity: order.signed_quantity(),
            price,
            timestamp,
            commission: 0.0,
            slippage: price - reference_price,
            is_maker,
        }
    }
}

/// Produces fills for an order against a reference price.
pub trait ExecutionModel: Send {
    fn execute(&mut self, order: &Order, reference_price: f64, timestamp: DateTime<Utc>)
        -> Vec<Fill>;
}

/// Reference-price executor: a single simulated fill per order.
pub struct BasicExecutionModel {
    simulator: FillSimulator,
}

impl BasicExecutionModel {
    pub fn new(slippage: Arc<dyn SlippageModel>) -> Self {
        Self {
            simulator: FillSimulator::new(slippage),
        }
    }
}

impl ExecutionModel for BasicExecutionModel {
    fn execute(
        &mut self,
        order: &Order,
        reference_price: f64,
        timestamp: DateTime<Utc>,
    ) -> Vec<Fill> {
        vec![self.simulator.simulate(order, reference_price, timestamp, false)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slippage::{FixedBpsSlippage, ZeroSlippage};
    use chrono::TimeZone;
    use regime_core::OrderSide;

    fn ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_000, 0).unwrap()
    }

    #[test]
    fn buy_fill_is_positive_sell_fill_negative() {
        let simulator = FillSimulator::new(Arc::new(ZeroSlippage));

        let buy = Order::market("AAA", OrderSide::Buy, 10.0);
        let fill = simulator.simulate(&buy, 100.0, ts(), false);
        assert_eq!(fill.quantity, 10.0);
        assert_eq!(fill.price, 100.0);
        assert_eq!(fill.slippage, 0.0);

        let sell = Order::market("AAA", OrderSide::Sell, 10.0);
        let fill = simulator.simulate(&sell, 100.0, ts(), true);
        assert_eq!(fill.quantity, -10.0);
        assert!(fill.is_maker);
    }

    #[test]
    fn fill_records_slippage_delta() {
        let simulator = FillSimulator::new(Arc::new(FixedBpsSlippage::new(10.0)));
        let order = Order::market("AAA", OrderSide::Buy, 10.0);
        let fill = simulator.simulate(&order, 100.0, ts(), false);

        assert!((fill.price - 100.10).abs() < 1e-9);
        assert!((fill.slippage - 0.10).abs() < 1e-9);
    }

    #[test]
    fn basic_execution_produces_one_fill() {
        let mut model = BasicExecutionModel::new(Arc::new(ZeroSlippage));
        let order = Order::market("AAA", OrderSide::Buy, 5.0);
        let fills = model.execute(&order, 50.0, ts());
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 5.0);
    }
}
