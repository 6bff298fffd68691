use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use regime_core::{Order, OrderSide, Portfolio, RegimeType, METADATA_REGIME};

use crate::commission::{CommissionModel, FixedPerFillCommission};
use crate::fill_simulator::FillSimulator;
use crate::slippage::RegimeBpsSlippage;
use crate::transaction_cost::{FixedBpsCost, TransactionCostModel};

// =============================================================================
// Regime-aware slippage end to end
// =============================================================================

#[test]
fn bear_regime_order_pays_mapped_slippage() {
    let slippage = RegimeBpsSlippage::new(5.0, HashMap::from([(RegimeType::Bear, 20.0)]));
    let simulator = FillSimulator::new(Arc::new(slippage));

    let mut order = Order::market("AAA", OrderSide::Buy, 10.0);
    order
        .metadata
        .insert(METADATA_REGIME.to_string(), "bear".to_string());

    let fill = simulator.simulate(&order, 100.0, Utc.timestamp_opt(0, 0).unwrap(), false);
    assert!((fill.price - 100.20).abs() < 1e-9);
    assert!((fill.slippage - 0.20).abs() < 1e-9);
}

// =============================================================================
// Costs settle against portfolio cash
// =============================================================================

#[test]
fn commission_and_cost_debit_cash_beyond_trade_flow() {
    let mut portfolio = Portfolio::new(100_000.0);
    let simulator = FillSimulator::new(Arc::new(crate::slippage::ZeroSlippage));

    let order = Order::market("AAA", OrderSide::Buy, 10.0);
    let mut fill = simulator.simulate(&order, 100.0, Utc.timestamp_opt(0, 0).unwrap(), false);

    // The execution path folds commission and transaction cost into the
    // fill's commission before the portfolio applies it.
    let commission = FixedPerFillCommission::new(1.0).commission(&order, &fill);
    let cost = FixedBpsCost::new(10.0).cost(&order, &fill); // 10 bps of $1000 = $1
    fill.commission = commission + cost;

    portfolio.apply_fill(&fill);

    let expected = 100_000.0 - 1_000.0 - 1.0 - 1.0;
    assert!((portfolio.cash() - expected).abs() < 1e-6);
}
