pub mod commission;
pub mod factory;
pub mod fill_simulator;
pub mod latency;
pub mod slippage;
pub mod transaction_cost;

#[cfg(test)]
mod tests;

pub use commission::{CommissionModel, FixedPerFillCommission, ZeroCommission};
pub use factory::{
    commission_from_config, execution_from_config, latency_from_config, slippage_from_config,
    transaction_cost_from_config,
};
pub use fill_simulator::{BasicExecutionModel, ExecutionModel, FillSimulator};
pub use latency::{FixedLatency, LatencyModel};
pub use slippage::{FixedBpsSlippage, RegimeBpsSlippage, SlippageModel, ZeroSlippage};
pub use transaction_cost::{
    CostTier, FixedBpsCost, PerOrderCost, PerShareCost, TieredBpsCost, TransactionCostModel,
    ZeroTransactionCost,
};
