use std::collections::HashMap;
use std::sync::Arc;

use regime_core::{Config, RegimeType};

use crate::commission::{CommissionModel, FixedPerFillCommission, ZeroCommission};
use crate::fill_simulator::{BasicExecutionModel, ExecutionModel};
use crate::latency::FixedLatency;
use crate::slippage::{FixedBpsSlippage, RegimeBpsSlippage, SlippageModel, ZeroSlippage};
use crate::transaction_cost::{
    CostTier, FixedBpsCost, PerOrderCost, PerShareCost, TieredBpsCost, TransactionCostModel,
    ZeroTransactionCost,
};

/// Build a slippage model from `slippage.*` keys; unknown types fall back
/// to zero slippage.
pub fn slippage_from_config(config: &Config) -> Arc<dyn SlippageModel> {
    match config.get_str("slippage.type").unwrap_or("zero") {
        "fixed_bps" => {
            let bps = config.get_f64("slippage.bps").unwrap_or(0.0);
            Arc::new(FixedBpsSlippage::new(bps))
        }
        "regime_bps" => {
            let default_bps = config.get_f64("slippage.default_bps").unwrap_or(0.0);
            let mut map = HashMap::new();
            for regime in [
                RegimeType::Bull,
                RegimeType::Neutral,
                RegimeType::Bear,
                RegimeType::Crisis,
            ] {
                let key = format!("slippage.regime_bps.{}", regime.label());
                map.insert(regime, config.get_f64(&key).unwrap_or(default_bps));
            }
            Arc::new(RegimeBpsSlippage::new(default_bps, map))
        }
        _ => Arc::new(ZeroSlippage),
    }
}

/// Build a commission model from `commission.*` keys.
pub fn commission_from_config(config: &Config) -> Arc<dyn CommissionModel> {
    match config.get_str("commission.type").unwrap_or("zero") {
        "fixed" => {
            let amount = config.get_f64("commission.amount").unwrap_or(0.0);
            Arc::new(FixedPerFillCommission::new(amount))
        }
        _ => Arc::new(ZeroCommission),
    }
}

/// Build a transaction cost model from `transaction_cost.*` keys.
pub fn transaction_cost_from_config(config: &Config) -> Arc<dyn TransactionCostModel> {
    match config.get_str("transaction_cost.type").unwrap_or("zero") {
        "fixed_bps" => {
            let bps = config.get_f64("transaction_cost.bps").unwrap_or(0.0);
            Arc::new(FixedBpsCost::new(bps))
        }
        "per_share" => {
            let rate = config.get_f64("transaction_cost.per_share").unwrap_or(0.0);
            Arc::new(PerShareCost::new(rate))
        }
        "per_order" => {
            let cost = config.get_f64("transaction_cost.per_order").unwrap_or(0.0);
            Arc::new(PerOrderCost::new(cost))
        }
        "tiered" => {
            let tiers: Vec<CostTier> = config
                .get_array("transaction_cost.tiers")
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| {
                            let object = entry.as_object()?;
                            let bps = object.get("bps")?.as_f64()?;
                            let max_notional =
                                object.get("max_notional").and_then(|v| v.as_f64()).unwrap_or(0.0);
                            Some(CostTier { max_notional, bps })
                        })
                        .collect()
                })
                .unwrap_or_default();
            if tiers.is_empty() {
                Arc::new(ZeroTransactionCost)
            } else {
                Arc::new(TieredBpsCost::new(tiers))
            }
        }
        _ => Arc::new(ZeroTransactionCost),
    }
}

/// Build a latency model from `latency.ms`.
pub fn latency_from_config(config: &Config) -> FixedLatency {
    FixedLatency::from_millis(config.get_i64("latency.ms").unwrap_or(0))
}

/// Build the execution model; the `basic` model wraps the configured
/// slippage model.
pub fn execution_from_config(config: &Config) -> Box<dyn ExecutionModel> {
    Box::new(BasicExecutionModel::new(slippage_from_config(config)))
}
