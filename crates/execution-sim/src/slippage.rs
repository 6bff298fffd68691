use std::collections::HashMap;

use regime_core::{Order, RegimeType};

/// Adjusts a reference price for execution. Buys pay up, sells receive
/// less.
pub trait SlippageModel: Send + Sync {
    fn execution_price(&self, order: &Order, reference_price: f64) -> f64;
}

/// No slippage; fills at the reference price.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroSlippage;

impl SlippageModel for ZeroSlippage {
    fn execution_price(&self, _order: &Order, reference_price: f64) -> f64 {
        reference_price
    }
}

/// Fixed slippage in basis points, signed by order side.
#[derive(Debug, Clone, Copy)]
pub struct FixedBpsSlippage {
    bps: f64,
}

impl FixedBpsSlippage {
    pub fn new(bps: f64) -> Self {
        Self { bps }
    }
}

impl SlippageModel for FixedBpsSlippage {
    fn execution_price(&self, order: &Order, reference_price: f64) -> f64 {
        reference_price * (1.0 + order.side.sign() * self.bps / 10_000.0)
    }
}

/// Regime-conditional slippage: the order's `regime` metadata label picks
/// the bps from a per-regime map, falling back to a default.
#[derive(Debug, Clone)]
pub struct RegimeBpsSlippage {
    default_bps: f64,
    bps_by_regime: HashMap<RegimeType, f64>,
}

impl RegimeBpsSlippage {
    pub fn new(default_bps: f64, bps_by_regime: HashMap<RegimeType, f64>) -> Self {
        Self {
            default_bps,
            bps_by_regime,
        }
    }
}

impl SlippageModel for RegimeBpsSlippage {
    fn execution_price(&self, order: &Order, reference_price: f64) -> f64 {
        let bps = order
            .regime_label()
            .and_then(RegimeType::parse_label)
            .and_then(|regime| self.bps_by_regime.get(&regime).copied())
            .unwrap_or(self.default_bps);
        reference_price * (1.0 + order.side.sign() * bps / 10_000.0)
    }
}
