use std::collections::HashMap;

use regime_core::{EngineResult, Order, Portfolio};

use crate::limits::RiskLimit;

/// Composable pre-trade risk gate.
///
/// Base limits run in insertion order; when an order carries a `regime`
/// metadata label with a configured rule set, those limits run first.
/// Orders tagged `risk_exit` bypass validation entirely so positions can
/// always be unwound. The first failing limit short-circuits and its
/// reason surfaces verbatim.
#[derive(Default)]
pub struct RiskManager {
    limits: Vec<Box<dyn RiskLimit>>,
    regime_limits: HashMap<String, Vec<Box<dyn RiskLimit>>>,
}

impl RiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_limit(&mut self, limit: Box<dyn RiskLimit>) {
        self.limits.push(limit);
    }

    pub fn set_regime_limits(&mut self, limits: HashMap<String, Vec<Box<dyn RiskLimit>>>) {
        self.regime_limits = limits;
    }

    pub fn limit_count(&self) -> usize {
        self.limits.len()
    }

    pub fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        if order.is_risk_exit() {
            return Ok(());
        }

        if let Some(label) = order.regime_label() {
            if let Some(limits) = self.regime_limits.get(label) {
                for limit in limits {
                    if let Err(error) = limit.validate(order, portfolio) {
                        tracing::debug!(symbol = %order.symbol, regime = label, %error, "order rejected by regime limit");
                        return Err(error);
                    }
                }
            }
        }

        for limit in &self.limits {
            if let Err(error) = limit.validate(order, portfolio) {
                tracing::debug!(symbol = %order.symbol, %error, "order rejected by risk limit");
                return Err(error);
            }
        }
        Ok(())
    }

    pub fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        for limits in self.regime_limits.values() {
            for limit in limits {
                limit.validate_portfolio(portfolio)?;
            }
        }
        for limit in &self.limits {
            limit.validate_portfolio(portfolio)?;
        }
        Ok(())
    }
}
