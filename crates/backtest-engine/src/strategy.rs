use regime_core::{
    Config, MarketEvent, Order, OrderSide, RegimeState, RegimeTransition, RegimeType, Strategy,
    METADATA_RISK_EXIT,
};

/// Reference strategy that scales position size with the detected regime.
///
/// Buys in Bull/Neutral/Crisis with regime-dependent quantities, sells in
/// Bear, and on a transition into Crisis emits a flattening order tagged
/// `risk_exit` so it clears the risk gate unconditionally.
pub struct RegimeSwitchStrategy {
    symbol: String,
    base_qty: f64,
    trend_qty: f64,
    stress_qty: f64,
    position: f64,
    exit_requested: bool,
}

impl RegimeSwitchStrategy {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            base_qty: 10.0,
            trend_qty: 20.0,
            stress_qty: 5.0,
            position: 0.0,
            exit_requested: false,
        }
    }
}

impl Strategy for RegimeSwitchStrategy {
    fn id(&self) -> &str {
        "regime_switch"
    }

    fn initialize(&mut self, config: &Config) {
        if let Some(symbol) = config.get_str("symbol") {
            self.symbol = symbol.to_string();
        }
        self.base_qty = config.get_f64("base_qty").unwrap_or(self.base_qty);
        self.trend_qty = config.get_f64("trend_qty").unwrap_or(self.trend_qty);
        self.stress_qty = config.get_f64("stress_qty").unwrap_or(self.stress_qty);
    }

    fn on_event(&mut self, event: &MarketEvent, regime: &RegimeState) -> Vec<Order> {
        if event.symbol() != self.symbol {
            return Vec::new();
        }

        if self.exit_requested {
            self.exit_requested = false;
            if self.position > 0.0 {
                let mut order = Order::market(self.symbol.clone(), OrderSide::Sell, self.position);
                order
                    .metadata
                    .insert(METADATA_RISK_EXIT.to_string(), "1".to_string());
                order.strategy_id = self.id().to_string();
                return vec![order];
            }
            return Vec::new();
        }

        let qty = match regime.regime {
            RegimeType::Bull => self.trend_qty,
            RegimeType::Crisis => self.stress_qty,
            _ => self.base_qty,
        };

        let mut order = if regime.regime == RegimeType::Bear {
            if self.position <= 0.0 {
                return Vec::new();
            }
            Order::market(self.symbol.clone(), OrderSide::Sell, qty.min(self.position))
        } else {
            Order::market(self.symbol.clone(), OrderSide::Buy, qty)
        };
        order.strategy_id = self.id().to_string();
        vec![order]
    }

    fn on_transition(&mut self, transition: &RegimeTransition) {
        if transition.to == RegimeType::Crisis {
            self.exit_requested = true;
        }
    }

    fn on_fill(&mut self, fill: &regime_core::Fill) {
        self.position += fill.quantity;
    }
}
