use crate::config::Config;
use crate::market::MarketEvent;
use crate::order::{Fill, Order};
use crate::regime::{RegimeState, RegimeTransition};

/// A trading strategy driven by market events and the prevailing regime.
///
/// Strategies are synchronous and deterministic: orders returned from
/// `on_event` enter the risk gate within the same event.
pub trait Strategy: Send {
    fn id(&self) -> &str;

    fn initialize(&mut self, _config: &Config) {}

    /// Produce orders for the current event given the detector's state.
    fn on_event(&mut self, event: &MarketEvent, regime: &RegimeState) -> Vec<Order>;

    /// Called synchronously when the tracked regime changes.
    fn on_transition(&mut self, _transition: &RegimeTransition) {}

    /// Called for every fill produced from this strategy's orders.
    fn on_fill(&mut self, _fill: &Fill) {}
}
