use std::sync::Arc;

use analytics::{build_report, MetricsTracker, Report};
use execution_sim::{
    CommissionModel, FillSimulator, FixedLatency, LatencyModel, SlippageModel,
    TransactionCostModel, ZeroCommission, ZeroSlippage, ZeroTransactionCost,
};
use regime_core::{
    Config, Fill, MarketEvent, Order, OrderStatus, Portfolio, RegimeTransition, RegimeType,
    Strategy, METADATA_REGIME,
};
use regime_detector::{ConstantDetector, RegimeDetector, RegimeTracker};
use risk_manager::RiskManager;

use crate::factory;

/// Deterministic event-driven simulation core.
///
/// Events are processed strictly in timestamp order; within one timestamp,
/// submission order decides. Each event flows detector → strategy → risk
/// gate → fill simulation → portfolio → metrics, synchronously. Two runs
/// over the same event stream produce identical metrics and reports.
pub struct BacktestEngine {
    portfolio: Portfolio,
    tracker: RegimeTracker,
    risk: RiskManager,
    fill_simulator: FillSimulator,
    commission: Arc<dyn CommissionModel>,
    transaction_cost: Arc<dyn TransactionCostModel>,
    latency: FixedLatency,
    metrics: MetricsTracker,
    strategy: Option<Box<dyn Strategy>>,
    fills: Vec<Fill>,
    orders: Vec<Order>,
    transitions: Vec<RegimeTransition>,
    pending_orders: Vec<Order>,
    next_order_id: u64,
    next_fill_id: u64,
}

impl BacktestEngine {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            portfolio: Portfolio::new(initial_cash),
            tracker: RegimeTracker::new(Box::new(ConstantDetector::new(RegimeType::Neutral))),
            risk: RiskManager::new(),
            fill_simulator: FillSimulator::new(Arc::new(ZeroSlippage)),
            commission: Arc::new(ZeroCommission),
            transaction_cost: Arc::new(ZeroTransactionCost),
            latency: FixedLatency::default(),
            metrics: MetricsTracker::new(),
            strategy: None,
            fills: Vec::new(),
            orders: Vec::new(),
            transitions: Vec::new(),
            pending_orders: Vec::new(),
            next_order_id: 1,
            next_fill_id: 1,
        }
    }

    /// Build an engine from configuration, resolving detector, strategy,
    /// risk limits, and execution models (including plugin-provided ones).
    pub fn from_config(initial_cash: f64, config: &Config) -> regime_core::EngineResult<Self> {
        let mut engine = Self::new(initial_cash);
        engine.set_detector(factory::build_detector(config)?);
        engine.set_risk_manager(factory::build_risk_manager(config));
        engine.configure_execution(config);
        if let Some(strategy) = factory::build_strategy(config) {
            engine.set_strategy(strategy);
        }
        Ok(engine)
    }

    pub fn set_detector(&mut self, detector: Box<dyn RegimeDetector>) {
        self.tracker = RegimeTracker::new(detector);
    }

    pub fn set_strategy(&mut self, strategy: Box<dyn Strategy>) {
        self.strategy = Some(strategy);
    }

    pub fn set_risk_manager(&mut self, risk: RiskManager) {
        self.risk = risk;
    }

    pub fn set_slippage_model(&mut self, slippage: Arc<dyn SlippageModel>) {
        self.fill_simulator = FillSimulator::new(slippage);
    }

    pub fn set_commission_model(&mut self, commission: Arc<dyn CommissionModel>) {
        self.commission = commission;
    }

    pub fn set_transaction_cost_model(&mut self, cost: Arc<dyn TransactionCostModel>) {
        self.transaction_cost = cost;
    }

    pub fn set_latency_model(&mut self, latency: FixedLatency) {
        self.latency = latency;
    }

    /// Apply `slippage.*`, `commission.*`, `transaction_cost.*`, and
    /// `latency.ms` configuration.
    pub fn configure_execution(&mut self, config: &Config) {
        self.fill_simulator = FillSimulator::new(execution_sim::slippage_from_config(config));
        self.commission = execution_sim::commission_from_config(config);
        self.transaction_cost = execution_sim::transaction_cost_from_config(config);
        self.latency = execution_sim::latency_from_config(config);
    }

    /// Queue an externally produced order; it is validated and executed
    /// against the next event's reference price.
    pub fn submit_order(&mut self, mut order: Order) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        order.id = id;
        self.pending_orders.push(order);
        id
    }

    /// Process events strictly in timestamp order. The sort is stable, so
    /// events sharing a timestamp keep their insertion order.
    pub fn run(&mut self, mut events: Vec<MarketEvent>) {
        events.sort_by_key(|e| e.timestamp());
        for event in &events {
            self.process_event(event);
        }
    }

    pub fn process_event(&mut self, event: &MarketEvent) {
        let timestamp = event.timestamp();
        let reference_price = event.reference_price();

        // Regime inference first; observers and the strategy hear about a
        // transition before any order is produced for this event.
        if let Some(transition) = self.tracker.on_event(event) {
            if let Some(strategy) = &mut self.strategy {
                strategy.on_transition(&transition);
            }
            self.transitions.push(transition);
        }
        let state = self
            .tracker
            .current_state()
            .cloned()
            .expect("tracker has state after event");

        self.portfolio.mark_to_market(event.symbol(), reference_price);

        let mut due: Vec<Order> = std::mem::take(&mut self.pending_orders);
        if let Some(strategy) = &mut self.strategy {
            for mut order in strategy.on_event(event, &state) {
                order.id = self.next_order_id;
                self.next_order_id += 1;
                due.push(order);
            }
        }

        for mut order in due {
            order.created_at = Some(timestamp);
            // Orders inherit the prevailing regime unless the producer
            // pinned one; this routes regime-conditional risk and slippage.
            order
                .metadata
                .entry(METADATA_REGIME.to_string())
                .or_insert_with(|| state.regime.label().to_string());

            if reference_price <= 0.0 {
                order.status = OrderStatus::Invalid;
                order.updated_at = Some(timestamp);
                self.orders.push(order);
                continue;
            }

            if let Err(error) = self.risk.validate(&order, &self.portfolio) {
                tracing::info!(symbol = %order.symbol, %error, "order rejected");
                order.status = OrderStatus::Rejected;
                order.updated_at = Some(timestamp);
                self.orders.push(order);
                continue;
            }

            let fill_time = timestamp + self.latency.latency();
            let mut fill = self
                .fill_simulator
                .simulate(&order, reference_price, fill_time, false);
            fill.id = self.next_fill_id;
            self.next_fill_id += 1;
            fill.commission = self.commission.commission(&order, &fill)
                + self.transaction_cost.cost(&order, &fill);

            self.portfolio.apply_fill(&fill);
            order.status = OrderStatus::Filled;
            order.filled_quantity = order.quantity;
            order.avg_fill_price = fill.price;
            order.updated_at = Some(fill_time);
            if let Some(strategy) = &mut self.strategy {
                strategy.on_fill(&fill);
            }
            self.fills.push(fill);
            self.orders.push(order);
        }

        self.metrics.update(timestamp, &self.portfolio, Some(&state));
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn tracker(&self) -> &RegimeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut RegimeTracker {
        &mut self.tracker
    }

    pub fn metrics(&self) -> &MetricsTracker {
        &self.metrics
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn transitions(&self) -> &[RegimeTransition] {
        &self.transitions
    }

    /// Build the run's performance report.
    pub fn report(&self, risk_free_rate: f64, benchmark_returns: Option<&[f64]>) -> Report {
        build_report(&self.metrics, &self.fills, risk_free_rate, benchmark_returns)
    }
}
