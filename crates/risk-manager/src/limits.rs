use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use regime_core::{EngineError, EngineResult, Order, OrderType, Portfolio};

/// Pre-trade and portfolio-level validity predicate.
///
/// Both checks take `&self`; limits that evolve state across calls
/// (drawdown peak, correlation price history) keep it behind a mutex so
/// the predicates stay read-only from the caller's perspective.
pub trait RiskLimit: Send + Sync {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()>;

    fn validate_portfolio(&self, _portfolio: &Portfolio) -> EngineResult<()> {
        Ok(())
    }
}

/// Resolve the price an order-level check should use.
///
/// A limit order without a limit price is malformed for price-based
/// checks; a market order without one simply has no price yet, and
/// price-based checks skip (`Ok(None)`).
fn check_price(order: &Order, check_name: &str) -> EngineResult<Option<f64>> {
    if order.limit_price <= 0.0 && order.order_type == OrderType::Limit {
        return Err(EngineError::invalid_argument(format!(
            "Limit price must be set for {check_name} checks"
        )));
    }
    if order.limit_price <= 0.0 {
        return Ok(None);
    }
    Ok(Some(order.limit_price))
}

/// Caps per-order notional and refuses orders larger than equity.
pub struct MaxNotionalLimit {
    max_notional: f64,
}

impl MaxNotionalLimit {
    pub fn new(max_notional: f64) -> Self {
        Self { max_notional }
    }
}

impl RiskLimit for MaxNotionalLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(price) = check_price(order, "notional")? else {
            return Ok(());
        };
        let notional = order.quantity.abs() * price;
        if notional > self.max_notional {
            return Err(EngineError::out_of_range("Order exceeds max notional limit"));
        }
        if notional > portfolio.equity() {
            return Err(EngineError::out_of_range("Order exceeds portfolio equity"));
        }
        Ok(())
    }
}

/// Caps the absolute quantity of any single position.
pub struct MaxPositionLimit {
    max_quantity: f64,
}

impl MaxPositionLimit {
    pub fn new(max_quantity: f64) -> Self {
        Self { max_quantity }
    }
}

impl RiskLimit for MaxPositionLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let existing = portfolio
            .get_position(&order.symbol)
            .map(|p| p.quantity)
            .unwrap_or(0.0);
        let projected = existing + order.quantity;
        if projected.abs() > self.max_quantity {
            return Err(EngineError::out_of_range("Order exceeds max position limit"));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        for position in portfolio.positions() {
            if position.quantity.abs() > self.max_quantity {
                return Err(EngineError::out_of_range(
                    "Position exceeds max position limit",
                ));
            }
        }
        Ok(())
    }
}

/// Caps a position's notional as a fraction of equity.
pub struct MaxPositionPctLimit {
    max_pct: f64,
}

impl MaxPositionPctLimit {
    pub fn new(max_pct: f64) -> Self {
        Self { max_pct }
    }
}

impl RiskLimit for MaxPositionPctLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let Some(price) = check_price(order, "pct")? else {
            return Ok(());
        };
        let existing = portfolio
            .get_position(&order.symbol)
            .map(|p| p.quantity)
            .unwrap_or(0.0);
        let projected = existing + order.quantity;
        let pct = (projected * price).abs() / equity;
        if pct > self.max_pct {
            return Err(EngineError::out_of_range(
                "Order exceeds max position pct limit",
            ));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        for position in portfolio.positions() {
            if position.current_price <= 0.0 {
                continue;
            }
            let pct = position.market_value().abs() / equity;
            if pct > self.max_pct {
                return Err(EngineError::out_of_range(
                    "Position exceeds max position pct limit",
                ));
            }
        }
        Ok(())
    }
}

/// Blocks trading once drawdown from the running equity peak exceeds the
/// threshold. The peak is a cache that evolves during validation.
pub struct MaxDrawdownLimit {
    max_drawdown: f64,
    peak: Mutex<f64>,
}

impl MaxDrawdownLimit {
    pub fn new(max_drawdown: f64) -> Self {
        Self {
            max_drawdown,
            peak: Mutex::new(0.0),
        }
    }

    fn check(&self, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let mut peak = self.peak.lock().expect("drawdown peak lock");
        if *peak < equity {
            *peak = equity;
        }
        let drawdown = (*peak - equity) / *peak;
        if drawdown > self.max_drawdown {
            return Err(EngineError::out_of_range("Max drawdown limit exceeded"));
        }
        Ok(())
    }
}

impl RiskLimit for MaxDrawdownLimit {
    fn validate(&self, _order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        self.check(portfolio)
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        self.check(portfolio)
    }
}

/// Caps total gross exposure after the order.
pub struct MaxGrossExposureLimit {
    max_gross_exposure: f64,
}

impl MaxGrossExposureLimit {
    pub fn new(max_gross_exposure: f64) -> Self {
        Self { max_gross_exposure }
    }
}

impl RiskLimit for MaxGrossExposureLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(price) = check_price(order, "exposure")? else {
            return Ok(());
        };
        let projected = portfolio.gross_exposure() + order.quantity.abs() * price;
        if projected > self.max_gross_exposure {
            return Err(EngineError::out_of_range(
                "Order exceeds max gross exposure limit",
            ));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        if portfolio.gross_exposure() > self.max_gross_exposure {
            return Err(EngineError::out_of_range(
                "Max gross exposure limit exceeded",
            ));
        }
        Ok(())
    }
}

/// Caps absolute net exposure after the order; the order contribution is
/// signed by side.
pub struct MaxNetExposureLimit {
    max_net_exposure: f64,
}

impl MaxNetExposureLimit {
    pub fn new(max_net_exposure: f64) -> Self {
        Self { max_net_exposure }
    }
}

impl RiskLimit for MaxNetExposureLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(price) = check_price(order, "exposure")? else {
            return Ok(());
        };
        let projected = portfolio.net_exposure() + order.signed_quantity() * price;
        if projected.abs() > self.max_net_exposure {
            return Err(EngineError::out_of_range(
                "Order exceeds max net exposure limit",
            ));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        if portfolio.net_exposure().abs() > self.max_net_exposure {
            return Err(EngineError::out_of_range("Max net exposure limit exceeded"));
        }
        Ok(())
    }
}

/// Caps gross exposure relative to equity.
pub struct MaxLeverageLimit {
    max_leverage: f64,
}

impl MaxLeverageLimit {
    pub fn new(max_leverage: f64) -> Self {
        Self { max_leverage }
    }
}

impl RiskLimit for MaxLeverageLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(price) = check_price(order, "leverage")? else {
            return Ok(());
        };
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let projected = portfolio.gross_exposure() + order.quantity.abs() * price;
        if projected / equity > self.max_leverage {
            return Err(EngineError::out_of_range("Order exceeds max leverage limit"));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        if portfolio.gross_exposure() / equity > self.max_leverage {
            return Err(EngineError::out_of_range("Max leverage limit exceeded"));
        }
        Ok(())
    }
}

/// Per-sector gross exposure caps as fractions of equity, with a symbol →
/// sector mapping. Symbols without a mapping pass.
pub struct MaxSectorExposureLimit {
    limits: HashMap<String, f64>,
    symbol_to_sector: HashMap<String, String>,
}

impl MaxSectorExposureLimit {
    pub fn new(limits: HashMap<String, f64>, symbol_to_sector: HashMap<String, String>) -> Self {
        Self {
            limits,
            symbol_to_sector,
        }
    }

    fn group_exposure(&self, portfolio: &Portfolio, group: &str) -> f64 {
        portfolio
            .positions()
            .filter(|p| p.current_price > 0.0)
            .filter(|p| self.symbol_to_sector.get(&p.symbol).map(String::as_str) == Some(group))
            .map(|p| p.market_value().abs())
            .sum()
    }
}

impl RiskLimit for MaxSectorExposureLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(sector) = self.symbol_to_sector.get(&order.symbol) else {
            return Ok(());
        };
        let Some(&limit) = self.limits.get(sector) else {
            return Ok(());
        };
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let Some(price) = check_price(order, "sector")? else {
            return Ok(());
        };
        let projected = self.group_exposure(portfolio, sector) + order.quantity.abs() * price;
        if projected / equity > limit {
            return Err(EngineError::out_of_range(
                "Order exceeds sector exposure limit",
            ));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        for (sector, &limit) in &self.limits {
            if self.group_exposure(portfolio, sector) / equity > limit {
                return Err(EngineError::out_of_range("Sector exposure limit exceeded"));
            }
        }
        Ok(())
    }
}

/// Industry analogue of [`MaxSectorExposureLimit`].
pub struct MaxIndustryExposureLimit {
    limits: HashMap<String, f64>,
    symbol_to_industry: HashMap<String, String>,
}

impl MaxIndustryExposureLimit {
    pub fn new(limits: HashMap<String, f64>, symbol_to_industry: HashMap<String, String>) -> Self {
        Self {
            limits,
            symbol_to_industry,
        }
    }

    fn group_exposure(&self, portfolio: &Portfolio, group: &str) -> f64 {
        portfolio
            .positions()
            .filter(|p| p.current_price > 0.0)
            .filter(|p| self.symbol_to_industry.get(&p.symbol).map(String::as_str) == Some(group))
            .map(|p| p.market_value().abs())
            .sum()
    }
}

impl RiskLimit for MaxIndustryExposureLimit {
    fn validate(&self, order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        let Some(industry) = self.symbol_to_industry.get(&order.symbol) else {
            return Ok(());
        };
        let Some(&limit) = self.limits.get(industry) else {
            return Ok(());
        };
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let Some(price) = check_price(order, "industry")? else {
            return Ok(());
        };
        let projected = self.group_exposure(portfolio, industry) + order.quantity.abs() * price;
        if projected / equity > limit {
            return Err(EngineError::out_of_range(
                "Order exceeds industry exposure limit",
            ));
        }
        Ok(())
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        for (industry, &limit) in &self.limits {
            if self.group_exposure(portfolio, industry) / equity > limit {
                return Err(EngineError::out_of_range(
                    "Industry exposure limit exceeded",
                ));
            }
        }
        Ok(())
    }
}

/// Configuration for [`MaxCorrelationExposureLimit`].
#[derive(Debug, Clone)]
pub struct CorrelationLimitConfig {
    pub window: usize,
    pub max_corr: f64,
    pub max_pair_exposure_pct: f64,
}

impl Default for CorrelationLimitConfig {
    fn default() -> Self {
        Self {
            window: 50,
            max_corr: 0.8,
            max_pair_exposure_pct: 0.2,
        }
    }
}

/// Caps combined exposure to highly correlated symbol pairs.
///
/// Price history accumulates only on validation calls; if portfolio
/// validation is not invoked on every mark-to-market, the correlation
/// estimate is undersampled.
pub struct MaxCorrelationExposureLimit {
    config: CorrelationLimitConfig,
    price_history: Mutex<HashMap<String, VecDeque<f64>>>,
}

impl MaxCorrelationExposureLimit {
    pub fn new(config: CorrelationLimitConfig) -> Self {
        Self {
            config,
            price_history: Mutex::new(HashMap::new()),
        }
    }

    fn update_history(&self, portfolio: &Portfolio) {
        let mut history = self.price_history.lock().expect("price history lock");
        for position in portfolio.positions() {
            if position.current_price <= 0.0 {
                continue;
            }
            let series = history.entry(position.symbol.clone()).or_default();
            series.push_back(position.current_price);
            while series.len() > self.config.window + 1 {
                series.pop_front();
            }
        }
    }

    /// Pearson correlation of simple returns; 0 whenever either series is
    /// too short, the lengths differ, or a denominator degenerates.
    fn correlation(&self, a: &str, b: &str) -> f64 {
        let history = self.price_history.lock().expect("price history lock");
        let (Some(sa), Some(sb)) = (history.get(a), history.get(b)) else {
            return 0.0;
        };
        if sa.len() < 2 || sb.len() < 2 || sa.len() != sb.len() {
            return 0.0;
        }
        let returns = |s: &VecDeque<f64>| -> Vec<f64> {
            s.iter()
                .zip(s.iter().skip(1))
                .map(|(prev, next)| (next - prev) / prev)
                .collect()
        };
        let ra = returns(sa);
        let rb = returns(sb);
        let mean_a = ra.iter().sum::<f64>() / ra.len() as f64;
        let mean_b = rb.iter().sum::<f64>() / rb.len() as f64;
        let mut num = 0.0;
        let mut den_a = 0.0;
        let mut den_b = 0.0;
        for (x, y) in ra.iter().zip(rb.iter()) {
            let dx = x - mean_a;
            let dy = y - mean_b;
            num += dx * dy;
            den_a += dx * dx;
            den_b += dy * dy;
        }
        if den_a <= 0.0 || den_b <= 0.0 {
            return 0.0;
        }
        num / (den_a * den_b).sqrt()
    }

    fn pair_exposure(portfolio: &Portfolio, a: &str, b: &str) -> f64 {
        portfolio
            .positions()
            .filter(|p| p.symbol == a || p.symbol == b)
            .map(|p| p.market_value().abs())
            .sum()
    }
}

impl RiskLimit for MaxCorrelationExposureLimit {
    fn validate(&self, _order: &Order, portfolio: &Portfolio) -> EngineResult<()> {
        self.validate_portfolio(portfolio)
    }

    fn validate_portfolio(&self, portfolio: &Portfolio) -> EngineResult<()> {
        self.update_history(portfolio);
        let equity = portfolio.equity();
        if equity <= 0.0 {
            return Ok(());
        }
        let symbols = portfolio.held_symbols();
        for i in 0..symbols.len() {
            for j in (i + 1)..symbols.len() {
                let corr = self.correlation(&symbols[i], &symbols[j]);
                if corr.abs() < self.config.max_corr {
                    continue;
                }
                let exposure = Self::pair_exposure(portfolio, &symbols[i], &symbols[j]);
                if exposure / equity > self.config.max_pair_exposure_pct {
                    return Err(EngineError::out_of_range(
                        "Correlation exposure limit exceeded",
                    ));
                }
            }
        }
        Ok(())
    }
}
