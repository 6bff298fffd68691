use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::Fill;

/// Holding in a single symbol. Quantity is signed; short positions carry a
/// negative quantity with `avg_cost` tracking the average short price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_cost: f64,
    pub current_price: f64,
    pub realized_pnl: f64,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.quantity * self.current_price
    }
}

/// Point-in-time valuation appended to the equity curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub cash: f64,
    pub positions_value: f64,
}

/// Cash plus positions. Mutated exclusively through [`Portfolio::apply_fill`]
/// and [`Portfolio::mark_to_market`]; everything else is derived.
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: f64,
    positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            positions: HashMap::new(),
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn held_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .positions
            .values()
            .filter(|p| p.quantity != 0.0)
            .map(|p| p.symbol.clone())
            .collect();
        symbols.sort();
        symbols
    }

    pub fn equity(&self) -> f64 {
        self.cash + self.positions.values().map(Position::market_value).sum::<f64>()
    }

    pub fn gross_exposure(&self) -> f64 {
        self.positions
            .values()
            .map(|p| p.market_value().abs())
            .sum()
    }

    pub fn net_exposure(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Apply a signed fill: cash moves by `quantity x price` plus the
    /// fill's commission; the position's average cost updates on size
    /// increases and realizes PnL on reductions. A fill crossing through
    /// zero closes the old position and opens the remainder at the fill
    /// price.
    pub fn apply_fill(&mut self, fill: &Fill) {
        self.cash -= fill.quantity * fill.price;
        self.cash -= fill.commission;

        let position = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position {
                symbol: fill.symbol.clone(),
                quantity: 0.0,
                avg_cost: 0.0,
                current_price: fill.price,
                realized_pnl: 0.0,
            });

        let old_qty = position.quantity;
        let new_qty = old_qty + fill.quantity;

        if old_qty == 0.0 || old_qty.signum() == fill.quantity.signum() {
            // Opening or adding: weighted average cost.
            let total = old_qty.abs() + fill.quantity.abs();
            if total > 0.0 {
                position.avg_cost =
                    (position.avg_cost * old_qty.abs() + fill.price * fill.quantity.abs()) / total;
            }
            position.quantity = new_qty;
        } else if new_qty == 0.0 || new_qty.signum() == old_qty.signum() {
            // Reducing (possibly to flat): realize against average cost.
            let closed = fill.quantity.abs().min(old_qty.abs());
            position.realized_pnl += closed * (fill.price - position.avg_cost) * old_qty.signum();
            position.quantity = new_qty;
            if new_qty == 0.0 {
                position.avg_cost = 0.0;
            }
        } else {
            // Flip: close the entire old position, reopen the excess.
            position.realized_pnl +=
                old_qty.abs() * (fill.price - position.avg_cost) * old_qty.signum();
            position.quantity = new_qty;
            position.avg_cost = fill.price;
        }

        position.current_price = fill.price;
    }

    /// Revalue one symbol at a new market price.
    pub fn mark_to_market(&mut self, symbol: &str, price: f64) {
        if let Some(position) = self.positions.get_mut(symbol) {
            position.current_price = price;
        }
    }

    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> PortfolioSnapshot {
        let positions_value: f64 = self.positions.values().map(Position::market_value).sum();
        PortfolioSnapshot {
            timestamp,
            equity: self.cash + positions_value,
            cash: self.cash,
            positions_value,
        }
    }
}
