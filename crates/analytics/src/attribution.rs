use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regime_core::Portfolio;

/// Per-symbol PnL deltas for one update.
#[derive(Debug, Clone, Default)]
pub struct AttributionSnapshot {
    pub timestamp: Option<DateTime<Utc>>,
    pub pnl_by_symbol: HashMap<String, f64>,
    pub total_pnl: f64,
}

/// Attributes mark-to-market PnL to symbols between updates.
#[derive(Debug, Clone, Default)]
pub struct AttributionTracker {
    last_values: HashMap<String, f64>,
    last: AttributionSnapshot,
}

impl AttributionTracker {
    pub fn update(&mut self, timestamp: DateTime<Utc>, portfolio: &Portfolio) {
        let mut snapshot = AttributionSnapshot {
            timestamp: Some(timestamp),
            ..Default::default()
        };

        let mut total = 0.0;
        for position in portfolio.positions() {
            let value = position.market_value();
            let last = self.last_values.get(&position.symbol).copied().unwrap_or(0.0);
            let pnl = value - last;
            snapshot.pnl_by_symbol.insert(position.symbol.clone(), pnl);
            total += pnl;
            self.last_values.insert(position.symbol.clone(), value);
        }

        snapshot.total_pnl = total;
        self.last = snapshot;
    }

    pub fn last_snapshot(&self) -> &AttributionSnapshot {
        &self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regime_core::Fill;

    #[test]
    fn attributes_value_changes_to_symbols() {
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&Fill {
            id: 0,
            order_id: 0,
            symbol: "AAA".to_string(),
            quantity: 10.0,
            price: 100.0,
            timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            commission: 0.0,
            slippage: 0.0,
            is_maker: false,
        });

        let mut tracker = AttributionTracker::default();
        tracker.update(Utc.timestamp_opt(1, 0).unwrap(), &portfolio);
        assert!((tracker.last_snapshot().total_pnl - 1_000.0).abs() < 1e-9);

        portfolio.mark_to_market("AAA", 110.0);
        tracker.update(Utc.timestamp_opt(2, 0).unwrap(), &portfolio);

        let snapshot = tracker.last_snapshot();
        assert!((snapshot.pnl_by_symbol["AAA"] - 100.0).abs() < 1e-9);
        assert!((snapshot.total_pnl - 100.0).abs() < 1e-9);
    }
}
