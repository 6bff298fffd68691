use std::collections::BTreeMap;

use regime_core::RegimeType;
use serde::Serialize;

/// Aggregated return statistics for one transition pair.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TransitionStats {
    pub avg_return: f64,
    pub volatility: f64,
    pub observations: u64,
}

/// Accumulates the period return observed at each regime change, keyed by
/// the (from, to) pair.
#[derive(Debug, Clone, Default)]
pub struct TransitionMetrics {
    returns: BTreeMap<(RegimeType, RegimeType), Vec<f64>>,
}

impl TransitionMetrics {
    pub fn update(&mut self, from: RegimeType, to: RegimeType, equity_return: f64) {
        self.returns.entry((from, to)).or_default().push(equity_return);
    }

    pub fn results(&self) -> BTreeMap<(RegimeType, RegimeType), TransitionStats> {
        self.returns
            .iter()
            .map(|(&key, returns)| {
                let n = returns.len() as f64;
                let avg = returns.iter().sum::<f64>() / n;
                let variance = if returns.len() > 1 {
                    returns.iter().map(|r| (r - avg) * (r - avg)).sum::<f64>() / (n - 1.0)
                } else {
                    0.0
                };
                (
                    key,
                    TransitionStats {
                        avg_return: avg,
                        volatility: variance.sqrt(),
                        observations: returns.len() as u64,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_transition_pair() {
        let mut metrics = TransitionMetrics::default();
        metrics.update(RegimeType::Bull, RegimeType::Bear, -0.02);
        metrics.update(RegimeType::Bull, RegimeType::Bear, -0.04);
        metrics.update(RegimeType::Bear, RegimeType::Bull, 0.03);

        let results = metrics.results();
        let bull_bear = &results[&(RegimeType::Bull, RegimeType::Bear)];
        assert_eq!(bull_bear.observations, 2);
        assert!((bull_bear.avg_return + 0.03).abs() < 1e-12);
        assert!(bull_bear.volatility > 0.0);

        let bear_bull = &results[&(RegimeType::Bear, RegimeType::Bull)];
        assert_eq!(bear_bull.observations, 1);
        assert_eq!(bear_bull.volatility, 0.0);
    }
}
