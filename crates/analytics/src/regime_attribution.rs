use std::collections::BTreeMap;

use regime_core::RegimeType;
use serde::Serialize;

/// Derived performance for one regime.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegimePerformance {
    pub total_return: f64,
    pub avg_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub time_pct: f64,
    pub observations: u64,
}

#[derive(Debug, Clone)]
struct RegimeStats {
    total_return: f64,
    sum: f64,
    sum_sq: f64,
    equity: f64,
    peak: f64,
    max_dd: f64,
    observations: u64,
}

impl Default for RegimeStats {
    fn default() -> Self {
        Self {
            total_return: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
            equity: 1.0,
            peak: 1.0,
            max_dd: 0.0,
            observations: 0,
        }
    }
}

/// Accumulates per-regime return statistics as updates stream in.
///
/// Each regime compounds its own unit-equity curve, so per-regime
/// drawdown reflects only the periods spent in that regime.
#[derive(Debug, Clone, Default)]
pub struct RegimeAttribution {
    stats: BTreeMap<RegimeType, RegimeStats>,
    total_observations: u64,
}

impl RegimeAttribution {
    pub fn update(&mut self, regime: RegimeType, equity_return: f64) {
        let stats = self.stats.entry(regime).or_default();
        stats.total_return += equity_return;
        stats.sum += equity_return;
        stats.sum_sq += equity_return * equity_return;
        stats.equity *= 1.0 + equity_return;
        stats.peak = stats.peak.max(stats.equity);
        let dd = if stats.peak > 0.0 {
            (stats.peak - stats.equity) / stats.peak
        } else {
            0.0
        };
        stats.max_dd = stats.max_dd.max(dd);
        stats.observations += 1;
        self.total_observations += 1;
    }

    pub fn results(&self) -> BTreeMap<RegimeType, RegimePerformance> {
        self.stats
            .iter()
            .map(|(&regime, stats)| {
                let n = stats.observations as f64;
                let avg_return = if stats.observations > 0 { stats.sum / n } else { 0.0 };
                let variance = if stats.observations > 1 {
                    (stats.sum_sq - stats.sum * stats.sum / n) / (n - 1.0)
                } else {
                    0.0
                };
                let stddev = if variance > 0.0 { variance.sqrt() } else { 0.0 };
                let performance = RegimePerformance {
                    total_return: stats.total_return,
                    avg_return,
                    sharpe: if stddev > 0.0 { avg_return / stddev } else { 0.0 },
                    max_drawdown: stats.max_dd,
                    time_pct: if self.total_observations > 0 {
                        n / self.total_observations as f64
                    } else {
                        0.0
                    },
                    observations: stats.observations,
                };
                (regime, performance)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_regime_statistics() {
        let mut attribution = RegimeAttribution::default();
        attribution.update(RegimeType::Bull, 0.01);
        attribution.update(RegimeType::Bull, 0.02);
        attribution.update(RegimeType::Bear, -0.05);
        attribution.update(RegimeType::Bear, 0.01);

        let results = attribution.results();
        let bull = &results[&RegimeType::Bull];
        assert!((bull.total_return - 0.03).abs() < 1e-12);
        assert!((bull.avg_return - 0.015).abs() < 1e-12);
        assert!((bull.time_pct - 0.5).abs() < 1e-12);
        assert_eq!(bull.observations, 2);

        let bear = &results[&RegimeType::Bear];
        // Bear equity fell to 0.95 then recovered partially: drawdown 5%.
        assert!((bear.max_drawdown - 0.05).abs() < 1e-9);
    }

    #[test]
    fn sharpe_zero_without_dispersion() {
        let mut attribution = RegimeAttribution::default();
        attribution.update(RegimeType::Neutral, 0.01);
        let results = attribution.results();
        assert_eq!(results[&RegimeType::Neutral].sharpe, 0.0);
    }
}
