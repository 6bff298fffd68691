use chrono::{DateTime, Utc};
use regime_core::{Portfolio, PortfolioSnapshot, RegimeState, RegimeType};

use crate::attribution::AttributionTracker;
use crate::drawdown::DrawdownTracker;
use crate::equity::EquityCurve;
use crate::regime_attribution::RegimeAttribution;
use crate::transition_metrics::TransitionMetrics;

/// Folds every pipeline event into the run's metrics.
///
/// Each update computes the period return, extends the equity curve and
/// drawdown/attribution trackers, and appends a portfolio snapshot. When
/// a regime accompanies the update, regime attribution accumulates and a
/// change against the previous call feeds the transition metrics.
#[derive(Default)]
pub struct MetricsTracker {
    equity_curve: EquityCurve,
    drawdown: DrawdownTracker,
    attribution: AttributionTracker,
    regime_attribution: RegimeAttribution,
    transition_metrics: TransitionMetrics,
    snapshots: Vec<PortfolioSnapshot>,
    regime_history: Vec<RegimeState>,
    last_equity: f64,
    last_regime: Option<RegimeType>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Equity-only update, for callers without a full portfolio.
    pub fn update_equity(&mut self, timestamp: DateTime<Utc>, equity: f64) {
        self.last_equity = equity;
        self.equity_curve.add_point(timestamp, equity);
        self.drawdown.update(timestamp, equity);
    }

    pub fn update(
        &mut self,
        timestamp: DateTime<Utc>,
        portfolio: &Portfolio,
        regime: Option<&RegimeState>,
    ) {
        let equity = portfolio.equity();
        let period_return = if self.last_equity > 0.0 {
            (equity - self.last_equity) / self.last_equity
        } else {
            0.0
        };
        self.last_equity = equity;

        self.equity_curve.add_point(timestamp, equity);
        self.drawdown.update(timestamp, equity);
        self.attribution.update(timestamp, portfolio);
        self.snapshots.push(portfolio.snapshot(timestamp));

        if let Some(state) = regime {
            self.regime_history.push(state.clone());
            self.regime_attribution.update(state.regime, period_return);
            if let Some(last) = self.last_regime {
                if last != state.regime {
                    self.transition_metrics
                        .update(last, state.regime, period_return);
                }
            }
            self.last_regime = Some(state.regime);
        }
    }

    pub fn equity_curve(&self) -> &EquityCurve {
        &self.equity_curve
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn drawdown(&self) -> &DrawdownTracker {
        &self.drawdown
    }

    pub fn attribution(&self) -> &AttributionTracker {
        &self.attribution
    }

    pub fn regime_attribution(&self) -> &RegimeAttribution {
        &self.regime_attribution
    }

    pub fn transition_metrics(&self) -> &TransitionMetrics {
        &self.transition_metrics
    }

    pub fn regime_history(&self) -> &[RegimeState] {
        &self.regime_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regime_core::Fill;

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(day * 86_400, 0).unwrap()
    }

    fn regime_state(day: i64, regime: RegimeType) -> RegimeState {
        let mut probs = vec![0.0; 4];
        probs[regime.index()] = 1.0;
        RegimeState::from_probabilities(ts(day), probs)
    }

    #[test]
    fn update_appends_curve_and_snapshots() {
        let mut tracker = MetricsTracker::new();
        let portfolio = Portfolio::new(100_000.0);

        tracker.update(ts(0), &portfolio, None);
        tracker.update(ts(1), &portfolio, None);

        assert_eq!(tracker.equity_curve().len(), 2);
        assert_eq!(tracker.snapshots().len(), 2);
        assert!(tracker.regime_history().is_empty());
    }

    #[test]
    fn regime_change_feeds_transition_metrics() {
        let mut tracker = MetricsTracker::new();
        let mut portfolio = Portfolio::new(100_000.0);
        portfolio.apply_fill(&Fill {
            id: 0,
            order_id: 0,
            symbol: "AAA".to_string(),
            quantity: 100.0,
            price: 100.0,
            timestamp: ts(0),
            commission: 0.0,
            slippage: 0.0,
            is_maker: false,
        });

        tracker.update(ts(0), &portfolio, Some(&regime_state(0, RegimeType::Bull)));
        portfolio.mark_to_market("AAA", 110.0);
        tracker.update(ts(1), &portfolio, Some(&regime_state(1, RegimeType::Bull)));
        portfolio.mark_to_market("AAA", 90.0);
        tracker.update(ts(2), &portfolio, Some(&regime_state(2, RegimeType::Bear)));

        let transitions = tracker.transition_metrics().results();
        assert_eq!(transitions.len(), 1);
        let stats = &transitions[&(RegimeType::Bull, RegimeType::Bear)];
        assert_eq!(stats.observations, 1);
        assert!(stats.avg_return < 0.0);

        let attribution = tracker.regime_attribution().results();
        assert_eq!(attribution[&RegimeType::Bull].observations, 2);
        assert_eq!(attribution[&RegimeType::Bear].observations, 1);
    }

    #[test]
    fn same_regime_does_not_record_transition() {
        let mut tracker = MetricsTracker::new();
        let portfolio = Portfolio::new(100_000.0);

        for day in 0..5 {
            tracker.update(ts(day), &portfolio, Some(&regime_state(day, RegimeType::Neutral)));
        }
        assert!(tracker.transition_metrics().results().is_empty());
        assert_eq!(tracker.regime_history().len(), 5);
    }
}
