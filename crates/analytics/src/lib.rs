pub mod attribution;
pub mod drawdown;
pub mod equity;
pub mod metric;
pub mod performance;
pub mod regime_attribution;
pub mod report;
pub mod tracker;
pub mod transition_metrics;

#[cfg(test)]
mod tests;

pub use attribution::{AttributionSnapshot, AttributionTracker};
pub use drawdown::{DrawdownSnapshot, DrawdownTracker};
pub use equity::{compute_stats, EquityCurve, PerformanceStats};
pub use metric::PerformanceMetric;
pub use performance::{
    AttributionResult, PerformanceCalculator, PerformanceSummary, RegimeMetrics, TradeSummary,
    TransitionSummary,
};
pub use regime_attribution::{RegimeAttribution, RegimePerformance};
pub use report::{build_report, Report, ReportWriter};
pub use tracker::MetricsTracker;
pub use transition_metrics::{TransitionMetrics, TransitionStats};
