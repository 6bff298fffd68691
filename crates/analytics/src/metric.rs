use regime_core::PortfolioSnapshot;

/// A single named performance metric computed over the equity curve;
/// the extension seam for metrics plugins.
pub trait PerformanceMetric: Send {
    fn name(&self) -> String;

    fn compute(&self, snapshots: &[PortfolioSnapshot], periods_per_year: f64) -> f64;
}
