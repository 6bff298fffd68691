use chrono::{DateTime, Utc};
use serde::Serialize;

/// Equity samples over time.
#[derive(Debug, Clone, Default)]
pub struct EquityCurve {
    timestamps: Vec<DateTime<Utc>>,
    equities: Vec<f64>,
}

impl EquityCurve {
    pub fn add_point(&mut self, timestamp: DateTime<Utc>, equity: f64) {
        self.timestamps.push(timestamp);
        self.equities.push(equity);
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn equities(&self) -> &[f64] {
        &self.equities
    }

    pub fn len(&self) -> usize {
        self.equities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equities.is_empty()
    }

    pub fn total_return(&self) -> f64 {
        if self.equities.len() < 2 || self.equities[0] == 0.0 {
            return 0.0;
        }
        (self.equities[self.equities.len() - 1] - self.equities[0]) / self.equities[0]
    }

    pub fn returns(&self) -> Vec<f64> {
        self.equities
            .windows(2)
            .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
            .collect()
    }
}

/// Headline statistics computed from an equity curve alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub best_return: f64,
    pub worst_return: f64,
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator); 0 below two samples.
pub(crate) fn sample_stddev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|v| (v - mean_value) * (v - mean_value)).sum();
    (sum / (values.len() - 1) as f64).sqrt()
}

/// Percentile with linear interpolation between ranks; `alpha` in [0, 1].
pub(crate) fn percentile(values: &[f64], alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = alpha.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let idx = pos.floor() as usize;
    let frac = pos - idx as f64;
    if idx + 1 < sorted.len() {
        sorted[idx] * (1.0 - frac) + sorted[idx + 1] * frac
    } else {
        sorted[sorted.len() - 1]
    }
}

/// Compute headline statistics from an equity curve at a given
/// annualization factor, with a zero risk-free rate.
pub fn compute_stats(curve: &EquityCurve, periods_per_year: f64) -> PerformanceStats {
    let mut stats = PerformanceStats::default();
    if curve.len() < 2 {
        return stats;
    }

    let returns = curve.returns();
    let avg = mean(&returns);
    let vol = sample_stddev(&returns, avg);

    stats.total_return = curve.total_return();
    let years = (curve.len() - 1) as f64 / periods_per_year;
    if years > 0.0 {
        stats.cagr = (1.0 + stats.total_return).powf(1.0 / years) - 1.0;
    }
    stats.volatility = vol * periods_per_year.sqrt();
    if vol > 0.0 {
        stats.sharpe = avg / vol * periods_per_year.sqrt();
    }

    let downside_sum: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    let downside_dev = (downside_sum / returns.len() as f64).sqrt();
    if downside_dev > 0.0 {
        stats.sortino = avg / downside_dev * periods_per_year.sqrt();
    }

    let mut peak = curve.equities()[0];
    let mut max_dd = 0.0f64;
    for &equity in curve.equities() {
        peak = peak.max(equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    if max_dd > 0.0 {
        stats.calmar = stats.cagr / max_dd;
    }

    let var95 = percentile(&returns, 0.05);
    stats.var_95 = -var95;
    let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var95).collect();
    if !tail.is_empty() {
        stats.cvar_95 = -mean(&tail);
    }

    stats.best_return = returns.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    stats.worst_return = returns.iter().cloned().fold(f64::INFINITY, f64::min);

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn curve(values: &[f64]) -> EquityCurve {
        let mut curve = EquityCurve::default();
        for (i, &v) in values.iter().enumerate() {
            curve.add_point(Utc.timestamp_opt(i as i64 * 86_400, 0).unwrap(), v);
        }
        curve
    }

    #[test]
    fn total_return_from_endpoints() {
        let curve = curve(&[100.0, 110.0, 99.0, 108.9]);
        assert!((curve.total_return() - 0.089).abs() < 1e-9);
    }

    #[test]
    fn percentile_endpoints_are_min_and_max() {
        let values = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 9.0);
    }

    #[test]
    fn percentile_is_monotonic_in_alpha() {
        let values = [0.5, -0.3, 0.1, 0.9, -0.7, 0.0, 0.2];
        let mut last = f64::NEG_INFINITY;
        for step in 0..=20 {
            let alpha = step as f64 / 20.0;
            let p = percentile(&values, alpha);
            assert!(p >= last, "percentile not monotonic at alpha={alpha}");
            last = p;
        }
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let values = [0.0, 1.0];
        assert!((percentile(&values, 0.5) - 0.5).abs() < 1e-12);
        assert!((percentile(&values, 0.25) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn stats_are_zero_for_degenerate_curves() {
        let stats = compute_stats(&curve(&[100.0]), 252.0);
        assert_eq!(stats.total_return, 0.0);
        assert_eq!(stats.sharpe, 0.0);
    }

    #[test]
    fn stats_capture_best_and_worst_returns() {
        let stats = compute_stats(&curve(&[100.0, 110.0, 99.0, 108.9]), 252.0);
        assert!((stats.best_return - 0.1).abs() < 1e-9);
        assert!((stats.worst_return + 0.1).abs() < 1e-9);
        assert!(stats.var_95 > 0.0);
    }
}
