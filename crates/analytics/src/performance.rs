use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use regime_core::{Fill, PortfolioSnapshot, RegimeState, RegimeTransition, RegimeType};
use serde::Serialize;

use crate::equity::{mean, percentile, sample_stddev};

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 3600.0;

/// Full performance summary over an equity curve and its fills.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub cagr: f64,
    pub avg_daily_return: f64,
    pub avg_monthly_return: f64,
    pub best_day: f64,
    pub worst_day: f64,
    pub best_day_date: Option<DateTime<Utc>>,
    pub worst_day_date: Option<DateTime<Utc>>,
    pub best_month: f64,
    pub worst_month: f64,
    pub best_month_date: Option<DateTime<Utc>>,
    pub worst_month_date: Option<DateTime<Utc>>,

    pub volatility: f64,
    pub downside_deviation: f64,
    pub max_drawdown: f64,
    pub max_drawdown_start: Option<DateTime<Utc>>,
    pub max_drawdown_end: Option<DateTime<Utc>>,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,

    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub omega_ratio: f64,
    pub ulcer_index: f64,
    pub information_ratio: f64,
    pub treynor_ratio: f64,
    pub tail_ratio: f64,

    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub open_trades: u64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub win_loss_ratio: f64,
    pub expectancy: f64,
    pub avg_trade_duration_days: f64,
    pub annual_turnover: f64,
}

/// One closed round trip reconstructed from fills.
#[derive(Debug, Clone, Copy)]
pub struct TradeSummary {
    pub pnl: f64,
    pub notional: f64,
    pub duration_days: f64,
}

/// Performance sliced to the periods spent in one regime.
#[derive(Debug, Clone, Serialize)]
pub struct RegimeMetrics {
    pub regime: RegimeType,
    pub time_percentage: f64,
    pub summary: PerformanceSummary,
    pub trade_count: u64,
}

/// Aggregated behavior of one transition pair across its occurrences.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionSummary {
    pub from: RegimeType,
    pub to: RegimeType,
    pub occurrences: u64,
    pub avg_return: f64,
    pub volatility: f64,
    pub avg_duration_secs: f64,
}

/// Regime- and factor-level return attribution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AttributionResult {
    pub regime_contribution: BTreeMap<RegimeType, f64>,
    pub factor_contribution: BTreeMap<String, f64>,
    pub alpha: f64,
    pub residual: f64,
}

#[derive(Debug, Clone, Copy)]
struct Lot {
    quantity: f64,
    price: f64,
    timestamp: DateTime<Utc>,
    commission: f64,
}

/// Computes performance, attribution, and trade statistics from equity
/// snapshots and fills.
#[derive(Debug, Clone, Default)]
pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Annualization factor from the mean snapshot spacing; 252 when the
    /// curve is too short to infer one.
    fn periods_per_year(curve: &[PortfolioSnapshot]) -> f64 {
        if curve.len() < 2 {
            return 252.0;
        }
        let total_secs = curve[curve.len() - 1]
            .timestamp
            .signed_duration_since(curve[0].timestamp)
            .num_milliseconds() as f64
            / 1_000.0;
        if total_secs <= 0.0 {
            return 252.0;
        }
        let avg_delta = total_secs / (curve.len() - 1) as f64;
        SECONDS_PER_YEAR / avg_delta
    }

    fn returns(curve: &[PortfolioSnapshot]) -> Vec<f64> {
        curve
            .windows(2)
            .map(|w| {
                if w[0].equity == 0.0 {
                    0.0
                } else {
                    (w[1].equity - w[0].equity) / w[0].equity
                }
            })
            .collect()
    }

    /// Group per-period returns by a date-format key and compound within
    /// each bucket. Returns (bucket key, compounded return, bucket time).
    fn bucket_returns(curve: &[PortfolioSnapshot], format: &str) -> Vec<(String, f64, DateTime<Utc>)> {
        let mut buckets: BTreeMap<String, (f64, DateTime<Utc>)> = BTreeMap::new();
        for w in curve.windows(2) {
            let key = w[1].timestamp.format(format).to_string();
            let ret = if w[0].equity == 0.0 {
                0.0
            } else {
                (w[1].equity - w[0].equity) / w[0].equity
            };
            let entry = buckets.entry(key).or_insert((1.0, w[1].timestamp));
            entry.0 *= 1.0 + ret;
            entry.1 = w[1].timestamp;
        }
        buckets
            .into_iter()
            .map(|(key, (compounded, ts))| (key, compounded - 1.0, ts))
            .collect()
    }

    fn max_drawdown(
        curve: &[PortfolioSnapshot],
    ) -> (f64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        if curve.is_empty() {
            return (0.0, None, None);
        }
        let mut peak = curve[0].equity;
        let mut peak_time = curve[0].timestamp;
        let mut max_dd = 0.0;
        let mut start = None;
        let mut end = None;
        for snap in curve {
            if snap.equity > peak {
                peak = snap.equity;
                peak_time = snap.timestamp;
            }
            let dd = if peak > 0.0 { (peak - snap.equity) / peak } else { 0.0 };
            if dd > max_dd {
                max_dd = dd;
                start = Some(peak_time);
                end = Some(snap.timestamp);
            }
        }
        (max_dd, start, end)
    }

    /// Reconstruct closed round trips from fills by FIFO lot matching.
    ///
    /// Opposite-signed fills consume the oldest open lot first;
    /// commissions are shared pro-rata with the closed quantity. Any
    /// residual quantity opens a new lot. Returns the closed trades and
    /// the number of lots still open.
    pub fn trades_from_fills(&self, fills: &[Fill]) -> (Vec<TradeSummary>, u64) {
        let mut open_lots: HashMap<String, VecDeque<Lot>> = HashMap::new();
        let mut trades = Vec::new();

        for fill in fills {
            if fill.symbol.is_empty() || fill.quantity == 0.0 {
                continue;
            }
            let lots = open_lots.entry(fill.symbol.clone()).or_default();
            let fill_qty_abs = fill.quantity.abs();
            let mut remaining = fill.quantity;
            let mut used_close_commission = 0.0;

            while let Some(front) = lots.front().copied() {
                if remaining * front.quantity >= 0.0 || remaining == 0.0 {
                    break;
                }
                lots.pop_front();
                let close_qty = remaining.abs().min(front.quantity.abs());
                let sign = front.quantity.signum();
                let open_commission = front.commission * (close_qty / front.quantity.abs());
                let close_commission = if fill_qty_abs > 0.0 {
                    fill.commission * (close_qty / fill_qty_abs)
                } else {
                    0.0
                };
                used_close_commission += close_commission;

                let pnl = close_qty * (fill.price - front.price) * sign
                    - open_commission
                    - close_commission;
                let duration_days = fill
                    .timestamp
                    .signed_duration_since(front.timestamp)
                    .num_milliseconds() as f64
                    / 1_000.0
                    / 86_400.0;
                trades.push(TradeSummary {
                    pnl,
                    notional: close_qty * front.price,
                    duration_days,
                });

                let leftover = front.quantity - close_qty * sign;
                if leftover != 0.0 {
                    lots.push_front(Lot {
                        quantity: leftover,
                        price: front.price,
                        timestamp: front.timestamp,
                        commission: front.commission - open_commission,
                    });
                }
                remaining += close_qty * sign;
            }

            if remaining != 0.0 {
                lots.push_back(Lot {
                    quantity: remaining,
                    price: fill.price,
                    timestamp: fill.timestamp,
                    commission: (fill.commission - used_close_commission).max(0.0),
                });
            }
        }

        let open = open_lots.values().map(|lots| lots.len() as u64).sum();
        (trades, open)
    }

    /// Compute the full performance summary.
    pub fn calculate(
        &self,
        curve: &[PortfolioSnapshot],
        fills: &[Fill],
        risk_free_rate: f64,
        benchmark_returns: Option<&[f64]>,
    ) -> PerformanceSummary {
        let mut summary = PerformanceSummary::default();
        if curve.len() < 2 {
            return summary;
        }

        let periods_per_year = Self::periods_per_year(curve);
        let returns = Self::returns(curve);
        let avg = mean(&returns);
        let vol = sample_stddev(&returns, avg);

        summary.total_return = (curve[curve.len() - 1].equity - curve[0].equity) / curve[0].equity;
        let years = curve[curve.len() - 1]
            .timestamp
            .signed_duration_since(curve[0].timestamp)
            .num_milliseconds() as f64
            / 1_000.0
            / SECONDS_PER_YEAR;
        if years > 0.0 {
            summary.cagr = (1.0 + summary.total_return).powf(1.0 / years) - 1.0;
        }

        let daily = Self::bucket_returns(curve, "%Y-%m-%d");
        let daily_returns: Vec<f64> = daily.iter().map(|(_, r, _)| *r).collect();
        summary.avg_daily_return = mean(&daily_returns);
        if let Some((_, best, ts)) = daily
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            summary.best_day = *best;
            summary.best_day_date = Some(*ts);
        }
        if let Some((_, worst, ts)) = daily
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            summary.worst_day = *worst;
            summary.worst_day_date = Some(*ts);
        }

        let monthly = Self::bucket_returns(curve, "%Y-%m");
        let monthly_returns: Vec<f64> = monthly.iter().map(|(_, r, _)| *r).collect();
        summary.avg_monthly_return = mean(&monthly_returns);
        if let Some((_, best, ts)) = monthly
            .iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            summary.best_month = *best;
            summary.best_month_date = Some(*ts);
        }
        if let Some((_, worst, ts)) = monthly
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        {
            summary.worst_month = *worst;
            summary.worst_month_date = Some(*ts);
        }

        summary.volatility = vol * periods_per_year.sqrt();
        let rf_per_period = risk_free_rate / periods_per_year;
        if vol > 0.0 {
            summary.sharpe_ratio = (avg - rf_per_period) / vol * periods_per_year.sqrt();
        }

        let downside_sum: f64 = returns
            .iter()
            .map(|r| {
                let diff = r - rf_per_period;
                if diff < 0.0 {
                    diff * diff
                } else {
                    0.0
                }
            })
            .sum();
        let downside_dev = if returns.is_empty() {
            0.0
        } else {
            (downside_sum / returns.len() as f64).sqrt()
        };
        summary.downside_deviation = downside_dev * periods_per_year.sqrt();
        if downside_dev > 0.0 {
            summary.sortino_ratio = (avg - rf_per_period) / downside_dev * periods_per_year.sqrt();
        }

        let (max_dd, dd_start, dd_end) = Self::max_drawdown(curve);
        summary.max_drawdown = max_dd;
        summary.max_drawdown_start = dd_start;
        summary.max_drawdown_end = dd_end;
        if max_dd > 0.0 {
            summary.calmar_ratio = summary.cagr / max_dd;
        }

        if !returns.is_empty() {
            let var95 = percentile(&returns, 0.05);
            let var99 = percentile(&returns, 0.01);
            summary.var_95 = -var95;
            summary.var_99 = -var99;
            let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var95).collect();
            if !tail.is_empty() {
                summary.cvar_95 = -mean(&tail);
            }
            let p95 = percentile(&returns, 0.95);
            let p05 = percentile(&returns, 0.05);
            if p05 != 0.0 {
                summary.tail_ratio = (p95 / p05).abs();
            }
        }

        let mut peak = curve[0].equity;
        let squared_drawdowns: Vec<f64> = curve
            .iter()
            .map(|snap| {
                peak = peak.max(snap.equity);
                let dd = if peak > 0.0 { (peak - snap.equity) / peak } else { 0.0 };
                dd * dd
            })
            .collect();
        summary.ulcer_index = mean(&squared_drawdowns).sqrt();

        let mut gain = 0.0;
        let mut loss = 0.0;
        for r in &returns {
            let excess = r - rf_per_period;
            if excess > 0.0 {
                gain += excess;
            } else {
                loss -= excess;
            }
        }
        if loss > 0.0 {
            summary.omega_ratio = gain / loss;
        }

        if let Some(benchmark) = benchmark_returns {
            if benchmark.len() == returns.len() && !returns.is_empty() {
                let active: Vec<f64> = returns
                    .iter()
                    .zip(benchmark.iter())
                    .map(|(r, b)| r - b)
                    .collect();
                let active_mean = mean(&active);
                let tracking_error = sample_stddev(&active, active_mean);
                if tracking_error > 0.0 {
                    summary.information_ratio =
                        active_mean / tracking_error * periods_per_year.sqrt();
                }

                let benchmark_mean = mean(benchmark);
                let mut cov = 0.0;
                let mut var = 0.0;
                for (r, b) in returns.iter().zip(benchmark.iter()) {
                    cov += (r - avg) * (b - benchmark_mean);
                    var += (b - benchmark_mean) * (b - benchmark_mean);
                }
                let beta = if var > 0.0 { cov / var } else { 0.0 };
                if beta != 0.0 {
                    summary.treynor_ratio = (avg * periods_per_year - risk_free_rate) / beta;
                }
            }
        }

        let (trades, open_trades) = self.trades_from_fills(fills);
        summary.total_trades = trades.len() as u64;
        summary.open_trades = open_trades;
        let mut win_sum = 0.0;
        let mut loss_sum = 0.0;
        let mut duration_sum = 0.0;
        for trade in &trades {
            duration_sum += trade.duration_days;
            if trade.pnl >= 0.0 {
                summary.winning_trades += 1;
                win_sum += trade.pnl;
            } else {
                summary.losing_trades += 1;
                loss_sum += trade.pnl;
            }
        }
        if summary.total_trades > 0 {
            summary.win_rate = summary.winning_trades as f64 / summary.total_trades as f64;
            summary.avg_trade_duration_days = duration_sum / summary.total_trades as f64;
        }
        if summary.winning_trades > 0 {
            summary.avg_win = win_sum / summary.winning_trades as f64;
        }
        if summary.losing_trades > 0 {
            summary.avg_loss = loss_sum / summary.losing_trades as f64;
        }
        if summary.avg_loss != 0.0 {
            summary.win_loss_ratio = (summary.avg_win / summary.avg_loss).abs();
        }
        if loss_sum != 0.0 {
            summary.profit_factor = (win_sum / loss_sum).abs();
        }
        summary.expectancy =
            summary.win_rate * summary.avg_win - (1.0 - summary.win_rate) * summary.avg_loss.abs();

        let total_trade_value: f64 = fills.iter().map(|f| (f.quantity * f.price).abs()).sum();
        let avg_equity = mean(&curve.iter().map(|s| s.equity).collect::<Vec<f64>>());
        if avg_equity > 0.0 && years > 0.0 {
            summary.annual_turnover = total_trade_value / avg_equity / years;
        }

        summary
    }

    /// Slice the curve and fills by the prevailing regime and summarize
    /// each slice. `time_percentage` is the share of snapshots spent in
    /// the regime.
    pub fn calculate_by_regime(
        &self,
        curve: &[PortfolioSnapshot],
        fills: &[Fill],
        regimes: &[RegimeState],
        risk_free_rate: f64,
    ) -> BTreeMap<RegimeType, RegimeMetrics> {
        let mut out = BTreeMap::new();
        if curve.len() < 2 || regimes.is_empty() {
            return out;
        }

        let mut curves: BTreeMap<RegimeType, Vec<PortfolioSnapshot>> = BTreeMap::new();
        let mut idx = 0;
        for snap in curve {
            while idx + 1 < regimes.len() && regimes[idx + 1].timestamp <= snap.timestamp {
                idx += 1;
            }
            curves
                .entry(regimes[idx].regime)
                .or_default()
                .push(snap.clone());
        }

        let mut fills_by_regime: BTreeMap<RegimeType, Vec<Fill>> = BTreeMap::new();
        idx = 0;
        for fill in fills {
            while idx + 1 < regimes.len() && regimes[idx + 1].timestamp <= fill.timestamp {
                idx += 1;
            }
            fills_by_regime
                .entry(regimes[idx].regime)
                .or_default()
                .push(fill.clone());
        }

        for (regime, regime_curve) in curves {
            if regime_curve.len() < 2 {
                continue;
            }
            let empty = Vec::new();
            let regime_fills = fills_by_regime.get(&regime).unwrap_or(&empty);
            let summary = self.calculate(&regime_curve, regime_fills, risk_free_rate, None);
            let metrics = RegimeMetrics {
                regime,
                time_percentage: regime_curve.len() as f64 / curve.len() as f64,
                trade_count: summary.total_trades,
                summary,
            };
            out.insert(regime, metrics);
        }
        out
    }

    /// Aggregate returns inside each inter-transition window, grouped by
    /// the (from, to) pair. The final window extends to the last equity
    /// snapshot.
    pub fn calculate_transitions(
        &self,
        curve: &[PortfolioSnapshot],
        transitions: &[RegimeTransition],
    ) -> Vec<TransitionSummary> {
        let mut out = Vec::new();
        if curve.len() < 2 || transitions.is_empty() {
            return out;
        }

        #[derive(Default)]
        struct Aggregate {
            occurrences: u64,
            sum_return: f64,
            sum_volatility: f64,
            sum_duration_secs: f64,
        }

        let mut aggregates: BTreeMap<(RegimeType, RegimeType), Aggregate> = BTreeMap::new();
        for (i, transition) in transitions.iter().enumerate() {
            let start = transition.timestamp;
            let end = if i + 1 < transitions.len() {
                transitions[i + 1].timestamp
            } else {
                curve[curve.len() - 1].timestamp
            };

            let mut window_returns = Vec::new();
            for w in curve.windows(2) {
                if w[1].timestamp < start || w[1].timestamp > end {
                    continue;
                }
                let ret = if w[0].equity == 0.0 {
                    0.0
                } else {
                    (w[1].equity - w[0].equity) / w[0].equity
                };
                window_returns.push(ret);
            }

            let avg = mean(&window_returns);
            let vol = sample_stddev(&window_returns, avg);
            let aggregate = aggregates
                .entry((transition.from, transition.to))
                .or_default();
            aggregate.occurrences += 1;
            aggregate.sum_return += avg;
            aggregate.sum_volatility += vol;
            aggregate.sum_duration_secs +=
                end.signed_duration_since(start).num_milliseconds() as f64 / 1_000.0;
        }

        for ((from, to), aggregate) in aggregates {
            let n = aggregate.occurrences as f64;
            out.push(TransitionSummary {
                from,
                to,
                occurrences: aggregate.occurrences,
                avg_return: aggregate.sum_return / n,
                volatility: aggregate.sum_volatility / n,
                avg_duration_secs: aggregate.sum_duration_secs / n,
            });
        }
        out
    }

    /// Attribute average returns to regimes (time-weighted) and to factor
    /// series (beta-weighted); the unexplained remainder is alpha.
    pub fn calculate_attribution(
        &self,
        curve: &[PortfolioSnapshot],
        regimes: &[RegimeState],
        factor_returns: &BTreeMap<String, Vec<f64>>,
    ) -> AttributionResult {
        let mut result = AttributionResult::default();
        let returns = Self::returns(curve);
        if returns.is_empty() {
            return result;
        }

        if !regimes.is_empty() {
            let mut sums: BTreeMap<RegimeType, f64> = BTreeMap::new();
            let mut counts: BTreeMap<RegimeType, u64> = BTreeMap::new();
            let mut idx = 0;
            for (i, snap) in curve.iter().enumerate().skip(1) {
                while idx + 1 < regimes.len() && regimes[idx + 1].timestamp <= snap.timestamp {
                    idx += 1;
                }
                *sums.entry(regimes[idx].regime).or_default() += returns[i - 1];
                *counts.entry(regimes[idx].regime).or_default() += 1;
            }
            for (regime, sum) in sums {
                let count = counts[&regime];
                let time_pct = count as f64 / returns.len() as f64;
                let avg_return = if count > 0 { sum / count as f64 } else { 0.0 };
                result.regime_contribution.insert(regime, time_pct * avg_return);
            }
        }

        let avg_return = mean(&returns);
        let mut explained = 0.0;
        let mut explained_series = vec![0.0; returns.len()];
        for (name, factor) in factor_returns {
            if factor.len() != returns.len() {
                continue;
            }
            let factor_mean = mean(factor);
            let mut cov = 0.0;
            let mut var = 0.0;
            for (r, f) in returns.iter().zip(factor.iter()) {
                cov += (r - avg_return) * (f - factor_mean);
                var += (f - factor_mean) * (f - factor_mean);
            }
            let beta = if var > 0.0 { cov / var } else { 0.0 };
            let contribution = beta * factor_mean;
            result.factor_contribution.insert(name.clone(), contribution);
            explained += contribution;
            for (slot, f) in explained_series.iter_mut().zip(factor.iter()) {
                *slot += beta * f;
            }
        }
        result.alpha = avg_return - explained;
        let residuals: Vec<f64> = returns
            .iter()
            .zip(explained_series.iter())
            .map(|(r, e)| r - result.alpha - e)
            .collect();
        result.residual = mean(&residuals);
        result
    }

    /// Stability of per-regime Sharpe ratios: 1 minus their dispersion
    /// relative to their mean.
    pub fn regime_robustness_score(
        &self,
        regime_metrics: &BTreeMap<RegimeType, RegimeMetrics>,
    ) -> f64 {
        let sharpes: Vec<f64> = regime_metrics
            .values()
            .map(|m| m.summary.sharpe_ratio)
            .collect();
        if sharpes.is_empty() {
            return 0.0;
        }
        let avg = mean(&sharpes);
        if avg == 0.0 {
            return 0.0;
        }
        1.0 - sample_stddev(&sharpes, avg) / avg
    }
}
