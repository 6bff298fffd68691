use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use regime_core::{Fill, PortfolioSnapshot, RegimeType};
use serde_json::json;

use crate::equity::{compute_stats, PerformanceStats};
use crate::performance::{PerformanceCalculator, PerformanceSummary};
use crate::regime_attribution::RegimePerformance;
use crate::tracker::MetricsTracker;
use crate::transition_metrics::TransitionStats;

/// Aggregate performance report for a run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub performance: PerformanceStats,
    pub performance_summary: PerformanceSummary,
    pub max_drawdown: f64,
    pub max_drawdown_start: Option<DateTime<Utc>>,
    pub max_drawdown_end: Option<DateTime<Utc>>,
    pub regime_performance: BTreeMap<RegimeType, RegimePerformance>,
    pub transitions: BTreeMap<(RegimeType, RegimeType), TransitionStats>,
}

/// Build a report from the tracker's accumulated state, the run's fills,
/// and an optional benchmark return series aligned to the curve returns.
pub fn build_report(
    tracker: &MetricsTracker,
    fills: &[Fill],
    risk_free_rate: f64,
    benchmark_returns: Option<&[f64]>,
) -> Report {
    let calculator = PerformanceCalculator::new();

    let snapshots: Vec<PortfolioSnapshot> = if tracker.snapshots().is_empty() {
        tracker
            .equity_curve()
            .timestamps()
            .iter()
            .zip(tracker.equity_curve().equities().iter())
            .map(|(&timestamp, &equity)| PortfolioSnapshot {
                timestamp,
                equity,
                cash: equity,
                positions_value: 0.0,
            })
            .collect()
    } else {
        tracker.snapshots().to_vec()
    };

    tracing::debug!(
        snapshots = snapshots.len(),
        fills = fills.len(),
        "building performance report"
    );

    Report {
        performance: compute_stats(tracker.equity_curve(), 252.0),
        performance_summary: calculator.calculate(
            &snapshots,
            fills,
            risk_free_rate,
            benchmark_returns,
        ),
        max_drawdown: tracker.drawdown().max_drawdown(),
        max_drawdown_start: tracker.drawdown().max_drawdown_start(),
        max_drawdown_end: tracker.drawdown().max_drawdown_end(),
        regime_performance: tracker.regime_attribution().results(),
        transitions: tracker.transition_metrics().results(),
    }
}

fn format_date(date: &Option<DateTime<Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

/// Serializes reports to CSV and JSON.
pub struct ReportWriter;

impl ReportWriter {
    /// One "metric,value" row per metric, followed by regime and
    /// transition sections.
    pub fn to_csv(report: &Report) -> String {
        let mut out = String::new();
        let summary = &report.performance_summary;

        let _ = writeln!(out, "metric,value");
        let _ = writeln!(out, "total_return,{}", report.performance.total_return);
        let _ = writeln!(out, "cagr,{}", report.performance.cagr);
        let _ = writeln!(out, "volatility,{}", report.performance.volatility);
        let _ = writeln!(out, "sharpe,{}", report.performance.sharpe);
        let _ = writeln!(out, "sortino,{}", report.performance.sortino);
        let _ = writeln!(out, "calmar,{}", report.performance.calmar);
        let _ = writeln!(out, "var_95,{}", report.performance.var_95);
        let _ = writeln!(out, "cvar_95,{}", report.performance.cvar_95);
        let _ = writeln!(out, "best_return,{}", report.performance.best_return);
        let _ = writeln!(out, "worst_return,{}", report.performance.worst_return);
        let _ = writeln!(out, "summary_total_return,{}", summary.total_return);
        let _ = writeln!(out, "summary_cagr,{}", summary.cagr);
        let _ = writeln!(out, "summary_avg_daily_return,{}", summary.avg_daily_return);
        let _ = writeln!(out, "summary_avg_monthly_return,{}", summary.avg_monthly_return);
        let _ = writeln!(out, "summary_best_day,{}", summary.best_day);
        let _ = writeln!(out, "summary_worst_day,{}", summary.worst_day);
        let _ = writeln!(out, "summary_best_day_date,{}", format_date(&summary.best_day_date));
        let _ = writeln!(out, "summary_worst_day_date,{}", format_date(&summary.worst_day_date));
        let _ = writeln!(out, "summary_best_month,{}", summary.best_month);
        let _ = writeln!(out, "summary_worst_month,{}", summary.worst_month);
        let _ = writeln!(out, "summary_best_month_date,{}", format_date(&summary.best_month_date));
        let _ = writeln!(out, "summary_worst_month_date,{}", format_date(&summary.worst_month_date));
        let _ = writeln!(out, "summary_volatility,{}", summary.volatility);
        let _ = writeln!(out, "summary_downside_deviation,{}", summary.downside_deviation);
        let _ = writeln!(out, "summary_max_drawdown,{}", summary.max_drawdown);
        let _ = writeln!(out, "summary_var_95,{}", summary.var_95);
        let _ = writeln!(out, "summary_var_99,{}", summary.var_99);
        let _ = writeln!(out, "summary_cvar_95,{}", summary.cvar_95);
        let _ = writeln!(out, "summary_sharpe_ratio,{}", summary.sharpe_ratio);
        let _ = writeln!(out, "summary_sortino_ratio,{}", summary.sortino_ratio);
        let _ = writeln!(out, "summary_calmar_ratio,{}", summary.calmar_ratio);
        let _ = writeln!(out, "summary_omega_ratio,{}", summary.omega_ratio);
        let _ = writeln!(out, "summary_ulcer_index,{}", summary.ulcer_index);
        let _ = writeln!(out, "summary_information_ratio,{}", summary.information_ratio);
        let _ = writeln!(out, "summary_treynor_ratio,{}", summary.treynor_ratio);
        let _ = writeln!(out, "summary_tail_ratio,{}", summary.tail_ratio);
        let _ = writeln!(out, "summary_total_trades,{}", summary.total_trades);
        let _ = writeln!(out, "summary_winning_trades,{}", summary.winning_trades);
        let _ = writeln!(out, "summary_losing_trades,{}", summary.losing_trades);
        let _ = writeln!(out, "summary_open_trades,{}", summary.open_trades);
        let _ = writeln!(out, "summary_win_rate,{}", summary.win_rate);
        let _ = writeln!(out, "summary_profit_factor,{}", summary.profit_factor);
        let _ = writeln!(out, "summary_avg_win,{}", summary.avg_win);
        let _ = writeln!(out, "summary_avg_loss,{}", summary.avg_loss);
        let _ = writeln!(out, "summary_win_loss_ratio,{}", summary.win_loss_ratio);
        let _ = writeln!(out, "summary_expectancy,{}", summary.expectancy);
        let _ = writeln!(out, "summary_avg_trade_duration_days,{}", summary.avg_trade_duration_days);
        let _ = writeln!(out, "summary_annual_turnover,{}", summary.annual_turnover);
        let _ = writeln!(out, "max_drawdown,{}", report.max_drawdown);

        let _ = writeln!(out, "regime,return,avg_return,sharpe,max_drawdown,time_pct,observations");
        for (regime, perf) in &report.regime_performance {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{}",
                regime.label(),
                perf.total_return,
                perf.avg_return,
                perf.sharpe,
                perf.max_drawdown,
                perf.time_pct,
                perf.observations
            );
        }

        let _ = writeln!(out, "transition_from,transition_to,avg_return,volatility,observations");
        for ((from, to), stats) in &report.transitions {
            let _ = writeln!(
                out,
                "{},{},{},{},{}",
                from.label(),
                to.label(),
                stats.avg_return,
                stats.volatility,
                stats.observations
            );
        }

        out
    }

    /// JSON object with `performance`, `performance_summary`,
    /// `max_drawdown`, `regime_performance[]`, and `transitions[]`.
    pub fn to_json(report: &Report) -> String {
        let summary = &report.performance_summary;
        let regimes: Vec<serde_json::Value> = report
            .regime_performance
            .iter()
            .map(|(regime, perf)| {
                json!({
                    "regime": regime.label(),
                    "return": perf.total_return,
                    "avg_return": perf.avg_return,
                    "sharpe": perf.sharpe,
                    "max_drawdown": perf.max_drawdown,
                    "time_pct": perf.time_pct,
                    "observations": perf.observations,
                })
            })
            .collect();
        let transitions: Vec<serde_json::Value> = report
            .transitions
            .iter()
            .map(|((from, to), stats)| {
                json!({
                    "from": from.label(),
                    "to": to.label(),
                    "avg_return": stats.avg_return,
                    "volatility": stats.volatility,
                    "observations": stats.observations,
                })
            })
            .collect();

        let value = json!({
            "performance": report.performance,
            "performance_summary": {
                "total_return": summary.total_return,
                "cagr": summary.cagr,
                "avg_daily_return": summary.avg_daily_return,
                "avg_monthly_return": summary.avg_monthly_return,
                "best_day": summary.best_day,
                "worst_day": summary.worst_day,
                "best_day_date": format_date(&summary.best_day_date),
                "worst_day_date": format_date(&summary.worst_day_date),
                "best_month": summary.best_month,
                "worst_month": summary.worst_month,
                "best_month_date": format_date(&summary.best_month_date),
                "worst_month_date": format_date(&summary.worst_month_date),
                "volatility": summary.volatility,
                "downside_deviation": summary.downside_deviation,
                "max_drawdown": summary.max_drawdown,
                "var_95": summary.var_95,
                "var_99": summary.var_99,
                "cvar_95": summary.cvar_95,
                "sharpe_ratio": summary.sharpe_ratio,
                "sortino_ratio": summary.sortino_ratio,
                "calmar_ratio": summary.calmar_ratio,
                "omega_ratio": summary.omega_ratio,
                "ulcer_index": summary.ulcer_index,
                "information_ratio": summary.information_ratio,
                "treynor_ratio": summary.treynor_ratio,
                "tail_ratio": summary.tail_ratio,
                "total_trades": summary.total_trades,
                "winning_trades": summary.winning_trades,
                "losing_trades": summary.losing_trades,
                "open_trades": summary.open_trades,
                "win_rate": summary.win_rate,
                "profit_factor": summary.profit_factor,
                "avg_win": summary.avg_win,
                "avg_loss": summary.avg_loss,
                "win_loss_ratio": summary.win_loss_ratio,
                "expectancy": summary.expectancy,
                "avg_trade_duration_days": summary.avg_trade_duration_days,
                "annual_turnover": summary.annual_turnover,
            },
            "max_drawdown": report.max_drawdown,
            "regime_performance": regimes,
            "transitions": transitions,
        });

        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use regime_core::{Portfolio, RegimeState};

    fn ts(day: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(day * 86_400, 0).unwrap()
    }

    fn tracker_with_history() -> MetricsTracker {
        let mut tracker = MetricsTracker::new();
        let portfolio = Portfolio::new(100_000.0);
        for day in 0..4 {
            let regime = if day < 2 { RegimeType::Bull } else { RegimeType::Bear };
            let mut probs = vec![0.0; 4];
            probs[regime.index()] = 1.0;
            let state = RegimeState::from_probabilities(ts(day), probs);
            tracker.update(ts(day), &portfolio, Some(&state));
        }
        tracker
    }

    #[test]
    fn csv_report_has_metric_rows_and_sections() {
        let report = build_report(&tracker_with_history(), &[], 0.0, None);
        let csv = ReportWriter::to_csv(&report);

        assert!(csv.starts_with("metric,value\n"));
        assert!(csv.contains("summary_sharpe_ratio,"));
        assert!(csv.contains("regime,return,avg_return,sharpe,max_drawdown,time_pct,observations"));
        assert!(csv.contains("bull,"));
        assert!(csv.contains("transition_from,transition_to,avg_return,volatility,observations"));
        assert!(csv.contains("bull,bear,"));
    }

    #[test]
    fn json_report_has_expected_shape() {
        let report = build_report(&tracker_with_history(), &[], 0.0, None);
        let parsed: serde_json::Value =
            serde_json::from_str(&ReportWriter::to_json(&report)).unwrap();

        assert!(parsed.get("performance").is_some());
        assert!(parsed.get("performance_summary").is_some());
        assert!(parsed.get("max_drawdown").is_some());
        assert!(parsed["regime_performance"].is_array());
        assert!(parsed["transitions"].is_array());
        assert_eq!(parsed["regime_performance"][0]["regime"], "bull");
        assert_eq!(parsed["transitions"][0]["from"], "bull");
        assert_eq!(parsed["transitions"][0]["to"], "bear");
    }

    #[test]
    fn identical_inputs_produce_identical_reports() {
        let a = ReportWriter::to_csv(&build_report(&tracker_with_history(), &[], 0.0, None));
        let b = ReportWriter::to_csv(&build_report(&tracker_with_history(), &[], 0.0, None));
        assert_eq!(a, b);
    }
}
