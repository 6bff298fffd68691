use approx::assert_relative_eq;
use chrono::{DateTime, TimeZone, Utc};
use regime_core::{Fill, PortfolioSnapshot, RegimeState, RegimeTransition, RegimeType};

use crate::performance::PerformanceCalculator;

fn ts(day: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(day * 86_400, 0).unwrap()
}

fn snapshot(day: i64, equity: f64) -> PortfolioSnapshot {
    PortfolioSnapshot {
        timestamp: ts(day),
        equity,
        cash: equity,
        positions_value: 0.0,
    }
}

fn fill(day: i64, quantity: f64, price: f64, commission: f64) -> Fill {
    Fill {
        id: 0,
        order_id: 0,
        symbol: "AAA".to_string(),
        quantity,
        price,
        timestamp: ts(day),
        commission,
        slippage: 0.0,
        is_maker: false,
    }
}

fn regime_state(day: i64, regime: RegimeType) -> RegimeState {
    let mut probs = vec![0.0; 4];
    probs[regime.index()] = 1.0;
    RegimeState::from_probabilities(ts(day), probs)
}

// =============================================================================
// End-to-end PnL reconstruction
// =============================================================================

#[test]
fn summary_with_benchmark_and_trades() {
    let calculator = PerformanceCalculator::new();
    let curve = vec![
        snapshot(0, 100.0),
        snapshot(1, 110.0),
        snapshot(2, 99.0),
        snapshot(3, 108.9),
    ];
    let fills = vec![
        fill(1, 10.0, 10.0, 1.0),
        fill(2, -10.0, 12.0, 1.0),
        fill(2, 5.0, 20.0, 0.5),
        fill(3, -5.0, 19.0, 0.5),
    ];
    let benchmark = [0.05, -0.02, 0.03];

    let summary = calculator.calculate(&curve, &fills, 0.0, Some(&benchmark));

    assert!((summary.total_return - 0.089).abs() < 1e-3);
    assert!((summary.best_day - 0.1).abs() < 1e-6);
    assert!((summary.worst_day + 0.1).abs() < 1e-6);
    assert!((summary.avg_monthly_return - 0.089).abs() < 1e-3);
    assert!(summary.downside_deviation > 0.0);
    assert!(summary.var_95 > 0.0);
    assert!(summary.cvar_95 > 0.0);
    assert!(summary.information_ratio > 0.0);
    assert!(summary.treynor_ratio > 0.0);

    assert_eq!(summary.total_trades, 2);
    assert_eq!(summary.winning_trades, 1);
    assert_eq!(summary.losing_trades, 1);
    assert_relative_eq!(summary.win_rate, 0.5, epsilon = 1e-6);
    assert_relative_eq!(summary.avg_win, 18.0, epsilon = 1e-6);
    assert_relative_eq!(summary.avg_loss, -6.0, epsilon = 1e-6);
    assert_relative_eq!(summary.win_loss_ratio, 3.0, epsilon = 1e-6);
    assert_relative_eq!(summary.profit_factor, 3.0, epsilon = 1e-6);
    assert_relative_eq!(summary.expectancy, 6.0, epsilon = 1e-6);
    assert!(summary.annual_turnover > 0.0);
}

// =============================================================================
// FIFO lot matching
// =============================================================================

#[test]
fn fifo_consumes_oldest_lot_first() {
    let calculator = PerformanceCalculator::new();
    let fills = vec![
        fill(0, 10.0, 10.0, 0.0),
        fill(1, 10.0, 20.0, 0.0),
        fill(2, -10.0, 30.0, 0.0),
    ];
    let (trades, open) = calculator.trades_from_fills(&fills);

    assert_eq!(trades.len(), 1);
    // Closed against the day-0 lot at 10, not the day-1 lot at 20.
    assert!((trades[0].pnl - 200.0).abs() < 1e-9);
    assert!((trades[0].notional - 100.0).abs() < 1e-9);
    assert!((trades[0].duration_days - 2.0).abs() < 1e-9);
    assert_eq!(open, 1);
}

#[test]
fn partial_close_shrinks_the_front_lot() {
    let calculator = PerformanceCalculator::new();
    let fills = vec![fill(0, 10.0, 10.0, 1.0), fill(1, -4.0, 15.0, 0.4)];
    let (trades, open) = calculator.trades_from_fills(&fills);

    assert_eq!(trades.len(), 1);
    // 4 * (15 - 10) = 20, minus 0.4 open commission share and the 0.4
    // closing commission.
    assert!((trades[0].pnl - (20.0 - 0.4 - 0.4)).abs() < 1e-9);
    assert_eq!(open, 1);
}

#[test]
fn flip_closes_and_reopens() {
    let calculator = PerformanceCalculator::new();
    let fills = vec![fill(0, 10.0, 10.0, 0.0), fill(1, -15.0, 12.0, 0.0)];
    let (trades, open) = calculator.trades_from_fills(&fills);

    assert_eq!(trades.len(), 1);
    assert!((trades[0].pnl - 20.0).abs() < 1e-9);
    // The residual 5 shares remain open as a short lot.
    assert_eq!(open, 1);
}

#[test]
fn short_round_trip_realizes_against_short_lot() {
    let calculator = PerformanceCalculator::new();
    let fills = vec![fill(0, -10.0, 100.0, 0.0), fill(1, 10.0, 90.0, 0.0)];
    let (trades, open) = calculator.trades_from_fills(&fills);

    assert_eq!(trades.len(), 1);
    assert!((trades[0].pnl - 100.0).abs() < 1e-9);
    assert_eq!(open, 0);
}

#[test]
fn total_realized_pnl_matches_closed_deltas_minus_commissions() {
    let calculator = PerformanceCalculator::new();
    let fills = vec![
        fill(0, 10.0, 10.0, 1.0),
        fill(1, -10.0, 12.0, 1.0),
        fill(2, 5.0, 20.0, 0.5),
        fill(3, -5.0, 19.0, 0.5),
    ];
    let (trades, open) = calculator.trades_from_fills(&fills);

    let total: f64 = trades.iter().map(|t| t.pnl).sum();
    // (12-10)*10 + (19-20)*5 = 15, minus 3 of commissions.
    assert!((total - 12.0).abs() < 1e-9);
    assert_eq!(open, 0);
}

// =============================================================================
// By-regime and transition slicing
// =============================================================================

#[test]
fn by_regime_splits_time_between_regimes() {
    let calculator = PerformanceCalculator::new();
    let curve = vec![
        snapshot(0, 100.0),
        snapshot(1, 105.0),
        snapshot(2, 95.0),
        snapshot(3, 98.0),
    ];
    let fills = vec![fill(1, 1.0, 100.0, 0.0)];
    let regimes = vec![
        regime_state(0, RegimeType::Bull),
        regime_state(2, RegimeType::Bear),
    ];

    let by_regime = calculator.calculate_by_regime(&curve, &fills, &regimes, 0.0);
    assert!((by_regime[&RegimeType::Bull].time_percentage - 0.5).abs() < 1e-6);
    assert!((by_regime[&RegimeType::Bear].time_percentage - 0.5).abs() < 1e-6);
}

#[test]
fn transitions_aggregate_by_pair() {
    let calculator = PerformanceCalculator::new();
    let curve = vec![
        snapshot(0, 100.0),
        snapshot(1, 105.0),
        snapshot(2, 95.0),
        snapshot(3, 98.0),
    ];
    let transition = |day: i64, from, to| RegimeTransition {
        from,
        to,
        timestamp: ts(day),
        confidence: 0.9,
        duration_in_from_secs: 86_400.0,
    };
    let transitions = vec![
        transition(1, RegimeType::Bull, RegimeType::Bear),
        transition(2, RegimeType::Bear, RegimeType::Bull),
        transition(3, RegimeType::Bull, RegimeType::Bear),
    ];

    let summaries = calculator.calculate_transitions(&curve, &transitions);
    let bull_bear = summaries
        .iter()
        .find(|s| s.from == RegimeType::Bull && s.to == RegimeType::Bear)
        .expect("bull->bear aggregated");
    assert_eq!(bull_bear.occurrences, 2);
}

// =============================================================================
// Attribution
// =============================================================================

#[test]
fn attribution_decomposes_into_regime_and_factor_parts() {
    let calculator = PerformanceCalculator::new();
    let curve = vec![
        snapshot(0, 100.0),
        snapshot(1, 102.0),
        snapshot(2, 101.0),
        snapshot(3, 104.0),
    ];
    let regimes = vec![
        regime_state(0, RegimeType::Bull),
        regime_state(2, RegimeType::Neutral),
    ];
    let mut factors = std::collections::BTreeMap::new();
    factors.insert("momentum".to_string(), vec![0.01, -0.005, 0.02]);

    let result = calculator.calculate_attribution(&curve, &regimes, &factors);

    assert!(result.regime_contribution.contains_key(&RegimeType::Bull));
    assert!(result.factor_contribution.contains_key("momentum"));
    // The regime time shares weight average returns into contributions
    // that stay on the same order as the raw returns.
    let total_contribution: f64 = result.regime_contribution.values().sum();
    assert!(total_contribution.abs() < 1.0);
}

#[test]
fn empty_inputs_produce_defaults_not_nans() {
    let calculator = PerformanceCalculator::new();
    let summary = calculator.calculate(&[], &[], 0.0, None);
    assert_eq!(summary.total_trades, 0);
    assert_eq!(summary.sharpe_ratio, 0.0);
    assert!(!summary.total_return.is_nan());

    let single = calculator.calculate(&[snapshot(0, 100.0)], &[], 0.0, None);
    assert_eq!(single.total_return, 0.0);
}
