use chrono::{DateTime, TimeZone, Utc};
use regime_core::{
    Bar, Config, MarketEvent, Order, OrderSide, OrderStatus, RegimeType,
};
use serde_json::json;

use crate::engine::BacktestEngine;

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn bar_event(secs: i64, symbol: &str, close: f64) -> MarketEvent {
    MarketEvent::Bar(Bar {
        timestamp: ts(secs),
        symbol: symbol.to_string(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000.0,
        vwap: None,
        trade_count: None,
    })
}

// =============================================================================
// Order flow through the risk gate
// =============================================================================

#[test]
fn risk_rejection_marks_order_rejected() {
    let config = Config::from_value(json!({
        "limits": { "max_gross_exposure": 5_000.0 }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();

    engine.submit_order(Order::limit("TST", OrderSide::Buy, 100.0, 100.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    assert_eq!(engine.orders().len(), 1);
    assert_eq!(engine.orders()[0].status, OrderStatus::Rejected);
    assert!(engine.fills().is_empty());
    assert_eq!(engine.portfolio().cash(), 100_000.0);
}

#[test]
fn risk_exit_orders_bypass_the_gate() {
    let config = Config::from_value(json!({
        "limits": { "max_gross_exposure": 1.0 }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();

    // A limit order would breach the gross exposure cap; the risk_exit
    // tag bypasses the gate entirely.
    let mut order = Order::limit("TST", OrderSide::Sell, 10.0, 100.0);
    order
        .metadata
        .insert(regime_core::METADATA_RISK_EXIT.to_string(), "1".to_string());
    engine.submit_order(order);
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    assert_eq!(engine.orders()[0].status, OrderStatus::Filled);
}

#[test]
fn unpriceable_order_is_invalid() {
    let mut engine = BacktestEngine::new(100_000.0);
    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    // A book with no levels has no mid, so the reference price is zero.
    engine.run(vec![MarketEvent::Book(regime_core::OrderBook {
        timestamp: ts(1_000),
        symbol: "TST".to_string(),
        bids: vec![],
        asks: vec![],
    })]);

    assert_eq!(engine.orders()[0].status, OrderStatus::Invalid);
}

// =============================================================================
// Costs settle against cash
// =============================================================================

#[test]
fn fixed_bps_transaction_cost_applies_to_cash() {
    let config = Config::from_value(json!({
        "transaction_cost": { "type": "fixed_bps", "bps": 10.0 }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    // 10 bps of $1000 = $1.
    let expected = 100_000.0 - 1_000.0 - 1.0;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

#[test]
fn per_share_transaction_cost_applies_to_cash() {
    let config = Config::from_value(json!({
        "transaction_cost": { "type": "per_share", "per_share": 0.01 }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    let expected = 100_000.0 - 1_000.0 - 0.10;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

#[test]
fn per_order_transaction_cost_charged_once() {
    let config = Config::from_value(json!({
        "transaction_cost": { "type": "per_order", "per_order": 2.5 }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    engine.submit_order(Order::market("TST", OrderSide::Buy, 1.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    let expected = 100_000.0 - 100.0 - 2.5;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

#[test]
fn tiered_transaction_cost_uses_catch_all() {
    let config = Config::from_value(json!({
        "transaction_cost": {
            "type": "tiered",
            "tiers": [
                { "max_notional": 500.0, "bps": 10.0 },
                { "max_notional": 0.0, "bps": 5.0 }
            ]
        }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    // 5 bps of $1000 = $0.50.
    let expected = 100_000.0 - 1_000.0 - 0.50;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

#[test]
fn tiered_transaction_cost_respects_tier_thresholds() {
    let config = Config::from_value(json!({
        "transaction_cost": {
            "type": "tiered",
            "tiers": [
                { "max_notional": 500.0, "bps": 10.0 },
                { "max_notional": 0.0, "bps": 5.0 }
            ]
        }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    // Notional 400 is below the first tier's threshold, so its 10 bps
    // apply rather than the catch-all.
    engine.submit_order(Order::market("TST", OrderSide::Buy, 4.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    let expected = 100_000.0 - 400.0 - 0.40;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

#[test]
fn commission_stacks_with_transaction_cost() {
    let config = Config::from_value(json!({
        "commission": { "type": "fixed", "amount": 1.0 },
        "transaction_cost": { "type": "fixed_bps", "bps": 10.0 }
    }));
    let mut engine = BacktestEngine::new(100_000.0);
    engine.configure_execution(&config);

    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    let expected = 100_000.0 - 1_000.0 - 1.0 - 1.0;
    assert!((engine.portfolio().cash() - expected).abs() < 1e-6);
}

// =============================================================================
// Regime-conditional behavior
// =============================================================================

#[test]
fn orders_inherit_detected_regime_for_slippage() {
    let config = Config::from_value(json!({
        "detector": "constant",
        "regime": "bear",
        "slippage": {
            "type": "regime_bps",
            "default_bps": 5.0,
            "regime_bps": { "bear": 20.0 }
        }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();

    engine.submit_order(Order::market("TST", OrderSide::Buy, 10.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    // Detected regime is bear, so the mapped 20 bps applies: 100.20.
    assert_eq!(engine.fills().len(), 1);
    assert!((engine.fills()[0].price - 100.20).abs() < 1e-9);
    assert_eq!(
        engine.orders()[0].metadata.get(regime_core::METADATA_REGIME),
        Some(&"bear".to_string())
    );
}

#[test]
fn regime_conditional_risk_rules_apply() {
    let config = Config::from_value(json!({
        "detector": "constant",
        "regime": "crisis",
        "limits_by_regime": {
            "crisis": { "limits": { "max_notional": 500.0 } }
        }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();

    engine.submit_order(Order::limit("TST", OrderSide::Buy, 100.0, 100.0));
    engine.run(vec![bar_event(1_000, "TST", 100.0)]);

    assert_eq!(engine.orders()[0].status, OrderStatus::Rejected);
}

// =============================================================================
// Pipeline integration
// =============================================================================

#[test]
fn strategy_trades_through_the_pipeline() {
    let config = Config::from_value(json!({
        "detector": "constant",
        "regime": "bull",
        "strategy": { "name": "regime_switch", "symbol": "TST", "trend_qty": 20.0 }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();

    engine.run(vec![
        bar_event(0, "TST", 100.0),
        bar_event(60, "TST", 101.0),
        bar_event(120, "TST", 102.0),
    ]);

    // The bull-regime strategy buys 20 on every bar.
    assert_eq!(engine.fills().len(), 3);
    assert!(engine.fills().iter().all(|f| f.quantity == 20.0));
    assert_eq!(engine.metrics().snapshots().len(), 3);
    assert_eq!(
        engine.portfolio().get_position("TST").unwrap().quantity,
        60.0
    );
}

#[test]
fn events_process_in_timestamp_order() {
    let mut engine = BacktestEngine::new(100_000.0);
    // Out-of-order input is sorted before processing.
    engine.run(vec![
        bar_event(120, "TST", 102.0),
        bar_event(0, "TST", 100.0),
        bar_event(60, "TST", 101.0),
    ]);

    let timestamps = engine.metrics().equity_curve().timestamps().to_vec();
    assert_eq!(timestamps, vec![ts(0), ts(60), ts(120)]);
}

#[test]
fn transitions_are_recorded_with_durations() {
    use regime_core::RegimeState;
    use regime_detector::RegimeDetector;

    struct Flipper {
        count: usize,
    }

    impl RegimeDetector for Flipper {
        fn on_bar(&mut self, bar: &Bar) -> RegimeState {
            let regime = if self.count < 2 { RegimeType::Bull } else { RegimeType::Bear };
            self.count += 1;
            let mut probs = vec![0.0; 4];
            probs[regime.index()] = 1.0;
            RegimeState::from_probabilities(bar.timestamp, probs)
        }
    }

    let mut engine = BacktestEngine::new(100_000.0);
    engine.set_detector(Box::new(Flipper { count: 0 }));
    engine.run(vec![
        bar_event(0, "TST", 100.0),
        bar_event(60, "TST", 100.0),
        bar_event(120, "TST", 100.0),
    ]);

    assert_eq!(engine.transitions().len(), 1);
    let transition = &engine.transitions()[0];
    assert_eq!(transition.from, RegimeType::Bull);
    assert_eq!(transition.to, RegimeType::Bear);
    assert_eq!(transition.duration_in_from_secs, 60.0);
}

#[test]
fn identical_runs_produce_identical_reports() {
    let run = || {
        let config = Config::from_value(json!({
            "detector": "hmm",
            "hmm": { "states": 4, "window": 10 },
            "strategy": { "name": "regime_switch", "symbol": "TST" },
            "slippage": { "type": "fixed_bps", "bps": 5.0 },
            "commission": { "type": "fixed", "amount": 0.5 }
        }));
        let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();
        let events: Vec<MarketEvent> = (0..50)
            .map(|i| {
                let price = 100.0 * (1.0 + 0.01 * ((i as f64) * 0.7).sin());
                bar_event(i * 60, "TST", price)
            })
            .collect();
        engine.run(events);
        analytics::ReportWriter::to_csv(&engine.report(0.0, None))
    };

    assert_eq!(run(), run());
}

#[test]
fn report_reflects_run_performance() {
    let config = Config::from_value(json!({
        "detector": "constant",
        "regime": "bull",
        "strategy": { "name": "regime_switch", "symbol": "TST" }
    }));
    let mut engine = BacktestEngine::from_config(100_000.0, &config).unwrap();
    engine.run(vec![
        bar_event(0, "TST", 100.0),
        bar_event(86_400, "TST", 105.0),
        bar_event(172_800, "TST", 110.0),
    ]);

    let report = engine.report(0.0, None);
    assert!(report.performance_summary.total_return > 0.0);
    assert!(report.regime_performance.contains_key(&RegimeType::Bull));
    let json = analytics::ReportWriter::to_json(&report);
    assert!(json.contains("\"regime\": \"bull\""));
}
