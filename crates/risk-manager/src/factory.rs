use std::collections::HashMap;

use regime_core::Config;

use crate::limits::{
    CorrelationLimitConfig, MaxCorrelationExposureLimit, MaxDrawdownLimit, MaxGrossExposureLimit,
    MaxIndustryExposureLimit, MaxLeverageLimit, MaxNetExposureLimit, MaxNotionalLimit,
    MaxPositionLimit, MaxPositionPctLimit, MaxSectorExposureLimit, RiskLimit,
};
use crate::manager::RiskManager;

fn scalar_limits(config: &Config) -> Vec<Box<dyn RiskLimit>> {
    let mut limits: Vec<Box<dyn RiskLimit>> = Vec::new();
    if let Some(value) = config.get_f64("limits.max_notional") {
        limits.push(Box::new(MaxNotionalLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_position") {
        limits.push(Box::new(MaxPositionLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_position_pct") {
        limits.push(Box::new(MaxPositionPctLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_drawdown") {
        limits.push(Box::new(MaxDrawdownLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_gross_exposure") {
        limits.push(Box::new(MaxGrossExposureLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_net_exposure") {
        limits.push(Box::new(MaxNetExposureLimit::new(value)));
    }
    if let Some(value) = config.get_f64("limits.max_leverage") {
        limits.push(Box::new(MaxLeverageLimit::new(value)));
    }
    limits
}

fn string_map(config: &Config, path: &str) -> HashMap<String, String> {
    config
        .get_object(path)
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn float_map(config: &Config, path: &str) -> HashMap<String, f64> {
    config
        .get_object(path)
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Assemble a [`RiskManager`] from `limits.*` and `limits_by_regime.*`
/// configuration keys.
pub fn risk_manager_from_config(config: &Config) -> RiskManager {
    let mut manager = RiskManager::new();

    for limit in scalar_limits(config) {
        manager.add_limit(limit);
    }

    let sector_limits = float_map(config, "limits.sector_limits");
    if !sector_limits.is_empty() {
        let sector_map = string_map(config, "limits.sector_map");
        manager.add_limit(Box::new(MaxSectorExposureLimit::new(
            sector_limits,
            sector_map,
        )));
    }

    let industry_limits = float_map(config, "limits.industry_limits");
    if !industry_limits.is_empty() {
        let industry_map = string_map(config, "limits.industry_map");
        manager.add_limit(Box::new(MaxIndustryExposureLimit::new(
            industry_limits,
            industry_map,
        )));
    }

    if config.get_object("limits.correlation").is_some() {
        let mut correlation = CorrelationLimitConfig::default();
        if let Some(window) = config.get_i64("limits.correlation.window") {
            correlation.window = window.max(1) as usize;
        }
        if let Some(max_corr) = config.get_f64("limits.correlation.max_corr") {
            correlation.max_corr = max_corr;
        }
        if let Some(pct) = config.get_f64("limits.correlation.max_pair_exposure_pct") {
            correlation.max_pair_exposure_pct = pct;
        }
        manager.add_limit(Box::new(MaxCorrelationExposureLimit::new(correlation)));
    }

    if let Some(by_regime) = config.get_object("limits_by_regime") {
        let mut regime_limits: HashMap<String, Vec<Box<dyn RiskLimit>>> = HashMap::new();
        for (regime_name, value) in by_regime {
            let Some(object) = value.as_object() else {
                continue;
            };
            let regime_config = Config::from_object(object.clone());
            let limits = scalar_limits(&regime_config);
            if !limits.is_empty() {
                regime_limits.insert(regime_name.clone(), limits);
            }
        }
        if !regime_limits.is_empty() {
            manager.set_regime_limits(regime_limits);
        }
    }

    manager
}
