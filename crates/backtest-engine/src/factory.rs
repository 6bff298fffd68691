use regime_core::{Config, EngineError, EngineResult, Strategy};
use regime_detector::{detector_from_config, RegimeDetector};
use risk_manager::{risk_manager_from_config, RiskManager};

use plugin_registry::{registry, PluginArtifact};

use crate::strategy::RegimeSwitchStrategy;

/// Plugin configs may carry their settings under a `params` block; use it
/// when present, the full config otherwise.
fn plugin_config(config: &Config) -> Config {
    config.sub_config("params").unwrap_or_else(|| config.clone())
}

/// Resolve a detector: built-in types first, then the plugin registry
/// under the `regime_detector` plugin type.
pub fn build_detector(config: &Config) -> EngineResult<Box<dyn RegimeDetector>> {
    match detector_from_config(config) {
        Ok(detector) => Ok(detector),
        Err(EngineError::NotFound(_)) => {
            let name = config
                .get_str("detector")
                .or_else(|| config.get_str("type"))
                .unwrap_or_default()
                .to_string();
            let mut plugin = registry()
                .create("regime_detector", &name, &plugin_config(config))
                .ok_or_else(|| {
                    EngineError::not_found(format!("Unknown detector type '{name}'"))
                })?;
            match plugin.create_artifact() {
                Some(PluginArtifact::Detector(detector)) => Ok(detector),
                _ => Err(EngineError::invalid_state(format!(
                    "Plugin '{name}' did not produce a detector"
                ))),
            }
        }
        Err(error) => Err(error),
    }
}

/// Resolve a risk manager: a `risk.type` key selects a plugin; otherwise
/// limits are assembled from `limits.*` keys.
pub fn build_risk_manager(config: &Config) -> RiskManager {
    if let Some(name) = config.get_str("risk.type") {
        let plugin_cfg = config
            .sub_config("risk")
            .map(|c| plugin_config(&c))
            .unwrap_or_default();
        if let Some(mut plugin) = registry().create("risk_manager", name, &plugin_cfg) {
            if let Some(PluginArtifact::Risk(manager)) = plugin.create_artifact() {
                return manager;
            }
            tracing::warn!(name, "risk plugin produced no manager; using config limits");
        }
    }
    risk_manager_from_config(config)
}

/// Resolve a strategy: the built-in `regime_switch` by name, then the
/// plugin registry under the `strategy` plugin type.
pub fn build_strategy(config: &Config) -> Option<Box<dyn Strategy>> {
    let name = config
        .get_str("strategy.name")
        .or_else(|| config.get_str("strategy.type"))?;

    if name == "regime_switch" {
        let symbol = config.get_str("strategy.symbol").unwrap_or("SPY");
        let mut strategy = RegimeSwitchStrategy::new(symbol);
        if let Some(strategy_cfg) = config.sub_config("strategy") {
            strategy.initialize(&strategy_cfg);
        }
        return Some(Box::new(strategy));
    }

    let plugin_cfg = config
        .sub_config("strategy")
        .map(|c| plugin_config(&c))
        .unwrap_or_default();
    let mut plugin = registry().create("strategy", name, &plugin_cfg)?;
    match plugin.create_artifact() {
        Some(PluginArtifact::Strategy(strategy)) => Some(strategy),
        _ => {
            tracing::warn!(name, "strategy plugin produced no strategy");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_detector_resolves_without_registry() {
        let config = Config::from_value(json!({ "detector": "hmm", "hmm": { "states": 3 } }));
        let detector = build_detector(&config).unwrap();
        assert_eq!(detector.num_states(), 3);
    }

    #[test]
    fn unknown_detector_without_plugin_is_not_found() {
        let config = Config::from_value(json!({ "detector": "no_such_detector_anywhere" }));
        let error = build_detector(&config).unwrap_err();
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn risk_manager_from_limit_keys() {
        let config = Config::from_value(json!({ "limits": { "max_leverage": 2.0 } }));
        let manager = build_risk_manager(&config);
        assert_eq!(manager.limit_count(), 1);
    }

    #[test]
    fn builtin_strategy_resolves_by_name() {
        let config = Config::from_value(json!({
            "strategy": { "name": "regime_switch", "symbol": "AAA", "base_qty": 7.0 }
        }));
        let strategy = build_strategy(&config).expect("strategy built");
        assert_eq!(strategy.id(), "regime_switch");
    }

    #[test]
    fn missing_strategy_key_builds_none() {
        assert!(build_strategy(&Config::new()).is_none());
    }
}
