use analytics::PerformanceMetric;
use execution_sim::{CommissionModel, SlippageModel};
use regime_core::{Config, ConfigSchema, EngineResult, Strategy};
use regime_detector::RegimeDetector;
use risk_manager::RiskManager;
use serde::{Deserialize, Serialize};

/// Plugin metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Plugin lifecycle states. Legal transitions run strictly
/// Unloaded → Loaded → Initialized → Active → Stopped; `Error` absorbs
/// from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginState {
    Unloaded,
    Loaded,
    Initialized,
    Active,
    Stopped,
    Error,
}

impl PluginState {
    pub fn can_transition_to(&self, next: PluginState) -> bool {
        matches!(
            (self, next),
            (PluginState::Unloaded, PluginState::Loaded)
                | (PluginState::Loaded, PluginState::Initialized)
                | (PluginState::Initialized, PluginState::Active)
                | (PluginState::Active, PluginState::Stopped)
                | (_, PluginState::Error)
        )
    }
}

/// What a plugin contributes to the engine once initialized.
///
/// The engine's extension seams are a fixed set, so typed creation is an
/// enum rather than a downcast chain; the plugin implementations behind
/// each variant remain fully user-extensible.
pub enum PluginArtifact {
    Detector(Box<dyn RegimeDetector>),
    Execution {
        slippage: Box<dyn SlippageModel>,
        commission: Box<dyn CommissionModel>,
    },
    Risk(RiskManager),
    Strategy(Box<dyn Strategy>),
    Metric(Box<dyn PerformanceMetric>),
}

/// A loadable engine extension with an explicit lifecycle.
///
/// `create` on the registry drives `on_load` → (schema check) →
/// `on_initialize`; `start_plugin`/`stop_plugin` drive `on_start` and
/// `on_stop`. A plugin that exposes a [`ConfigSchema`] gets defaults
/// applied and its configuration validated before initialization.
pub trait Plugin: Send {
    fn info(&self) -> PluginInfo;

    fn state(&self) -> PluginState;

    fn set_state(&mut self, state: PluginState);

    fn config_schema(&self) -> Option<ConfigSchema> {
        None
    }

    fn on_load(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_initialize(&mut self, _config: &Config) -> EngineResult<()> {
        Ok(())
    }

    fn on_start(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn on_stop(&mut self) -> EngineResult<()> {
        Ok(())
    }

    /// Produce the plugin's artifact; `None` when the plugin contributes
    /// nothing directly (e.g. a pure observer).
    fn create_artifact(&mut self) -> Option<PluginArtifact> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions_are_strict() {
        use PluginState::*;
        assert!(Unloaded.can_transition_to(Loaded));
        assert!(Loaded.can_transition_to(Initialized));
        assert!(Initialized.can_transition_to(Active));
        assert!(Active.can_transition_to(Stopped));

        assert!(!Unloaded.can_transition_to(Active));
        assert!(!Loaded.can_transition_to(Active));
        assert!(!Stopped.can_transition_to(Active));
        assert!(!Active.can_transition_to(Loaded));
    }

    #[test]
    fn error_absorbs_from_any_state() {
        use PluginState::*;
        for state in [Unloaded, Loaded, Initialized, Active, Stopped, Error] {
            assert!(state.can_transition_to(Error));
        }
    }
}
