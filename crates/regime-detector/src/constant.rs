use std::path::Path;

use regime_core::{Bar, Config, RegimeState, RegimeType};

use crate::detector::RegimeDetector;

/// Degenerate detector that always reports one fixed regime with full
/// confidence. Useful as an ensemble member and in tests.
#[derive(Debug, Clone)]
pub struct ConstantDetector {
    regime: RegimeType,
}

impl ConstantDetector {
    pub fn new(regime: RegimeType) -> Self {
        Self { regime }
    }

    fn state(&self, timestamp: chrono::DateTime<chrono::Utc>) -> RegimeState {
        let mut probabilities_all = vec![0.0; 4];
        probabilities_all[self.regime.index()] = 1.0;
        RegimeState::from_probabilities(timestamp, probabilities_all)
    }
}

impl RegimeDetector for ConstantDetector {
    fn on_bar(&mut self, bar: &Bar) -> RegimeState {
        self.state(bar.timestamp)
    }

    fn save(&self, path: &Path) {
        if let Err(error) = std::fs::write(path, format!("{}\n", self.regime.index())) {
            tracing::warn!(%error, path = %path.display(), "failed to save constant detector");
        }
    }

    fn load(&mut self, path: &Path) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return;
        };
        if let Some(index) = contents.split_whitespace().next().and_then(|t| t.parse::<usize>().ok())
        {
            self.regime = RegimeType::from_index(index);
        }
    }

    fn configure(&mut self, config: &Config) {
        let label = config.get_str("regime").unwrap_or("neutral");
        self.regime = RegimeType::parse_label(label).unwrap_or(RegimeType::Neutral);
    }

    fn num_states(&self) -> usize {
        1
    }

    fn state_names(&self) -> Vec<String> {
        vec!["Constant".to_string()]
    }
}
