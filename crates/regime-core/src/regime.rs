use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Categorical market state inferred from features. Detectors with more
/// than four states clamp extra indices to `Crisis` on this interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeType {
    Bull,
    Neutral,
    Bear,
    Crisis,
}

impl RegimeType {
    /// Map a state index to the 4-way regime set; indices past 3 clamp to
    /// `Crisis`.
    pub fn from_index(index: usize) -> Self {
        match index {
            0 => RegimeType::Bull,
            1 => RegimeType::Neutral,
            2 => RegimeType::Bear,
            _ => RegimeType::Crisis,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            RegimeType::Bull => 0,
            RegimeType::Neutral => 1,
            RegimeType::Bear => 2,
            RegimeType::Crisis => 3,
        }
    }

    /// Lowercase label used in config, order metadata, and reports.
    pub fn label(&self) -> &'static str {
        match self {
            RegimeType::Bull => "bull",
            RegimeType::Neutral => "neutral",
            RegimeType::Bear => "bear",
            RegimeType::Crisis => "crisis",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label {
            "bull" => Some(RegimeType::Bull),
            "neutral" => Some(RegimeType::Neutral),
            "bear" => Some(RegimeType::Bear),
            "crisis" => Some(RegimeType::Crisis),
            _ => None,
        }
    }
}

/// A detector's belief at one point in time.
///
/// `probabilities` always holds the first four state probabilities;
/// `probabilities_all` carries the full posterior for detectors with more
/// states. When `state_count >= 1`, `probabilities_all` sums to 1 (within
/// float tolerance), `confidence` is its maximum, and `regime` is its
/// argmax clamped to the 4-way set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub timestamp: DateTime<Utc>,
    pub regime: RegimeType,
    pub confidence: f64,
    pub probabilities: [f64; 4],
    pub probabilities_all: Vec<f64>,
    pub state_count: usize,
}

impl RegimeState {
    /// Build a state from a full posterior, deriving regime, confidence,
    /// and the 4-slot probability window.
    pub fn from_probabilities(timestamp: DateTime<Utc>, probabilities_all: Vec<f64>) -> Self {
        let mut best_idx = 0;
        let mut best = f64::NEG_INFINITY;
        for (i, &p) in probabilities_all.iter().enumerate() {
            if p > best {
                best = p;
                best_idx = i;
            }
        }
        let mut probabilities = [0.0; 4];
        for (slot, &p) in probabilities.iter_mut().zip(probabilities_all.iter()) {
            *slot = p;
        }
        Self {
            timestamp,
            regime: RegimeType::from_index(best_idx),
            confidence: if best.is_finite() { best } else { 0.0 },
            probabilities,
            state_count: probabilities_all.len(),
            probabilities_all,
        }
    }
}

/// Emitted whenever a tracked detector changes regime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub from: RegimeType,
    pub to: RegimeType,
    pub timestamp: DateTime<Utc>,
    pub confidence: f64,
    /// Seconds spent in the `from` regime before this transition.
    pub duration_in_from_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn index_clamps_to_crisis() {
        assert_eq!(RegimeType::from_index(0), RegimeType::Bull);
        assert_eq!(RegimeType::from_index(3), RegimeType::Crisis);
        assert_eq!(RegimeType::from_index(7), RegimeType::Crisis);
    }

    #[test]
    fn labels_round_trip() {
        for regime in [
            RegimeType::Bull,
            RegimeType::Neutral,
            RegimeType::Bear,
            RegimeType::Crisis,
        ] {
            assert_eq!(RegimeType::parse_label(regime.label()), Some(regime));
        }
        assert_eq!(RegimeType::parse_label("sideways"), None);
    }

    #[test]
    fn state_from_probabilities_derives_invariants() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let state = RegimeState::from_probabilities(ts, vec![0.1, 0.2, 0.6, 0.1]);

        assert_eq!(state.regime, RegimeType::Bear);
        assert!((state.confidence - 0.6).abs() < 1e-12);
        assert_eq!(state.state_count, 4);
        let sum: f64 = state.probabilities_all.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn extra_states_clamp_and_window_truncates() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let state = RegimeState::from_probabilities(ts, vec![0.1, 0.1, 0.1, 0.1, 0.6]);

        assert_eq!(state.regime, RegimeType::Crisis);
        assert_eq!(state.state_count, 5);
        assert_eq!(state.probabilities, [0.1, 0.1, 0.1, 0.1]);
    }
}
