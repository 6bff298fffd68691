use std::path::Path;

use chrono::{DateTime, Utc};
use regime_core::{Bar, Config, OrderBook, RegimeState, Tick};

use crate::detector::RegimeDetector;
use crate::features::FeatureVector;

const PROB_FLOOR: f64 = 1e-12;

/// How child detector outputs are combined into one regime state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VotingMethod {
    #[default]
    WeightedAverage,
    Majority,
    ConfidenceWeighted,
    Bayesian,
}

impl VotingMethod {
    pub fn parse_name(name: &str) -> Self {
        match name {
            "majority" => VotingMethod::Majority,
            "confidence_weighted" => VotingMethod::ConfidenceWeighted,
            "bayesian" => VotingMethod::Bayesian,
            _ => VotingMethod::WeightedAverage,
        }
    }

    pub fn id(&self) -> u32 {
        match self {
            VotingMethod::WeightedAverage => 0,
            VotingMethod::Majority => 1,
            VotingMethod::ConfidenceWeighted => 2,
            VotingMethod::Bayesian => 3,
        }
    }

    pub fn from_id(id: u32) -> Self {
        match id {
            1 => VotingMethod::Majority,
            2 => VotingMethod::ConfidenceWeighted,
            3 => VotingMethod::Bayesian,
            _ => VotingMethod::WeightedAverage,
        }
    }
}

/// Combines several child detectors under one voting discipline.
///
/// Children vote over the 4-slot probability window; detectors with more
/// states are truncated to it. `num_states` and `state_names` delegate to
/// the first child.
#[derive(Default)]
pub struct EnsembleDetector {
    detectors: Vec<Box<dyn RegimeDetector>>,
    weights: Vec<f64>,
    voting_method: VotingMethod,
}

impl EnsembleDetector {
    pub fn new(voting_method: VotingMethod) -> Self {
        Self {
            detectors: Vec::new(),
            weights: Vec::new(),
            voting_method,
        }
    }

    /// Non-positive weights are rejected.
    pub fn add_detector(&mut self, detector: Box<dyn RegimeDetector>, weight: f64) {
        if weight <= 0.0 {
            return;
        }
        self.detectors.push(detector);
        self.weights.push(weight);
    }

    pub fn set_voting_method(&mut self, method: VotingMethod) {
        self.voting_method = method;
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    fn weight(&self, index: usize) -> f64 {
        self.weights.get(index).copied().unwrap_or(1.0)
    }

    /// Probability of state `j` for a child, preferring the full posterior
    /// when present.
    fn child_prob(state: &RegimeState, j: usize) -> f64 {
        if !state.probabilities_all.is_empty() {
            state.probabilities_all.get(j).copied().unwrap_or(0.0)
        } else {
            state.probabilities.get(j).copied().unwrap_or(0.0)
        }
    }

    fn combine(&self, states: &[RegimeState], timestamp: DateTime<Utc>) -> RegimeState {
        const WINDOW: usize = 4;
        let mut probs = vec![0.0; WINDOW];

        if states.is_empty() {
            return RegimeState::from_probabilities(timestamp, probs);
        }

        match self.voting_method {
            VotingMethod::Majority => {
                for state in states {
                    probs[state.regime.index().min(WINDOW - 1)] += 1.0;
                }
                normalize_or_uniform(&mut probs);
            }
            VotingMethod::ConfidenceWeighted => {
                for (i, state) in states.iter().enumerate() {
                    let confidence = if state.confidence > 0.0 {
                        state.confidence
                    } else {
                        1.0
                    };
                    let scale = self.weight(i) * confidence;
                    for (j, slot) in probs.iter_mut().enumerate() {
                        *slot += Self::child_prob(state, j) * scale;
                    }
                }
                normalize_or_uniform(&mut probs);
            }
            VotingMethod::Bayesian => {
                let mut logp = vec![0.0; WINDOW];
                for (i, state) in states.iter().enumerate() {
                    let weight = self.weight(i);
                    for (j, slot) in logp.iter_mut().enumerate() {
                        *slot += Self::child_prob(state, j).max(PROB_FLOOR).ln() * weight;
                    }
                }
                let max = logp.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let mut sum = 0.0;
                for (slot, &lp) in probs.iter_mut().zip(logp.iter()) {
                    *slot = (lp - max).exp();
                    sum += *slot;
                }
                if sum > 0.0 {
                    for slot in &mut probs {
                        *slot /= sum;
                    }
                } else {
                    probs.fill(1.0 / WINDOW as f64);
                }
            }
            VotingMethod::WeightedAverage => {
                let mut total_weight: f64 = self.weights.iter().sum();
                if total_weight == 0.0 {
                    total_weight = 1.0;
                }
                for (i, state) in states.iter().enumerate() {
                    let weight = self.weight(i);
                    for (j, slot) in probs.iter_mut().enumerate() {
                        *slot += Self::child_prob(state, j) * weight;
                    }
                }
                for slot in &mut probs {
                    *slot /= total_weight;
                }
            }
        }

        RegimeState::from_probabilities(timestamp, probs)
    }
}

fn normalize_or_uniform(probs: &mut [f64]) {
    let sum: f64 = probs.iter().sum();
    if sum <= 0.0 {
        let uniform = if probs.is_empty() { 0.0 } else { 1.0 / probs.len() as f64 };
        probs.iter_mut().for_each(|p| *p = uniform);
        return;
    }
    probs.iter_mut().for_each(|p| *p /= sum);
}

impl RegimeDetector for EnsembleDetector {
    fn on_bar(&mut self, bar: &Bar) -> RegimeState {
        let states: Vec<RegimeState> = self.detectors.iter_mut().map(|d| d.on_bar(bar)).collect();
        self.combine(&states, bar.timestamp)
    }

    fn on_tick(&mut self, tick: &Tick) -> RegimeState {
        let states: Vec<RegimeState> = self.detectors.iter_mut().map(|d| d.on_tick(tick)).collect();
        self.combine(&states, tick.timestamp)
    }

    fn on_book(&mut self, book: &OrderBook) -> RegimeState {
        let states: Vec<RegimeState> = self.detectors.iter_mut().map(|d| d.on_book(book)).collect();
        self.combine(&states, book.timestamp)
    }

    fn train(&mut self, data: &[FeatureVector]) {
        for detector in &mut self.detectors {
            detector.train(data);
        }
    }

    fn save(&self, path: &Path) {
        let mut out = format!(
            "voting {}\ndetectors {}\n",
            self.voting_method.id(),
            self.detectors.len()
        );
        for (i, detector) in self.detectors.iter().enumerate() {
            out.push_str(&format!(
                "weight {}\nstates {}\n",
                self.weight(i),
                detector.num_states()
            ));
        }
        if let Err(error) = std::fs::write(path, out) {
            tracing::warn!(%error, path = %path.display(), "failed to save ensemble");
        }
    }

    fn load(&mut self, path: &Path) {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return;
        };
        for line in contents.lines() {
            let mut tokens = line.split_whitespace();
            if tokens.next() == Some("voting") {
                if let Some(id) = tokens.next().and_then(|t| t.parse::<u32>().ok()) {
                    self.voting_method = VotingMethod::from_id(id);
                }
                break;
            }
        }
    }

    fn configure(&mut self, config: &Config) {
        if let Some(name) = config.get_str("ensemble.voting_method") {
            self.voting_method = VotingMethod::parse_name(name);
        }
    }

    fn num_states(&self) -> usize {
        self.detectors.first().map(|d| d.num_states()).unwrap_or(0)
    }

    fn state_names(&self) -> Vec<String> {
        self.detectors
            .first()
            .map(|d| d.state_names())
            .unwrap_or_default()
    }
}
