use regime_core::{Config, EngineError, EngineResult, RegimeType};

use crate::constant::ConstantDetector;
use crate::detector::RegimeDetector;
use crate::ensemble::{EnsembleDetector, VotingMethod};
use crate::features::{FeatureType, NormalizationMode};
use crate::hmm::{GaussianParams, HmmDetector};

/// Build a detector from configuration.
///
/// Recognized `detector`/`type` values are `constant`, `hmm`, and
/// `ensemble` (whose `ensemble.detectors` entries recurse through this
/// factory). Anything else is `NotFound`; plugin-provided detectors are
/// resolved by the engine layer, which owns the plugin registry.
pub fn detector_from_config(config: &Config) -> EngineResult<Box<dyn RegimeDetector>> {
    let kind = config
        .get_str("detector")
        .or_else(|| config.get_str("type"))
        .unwrap_or("constant");

    match kind {
        "constant" => {
            let label = config.get_str("regime").unwrap_or("neutral");
            let regime = RegimeType::parse_label(label).unwrap_or(RegimeType::Neutral);
            Ok(Box::new(ConstantDetector::new(regime)))
        }
        "hmm" => Ok(Box::new(hmm_from_config(config))),
        "ensemble" => Ok(Box::new(ensemble_from_config(config)?)),
        other => Err(EngineError::not_found(format!(
            "Unknown detector type '{other}'"
        ))),
    }
}

fn hmm_from_config(config: &Config) -> HmmDetector {
    let states = config.get_i64("hmm.states").unwrap_or(4).max(1) as usize;
    let window = config.get_i64("hmm.window").unwrap_or(20).max(1) as usize;
    let mut detector = HmmDetector::new(states, window);

    if let Some(entries) = config.get_array("hmm.features") {
        let features: Vec<FeatureType> = entries
            .iter()
            .filter_map(|v| v.as_str())
            .filter_map(FeatureType::parse_name)
            .collect();
        if !features.is_empty() {
            detector.set_features(features);
        }
    }

    if let Some(normalize) = config.get_bool("hmm.normalize_features") {
        detector.set_normalize_features(normalize);
    }
    if let Some(mode) = config.get_str("hmm.normalization") {
        detector.set_normalization_mode(NormalizationMode::parse_name(mode));
    }

    // Per-state emission seeding over the (return, volatility) prior.
    let params: Vec<GaussianParams> = (0..states)
        .map(|i| {
            let mean_return = config
                .get_f64(&format!("hmm.state{i}.mean_return"))
                .unwrap_or(0.0);
            let mean_vol = config
                .get_f64(&format!("hmm.state{i}.mean_vol"))
                .unwrap_or(0.01);
            let var_return = config
                .get_f64(&format!("hmm.state{i}.var_return"))
                .unwrap_or(1e-6);
            let var_vol = config
                .get_f64(&format!("hmm.state{i}.var_vol"))
                .unwrap_or(1e-4);
            GaussianParams {
                mean: vec![mean_return, mean_vol],
                variance: vec![var_return, var_vol],
            }
        })
        .collect();
    detector.set_emission_params(params);

    let kalman_enabled = config.get_bool("hmm.kalman_enabled").unwrap_or(false);
    if kalman_enabled {
        let process_noise = config.get_f64("hmm.kalman_process_noise").unwrap_or(1e-3);
        let measurement_noise = config.get_f64("hmm.kalman_measurement_noise").unwrap_or(1e-2);
        detector.set_kalman(true, process_noise, measurement_noise);
    }

    detector
}

fn ensemble_from_config(config: &Config) -> EngineResult<EnsembleDetector> {
    let method = config
        .get_str("ensemble.voting_method")
        .map(VotingMethod::parse_name)
        .unwrap_or_default();
    let mut ensemble = EnsembleDetector::new(method);

    if let Some(entries) = config.get_array("ensemble.detectors") {
        for entry in entries {
            let Some(object) = entry.as_object() else {
                continue;
            };
            let child_config = Config::from_object(object.clone());
            let weight = child_config.get_f64("weight").unwrap_or(1.0);
            let child = detector_from_config(&child_config)?;
            ensemble.add_detector(child, weight);
        }
    }

    Ok(ensemble)
}
