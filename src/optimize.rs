//! # Greedy Feature Optimization
//!
//! Probes each model feature one small step up and down from the candidate's
//! current value and keeps whichever direction raises the predicted outcome.
//! With a linear model the per-feature gains are independent, so single-feature
//! probing is exact rather than approximate.

use uuid::Uuid;

use crate::model::predict_value;
use crate::types::{FeatureMap, FeatureSuggestion, OptimizationResult, PatternModel};

/// Features live in normalized space; probes never leave it.
const PROBE_FLOOR: f64 = 0.0;
const PROBE_CEIL: f64 = 1.0;

/// Rank single-feature adjustments by their projected lift over the baseline
/// prediction. Only strictly positive gains produce suggestions.
pub fn optimize_features(
    dataset_id: Uuid,
    model: &PatternModel,
    features: &FeatureMap,
    step_size: f64,
) -> OptimizationResult {
    let baseline_prediction = predict_value(
        &model.coefficients,
        model.intercept,
        &model.feature_names,
        features,
    );

    let max_coefficient = model
        .coefficients
        .iter()
        .map(|c| c.abs())
        .fold(0.0f64, f64::max);

    let mut suggestions = Vec::new();
    for (index, name) in model.feature_names.iter().enumerate() {
        let current_value = features.get(name).copied().unwrap_or(0.0);
        let mut best: Option<(f64, f64)> = None;

        for probe in [
            (current_value + step_size).clamp(PROBE_FLOOR, PROBE_CEIL),
            (current_value - step_size).clamp(PROBE_FLOOR, PROBE_CEIL),
        ] {
            let mut probed = features.clone();
            probed.insert(name.clone(), probe);
            let gain = predict_value(
                &model.coefficients,
                model.intercept,
                &model.feature_names,
                &probed,
            ) - baseline_prediction;
            if gain > 0.0 && best.map_or(true, |(_, g)| gain > g) {
                best = Some((probe, gain));
            }
        }

        if let Some((suggested_value, expected_gain)) = best {
            let confidence = if max_coefficient == 0.0 {
                0.0
            } else {
                model.coefficients[index].abs() / max_coefficient
            };
            suggestions.push(FeatureSuggestion {
                feature: name.clone(),
                current_value,
                suggested_value,
                expected_gain,
                confidence,
            });
        }
    }

    suggestions.sort_by(|a, b| {
        b.expected_gain
            .partial_cmp(&a.expected_gain)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let total_projected_lift = suggestions.iter().map(|s| s.expected_gain).sum();

    OptimizationResult {
        dataset_id,
        model_id: model.id,
        baseline_prediction,
        suggestions,
        total_projected_lift,
    }
}
