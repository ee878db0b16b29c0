//! # Epsilon-Greedy Exploration
//!
//! Splits candidates between exploiting the model's best known formula and
//! exploring deliberate variations of it. The exploration rate is modulated by
//! where a keyword sits in the attention funnel, and every assignment is
//! persisted with its full parameterization so wins and losses can be
//! attributed later.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::types::{
    ExperimentArm, ExperimentGroup, FeatureBound, FeatureMap, MigrationStage, MutationParameters,
};

/// Scale the base exploration rate by the keyword's funnel stage. With no stage
/// available the base rate passes through unchanged.
pub fn adjust_epsilon(base_epsilon: f64, stage: Option<MigrationStage>) -> f64 {
    base_epsilon * stage.map(|s| s.epsilon_factor()).unwrap_or(1.0)
}

/// Randomly perturb each bounded feature on its step grid, clamped to its range.
/// Returns the mutated vector and the names of features whose values changed.
/// Features without a bound are copied through untouched.
pub fn mutate_features<R: Rng + ?Sized>(
    features: &FeatureMap,
    bounds: &BTreeMap<String, FeatureBound>,
    rng: &mut R,
) -> (FeatureMap, Vec<String>) {
    let mut mutated = FeatureMap::new();
    let mut changed = Vec::new();

    for (name, &value) in features {
        let new_value = match bounds.get(name) {
            Some(bound) => {
                let span = (((bound.max - bound.min) / bound.step).round() as i64).max(1);
                let steps = rng.gen_range(-span..=span);
                (value + steps as f64 * bound.step).clamp(bound.min, bound.max)
            }
            None => value,
        };
        if (new_value - value).abs() > f64::EPSILON {
            changed.push(name.clone());
        }
        mutated.insert(name.clone(), new_value);
    }

    (mutated, changed)
}

/// Assign one candidate to an experiment arm. An exploration roll below the
/// stage-adjusted epsilon sends it through feature mutation; otherwise the
/// original features pass through as the exploitation arm.
pub fn decide_exploration<R: Rng + ?Sized>(
    dataset_id: Uuid,
    features: &FeatureMap,
    base_epsilon: f64,
    stage: Option<MigrationStage>,
    bounds: &BTreeMap<String, FeatureBound>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> ExperimentGroup {
    let adjusted_epsilon = adjust_epsilon(base_epsilon, stage);
    let explore = rng.gen::<f64>() < adjusted_epsilon;

    let (arm, candidate_features, mutated_names) = if explore {
        let (candidate, changed) = mutate_features(features, bounds, rng);
        (ExperimentArm::Exploration, candidate, changed)
    } else {
        (ExperimentArm::Exploitation, features.clone(), Vec::new())
    };

    ExperimentGroup {
        id: Uuid::new_v4(),
        dataset_id,
        arm,
        original_features: features.clone(),
        candidate_features,
        mutation_parameters: MutationParameters {
            base_epsilon,
            adjusted_epsilon,
            ami_stage: stage,
            mutated_features: mutated_names,
        },
        created_at: now,
    }
}
