//! # Pattern Modeling
//!
//! Closed-form multivariate linear regression over normalized feature vectors.
//! The solver inverts the normal equations with Gauss-Jordan elimination, the
//! trainer handles the chronological split and hold-out evaluation, and this
//! module holds the shared prediction kernel both of them and the engine use.

pub mod solver;
pub mod trainer;

use crate::types::{FeatureMap, Tier};

pub use trainer::{chronological_split, train_model, TrainResult, TrainedModel, TrainingMetrics};

/// Predicted or observed values above this are top tier.
pub const TIER_TOP_THRESHOLD: f64 = 0.7;
/// Predicted or observed values below this are low tier.
pub const TIER_LOW_THRESHOLD: f64 = 0.3;

/// Tier classification over normalized target space. Boundary values fall to mid.
pub fn classify_tier(value: f64) -> Tier {
    if value > TIER_TOP_THRESHOLD {
        Tier::Top
    } else if value < TIER_LOW_THRESHOLD {
        Tier::Low
    } else {
        Tier::Mid
    }
}

/// Apply a fitted model to one feature vector. Features the vector lacks
/// contribute zero; features it has beyond the model's schema are ignored.
pub fn predict_value(
    coefficients: &[f64],
    intercept: f64,
    feature_names: &[String],
    vector: &FeatureMap,
) -> f64 {
    let weighted: f64 = feature_names
        .iter()
        .zip(coefficients)
        .map(|(name, coefficient)| coefficient * vector.get(name).copied().unwrap_or(0.0))
        .sum();
    intercept + weighted
}
