//! # Prediction Snapshots
//!
//! Every prediction is frozen into an immutable snapshot the moment it is made:
//! the exact feature vector, the exact coefficients, the predicted value, and the
//! timestamp, sealed under a SHA-256 signature. Accuracy claims are then computed
//! against these sealed records, so they cannot be retro-fitted by later edits to
//! models or features.

use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::model::classify_tier;
use crate::types::{
    FeatureMap, ModelSnapshot, PatternModel, PredictionLog, RollingAccuracy, Tier,
};

/// Neutral line of normalized target space, used for the directional call.
pub const DIRECTIONAL_MIDPOINT: f64 = 0.5;

/// Canonical signature over the fields that define a prediction.
///
/// The payload is serialized through `serde_json`, whose object keys are always
/// sorted, so equal inputs produce byte-identical JSON and therefore equal
/// digests. The timestamp enters as epoch milliseconds to avoid formatting
/// ambiguity.
pub fn compute_signature(
    feature_vector: &FeatureMap,
    coefficients: &[f64],
    predicted_value: f64,
    created_at: DateTime<Utc>,
) -> String {
    let payload = json!({
        "coefficients": coefficients,
        "features": feature_vector,
        "predicted_value": predicted_value,
        "timestamp_ms": created_at.timestamp_millis(),
    });
    let digest = Sha256::digest(payload.to_string().as_bytes());
    hex::encode(digest)
}

/// Assemble a sealed snapshot for a freshly computed prediction.
pub fn build_snapshot(
    dataset_id: Uuid,
    model: &PatternModel,
    feature_vector: FeatureMap,
    predicted_value: f64,
    predicted_tier: Tier,
    confidence: f64,
    created_at: DateTime<Utc>,
) -> ModelSnapshot {
    let hash_signature = compute_signature(
        &feature_vector,
        &model.coefficients,
        predicted_value,
        created_at,
    );
    ModelSnapshot {
        id: Uuid::new_v4(),
        dataset_id,
        model_id: model.id,
        feature_vector,
        coefficients_used: model.coefficients.clone(),
        intercept_used: model.intercept,
        predicted_value,
        predicted_tier,
        confidence,
        hash_signature,
        created_at,
        is_locked: true,
        upload_confirmed: false,
        performance_tracking_started: false,
    }
}

/// Recompute the signature from the stored fields and compare.
pub fn verify_snapshot(snapshot: &ModelSnapshot) -> bool {
    let expected = compute_signature(
        &snapshot.feature_vector,
        &snapshot.coefficients_used,
        snapshot.predicted_value,
        snapshot.created_at,
    );
    expected == snapshot.hash_signature
}

/// Produce the one permanent accuracy record for a snapshot once its actual
/// outcome is known.
pub fn validate_snapshot(
    snapshot: &ModelSnapshot,
    actual_value: f64,
    validated_at: DateTime<Utc>,
) -> PredictionLog {
    let error = snapshot.predicted_value - actual_value;
    let directionally_correct = (snapshot.predicted_value > DIRECTIONAL_MIDPOINT)
        == (actual_value > DIRECTIONAL_MIDPOINT);
    let tier_correct = classify_tier(actual_value) == snapshot.predicted_tier;
    PredictionLog {
        id: Uuid::new_v4(),
        snapshot_id: snapshot.id,
        dataset_id: snapshot.dataset_id,
        model_id: snapshot.model_id,
        predicted_value: snapshot.predicted_value,
        actual_value,
        error,
        absolute_error: error.abs(),
        directionally_correct,
        tier_correct,
        validated_at,
    }
}

/// Accuracy over the most recent validated predictions. The slice is expected
/// most-recent-first and already cut to at most `window_size` entries; an empty
/// slice reports zeros rather than an error.
pub fn rolling_accuracy(logs: &[PredictionLog], window_size: usize) -> RollingAccuracy {
    if logs.is_empty() {
        return RollingAccuracy { window_size, ..RollingAccuracy::default() };
    }

    let n = logs.len().min(window_size);
    let window = &logs[..n];
    let directional_hits = window.iter().filter(|l| l.directionally_correct).count();
    let tier_hits = window.iter().filter(|l| l.tier_correct).count();
    let absolute_error_sum: f64 = window.iter().map(|l| l.absolute_error).sum();

    RollingAccuracy {
        directional_accuracy: directional_hits as f64 / n as f64,
        tier_accuracy: tier_hits as f64 / n as f64,
        mean_absolute_error: absolute_error_sum / n as f64,
        sample_count: n,
        window_size,
    }
}
