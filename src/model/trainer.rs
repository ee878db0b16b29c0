//! Training pipeline: chronological split, normal-equation fit, hold-out metrics.

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::model::{classify_tier, predict_value, solver};
use crate::stats;
use crate::types::DatasetRecord;

/// Absolute floor below which no fit is attempted, whatever the engine's
/// configured minimum says.
pub const MIN_TRAINABLE_RECORDS: usize = 3;

/// A fitted model before it is persisted and given an identity.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub feature_names: Vec<String>,
    pub metrics: TrainingMetrics,
}

#[derive(Debug, Clone, Copy)]
pub struct TrainingMetrics {
    pub r_squared: f64,
    pub mean_absolute_error: f64,
    pub tier_accuracy: f64,
    pub directional_accuracy: f64,
    pub train_sample_count: usize,
    pub test_sample_count: usize,
}

/// Outcome of one fit attempt. Too little data is an expected state, not an error.
#[derive(Debug, Clone)]
pub enum TrainResult {
    Trained(TrainedModel),
    Insufficient { records: usize, required: usize },
}

/// Order records by creation time and split the earliest `train_ratio` share off
/// for fitting. The most recent records always form the hold-out slice, so
/// evaluation mimics predicting the future rather than interpolating the past.
pub fn chronological_split(
    records: &[DatasetRecord],
    train_ratio: f64,
) -> (Vec<&DatasetRecord>, Vec<&DatasetRecord>) {
    let mut ordered: Vec<&DatasetRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let cut = ((ordered.len() as f64) * train_ratio).floor() as usize;
    let test = ordered.split_off(cut);
    (ordered, test)
}

/// Fit a linear model on the training slice and evaluate it on the hold-out slice.
pub fn train_model(records: &[DatasetRecord], train_ratio: f64) -> TrainResult {
    if records.len() < MIN_TRAINABLE_RECORDS {
        return TrainResult::Insufficient {
            records: records.len(),
            required: MIN_TRAINABLE_RECORDS,
        };
    }

    let (train, test) = chronological_split(records, train_ratio);
    if train.is_empty() || test.is_empty() {
        return TrainResult::Insufficient {
            records: records.len(),
            required: MIN_TRAINABLE_RECORDS,
        };
    }

    let feature_names = collect_feature_names(records);
    let columns = feature_names.len() + 1;

    let mut design = Vec::with_capacity(train.len() * columns);
    let mut targets = Vec::with_capacity(train.len());
    for record in &train {
        design.push(1.0);
        for name in &feature_names {
            design.push(record.normalized_features.get(name).copied().unwrap_or(0.0));
        }
        targets.push(record.target_value);
    }

    let x = match Array2::from_shape_vec((train.len(), columns), design) {
        Ok(x) => x,
        Err(e) => {
            // Shape mismatch cannot happen with the loop above, but degrade the
            // same way an unsolvable batch does rather than panicking.
            debug!(target: "trainer", "design matrix construction failed: {e}");
            return TrainResult::Insufficient {
                records: records.len(),
                required: MIN_TRAINABLE_RECORDS,
            };
        }
    };
    let y = Array1::from_vec(targets);

    let xtx = x.t().dot(&x);
    let xty = x.t().dot(&y);
    let beta = match solver::solve_normal_equations(&xtx, &xty) {
        Ok(beta) => beta,
        Err(e) => {
            debug!(target: "trainer", "normal equation solve failed: {e}");
            return TrainResult::Insufficient {
                records: records.len(),
                required: MIN_TRAINABLE_RECORDS,
            };
        }
    };

    let intercept = beta[0];
    let coefficients: Vec<f64> = beta.iter().skip(1).copied().collect();

    let metrics = evaluate(&coefficients, intercept, &feature_names, &train, &test);
    TrainResult::Trained(TrainedModel { coefficients, intercept, feature_names, metrics })
}

fn collect_feature_names(records: &[DatasetRecord]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .flat_map(|record| record.normalized_features.keys().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
}

fn evaluate(
    coefficients: &[f64],
    intercept: f64,
    feature_names: &[String],
    train: &[&DatasetRecord],
    test: &[&DatasetRecord],
) -> TrainingMetrics {
    let actuals: Vec<f64> = test.iter().map(|r| r.target_value).collect();
    let predictions: Vec<f64> = test
        .iter()
        .map(|r| predict_value(coefficients, intercept, feature_names, &r.normalized_features))
        .collect();

    let n = actuals.len() as f64;
    let mean_absolute_error = actuals
        .iter()
        .zip(&predictions)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;

    let actual_mean = stats::mean(&actuals);
    let ss_res: f64 = actuals.iter().zip(&predictions).map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actuals.iter().map(|a| (a - actual_mean).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    let tier_hits = actuals
        .iter()
        .zip(&predictions)
        .filter(|(a, p)| classify_tier(**a) == classify_tier(**p))
        .count();
    let tier_accuracy = tier_hits as f64 / n;

    let median = stats::median(&actuals);
    let directional_hits = actuals
        .iter()
        .zip(&predictions)
        .filter(|(a, p)| (**a > median) == (**p > median))
        .count();
    let directional_accuracy = directional_hits as f64 / n;

    TrainingMetrics {
        r_squared,
        mean_absolute_error,
        tier_accuracy,
        directional_accuracy,
        train_sample_count: train.len(),
        test_sample_count: test.len(),
    }
}
