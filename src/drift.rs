//! # Drift Detection and Pattern Retirement
//!
//! Watches the stream of validated predictions for two failure shapes: a model
//! that systematically overestimates, and an audience whose engagement has
//! dropped away from the history the model was fitted on. Retirement is the
//! harder verdict, reserved for models whose predictions sit persistently far
//! from observed reality.

use crate::stats;
use crate::types::{DriftRecommendation, DriftSeverity, DriftStatus, DriftTrigger, PredictionLog};

/// Overestimation share above which drift is severe and retraining is advised.
pub const OVERESTIMATION_SEVERE_RATIO: f64 = 0.8;
/// Overestimation share above which drift is moderate and confidence should drop.
pub const OVERESTIMATION_MODERATE_RATIO: f64 = 0.6;
/// Engagement-drop deviation (in historical sigmas) for severe drift.
pub const ENGAGEMENT_SEVERE_SIGMA: f64 = 3.0;
/// Engagement-drop deviation (in historical sigmas) for moderate drift.
pub const ENGAGEMENT_MODERATE_SIGMA: f64 = 2.0;
/// Recent actuals compared against the rest of the window by the engagement rule.
pub const ENGAGEMENT_RECENT_COUNT: usize = 5;

/// Validated predictions required before retirement can be judged at all.
pub const RETIREMENT_MIN_SAMPLES: usize = 5;
/// Mean miss, in standard deviations of the actuals, beyond which a model retires.
pub const RETIREMENT_SIGMA: f64 = 1.5;

#[derive(Debug, Clone, Copy)]
pub struct RetirementCheck {
    pub should_retire: bool,
    /// Signed distance of the mean prediction from the mean actual, in units of
    /// the actuals' standard deviation. Zero when it cannot be measured.
    pub underperformance_sigma: f64,
    pub sample_count: usize,
}

/// Evaluate the drift rules over the most recent `window` validated predictions.
///
/// `logs` must be ordered most recent first. Rules short-circuit in order:
/// overestimation is checked before engagement drop, and the first rule that
/// fires determines severity and recommendation.
pub fn detect_drift(logs: &[PredictionLog], window: usize) -> DriftStatus {
    let n = logs.len().min(window);
    if n == 0 {
        return DriftStatus::clear(0);
    }
    let window_slice = &logs[..n];

    let overestimates = window_slice.iter().filter(|l| l.predicted_value > l.actual_value).count();
    let ratio = overestimates as f64 / n as f64;
    if ratio > OVERESTIMATION_SEVERE_RATIO {
        return DriftStatus {
            severity: DriftSeverity::Severe,
            recommendation: DriftRecommendation::Retrain,
            trigger: Some(DriftTrigger::Overestimation { ratio }),
            sample_count: n,
        };
    }
    if ratio > OVERESTIMATION_MODERATE_RATIO {
        return DriftStatus {
            severity: DriftSeverity::Moderate,
            recommendation: DriftRecommendation::ReduceConfidence,
            trigger: Some(DriftTrigger::Overestimation { ratio }),
            sample_count: n,
        };
    }

    // Engagement drop needs a recent cluster plus enough history behind it.
    if n >= ENGAGEMENT_RECENT_COUNT + 2 {
        let recent: Vec<f64> = window_slice[..ENGAGEMENT_RECENT_COUNT]
            .iter()
            .map(|l| l.actual_value)
            .collect();
        let earlier: Vec<f64> = window_slice[ENGAGEMENT_RECENT_COUNT..]
            .iter()
            .map(|l| l.actual_value)
            .collect();
        let historical_mean = stats::mean(&earlier);
        let historical_std = stats::standard_deviation(&earlier, Some(historical_mean));
        if historical_std > 0.0 {
            let deviation_sigma = (historical_mean - stats::mean(&recent)) / historical_std;
            if deviation_sigma > ENGAGEMENT_SEVERE_SIGMA {
                return DriftStatus {
                    severity: DriftSeverity::Severe,
                    recommendation: DriftRecommendation::IncreaseExploration,
                    trigger: Some(DriftTrigger::EngagementDrop { deviation_sigma }),
                    sample_count: n,
                };
            }
            if deviation_sigma > ENGAGEMENT_MODERATE_SIGMA {
                return DriftStatus {
                    severity: DriftSeverity::Moderate,
                    recommendation: DriftRecommendation::IncreaseExploration,
                    trigger: Some(DriftTrigger::EngagementDrop { deviation_sigma }),
                    sample_count: n,
                };
            }
        }
    }

    DriftStatus::clear(n)
}

/// Judge whether a model's predictions sit persistently outside the spread of
/// observed outcomes. With fewer than [`RETIREMENT_MIN_SAMPLES`] validations, or
/// with actuals that show no spread at all, the verdict is always "keep".
pub fn check_pattern_retirement(logs: &[PredictionLog]) -> RetirementCheck {
    if logs.len() < RETIREMENT_MIN_SAMPLES {
        return RetirementCheck {
            should_retire: false,
            underperformance_sigma: 0.0,
            sample_count: logs.len(),
        };
    }

    let actuals: Vec<f64> = logs.iter().map(|l| l.actual_value).collect();
    let predictions: Vec<f64> = logs.iter().map(|l| l.predicted_value).collect();
    let actual_mean = stats::mean(&actuals);
    let actual_std = stats::standard_deviation(&actuals, Some(actual_mean));
    if actual_std == 0.0 {
        return RetirementCheck {
            should_retire: false,
            underperformance_sigma: 0.0,
            sample_count: logs.len(),
        };
    }

    let underperformance_sigma = (stats::mean(&predictions) - actual_mean) / actual_std;
    RetirementCheck {
        should_retire: underperformance_sigma.abs() > RETIREMENT_SIGMA,
        underperformance_sigma,
        sample_count: logs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn log(predicted: f64, actual: f64, minutes_ago: i64) -> PredictionLog {
        let error = predicted - actual;
        PredictionLog {
            id: Uuid::new_v4(),
            snapshot_id: Uuid::new_v4(),
            dataset_id: Uuid::nil(),
            model_id: Uuid::nil(),
            predicted_value: predicted,
            actual_value: actual,
            error,
            absolute_error: error.abs(),
            directionally_correct: true,
            tier_correct: true,
            validated_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn empty_window_reports_no_drift() {
        let status = detect_drift(&[], 10);
        assert_eq!(status.severity, DriftSeverity::None);
        assert_eq!(status.sample_count, 0);
        assert!(!status.detected());
    }

    #[test]
    fn heavy_overestimation_is_severe_and_asks_for_retraining() {
        // 9 of 10 predictions above their actuals.
        let mut logs: Vec<PredictionLog> =
            (0..9).map(|i| log(0.8, 0.5, i)).collect();
        logs.push(log(0.4, 0.5, 9));
        let status = detect_drift(&logs, 10);
        assert_eq!(status.severity, DriftSeverity::Severe);
        assert_eq!(status.recommendation, DriftRecommendation::Retrain);
        match status.trigger {
            Some(DriftTrigger::Overestimation { ratio }) => assert!((ratio - 0.9).abs() < 1e-12),
            other => panic!("unexpected trigger {other:?}"),
        }
    }

    #[test]
    fn moderate_overestimation_reduces_confidence() {
        // 7 of 10 above their actuals.
        let mut logs: Vec<PredictionLog> = (0..7).map(|i| log(0.8, 0.5, i)).collect();
        logs.extend((7..10).map(|i| log(0.4, 0.5, i)));
        let status = detect_drift(&logs, 10);
        assert_eq!(status.severity, DriftSeverity::Moderate);
        assert_eq!(status.recommendation, DriftRecommendation::ReduceConfidence);
    }

    #[test]
    fn engagement_collapse_raises_exploration() {
        // Predictions underestimate throughout, so the overestimation rule stays
        // quiet; the 5 most recent actuals collapsed against the earlier baseline.
        let mut logs: Vec<PredictionLog> = (0..5).map(|i| log(0.1, 0.3, i)).collect();
        let earlier = [0.80, 0.82, 0.78, 0.81, 0.79];
        logs.extend(earlier.iter().enumerate().map(|(i, a)| log(0.1, *a, 5 + i as i64)));
        let status = detect_drift(&logs, 10);
        assert_eq!(status.severity, DriftSeverity::Severe);
        assert_eq!(status.recommendation, DriftRecommendation::IncreaseExploration);
        assert!(matches!(
            status.trigger,
            Some(DriftTrigger::EngagementDrop { deviation_sigma }) if deviation_sigma > 3.0
        ));
    }

    #[test]
    fn overestimation_rule_wins_when_both_fire() {
        // All predictions overestimate and engagement also collapsed.
        let mut logs: Vec<PredictionLog> = (0..5).map(|i| log(0.9, 0.2, i)).collect();
        logs.extend((0..5).map(|i| log(0.9, 0.8, 5 + i)));
        let status = detect_drift(&logs, 10);
        assert_eq!(status.recommendation, DriftRecommendation::Retrain);
        assert!(matches!(status.trigger, Some(DriftTrigger::Overestimation { .. })));
    }

    #[test]
    fn flat_history_cannot_trip_the_engagement_rule() {
        let mut logs: Vec<PredictionLog> = (0..5).map(|i| log(0.1, 0.2, i)).collect();
        logs.extend((0..5).map(|i| log(0.1, 0.8, 5 + i)));
        // Earlier actuals are identical: zero historical deviation.
        let status = detect_drift(&logs, 10);
        assert_eq!(status.severity, DriftSeverity::None);
    }

    #[test]
    fn retirement_needs_five_validations() {
        let logs: Vec<PredictionLog> = (0..4).map(|i| log(0.9, 0.1, i)).collect();
        let check = check_pattern_retirement(&logs);
        assert!(!check.should_retire);
        assert_eq!(check.sample_count, 4);
    }

    #[test]
    fn persistent_misses_retire_the_model() {
        let actuals = [0.30, 0.32, 0.28, 0.31, 0.29];
        let logs: Vec<PredictionLog> = actuals
            .iter()
            .enumerate()
            .map(|(i, a)| log(0.9, *a, i as i64))
            .collect();
        let check = check_pattern_retirement(&logs);
        assert!(check.should_retire);
        assert!(check.underperformance_sigma > RETIREMENT_SIGMA);
    }

    #[test]
    fn accurate_models_survive_the_retirement_check() {
        let actuals = [0.30, 0.50, 0.40, 0.60, 0.45];
        let logs: Vec<PredictionLog> = actuals
            .iter()
            .enumerate()
            .map(|(i, a)| log(*a + 0.02, *a, i as i64))
            .collect();
        let check = check_pattern_retirement(&logs);
        assert!(!check.should_retire);
        assert!(check.underperformance_sigma.abs() < RETIREMENT_SIGMA);
    }

    #[test]
    fn zero_spread_actuals_never_retire() {
        let logs: Vec<PredictionLog> = (0..6).map(|i| log(0.9, 0.4, i)).collect();
        let check = check_pattern_retirement(&logs);
        assert!(!check.should_retire);
        assert_eq!(check.underperformance_sigma, 0.0);
    }
}
