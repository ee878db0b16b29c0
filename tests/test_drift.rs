// Integration tests for the drift rules and pattern retirement as they run
// through the engine: seeded validation histories, the recommendation ladder,
// and the pull-from-service path.

mod common;

use chrono::{Duration, Utc};
use common::{config_with, content_dataset, content_engine, content_payload, ingest_linear_grid, make_log};
use trend_intel::errors::{IntelError, PredictionError};
use trend_intel::storage::IntelStore;
use trend_intel::types::{
    DriftRecommendation, DriftSeverity, DriftTrigger, ModelHealth, ModelStatus,
};
use uuid::Uuid;

#[tokio::test]
async fn persistent_overestimation_is_severe_and_asks_for_retraining() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let dataset = content_dataset(&engine).await;
    let model_id = Uuid::new_v4();
    let now = Utc::now();

    // 9 of the 10 most recent validations overshot their actuals.
    for i in 0..9 {
        let log = make_log(dataset.id, model_id, 0.8, 0.5, now - Duration::minutes(i));
        store.insert_prediction_log(log).await.unwrap();
    }
    let log = make_log(dataset.id, model_id, 0.4, 0.5, now - Duration::minutes(9));
    store.insert_prediction_log(log).await.unwrap();

    let status = engine.drift_status(dataset.id).await.unwrap();
    assert_eq!(status.severity, DriftSeverity::Severe);
    assert_eq!(status.recommendation, DriftRecommendation::Retrain);
    assert_eq!(status.sample_count, 10);
    assert!(matches!(
        status.trigger,
        Some(DriftTrigger::Overestimation { ratio }) if (ratio - 0.9).abs() < 1e-12
    ));
}

#[tokio::test]
async fn moderate_overestimation_reduces_confidence() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let dataset = content_dataset(&engine).await;
    let model_id = Uuid::new_v4();
    let now = Utc::now();

    for i in 0..7 {
        let log = make_log(dataset.id, model_id, 0.8, 0.5, now - Duration::minutes(i));
        store.insert_prediction_log(log).await.unwrap();
    }
    for i in 7..10 {
        let log = make_log(dataset.id, model_id, 0.4, 0.5, now - Duration::minutes(i));
        store.insert_prediction_log(log).await.unwrap();
    }

    let status = engine.drift_status(dataset.id).await.unwrap();
    assert_eq!(status.severity, DriftSeverity::Moderate);
    assert_eq!(status.recommendation, DriftRecommendation::ReduceConfidence);
}

#[tokio::test]
async fn engagement_collapse_recommends_more_exploration() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let dataset = content_dataset(&engine).await;
    let model_id = Uuid::new_v4();
    let now = Utc::now();

    // Underestimating predictions keep the overestimation rule quiet; the five
    // newest actuals collapsed against a tight earlier baseline.
    for i in 0..5 {
        let log = make_log(dataset.id, model_id, 0.25, 0.3, now - Duration::minutes(i));
        store.insert_prediction_log(log).await.unwrap();
    }
    for (i, actual) in [0.80, 0.82, 0.78, 0.81, 0.79].into_iter().enumerate() {
        let at = now - Duration::minutes(5 + i as i64);
        let log = make_log(dataset.id, model_id, actual - 0.05, actual, at);
        store.insert_prediction_log(log).await.unwrap();
    }

    let status = engine.drift_status(dataset.id).await.unwrap();
    assert_eq!(status.severity, DriftSeverity::Severe);
    assert_eq!(status.recommendation, DriftRecommendation::IncreaseExploration);
    assert!(matches!(
        status.trigger,
        Some(DriftTrigger::EngagementDrop { deviation_sigma }) if deviation_sigma > 3.0
    ));
}

#[tokio::test]
async fn engagement_rule_waits_for_enough_history() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let dataset = content_dataset(&engine).await;
    let model_id = Uuid::new_v4();
    let now = Utc::now();

    // Six validations: a recent cluster with only one earlier point behind it
    // cannot establish a baseline, so nothing fires.
    for i in 0..5 {
        let log = make_log(dataset.id, model_id, 0.25, 0.3, now - Duration::minutes(i));
        store.insert_prediction_log(log).await.unwrap();
    }
    let log = make_log(dataset.id, model_id, 0.75, 0.8, now - Duration::minutes(5));
    store.insert_prediction_log(log).await.unwrap();

    let status = engine.drift_status(dataset.id).await.unwrap();
    assert_eq!(status.severity, DriftSeverity::None);
    assert_eq!(status.sample_count, 6);
}

#[tokio::test]
async fn drift_status_requires_a_known_dataset() {
    let (engine, _store) = content_engine(config_with(|_| {})).await;
    let missing = Uuid::new_v4();
    let err = engine.drift_status(missing).await.unwrap_err();
    assert!(matches!(
        err,
        IntelError::Prediction(PredictionError::DatasetNotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn persistent_misses_retire_the_live_model() {
    let (engine, store) = content_engine(config_with(|c| {
        c.training.min_active_records = 5;
    }))
    .await;
    let dataset = content_dataset(&engine).await;
    ingest_linear_grid(&engine, dataset.id, 6).await;
    let outcome = engine.train(dataset.id).await.unwrap();
    let model_id = outcome.model().unwrap().id;
    let now = Utc::now();

    // Predictions of 0.9 against actuals clustered near 0.14: dozens of sigmas out.
    for (i, actual) in [0.10, 0.12, 0.14, 0.16, 0.18].into_iter().enumerate() {
        let log = make_log(dataset.id, model_id, 0.9, actual, now - Duration::minutes(i as i64));
        store.insert_prediction_log(log).await.unwrap();
    }

    let health = engine.model_health(dataset.id).await.unwrap();
    match health {
        ModelHealth::Retired { model_id: retired, underperformance_sigma } => {
            assert_eq!(retired, model_id);
            assert!(underperformance_sigma > 1.5);
        }
        other => panic!("expected retirement, got {other:?}"),
    }

    let stored = store.get_model(model_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ModelStatus::Retired);

    // With the model pulled from service, prediction has nothing to run.
    let err = engine
        .predict(dataset.id, &content_payload([0.5, 0.5, 0.5, 0.5, 0.5], 0.0))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IntelError::Prediction(PredictionError::NoModelFound(id)) if id == dataset.id
    ));
}

#[tokio::test]
async fn accurate_model_reports_live_and_clear() {
    let (engine, store) = content_engine(config_with(|c| {
        c.training.min_active_records = 5;
    }))
    .await;
    let dataset = content_dataset(&engine).await;
    ingest_linear_grid(&engine, dataset.id, 6).await;
    let outcome = engine.train(dataset.id).await.unwrap();
    let model_id = outcome.model().unwrap().id;
    let now = Utc::now();

    // Misses alternate sign, so neither the retirement distance nor the
    // overestimation share builds up.
    for (i, actual) in [0.30, 0.50, 0.40, 0.60, 0.45].into_iter().enumerate() {
        let predicted = if i % 2 == 0 { actual + 0.02 } else { actual - 0.02 };
        let log = make_log(dataset.id, model_id, predicted, actual, now - Duration::minutes(i as i64));
        store.insert_prediction_log(log).await.unwrap();
    }

    let health = engine.model_health(dataset.id).await.unwrap();
    match health {
        ModelHealth::Live { model_id: live, drift } => {
            assert_eq!(live, model_id);
            assert_eq!(drift.severity, DriftSeverity::None);
        }
        other => panic!("expected a live model, got {other:?}"),
    }

    let stored = store.get_model(model_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ModelStatus::Active);
}

#[tokio::test]
async fn model_health_needs_an_active_model() {
    let (engine, _store) = content_engine(config_with(|_| {})).await;
    let dataset = content_dataset(&engine).await;
    let err = engine.model_health(dataset.id).await.unwrap_err();
    assert!(matches!(
        err,
        IntelError::Prediction(PredictionError::NoModelFound(id)) if id == dataset.id
    ));
}
