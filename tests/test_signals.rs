// Integration tests for signal ingestion through the engine: persistence with
// derived features, per-(source, keyword) rate limiting, and failure outcomes.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{config_with, content_engine, make_signal, MockSignalSource};
use trend_intel::errors::{IntelError, RegistryError};
use trend_intel::storage::IntelStore;
use trend_intel::types::{AttentionLayer, FetchOutcome};

#[tokio::test]
async fn fetching_persists_a_signal_with_derived_features() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    engine
        .register_signal_source(Arc::new(MockSignalSource::new(
            "pulse_mock",
            AttentionLayer::CulturalNoise,
            vec![10.0],
        )))
        .await;

    let outcome = engine.fetch_signal("pulse_mock", "demo").await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Fetched(_)));

    let history = store.signal_history("pulse_mock", "demo").await.unwrap();
    assert_eq!(history.len(), 1);
    let signal = &history[0];
    assert_eq!(signal.keyword, "demo");
    assert_eq!(signal.layer, AttentionLayer::CulturalNoise);
    assert!((signal.value - 10.0).abs() < 1e-12);
    assert!(!signal.is_mock);
    // A single observation carries no momentum and a neutral density.
    assert_eq!(signal.features.velocity, 0.0);
    assert_eq!(signal.features.anomaly_z_score, 0.0);
    assert!((signal.features.attention_density_score - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn immediate_refetch_is_rate_limited() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    engine
        .register_signal_source(Arc::new(MockSignalSource::new(
            "pulse_mock",
            AttentionLayer::CulturalNoise,
            vec![10.0, 20.0],
        )))
        .await;

    let before = Utc::now();
    let first = engine.fetch_signal("pulse_mock", "demo").await.unwrap();
    assert!(matches!(first, FetchOutcome::Fetched(_)));

    let second = engine.fetch_signal("pulse_mock", "demo").await.unwrap();
    match second {
        FetchOutcome::RateLimited { source, keyword, next_allowed_at } => {
            assert_eq!(source, "pulse_mock");
            assert_eq!(keyword, "demo");
            // Hourly source: the window reopens an hour after the first fetch.
            assert!(next_allowed_at >= before + Duration::minutes(59));
            assert!(next_allowed_at <= Utc::now() + Duration::minutes(61));
        }
        other => panic!("expected rate limiting, got {other:?}"),
    }

    // A separate keyword is tracked independently.
    let other_keyword = engine.fetch_signal("pulse_mock", "other").await.unwrap();
    assert!(matches!(other_keyword, FetchOutcome::Fetched(_)));

    let history = store.signal_history("pulse_mock", "demo").await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn fetch_history_shapes_the_derived_features() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    engine
        .register_signal_source(Arc::new(MockSignalSource::new(
            "surge_mock",
            AttentionLayer::SearchIntent,
            vec![40.0],
        )))
        .await;

    // One observation two hours back, then a live fetch that quadruples it.
    let seeded = make_signal(
        "surge_mock",
        AttentionLayer::SearchIntent,
        "demo",
        0.1,
        Utc::now() - Duration::hours(2),
    );
    store.insert_signal(seeded).await.unwrap();

    let outcome = engine.fetch_signal("surge_mock", "demo").await.unwrap();
    assert!(matches!(outcome, FetchOutcome::Fetched(_)));

    let history = store.signal_history("surge_mock", "demo").await.unwrap();
    assert_eq!(history.len(), 2);
    let latest = history.last().unwrap();
    assert!(latest.features.velocity > 0.0);
    // Latest value is the max of the series, with a z-score of 1/sqrt(2).
    assert!((latest.features.anomaly_z_score - 0.7071).abs() < 1e-3);
    assert!(latest.features.attention_density_score > 0.8);
    assert!(latest.features.attention_density_score < 0.9);
}

#[tokio::test]
async fn failed_fetch_reports_unavailable_and_reopens_the_window() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let source = Arc::new(MockSignalSource::new(
        "flaky_mock",
        AttentionLayer::Marketplace,
        vec![5.0],
    ));
    engine.register_signal_source(source.clone()).await;

    source.set_fail(true);
    let outcome = engine.fetch_signal("flaky_mock", "demo").await.unwrap();
    match outcome {
        FetchOutcome::Unavailable { source, keyword, reason } => {
            assert_eq!(source, "flaky_mock");
            assert_eq!(keyword, "demo");
            assert!(reason.contains("503"), "reason should carry the status: {reason}");
        }
        other => panic!("expected unavailable, got {other:?}"),
    }
    assert!(store.signal_history("flaky_mock", "demo").await.unwrap().is_empty());

    // The failed attempt must not consume the rate window.
    source.set_fail(false);
    let retry = engine.fetch_signal("flaky_mock", "demo").await.unwrap();
    assert!(matches!(retry, FetchOutcome::Fetched(_)));
    assert_eq!(store.signal_history("flaky_mock", "demo").await.unwrap().len(), 1);
}

#[tokio::test]
async fn fetching_an_unregistered_source_errors() {
    let (engine, _store) = content_engine(config_with(|_| {})).await;
    let err = engine.fetch_signal("nonexistent", "demo").await.unwrap_err();
    assert!(matches!(
        err,
        IntelError::Registry(RegistryError::UnknownSource(name)) if name == "nonexistent"
    ));
}

#[tokio::test]
async fn fetch_all_reports_one_outcome_per_source() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    engine
        .register_signal_source(Arc::new(MockSignalSource::new(
            "alpha_mock",
            AttentionLayer::CulturalNoise,
            vec![12.0],
        )))
        .await;
    let failing = Arc::new(MockSignalSource::new(
        "beta_mock",
        AttentionLayer::SearchIntent,
        vec![30.0],
    ));
    failing.set_fail(true);
    engine.register_signal_source(failing).await;

    let outcomes = engine.fetch_all_signals("demo").await.unwrap();
    assert_eq!(outcomes.len(), 2);
    // fetch_all walks sources in name order.
    assert!(matches!(&outcomes[0], FetchOutcome::Fetched(signal) if signal.source == "alpha_mock"));
    assert!(matches!(
        &outcomes[1],
        FetchOutcome::Unavailable { source, .. } if source == "beta_mock"
    ));

    assert_eq!(store.signal_history("alpha_mock", "demo").await.unwrap().len(), 1);
    assert!(store.signal_history("beta_mock", "demo").await.unwrap().is_empty());
}
