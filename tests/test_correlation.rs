// Integration tests for the correlation scan and the attention migration index
// as driven through the engine with seeded signal history.

mod common;

use chrono::{Duration, Utc};
use common::{config_with, content_engine, make_signal};
use trend_intel::errors::{CorrelationError, IntelError};
use trend_intel::storage::IntelStore;
use trend_intel::types::{AttentionLayer, MigrationStage, PatternStatus};

// Irregular enough that shifted alignments decorrelate.
const SHAPE: [f64; 10] = [0.0, 0.1, 0.0, 0.5, 0.1, 0.0, 0.2, 0.9, 0.2, 0.0];

#[tokio::test]
async fn lagged_cascade_is_detected_and_persisted() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let base = Utc::now() - Duration::days(30);

    // Cultural chatter on days 0..9; the same shape shows up in search three
    // days later.
    for (i, density) in SHAPE.into_iter().enumerate() {
        let at = base + Duration::days(i as i64);
        store
            .insert_signal(make_signal(
                "social_mock",
                AttentionLayer::CulturalNoise,
                "retro handheld",
                density,
                at,
            ))
            .await
            .unwrap();
        store
            .insert_signal(make_signal(
                "search_mock",
                AttentionLayer::SearchIntent,
                "retro handheld",
                density,
                at + Duration::days(3),
            ))
            .await
            .unwrap();
    }

    let patterns = engine.detect_correlations("retro handheld").await.unwrap();
    assert_eq!(patterns.len(), 1);
    let pattern = &patterns[0];
    assert_eq!(pattern.source_layer, AttentionLayer::CulturalNoise);
    assert_eq!(pattern.target_layer, AttentionLayer::SearchIntent);
    assert_eq!(pattern.lag_days, 3);
    assert_eq!(pattern.sample_size, 10);
    assert!((pattern.correlation_strength - 1.0).abs() < 1e-9);
    assert_eq!(pattern.status, PatternStatus::Active);
    // sqrt(1.0 * 10/30) with the default saturation count.
    assert!((pattern.confidence - (10.0f64 / 30.0).sqrt()).abs() < 1e-9);

    let stored = store.patterns_for_keyword("retro handheld").await.unwrap();
    assert_eq!(stored.len(), 1);

    // A rescan replaces the pattern for the same layer pair instead of stacking.
    engine.detect_correlations("retro handheld").await.unwrap();
    let stored = store.patterns_for_keyword("retro handheld").await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn correlation_scan_without_history_is_an_error() {
    let (engine, _store) = content_engine(config_with(|_| {})).await;
    let err = engine.detect_correlations("ghost topic").await.unwrap_err();
    assert!(matches!(
        err,
        IntelError::Correlation(CorrelationError::NoHistory(keyword)) if keyword == "ghost topic"
    ));
}

#[tokio::test]
async fn ami_blends_the_latest_observation_per_source() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let now = Utc::now();

    // An older cultural reading is superseded by the latest one.
    store
        .insert_signal(make_signal(
            "social_mock",
            AttentionLayer::CulturalNoise,
            "retro handheld",
            0.2,
            now - Duration::hours(2),
        ))
        .await
        .unwrap();
    store
        .insert_signal(make_signal(
            "social_mock",
            AttentionLayer::CulturalNoise,
            "retro handheld",
            0.8,
            now - Duration::hours(1),
        ))
        .await
        .unwrap();
    store
        .insert_signal(make_signal(
            "search_mock",
            AttentionLayer::SearchIntent,
            "retro handheld",
            0.1,
            now - Duration::hours(1),
        ))
        .await
        .unwrap();

    let ami = engine.ami("retro handheld").await.unwrap();
    assert_eq!(ami.keyword, "retro handheld");
    // 0.2 * 0.8 + 0.3 * 0.1, with two of four layers reporting.
    assert!((ami.score - 0.19).abs() < 1e-9);
    assert_eq!(ami.stage, MigrationStage::EarlyNoise);
    assert!((ami.confidence - 0.6).abs() < 1e-9);
    let cultural = ami.layer_scores[&AttentionLayer::CulturalNoise];
    assert!((cultural - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn ami_averages_sources_reporting_into_one_layer() {
    let (engine, store) = content_engine(config_with(|_| {})).await;
    let now = Utc::now();

    for (source, density) in [("social_mock", 0.8), ("forum_mock", 0.4)] {
        store
            .insert_signal(make_signal(
                source,
                AttentionLayer::CulturalNoise,
                "retro handheld",
                density,
                now - Duration::hours(1),
            ))
            .await
            .unwrap();
    }
    store
        .insert_signal(make_signal(
            "search_mock",
            AttentionLayer::SearchIntent,
            "retro handheld",
            0.55,
            now - Duration::hours(1),
        ))
        .await
        .unwrap();

    let ami = engine.ami("retro handheld").await.unwrap();
    let cultural = ami.layer_scores[&AttentionLayer::CulturalNoise];
    assert!((cultural - 0.6).abs() < 1e-9);
    // Search is loud as well, so the early-noise shape does not apply.
    assert_eq!(ami.stage, MigrationStage::SearchGrowth);
    assert!((ami.score - 0.285).abs() < 1e-9);
}

#[tokio::test]
async fn ami_without_history_is_an_error() {
    let (engine, _store) = content_engine(config_with(|_| {})).await;
    let err = engine.ami("ghost topic").await.unwrap_err();
    assert!(matches!(
        err,
        IntelError::Correlation(CorrelationError::NoHistory(keyword)) if keyword == "ghost topic"
    ));
}
