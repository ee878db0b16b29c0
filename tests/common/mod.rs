#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use trend_intel::config::Config;
use trend_intel::engine::IntelligenceEngine;
use trend_intel::errors::SignalError;
use trend_intel::features::content_performance_adapter;
use trend_intel::model::classify_tier;
use trend_intel::signals::{RawObservation, SignalSource};
use trend_intel::snapshot::DIRECTIONAL_MIDPOINT;
use trend_intel::storage::MemoryStore;
use trend_intel::types::{
    AttentionLayer, Dataset, ExternalSignal, PredictionLog, SignalFeatures, UpdateFrequency,
};

// === Engine construction ===

/// Default config with test-specific overrides applied.
pub fn config_with(adjust: impl FnOnce(&mut Config)) -> Config {
    let mut config = Config::default();
    adjust(&mut config);
    config
}

/// Engine over a fresh in-memory store with the content-performance adapter
/// registered.
pub async fn content_engine(config: Config) -> (Arc<IntelligenceEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(IntelligenceEngine::new(Arc::new(config), store.clone()));
    engine
        .register_dataset_type("content_performance", Arc::new(content_performance_adapter()))
        .await;
    (engine, store)
}

pub async fn content_dataset(engine: &IntelligenceEngine) -> Dataset {
    engine
        .create_dataset("short-form-clips", "content_performance", "engagement_rate")
        .await
        .unwrap()
}

// === Deterministic content records ===

/// Weights applied to `[setup_duration, punchline_timing, tone_shift_density,
/// escalation_density, delivery_pace_wps]` when generating targets.
pub const TARGET_WEIGHTS: [f64; 5] = [0.2, 0.3, 0.15, 0.1, 0.05];
pub const TARGET_INTERCEPT: f64 = 0.08;

pub fn content_payload(features: [f64; 5], engagement_rate: f64) -> serde_json::Value {
    json!({
        "setup_duration": features[0],
        "punchline_timing": features[1],
        "tone_shift_density": features[2],
        "escalation_density": features[3],
        "delivery_pace_wps": features[4],
        "engagement_rate": engagement_rate,
    })
}

pub fn linear_engagement(features: &[f64; 5]) -> f64 {
    TARGET_INTERCEPT
        + features
            .iter()
            .zip(TARGET_WEIGHTS.iter())
            .map(|(f, w)| f * w)
            .sum::<f64>()
}

/// Feature rows on a fixed grid in [0, 1].
///
/// Rows 0 and 1 pin every feature's minimum and maximum, so min-max
/// normalization at ingestion time is the identity map for every later row and
/// an exactly linear target stays exactly linear in normalized space.
pub fn feature_grid_row(i: usize) -> [f64; 5] {
    match i {
        0 => [0.0; 5],
        1 => [1.0; 5],
        _ => [
            i as f64 / 11.0,
            ((i * 7) % 12) as f64 / 11.0,
            ((i * 5) % 12) as f64 / 11.0,
            ((i * 3) % 12) as f64 / 11.0,
            ((i * 9) % 12) as f64 / 11.0,
        ],
    }
}

/// Ingest `count` grid rows whose targets follow the linear relationship.
pub async fn ingest_linear_grid(
    engine: &IntelligenceEngine,
    dataset_id: Uuid,
    count: usize,
) -> Vec<Uuid> {
    let mut record_ids = Vec::with_capacity(count);
    for i in 0..count {
        let row = feature_grid_row(i);
        let payload = content_payload(row, linear_engagement(&row));
        let record = engine.ingest_record(dataset_id, payload).await.unwrap();
        record_ids.push(record.id);
    }
    record_ids
}

// === Seeded storage entities ===

/// A validated prediction with the derived fields computed the same way the
/// validation path computes them.
pub fn make_log(
    dataset_id: Uuid,
    model_id: Uuid,
    predicted: f64,
    actual: f64,
    validated_at: DateTime<Utc>,
) -> PredictionLog {
    PredictionLog {
        id: Uuid::new_v4(),
        snapshot_id: Uuid::new_v4(),
        dataset_id,
        model_id,
        predicted_value: predicted,
        actual_value: actual,
        error: predicted - actual,
        absolute_error: (predicted - actual).abs(),
        directionally_correct: (predicted > DIRECTIONAL_MIDPOINT)
            == (actual > DIRECTIONAL_MIDPOINT),
        tier_correct: classify_tier(actual) == classify_tier(predicted),
        validated_at,
    }
}

/// An already-derived signal observation, for tests that need full control over
/// timestamps and density scores.
pub fn make_signal(
    source: &str,
    layer: AttentionLayer,
    keyword: &str,
    density: f64,
    fetched_at: DateTime<Utc>,
) -> ExternalSignal {
    ExternalSignal {
        id: Uuid::new_v4(),
        source: source.to_string(),
        layer,
        keyword: keyword.to_string(),
        value: density * 100.0,
        features: SignalFeatures { attention_density_score: density, ..Default::default() },
        raw_payload: json!({ "seeded": true }),
        is_mock: true,
        fetched_at,
    }
}

// === Mock Signal Source ===

/// Scripted signal source. Yields queued values in order (repeating the last
/// one when exhausted) and can be flipped into a failing state mid-test.
#[derive(Debug)]
pub struct MockSignalSource {
    name: &'static str,
    layer: AttentionLayer,
    frequency: UpdateFrequency,
    values: Arc<StdMutex<VecDeque<f64>>>,
    fail: Arc<StdRwLock<bool>>,
}

impl MockSignalSource {
    pub fn new(name: &'static str, layer: AttentionLayer, values: Vec<f64>) -> Self {
        Self {
            name,
            layer,
            frequency: UpdateFrequency::Hourly,
            values: Arc::new(StdMutex::new(values.into())),
            fail: Arc::new(StdRwLock::new(false)),
        }
    }

    pub fn with_frequency(mut self, frequency: UpdateFrequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.write().unwrap() = fail;
    }
}

#[async_trait]
impl SignalSource for MockSignalSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn layer(&self) -> AttentionLayer {
        self.layer
    }

    fn update_frequency(&self) -> UpdateFrequency {
        self.frequency
    }

    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError> {
        if *self.fail.read().unwrap() {
            return Err(SignalError::SourceRejected { source_name: self.name.to_string(), status: 503 });
        }
        let mut values = self.values.lock().unwrap();
        let value = if values.len() > 1 {
            values.pop_front().unwrap_or(1.0)
        } else {
            values.front().copied().unwrap_or(1.0)
        };
        Ok(RawObservation {
            value,
            payload: json!({ "source": self.name, "keyword": keyword, "value": value }),
            is_mock: false,
        })
    }
}
