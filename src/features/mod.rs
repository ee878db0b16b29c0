//! # Feature Engineering Registry
//!
//! Every dataset type registers a [`DatasetAdapter`] that knows how to turn a raw
//! payload into a numeric feature vector plus a target value. The rest of the
//! pipeline is schema-blind: training, prediction, and optimization only ever see
//! named `f64` features, so new dataset types plug in without touching the core.

pub mod normalize;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::FeatureMap;

pub use normalize::{compute_feature_stats, normalize_features, normalize_value};

/// Raw payload decomposed into model inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub features: FeatureMap,
    pub target: f64,
}

/// Turns one raw payload into features and a target value.
///
/// Extraction is total: missing or non-numeric fields come back as 0.0 rather
/// than failing, and the degenerate-feature handling downstream absorbs the
/// resulting constant columns.
pub trait DatasetAdapter: Send + Sync + Debug {
    fn extract(&self, raw: &Value) -> ExtractedRecord;
}

/// Name-keyed adapter registry. Registration happens at startup, before any
/// dataset of that type is created; re-registering a name replaces the previous
/// adapter.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    adapters: HashMap<String, Arc<dyn DatasetAdapter>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, dataset_type: impl Into<String>, adapter: Arc<dyn DatasetAdapter>) {
        let dataset_type = dataset_type.into();
        if self.adapters.insert(dataset_type.clone(), adapter).is_some() {
            warn!(target: "features", dataset_type = %dataset_type, "Replacing previously registered feature adapter");
        } else {
            debug!(target: "features", dataset_type = %dataset_type, "Registered feature adapter");
        }
    }

    pub fn get(&self, dataset_type: &str) -> Option<Arc<dyn DatasetAdapter>> {
        self.adapters.get(dataset_type).cloned()
    }

    pub fn contains(&self, dataset_type: &str) -> bool {
        self.adapters.contains_key(dataset_type)
    }

    pub fn dataset_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.adapters.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Adapter that reads a fixed list of numeric fields off a flat JSON object.
/// Covers most tabular payloads without custom code.
#[derive(Debug, Clone)]
pub struct JsonFieldAdapter {
    feature_fields: Vec<String>,
    target_field: String,
}

impl JsonFieldAdapter {
    pub fn new<S: Into<String>>(
        feature_fields: impl IntoIterator<Item = S>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            feature_fields: feature_fields.into_iter().map(Into::into).collect(),
            target_field: target_field.into(),
        }
    }
}

impl DatasetAdapter for JsonFieldAdapter {
    fn extract(&self, raw: &Value) -> ExtractedRecord {
        let features = self
            .feature_fields
            .iter()
            .map(|field| {
                let value = raw.get(field).and_then(Value::as_f64).unwrap_or(0.0);
                (field.clone(), value)
            })
            .collect();
        let target = raw.get(&self.target_field).and_then(Value::as_f64).unwrap_or(0.0);
        ExtractedRecord { features, target }
    }
}

/// Stock feature set for short-form content performance datasets.
pub const CONTENT_FEATURES: [&str; 5] = [
    "setup_duration",
    "punchline_timing",
    "tone_shift_density",
    "escalation_density",
    "delivery_pace_wps",
];

/// The adapter the binary registers under the `content_performance` type.
pub fn content_performance_adapter() -> JsonFieldAdapter {
    JsonFieldAdapter::new(CONTENT_FEATURES, "engagement_rate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_adapter_reads_declared_fields() {
        let adapter = JsonFieldAdapter::new(["pace", "length"], "score");
        let extracted = adapter.extract(&json!({"pace": 3.5, "length": 42, "score": 0.8}));
        assert_eq!(extracted.features["pace"], 3.5);
        assert_eq!(extracted.features["length"], 42.0);
        assert_eq!(extracted.target, 0.8);
    }

    #[test]
    fn missing_and_non_numeric_fields_become_zero() {
        let adapter = JsonFieldAdapter::new(["pace", "length"], "score");
        let extracted = adapter.extract(&json!({"pace": "fast"}));
        assert_eq!(extracted.features["pace"], 0.0);
        assert_eq!(extracted.features["length"], 0.0);
        assert_eq!(extracted.target, 0.0);
    }

    #[test]
    fn registry_replaces_on_duplicate_name() {
        let mut registry = FeatureRegistry::new();
        registry.register("clips", Arc::new(JsonFieldAdapter::new(["a"], "t")));
        registry.register("clips", Arc::new(JsonFieldAdapter::new(["b"], "t")));
        assert_eq!(registry.dataset_types(), vec!["clips".to_string()]);

        let adapter = registry.get("clips").unwrap();
        let extracted = adapter.extract(&json!({"a": 1.0, "b": 2.0, "t": 0.0}));
        assert!(extracted.features.contains_key("b"));
        assert!(!extracted.features.contains_key("a"));
    }

    #[test]
    fn content_adapter_covers_the_stock_feature_set() {
        let adapter = content_performance_adapter();
        let extracted = adapter.extract(&json!({
            "setup_duration": 6.0,
            "punchline_timing": 4.5,
            "tone_shift_density": 3.0,
            "escalation_density": 2.0,
            "delivery_pace_wps": 4.25,
            "engagement_rate": 0.61,
        }));
        assert_eq!(extracted.features.len(), 5);
        assert_eq!(extracted.target, 0.61);
    }
}
