// src/config.rs

//! # Configuration System
//!
//! Loads engine settings from a single JSON file. Every field carries a default
//! tuned to the behavioral contracts of the training, exploration, and signal
//! pipelines, so an empty `{}` file (or no file at all) yields a fully working
//! configuration. The `Config` struct is the single source of truth for all
//! tunable parameters.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::FeatureBound;

//================================================================================================//
//                                       Top-Level Config                                         //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub training: TrainingSettings,
    pub exploration: ExplorationSettings,
    pub signals: SignalSettings,
    pub metrics: MetricsSettings,
    /// Keywords the ingestion loop polls on every tick.
    pub tracked_keywords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            training: TrainingSettings::default(),
            exploration: ExplorationSettings::default(),
            signals: SignalSettings::default(),
            metrics: MetricsSettings::default(),
            tracked_keywords: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from a single JSON file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from JSON: {}", path.as_ref().display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0 < self.training.train_ratio && self.training.train_ratio < 1.0) {
            eyre::bail!(
                "training.train_ratio must be in (0, 1), got {}",
                self.training.train_ratio
            );
        }
        if !(0.0..=1.0).contains(&self.exploration.base_epsilon) {
            eyre::bail!(
                "exploration.base_epsilon must be in [0, 1], got {}",
                self.exploration.base_epsilon
            );
        }
        for (name, bound) in &self.exploration.mutation_bounds {
            if bound.step <= 0.0 || bound.max < bound.min {
                eyre::bail!("exploration.mutation_bounds['{name}'] is degenerate");
            }
        }
        if self.signals.max_lag_days < 0 {
            eyre::bail!("signals.max_lag_days must be non-negative");
        }
        Ok(())
    }

    pub fn api_key(&self, source_name: &str) -> Option<String> {
        self.signals
            .api_keys
            .get(source_name)
            .filter(|key| !key.is_empty())
            .cloned()
    }

    pub fn endpoint_override(&self, source_name: &str) -> Option<String> {
        self.signals.endpoints.get(source_name).cloned()
    }
}

//================================================================================================//
//                                       Module Settings                                          //
//================================================================================================//

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Chronological share of records used for fitting; the remainder is hold-out.
    pub train_ratio: f64,
    /// Active records required before the engine will run a training pass.
    pub min_active_records: usize,
    /// Validated predictions covered by the rolling accuracy window.
    pub rolling_accuracy_window: usize,
    /// Validated predictions examined by each drift check.
    pub drift_window: usize,
    /// Per-feature probe distance used by the greedy optimizer, in normalized units.
    pub optimizer_step_size: f64,
    /// How long a loaded model stays hot before it is re-read from storage.
    pub model_cache_ttl_seconds: u64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            train_ratio: 0.8,
            min_active_records: 10,
            rolling_accuracy_window: 20,
            drift_window: 10,
            optimizer_step_size: 0.05,
            model_cache_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationSettings {
    /// Base probability of assigning a candidate to the exploration arm.
    pub base_epsilon: f64,
    /// Per-feature mutation ranges. Features without an entry are never mutated.
    pub mutation_bounds: BTreeMap<String, FeatureBound>,
}

impl Default for ExplorationSettings {
    fn default() -> Self {
        Self {
            base_epsilon: 0.15,
            mutation_bounds: default_mutation_bounds(),
        }
    }
}

/// Mutation ranges for the stock content-performance feature set.
pub fn default_mutation_bounds() -> BTreeMap<String, FeatureBound> {
    BTreeMap::from([
        ("setup_duration".to_string(), FeatureBound::new(2.0, 15.0, 1.0)),
        ("punchline_timing".to_string(), FeatureBound::new(1.0, 10.0, 0.5)),
        ("tone_shift_density".to_string(), FeatureBound::new(0.0, 8.0, 1.0)),
        ("escalation_density".to_string(), FeatureBound::new(0.0, 6.0, 1.0)),
        ("delivery_pace_wps".to_string(), FeatureBound::new(2.0, 6.5, 0.25)),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalSettings {
    pub http_timeout_seconds: u64,
    /// Upper bound on simultaneous outbound fetches across all sources.
    pub max_concurrent_fetches: usize,
    /// Seconds between ingestion ticks in the polling loop.
    pub ingest_interval_seconds: u64,
    /// Maximum lead/lag offset scanned during cross-layer analysis.
    pub max_lag_days: i64,
    /// Aligned observation count at which correlation confidence saturates.
    pub full_confidence_samples: usize,
    /// Source name to API key. Sources with no key degrade to mock data.
    pub api_keys: HashMap<String, String>,
    /// Source name to endpoint override, for staging and tests.
    pub endpoints: HashMap<String, String>,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 10,
            max_concurrent_fetches: 4,
            ingest_interval_seconds: 900,
            max_lag_days: 14,
            full_confidence_samples: 30,
            api_keys: HashMap::new(),
            endpoints: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 9901,
        }
    }
}
