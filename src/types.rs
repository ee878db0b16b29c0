//! # Core Type Definitions
//!
//! This module serves as the single source of truth for all shared data structures
//! used throughout the intelligence core. Centralizing these types ensures
//! consistency, promotes decoupling between modules, and simplifies serialization
//! and persistence.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Feature vectors are keyed by feature name. `BTreeMap` keeps iteration order
/// deterministic, which the snapshot hash and solver column ordering rely on.
pub type FeatureMap = BTreeMap<String, f64>;

//================================================================================================//
//                                      DATASETS AND RECORDS                                      //
//================================================================================================//

/// A logical collection of records sharing one feature schema and one target metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    /// Key into the feature adapter registry.
    pub dataset_type: String,
    /// Human-readable name of the outcome this dataset predicts.
    pub target_metric_name: String,
    pub created_at: DateTime<Utc>,
    pub last_trained_at: Option<DateTime<Utc>>,
}

/// One observation: raw payload, the normalized feature vector derived from it,
/// and the observed target value.
///
/// Records are immutable once their normalized features have been computed from a
/// statistics snapshot. Exclusion from future training happens by clearing
/// `is_active`, never by rewriting the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub raw_payload: serde_json::Value,
    pub normalized_features: FeatureMap,
    pub target_value: f64,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Per-feature distribution statistics captured when a batch is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

//================================================================================================//
//                                      MODELS AND PREDICTIONS                                    //
//================================================================================================//

/// Lifecycle state of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Serving predictions for its dataset.
    Active,
    /// Replaced by a newer training run.
    Superseded,
    /// Pulled from service after sustained underperformance.
    Retired,
}

/// A trained linear pattern model together with its hold-out evaluation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternModel {
    pub id: Uuid,
    pub dataset_id: Uuid,
    /// One coefficient per entry of `feature_names`, in the same order.
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    /// Canonical column ordering: feature names sorted lexicographically.
    pub feature_names: Vec<String>,
    pub r_squared: f64,
    pub mean_absolute_error: f64,
    pub tier_accuracy: f64,
    pub directional_accuracy: f64,
    pub train_sample_count: usize,
    pub test_sample_count: usize,
    pub status: ModelStatus,
    pub trained_at: DateTime<Utc>,
}

/// Outcome tier for a predicted or observed target value in normalized space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Top,
    Mid,
    Low,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Top => "top",
            Tier::Mid => "mid",
            Tier::Low => "low",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable, hash-signed record of a single prediction at the moment it was made.
///
/// The signature covers the feature vector, the coefficients used, the predicted
/// value, and the creation timestamp, so any later tampering is detectable. Only
/// the `upload_confirmed` and `performance_tracking_started` flags may change
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub model_id: Uuid,
    pub feature_vector: FeatureMap,
    pub coefficients_used: Vec<f64>,
    pub intercept_used: f64,
    pub predicted_value: f64,
    pub predicted_tier: Tier,
    pub confidence: f64,
    /// Hex-encoded SHA-256 over the canonical serialization of the signed fields.
    pub hash_signature: String,
    pub created_at: DateTime<Utc>,
    pub is_locked: bool,
    pub upload_confirmed: bool,
    pub performance_tracking_started: bool,
}

/// The permanent accuracy record produced when a snapshot's actual outcome arrives.
/// Created exactly once per snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionLog {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    pub dataset_id: Uuid,
    pub model_id: Uuid,
    pub predicted_value: f64,
    pub actual_value: f64,
    pub error: f64,
    pub absolute_error: f64,
    pub directionally_correct: bool,
    pub tier_correct: bool,
    pub validated_at: DateTime<Utc>,
}

/// Rolling accuracy over the most recent validated predictions of a dataset.
/// All fields are zero when no validated predictions exist yet.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RollingAccuracy {
    pub directional_accuracy: f64,
    pub tier_accuracy: f64,
    pub mean_absolute_error: f64,
    pub sample_count: usize,
    pub window_size: usize,
}

/// Result of a training run at the engine surface. Insufficient data is an
/// expected state of the world, not an error.
#[derive(Debug, Clone)]
pub enum TrainOutcome {
    Trained(PatternModel),
    InsufficientData { active_records: usize, required: usize },
}

impl TrainOutcome {
    pub fn model(&self) -> Option<&PatternModel> {
        match self {
            TrainOutcome::Trained(model) => Some(model),
            TrainOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Result of a prediction request: the persisted snapshot id plus the values the
/// caller acts on immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub snapshot_id: Uuid,
    pub model_id: Uuid,
    pub predicted_value: f64,
    pub predicted_tier: Tier,
    pub confidence: f64,
}

//================================================================================================//
//                                      DRIFT AND MODEL HEALTH                                    //
//================================================================================================//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    None,
    Moderate,
    Severe,
}

impl DriftSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftSeverity::None => "none",
            DriftSeverity::Moderate => "moderate",
            DriftSeverity::Severe => "severe",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftRecommendation {
    None,
    ReduceConfidence,
    Retrain,
    IncreaseExploration,
}

/// Which drift rule fired, with the measurement that tripped it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DriftTrigger {
    Overestimation { ratio: f64 },
    EngagementDrop { deviation_sigma: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftStatus {
    pub severity: DriftSeverity,
    pub recommendation: DriftRecommendation,
    pub trigger: Option<DriftTrigger>,
    /// Validated predictions examined by the check.
    pub sample_count: usize,
}

impl DriftStatus {
    pub fn clear(sample_count: usize) -> Self {
        Self {
            severity: DriftSeverity::None,
            recommendation: DriftRecommendation::None,
            trigger: None,
            sample_count,
        }
    }

    pub fn detected(&self) -> bool {
        self.severity != DriftSeverity::None
    }
}

/// Health verdict for a dataset's active model. Retirement takes precedence over
/// drift reporting; a retired model is no longer drifting, it is gone.
#[derive(Debug, Clone)]
pub enum ModelHealth {
    Retired {
        model_id: Uuid,
        underperformance_sigma: f64,
    },
    Live {
        model_id: Uuid,
        drift: DriftStatus,
    },
}

//================================================================================================//
//                                      EXPLORATION                                               //
//================================================================================================//

/// Attention migration stage of a keyword, derived from its composite AMI score.
/// Stages carry the epsilon adjustment behavior for exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    EarlyNoise,
    SearchGrowth,
    BuyerInterest,
    MediaAmplification,
}

impl MigrationStage {
    /// Multiplier applied to the base exploration rate for this stage.
    /// Confirmed demand damps exploration; early noise and late-stage
    /// amplification raise it.
    pub fn epsilon_factor(&self) -> f64 {
        match self {
            MigrationStage::SearchGrowth | MigrationStage::BuyerInterest => 0.7,
            MigrationStage::EarlyNoise => 1.2,
            MigrationStage::MediaAmplification => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStage::EarlyNoise => "early_noise",
            MigrationStage::SearchGrowth => "search_growth",
            MigrationStage::BuyerInterest => "buyer_interest",
            MigrationStage::MediaAmplification => "media_amplification",
        }
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentArm {
    Exploitation,
    Exploration,
}

impl ExperimentArm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentArm::Exploitation => "exploitation",
            ExperimentArm::Exploration => "exploration",
        }
    }
}

/// Inclusive mutation range for one feature, stepped on a fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureBound {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl FeatureBound {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }
}

/// Record of how one epsilon-greedy decision was parameterized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationParameters {
    pub base_epsilon: f64,
    pub adjusted_epsilon: f64,
    pub ami_stage: Option<MigrationStage>,
    /// Names of the features whose values actually changed.
    pub mutated_features: Vec<String>,
}

/// One exploration-vs-exploitation assignment, persisted for later attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentGroup {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub arm: ExperimentArm,
    pub original_features: FeatureMap,
    pub candidate_features: FeatureMap,
    pub mutation_parameters: MutationParameters,
    pub created_at: DateTime<Utc>,
}

//================================================================================================//
//                                      OPTIMIZATION                                              //
//================================================================================================//

/// One actionable single-feature adjustment, ranked by projected gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSuggestion {
    pub feature: String,
    pub current_value: f64,
    pub suggested_value: f64,
    pub expected_gain: f64,
    /// Relative coefficient magnitude, in `[0, 1]`.
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub dataset_id: Uuid,
    pub model_id: Uuid,
    pub baseline_prediction: f64,
    pub suggestions: Vec<FeatureSuggestion>,
    pub total_projected_lift: f64,
}

//================================================================================================//
//                                      EXTERNAL SIGNALS                                          //
//================================================================================================//

/// The six-layer attention funnel. Layers 1 through 4 are in active use; 5 and 6
/// are reserved for future funnel stages and carry no scoring weight yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AttentionLayer {
    CulturalNoise = 1,
    SearchIntent = 2,
    Marketplace = 3,
    MediaAmplification = 4,
    ReservedFive = 5,
    ReservedSix = 6,
}

impl AttentionLayer {
    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(AttentionLayer::CulturalNoise),
            2 => Some(AttentionLayer::SearchIntent),
            3 => Some(AttentionLayer::Marketplace),
            4 => Some(AttentionLayer::MediaAmplification),
            5 => Some(AttentionLayer::ReservedFive),
            6 => Some(AttentionLayer::ReservedSix),
            _ => None,
        }
    }

    /// The next layer down the funnel, if any.
    pub fn successor(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionLayer::CulturalNoise => "cultural_noise",
            AttentionLayer::SearchIntent => "search_intent",
            AttentionLayer::Marketplace => "marketplace",
            AttentionLayer::MediaAmplification => "media_amplification",
            AttentionLayer::ReservedFive => "reserved_5",
            AttentionLayer::ReservedSix => "reserved_6",
        }
    }
}

impl fmt::Display for AttentionLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AttentionLayer> for u8 {
    fn from(layer: AttentionLayer) -> u8 {
        layer.index()
    }
}

impl TryFrom<u8> for AttentionLayer {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        AttentionLayer::from_index(value).ok_or_else(|| format!("invalid attention layer {value}"))
    }
}

/// How often a source may be polled for any single keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateFrequency {
    Hourly,
    Daily,
    Weekly,
}

impl UpdateFrequency {
    pub fn interval(&self) -> chrono::Duration {
        match self {
            UpdateFrequency::Hourly => chrono::Duration::hours(1),
            UpdateFrequency::Daily => chrono::Duration::days(1),
            UpdateFrequency::Weekly => chrono::Duration::weeks(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateFrequency::Hourly => "hourly",
            UpdateFrequency::Daily => "daily",
            UpdateFrequency::Weekly => "weekly",
        }
    }
}

/// Normalized per-observation metrics shared by every source, whatever its raw shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalFeatures {
    /// Change per second between the two most recent observations.
    pub velocity: f64,
    /// Change in velocity per second; requires three observations.
    pub acceleration: f64,
    /// Deviation of the latest value from the historical mean, relative to that mean.
    pub relative_deviation: f64,
    /// Z-score of the latest value against the history.
    pub anomaly_z_score: f64,
    /// Bounded `[0, 1]` composite of level and momentum.
    pub attention_density_score: f64,
}

/// One persisted observation from an external attention source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSignal {
    pub id: Uuid,
    pub source: String,
    pub layer: AttentionLayer,
    pub keyword: String,
    pub value: f64,
    pub features: SignalFeatures,
    pub raw_payload: serde_json::Value,
    /// True when the source degraded to synthetic data (for example, no API key).
    pub is_mock: bool,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of one fetch attempt. Rate limiting and source unavailability are
/// expected conditions, reported inline so a batch can continue past them.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fetched(ExternalSignal),
    RateLimited {
        source: String,
        keyword: String,
        next_allowed_at: DateTime<Utc>,
    },
    Unavailable {
        source: String,
        keyword: String,
        reason: String,
    },
}

impl FetchOutcome {
    pub fn signal(&self) -> Option<&ExternalSignal> {
        match self {
            FetchOutcome::Fetched(signal) => Some(signal),
            _ => None,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            FetchOutcome::Fetched(signal) => &signal.source,
            FetchOutcome::RateLimited { source, .. } => source,
            FetchOutcome::Unavailable { source, .. } => source,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Fetched(_) => "fetched",
            FetchOutcome::RateLimited { .. } => "rate_limited",
            FetchOutcome::Unavailable { .. } => "unavailable",
        }
    }
}

//================================================================================================//
//                                      CROSS-LAYER ANALYSIS                                      //
//================================================================================================//

/// Lifecycle state of a stored cross-layer pattern. Rescans replace patterns
/// wholesale rather than flagging them, so `Active` is the only state written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternStatus {
    Active,
}

/// A detected lead/lag relationship between two adjacent attention layers for one keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossLayerPattern {
    pub id: Uuid,
    pub keyword: String,
    pub source_layer: AttentionLayer,
    pub target_layer: AttentionLayer,
    /// Pearson correlation at the best lag, in `[-1, 1]`.
    pub correlation_strength: f64,
    /// Days by which the source layer leads the target layer.
    pub lag_days: i64,
    pub sample_size: usize,
    /// `sqrt(|correlation| * min(1, n / 30))`.
    pub confidence: f64,
    pub status: PatternStatus,
    pub detected_at: DateTime<Utc>,
}

/// Composite Attention Migration Index for a keyword at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmiScore {
    pub keyword: String,
    /// Weighted composite in `[0, 1]`.
    pub score: f64,
    pub stage: MigrationStage,
    /// Coverage-scaled confidence in `[0.2, 1]`.
    pub confidence: f64,
    /// Mean attention density per contributing layer.
    pub layer_scores: BTreeMap<AttentionLayer, f64>,
    pub computed_at: DateTime<Utc>,
}
