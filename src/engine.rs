//! # Intelligence Engine
//!
//! The orchestration core tying the subsystems together: feature extraction and
//! normalization, model training and caching, snapshot issuance and validation,
//! drift and retirement checks, signal ingestion, cross-layer correlation, and
//! the exploration and optimization surfaces. The engine owns no algorithm of
//! its own; it sequences the pure modules against the store and keeps the
//! bookkeeping (model lifecycle, metrics, per-dataset training locks) honest.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use moka::future::Cache;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::correlation::{self, SeriesPoint};
use crate::drift;
use crate::errors::{
    CorrelationError, IntelError, PredictionError, RegistryError, TrainingError,
};
use crate::explore;
use crate::features::{
    compute_feature_stats, normalize_features, DatasetAdapter, FeatureRegistry,
};
use crate::metrics::IntelMetrics;
use crate::model::{classify_tier, predict_value, train_model, TrainResult};
use crate::optimize;
use crate::signals::{SignalIngestor, SignalSource};
use crate::snapshot;
use crate::storage::IntelStore;
use crate::types::{
    AmiScore, AttentionLayer, CrossLayerPattern, Dataset, DatasetRecord, DriftStatus,
    ExperimentGroup, FeatureMap, FetchOutcome, ModelHealth, ModelSnapshot, ModelStatus,
    OptimizationResult, PatternModel, Prediction, PredictionLog, RollingAccuracy, TrainOutcome,
};

/// Bound on cached active models; one entry per dataset.
const MODEL_CACHE_CAPACITY: u64 = 256;

//================================================================================================//
//                                          ENGINE                                                //
//================================================================================================//

pub struct IntelligenceEngine {
    config: Arc<Config>,
    store: Arc<dyn IntelStore>,
    features: Arc<RwLock<FeatureRegistry>>,
    signals: Arc<SignalIngestor>,
    /// Active model per dataset, invalidated on supersede and retirement.
    model_cache: Cache<Uuid, Arc<PatternModel>>,
    /// One training run per dataset at a time.
    training_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl IntelligenceEngine {
    pub fn new(config: Arc<Config>, store: Arc<dyn IntelStore>) -> Self {
        let model_cache = Cache::builder()
            .max_capacity(MODEL_CACHE_CAPACITY)
            .time_to_live(StdDuration::from_secs(config.training.model_cache_ttl_seconds))
            .build();
        let signals = Arc::new(SignalIngestor::new(
            store.clone(),
            config.signals.max_concurrent_fetches,
        ));
        debug!("Intelligence engine initialized");
        Self {
            config,
            store,
            features: Arc::new(RwLock::new(FeatureRegistry::new())),
            signals,
            model_cache,
            training_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn IntelStore> {
        self.store.clone()
    }

    //============================================================================================//
    //                                    REGISTRATION                                            //
    //============================================================================================//

    pub async fn register_dataset_type(
        &self,
        dataset_type: impl Into<String>,
        adapter: Arc<dyn DatasetAdapter>,
    ) {
        self.features.write().await.register(dataset_type, adapter);
    }

    pub async fn dataset_types(&self) -> Vec<String> {
        self.features.read().await.dataset_types()
    }

    pub async fn register_signal_source(&self, source: Arc<dyn SignalSource>) {
        self.signals.register_source(source).await;
    }

    pub async fn signal_sources(&self) -> Vec<String> {
        self.signals.source_names().await
    }

    //============================================================================================//
    //                                 DATASETS AND RECORDS                                       //
    //============================================================================================//

    /// Create a dataset bound to a registered dataset type.
    pub async fn create_dataset(
        &self,
        name: &str,
        dataset_type: &str,
        target_metric_name: &str,
    ) -> Result<Dataset, IntelError> {
        if !self.features.read().await.contains(dataset_type) {
            return Err(RegistryError::UnknownDatasetType(dataset_type.to_string()).into());
        }
        let dataset = Dataset {
            id: Uuid::new_v4(),
            name: name.to_string(),
            dataset_type: dataset_type.to_string(),
            target_metric_name: target_metric_name.to_string(),
            created_at: Utc::now(),
            last_trained_at: None,
        };
        self.store.insert_dataset(dataset.clone()).await?;
        info!(dataset = %dataset.name, dataset_type, "Dataset created");
        Ok(dataset)
    }

    /// Extract, normalize, and persist one observation.
    ///
    /// Normalization statistics are computed over the raw features of every
    /// active record plus the incoming one, then frozen into the stored record.
    /// Later ingestions never rewrite earlier normalized vectors.
    pub async fn ingest_record(
        &self,
        dataset_id: Uuid,
        raw: serde_json::Value,
    ) -> Result<DatasetRecord, IntelError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(TrainingError::DatasetNotFound(dataset_id))?;
        let adapter = self
            .features
            .read()
            .await
            .get(&dataset.dataset_type)
            .ok_or_else(|| RegistryError::UnknownDatasetType(dataset.dataset_type.clone()))?;

        let extracted = adapter.extract(&raw);
        let existing = self.store.records_for_dataset(dataset_id, true).await?;
        let mut rows: Vec<FeatureMap> = existing
            .iter()
            .map(|record| adapter.extract(&record.raw_payload).features)
            .collect();
        rows.push(extracted.features.clone());
        let stats = compute_feature_stats(&rows);
        let normalized_features = normalize_features(&extracted.features, &stats);

        let record = DatasetRecord {
            id: Uuid::new_v4(),
            dataset_id,
            raw_payload: raw,
            normalized_features,
            target_value: extracted.target,
            created_at: Utc::now(),
            is_active: true,
        };
        self.store.insert_record(record.clone()).await?;
        debug!(
            dataset = %dataset.name,
            record_id = %record.id,
            target = record.target_value,
            "Record ingested"
        );
        Ok(record)
    }

    /// Soft-include or soft-exclude a record from future training runs.
    pub async fn set_record_active(&self, record_id: Uuid, active: bool) -> Result<(), IntelError> {
        if !self.store.set_record_active(record_id, active).await? {
            return Err(TrainingError::RecordNotFound(record_id).into());
        }
        debug!(%record_id, active, "Record activation changed");
        Ok(())
    }

    //============================================================================================//
    //                                        TRAINING                                            //
    //============================================================================================//

    /// Train a fresh model for a dataset, superseding the previous active one.
    ///
    /// Runs are serialized per dataset; concurrent callers queue on the dataset
    /// lock rather than racing to supersede each other.
    #[instrument(skip(self), fields(dataset_id = %dataset_id))]
    pub async fn train(&self, dataset_id: Uuid) -> Result<TrainOutcome, IntelError> {
        let lock = self
            .training_locks
            .entry(dataset_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(TrainingError::DatasetNotFound(dataset_id))?;
        let records = self.store.records_for_dataset(dataset_id, true).await?;
        let required = self.config.training.min_active_records;
        if records.len() < required {
            info!(
                dataset = %dataset.name,
                active_records = records.len(),
                required,
                "Training skipped: not enough active records"
            );
            IntelMetrics::global()
                .training_skipped
                .with_label_values(&[&dataset.name, "insufficient_data"])
                .inc();
            return Ok(TrainOutcome::InsufficientData {
                active_records: records.len(),
                required,
            });
        }

        let started = Instant::now();
        let trained = match train_model(&records, self.config.training.train_ratio) {
            TrainResult::Trained(trained) => trained,
            TrainResult::Insufficient { records, required } => {
                IntelMetrics::global()
                    .training_skipped
                    .with_label_values(&[&dataset.name, "insufficient_data"])
                    .inc();
                return Ok(TrainOutcome::InsufficientData { active_records: records, required });
            }
        };

        let now = Utc::now();
        let model = PatternModel {
            id: Uuid::new_v4(),
            dataset_id,
            coefficients: trained.coefficients,
            intercept: trained.intercept,
            feature_names: trained.feature_names,
            r_squared: trained.metrics.r_squared,
            mean_absolute_error: trained.metrics.mean_absolute_error,
            tier_accuracy: trained.metrics.tier_accuracy,
            directional_accuracy: trained.metrics.directional_accuracy,
            train_sample_count: trained.metrics.train_sample_count,
            test_sample_count: trained.metrics.test_sample_count,
            status: ModelStatus::Active,
            trained_at: now,
        };

        if let Some(previous) = self.store.latest_model(dataset_id).await? {
            self.store.set_model_status(previous.id, ModelStatus::Superseded).await?;
            debug!(dataset = %dataset.name, superseded = %previous.id, "Previous model superseded");
        }
        self.store.insert_model(model.clone()).await?;
        self.store.set_dataset_trained(dataset_id, now).await?;
        self.model_cache.insert(dataset_id, Arc::new(model.clone())).await;

        let metrics = IntelMetrics::global();
        metrics.models_trained.with_label_values(&[&dataset.name]).inc();
        metrics
            .training_duration_ms
            .with_label_values(&[&dataset.name])
            .observe(started.elapsed().as_millis() as f64);
        info!(
            dataset = %dataset.name,
            model_id = %model.id,
            r_squared = model.r_squared,
            mae = model.mean_absolute_error,
            train_samples = model.train_sample_count,
            test_samples = model.test_sample_count,
            "Model trained"
        );
        Ok(TrainOutcome::Trained(model))
    }

    /// The active model for a dataset, served from cache when fresh.
    pub async fn active_model(&self, dataset_id: Uuid) -> Result<Option<Arc<PatternModel>>, IntelError> {
        if let Some(model) = self.model_cache.get(&dataset_id).await {
            return Ok(Some(model));
        }
        match self.store.latest_model(dataset_id).await? {
            Some(model) => {
                let model = Arc::new(model);
                self.model_cache.insert(dataset_id, model.clone()).await;
                Ok(Some(model))
            }
            None => Ok(None),
        }
    }

    //============================================================================================//
    //                                 PREDICTION AND VALIDATION                                  //
    //============================================================================================//

    /// Predict the target for a raw payload and persist a locked, hash-signed
    /// snapshot of exactly what the model saw and said.
    #[instrument(skip(self, raw), fields(dataset_id = %dataset_id))]
    pub async fn predict(
        &self,
        dataset_id: Uuid,
        raw: &serde_json::Value,
    ) -> Result<Prediction, IntelError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(PredictionError::DatasetNotFound(dataset_id))?;
        let model = self
            .active_model(dataset_id)
            .await?
            .ok_or(PredictionError::NoModelFound(dataset_id))?;
        let adapter = self
            .features
            .read()
            .await
            .get(&dataset.dataset_type)
            .ok_or_else(|| RegistryError::UnknownDatasetType(dataset.dataset_type.clone()))?;

        // Normalize against the distribution of the current active records, the
        // same population the model was trained on.
        let extracted = adapter.extract(raw);
        let records = self.store.records_for_dataset(dataset_id, true).await?;
        let rows: Vec<FeatureMap> = records
            .iter()
            .map(|record| adapter.extract(&record.raw_payload).features)
            .collect();
        let stats = compute_feature_stats(&rows);
        let feature_vector = normalize_features(&extracted.features, &stats);

        let predicted_value = predict_value(
            &model.coefficients,
            model.intercept,
            &model.feature_names,
            &feature_vector,
        );
        let predicted_tier = classify_tier(predicted_value);
        let confidence = model.r_squared.clamp(0.0, 1.0);

        let now = Utc::now();
        let snap = snapshot::build_snapshot(
            dataset_id,
            &model,
            feature_vector,
            predicted_value,
            predicted_tier,
            confidence,
            now,
        );
        self.store.insert_snapshot(snap.clone()).await?;

        IntelMetrics::global()
            .predictions_made
            .with_label_values(&[&dataset.name, predicted_tier.as_str()])
            .inc();
        debug!(
            dataset = %dataset.name,
            snapshot_id = %snap.id,
            predicted = predicted_value,
            tier = %predicted_tier,
            confidence,
            "Prediction issued"
        );
        Ok(Prediction {
            snapshot_id: snap.id,
            model_id: model.id,
            predicted_value,
            predicted_tier,
            confidence,
        })
    }

    /// Mark a snapshot as acted on: delivery is confirmed and outcome tracking
    /// starts. The signed payload is untouched.
    pub async fn confirm_upload(&self, snapshot_id: Uuid) -> Result<ModelSnapshot, IntelError> {
        let snap = self
            .store
            .confirm_snapshot_upload(snapshot_id)
            .await?
            .ok_or(PredictionError::SnapshotNotFound(snapshot_id))?;
        debug!(%snapshot_id, "Snapshot upload confirmed");
        Ok(snap)
    }

    /// Recompute a snapshot's signature and compare it to the stored one.
    pub async fn verify_snapshot_signature(&self, snapshot_id: Uuid) -> Result<bool, IntelError> {
        let snap = self
            .store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or(PredictionError::SnapshotNotFound(snapshot_id))?;
        Ok(snapshot::verify_snapshot(&snap))
    }

    /// Record the actual outcome for a snapshot, exactly once.
    ///
    /// The signature is re-verified first; a snapshot that fails verification
    /// cannot be validated, since its recorded prediction is untrustworthy.
    pub async fn validate(
        &self,
        snapshot_id: Uuid,
        actual_value: f64,
    ) -> Result<PredictionLog, IntelError> {
        let snap = self
            .store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or(PredictionError::SnapshotNotFound(snapshot_id))?;
        if !snapshot::verify_snapshot(&snap) {
            warn!(%snapshot_id, "Snapshot failed signature verification at validation time");
            return Err(PredictionError::SignatureMismatch {
                snapshot_id,
                details: "stored signature does not match recomputed signature".to_string(),
            }
            .into());
        }

        let log = snapshot::validate_snapshot(&snap, actual_value, Utc::now());
        if !self.store.insert_prediction_log(log.clone()).await? {
            return Err(PredictionError::AlreadyValidated(snapshot_id).into());
        }

        let dataset_name = self
            .store
            .get_dataset(snap.dataset_id)
            .await?
            .map(|d| d.name)
            .unwrap_or_else(|| "unknown".to_string());
        let metrics = IntelMetrics::global();
        metrics
            .validations_recorded
            .with_label_values(&[
                &dataset_name,
                if log.directionally_correct { "true" } else { "false" },
            ])
            .inc();

        let window = self.config.training.rolling_accuracy_window;
        let recent = self.store.recent_logs(snap.dataset_id, window).await?;
        let rolling = snapshot::rolling_accuracy(&recent, window);
        metrics
            .rolling_directional_accuracy
            .with_label_values(&[&dataset_name])
            .set((rolling.directional_accuracy * 100.0).round() as i64);

        info!(
            dataset = %dataset_name,
            %snapshot_id,
            predicted = log.predicted_value,
            actual = log.actual_value,
            abs_error = log.absolute_error,
            "Prediction validated"
        );
        Ok(log)
    }

    /// Rolling accuracy over the dataset's most recent validated predictions.
    pub async fn rolling_accuracy(&self, dataset_id: Uuid) -> Result<RollingAccuracy, IntelError> {
        self.store
            .get_dataset(dataset_id)
            .await?
            .ok_or(PredictionError::DatasetNotFound(dataset_id))?;
        let window = self.config.training.rolling_accuracy_window;
        let logs = self.store.recent_logs(dataset_id, window).await?;
        Ok(snapshot::rolling_accuracy(&logs, window))
    }

    //============================================================================================//
    //                                  DRIFT AND MODEL HEALTH                                    //
    //============================================================================================//

    /// Run the drift rules over the dataset's recent validations.
    pub async fn drift_status(&self, dataset_id: Uuid) -> Result<DriftStatus, IntelError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(PredictionError::DatasetNotFound(dataset_id))?;
        let window = self.config.training.drift_window;
        let logs = self.store.recent_logs(dataset_id, window).await?;
        let status = drift::detect_drift(&logs, window);

        IntelMetrics::global()
            .drift_checks
            .with_label_values(&[&dataset.name, status.severity.as_str()])
            .inc();
        if status.detected() {
            warn!(
                dataset = %dataset.name,
                severity = status.severity.as_str(),
                trigger = ?status.trigger,
                "Drift detected"
            );
        }
        Ok(status)
    }

    /// Retirement check followed by drift evaluation for the active model.
    /// A model that crosses the retirement threshold is pulled from service here.
    pub async fn model_health(&self, dataset_id: Uuid) -> Result<ModelHealth, IntelError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(PredictionError::DatasetNotFound(dataset_id))?;
        let model = self
            .active_model(dataset_id)
            .await?
            .ok_or(PredictionError::NoModelFound(dataset_id))?;

        let logs = self.store.logs_for_model(model.id).await?;
        let retirement = drift::check_pattern_retirement(&logs);
        if retirement.should_retire {
            self.store.set_model_status(model.id, ModelStatus::Retired).await?;
            self.model_cache.invalidate(&dataset_id).await;
            IntelMetrics::global()
                .models_retired
                .with_label_values(&[&dataset.name])
                .inc();
            warn!(
                dataset = %dataset.name,
                model_id = %model.id,
                sigma = retirement.underperformance_sigma,
                samples = retirement.sample_count,
                "Model retired for sustained underperformance"
            );
            return Ok(ModelHealth::Retired {
                model_id: model.id,
                underperformance_sigma: retirement.underperformance_sigma,
            });
        }

        let drift = drift::detect_drift(&logs, self.config.training.drift_window);
        Ok(ModelHealth::Live { model_id: model.id, drift })
    }

    //============================================================================================//
    //                                    SIGNALS AND AMI                                         //
    //============================================================================================//

    /// Fetch one observation from a named source, subject to rate limiting.
    pub async fn fetch_signal(
        &self,
        source_name: &str,
        keyword: &str,
    ) -> Result<FetchOutcome, IntelError> {
        self.signals.fetch_one(source_name, keyword).await
    }

    /// Fetch a keyword across every registered source.
    pub async fn fetch_all_signals(&self, keyword: &str) -> Result<Vec<FetchOutcome>, IntelError> {
        self.signals.fetch_all(keyword).await
    }

    /// Composite attention migration index for a keyword.
    ///
    /// Each layer's score is the mean attention density of the latest
    /// observation per source reporting into that layer.
    pub async fn ami(&self, keyword: &str) -> Result<AmiScore, IntelError> {
        let signals = self.store.signals_for_keyword(keyword).await?;
        if signals.is_empty() {
            return Err(CorrelationError::NoHistory(keyword.to_string()).into());
        }

        // Ascending order means a plain overwrite leaves the latest per source.
        let mut latest_per_source: std::collections::HashMap<String, (AttentionLayer, f64)> =
            std::collections::HashMap::new();
        for signal in &signals {
            latest_per_source.insert(
                signal.source.clone(),
                (signal.layer, signal.features.attention_density_score),
            );
        }
        let mut by_layer: std::collections::BTreeMap<AttentionLayer, Vec<f64>> =
            std::collections::BTreeMap::new();
        for (layer, density) in latest_per_source.into_values() {
            by_layer.entry(layer).or_default().push(density);
        }
        let layer_scores = by_layer
            .into_iter()
            .map(|(layer, densities)| (layer, crate::stats::mean(&densities)))
            .collect();

        let score = correlation::build_ami_score(keyword, layer_scores, Utc::now());
        debug!(
            keyword,
            score = score.score,
            stage = %score.stage,
            confidence = score.confidence,
            "AMI computed"
        );
        Ok(score)
    }

    /// Scan adjacent attention layers for lagged correlations and persist every
    /// pattern found.
    pub async fn detect_correlations(
        &self,
        keyword: &str,
    ) -> Result<Vec<CrossLayerPattern>, IntelError> {
        let signals = self.store.signals_for_keyword(keyword).await?;
        if signals.is_empty() {
            return Err(CorrelationError::NoHistory(keyword.to_string()).into());
        }

        let mut series_by_layer: std::collections::BTreeMap<AttentionLayer, Vec<SeriesPoint>> =
            std::collections::BTreeMap::new();
        for signal in &signals {
            series_by_layer.entry(signal.layer).or_default().push(SeriesPoint {
                at: signal.fetched_at,
                value: signal.features.attention_density_score,
            });
        }

        let patterns = correlation::cross_layer_patterns(
            keyword,
            &series_by_layer,
            self.config.signals.max_lag_days,
            self.config.signals.full_confidence_samples,
            Utc::now(),
        );
        for pattern in &patterns {
            self.store.upsert_cross_layer_pattern(pattern.clone()).await?;
        }
        info!(keyword, patterns = patterns.len(), "Cross-layer correlation scan finished");
        Ok(patterns)
    }

    //============================================================================================//
    //                                EXPLORATION AND OPTIMIZATION                                //
    //============================================================================================//

    /// Assign a candidate feature set to the exploration or exploitation arm.
    ///
    /// When a keyword is given and has signal history, its migration stage
    /// adjusts the exploration rate; a keyword without history falls back to
    /// the unadjusted base epsilon.
    pub async fn decide_exploration(
        &self,
        dataset_id: Uuid,
        features: &FeatureMap,
        keyword: Option<&str>,
    ) -> Result<ExperimentGroup, IntelError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)
            .await?
            .ok_or(TrainingError::DatasetNotFound(dataset_id))?;

        let stage = match keyword {
            Some(keyword) => match self.ami(keyword).await {
                Ok(score) => Some(score.stage),
                Err(IntelError::Correlation(CorrelationError::NoHistory(_))) => None,
                Err(e) => return Err(e),
            },
            None => None,
        };

        let group = {
            let mut rng = rand::thread_rng();
            explore::decide_exploration(
                dataset_id,
                features,
                self.config.exploration.base_epsilon,
                stage,
                &self.config.exploration.mutation_bounds,
                Utc::now(),
                &mut rng,
            )
        };
        self.store.insert_experiment(group.clone()).await?;

        IntelMetrics::global()
            .experiments_assigned
            .with_label_values(&[&dataset.name, group.arm.as_str()])
            .inc();
        debug!(
            dataset = %dataset.name,
            arm = group.arm.as_str(),
            epsilon = group.mutation_parameters.adjusted_epsilon,
            stage = ?stage,
            mutated = group.mutation_parameters.mutated_features.len(),
            "Experiment arm assigned"
        );
        Ok(group)
    }

    /// Greedy single-feature improvement suggestions against the active model.
    pub async fn optimize(
        &self,
        dataset_id: Uuid,
        features: &FeatureMap,
    ) -> Result<OptimizationResult, IntelError> {
        self.store
            .get_dataset(dataset_id)
            .await?
            .ok_or(PredictionError::DatasetNotFound(dataset_id))?;
        let model = self
            .active_model(dataset_id)
            .await?
            .ok_or(PredictionError::NoModelFound(dataset_id))?;
        Ok(optimize::optimize_features(
            dataset_id,
            &model,
            features,
            self.config.training.optimizer_step_size,
        ))
    }
}

impl std::fmt::Debug for IntelligenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntelligenceEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
