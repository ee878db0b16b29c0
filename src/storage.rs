//! # Persistence Layer
//!
//! Storage sits behind the [`IntelStore`] trait so the engine never assumes a
//! backend. The bundled [`MemoryStore`] keeps everything in sharded concurrent
//! maps and is the default for the binary and for tests.
//!
//! Snapshot immutability is enforced at this seam: there is no general snapshot
//! update method. After creation, only the upload-confirmation and
//! performance-tracking flags can change.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::StorageError;
use crate::types::{
    CrossLayerPattern, Dataset, DatasetRecord, ExperimentGroup, ExternalSignal, ModelSnapshot,
    ModelStatus, PatternModel, PredictionLog,
};

#[async_trait]
pub trait IntelStore: Send + Sync + Debug {
    // --- Datasets ---
    async fn insert_dataset(&self, dataset: Dataset) -> Result<(), StorageError>;
    async fn get_dataset(&self, id: Uuid) -> Result<Option<Dataset>, StorageError>;
    async fn set_dataset_trained(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StorageError>;

    // --- Records ---
    async fn insert_record(&self, record: DatasetRecord) -> Result<(), StorageError>;
    /// Records for a dataset in insertion order. `active_only` applies the
    /// soft-exclusion filter used by training.
    async fn records_for_dataset(
        &self,
        dataset_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<DatasetRecord>, StorageError>;
    /// Returns false when the record does not exist.
    async fn set_record_active(&self, record_id: Uuid, active: bool) -> Result<bool, StorageError>;

    // --- Models ---
    async fn insert_model(&self, model: PatternModel) -> Result<(), StorageError>;
    async fn get_model(&self, id: Uuid) -> Result<Option<PatternModel>, StorageError>;
    /// The most recently trained model still in `Active` status, if any.
    async fn latest_model(&self, dataset_id: Uuid) -> Result<Option<PatternModel>, StorageError>;
    async fn set_model_status(&self, id: Uuid, status: ModelStatus) -> Result<bool, StorageError>;

    // --- Snapshots ---
    async fn insert_snapshot(&self, snapshot: ModelSnapshot) -> Result<(), StorageError>;
    async fn get_snapshot(&self, id: Uuid) -> Result<Option<ModelSnapshot>, StorageError>;
    /// Flips `upload_confirmed` and `performance_tracking_started`, the only
    /// mutable fields on a stored snapshot. Returns the updated snapshot, or
    /// `None` if absent.
    async fn confirm_snapshot_upload(
        &self,
        id: Uuid,
    ) -> Result<Option<ModelSnapshot>, StorageError>;

    // --- Prediction logs ---
    /// Inserts the one permanent accuracy record for a snapshot. Returns false
    /// without writing when a log already exists for that snapshot.
    async fn insert_prediction_log(&self, log: PredictionLog) -> Result<bool, StorageError>;
    async fn log_for_snapshot(
        &self,
        snapshot_id: Uuid,
    ) -> Result<Option<PredictionLog>, StorageError>;
    /// Most recent validations first, at most `limit`.
    async fn recent_logs(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionLog>, StorageError>;
    /// All validations against one model, most recent first.
    async fn logs_for_model(&self, model_id: Uuid) -> Result<Vec<PredictionLog>, StorageError>;

    // --- External signals ---
    async fn insert_signal(&self, signal: ExternalSignal) -> Result<(), StorageError>;
    /// Observations for one (source, keyword), ascending by fetch time.
    async fn signal_history(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Vec<ExternalSignal>, StorageError>;
    /// Every observation for a keyword across all sources, ascending by fetch time.
    async fn signals_for_keyword(&self, keyword: &str)
        -> Result<Vec<ExternalSignal>, StorageError>;

    // --- Cross-layer patterns ---
    /// Replaces any previous pattern for the same (keyword, source, target) layer pair.
    async fn upsert_cross_layer_pattern(
        &self,
        pattern: CrossLayerPattern,
    ) -> Result<(), StorageError>;
    async fn patterns_for_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<CrossLayerPattern>, StorageError>;

    // --- Experiments ---
    async fn insert_experiment(&self, group: ExperimentGroup) -> Result<(), StorageError>;
    async fn experiments_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> Result<Vec<ExperimentGroup>, StorageError>;
}

/// In-memory store backed by sharded concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: DashMap<Uuid, Dataset>,
    records: DashMap<Uuid, Vec<DatasetRecord>>,
    models: DashMap<Uuid, PatternModel>,
    snapshots: DashMap<Uuid, ModelSnapshot>,
    logs_by_snapshot: DashMap<Uuid, PredictionLog>,
    logs_by_dataset: DashMap<Uuid, Vec<PredictionLog>>,
    signals: DashMap<(String, String), Vec<ExternalSignal>>,
    patterns: DashMap<String, Vec<CrossLayerPattern>>,
    experiments: DashMap<Uuid, Vec<ExperimentGroup>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntelStore for MemoryStore {
    async fn insert_dataset(&self, dataset: Dataset) -> Result<(), StorageError> {
        self.datasets.insert(dataset.id, dataset);
        Ok(())
    }

    async fn get_dataset(&self, id: Uuid) -> Result<Option<Dataset>, StorageError> {
        Ok(self.datasets.get(&id).map(|d| d.clone()))
    }

    async fn set_dataset_trained(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StorageError> {
        if let Some(mut dataset) = self.datasets.get_mut(&id) {
            dataset.last_trained_at = Some(at);
        }
        Ok(())
    }

    async fn insert_record(&self, record: DatasetRecord) -> Result<(), StorageError> {
        self.records.entry(record.dataset_id).or_default().push(record);
        Ok(())
    }

    async fn records_for_dataset(
        &self,
        dataset_id: Uuid,
        active_only: bool,
    ) -> Result<Vec<DatasetRecord>, StorageError> {
        let records = match self.records.get(&dataset_id) {
            Some(records) => records
                .iter()
                .filter(|r| !active_only || r.is_active)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        Ok(records)
    }

    async fn set_record_active(&self, record_id: Uuid, active: bool) -> Result<bool, StorageError> {
        for mut records in self.records.iter_mut() {
            if let Some(record) = records.value_mut().iter_mut().find(|r| r.id == record_id) {
                record.is_active = active;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn insert_model(&self, model: PatternModel) -> Result<(), StorageError> {
        self.models.insert(model.id, model);
        Ok(())
    }

    async fn get_model(&self, id: Uuid) -> Result<Option<PatternModel>, StorageError> {
        Ok(self.models.get(&id).map(|m| m.clone()))
    }

    async fn latest_model(&self, dataset_id: Uuid) -> Result<Option<PatternModel>, StorageError> {
        let latest = self
            .models
            .iter()
            .filter(|m| m.dataset_id == dataset_id && m.status == ModelStatus::Active)
            .max_by_key(|m| m.trained_at)
            .map(|m| m.clone());
        Ok(latest)
    }

    async fn set_model_status(&self, id: Uuid, status: ModelStatus) -> Result<bool, StorageError> {
        match self.models.get_mut(&id) {
            Some(mut model) => {
                model.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_snapshot(&self, snapshot: ModelSnapshot) -> Result<(), StorageError> {
        self.snapshots.insert(snapshot.id, snapshot);
        Ok(())
    }

    async fn get_snapshot(&self, id: Uuid) -> Result<Option<ModelSnapshot>, StorageError> {
        Ok(self.snapshots.get(&id).map(|s| s.clone()))
    }

    async fn confirm_snapshot_upload(
        &self,
        id: Uuid,
    ) -> Result<Option<ModelSnapshot>, StorageError> {
        match self.snapshots.get_mut(&id) {
            Some(mut snapshot) => {
                snapshot.upload_confirmed = true;
                snapshot.performance_tracking_started = true;
                Ok(Some(snapshot.clone()))
            }
            None => Ok(None),
        }
    }

    async fn insert_prediction_log(&self, log: PredictionLog) -> Result<bool, StorageError> {
        // Entry API keeps the exactly-once guarantee atomic under concurrent
        // validation of the same snapshot.
        match self.logs_by_snapshot.entry(log.snapshot_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(vacant) => {
                vacant.insert(log.clone());
                self.logs_by_dataset.entry(log.dataset_id).or_default().push(log);
                Ok(true)
            }
        }
    }

    async fn log_for_snapshot(
        &self,
        snapshot_id: Uuid,
    ) -> Result<Option<PredictionLog>, StorageError> {
        Ok(self.logs_by_snapshot.get(&snapshot_id).map(|l| l.clone()))
    }

    async fn recent_logs(
        &self,
        dataset_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionLog>, StorageError> {
        let mut logs = match self.logs_by_dataset.get(&dataset_id) {
            Some(logs) => logs.clone(),
            None => Vec::new(),
        };
        logs.sort_by(|a, b| b.validated_at.cmp(&a.validated_at));
        logs.truncate(limit);
        Ok(logs)
    }

    async fn logs_for_model(&self, model_id: Uuid) -> Result<Vec<PredictionLog>, StorageError> {
        let mut logs: Vec<PredictionLog> = self
            .logs_by_snapshot
            .iter()
            .filter(|l| l.model_id == model_id)
            .map(|l| l.clone())
            .collect();
        logs.sort_by(|a, b| b.validated_at.cmp(&a.validated_at));
        Ok(logs)
    }

    async fn insert_signal(&self, signal: ExternalSignal) -> Result<(), StorageError> {
        let key = (signal.source.clone(), signal.keyword.clone());
        self.signals.entry(key).or_default().push(signal);
        Ok(())
    }

    async fn signal_history(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Vec<ExternalSignal>, StorageError> {
        let key = (source.to_string(), keyword.to_string());
        let mut history = match self.signals.get(&key) {
            Some(signals) => signals.clone(),
            None => Vec::new(),
        };
        history.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at));
        Ok(history)
    }

    async fn signals_for_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<ExternalSignal>, StorageError> {
        let mut out: Vec<ExternalSignal> = self
            .signals
            .iter()
            .filter(|entry| entry.key().1 == keyword)
            .flat_map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at));
        Ok(out)
    }

    async fn upsert_cross_layer_pattern(
        &self,
        pattern: CrossLayerPattern,
    ) -> Result<(), StorageError> {
        let mut patterns = self.patterns.entry(pattern.keyword.clone()).or_default();
        patterns.retain(|p| {
            !(p.source_layer == pattern.source_layer && p.target_layer == pattern.target_layer)
        });
        patterns.push(pattern);
        Ok(())
    }

    async fn patterns_for_keyword(
        &self,
        keyword: &str,
    ) -> Result<Vec<CrossLayerPattern>, StorageError> {
        let mut patterns = match self.patterns.get(keyword) {
            Some(patterns) => patterns.clone(),
            None => Vec::new(),
        };
        patterns.sort_by_key(|p| (p.source_layer, p.target_layer));
        Ok(patterns)
    }

    async fn insert_experiment(&self, group: ExperimentGroup) -> Result<(), StorageError> {
        self.experiments.entry(group.dataset_id).or_default().push(group);
        Ok(())
    }

    async fn experiments_for_dataset(
        &self,
        dataset_id: Uuid,
    ) -> Result<Vec<ExperimentGroup>, StorageError> {
        let groups = match self.experiments.get(&dataset_id) {
            Some(groups) => groups.clone(),
            None => Vec::new(),
        };
        Ok(groups)
    }
}
