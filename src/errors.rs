//! # Centralized Error Handling
//!
//! This module defines a hierarchical error enum for the whole intelligence core.
//! The top-level [`IntelError`] composes per-domain enums so callers can match on
//! the domain first and the concrete failure second.
//!
//! The taxonomy draws a hard line between *misuse* (unknown dataset, missing model,
//! missing snapshot), which surfaces as an `Err`, and *expected runtime conditions*
//! (insufficient data, rate limiting, degenerate numerics, unreachable sources),
//! which are modeled as ordinary outcome variants and never pass through here.

use thiserror::Error;
use uuid::Uuid;

/// The top-level error type for every fallible operation exposed by the engine.
#[derive(Error, Debug)]
pub enum IntelError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),
    #[error("Prediction error: {0}")]
    Prediction(#[from] PredictionError),
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),
    #[error("Other error: {0}")]
    Other(String),
}

/// Failures raised by the persistence layer itself, as opposed to entities that
/// are merely absent. Absence is reported as `Ok(None)` by the store and mapped
/// to a domain error by the engine.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Serialization failed: {0}")]
    Serialization(String),
    #[error("Illegal write to locked snapshot {0}")]
    SnapshotLocked(Uuid),
    #[error("Storage backend unavailable: {0}")]
    Backend(String),
}

/// Errors from the feature-adapter and signal-source registries.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No feature adapter registered for dataset type '{0}'")]
    UnknownDatasetType(String),
    #[error("No signal source registered under name '{0}'")]
    UnknownSource(String),
}

/// Errors related to model training and the training pipeline.
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Dataset {0} not found")]
    DatasetNotFound(Uuid),
    #[error("Record {0} not found")]
    RecordNotFound(Uuid),
    #[error("Solver failed: {0}")]
    Solver(String),
}

/// Errors related to prediction, snapshots, and validation.
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Dataset {0} not found")]
    DatasetNotFound(Uuid),
    #[error("No active model for dataset {0}")]
    NoModelFound(Uuid),
    #[error("Snapshot {0} not found")]
    SnapshotNotFound(Uuid),
    #[error("Snapshot {0} was already validated")]
    AlreadyValidated(Uuid),
    #[error("Snapshot {snapshot_id} failed signature verification: {details}")]
    SignatureMismatch { snapshot_id: Uuid, details: String },
}

/// Errors from external signal sources. Note that an unreachable or rate-limited
/// source is *not* an error at the engine surface; these variants describe why a
/// single fetch attempt failed and are folded into a `FetchOutcome` by the caller.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Source '{source_name}' rejected request with status {status}")]
    SourceRejected { source_name: String, status: u16 },
    #[error("Source '{source_name}' returned malformed payload: {details}")]
    MalformedPayload { source_name: String, details: String },
    #[error("Transport failure for source '{source}': {inner}")]
    Transport {
        source: String,
        #[source]
        inner: reqwest::Error,
    },
}

/// Errors from cross-layer correlation analysis.
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("No signal history recorded for keyword '{0}'")]
    NoHistory(String),
}
