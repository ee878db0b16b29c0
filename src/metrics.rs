//! # Global Metrics Registry
//!
//! This module defines and registers all Prometheus metrics for the intelligence
//! core. Centralizing metric definitions keeps naming consistent and gives a
//! single point of reference for the observability surface.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info};
use warp::Filter;
use warp::Reply;

/// Metrics for the intelligence engine, encapsulating all counters and histograms.
#[derive(Clone)]
pub struct IntelMetrics {
    pub models_trained: &'static IntCounterVec,
    pub training_skipped: &'static IntCounterVec,
    pub predictions_made: &'static IntCounterVec,
    pub validations_recorded: &'static IntCounterVec,
    pub drift_checks: &'static IntCounterVec,
    pub models_retired: &'static IntCounterVec,
    pub signals_fetched: &'static IntCounterVec,
    pub experiments_assigned: &'static IntCounterVec,
    pub training_duration_ms: &'static HistogramVec,
    pub rolling_directional_accuracy: &'static IntGaugeVec,
}

impl IntelMetrics {
    /// Returns a reference to the global metrics registry for the engine.
    pub fn global() -> &'static Self {
        static INSTANCE: Lazy<IntelMetrics> = Lazy::new(|| IntelMetrics {
            models_trained: &MODELS_TRAINED,
            training_skipped: &TRAINING_SKIPPED,
            predictions_made: &PREDICTIONS_MADE,
            validations_recorded: &VALIDATIONS_RECORDED,
            drift_checks: &DRIFT_CHECKS,
            models_retired: &MODELS_RETIRED,
            signals_fetched: &SIGNALS_FETCHED,
            experiments_assigned: &EXPERIMENTS_ASSIGNED,
            training_duration_ms: &TRAINING_DURATION_MS,
            rolling_directional_accuracy: &ROLLING_DIRECTIONAL_ACCURACY,
        });
        &INSTANCE
    }
}

impl std::fmt::Debug for IntelMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntelMetrics").finish_non_exhaustive()
    }
}

// --- Training & Prediction Metrics ---
pub static MODELS_TRAINED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_models_trained_total",
        "Number of models successfully trained.",
        &["dataset"]
    ).expect("Failed to register intel_models_trained_total")
});
pub static TRAINING_SKIPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_training_skipped_total",
        "Training passes skipped, labeled by reason.",
        &["dataset", "reason"]
    ).expect("Failed to register intel_training_skipped_total")
});
pub static PREDICTIONS_MADE: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_predictions_total",
        "Prediction snapshots created, labeled by predicted tier.",
        &["dataset", "tier"]
    ).expect("Failed to register intel_predictions_total")
});
pub static VALIDATIONS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_validations_total",
        "Prediction validations recorded, labeled by directional correctness.",
        &["dataset", "directional"]
    ).expect("Failed to register intel_validations_total")
});
pub static TRAINING_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "intel_training_duration_ms",
        "Wall-clock duration of training passes in milliseconds.",
        &["dataset"]
    ).expect("Failed to register intel_training_duration_ms")
});

// --- Model Health Metrics ---
pub static DRIFT_CHECKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_drift_checks_total",
        "Drift evaluations performed, labeled by resulting severity.",
        &["dataset", "severity"]
    ).expect("Failed to register intel_drift_checks_total")
});
pub static MODELS_RETIRED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_models_retired_total",
        "Models pulled from service after sustained underperformance.",
        &["dataset"]
    ).expect("Failed to register intel_models_retired_total")
});
pub static ROLLING_DIRECTIONAL_ACCURACY: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "intel_rolling_directional_accuracy_pct",
        "Most recently computed rolling directional accuracy, in percent.",
        &["dataset"]
    ).expect("Failed to register intel_rolling_directional_accuracy_pct")
});

// --- Signal Ingestion Metrics ---
pub static SIGNALS_FETCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_signals_fetched_total",
        "Signal fetch attempts, labeled by source and outcome.",
        &["source", "outcome"]
    ).expect("Failed to register intel_signals_fetched_total")
});

// --- Exploration Metrics ---
pub static EXPERIMENTS_ASSIGNED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "intel_experiments_assigned_total",
        "Epsilon-greedy assignments, labeled by arm.",
        &["dataset", "arm"]
    ).expect("Failed to register intel_experiments_assigned_total")
});

/// Starts the Prometheus metrics server on a separate Tokio task.
pub fn start_metrics_server(host: String, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr: SocketAddr = match format!("{}:{}", host, port).parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!(target: "metrics", "Invalid metrics server address {}:{}: {}", host, port, e);
                return;
            }
        };

        info!(target: "metrics", "Prometheus metrics server starting on http://{}", addr);

        let metrics_route = warp::path("metrics").and_then(metrics_handler);
        warp::serve(metrics_route).run(addr).await;
    })
}

/// Warp handler function to collect and encode metrics for Prometheus.
async fn metrics_handler() -> Result<warp::reply::Response, warp::Rejection> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(target: "metrics", "Failed to encode metrics: {}", e);
        let response = warp::reply::with_status(
            "Failed to encode metrics".to_string(),
            warp::http::StatusCode::INTERNAL_SERVER_ERROR,
        );
        return Ok(response.into_response());
    }

    let response = warp::reply::with_header(
        String::from_utf8_lossy(&buffer).to_string(),
        "Content-Type",
        encoder.format_type(),
    );
    Ok(response.into_response())
}
