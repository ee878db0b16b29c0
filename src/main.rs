//! Service entry point.
//!
//! 1. Parse CLI flags, load configuration, initialise tracing.
//! 2. Build the in-memory store and the intelligence engine, register the
//!    content-performance feature adapter and the built-in signal sources.
//! 3. Expose Prometheus metrics and run the periodic signal ingestion sweep
//!    over the configured tracked keywords.
//! 4. Graceful shutdown on Ctrl-C via a cancellation token.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use trend_intel::config::Config;
use trend_intel::engine::IntelligenceEngine;
use trend_intel::errors::IntelError;
use trend_intel::features::content_performance_adapter;
use trend_intel::metrics::start_metrics_server;
use trend_intel::signals::sources::builtin_sources;
use trend_intel::storage::MemoryStore;

#[derive(Debug, Parser)]
#[command(name = "trend-intel", version, about = "Predictive modeling and attention signal engine")]
struct Cli {
    /// Path to a JSON configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), IntelError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .await
            .map_err(|e| IntelError::Config(format!("{e:#}")))?,
        None => Config::default(),
    };
    let config = Arc::new(config);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("trend_intel={},warp=warn", config.log_level))
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting trend intelligence service");

    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(IntelligenceEngine::new(config.clone(), store));

    engine
        .register_dataset_type("content_performance", Arc::new(content_performance_adapter()))
        .await;
    for source in builtin_sources(&config) {
        engine.register_signal_source(source).await;
    }
    info!(sources = ?engine.signal_sources().await, "Signal sources registered");

    let metrics_handle = if config.metrics.enabled {
        Some(start_metrics_server(config.metrics.host.clone(), config.metrics.port))
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let ingest_handle = spawn_ingest_loop(engine.clone(), config.clone(), shutdown.clone());

    tokio::select! {
        _ = signal::ctrl_c() => info!("SIGINT - shutting down"),
    }

    shutdown.cancel();
    if let Err(e) = ingest_handle.await {
        warn!(error = %e, "Ingestion task did not shut down cleanly");
    }
    if let Some(handle) = metrics_handle {
        handle.abort();
    }
    info!("Shutdown complete");
    Ok(())
}

/// Periodically sweep every tracked keyword across all registered sources,
/// then refresh its cross-layer patterns and migration index.
fn spawn_ingest_loop(
    engine: Arc<IntelligenceEngine>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if config.tracked_keywords.is_empty() {
            info!("No tracked keywords configured; signal ingestion idle");
            shutdown.cancelled().await;
            return;
        }

        let mut interval =
            tokio::time::interval(Duration::from_secs(config.signals.ingest_interval_seconds));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Signal ingestion loop stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            for keyword in &config.tracked_keywords {
                match engine.fetch_all_signals(keyword).await {
                    Ok(outcomes) => {
                        let fetched = outcomes.iter().filter(|o| o.signal().is_some()).count();
                        debug!(keyword, fetched, total = outcomes.len(), "Signal sweep finished");
                    }
                    Err(e) => {
                        warn!(keyword, error = %e, "Signal sweep failed");
                        continue;
                    }
                }

                match engine.detect_correlations(keyword).await {
                    Ok(patterns) if !patterns.is_empty() => {
                        info!(keyword, patterns = patterns.len(), "Cross-layer patterns updated");
                    }
                    Ok(_) => {}
                    Err(e) => debug!(keyword, error = %e, "Correlation scan skipped"),
                }

                match engine.ami(keyword).await {
                    Ok(score) => {
                        info!(
                            keyword,
                            ami = score.score,
                            stage = %score.stage,
                            confidence = score.confidence,
                            "Attention migration index refreshed"
                        );
                    }
                    Err(e) => debug!(keyword, error = %e, "AMI unavailable"),
                }
            }
        }
    })
}
