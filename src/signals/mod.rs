//! # Attention Signal Ingestion
//!
//! Pluggable external signal sources arranged across the attention layers.
//! Sources implement [`SignalSource`] and register with the [`SignalIngestor`],
//! which enforces per-(source, keyword) rate limits, bounds fetch concurrency,
//! derives the uniform feature block for every observation, and persists the
//! result. A throttled or failed fetch is an expected outcome, not an error;
//! only addressing an unregistered source is a hard failure.

pub mod normalize;
pub mod sources;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{IntelError, RegistryError, SignalError};
use crate::metrics::IntelMetrics;
use crate::storage::IntelStore;
use crate::types::{AttentionLayer, ExternalSignal, FetchOutcome, SignalFeatures, UpdateFrequency};

//================================================================================================//
//                                        SOURCE TRAIT                                            //
//================================================================================================//

/// A single raw observation returned by a source, before feature derivation.
#[derive(Debug, Clone)]
pub struct RawObservation {
    /// Source-specific scalar (mention count, interest index, listing count).
    pub value: f64,
    /// Untouched provider payload, kept for auditing.
    pub payload: Value,
    /// True when the source synthesized the observation instead of calling out.
    pub is_mock: bool,
}

/// One external attention data provider.
#[async_trait]
pub trait SignalSource: Send + Sync + fmt::Debug {
    /// Stable identifier used for registry lookup, rate limiting, and storage.
    fn name(&self) -> &'static str;

    /// Attention layer this source observes.
    fn layer(&self) -> AttentionLayer;

    /// How often the source permits a fresh fetch per keyword.
    fn update_frequency(&self) -> UpdateFrequency;

    /// Fetch one observation for a keyword.
    async fn fetch(&self, keyword: &str) -> Result<RawObservation, SignalError>;

    /// Derive the feature block for the newest point of an ascending series.
    /// Sources whose raw series needs bespoke treatment can override this; the
    /// output must keep the shared shape and scale.
    fn derive_features(&self, points: &[(DateTime<Utc>, f64)]) -> SignalFeatures {
        normalize::derive_features(points)
    }
}

//================================================================================================//
//                                       SOURCE REGISTRY                                          //
//================================================================================================//

/// Name-keyed set of registered sources. Re-registering a name replaces the
/// previous source.
#[derive(Debug, Default)]
pub struct SignalRegistry {
    sources: std::collections::HashMap<String, Arc<dyn SignalSource>>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn SignalSource>) {
        let name = source.name().to_string();
        if self.sources.insert(name.clone(), source).is_some() {
            warn!(source = %name, "Replacing previously registered signal source");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SignalSource>> {
        self.sources.get(name).cloned()
    }

    /// Registered source names, sorted for deterministic iteration.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, layer) for every registered source, sorted by name.
    pub fn layers(&self) -> Vec<(String, AttentionLayer)> {
        let mut layers: Vec<(String, AttentionLayer)> = self
            .sources
            .iter()
            .map(|(name, source)| (name.clone(), source.layer()))
            .collect();
        layers.sort_by(|a, b| a.0.cmp(&b.0));
        layers
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

//================================================================================================//
//                                        RATE LIMITER                                            //
//================================================================================================//

/// Outcome of asking the limiter for a fetch slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// Slot granted. `previous` restores the old timestamp if the fetch fails.
    Granted { previous: Option<DateTime<Utc>> },
    /// Still inside the source's update interval.
    Denied { next_allowed_at: DateTime<Utc> },
}

/// Per-(source, keyword) fetch throttle.
///
/// A reservation is taken before the fetch runs, so concurrent callers for the
/// same pair cannot both pass the window check. The entry API makes the
/// check-and-stamp atomic per key.
#[derive(Debug, Default)]
pub struct SignalRateLimiter {
    last_fetch: DashMap<(String, String), DateTime<Utc>>,
}

impl SignalRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fetch slot at `now`, denying if the last fetch for the pair is
    /// still inside `interval`.
    pub fn try_reserve(
        &self,
        source: &str,
        keyword: &str,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Reservation {
        let key = (source.to_string(), keyword.to_string());
        match self.last_fetch.entry(key) {
            Entry::Occupied(mut occupied) => {
                let last = *occupied.get();
                if now - last < interval {
                    Reservation::Denied { next_allowed_at: last + interval }
                } else {
                    occupied.insert(now);
                    Reservation::Granted { previous: Some(last) }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                Reservation::Granted { previous: None }
            }
        }
    }

    /// Roll back a granted reservation after a failed fetch so the pair is not
    /// locked out for a full interval by a transient error.
    pub fn release(&self, source: &str, keyword: &str, previous: Option<DateTime<Utc>>) {
        let key = (source.to_string(), keyword.to_string());
        match previous {
            Some(last) => {
                self.last_fetch.insert(key, last);
            }
            None => {
                self.last_fetch.remove(&key);
            }
        }
    }
}

//================================================================================================//
//                                          INGESTOR                                              //
//================================================================================================//

/// Coordinates registered sources: throttling, bounded concurrency, feature
/// derivation, and persistence.
#[derive(Debug)]
pub struct SignalIngestor {
    registry: RwLock<SignalRegistry>,
    limiter: SignalRateLimiter,
    store: Arc<dyn IntelStore>,
    fetch_permits: Arc<Semaphore>,
}

impl SignalIngestor {
    pub fn new(store: Arc<dyn IntelStore>, max_concurrent_fetches: usize) -> Self {
        Self {
            registry: RwLock::new(SignalRegistry::new()),
            limiter: SignalRateLimiter::new(),
            store,
            fetch_permits: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
        }
    }

    pub async fn register_source(&self, source: Arc<dyn SignalSource>) {
        self.registry.write().await.register(source);
    }

    pub async fn source_names(&self) -> Vec<String> {
        self.registry.read().await.names()
    }

    /// (name, layer) for every registered source.
    pub async fn source_layers(&self) -> Vec<(String, AttentionLayer)> {
        self.registry.read().await.layers()
    }

    /// Fetch one observation from a named source.
    ///
    /// Returns `Err` only when the source name is not registered. Throttling and
    /// provider failures surface as [`FetchOutcome`] variants.
    pub async fn fetch_one(&self, source_name: &str, keyword: &str) -> Result<FetchOutcome, IntelError> {
        let source = self
            .registry
            .read()
            .await
            .get(source_name)
            .ok_or_else(|| RegistryError::UnknownSource(source_name.to_string()))?;

        let now = Utc::now();
        let interval = source.update_frequency().interval();
        let previous = match self.limiter.try_reserve(source_name, keyword, interval, now) {
            Reservation::Denied { next_allowed_at } => {
                debug!(source = source_name, keyword, %next_allowed_at, "Signal fetch throttled");
                let outcome = FetchOutcome::RateLimited {
                    source: source_name.to_string(),
                    keyword: keyword.to_string(),
                    next_allowed_at,
                };
                self.record_outcome(&outcome);
                return Ok(outcome);
            }
            Reservation::Granted { previous } => previous,
        };

        let _permit = self
            .fetch_permits
            .acquire()
            .await
            .map_err(|_| IntelError::Other("signal fetch semaphore closed".to_string()))?;

        let raw = match source.fetch(keyword).await {
            Ok(raw) => raw,
            Err(e) => {
                self.limiter.release(source_name, keyword, previous);
                warn!(source = source_name, keyword, error = %e, "Signal fetch failed");
                let outcome = FetchOutcome::Unavailable {
                    source: source_name.to_string(),
                    keyword: keyword.to_string(),
                    reason: e.to_string(),
                };
                self.record_outcome(&outcome);
                return Ok(outcome);
            }
        };

        let history = self.store.signal_history(source_name, keyword).await?;
        let mut points: Vec<(DateTime<Utc>, f64)> =
            history.iter().map(|s| (s.fetched_at, s.value)).collect();
        points.push((now, raw.value));
        let features = source.derive_features(&points);

        let signal = ExternalSignal {
            id: Uuid::new_v4(),
            source: source_name.to_string(),
            layer: source.layer(),
            keyword: keyword.to_string(),
            value: raw.value,
            features,
            raw_payload: raw.payload,
            is_mock: raw.is_mock,
            fetched_at: now,
        };
        self.store.insert_signal(signal.clone()).await?;
        debug!(
            source = source_name,
            keyword,
            value = signal.value,
            density = features.attention_density_score,
            mock = signal.is_mock,
            "Signal ingested"
        );

        let outcome = FetchOutcome::Fetched(signal);
        self.record_outcome(&outcome);
        Ok(outcome)
    }

    /// Fetch a keyword from every registered source. Throttled or failed
    /// sources contribute their outcome and do not stop the rest.
    pub async fn fetch_all(&self, keyword: &str) -> Result<Vec<FetchOutcome>, IntelError> {
        let names = self.source_names().await;
        let fetches = names.iter().map(|name| self.fetch_one(name, keyword));
        let results = futures::future::join_all(fetches).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            outcomes.push(result?);
        }
        Ok(outcomes)
    }

    fn record_outcome(&self, outcome: &FetchOutcome) {
        IntelMetrics::global()
            .signals_fetched
            .with_label_values(&[outcome.source(), outcome.label()])
            .inc();
    }
}
