//! # Trend Intelligence Core
//!
//! A dataset-agnostic engine for predictive content modeling and attention
//! signal analysis. The crate trains closed-form linear models over normalized
//! feature vectors, issues hash-signed prediction snapshots, validates them
//! against observed outcomes, and watches the resulting accuracy stream for
//! drift and sustained underperformance. Alongside the modeling loop it ingests
//! external attention signals across layered sources, correlates adjacent
//! layers with lag scanning, and condenses them into a composite attention
//! migration index that steers epsilon-greedy exploration.
//!
//! [`engine::IntelligenceEngine`] is the single entry point; everything under
//! it is a pure module the engine sequences against an [`storage::IntelStore`].

pub mod config;
pub mod correlation;
pub mod drift;
pub mod engine;
pub mod errors;
pub mod explore;
pub mod features;
pub mod metrics;
pub mod model;
pub mod optimize;
pub mod signals;
pub mod snapshot;
pub mod stats;
pub mod storage;
pub mod types;

pub use engine::IntelligenceEngine;
pub use errors::IntelError;
pub use storage::{IntelStore, MemoryStore};
