//! # mlwarden
//!
//! Framework-detection and evidence-aggregation engine for AI training and
//! inference workloads, plus the streaming TensorBoard record parser that
//! feeds it hyperparameter evidence.
//!
//! The crate discovers nothing itself and owns no HTTP/K8s/DB surface —
//! those are named external collaborators (see [`interfaces`]). What it
//! does own: a resumable binary record parser, a hyperparameter extractor,
//! an append-only evidence log, a per-source coverage tracker, a weighted
//! multi-source evidence aggregator, a per-workload detection state
//! machine, four pluggable probe executors, and a time-weighted hourly GPU
//! allocation aggregator with a rerunnable backfill driver.
//!
//! ## Quick start
//!
//! ```no_run
//! use mlwarden::evidence::EvidenceStore;
//! use mlwarden::aggregator::Aggregator;
//! use mlwarden::config::AggregatorConfig;
//! use mlwarden::model::detection_state::DetectionState;
//! use chrono::Utc;
//!
//! let store = EvidenceStore::new();
//! let aggregator = Aggregator::new(&AggregatorConfig::default());
//! let now = Utc::now();
//! let state = DetectionState::new("workload-1", now);
//! let outcome = aggregator.aggregate("workload-1", &store, state, now);
//! println!("status: {:?}", outcome.state.status);
//! ```

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod coverage;
pub mod error;
pub mod evidence;
pub mod hourly;
pub mod hparam;
pub mod interfaces;
pub mod model;
pub mod parser;
pub mod probes;

pub use config::Config;
pub use error::{Error, Result};
