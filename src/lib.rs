//! Emotion Pulse - rate-limited emotion event recording with windowed aggregates.
//!
//! An external face detector and emotion classifier produce one
//! `(label, confidence)` pair per detected face per video frame. This crate
//! decides which of those become durable records and turns the recorded
//! history into the views a classroom mood dashboard shows.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Emotion Pulse                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐            │
//! │  │   Source    │──▶│  Recorder   │──▶│ Event Store │            │
//! │  │ (classifier)│   │ (1 per 60s) │   │  (SQLite)   │            │
//! │  └─────────────┘   └─────────────┘   └─────────────┘            │
//! │                           │                 │                    │
//! │                           ▼                 ▼                    │
//! │                    ┌─────────────┐   ┌─────────────┐            │
//! │                    │Transparency │   │ Aggregation │──▶ sinks   │
//! │                    │    Log      │   │   Engine    │            │
//! │                    └─────────────┘   └─────────────┘            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//! use emotion_pulse::{AggregationConfig, AggregationEngine, Recorder, SqliteEventStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteEventStore::open_in_memory().expect("open store"));
//! let mut recorder = Recorder::new(Arc::clone(&store), Duration::from_secs(60));
//! recorder.consider("Happy", 0.92, Instant::now()).expect("write");
//!
//! let engine = AggregationEngine::new(store, AggregationConfig::default());
//! let live = engine.live_snapshot().expect("query");
//! assert_eq!(live.faces_detected, 1);
//! ```

pub mod config;
pub mod core;
pub mod dashboard;
pub mod source;
pub mod store;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    AggregationConfig, AggregationEngine, DashboardSnapshot, Decision, EmotionRecord,
    LabelBreakdown, Recorder, RecorderError,
};
pub use dashboard::{AggregateSink, JsonLinesSink, TextReport};
pub use source::{ChannelSource, Classification, ClassificationBatch, Emotion, Polarity};
pub use store::{EventStore, SqliteEventStore, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
