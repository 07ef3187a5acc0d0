//! Classification input for the recorder.
//!
//! The classifier itself is external; this module defines what it delivers
//! and the channel it delivers through.

pub mod channel;
pub mod types;

// Re-export commonly used types
pub use channel::{spawn_json_lines_feeder, ChannelSource, SourceError, DEFAULT_CAPACITY};
pub use types::{Classification, ClassificationBatch, Emotion, Polarity};
