//! Core recording and aggregation pipeline.
//!
//! This module contains:
//! - The persisted record type and its timestamp format
//! - The rate-limited recorder that decides which classifications are stored
//! - Minute bucketing, rolling windows and business hours
//! - The aggregate queries behind the dashboard

pub mod aggregation;
pub mod record;
pub mod recorder;
pub mod windowing;

// Re-export commonly used types
pub use aggregation::{
    business_hours_distribution, dominant_trend, live_snapshot, rolling_distribution,
    AggregationConfig, AggregationEngine, DashboardSnapshot, DayDistribution, DominantTrend,
    LabelBreakdown, LabelShare, LiveSnapshot, TrendPoint, WindowDistribution,
    DEFAULT_WINDOW_MINUTES, NO_DATA_LABEL,
};
pub use record::{EmotionRecord, NewEmotionRecord, TIMESTAMP_FORMAT};
pub use recorder::{
    Decision, LocalClock, Recorder, RecorderError, WallClock, DEFAULT_MIN_INTERVAL,
};
pub use windowing::{minute_of, BusinessHours, RollingWindow};
