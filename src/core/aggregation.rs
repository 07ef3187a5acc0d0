//! Aggregate views over the recorded emotion history.
//!
//! Four independent read-only queries:
//!
//! - **Live snapshot**: records sharing the latest `observed_at`
//! - **Rolling distribution**: label counts over the last N minutes with data
//! - **Dominant trend**: most frequent label per minute in that same window
//! - **Business-hours distribution**: label counts for records whose time of
//!   day falls in business hours, all days pooled together
//!
//! Each query exists as a pure function over a slice of records and as a
//! method on [`AggregationEngine`], which pulls the smallest projection of the
//! store it needs and then delegates to the pure function. Rows appended while
//! a query runs may or may not be included; results are never corrupted.
//!
//! The live snapshot only reads as "faces detected right now" because the
//! recorder writes at most one record per interval. Changing the recorder's
//! write cadence changes what this query means.
//!
//! Whenever several labels share the highest count, the lexicographically
//! smallest label wins.

use crate::core::record::{optional_timestamp_serde, timestamp_serde, EmotionRecord};
use crate::core::windowing::{minute_of, BusinessHours, RollingWindow};
use crate::source::types::{Emotion, Polarity};
use crate::store::{EventStore, StoreError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Default rolling window length in minutes.
pub const DEFAULT_WINDOW_MINUTES: u32 = 10;

/// Shown in place of a dominant label when there is no data.
pub const NO_DATA_LABEL: &str = "N/A";

/// Per-label record counts, ordered by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelBreakdown {
    counts: BTreeMap<String, u64>,
}

impl LabelBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a EmotionRecord>,
    {
        let mut breakdown = Self::new();
        for record in records {
            breakdown.add(&record.label);
        }
        breakdown
    }

    pub fn add(&mut self, label: &str) {
        *self.counts.entry(label.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, label: &str) -> u64 {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(label, count)| (label.as_str(), *count))
    }

    /// Sum of counts for labels of the given polarity.
    pub fn polarity_count(&self, polarity: Polarity) -> u64 {
        self.iter()
            .filter(|(label, _)| Polarity::of(label) == polarity)
            .map(|(_, count)| count)
            .sum()
    }

    /// The most frequent label; ties go to the lexicographically smallest.
    pub fn dominant(&self) -> Option<&str> {
        let mut best: Option<(&str, u64)> = None;
        for (label, count) in self.iter() {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((label, count)),
            }
        }
        best.map(|(label, _)| label)
    }

    /// Labels by descending count, ties by label.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Share of the total per label, in [`ranked`](Self::ranked) order.
    pub fn shares(&self) -> Vec<LabelShare> {
        let total = self.total();
        self.ranked()
            .into_iter()
            .map(|(label, count)| LabelShare {
                label: label.to_string(),
                count,
                percent: if total == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total as f64
                },
                color: Emotion::from_label(label).map(|e| e.color_hex().to_string()),
            })
            .collect()
    }
}

/// One slice of a distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelShare {
    pub label: String,
    pub count: u64,
    pub percent: f64,
    /// Chart colour; absent for labels outside the classifier's set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Records at the most recent timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    /// Latest `observed_at` in the store; `None` when the store is empty
    #[serde(with = "optional_timestamp_serde")]
    pub latest: Option<NaiveDateTime>,
    /// Number of records observed exactly at `latest`
    pub faces_detected: u64,
}

/// Label distribution over the rolling window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDistribution {
    /// `None` when the store is empty
    pub window: Option<RollingWindow>,
    /// Records labelled with a positive emotion
    pub happy_count: u64,
    /// Records labelled with a negative ("stress") emotion
    pub stress_count: u64,
    pub breakdown: LabelBreakdown,
    pub most_frequent: Option<String>,
}

impl WindowDistribution {
    pub fn most_frequent_or_na(&self) -> &str {
        self.most_frequent.as_deref().unwrap_or(NO_DATA_LABEL)
    }
}

/// Dominant label for one minute bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    #[serde(with = "timestamp_serde")]
    pub minute: NaiveDateTime,
    pub label: String,
}

/// Per-minute dominant labels, ascending by minute. Minutes without records
/// are absent, so consecutive points need not be consecutive minutes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DominantTrend {
    pub window: Option<RollingWindow>,
    pub points: Vec<TrendPoint>,
    /// Distinct labels in order of first appearance, for stable chart axes
    pub label_axis: Vec<String>,
}

impl DominantTrend {
    /// Position of a label on the chart axis.
    pub fn axis_code(&self, label: &str) -> Option<usize> {
        self.label_axis.iter().position(|l| l == label)
    }
}

/// Cumulative label distribution within business hours across all days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayDistribution {
    pub hours: BusinessHours,
    pub breakdown: LabelBreakdown,
    pub shares: Vec<LabelShare>,
}

/// All four views, computed from one read of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_records: u64,
    pub live: LiveSnapshot,
    pub window: WindowDistribution,
    pub trend: DominantTrend,
    pub day: DayDistribution,
}

impl DashboardSnapshot {
    pub fn from_records(records: &[EmotionRecord], config: &AggregationConfig) -> Self {
        Self {
            total_records: records.len() as u64,
            live: live_snapshot(records),
            window: rolling_distribution(records, config.window_minutes),
            trend: dominant_trend(records, config.window_minutes),
            day: business_hours_distribution(records, config.business_hours),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }
}

/// Parameters shared by the windowed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationConfig {
    pub window_minutes: u32,
    pub business_hours: BusinessHours,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
            business_hours: BusinessHours::default(),
        }
    }
}

fn latest_observed(records: &[EmotionRecord]) -> Option<NaiveDateTime> {
    records.iter().map(|r| r.observed_at).max()
}

/// Window anchored at the latest minute present in `records`.
pub fn rolling_window(records: &[EmotionRecord], minutes: u32) -> Option<RollingWindow> {
    latest_observed(records).map(|latest| RollingWindow::ending_at(latest, minutes))
}

/// Count the records sharing the maximum `observed_at`.
pub fn live_snapshot(records: &[EmotionRecord]) -> LiveSnapshot {
    match latest_observed(records) {
        None => LiveSnapshot::default(),
        Some(latest) => LiveSnapshot {
            latest: Some(latest),
            faces_detected: records.iter().filter(|r| r.observed_at == latest).count() as u64,
        },
    }
}

/// Label distribution over the last `minutes` minute buckets with data.
pub fn rolling_distribution(records: &[EmotionRecord], minutes: u32) -> WindowDistribution {
    let Some(window) = rolling_window(records, minutes) else {
        return WindowDistribution::default();
    };

    let breakdown =
        LabelBreakdown::from_records(records.iter().filter(|r| window.contains(r.observed_at)));

    WindowDistribution {
        window: Some(window),
        happy_count: breakdown.polarity_count(Polarity::Positive),
        stress_count: breakdown.polarity_count(Polarity::Negative),
        most_frequent: breakdown.dominant().map(str::to_string),
        breakdown,
    }
}

/// Most frequent label per minute bucket inside the rolling window.
pub fn dominant_trend(records: &[EmotionRecord], minutes: u32) -> DominantTrend {
    let Some(window) = rolling_window(records, minutes) else {
        return DominantTrend::default();
    };

    let mut buckets: BTreeMap<NaiveDateTime, LabelBreakdown> = BTreeMap::new();
    for record in records.iter().filter(|r| window.contains(r.observed_at)) {
        buckets
            .entry(minute_of(record.observed_at))
            .or_default()
            .add(&record.label);
    }

    let points = buckets
        .into_iter()
        .filter_map(|(minute, breakdown)| {
            breakdown.dominant().map(|label| TrendPoint {
                minute,
                label: label.to_string(),
            })
        })
        .collect();

    DominantTrend {
        window: Some(window),
        points,
        label_axis: label_axis(records),
    }
}

/// Distinct labels ordered by first appearance (by `observed_at`, then `id`).
pub fn label_axis(records: &[EmotionRecord]) -> Vec<String> {
    let mut ordered: Vec<&EmotionRecord> = records.iter().collect();
    ordered.sort_by(|a, b| a.observed_at.cmp(&b.observed_at).then(a.id.cmp(&b.id)));

    let mut seen = HashSet::new();
    ordered
        .into_iter()
        .filter(|r| seen.insert(r.label.as_str()))
        .map(|r| r.label.clone())
        .collect()
}

/// Label distribution for records whose time of day is within `hours`.
pub fn business_hours_distribution(
    records: &[EmotionRecord],
    hours: BusinessHours,
) -> DayDistribution {
    let breakdown =
        LabelBreakdown::from_records(records.iter().filter(|r| hours.contains(r.observed_at)));
    DayDistribution {
        hours,
        shares: breakdown.shares(),
        breakdown,
    }
}

/// Runs the aggregate queries against an event store.
pub struct AggregationEngine<S> {
    store: S,
    config: AggregationConfig,
}

impl<S: EventStore> AggregationEngine<S> {
    pub fn new(store: S, config: AggregationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn live_snapshot(&self) -> Result<LiveSnapshot, StoreError> {
        let Some(latest) = self.store.latest_observed_at()? else {
            return Ok(LiveSnapshot::default());
        };
        Ok(LiveSnapshot {
            latest: Some(latest),
            faces_detected: self.store.count_at(latest)?,
        })
    }

    /// Records inside the rolling window, read with a single range scan.
    pub fn window_records(&self) -> Result<Vec<EmotionRecord>, StoreError> {
        let Some(latest) = self.store.latest_observed_at()? else {
            return Ok(Vec::new());
        };
        let window = RollingWindow::ending_at(latest, self.config.window_minutes);
        self.store.range(window.first_minute, window.last_instant())
    }

    pub fn rolling_distribution(&self) -> Result<WindowDistribution, StoreError> {
        let records = self.window_records()?;
        Ok(rolling_distribution(&records, self.config.window_minutes))
    }

    pub fn dominant_trend(&self) -> Result<DominantTrend, StoreError> {
        let records = self.window_records()?;
        let mut trend = dominant_trend(&records, self.config.window_minutes);
        trend.label_axis = label_axis(&self.store.all()?);
        Ok(trend)
    }

    pub fn business_hours_distribution(&self) -> Result<DayDistribution, StoreError> {
        let records = self.store.all()?;
        Ok(business_hours_distribution(
            &records,
            self.config.business_hours,
        ))
    }

    /// All four views from one full scan.
    pub fn snapshot(&self) -> Result<DashboardSnapshot, StoreError> {
        let records = self.store.all()?;
        Ok(DashboardSnapshot::from_records(&records, &self.config))
    }
}
