//! Headless dashboard: re-runs the aggregate queries on a timer and hands
//! each [`DashboardSnapshot`] to a sink.
//!
//! Rendering charts is left to whatever consumes the sink output; the text
//! report here is a terminal rendition of the same four views.

use crate::core::aggregation::{AggregationEngine, DashboardSnapshot};
use crate::store::{EventStore, StoreError};
use chrono::Local;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which the refresh loop notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(100);

const BAR_WIDTH: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("aggregate query failed: {0}")]
    Query(#[from] StoreError),

    #[error("failed to publish dashboard: {0}")]
    Publish(#[from] std::io::Error),
}

/// Consumer of aggregate results.
pub trait AggregateSink {
    fn publish(&mut self, snapshot: &DashboardSnapshot) -> std::io::Result<()>;
}

/// Human-readable report, one block per refresh.
pub struct TextReport<W> {
    out: W,
    window_minutes: u32,
}

impl<W: Write> TextReport<W> {
    pub fn new(out: W, window_minutes: u32) -> Self {
        Self {
            out,
            window_minutes,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> AggregateSink for TextReport<W> {
    fn publish(&mut self, snapshot: &DashboardSnapshot) -> std::io::Result<()> {
        writeln!(
            self.out,
            "Classroom Emotion Dashboard (refreshed {})",
            Local::now().format("%H:%M:%S")
        )?;
        let report =
            render_report(snapshot, self.window_minutes).map_err(std::io::Error::other)?;
        self.out.write_all(report.as_bytes())?;
        self.out.flush()
    }
}

/// One JSON document per refresh.
pub struct JsonLinesSink<W> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> AggregateSink for JsonLinesSink<W> {
    fn publish(&mut self, snapshot: &DashboardSnapshot) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, snapshot).map_err(std::io::Error::other)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

/// Render the four views as plain text.
pub fn render_report(
    snapshot: &DashboardSnapshot,
    window_minutes: u32,
) -> Result<String, std::fmt::Error> {
    let mut out = String::new();
    write_report(&mut out, snapshot, window_minutes)?;
    Ok(out)
}

/// Write the four views into any formatter target.
pub fn write_report<W: std::fmt::Write>(
    out: &mut W,
    snapshot: &DashboardSnapshot,
    window_minutes: u32,
) -> std::fmt::Result {
    writeln!(out, "============================================")?;

    if snapshot.is_empty() {
        return writeln!(out, "No emotion data recorded yet.");
    }

    let window = &snapshot.window;
    writeln!(out, "Faces Detected (Live): {}", snapshot.live.faces_detected)?;
    writeln!(
        out,
        "Happy Count (Last {window_minutes} min): {}",
        window.happy_count
    )?;
    writeln!(
        out,
        "Stress Count (Last {window_minutes} min): {}",
        window.stress_count
    )?;
    writeln!(
        out,
        "Most Frequent Emotion (Last {window_minutes} min): {}",
        window.most_frequent_or_na()
    )?;
    writeln!(out)?;

    writeln!(out, "Emotion Distribution (Last {window_minutes} Minutes)")?;
    if window.breakdown.is_empty() {
        writeln!(out, "  No emotion data in the last {window_minutes} minutes.")?;
    } else {
        let max = window
            .breakdown
            .ranked()
            .first()
            .map(|(_, c)| *c)
            .unwrap_or(1)
            .max(1);
        for (label, count) in window.breakdown.ranked() {
            let bar = "#".repeat((count * BAR_WIDTH / max).max(1) as usize);
            writeln!(out, "  {label:<10} {bar} {count}")?;
        }
    }
    writeln!(out)?;

    writeln!(out, "Dominant Emotion Trend (Last {window_minutes} Minutes)")?;
    for point in &snapshot.trend.points {
        writeln!(out, "  {}  {}", point.minute.format("%H:%M"), point.label)?;
    }
    writeln!(out)?;

    let hours = &snapshot.day.hours;
    writeln!(
        out,
        "Overall Emotion Percentage ({} - {})",
        hours.start.format("%H:%M"),
        hours.end.format("%H:%M")
    )?;
    if snapshot.day.shares.is_empty() {
        writeln!(
            out,
            "  No emotion data recorded between {} - {}.",
            hours.start.format("%H:%M"),
            hours.end.format("%H:%M")
        )?;
    } else {
        for share in &snapshot.day.shares {
            writeln!(
                out,
                "  {:<10} {:>5.1}% ({})",
                share.label, share.percent, share.count
            )?;
        }
    }

    Ok(())
}

/// Run the queries once and publish the result.
pub fn refresh_once<S, K>(engine: &AggregationEngine<S>, sink: &mut K) -> Result<(), DashboardError>
where
    S: EventStore,
    K: AggregateSink + ?Sized,
{
    let snapshot = engine.snapshot()?;
    sink.publish(&snapshot)?;
    Ok(())
}

/// Refresh every `interval` until `running` clears. Returns the number of
/// successful refreshes.
///
/// A failed refresh is logged and the loop waits for its next tick.
pub fn run_refresh_loop<S, K>(
    engine: &AggregationEngine<S>,
    sink: &mut K,
    interval: Duration,
    running: &AtomicBool,
) -> u64
where
    S: EventStore,
    K: AggregateSink + ?Sized,
{
    let mut refreshed = 0u64;
    while running.load(Ordering::SeqCst) {
        let tick = Instant::now();
        match refresh_once(engine, sink) {
            Ok(()) => refreshed += 1,
            Err(e) => tracing::error!(error = %e, "dashboard refresh failed"),
        }

        while running.load(Ordering::SeqCst) && tick.elapsed() < interval {
            thread::sleep(STOP_POLL.min(interval.saturating_sub(tick.elapsed())));
        }
    }
    refreshed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregation::AggregationConfig;
    use crate::core::record::NewEmotionRecord;
    use crate::store::SqliteEventStore;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn engine() -> AggregationEngine<SqliteEventStore> {
        let store = SqliteEventStore::open_in_memory().unwrap();
        for (label, ts) in [
            ("Happy", at(9, 0)),
            ("Sad", at(9, 1)),
            ("Happy", at(9, 1)),
            ("Angry", at(9, 9)),
        ] {
            store.append(&NewEmotionRecord::new(label, 0.8, ts)).unwrap();
        }
        AggregationEngine::new(store, AggregationConfig::default())
    }

    /// Stops the loop after a fixed number of publishes.
    struct CountingSink<'a> {
        published: u64,
        stop_after: u64,
        running: &'a AtomicBool,
    }

    impl AggregateSink for CountingSink<'_> {
        fn publish(&mut self, _snapshot: &DashboardSnapshot) -> std::io::Result<()> {
            self.published += 1;
            if self.published >= self.stop_after {
                self.running.store(false, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[test]
    fn test_render_report_contents() {
        let snapshot = engine().snapshot().unwrap();
        let report = render_report(&snapshot, 10).unwrap();

        assert!(report.contains("Faces Detected (Live): 1"));
        assert!(report.contains("Happy Count (Last 10 min): 2"));
        assert!(report.contains("Stress Count (Last 10 min): 2"));
        assert!(report.contains("Most Frequent Emotion (Last 10 min): Happy"));
        assert!(report.contains("09:09  Angry"));
        assert!(report.contains("Overall Emotion Percentage (09:00 - 17:00)"));
        assert!(report.contains("50.0%"));
    }

    /// Accepts a fixed number of bytes, then refuses.
    struct FullBuffer {
        room: usize,
    }

    impl std::fmt::Write for FullBuffer {
        fn write_str(&mut self, s: &str) -> std::fmt::Result {
            if s.len() > self.room {
                return Err(std::fmt::Error);
            }
            self.room -= s.len();
            Ok(())
        }
    }

    #[test]
    fn test_write_report_propagates_formatter_errors() {
        let snapshot = engine().snapshot().unwrap();
        let mut out = FullBuffer { room: 64 };
        assert!(write_report(&mut out, &snapshot, 10).is_err());

        let mut out = FullBuffer { room: 1 << 16 };
        assert!(write_report(&mut out, &snapshot, 10).is_ok());
    }

    #[test]
    fn test_render_report_empty_store() {
        let engine = AggregationEngine::new(
            SqliteEventStore::open_in_memory().unwrap(),
            AggregationConfig::default(),
        );
        let report = render_report(&engine.snapshot().unwrap(), 10).unwrap();
        assert!(report.contains("No emotion data recorded yet."));
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_refresh() {
        let engine = engine();
        let mut sink = JsonLinesSink::new(Vec::new());
        refresh_once(&engine, &mut sink).unwrap();
        refresh_once(&engine, &mut sink).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);

        let parsed: DashboardSnapshot = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.window.breakdown.count("Happy"), 2);
        assert_eq!(parsed.live.latest, Some(at(9, 9)));
    }

    #[test]
    fn test_text_report_sink_writes_header() {
        let engine = engine();
        let mut sink = TextReport::new(Vec::new(), 10);
        refresh_once(&engine, &mut sink).unwrap();
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.starts_with("Classroom Emotion Dashboard"));
    }

    #[test]
    fn test_refresh_loop_stops_on_flag() {
        let engine = engine();
        let running = AtomicBool::new(true);
        let mut sink = CountingSink {
            published: 0,
            stop_after: 3,
            running: &running,
        };

        let refreshed = run_refresh_loop(&engine, &mut sink, Duration::from_millis(5), &running);
        assert_eq!(refreshed, 3);
        assert_eq!(sink.published, 3);
    }
}
