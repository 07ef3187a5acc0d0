//! End-to-end tests: classification source -> recorder -> file store -> aggregates.

use chrono::{NaiveDate, NaiveDateTime};
use emotion_pulse::core::{AggregationConfig, AggregationEngine, Recorder};
use emotion_pulse::dashboard::{refresh_once, JsonLinesSink};
use emotion_pulse::source::{spawn_json_lines_feeder, ChannelSource};
use emotion_pulse::store::{EventStore, SqliteEventStore, DB_FILENAME};
use emotion_pulse::transparency::create_shared_log;
use emotion_pulse::{Classification, ClassificationBatch, DashboardSnapshot};
use std::cell::Cell;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 16)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[test]
fn test_recorded_frames_drive_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(DB_FILENAME);
    let store = Arc::new(SqliteEventStore::open(&db_path).unwrap());

    // Wall clock and monotonic clock advance together, 20s per frame.
    let wall = Rc::new(Cell::new(at(9, 0, 0)));
    let clock = {
        let wall = Rc::clone(&wall);
        move || wall.get()
    };
    let log = create_shared_log();
    let mut recorder = Recorder::with_clock(Arc::clone(&store), clock, Duration::from_secs(60))
        .with_log(log.clone());

    let labels = [
        "Happy", "Sad", "Sad", "Happy", "Angry", "Neutral", "Happy", "Fear", "Happy", "Disgust",
    ];
    let t0 = Instant::now();
    for frame in 0..30u64 {
        let offset = frame * 20;
        wall.set(at(9, 0, 0) + chrono::Duration::seconds(offset as i64));
        let label = labels[(frame as usize) % labels.len()];
        let batch = ClassificationBatch::new(vec![
            Classification::new(label, 0.8),
            Classification::new("Surprise", 0.3),
        ]);
        recorder
            .consider_batch(&batch, t0 + Duration::from_secs(offset))
            .unwrap();
    }

    // 30 frames over 580s at one write per 60s: writes at 0, 60, ..., 540.
    let records = store.all().unwrap();
    assert_eq!(records.len(), 10);
    assert!(records.iter().all(|r| r.label != "Surprise"));
    assert_eq!(log.stats().records_persisted, 10);
    assert_eq!(log.stats().classifications_seen, 60);

    let engine = AggregationEngine::new(Arc::clone(&store), AggregationConfig::default());
    let live = engine.live_snapshot().unwrap();
    assert_eq!(live.latest, Some(at(9, 9, 0)));
    assert_eq!(live.faces_detected, 1);

    let window = engine.rolling_distribution().unwrap();
    assert_eq!(window.breakdown.total(), 10);
    // Written frames are 0, 3, 6, ..., 27, which hit every label index once.
    assert_eq!(window.happy_count, 4);
    assert_eq!(window.stress_count, 5);
    assert_eq!(window.breakdown.count("Neutral"), 1);
    assert_eq!(window.most_frequent.as_deref(), Some("Happy"));

    let trend = engine.dominant_trend().unwrap();
    assert_eq!(trend.points.len(), 10);
    assert!(trend.points.windows(2).all(|p| p[0].minute < p[1].minute));

    let day = engine.business_hours_distribution().unwrap();
    assert_eq!(day.breakdown.total(), 10);
}

#[test]
fn test_reader_sees_writes_from_separate_connection() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(DB_FILENAME);

    let writer = SqliteEventStore::open(&db_path).unwrap();
    let reader = SqliteEventStore::open(&db_path).unwrap();
    let engine = AggregationEngine::new(reader, AggregationConfig::default());
    assert_eq!(engine.live_snapshot().unwrap().faces_detected, 0);

    let mut recorder = Recorder::with_clock(writer, || at(10, 15, 0), Duration::from_secs(60));
    recorder.consider("Happy", 0.9, Instant::now()).unwrap();

    let live = engine.live_snapshot().unwrap();
    assert_eq!(live.latest, Some(at(10, 15, 0)));
    assert_eq!(live.faces_detected, 1);
}

#[test]
fn test_concurrent_writer_and_reader() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join(DB_FILENAME);
    let writer = SqliteEventStore::open(&db_path).unwrap();
    let reader = SqliteEventStore::open(&db_path).unwrap();

    let handle = std::thread::spawn(move || {
        let step = Cell::new(0i64);
        let clock = move || {
            let s = step.get();
            step.set(s + 1);
            at(9, 0, 0) + chrono::Duration::seconds(s)
        };
        let mut recorder = Recorder::with_clock(writer, clock, Duration::ZERO);
        for _ in 0..200 {
            recorder.consider("Happy", 0.5, Instant::now()).unwrap();
        }
    });

    let engine = AggregationEngine::new(reader, AggregationConfig::default());
    let mut last_total = 0;
    while !handle.is_finished() {
        let snapshot = engine.snapshot().unwrap();
        assert!(snapshot.total_records >= last_total);
        assert_eq!(
            snapshot.window.breakdown.total(),
            snapshot.window.happy_count
        );
        last_total = snapshot.total_records;
    }
    handle.join().unwrap();

    assert_eq!(engine.snapshot().unwrap().total_records, 200);
}

#[test]
fn test_json_lines_input_through_channel_source() {
    let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
    let mut recorder =
        Recorder::with_clock(Arc::clone(&store), || at(11, 0, 0), Duration::from_secs(60));

    let mut source = ChannelSource::default();
    source.start().unwrap();
    let input = concat!(
        "[]\n",
        "[{\"label\":\"Fear\",\"confidence\":0.55},{\"label\":\"Happy\",\"confidence\":0.9}]\n",
        "[{\"label\":\"Sad\",\"confidence\":0.7}]\n",
    );
    let feeder = spawn_json_lines_feeder(
        Cursor::new(input),
        source.sender(),
        Arc::new(AtomicBool::new(true)),
    );
    assert_eq!(feeder.join().unwrap(), 3);

    let now = Instant::now();
    while let Some(batch) = source.try_recv() {
        recorder.consider_batch(&batch, now).unwrap();
    }

    let records = store.all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].label, "Fear");
    assert!((records[0].confidence - 0.55).abs() < 1e-9);
}

#[test]
fn test_dashboard_json_is_stable_between_refreshes() {
    let store = Arc::new(SqliteEventStore::open_in_memory().unwrap());
    let mut recorder = Recorder::with_clock(Arc::clone(&store), || at(9, 30, 0), Duration::ZERO);
    let now = Instant::now();
    for label in ["Happy", "Sad", "Happy"] {
        recorder.consider(label, 0.6, now).unwrap();
    }

    let engine = AggregationEngine::new(store, AggregationConfig::default());
    let mut sink = JsonLinesSink::new(Vec::new());
    refresh_once(&engine, &mut sink).unwrap();
    refresh_once(&engine, &mut sink).unwrap();

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], lines[1]);

    let snapshot: DashboardSnapshot = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(snapshot.live.faces_detected, 3);
    assert_eq!(snapshot.window.most_frequent.as_deref(), Some("Happy"));
}
