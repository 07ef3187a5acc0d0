//! Append-only event store backed by SQLite.
//!
//! One table, one row per persisted record. The recorder is the only writer;
//! the aggregation engine and dashboard read. File databases run in WAL mode
//! so a reader never blocks the writer and never sees a half-written row.
//!
//! Every comparison and every read goes through SQLite's `datetime()`, so a
//! row written by another tool as `2024-05-06T08:00:00` or with fractional
//! seconds is bucketed at the same second by the SQL projections and by the
//! rows handed to Rust. Rows `datetime()` cannot read are skipped everywhere.

use crate::core::record::{format_timestamp, parse_timestamp, EmotionRecord, NewEmotionRecord};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Database filename within the data directory.
pub const DB_FILENAME: &str = "emotions.db";

/// How long a connection waits on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS emotions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        label TEXT NOT NULL,
        confidence REAL NOT NULL,
        observed_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_emotions_observed_second
        ON emotions(datetime(observed_at));

    CREATE INDEX IF NOT EXISTS idx_emotions_label
        ON emotions(label);
";

/// `observed_at` normalised to `YYYY-MM-DD HH:MM:SS`; NULL when unreadable.
const OBSERVED_SECOND: &str = "datetime(observed_at)";

const SELECT_COLUMNS: &str =
    "SELECT id, label, confidence, observed_at, datetime(observed_at) FROM emotions";

/// Event store errors. Every one of them is fatal to the operation that hit it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable append log of emotion records.
pub trait EventStore: Send + Sync {
    /// Insert one record and return it with its assigned id.
    fn append(&self, record: &NewEmotionRecord) -> Result<EmotionRecord, StoreError>;

    /// Every record, ordered by `observed_at` then `id`.
    fn all(&self) -> Result<Vec<EmotionRecord>, StoreError>;

    /// Records with `from <= observed_at <= to`, ordered by `observed_at` then `id`.
    fn range(&self, from: NaiveDateTime, to: NaiveDateTime)
        -> Result<Vec<EmotionRecord>, StoreError>;

    /// Records carrying exactly `label`, ordered by `observed_at` then `id`.
    fn by_label(&self, label: &str) -> Result<Vec<EmotionRecord>, StoreError>;

    /// The greatest `observed_at` in the store.
    fn latest_observed_at(&self) -> Result<Option<NaiveDateTime>, StoreError>;

    /// Number of records whose `observed_at` equals `ts` exactly.
    fn count_at(&self, ts: NaiveDateTime) -> Result<u64, StoreError>;

    fn len(&self) -> Result<u64, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl<T: EventStore + ?Sized> EventStore for Arc<T> {
    fn append(&self, record: &NewEmotionRecord) -> Result<EmotionRecord, StoreError> {
        (**self).append(record)
    }

    fn all(&self) -> Result<Vec<EmotionRecord>, StoreError> {
        (**self).all()
    }

    fn range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<EmotionRecord>, StoreError> {
        (**self).range(from, to)
    }

    fn by_label(&self, label: &str) -> Result<Vec<EmotionRecord>, StoreError> {
        (**self).by_label(label)
    }

    fn latest_observed_at(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        (**self).latest_observed_at()
    }

    fn count_at(&self, ts: NaiveDateTime) -> Result<u64, StoreError> {
        (**self).count_at(ts)
    }

    fn len(&self) -> Result<u64, StoreError> {
        (**self).len()
    }
}

/// SQLite implementation of [`EventStore`].
pub struct SqliteEventStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEventStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteEventStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::debug!(path = %path.display(), "event store opened");

        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Location of the database file, if file backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn query_records(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<EmotionRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_row)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, label, confidence, raw_ts, normalized) = row?;
            match normalized.as_deref().map(parse_timestamp) {
                Some(Ok(observed_at)) => records.push(EmotionRecord {
                    id,
                    label,
                    confidence,
                    observed_at,
                }),
                _ => {
                    tracing::warn!(id, observed_at = %raw_ts, "skipping row with unreadable timestamp");
                }
            }
        }
        Ok(records)
    }
}

type RawRow = (i64, String, f64, String, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

impl EventStore for SqliteEventStore {
    fn append(&self, record: &NewEmotionRecord) -> Result<EmotionRecord, StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO emotions (label, confidence, observed_at) VALUES (?1, ?2, ?3)",
            params![
                record.label,
                record.confidence,
                format_timestamp(&record.observed_at)
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(record.clone().with_id(id))
    }

    fn all(&self) -> Result<Vec<EmotionRecord>, StoreError> {
        self.query_records(
            &format!("{SELECT_COLUMNS} ORDER BY {OBSERVED_SECOND} ASC, id ASC"),
            [],
        )
    }

    fn range(
        &self,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<EmotionRecord>, StoreError> {
        self.query_records(
            &format!(
                "{SELECT_COLUMNS} WHERE {OBSERVED_SECOND} BETWEEN ?1 AND ?2 \
                 ORDER BY {OBSERVED_SECOND} ASC, id ASC"
            ),
            params![format_timestamp(&from), format_timestamp(&to)],
        )
    }

    fn by_label(&self, label: &str) -> Result<Vec<EmotionRecord>, StoreError> {
        self.query_records(
            &format!(
                "{SELECT_COLUMNS} WHERE label = ?1 ORDER BY {OBSERVED_SECOND} ASC, id ASC"
            ),
            params![label],
        )
    }

    fn latest_observed_at(&self) -> Result<Option<NaiveDateTime>, StoreError> {
        let raw: Option<String> = {
            let conn = self.lock();
            let max = conn
                .query_row(
                    &format!("SELECT MAX({OBSERVED_SECOND}) FROM emotions"),
                    [],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?;
            max.flatten()
        };

        let Some(raw) = raw else {
            return Ok(None);
        };
        match parse_timestamp(&raw) {
            Ok(ts) => Ok(Some(ts)),
            Err(e) => {
                tracing::warn!(observed_at = %raw, error = %e, "unexpected datetime() output");
                Ok(self.all()?.into_iter().map(|r| r.observed_at).max())
            }
        }
    }

    fn count_at(&self, ts: NaiveDateTime) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM emotions WHERE {OBSERVED_SECOND} = ?1"),
            params![format_timestamp(&ts)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn len(&self) -> Result<u64, StoreError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM emotions", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn store_with(rows: &[(&str, NaiveDateTime)]) -> SqliteEventStore {
        let store = SqliteEventStore::open_in_memory().unwrap();
        for (label, ts) in rows {
            store.append(&NewEmotionRecord::new(*label, 0.5, *ts)).unwrap();
        }
        store
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        let a = store.append(&NewEmotionRecord::new("Happy", 0.91, at(9, 0, 0))).unwrap();
        let b = store.append(&NewEmotionRecord::new("Sad", 0.42, at(9, 1, 0))).unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.len().unwrap(), 2);

        let all = store.all().unwrap();
        assert_eq!(all[0], a);
        assert_eq!(all[1].confidence, 0.42);
    }

    #[test]
    fn test_scans_order_by_time_not_id() {
        let store = store_with(&[("Sad", at(9, 5, 0)), ("Happy", at(9, 1, 0))]);
        let labels: Vec<_> = store.all().unwrap().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["Happy", "Sad"]);
    }

    #[test]
    fn test_range_is_inclusive() {
        let store = store_with(&[
            ("Happy", at(8, 59, 59)),
            ("Sad", at(9, 0, 0)),
            ("Fear", at(9, 30, 0)),
            ("Angry", at(9, 30, 1)),
        ]);
        let found = store.range(at(9, 0, 0), at(9, 30, 0)).unwrap();
        let labels: Vec<_> = found.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Sad", "Fear"]);
    }

    #[test]
    fn test_by_label_passes_unknown_labels_through() {
        let store = store_with(&[("Bored", at(9, 0, 0)), ("Happy", at(9, 1, 0))]);
        assert_eq!(store.by_label("Bored").unwrap().len(), 1);
        assert!(store.by_label("Neutral").unwrap().is_empty());
    }

    #[test]
    fn test_latest_and_count_at() {
        let store = SqliteEventStore::open_in_memory().unwrap();
        assert_eq!(store.latest_observed_at().unwrap(), None);
        assert_eq!(store.count_at(at(9, 0, 0)).unwrap(), 0);
        assert!(store.is_empty().unwrap());

        let store = store_with(&[
            ("Happy", at(9, 0, 0)),
            ("Sad", at(9, 2, 0)),
            ("Fear", at(9, 2, 0)),
        ]);
        assert_eq!(store.latest_observed_at().unwrap(), Some(at(9, 2, 0)));
        assert_eq!(store.count_at(at(9, 2, 0)).unwrap(), 2);
    }

    #[test]
    fn test_unreadable_timestamps_are_skipped() {
        let store = store_with(&[("Happy", at(9, 0, 0))]);
        store
            .lock()
            .execute(
                "INSERT INTO emotions (label, confidence, observed_at) VALUES ('Sad', 0.3, 'garbage')",
                [],
            )
            .unwrap();

        assert_eq!(store.all().unwrap().len(), 1);
        assert_eq!(store.latest_observed_at().unwrap(), Some(at(9, 0, 0)));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_externally_written_timestamps_match_engine_views() {
        use crate::core::aggregation::{
            business_hours_distribution, dominant_trend, live_snapshot, rolling_distribution,
            AggregationConfig, AggregationEngine,
        };

        let store = store_with(&[("Happy", at(9, 0, 0))]);
        for (label, raw) in [
            ("Sad", "2024-05-06 09:05:00"),
            ("Fear", "2024-05-06 09:05:00.500"),
            ("Angry", "2024-05-06T08:00:00"),
            ("Neutral", "2024-05-06T09:04:30"),
        ] {
            store
                .lock()
                .execute(
                    "INSERT INTO emotions (label, confidence, observed_at) VALUES (?1, 0.5, ?2)",
                    params![label, raw],
                )
                .unwrap();
        }

        assert_eq!(store.latest_observed_at().unwrap(), Some(at(9, 5, 0)));
        assert_eq!(store.count_at(at(9, 5, 0)).unwrap(), 2);
        assert_eq!(store.range(at(9, 4, 0), at(9, 5, 59)).unwrap().len(), 3);
        let labels: Vec<_> = store.all().unwrap().into_iter().map(|r| r.label).collect();
        assert_eq!(labels, vec!["Angry", "Happy", "Neutral", "Sad", "Fear"]);

        let all = store.all().unwrap();
        let config = AggregationConfig::default();
        let engine = AggregationEngine::new(store, config);

        let live = engine.live_snapshot().unwrap();
        assert_eq!(live, live_snapshot(&all));
        assert_eq!(live.faces_detected, 2);

        let window = engine.rolling_distribution().unwrap();
        assert_eq!(window, rolling_distribution(&all, config.window_minutes));
        assert_eq!(window.breakdown.total(), 4);
        assert_eq!(window.breakdown.count("Angry"), 0);

        assert_eq!(
            engine.dominant_trend().unwrap(),
            dominant_trend(&all, config.window_minutes)
        );
        assert_eq!(
            engine.business_hours_distribution().unwrap(),
            business_hours_distribution(&all, config.business_hours)
        );
    }

    #[test]
    fn test_file_store_reopens_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(DB_FILENAME);
        {
            let store = SqliteEventStore::open(&path).unwrap();
            store.append(&NewEmotionRecord::new("Neutral", 0.7, at(10, 0, 0))).unwrap();
        }
        let store = SqliteEventStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.all().unwrap()[0].label, "Neutral");
    }
}
