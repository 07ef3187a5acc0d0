//! Recorder activity log.
//!
//! Tracks how many frames and face classifications reached the recorder and
//! what happened to them, so an operator can tell throttling apart from
//! failing writes. Only counters are kept, never labels or images.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current recording session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Frames delivered by the classification source
    frames_received: AtomicU64,
    /// Face classifications offered to the recorder
    classifications_seen: AtomicU64,
    /// Records written to the event store
    records_persisted: AtomicU64,
    /// Classifications discarded by the minimum-interval policy
    classifications_throttled: AtomicU64,
    /// Writes that failed
    write_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            classifications_seen: AtomicU64::new(0),
            records_persisted: AtomicU64::new(0),
            classifications_throttled: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates on top of previously saved totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous recorder stats");
        }

        log
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self) {
        self.classifications_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.records_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttled(&self) {
        self.classifications_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            classifications_seen: self.classifications_seen.load(Ordering::Relaxed),
            records_persisted: self.records_persisted.load(Ordering::Relaxed),
            classifications_throttled: self.classifications_throttled.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Recorder Statistics:\n\
             - Frames received: {}\n\
             - Classifications seen: {}\n\
             - Records persisted: {}\n\
             - Throttled (discarded by interval): {}\n\
             - Write failures: {}\n\
             - Session duration: {} seconds",
            stats.frames_received,
            stats.classifications_seen,
            stats.records_persisted,
            stats.classifications_throttled,
            stats.write_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_received: stats.frames_received,
                classifications_seen: stats.classifications_seen,
                records_persisted: stats.records_persisted,
                classifications_throttled: stats.classifications_throttled,
                write_failures: stats.write_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let persisted = load_persisted(path)?;

                self.frames_received
                    .store(persisted.frames_received, Ordering::Relaxed);
                self.classifications_seen
                    .store(persisted.classifications_seen, Ordering::Relaxed);
                self.records_persisted
                    .store(persisted.records_persisted, Ordering::Relaxed);
                self.classifications_throttled
                    .store(persisted.classifications_throttled, Ordering::Relaxed);
                self.write_failures
                    .store(persisted.write_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.classifications_seen.store(0, Ordering::Relaxed);
        self.records_persisted.store(0, Ordering::Relaxed);
        self.classifications_throttled.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of recorder statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub frames_received: u64,
    pub classifications_seen: u64,
    pub records_persisted: u64,
    pub classifications_throttled: u64,
    pub write_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    pub frames_received: u64,
    pub classifications_seen: u64,
    pub records_persisted: u64,
    pub classifications_throttled: u64,
    pub write_failures: u64,
    pub last_updated: DateTime<Utc>,
}

/// Read stats saved by a previous session.
pub fn load_persisted(path: &std::path::Path) -> Result<PersistedStats, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(std::io::Error::other)
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_frame();
        log.record_classification();
        log.record_classification();
        log.record_persisted();
        log.record_throttled();

        let stats = log.stats();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.classifications_seen, 2);
        assert_eq!(stats.records_persisted, 1);
        assert_eq!(stats.classifications_throttled, 1);
        assert_eq!(stats.write_failures, 0);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_classification();
        log.record_write_failure();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.classifications_seen, 0);
        assert_eq!(stats.write_failures, 0);
    }

    #[test]
    fn test_persistence_accumulates_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats").join("recorder.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_persisted();
        log.record_persisted();
        log.save().unwrap();

        let reopened = TransparencyLog::with_persistence(path.clone());
        reopened.record_persisted();
        assert_eq!(reopened.stats().records_persisted, 3);
        assert_eq!(load_persisted(&path).unwrap().records_persisted, 2);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Records persisted"));
        assert!(summary.contains("Throttled"));
        assert!(summary.contains("Write failures"));
    }
}
