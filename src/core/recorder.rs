//! Rate-limited recorder.
//!
//! Caps how often classifications are written to the event store. The first
//! classification offered after the minimum interval has elapsed is written;
//! everything offered before that is discarded. There is no queue and no
//! smarter sampling.
//!
//! The interval check runs on the monotonic clock the caller passes in, while
//! the stored `observed_at` comes from a separate wall clock. Adjusting the
//! system time can therefore shift recorded timestamps but never changes
//! which classifications get throttled.

use crate::core::record::{truncate_to_second, EmotionRecord, NewEmotionRecord};
use crate::source::types::{Classification, ClassificationBatch};
use crate::store::{EventStore, StoreError};
use crate::transparency::SharedTransparencyLog;
use chrono::{Local, NaiveDateTime};
use std::time::{Duration, Instant};

/// Default minimum interval between two persisted records.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Source of the timestamp written into each record.
pub trait WallClock {
    fn now(&self) -> NaiveDateTime;
}

/// Local, timezone-naive system time at second resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_second(Local::now().naive_local())
    }
}

impl<F> WallClock for F
where
    F: Fn() -> NaiveDateTime,
{
    fn now(&self) -> NaiveDateTime {
        self()
    }
}

/// What the recorder did with one classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Written to the store.
    Persisted(EmotionRecord),
    /// Discarded; `remaining` is how long until the next write is allowed.
    Throttled { remaining: Duration },
}

impl Decision {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Decision::Persisted(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("failed to persist emotion record: {0}")]
    Store(#[from] StoreError),
}

/// Writes at most one record per minimum interval.
pub struct Recorder<S, C = LocalClock> {
    store: S,
    clock: C,
    min_interval: Duration,
    /// Monotonic time of the last successful write; `None` until the first one
    last_persisted_at: Option<Instant>,
    log: Option<SharedTransparencyLog>,
}

impl<S: EventStore> Recorder<S, LocalClock> {
    pub fn new(store: S, min_interval: Duration) -> Self {
        Self::with_clock(store, LocalClock, min_interval)
    }
}

impl<S: EventStore, C: WallClock> Recorder<S, C> {
    pub fn with_clock(store: S, clock: C, min_interval: Duration) -> Self {
        Self {
            store,
            clock,
            min_interval,
            last_persisted_at: None,
            log: None,
        }
    }

    /// Attach a transparency log that counts every decision.
    pub fn with_log(mut self, log: SharedTransparencyLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_persisted_at(&self) -> Option<Instant> {
        self.last_persisted_at
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Time left before a classification offered at `now` would be written.
    ///
    /// A `now` earlier than the last write counts as no time elapsed.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_persisted_at {
            None => Duration::ZERO,
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(last)),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_persisted_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        }
    }

    /// Offer one classification observed at monotonic time `now`.
    ///
    /// Returns once the record is durable. A store failure is returned as an
    /// error and leaves the cursor untouched, so the next classification is
    /// eligible again.
    pub fn consider(
        &mut self,
        label: &str,
        confidence: f64,
        now: Instant,
    ) -> Result<Decision, RecorderError> {
        if let Some(log) = &self.log {
            log.record_classification();
        }

        if !self.is_due(now) {
            if let Some(log) = &self.log {
                log.record_throttled();
            }
            return Ok(Decision::Throttled {
                remaining: self.remaining(now),
            });
        }

        let record = NewEmotionRecord::new(label, confidence, self.clock.now());
        let stored = match self.store.append(&record) {
            Ok(stored) => stored,
            Err(e) => {
                if let Some(log) = &self.log {
                    log.record_write_failure();
                }
                tracing::error!(label, error = %e, "emotion record write failed");
                return Err(e.into());
            }
        };
        self.last_persisted_at = Some(now);

        if let Some(log) = &self.log {
            log.record_persisted();
        }
        tracing::debug!(
            id = stored.id,
            label = %stored.label,
            confidence = stored.confidence,
            observed_at = %stored.observed_at,
            "emotion record persisted"
        );

        Ok(Decision::Persisted(stored))
    }

    pub fn consider_classification(
        &mut self,
        classification: &Classification,
        now: Instant,
    ) -> Result<Decision, RecorderError> {
        self.consider(&classification.label, classification.confidence, now)
    }

    /// Offer every face of one frame, in delivery order.
    ///
    /// All faces share the same `now`, so with a non-zero interval at most the
    /// first face can be written. Stops at the first store failure.
    pub fn consider_batch(
        &mut self,
        batch: &ClassificationBatch,
        now: Instant,
    ) -> Result<Vec<EmotionRecord>, RecorderError> {
        if let Some(log) = &self.log {
            log.record_frame();
        }

        let mut persisted = Vec::new();
        for face in &batch.faces {
            if let Decision::Persisted(record) = self.consider_classification(face, now)? {
                persisted.push(record);
            }
        }
        Ok(persisted)
    }
}
