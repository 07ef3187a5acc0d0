//! Channel-backed classification source.
//!
//! The face detector and classifier run outside this crate. Whatever drives
//! them pushes one [`ClassificationBatch`] per processed frame into the sender
//! half; the recorder loop drains the receiver half.

use crate::source::types::ClassificationBatch;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default capacity of the frame channel.
pub const DEFAULT_CAPACITY: usize = 1_024;

/// Errors that can occur while receiving classifications.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Source is already running")]
    AlreadyRunning,

    #[error("Source is not running")]
    NotRunning,

    #[error("All classification producers disconnected")]
    Disconnected,
}

/// A source fed by external producers through a bounded channel.
pub struct ChannelSource {
    sender: Sender<ClassificationBatch>,
    receiver: Receiver<ClassificationBatch>,
    running: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start accepting frames.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting frames. Anything already queued is dropped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A handle producers use to deliver frames.
    pub fn sender(&self) -> Sender<ClassificationBatch> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> &Receiver<ClassificationBatch> {
        &self.receiver
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing queued.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ClassificationBatch>, SourceError> {
        if !self.is_running() {
            return Err(SourceError::NotRunning);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(batch) => Ok(Some(batch)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::Disconnected),
        }
    }

    /// Try to receive a frame without blocking.
    pub fn try_recv(&self) -> Option<ClassificationBatch> {
        self.receiver.try_recv().ok()
    }
}

impl Default for ChannelSource {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Spawn a thread that parses JSON-lines frames from `reader` into `sender`.
///
/// Each line is a JSON array of `{"label": .., "confidence": ..}` objects, one
/// per face; `[]` is a frame with no face. Blank lines are ignored and
/// malformed lines are logged and skipped. The thread exits at end of input,
/// when every receiver is gone, or when `running` clears.
pub fn spawn_json_lines_feeder<R>(
    reader: R,
    sender: Sender<ClassificationBatch>,
    running: Arc<AtomicBool>,
) -> JoinHandle<u64>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut delivered = 0u64;
        for (line_no, line) in reader.lines().enumerate() {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "failed to read classification input");
                    break;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<ClassificationBatch>(trimmed) {
                Ok(batch) => {
                    if sender.send(batch).is_err() {
                        break;
                    }
                    delivered += 1;
                }
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "skipping malformed frame");
                }
            }
        }
        tracing::debug!(frames = delivered, "classification input exhausted");
        delivered
    })
}
