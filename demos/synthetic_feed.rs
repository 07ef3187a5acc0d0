//! Demonstration of the recording pipeline with a synthetic classifier.
//!
//! This example shows how to:
//! 1. Feed classifier probability vectors through a channel source
//! 2. Throttle writes with the rate-limited recorder
//! 3. Read the four aggregate views and print the text dashboard
//!
//! Run with: cargo run --example synthetic_feed

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use emotion_pulse::{
    core::{AggregationConfig, AggregationEngine, Recorder},
    dashboard::{refresh_once, TextReport},
    source::{ChannelSource, Classification, ClassificationBatch},
    store::SqliteEventStore,
    transparency::create_shared_log,
};

/// Frames per second produced by the fake capture loop.
const FPS: u64 = 20;

fn main() {
    println!("Emotion Pulse - Synthetic Feed Demo");
    println!("===================================");
    println!();

    let store = match SqliteEventStore::open_in_memory() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("Error opening store: {e}");
            return;
        }
    };

    let log = create_shared_log();
    // One write per second so a few seconds of demo produce some history.
    let mut recorder =
        Recorder::new(Arc::clone(&store), Duration::from_secs(1)).with_log(log.clone());

    let mut source = ChannelSource::new(256);
    if let Err(e) = source.start() {
        eprintln!("Error starting source: {e}");
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let producer_running = Arc::clone(&running);
    let sender = source.sender();

    // Fake capture loop: zero to two faces per frame with drifting probabilities.
    let producer = thread::spawn(move || {
        let mut frame = 0u64;
        while producer_running.load(Ordering::SeqCst) {
            let faces = (frame % 3) as usize;
            let batch = ClassificationBatch::new(
                (0..faces)
                    .filter_map(|face| {
                        let probabilities = synthetic_probabilities(frame, face as u64);
                        Classification::from_probabilities(&probabilities)
                    })
                    .collect(),
            );
            if sender.send(batch).is_err() {
                break;
            }
            frame += 1;
            thread::sleep(Duration::from_millis(1000 / FPS));
        }
    });

    println!("Recording for 5 seconds...");
    let started = Instant::now();
    while started.elapsed() < Duration::from_secs(5) {
        match source.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(batch)) => match recorder.consider_batch(&batch, Instant::now()) {
                Ok(written) => {
                    for record in written {
                        println!(
                            "  [{}] {} ({:.2})",
                            record.observed_at.format("%H:%M:%S"),
                            record.label,
                            record.confidence
                        );
                    }
                }
                Err(e) => eprintln!("Write failed: {e}"),
            },
            Ok(None) => {}
            Err(e) => {
                eprintln!("Source stopped: {e}");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    source.stop();
    let _ = producer.join();

    println!();
    println!("{}", log.summary());
    println!();

    let engine = AggregationEngine::new(store, AggregationConfig::default());
    let mut report = TextReport::new(std::io::stdout(), engine.config().window_minutes);
    if let Err(e) = refresh_once(&engine, &mut report) {
        eprintln!("Dashboard failed: {e}");
    }
}

/// Deterministic pseudo-probabilities over the seven emotion classes.
fn synthetic_probabilities(frame: u64, face: u64) -> [f32; 7] {
    let mut p = [0.05f32; 7];
    let favoured = ((frame / 15 + face * 3) % 7) as usize;
    p[favoured] = 0.6 + ((frame % 5) as f32) * 0.05;
    let total: f32 = p.iter().sum();
    p.map(|v| v / total)
}
