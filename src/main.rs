//! Emotion Pulse CLI
//!
//! Records classifier output at a throttled rate and shows the mood dashboard.

use clap::{Parser, Subcommand};
use emotion_pulse::{
    config::Config,
    core::{AggregationEngine, Recorder},
    dashboard::{refresh_once, run_refresh_loop, AggregateSink, JsonLinesSink, TextReport},
    source::{spawn_json_lines_feeder, ChannelSource},
    store::{EventStore, SqliteEventStore},
    transparency::{create_shared_log_with_persistence, load_persisted},
    VERSION,
};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emotion-pulse")]
#[command(version = VERSION)]
#[command(about = "Rate-limited emotion recorder and classroom mood dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record classifier output (JSON lines, one array of faces per frame)
    Record {
        /// Input file, or `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: String,

        /// Minimum seconds between persisted records
        #[arg(long)]
        min_interval: Option<u64>,

        /// Event store database file
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Show the aggregate dashboard, refreshing on a timer
    Dashboard {
        /// Render once and exit
        #[arg(long)]
        once: bool,

        /// Emit one JSON document per refresh instead of text
        #[arg(long)]
        json: bool,

        /// Refresh interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        /// Rolling window length in minutes
        #[arg(long)]
        window: Option<u32>,

        /// Event store database file
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Serve aggregates over HTTP
    #[cfg(feature = "server")]
    Serve {
        /// Port to bind on 127.0.0.1
        #[arg(long, default_value = "8765")]
        port: u16,

        /// Event store database file
        #[arg(long)]
        database: Option<PathBuf>,
    },

    /// Show recorder statistics and store status
    Status,

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record {
            input,
            min_interval,
            database,
        } => {
            cmd_record(&input, min_interval, database);
        }
        Commands::Dashboard {
            once,
            json,
            interval,
            window,
            database,
        } => {
            cmd_dashboard(once, json, interval, window, database);
        }
        #[cfg(feature = "server")]
        Commands::Serve { port, database } => {
            cmd_serve(port, database);
        }
        Commands::Status => {
            cmd_status();
        }
        Commands::Config => {
            cmd_config();
        }
    }
}

/// Load the config file, exiting on a malformed or invalid one.
fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config from {:?}: {e}", Config::config_path());
            std::process::exit(1);
        }
    }
}

fn open_store(config: &Config) -> SqliteEventStore {
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    match SqliteEventStore::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!(
                "Error: could not open event store {:?}: {e}",
                config.database_path
            );
            std::process::exit(1);
        }
    }
}

fn cmd_record(input: &str, min_interval: Option<u64>, database: Option<PathBuf>) {
    let mut config = load_config();
    if let Some(secs) = min_interval {
        config.min_log_interval = Duration::from_secs(secs);
    }
    if let Some(path) = database {
        config.database_path = path;
    }

    println!("Emotion Pulse v{VERSION}");
    println!();
    println!("Recording classifications...");
    println!("  Database: {:?}", config.database_path);
    println!("  Minimum interval: {}s", config.min_log_interval.as_secs());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let store = open_store(&config);
    let transparency_log = create_shared_log_with_persistence(config.stats_path());
    let mut recorder =
        Recorder::new(store, config.min_log_interval).with_log(transparency_log.clone());

    let reader: Box<dyn BufRead + Send> = if input == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        match std::fs::File::open(input) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                eprintln!("Error opening input {input}: {e}");
                std::process::exit(1);
            }
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut source = ChannelSource::default();
    if let Err(e) = source.start() {
        eprintln!("Error starting source: {e}");
        std::process::exit(1);
    }
    let feeder = spawn_json_lines_feeder(reader, source.sender(), running.clone());

    let mut failures = 0u64;
    while running.load(Ordering::SeqCst) {
        match source.recv_timeout(Duration::from_millis(100)) {
            Ok(Some(batch)) => match recorder.consider_batch(&batch, Instant::now()) {
                Ok(written) => {
                    for record in written {
                        println!(
                            "[{}] Recorded {} ({:.2})",
                            record.observed_at.format("%H:%M:%S"),
                            record.label,
                            record.confidence
                        );
                    }
                }
                Err(e) => {
                    // Surfaced, not skipped: the next frame is eligible again.
                    failures += 1;
                    eprintln!("Error: {e}");
                }
            },
            Ok(None) => {
                if feeder.is_finished() && source.receiver().is_empty() {
                    break;
                }
            }
            Err(e) => {
                eprintln!("Source stopped: {e}");
                break;
            }
        }
    }

    println!();
    println!("Stopping recorder...");
    source.stop();

    if let Err(e) = transparency_log.save() {
        eprintln!("Warning: Could not save recorder stats: {e}");
    }

    println!();
    println!("{}", transparency_log.summary());

    if failures > 0 {
        std::process::exit(1);
    }
}

fn cmd_dashboard(
    once: bool,
    json: bool,
    interval: Option<u64>,
    window: Option<u32>,
    database: Option<PathBuf>,
) {
    let mut config = load_config();
    if let Some(secs) = interval {
        config.refresh_interval = Duration::from_secs(secs);
    }
    if let Some(minutes) = window {
        config.window_minutes = minutes;
    }
    if let Some(path) = database {
        config.database_path = path;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    let store = open_store(&config);
    let engine = AggregationEngine::new(store, config.aggregation());

    let mut sink: Box<dyn AggregateSink> = if json {
        Box::new(JsonLinesSink::new(io::stdout()))
    } else {
        Box::new(TextReport::new(io::stdout(), config.window_minutes))
    };

    if once {
        if let Err(e) = refresh_once(&engine, sink.as_mut()) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    tracing::info!(
        interval_secs = config.refresh_interval.as_secs(),
        window_minutes = config.window_minutes,
        "dashboard refresh loop started"
    );
    let refreshed = run_refresh_loop(&engine, sink.as_mut(), config.refresh_interval, &running);
    tracing::info!(refreshed, "dashboard stopped");
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, database: Option<PathBuf>) {
    use emotion_pulse::server::{self, ServerConfig, SharedStore};

    let mut config = load_config();
    if let Some(path) = database {
        config.database_path = path;
    }
    let store: SharedStore = Arc::new(open_store(&config));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let server_config = ServerConfig::new(port, config.aggregation());
        let (addr, shutdown_tx) = match server::run(server_config, store).await {
            Ok(started) => started,
            Err(e) => {
                eprintln!("Error starting server: {e}");
                std::process::exit(1);
            }
        };

        println!("Serving aggregates on http://{addr}/aggregates");
        println!("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            eprintln!("Error waiting for Ctrl+C: {e}");
        }
        let _ = shutdown_tx.send(());
    });
}

fn cmd_status() {
    let config = load_config();

    println!("Emotion Pulse Status");
    println!("====================");
    println!();

    println!("Configuration:");
    println!("  Database: {:?}", config.database_path);
    println!("  Minimum interval: {}s", config.min_log_interval.as_secs());
    println!("  Rolling window: {} min", config.window_minutes);
    println!(
        "  Business hours: {} - {}",
        config.business_hours.start, config.business_hours.end
    );
    println!("  Refresh interval: {}s", config.refresh_interval.as_secs());
    println!();

    if config.database_path.exists() {
        let store = open_store(&config);
        match (store.len(), store.latest_observed_at()) {
            (Ok(count), Ok(latest)) => {
                println!("Event Store:");
                println!("  Records: {count}");
                match latest {
                    Some(ts) => println!("  Latest record: {ts}"),
                    None => println!("  Latest record: none"),
                }
            }
            (Err(e), _) | (_, Err(e)) => eprintln!("Error reading event store: {e}"),
        }
    } else {
        println!("No event store found.");
    }
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        match load_persisted(&stats_path) {
            Ok(stats) => {
                println!("Cumulative Recorder Statistics:");
                println!("  Frames received: {}", stats.frames_received);
                println!("  Classifications seen: {}", stats.classifications_seen);
                println!("  Records persisted: {}", stats.records_persisted);
                println!("  Throttled: {}", stats.classifications_throttled);
                println!("  Write failures: {}", stats.write_failures);
                println!("  Last updated: {}", stats.last_updated);
            }
            Err(e) => eprintln!("Warning: Could not read recorder stats: {e}"),
        }
    } else {
        println!("No previous recorder session found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: Could not set Ctrl+C handler: {e}");
    }
}
