//! Sensor Report Agent CLI
//!
//! Replays recorded sensor samples through the classifiers and shows the
//! reconciled report list.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensor_report_agent::{
    collector::{ManualSource, SensorKind, SensorSample},
    config::Config,
    core::{MotionMonitor, ProximityMonitor},
    report::{render_reports, Reconciler},
    store::{EventStore, EventWriter, MemoryStore},
    transparency::{create_shared_log_with_persistence, PersistedStats},
    VERSION,
};
use serde::Deserialize;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "firebase")]
use sensor_report_agent::store::{FirebaseConfig, FirebaseStore};

#[derive(Parser)]
#[command(name = "sensor-report")]
#[command(version = VERSION)]
#[command(about = "Proximity and motion sensor events with live reports", long_about = None)]
struct Cli {
    /// Log classifier decisions and store traffic
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded samples (JSON Lines) through both classifiers
    Replay {
        /// File with one sample per line
        #[arg(long, short)]
        input: PathBuf,

        /// Use the in-memory store even if a database is configured
        #[arg(long)]
        memory: bool,
    },

    /// Follow the remote report list until Ctrl+C
    Watch,

    /// Show configuration and collection statistics
    Status,

    /// Show configuration, optionally updating the database URL
    Config {
        /// Firebase Realtime Database URL to save
        #[arg(long)]
        database_url: Option<String>,
    },
}

/// One line of a replay file.
#[derive(Debug, Deserialize)]
struct ReplayRecord {
    sensor: SensorKind,
    #[serde(flatten)]
    sample: SensorSample,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Replay { input, memory } => cmd_replay(&input, memory),
        Commands::Watch => cmd_watch(),
        Commands::Status => cmd_status(),
        Commands::Config { database_url } => cmd_config(database_url),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Open the configured store: Firebase when available, in-memory otherwise.
#[allow(unused_variables)]
fn open_store(config: &Config, force_memory: bool) -> anyhow::Result<(Arc<dyn EventStore>, bool)> {
    #[cfg(feature = "firebase")]
    if !force_memory {
        if let Some(url) = &config.database_url {
            let store = FirebaseStore::new(FirebaseConfig::new(url.clone()))
                .context("opening Firebase store")?;
            println!("  Store: {url}");
            return Ok((Arc::new(store), true));
        }
    }

    #[cfg(not(feature = "firebase"))]
    if config.database_url.is_some() && !force_memory {
        eprintln!("Warning: database_url ignored (firebase feature not enabled at compile time)");
    }

    println!("  Store: in-memory");
    Ok((Arc::new(MemoryStore::new()), false))
}

fn cmd_replay(input: &Path, force_memory: bool) -> anyhow::Result<()> {
    println!("Sensor Report Agent v{VERSION}");
    println!();

    let config = Config::load().context("loading configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let log = create_shared_log_with_persistence(config.transparency_path());

    println!("Replaying {}", input.display());
    let (store, remote) = open_store(&config, force_memory)?;
    println!("  Proximity max range: {}", config.proximity_max_range);
    println!(
        "  Shake threshold: {}g (debounce {} ms)",
        config.motion.shake_threshold_g,
        config.motion.shake_debounce.as_millis()
    );
    println!();

    let reconciler = Reconciler::attach(store.clone(), &config.paths, log.clone())
        .context("subscribing to report streams")?;
    let writer = EventWriter::spawn(store, config.write_queue_capacity, log.clone())
        .context("starting event writer")?;

    let proximity_source = Arc::new(ManualSource::proximity(config.proximity_max_range));
    let accelerometer = Arc::new(ManualSource::accelerometer());

    let proximity = ProximityMonitor::new(
        proximity_source.clone(),
        writer.sink(),
        config.paths.proximity.clone(),
        log.clone(),
    );
    let motion = MotionMonitor::new(
        accelerometer.clone(),
        config.motion.clone(),
        writer.sink(),
        config.paths.motion.clone(),
        log.clone(),
    );
    proximity.start_listening();
    motion.start_listening();

    let file = std::fs::File::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let mut replayed = 0usize;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", input.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: ReplayRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = index + 1, "skipping malformed sample: {e}");
                continue;
            }
        };
        match record.sensor {
            SensorKind::Proximity => proximity_source.emit(record.sample),
            SensorKind::Accelerometer => accelerometer.emit(record.sample),
        }
        replayed += 1;
    }

    proximity.stop_listening();
    motion.stop_listening();
    writer.flush();
    if remote {
        // Stream notifications for the last writes arrive asynchronously.
        std::thread::sleep(std::time::Duration::from_secs(1));
    }

    let proximity_state = proximity
        .state()
        .get()
        .map(|s| s.label())
        .unwrap_or("Desconocido");
    let motion_state = motion
        .state()
        .get()
        .map(|s| s.display_label())
        .unwrap_or("Inactivo");

    println!("Replayed {replayed} samples");
    println!("  Proximity: {proximity_state}");
    println!("  Motion: {motion_state}");
    println!("  Shakes detected: {}", motion.shake_count().get());
    println!();
    println!("Reports");
    println!("=======");
    println!("{}", render_reports(&reconciler.snapshot()));
    println!();

    writer.shutdown();
    reconciler.unsubscribe();

    if let Err(e) = log.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }
    println!("{}", log.summary());
    Ok(())
}

#[cfg(feature = "firebase")]
fn cmd_watch() -> anyhow::Result<()> {
    use sensor_report_agent::report::ReportItem;
    use sensor_report_agent::transparency::create_shared_log;
    use std::sync::atomic::{AtomicBool, Ordering};

    let config = Config::load().context("loading configuration")?;
    let url = config.database_url.clone().context(
        "no database URL configured; run `sensor-report config --database-url <url>`",
    )?;

    let store: Arc<dyn EventStore> = Arc::new(
        FirebaseStore::new(FirebaseConfig::new(url.clone())).context("opening Firebase store")?,
    );
    let reconciler = Reconciler::attach(store, &config.paths, create_shared_log())
        .context("subscribing to report streams")?;

    println!("Watching {url} (Ctrl+C to stop)");
    println!();
    reconciler
        .reports()
        .subscribe(Arc::new(|items: &Vec<ReportItem>| {
            println!("── {} report(s) ──", items.len());
            println!("{}", render_reports(items));
            println!();
        }));

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("setting Ctrl+C handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }

    println!("Stopping...");
    reconciler.unsubscribe();
    Ok(())
}

#[cfg(not(feature = "firebase"))]
fn cmd_watch() -> anyhow::Result<()> {
    anyhow::bail!("watch requires the `firebase` feature at compile time")
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Sensor Report Agent Status");
    println!("==========================");
    println!();
    println!("Configuration:");
    println!(
        "  Database: {}",
        config.database_url.as_deref().unwrap_or("not configured")
    );
    println!(
        "  Firebase support: {}",
        if cfg!(feature = "firebase") {
            "built in"
        } else {
            "not built"
        }
    );
    println!("  Proximity node: {}", config.paths.proximity);
    println!("  Motion node: {}", config.paths.motion);
    println!();

    let stats_path = config.transparency_path();
    if !stats_path.exists() {
        println!("No previous session data found.");
        return Ok(());
    }

    let content = std::fs::read_to_string(&stats_path)
        .with_context(|| format!("reading {}", stats_path.display()))?;
    let stats: PersistedStats =
        serde_json::from_str(&content).context("parsing transparency statistics")?;

    println!("Cumulative Statistics:");
    println!("  Proximity samples: {}", stats.proximity_samples);
    println!("  Motion samples: {}", stats.motion_samples);
    println!("  Events written: {}", stats.events_written);
    println!("  Write failures: {}", stats.write_failures);
    println!("  Report notifications: {}", stats.reports_received);
    println!(
        "  Last updated: {}",
        stats.last_updated.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}

fn cmd_config(database_url: Option<String>) -> anyhow::Result<()> {
    let mut config = Config::load().context("loading configuration")?;

    if let Some(url) = database_url {
        config.database_url = Some(url);
        config.save().context("saving configuration")?;
        println!("Configuration saved.");
        println!();
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
