//! Collection transparency log.
//!
//! Counts what the agent sampled and what it sent to the store, so a user
//! can see exactly how much was recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Proximity samples received from the sensor
    proximity_samples: AtomicU64,
    /// Accelerometer samples received from the sensor
    motion_samples: AtomicU64,
    /// Events accepted by the store
    events_written: AtomicU64,
    /// Events rejected by the store or dropped before sending
    write_failures: AtomicU64,
    /// Child notifications applied to the report list
    reports_received: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            proximity_samples: AtomicU64::new(0),
            motion_samples: AtomicU64::new(0),
            events_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            reports_received: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence, resuming previous totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            debug!("could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_proximity_sample(&self) {
        self.proximity_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_motion_sample(&self) {
        self.motion_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_written(&self) {
        self.events_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            proximity_samples: self.proximity_samples.load(Ordering::Relaxed),
            motion_samples: self.motion_samples.load(Ordering::Relaxed),
            events_written: self.events_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            reports_received: self.reports_received.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Proximity samples: {}\n\
             - Motion samples: {}\n\
             - Events written: {}\n\
             - Write failures: {}\n\
             - Report notifications: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Only classified states and their timestamps leave the device.",
            stats.proximity_samples,
            stats.motion_samples,
            stats.events_written,
            stats.write_failures,
            stats.reports_received,
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
                proximity_samples: stats.proximity_samples,
                motion_samples: stats.motion_samples,
                events_written: stats.events_written,
                write_failures: stats.write_failures,
                reports_received: stats.reports_received,
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
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.proximity_samples
                    .store(persisted.proximity_samples, Ordering::Relaxed);
                self.motion_samples
                    .store(persisted.motion_samples, Ordering::Relaxed);
                self.events_written
                    .store(persisted.events_written, Ordering::Relaxed);
                self.write_failures
                    .store(persisted.write_failures, Ordering::Relaxed);
                self.reports_received
                    .store(persisted.reports_received, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.proximity_samples.store(0, Ordering::Relaxed);
        self.motion_samples.store(0, Ordering::Relaxed);
        self.events_written.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.reports_received.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub proximity_samples: u64,
    pub motion_samples: u64,
    pub events_written: u64,
    pub write_failures: u64,
    pub reports_received: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedStats {
    pub proximity_samples: u64,
    pub motion_samples: u64,
    pub events_written: u64,
    pub write_failures: u64,
    pub reports_received: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
