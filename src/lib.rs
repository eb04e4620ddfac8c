//! Sensor Report Agent - proximity and motion events with live reports.
//!
//! Samples the proximity sensor and the accelerometer, classifies each
//! reading, writes qualifying events to a real-time database, and keeps a
//! reconciled, newest-first list of everything stored there.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Sensor Report Agent                       │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐           │
//! │  │   Sensor    │──▶│ Classifier  │──▶│ EventWriter │──┐        │
//! │  │   Source    │   │ (monitors)  │   │ (fire&forget)│  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘  ▼        │
//! │                                               ┌─────────────┐  │
//! │  ┌─────────────┐   ┌─────────────┐            │ EventStore  │  │
//! │  │  Rendered   │◀──│ Reconciler  │◀───────────│ proximidad  │  │
//! │  │   reports   │   │ (ReportList)│            │ movimiento  │  │
//! │  └─────────────┘   └─────────────┘            └─────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sensor_report_agent::{
//!     collector::ManualSource, config::MotionThresholds, core::MotionMonitor,
//!     report::Reconciler, store::{EventStore, EventWriter, MemoryStore, StorePaths},
//!     transparency::create_shared_log,
//! };
//!
//! let log = create_shared_log();
//! let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
//! let writer = EventWriter::spawn(store.clone(), 1024, log.clone()).unwrap();
//! let reports = Reconciler::attach(store, &StorePaths::default(), log.clone()).unwrap();
//!
//! let accelerometer = Arc::new(ManualSource::accelerometer());
//! let monitor = MotionMonitor::new(
//!     accelerometer.clone(),
//!     MotionThresholds::default(),
//!     writer.sink(),
//!     "movimiento",
//!     log,
//! );
//! monitor.start_listening();
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod report;
pub mod store;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{CollectorError, ManualSource, SensorKind, SensorSample, SensorSource};
pub use config::{Config, ConfigError, MotionThresholds};
pub use core::{
    Event, EventKind, MotionMonitor, MotionState, Observable, ProximityMonitor, ProximityState,
};
pub use report::{Reconciler, ReportItem};
pub use store::{ChildEvent, EventSink, EventStore, EventWriter, MemoryStore, StoreError, StorePaths};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "firebase")]
pub use store::{FirebaseConfig, FirebaseStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
