//! Core classification pipeline.
//!
//! This module contains:
//! - The observable state holder read by the UI layer
//! - Events and their stored record format
//! - Proximity and motion classifiers with their monitors

pub mod event;
pub mod motion;
pub mod proximity;
pub mod state;

// Re-export commonly used types
pub use event::{Event, EventKind, TIMESTAMP_FORMAT};
pub use motion::{
    classify_magnitude, g_force, MotionClassifier, MotionMonitor, MotionReading, MotionState,
};
pub use proximity::{classify_proximity, ProximityClassifier, ProximityMonitor, ProximityState};
pub use state::{ListenerId, Observable, StateListener};
