//! Sensor access for the agent.
//!
//! Hardware is reached only through the [`SensorSource`] trait; monitors
//! receive a source at construction time.

pub mod manual;
pub mod noop;
pub mod types;

// Re-export commonly used types
pub use manual::ManualSource;
pub use noop::UnavailableSource;
pub use types::{
    CollectorError, SampleListener, SensorKind, SensorSample, SensorSource, SubscriptionHandle,
};
