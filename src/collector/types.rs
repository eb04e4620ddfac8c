//! Raw sensor sample types and the sensor source seam.
//!
//! Samples are ephemeral: they are handed to a classifier and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Which hardware sensor a source reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Proximity,
    Accelerometer,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Proximity => write!(f, "proximity"),
            SensorKind::Accelerometer => write!(f, "accelerometer"),
        }
    }
}

/// A single hardware reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Axis readings (1 for proximity, 3 for acceleration)
    pub values: Vec<f64>,
    /// When the hardware captured the reading
    pub captured_at: DateTime<Utc>,
}

impl SensorSample {
    pub fn new(values: Vec<f64>, captured_at: DateTime<Utc>) -> Self {
        Self {
            values,
            captured_at,
        }
    }

    /// A single-axis reading captured now.
    pub fn scalar(value: f64) -> Self {
        Self::new(vec![value], Utc::now())
    }

    /// A three-axis reading captured now.
    pub fn vector(x: f64, y: f64, z: f64) -> Self {
        Self::new(vec![x, y, z], Utc::now())
    }

    /// The first axis, if any.
    pub fn first(&self) -> Option<f64> {
        self.values.first().copied()
    }

    /// The three axes, if the sample carries at least three.
    pub fn xyz(&self) -> Option<(f64, f64, f64)> {
        match self.values.as_slice() {
            [x, y, z, ..] => Some((*x, *y, *z)),
            _ => None,
        }
    }
}

/// Opaque handle returned by a subscription; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// Callback invoked for every sample a source delivers.
pub type SampleListener = Arc<dyn Fn(SensorSample) + Send + Sync>;

/// Errors that can occur while subscribing to a sensor.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{0} sensor is not available on this device")]
    Unavailable(SensorKind),
}

/// Access to one hardware sensor.
///
/// Sources are constructed explicitly and handed to the monitors that read
/// them, so tests can substitute their own.
pub trait SensorSource: Send + Sync {
    /// Which sensor this source reads.
    fn kind(&self) -> SensorKind;

    /// Whether the hardware exists on this device.
    fn is_available(&self) -> bool;

    /// Maximum range reported by the sensor (proximity only; 0.0 otherwise).
    fn maximum_range(&self) -> f64;

    /// Register a listener. Samples are delivered in non-decreasing capture order.
    fn subscribe(&self, listener: SampleListener) -> Result<SubscriptionHandle, CollectorError>;

    /// Remove a listener. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyz_requires_three_axes() {
        assert_eq!(SensorSample::vector(1.0, 2.0, 3.0).xyz(), Some((1.0, 2.0, 3.0)));
        assert_eq!(SensorSample::scalar(1.0).xyz(), None);
    }

    #[test]
    fn test_sample_deserializes_from_json() {
        let json = r#"{"values":[0.0,9.8,0.0],"captured_at":"2024-01-01T10:00:00Z"}"#;
        let sample: SensorSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.values.len(), 3);
        assert_eq!(sample.first(), Some(0.0));
    }

    #[test]
    fn test_sensor_kind_serde_names() {
        let kind: SensorKind = serde_json::from_str("\"accelerometer\"").unwrap();
        assert_eq!(kind, SensorKind::Accelerometer);
        assert_eq!(SensorKind::Proximity.to_string(), "proximity");
    }
}
