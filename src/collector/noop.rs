//! Source for hardware the device does not have.
//!
//! Monitors given this source never classify anything and never write.

use crate::collector::types::{
    CollectorError, SampleListener, SensorKind, SensorSource, SubscriptionHandle,
};

/// A sensor source that is permanently unavailable.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableSource {
    kind: SensorKind,
}

impl UnavailableSource {
    pub fn new(kind: SensorKind) -> Self {
        Self { kind }
    }
}

impl SensorSource for UnavailableSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        false
    }

    fn maximum_range(&self) -> f64 {
        0.0
    }

    fn subscribe(&self, _listener: SampleListener) -> Result<SubscriptionHandle, CollectorError> {
        Err(CollectorError::Unavailable(self.kind))
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {}
}
