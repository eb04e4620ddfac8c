//! A sensor source driven by the caller.
//!
//! Used by the replay command to feed recorded samples and by tests as a
//! stand-in for real hardware. Samples are delivered synchronously on the
//! thread that calls [`ManualSource::emit`].

use crate::collector::types::{
    CollectorError, SampleListener, SensorKind, SensorSample, SensorSource, SubscriptionHandle,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct ManualSource {
    kind: SensorKind,
    maximum_range: f64,
    next_handle: AtomicU64,
    listeners: Mutex<Vec<(SubscriptionHandle, SampleListener)>>,
}

impl ManualSource {
    /// Create a source for the given sensor.
    pub fn new(kind: SensorKind, maximum_range: f64) -> Self {
        Self {
            kind,
            maximum_range,
            next_handle: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// A proximity sensor with the given maximum range.
    pub fn proximity(maximum_range: f64) -> Self {
        Self::new(SensorKind::Proximity, maximum_range)
    }

    /// An accelerometer.
    pub fn accelerometer() -> Self {
        Self::new(SensorKind::Accelerometer, 0.0)
    }

    /// Deliver a sample to every registered listener.
    pub fn emit(&self, sample: SensorSample) {
        // Snapshot so listeners may (un)subscribe while being called.
        let listeners: Vec<SampleListener> = match self.listeners.lock() {
            Ok(guard) => guard.iter().map(|(_, l)| l.clone()).collect(),
            Err(poisoned) => poisoned.into_inner().iter().map(|(_, l)| l.clone()).collect(),
        };
        for listener in listeners {
            listener(sample.clone());
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|l| l.len()).unwrap_or(0)
    }
}

impl SensorSource for ManualSource {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        true
    }

    fn maximum_range(&self) -> f64 {
        self.maximum_range
    }

    fn subscribe(&self, listener: SampleListener) -> Result<SubscriptionHandle, CollectorError> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push((handle, listener));
        }
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|(h, _)| *h != handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_subscribers_until_unsubscribed() {
        let source = ManualSource::accelerometer();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let handle = source
            .subscribe(Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        source.emit(SensorSample::vector(0.0, 0.0, 9.8));
        source.emit(SensorSample::vector(0.0, 0.0, 9.8));
        source.unsubscribe(handle);
        source.emit(SensorSample::vector(0.0, 0.0, 9.8));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(source.listener_count(), 0);
    }
}
