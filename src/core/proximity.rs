//! Proximity classification.
//!
//! Every sample is classified and written; there is no debounce.

use crate::collector::{SensorSample, SensorSource, SubscriptionHandle};
use crate::core::event::{Event, EventKind};
use crate::core::state::Observable;
use crate::store::EventSink;
use crate::transparency::SharedTransparencyLog;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProximityState {
    Near,
    Far,
}

impl ProximityState {
    /// Label stored with the event and shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            ProximityState::Near => "Objeto detectado cerca",
            ProximityState::Far => "Sin objetos cerca",
        }
    }
}

/// `Near` iff the reading is strictly inside the sensor's range.
pub fn classify_proximity(distance: f64, maximum_range: f64) -> ProximityState {
    if distance < maximum_range {
        ProximityState::Near
    } else {
        ProximityState::Far
    }
}

/// Turns raw proximity samples into states and events.
#[derive(Debug, Clone, Copy)]
pub struct ProximityClassifier {
    maximum_range: f64,
}

impl ProximityClassifier {
    pub fn new(maximum_range: f64) -> Self {
        Self { maximum_range }
    }

    /// Classify one sample. `None` if the sample has no reading.
    pub fn process(&self, sample: &SensorSample) -> Option<(ProximityState, Event)> {
        let distance = sample.first()?;
        let state = classify_proximity(distance, self.maximum_range);
        let event = Event::captured(EventKind::Proximity, state.label(), sample.captured_at);
        Some((state, event))
    }
}

struct ProximityPipeline {
    classifier: ProximityClassifier,
    state: Arc<Observable<Option<ProximityState>>>,
    sink: EventSink,
    path: String,
    log: SharedTransparencyLog,
}

impl ProximityPipeline {
    fn on_sample(&self, sample: SensorSample) {
        self.log.record_proximity_sample();
        match self.classifier.process(&sample) {
            Some((state, event)) => {
                debug!(?state, "proximity sample classified");
                self.state.set(Some(state));
                self.sink.submit(&self.path, event);
            }
            None => debug!("proximity sample without a reading ignored"),
        }
    }
}

/// Screen-level controller for the proximity sensor.
pub struct ProximityMonitor {
    source: Arc<dyn SensorSource>,
    sink: EventSink,
    path: String,
    log: SharedTransparencyLog,
    state: Arc<Observable<Option<ProximityState>>>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl ProximityMonitor {
    pub fn new(
        source: Arc<dyn SensorSource>,
        sink: EventSink,
        path: impl Into<String>,
        log: SharedTransparencyLog,
    ) -> Self {
        Self {
            source,
            sink,
            path: path.into(),
            log,
            state: Arc::new(Observable::new(None)),
            subscription: Mutex::new(None),
        }
    }

    /// Latest classification; `None` until the first sample arrives.
    pub fn state(&self) -> &Observable<Option<ProximityState>> {
        &self.state
    }

    /// Begin sampling. A no-op if the sensor is missing or already listening.
    pub fn start_listening(&self) {
        let Ok(mut subscription) = self.subscription.lock() else {
            return;
        };
        if subscription.is_some() {
            return;
        }
        if !self.source.is_available() {
            info!("proximity sensor unavailable, monitoring disabled");
            return;
        }

        let pipeline = Arc::new(ProximityPipeline {
            classifier: ProximityClassifier::new(self.source.maximum_range()),
            state: self.state.clone(),
            sink: self.sink.clone(),
            path: self.path.clone(),
            log: self.log.clone(),
        });

        match self
            .source
            .subscribe(Arc::new(move |sample| pipeline.on_sample(sample)))
        {
            Ok(handle) => {
                info!(range = self.source.maximum_range(), "proximity monitoring started");
                *subscription = Some(handle);
            }
            Err(e) => warn!("could not start proximity monitoring: {e}"),
        }
    }

    /// Stop sampling. Queued writes are still delivered.
    pub fn stop_listening(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            if let Some(handle) = subscription.take() {
                self.source.unsubscribe(handle);
                info!("proximity monitoring stopped");
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        self.subscription
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }
}

impl Drop for ProximityMonitor {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_grid() {
        let ranges = [0.0, 1.0, 5.0, 8.0];
        let distances = [0.0, 0.5, 1.0, 4.99, 5.0, 5.01, 8.0, 10.0];

        for &r in &ranges {
            for &d in &distances {
                let expected = if d < r {
                    ProximityState::Near
                } else {
                    ProximityState::Far
                };
                assert_eq!(classify_proximity(d, r), expected, "d={d} r={r}");
            }
        }
    }

    #[test]
    fn test_distance_equal_to_range_is_far() {
        assert_eq!(classify_proximity(5.0, 5.0), ProximityState::Far);
    }

    #[test]
    fn test_every_sample_yields_an_event() {
        let classifier = ProximityClassifier::new(5.0);

        let (state, event) = classifier.process(&SensorSample::scalar(0.0)).unwrap();
        assert_eq!(state, ProximityState::Near);
        assert_eq!(event.kind, EventKind::Proximity);
        assert_eq!(event.label, "Objeto detectado cerca");

        let (state, event) = classifier.process(&SensorSample::scalar(5.0)).unwrap();
        assert_eq!(state, ProximityState::Far);
        assert_eq!(event.label, "Sin objetos cerca");
    }

    #[test]
    fn test_empty_sample_is_ignored() {
        let classifier = ProximityClassifier::new(5.0);
        let sample = SensorSample::new(Vec::new(), chrono::Utc::now());
        assert!(classifier.process(&sample).is_none());
    }
}
