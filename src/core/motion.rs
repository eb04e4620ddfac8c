//! Motion classification from 3-axis acceleration.
//!
//! Readings are normalized by gravity and reduced to a g-force magnitude,
//! which falls into one of three bands:
//!
//! | magnitude          | state         | event        |
//! |--------------------|---------------|--------------|
//! | `g > 2.7`          | `Shake`       | `sacudida`, debounced 500 ms |
//! | `1.2 < g <= 2.7`   | `LightMotion` | `leve`, every sample |
//! | `g <= 1.2`         | `Rest`        | none         |

use crate::collector::{SensorSample, SensorSource, SubscriptionHandle};
use crate::config::MotionThresholds;
use crate::core::event::{Event, EventKind};
use crate::core::state::Observable;
use crate::store::EventSink;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionState {
    Rest,
    LightMotion,
    Shake,
}

impl MotionState {
    /// Label shown for the current state.
    pub fn display_label(&self) -> &'static str {
        match self {
            MotionState::Rest => "En reposo",
            MotionState::LightMotion => "Movimiento leve",
            MotionState::Shake => "Sacudida detectada",
        }
    }

    /// Label stored with the event, if this state produces one.
    pub fn event_label(&self) -> Option<&'static str> {
        match self {
            MotionState::Rest => None,
            MotionState::LightMotion => Some("leve"),
            MotionState::Shake => Some("sacudida"),
        }
    }
}

/// Euclidean norm of the acceleration after dividing each axis by gravity.
pub fn g_force(x: f64, y: f64, z: f64, gravity: f64) -> f64 {
    let (x, y, z) = (x / gravity, y / gravity, z / gravity);
    (x * x + y * y + z * z).sqrt()
}

/// Band for a magnitude. Boundary values fall into the lower band.
pub fn classify_magnitude(g: f64, thresholds: &MotionThresholds) -> MotionState {
    if g > thresholds.shake_threshold_g {
        MotionState::Shake
    } else if g > thresholds.light_motion_threshold_g {
        MotionState::LightMotion
    } else {
        MotionState::Rest
    }
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionReading {
    pub g_force: f64,
    pub state: MotionState,
    /// Set when the sample should be written
    pub event: Option<Event>,
}

impl MotionReading {
    /// Whether this reading was an accepted (counted) shake.
    pub fn is_accepted_shake(&self) -> bool {
        self.state == MotionState::Shake && self.event.is_some()
    }
}

/// Stateful classifier holding the shake debounce clock and counter.
#[derive(Debug, Clone)]
pub struct MotionClassifier {
    thresholds: MotionThresholds,
    last_shake: Option<DateTime<Utc>>,
    shake_count: u64,
}

impl MotionClassifier {
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self {
            thresholds,
            last_shake: None,
            shake_count: 0,
        }
    }

    /// Accepted shakes since construction. Never decreases.
    pub fn shake_count(&self) -> u64 {
        self.shake_count
    }

    /// Classify one sample. `None` if the sample has fewer than three axes.
    pub fn process(&mut self, sample: &SensorSample) -> Option<MotionReading> {
        let (x, y, z) = sample.xyz()?;
        let g = g_force(x, y, z, self.thresholds.gravity);
        let state = classify_magnitude(g, &self.thresholds);

        let emit = match state {
            MotionState::Shake => self.accept_shake(sample.captured_at),
            MotionState::LightMotion => true,
            MotionState::Rest => false,
        };

        let event = if emit {
            state
                .event_label()
                .map(|label| Event::captured(EventKind::Motion, label, sample.captured_at))
        } else {
            None
        };

        Some(MotionReading {
            g_force: g,
            state,
            event,
        })
    }

    fn accept_shake(&mut self, at: DateTime<Utc>) -> bool {
        let window_ms = self.thresholds.shake_debounce.as_millis() as i64;
        if let Some(last) = self.last_shake {
            if (at - last).num_milliseconds() < window_ms {
                return false;
            }
        }
        self.last_shake = Some(at);
        self.shake_count += 1;
        true
    }
}

struct MotionPipeline {
    classifier: Mutex<MotionClassifier>,
    state: Arc<Observable<Option<MotionState>>>,
    shake_count: Arc<Observable<u64>>,
    sink: EventSink,
    path: String,
    log: SharedTransparencyLog,
}

impl MotionPipeline {
    fn on_sample(&self, sample: SensorSample) {
        self.log.record_motion_sample();

        let (reading, count) = {
            let Ok(mut classifier) = self.classifier.lock() else {
                return;
            };
            (classifier.process(&sample), classifier.shake_count())
        };

        let Some(reading) = reading else {
            debug!(axes = sample.values.len(), "motion sample without three axes ignored");
            return;
        };

        debug!(g = reading.g_force, state = ?reading.state, "motion sample classified");
        self.state.set(Some(reading.state));
        if reading.is_accepted_shake() {
            self.shake_count.set(count);
        }
        if let Some(event) = reading.event {
            self.sink.submit(&self.path, event);
        }
    }
}

/// Screen-level controller for the accelerometer.
pub struct MotionMonitor {
    source: Arc<dyn SensorSource>,
    pipeline: Arc<MotionPipeline>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl MotionMonitor {
    pub fn new(
        source: Arc<dyn SensorSource>,
        thresholds: MotionThresholds,
        sink: EventSink,
        path: impl Into<String>,
        log: SharedTransparencyLog,
    ) -> Self {
        let pipeline = Arc::new(MotionPipeline {
            classifier: Mutex::new(MotionClassifier::new(thresholds)),
            state: Arc::new(Observable::new(None)),
            shake_count: Arc::new(Observable::new(0)),
            sink,
            path: path.into(),
            log,
        });

        Self {
            source,
            pipeline,
            subscription: Mutex::new(None),
        }
    }

    /// Latest classification; `None` until the first sample arrives.
    pub fn state(&self) -> &Observable<Option<MotionState>> {
        &self.pipeline.state
    }

    /// Accepted shakes for the lifetime of this monitor.
    pub fn shake_count(&self) -> &Observable<u64> {
        &self.pipeline.shake_count
    }

    /// Begin sampling. A no-op if the sensor is missing or already listening.
    ///
    /// The debounce clock and counter survive stop/start cycles.
    pub fn start_listening(&self) {
        let Ok(mut subscription) = self.subscription.lock() else {
            return;
        };
        if subscription.is_some() {
            return;
        }
        if !self.source.is_available() {
            info!("accelerometer unavailable, monitoring disabled");
            return;
        }

        let pipeline = self.pipeline.clone();
        match self
            .source
            .subscribe(Arc::new(move |sample| pipeline.on_sample(sample)))
        {
            Ok(handle) => {
                info!("motion monitoring started");
                *subscription = Some(handle);
            }
            Err(e) => warn!("could not start motion monitoring: {e}"),
        }
    }

    /// Stop sampling. Queued writes are still delivered.
    pub fn stop_listening(&self) {
        if let Ok(mut subscription) = self.subscription.lock() {
            if let Some(handle) = subscription.take() {
                self.source.unsubscribe(handle);
                info!("motion monitoring stopped");
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

impl Drop for MotionMonitor {
    fn drop(&mut self) {
        self.stop_listening();
    }
}
