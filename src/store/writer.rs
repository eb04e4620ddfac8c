//! Fire-and-forget event writes.
//!
//! Classifiers hand events to an [`EventSink`], which queues them without
//! blocking. A single worker thread drains the queue into the store. Failed
//! writes are logged and counted, never retried, and never reported back to
//! the classifier.

use crate::core::Event;
use crate::store::{EventStore, StoreError};
use crate::transparency::SharedTransparencyLog;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

enum WriteCommand {
    Push { path: String, event: Event },
    Flush(Sender<()>),
    Shutdown,
}

/// Cloneable handle for submitting writes.
#[derive(Clone)]
pub struct EventSink {
    sender: Sender<WriteCommand>,
    log: SharedTransparencyLog,
}

impl EventSink {
    /// Queue an event for writing under `path`. Never blocks.
    ///
    /// If the queue is full or the writer has shut down, the event is dropped.
    pub fn submit(&self, path: &str, event: Event) {
        let command = WriteCommand::Push {
            path: path.to_string(),
            event,
        };
        match self.sender.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(path, "write queue full, event dropped");
                self.log.record_write_failure();
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(path, "event writer stopped, event dropped");
                self.log.record_write_failure();
            }
        }
    }

    /// Block until every write queued before this call has been attempted.
    ///
    /// Returns `false` if the writer has already stopped.
    pub fn flush(&self) -> bool {
        let (ack_tx, ack_rx) = bounded(1);
        if self.sender.send(WriteCommand::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv().is_ok()
    }
}

/// Owns the background writer thread.
pub struct EventWriter {
    sink: EventSink,
    worker: Option<JoinHandle<()>>,
}

impl EventWriter {
    /// Start a writer thread pushing into `store`.
    pub fn spawn(
        store: Arc<dyn EventStore>,
        capacity: usize,
        log: SharedTransparencyLog,
    ) -> Result<Self, StoreError> {
        let (sender, receiver) = bounded(capacity.max(1));
        let worker_log = log.clone();

        let worker = thread::Builder::new()
            .name("event-writer".to_string())
            .spawn(move || run_worker(store, receiver, worker_log))
            .map_err(|e| StoreError::Worker(e.to_string()))?;

        Ok(Self {
            sink: EventSink { sender, log },
            worker: Some(worker),
        })
    }

    /// A handle for classifiers to submit writes through.
    pub fn sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// Block until every queued write has been attempted.
    pub fn flush(&self) -> bool {
        self.sink.flush()
    }

    /// Drain the queue and stop the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            // Queued writes ahead of the shutdown marker are still attempted.
            let _ = self.sink.sender.send(WriteCommand::Shutdown);
            if worker.join().is_err() {
                warn!("event writer thread panicked");
            }
        }
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(
    store: Arc<dyn EventStore>,
    receiver: Receiver<WriteCommand>,
    log: SharedTransparencyLog,
) {
    while let Ok(command) = receiver.recv() {
        match command {
            WriteCommand::Push { path, event } => match store.push(&path, event.to_record()) {
                Ok(key) => {
                    debug!(path = %path, key = %key, label = %event.label, "event written");
                    log.record_event_written();
                }
                Err(e) => {
                    warn!(path = %path, label = %event.label, "event write failed: {e}");
                    log.record_write_failure();
                }
            },
            WriteCommand::Flush(ack) => {
                let _ = ack.send(());
            }
            WriteCommand::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SubscriptionHandle;
    use crate::core::EventKind;
    use crate::store::{ChildListener, MemoryStore};
    use crate::transparency::create_shared_log;
    use chrono::Local;
    use serde_json::Value;

    struct FailingStore;

    impl EventStore for FailingStore {
        fn push(&self, _path: &str, _value: Value) -> Result<String, StoreError> {
            Err(StoreError::Network("offline".to_string()))
        }
        fn set(&self, _path: &str, _key: &str, _value: Value) -> Result<(), StoreError> {
            Err(StoreError::Network("offline".to_string()))
        }
        fn remove(&self, _path: &str, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Network("offline".to_string()))
        }
        fn subscribe_children(
            &self,
            _path: &str,
            _listener: ChildListener,
        ) -> Result<SubscriptionHandle, StoreError> {
            Err(StoreError::Network("offline".to_string()))
        }
        fn unsubscribe(&self, _handle: SubscriptionHandle) {}
    }

    fn event(label: &str) -> Event {
        Event::new(EventKind::Motion, label, Local::now().naive_local())
    }

    #[test]
    fn test_submitted_events_reach_the_store() {
        let store = Arc::new(MemoryStore::new());
        let log = create_shared_log();
        let writer = EventWriter::spawn(store.clone(), 16, log.clone()).unwrap();

        let sink = writer.sink();
        sink.submit("movimiento", event("leve"));
        sink.submit("movimiento", event("sacudida"));
        assert!(writer.flush());

        assert_eq!(store.children("movimiento").len(), 2);
        assert_eq!(log.stats().events_written, 2);
    }

    #[test]
    fn test_failed_writes_are_counted_not_raised() {
        let log = create_shared_log();
        let writer = EventWriter::spawn(Arc::new(FailingStore), 16, log.clone()).unwrap();

        writer.sink().submit("movimiento", event("leve"));
        assert!(writer.flush());

        let stats = log.stats();
        assert_eq!(stats.events_written, 0);
        assert_eq!(stats.write_failures, 1);
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let store = Arc::new(MemoryStore::new());
        let writer = EventWriter::spawn(store.clone(), 16, create_shared_log()).unwrap();

        let sink = writer.sink();
        for _ in 0..5 {
            sink.submit("proximidad", event("x"));
        }
        writer.shutdown();

        assert_eq!(store.children("proximidad").len(), 5);
        assert!(!sink.flush());
    }
}
