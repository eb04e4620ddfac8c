//! In-process event store.
//!
//! Behaves like the remote database for a single process: push keys are
//! generated locally, existing children are replayed to new subscribers, and
//! every write fans out to the subscribers of its node. Notifications are
//! delivered synchronously on the writing thread, one write at a time.
//!
//! Listeners must not write back into the store they are subscribed to.

use crate::collector::SubscriptionHandle;
use crate::store::push_id::PushIdGenerator;
use crate::store::{validate_segment, ChildEvent, ChildListener, EventStore, StoreError};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Node = BTreeMap<String, Value>;

pub struct MemoryStore {
    tree: Mutex<BTreeMap<String, Node>>,
    listeners: Mutex<Vec<(SubscriptionHandle, String, ChildListener)>>,
    keys: Mutex<PushIdGenerator>,
    /// Serializes mutate-and-notify.
    dispatch: Mutex<()>,
    next_handle: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(BTreeMap::new()),
            listeners: Mutex::new(Vec::new()),
            keys: Mutex::new(PushIdGenerator::new()),
            dispatch: Mutex::new(()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Children currently stored under `path`, in key order.
    pub fn children(&self, path: &str) -> Vec<(String, Value)> {
        lock(&self.tree)
            .get(path)
            .map(|node| node.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn notify(&self, path: &str, event: ChildEvent) {
        let listeners: Vec<ChildListener> = lock(&self.listeners)
            .iter()
            .filter(|(_, p, _)| p == path)
            .map(|(_, _, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore for MemoryStore {
    fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        validate_segment(path)?;
        let _dispatch = lock(&self.dispatch);

        let key = lock(&self.keys).generate(Utc::now().timestamp_millis());
        lock(&self.tree)
            .entry(path.to_string())
            .or_default()
            .insert(key.clone(), value.clone());

        self.notify(
            path,
            ChildEvent::Added {
                key: Some(key.clone()),
                value,
            },
        );
        Ok(key)
    }

    fn set(&self, path: &str, key: &str, value: Value) -> Result<(), StoreError> {
        validate_segment(path)?;
        validate_segment(key)?;
        if value.is_null() {
            return self.remove(path, key);
        }
        let _dispatch = lock(&self.dispatch);

        let previous = lock(&self.tree)
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());

        let key = Some(key.to_string());
        match previous {
            None => self.notify(path, ChildEvent::Added { key, value }),
            Some(old) if old != value => self.notify(path, ChildEvent::Changed { key, value }),
            Some(_) => {}
        }
        Ok(())
    }

    fn remove(&self, path: &str, key: &str) -> Result<(), StoreError> {
        validate_segment(path)?;
        validate_segment(key)?;
        let _dispatch = lock(&self.dispatch);

        let removed = lock(&self.tree)
            .get_mut(path)
            .and_then(|node| node.remove(key));

        if removed.is_some() {
            self.notify(
                path,
                ChildEvent::Removed {
                    key: Some(key.to_string()),
                },
            );
        }
        Ok(())
    }

    fn subscribe_children(
        &self,
        path: &str,
        listener: ChildListener,
    ) -> Result<SubscriptionHandle, StoreError> {
        validate_segment(path)?;
        let _dispatch = lock(&self.dispatch);

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((handle, path.to_string(), listener.clone()));

        for (key, value) in self.children(path) {
            listener(ChildEvent::Added {
                key: Some(key),
                value,
            });
        }
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        lock(&self.listeners).retain(|(h, _, _)| *h != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> (ChildListener, Arc<Mutex<Vec<ChildEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let listener: ChildListener = Arc::new(move |e| sink.lock().unwrap().push(e));
        (listener, events)
    }

    #[test]
    fn test_push_notifies_added_with_key() {
        let store = MemoryStore::new();
        let (listener, events) = recorder();
        store.subscribe_children("movimiento", listener).unwrap();

        let key = store.push("movimiento", json!({"tipo": "leve"})).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![ChildEvent::Added {
                key: Some(key),
                value: json!({"tipo": "leve"})
            }]
        );
    }

    #[test]
    fn test_subscribe_replays_existing_children() {
        let store = MemoryStore::new();
        store.push("proximidad", json!({"estado": "a"})).unwrap();
        store.push("proximidad", json!({"estado": "b"})).unwrap();
        store.push("movimiento", json!({"tipo": "leve"})).unwrap();

        let (listener, events) = recorder();
        store.subscribe_children("proximidad", listener).unwrap();

        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_set_and_remove_notify_changes() {
        let store = MemoryStore::new();
        let (listener, events) = recorder();
        store.subscribe_children("proximidad", listener).unwrap();

        store.set("proximidad", "k1", json!({"estado": "a"})).unwrap();
        store.set("proximidad", "k1", json!({"estado": "a"})).unwrap();
        store.set("proximidad", "k1", json!({"estado": "b"})).unwrap();
        store.remove("proximidad", "k1").unwrap();
        store.remove("proximidad", "k1").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ChildEvent::Added { .. }));
        assert!(matches!(events[1], ChildEvent::Changed { .. }));
        assert!(matches!(events[2], ChildEvent::Removed { .. }));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let store = MemoryStore::new();
        let (listener, events) = recorder();
        let handle = store.subscribe_children("movimiento", listener).unwrap();

        store.unsubscribe(handle);
        store.push("movimiento", json!({"tipo": "leve"})).unwrap();

        assert!(events.lock().unwrap().is_empty());
        assert_eq!(store.subscription_count(), 0);
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.push("bad.path", json!({})),
            Err(StoreError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_pushed_keys_are_ordered() {
        let store = MemoryStore::new();
        for i in 0..20 {
            store.push("movimiento", json!({ "n": i })).unwrap();
        }
        let children = store.children("movimiento");
        let order: Vec<i64> = children.iter().map(|(_, v)| v["n"].as_i64().unwrap()).collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }
}
