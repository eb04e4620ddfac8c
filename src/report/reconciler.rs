//! Merges the proximity and motion event streams into one ordered list.
//!
//! Both streams feed the same [`ReportBoard`]. Every mutation is an atomic
//! read-modify-write on the board's observable list, so notifications from
//! the two streams never interleave. Order across streams comes solely from
//! the sort on `occurred_at` (most recent first).

use crate::collector::SubscriptionHandle;
use crate::core::{Event, EventKind, Observable};
use crate::store::{ChildEvent, ChildListener, EventStore, StoreError, StorePaths};
use crate::transparency::SharedTransparencyLog;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One row of the report list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub kind: EventKind,
    pub label: String,
    pub occurred_at: NaiveDateTime,
    /// Store-assigned key
    pub key: String,
}

impl ReportItem {
    pub fn from_event(event: Event, key: impl Into<String>) -> Self {
        Self {
            kind: event.kind,
            label: event.label,
            occurred_at: event.occurred_at,
            key: key.into(),
        }
    }
}

fn sort_newest_first(items: &mut [ReportItem]) {
    // Stable: equal timestamps keep their relative order.
    items.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
}

/// The reconciled list and the operations that mutate it.
pub struct ReportBoard {
    items: Observable<Vec<ReportItem>>,
    active: AtomicBool,
    log: SharedTransparencyLog,
}

impl ReportBoard {
    pub fn new(log: SharedTransparencyLog) -> Self {
        Self {
            items: Observable::new(Vec::new()),
            active: AtomicBool::new(true),
            log,
        }
    }

    pub fn items(&self) -> &Observable<Vec<ReportItem>> {
        &self.items
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Apply one notification from the stream for `kind`.
    pub fn apply(&self, kind: EventKind, event: ChildEvent) {
        if !self.is_active() {
            return;
        }

        match event {
            ChildEvent::Added { key, value } => {
                let Some(decoded) = decode(kind, &value) else {
                    return;
                };
                let key = key.unwrap_or_else(|| {
                    let synthesized = Uuid::new_v4().to_string();
                    warn!(%kind, key = %synthesized, "added notification without a key; later updates to it cannot be matched");
                    synthesized
                });
                self.insert(ReportItem::from_event(decoded, key));
            }
            ChildEvent::Changed { key, value } => {
                let Some(key) = key else {
                    debug!(%kind, "changed notification without a key dropped");
                    return;
                };
                let Some(decoded) = decode(kind, &value) else {
                    return;
                };
                self.replace(ReportItem::from_event(decoded, key));
            }
            ChildEvent::Removed { key } => {
                if let Some(key) = key {
                    self.remove(&key);
                }
            }
            ChildEvent::Moved { key } => {
                debug!(%kind, ?key, "moved notification ignored");
            }
            ChildEvent::Cancelled { reason } => {
                warn!(%kind, "report stream cancelled, list may be stale: {reason}");
            }
        }
    }

    /// Insert (or overwrite by key) and re-sort.
    pub fn insert(&self, item: ReportItem) {
        if !self.is_active() {
            return;
        }
        self.log.record_report_received();
        self.items.update(|items| {
            match items.iter_mut().find(|existing| existing.key == item.key) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            sort_newest_first(items);
        });
    }

    /// Replace the entry with the same key and re-sort. Unknown keys are dropped.
    pub fn replace(&self, item: ReportItem) {
        if !self.is_active() {
            return;
        }
        self.log.record_report_received();
        self.items.update(|items| {
            if let Some(existing) = items.iter_mut().find(|existing| existing.key == item.key) {
                *existing = item;
                sort_newest_first(items);
            }
        });
    }

    /// Remove the entry with `key`, if present.
    pub fn remove(&self, key: &str) {
        if !self.is_active() {
            return;
        }
        self.log.record_report_received();
        self.items.update(|items| items.retain(|item| item.key != key));
    }

    /// Stop accepting notifications and release the list.
    fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.items.set(Vec::new());
    }
}

fn decode(kind: EventKind, value: &Value) -> Option<Event> {
    let event = Event::from_record(kind, value);
    if event.is_none() {
        debug!(%kind, "undecodable report record skipped");
    }
    event
}

/// Keeps a [`ReportBoard`] subscribed to both event streams.
pub struct Reconciler {
    board: Arc<ReportBoard>,
    store: Option<Arc<dyn EventStore>>,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl Reconciler {
    /// A reconciler fed by direct calls to [`Reconciler::apply`] only.
    pub fn detached(log: SharedTransparencyLog) -> Self {
        Self {
            board: Arc::new(ReportBoard::new(log)),
            store: None,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the proximity and motion nodes of `store`.
    pub fn attach(
        store: Arc<dyn EventStore>,
        paths: &StorePaths,
        log: SharedTransparencyLog,
    ) -> Result<Self, StoreError> {
        let board = Arc::new(ReportBoard::new(log));
        let mut handles = Vec::with_capacity(2);

        for kind in [EventKind::Proximity, EventKind::Motion] {
            let target = board.clone();
            let listener: ChildListener = Arc::new(move |event| target.apply(kind, event));
            match store.subscribe_children(paths.path_for(kind), listener) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    for handle in handles {
                        store.unsubscribe(handle);
                    }
                    return Err(e);
                }
            }
        }
        info!(
            proximity = %paths.proximity,
            motion = %paths.motion,
            "report streams subscribed"
        );

        Ok(Self {
            board,
            store: Some(store),
            subscriptions: Mutex::new(handles),
        })
    }

    /// The observable report list, newest first.
    pub fn reports(&self) -> &Observable<Vec<ReportItem>> {
        self.board.items()
    }

    /// A copy of the current list.
    pub fn snapshot(&self) -> Vec<ReportItem> {
        self.board.items().get()
    }

    /// Apply a notification as if it came from the stream for `kind`.
    pub fn apply(&self, kind: EventKind, event: ChildEvent) {
        self.board.apply(kind, event);
    }

    pub fn is_subscribed(&self) -> bool {
        self.board.is_active()
    }

    /// Unregister both listeners and release the list. Idempotent.
    pub fn unsubscribe(&self) {
        if let Ok(mut subscriptions) = self.subscriptions.lock() {
            if let Some(store) = &self.store {
                for handle in subscriptions.drain(..) {
                    store.unsubscribe(handle);
                }
            }
        }
        if self.board.is_active() {
            self.board.close();
            info!("report streams unsubscribed");
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use serde_json::json;

    fn proximity(label: &str, fecha: &str) -> Value {
        json!({"estado": label, "fecha": fecha})
    }

    fn motion(label: &str, fecha: &str) -> Value {
        json!({"tipo": label, "fecha": fecha})
    }

    fn added(key: &str, value: Value) -> ChildEvent {
        ChildEvent::Added {
            key: Some(key.to_string()),
            value,
        }
    }

    fn keys(reconciler: &Reconciler) -> Vec<String> {
        reconciler.snapshot().into_iter().map(|i| i.key).collect()
    }

    #[test]
    fn test_added_items_sort_newest_first() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("old", motion("leve", "2024-01-01 09:00:00")));
        reconciler.apply(EventKind::Motion, added("new", motion("leve", "2024-01-01 10:00:00")));

        let times: Vec<String> = reconciler
            .snapshot()
            .iter()
            .map(|i| i.occurred_at.format("%H:%M:%S").to_string())
            .collect();
        assert_eq!(times, vec!["10:00:00", "09:00:00"]);
    }

    #[test]
    fn test_changed_with_same_payload_is_idempotent() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Proximity, added("a", proximity("x", "2024-01-01 10:00:00")));
        reconciler.apply(EventKind::Motion, added("b", motion("leve", "2024-01-01 09:00:00")));
        let before = reconciler.snapshot();

        reconciler.apply(
            EventKind::Proximity,
            ChildEvent::Changed {
                key: Some("a".to_string()),
                value: proximity("x", "2024-01-01 10:00:00"),
            },
        );

        assert_eq!(reconciler.snapshot(), before);
    }

    #[test]
    fn test_changed_replaces_and_resorts() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("a", motion("leve", "2024-01-01 10:00:00")));
        reconciler.apply(EventKind::Motion, added("b", motion("leve", "2024-01-01 09:00:00")));

        reconciler.apply(
            EventKind::Motion,
            ChildEvent::Changed {
                key: Some("b".to_string()),
                value: motion("sacudida", "2024-01-01 11:00:00"),
            },
        );

        let list = reconciler.snapshot();
        assert_eq!(keys(&reconciler), vec!["b", "a"]);
        assert_eq!(list[0].label, "sacudida");
    }

    #[test]
    fn test_changed_for_unknown_key_is_dropped() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(
            EventKind::Motion,
            ChildEvent::Changed {
                key: Some("ghost".to_string()),
                value: motion("leve", "2024-01-01 10:00:00"),
            },
        );
        assert!(reconciler.snapshot().is_empty());
    }

    #[test]
    fn test_removing_unknown_key_is_a_noop() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("a", motion("leve", "2024-01-01 10:00:00")));
        let before = reconciler.snapshot();

        reconciler.apply(
            EventKind::Motion,
            ChildEvent::Removed {
                key: Some("zzz".to_string()),
            },
        );

        assert_eq!(reconciler.snapshot(), before);
    }

    #[test]
    fn test_keyless_added_gets_a_local_key() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(
            EventKind::Motion,
            ChildEvent::Added {
                key: None,
                value: motion("leve", "2024-01-01 10:00:00"),
            },
        );

        let list = reconciler.snapshot();
        assert_eq!(list.len(), 1);
        assert!(Uuid::parse_str(&list[0].key).is_ok());
    }

    #[test]
    fn test_duplicate_added_keeps_one_item_per_key() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("a", motion("leve", "2024-01-01 10:00:00")));
        reconciler.apply(EventKind::Motion, added("a", motion("sacudida", "2024-01-01 10:00:00")));

        let list = reconciler.snapshot();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].label, "sacudida");
    }

    #[test]
    fn test_undecodable_records_are_skipped() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("a", json!("not a record")));
        reconciler.apply(EventKind::Motion, added("b", motion("leve", "yesterday")));
        assert!(reconciler.snapshot().is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let reconciler = Reconciler::detached(create_shared_log());
        for key in ["first", "second", "third"] {
            reconciler.apply(EventKind::Motion, added(key, motion("leve", "2024-01-01 10:00:00")));
        }
        reconciler.apply(EventKind::Motion, added("later", motion("leve", "2024-01-01 10:00:01")));

        assert_eq!(keys(&reconciler), vec!["later", "first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_releases_and_freezes_the_list() {
        let reconciler = Reconciler::detached(create_shared_log());
        reconciler.apply(EventKind::Motion, added("a", motion("leve", "2024-01-01 10:00:00")));

        reconciler.unsubscribe();
        reconciler.apply(EventKind::Motion, added("b", motion("leve", "2024-01-01 11:00:00")));

        assert!(!reconciler.is_subscribed());
        assert!(reconciler.snapshot().is_empty());
    }
}
