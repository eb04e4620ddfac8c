//! Observable state holder shared between the pipeline and its readers.
//!
//! An [`Observable`] keeps the latest value only. Writers go through
//! [`Observable::set`] or [`Observable::update`]; both are serialized so that
//! concurrent writers never interleave a read-modify-write, and listeners
//! see every change in the order it was made.
//!
//! Listeners run on the writer's thread and must not write back into the
//! same observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked with the new value after every change.
pub type StateListener<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub struct Observable<T> {
    value: Mutex<T>,
    /// Held across mutate-and-notify so notifications keep mutation order.
    dispatch: Mutex<()>,
    listeners: Mutex<Vec<(ListenerId, StateListener<T>)>>,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Observable<T>
where
    T: Clone + PartialEq,
{
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            dispatch: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A copy of the current value.
    pub fn get(&self) -> T {
        lock(&self.value).clone()
    }

    /// Borrow the current value without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.value))
    }

    /// Register a listener for future changes. The current value is not replayed.
    pub fn subscribe(&self, listener: StateListener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Replace the value. Listeners are notified only if it changed.
    pub fn set(&self, value: T) -> bool {
        self.update(|current| *current = value)
    }

    /// Atomically modify the value in place.
    ///
    /// Returns whether the value changed; listeners are notified only then.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let _dispatch = lock(&self.dispatch);

        let next = {
            let mut current = lock(&self.value);
            let mut next = current.clone();
            f(&mut next);
            if next == *current {
                return false;
            }
            *current = next.clone();
            next
        };

        let listeners: Vec<StateListener<T>> =
            lock(&self.listeners).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&next);
        }
        true
    }
}

impl<T> Default for Observable<T>
where
    T: Clone + PartialEq + Default,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*lock(&self.value))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_notifies_only_on_change() {
        let state = Observable::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        state.subscribe(Arc::new(move |v: &u32| sink.lock().unwrap().push(*v)));

        assert!(state.set(1));
        assert!(!state.set(1));
        assert!(state.set(2));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(state.get(), 2);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let state = Observable::new(String::new());
        let calls = Arc::new(AtomicU64::new(0));

        let counter = calls.clone();
        let id = state.subscribe(Arc::new(move |_: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        state.set("a".to_string());
        assert!(state.unsubscribe(id));
        assert!(!state.unsubscribe(id));
        state.set("b".to_string());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let state = Arc::new(Observable::new(Vec::<u32>::new()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let state = state.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        state.update(|v| v.push(t * 100 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.with(|v| v.len()), 400);
    }
}
