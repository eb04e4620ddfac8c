//! Remote event store access.
//!
//! The store is a tree of nodes whose children carry store-assigned keys.
//! Writers push records under a node; readers subscribe to child-level
//! notifications on that node.

pub mod memory;
pub mod push_id;
pub mod writer;

#[cfg(feature = "firebase")]
pub mod firebase;
#[cfg(feature = "firebase")]
pub mod stream;

use crate::core::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub use crate::collector::SubscriptionHandle;
pub use memory::MemoryStore;
pub use push_id::PushIdGenerator;
pub use writer::{EventSink, EventWriter};

#[cfg(feature = "firebase")]
pub use firebase::{FirebaseClient, FirebaseConfig, FirebaseStore};

/// Node holding proximity events.
pub const PROXIMITY_PATH: &str = "proximidad";
/// Node holding motion events.
pub const MOTION_PATH: &str = "movimiento";

/// A child-level change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { key: Option<String>, value: Value },
    Changed { key: Option<String>, value: Value },
    Removed { key: Option<String> },
    Moved { key: Option<String> },
    /// The store stopped delivering notifications for this subscription.
    Cancelled { reason: String },
}

/// Callback receiving child notifications for one node.
pub type ChildListener = Arc<dyn Fn(ChildEvent) + Send + Sync>;

/// Store client errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path '{0}'")]
    InvalidPath(String),
    #[error("store network error: {0}")]
    Network(String),
    #[error("store server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("store serialization error: {0}")]
    Serialization(String),
    #[error("store config error: {0}")]
    Config(String),
    #[error("event writer error: {0}")]
    Worker(String),
}

/// A tree-structured key-value store with child notifications.
pub trait EventStore: Send + Sync {
    /// Append a value under `path` and return the generated key.
    fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Write a value at `path/key`, creating or replacing it.
    fn set(&self, path: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Delete `path/key`. Deleting a missing child is not an error.
    fn remove(&self, path: &str, key: &str) -> Result<(), StoreError>;

    /// Receive child notifications for `path`. Existing children are
    /// delivered first as `Added`.
    fn subscribe_children(
        &self,
        path: &str,
        listener: ChildListener,
    ) -> Result<SubscriptionHandle, StoreError>;

    /// Stop a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}

/// Node names for the two event streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePaths {
    pub proximity: String,
    pub motion: String,
}

impl Default for StorePaths {
    fn default() -> Self {
        Self {
            proximity: PROXIMITY_PATH.to_string(),
            motion: MOTION_PATH.to_string(),
        }
    }
}

impl StorePaths {
    pub fn path_for(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Proximity => &self.proximity,
            EventKind::Motion => &self.motion,
        }
    }
}

/// Reject paths and keys the database would refuse.
pub fn validate_segment(segment: &str) -> Result<(), StoreError> {
    let invalid = segment.is_empty()
        || segment
            .split('/')
            .any(|part| part.is_empty() || part.contains(['.', '#', '$', '[', ']']));
    if invalid {
        Err(StoreError::InvalidPath(segment.to_string()))
    } else {
        Ok(())
    }
}
