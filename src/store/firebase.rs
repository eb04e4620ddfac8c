//! Firebase Realtime Database client over the REST API.
//!
//! Writes map to plain HTTP verbs on `{database_url}/{path}.json`; child
//! subscriptions hold an event-stream `GET` open and translate its
//! `put`/`patch` events into child notifications.
//!
//! The store runs its own multi-threaded tokio runtime so it can be used
//! from synchronous code (the event writer thread, the CLI).

use crate::collector::SubscriptionHandle;
use crate::store::stream::{ChildTracker, ServerEvent, SseParser};
use crate::store::{validate_segment, ChildEvent, ChildListener, EventStore, StoreError};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Database location.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Base URL, e.g. `https://my-db.firebaseio.com`
    pub database_url: String,
    /// Timeout for individual writes
    pub request_timeout: Duration,
}

impl FirebaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// URL of a node.
    pub fn node_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, path.trim_matches('/'))
    }

    /// URL of a child of a node.
    pub fn child_url(&self, path: &str, key: &str) -> String {
        format!("{}/{}/{}.json", self.database_url, path.trim_matches('/'), key)
    }
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Async REST client.
#[derive(Clone)]
pub struct FirebaseClient {
    config: FirebaseConfig,
    /// For writes; carries the request timeout
    client: reqwest::Client,
    /// For event streams, which stay open indefinitely
    stream_client: reqwest::Client,
}

impl FirebaseClient {
    pub fn new(config: FirebaseConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;
        let stream_client = reqwest::Client::builder()
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            stream_client,
        })
    }

    /// Append a value under `path`; returns the server-generated key.
    pub async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let response = self
            .client
            .post(self.config.node_url(path))
            .json(value)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let body: PushResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(body.name)
    }

    /// Write a value at `path/key`.
    pub async fn set(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let response = self
            .client
            .put(self.config.child_url(path, key))
            .json(value)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    /// Delete `path/key`.
    pub async fn remove(&self, path: &str, key: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.config.child_url(path, key))
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    /// Open an event stream on `path`.
    pub async fn open_stream(&self, path: &str) -> Result<reqwest::Response, StoreError> {
        let response = self
            .stream_client
            .get(self.config.node_url(path))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(StoreError::Server {
        status: status.as_u16(),
        message,
    })
}

/// Follow an event stream until it ends, forwarding child notifications.
async fn follow_children(client: FirebaseClient, path: String, listener: ChildListener) {
    let mut response = match client.open_stream(&path).await {
        Ok(response) => response,
        Err(e) => {
            warn!(path = %path, "could not open event stream: {e}");
            listener(ChildEvent::Cancelled {
                reason: e.to_string(),
            });
            return;
        }
    };
    info!(path = %path, "event stream opened");

    let mut parser = SseParser::new();
    let mut tracker = ChildTracker::new();

    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                warn!(path = %path, "event stream closed by server");
                listener(ChildEvent::Cancelled {
                    reason: "stream closed".to_string(),
                });
                return;
            }
            Err(e) => {
                warn!(path = %path, "event stream failed: {e}");
                listener(ChildEvent::Cancelled {
                    reason: e.to_string(),
                });
                return;
            }
        };

        for message in parser.feed(&chunk) {
            let event = match ServerEvent::parse(&message) {
                Ok(event) => event,
                Err(e) => {
                    debug!(path = %path, "skipping undecodable stream event: {e}");
                    continue;
                }
            };
            let cancelled = matches!(event, ServerEvent::Cancel(_));
            for child_event in tracker.apply(event) {
                listener(child_event);
            }
            if cancelled {
                warn!(path = %path, "event stream cancelled by server");
                return;
            }
        }
    }
}

/// Blocking [`EventStore`] backed by the REST client.
pub struct FirebaseStore {
    client: FirebaseClient,
    runtime: tokio::runtime::Runtime,
    streams: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
    next_handle: AtomicU64,
}

impl FirebaseStore {
    pub fn new(config: FirebaseConfig) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("firebase-store")
            .enable_all()
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            client: FirebaseClient::new(config)?,
            runtime,
            streams: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        })
    }
}

impl EventStore for FirebaseStore {
    fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        validate_segment(path)?;
        self.runtime.block_on(self.client.push(path, &value))
    }

    fn set(&self, path: &str, key: &str, value: Value) -> Result<(), StoreError> {
        validate_segment(path)?;
        validate_segment(key)?;
        self.runtime.block_on(self.client.set(path, key, &value))
    }

    fn remove(&self, path: &str, key: &str) -> Result<(), StoreError> {
        validate_segment(path)?;
        validate_segment(key)?;
        self.runtime.block_on(self.client.remove(path, key))
    }

    fn subscribe_children(
        &self,
        path: &str,
        listener: ChildListener,
    ) -> Result<SubscriptionHandle, StoreError> {
        validate_segment(path)?;
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let task = self.runtime.spawn(follow_children(
            self.client.clone(),
            path.to_string(),
            listener,
        ));
        if let Ok(mut streams) = self.streams.lock() {
            streams.insert(handle, task);
        }
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Ok(mut streams) = self.streams.lock() {
            if let Some(task) = streams.remove(&handle) {
                task.abort();
            }
        }
    }
}

impl Drop for FirebaseStore {
    fn drop(&mut self) {
        if let Ok(mut streams) = self.streams.lock() {
            for (_, task) in streams.drain() {
                task.abort();
            }
        }
    }
}
