//! Realtime Database event-stream decoding.
//!
//! A streaming `GET` on a node yields server-sent events:
//!
//! ```text
//! event: put
//! data: {"path":"/","data":{"-Nk1":{"tipo":"leve","fecha":"2024-01-01 10:00:00"}}}
//!
//! event: patch
//! data: {"path":"/-Nk1","data":{"tipo":"sacudida"}}
//! ```
//!
//! [`SseParser`] splits the byte stream into messages, [`ServerEvent`] gives
//! them meaning, and [`ChildTracker`] turns path-level writes into the
//! child-level notifications subscribers expect.

use crate::store::{ChildEvent, StoreError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Incremental SSE decoder; chunks may split lines or UTF-8 sequences.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.pending.extend_from_slice(chunk);
        let mut messages = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if self.event.is_some() || !self.data.is_empty() {
                    messages.push(SseMessage {
                        event: self.event.take().unwrap_or_else(|| "message".to_string()),
                        data: std::mem::take(&mut self.data).join("\n"),
                    });
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        messages
    }
}

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Put { path: String, data: Value },
    Patch { path: String, data: Value },
    KeepAlive,
    /// The server ended the stream (rules changed, auth revoked).
    Cancel(String),
    Other(String),
}

#[derive(Deserialize)]
struct PathPayload {
    path: String,
    data: Value,
}

impl ServerEvent {
    pub fn parse(message: &SseMessage) -> Result<Self, StoreError> {
        match message.event.as_str() {
            "put" | "patch" => {
                let payload: PathPayload = serde_json::from_str(&message.data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(if message.event == "put" {
                    ServerEvent::Put {
                        path: payload.path,
                        data: payload.data,
                    }
                } else {
                    ServerEvent::Patch {
                        path: payload.path,
                        data: payload.data,
                    }
                })
            }
            "keep-alive" => Ok(ServerEvent::KeepAlive),
            "cancel" => Ok(ServerEvent::Cancel(message.data.clone())),
            "auth_revoked" => Ok(ServerEvent::Cancel("auth revoked".to_string())),
            other => Ok(ServerEvent::Other(other.to_string())),
        }
    }
}

/// Mirror of a node's children, used to classify incoming writes.
#[derive(Debug, Default)]
pub struct ChildTracker {
    children: BTreeMap<String, Value>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Apply a server event and return the resulting child notifications.
    pub fn apply(&mut self, event: ServerEvent) -> Vec<ChildEvent> {
        match event {
            ServerEvent::Put { path, data } => self.put(&path, data),
            ServerEvent::Patch { path, data } => {
                let Value::Object(fields) = data else {
                    return Vec::new();
                };
                let base = path.trim_end_matches('/');
                fields
                    .into_iter()
                    .flat_map(|(field, value)| self.put(&format!("{base}/{field}"), value))
                    .collect()
            }
            ServerEvent::Cancel(reason) => vec![ChildEvent::Cancelled { reason }],
            ServerEvent::KeepAlive | ServerEvent::Other(_) => Vec::new(),
        }
    }

    fn put(&mut self, path: &str, data: Value) -> Vec<ChildEvent> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.split_first() {
            None => self.replace_all(data),
            Some((key, [])) => self.set_child(key, data),
            Some((key, rest)) => {
                let mut child = self.children.get(*key).cloned().unwrap_or(Value::Null);
                set_at(&mut child, rest, data);
                self.set_child(key, child)
            }
        }
    }

    fn replace_all(&mut self, data: Value) -> Vec<ChildEvent> {
        let incoming: BTreeMap<String, Value> = match data {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };

        let gone: Vec<String> = self
            .children
            .keys()
            .filter(|k| !incoming.contains_key(*k))
            .cloned()
            .collect();

        let mut events = Vec::new();
        for key in gone {
            events.extend(self.set_child(&key, Value::Null));
        }
        for (key, value) in incoming {
            events.extend(self.set_child(&key, value));
        }
        events
    }

    fn set_child(&mut self, key: &str, value: Value) -> Vec<ChildEvent> {
        let key_owned = Some(key.to_string());

        if is_empty_value(&value) {
            return match self.children.remove(key) {
                Some(_) => vec![ChildEvent::Removed { key: key_owned }],
                None => Vec::new(),
            };
        }

        match self.children.insert(key.to_string(), value.clone()) {
            None => vec![ChildEvent::Added {
                key: key_owned,
                value,
            }],
            Some(old) if old != value => vec![ChildEvent::Changed {
                key: key_owned,
                value,
            }],
            Some(_) => Vec::new(),
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Write `data` at a nested path inside `target`; `null` deletes.
fn set_at(target: &mut Value, path: &[&str], data: Value) {
    let Some((head, tail)) = path.split_first() else {
        *target = data;
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        if tail.is_empty() && data.is_null() {
            map.remove(*head);
        } else {
            let entry = map.entry(head.to_string()).or_insert(Value::Null);
            set_at(entry, tail, data);
            if is_empty_value(entry) {
                map.remove(*head);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn put(path: &str, data: Value) -> ServerEvent {
        ServerEvent::Put {
            path: path.to_string(),
            data,
        }
    }

    #[test]
    fn test_parser_handles_split_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: put\ndata: {\"pa").is_empty());
        let messages = parser.feed(b"th\":\"/\",\"data\":null}\n\n");

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "put");
        assert_eq!(messages[0].data, r#"{"path":"/","data":null}"#);
    }

    #[test]
    fn test_parser_handles_crlf_and_comments() {
        let mut parser = SseParser::new();
        let messages = parser.feed(b": hello\r\nevent: keep-alive\r\ndata: null\r\n\r\n");
        assert_eq!(
            messages,
            vec![SseMessage {
                event: "keep-alive".to_string(),
                data: "null".to_string()
            }]
        );
    }

    #[test]
    fn test_server_event_parsing() {
        let msg = SseMessage {
            event: "patch".to_string(),
            data: r#"{"path":"/k1","data":{"tipo":"leve"}}"#.to_string(),
        };
        assert_eq!(
            ServerEvent::parse(&msg).unwrap(),
            ServerEvent::Patch {
                path: "/k1".to_string(),
                data: json!({"tipo": "leve"})
            }
        );

        let revoked = SseMessage {
            event: "auth_revoked".to_string(),
            data: "null".to_string(),
        };
        assert!(matches!(
            ServerEvent::parse(&revoked).unwrap(),
            ServerEvent::Cancel(_)
        ));
    }

    #[test]
    fn test_initial_put_adds_every_child() {
        let mut tracker = ChildTracker::new();
        let events = tracker.apply(put(
            "/",
            json!({"a": {"tipo": "leve"}, "b": {"tipo": "sacudida"}}),
        ));

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, ChildEvent::Added { .. })));
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn test_child_put_adds_changes_and_removes() {
        let mut tracker = ChildTracker::new();
        tracker.apply(put("/", json!({"a": {"tipo": "leve"}})));

        let added = tracker.apply(put("/b", json!({"tipo": "sacudida"})));
        assert!(matches!(&added[..], [ChildEvent::Added { key: Some(k), .. }] if k == "b"));

        let changed = tracker.apply(put("/a/tipo", json!("sacudida")));
        assert_eq!(
            changed,
            vec![ChildEvent::Changed {
                key: Some("a".to_string()),
                value: json!({"tipo": "sacudida"})
            }]
        );

        let removed = tracker.apply(put("/a", Value::Null));
        assert_eq!(
            removed,
            vec![ChildEvent::Removed {
                key: Some("a".to_string())
            }]
        );
    }

    #[test]
    fn test_root_put_removes_missing_children() {
        let mut tracker = ChildTracker::new();
        tracker.apply(put("/", json!({"a": 1, "b": 2})));

        let events = tracker.apply(put("/", json!({"b": 2})));
        assert_eq!(
            events,
            vec![ChildEvent::Removed {
                key: Some("a".to_string())
            }]
        );
    }

    #[test]
    fn test_patch_updates_several_children() {
        let mut tracker = ChildTracker::new();
        tracker.apply(put("/", json!({"a": {"tipo": "leve"}})));

        let events = tracker.apply(ServerEvent::Patch {
            path: "/".to_string(),
            data: json!({"a": null, "c": {"tipo": "leve"}}),
        });

        assert_eq!(events.len(), 2);
        assert!(events.contains(&ChildEvent::Removed {
            key: Some("a".to_string())
        }));
        assert!(tracker.len() == 1);
    }

    #[test]
    fn test_clearing_last_field_removes_child() {
        let mut tracker = ChildTracker::new();
        tracker.apply(put("/", json!({"a": {"tipo": "leve"}})));

        let events = tracker.apply(put("/a/tipo", Value::Null));
        assert_eq!(
            events,
            vec![ChildEvent::Removed {
                key: Some("a".to_string())
            }]
        );
        assert!(tracker.is_empty());
    }
}
