//! Pipeline event publication.
//!
//! Components publish named notifications (`decision_tracked`,
//! `decision_status_updated`, ...) through the [`EventPublisher`] trait.
//! Publication failures are logged by the caller and never roll back state.

use crate::error::FsResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Logical notification names published by the core.
pub mod names {
    pub const DECISION_TRACKED: &str = "decision_tracked";
    pub const DECISION_STATUS_UPDATED: &str = "decision_status_updated";
    pub const DECISION_EXECUTED: &str = "decision_executed";
    pub const FEEDBACK_PROCESSED: &str = "feedback_processed";
    pub const LEARNING_COMPLETED: &str = "learning_completed";
    pub const LEARNING_RESET: &str = "learning_reset";
    pub const ALERT_CREATED: &str = "alert_created";
    pub const ALERT_RESOLVED: &str = "alert_resolved";
}

/// A published notification with its payload snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    pub data: HashMap<String, serde_json::Value>,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(name: impl Into<String>, data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            data,
            published_at: Utc::now(),
        }
    }
}

/// Publisher contract. Implementations must be cheap to clone behind `Arc`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_notification(
        &self,
        name: &str,
        data: HashMap<String, serde_json::Value>,
    ) -> FsResult<()>;
}

/// Publisher that drops every notification. Useful when no consumer exists.
#[derive(Debug, Default)]
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish_notification(
        &self,
        _name: &str,
        _data: HashMap<String, serde_json::Value>,
    ) -> FsResult<()> {
        Ok(())
    }
}

/// Publisher that records notifications in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Notification>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.name == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish_notification(
        &self,
        name: &str,
        data: HashMap<String, serde_json::Value>,
    ) -> FsResult<()> {
        self.events.lock().unwrap().push(Notification::new(name, data));
        Ok(())
    }
}

/// Publisher that fans notifications out to live subscribers.
///
/// Slow or absent subscribers never block publication; a lagging receiver
/// simply misses events (tokio broadcast semantics).
pub struct BroadcastPublisher {
    sender: tokio::sync::broadcast::Sender<Notification>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish_notification(
        &self,
        name: &str,
        data: HashMap<String, serde_json::Value>,
    ) -> FsResult<()> {
        // A send error only means there is no subscriber right now.
        let _ = self.sender.send(Notification::new(name, data));
        Ok(())
    }
}

/// Convenience: build a payload map from `(key, value)` pairs.
pub fn payload<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> HashMap<String, serde_json::Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn recording_publisher_preserves_order() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish_notification(names::DECISION_TRACKED, payload([("decision_id", json!("a"))]))
            .await
            .unwrap();
        publisher
            .publish_notification(names::DECISION_EXECUTED, payload([("decision_id", json!("b"))]))
            .await
            .unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, names::DECISION_TRACKED);
        assert_eq!(events[1].data["decision_id"], json!("b"));
    }
}
