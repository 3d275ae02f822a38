//! Feedback processing.
//!
//! Stores feedback entries per decision and globally, publishes
//! `feedback_processed` notifications (or queues them in offline mode), and
//! answers filtered queries over the stored entries.

use crate::error::{ErrorCode, FlipsyncError, FsResult};
use crate::events::{names, payload, EventPublisher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, error};
use uuid::Uuid;

/// A stored feedback entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub feedback_id: String,
    pub decision_id: String,
    pub feedback_data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Summary of the well-known fields, used in event payloads.
    fn summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        for key in [
            "quality",
            "relevance",
            "category",
            "battery_efficient",
            "network_efficient",
        ] {
            if let Some(value) = self.feedback_data.get(key) {
                summary.insert(key.to_string(), value.clone());
            }
        }
        summary
    }
}

/// Filter over stored feedback. `data` keys match against `feedback_data`.
#[derive(Debug, Clone, Default)]
pub struct FeedbackFilter {
    pub decision_id: Option<String>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub data: HashMap<String, serde_json::Value>,
}

impl FeedbackFilter {
    fn matches(&self, entry: &FeedbackEntry) -> bool {
        if let Some(ref decision_id) = self.decision_id {
            if &entry.decision_id != decision_id {
                return false;
            }
        }
        if let Some(after) = self.after {
            if entry.timestamp < after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if entry.timestamp > before {
                return false;
            }
        }
        self.data
            .iter()
            .all(|(key, value)| entry.feedback_data.get(key) == Some(value))
    }
}

#[derive(Default)]
struct FeedbackState {
    entries: HashMap<String, FeedbackEntry>,
    by_decision: HashMap<String, Vec<String>>,
    /// Feedback ids whose publication is pending an offline drain.
    offline: HashSet<String>,
    /// Offline ids in arrival order, so drains replay chronologically.
    offline_order: Vec<String>,
}

/// In-memory feedback processor.
pub struct InMemoryFeedbackProcessor {
    processor_id: String,
    publisher: Arc<dyn EventPublisher>,
    offline_buffer_cap: usize,
    state: RwLock<FeedbackState>,
}

impl InMemoryFeedbackProcessor {
    pub fn new(processor_id: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_offline_cap(processor_id, publisher, 1024)
    }

    pub fn with_offline_cap(
        processor_id: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
        offline_buffer_cap: usize,
    ) -> Self {
        Self {
            processor_id: processor_id.into(),
            publisher,
            offline_buffer_cap,
            state: RwLock::new(FeedbackState::default()),
        }
    }

    /// Store feedback for a decision and return its id.
    pub async fn process_feedback(
        &self,
        decision_id: &str,
        feedback_data: HashMap<String, serde_json::Value>,
        publish_event: bool,
        offline: bool,
    ) -> FsResult<String> {
        debug!(
            "[{}] Processing feedback for decision {}",
            self.processor_id, decision_id
        );

        let entry = FeedbackEntry {
            feedback_id: Uuid::new_v4().to_string(),
            decision_id: decision_id.to_string(),
            feedback_data,
            timestamp: Utc::now(),
        };
        let feedback_id = entry.feedback_id.clone();
        let event_data = feedback_event_payload(&entry);

        {
            let mut state = self.state.write().unwrap();
            if offline && state.offline.len() >= self.offline_buffer_cap {
                return Err(FlipsyncError::new(
                    ErrorCode::OfflineBufferFull,
                    format!("offline feedback buffer at capacity ({})", self.offline_buffer_cap),
                ));
            }
            state
                .by_decision
                .entry(decision_id.to_string())
                .or_default()
                .push(feedback_id.clone());
            state.entries.insert(feedback_id.clone(), entry);
            if offline {
                state.offline.insert(feedback_id.clone());
                state.offline_order.push(feedback_id.clone());
                debug!("Added feedback {} to offline queue", feedback_id);
                return Ok(feedback_id);
            }
        }

        if publish_event {
            if let Err(e) = self
                .publisher
                .publish_notification(names::FEEDBACK_PROCESSED, event_data)
                .await
            {
                error!("Error publishing feedback_processed event: {}", e);
            }
        }
        Ok(feedback_id)
    }

    pub fn get_feedback(&self, feedback_id: &str) -> Option<FeedbackEntry> {
        self.state.read().unwrap().entries.get(feedback_id).cloned()
    }

    /// All feedback for a decision, in arrival order.
    pub fn feedback_for_decision(&self, decision_id: &str) -> Vec<FeedbackEntry> {
        let state = self.state.read().unwrap();
        state
            .by_decision
            .get(decision_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_feedback(&self, filter: Option<&FeedbackFilter>) -> Vec<FeedbackEntry> {
        let state = self.state.read().unwrap();
        let mut entries: Vec<FeedbackEntry> = state
            .entries
            .values()
            .filter(|entry| filter.map(|f| f.matches(entry)).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        entries
    }

    /// Publish queued offline feedback in original order; returns the count.
    pub async fn sync_offline_feedback(&self) -> usize {
        let pending: Vec<FeedbackEntry> = {
            let state = self.state.read().unwrap();
            state
                .offline_order
                .iter()
                .filter_map(|id| state.entries.get(id).cloned())
                .collect()
        };

        let mut count = 0;
        for entry in &pending {
            match self
                .publisher
                .publish_notification(names::FEEDBACK_PROCESSED, feedback_event_payload(entry))
                .await
            {
                Ok(()) => count += 1,
                Err(e) => error!("Error syncing offline feedback: {}", e),
            }
        }

        let mut state = self.state.write().unwrap();
        state.offline.clear();
        state.offline_order.clear();
        count
    }
}

fn feedback_event_payload(entry: &FeedbackEntry) -> HashMap<String, serde_json::Value> {
    let mut data = payload([
        ("feedback_id", json!(entry.feedback_id)),
        ("decision_id", json!(entry.decision_id)),
        ("timestamp", json!(entry.timestamp.to_rfc3339())),
    ]);
    data.insert("summary".to_string(), json!(entry.summary()));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingPublisher;

    fn feedback_data(quality: f64) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("outcome".to_string(), json!("success")),
            ("quality".to_string(), json!(quality)),
        ])
    }

    #[tokio::test]
    async fn stores_and_indexes_by_decision() {
        let processor =
            InMemoryFeedbackProcessor::new("fp", Arc::new(RecordingPublisher::new()));
        let id_a = processor
            .process_feedback("d1", feedback_data(0.9), false, false)
            .await
            .unwrap();
        processor
            .process_feedback("d1", feedback_data(0.4), false, false)
            .await
            .unwrap();
        processor
            .process_feedback("d2", feedback_data(0.5), false, false)
            .await
            .unwrap();

        let for_d1 = processor.feedback_for_decision("d1");
        assert_eq!(for_d1.len(), 2);
        assert_eq!(for_d1[0].feedback_id, id_a);
    }

    #[tokio::test]
    async fn filters_match_data_keys() {
        let processor =
            InMemoryFeedbackProcessor::new("fp", Arc::new(RecordingPublisher::new()));
        processor
            .process_feedback("d1", feedback_data(0.9), false, false)
            .await
            .unwrap();
        processor
            .process_feedback("d2", feedback_data(0.4), false, false)
            .await
            .unwrap();

        let filter = FeedbackFilter {
            data: HashMap::from([("quality".to_string(), json!(0.9))]),
            ..Default::default()
        };
        let matched = processor.list_feedback(Some(&filter));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].decision_id, "d1");
    }

    #[tokio::test]
    async fn offline_feedback_drains_once() {
        let publisher = Arc::new(RecordingPublisher::new());
        let processor = InMemoryFeedbackProcessor::new("fp", publisher.clone());
        processor
            .process_feedback("d1", feedback_data(0.9), true, true)
            .await
            .unwrap();
        assert!(publisher.events().is_empty());

        assert_eq!(processor.sync_offline_feedback().await, 1);
        assert_eq!(publisher.events_named(names::FEEDBACK_PROCESSED).len(), 1);
        assert_eq!(processor.sync_offline_feedback().await, 0);
    }
}
