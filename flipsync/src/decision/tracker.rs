//! Decision tracking.
//!
//! The tracker owns the decision table, the append-only history, and the
//! aggregate metrics. It is the only component allowed to advance a
//! decision's status; all state changes happen inside one critical section
//! so per-id updates are linearizable.

use super::models::{Decision, DecisionFilter, DecisionStatus};
use crate::error::{ErrorCode, FlipsyncError, FsResult};
use crate::events::{names, payload, EventPublisher};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, warn};

/// Aggregate metrics maintained incrementally by the tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub total_decisions: u64,
    pub decisions_by_status: HashMap<String, u64>,
    pub decisions_by_type: HashMap<String, u64>,
    pub average_confidence: f64,
}

#[derive(Default)]
struct TrackerState {
    decisions: HashMap<String, Decision>,
    history: Vec<Decision>,
    offline_decisions: Vec<Decision>,
    metrics: DecisionMetrics,
}

impl TrackerState {
    fn record_new(&mut self, decision: &Decision) {
        self.metrics.total_decisions += 1;
        *self
            .metrics
            .decisions_by_status
            .entry(decision.metadata.status.as_str().to_string())
            .or_insert(0) += 1;
        *self
            .metrics
            .decisions_by_type
            .entry(decision.decision_type.as_str().to_string())
            .or_insert(0) += 1;

        let total = self.metrics.total_decisions as f64;
        let previous_sum = self.metrics.average_confidence * (total - 1.0);
        self.metrics.average_confidence = (previous_sum + decision.confidence) / total;
    }
}

/// In-memory decision tracker publishing lifecycle notifications.
pub struct InMemoryDecisionTracker {
    tracker_id: String,
    publisher: Arc<dyn EventPublisher>,
    offline_buffer_cap: usize,
    state: RwLock<TrackerState>,
}

impl InMemoryDecisionTracker {
    pub fn new(tracker_id: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_offline_cap(tracker_id, publisher, 1024)
    }

    pub fn with_offline_cap(
        tracker_id: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
        offline_buffer_cap: usize,
    ) -> Self {
        Self {
            tracker_id: tracker_id.into(),
            publisher,
            offline_buffer_cap,
            state: RwLock::new(TrackerState::default()),
        }
    }

    /// Track a decision. In offline mode the publication is queued instead
    /// of emitted; `OFFLINE_BUFFER_FULL` is returned when the queue is at
    /// capacity (the decision itself is still stored).
    pub async fn track_decision(
        &self,
        decision: &Decision,
        publish_event: bool,
        offline: bool,
    ) -> FsResult<()> {
        debug!("[{}] Tracking decision {}", self.tracker_id, decision.id());

        let stored = {
            let mut state = self.state.write().unwrap();
            // Re-tracking a known id must not clobber its current status.
            let stored = if let Some(existing) = state.decisions.get(decision.id()) {
                existing.clone()
            } else {
                state
                    .decisions
                    .insert(decision.id().to_string(), decision.clone());
                state.record_new(decision);
                decision.clone()
            };
            state.history.push(stored.clone());

            if offline {
                let queued = state
                    .offline_decisions
                    .iter()
                    .any(|d| d.id() == decision.id());
                if !queued {
                    if state.offline_decisions.len() >= self.offline_buffer_cap {
                        return Err(FlipsyncError::new(
                            ErrorCode::OfflineBufferFull,
                            format!(
                                "offline decision buffer at capacity ({})",
                                self.offline_buffer_cap
                            ),
                        ));
                    }
                    state.offline_decisions.push(stored.clone());
                    debug!("Added decision {} to offline queue", decision.id());
                }
                return Ok(());
            }
            stored
        };

        if publish_event {
            if let Err(e) = self
                .publisher
                .publish_notification(names::DECISION_TRACKED, tracked_payload(&stored))
                .await
            {
                error!("Error publishing decision_tracked event: {}", e);
            }
        }
        Ok(())
    }

    /// Advance the status of a tracked decision.
    ///
    /// Returns `false` when the decision is unknown or the transition is not
    /// permitted by the state machine (including an exhausted retry budget).
    pub async fn update_decision_status(
        &self,
        decision_id: &str,
        status: DecisionStatus,
        publish_event: bool,
    ) -> bool {
        debug!("Updating decision {} status to {}", decision_id, status);

        let previous_status = {
            let mut state = self.state.write().unwrap();
            let Some(decision) = state.decisions.get_mut(decision_id) else {
                warn!("Decision {} not found", decision_id);
                return false;
            };

            let previous = decision.metadata.status;
            if !previous.can_transition_to(status) {
                warn!(
                    "Rejected transition {} -> {} for decision {}",
                    previous, status, decision_id
                );
                return false;
            }
            // A retry re-enters execution; it consumes one unit of budget.
            if previous == DecisionStatus::Failed && status == DecisionStatus::Executing {
                if decision.metadata.retry_count >= decision.metadata.max_retries {
                    warn!("Retry budget exhausted for decision {}", decision_id);
                    return false;
                }
                decision.metadata.retry_count += 1;
            }

            decision.update_status(status);

            let previous_key = previous.as_str().to_string();
            if let Some(count) = state.metrics.decisions_by_status.get_mut(&previous_key) {
                *count = count.saturating_sub(1);
            }
            *state
                .metrics
                .decisions_by_status
                .entry(status.as_str().to_string())
                .or_insert(0) += 1;
            previous
        };

        if publish_event {
            let data = payload([
                ("decision_id", json!(decision_id)),
                ("status", json!(status.as_str())),
                ("previous_status", json!(previous_status.as_str())),
                ("timestamp", json!(Utc::now().to_rfc3339())),
            ]);
            if let Err(e) = self
                .publisher
                .publish_notification(names::DECISION_STATUS_UPDATED, data)
                .await
            {
                error!("Error publishing decision_status_updated event: {}", e);
            }
        }
        true
    }

    pub fn get_decision(&self, decision_id: &str) -> Option<Decision> {
        self.state.read().unwrap().decisions.get(decision_id).cloned()
    }

    /// Snapshot of the decision history, optionally filtered.
    pub fn get_decision_history(&self, filter: Option<&DecisionFilter>) -> Vec<Decision> {
        let state = self.state.read().unwrap();
        state
            .history
            .iter()
            .filter(|d| filter.map(|f| f.matches(d)).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Global metrics, or metrics recomputed over a filtered history.
    pub fn get_decision_metrics(&self, filter: Option<&DecisionFilter>) -> DecisionMetrics {
        let state = self.state.read().unwrap();
        let Some(filter) = filter else {
            return state.metrics.clone();
        };

        let filtered: Vec<&Decision> = state.history.iter().filter(|d| filter.matches(d)).collect();
        let mut metrics = DecisionMetrics {
            total_decisions: filtered.len() as u64,
            ..Default::default()
        };
        for decision in &filtered {
            *metrics
                .decisions_by_status
                .entry(decision.metadata.status.as_str().to_string())
                .or_insert(0) += 1;
            *metrics
                .decisions_by_type
                .entry(decision.decision_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        if !filtered.is_empty() {
            metrics.average_confidence =
                filtered.iter().map(|d| d.confidence).sum::<f64>() / filtered.len() as f64;
        }
        metrics
    }

    /// Number of decisions waiting in the offline queue.
    pub fn offline_queue_len(&self) -> usize {
        self.state.read().unwrap().offline_decisions.len()
    }

    /// Drain the offline queue, re-publishing `decision_tracked` events in
    /// original order. Returns the number of decisions synchronized.
    pub async fn sync_offline_decisions(&self) -> usize {
        let pending: Vec<Decision> = {
            let state = self.state.read().unwrap();
            state.offline_decisions.clone()
        };
        debug!(
            "[{}] Syncing {} offline decisions",
            self.tracker_id,
            pending.len()
        );

        let mut count = 0;
        for decision in &pending {
            match self
                .publisher
                .publish_notification(names::DECISION_TRACKED, tracked_payload(decision))
                .await
            {
                Ok(()) => count += 1,
                Err(e) => error!("Error syncing offline decision: {}", e),
            }
        }

        self.state.write().unwrap().offline_decisions.clear();
        count
    }
}

fn tracked_payload(decision: &Decision) -> HashMap<String, serde_json::Value> {
    payload([
        ("decision_id", json!(decision.id())),
        ("decision_type", json!(decision.decision_type.as_str())),
        ("action", json!(decision.action)),
        ("confidence", json!(decision.confidence)),
        ("status", json!(decision.metadata.status.as_str())),
        ("decision_source", json!(decision.metadata.source)),
        ("timestamp", json!(Utc::now().to_rfc3339())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::models::{Context, DecisionType};
    use crate::events::RecordingPublisher;

    fn decision(confidence: f64) -> Decision {
        Decision::create(
            DecisionType::Selection,
            "opt",
            confidence,
            "Selected option 'opt'",
            vec![],
            Some("maker".to_string()),
            Context::new(),
            false,
            false,
        )
    }

    fn tracker() -> (Arc<RecordingPublisher>, InMemoryDecisionTracker) {
        let publisher = Arc::new(RecordingPublisher::new());
        let tracker = InMemoryDecisionTracker::new("tracker", publisher.clone());
        (publisher, tracker)
    }

    #[tokio::test]
    async fn metrics_update_incrementally() {
        let (_, tracker) = tracker();
        tracker.track_decision(&decision(0.4), false, false).await.unwrap();
        tracker.track_decision(&decision(0.8), false, false).await.unwrap();

        let metrics = tracker.get_decision_metrics(None);
        assert_eq!(metrics.total_decisions, 2);
        assert_eq!(metrics.decisions_by_status["pending"], 2);
        assert_eq!(metrics.decisions_by_type["selection"], 2);
        assert!((metrics.average_confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn status_update_moves_counters() {
        let (_, tracker) = tracker();
        let d = decision(0.5);
        tracker.track_decision(&d, false, false).await.unwrap();

        assert!(tracker.update_decision_status(d.id(), DecisionStatus::Approved, false).await);
        let metrics = tracker.get_decision_metrics(None);
        assert_eq!(metrics.decisions_by_status["pending"], 0);
        assert_eq!(metrics.decisions_by_status["approved"], 1);

        let stored = tracker.get_decision(d.id()).unwrap();
        assert_eq!(stored.metadata.status, DecisionStatus::Approved);
        assert!(stored.metadata.updated_at >= stored.metadata.created_at);
    }

    #[tokio::test]
    async fn illegal_transition_rejected() {
        let (_, tracker) = tracker();
        let d = decision(0.5);
        tracker.track_decision(&d, false, false).await.unwrap();
        tracker.update_decision_status(d.id(), DecisionStatus::Executing, false).await;
        tracker.update_decision_status(d.id(), DecisionStatus::Completed, false).await;

        assert!(!tracker.update_decision_status(d.id(), DecisionStatus::Executing, false).await);
        assert_eq!(
            tracker.get_decision(d.id()).unwrap().metadata.status,
            DecisionStatus::Completed
        );
    }

    #[tokio::test]
    async fn retry_budget_enforced() {
        let (_, tracker) = tracker();
        let d = decision(0.5);
        tracker.track_decision(&d, false, false).await.unwrap();
        tracker.update_decision_status(d.id(), DecisionStatus::Executing, false).await;

        for _ in 0..3 {
            assert!(tracker.update_decision_status(d.id(), DecisionStatus::Failed, false).await);
            assert!(tracker.update_decision_status(d.id(), DecisionStatus::Executing, false).await);
        }
        assert!(tracker.update_decision_status(d.id(), DecisionStatus::Failed, false).await);
        // Fourth retry exceeds max_retries (3).
        assert!(!tracker.update_decision_status(d.id(), DecisionStatus::Executing, false).await);
        assert_eq!(tracker.get_decision(d.id()).unwrap().metadata.retry_count, 3);
    }

    #[tokio::test]
    async fn offline_drain_publishes_in_order_once() {
        let (publisher, tracker) = tracker();
        let first = decision(0.5);
        let second = decision(0.6);
        let third = decision(0.7);
        for d in [&first, &second, &third] {
            tracker.track_decision(d, false, true).await.unwrap();
        }
        assert!(publisher.events().is_empty());
        assert_eq!(tracker.offline_queue_len(), 3);

        let synced = tracker.sync_offline_decisions().await;
        assert_eq!(synced, 3);
        let events = publisher.events_named(names::DECISION_TRACKED);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data["decision_id"], json!(first.id()));
        assert_eq!(events[2].data["decision_id"], json!(third.id()));

        // A second drain is a no-op.
        assert_eq!(tracker.sync_offline_decisions().await, 0);
        assert_eq!(publisher.events_named(names::DECISION_TRACKED).len(), 3);
    }

    #[tokio::test]
    async fn offline_buffer_cap_enforced() {
        let publisher = Arc::new(RecordingPublisher::new());
        let tracker = InMemoryDecisionTracker::with_offline_cap("tracker", publisher, 2);
        tracker.track_decision(&decision(0.5), false, true).await.unwrap();
        tracker.track_decision(&decision(0.5), false, true).await.unwrap();

        let err = tracker
            .track_decision(&decision(0.5), false, true)
            .await
            .unwrap_err();
        assert!(err.is_code(ErrorCode::OfflineBufferFull));
    }
}
