//! Learning engine.
//!
//! Accumulates per-decision-type confidence adjustments from feedback
//! outcomes. The pipeline injects the accumulated scalars into the maker's
//! context so subsequent decisions are biased by past performance.

use super::models::DecisionType;
use crate::events::{names, payload, EventPublisher};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, error};

/// Outcome reported by feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningOutcome {
    Success,
    PartialSuccess,
    Failure,
    Unknown,
}

impl LearningOutcome {
    pub fn from_str(value: &str) -> Self {
        match value {
            "success" => LearningOutcome::Success,
            "partial_success" => LearningOutcome::PartialSuccess,
            "failure" => LearningOutcome::Failure,
            _ => LearningOutcome::Unknown,
        }
    }

    fn base_adjustment(&self) -> f64 {
        match self {
            LearningOutcome::Success => 0.05,
            LearningOutcome::PartialSuccess => 0.02,
            LearningOutcome::Failure => -0.05,
            LearningOutcome::Unknown => 0.0,
        }
    }
}

/// One learning observation derived from feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningData {
    pub decision_id: String,
    pub decision_type: DecisionType,
    pub confidence: f64,
    pub actual_outcome: LearningOutcome,
    pub quality: f64,
    pub relevance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

/// Snapshot of the accumulated learning state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningMetrics {
    pub feedback_count: u64,
    pub learning_iterations: u64,
    pub confidence_adjustments: HashMap<String, f64>,
    pub decision_type_weights: HashMap<String, f64>,
    pub last_learning_time: Option<DateTime<Utc>>,
    pub battery_efficient_learning: bool,
}

/// In-memory learning engine.
pub struct InMemoryLearningEngine {
    engine_id: String,
    publisher: Arc<dyn EventPublisher>,
    state: RwLock<LearningMetrics>,
}

impl InMemoryLearningEngine {
    pub fn new(engine_id: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            engine_id: engine_id.into(),
            publisher,
            state: RwLock::new(LearningMetrics::default()),
        }
    }

    /// Fold one observation into the learning state.
    pub async fn learn_from_feedback(
        &self,
        data: &LearningData,
        publish_event: bool,
        battery_efficient: bool,
    ) {
        debug!("[{}] Learning from feedback", self.engine_id);

        let adjustment = calculate_confidence_adjustment(
            data.actual_outcome,
            data.quality,
            data.relevance,
            battery_efficient,
        );
        let type_key = data.decision_type.as_str().to_string();

        {
            let mut state = self.state.write().unwrap();
            state.feedback_count += 1;
            state.learning_iterations += 1;
            state.last_learning_time = Some(Utc::now());
            state.battery_efficient_learning = battery_efficient;

            *state.confidence_adjustments.entry(type_key.clone()).or_insert(0.0) += adjustment;

            let weight = state.decision_type_weights.entry(type_key.clone()).or_insert(1.0);
            *weight += data.quality - 0.5;
            // Weights stay strictly positive.
            *weight = weight.max(0.1);
        }

        if publish_event {
            let event = payload([
                ("decision_id", json!(data.decision_id)),
                ("decision_type", json!(type_key)),
                ("confidence_adjustment", json!(adjustment)),
                ("quality", json!(data.quality)),
                ("relevance", json!(data.relevance)),
                ("battery_efficient", json!(battery_efficient)),
                ("timestamp", json!(Utc::now().to_rfc3339())),
            ]);
            if let Err(e) = self
                .publisher
                .publish_notification(names::LEARNING_COMPLETED, event)
                .await
            {
                error!("Error publishing learning_completed event: {}", e);
            }
        }
    }

    /// Accumulated confidence adjustment for a decision type.
    pub fn get_confidence_adjustment(&self, decision_type: DecisionType) -> f64 {
        self.state
            .read()
            .unwrap()
            .confidence_adjustments
            .get(decision_type.as_str())
            .copied()
            .unwrap_or(0.0)
    }

    pub fn get_learning_metrics(&self) -> LearningMetrics {
        self.state.read().unwrap().clone()
    }

    /// Reset all accumulated learning state.
    pub async fn reset_learning(&self, publish_event: bool) {
        debug!("[{}] Resetting learning state", self.engine_id);
        *self.state.write().unwrap() = LearningMetrics::default();

        if publish_event {
            let event = payload([("timestamp", json!(Utc::now().to_rfc3339()))]);
            if let Err(e) = self
                .publisher
                .publish_notification(names::LEARNING_RESET, event)
                .await
            {
                error!("Error publishing learning_reset event: {}", e);
            }
        }
    }
}

/// Adjustment formula: outcome base, optionally refined by quality and
/// relevance, clamped to [-0.1, 0.1]. Battery-efficient mode skips the
/// refinement arithmetic.
fn calculate_confidence_adjustment(
    outcome: LearningOutcome,
    quality: f64,
    relevance: f64,
    battery_efficient: bool,
) -> f64 {
    let base = outcome.base_adjustment();
    if battery_efficient {
        return base;
    }
    let adjustment = base + (quality - 0.5) * 0.02 + (relevance - 0.5) * 0.01;
    adjustment.clamp(-0.1, 0.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingPublisher;

    fn engine() -> InMemoryLearningEngine {
        InMemoryLearningEngine::new("learner", Arc::new(RecordingPublisher::new()))
    }

    fn observation(outcome: &str, quality: f64, relevance: f64) -> LearningData {
        LearningData {
            decision_id: "d".to_string(),
            decision_type: DecisionType::Selection,
            confidence: 0.5,
            actual_outcome: LearningOutcome::from_str(outcome),
            quality,
            relevance,
            battery_level: None,
            network_type: None,
        }
    }

    #[tokio::test]
    async fn successful_feedback_accumulates() {
        let engine = engine();
        for _ in 0..3 {
            engine
                .learn_from_feedback(&observation("success", 0.9, 0.9), false, false)
                .await;
        }
        // Per call: 0.05 + 0.4*0.02 + 0.4*0.01 = 0.062
        let adjustment = engine.get_confidence_adjustment(DecisionType::Selection);
        assert!((adjustment - 0.186).abs() < 1e-9);
        assert!(adjustment >= 0.09);
    }

    #[tokio::test]
    async fn worst_case_failure_clamps_per_call() {
        let engine = engine();
        let before = engine.get_confidence_adjustment(DecisionType::Selection);
        engine
            .learn_from_feedback(&observation("failure", 0.0, 0.0), false, false)
            .await;
        let after = engine.get_confidence_adjustment(DecisionType::Selection);
        assert!(after < before);
        // 0.05 + 0.01 + 0.005 = 0.065 magnitude, inside the +/-0.1 clamp.
        assert!(before - after <= 0.1 + 1e-9);
    }

    #[tokio::test]
    async fn battery_efficient_skips_refinement() {
        let engine = engine();
        engine
            .learn_from_feedback(&observation("success", 0.0, 0.0), false, true)
            .await;
        let adjustment = engine.get_confidence_adjustment(DecisionType::Selection);
        assert!((adjustment - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn weight_floor_is_point_one() {
        let engine = engine();
        for _ in 0..5 {
            engine
                .learn_from_feedback(&observation("failure", 0.0, 0.0), false, false)
                .await;
        }
        let metrics = engine.get_learning_metrics();
        assert!((metrics.decision_type_weights["selection"] - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reset_zeroes_everything() {
        let engine = engine();
        engine
            .learn_from_feedback(&observation("success", 0.9, 0.9), false, false)
            .await;
        engine.reset_learning(false).await;

        let metrics = engine.get_learning_metrics();
        assert_eq!(metrics.feedback_count, 0);
        assert_eq!(metrics.learning_iterations, 0);
        assert!(metrics.confidence_adjustments.is_empty());
        assert!(metrics.decision_type_weights.is_empty());
        assert!(metrics.last_learning_time.is_none());
    }
}
