//! Decision pipeline.
//!
//! Composes maker, validator, tracker, feedback processor, and learning
//! engine into the standard workflow: make → validate → execute → feedback →
//! learn. Publication failures are logged and never roll back state changes.

use super::feedback::InMemoryFeedbackProcessor;
use super::learning::{InMemoryLearningEngine, LearningData, LearningOutcome};
use super::maker::{DecisionConstraints, DecisionOption, InMemoryDecisionMaker};
use super::models::{Context, Decision, DecisionFilter, DecisionStatus, DecisionType};
use super::tracker::InMemoryDecisionTracker;
use super::validator::RuleBasedValidator;
use crate::error::{ErrorCode, FlipsyncError, FsResult};
use crate::events::{names, payload, EventPublisher};
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// The standard decision pipeline.
pub struct DecisionPipeline {
    pipeline_id: String,
    maker: InMemoryDecisionMaker,
    validator: RuleBasedValidator,
    tracker: InMemoryDecisionTracker,
    feedback_processor: InMemoryFeedbackProcessor,
    learning_engine: InMemoryLearningEngine,
    publisher: Arc<dyn EventPublisher>,
}

impl DecisionPipeline {
    /// Build a pipeline whose components all publish through `publisher`.
    pub fn new(pipeline_id: impl Into<String>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self::with_offline_cap(pipeline_id, publisher, 1024)
    }

    pub fn with_offline_cap(
        pipeline_id: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
        offline_buffer_cap: usize,
    ) -> Self {
        let pipeline_id = pipeline_id.into();
        Self {
            maker: InMemoryDecisionMaker::new(format!("{}_maker", pipeline_id)),
            validator: RuleBasedValidator::new(format!("{}_validator", pipeline_id)),
            tracker: InMemoryDecisionTracker::with_offline_cap(
                format!("{}_tracker", pipeline_id),
                publisher.clone(),
                offline_buffer_cap,
            ),
            feedback_processor: InMemoryFeedbackProcessor::with_offline_cap(
                format!("{}_feedback", pipeline_id),
                publisher.clone(),
                offline_buffer_cap,
            ),
            learning_engine: InMemoryLearningEngine::new(
                format!("{}_learner", pipeline_id),
                publisher.clone(),
            ),
            publisher,
            pipeline_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn validator(&self) -> &RuleBasedValidator {
        &self.validator
    }

    pub fn tracker(&self) -> &InMemoryDecisionTracker {
        &self.tracker
    }

    pub fn learning_engine(&self) -> &InMemoryLearningEngine {
        &self.learning_engine
    }

    pub fn feedback_processor(&self) -> &InMemoryFeedbackProcessor {
        &self.feedback_processor
    }

    /// Make and track a decision. The caller's context is never mutated;
    /// learning adjustments are injected into a private copy.
    pub async fn make_decision(
        &self,
        context: &Context,
        options: &[DecisionOption],
        constraints: Option<&DecisionConstraints>,
    ) -> FsResult<Decision> {
        debug!("[{}] Making decision", self.pipeline_id);

        let enriched = self.apply_learning(context);
        // Option-level validation errors keep their own codes.
        let decision = self.maker.make_decision(&enriched, options, constraints)?;

        self.tracker
            .track_decision(&decision, false, false)
            .await
            .map_err(|e| {
                FlipsyncError::new(
                    ErrorCode::DecisionMakingError,
                    format!("Failed to make decision: {}", e),
                )
            })?;

        Ok(decision)
    }

    /// Validate a decision and move it to APPROVED or REJECTED.
    pub async fn validate_decision(&self, decision: &Decision) -> (bool, Vec<String>) {
        debug!("[{}] Validating decision {}", self.pipeline_id, decision.id());

        let (is_valid, messages) = self.validator.validate_decision(decision);
        let status = if is_valid {
            DecisionStatus::Approved
        } else {
            DecisionStatus::Rejected
        };
        self.tracker
            .update_decision_status(decision.id(), status, false)
            .await;
        (is_valid, messages)
    }

    /// Execute a decision: optionally validate, then advance it through
    /// EXECUTING to COMPLETED, publishing `decision_executed` unless offline.
    pub async fn execute_decision(
        &self,
        decision: &Decision,
        validate: bool,
        offline: bool,
    ) -> FsResult<bool> {
        debug!("[{}] Executing decision {}", self.pipeline_id, decision.id());

        if validate {
            let (is_valid, messages) = self.validate_decision(decision).await;
            if !is_valid {
                return Err(FlipsyncError::new(
                    ErrorCode::DecisionValidationFailed,
                    format!("Decision validation failed: {:?}", messages),
                )
                .with_detail("messages", json!(messages)));
            }
        }

        // Always track first so the decision exists before it executes.
        self.tracker
            .track_decision(decision, !offline, offline)
            .await
            .map_err(|e| {
                if e.is_code(ErrorCode::OfflineBufferFull) {
                    e
                } else {
                    FlipsyncError::new(
                        ErrorCode::DecisionExecutionError,
                        format!("Failed to execute decision: {}", e),
                    )
                }
            })?;

        self.tracker
            .update_decision_status(decision.id(), DecisionStatus::Executing, !offline)
            .await;
        self.tracker
            .update_decision_status(decision.id(), DecisionStatus::Completed, !offline)
            .await;

        if !offline {
            let data = payload([
                ("decision_id", json!(decision.id())),
                ("action", json!(decision.action)),
                ("timestamp", json!(Utc::now().to_rfc3339())),
            ]);
            if let Err(e) = self
                .publisher
                .publish_notification(names::DECISION_EXECUTED, data)
                .await
            {
                error!("Error publishing decision_executed event: {}", e);
            }
        }

        Ok(true)
    }

    /// Process feedback on a decision and fold it into the learning engine.
    pub async fn process_feedback(
        &self,
        decision_id: &str,
        feedback_data: HashMap<String, serde_json::Value>,
        offline: bool,
        battery_efficient: bool,
    ) -> FsResult<String> {
        debug!(
            "[{}] Processing feedback for decision {}",
            self.pipeline_id, decision_id
        );

        let decision = self.get_decision(decision_id).ok_or_else(|| {
            FlipsyncError::new(
                ErrorCode::DecisionNotFound,
                format!("Decision {} not found", decision_id),
            )
        })?;

        let feedback_id = self
            .feedback_processor
            .process_feedback(decision_id, feedback_data.clone(), !offline, offline)
            .await
            .map_err(|e| {
                if e.is_code(ErrorCode::OfflineBufferFull) {
                    e
                } else {
                    FlipsyncError::new(
                        ErrorCode::FeedbackProcessingError,
                        format!("Failed to process feedback: {}", e),
                    )
                }
            })?;

        let learning_data = LearningData {
            decision_id: decision_id.to_string(),
            decision_type: decision.decision_type,
            confidence: decision.confidence,
            actual_outcome: feedback_data
                .get("outcome")
                .and_then(|v| v.as_str())
                .map(LearningOutcome::from_str)
                .unwrap_or(LearningOutcome::Unknown),
            quality: feedback_data
                .get("quality")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5),
            relevance: feedback_data
                .get("relevance")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.5),
            battery_level: feedback_data.get("battery_level").and_then(|v| v.as_f64()),
            network_type: feedback_data
                .get("network_type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };

        self.learning_engine
            .learn_from_feedback(&learning_data, !offline, battery_efficient)
            .await;

        Ok(feedback_id)
    }

    pub fn get_decision(&self, decision_id: &str) -> Option<Decision> {
        self.tracker.get_decision(decision_id)
    }

    pub fn get_decision_history(&self, filter: Option<&DecisionFilter>) -> Vec<Decision> {
        self.tracker.get_decision_history(filter)
    }

    /// Drain both offline queues (decisions, then feedback). Returns the
    /// total number of re-published notifications.
    pub async fn sync_offline(&self) -> usize {
        let decisions = self.tracker.sync_offline_decisions().await;
        let feedback = self.feedback_processor.sync_offline_feedback().await;
        decisions + feedback
    }

    /// Copy the caller's context and inject nonzero per-type confidence
    /// adjustments under `learning_adjustments`.
    fn apply_learning(&self, context: &Context) -> Context {
        let mut adjusted = context.clone();
        let mut adjustments = serde_json::Map::new();
        for decision_type in DecisionType::ALL {
            let adjustment = self.learning_engine.get_confidence_adjustment(decision_type);
            if adjustment != 0.0 {
                adjustments.insert(decision_type.as_str().to_string(), json!(adjustment));
            }
        }
        adjusted.insert(
            "learning_adjustments".to_string(),
            serde_json::Value::Object(adjustments),
        );
        adjusted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingPublisher;

    fn pipeline() -> (Arc<RecordingPublisher>, DecisionPipeline) {
        let publisher = Arc::new(RecordingPublisher::new());
        (publisher.clone(), DecisionPipeline::new("test_pipeline", publisher))
    }

    fn options() -> Vec<DecisionOption> {
        vec![
            DecisionOption::new("x").with_value(50.0),
            DecisionOption::new("y").with_value(30.0),
        ]
    }

    #[tokio::test]
    async fn made_decisions_are_tracked() {
        let (_, pipeline) = pipeline();
        let decision = pipeline
            .make_decision(&Context::new(), &options(), None)
            .await
            .unwrap();
        assert_eq!(decision.action, "x");
        assert!(pipeline.get_decision(decision.id()).is_some());
    }

    #[tokio::test]
    async fn rejected_validation_updates_tracker() {
        let (_, pipeline) = pipeline();
        pipeline.validator().add_minimum_confidence_rule(0.7).unwrap();

        let decision = pipeline
            .make_decision(&Context::new(), &[DecisionOption::new("x").with_value(50.0)], None)
            .await
            .unwrap();
        let (valid, messages) = pipeline.validate_decision(&decision).await;
        assert!(!valid);
        assert_eq!(
            messages,
            vec!["minimum_confidence: Confidence too low (0.50 < 0.70)".to_string()]
        );
        assert_eq!(
            pipeline.get_decision(decision.id()).unwrap().metadata.status,
            DecisionStatus::Rejected
        );
    }

    #[tokio::test]
    async fn execute_with_failed_validation_errors() {
        let (_, pipeline) = pipeline();
        pipeline.validator().add_minimum_confidence_rule(0.99).unwrap();
        let decision = pipeline
            .make_decision(&Context::new(), &options(), None)
            .await
            .unwrap();

        let err = pipeline.execute_decision(&decision, true, false).await.unwrap_err();
        assert!(err.is_code(ErrorCode::DecisionValidationFailed));
    }

    #[tokio::test]
    async fn execute_completes_and_publishes() {
        let (publisher, pipeline) = pipeline();
        let decision = pipeline
            .make_decision(&Context::new(), &options(), None)
            .await
            .unwrap();

        assert!(pipeline.execute_decision(&decision, false, false).await.unwrap());
        assert_eq!(
            pipeline.get_decision(decision.id()).unwrap().metadata.status,
            DecisionStatus::Completed
        );
        assert_eq!(publisher.events_named(names::DECISION_EXECUTED).len(), 1);
    }

    #[tokio::test]
    async fn feedback_on_unknown_decision_fails() {
        let (_, pipeline) = pipeline();
        let err = pipeline
            .process_feedback("missing", HashMap::new(), false, false)
            .await
            .unwrap_err();
        assert!(err.is_code(ErrorCode::DecisionNotFound));
    }

    #[tokio::test]
    async fn learning_enriches_subsequent_contexts() {
        let (_, pipeline) = pipeline();
        let decision = pipeline
            .make_decision(&Context::new(), &options(), None)
            .await
            .unwrap();

        for _ in 0..3 {
            pipeline
                .process_feedback(
                    decision.id(),
                    HashMap::from([
                        ("outcome".to_string(), json!("success")),
                        ("quality".to_string(), json!(0.9)),
                        ("relevance".to_string(), json!(0.9)),
                    ]),
                    false,
                    false,
                )
                .await
                .unwrap();
        }

        let next = pipeline
            .make_decision(&Context::new(), &options(), None)
            .await
            .unwrap();
        let adjustment = next.context["learning_adjustments"]["selection"]
            .as_f64()
            .unwrap();
        assert!(adjustment >= 0.09);
    }
}
