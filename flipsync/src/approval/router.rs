//! Approval router.
//!
//! Intercepts agent responses flagged `requires_approval`, records an
//! auditable pipeline decision, persists an [`AgentDecisionRecord`], and
//! composes the user-facing outcome text. Approve/reject resolutions flow
//! back into the pipeline as feedback.

use super::policy::{derive_decision_type, policy_for};
use super::repository::{AgentDecisionRecord, AgentDecisionStatus, AgentRepository};
use crate::agents::AgentResponse;
use crate::config::ApprovalPolicyConfig;
use crate::decision::{Context, DecisionOption, DecisionPipeline};
use crate::error::FsResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

/// A tracked approval workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalWorkflow {
    pub approval_id: String,
    pub agent_type: String,
    pub decision_type: String,
    pub confidence: f64,
    pub auto_approve: bool,
    pub escalation_required: bool,
    pub user_id: String,
    pub conversation_id: String,
    pub original_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_decision_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Outcome returned to the conversational layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_type: Option<String>,
    pub auto_approve: bool,
    pub escalation_required: bool,
    /// User-readable completion text.
    pub response: String,
    pub agent_type: String,
}

/// Resolution of a pending approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResolution {
    pub status: AgentDecisionStatus,
    pub approval_id: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Bridges agent responses into the decision pipeline's approval workflow.
pub struct ApprovalRouter {
    repository: Arc<dyn AgentRepository>,
    pipeline: Option<Arc<DecisionPipeline>>,
    policy_overrides: HashMap<String, ApprovalPolicyConfig>,
    workflows: RwLock<HashMap<String, ApprovalWorkflow>>,
}

impl ApprovalRouter {
    pub fn new(repository: Arc<dyn AgentRepository>, pipeline: Option<Arc<DecisionPipeline>>) -> Self {
        if pipeline.is_none() {
            warn!("Approval router running without a decision pipeline");
        }
        Self {
            repository,
            pipeline,
            policy_overrides: HashMap::new(),
            workflows: RwLock::new(HashMap::new()),
        }
    }

    /// Builder: apply configured per-agent-type policy overrides.
    pub fn with_policy_overrides(mut self, overrides: HashMap<String, ApprovalPolicyConfig>) -> Self {
        self.policy_overrides = overrides;
        self
    }

    pub fn get_workflow(&self, approval_id: &str) -> Option<ApprovalWorkflow> {
        self.workflows.read().unwrap().get(approval_id).cloned()
    }

    /// Process an agent response, creating an approval workflow when the
    /// response requires one.
    pub async fn process_agent_response(
        &self,
        response: &AgentResponse,
        user_id: &str,
        conversation_id: &str,
        original_message: &str,
    ) -> ApprovalOutcome {
        if !response.requires_approval() {
            return ApprovalOutcome {
                approval_required: false,
                approval_id: None,
                decision_type: None,
                auto_approve: false,
                escalation_required: false,
                response: response.content.clone(),
                agent_type: response.agent_type.to_string(),
            };
        }

        match self
            .create_workflow(response, user_id, conversation_id, original_message)
            .await
        {
            Ok(workflow) => {
                let text = approval_response_text(&workflow, &response.content);
                ApprovalOutcome {
                    approval_required: true,
                    approval_id: Some(workflow.approval_id.clone()),
                    decision_type: Some(workflow.decision_type.clone()),
                    auto_approve: workflow.auto_approve,
                    escalation_required: workflow.escalation_required,
                    response: text,
                    agent_type: response.agent_type.to_string(),
                }
            }
            Err(e) => {
                // The user still gets the agent's answer; the approval
                // bookkeeping failure is logged.
                error!("Error processing agent response for approval: {}", e);
                ApprovalOutcome {
                    approval_required: false,
                    approval_id: None,
                    decision_type: None,
                    auto_approve: false,
                    escalation_required: false,
                    response: response.content.clone(),
                    agent_type: response.agent_type.to_string(),
                }
            }
        }
    }

    async fn create_workflow(
        &self,
        response: &AgentResponse,
        user_id: &str,
        conversation_id: &str,
        original_message: &str,
    ) -> FsResult<ApprovalWorkflow> {
        let approval_id = Uuid::new_v4().to_string();
        let decision_type = derive_decision_type(response.agent_type, response.request_type());
        let policy = policy_for(&self.policy_overrides, response.agent_type);

        let auto_approve = response.confidence >= policy.auto_approve_threshold
            && !policy.human_required_types.contains(&decision_type);
        let escalation_required = response.confidence < policy.escalation_threshold;

        let mut workflow = ApprovalWorkflow {
            approval_id: approval_id.clone(),
            agent_type: response.agent_type.to_string(),
            decision_type: decision_type.clone(),
            confidence: response.confidence,
            auto_approve,
            escalation_required,
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            original_message: original_message.to_string(),
            pipeline_decision_id: None,
            created_at: Utc::now(),
        };

        // The pipeline decision is created before anything is persisted so
        // a stored workflow either always has an id or the router has no
        // pipeline at all.
        if let Some(pipeline) = &self.pipeline {
            let decision = self.create_pipeline_decision(pipeline, &workflow).await?;
            workflow.pipeline_decision_id = Some(decision);
        }

        self.store_record(response, &workflow, original_message).await?;
        self.workflows
            .write()
            .unwrap()
            .insert(approval_id, workflow.clone());

        info!(
            "Approval workflow {} created for {} ({})",
            workflow.approval_id,
            workflow.agent_type,
            if workflow.auto_approve { "auto-approved" } else { "pending" }
        );
        Ok(workflow)
    }

    async fn create_pipeline_decision(
        &self,
        pipeline: &DecisionPipeline,
        workflow: &ApprovalWorkflow,
    ) -> FsResult<String> {
        let mut context = Context::new();
        context.insert("approval_id".to_string(), json!(workflow.approval_id));
        context.insert("agent_type".to_string(), json!(workflow.agent_type));
        context.insert("user_id".to_string(), json!(workflow.user_id));
        context.insert("conversation_id".to_string(), json!(workflow.conversation_id));
        context.insert("confidence".to_string(), json!(workflow.confidence));
        context.insert("decision_type".to_string(), json!(workflow.decision_type));

        // Fixed option set so the maker records an auditable choice.
        let options = vec![
            DecisionOption::new("approve").with_value(workflow.confidence * 100.0),
            DecisionOption::new("reject").with_value((1.0 - workflow.confidence) * 100.0),
            DecisionOption::new("modify").with_value(50.0),
        ];

        let decision = pipeline.make_decision(&context, &options, None).await?;
        Ok(decision.id().to_string())
    }

    async fn store_record(
        &self,
        response: &AgentResponse,
        workflow: &ApprovalWorkflow,
        original_message: &str,
    ) -> FsResult<()> {
        let mut rationale: String = response.content.chars().take(200).collect();
        if response.content.chars().count() > 200 {
            rationale.push_str("...");
        }

        let record = AgentDecisionRecord {
            record_id: workflow.approval_id.clone(),
            agent_id: response
                .metadata
                .get("agent_id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            decision_type: workflow.decision_type.clone(),
            parameters: HashMap::from([
                ("original_message".to_string(), json!(original_message)),
                (
                    "agent_response_data".to_string(),
                    response.data().cloned().unwrap_or(json!({})),
                ),
                (
                    "approval_workflow".to_string(),
                    serde_json::to_value(workflow).unwrap_or_default(),
                ),
            ]),
            confidence: workflow.confidence,
            rationale: format!("Agent recommendation: {}", rationale),
            status: if workflow.auto_approve {
                AgentDecisionStatus::Approved
            } else {
                AgentDecisionStatus::Pending
            },
            resolved_by: None,
            resolution_reason: None,
            created_at: workflow.created_at,
            updated_at: workflow.created_at,
        };
        self.repository.create_decision(record).await
    }

    /// Approve a pending decision and feed the outcome to the pipeline.
    pub async fn approve_decision(
        &self,
        approval_id: &str,
        approved_by: &str,
    ) -> FsResult<ApprovalResolution> {
        self.repository
            .update_decision_status(approval_id, AgentDecisionStatus::Approved, approved_by, None)
            .await?;
        self.feed_resolution_back(approval_id, "success").await;

        Ok(ApprovalResolution {
            status: AgentDecisionStatus::Approved,
            approval_id: approval_id.to_string(),
            actor: approved_by.to_string(),
            reason: None,
            timestamp: Utc::now(),
        })
    }

    /// Reject a pending decision and feed the outcome to the pipeline.
    pub async fn reject_decision(
        &self,
        approval_id: &str,
        rejected_by: &str,
        reason: Option<String>,
    ) -> FsResult<ApprovalResolution> {
        self.repository
            .update_decision_status(
                approval_id,
                AgentDecisionStatus::Rejected,
                rejected_by,
                reason.clone(),
            )
            .await?;
        self.feed_resolution_back(approval_id, "failure").await;

        Ok(ApprovalResolution {
            status: AgentDecisionStatus::Rejected,
            approval_id: approval_id.to_string(),
            actor: rejected_by.to_string(),
            reason,
            timestamp: Utc::now(),
        })
    }

    async fn feed_resolution_back(&self, approval_id: &str, outcome: &str) {
        let decision_id = self
            .get_workflow(approval_id)
            .and_then(|workflow| workflow.pipeline_decision_id);
        let (Some(pipeline), Some(decision_id)) = (&self.pipeline, decision_id) else {
            return;
        };

        let feedback = HashMap::from([
            ("outcome".to_string(), json!(outcome)),
            ("category".to_string(), json!("approval_resolution")),
        ]);
        if let Err(e) = pipeline
            .process_feedback(&decision_id, feedback, false, false)
            .await
        {
            error!(
                "Error feeding approval resolution back to pipeline: {}",
                e
            );
        }
    }
}

fn approval_response_text(workflow: &ApprovalWorkflow, content: &str) -> String {
    if workflow.auto_approve {
        format!(
            "{}\n\nAuto-approved (confidence: {:.1}%)",
            content,
            workflow.confidence * 100.0
        )
    } else if workflow.escalation_required {
        format!(
            "{}\n\nRequires review - low confidence ({:.1}%). This recommendation has been \
             escalated for human approval.",
            content,
            workflow.confidence * 100.0
        )
    } else {
        format!(
            "{}\n\nPending approval - this recommendation requires approval before \
             implementation. Approval ID: {}",
            content, workflow.approval_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentRole;
    use crate::approval::repository::InMemoryAgentRepository;
    use crate::error::ErrorCode;
    use crate::events::RecordingPublisher;

    fn router() -> (Arc<InMemoryAgentRepository>, Arc<DecisionPipeline>, ApprovalRouter) {
        let repository = Arc::new(InMemoryAgentRepository::new());
        let pipeline = Arc::new(DecisionPipeline::new(
            "approval_pipeline",
            Arc::new(RecordingPublisher::new()),
        ));
        let router = ApprovalRouter::new(repository.clone(), Some(pipeline.clone()));
        (repository, pipeline, router)
    }

    fn content_response(confidence: f64, request_type: &str) -> AgentResponse {
        AgentResponse::new(AgentRole::Content, "Here is your new listing copy.", confidence)
            .with_metadata("requires_approval", json!(true))
            .with_metadata("request_type", json!(request_type))
    }

    #[tokio::test]
    async fn high_confidence_content_auto_approves() {
        let (repository, _, router) = router();
        let outcome = router
            .process_agent_response(&content_response(0.95, "generate"), "u1", "c1", "write copy")
            .await;

        assert!(outcome.approval_required);
        assert!(outcome.auto_approve);
        assert_eq!(outcome.decision_type.as_deref(), Some("content_generation"));
        assert!(outcome.response.contains("Auto-approved"));
        assert!(outcome.response.contains("95"));

        let record = repository
            .get_decision(outcome.approval_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, AgentDecisionStatus::Approved);
    }

    #[tokio::test]
    async fn human_required_type_never_auto_approves() {
        let (_, _, router) = router();
        let outcome = router
            .process_agent_response(&content_response(0.99, "template"), "u1", "c1", "new template")
            .await;
        assert!(!outcome.auto_approve);
        assert_eq!(outcome.decision_type.as_deref(), Some("template_changes"));
        assert!(outcome.response.contains("Pending approval"));
    }

    #[tokio::test]
    async fn low_confidence_escalates() {
        let (_, _, router) = router();
        let outcome = router
            .process_agent_response(&content_response(0.3, "generate"), "u1", "c1", "write copy")
            .await;
        assert!(outcome.escalation_required);
        assert!(outcome.response.contains("escalated for human approval"));
    }

    #[tokio::test]
    async fn no_approval_needed_passes_through() {
        let (_, _, router) = router();
        let response = AgentResponse::new(AgentRole::Market, "Prices look fine.", 0.8);
        let outcome = router
            .process_agent_response(&response, "u1", "c1", "check prices")
            .await;
        assert!(!outcome.approval_required);
        assert_eq!(outcome.response, "Prices look fine.");
    }

    #[tokio::test]
    async fn workflow_always_records_pipeline_decision() {
        let (_, pipeline, router) = router();
        let outcome = router
            .process_agent_response(&content_response(0.7, "generate"), "u1", "c1", "write copy")
            .await;

        let workflow = router.get_workflow(outcome.approval_id.as_deref().unwrap()).unwrap();
        let decision_id = workflow.pipeline_decision_id.expect("pipeline id recorded");
        let decision = pipeline.get_decision(&decision_id).unwrap();
        assert_eq!(decision.action, "approve");
        assert_eq!(decision.context["approval_id"], json!(workflow.approval_id));
    }

    #[tokio::test]
    async fn approve_feeds_pipeline_feedback() {
        let (repository, pipeline, router) = router();
        let outcome = router
            .process_agent_response(&content_response(0.7, "generate"), "u1", "c1", "write copy")
            .await;
        let approval_id = outcome.approval_id.unwrap();

        let resolution = router.approve_decision(&approval_id, "ops@seller").await.unwrap();
        assert_eq!(resolution.status, AgentDecisionStatus::Approved);

        let record = repository.get_decision(&approval_id).await.unwrap().unwrap();
        assert_eq!(record.resolved_by.as_deref(), Some("ops@seller"));

        // The pipeline learned from the approval outcome.
        let metrics = pipeline.learning_engine().get_learning_metrics();
        assert_eq!(metrics.feedback_count, 1);
    }

    #[tokio::test]
    async fn rejecting_unknown_approval_errors() {
        let (_, _, router) = router();
        let err = router
            .reject_decision("missing", "ops", Some("not valid".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_code(ErrorCode::ApprovalNotFound));
    }
}
