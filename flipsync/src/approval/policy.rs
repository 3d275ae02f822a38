//! Approval routing policy.
//!
//! Per-agent-type thresholds plus the fixed mapping from
//! `(agent_type, request_type)` to a decision type.

use crate::agents::AgentRole;
use crate::config::ApprovalPolicyConfig;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Default routing policies per agent type.
pub static DEFAULT_POLICIES: Lazy<HashMap<AgentRole, ApprovalPolicyConfig>> = Lazy::new(|| {
    HashMap::from([
        (
            AgentRole::Content,
            ApprovalPolicyConfig {
                auto_approve_threshold: 0.9,
                human_required_types: vec![
                    "template_changes".to_string(),
                    "brand_guidelines".to_string(),
                ],
                escalation_threshold: 0.5,
            },
        ),
        (
            AgentRole::Logistics,
            ApprovalPolicyConfig {
                auto_approve_threshold: 0.85,
                human_required_types: vec![
                    "carrier_changes".to_string(),
                    "cost_optimization".to_string(),
                ],
                escalation_threshold: 0.6,
            },
        ),
        (
            AgentRole::Executive,
            ApprovalPolicyConfig {
                auto_approve_threshold: 0.8,
                human_required_types: vec![
                    "strategic_decisions".to_string(),
                    "budget_changes".to_string(),
                ],
                escalation_threshold: 0.7,
            },
        ),
    ])
});

/// Policy for an agent type, falling back to the built-in default knobs.
pub fn policy_for(
    overrides: &HashMap<String, ApprovalPolicyConfig>,
    agent_type: AgentRole,
) -> ApprovalPolicyConfig {
    if let Some(policy) = overrides.get(agent_type.as_str()) {
        return policy.clone();
    }
    DEFAULT_POLICIES
        .get(&agent_type)
        .cloned()
        .unwrap_or_default()
}

/// Derive the decision type from the agent type and the response's
/// `request_type` metadata.
pub fn derive_decision_type(agent_type: AgentRole, request_type: Option<&str>) -> String {
    match (agent_type, request_type) {
        (AgentRole::Content, Some(request_type)) => match request_type {
            "generate" => "content_generation".to_string(),
            "optimize" => "content_optimization".to_string(),
            "template" => "template_changes".to_string(),
            "analyze" => "content_analysis".to_string(),
            _ => "content_general".to_string(),
        },
        (AgentRole::Logistics, Some(request_type)) => match request_type {
            "shipping" => "shipping_optimization".to_string(),
            "inventory" => "inventory_rebalancing".to_string(),
            "tracking" => "tracking_management".to_string(),
            "optimization" => "logistics_optimization".to_string(),
            _ => "logistics_general".to_string(),
        },
        (AgentRole::Executive, Some(_)) => "strategic_decision".to_string(),
        (agent_type, _) => format!("{}_decision", agent_type),
    }
}
