//! Agent runtime types: roles, the response envelope, the coordination
//! message envelope, registry entries, and performance metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Specialist roles managed by the executive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Executive,
    Market,
    Content,
    Logistics,
    Automation,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Executive => "executive",
            AgentRole::Market => "market",
            AgentRole::Content => "content",
            AgentRole::Logistics => "logistics",
            AgentRole::Automation => "automation",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Busy,
    Idle,
    Error,
}

/// Response produced by a specialist agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    pub agent_type: AgentRole,
    pub confidence: f64,
    /// Seconds spent producing the response.
    pub response_time: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentResponse {
    pub fn new(agent_type: AgentRole, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            agent_type,
            confidence,
            response_time: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time = seconds;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Typed accessor for the `requires_approval` metadata flag.
    pub fn requires_approval(&self) -> bool {
        self.metadata
            .get("requires_approval")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Typed accessor for the `request_type` metadata key.
    pub fn request_type(&self) -> Option<&str> {
        self.metadata.get("request_type").and_then(|v| v.as_str())
    }

    /// Structured payload carried for downstream application.
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.metadata.get("data")
    }
}

/// Kinds of coordination messages routed by the executive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    StatusUpdate,
    CoordinationRequest,
    PerformanceReport,
    StrategicGuidance,
    InventoryRequest,
    ShippingRequest,
    FulfillmentRequest,
    SupplyChainRequest,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Medium,
    High,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Medium
    }
}

/// Envelope for agent-to-agent communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationMessage {
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: MessageType,
    pub content: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub requires_response: bool,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationMessage {
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        content: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type,
            content,
            priority: MessagePriority::default(),
            requires_response: false,
            timestamp: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }
}

/// Registry entry for an agent managed by the executive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistryEntry {
    pub agent_id: String,
    pub agent_type: AgentRole,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub last_active: DateTime<Utc>,
}

impl AgentRegistryEntry {
    pub fn new<I, S>(agent_id: impl Into<String>, agent_type: AgentRole, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: agent_id.into(),
            agent_type,
            status: AgentStatus::Active,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            last_active: Utc::now(),
        }
    }
}

/// Per-agent task counters maintained by the executive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceMetrics {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub success_rate: f64,
    pub avg_response_time: f64,
}

impl Default for AgentPerformanceMetrics {
    fn default() -> Self {
        Self {
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            success_rate: 0.0,
            avg_response_time: 0.0,
        }
    }
}

impl AgentPerformanceMetrics {
    pub fn record_completed(&mut self) {
        self.total_tasks += 1;
        self.completed_tasks += 1;
        self.recompute_success_rate();
    }

    pub fn record_failed(&mut self) {
        self.total_tasks += 1;
        self.failed_tasks += 1;
        self.recompute_success_rate();
    }

    fn recompute_success_rate(&mut self) {
        if self.total_tasks > 0 {
            self.success_rate = self.completed_tasks as f64 / self.total_tasks as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_metadata_accessors() {
        let response = AgentResponse::new(AgentRole::Content, "Generated a listing title", 0.95)
            .with_metadata("requires_approval", json!(true))
            .with_metadata("request_type", json!("generate"))
            .with_metadata("data", json!({"title": "Vintage lamp"}));

        assert!(response.requires_approval());
        assert_eq!(response.request_type(), Some("generate"));
        assert_eq!(response.data().unwrap()["title"], json!("Vintage lamp"));
    }

    #[test]
    fn metrics_success_rate_tracks_counters() {
        let mut metrics = AgentPerformanceMetrics::default();
        metrics.record_completed();
        metrics.record_completed();
        metrics.record_failed();
        assert_eq!(metrics.total_tasks, 3);
        assert!((metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn coordination_message_stamps_timestamp() {
        let before = Utc::now();
        let message = CoordinationMessage::new(
            "ai_executive_agent",
            "ai_market_agent",
            MessageType::TaskAssignment,
            HashMap::new(),
        );
        assert!(message.timestamp >= before);
        assert_eq!(message.priority, MessagePriority::Medium);
    }
}
