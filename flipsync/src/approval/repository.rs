//! Agent decision repository seam.
//!
//! Persistence is external; the core only depends on this trait. The
//! in-memory implementation backs tests and the demo binary.

use crate::error::{ErrorCode, FlipsyncError, FsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Persistence status of a stored agent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentDecisionStatus {
    Pending,
    Approved,
    Rejected,
}

impl AgentDecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentDecisionStatus::Pending => "pending",
            AgentDecisionStatus::Approved => "approved",
            AgentDecisionStatus::Rejected => "rejected",
        }
    }
}

/// A persisted agent decision awaiting (or past) approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecisionRecord {
    /// The approval id doubles as the record key.
    pub record_id: String,
    pub agent_id: String,
    pub decision_type: String,
    pub parameters: HashMap<String, serde_json::Value>,
    pub confidence: f64,
    pub rationale: String,
    pub status: AgentDecisionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Repository contract for agent decisions.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create_decision(&self, record: AgentDecisionRecord) -> FsResult<()>;

    async fn update_decision_status(
        &self,
        record_id: &str,
        status: AgentDecisionStatus,
        actor: &str,
        reason: Option<String>,
    ) -> FsResult<()>;

    async fn get_decision(&self, record_id: &str) -> FsResult<Option<AgentDecisionRecord>>;

    async fn list_pending(&self) -> FsResult<Vec<AgentDecisionRecord>>;
}

/// In-memory repository for testing and ephemeral use.
#[derive(Default)]
pub struct InMemoryAgentRepository {
    records: RwLock<HashMap<String, AgentDecisionRecord>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn create_decision(&self, record: AgentDecisionRecord) -> FsResult<()> {
        self.records
            .write()
            .unwrap()
            .insert(record.record_id.clone(), record);
        Ok(())
    }

    async fn update_decision_status(
        &self,
        record_id: &str,
        status: AgentDecisionStatus,
        actor: &str,
        reason: Option<String>,
    ) -> FsResult<()> {
        let mut records = self.records.write().unwrap();
        let record = records.get_mut(record_id).ok_or_else(|| {
            FlipsyncError::new(
                ErrorCode::ApprovalNotFound,
                format!("approval {} not found", record_id),
            )
        })?;
        record.status = status;
        record.resolved_by = Some(actor.to_string());
        record.resolution_reason = reason;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn get_decision(&self, record_id: &str) -> FsResult<Option<AgentDecisionRecord>> {
        Ok(self.records.read().unwrap().get(record_id).cloned())
    }

    async fn list_pending(&self) -> FsResult<Vec<AgentDecisionRecord>> {
        let records = self.records.read().unwrap();
        let mut pending: Vec<AgentDecisionRecord> = records
            .values()
            .filter(|record| record.status == AgentDecisionStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> AgentDecisionRecord {
        AgentDecisionRecord {
            record_id: id.to_string(),
            agent_id: "content_agent".to_string(),
            decision_type: "content_generation".to_string(),
            parameters: HashMap::new(),
            confidence: 0.8,
            rationale: "Agent recommendation".to_string(),
            status: AgentDecisionStatus::Pending,
            resolved_by: None,
            resolution_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn update_resolves_pending_record() {
        let repository = InMemoryAgentRepository::new();
        repository.create_decision(record("a")).await.unwrap();

        repository
            .update_decision_status("a", AgentDecisionStatus::Approved, "ops@seller", None)
            .await
            .unwrap();

        let stored = repository.get_decision("a").await.unwrap().unwrap();
        assert_eq!(stored.status, AgentDecisionStatus::Approved);
        assert_eq!(stored.resolved_by.as_deref(), Some("ops@seller"));
        assert!(repository.list_pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_record_errors() {
        let repository = InMemoryAgentRepository::new();
        let err = repository
            .update_decision_status("missing", AgentDecisionStatus::Rejected, "ops", None)
            .await
            .unwrap_err();
        assert!(err.is_code(ErrorCode::ApprovalNotFound));
    }
}
