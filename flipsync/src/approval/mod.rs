//! Approval integration: routing policy, repository seam, and the router
//! that bridges agent responses into the decision pipeline.

pub mod policy;
pub mod repository;
pub mod router;

pub use policy::{derive_decision_type, policy_for, DEFAULT_POLICIES};
pub use repository::{
    AgentDecisionRecord, AgentDecisionStatus, AgentRepository, InMemoryAgentRepository,
};
pub use router::{ApprovalOutcome, ApprovalResolution, ApprovalRouter, ApprovalWorkflow};
