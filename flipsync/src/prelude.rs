//! Convenience re-exports for downstream users.

pub use crate::agents::{
    AgentResponse, AgentRole, AiContentAgent, AiLogisticsAgent, AiMarketAgent, AutoInventoryAgent,
    Conversational, CoordinationMessage, MarketIntelligence, MessagePriority, MessageType,
};
pub use crate::approval::{
    AgentRepository, ApprovalOutcome, ApprovalRouter, InMemoryAgentRepository,
};
pub use crate::config::FlipsyncConfig;
pub use crate::decision::{
    Context, Decision, DecisionConstraints, DecisionOption, DecisionPipeline, DecisionStatus,
    DecisionType,
};
pub use crate::error::{ErrorCode, FlipsyncError, FsResult};
pub use crate::events::{EventPublisher, Notification, RecordingPublisher};
pub use crate::executive::{AiExecutiveAgent, StrategicAnalysisRequest, StrategicAnalysisResult};
pub use crate::inventory::{RebalanceStrategy, UnifiedInventoryManager};
pub use crate::llm::{CostTracker, LlmProvider, LlmRequest, LlmResponse, StubLlmProvider};
pub use crate::marketplace::{Marketplace, MarketplaceAdapter, StaticMarketplaceAdapter};
pub use crate::orders::{
    FulfillmentMethod, MultiMarketplaceOrderManager, OrderPriority, OrderStatus, UnifiedOrder,
};
pub use crate::runtime::Runtime;
