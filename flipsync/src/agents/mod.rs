//! Specialist agents and the shared agent runtime types.
//!
//! Agents are composed, not inherited: each concrete agent owns its
//! collaborator references (LLM provider, adapters, cost tracker) and
//! implements the capability traits the orchestration layer consumes.

pub mod automation;
pub mod content;
pub mod logistics;
pub mod market;
pub mod types;

pub use automation::{AutoInventoryAgent, InventoryAction, InventoryItem, PurchaseRecommendation, StockLevel};
pub use content::{AiContentAgent, ContentRequest, ContentRequestType, ContentResult};
pub use logistics::{
    AiLogisticsAgent, FulfillmentCoordinationRequest, FulfillmentCoordinationResult,
    InventoryManagementRequest, InventoryManagementResult, InventoryOperation, OptimizationGoal,
    ShippingOptimizationRequest, ShippingOptimizationResult, SupplyChainRequest, SupplyChainResult,
};
pub use market::{AiMarketAgent, AnalysisDepth, MarketAnalysisRequest, MarketAnalysisResult, MarketSnapshot};
pub use types::{
    AgentPerformanceMetrics, AgentRegistryEntry, AgentResponse, AgentRole, AgentStatus,
    CoordinationMessage, MessagePriority, MessageType,
};

use async_trait::async_trait;
use std::collections::HashMap;

/// Capability interface: sources of market intelligence for the executive's
/// business-intelligence gathering.
#[async_trait]
pub trait MarketIntelligence: Send + Sync {
    async fn market_snapshot(
        &self,
        business_context: &HashMap<String, serde_json::Value>,
    ) -> MarketSnapshot;
}

/// Capability interface: conversational message handling.
#[async_trait]
pub trait Conversational: Send + Sync {
    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        user_id: &str,
    ) -> AgentResponse;
}

/// Extract the first JSON object embedded in an LLM completion.
///
/// Providers frequently wrap JSON in prose or code fences; this scans for a
/// balanced top-level object and parses it.
pub(crate) fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let start = content.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &content[start..=start + offset];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_json_from_fenced_completion() {
        let content = "Here is the analysis:\n```json\n{\"confidence\": 0.8, \"note\": \"a {nested} brace\"}\n```";
        let value = extract_json_object(content).unwrap();
        assert_eq!(value["confidence"], json!(0.8));
    }

    #[test]
    fn returns_none_for_prose() {
        assert!(extract_json_object("no json here").is_none());
    }
}
