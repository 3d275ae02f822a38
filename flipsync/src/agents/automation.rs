//! Automation agent: automated inventory monitoring, purchasing
//! recommendations, and demand forecasting.

use super::types::{AgentResponse, AgentRole};
use super::Conversational;
use crate::decision::{DecisionOption, DecisionPipeline};
use crate::error::FsResult;
use crate::llm::{CostCategory, CostTracker, LlmProvider, LlmRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryAction {
    Reorder,
    Purchase,
    Liquidate,
    Hold,
    Monitor,
}

impl InventoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryAction::Reorder => "reorder",
            InventoryAction::Purchase => "purchase",
            InventoryAction::Liquidate => "liquidate",
            InventoryAction::Hold => "hold",
            InventoryAction::Monitor => "monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockLevel {
    OutOfStock,
    LowStock,
    Optimal,
    Overstock,
    Excess,
}

/// An inventory item under automated management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: String,
    pub name: String,
    pub category: String,
    pub current_stock: i64,
    pub reorder_point: i64,
    /// Target ceiling; stock above it is overstock.
    pub max_stock: i64,
    pub reorder_quantity: i64,
    pub unit_cost: f64,
    /// Units sold per day, trailing average.
    pub sales_velocity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restocked: Option<DateTime<Utc>>,
}

/// A purchase/liquidation recommendation for one SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecommendation {
    pub sku: String,
    pub action: InventoryAction,
    pub recommended_quantity: i64,
    /// Urgency in [0, 1]; out-of-stock SKUs score highest.
    pub urgency_score: f64,
    pub estimated_cost: f64,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

/// Forecast of demand over a horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandForecast {
    pub sku: String,
    pub horizon_days: u32,
    pub expected_units: f64,
    pub confidence: f64,
}

/// Automation agent driving restock decisions through the pipeline.
pub struct AutoInventoryAgent {
    agent_id: String,
    llm: Arc<dyn LlmProvider>,
    cost_tracker: Arc<CostTracker>,
}

impl AutoInventoryAgent {
    pub fn new(
        agent_id: impl Into<String>,
        llm: Arc<dyn LlmProvider>,
        cost_tracker: Arc<CostTracker>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            llm,
            cost_tracker,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn categorize_stock_level(&self, item: &InventoryItem) -> StockLevel {
        if item.current_stock <= 0 {
            StockLevel::OutOfStock
        } else if item.current_stock <= item.reorder_point {
            StockLevel::LowStock
        } else if item.current_stock as f64 > item.max_stock as f64 * 1.5 {
            StockLevel::Excess
        } else if item.current_stock > item.max_stock {
            StockLevel::Overstock
        } else {
            StockLevel::Optimal
        }
    }

    /// Scan items and produce purchase/liquidation recommendations, most
    /// urgent first.
    pub fn analyze_inventory_needs(&self, items: &[InventoryItem]) -> Vec<PurchaseRecommendation> {
        debug!("[{}] Analyzing {} inventory items", self.agent_id, items.len());

        let mut recommendations: Vec<PurchaseRecommendation> = items
            .iter()
            .filter_map(|item| match self.categorize_stock_level(item) {
                StockLevel::OutOfStock => Some(self.reorder_recommendation(item, 1.0)),
                StockLevel::LowStock => {
                    let depletion_days = if item.sales_velocity > 0.0 {
                        item.current_stock as f64 / item.sales_velocity
                    } else {
                        f64::INFINITY
                    };
                    // Urgency rises as the SKU approaches stockout.
                    let urgency = (1.0 - (depletion_days / 14.0)).clamp(0.3, 0.95);
                    Some(self.reorder_recommendation(item, urgency))
                }
                StockLevel::Excess => Some(PurchaseRecommendation {
                    sku: item.sku.clone(),
                    action: InventoryAction::Liquidate,
                    recommended_quantity: item.current_stock - item.max_stock,
                    urgency_score: 0.2,
                    estimated_cost: 0.0,
                    reasoning: format!(
                        "{} units on hand far exceed the {}-unit stock ceiling",
                        item.current_stock, item.max_stock
                    ),
                    created_at: Utc::now(),
                }),
                StockLevel::Overstock | StockLevel::Optimal => None,
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.urgency_score
                .partial_cmp(&a.urgency_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        recommendations
    }

    fn reorder_recommendation(&self, item: &InventoryItem, urgency: f64) -> PurchaseRecommendation {
        let quantity = item.reorder_quantity.max(1);
        PurchaseRecommendation {
            sku: item.sku.clone(),
            action: InventoryAction::Reorder,
            recommended_quantity: quantity,
            urgency_score: urgency,
            estimated_cost: quantity as f64 * item.unit_cost,
            reasoning: format!(
                "Stock at {} against reorder point {}; selling {:.1}/day",
                item.current_stock, item.reorder_point, item.sales_velocity
            ),
            created_at: Utc::now(),
        }
    }

    /// Straight-line demand forecast from the trailing velocity.
    pub fn forecast_demand(&self, item: &InventoryItem, horizon_days: u32) -> DemandForecast {
        let expected_units = item.sales_velocity * f64::from(horizon_days);
        // Confidence decays with the horizon length.
        let confidence = (1.0 - f64::from(horizon_days) / 365.0).clamp(0.3, 0.95);
        DemandForecast {
            sku: item.sku.clone(),
            horizon_days,
            expected_units,
            confidence,
        }
    }

    /// Submit a recommendation to the decision pipeline for an auditable
    /// accept/hold choice. The recommendation's urgency drives the scoring.
    pub async fn submit_recommendation(
        &self,
        pipeline: &DecisionPipeline,
        recommendation: &PurchaseRecommendation,
    ) -> FsResult<crate::decision::Decision> {
        let mut context = crate::decision::Context::new();
        context.insert("sku".to_string(), json!(recommendation.sku));
        context.insert("agent_id".to_string(), json!(self.agent_id));
        context.insert(
            "recommendation".to_string(),
            serde_json::to_value(recommendation).unwrap_or_default(),
        );

        let options = vec![
            DecisionOption::new(recommendation.action.as_str())
                .with_value(recommendation.urgency_score * 100.0),
            DecisionOption::new("hold").with_value((1.0 - recommendation.urgency_score) * 100.0),
        ];
        pipeline.make_decision(&context, &options, None).await
    }
}

#[async_trait]
impl Conversational for AutoInventoryAgent {
    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        _user_id: &str,
    ) -> AgentResponse {
        let started = Instant::now();
        let request = LlmRequest::new(
            message.to_string(),
            "You are the FlipSync automation agent. Explain automated inventory \
             actions and purchasing recommendations.",
        );
        match self.llm.generate(request).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "automation_conversation",
                );
                AgentResponse::new(AgentRole::Automation, response.content, 0.8)
                    .with_response_time(started.elapsed().as_secs_f64())
                    .with_metadata("conversation_id", json!(conversation_id))
            }
            Err(_) => AgentResponse::new(
                AgentRole::Automation,
                "Automation status is temporarily unavailable; please retry shortly.",
                0.3,
            )
            .with_response_time(started.elapsed().as_secs_f64())
            .with_metadata("fallback", json!(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingPublisher;
    use crate::llm::StubLlmProvider;

    fn agent() -> AutoInventoryAgent {
        AutoInventoryAgent::new(
            "auto_inventory_agent",
            Arc::new(StubLlmProvider::new()),
            Arc::new(CostTracker::new(0.05)),
        )
    }

    fn item(sku: &str, stock: i64, reorder_point: i64, velocity: f64) -> InventoryItem {
        InventoryItem {
            sku: sku.to_string(),
            name: sku.to_string(),
            category: "general".to_string(),
            current_stock: stock,
            reorder_point,
            max_stock: 20,
            reorder_quantity: 25,
            unit_cost: 4.0,
            sales_velocity: velocity,
            last_restocked: None,
        }
    }

    #[test]
    fn stock_levels_categorize() {
        let agent = agent();
        assert_eq!(agent.categorize_stock_level(&item("a", 0, 5, 1.0)), StockLevel::OutOfStock);
        assert_eq!(agent.categorize_stock_level(&item("b", 4, 5, 1.0)), StockLevel::LowStock);
        assert_eq!(agent.categorize_stock_level(&item("c", 10, 5, 1.0)), StockLevel::Optimal);
        // max_stock is 20: 21-30 is overstock, past 1.5x it is excess.
        assert_eq!(agent.categorize_stock_level(&item("d", 25, 5, 1.0)), StockLevel::Overstock);
        assert_eq!(agent.categorize_stock_level(&item("e", 31, 5, 1.0)), StockLevel::Excess);
    }

    #[test]
    fn excess_stock_liquidates_down_to_ceiling() {
        let agent = agent();
        let recommendations = agent.analyze_inventory_needs(&[item("e", 31, 5, 1.0)]);
        assert_eq!(recommendations.len(), 1);
        assert_eq!(recommendations[0].action, InventoryAction::Liquidate);
        assert_eq!(recommendations[0].recommended_quantity, 11);
    }

    #[test]
    fn out_of_stock_sorts_first() {
        let agent = agent();
        let recommendations = agent.analyze_inventory_needs(&[
            item("low", 3, 5, 0.5),
            item("gone", 0, 5, 2.0),
            item("fine", 10, 5, 1.0),
        ]);
        assert_eq!(recommendations.len(), 2);
        assert_eq!(recommendations[0].sku, "gone");
        assert!((recommendations[0].urgency_score - 1.0).abs() < 1e-9);
        assert_eq!(recommendations[0].estimated_cost, 100.0);
    }

    #[tokio::test]
    async fn recommendation_flows_through_pipeline() {
        let agent = agent();
        let pipeline = DecisionPipeline::new("auto", Arc::new(RecordingPublisher::new()));
        let recommendation = agent
            .analyze_inventory_needs(&[item("gone", 0, 5, 2.0)])
            .remove(0);

        let decision = agent
            .submit_recommendation(&pipeline, &recommendation)
            .await
            .unwrap();
        assert_eq!(decision.action, "reorder");
        assert_eq!(decision.alternatives, vec!["hold".to_string()]);
        assert!(pipeline.get_decision(decision.id()).is_some());
    }
}
