//! Logistics agent: inventory management, shipping optimization, fulfillment
//! coordination, and supply-chain intelligence.
//!
//! Downstream failures (LLM, shipping adapters) never surface as errors;
//! every operation returns a valid result with a reduced confidence and a
//! `fallback: true` reasoning so orchestration does not cascade-fail.

use super::types::{AgentResponse, AgentRole};
use super::{extract_json_object, Conversational};
use crate::llm::{CostCategory, CostTracker, LlmProvider, LlmRequest};
use crate::marketplace::{MarketplaceAdapter, ShipmentQuote, ShipmentQuoteRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryOperation {
    Forecast,
    Optimize,
    Reorder,
    Audit,
}

/// Request for inventory management operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManagementRequest {
    pub operation_type: InventoryOperation,
    pub product_info: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_inventory: Option<HashMap<String, serde_json::Value>>,
    /// Daily sales counts, most recent last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sales_history: Vec<f64>,
    pub target_service_level: f64,
    pub forecast_horizon_days: u32,
}

/// Result of inventory management operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryManagementResult {
    pub operation_type: InventoryOperation,
    pub analysis_timestamp: DateTime<Utc>,
    pub inventory_forecast: HashMap<String, serde_json::Value>,
    pub optimization_recommendations: Vec<String>,
    pub reorder_suggestions: Vec<serde_json::Value>,
    pub risk_assessment: HashMap<String, serde_json::Value>,
    pub confidence_score: f64,
    pub service_level_prediction: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationGoal {
    CostMinimize,
    TimeMinimize,
    CostTimeBalance,
}

/// Request for shipping optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingOptimizationRequest {
    pub quote_request: ShipmentQuoteRequest,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub carrier_preferences: Vec<String>,
    pub optimization_goal: OptimizationGoal,
    /// Cost the seller currently pays for comparable shipments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_cost: Option<f64>,
}

/// Result of shipping optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingOptimizationResult {
    pub optimization_timestamp: DateTime<Utc>,
    pub recommended_carrier: String,
    pub recommended_service: String,
    pub estimated_cost: f64,
    pub estimated_days: u32,
    pub alternative_options: Vec<ShipmentQuote>,
    pub cost_savings: f64,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// Request for fulfillment coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentCoordinationRequest {
    pub order_info: HashMap<String, serde_json::Value>,
    pub fulfillment_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub special_requirements: Vec<String>,
}

/// Result of fulfillment coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentCoordinationResult {
    pub coordination_timestamp: DateTime<Utc>,
    pub fulfillment_plan: Vec<String>,
    pub estimated_completion_hours: f64,
    pub coordination_status: String,
    pub confidence_score: f64,
    pub coordination_notes: Vec<String>,
}

/// Request for supply-chain intelligence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyChainRequest {
    pub analysis_type: String,
    pub product_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risk_factors: Vec<String>,
}

/// Result of supply-chain analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyChainResult {
    pub analysis_timestamp: DateTime<Utc>,
    pub vendor_recommendations: Vec<String>,
    pub risk_mitigation_strategies: Vec<String>,
    pub cost_optimization_opportunities: Vec<String>,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// AI-powered logistics agent.
pub struct AiLogisticsAgent {
    agent_id: String,
    llm: Arc<dyn LlmProvider>,
    cost_tracker: Arc<CostTracker>,
    /// Adapters queried for shipment quotes.
    shipping_adapters: Vec<Arc<dyn MarketplaceAdapter>>,
}

impl AiLogisticsAgent {
    pub fn new(
        agent_id: impl Into<String>,
        llm: Arc<dyn LlmProvider>,
        cost_tracker: Arc<CostTracker>,
        shipping_adapters: Vec<Arc<dyn MarketplaceAdapter>>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            llm,
            cost_tracker,
            shipping_adapters,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Inventory management: forecast from sales history, plus LLM-backed
    /// recommendations when the provider is available.
    pub async fn manage_inventory(
        &self,
        request: &InventoryManagementRequest,
    ) -> InventoryManagementResult {
        debug!(
            "[{}] Inventory operation {:?}",
            self.agent_id, request.operation_type
        );

        let daily_velocity = if request.sales_history.is_empty() {
            0.0
        } else {
            request.sales_history.iter().sum::<f64>() / request.sales_history.len() as f64
        };
        let horizon_demand = daily_velocity * f64::from(request.forecast_horizon_days);
        let current_stock = request
            .current_inventory
            .as_ref()
            .and_then(|inv| inv.get("quantity"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let days_of_cover = if daily_velocity > 0.0 {
            current_stock / daily_velocity
        } else {
            f64::INFINITY
        };

        let mut forecast = HashMap::from([
            ("daily_velocity".to_string(), json!(daily_velocity)),
            ("horizon_demand".to_string(), json!(horizon_demand)),
            ("days_of_cover".to_string(), json!(days_of_cover)),
        ]);

        let mut reorder_suggestions = Vec::new();
        if horizon_demand > current_stock {
            let shortfall = horizon_demand - current_stock;
            reorder_suggestions.push(json!({
                "sku": request.product_info.get("sku").cloned().unwrap_or(json!("unknown")),
                "quantity": shortfall.ceil(),
                "reason": "projected demand exceeds stock on hand",
            }));
        }

        let stockout_risk = if days_of_cover < f64::from(request.forecast_horizon_days) {
            "high"
        } else {
            "low"
        };
        let risk_assessment = HashMap::from([
            ("stockout_risk".to_string(), json!(stockout_risk)),
            ("demand_volatility".to_string(), json!(volatility(&request.sales_history))),
        ]);

        // Service level degrades as cover shrinks below the horizon.
        let service_level_prediction = if horizon_demand <= 0.0 {
            request.target_service_level
        } else {
            (current_stock / horizon_demand).clamp(0.0, 1.0) * request.target_service_level
        };

        let (recommendations, confidence, reasoning) = match self
            .llm_recommendations(request, daily_velocity, days_of_cover)
            .await
        {
            Some(recs) => (
                recs,
                0.8,
                format!("AI inventory {:?} analysis", request.operation_type),
            ),
            None => (
                vec![
                    "Reorder when stock cover drops below the forecast horizon".to_string(),
                    "Review sales velocity weekly".to_string(),
                ],
                0.5,
                "fallback: true (language model unavailable)".to_string(),
            ),
        };

        forecast.insert("horizon_days".to_string(), json!(request.forecast_horizon_days));
        InventoryManagementResult {
            operation_type: request.operation_type,
            analysis_timestamp: Utc::now(),
            inventory_forecast: forecast,
            optimization_recommendations: recommendations,
            reorder_suggestions,
            risk_assessment,
            confidence_score: confidence,
            service_level_prediction,
            reasoning,
        }
    }

    async fn llm_recommendations(
        &self,
        request: &InventoryManagementRequest,
        daily_velocity: f64,
        days_of_cover: f64,
    ) -> Option<Vec<String>> {
        let prompt = format!(
            "Inventory operation: {:?}. Daily sales velocity: {:.2}. Days of cover: {:.1}. \
             Product: {}. Provide optimization recommendations.",
            request.operation_type,
            daily_velocity,
            days_of_cover,
            serde_json::Value::Object(request.product_info.clone().into_iter().collect()),
        );
        let system_prompt = "You are an inventory planner. Respond with a JSON object containing \
                             recommendations (list of strings).";
        let response = self.llm.generate(LlmRequest::new(prompt, system_prompt)).await.ok()?;
        self.cost_tracker.record(
            CostCategory::TextGeneration,
            response.cost_estimate,
            response.tokens_used,
            response.model.clone(),
            "inventory_analysis",
        );
        let parsed = extract_json_object(&response.content)?;
        let recommendations: Vec<String> = parsed
            .get("recommendations")?
            .as_array()?
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect();
        if recommendations.is_empty() {
            None
        } else {
            Some(recommendations)
        }
    }

    /// Shipping optimization: fan out to every shipping adapter, then pick
    /// the best quote for the requested goal.
    pub async fn optimize_shipping(
        &self,
        request: &ShippingOptimizationRequest,
    ) -> ShippingOptimizationResult {
        debug!("[{}] Optimizing shipping", self.agent_id);

        // Query every adapter concurrently; failed sources only shrink the
        // quote pool.
        let quote_futures = self
            .shipping_adapters
            .iter()
            .map(|adapter| async move {
                (adapter.marketplace(), adapter.quote_shipment(&request.quote_request).await)
            });
        let mut quotes: Vec<ShipmentQuote> = Vec::new();
        for (marketplace, outcome) in join_all(quote_futures).await {
            match outcome {
                Ok(mut adapter_quotes) => quotes.append(&mut adapter_quotes),
                Err(e) => warn!(
                    "[{}] Quote request to {} failed: {}",
                    self.agent_id, marketplace, e
                ),
            }
        }

        if !request.carrier_preferences.is_empty() {
            let preferred: Vec<ShipmentQuote> = quotes
                .iter()
                .filter(|q| request.carrier_preferences.contains(&q.carrier))
                .cloned()
                .collect();
            if !preferred.is_empty() {
                quotes = preferred;
            }
        }

        let Some(best) = select_quote(&quotes, request.optimization_goal) else {
            return ShippingOptimizationResult {
                optimization_timestamp: Utc::now(),
                recommended_carrier: "unknown".to_string(),
                recommended_service: "standard".to_string(),
                estimated_cost: request.baseline_cost.unwrap_or(0.0),
                estimated_days: 0,
                alternative_options: Vec::new(),
                cost_savings: 0.0,
                confidence_score: 0.3,
                reasoning: "fallback: true (no shipping quotes available)".to_string(),
            };
        };

        let alternatives: Vec<ShipmentQuote> = quotes
            .iter()
            .filter(|q| !(q.carrier == best.carrier && q.service == best.service))
            .cloned()
            .collect();
        let cost_savings = request
            .baseline_cost
            .map(|baseline| (baseline - best.amount).max(0.0))
            .unwrap_or(0.0);

        ShippingOptimizationResult {
            optimization_timestamp: Utc::now(),
            recommended_carrier: best.carrier.clone(),
            recommended_service: best.service.clone(),
            estimated_cost: best.amount,
            estimated_days: best.estimated_days,
            alternative_options: alternatives,
            cost_savings,
            confidence_score: 0.85,
            reasoning: format!(
                "Selected {} {} from {} quotes for goal {:?}",
                best.carrier,
                best.service,
                quotes.len(),
                request.optimization_goal
            ),
        }
    }

    /// Plan fulfillment for an order end-to-end.
    pub async fn coordinate_fulfillment(
        &self,
        request: &FulfillmentCoordinationRequest,
    ) -> FulfillmentCoordinationResult {
        debug!("[{}] Coordinating fulfillment", self.agent_id);

        let prompt = format!(
            "Plan {} fulfillment for order {}. Special requirements: {:?}. ",
            request.fulfillment_type,
            serde_json::Value::Object(request.order_info.clone().into_iter().collect()),
            request.special_requirements,
        );
        let system_prompt = "You are a fulfillment coordinator. Respond with a JSON object \
                             containing plan (list of steps) and estimated_hours (number).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "fulfillment_coordination",
                );
                let parsed = extract_json_object(&response.content);
                let plan = parsed
                    .as_ref()
                    .and_then(|p| p.get("plan"))
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| item.as_str().map(str::to_string))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_else(default_fulfillment_plan);
                let estimated = parsed
                    .as_ref()
                    .and_then(|p| p.get("estimated_hours"))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(24.0);
                FulfillmentCoordinationResult {
                    coordination_timestamp: Utc::now(),
                    fulfillment_plan: plan,
                    estimated_completion_hours: estimated,
                    coordination_status: "planned".to_string(),
                    confidence_score: 0.8,
                    coordination_notes: request.special_requirements.clone(),
                }
            }
            Err(e) => {
                warn!("[{}] Fulfillment coordination fallback: {}", self.agent_id, e);
                FulfillmentCoordinationResult {
                    coordination_timestamp: Utc::now(),
                    fulfillment_plan: default_fulfillment_plan(),
                    estimated_completion_hours: 48.0,
                    coordination_status: "planned_fallback".to_string(),
                    confidence_score: 0.5,
                    coordination_notes: vec!["fallback: true (language model unavailable)".to_string()],
                }
            }
        }
    }

    /// Supply-chain intelligence for the given categories.
    pub async fn analyze_supply_chain(&self, request: &SupplyChainRequest) -> SupplyChainResult {
        debug!(
            "[{}] Supply chain analysis: {}",
            self.agent_id, request.analysis_type
        );

        let prompt = format!(
            "Supply chain {} for categories {:?}. Known risk factors: {:?}.",
            request.analysis_type, request.product_categories, request.risk_factors
        );
        let system_prompt = "You are a supply chain analyst. Respond with a JSON object containing \
                             vendor_recommendations, risk_mitigation_strategies and \
                             cost_optimization_opportunities (lists of strings).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "supply_chain_analysis",
                );
                let parsed = extract_json_object(&response.content).unwrap_or(json!({}));
                let list = |key: &str| -> Vec<String> {
                    parsed
                        .get(key)
                        .and_then(|v| v.as_array())
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|item| item.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default()
                };
                SupplyChainResult {
                    analysis_timestamp: Utc::now(),
                    vendor_recommendations: list("vendor_recommendations"),
                    risk_mitigation_strategies: list("risk_mitigation_strategies"),
                    cost_optimization_opportunities: list("cost_optimization_opportunities"),
                    confidence_score: 0.8,
                    reasoning: format!("AI supply chain {}", request.analysis_type),
                }
            }
            Err(e) => {
                warn!("[{}] Supply chain fallback: {}", self.agent_id, e);
                SupplyChainResult {
                    analysis_timestamp: Utc::now(),
                    vendor_recommendations: vec!["Maintain current vendor mix".to_string()],
                    risk_mitigation_strategies: vec![
                        "Qualify a backup supplier per category".to_string()
                    ],
                    cost_optimization_opportunities: Vec::new(),
                    confidence_score: 0.5,
                    reasoning: "fallback: true (language model unavailable)".to_string(),
                }
            }
        }
    }
}

fn default_fulfillment_plan() -> Vec<String> {
    vec![
        "Allocate inventory from the closest location".to_string(),
        "Pick, pack, and label".to_string(),
        "Hand off to the selected carrier".to_string(),
        "Confirm tracking with the marketplace".to_string(),
    ]
}

/// Standard deviation of daily sales, as a crude volatility signal.
fn volatility(sales_history: &[f64]) -> f64 {
    if sales_history.len() < 2 {
        return 0.0;
    }
    let mean = sales_history.iter().sum::<f64>() / sales_history.len() as f64;
    let variance = sales_history
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / sales_history.len() as f64;
    variance.sqrt()
}

fn select_quote(quotes: &[ShipmentQuote], goal: OptimizationGoal) -> Option<&ShipmentQuote> {
    if quotes.is_empty() {
        return None;
    }
    let max_amount = quotes.iter().map(|q| q.amount).fold(f64::MIN, f64::max).max(1e-9);
    let max_days = quotes.iter().map(|q| q.estimated_days).max().unwrap_or(1).max(1) as f64;

    quotes.iter().min_by(|a, b| {
        let score = |q: &ShipmentQuote| -> f64 {
            match goal {
                OptimizationGoal::CostMinimize => q.amount,
                OptimizationGoal::TimeMinimize => f64::from(q.estimated_days),
                OptimizationGoal::CostTimeBalance => {
                    0.6 * (q.amount / max_amount) + 0.4 * (f64::from(q.estimated_days) / max_days)
                }
            }
        };
        score(a).partial_cmp(&score(b)).unwrap_or(std::cmp::Ordering::Equal)
    })
}

#[async_trait]
impl Conversational for AiLogisticsAgent {
    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        _user_id: &str,
    ) -> AgentResponse {
        let started = Instant::now();
        let request = LlmRequest::new(
            message.to_string(),
            "You are the FlipSync logistics agent. Answer questions about shipping, \
             inventory, and fulfillment concisely.",
        );
        match self.llm.generate(request).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "logistics_conversation",
                );
                AgentResponse::new(AgentRole::Logistics, response.content, 0.8)
                    .with_response_time(started.elapsed().as_secs_f64())
                    .with_metadata("conversation_id", json!(conversation_id))
            }
            Err(_) => AgentResponse::new(
                AgentRole::Logistics,
                "Logistics tools are temporarily unavailable; please retry shortly.",
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
    use crate::llm::StubLlmProvider;
    use crate::marketplace::{Marketplace, StaticMarketplaceAdapter};

    fn quote(carrier: &str, amount: f64, days: u32) -> ShipmentQuote {
        ShipmentQuote {
            carrier: carrier.to_string(),
            service: "ground".to_string(),
            amount,
            estimated_days: days,
        }
    }

    fn quote_request() -> ShipmentQuoteRequest {
        ShipmentQuoteRequest {
            origin: HashMap::new(),
            destination: HashMap::new(),
            weight_oz: 16.0,
            dimensions: (10.0, 6.0, 4.0),
            service_prefs: vec![],
        }
    }

    fn agent(adapters: Vec<Arc<dyn MarketplaceAdapter>>) -> AiLogisticsAgent {
        AiLogisticsAgent::new(
            "logistics_agent",
            Arc::new(StubLlmProvider::new()),
            Arc::new(CostTracker::new(0.05)),
            adapters,
        )
    }

    #[tokio::test]
    async fn cost_goal_picks_cheapest_quote() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.seed_quotes(vec![quote("UPS", 12.0, 3), quote("USPS", 8.0, 5)]);
        let agent = agent(vec![adapter.clone() as Arc<dyn MarketplaceAdapter>]);

        let result = agent
            .optimize_shipping(&ShippingOptimizationRequest {
                quote_request: quote_request(),
                carrier_preferences: vec![],
                optimization_goal: OptimizationGoal::CostMinimize,
                baseline_cost: Some(15.0),
            })
            .await;
        assert_eq!(result.recommended_carrier, "USPS");
        assert!((result.cost_savings - 7.0).abs() < 1e-9);
        assert_eq!(result.alternative_options.len(), 1);
    }

    #[tokio::test]
    async fn quote_failure_degrades_not_errors() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.fail_next();
        let agent = agent(vec![adapter.clone() as Arc<dyn MarketplaceAdapter>]);

        let result = agent
            .optimize_shipping(&ShippingOptimizationRequest {
                quote_request: quote_request(),
                carrier_preferences: vec![],
                optimization_goal: OptimizationGoal::TimeMinimize,
                baseline_cost: None,
            })
            .await;
        assert!(result.confidence_score < 0.5);
        assert!(result.reasoning.contains("fallback: true"));
    }

    #[tokio::test]
    async fn inventory_forecast_flags_shortfall() {
        let agent = agent(vec![]);
        let result = agent
            .manage_inventory(&InventoryManagementRequest {
                operation_type: InventoryOperation::Forecast,
                product_info: HashMap::from([("sku".to_string(), json!("ITEM-001"))]),
                current_inventory: Some(HashMap::from([("quantity".to_string(), json!(10))])),
                sales_history: vec![2.0, 2.0, 2.0, 2.0],
                target_service_level: 0.95,
                forecast_horizon_days: 30,
            })
            .await;

        // 2/day * 30 days = 60 demanded vs 10 on hand.
        assert_eq!(result.reorder_suggestions.len(), 1);
        assert_eq!(result.reorder_suggestions[0]["quantity"], json!(50.0));
        assert_eq!(result.risk_assessment["stockout_risk"], json!("high"));
        assert!(result.service_level_prediction < 0.95);
    }

    #[tokio::test]
    async fn carrier_preferences_filter_quotes() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.seed_quotes(vec![quote("UPS", 12.0, 3), quote("USPS", 8.0, 5)]);
        let agent = agent(vec![adapter.clone() as Arc<dyn MarketplaceAdapter>]);

        let result = agent
            .optimize_shipping(&ShippingOptimizationRequest {
                quote_request: quote_request(),
                carrier_preferences: vec!["UPS".to_string()],
                optimization_goal: OptimizationGoal::CostMinimize,
                baseline_cost: None,
            })
            .await;
        assert_eq!(result.recommended_carrier, "UPS");
    }
}
