//! Market agent: pricing analysis, competitor monitoring, market intelligence.

use super::types::{AgentResponse, AgentRole};
use super::{extract_json_object, Conversational, MarketIntelligence};
use crate::llm::{CostCategory, CostTracker, LlmProvider, LlmRequest};
use crate::marketplace::Marketplace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Quick,
    Standard,
    Deep,
}

/// Request for a market analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysisRequest {
    pub product_query: String,
    pub target_marketplace: Marketplace,
    pub analysis_depth: AnalysisDepth,
    pub include_competitors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<(f64, f64)>,
}

/// Result of a market analysis. Always valid: downstream failures produce a
/// degraded result with reduced confidence rather than an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysisResult {
    pub analysis_timestamp: DateTime<Utc>,
    pub market_summary: String,
    pub pricing_recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<f64>,
    pub competitor_insights: Vec<String>,
    pub demand_outlook: String,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// Market snapshot consumed by the executive's business intelligence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_growth_rate: f64,
    pub competition_intensity: String,
    pub pricing_trends: String,
    pub demand_forecast: String,
    pub market_opportunities: Vec<String>,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self {
            market_growth_rate: 0.0,
            competition_intensity: "unknown".to_string(),
            pricing_trends: "stable".to_string(),
            demand_forecast: "neutral".to_string(),
            market_opportunities: Vec::new(),
        }
    }
}

/// AI-powered market agent.
pub struct AiMarketAgent {
    agent_id: String,
    llm: Arc<dyn LlmProvider>,
    cost_tracker: Arc<CostTracker>,
}

impl AiMarketAgent {
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

    /// Analyze a product's market position on the target marketplace.
    pub async fn analyze_market(&self, request: &MarketAnalysisRequest) -> MarketAnalysisResult {
        debug!(
            "[{}] Analyzing market for '{}' on {}",
            self.agent_id, request.product_query, request.target_marketplace
        );

        let prompt = self.analysis_prompt(request);
        let system_prompt = "You are an e-commerce market analyst. Respond with a JSON object \
                             containing: market_summary, pricing_recommendations (list), \
                             suggested_price (number), competitor_insights (list), \
                             demand_outlook, confidence (0.0-1.0).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "market_analysis",
                );
                match extract_json_object(&response.content) {
                    Some(parsed) => self.result_from_json(request, &parsed),
                    None => {
                        warn!("[{}] Market analysis response not valid JSON", self.agent_id);
                        self.fallback_result(request, "analysis response could not be parsed")
                    }
                }
            }
            Err(e) => {
                warn!("[{}] Market analysis LLM call failed: {}", self.agent_id, e);
                self.fallback_result(request, "language model unavailable")
            }
        }
    }

    fn analysis_prompt(&self, request: &MarketAnalysisRequest) -> String {
        let mut prompt = format!(
            "Analyze the market for '{}' on {}. Depth: {:?}.",
            request.product_query, request.target_marketplace, request.analysis_depth
        );
        if let Some((low, high)) = request.price_range {
            prompt.push_str(&format!(" Price range under consideration: ${:.2}-${:.2}.", low, high));
        }
        if request.include_competitors {
            prompt.push_str(" Include competitor listings and their pricing.");
        }
        prompt
    }

    fn result_from_json(
        &self,
        request: &MarketAnalysisRequest,
        parsed: &serde_json::Value,
    ) -> MarketAnalysisResult {
        let string_list = |key: &str| -> Vec<String> {
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

        MarketAnalysisResult {
            analysis_timestamp: Utc::now(),
            market_summary: parsed
                .get("market_summary")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            pricing_recommendations: string_list("pricing_recommendations"),
            suggested_price: parsed.get("suggested_price").and_then(|v| v.as_f64()),
            competitor_insights: string_list("competitor_insights"),
            demand_outlook: parsed
                .get("demand_outlook")
                .and_then(|v| v.as_str())
                .unwrap_or("neutral")
                .to_string(),
            confidence_score: parsed
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.7)
                .clamp(0.0, 1.0),
            reasoning: format!(
                "AI market analysis of '{}' on {}",
                request.product_query, request.target_marketplace
            ),
        }
    }

    fn fallback_result(&self, request: &MarketAnalysisRequest, cause: &str) -> MarketAnalysisResult {
        MarketAnalysisResult {
            analysis_timestamp: Utc::now(),
            market_summary: format!(
                "Baseline market assessment for '{}' on {}",
                request.product_query, request.target_marketplace
            ),
            pricing_recommendations: vec![
                "Match the marketplace median for the category".to_string(),
                "Re-run the analysis when market data is available".to_string(),
            ],
            suggested_price: request.price_range.map(|(low, high)| (low + high) / 2.0),
            competitor_insights: Vec::new(),
            demand_outlook: "neutral".to_string(),
            confidence_score: 0.4,
            reasoning: format!("fallback: true ({})", cause),
        }
    }
}

#[async_trait]
impl MarketIntelligence for AiMarketAgent {
    async fn market_snapshot(
        &self,
        business_context: &HashMap<String, serde_json::Value>,
    ) -> MarketSnapshot {
        let prompt = format!(
            "Summarize current market conditions for this seller. Context: {}",
            serde_json::Value::Object(business_context.clone().into_iter().collect())
        );
        let system_prompt = "Respond with a JSON object containing: market_growth_rate (number), \
                             competition_intensity, pricing_trends, demand_forecast, \
                             market_opportunities (list).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "market_snapshot",
                );
                extract_json_object(&response.content)
                    .and_then(|value| serde_json::from_value(value).ok())
                    .unwrap_or_default()
            }
            Err(e) => {
                warn!("[{}] Market snapshot unavailable: {}", self.agent_id, e);
                MarketSnapshot::default()
            }
        }
    }
}

#[async_trait]
impl Conversational for AiMarketAgent {
    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        _user_id: &str,
    ) -> AgentResponse {
        let started = Instant::now();
        let request = LlmRequest::new(
            message.to_string(),
            "You are the FlipSync market agent. Answer questions about pricing, \
             competitors, and demand concisely.",
        );

        match self.llm.generate(request).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "market_conversation",
                );
                AgentResponse::new(AgentRole::Market, response.content, 0.8)
                    .with_response_time(started.elapsed().as_secs_f64())
                    .with_metadata("conversation_id", json!(conversation_id))
            }
            Err(_) => AgentResponse::new(
                AgentRole::Market,
                "Market analysis is temporarily unavailable; please retry shortly.",
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

    fn agent_with(llm: Arc<StubLlmProvider>) -> AiMarketAgent {
        AiMarketAgent::new("ai_market_agent", llm, Arc::new(CostTracker::new(0.05)))
    }

    fn request() -> MarketAnalysisRequest {
        MarketAnalysisRequest {
            product_query: "vintage lamp".to_string(),
            target_marketplace: Marketplace::Ebay,
            analysis_depth: AnalysisDepth::Standard,
            include_competitors: true,
            price_range: Some((20.0, 40.0)),
        }
    }

    #[tokio::test]
    async fn parses_llm_json_analysis() {
        let llm = Arc::new(StubLlmProvider::new());
        llm.push_response(
            r#"{"market_summary": "Healthy demand", "pricing_recommendations": ["price at $32"],
                "suggested_price": 32.0, "competitor_insights": ["3 rivals"], "demand_outlook": "positive",
                "confidence": 0.85}"#,
        );
        let result = agent_with(llm).analyze_market(&request()).await;
        assert_eq!(result.market_summary, "Healthy demand");
        assert_eq!(result.suggested_price, Some(32.0));
        assert!((result.confidence_score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn degrades_when_llm_unavailable() {
        let llm = Arc::new(StubLlmProvider::new());
        llm.set_unavailable(true);
        let result = agent_with(llm).analyze_market(&request()).await;
        assert!(result.confidence_score < 0.5);
        assert!(result.reasoning.contains("fallback: true"));
        // Suggested price falls back to the midpoint of the requested range.
        assert_eq!(result.suggested_price, Some(30.0));
    }
}
