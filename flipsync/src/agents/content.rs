//! Content agent: listing generation, SEO optimization, templates.

use super::types::{AgentResponse, AgentRole};
use super::{extract_json_object, Conversational};
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
pub enum ContentRequestType {
    Generate,
    Optimize,
    Template,
    Analyze,
}

impl ContentRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentRequestType::Generate => "generate",
            ContentRequestType::Optimize => "optimize",
            ContentRequestType::Template => "template",
            ContentRequestType::Analyze => "analyze",
        }
    }
}

/// Request for listing content work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequest {
    pub request_type: ContentRequestType,
    pub target_marketplace: Marketplace,
    pub product_info: HashMap<String, serde_json::Value>,
    /// Existing content to optimize, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// Result of content generation or optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResult {
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    pub seo_keywords: Vec<String>,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// AI-powered content agent. Its listing-changing responses are flagged for
/// approval so the router can gate them.
pub struct AiContentAgent {
    agent_id: String,
    llm: Arc<dyn LlmProvider>,
    cost_tracker: Arc<CostTracker>,
}

impl AiContentAgent {
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

    /// Generate or optimize listing content.
    pub async fn create_content(&self, request: &ContentRequest) -> ContentResult {
        debug!(
            "[{}] Content request {:?} for {}",
            self.agent_id, request.request_type, request.target_marketplace
        );

        let prompt = self.content_prompt(request);
        let system_prompt = "You are an e-commerce copywriter. Respond with a JSON object \
                             containing: title, description, seo_keywords (list), confidence (0.0-1.0).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "content_generation",
                );
                match extract_json_object(&response.content) {
                    Some(parsed) => ContentResult {
                        generated_at: Utc::now(),
                        title: parsed
                            .get("title")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        description: parsed
                            .get("description")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        seo_keywords: parsed
                            .get("seo_keywords")
                            .and_then(|v| v.as_array())
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|item| item.as_str().map(str::to_string))
                                    .collect()
                            })
                            .unwrap_or_default(),
                        confidence_score: parsed
                            .get("confidence")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.75)
                            .clamp(0.0, 1.0),
                        reasoning: format!(
                            "AI {} for {}",
                            request.request_type.as_str(),
                            request.target_marketplace
                        ),
                    },
                    None => {
                        warn!("[{}] Content response not valid JSON", self.agent_id);
                        self.fallback_result(request, "content response could not be parsed")
                    }
                }
            }
            Err(e) => {
                warn!("[{}] Content LLM call failed: {}", self.agent_id, e);
                self.fallback_result(request, "language model unavailable")
            }
        }
    }

    fn content_prompt(&self, request: &ContentRequest) -> String {
        let product = serde_json::Value::Object(request.product_info.clone().into_iter().collect());
        let mut prompt = match request.request_type {
            ContentRequestType::Generate => format!(
                "Write a listing title and description for {} selling on {}.",
                product, request.target_marketplace
            ),
            ContentRequestType::Optimize => format!(
                "Improve this {} listing for conversions: {}",
                request.target_marketplace,
                request.existing_content.as_deref().unwrap_or("")
            ),
            ContentRequestType::Template => format!(
                "Produce a reusable listing template for {} products on {}.",
                product, request.target_marketplace
            ),
            ContentRequestType::Analyze => format!(
                "Analyze the quality of this listing content: {}",
                request.existing_content.as_deref().unwrap_or("")
            ),
        };
        if !request.keywords.is_empty() {
            prompt.push_str(&format!(" Work in these keywords: {}.", request.keywords.join(", ")));
        }
        prompt
    }

    fn fallback_result(&self, request: &ContentRequest, cause: &str) -> ContentResult {
        let title = request
            .product_info
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("Listing")
            .to_string();
        ContentResult {
            generated_at: Utc::now(),
            title: title.clone(),
            description: request
                .existing_content
                .clone()
                .unwrap_or_else(|| format!("{} - description pending", title)),
            seo_keywords: request.keywords.clone(),
            confidence_score: 0.35,
            reasoning: format!("fallback: true ({})", cause),
        }
    }

    /// Produce the approval-gated agent response for a content request.
    pub async fn respond(&self, request: &ContentRequest) -> AgentResponse {
        let started = Instant::now();
        let result = self.create_content(request).await;
        let content = format!("{}\n\n{}", result.title, result.description);
        AgentResponse::new(AgentRole::Content, content, result.confidence_score)
            .with_response_time(started.elapsed().as_secs_f64())
            .with_metadata("requires_approval", json!(true))
            .with_metadata("request_type", json!(request.request_type.as_str()))
            .with_metadata(
                "data",
                json!({
                    "title": result.title,
                    "description": result.description,
                    "seo_keywords": result.seo_keywords,
                    "target_marketplace": request.target_marketplace,
                }),
            )
    }
}

#[async_trait]
impl Conversational for AiContentAgent {
    async fn handle_message(
        &self,
        message: &str,
        conversation_id: &str,
        _user_id: &str,
    ) -> AgentResponse {
        let started = Instant::now();
        let request = LlmRequest::new(
            message.to_string(),
            "You are the FlipSync content agent. Help with listing titles, descriptions, \
             and SEO. Keep answers actionable.",
        );
        match self.llm.generate(request).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "content_conversation",
                );
                AgentResponse::new(AgentRole::Content, response.content, 0.8)
                    .with_response_time(started.elapsed().as_secs_f64())
                    .with_metadata("conversation_id", json!(conversation_id))
            }
            Err(_) => AgentResponse::new(
                AgentRole::Content,
                "Content tools are temporarily unavailable; please retry shortly.",
                0.3,
            )
            .with_response_time(started.elapsed().as_secs_f64())
            .with_metadata("fallback", json!(true)),
        }
    }
}
