//! Executive orchestrator.
//!
//! Owns the agent registry and performance metrics, routes coordination
//! messages, runs AI-backed strategic analysis behind a TTL cache, and
//! monitors system health. Specialists never mutate the registry; they see
//! snapshots only.

use crate::agents::types::{
    AgentPerformanceMetrics, AgentRegistryEntry, AgentRole, AgentStatus, CoordinationMessage,
    MessageType,
};
use crate::agents::MarketIntelligence;
use crate::llm::{CostCategory, CostTracker, LlmProvider, LlmRequest};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Request for strategic analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicAnalysisRequest {
    pub business_context: HashMap<String, serde_json::Value>,
    /// strategic_planning, resource_allocation, risk_assessment, performance_review
    pub decision_type: String,
    pub objectives: Vec<String>,
    pub constraints: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    pub priority_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

/// Budget, team, and timeline split recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub budget_allocation: HashMap<String, f64>,
    pub team_allocation: HashMap<String, i64>,
    pub timeline_allocation: HashMap<String, f64>,
    pub optimization_score: f64,
}

/// Strategic risk picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk_level: RiskLevel,
    pub risk_score: f64,
    pub risk_factors: Vec<String>,
    pub mitigation_strategies: Vec<String>,
    pub opportunities: Vec<String>,
    pub confidence: f64,
}

/// Per-agent implementation tasks aligned with the objectives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationPlan {
    pub coordination_strategy: String,
    pub agent_assignments: HashMap<String, Vec<String>>,
    pub communication_protocols: HashMap<String, serde_json::Value>,
    pub performance_monitoring: HashMap<String, serde_json::Value>,
}

/// Composite result of a strategic analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicAnalysisResult {
    pub decision_type: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub strategic_summary: String,
    pub recommendations: Vec<String>,
    pub resource_allocation: ResourceAllocation,
    pub risk_assessment: RiskAssessment,
    pub performance_metrics: HashMap<String, serde_json::Value>,
    pub confidence_score: f64,
    pub implementation_plan: Vec<String>,
    pub agent_coordination_plan: CoordinationPlan,
}

/// Status of a handled coordination message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStatus {
    TaskAssigned,
    StatusUpdated,
    CoordinationApproved,
    CoordinationPending,
    PerformanceReportReceived,
    CoordinationAcknowledged,
    Error,
}

impl CoordinationStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, CoordinationStatus::Error)
    }
}

/// Outcome returned for every coordination message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationOutcome {
    pub status: CoordinationStatus,
    pub message: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationOutcome {
    fn new(status: CoordinationStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    fn with_data(mut self, key: &str, value: serde_json::Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// System-health summary produced by performance monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    /// good | fair | poor
    pub overall_health: String,
    pub active_agents_percentage: f64,
    pub average_success_rate: f64,
    pub coordination_messages: usize,
    pub last_assessment: DateTime<Utc>,
}

/// Full monitoring report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub monitoring_timestamp: DateTime<Utc>,
    pub total_agents: usize,
    pub agent_performance: HashMap<String, AgentPerformanceView>,
    pub system_health: SystemHealth,
    pub recommendations: Vec<String>,
}

/// Per-agent view joined from the registry and the metric counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPerformanceView {
    pub agent_type: AgentRole,
    pub status: AgentStatus,
    pub success_rate: f64,
    pub avg_response_time: f64,
    pub total_tasks: u64,
    pub last_active: DateTime<Utc>,
}

type CachedAnalysis = (StrategicAnalysisResult, Instant);

/// Coordination messages kept in memory; older entries are pruned.
const COORDINATION_HISTORY_RETENTION: usize = 1000;

/// AI-powered executive agent.
pub struct AiExecutiveAgent {
    agent_id: String,
    llm: Arc<dyn LlmProvider>,
    cost_tracker: Arc<CostTracker>,
    market_intelligence: Option<Arc<dyn MarketIntelligence>>,
    registry: RwLock<HashMap<String, AgentRegistryEntry>>,
    metrics: RwLock<HashMap<String, AgentPerformanceMetrics>>,
    coordination_history: Mutex<Vec<CoordinationMessage>>,
    /// Per-key cells give single-flight semantics for identical requests.
    analysis_cache: DashMap<String, Arc<tokio::sync::Mutex<Option<CachedAnalysis>>>>,
    cache_ttl: Duration,
}

impl AiExecutiveAgent {
    pub fn new(
        agent_id: impl Into<String>,
        llm: Arc<dyn LlmProvider>,
        cost_tracker: Arc<CostTracker>,
        cache_ttl: Duration,
    ) -> Self {
        let agent = Self {
            agent_id: agent_id.into(),
            llm,
            cost_tracker,
            market_intelligence: None,
            registry: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
            coordination_history: Mutex::new(Vec::new()),
            analysis_cache: DashMap::new(),
            cache_ttl,
        };
        info!("AI Executive agent initialized: {}", agent.agent_id);
        agent
    }

    /// Attach the market-intelligence source used by business-intelligence
    /// gathering.
    pub fn with_market_intelligence(mut self, source: Arc<dyn MarketIntelligence>) -> Self {
        self.market_intelligence = Some(source);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Register a managed agent. The registry is owned exclusively by the
    /// executive.
    pub fn register_agent(&self, entry: AgentRegistryEntry) {
        let agent_id = entry.agent_id.clone();
        self.registry.write().unwrap().insert(agent_id.clone(), entry);
        self.metrics
            .write()
            .unwrap()
            .entry(agent_id)
            .or_insert_with(AgentPerformanceMetrics::default);
    }

    /// Seed the registry with the standard specialist lineup.
    pub fn register_default_agents(&self) {
        self.register_agent(AgentRegistryEntry::new(
            "ai_market_agent",
            AgentRole::Market,
            ["pricing_analysis", "competitor_monitoring", "market_intelligence"],
        ));
        self.register_agent(AgentRegistryEntry::new(
            "content_agent",
            AgentRole::Content,
            ["listing_optimization", "seo_enhancement", "content_creation"],
        ));
        self.register_agent(AgentRegistryEntry::new(
            "logistics_agent",
            AgentRole::Logistics,
            ["shipping_optimization", "inventory_management", "fulfillment"],
        ));
        self.register_agent(AgentRegistryEntry::new(
            "auto_inventory_agent",
            AgentRole::Automation,
            ["inventory_automation", "purchase_planning", "demand_forecasting"],
        ));
    }

    /// Read-only snapshot of the registry.
    pub fn agent_snapshot(&self) -> HashMap<String, AgentRegistryEntry> {
        self.registry.read().unwrap().clone()
    }

    /// Read-only snapshot of per-agent metrics.
    pub fn metrics_snapshot(&self) -> HashMap<String, AgentPerformanceMetrics> {
        self.metrics.read().unwrap().clone()
    }

    pub fn coordination_history_len(&self) -> usize {
        self.coordination_history.lock().unwrap().len()
    }

    /// Comprehensive strategic analysis with TTL caching. Identical
    /// `(decision_type, business_context)` pairs inside the TTL observe a
    /// single LLM call.
    pub async fn analyze_strategic_situation(
        &self,
        request: &StrategicAnalysisRequest,
    ) -> StrategicAnalysisResult {
        info!(
            "[{}] Strategic analysis requested: {}",
            self.agent_id, request.decision_type
        );

        let cache_key = analysis_cache_key(&request.decision_type, &request.business_context);
        let cell = self
            .analysis_cache
            .entry(cache_key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None)))
            .clone();

        // Holding the per-key lock across the LLM call makes concurrent
        // same-key requests wait for the first result.
        let mut slot = cell.lock().await;
        if let Some((cached, stored_at)) = slot.as_ref() {
            if stored_at.elapsed() < self.cache_ttl {
                info!("[{}] Returning cached strategic analysis", self.agent_id);
                return cached.clone();
            }
        }

        let business_intelligence = self.gather_business_intelligence(request).await;
        let ai_analysis = self.perform_strategic_ai_analysis(request, &business_intelligence).await;

        let resource_allocation = generate_resource_allocation(request);
        let risk_assessment = assess_strategic_risks(request);
        let coordination_plan = self.create_agent_coordination_plan(request);

        let result = StrategicAnalysisResult {
            decision_type: request.decision_type.clone(),
            analysis_timestamp: Utc::now(),
            strategic_summary: ai_analysis
                .get("strategic_summary")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            recommendations: string_list(&ai_analysis, "recommendations"),
            resource_allocation,
            risk_assessment,
            performance_metrics: ai_analysis
                .get("performance_metrics")
                .and_then(|v| v.as_object())
                .map(|map| map.clone().into_iter().collect())
                .unwrap_or_default(),
            confidence_score: ai_analysis
                .get("confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.8)
                .clamp(0.0, 1.0),
            implementation_plan: string_list(&ai_analysis, "implementation_plan"),
            agent_coordination_plan: coordination_plan,
        };

        *slot = Some((result.clone(), Instant::now()));
        info!(
            "[{}] Strategic analysis completed with confidence {:.2}",
            self.agent_id, result.confidence_score
        );
        result
    }

    async fn gather_business_intelligence(
        &self,
        request: &StrategicAnalysisRequest,
    ) -> HashMap<String, serde_json::Value> {
        let mut intelligence = HashMap::new();

        if let Some(market) = &self.market_intelligence {
            let snapshot = market.market_snapshot(&request.business_context).await;
            intelligence.insert(
                "market_data".to_string(),
                serde_json::to_value(&snapshot).unwrap_or_default(),
            );
        }

        let context_f64 = |key: &str, default: f64| -> f64 {
            request
                .business_context
                .get(key)
                .and_then(|v| v.as_f64())
                .unwrap_or(default)
        };
        intelligence.insert(
            "financial_metrics".to_string(),
            json!({
                "revenue_growth": context_f64("revenue_growth", 0.0),
                "profit_margin": context_f64("profit_margin", 0.0),
                "budget_utilization": context_f64("budget_utilization", 0.0),
                "cash_flow": request.business_context.get("cash_flow").cloned()
                    .unwrap_or(json!("unknown")),
            }),
        );
        intelligence.insert(
            "operational_metrics".to_string(),
            request
                .business_context
                .get("operational_metrics")
                .cloned()
                .unwrap_or(json!({})),
        );
        intelligence.insert(
            "agent_performance".to_string(),
            serde_json::to_value(self.metrics_snapshot()).unwrap_or_default(),
        );

        intelligence
    }

    async fn perform_strategic_ai_analysis(
        &self,
        request: &StrategicAnalysisRequest,
        business_intelligence: &HashMap<String, serde_json::Value>,
    ) -> serde_json::Value {
        let prompt = format!(
            "Strategic decision type: {}.\nObjectives: {:?}.\nConstraints: {}.\n\
             Business intelligence: {}.\nProvide the strategic analysis.",
            request.decision_type,
            request.objectives,
            sorted_json(&request.constraints),
            sorted_json(business_intelligence),
        );
        let system_prompt = "You are an expert business strategist for e-commerce operations. \
                             Respond with a JSON object containing: strategic_summary, \
                             recommendations (list), implementation_plan (list), \
                             performance_metrics (object), confidence (0.0-1.0), \
                             risk_factors (list).";

        match self.llm.generate(LlmRequest::new(prompt, system_prompt)).await {
            Ok(response) => {
                self.cost_tracker.record(
                    CostCategory::TextGeneration,
                    response.cost_estimate,
                    response.tokens_used,
                    response.model.clone(),
                    "strategic_analysis",
                );
                match crate::agents::extract_json_object(&response.content) {
                    Some(parsed) => parsed,
                    None => {
                        warn!("[{}] Strategic analysis response not valid JSON", self.agent_id);
                        fallback_ai_analysis(business_intelligence)
                    }
                }
            }
            Err(e) => {
                warn!("[{}] Strategic analysis LLM call failed: {}", self.agent_id, e);
                fallback_ai_analysis(business_intelligence)
            }
        }
    }

    fn create_agent_coordination_plan(&self, request: &StrategicAnalysisRequest) -> CoordinationPlan {
        let mut assignments: HashMap<String, Vec<String>> = HashMap::new();
        if request.objectives.iter().any(|o| o == "revenue_growth") {
            assignments.insert(
                "ai_market_agent".to_string(),
                vec![
                    "Competitive pricing analysis".to_string(),
                    "Market opportunity identification".to_string(),
                    "Demand forecasting and trend analysis".to_string(),
                ],
            );
            assignments.insert(
                "content_agent".to_string(),
                vec![
                    "SEO optimization for increased visibility".to_string(),
                    "Conversion rate optimization".to_string(),
                    "Product description enhancement".to_string(),
                ],
            );
            assignments.insert(
                "logistics_agent".to_string(),
                vec![
                    "Fulfillment efficiency optimization".to_string(),
                    "Shipping cost reduction".to_string(),
                    "Inventory management improvement".to_string(),
                ],
            );
        }

        CoordinationPlan {
            coordination_strategy: "collaborative".to_string(),
            agent_assignments: assignments,
            communication_protocols: HashMap::from([
                ("daily_status_updates".to_string(), json!(true)),
                ("weekly_performance_reviews".to_string(), json!(true)),
                ("escalation_threshold".to_string(), json!("24_hours_no_response")),
            ]),
            performance_monitoring: HashMap::from([
                ("response_time_target_seconds".to_string(), json!(2.0)),
                ("success_rate_target".to_string(), json!(0.9)),
                ("monitoring_frequency".to_string(), json!("real_time")),
            ]),
        }
    }

    /// Route a coordination message and update the involved agents' state.
    pub async fn coordinate_with_agent(&self, message: &CoordinationMessage) -> CoordinationOutcome {
        debug!(
            "[{}] Coordinating with {}: {:?}",
            self.agent_id, message.to_agent, message.message_type
        );
        {
            let mut history = self.coordination_history.lock().unwrap();
            history.push(message.clone());
            if history.len() > COORDINATION_HISTORY_RETENTION {
                let excess = history.len() - COORDINATION_HISTORY_RETENTION;
                history.drain(..excess);
            }
        }

        let outcome = match message.message_type {
            MessageType::TaskAssignment => self.handle_task_assignment(message),
            MessageType::StatusUpdate => self.handle_status_update(message),
            MessageType::CoordinationRequest => self.handle_coordination_request(message),
            MessageType::PerformanceReport => self.handle_performance_report(message),
            _ => CoordinationOutcome::new(
                CoordinationStatus::CoordinationAcknowledged,
                format!(
                    "General coordination message from {} acknowledged",
                    message.from_agent
                ),
            ),
        };

        self.update_agent_performance(&message.to_agent, &outcome);
        outcome
    }

    fn handle_task_assignment(&self, message: &CoordinationMessage) -> CoordinationOutcome {
        {
            let mut registry = self.registry.write().unwrap();
            if let Some(entry) = registry.get_mut(&message.to_agent) {
                entry.status = AgentStatus::Busy;
                entry.last_active = Utc::now();
            }
        }

        let task = message
            .content
            .get("task")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        CoordinationOutcome::new(
            CoordinationStatus::TaskAssigned,
            format!("Task '{}' assigned to {}", task, message.to_agent),
        )
        .with_data("task_id", json!(format!("task_{}", content_hash(&message.content) % 10000)))
        .with_data("estimated_completion", json!("2-4 hours"))
    }

    fn handle_status_update(&self, message: &CoordinationMessage) -> CoordinationOutcome {
        let reported_status = message
            .content
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        {
            let mut metrics = self.metrics.write().unwrap();
            if let Some(agent_metrics) = metrics.get_mut(&message.from_agent) {
                match reported_status.as_str() {
                    "completed" => agent_metrics.record_completed(),
                    "failed" => agent_metrics.record_failed(),
                    _ => {
                        agent_metrics.total_tasks += 1;
                        if agent_metrics.total_tasks > 0 {
                            agent_metrics.success_rate =
                                agent_metrics.completed_tasks as f64 / agent_metrics.total_tasks as f64;
                        }
                    }
                }
            }
        }

        CoordinationOutcome::new(
            CoordinationStatus::StatusUpdated,
            format!("Status update received from {}", message.from_agent),
        )
        .with_data("agent_status", json!(reported_status))
        .with_data(
            "completion_percentage",
            message
                .content
                .get("completion_percentage")
                .cloned()
                .unwrap_or(json!(0)),
        )
    }

    fn handle_coordination_request(&self, message: &CoordinationMessage) -> CoordinationOutcome {
        let request_type = message
            .content
            .get("request_type")
            .and_then(|v| v.as_str())
            .unwrap_or("general");

        if request_type == "market_intelligence" {
            CoordinationOutcome::new(
                CoordinationStatus::CoordinationApproved,
                "Market intelligence request approved",
            )
            .with_data(
                "coordination_plan",
                json!({
                    "primary_agent": "ai_market_agent",
                    "supporting_agents": ["content_agent"],
                    "timeline": "24-48 hours",
                }),
            )
        } else {
            CoordinationOutcome::new(
                CoordinationStatus::CoordinationPending,
                format!("Coordination request for {} is being evaluated", request_type),
            )
            .with_data("estimated_response", json!("2-4 hours"))
        }
    }

    fn handle_performance_report(&self, message: &CoordinationMessage) -> CoordinationOutcome {
        let reported = message
            .content
            .get("performance_metrics")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        {
            let mut metrics = self.metrics.write().unwrap();
            if let Some(agent_metrics) = metrics.get_mut(&message.from_agent) {
                if let Some(value) = reported.get("avg_response_time").and_then(|v| v.as_f64()) {
                    agent_metrics.avg_response_time = value;
                }
                if let Some(value) = reported.get("success_rate").and_then(|v| v.as_f64()) {
                    agent_metrics.success_rate = value;
                }
                if let Some(value) = reported.get("total_tasks").and_then(|v| v.as_u64()) {
                    agent_metrics.total_tasks = value;
                }
                if let Some(value) = reported.get("completed_tasks").and_then(|v| v.as_u64()) {
                    agent_metrics.completed_tasks = value;
                }
                if let Some(value) = reported.get("failed_tasks").and_then(|v| v.as_u64()) {
                    agent_metrics.failed_tasks = value;
                }
            }
        }

        CoordinationOutcome::new(
            CoordinationStatus::PerformanceReportReceived,
            format!("Performance report from {} processed", message.from_agent),
        )
        .with_data("performance_summary", json!(reported))
    }

    fn update_agent_performance(&self, agent_id: &str, outcome: &CoordinationOutcome) {
        {
            let mut metrics = self.metrics.write().unwrap();
            if let Some(agent_metrics) = metrics.get_mut(agent_id) {
                if outcome.status.is_error() {
                    agent_metrics.record_failed();
                } else {
                    agent_metrics.record_completed();
                }
            }
        }
        let mut registry = self.registry.write().unwrap();
        if let Some(entry) = registry.get_mut(agent_id) {
            entry.last_active = Utc::now();
        }
    }

    /// Snapshot-based performance monitoring report.
    pub fn monitor_agent_performance(&self) -> PerformanceReport {
        info!("[{}] Monitoring agent performance", self.agent_id);
        let registry = self.agent_snapshot();
        let metrics = self.metrics_snapshot();
        let history_len = self.coordination_history_len();

        let mut agent_performance = HashMap::new();
        for (agent_id, entry) in &registry {
            let agent_metrics = metrics.get(agent_id).cloned().unwrap_or_default();
            agent_performance.insert(
                agent_id.clone(),
                AgentPerformanceView {
                    agent_type: entry.agent_type,
                    status: entry.status,
                    success_rate: agent_metrics.success_rate,
                    avg_response_time: agent_metrics.avg_response_time,
                    total_tasks: agent_metrics.total_tasks,
                    last_active: entry.last_active,
                },
            );
        }

        let total_agents = registry.len();
        let active_agents = registry
            .values()
            .filter(|entry| entry.status == AgentStatus::Active)
            .count();
        let average_success_rate = if metrics.is_empty() {
            0.0
        } else {
            metrics.values().map(|m| m.success_rate).sum::<f64>() / metrics.len() as f64
        };

        let overall_health = if average_success_rate > 0.8 {
            "good"
        } else if average_success_rate > 0.6 {
            "fair"
        } else {
            "poor"
        };

        let mut recommendations = Vec::new();
        for (agent_id, agent_metrics) in &metrics {
            if agent_metrics.success_rate < 0.8 {
                recommendations.push(format!(
                    "Improve {} success rate (currently {:.1}%)",
                    agent_id,
                    agent_metrics.success_rate * 100.0
                ));
            }
            if agent_metrics.avg_response_time > 3.0 {
                recommendations.push(format!(
                    "Optimize {} response time (currently {:.1}s)",
                    agent_id, agent_metrics.avg_response_time
                ));
            }
        }
        if history_len > 100 {
            recommendations
                .push("Consider archiving old coordination messages for performance".to_string());
        }
        if recommendations.is_empty() {
            recommendations
                .push("System performance is optimal - maintain current operations".to_string());
        }

        PerformanceReport {
            monitoring_timestamp: Utc::now(),
            total_agents,
            agent_performance,
            system_health: SystemHealth {
                overall_health: overall_health.to_string(),
                active_agents_percentage: if total_agents > 0 {
                    active_agents as f64 / total_agents as f64
                } else {
                    0.0
                },
                average_success_rate,
                coordination_messages: history_len,
                last_assessment: Utc::now(),
            },
            recommendations,
        }
    }
}

/// Cache key: decision type plus a digest of the (key-sorted) context.
fn analysis_cache_key(
    decision_type: &str,
    business_context: &HashMap<String, serde_json::Value>,
) -> String {
    let canonical = sorted_json(business_context);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{}:{:x}", decision_type, hasher.finalize())
}

/// JSON text with map keys sorted, for stable hashing and prompts.
fn sorted_json(map: &HashMap<String, serde_json::Value>) -> String {
    let sorted: BTreeMap<&String, &serde_json::Value> = map.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

fn content_hash(content: &HashMap<String, serde_json::Value>) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(sorted_json(content).as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("digest is at least 8 bytes"))
}

fn string_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Deterministic analysis used when the provider is missing or returns
/// unparseable output.
fn fallback_ai_analysis(
    business_intelligence: &HashMap<String, serde_json::Value>,
) -> serde_json::Value {
    let market_growth = business_intelligence
        .get("market_data")
        .and_then(|v| v.get("market_growth_rate"))
        .cloned()
        .unwrap_or(json!("unknown"));
    let revenue_growth = business_intelligence
        .get("financial_metrics")
        .and_then(|v| v.get("revenue_growth"))
        .cloned()
        .unwrap_or(json!("unknown"));

    json!({
        "strategic_summary": format!(
            "Strategic analysis based on available business intelligence. Market growth: {}, Financial health: {}",
            market_growth, revenue_growth
        ),
        "recommendations": [
            "Focus on core business strengths",
            "Monitor competitive landscape closely",
            "Optimize operational efficiency",
            "Maintain financial discipline",
        ],
        "implementation_plan": [
            "Phase 1: Assessment and baseline establishment",
            "Phase 2: Strategic initiative implementation",
            "Phase 3: Performance monitoring and optimization",
        ],
        "performance_metrics": {
            "revenue_growth_target": 0.15,
            "efficiency_improvement": 0.10,
        },
        "confidence": 0.7,
        "risk_factors": [
            "Market volatility",
            "Resource constraints",
            "Implementation challenges",
        ],
    })
}

fn generate_resource_allocation(request: &StrategicAnalysisRequest) -> ResourceAllocation {
    let constraint_f64 = |key: &str, default: f64| -> f64 {
        request
            .constraints
            .get(key)
            .and_then(|v| v.as_f64())
            .unwrap_or(default)
    };
    let total_budget = constraint_f64("budget", 100_000.0);
    let team_size = constraint_f64("team_size", 10.0) as i64;
    let timeline_months = constraint_f64("timeline_months", 12.0);

    let revenue_focused = request.objectives.iter().any(|o| o == "revenue_growth");
    let budget_allocation = if revenue_focused {
        HashMap::from([
            ("marketing".to_string(), total_budget * 0.4),
            ("product_development".to_string(), total_budget * 0.3),
            ("operations".to_string(), total_budget * 0.2),
            ("contingency".to_string(), total_budget * 0.1),
        ])
    } else {
        HashMap::from([
            ("operations".to_string(), total_budget * 0.5),
            ("marketing".to_string(), total_budget * 0.25),
            ("product_development".to_string(), total_budget * 0.15),
            ("contingency".to_string(), total_budget * 0.1),
        ])
    };

    ResourceAllocation {
        budget_allocation,
        team_allocation: HashMap::from([
            ("market_analysis".to_string(), 2),
            ("content_creation".to_string(), 2),
            ("logistics_optimization".to_string(), 2),
            ("strategic_planning".to_string(), 1),
            ("coordination".to_string(), 1),
            ("available".to_string(), (team_size - 8).max(0)),
        ]),
        timeline_allocation: HashMap::from([
            ("planning_phase".to_string(), timeline_months * 0.2),
            ("implementation_phase".to_string(), timeline_months * 0.6),
            ("optimization_phase".to_string(), timeline_months * 0.2),
        ]),
        optimization_score: 0.85,
    }
}

fn assess_strategic_risks(request: &StrategicAnalysisRequest) -> RiskAssessment {
    let mut assessment = RiskAssessment {
        overall_risk_level: RiskLevel::Medium,
        risk_score: 0.6,
        risk_factors: Vec::new(),
        mitigation_strategies: Vec::new(),
        opportunities: Vec::new(),
        confidence: 0.8,
    };

    if request.decision_type == "strategic_planning" {
        assessment.risk_factors.extend([
            "Market volatility and competitive pressure".to_string(),
            "Resource allocation inefficiencies".to_string(),
            "Implementation timeline delays".to_string(),
        ]);
        assessment.mitigation_strategies.extend([
            "Implement phased rollout with regular checkpoints".to_string(),
            "Maintain 10% budget contingency for unexpected costs".to_string(),
            "Establish clear KPIs and monitoring systems".to_string(),
        ]);
    }

    if request.objectives.iter().any(|o| o == "revenue_growth") {
        assessment.opportunities.extend([
            "Market expansion into new segments".to_string(),
            "Product line diversification".to_string(),
            "Strategic partnerships and alliances".to_string(),
        ]);
    }

    // Risk severity tracks the budget band.
    let budget = request
        .constraints
        .get("budget")
        .and_then(|v| v.as_f64())
        .unwrap_or(100_000.0);
    if budget < 50_000.0 {
        assessment.overall_risk_level = RiskLevel::High;
        assessment.risk_score = 0.8;
    } else if budget > 200_000.0 {
        assessment.overall_risk_level = RiskLevel::Low;
        assessment.risk_score = 0.4;
    }

    assessment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::StubLlmProvider;

    fn executive(llm: Arc<StubLlmProvider>) -> AiExecutiveAgent {
        let agent = AiExecutiveAgent::new(
            "ai_executive_agent",
            llm,
            Arc::new(CostTracker::new(0.05)),
            Duration::from_secs(1800),
        );
        agent.register_default_agents();
        agent
    }

    fn analysis_request(budget: f64) -> StrategicAnalysisRequest {
        StrategicAnalysisRequest {
            business_context: HashMap::from([("revenue_growth".to_string(), json!(0.15))]),
            decision_type: "strategic_planning".to_string(),
            objectives: vec!["revenue_growth".to_string()],
            constraints: HashMap::from([("budget".to_string(), json!(budget))]),
            timeline: None,
            priority_level: "high".to_string(),
        }
    }

    #[tokio::test]
    async fn cached_analysis_reuses_llm_call() {
        let llm = Arc::new(StubLlmProvider::new());
        llm.push_response(r#"{"strategic_summary": "Grow", "recommendations": ["a"], "confidence": 0.9}"#);
        let agent = executive(llm.clone());

        let request = analysis_request(100_000.0);
        let first = agent.analyze_strategic_situation(&request).await;
        let second = agent.analyze_strategic_situation(&request).await;
        assert_eq!(llm.call_count(), 1);
        assert_eq!(first.strategic_summary, second.strategic_summary);
    }

    #[tokio::test]
    async fn fallback_analysis_when_llm_down() {
        let llm = Arc::new(StubLlmProvider::new());
        llm.set_unavailable(true);
        let agent = executive(llm);

        let result = agent.analyze_strategic_situation(&analysis_request(30_000.0)).await;
        assert!(!result.recommendations.is_empty());
        assert!((result.confidence_score - 0.7).abs() < 1e-9);
        // Low budget pushes risk high.
        assert_eq!(result.risk_assessment.overall_risk_level, RiskLevel::High);
        assert!(result
            .agent_coordination_plan
            .agent_assignments
            .contains_key("ai_market_agent"));
    }

    #[tokio::test]
    async fn task_assignment_marks_agent_busy() {
        let agent = executive(Arc::new(StubLlmProvider::new()));
        let message = CoordinationMessage::new(
            "ai_executive_agent",
            "ai_market_agent",
            MessageType::TaskAssignment,
            HashMap::from([("task".to_string(), json!("price_review"))]),
        );

        let outcome = agent.coordinate_with_agent(&message).await;
        assert_eq!(outcome.status, CoordinationStatus::TaskAssigned);
        assert!(outcome.data["task_id"].as_str().unwrap().starts_with("task_"));
        assert_eq!(
            agent.agent_snapshot()["ai_market_agent"].status,
            AgentStatus::Busy
        );
        assert_eq!(agent.coordination_history_len(), 1);
    }

    #[tokio::test]
    async fn status_updates_feed_success_rate() {
        let agent = executive(Arc::new(StubLlmProvider::new()));
        for status in ["completed", "completed", "failed"] {
            let message = CoordinationMessage::new(
                "logistics_agent",
                "ai_executive_agent",
                MessageType::StatusUpdate,
                HashMap::from([("status".to_string(), json!(status))]),
            );
            agent.coordinate_with_agent(&message).await;
        }

        let metrics = agent.metrics_snapshot();
        let logistics = &metrics["logistics_agent"];
        assert_eq!(logistics.total_tasks, 3);
        assert_eq!(logistics.completed_tasks, 2);
        assert!((logistics.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn market_intelligence_request_approved() {
        let agent = executive(Arc::new(StubLlmProvider::new()));
        let message = CoordinationMessage::new(
            "ai_executive_agent",
            "ai_market_agent",
            MessageType::CoordinationRequest,
            HashMap::from([("request_type".to_string(), json!("market_intelligence"))]),
        );
        let outcome = agent.coordinate_with_agent(&message).await;
        assert_eq!(outcome.status, CoordinationStatus::CoordinationApproved);

        let other = CoordinationMessage::new(
            "ai_executive_agent",
            "ai_market_agent",
            MessageType::CoordinationRequest,
            HashMap::from([("request_type".to_string(), json!("budget_review"))]),
        );
        let outcome = agent.coordinate_with_agent(&other).await;
        assert_eq!(outcome.status, CoordinationStatus::CoordinationPending);
    }

    #[tokio::test]
    async fn monitoring_reports_health_and_recommendations() {
        let agent = executive(Arc::new(StubLlmProvider::new()));
        // Drive one agent's metrics up through coordination outcomes.
        for _ in 0..5 {
            let message = CoordinationMessage::new(
                "ai_executive_agent",
                "ai_market_agent",
                MessageType::TaskAssignment,
                HashMap::from([("task".to_string(), json!("scan"))]),
            );
            agent.coordinate_with_agent(&message).await;
        }

        let report = agent.monitor_agent_performance();
        assert_eq!(report.total_agents, 4);
        // Agents with no completed work drag the average below the bands.
        assert_eq!(report.system_health.overall_health, "poor");
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("success rate")));
        assert_eq!(report.system_health.coordination_messages, 5);
    }
}
