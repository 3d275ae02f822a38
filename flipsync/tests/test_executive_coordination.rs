//! Executive orchestration: strategic analysis caching (single LLM call per
//! cache key), coordination routing, and performance monitoring.

use flipsync::agents::{CoordinationMessage, MessageType};
use flipsync::executive::{AiExecutiveAgent, CoordinationStatus, StrategicAnalysisRequest};
use flipsync::llm::{CostTracker, StubLlmProvider};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn executive(llm: Arc<StubLlmProvider>) -> Arc<AiExecutiveAgent> {
    let agent = AiExecutiveAgent::new(
        "ai_executive_agent",
        llm,
        Arc::new(CostTracker::new(0.05)),
        Duration::from_secs(1800),
    );
    agent.register_default_agents();
    Arc::new(agent)
}

fn request(context_value: f64) -> StrategicAnalysisRequest {
    StrategicAnalysisRequest {
        business_context: HashMap::from([("revenue_growth".to_string(), json!(context_value))]),
        decision_type: "strategic_planning".to_string(),
        objectives: vec!["revenue_growth".to_string()],
        constraints: HashMap::from([("budget".to_string(), json!(100_000.0))]),
        timeline: None,
        priority_level: "high".to_string(),
    }
}

#[tokio::test]
async fn identical_requests_share_one_llm_call() {
    let llm = Arc::new(StubLlmProvider::new());
    llm.push_response(r#"{"strategic_summary": "s", "recommendations": ["r"], "confidence": 0.9}"#);
    let agent = executive(llm.clone());

    // Concurrent identical requests observe a single provider call.
    let req_a = request(0.15);
    let req_b = request(0.15);
    let (first, second) = tokio::join!(
        agent.analyze_strategic_situation(&req_a),
        agent.analyze_strategic_situation(&req_b),
    );
    assert_eq!(llm.call_count(), 1);
    assert_eq!(first.strategic_summary, second.strategic_summary);

    // A different business context is a different cache key.
    llm.push_response(r#"{"strategic_summary": "t", "recommendations": ["r"], "confidence": 0.9}"#);
    let third = agent.analyze_strategic_situation(&request(0.40)).await;
    assert_eq!(llm.call_count(), 2);
    assert_eq!(third.strategic_summary, "t");
}

#[tokio::test]
async fn coordination_dispatch_matrix() {
    let agent = executive(Arc::new(StubLlmProvider::new()));

    let assignment = agent
        .coordinate_with_agent(&CoordinationMessage::new(
            "ai_executive_agent",
            "logistics_agent",
            MessageType::TaskAssignment,
            HashMap::from([("task".to_string(), json!("optimize_shipping"))]),
        ))
        .await;
    assert_eq!(assignment.status, CoordinationStatus::TaskAssigned);

    let status = agent
        .coordinate_with_agent(&CoordinationMessage::new(
            "logistics_agent",
            "ai_executive_agent",
            MessageType::StatusUpdate,
            HashMap::from([
                ("status".to_string(), json!("completed")),
                ("completion_percentage".to_string(), json!(100)),
            ]),
        ))
        .await;
    assert_eq!(status.status, CoordinationStatus::StatusUpdated);
    assert_eq!(status.data["agent_status"], json!("completed"));

    let report = agent
        .coordinate_with_agent(&CoordinationMessage::new(
            "ai_market_agent",
            "ai_executive_agent",
            MessageType::PerformanceReport,
            HashMap::from([(
                "performance_metrics".to_string(),
                json!({"avg_response_time": 1.2, "success_rate": 0.92}),
            )]),
        ))
        .await;
    assert_eq!(report.status, CoordinationStatus::PerformanceReportReceived);
    let metrics = agent.metrics_snapshot();
    assert!((metrics["ai_market_agent"].avg_response_time - 1.2).abs() < 1e-9);

    let general = agent
        .coordinate_with_agent(&CoordinationMessage::new(
            "content_agent",
            "ai_executive_agent",
            MessageType::General,
            HashMap::new(),
        ))
        .await;
    assert_eq!(general.status, CoordinationStatus::CoordinationAcknowledged);
    assert_eq!(agent.coordination_history_len(), 4);
}

#[tokio::test]
async fn slow_agents_draw_recommendations() {
    let agent = executive(Arc::new(StubLlmProvider::new()));
    agent
        .coordinate_with_agent(&CoordinationMessage::new(
            "logistics_agent",
            "ai_executive_agent",
            MessageType::PerformanceReport,
            HashMap::from([(
                "performance_metrics".to_string(),
                json!({"avg_response_time": 4.5, "success_rate": 0.95}),
            )]),
        ))
        .await;

    let report = agent.monitor_agent_performance();
    assert!(report
        .recommendations
        .iter()
        .any(|recommendation| recommendation.contains("response time")));
    assert_eq!(report.total_agents, 4);
    assert!(report.system_health.active_agents_percentage > 0.0);
}

#[tokio::test]
async fn coordination_history_growth_flags_archiving() {
    let agent = executive(Arc::new(StubLlmProvider::new()));
    for index in 0..101 {
        agent
            .coordinate_with_agent(&CoordinationMessage::new(
                "ai_executive_agent",
                "ai_market_agent",
                MessageType::TaskAssignment,
                HashMap::from([("task".to_string(), json!(format!("scan-{}", index)))]),
            ))
            .await;
    }

    let report = agent.monitor_agent_performance();
    assert!(report
        .recommendations
        .iter()
        .any(|recommendation| recommendation.contains("archiving")));
}
