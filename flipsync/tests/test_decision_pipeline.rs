//! End-to-end decision pipeline scenarios: resource-aware selection,
//! rule-driven rejection, learning-shifted contexts, and offline drains.

use flipsync::decision::{
    Context, DecisionConstraints, DecisionOption, DecisionPipeline, DecisionStatus,
};
use flipsync::error::ErrorCode;
use flipsync::events::{names, RecordingPublisher};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

fn pipeline() -> (Arc<RecordingPublisher>, DecisionPipeline) {
    let publisher = Arc::new(RecordingPublisher::new());
    (publisher.clone(), DecisionPipeline::new("it_pipeline", publisher))
}

fn feedback(outcome: &str, quality: f64, relevance: f64) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        ("outcome".to_string(), json!(outcome)),
        ("quality".to_string(), json!(quality)),
        ("relevance".to_string(), json!(relevance)),
    ])
}

#[tokio::test]
async fn battery_aware_selection_scenario() {
    let (_, pipeline) = pipeline();

    let mut context = Context::new();
    context.insert(
        "device_info".to_string(),
        json!({"battery_level": 0.2, "network_type": "wifi"}),
    );
    let options = vec![
        DecisionOption::new("a").with_value(80.0).with_battery_cost(0.9),
        DecisionOption::new("b").with_value(60.0).with_battery_cost(0.1),
    ];

    let decision = pipeline.make_decision(&context, &options, None).await.unwrap();
    assert_eq!(decision.action, "b");
    assert!(decision.battery_efficient);
    assert!(!decision.network_efficient);
    assert_eq!(decision.alternatives, vec!["a".to_string()]);
    assert!((decision.confidence - 0.75).abs() < 1e-9);
    assert!(decision.metadata.updated_at >= decision.metadata.created_at);
}

#[tokio::test]
async fn rule_driven_rejection_scenario() {
    let (_, pipeline) = pipeline();
    pipeline.validator().add_minimum_confidence_rule(0.7).unwrap();

    let decision = pipeline
        .make_decision(&Context::new(), &[DecisionOption::new("x").with_value(50.0)], None)
        .await
        .unwrap();
    assert!((decision.confidence - 0.5).abs() < 1e-9);

    let (valid, messages) = pipeline.validate_decision(&decision).await;
    assert!(!valid);
    assert_eq!(
        messages,
        vec!["minimum_confidence: Confidence too low (0.50 < 0.70)".to_string()]
    );
    assert_eq!(
        pipeline.get_decision(decision.id()).unwrap().metadata.status,
        DecisionStatus::Rejected
    );
}

#[tokio::test]
async fn learning_shifts_subsequent_decisions() {
    let (_, pipeline) = pipeline();
    let options = vec![DecisionOption::new("x").with_value(50.0)];
    let decision = pipeline.make_decision(&Context::new(), &options, None).await.unwrap();

    for _ in 0..3 {
        pipeline
            .process_feedback(decision.id(), feedback("success", 0.9, 0.9), false, false)
            .await
            .unwrap();
    }

    let adjustment = pipeline
        .learning_engine()
        .get_confidence_adjustment(flipsync::decision::DecisionType::Selection);
    assert!(adjustment >= 0.09);

    let next = pipeline.make_decision(&Context::new(), &options, None).await.unwrap();
    let observed = next.context["learning_adjustments"]["selection"].as_f64().unwrap();
    assert!(observed >= 0.09);
}

#[tokio::test]
async fn failing_feedback_strictly_decreases_adjustment() {
    let (_, pipeline) = pipeline();
    let decision = pipeline
        .make_decision(&Context::new(), &[DecisionOption::new("x")], None)
        .await
        .unwrap();

    let mut previous = pipeline
        .learning_engine()
        .get_confidence_adjustment(flipsync::decision::DecisionType::Selection);
    for _ in 0..4 {
        pipeline
            .process_feedback(decision.id(), feedback("failure", 0.0, 0.0), false, false)
            .await
            .unwrap();
        let current = pipeline
            .learning_engine()
            .get_confidence_adjustment(flipsync::decision::DecisionType::Selection);
        assert!(current < previous);
        assert!(previous - current <= 0.1 + 1e-9);
        previous = current;
    }
}

#[tokio::test]
async fn constraint_boundaries() {
    let (_, pipeline) = pipeline();

    let err = pipeline
        .make_decision(&Context::new(), &[], None)
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::NoOptions));

    let constraints = DecisionConstraints {
        min_value: Some(90.0),
        ..Default::default()
    };
    let err = pipeline
        .make_decision(
            &Context::new(),
            &[DecisionOption::new("low").with_value(10.0)],
            Some(&constraints),
        )
        .await
        .unwrap_err();
    assert!(err.is_code(ErrorCode::NoValidOptions));

    // Satisfiable constraints always produce a satisfying action.
    let options = vec![
        DecisionOption::new("low").with_value(10.0),
        DecisionOption::new("high").with_value(95.0),
    ];
    let decision = pipeline
        .make_decision(&Context::new(), &options, Some(&constraints))
        .await
        .unwrap();
    assert_eq!(decision.action, "high");
}

#[tokio::test]
async fn offline_execution_drains_once_in_order() {
    let (publisher, pipeline) = pipeline();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let decision = pipeline
            .make_decision(&Context::new(), &[DecisionOption::new("x")], None)
            .await
            .unwrap();
        pipeline.execute_decision(&decision, false, true).await.unwrap();
        ids.push(decision.id().to_string());
    }
    // Offline execution publishes nothing.
    assert!(publisher.events().is_empty());
    assert_eq!(pipeline.tracker().offline_queue_len(), 3);

    let drained = pipeline.tracker().sync_offline_decisions().await;
    assert_eq!(drained, 3);
    let events = publisher.events_named(names::DECISION_TRACKED);
    assert_eq!(events.len(), 3);
    for (event, id) in events.iter().zip(&ids) {
        assert_eq!(event.data["decision_id"], json!(id));
    }

    // Second drain publishes zero additional notifications.
    assert_eq!(pipeline.tracker().sync_offline_decisions().await, 0);
    assert_eq!(publisher.events_named(names::DECISION_TRACKED).len(), 3);
}

#[tokio::test]
async fn decision_value_round_trip() {
    let (_, pipeline) = pipeline();
    let mut context = Context::new();
    context.insert("scenario".to_string(), json!("restock"));

    let decision = pipeline
        .make_decision(&context, &[DecisionOption::new("x").with_value(70.0)], None)
        .await
        .unwrap();
    let restored = flipsync::decision::Decision::from_value(decision.to_value()).unwrap();
    assert_eq!(restored, decision);
}

#[tokio::test]
async fn reset_learning_zeroes_metrics() {
    let (_, pipeline) = pipeline();
    let decision = pipeline
        .make_decision(&Context::new(), &[DecisionOption::new("x")], None)
        .await
        .unwrap();
    pipeline
        .process_feedback(decision.id(), feedback("success", 0.9, 0.9), false, false)
        .await
        .unwrap();

    pipeline.learning_engine().reset_learning(false).await;
    let metrics = pipeline.learning_engine().get_learning_metrics();
    assert_eq!(metrics.feedback_count, 0);
    assert_eq!(metrics.learning_iterations, 0);
    assert!(metrics.confidence_adjustments.is_empty());
}
