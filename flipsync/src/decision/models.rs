//! Core decision data model.
//!
//! A [`Decision`] is an immutable record of a choice: the selected action,
//! the confidence behind it, and the reasoning trail. Only its metadata
//! status (and `updated_at`) evolve, and only through the tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque key→value context captured when a decision is made.
pub type Context = HashMap<String, serde_json::Value>;

/// Types of decisions the system can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    Action,
    Recommendation,
    Optimization,
    Allocation,
    Prioritization,
    Scheduling,
    Selection,
    Classification,
    Prediction,
    Custom,
}

impl DecisionType {
    pub const ALL: [DecisionType; 10] = [
        DecisionType::Action,
        DecisionType::Recommendation,
        DecisionType::Optimization,
        DecisionType::Allocation,
        DecisionType::Prioritization,
        DecisionType::Scheduling,
        DecisionType::Selection,
        DecisionType::Classification,
        DecisionType::Prediction,
        DecisionType::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionType::Action => "action",
            DecisionType::Recommendation => "recommendation",
            DecisionType::Optimization => "optimization",
            DecisionType::Allocation => "allocation",
            DecisionType::Prioritization => "prioritization",
            DecisionType::Scheduling => "scheduling",
            DecisionType::Selection => "selection",
            DecisionType::Classification => "classification",
            DecisionType::Prediction => "prediction",
            DecisionType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Pending,
    Validating,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
    Canceled,
    Expired,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "pending",
            DecisionStatus::Validating => "validating",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Executing => "executing",
            DecisionStatus::Completed => "completed",
            DecisionStatus::Failed => "failed",
            DecisionStatus::Canceled => "canceled",
            DecisionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Rejected
                | DecisionStatus::Completed
                | DecisionStatus::Canceled
                | DecisionStatus::Expired
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Validation may be skipped, so `Pending` can step directly to a
    /// validation outcome or into execution. `Failed` may re-enter
    /// `Executing` for a retry; the tracker enforces the retry budget.
    pub fn can_transition_to(&self, next: DecisionStatus) -> bool {
        use DecisionStatus::*;
        match self {
            Pending => matches!(next, Validating | Approved | Rejected | Executing | Canceled | Expired),
            Validating => matches!(next, Approved | Rejected | Canceled | Expired),
            Approved => matches!(next, Executing | Canceled | Expired),
            Executing => matches!(next, Completed | Failed | Canceled),
            Failed => matches!(next, Executing | Canceled | Expired),
            Rejected | Completed | Canceled | Expired => false,
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Standardized confidence bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionConfidence {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl DecisionConfidence {
    pub fn from_score(confidence: f64) -> Self {
        if confidence >= 0.9 {
            DecisionConfidence::VeryHigh
        } else if confidence >= 0.75 {
            DecisionConfidence::High
        } else if confidence >= 0.5 {
            DecisionConfidence::Medium
        } else {
            DecisionConfidence::Low
        }
    }
}

/// Metadata travelling with every decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    pub decision_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: DecisionStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, serde_json::Value>,
}

impl DecisionMetadata {
    pub fn new(source: Option<String>, target: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            decision_id: Uuid::new_v4().to_string(),
            correlation_id: None,
            causation_id: None,
            version: "1.0".to_string(),
            source,
            target,
            created_at: now,
            updated_at: now,
            status: DecisionStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            conversation_id: None,
            user_id: None,
            custom: HashMap::new(),
        }
    }
}

impl Default for DecisionMetadata {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// An immutable record of a choice made by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub decision_type: DecisionType,
    /// Identifier of the selected option.
    pub action: String,
    /// Confidence in [0, 1]. Never mutated after creation.
    pub confidence: f64,
    pub reasoning: String,
    /// Option ids considered but not selected, in evaluation order.
    pub alternatives: Vec<String>,
    pub metadata: DecisionMetadata,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: Context,
    pub battery_efficient: bool,
    pub network_efficient: bool,
}

impl Decision {
    /// Create a decision with fresh metadata.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        decision_type: DecisionType,
        action: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
        alternatives: Vec<String>,
        source: Option<String>,
        context: Context,
        battery_efficient: bool,
        network_efficient: bool,
    ) -> Self {
        Self {
            decision_type,
            action: action.into(),
            confidence,
            reasoning: reasoning.into(),
            alternatives,
            metadata: DecisionMetadata::new(source, None),
            context,
            battery_efficient,
            network_efficient,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.decision_id
    }

    pub fn confidence_level(&self) -> DecisionConfidence {
        DecisionConfidence::from_score(self.confidence)
    }

    /// Advance the status and stamp `updated_at`. Callers outside the
    /// tracker should go through the tracker instead.
    pub(crate) fn update_status(&mut self, status: DecisionStatus) {
        self.metadata.status = status;
        self.metadata.updated_at = Utc::now();
    }

    /// Serialize to the canonical JSON value form.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("decision serialization is infallible")
    }

    /// Reconstruct from the canonical JSON value form.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Filter for querying stored decisions.
#[derive(Debug, Clone, Default)]
pub struct DecisionFilter {
    pub decision_type: Option<DecisionType>,
    pub action: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    pub status: Option<DecisionStatus>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub battery_efficient: Option<bool>,
    pub network_efficient: Option<bool>,
}

impl DecisionFilter {
    pub fn for_type(decision_type: DecisionType) -> Self {
        Self {
            decision_type: Some(decision_type),
            ..Default::default()
        }
    }

    pub fn with_status(status: DecisionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn matches(&self, decision: &Decision) -> bool {
        if let Some(decision_type) = self.decision_type {
            if decision.decision_type != decision_type {
                return false;
            }
        }
        if let Some(ref action) = self.action {
            if &decision.action != action {
                return false;
            }
        }
        if let Some(min) = self.min_confidence {
            if decision.confidence < min {
                return false;
            }
        }
        if let Some(max) = self.max_confidence {
            if decision.confidence > max {
                return false;
            }
        }
        if let Some(status) = self.status {
            if decision.metadata.status != status {
                return false;
            }
        }
        if let Some(ref source) = self.source {
            if decision.metadata.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(ref target) = self.target {
            if decision.metadata.target.as_deref() != Some(target.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if decision.metadata.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if decision.metadata.created_at > before {
                return false;
            }
        }
        if let Some(battery) = self.battery_efficient {
            if decision.battery_efficient != battery {
                return false;
            }
        }
        if let Some(network) = self.network_efficient {
            if decision.network_efficient != network {
                return false;
            }
        }
        true
    }
}

/// Device information read from a decision context.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    pub battery_level: Option<f64>,
    pub network_type: Option<String>,
}

impl DeviceInfo {
    /// Typed accessor over the schema-less `device_info` context key.
    pub fn from_context(context: &Context) -> Self {
        let Some(device) = context.get("device_info").and_then(|v| v.as_object()) else {
            return Self::default();
        };
        Self {
            battery_level: device.get("battery_level").and_then(|v| v.as_f64()),
            network_type: device
                .get("network_type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }

    pub fn low_battery(&self) -> bool {
        self.battery_level.map(|level| level < 0.3).unwrap_or(false)
    }

    pub fn on_cellular(&self) -> bool {
        self.network_type.as_deref() == Some("cellular")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_round_trip_preserves_decision() {
        let mut context = Context::new();
        context.insert("scenario".to_string(), json!("checkout"));
        context.insert("unknown_key".to_string(), json!({"nested": [1, 2, 3]}));

        let decision = Decision::create(
            DecisionType::Selection,
            "opt-a",
            0.75,
            "Selected option 'opt-a' with confidence 0.75",
            vec!["opt-b".to_string()],
            Some("maker-1".to_string()),
            context,
            true,
            false,
        );

        let value = decision.to_value();
        let restored = Decision::from_value(value).unwrap();
        assert_eq!(restored, decision);
        // Unknown context keys survive verbatim.
        assert_eq!(restored.context["unknown_key"], json!({"nested": [1, 2, 3]}));
    }

    #[test]
    fn status_machine_allows_documented_paths() {
        use DecisionStatus::*;
        assert!(Pending.can_transition_to(Validating));
        assert!(Pending.can_transition_to(Executing));
        assert!(Validating.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Executing));
        assert!(Executing.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Executing));
        assert!(!Completed.can_transition_to(Executing));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn confidence_banding() {
        assert_eq!(DecisionConfidence::from_score(0.95), DecisionConfidence::VeryHigh);
        assert_eq!(DecisionConfidence::from_score(0.8), DecisionConfidence::High);
        assert_eq!(DecisionConfidence::from_score(0.5), DecisionConfidence::Medium);
        assert_eq!(DecisionConfidence::from_score(0.2), DecisionConfidence::Low);
    }

    #[test]
    fn device_info_accessor_reads_known_keys() {
        let mut context = Context::new();
        context.insert(
            "device_info".to_string(),
            json!({"battery_level": 0.2, "network_type": "cellular"}),
        );
        let info = DeviceInfo::from_context(&context);
        assert!(info.low_battery());
        assert!(info.on_cellular());
        assert!(!DeviceInfo::from_context(&Context::new()).low_battery());
    }
}
