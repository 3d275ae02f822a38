//! Decision maker.
//!
//! Evaluates a set of options against the caller's context and constraints
//! and emits a [`Decision`]. Scoring is resource-aware: a low battery or a
//! cellular connection shifts weight towards cheaper options.

use super::models::{Context, Decision, DecisionFilter, DecisionType, DeviceInfo};
use crate::error::{ErrorCode, FlipsyncError, FsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// One selectable option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOption {
    pub id: String,
    /// Display name used in reasoning when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base desirability on a 0-100 scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Relative battery drain in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_cost: Option<f64>,
    /// Relative network usage in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl DecisionOption {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            value: None,
            battery_cost: None,
            network_cost: None,
            tags: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_battery_cost(mut self, cost: f64) -> Self {
        self.battery_cost = Some(cost);
        self
    }

    pub fn with_network_cost(mut self, cost: f64) -> Self {
        self.network_cost = Some(cost);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Recognized constraints applied before scoring.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_tags: Option<Vec<String>>,
}

impl DecisionConstraints {
    fn is_empty(&self) -> bool {
        self.min_value.is_none()
            && self.max_value.is_none()
            && self.allowed_values.is_none()
            && self.required_tags.is_none()
    }

    fn permits(&self, option: &DecisionOption) -> bool {
        if let Some(min) = self.min_value {
            if option.value.unwrap_or(0.0) < min {
                return false;
            }
        }
        if let Some(max) = self.max_value {
            if option.value.unwrap_or(0.0) > max {
                return false;
            }
        }
        if let Some(ref allowed) = self.allowed_values {
            match option.value {
                Some(value) if allowed.contains(&value) => {}
                _ => return false,
            }
        }
        if let Some(ref required) = self.required_tags {
            if !required.iter().all(|tag| option.tags.contains(tag)) {
                return false;
            }
        }
        true
    }
}

/// In-memory decision maker. Keeps a local record of every decision it made.
pub struct InMemoryDecisionMaker {
    maker_id: String,
    decisions: RwLock<HashMap<String, Decision>>,
}

impl InMemoryDecisionMaker {
    pub fn new(maker_id: impl Into<String>) -> Self {
        Self {
            maker_id: maker_id.into(),
            decisions: RwLock::new(HashMap::new()),
        }
    }

    /// Make a decision from the given options.
    ///
    /// Fails with `NO_OPTIONS` when `options` is empty and `NO_VALID_OPTIONS`
    /// when the constraints eliminate every option.
    pub fn make_decision(
        &self,
        context: &Context,
        options: &[DecisionOption],
        constraints: Option<&DecisionConstraints>,
    ) -> FsResult<Decision> {
        debug!("Making decision with {} options", options.len());

        if options.is_empty() {
            return Err(FlipsyncError::new(
                ErrorCode::NoOptions,
                "No options provided for decision making",
            ));
        }

        let filtered: Vec<&DecisionOption> = match constraints {
            Some(constraints) if !constraints.is_empty() => {
                let surviving: Vec<&DecisionOption> =
                    options.iter().filter(|o| constraints.permits(o)).collect();
                if surviving.is_empty() {
                    return Err(FlipsyncError::new(
                        ErrorCode::NoValidOptions,
                        "No options meet the constraints",
                    )
                    .with_detail(
                        "constraints",
                        serde_json::to_value(constraints).unwrap_or_default(),
                    ));
                }
                surviving
            }
            _ => options.iter().collect(),
        };

        let device = DeviceInfo::from_context(context);
        let battery_efficient = device.low_battery();
        let network_efficient = device.on_cellular();
        if battery_efficient {
            debug!("Enabling battery efficiency due to low battery");
        }
        if network_efficient {
            debug!("Enabling network efficiency due to cellular network");
        }

        let scored: Vec<(&DecisionOption, f64)> = filtered
            .iter()
            .map(|option| {
                (
                    *option,
                    score_option(option, battery_efficient, network_efficient),
                )
            })
            .collect();

        // Maximum score wins; ties resolve to the earliest option.
        let (best, confidence) = scored
            .iter()
            .fold(None::<(&DecisionOption, f64)>, |acc, &(option, score)| match acc {
                Some((_, best_score)) if score <= best_score => acc,
                _ => Some((option, score)),
            })
            .expect("filtered options are non-empty");

        let alternatives: Vec<String> = scored
            .iter()
            .filter(|(option, _)| option.id != best.id)
            .map(|(option, _)| option.id.clone())
            .collect();

        let reasoning = build_reasoning(best, confidence, context, &device);

        let decision = Decision::create(
            DecisionType::Selection,
            best.id.clone(),
            confidence,
            reasoning,
            alternatives,
            Some(self.maker_id.clone()),
            context.clone(),
            battery_efficient,
            network_efficient,
        );

        self.decisions
            .write()
            .unwrap()
            .insert(decision.id().to_string(), decision.clone());

        debug!(
            "Made decision {} with confidence {:.2}",
            decision.id(),
            confidence
        );
        Ok(decision)
    }

    pub fn get_decision(&self, decision_id: &str) -> Option<Decision> {
        self.decisions.read().unwrap().get(decision_id).cloned()
    }

    pub fn list_decisions(&self, filter: Option<&DecisionFilter>) -> Vec<Decision> {
        let decisions = self.decisions.read().unwrap();
        decisions
            .values()
            .filter(|d| filter.map(|f| f.matches(d)).unwrap_or(true))
            .cloned()
            .collect()
    }
}

fn score_option(option: &DecisionOption, battery_efficient: bool, network_efficient: bool) -> f64 {
    // Base score is the option's value on a 0-1 scale, defaulting to 0.5.
    let mut score = option.value.unwrap_or(50.0) / 100.0;

    if battery_efficient {
        if let Some(battery_cost) = option.battery_cost {
            let battery_factor = 1.0 - battery_cost;
            score = score * 0.5 + battery_factor * 0.5;
        }
    }

    if network_efficient {
        if let Some(network_cost) = option.network_cost {
            let network_factor = 1.0 - network_cost;
            score = score * 0.7 + network_factor * 0.3;
        }
    }

    score.clamp(0.0, 1.0)
}

fn build_reasoning(
    option: &DecisionOption,
    confidence: f64,
    context: &Context,
    device: &DeviceInfo,
) -> String {
    let mut reasons: Vec<String> = Vec::new();

    match option.name {
        Some(ref name) => reasons.push(format!("Selected '{}'", name)),
        None => reasons.push(format!("Selected option '{}'", option.id)),
    }

    if let Some(value) = option.value {
        reasons.push(format!("with value {}", value));
    }

    reasons.push(format!("with confidence {:.2}", confidence));

    if let Some(scenario) = context.get("scenario").and_then(|v| v.as_str()) {
        reasons.push(format!("for scenario '{}'", scenario));
    }

    if device.low_battery() {
        reasons.push("considering low battery level".to_string());
    }
    if device.on_cellular() {
        reasons.push("optimizing for cellular network".to_string());
    }

    reasons.join(" ")
}
