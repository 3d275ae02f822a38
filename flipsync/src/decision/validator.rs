//! Rule-based decision validation.
//!
//! Rules are named predicates over a [`Decision`]. Validation runs every
//! registered rule and aggregates failures as `"{rule}: {message}"` strings.

use super::models::{Decision, DecisionType};
use crate::error::{ErrorCode, FlipsyncError, FsResult};
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::RwLock;
use tracing::debug;

/// A validation rule: `Ok` or a human-readable failure message.
pub type ValidationRule = Box<dyn Fn(&Decision) -> Result<(), String> + Send + Sync>;

/// Validator holding a registry of uniquely-named rules.
///
/// Rules run in name order so validation messages are deterministic.
pub struct RuleBasedValidator {
    validator_id: String,
    rules: RwLock<BTreeMap<String, ValidationRule>>,
}

impl RuleBasedValidator {
    pub fn new(validator_id: impl Into<String>) -> Self {
        Self {
            validator_id: validator_id.into(),
            rules: RwLock::new(BTreeMap::new()),
        }
    }

    /// Validate a decision against every registered rule.
    pub fn validate_decision(&self, decision: &Decision) -> (bool, Vec<String>) {
        let rules = self.rules.read().unwrap();
        if rules.is_empty() {
            return (true, Vec::new());
        }

        let mut messages = Vec::new();
        for (name, rule) in rules.iter() {
            if let Err(message) = rule(decision) {
                messages.push(format!("{}: {}", name, message));
            }
        }

        let is_valid = messages.is_empty();
        if is_valid {
            debug!("Decision {} is valid", decision.id());
        } else {
            debug!("Decision {} is invalid: {:?}", decision.id(), messages);
        }
        (is_valid, messages)
    }

    /// Register a rule. Names must be unique.
    pub fn add_validation_rule(
        &self,
        rule_name: impl Into<String>,
        rule: ValidationRule,
    ) -> FsResult<()> {
        let rule_name = rule_name.into();
        let mut rules = self.rules.write().unwrap();
        if rules.contains_key(&rule_name) {
            return Err(FlipsyncError::new(
                ErrorCode::RuleExists,
                format!("Rule {} already exists", rule_name),
            ));
        }
        debug!("[{}] Added validation rule {}", self.validator_id, rule_name);
        rules.insert(rule_name, rule);
        Ok(())
    }

    /// Remove a rule; returns whether it existed.
    pub fn remove_validation_rule(&self, rule_name: &str) -> bool {
        self.rules.write().unwrap().remove(rule_name).is_some()
    }

    pub fn list_validation_rules(&self) -> Vec<String> {
        self.rules.read().unwrap().keys().cloned().collect()
    }

    /// Require confidence at or above `min_confidence`.
    pub fn add_minimum_confidence_rule(&self, min_confidence: f64) -> FsResult<()> {
        self.add_validation_rule(
            "minimum_confidence",
            Box::new(move |decision| {
                if decision.confidence < min_confidence {
                    Err(format!(
                        "Confidence too low ({:.2} < {:.2})",
                        decision.confidence, min_confidence
                    ))
                } else {
                    Ok(())
                }
            }),
        )
    }

    /// Require a reasoning string of at least `min_length` characters.
    pub fn add_required_reasoning_rule(&self, min_length: usize) -> FsResult<()> {
        self.add_validation_rule(
            "required_reasoning",
            Box::new(move |decision| {
                if decision.reasoning.len() < min_length {
                    Err(format!(
                        "Reasoning too short or missing (min length: {})",
                        min_length
                    ))
                } else {
                    Ok(())
                }
            }),
        )
    }

    /// Restrict decisions to an allowed set of types.
    pub fn add_allowed_decision_types_rule(&self, allowed: HashSet<DecisionType>) -> FsResult<()> {
        self.add_validation_rule(
            "allowed_decision_types",
            Box::new(move |decision| {
                if allowed.contains(&decision.decision_type) {
                    Ok(())
                } else {
                    Err(format!("Decision type {} not allowed", decision.decision_type))
                }
            }),
        )
    }

    /// Require the battery-efficiency flag when `required` is true.
    pub fn add_battery_efficiency_rule(&self, required: bool) -> FsResult<()> {
        self.add_validation_rule(
            "battery_efficiency",
            Box::new(move |decision| {
                if required && !decision.battery_efficient {
                    Err("Battery efficiency required but not provided".to_string())
                } else {
                    Ok(())
                }
            }),
        )
    }

    /// Register a built-in rule by name with loosely-typed parameters.
    ///
    /// Recognized names: `minimum_confidence` (`min_confidence`),
    /// `required_reasoning` (`min_length`), `battery_efficiency` and
    /// `network_efficiency` (`required`). Unknown names fail with
    /// `UNKNOWN_RULE`.
    pub fn add_built_in_rule(
        &self,
        rule_name: &str,
        params: &std::collections::HashMap<String, serde_json::Value>,
    ) -> FsResult<()> {
        match rule_name {
            "minimum_confidence" => {
                let min_confidence = params
                    .get("min_confidence")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(0.5);
                self.add_minimum_confidence_rule(min_confidence)
            }
            "required_reasoning" => {
                let min_length = params
                    .get("min_length")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(10) as usize;
                self.add_required_reasoning_rule(min_length)
            }
            "battery_efficiency" => {
                let required = params
                    .get("required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.add_battery_efficiency_rule(required)
            }
            "network_efficiency" => {
                let required = params
                    .get("required")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.add_network_efficiency_rule(required)
            }
            _ => Err(FlipsyncError::new(
                ErrorCode::UnknownRule,
                format!("Unknown built-in rule: {}", rule_name),
            )),
        }
    }

    /// Require the network-efficiency flag when `required` is true.
    pub fn add_network_efficiency_rule(&self, required: bool) -> FsResult<()> {
        self.add_validation_rule(
            "network_efficiency",
            Box::new(move |decision| {
                if required && !decision.network_efficient {
                    Err("Network efficiency required but not provided".to_string())
                } else {
                    Ok(())
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::models::Context;

    fn decision_with_confidence(confidence: f64) -> Decision {
        Decision::create(
            DecisionType::Selection,
            "x",
            confidence,
            "Selected option 'x' with confidence",
            vec![],
            None,
            Context::new(),
            false,
            false,
        )
    }

    #[test]
    fn no_rules_means_valid() {
        let validator = RuleBasedValidator::new("v");
        let (valid, messages) = validator.validate_decision(&decision_with_confidence(0.1));
        assert!(valid);
        assert!(messages.is_empty());
    }

    #[test]
    fn minimum_confidence_message_format() {
        let validator = RuleBasedValidator::new("v");
        validator.add_minimum_confidence_rule(0.7).unwrap();

        let (valid, messages) = validator.validate_decision(&decision_with_confidence(0.5));
        assert!(!valid);
        assert_eq!(
            messages,
            vec!["minimum_confidence: Confidence too low (0.50 < 0.70)".to_string()]
        );
    }

    #[test]
    fn duplicate_rule_rejected() {
        let validator = RuleBasedValidator::new("v");
        validator.add_minimum_confidence_rule(0.5).unwrap();
        let err = validator.add_minimum_confidence_rule(0.6).unwrap_err();
        assert!(err.is_code(ErrorCode::RuleExists));
    }

    #[test]
    fn remove_and_list_rules() {
        let validator = RuleBasedValidator::new("v");
        validator.add_required_reasoning_rule(10).unwrap();
        validator.add_battery_efficiency_rule(true).unwrap();
        assert_eq!(
            validator.list_validation_rules(),
            vec!["battery_efficiency".to_string(), "required_reasoning".to_string()]
        );
        assert!(validator.remove_validation_rule("battery_efficiency"));
        assert!(!validator.remove_validation_rule("battery_efficiency"));
    }

    #[test]
    fn built_in_rules_by_name() {
        let validator = RuleBasedValidator::new("v");
        let params = std::collections::HashMap::from([(
            "min_confidence".to_string(),
            serde_json::json!(0.7),
        )]);
        validator.add_built_in_rule("minimum_confidence", &params).unwrap();
        let (valid, _) = validator.validate_decision(&decision_with_confidence(0.6));
        assert!(!valid);

        let err = validator
            .add_built_in_rule("no_such_rule", &Default::default())
            .unwrap_err();
        assert!(err.is_code(ErrorCode::UnknownRule));
    }

    #[test]
    fn multiple_failures_aggregate() {
        let validator = RuleBasedValidator::new("v");
        validator.add_minimum_confidence_rule(0.9).unwrap();
        validator
            .add_allowed_decision_types_rule(HashSet::from([DecisionType::Action]))
            .unwrap();

        let (valid, messages) = validator.validate_decision(&decision_with_confidence(0.5));
        assert!(!valid);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.starts_with("allowed_decision_types:")));
    }
}
