//! Error types shared across the FlipSync core.
//!
//! Every fallible library operation returns [`FsResult`]. Errors carry a
//! stable [`ErrorCode`] so callers can branch without parsing messages, plus
//! an optional structured details map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Stable error codes surfaced by the core components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoOptions,
    NoValidOptions,
    RuleExists,
    UnknownRule,
    DecisionNotFound,
    DecisionValidationFailed,
    DecisionMakingError,
    DecisionValidationError,
    DecisionExecutionError,
    FeedbackProcessingError,
    DecisionHistoryError,
    DecisionRetrievalError,
    OfflineBufferFull,
    AdapterUnavailable,
    LlmUnavailable,
    /// Non-fatal: the response is still returned, the overrun only logged.
    CostCeilingExceeded,
    RepositoryError,
    ApprovalNotFound,
    OrderNotFound,
    InvalidRequest,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoOptions => "NO_OPTIONS",
            ErrorCode::NoValidOptions => "NO_VALID_OPTIONS",
            ErrorCode::RuleExists => "RULE_EXISTS",
            ErrorCode::UnknownRule => "UNKNOWN_RULE",
            ErrorCode::DecisionNotFound => "DECISION_NOT_FOUND",
            ErrorCode::DecisionValidationFailed => "DECISION_VALIDATION_FAILED",
            ErrorCode::DecisionMakingError => "DECISION_MAKING_ERROR",
            ErrorCode::DecisionValidationError => "DECISION_VALIDATION_ERROR",
            ErrorCode::DecisionExecutionError => "DECISION_EXECUTION_ERROR",
            ErrorCode::FeedbackProcessingError => "FEEDBACK_PROCESSING_ERROR",
            ErrorCode::DecisionHistoryError => "DECISION_HISTORY_ERROR",
            ErrorCode::DecisionRetrievalError => "DECISION_RETRIEVAL_ERROR",
            ErrorCode::OfflineBufferFull => "OFFLINE_BUFFER_FULL",
            ErrorCode::AdapterUnavailable => "ADAPTER_UNAVAILABLE",
            ErrorCode::LlmUnavailable => "LLM_UNAVAILABLE",
            ErrorCode::CostCeilingExceeded => "COST_CEILING_EXCEEDED",
            ErrorCode::RepositoryError => "REPOSITORY_ERROR",
            ErrorCode::ApprovalNotFound => "APPROVAL_NOT_FOUND",
            ErrorCode::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error value carried through the decision pipeline and its collaborators.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct FlipsyncError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
}

impl FlipsyncError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: HashMap::new(),
        }
    }

    /// Builder: attach a structured detail value.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

pub type FsResult<T> = Result<T, FlipsyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let err = FlipsyncError::new(ErrorCode::NoOptions, "No options provided for decision making");
        assert_eq!(
            err.to_string(),
            "NO_OPTIONS: No options provided for decision making"
        );
    }

    #[test]
    fn details_round_trip() {
        let err = FlipsyncError::new(ErrorCode::NoValidOptions, "No options meet the constraints")
            .with_detail("constraint", "min_value");
        let json = serde_json::to_value(&err).unwrap();
        let back: FlipsyncError = serde_json::from_value(json).unwrap();
        assert!(back.is_code(ErrorCode::NoValidOptions));
        assert_eq!(back.details["constraint"], "min_value");
    }
}
