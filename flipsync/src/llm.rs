//! LLM gateway abstraction.
//!
//! Agents consume a single async `generate` contract; concrete provider SDKs
//! live outside the core. The [`CostTracker`] records per-call spend and
//! enforces the per-request ceiling policy (overruns are returned anyway and
//! only logged).

use crate::error::{ErrorCode, FlipsyncError, FsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub prompt: String,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            model_hint: None,
        }
    }

    pub fn with_model_hint(mut self, hint: impl Into<String>) -> Self {
        self.model_hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub tokens_used: u32,
    pub latency_seconds: f64,
    pub cost_estimate: f64,
}

/// Provider contract consumed by every agent.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> FsResult<LlmResponse>;

    /// Short provider identifier for logs and cost records.
    fn name(&self) -> &str;
}

/// Cost categories tracked for LLM usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    TextGeneration,
    Classification,
    Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub category: CostCategory,
    pub cost: f64,
    pub tokens_used: u32,
    pub model: String,
    pub operation: String,
    pub over_ceiling: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Accumulates LLM spend. Owned by the runtime and passed explicitly to the
/// components that make provider calls.
pub struct CostTracker {
    ceiling_per_request: f64,
    records: Mutex<Vec<CostRecord>>,
}

impl CostTracker {
    pub fn new(ceiling_per_request: f64) -> Self {
        Self {
            ceiling_per_request,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Record one provider call. A cost over the per-request ceiling is
    /// flagged and logged but never rejected.
    pub fn record(
        &self,
        category: CostCategory,
        cost: f64,
        tokens_used: u32,
        model: impl Into<String>,
        operation: impl Into<String>,
    ) -> CostRecord {
        let operation = operation.into();
        let over_ceiling = cost > self.ceiling_per_request;
        if over_ceiling {
            warn!(
                "LLM cost ${:.4} for '{}' exceeds per-request ceiling ${:.4}",
                cost, operation, self.ceiling_per_request
            );
        }
        let record = CostRecord {
            category,
            cost,
            tokens_used,
            model: model.into(),
            operation,
            over_ceiling,
            recorded_at: Utc::now(),
        };
        self.records.lock().unwrap().push(record.clone());
        record
    }

    pub fn total_cost(&self) -> f64 {
        self.records.lock().unwrap().iter().map(|r| r.cost).sum()
    }

    pub fn records(&self) -> Vec<CostRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn cost_by_category(&self) -> HashMap<CostCategory, f64> {
        let mut totals = HashMap::new();
        for record in self.records.lock().unwrap().iter() {
            *totals.entry(record.category).or_insert(0.0) += record.cost;
        }
        totals
    }
}

/// Deterministic provider for tests and the demo binary.
///
/// Responses are served from a queue of canned contents; when the queue is
/// empty a generic echo response is produced. `set_unavailable` makes every
/// subsequent call fail with `LLM_UNAVAILABLE` to exercise fallback paths.
pub struct StubLlmProvider {
    model: String,
    canned: Mutex<Vec<String>>,
    unavailable: Mutex<bool>,
    calls: Mutex<u64>,
}

impl StubLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "stub-model".to_string(),
            canned: Mutex::new(Vec::new()),
            unavailable: Mutex::new(false),
            calls: Mutex::new(0),
        }
    }

    /// Queue a canned response, served FIFO.
    pub fn push_response(&self, content: impl Into<String>) {
        self.canned.lock().unwrap().push(content.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    /// Number of `generate` calls observed, including failed ones.
    pub fn call_count(&self) -> u64 {
        *self.calls.lock().unwrap()
    }
}

impl Default for StubLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for StubLlmProvider {
    async fn generate(&self, request: LlmRequest) -> FsResult<LlmResponse> {
        *self.calls.lock().unwrap() += 1;
        if *self.unavailable.lock().unwrap() {
            return Err(FlipsyncError::new(
                ErrorCode::LlmUnavailable,
                "stub provider marked unavailable",
            ));
        }
        let started = Instant::now();
        let content = {
            let mut canned = self.canned.lock().unwrap();
            if canned.is_empty() {
                format!("stub response for: {}", request.prompt)
            } else {
                canned.remove(0)
            }
        };
        let tokens_used =
            (request.prompt.split_whitespace().count() + content.split_whitespace().count()) as u32;
        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            tokens_used,
            latency_seconds: started.elapsed().as_secs_f64(),
            cost_estimate: f64::from(tokens_used) * 1e-6,
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_serves_canned_then_echo() {
        let provider = StubLlmProvider::new();
        provider.push_response("{\"confidence\": 0.9}");

        let first = provider
            .generate(LlmRequest::new("analyze", "system"))
            .await
            .unwrap();
        assert_eq!(first.content, "{\"confidence\": 0.9}");

        let second = provider
            .generate(LlmRequest::new("analyze", "system"))
            .await
            .unwrap();
        assert!(second.content.contains("analyze"));
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn cost_tracker_flags_ceiling_overrun() {
        let tracker = CostTracker::new(0.05);
        let under = tracker.record(CostCategory::TextGeneration, 0.03, 500, "m", "strategic_analysis");
        let over = tracker.record(CostCategory::TextGeneration, 0.09, 2000, "m", "strategic_analysis");
        assert!(!under.over_ceiling);
        assert!(over.over_ceiling);
        assert!((tracker.total_cost() - 0.12).abs() < 1e-9);
    }
}
