//! Runtime configuration.
//!
//! Every tunable knob of the core lives here with a sensible default so the
//! library is usable with `FlipsyncConfig::default()`. A TOML file with any
//! subset of the fields overrides the defaults.

use crate::error::{ErrorCode, FlipsyncError, FsResult};
use crate::marketplace::Marketplace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Per-marketplace synchronization knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketplaceSyncConfig {
    /// Seconds between periodic syncs for this marketplace.
    pub sync_interval_secs: u64,
    /// Maximum items pushed to the adapter per batch.
    pub batch_size: usize,
    /// Adapter requests allowed per minute.
    pub rate_limit: u32,
}

impl Default for MarketplaceSyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 300,
            batch_size: 50,
            rate_limit: 100,
        }
    }
}

/// Approval routing policy for one agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicyConfig {
    /// Confidence at or above which a response may auto-approve.
    pub auto_approve_threshold: f64,
    /// Decision types that always require a human regardless of confidence.
    pub human_required_types: Vec<String>,
    /// Confidence below which the request escalates for review.
    pub escalation_threshold: f64,
}

impl Default for ApprovalPolicyConfig {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.8,
            human_required_types: Vec::new(),
            escalation_threshold: 0.6,
        }
    }
}

/// Analytics and alerting knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Width of the rolling metric window used by the analytics engine.
    pub analytics_window_hours: u64,
    /// How far ahead trend predictions extrapolate.
    pub prediction_horizon_hours: u64,
    /// Seconds between analytics aggregation passes.
    pub analytics_interval_secs: u64,
    /// Alerts closer together than this are candidates for correlation.
    pub correlation_window_minutes: u64,
    /// Upper bound on alerts grouped under one correlation.
    pub max_alerts_per_correlation: usize,
    /// Duplicate alerts inside this window are suppressed.
    pub suppression_window_minutes: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            analytics_window_hours: 24,
            prediction_horizon_hours: 6,
            analytics_interval_secs: 300,
            correlation_window_minutes: 15,
            max_alerts_per_correlation: 10,
            suppression_window_minutes: 5,
        }
    }
}

/// Top-level configuration aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlipsyncConfig {
    /// TTL for cached strategic analyses.
    pub strategic_cache_ttl_minutes: u64,
    /// Per-request LLM cost ceiling in dollars; overruns are logged, not fatal.
    pub llm_cost_ceiling: f64,
    /// Maximum entries in the tracker/feedback offline buffers.
    pub offline_buffer_cap: usize,
    /// Capacity of the bounded fulfillment queue.
    pub fulfillment_queue_capacity: usize,
    /// Seconds between order ingestion passes per marketplace.
    pub order_sync_interval_secs: u64,
    /// Seconds between rebalancing analysis passes.
    pub rebalance_interval_secs: u64,
    /// Grace period granted to background loops on shutdown before abort.
    pub shutdown_grace_secs: u64,
    /// Seconds between executive agent-performance monitoring passes.
    pub executive_monitor_interval_secs: u64,
    /// Sync knobs per marketplace; marketplaces absent here use the default.
    pub marketplaces: HashMap<Marketplace, MarketplaceSyncConfig>,
    /// Approval routing per agent type ("content", "logistics", ...).
    pub approval: HashMap<String, ApprovalPolicyConfig>,
    pub monitoring: MonitoringConfig,
}

impl Default for FlipsyncConfig {
    fn default() -> Self {
        let mut marketplaces = HashMap::new();
        marketplaces.insert(Marketplace::Ebay, MarketplaceSyncConfig::default());
        marketplaces.insert(
            Marketplace::Amazon,
            MarketplaceSyncConfig {
                sync_interval_secs: 600,
                batch_size: 25,
                rate_limit: 60,
            },
        );

        Self {
            strategic_cache_ttl_minutes: 30,
            llm_cost_ceiling: 0.05,
            offline_buffer_cap: 1024,
            fulfillment_queue_capacity: 256,
            order_sync_interval_secs: 300,
            rebalance_interval_secs: 3600,
            shutdown_grace_secs: 5,
            executive_monitor_interval_secs: 300,
            marketplaces,
            approval: HashMap::new(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl FlipsyncConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_toml_file(path: impl AsRef<Path>) -> FsResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            FlipsyncError::new(ErrorCode::InvalidRequest, format!("cannot read config: {}", e))
                .with_detail("path", path.as_ref().display().to_string())
        })?;
        toml::from_str(&raw).map_err(|e| {
            FlipsyncError::new(ErrorCode::InvalidRequest, format!("invalid config: {}", e))
        })
    }

    pub fn sync_config(&self, marketplace: Marketplace) -> MarketplaceSyncConfig {
        self.marketplaces
            .get(&marketplace)
            .cloned()
            .unwrap_or_default()
    }

    pub fn strategic_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.strategic_cache_ttl_minutes * 60)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
