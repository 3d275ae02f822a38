//! Alerting system.
//!
//! Alert lifecycle (create, acknowledge, resolve) with duplicate
//! suppression inside a rolling window and time-window correlation.
//! Notifications go through the event publisher; external channels are out
//! of scope.

use crate::config::MonitoringConfig;
use crate::events::{names, payload, EventPublisher};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
            AlertSeverity::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    /// Component that raised the alert.
    pub source: String,
    pub metric_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Counts reported by `get_alert_summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub alerts_by_severity: HashMap<String, usize>,
    pub correlations: usize,
}

/// Alert lifecycle manager with suppression and correlation.
pub struct AlertingSystem {
    config: MonitoringConfig,
    publisher: Arc<dyn EventPublisher>,
    alerts: RwLock<HashMap<String, Alert>>,
    correlation_members: RwLock<HashMap<String, Vec<String>>>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AlertingSystem {
    pub fn new(config: MonitoringConfig, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            config,
            publisher,
            alerts: RwLock::new(HashMap::new()),
            correlation_members: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Create an alert unless an identical one was raised inside the
    /// suppression window. Returns the stored alert, or `None` when
    /// suppressed.
    pub async fn create_alert(
        &self,
        title: &str,
        message: &str,
        severity: AlertSeverity,
        source: &str,
        metric_name: &str,
    ) -> Option<Alert> {
        let now = Utc::now();
        let suppression = ChronoDuration::minutes(self.config.suppression_window_minutes as i64);

        let alert = {
            let mut alerts = self.alerts.write().unwrap();
            let duplicate = alerts.values().any(|existing| {
                existing.title == title
                    && existing.source == source
                    && existing.metric_name == metric_name
                    && now - existing.created_at < suppression
            });
            if duplicate {
                debug!("[Alerting] suppressed duplicate alert '{}'", title);
                return None;
            }

            let correlation_id = self.correlate_locked(&alerts, source, metric_name, now);
            let alert = Alert {
                alert_id: Uuid::new_v4().to_string(),
                title: title.to_string(),
                message: message.to_string(),
                severity,
                status: AlertStatus::Active,
                source: source.to_string(),
                metric_name: metric_name.to_string(),
                correlation_id: correlation_id.clone(),
                created_at: now,
                acknowledged_by: None,
                resolved_at: None,
            };
            alerts.insert(alert.alert_id.clone(), alert.clone());
            if let Some(correlation_id) = correlation_id {
                self.correlation_members
                    .write()
                    .unwrap()
                    .entry(correlation_id)
                    .or_default()
                    .push(alert.alert_id.clone());
            }
            alert
        };

        let data = payload([
            ("alert_id", json!(alert.alert_id)),
            ("title", json!(alert.title)),
            ("severity", json!(alert.severity.as_str())),
            ("source", json!(alert.source)),
            ("timestamp", json!(now.to_rfc3339())),
        ]);
        if let Err(e) = self.publisher.publish_notification(names::ALERT_CREATED, data).await {
            error!("Error publishing alert_created event: {}", e);
        }
        info!("[Alerting] {} alert '{}' created", alert.severity.as_str(), title);
        Some(alert)
    }

    /// Find an open correlation for an alert from the same source or on
    /// the same metric inside the correlation window.
    fn correlate_locked(
        &self,
        alerts: &HashMap<String, Alert>,
        source: &str,
        metric_name: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let window = ChronoDuration::minutes(self.config.correlation_window_minutes as i64);
        let members = self.correlation_members.read().unwrap();

        let related = alerts
            .values()
            .filter(|alert| alert.status == AlertStatus::Active)
            .filter(|alert| now - alert.created_at < window)
            .find(|alert| alert.source == source || alert.metric_name == metric_name)?;

        match &related.correlation_id {
            Some(correlation_id) => {
                let group_size = members.get(correlation_id).map(Vec::len).unwrap_or(0);
                if group_size >= self.config.max_alerts_per_correlation {
                    None
                } else {
                    Some(correlation_id.clone())
                }
            }
            // The related alert starts a new correlation group lazily; the
            // new alert joins it.
            None => Some(format!("corr-{}", Uuid::new_v4())),
        }
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.read().unwrap().get(alert_id).cloned()
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self
            .alerts
            .read()
            .unwrap()
            .values()
            .filter(|alert| alert.status == AlertStatus::Active)
            .cloned()
            .collect();
        active.sort_by(|a, b| b.severity.cmp(&a.severity).then(a.created_at.cmp(&b.created_at)));
        active
    }

    pub fn acknowledge_alert(&self, alert_id: &str, acknowledged_by: &str) -> bool {
        let mut alerts = self.alerts.write().unwrap();
        match alerts.get_mut(alert_id) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_by = Some(acknowledged_by.to_string());
                true
            }
            _ => false,
        }
    }

    pub async fn resolve_alert(&self, alert_id: &str, resolved_by: Option<&str>) -> bool {
        let resolved = {
            let mut alerts = self.alerts.write().unwrap();
            match alerts.get_mut(alert_id) {
                Some(alert) if alert.status != AlertStatus::Resolved => {
                    alert.status = AlertStatus::Resolved;
                    alert.resolved_at = Some(Utc::now());
                    if alert.acknowledged_by.is_none() {
                        alert.acknowledged_by = resolved_by.map(str::to_string);
                    }
                    true
                }
                _ => false,
            }
        };

        if resolved {
            let data = payload([
                ("alert_id", json!(alert_id)),
                ("timestamp", json!(Utc::now().to_rfc3339())),
            ]);
            if let Err(e) = self.publisher.publish_notification(names::ALERT_RESOLVED, data).await {
                error!("Error publishing alert_resolved event: {}", e);
            }
        }
        resolved
    }

    pub fn get_alert_summary(&self) -> AlertSummary {
        let alerts = self.alerts.read().unwrap();
        let mut summary = AlertSummary {
            total_alerts: alerts.len(),
            correlations: self.correlation_members.read().unwrap().len(),
            ..Default::default()
        };
        for alert in alerts.values() {
            if alert.status == AlertStatus::Active {
                summary.active_alerts += 1;
            }
            *summary
                .alerts_by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    /// Start the retention loop purging old resolved alerts. Idempotent.
    pub fn start_alerting_system(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("[Alerting] already running");
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let system = self.clone();
        *self.task.lock().unwrap() = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(3600));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        system.cleanup_old_alerts();
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("[Alerting] loop exited");
        }));
        info!("[Alerting] started");
    }

    pub async fn stop_alerting_system(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("[Alerting] not running");
            return;
        }
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        if let Some(mut task) = self.task.lock().unwrap().take() {
            if tokio::time::timeout(Duration::from_secs(5), &mut task).await.is_err() {
                task.abort();
            }
        }
        info!("[Alerting] stopped");
    }

    /// Drop resolved alerts older than the retention window (7 days).
    fn cleanup_old_alerts(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(7);
        let mut alerts = self.alerts.write().unwrap();
        let before = alerts.len();
        alerts.retain(|_, alert| {
            !(alert.status == AlertStatus::Resolved
                && alert.resolved_at.map(|at| at < cutoff).unwrap_or(false))
        });
        let removed = before - alerts.len();
        if removed > 0 {
            debug!("[Alerting] purged {} resolved alerts", removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingPublisher;

    fn system() -> (Arc<RecordingPublisher>, AlertingSystem) {
        let publisher = Arc::new(RecordingPublisher::new());
        (
            publisher.clone(),
            AlertingSystem::new(MonitoringConfig::default(), publisher),
        )
    }

    #[tokio::test]
    async fn duplicate_alerts_suppressed_within_window() {
        let (publisher, system) = system();
        let first = system
            .create_alert("low stock", "SKU-1 below threshold", AlertSeverity::Warning, "inventory", "stock_level")
            .await;
        assert!(first.is_some());

        let duplicate = system
            .create_alert("low stock", "SKU-1 below threshold", AlertSeverity::Warning, "inventory", "stock_level")
            .await;
        assert!(duplicate.is_none());
        assert_eq!(publisher.events_named(names::ALERT_CREATED).len(), 1);
    }

    #[tokio::test]
    async fn related_alerts_correlate() {
        let (_, system) = system();
        system
            .create_alert("sync slow", "ebay sync slow", AlertSeverity::Warning, "inventory", "sync_time")
            .await
            .unwrap();
        let second = system
            .create_alert("sync failing", "ebay sync failing", AlertSeverity::Critical, "inventory", "sync_errors")
            .await
            .unwrap();
        assert!(second.correlation_id.is_some());
    }

    #[tokio::test]
    async fn lifecycle_and_summary() {
        let (publisher, system) = system();
        let alert = system
            .create_alert("queue full", "fulfillment backlog", AlertSeverity::Critical, "orders", "queue_len")
            .await
            .unwrap();

        assert!(system.acknowledge_alert(&alert.alert_id, "ops"));
        assert!(system.resolve_alert(&alert.alert_id, None).await);
        // Resolving twice is a no-op.
        assert!(!system.resolve_alert(&alert.alert_id, None).await);

        let summary = system.get_alert_summary();
        assert_eq!(summary.total_alerts, 1);
        assert_eq!(summary.active_alerts, 0);
        assert_eq!(summary.alerts_by_severity["critical"], 1);
        assert_eq!(publisher.events_named(names::ALERT_RESOLVED).len(), 1);
    }
}
