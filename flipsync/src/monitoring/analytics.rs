//! Analytics engine.
//!
//! Collects named metric series, detects trends over a rolling window, and
//! extrapolates simple predictions over the configured horizon. A
//! background loop samples the decision pipeline and order manager.

use crate::config::MonitoringConfig;
use crate::decision::DecisionPipeline;
use crate::orders::MultiMarketplaceOrderManager;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    Volatile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One derived insight over a metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsInsight {
    pub insight_id: String,
    pub metric_name: String,
    pub trend: TrendDirection,
    pub current_value: f64,
    /// Value extrapolated to the prediction horizon.
    pub predicted_value: f64,
    pub confidence: f64,
    pub description: String,
    pub generated_at: DateTime<Utc>,
}

/// Windowed metric analytics with trend prediction.
pub struct AnalyticsEngine {
    config: MonitoringConfig,
    pipeline: Option<Arc<DecisionPipeline>>,
    order_manager: Option<Arc<MultiMarketplaceOrderManager>>,
    series: RwLock<HashMap<String, Vec<MetricPoint>>>,
    insights: RwLock<Vec<AnalyticsInsight>>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AnalyticsEngine {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            pipeline: None,
            order_manager: None,
            series: RwLock::new(HashMap::new()),
            insights: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Arc<DecisionPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_order_manager(mut self, order_manager: Arc<MultiMarketplaceOrderManager>) -> Self {
        self.order_manager = Some(order_manager);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Record one sample of a named metric.
    pub fn record_metric(&self, name: &str, value: f64) {
        let mut series = self.series.write().unwrap();
        let points = series.entry(name.to_string()).or_default();
        points.push(MetricPoint {
            timestamp: Utc::now(),
            value,
        });

        // Bound memory to the analytics window (plus slack for analysis).
        let cutoff = Utc::now() - ChronoDuration::hours(self.config.analytics_window_hours as i64 * 2);
        points.retain(|point| point.timestamp >= cutoff);
    }

    pub fn series_snapshot(&self, name: &str) -> Vec<MetricPoint> {
        self.series.read().unwrap().get(name).cloned().unwrap_or_default()
    }

    pub fn latest_insights(&self) -> Vec<AnalyticsInsight> {
        self.insights.read().unwrap().clone()
    }

    /// Analyze every series inside the rolling window and refresh insights.
    pub fn analyze(&self) -> Vec<AnalyticsInsight> {
        let window_start =
            Utc::now() - ChronoDuration::hours(self.config.analytics_window_hours as i64);
        let series = self.series.read().unwrap();

        let insights: Vec<AnalyticsInsight> = series
            .iter()
            .sorted_by_key(|(name, _)| name.to_string())
            .filter_map(|(name, points)| {
                let windowed: Vec<&MetricPoint> = points
                    .iter()
                    .filter(|point| point.timestamp >= window_start)
                    .collect();
                analyze_series(name, &windowed, self.config.prediction_horizon_hours)
            })
            .collect();

        *self.insights.write().unwrap() = insights.clone();
        debug!("[Analytics] produced {} insights", insights.len());
        insights
    }

    /// Start the periodic aggregation loop. Idempotent.
    pub fn start_analytics_engine(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("[Analytics] already running");
            return;
        }
        let (tx, mut rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let engine = self.clone();
        let interval = Duration::from_secs(self.config.analytics_interval_secs);
        *self.task.lock().unwrap() = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        engine.sample_sources();
                        engine.analyze();
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("[Analytics] loop exited");
        }));
        info!("[Analytics] started");
    }

    pub async fn stop_analytics_engine(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("[Analytics] not running");
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
        info!("[Analytics] stopped");
    }

    /// Pull one sample from each attached source.
    fn sample_sources(&self) {
        if let Some(pipeline) = &self.pipeline {
            let metrics = pipeline.tracker().get_decision_metrics(None);
            self.record_metric("decisions_total", metrics.total_decisions as f64);
            self.record_metric("decision_confidence_avg", metrics.average_confidence);
        }
        if let Some(order_manager) = &self.order_manager {
            let analytics = order_manager.get_order_analytics();
            self.record_metric("orders_total", analytics.total_orders as f64);
            self.record_metric("order_revenue", analytics.total_revenue);
        }
    }
}

/// Trend analysis over one windowed series: least-squares slope plus a
/// volatility check against the mean.
fn analyze_series(
    name: &str,
    points: &[&MetricPoint],
    horizon_hours: u64,
) -> Option<AnalyticsInsight> {
    if points.len() < 3 {
        return None;
    }

    let base = points[0].timestamp;
    let xs: Vec<f64> = points
        .iter()
        .map(|point| (point.timestamp - base).num_seconds() as f64 / 3600.0)
        .collect();
    let ys: Vec<f64> = points.iter().map(|point| point.value).collect();
    let n = xs.len() as f64;

    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let covariance: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    let variance_x: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let slope = if variance_x.abs() < 1e-12 {
        0.0
    } else {
        covariance / variance_x
    };

    let std_dev =
        (ys.iter().map(|y| (y - mean_y).powi(2)).sum::<f64>() / n).sqrt();
    let relative_volatility = if mean_y.abs() > 1e-9 {
        std_dev / mean_y.abs()
    } else {
        0.0
    };
    let relative_slope = if mean_y.abs() > 1e-9 {
        slope / mean_y.abs()
    } else {
        slope
    };

    let trend = if relative_volatility > 0.5 {
        TrendDirection::Volatile
    } else if relative_slope > 0.01 {
        TrendDirection::Increasing
    } else if relative_slope < -0.01 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let current = *ys.last().expect("series is non-empty");
    let predicted = current + slope * horizon_hours as f64;
    // More samples and less noise mean a tighter prediction.
    let confidence = ((n / 20.0).min(1.0) * (1.0 - relative_volatility.min(0.9))).clamp(0.1, 0.95);

    Some(AnalyticsInsight {
        insight_id: Uuid::new_v4().to_string(),
        metric_name: name.to_string(),
        trend,
        current_value: current,
        predicted_value: predicted,
        confidence,
        description: format!(
            "{} is {:?} (current {:.2}, predicted {:.2} in {}h)",
            name, trend, current, predicted, horizon_hours
        ),
        generated_at: Utc::now(),
    })
}
