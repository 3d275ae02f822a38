//! Runtime aggregate.
//!
//! Owns every component that the original system kept as process-wide
//! singletons (cost tracker, pipeline, managers) and enforces start/stop
//! ordering. Construct once at program start and pass references down.

use crate::approval::{AgentRepository, ApprovalRouter};
use crate::config::FlipsyncConfig;
use crate::decision::DecisionPipeline;
use crate::events::EventPublisher;
use crate::executive::AiExecutiveAgent;
use crate::inventory::UnifiedInventoryManager;
use crate::llm::{CostTracker, LlmProvider};
use crate::marketplace::MarketplaceAdapter;
use crate::monitoring::{AlertingSystem, AnalyticsEngine};
use crate::orders::MultiMarketplaceOrderManager;
use crate::agents::{AiContentAgent, AiLogisticsAgent, AiMarketAgent, AutoInventoryAgent};
use crate::monitoring::AlertSeverity;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Owns all core components and their background loops.
pub struct Runtime {
    config: FlipsyncConfig,
    cost_tracker: Arc<CostTracker>,
    pipeline: Arc<DecisionPipeline>,
    approval_router: Arc<ApprovalRouter>,
    executive: Arc<AiExecutiveAgent>,
    market_agent: Arc<AiMarketAgent>,
    content_agent: Arc<AiContentAgent>,
    logistics_agent: Arc<AiLogisticsAgent>,
    automation_agent: Arc<AutoInventoryAgent>,
    inventory_manager: Arc<UnifiedInventoryManager>,
    order_manager: Arc<MultiMarketplaceOrderManager>,
    analytics: Arc<AnalyticsEngine>,
    alerting: Arc<AlertingSystem>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
    monitor_shutdown: Mutex<Option<watch::Sender<bool>>>,
    started: AtomicBool,
}

impl Runtime {
    pub fn new(
        config: FlipsyncConfig,
        llm: Arc<dyn LlmProvider>,
        adapters: Vec<Arc<dyn MarketplaceAdapter>>,
        repository: Arc<dyn AgentRepository>,
        publisher: Arc<dyn EventPublisher>,
        seller_id: impl Into<String>,
    ) -> Self {
        let cost_tracker = Arc::new(CostTracker::new(config.llm_cost_ceiling));

        let pipeline = Arc::new(DecisionPipeline::with_offline_cap(
            "flipsync_pipeline",
            publisher.clone(),
            config.offline_buffer_cap,
        ));

        let approval_router = Arc::new(
            ApprovalRouter::new(repository, Some(pipeline.clone()))
                .with_policy_overrides(config.approval.clone()),
        );

        let market_agent = Arc::new(AiMarketAgent::new(
            "ai_market_agent",
            llm.clone(),
            cost_tracker.clone(),
        ));
        let content_agent = Arc::new(AiContentAgent::new(
            "content_agent",
            llm.clone(),
            cost_tracker.clone(),
        ));
        let logistics_agent = Arc::new(AiLogisticsAgent::new(
            "logistics_agent",
            llm.clone(),
            cost_tracker.clone(),
            adapters.clone(),
        ));
        let automation_agent = Arc::new(AutoInventoryAgent::new(
            "auto_inventory_agent",
            llm.clone(),
            cost_tracker.clone(),
        ));

        let executive = Arc::new(
            AiExecutiveAgent::new(
                "ai_executive_agent",
                llm,
                cost_tracker.clone(),
                config.strategic_cache_ttl(),
            )
            .with_market_intelligence(market_agent.clone()),
        );
        executive.register_default_agents();

        let inventory_manager = Arc::new(UnifiedInventoryManager::new(
            config.clone(),
            adapters.clone(),
        ));
        let order_manager = Arc::new(MultiMarketplaceOrderManager::new(
            seller_id,
            adapters,
            Duration::from_secs(config.order_sync_interval_secs),
            config.fulfillment_queue_capacity,
            config.shutdown_grace(),
        ));

        let analytics = Arc::new(
            AnalyticsEngine::new(config.monitoring.clone())
                .with_pipeline(pipeline.clone())
                .with_order_manager(order_manager.clone()),
        );
        let alerting = Arc::new(AlertingSystem::new(config.monitoring.clone(), publisher));

        Self {
            config,
            cost_tracker,
            pipeline,
            approval_router,
            executive,
            market_agent,
            content_agent,
            logistics_agent,
            automation_agent,
            inventory_manager,
            order_manager,
            analytics,
            alerting,
            monitor_task: Mutex::new(None),
            monitor_shutdown: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &FlipsyncConfig {
        &self.config
    }

    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost_tracker
    }

    pub fn pipeline(&self) -> &Arc<DecisionPipeline> {
        &self.pipeline
    }

    pub fn approval_router(&self) -> &Arc<ApprovalRouter> {
        &self.approval_router
    }

    pub fn executive(&self) -> &Arc<AiExecutiveAgent> {
        &self.executive
    }

    pub fn market_agent(&self) -> &Arc<AiMarketAgent> {
        &self.market_agent
    }

    pub fn content_agent(&self) -> &Arc<AiContentAgent> {
        &self.content_agent
    }

    pub fn logistics_agent(&self) -> &Arc<AiLogisticsAgent> {
        &self.logistics_agent
    }

    pub fn automation_agent(&self) -> &Arc<AutoInventoryAgent> {
        &self.automation_agent
    }

    pub fn inventory_manager(&self) -> &Arc<UnifiedInventoryManager> {
        &self.inventory_manager
    }

    pub fn order_manager(&self) -> &Arc<MultiMarketplaceOrderManager> {
        &self.order_manager
    }

    pub fn analytics(&self) -> &Arc<AnalyticsEngine> {
        &self.analytics
    }

    pub fn alerting(&self) -> &Arc<AlertingSystem> {
        &self.alerting
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Start every subsystem, dependencies first. Idempotent.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[Runtime] starting subsystems");
        self.inventory_manager.start_inventory_manager();
        self.order_manager.start_order_manager();
        self.analytics.start_analytics_engine();
        self.alerting.start_alerting_system();
        self.start_executive_monitor();
        info!("[Runtime] all subsystems started");
    }

    /// Stop every subsystem in reverse order, awaiting loop exit.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("[Runtime] stopping subsystems");
        self.stop_executive_monitor().await;
        self.alerting.stop_alerting_system().await;
        self.analytics.stop_analytics_engine().await;
        self.order_manager.stop_order_manager().await;
        self.inventory_manager.stop_inventory_manager().await;
        info!("[Runtime] all subsystems stopped");
    }

    /// Periodic executive monitoring pass; degraded system health raises
    /// alerts through the alerting system.
    fn start_executive_monitor(&self) {
        let (tx, mut rx) = watch::channel(false);
        *self.monitor_shutdown.lock().unwrap() = Some(tx);

        let executive = self.executive.clone();
        let alerting = self.alerting.clone();
        let interval = Duration::from_secs(self.config.executive_monitor_interval_secs);
        *self.monitor_task.lock().unwrap() = Some(tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let report = executive.monitor_agent_performance();
                        // Idle agents with no recorded tasks are not degraded.
                        let has_activity =
                            report.agent_performance.values().any(|view| view.total_tasks > 0);
                        if has_activity && report.system_health.overall_health == "poor" {
                            alerting
                                .create_alert(
                                    "agent performance degraded",
                                    &format!(
                                        "average success rate {:.1}% across {} agents",
                                        report.system_health.average_success_rate * 100.0,
                                        report.total_agents
                                    ),
                                    AlertSeverity::Warning,
                                    "executive",
                                    "average_success_rate",
                                )
                                .await;
                        }
                    }
                    _ = rx.changed() => {
                        if *rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    async fn stop_executive_monitor(&self) {
        if let Some(tx) = self.monitor_shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        if let Some(mut task) = self.monitor_task.lock().unwrap().take() {
            if tokio::time::timeout(self.config.shutdown_grace(), &mut task)
                .await
                .is_err()
            {
                warn!("[Runtime] executive monitor did not stop within grace period; aborting");
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::InMemoryAgentRepository;
    use crate::events::RecordingPublisher;
    use crate::llm::StubLlmProvider;
    use crate::marketplace::{Marketplace, StaticMarketplaceAdapter};

    fn runtime() -> Runtime {
        let adapters: Vec<Arc<dyn MarketplaceAdapter>> =
            vec![Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay))];
        Runtime::new(
            FlipsyncConfig::default(),
            Arc::new(StubLlmProvider::new()),
            adapters,
            Arc::new(InMemoryAgentRepository::new()),
            Arc::new(RecordingPublisher::new()),
            "seller-1",
        )
    }

    #[tokio::test]
    async fn start_stop_cycle_is_idempotent() {
        let runtime = runtime();
        runtime.start();
        runtime.start();
        assert!(runtime.is_started());
        assert!(runtime.inventory_manager().is_running());
        assert!(runtime.order_manager().is_running());
        assert!(runtime.analytics().is_running());
        assert!(runtime.alerting().is_running());

        runtime.stop().await;
        runtime.stop().await;
        assert!(!runtime.is_started());
        assert!(!runtime.inventory_manager().is_running());
        assert!(!runtime.order_manager().is_running());

        // A stopped runtime can start cleanly again.
        runtime.start();
        assert!(runtime.order_manager().is_running());
        runtime.stop().await;
    }
}
