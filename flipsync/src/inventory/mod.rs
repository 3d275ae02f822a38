//! Unified inventory manager.
//!
//! Tracks per-marketplace inventory entries, runs single-flight sync loops
//! per marketplace, and produces rebalance recommendations on an hourly
//! analysis loop.

pub mod rebalance;

pub use rebalance::{RebalanceRecommendation, RebalanceStrategy};

use crate::config::FlipsyncConfig;
use crate::marketplace::{InventoryUpdate, Marketplace, MarketplaceAdapter};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Synchronization state of one inventory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Partial,
}

/// Marketplace-specific inventory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceInventoryEntry {
    pub marketplace: Marketplace,
    pub sku: String,
    pub quantity: i64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_id: Option<String>,
    pub status: String,
    pub last_updated: DateTime<Utc>,
    pub sync_status: SyncStatus,
    /// Per-marketplace performance signals, e.g. `sales_velocity`.
    #[serde(default)]
    pub performance_metrics: HashMap<String, f64>,
}

impl MarketplaceInventoryEntry {
    pub fn new(marketplace: Marketplace, sku: impl Into<String>, quantity: i64, price: f64) -> Self {
        Self {
            marketplace,
            sku: sku.into(),
            quantity,
            price,
            listing_id: None,
            status: "active".to_string(),
            last_updated: Utc::now(),
            sync_status: SyncStatus::Pending,
            performance_metrics: HashMap::new(),
        }
    }

    pub fn with_performance(mut self, key: impl Into<String>, value: f64) -> Self {
        self.performance_metrics.insert(key.into(), value);
        self
    }
}

/// Per-marketplace outcome inside a sync result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceSyncOutcome {
    pub success: bool,
    pub items_synced: usize,
    pub items_failed: usize,
    pub errors: Vec<String>,
}

/// Result of one cross-marketplace synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySyncResult {
    pub sync_id: String,
    pub timestamp: DateTime<Utc>,
    pub total_items: usize,
    pub successful_syncs: usize,
    pub failed_syncs: usize,
    /// Keyed by marketplace name, in canonical sync order.
    pub marketplace_results: IndexMap<String, MarketplaceSyncOutcome>,
    pub errors: Vec<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryPerformanceMetrics {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub average_sync_time: f64,
    pub items_synchronized: u64,
}

/// Cross-marketplace inventory manager.
pub struct UnifiedInventoryManager {
    config: FlipsyncConfig,
    adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>>,
    inventories: RwLock<HashMap<Marketplace, HashMap<String, MarketplaceInventoryEntry>>>,
    sync_history: RwLock<Vec<InventorySyncResult>>,
    recommendations: RwLock<HashMap<String, RebalanceRecommendation>>,
    performance: RwLock<InventoryPerformanceMetrics>,
    /// Per-marketplace single-flight guards.
    sync_guards: HashMap<Marketplace, tokio::sync::Mutex<()>>,
    /// Rebalancing analysis is single-flight globally.
    rebalance_guard: tokio::sync::Mutex<()>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl UnifiedInventoryManager {
    pub fn new(config: FlipsyncConfig, adapters: Vec<Arc<dyn MarketplaceAdapter>>) -> Self {
        let adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = adapters
            .into_iter()
            .map(|adapter| (adapter.marketplace(), adapter))
            .collect();
        let sync_guards = adapters
            .keys()
            .map(|marketplace| (*marketplace, tokio::sync::Mutex::new(())))
            .collect();
        Self {
            config,
            adapters,
            inventories: RwLock::new(HashMap::new()),
            sync_history: RwLock::new(Vec::new()),
            recommendations: RwLock::new(HashMap::new()),
            performance: RwLock::new(InventoryPerformanceMetrics::default()),
            sync_guards,
            rebalance_guard: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Upsert a marketplace inventory entry.
    pub fn set_inventory(&self, entry: MarketplaceInventoryEntry) {
        self.inventories
            .write()
            .unwrap()
            .entry(entry.marketplace)
            .or_default()
            .insert(entry.sku.clone(), entry);
    }

    pub fn get_inventory(&self, marketplace: Marketplace, sku: &str) -> Option<MarketplaceInventoryEntry> {
        self.inventories
            .read()
            .unwrap()
            .get(&marketplace)
            .and_then(|entries| entries.get(sku))
            .cloned()
    }

    /// Current distribution of a SKU across marketplaces.
    pub fn inventory_distribution(&self, sku: &str) -> BTreeMap<Marketplace, i64> {
        let inventories = self.inventories.read().unwrap();
        inventories
            .iter()
            .filter_map(|(marketplace, entries)| {
                entries.get(sku).map(|entry| (*marketplace, entry.quantity))
            })
            .collect()
    }

    pub fn sync_history(&self) -> Vec<InventorySyncResult> {
        self.sync_history.read().unwrap().clone()
    }

    pub fn performance_metrics(&self) -> InventoryPerformanceMetrics {
        self.performance.read().unwrap().clone()
    }

    pub fn pending_recommendation(&self, sku: &str) -> Option<RebalanceRecommendation> {
        self.recommendations.read().unwrap().get(sku).cloned()
    }

    /// Start per-marketplace sync loops plus the rebalancing loop. Idempotent.
    pub fn start_inventory_manager(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("[InventoryManager] already running");
            return;
        }
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let mut tasks = self.tasks.lock().unwrap();
        for marketplace in self.adapters.keys().copied() {
            tasks.push(tokio::spawn(
                self.clone().marketplace_sync_loop(marketplace, rx.clone()),
            ));
        }
        tasks.push(tokio::spawn(self.clone().rebalancing_loop(rx)));
        info!("[InventoryManager] started");
    }

    /// Stop all loops, aborting after the configured grace period.
    pub async fn stop_inventory_manager(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("[InventoryManager] not running");
            return;
        }
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for mut task in tasks {
            if tokio::time::timeout(self.config.shutdown_grace(), &mut task)
                .await
                .is_err()
            {
                warn!("[InventoryManager] loop did not stop within grace period; aborting");
                task.abort();
            }
        }
        info!("[InventoryManager] stopped");
    }

    async fn marketplace_sync_loop(self: Arc<Self>, marketplace: Marketplace, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.sync_config(marketplace).sync_interval_secs);
        info!("[InventoryManager] {} sync loop running ({:?})", marketplace, interval);
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let result = self
                        .sync_inventory_across_marketplaces(None, Some(vec![marketplace]), false)
                        .await;
                    if !result.errors.is_empty() {
                        error!("[InventoryManager] {} sync errors: {:?}", marketplace, result.errors);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[InventoryManager] {} sync loop exited", marketplace);
    }

    async fn rebalancing_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.rebalance_interval_secs);
        info!("[InventoryManager] rebalancing loop running ({:?})", interval);
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for sku in self.all_skus() {
                        self.rebalance_inventory(&sku, RebalanceStrategy::PerformanceBased, None).await;
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[InventoryManager] rebalancing loop exited");
    }

    fn all_skus(&self) -> Vec<String> {
        let inventories = self.inventories.read().unwrap();
        let mut skus: HashSet<String> = HashSet::new();
        for entries in inventories.values() {
            skus.extend(entries.keys().cloned());
        }
        let mut skus: Vec<String> = skus.into_iter().collect();
        skus.sort();
        skus
    }

    /// Push local inventory state to the given marketplaces (all configured
    /// ones by default), optionally restricted to one SKU.
    pub async fn sync_inventory_across_marketplaces(
        &self,
        sku: Option<&str>,
        marketplaces: Option<Vec<Marketplace>>,
        force: bool,
    ) -> InventorySyncResult {
        let started = Instant::now();
        let mut targets: Vec<Marketplace> =
            marketplaces.unwrap_or_else(|| self.adapters.keys().copied().collect());
        targets.sort();

        let mut result = InventorySyncResult {
            sync_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            total_items: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            marketplace_results: IndexMap::new(),
            errors: Vec::new(),
            duration_seconds: 0.0,
        };

        for marketplace in targets {
            let outcome = self.sync_one_marketplace(marketplace, sku, force).await;
            result.total_items += outcome.items_synced + outcome.items_failed;
            result.successful_syncs += outcome.items_synced;
            result.failed_syncs += outcome.items_failed;
            result.errors.extend(outcome.errors.iter().cloned());
            result
                .marketplace_results
                .insert(marketplace.as_str().to_string(), outcome);
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        self.record_sync_result(&result);
        info!(
            "[InventoryManager] sync {} complete: {}/{} items",
            result.sync_id, result.successful_syncs, result.total_items
        );
        result
    }

    async fn sync_one_marketplace(
        &self,
        marketplace: Marketplace,
        sku: Option<&str>,
        force: bool,
    ) -> MarketplaceSyncOutcome {
        let Some(adapter) = self.adapters.get(&marketplace) else {
            return MarketplaceSyncOutcome {
                success: false,
                items_synced: 0,
                items_failed: 0,
                errors: vec![format!("no adapter for {}", marketplace)],
            };
        };
        // Single-flight: loop ticks and manual calls never overlap.
        let _flight = match self.sync_guards.get(&marketplace) {
            Some(guard) => guard.lock().await,
            None => {
                return MarketplaceSyncOutcome {
                    success: false,
                    items_synced: 0,
                    items_failed: 0,
                    errors: vec![format!("no sync guard for {}", marketplace)],
                }
            }
        };

        let sync_config = self.config.sync_config(marketplace);
        let recency = chrono::Duration::seconds(sync_config.sync_interval_secs as i64);

        let batch: Vec<InventoryUpdate> = {
            let mut inventories = self.inventories.write().unwrap();
            let entries = inventories.entry(marketplace).or_default();
            entries
                .values_mut()
                .filter(|entry| sku.map(|s| entry.sku == s).unwrap_or(true))
                .filter(|entry| {
                    force
                        || entry.sync_status != SyncStatus::Completed
                        || Utc::now() - entry.last_updated > recency
                })
                .map(|entry| {
                    entry.sync_status = SyncStatus::InProgress;
                    InventoryUpdate {
                        sku: entry.sku.clone(),
                        quantity: entry.quantity,
                        price: entry.price,
                        listing_ref: entry.listing_id.clone(),
                    }
                })
                .collect()
        };

        if batch.is_empty() {
            return MarketplaceSyncOutcome {
                success: true,
                items_synced: 0,
                items_failed: 0,
                errors: Vec::new(),
            };
        }

        let mut items_synced = 0;
        let mut items_failed = 0;
        let mut errors = Vec::new();

        for chunk in batch.chunks(sync_config.batch_size.max(1)) {
            match adapter.sync_inventory_batch(chunk).await {
                Ok(outcomes) => {
                    let mut inventories = self.inventories.write().unwrap();
                    let entries = inventories.entry(marketplace).or_default();
                    for outcome in outcomes {
                        if let Some(entry) = entries.get_mut(&outcome.sku) {
                            entry.last_updated = Utc::now();
                            if outcome.success {
                                entry.sync_status = SyncStatus::Completed;
                                if entry.listing_id.is_none() {
                                    entry.listing_id = outcome.listing_ref.clone();
                                }
                                items_synced += 1;
                            } else {
                                entry.sync_status = SyncStatus::Failed;
                                items_failed += 1;
                                if let Some(error) = outcome.error {
                                    errors.push(format!("{}/{}: {}", marketplace, outcome.sku, error));
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    let mut inventories = self.inventories.write().unwrap();
                    let entries = inventories.entry(marketplace).or_default();
                    for update in chunk {
                        if let Some(entry) = entries.get_mut(&update.sku) {
                            entry.sync_status = SyncStatus::Failed;
                        }
                    }
                    items_failed += chunk.len();
                    errors.push(format!("{}: {}", marketplace, e));
                }
            }
        }

        MarketplaceSyncOutcome {
            success: items_failed == 0,
            items_synced,
            items_failed,
            errors,
        }
    }

    fn record_sync_result(&self, result: &InventorySyncResult) {
        self.sync_history.write().unwrap().push(result.clone());
        let mut performance = self.performance.write().unwrap();
        performance.total_syncs += 1;
        performance.successful_syncs += result.successful_syncs as u64;
        performance.failed_syncs += result.failed_syncs as u64;
        performance.items_synchronized += result.total_items as u64;
        let total = performance.total_syncs as f64;
        performance.average_sync_time =
            (performance.average_sync_time * (total - 1.0) + result.duration_seconds) / total;
    }

    /// Generate (and store) a rebalance recommendation for one SKU.
    ///
    /// Analysis is single-flight globally; the loop and manual callers
    /// serialize here.
    pub async fn rebalance_inventory(
        &self,
        sku: &str,
        strategy: RebalanceStrategy,
        signals: Option<&BTreeMap<Marketplace, f64>>,
    ) -> RebalanceRecommendation {
        let _flight = self.rebalance_guard.lock().await;

        let current = self.inventory_distribution(sku);
        let performance_weights: BTreeMap<Marketplace, f64> = {
            let inventories = self.inventories.read().unwrap();
            current
                .keys()
                .map(|marketplace| {
                    let velocity = inventories
                        .get(marketplace)
                        .and_then(|entries| entries.get(sku))
                        .and_then(|entry| entry.performance_metrics.get("sales_velocity"))
                        .copied()
                        .unwrap_or(1.0);
                    (*marketplace, velocity)
                })
                .collect()
        };

        let recommendation =
            rebalance::generate_recommendation(sku, &current, strategy, &performance_weights, signals);
        self.recommendations
            .write()
            .unwrap()
            .insert(sku.to_string(), recommendation.clone());
        debug!("[InventoryManager] rebalance recommendation stored for {}", sku);
        recommendation
    }

    /// Apply a stored recommendation by pushing per-marketplace quantity
    /// updates. Partial success is permitted; the recommendation is cleared
    /// only when every marketplace update succeeds.
    pub async fn apply_rebalance_recommendation(
        &self,
        sku: &str,
    ) -> IndexMap<String, MarketplaceSyncOutcome> {
        let Some(recommendation) = self.pending_recommendation(sku) else {
            warn!("[InventoryManager] no rebalance recommendation for {}", sku);
            return IndexMap::new();
        };

        let mut results = IndexMap::new();
        let mut all_succeeded = true;
        for (marketplace, quantity) in &recommendation.recommended_distribution {
            // Stage the new quantity locally, then push just this SKU.
            {
                let mut inventories = self.inventories.write().unwrap();
                if let Some(entry) = inventories
                    .entry(*marketplace)
                    .or_default()
                    .get_mut(sku)
                {
                    entry.quantity = *quantity;
                    entry.sync_status = SyncStatus::Pending;
                    entry.last_updated = Utc::now();
                }
            }
            let outcome = self.sync_one_marketplace(*marketplace, Some(sku), true).await;
            if !outcome.success {
                all_succeeded = false;
            }
            results.insert(marketplace.as_str().to_string(), outcome);
        }

        if all_succeeded {
            self.recommendations.write().unwrap().remove(sku);
            info!("[InventoryManager] rebalance applied for {}", sku);
        } else {
            warn!("[InventoryManager] rebalance for {} only partially applied", sku);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::StaticMarketplaceAdapter;

    fn manager() -> (Arc<StaticMarketplaceAdapter>, Arc<StaticMarketplaceAdapter>, UnifiedInventoryManager) {
        let ebay = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        let amazon = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Amazon));
        let adapters: Vec<Arc<dyn MarketplaceAdapter>> = vec![ebay.clone(), amazon.clone()];
        let manager = UnifiedInventoryManager::new(FlipsyncConfig::default(), adapters);
        (ebay, amazon, manager)
    }

    #[tokio::test]
    async fn sync_pushes_entries_and_marks_completed() {
        let (ebay, _, manager) = manager();
        manager.set_inventory(MarketplaceInventoryEntry::new(Marketplace::Ebay, "SKU-1", 5, 19.99));

        let result = manager
            .sync_inventory_across_marketplaces(None, Some(vec![Marketplace::Ebay]), false)
            .await;
        assert_eq!(result.successful_syncs, 1);
        assert_eq!(result.failed_syncs, 0);
        assert!(ebay.synced_updates().contains_key("SKU-1"));

        let entry = manager.get_inventory(Marketplace::Ebay, "SKU-1").unwrap();
        assert_eq!(entry.sync_status, SyncStatus::Completed);
        assert!(entry.listing_id.is_some());
        assert_eq!(manager.performance_metrics().total_syncs, 1);
    }

    #[tokio::test]
    async fn adapter_failure_marks_entries_failed() {
        let (ebay, _, manager) = manager();
        manager.set_inventory(MarketplaceInventoryEntry::new(Marketplace::Ebay, "SKU-1", 5, 19.99));
        ebay.fail_next();

        let result = manager
            .sync_inventory_across_marketplaces(None, Some(vec![Marketplace::Ebay]), false)
            .await;
        assert_eq!(result.failed_syncs, 1);
        assert_eq!(
            manager.get_inventory(Marketplace::Ebay, "SKU-1").unwrap().sync_status,
            SyncStatus::Failed
        );
    }

    #[tokio::test]
    async fn completed_entries_skip_unforced_resync() {
        let (_, _, manager) = manager();
        manager.set_inventory(MarketplaceInventoryEntry::new(Marketplace::Ebay, "SKU-1", 5, 19.99));
        manager
            .sync_inventory_across_marketplaces(None, Some(vec![Marketplace::Ebay]), false)
            .await;

        let second = manager
            .sync_inventory_across_marketplaces(None, Some(vec![Marketplace::Ebay]), false)
            .await;
        assert_eq!(second.total_items, 0);

        let forced = manager
            .sync_inventory_across_marketplaces(None, Some(vec![Marketplace::Ebay]), true)
            .await;
        assert_eq!(forced.successful_syncs, 1);
    }

    #[tokio::test]
    async fn apply_rebalance_clears_only_on_full_success() {
        let (_, amazon, manager) = manager();
        manager.set_inventory(MarketplaceInventoryEntry::new(Marketplace::Ebay, "SKU-1", 30, 19.99));
        manager.set_inventory(MarketplaceInventoryEntry::new(Marketplace::Amazon, "SKU-1", 70, 19.99));

        manager
            .rebalance_inventory("SKU-1", RebalanceStrategy::EqualDistribution, None)
            .await;

        // First attempt: amazon push fails, recommendation survives.
        amazon.fail_next();
        let results = manager.apply_rebalance_recommendation("SKU-1").await;
        assert!(results["ebay"].success);
        assert!(!results["amazon"].success);
        assert!(manager.pending_recommendation("SKU-1").is_some());

        // Second attempt succeeds end to end and clears the recommendation.
        let results = manager.apply_rebalance_recommendation("SKU-1").await;
        assert!(results.values().all(|outcome| outcome.success));
        assert!(manager.pending_recommendation("SKU-1").is_none());

        let distribution = manager.inventory_distribution("SKU-1");
        assert_eq!(distribution.values().sum::<i64>(), 100);
        assert_eq!(distribution[&Marketplace::Ebay], 50);
    }
}
