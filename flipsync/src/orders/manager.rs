//! Multi-marketplace order manager.
//!
//! Periodically ingests orders from every configured marketplace adapter,
//! unifies them, and drives automated fulfillment from a bounded priority
//! queue. Manual fulfillment and returns enforce the order state machine.

use super::queue::FulfillmentQueue;
use super::{
    FulfillmentMethod, FulfillmentResult, OrderAnalytics, OrderItem, OrderPriority, OrderStatus,
    ReturnResult, ShippingInfo, UnifiedOrder,
};
use crate::marketplace::{Marketplace, MarketplaceAdapter, RawMarketplaceOrder};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of one marketplace ingestion pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSyncResult {
    pub marketplace: Marketplace,
    pub new_orders: usize,
    pub updated_orders: usize,
    pub total_processed: usize,
    pub errors: Vec<String>,
    pub sync_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderManagerMetrics {
    pub total_orders: u64,
    pub fulfilled_orders: u64,
    pub failed_fulfillments: u64,
    pub returns_processed: u64,
}

/// Unified order manager across all marketplace adapters.
pub struct MultiMarketplaceOrderManager {
    seller_id: String,
    adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>>,
    sync_interval: Duration,
    orders: RwLock<HashMap<String, UnifiedOrder>>,
    /// (marketplace, marketplace_order_id) -> unified order id.
    order_index: RwLock<HashMap<(Marketplace, String), String>>,
    cursors: Mutex<HashMap<Marketplace, Option<String>>>,
    queue: FulfillmentQueue,
    metrics: RwLock<OrderManagerMetrics>,
    /// Per-order serialization of fulfillment attempts.
    fulfillment_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Per-marketplace single-flight guards for ingestion.
    sync_guards: HashMap<Marketplace, tokio::sync::Mutex<()>>,
    running: AtomicBool,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl MultiMarketplaceOrderManager {
    pub fn new(
        seller_id: impl Into<String>,
        adapters: Vec<Arc<dyn MarketplaceAdapter>>,
        sync_interval: Duration,
        queue_capacity: usize,
        shutdown_grace: Duration,
    ) -> Self {
        let adapters: HashMap<Marketplace, Arc<dyn MarketplaceAdapter>> = adapters
            .into_iter()
            .map(|adapter| (adapter.marketplace(), adapter))
            .collect();
        let sync_guards = adapters
            .keys()
            .map(|marketplace| (*marketplace, tokio::sync::Mutex::new(())))
            .collect();
        Self {
            seller_id: seller_id.into(),
            adapters,
            sync_interval,
            orders: RwLock::new(HashMap::new()),
            order_index: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            queue: FulfillmentQueue::new(queue_capacity),
            metrics: RwLock::new(OrderManagerMetrics::default()),
            fulfillment_locks: DashMap::new(),
            sync_guards,
            running: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            shutdown_grace,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn metrics(&self) -> OrderManagerMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn get_order(&self, order_id: &str) -> Option<UnifiedOrder> {
        self.orders.read().unwrap().get(order_id).cloned()
    }

    /// Snapshot of all orders, optionally restricted to one status.
    pub fn list_orders(&self, status: Option<OrderStatus>) -> Vec<UnifiedOrder> {
        self.orders
            .read()
            .unwrap()
            .values()
            .filter(|order| status.map(|s| order.status == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Start the ingestion and fulfillment loops. Idempotent.
    pub fn start_order_manager(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("[OrderManager] already running");
            return;
        }
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock().unwrap() = Some(tx);

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(tokio::spawn(self.clone().order_sync_loop(rx.clone())));
        tasks.push(tokio::spawn(self.clone().fulfillment_loop(rx)));
        info!("[OrderManager] started");
    }

    /// Stop the loops, waiting up to the grace period before aborting.
    pub async fn stop_order_manager(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("[OrderManager] not running");
            return;
        }
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for mut task in tasks {
            if tokio::time::timeout(self.shutdown_grace, &mut task).await.is_err() {
                warn!("[OrderManager] loop did not stop within grace period; aborting");
                task.abort();
            }
        }
        info!("[OrderManager] stopped");
    }

    async fn order_sync_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("[OrderManager] order sync loop running");
        let mut tick = tokio::time::interval(self.sync_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    for marketplace in self.adapters.keys().copied().collect::<Vec<_>>() {
                        let result = self.sync_marketplace_orders(marketplace).await;
                        if !result.errors.is_empty() {
                            error!(
                                "[OrderManager] {} sync errors: {:?}",
                                marketplace, result.errors
                            );
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[OrderManager] order sync loop exited");
    }

    async fn fulfillment_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("[OrderManager] fulfillment loop running");
        loop {
            tokio::select! {
                order_id = self.queue.pop() => {
                    self.process_automated_fulfillment(&order_id).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[OrderManager] fulfillment loop exited");
    }

    /// Ingest new/updated orders from one marketplace. Single-flight per
    /// marketplace: a manual sync never overlaps the loop's pass.
    pub async fn sync_marketplace_orders(&self, marketplace: Marketplace) -> OrderSyncResult {
        let mut result = OrderSyncResult {
            marketplace,
            new_orders: 0,
            updated_orders: 0,
            total_processed: 0,
            errors: Vec::new(),
            sync_timestamp: Utc::now(),
        };

        let Some(adapter) = self.adapters.get(&marketplace) else {
            result.errors.push(format!("no adapter for {}", marketplace));
            return result;
        };
        let _flight = match self.sync_guards.get(&marketplace) {
            Some(guard) => guard.lock().await,
            None => {
                result.errors.push(format!("no sync guard for {}", marketplace));
                return result;
            }
        };

        let cursor = self.cursors.lock().unwrap().get(&marketplace).cloned().flatten();
        let (raw_orders, next_cursor) =
            match adapter.fetch_orders_since(&self.seller_id, cursor).await {
                Ok(page) => page,
                Err(e) => {
                    result.errors.push(e.to_string());
                    return result;
                }
            };

        result.total_processed = raw_orders.len();
        for raw in raw_orders {
            match self.ingest_order(marketplace, raw).await {
                IngestOutcome::New => result.new_orders += 1,
                IngestOutcome::Updated => result.updated_orders += 1,
                IngestOutcome::Unchanged => {}
            }
        }
        self.cursors.lock().unwrap().insert(marketplace, next_cursor);

        info!(
            "[OrderManager] {} sync complete: {} new, {} updated",
            marketplace, result.new_orders, result.updated_orders
        );
        result
    }

    async fn ingest_order(&self, marketplace: Marketplace, raw: RawMarketplaceOrder) -> IngestOutcome {
        let index_key = (marketplace, raw.marketplace_order_id.clone());
        let existing_id = self.order_index.read().unwrap().get(&index_key).cloned();

        match existing_id {
            Some(order_id) => {
                let mut orders = self.orders.write().unwrap();
                if let Some(existing) = orders.get_mut(&order_id) {
                    if (existing.order_total - raw.order_total).abs() > f64::EPSILON {
                        existing.order_total = raw.order_total;
                        existing.updated_at = Utc::now();
                        return IngestOutcome::Updated;
                    }
                }
                IngestOutcome::Unchanged
            }
            None => {
                let order = unify_order(&self.seller_id, raw);
                let order_id = order.order_id.clone();
                let urgent = order.priority == OrderPriority::Urgent;
                {
                    self.order_index
                        .write()
                        .unwrap()
                        .insert(index_key, order_id.clone());
                    self.orders.write().unwrap().insert(order_id.clone(), order);
                    self.metrics.write().unwrap().total_orders += 1;
                }
                // A full queue applies backpressure to ingestion.
                self.queue.push(order_id, urgent).await;
                IngestOutcome::New
            }
        }
    }

    /// Automated fulfillment for orders whose marketplace or 3PL handles
    /// shipping. Self-fulfilled orders wait for a manual `fulfill_order`.
    async fn process_automated_fulfillment(&self, order_id: &str) {
        let Some(order) = self.get_order(order_id) else {
            return;
        };
        if order.fulfillment_method == FulfillmentMethod::SelfFulfilled {
            debug!(
                "[OrderManager] order {} is self-fulfilled; awaiting manual fulfillment",
                order_id
            );
            return;
        }
        if order.status != OrderStatus::Confirmed {
            return;
        }

        let lock = self.order_lock(order_id);
        let _serialized = lock.lock().await;
        let mut fulfilled = false;
        {
            let mut orders = self.orders.write().unwrap();
            if let Some(order) = orders.get_mut(order_id) {
                if order.status == OrderStatus::Confirmed {
                    order.status = OrderStatus::Shipped;
                    order.updated_at = Utc::now();
                    order.notes.push(format!(
                        "Automated fulfillment via {}",
                        order.fulfillment_method.as_str()
                    ));
                    fulfilled = true;
                }
            }
        }
        if fulfilled {
            self.metrics.write().unwrap().fulfilled_orders += 1;
            info!("[OrderManager] order {} auto-fulfilled", order_id);
        }
    }

    fn order_lock(&self, order_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.fulfillment_locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Fulfill an order with tracking information.
    ///
    /// Legal only from CONFIRMED or PROCESSING; self-fulfilled orders
    /// require both tracking number and carrier.
    pub async fn fulfill_order(
        &self,
        order_id: &str,
        tracking_number: Option<&str>,
        carrier: Option<&str>,
        notes: &str,
    ) -> FulfillmentResult {
        let lock = self.order_lock(order_id);
        let _serialized = lock.lock().await;

        let order = match self.get_order(order_id) {
            Some(order) => order,
            None => return FulfillmentResult::failure(order_id, format!("Order {} not found", order_id)),
        };

        if !matches!(order.status, OrderStatus::Confirmed | OrderStatus::Processing) {
            let result = FulfillmentResult::failure(
                order_id,
                format!("Order cannot be fulfilled in status: {}", order.status),
            );
            self.metrics.write().unwrap().failed_fulfillments += 1;
            return result;
        }

        if order.fulfillment_method == FulfillmentMethod::SelfFulfilled
            && (tracking_number.is_none() || carrier.is_none())
        {
            self.metrics.write().unwrap().failed_fulfillments += 1;
            return FulfillmentResult::failure(
                order_id,
                "Tracking number and carrier are required for self-fulfilled orders",
            );
        }

        // Report the fulfillment back to the marketplace when we have
        // tracking to post.
        if let (Some(tracking), Some(carrier_name)) = (tracking_number, carrier) {
            if let Some(adapter) = self.adapters.get(&order.marketplace) {
                if let Err(e) = adapter
                    .post_fulfillment(&order.marketplace_order_id, tracking, carrier_name)
                    .await
                {
                    self.metrics.write().unwrap().failed_fulfillments += 1;
                    return FulfillmentResult::failure(
                        order_id,
                        format!("marketplace fulfillment post failed: {}", e),
                    );
                }
            }
        }

        {
            let mut orders = self.orders.write().unwrap();
            if let Some(order) = orders.get_mut(order_id) {
                order.status = OrderStatus::Shipped;
                order.shipping_info.tracking_number = tracking_number.map(str::to_string);
                order.shipping_info.carrier = carrier.map(str::to_string);
                order.updated_at = Utc::now();
                if !notes.is_empty() {
                    order.notes.push(format!("Fulfillment: {}", notes));
                }
            }
        }
        self.metrics.write().unwrap().fulfilled_orders += 1;

        FulfillmentResult {
            order_id: order_id.to_string(),
            success: true,
            tracking_number: tracking_number.map(str::to_string),
            estimated_delivery: None,
            fulfillment_cost: order.shipping_info.shipping_cost,
            errors: Vec::new(),
            processed_at: Utc::now(),
        }
    }

    /// Process a return. Legal only from DELIVERED or SHIPPED; the refund
    /// defaults to the order total.
    pub async fn process_return(
        &self,
        order_id: &str,
        return_reason: &str,
        refund_amount: Option<f64>,
        _notes: &str,
    ) -> ReturnResult {
        let lock = self.order_lock(order_id);
        let _serialized = lock.lock().await;

        let order = match self.get_order(order_id) {
            Some(order) => order,
            None => {
                return ReturnResult {
                    order_id: order_id.to_string(),
                    success: false,
                    refund_amount: 0.0,
                    error: Some(format!("Order {} not found", order_id)),
                    processed_at: Utc::now(),
                }
            }
        };

        if !matches!(order.status, OrderStatus::Delivered | OrderStatus::Shipped) {
            return ReturnResult {
                order_id: order_id.to_string(),
                success: false,
                refund_amount: 0.0,
                error: Some(format!("Order cannot be returned in status: {}", order.status)),
                processed_at: Utc::now(),
            };
        }

        let refund = refund_amount.unwrap_or(order.order_total);
        {
            let mut orders = self.orders.write().unwrap();
            if let Some(order) = orders.get_mut(order_id) {
                order.status = OrderStatus::Returned;
                order.updated_at = Utc::now();
                order
                    .notes
                    .push(format!("Return: {} - Refund: ${}", return_reason, refund));
            }
        }
        self.metrics.write().unwrap().returns_processed += 1;

        ReturnResult {
            order_id: order_id.to_string(),
            success: true,
            refund_amount: refund,
            error: None,
            processed_at: Utc::now(),
        }
    }

    /// Mark an order delivered (carrier webhook surface).
    pub fn mark_delivered(&self, order_id: &str) -> bool {
        let mut orders = self.orders.write().unwrap();
        if let Some(order) = orders.get_mut(order_id) {
            if order.status.can_transition_to(OrderStatus::Delivered) {
                order.status = OrderStatus::Delivered;
                order.updated_at = Utc::now();
                return true;
            }
        }
        false
    }

    /// Aggregated analytics over the current order set.
    pub fn get_order_analytics(&self) -> OrderAnalytics {
        let orders = self.orders.read().unwrap();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_marketplace: HashMap<String, usize> = HashMap::new();
        let mut revenue = 0.0;
        let mut fulfilled = 0;

        for order in orders.values() {
            *by_status.entry(order.status.as_str().to_string()).or_insert(0) += 1;
            *by_marketplace
                .entry(order.marketplace.as_str().to_string())
                .or_insert(0) += 1;
            if order.status != OrderStatus::Cancelled {
                revenue += order.order_total;
            }
            if matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered) {
                fulfilled += 1;
            }
        }

        let total = orders.len();
        OrderAnalytics {
            total_orders: total,
            orders_by_status: by_status,
            orders_by_marketplace: by_marketplace,
            average_order_value: if total > 0 { revenue / total as f64 } else { 0.0 },
            total_revenue: revenue,
            fulfilled_orders: fulfilled,
            generated_at: Utc::now(),
        }
    }

    /// Insert an order directly (tests and manual entry).
    pub async fn add_order(&self, order: UnifiedOrder) {
        let order_id = order.order_id.clone();
        let urgent = order.priority == OrderPriority::Urgent;
        let key = (order.marketplace, order.marketplace_order_id.clone());
        {
            self.order_index.write().unwrap().insert(key, order_id.clone());
            self.orders.write().unwrap().insert(order_id.clone(), order);
            self.metrics.write().unwrap().total_orders += 1;
        }
        self.queue.push(order_id, urgent).await;
    }
}

enum IngestOutcome {
    New,
    Updated,
    Unchanged,
}

/// Convert a marketplace-native order into the unified shape. New orders
/// start CONFIRMED.
fn unify_order(seller_id: &str, raw: RawMarketplaceOrder) -> UnifiedOrder {
    let items: Vec<OrderItem> = raw
        .line_items
        .iter()
        .map(|line| OrderItem {
            item_id: line.item_id.clone(),
            sku: line.sku.clone(),
            title: line.title.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            total_price: line.unit_price * f64::from(line.quantity),
            marketplace_item_id: line.item_id.clone(),
        })
        .collect();

    let priority = match raw.priority_hint.as_deref() {
        Some("urgent") => OrderPriority::Urgent,
        Some("high") => OrderPriority::High,
        Some("low") => OrderPriority::Low,
        _ => OrderPriority::Normal,
    };
    let fulfillment_method = match raw.fulfillment_channel.as_deref() {
        Some("fba") => FulfillmentMethod::Fba,
        Some("managed_delivery") => FulfillmentMethod::ManagedDelivery,
        Some("dropship") => FulfillmentMethod::Dropship,
        Some("third_party") => FulfillmentMethod::ThirdParty,
        _ => FulfillmentMethod::SelfFulfilled,
    };

    let now = Utc::now();
    UnifiedOrder {
        order_id: Uuid::new_v4().to_string(),
        marketplace_order_id: raw.marketplace_order_id,
        marketplace: raw.marketplace,
        seller_id: seller_id.to_string(),
        buyer_info: raw.buyer,
        items,
        shipping_info: ShippingInfo {
            address: raw.shipping_address,
            ..ShippingInfo::default()
        },
        status: OrderStatus::Confirmed,
        priority,
        fulfillment_method,
        order_total: raw.order_total,
        fees: raw.fees,
        created_at: raw.placed_at,
        updated_at: now,
        notes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::{RawOrderLine, StaticMarketplaceAdapter};

    fn raw_order(id: &str, priority: Option<&str>) -> RawMarketplaceOrder {
        RawMarketplaceOrder {
            marketplace_order_id: id.to_string(),
            marketplace: Marketplace::Ebay,
            buyer: HashMap::from([("name".to_string(), "Buyer".to_string())]),
            line_items: vec![RawOrderLine {
                item_id: "item-1".to_string(),
                sku: "SKU-1".to_string(),
                title: "Widget".to_string(),
                quantity: 2,
                unit_price: 10.0,
            }],
            shipping_address: HashMap::new(),
            order_total: 20.0,
            fees: HashMap::new(),
            placed_at: Utc::now(),
            priority_hint: priority.map(str::to_string),
            fulfillment_channel: None,
        }
    }

    fn manager_with(adapter: Arc<StaticMarketplaceAdapter>) -> Arc<MultiMarketplaceOrderManager> {
        let adapters: Vec<Arc<dyn MarketplaceAdapter>> = vec![adapter];
        Arc::new(MultiMarketplaceOrderManager::new(
            "seller-1",
            adapters,
            Duration::from_secs(300),
            16,
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn sync_ingests_new_orders_as_confirmed() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.seed_orders(vec![raw_order("mo-1", None), raw_order("mo-2", Some("urgent"))]);
        let manager = manager_with(adapter);

        let result = manager.sync_marketplace_orders(Marketplace::Ebay).await;
        assert_eq!(result.new_orders, 2);
        assert!(result.errors.is_empty());

        let orders = manager.list_orders(Some(OrderStatus::Confirmed));
        assert_eq!(orders.len(), 2);
        // The urgent order jumped the fulfillment queue.
        let first_queued = manager.queue.try_pop().unwrap();
        let first = manager.get_order(&first_queued).unwrap();
        assert_eq!(first.priority, OrderPriority::Urgent);
    }

    #[tokio::test]
    async fn resync_does_not_duplicate() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.seed_orders(vec![raw_order("mo-1", None)]);
        let manager = manager_with(adapter);

        manager.sync_marketplace_orders(Marketplace::Ebay).await;
        let second = manager.sync_marketplace_orders(Marketplace::Ebay).await;
        assert_eq!(second.new_orders, 0);
        assert_eq!(manager.list_orders(None).len(), 1);
    }

    #[tokio::test]
    async fn adapter_failure_reports_not_throws() {
        let adapter = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
        adapter.fail_next();
        let manager = manager_with(adapter);

        let result = manager.sync_marketplace_orders(Marketplace::Ebay).await;
        assert_eq!(result.new_orders, 0);
        assert_eq!(result.errors.len(), 1);
    }
}
