//! Marketplace adapter contract and the in-memory seam implementation.

use super::{
    InventoryUpdate, Marketplace, RawMarketplaceOrder, ShipmentQuote, ShipmentQuoteRequest,
    SkuSyncOutcome,
};
use crate::error::{ErrorCode, FlipsyncError, FsResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Minimum contract every marketplace integration provides.
///
/// Real implementations wrap the marketplace REST/GraphQL clients; the core
/// only depends on this trait. All methods are suspension points.
#[async_trait]
pub trait MarketplaceAdapter: Send + Sync {
    fn marketplace(&self) -> Marketplace;

    /// Fetch orders created after the given cursor. Returns the orders and
    /// the cursor to resume from on the next call.
    async fn fetch_orders_since(
        &self,
        seller_id: &str,
        cursor: Option<String>,
    ) -> FsResult<(Vec<RawMarketplaceOrder>, Option<String>)>;

    /// Push a batch of inventory updates, returning per-SKU outcomes.
    async fn sync_inventory_batch(
        &self,
        batch: &[InventoryUpdate],
    ) -> FsResult<Vec<SkuSyncOutcome>>;

    /// Report a fulfillment (tracking number + carrier) back to the marketplace.
    async fn post_fulfillment(
        &self,
        order_ref: &str,
        tracking_number: &str,
        carrier: &str,
    ) -> FsResult<()>;

    /// Quote shipment options for a package.
    async fn quote_shipment(&self, request: &ShipmentQuoteRequest) -> FsResult<Vec<ShipmentQuote>>;
}

/// In-memory adapter used by tests and the demo binary.
///
/// Orders and quotes are seeded up front; `fail_next` flips the next call
/// into an `ADAPTER_UNAVAILABLE` error so degraded paths can be exercised
/// without pinning provider-specific behavior.
pub struct StaticMarketplaceAdapter {
    marketplace: Marketplace,
    orders: Mutex<Vec<RawMarketplaceOrder>>,
    quotes: Mutex<Vec<ShipmentQuote>>,
    fulfillments: Mutex<Vec<(String, String, String)>>,
    synced: Mutex<HashMap<String, InventoryUpdate>>,
    fail_next: AtomicBool,
}

impl StaticMarketplaceAdapter {
    pub fn new(marketplace: Marketplace) -> Self {
        Self {
            marketplace,
            orders: Mutex::new(Vec::new()),
            quotes: Mutex::new(Vec::new()),
            fulfillments: Mutex::new(Vec::new()),
            synced: Mutex::new(HashMap::new()),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn seed_orders(&self, orders: Vec<RawMarketplaceOrder>) {
        self.orders.lock().unwrap().extend(orders);
    }

    pub fn seed_quotes(&self, quotes: Vec<ShipmentQuote>) {
        *self.quotes.lock().unwrap() = quotes;
    }

    /// Make the next adapter call fail with `ADAPTER_UNAVAILABLE`.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Fulfillments posted so far, as `(order_ref, tracking, carrier)`.
    pub fn posted_fulfillments(&self) -> Vec<(String, String, String)> {
        self.fulfillments.lock().unwrap().clone()
    }

    /// Last synced update per SKU.
    pub fn synced_updates(&self) -> HashMap<String, InventoryUpdate> {
        self.synced.lock().unwrap().clone()
    }

    fn check_availability(&self) -> FsResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(FlipsyncError::new(
                ErrorCode::AdapterUnavailable,
                format!("{} adapter unavailable", self.marketplace),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketplaceAdapter for StaticMarketplaceAdapter {
    fn marketplace(&self) -> Marketplace {
        self.marketplace
    }

    async fn fetch_orders_since(
        &self,
        _seller_id: &str,
        cursor: Option<String>,
    ) -> FsResult<(Vec<RawMarketplaceOrder>, Option<String>)> {
        self.check_availability()?;
        let orders = self.orders.lock().unwrap();
        // The cursor is the index of the first unseen order.
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let page: Vec<RawMarketplaceOrder> = orders.iter().skip(start).cloned().collect();
        let next_cursor = Some(orders.len().to_string());
        Ok((page, next_cursor))
    }

    async fn sync_inventory_batch(
        &self,
        batch: &[InventoryUpdate],
    ) -> FsResult<Vec<SkuSyncOutcome>> {
        self.check_availability()?;
        let mut synced = self.synced.lock().unwrap();
        let outcomes = batch
            .iter()
            .map(|update| {
                synced.insert(update.sku.clone(), update.clone());
                SkuSyncOutcome {
                    sku: update.sku.clone(),
                    success: true,
                    listing_ref: update
                        .listing_ref
                        .clone()
                        .or_else(|| Some(format!("{}-{}", self.marketplace, update.sku))),
                    error: None,
                }
            })
            .collect();
        Ok(outcomes)
    }

    async fn post_fulfillment(
        &self,
        order_ref: &str,
        tracking_number: &str,
        carrier: &str,
    ) -> FsResult<()> {
        self.check_availability()?;
        self.fulfillments.lock().unwrap().push((
            order_ref.to_string(),
            tracking_number.to_string(),
            carrier.to_string(),
        ));
        Ok(())
    }

    async fn quote_shipment(&self, _request: &ShipmentQuoteRequest) -> FsResult<Vec<ShipmentQuote>> {
        self.check_availability()?;
        let quotes = self.quotes.lock().unwrap();
        if quotes.is_empty() {
            return Err(FlipsyncError::new(
                ErrorCode::AdapterUnavailable,
                format!("no shipping quotes available from {}", self.marketplace),
            ));
        }
        Ok(quotes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn order(id: &str) -> RawMarketplaceOrder {
        RawMarketplaceOrder {
            marketplace_order_id: id.to_string(),
            marketplace: Marketplace::Ebay,
            buyer: HashMap::new(),
            line_items: vec![],
            shipping_address: HashMap::new(),
            order_total: 10.0,
            fees: HashMap::new(),
            placed_at: Utc::now(),
            priority_hint: None,
            fulfillment_channel: None,
        }
    }

    #[tokio::test]
    async fn cursor_pages_through_orders() {
        let adapter = StaticMarketplaceAdapter::new(Marketplace::Ebay);
        adapter.seed_orders(vec![order("a"), order("b")]);

        let (page, cursor) = adapter.fetch_orders_since("seller", None).await.unwrap();
        assert_eq!(page.len(), 2);

        adapter.seed_orders(vec![order("c")]);
        let (page, _) = adapter.fetch_orders_since("seller", cursor).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].marketplace_order_id, "c");
    }

    #[tokio::test]
    async fn fail_next_is_one_shot() {
        let adapter = StaticMarketplaceAdapter::new(Marketplace::Amazon);
        adapter.fail_next();
        let err = adapter.fetch_orders_since("seller", None).await.unwrap_err();
        assert!(err.is_code(ErrorCode::AdapterUnavailable));
        assert!(adapter.fetch_orders_since("seller", None).await.is_ok());
    }
}
