//! Unified order model and state machine.

pub mod manager;
pub mod queue;

pub use manager::{MultiMarketplaceOrderManager, OrderSyncResult};
pub use queue::FulfillmentQueue;

use crate::marketplace::Marketplace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Terminal states forbid further mutation, except that a delivered
    /// order may still be returned or refunded.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(next, Confirmed | Cancelled),
            Confirmed => matches!(next, Processing | Shipped | Cancelled),
            Processing => matches!(next, Shipped | Cancelled),
            Shipped => matches!(next, Delivered | Returned),
            Delivered => matches!(next, Returned | Refunded),
            Cancelled | Returned | Refunded => false,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an order gets fulfilled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentMethod {
    SelfFulfilled,
    Fba,
    ManagedDelivery,
    Dropship,
    ThirdParty,
}

impl FulfillmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentMethod::SelfFulfilled => "self_fulfilled",
            FulfillmentMethod::Fba => "fba",
            FulfillmentMethod::ManagedDelivery => "managed_delivery",
            FulfillmentMethod::Dropship => "dropship",
            FulfillmentMethod::ThirdParty => "third_party",
        }
    }
}

/// Processing priority. `Urgent` orders jump the fulfillment queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub item_id: String,
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub total_price: f64,
    pub marketplace_item_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub service_level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub shipping_cost: f64,
    pub address: HashMap<String, String>,
}

impl Default for ShippingInfo {
    fn default() -> Self {
        Self {
            method: "standard".to_string(),
            carrier: None,
            service_level: "ground".to_string(),
            tracking_number: None,
            estimated_delivery: None,
            shipping_cost: 0.0,
            address: HashMap::new(),
        }
    }
}

/// The unified order shape shared across every marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedOrder {
    pub order_id: String,
    pub marketplace_order_id: String,
    pub marketplace: Marketplace,
    pub seller_id: String,
    pub buyer_info: HashMap<String, String>,
    pub items: Vec<OrderItem>,
    pub shipping_info: ShippingInfo,
    pub status: OrderStatus,
    pub priority: OrderPriority,
    pub fulfillment_method: FulfillmentMethod,
    pub order_total: f64,
    pub fees: HashMap<String, f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only operational notes.
    pub notes: Vec<String>,
}

/// Outcome of a fulfillment attempt. Precondition violations land here,
/// never as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentResult {
    pub order_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub fulfillment_cost: f64,
    pub errors: Vec<String>,
    pub processed_at: DateTime<Utc>,
}

impl FulfillmentResult {
    pub fn failure(order_id: &str, error: impl Into<String>) -> Self {
        Self {
            order_id: order_id.to_string(),
            success: false,
            tracking_number: None,
            estimated_delivery: None,
            fulfillment_cost: 0.0,
            errors: vec![error.into()],
            processed_at: Utc::now(),
        }
    }
}

/// Outcome of a return/refund request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnResult {
    pub order_id: String,
    pub success: bool,
    pub refund_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Aggregated order analytics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAnalytics {
    pub total_orders: usize,
    pub orders_by_status: HashMap<String, usize>,
    pub orders_by_marketplace: HashMap<String, usize>,
    pub average_order_value: f64,
    pub total_revenue: f64,
    pub fulfilled_orders: usize,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_locked() {
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
        assert!(!OrderStatus::Returned.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Refunded.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn delivered_may_still_return_or_refund() {
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Returned));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
    }

    #[test]
    fn priority_orders_compare() {
        assert!(OrderPriority::Urgent > OrderPriority::High);
        assert!(OrderPriority::Normal > OrderPriority::Low);
    }
}
