//! Marketplace abstraction.
//!
//! The core never talks to marketplace REST APIs directly; everything goes
//! through the [`MarketplaceAdapter`] trait defined in [`adapter`]. This
//! module holds the marketplace identifiers and the wire-level data shapes
//! exchanged with adapters.

pub mod adapter;

pub use adapter::{MarketplaceAdapter, StaticMarketplaceAdapter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Supported marketplaces, in canonical order.
///
/// Declaration order is the canonical order used wherever a deterministic
/// marketplace ordering matters (rebalance remainder assignment, reports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    Ebay,
    Amazon,
    Walmart,
    Etsy,
    Facebook,
    Mercari,
}

impl Marketplace {
    pub const ALL: [Marketplace; 6] = [
        Marketplace::Ebay,
        Marketplace::Amazon,
        Marketplace::Walmart,
        Marketplace::Etsy,
        Marketplace::Facebook,
        Marketplace::Mercari,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Marketplace::Ebay => "ebay",
            Marketplace::Amazon => "amazon",
            Marketplace::Walmart => "walmart",
            Marketplace::Etsy => "etsy",
            Marketplace::Facebook => "facebook",
            Marketplace::Mercari => "mercari",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inventory mutation pushed to a marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryUpdate {
    pub sku: String,
    pub quantity: i64,
    pub price: f64,
    /// Marketplace listing reference, when already listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_ref: Option<String>,
}

/// Per-SKU outcome of an inventory batch sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuSyncOutcome {
    pub sku: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Raw order as fetched from a marketplace, before unification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMarketplaceOrder {
    pub marketplace_order_id: String,
    pub marketplace: Marketplace,
    pub buyer: HashMap<String, String>,
    pub line_items: Vec<RawOrderLine>,
    pub shipping_address: HashMap<String, String>,
    pub order_total: f64,
    #[serde(default)]
    pub fees: HashMap<String, f64>,
    pub placed_at: DateTime<Utc>,
    /// Marketplace-reported priority hint, e.g. "urgent" for expedited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_hint: Option<String>,
    /// Fulfillment channel reported by the marketplace, e.g. "fba".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrderLine {
    pub item_id: String,
    pub sku: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Shipment quote request sent to an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentQuoteRequest {
    pub origin: HashMap<String, String>,
    pub destination: HashMap<String, String>,
    pub weight_oz: f64,
    /// Length, width, height in inches.
    pub dimensions: (f64, f64, f64),
    #[serde(default)]
    pub service_prefs: Vec<String>,
}

/// One carrier/service quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentQuote {
    pub carrier: String,
    pub service: String,
    pub amount: f64,
    pub estimated_days: u32,
}
