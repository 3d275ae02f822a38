//! FlipSync demo binary.
//!
//! Wires the core against the stub LLM provider and in-memory marketplace
//! adapters, runs a short end-to-end pass (strategic analysis, approval
//! routing, order ingestion and fulfillment, inventory rebalance), and
//! prints the resulting state.

use anyhow::Result;
use clap::Parser;
use flipsync::agents::{ContentRequest, ContentRequestType};
use flipsync::inventory::{MarketplaceInventoryEntry, RebalanceStrategy};
use flipsync::marketplace::{RawMarketplaceOrder, RawOrderLine};
use flipsync::prelude::*;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flipsync", about = "FlipSync multi-agent orchestration demo")]
struct Args {
    /// Optional TOML configuration file.
    #[arg(long, env = "FLIPSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Seller account the order manager syncs for.
    #[arg(long, default_value = "demo-seller")]
    seller_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => FlipsyncConfig::from_toml_file(path)?,
        None => FlipsyncConfig::default(),
    };

    let llm = Arc::new(StubLlmProvider::new());
    let ebay = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Ebay));
    let amazon = Arc::new(StaticMarketplaceAdapter::new(Marketplace::Amazon));
    seed_demo_orders(&ebay);

    let adapters: Vec<Arc<dyn MarketplaceAdapter>> = vec![ebay, amazon];
    let runtime = Runtime::new(
        config,
        llm,
        adapters,
        Arc::new(InMemoryAgentRepository::new()),
        Arc::new(RecordingPublisher::new()),
        args.seller_id,
    );
    runtime.start();

    // Strategic analysis through the executive.
    let analysis = runtime
        .executive()
        .analyze_strategic_situation(&StrategicAnalysisRequest {
            business_context: HashMap::from([("revenue_growth".to_string(), json!(0.18))]),
            decision_type: "strategic_planning".to_string(),
            objectives: vec!["revenue_growth".to_string()],
            constraints: HashMap::from([("budget".to_string(), json!(120_000.0))]),
            timeline: None,
            priority_level: "high".to_string(),
        })
        .await;
    info!(
        "strategic analysis: confidence {:.2}, {} recommendations",
        analysis.confidence_score,
        analysis.recommendations.len()
    );

    // Content generation routed through the approval workflow.
    let content_response = runtime
        .content_agent()
        .respond(&ContentRequest {
            request_type: ContentRequestType::Generate,
            target_marketplace: Marketplace::Ebay,
            product_info: HashMap::from([("name".to_string(), json!("Vintage Brass Lamp"))]),
            existing_content: None,
            keywords: vec!["vintage".to_string()],
        })
        .await;
    let approval = runtime
        .approval_router()
        .process_agent_response(&content_response, "demo-user", "demo-conv", "write a listing")
        .await;
    info!(
        "approval outcome: auto_approve={} ({})",
        approval.auto_approve,
        approval.decision_type.as_deref().unwrap_or("-")
    );

    // Ingest the seeded marketplace orders and fulfill the first one.
    let sync = runtime
        .order_manager()
        .sync_marketplace_orders(Marketplace::Ebay)
        .await;
    info!("order sync: {} new orders", sync.new_orders);
    if let Some(order) = runtime.order_manager().list_orders(Some(OrderStatus::Confirmed)).first() {
        let result = runtime
            .order_manager()
            .fulfill_order(&order.order_id, Some("1Z999AA10123456784"), Some("UPS"), "demo")
            .await;
        info!("fulfillment of {}: success={}", result.order_id, result.success);
    }

    // Inventory rebalance across marketplaces.
    runtime.inventory_manager().set_inventory(
        MarketplaceInventoryEntry::new(Marketplace::Ebay, "SKU-1", 30, 19.99)
            .with_performance("sales_velocity", 2.5),
    );
    runtime.inventory_manager().set_inventory(
        MarketplaceInventoryEntry::new(Marketplace::Amazon, "SKU-1", 70, 19.99)
            .with_performance("sales_velocity", 3.5),
    );
    let recommendation = runtime
        .inventory_manager()
        .rebalance_inventory("SKU-1", RebalanceStrategy::PerformanceBased, None)
        .await;
    info!(
        "rebalance recommendation for SKU-1: {:?}",
        recommendation.recommended_distribution
    );

    let analytics = runtime.order_manager().get_order_analytics();
    info!(
        "orders: {} total, revenue ${:.2}; LLM spend ${:.4}",
        analytics.total_orders,
        analytics.total_revenue,
        runtime.cost_tracker().total_cost()
    );

    runtime.stop().await;
    Ok(())
}

fn seed_demo_orders(adapter: &StaticMarketplaceAdapter) {
    adapter.seed_orders(vec![RawMarketplaceOrder {
        marketplace_order_id: "EB-1001".to_string(),
        marketplace: Marketplace::Ebay,
        buyer: HashMap::from([("name".to_string(), "Demo Buyer".to_string())]),
        line_items: vec![RawOrderLine {
            item_id: "item-1".to_string(),
            sku: "SKU-1".to_string(),
            title: "Vintage Brass Lamp".to_string(),
            quantity: 1,
            unit_price: 42.0,
        }],
        shipping_address: HashMap::from([("city".to_string(), "Portland".to_string())]),
        order_total: 42.0,
        fees: HashMap::from([("marketplace_fee".to_string(), 5.25)]),
        placed_at: chrono::Utc::now(),
        priority_hint: None,
        fulfillment_channel: None,
    }]);
}
