//! Fulfillment walkthrough
//!
//! Wires the in-memory store, ranking cache and notifier into a transfer
//! engine and runs a day in a small warehouse network:
//! - Register a main site and four regional sites
//! - Receive a delivery at the main site and rebalance it to the regions
//! - Ship customer orders from the nearest regions
//! - Audit the movement ledger
//!
//! Run with `RUST_LOG=debug` to see the engine's own spans, and set
//! `STOCKCORE_RANKING_MODE=cached` to allocate from the ranking cache.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use stockcore::{
    EngineConfig, MoveInRequest, MoveOutItem, MoveOutRequest, MovementDestination, MovementQuery,
    ProductId, ProductName, Quantity, TransferEngine, TransferError, UserId, WarehouseRegistry,
    ZipCode,
};
use stockcore_examples::fulfillment::{receive_delivery, register_network};
use stockcore_memory::{InMemoryNotifier, InMemoryRankingCache, InMemoryStockStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting fulfillment example");

    let config = EngineConfig::from_env().context("reading STOCKCORE_* configuration")?;
    let store = InMemoryStockStore::new();
    let cache = InMemoryRankingCache::new();
    let notifier = InMemoryNotifier::new();
    let mut updates = notifier.subscribe();

    let registry = WarehouseRegistry::new(store.clone(), cache.clone());
    let network = register_network(&registry).await?;
    let engine = TransferEngine::new(store.clone(), cache, notifier, config);

    let lantern = ProductId::generate();
    let lantern_name = ProductName::try_new("Trail Lantern")?;

    // 500 lanterns arrive at the main site
    info!("Receiving 500 lanterns at {}", network.main.name);
    receive_delivery(
        &store,
        lantern,
        network.main.id,
        &lantern_name,
        Quantity::try_new(500)?,
    )
    .await?;

    // Rebalance to the regions
    for (zip_code, amount) in [("07102", 120), ("30303", 80), ("60601", 150), ("94105", 100)] {
        let region = network
            .region(zip_code)
            .with_context(|| format!("no region at {zip_code}"))?;
        let result = engine
            .move_in(MoveInRequest {
                product_id: lantern,
                quantity: Quantity::try_new(amount)?,
                from: network.main.id,
                to: region.id,
            })
            .await?;
        info!(
            "Moved {amount} lanterns to {} ({} ledger entry)",
            region.name,
            result.movements.len()
        );
    }

    // A customer in Philadelphia orders 150: Newark has 120, the rest comes
    // from the next closest region
    let order = MoveOutRequest {
        items: vec![MoveOutItem {
            product_id: lantern,
            quantity: Quantity::try_new(150)?,
            unit_price: Decimal::new(3499, 2),
        }],
        destination_zip: ZipCode::try_new("19103")?,
        user_id: UserId::generate(),
    };
    let customer = order.user_id;
    let shipped = engine.move_out(order).await?;
    for movement in &shipped.movements {
        info!(
            "Shipped {} from warehouse {}",
            movement.quantity, movement.source
        );
    }
    for warning in &shipped.warnings {
        warn!(?warning, "Order committed with a warning");
    }
    if let Ok(update) = updates.try_recv() {
        info!(key = %update.key, payload = %update.payload, "Published {}", update.topic);
    }

    // An order larger than the network holds is refused without side effects
    let oversized = MoveOutRequest {
        items: vec![MoveOutItem {
            product_id: lantern,
            quantity: Quantity::try_new(10_000)?,
            unit_price: Decimal::new(3499, 2),
        }],
        destination_zip: ZipCode::try_new("94105")?,
        user_id: UserId::generate(),
    };
    match engine.move_out(oversized).await {
        Err(TransferError::InsufficientStock { available, .. }) => {
            info!("Oversized order refused, {available} lanterns available");
        }
        Err(other) => return Err(other.into()),
        Ok(_) => warn!("Oversized order unexpectedly shipped"),
    }

    // Which site would serve a few zips
    let zips = [ZipCode::try_new("02108")?, ZipCode::try_new("98101")?];
    let nearest = registry.nearest_warehouse_zips(&zips).await?;
    for zip in &zips {
        if let Some(site) = nearest.get(zip) {
            info!("Nearest site to {zip} is at {site}");
        }
    }
    if let Some(site) = engine
        .nearest_warehouse_zip(lantern, &ZipCode::try_new("10001")?)
        .await?
    {
        info!("Lanterns for 10001 would ship from {site}");
    }

    // Audit
    let history = engine.movement_history(MovementQuery::Product(lantern)).await?;
    let to_customers = history
        .iter()
        .filter(|movement| movement.destination == MovementDestination::User(customer))
        .count();
    info!(
        entries = history.len(),
        to_customers,
        "Ledger holds {} movements for {}",
        history.len(),
        lantern_name
    );
    info!(
        "Lanterns remaining across the network: {}",
        engine.total_quantity(lantern).await?
    );

    info!("Fulfillment example completed successfully");
    Ok(())
}
