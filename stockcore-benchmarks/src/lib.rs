//! StockCore benchmarks
//!
//! Shared setup for the criterion benches: a catalog of warehouses spread
//! over a zip range and an in-memory engine stocked for one product.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

use rust_decimal::Decimal;
use stockcore::{
    AllocationCandidate, CatalogError, EngineConfig, MoveOutItem, MoveOutRequest, ProductId,
    TransferEngine, UserId, WarehouseId, WarehouseRegistry,
};
use stockcore_memory::{InMemoryNotifier, InMemoryRankingCache, InMemoryStockStore};
use stockcore_testing::fixtures;

/// Engine over the in-memory adapters.
pub type BenchEngine = TransferEngine<InMemoryStockStore, InMemoryRankingCache, InMemoryNotifier>;

/// Zip code of the `index`-th warehouse; warehouses sit 7 apart.
pub fn warehouse_zip(index: usize) -> String {
    format!("{:05}", 10_000 + index * 7)
}

/// `count` candidates holding `available` units each.
pub fn candidates(count: usize, available: i64) -> Vec<AllocationCandidate> {
    (0..count)
        .map(|index| AllocationCandidate {
            warehouse_id: WarehouseId::generate(),
            zip_code: fixtures::zip(&warehouse_zip(index)),
            available,
        })
        .collect()
}

/// A registered catalog of `warehouses` sites, each holding `units` of one
/// product, behind an engine with `config`.
pub async fn stocked_engine(
    warehouses: usize,
    units: i64,
    config: EngineConfig,
) -> Result<(BenchEngine, ProductId), CatalogError> {
    let store = InMemoryStockStore::new();
    let cache = InMemoryRankingCache::new();
    let registry = WarehouseRegistry::new(store.clone(), cache.clone());
    let product = ProductId::generate();
    let name = fixtures::product_name("Bench Widget");

    for index in 0..warehouses {
        let registration = registry
            .register(fixtures::new_warehouse(&warehouse_zip(index), false))
            .await?;
        fixtures::stock_up(&store, product, registration.warehouse.id, &name, units).await?;
    }

    let engine = TransferEngine::new(store, cache, InMemoryNotifier::new(), config);
    Ok((engine, product))
}

/// A single-line order for `amount` units shipped to `zip`.
pub fn single_line_order(product_id: ProductId, amount: i64, zip: &str) -> MoveOutRequest {
    MoveOutRequest {
        items: vec![MoveOutItem {
            product_id,
            quantity: fixtures::quantity(amount),
            unit_price: Decimal::new(999, 2),
        }],
        destination_zip: fixtures::zip(zip),
        user_id: UserId::generate(),
    }
}
