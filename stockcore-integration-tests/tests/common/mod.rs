//! Shared harness for engine integration tests.

use rust_decimal::Decimal;
use stockcore::config::{MaxRetryAttempts, RetryBaseDelayMs, RetryMaxDelayMs};
use stockcore::{
    EngineConfig, MoveInRequest, MoveOutItem, MoveOutRequest, ProductId, RankingMode,
    RetryConfig, StockStore, TransferEngine, UserId, Warehouse, WarehouseId, WarehouseProduct,
    WarehouseRegistry,
};
use stockcore_memory::{InMemoryNotifier, InMemoryRankingCache, InMemoryStockStore};
use stockcore_testing::fixtures;

pub type MemoryEngine = TransferEngine<InMemoryStockStore, InMemoryRankingCache, InMemoryNotifier>;

/// In-memory store, cache and notifier wired the way a service would wire
/// them. Clones share state, so tests can inspect what the engine did.
pub struct Harness {
    pub store: InMemoryStockStore,
    pub cache: InMemoryRankingCache,
    pub notifier: InMemoryNotifier,
    pub registry: WarehouseRegistry<InMemoryStockStore, InMemoryRankingCache>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryStockStore::new())
    }

    pub fn with_store(store: InMemoryStockStore) -> Self {
        let cache = InMemoryRankingCache::new();
        Self {
            registry: WarehouseRegistry::new(store.clone(), cache.clone()),
            store,
            cache,
            notifier: InMemoryNotifier::new(),
        }
    }

    pub fn engine(&self) -> MemoryEngine {
        self.engine_with(fast_retry(3))
    }

    pub fn engine_with(&self, config: EngineConfig) -> MemoryEngine {
        TransferEngine::new(
            self.store.clone(),
            self.cache.clone(),
            self.notifier.clone(),
            config,
        )
    }

    /// Registers a non-main warehouse, which also ranks it.
    pub async fn warehouse(&self, zip_code: &str) -> Warehouse {
        self.registry
            .register(fixtures::new_warehouse(zip_code, false))
            .await
            .expect("warehouse registration")
            .warehouse
    }

    pub async fn stock(&self, product_id: ProductId, warehouse_id: WarehouseId, amount: i64) {
        fixtures::stock_up(
            &self.store,
            product_id,
            warehouse_id,
            &fixtures::product_name("Widget"),
            amount,
        )
        .await
        .expect("seed stock");
    }

    pub async fn store_row(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Option<WarehouseProduct> {
        self.store
            .stock_row(product_id, warehouse_id)
            .await
            .expect("read stock row")
    }

    /// On-hand quantity of one row, zero when the row does not exist.
    pub async fn on_hand(&self, product_id: ProductId, warehouse_id: WarehouseId) -> i64 {
        self.store_row(product_id, warehouse_id)
            .await
            .map_or(0, |row| row.quantity)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine configuration with millisecond retry delays.
pub fn fast_retry(attempts: u32) -> EngineConfig {
    EngineConfig {
        retry: RetryConfig {
            max_attempts: MaxRetryAttempts::try_new(attempts).expect("valid attempt count"),
            base_delay_ms: RetryBaseDelayMs::try_new(1).expect("valid base delay"),
            max_delay_ms: RetryMaxDelayMs::try_new(5).expect("valid max delay"),
            ..RetryConfig::default()
        },
        ..EngineConfig::default()
    }
}

pub fn cached_ranking() -> EngineConfig {
    EngineConfig {
        ranking: RankingMode::Cached,
        ..fast_retry(3)
    }
}

pub fn order(lines: &[(ProductId, i64)], zip_code: &str) -> MoveOutRequest {
    MoveOutRequest {
        items: lines
            .iter()
            .map(|&(product_id, amount)| MoveOutItem {
                product_id,
                quantity: fixtures::quantity(amount),
                unit_price: Decimal::new(1250, 2),
            })
            .collect(),
        destination_zip: fixtures::zip(zip_code),
        user_id: UserId::generate(),
    }
}

pub fn transfer(product_id: ProductId, from: WarehouseId, to: WarehouseId, amount: i64) -> MoveInRequest {
    MoveInRequest {
        product_id,
        quantity: fixtures::quantity(amount),
        from,
        to,
    }
}
