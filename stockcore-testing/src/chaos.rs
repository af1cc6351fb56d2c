use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use nutype::nutype;
use rand::{Rng, SeedableRng, random, rngs::StdRng};
use stockcore::{
    Distance, LockedRow, MovementQuery, NotificationMessage, Notifier, NotifyError, Operation,
    ProductId, ProductName, Quantity, RankingCache, RankingCacheError, StockMovement, StockStore,
    StockStoreError, StockTransaction, Timestamp, Warehouse, WarehouseCatalog, WarehouseDistance,
    WarehouseId, WarehouseProduct, WarehouseStock, ZipCode,
};
use tracing::debug;

/// Probability value for chaos injection rates.
///
/// 0.0 never injects, 1.0 always injects.
///
/// # Examples
///
/// ```ignore
/// use stockcore_testing::chaos::Probability;
///
/// let sometimes = Probability::try_new(0.5).unwrap();
/// assert!(Probability::try_new(1.5).is_err());
/// ```
#[nutype(
    validate(greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Display, Into)
)]
pub struct Probability(f32);

fn probability(value: f32) -> Probability {
    Probability::try_new(value.clamp(0.0, 1.0)).expect("clamped value is always valid")
}

#[derive(Debug, Clone)]
pub struct ChaosConfig {
    deterministic_seed: Option<u64>,
    failure_probability: Probability,
    lock_timeout_probability: Probability,
    conflict_probability: Probability,
}

impl ChaosConfig {
    pub fn deterministic() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            deterministic_seed: Some(seed),
            ..Self::default()
        }
    }

    /// Plain store failures on `begin`, reads and cache/transport calls.
    #[must_use]
    pub fn with_failure_probability(mut self, value: f32) -> Self {
        self.failure_probability = probability(value);
        self
    }

    /// Lock timeouts on `lock_stock_row`.
    #[must_use]
    pub fn with_lock_timeout_probability(mut self, value: f32) -> Self {
        self.lock_timeout_probability = probability(value);
        self
    }

    /// Serialization conflicts on `commit`; the wrapped transaction is
    /// rolled back first.
    #[must_use]
    pub fn with_conflict_probability(mut self, value: f32) -> Self {
        self.conflict_probability = probability(value);
        self
    }

    fn rng(&self) -> Arc<Mutex<StdRng>> {
        let rng = match self.deterministic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(random()),
        };
        Arc::new(Mutex::new(rng))
    }
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            deterministic_seed: None,
            failure_probability: probability(0.0),
            lock_timeout_probability: probability(0.0),
            conflict_probability: probability(0.0),
        }
    }
}

fn should_inject(rng: &Mutex<StdRng>, probability: Probability) -> bool {
    let prob_f32: f32 = probability.into();

    if prob_f32 <= 0.0 {
        return false;
    }

    if prob_f32 >= 1.0 {
        return true;
    }

    let mut rng = rng.lock().expect("chaos RNG mutex should not be poisoned");

    rng.random_bool(f64::from(prob_f32))
}

pub trait ChaosStockStoreExt: Sized {
    fn with_chaos(self, config: ChaosConfig) -> ChaosStockStore<Self>;
}

impl<S: StockStore> ChaosStockStoreExt for S {
    fn with_chaos(self, config: ChaosConfig) -> ChaosStockStore<Self> {
        ChaosStockStore::new(self, config)
    }
}

/// A [`StockStore`] that fails on purpose.
///
/// Transactions opened through it share its random source, so a seeded
/// configuration replays the same failure sequence.
pub struct ChaosStockStore<S> {
    store: S,
    config: ChaosConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl<S> ChaosStockStore<S> {
    pub fn new(store: S, config: ChaosConfig) -> Self {
        let rng = config.rng();
        Self { store, config, rng }
    }

    pub const fn inner(&self) -> &S {
        &self.store
    }

    fn fail_with(&self, operation: Operation) -> Option<StockStoreError> {
        should_inject(&self.rng, self.config.failure_probability).then(|| {
            debug!(%operation, "[chaos.store] injecting store failure");
            StockStoreError::StoreFailure { operation }
        })
    }
}

impl<S> StockStore for ChaosStockStore<S>
where
    S: StockStore,
{
    type Transaction = ChaosTransaction<S::Transaction>;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StockStoreError>> + Send {
        let injected = self.fail_with(Operation::BeginTransaction);
        let store = &self.store;
        let config = self.config.clone();
        let rng = Arc::clone(&self.rng);

        async move {
            if let Some(error) = injected {
                return Err(error);
            }

            let inner = store.begin().await?;
            Ok(ChaosTransaction { inner, config, rng })
        }
    }

    fn total_quantity(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<i64, StockStoreError>> + Send {
        let injected = self.fail_with(Operation::ReadStock);
        let store = &self.store;

        async move {
            match injected {
                Some(error) => Err(error),
                None => store.total_quantity(product_id).await,
            }
        }
    }

    fn stock_by_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<WarehouseStock>, StockStoreError>> + Send {
        let injected = self.fail_with(Operation::ReadStock);
        let store = &self.store;

        async move {
            match injected {
                Some(error) => Err(error),
                None => store.stock_by_product(product_id).await,
            }
        }
    }

    fn stock_row(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<WarehouseProduct>, StockStoreError>> + Send {
        self.store.stock_row(product_id, warehouse_id)
    }

    fn stock_rows_by_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<WarehouseProduct>, StockStoreError>> + Send {
        self.store.stock_rows_by_product(product_id)
    }

    fn stock_rows_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Vec<WarehouseProduct>, StockStoreError>> + Send {
        self.store.stock_rows_by_warehouse(warehouse_id)
    }

    fn movements(
        &self,
        query: MovementQuery,
    ) -> impl Future<Output = Result<Vec<StockMovement>, StockStoreError>> + Send {
        self.store.movements(query)
    }
}

impl<S> WarehouseCatalog for ChaosStockStore<S>
where
    S: WarehouseCatalog,
{
    fn save_warehouse(
        &self,
        warehouse: &Warehouse,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        self.store.save_warehouse(warehouse)
    }

    fn warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<Warehouse>, StockStoreError>> + Send {
        self.store.warehouse(warehouse_id)
    }

    fn warehouses(&self) -> impl Future<Output = Result<Vec<Warehouse>, StockStoreError>> + Send {
        self.store.warehouses()
    }

    fn non_main_warehouses(
        &self,
    ) -> impl Future<Output = Result<Vec<Warehouse>, StockStoreError>> + Send {
        self.store.non_main_warehouses()
    }

    fn main_warehouse(
        &self,
    ) -> impl Future<Output = Result<Option<Warehouse>, StockStoreError>> + Send {
        self.store.main_warehouse()
    }
}

/// Transaction issued by [`ChaosStockStore`].
pub struct ChaosTransaction<T> {
    inner: T,
    config: ChaosConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl<T> StockTransaction for ChaosTransaction<T>
where
    T: StockTransaction,
{
    fn lock_stock_row(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<LockedRow>, StockStoreError>> + Send {
        let injected = should_inject(&self.rng, self.config.lock_timeout_probability);
        let inner = &mut self.inner;

        async move {
            if injected {
                debug!(%product_id, %warehouse_id, "[chaos.store] injecting lock timeout");
                return Err(StockStoreError::LockTimeout {
                    operation: Operation::LockStockRow,
                });
            }

            inner.lock_stock_row(product_id, warehouse_id).await
        }
    }

    fn decrement_quantity(
        &mut self,
        row: &LockedRow,
        quantity: Quantity,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        self.inner.decrement_quantity(row, quantity, at)
    }

    fn increment_or_create(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        product_name: &ProductName,
        quantity: Quantity,
        at: Timestamp,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        self.inner
            .increment_or_create(product_id, warehouse_id, product_name, quantity, at)
    }

    fn append_movement(
        &mut self,
        movement: &StockMovement,
    ) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        self.inner.append_movement(movement)
    }

    fn commit(self) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        let injected = should_inject(&self.rng, self.config.conflict_probability);
        let inner = self.inner;

        async move {
            if injected {
                debug!("[chaos.store] injecting commit conflict");
                inner.rollback().await?;
                return Err(StockStoreError::TransactionConflict {
                    operation: Operation::CommitTransaction,
                });
            }

            inner.commit().await
        }
    }

    fn rollback(self) -> impl Future<Output = Result<(), StockStoreError>> + Send {
        self.inner.rollback()
    }
}

/// A [`RankingCache`] whose calls fail with [`RankingCacheError::Unavailable`].
pub struct ChaosRankingCache<C> {
    cache: C,
    config: ChaosConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl<C> ChaosRankingCache<C> {
    pub fn new(cache: C, config: ChaosConfig) -> Self {
        let rng = config.rng();
        Self { cache, config, rng }
    }

    pub const fn inner(&self) -> &C {
        &self.cache
    }

    fn fail_with(&self, operation: &'static str) -> Option<RankingCacheError> {
        should_inject(&self.rng, self.config.failure_probability).then(|| {
            debug!(operation, "[chaos.cache] injecting cache outage");
            RankingCacheError::Unavailable {
                operation,
                detail: "injected outage".to_string(),
            }
        })
    }
}

impl<C> RankingCache for ChaosRankingCache<C>
where
    C: RankingCache,
{
    fn update_ranks(
        &self,
        target_zip: &ZipCode,
        warehouse_id: WarehouseId,
        distances: &HashMap<ZipCode, Distance>,
    ) -> impl Future<Output = Result<(), RankingCacheError>> + Send {
        let injected = self.fail_with("update_ranks");
        let cache = &self.cache;

        async move {
            match injected {
                Some(error) => Err(error),
                None => cache.update_ranks(target_zip, warehouse_id, distances).await,
            }
        }
    }

    fn nearest_warehouses(
        &self,
        zip: &ZipCode,
    ) -> impl Future<Output = Result<Vec<WarehouseDistance>, RankingCacheError>> + Send {
        let injected = self.fail_with("nearest_warehouses");
        let cache = &self.cache;

        async move {
            match injected {
                Some(error) => Err(error),
                None => cache.nearest_warehouses(zip).await,
            }
        }
    }

    fn copy_rankings(
        &self,
        source: WarehouseId,
        target: WarehouseId,
    ) -> impl Future<Output = Result<(), RankingCacheError>> + Send {
        let injected = self.fail_with("copy_rankings");
        let cache = &self.cache;

        async move {
            match injected {
                Some(error) => Err(error),
                None => cache.copy_rankings(source, target).await,
            }
        }
    }

    fn clear(&self) -> impl Future<Output = Result<(), RankingCacheError>> + Send {
        let injected = self.fail_with("clear");
        let cache = &self.cache;

        async move {
            match injected {
                Some(error) => Err(error),
                None => cache.clear().await,
            }
        }
    }
}

/// A [`Notifier`] whose publishes fail with [`NotifyError::Publish`].
pub struct ChaosNotifier<N> {
    notifier: N,
    config: ChaosConfig,
    rng: Arc<Mutex<StdRng>>,
}

impl<N> ChaosNotifier<N> {
    pub fn new(notifier: N, config: ChaosConfig) -> Self {
        let rng = config.rng();
        Self {
            notifier,
            config,
            rng,
        }
    }

    pub const fn inner(&self) -> &N {
        &self.notifier
    }
}

impl<N> Notifier for ChaosNotifier<N>
where
    N: Notifier,
{
    fn publish(
        &self,
        message: NotificationMessage,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send {
        let injected = should_inject(&self.rng, self.config.failure_probability);
        let notifier = &self.notifier;

        async move {
            if injected {
                debug!(topic = %message.topic, "[chaos.notifier] injecting publish failure");
                return Err(NotifyError::Publish {
                    topic: message.topic,
                    detail: "injected broker outage".to_string(),
                });
            }

            notifier.publish(message).await
        }
    }
}
