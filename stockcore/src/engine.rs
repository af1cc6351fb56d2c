//! Transfer engine.
//!
//! `move_in` and `move_out` each run as one unit of work against the stock
//! store. Every row is locked before it is checked and mutated, every
//! mutation is paired with a ledger entry, and a failure anywhere rolls the
//! whole request back. Transient failures restart the request from scratch
//! under the configured retry schedule, recomputing the allocation because
//! availability may have moved in the meantime.
//!
//! Change notifications are published after commit and never fail a
//! transfer; delivery problems come back as [`TransferWarning`]s.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::allocation::{
    self, Allocation, AllocationCandidate, order_by_ranking,
};
use crate::config::{EngineConfig, RankingMode};
use crate::errors::{
    AllocationError, NotifyError, RankingCacheError, StockStoreError, TransferError,
};
use crate::model::{
    MoveInRequest, MoveOutRequest, MovementDestination, MovementQuery, StockMovement,
};
use crate::notifier::{ChangeNotifier, Notifier};
use crate::ranking::RankingCache;
use crate::store::{StockStore, StockTransaction, WarehouseCatalog};
use crate::types::{MovementId, ProductId, Quantity, Timestamp, UserId, WarehouseId, ZipCode};

const MOVE_IN: &str = "move_in";
const MOVE_OUT: &str = "move_out";
const QUERY: &str = "query";

/// Something that went wrong after the transfer committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferWarning {
    /// The quantity change for a product could not be published.
    NotificationFailed {
        product_id: ProductId,
        error: NotifyError,
    },
    /// The post-commit total could not be read, so nothing was published.
    TotalUnavailable {
        product_id: ProductId,
        error: StockStoreError,
    },
    /// The ranking cache failed; candidates were taken in store order.
    RankingDegraded { error: RankingCacheError },
}

/// Outcome of a successful transfer.
///
/// A transfer that returns `Ok` has committed. `notified` is false when at
/// least one change notification was not delivered; the reasons are listed
/// in `warnings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    /// Always true; failed transfers return `Err` instead.
    pub committed: bool,
    /// Whether every change notification was delivered.
    pub notified: bool,
    /// Ledger entries written by the transfer, in write order.
    pub movements: Vec<StockMovement>,
    pub warnings: Vec<TransferWarning>,
}

/// Applies move-in and move-out requests.
///
/// All collaborators are owned by the engine; nothing is shared through
/// global state.
#[derive(Debug, Clone)]
pub struct TransferEngine<S, C, N> {
    store: S,
    cache: C,
    notifier: ChangeNotifier<N>,
    config: EngineConfig,
}

impl<S, C, N> TransferEngine<S, C, N>
where
    S: StockStore + WarehouseCatalog,
    C: RankingCache,
    N: Notifier,
{
    /// Wires an engine. Change notifications go to
    /// `config.notification_topic` through `notifier`.
    pub fn new(store: S, cache: C, notifier: N, config: EngineConfig) -> Self {
        let notifier = ChangeNotifier::with_topic(notifier, config.notification_topic.clone());
        Self {
            store,
            cache,
            notifier,
            config,
        }
    }

    /// The stock store transfers run against.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The ranking cache read when ranking is cached.
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Publisher for quantity changes.
    pub const fn notifier(&self) -> &ChangeNotifier<N> {
        &self.notifier
    }

    /// Retry, ranking and topic settings.
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Moves stock of one product from one warehouse to another.
    ///
    /// The total quantity of the product does not change, so no change
    /// notification is published and `notified` is always true.
    #[instrument(
        name = "engine.move_in",
        skip(self, request),
        fields(
            product_id = %request.product_id,
            from = %request.from,
            to = %request.to,
            quantity = %request.quantity
        )
    )]
    pub async fn move_in(&self, request: MoveInRequest) -> Result<TransferResult, TransferError> {
        if request.from == request.to {
            return Err(TransferError::InvalidInput(format!(
                "source and destination warehouse are both {}",
                request.from
            )));
        }

        let request = &request;
        let movement = self
            .with_retry(MOVE_IN, move || self.try_move_in(request))
            .await?;

        info!("[engine.move_in] transfer committed");
        Ok(TransferResult {
            committed: true,
            notified: true,
            movements: vec![movement],
            warnings: Vec::new(),
        })
    }

    /// Ships an order to a customer, sourcing every line from the warehouses
    /// nearest to the destination zip.
    #[instrument(
        name = "engine.move_out",
        skip(self, request),
        fields(
            user_id = %request.user_id,
            destination_zip = %request.destination_zip,
            items = request.items.len()
        )
    )]
    pub async fn move_out(&self, request: MoveOutRequest) -> Result<TransferResult, TransferError> {
        if request.items.is_empty() {
            return Err(TransferError::InvalidInput(
                "move-out needs at least one item".to_string(),
            ));
        }

        let request = &request;
        let (movements, mut warnings) = self
            .with_retry(MOVE_OUT, move || self.try_move_out(request))
            .await?;

        info!(
            movements = movements.len(),
            "[engine.move_out] transfer committed"
        );

        let mut products: Vec<ProductId> = Vec::new();
        for item in &request.items {
            if !products.contains(&item.product_id) {
                products.push(item.product_id);
            }
        }

        let mut notified = true;
        for product_id in products {
            if let Some(warning) = self.publish_new_total(product_id).await {
                notified = false;
                warnings.push(warning);
            }
        }

        Ok(TransferResult {
            committed: true,
            notified,
            movements,
            warnings,
        })
    }

    /// Zip code of the nearest warehouse currently holding the product.
    #[instrument(name = "engine.nearest_warehouse_zip", skip(self))]
    pub async fn nearest_warehouse_zip(
        &self,
        product_id: ProductId,
        zip: &ZipCode,
    ) -> Result<Option<ZipCode>, TransferError> {
        let candidates: Vec<AllocationCandidate> = self
            .store
            .stock_by_product(product_id)
            .await
            .map_err(|e| TransferError::from_store(QUERY, e))?
            .into_iter()
            .filter(|stock| stock.quantity > 0)
            .map(AllocationCandidate::from)
            .collect();

        Ok(allocation::nearest_warehouse_for_zip(zip, &candidates))
    }

    /// Ledger entries for audit queries.
    pub async fn movement_history(
        &self,
        query: MovementQuery,
    ) -> Result<Vec<StockMovement>, TransferError> {
        self.store
            .movements(query)
            .await
            .map_err(|e| TransferError::from_store(QUERY, e))
    }

    /// Sum of the product's quantity over every warehouse.
    pub async fn total_quantity(&self, product_id: ProductId) -> Result<i64, TransferError> {
        self.store
            .total_quantity(product_id)
            .await
            .map_err(|e| TransferError::from_store(QUERY, e))
    }

    async fn try_move_in(&self, request: &MoveInRequest) -> Result<StockMovement, TransferError> {
        let destination = self
            .store
            .warehouse(request.to)
            .await
            .map_err(|e| TransferError::from_store(MOVE_IN, e))?;
        if destination.is_none_or(|w| w.is_deleted()) {
            return Err(TransferError::NotFound(format!(
                "destination warehouse {}",
                request.to
            )));
        }

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| TransferError::from_store(MOVE_IN, e))?;

        match apply_move_in(&mut tx, request, Timestamp::now()).await {
            Ok(movement) => {
                tx.commit()
                    .await
                    .map_err(|e| TransferError::from_store(MOVE_IN, e))?;
                Ok(movement)
            }
            Err(error) => Err(abort(tx, MOVE_IN, error).await),
        }
    }

    async fn try_move_out(
        &self,
        request: &MoveOutRequest,
    ) -> Result<(Vec<StockMovement>, Vec<TransferWarning>), TransferError> {
        // Every read happens before the transaction opens, so a request
        // never holds a store connection while waiting for another one.
        let (plan, warnings) = self.plan_move_out(request).await?;

        let mut tx = self
            .store
            .begin()
            .await
            .map_err(|e| TransferError::from_store(MOVE_OUT, e))?;

        match apply_move_out(&mut tx, &plan, request.user_id, Timestamp::now()).await {
            Ok(movements) => {
                tx.commit()
                    .await
                    .map_err(|e| TransferError::from_store(MOVE_OUT, e))?;
                Ok((movements, warnings))
            }
            Err(error) => Err(abort(tx, MOVE_OUT, error).await),
        }
    }

    /// Allocates every line from unlocked reads. The locked-row check in
    /// [`apply_move_out`] is what guards against stock that moved since.
    async fn plan_move_out(
        &self,
        request: &MoveOutRequest,
    ) -> Result<(Vec<PlannedShipment>, Vec<TransferWarning>), TransferError> {
        let store_error = |e: StockStoreError| TransferError::from_store(MOVE_OUT, e);
        // Units already taken by earlier lines of this request.
        let mut consumed: HashMap<(ProductId, WarehouseId), i64> = HashMap::new();
        let mut plan = Vec::new();
        let mut warnings = Vec::new();

        for item in &request.items {
            let already_taken: i64 = consumed
                .iter()
                .filter(|((product_id, _), _)| *product_id == item.product_id)
                .map(|(_, taken)| taken)
                .sum();
            let total = self
                .store
                .total_quantity(item.product_id)
                .await
                .map_err(store_error)?
                - already_taken;
            if total < item.quantity.get() {
                return Err(TransferError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: total,
                });
            }

            let candidates: Vec<AllocationCandidate> = self
                .store
                .stock_by_product(item.product_id)
                .await
                .map_err(store_error)?
                .into_iter()
                .map(|stock| {
                    let taken = consumed
                        .get(&(item.product_id, stock.warehouse_id))
                        .copied()
                        .unwrap_or(0);
                    let mut candidate = AllocationCandidate::from(stock);
                    candidate.available -= taken;
                    candidate
                })
                .collect();

            let allocation = self
                .allocate(&request.destination_zip, &candidates, item.quantity, &mut warnings)
                .await
                .map_err(|AllocationError::InsufficientStock { requested, available }| {
                    TransferError::InsufficientStock {
                        product_id: item.product_id,
                        requested,
                        available,
                    }
                })?;
            debug!(
                product_id = %item.product_id,
                warehouses = allocation.len(),
                "[engine.move_out] line allocated"
            );

            for (warehouse_id, quantity) in allocation {
                *consumed.entry((item.product_id, warehouse_id)).or_insert(0) += quantity.get();
                plan.push(PlannedShipment {
                    product_id: item.product_id,
                    warehouse_id,
                    quantity,
                });
            }
        }

        Ok((plan, warnings))
    }

    async fn allocate(
        &self,
        destination: &ZipCode,
        candidates: &[AllocationCandidate],
        requested: Quantity,
        warnings: &mut Vec<TransferWarning>,
    ) -> Result<Allocation, AllocationError> {
        match self.config.ranking {
            RankingMode::Computed => allocation::allocate(destination, candidates, requested),
            RankingMode::Cached => match self.cache.nearest_warehouses(destination).await {
                Ok(ranking) if ranking.is_empty() => {
                    allocation::allocate(destination, candidates, requested)
                }
                Ok(ranking) => allocation::allocate_in_order(
                    &order_by_ranking(&ranking, destination, candidates),
                    requested,
                ),
                Err(error) => {
                    warn!(
                        error = %error,
                        "[engine.move_out] ranking cache unavailable, allocating unranked"
                    );
                    warnings.push(TransferWarning::RankingDegraded { error });
                    allocation::allocate_in_order(candidates, requested)
                }
            },
        }
    }

    async fn publish_new_total(&self, product_id: ProductId) -> Option<TransferWarning> {
        let total = match self.store.total_quantity(product_id).await {
            Ok(total) => total,
            Err(error) => {
                warn!(
                    product_id = %product_id,
                    error = %error,
                    "[engine.move_out] could not read new total, skipping notification"
                );
                return Some(TransferWarning::TotalUnavailable { product_id, error });
            }
        };

        self.notifier
            .notify_quantity_changed(product_id, total)
            .await
            .err()
            .map(|error| TransferWarning::NotificationFailed { product_id, error })
    }

    async fn with_retry<T, F, Fut>(&self, request: &'static str, mut attempt: F) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        let max_attempts = u32::from(self.config.retry.max_attempts);
        let mut tries = 0;
        loop {
            match attempt().await {
                Err(error) if error.is_retryable() && tries + 1 < max_attempts => {
                    let delay = with_jitter(self.config.retry.delay_for_attempt(tries));
                    tries += 1;
                    warn!(
                        request,
                        attempt = tries,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "[engine.retry] transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }
}

async fn apply_move_in<T: StockTransaction>(
    tx: &mut T,
    request: &MoveInRequest,
    at: Timestamp,
) -> Result<StockMovement, TransferError> {
    let store_error = |e: StockStoreError| TransferError::from_store(MOVE_IN, e);

    let source = tx
        .lock_stock_row(request.product_id, request.from)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            TransferError::NotFound(format!(
                "product {} is not stocked in warehouse {}",
                request.product_id, request.from
            ))
        })?;
    if !source.covers(request.quantity) {
        return Err(TransferError::InsufficientStock {
            product_id: request.product_id,
            requested: request.quantity,
            available: source.quantity(),
        });
    }

    // Absence of a destination row is fine; increment_or_create inserts it.
    tx.lock_stock_row(request.product_id, request.to)
        .await
        .map_err(store_error)?;

    tx.decrement_quantity(&source, request.quantity, at)
        .await
        .map_err(store_error)?;
    tx.increment_or_create(
        request.product_id,
        request.to,
        source.product_name(),
        request.quantity,
        at,
    )
    .await
    .map_err(store_error)?;

    let movement = StockMovement {
        id: MovementId::generate(),
        product_id: request.product_id,
        product_name: source.product_name().clone(),
        quantity: request.quantity,
        source: request.from,
        destination: MovementDestination::Warehouse(request.to),
        created_at: at,
    };
    tx.append_movement(&movement).await.map_err(store_error)?;
    Ok(movement)
}

/// One warehouse's share of a move-out line.
#[derive(Debug, Clone, Copy)]
struct PlannedShipment {
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity: Quantity,
}

async fn apply_move_out<T: StockTransaction>(
    tx: &mut T,
    plan: &[PlannedShipment],
    user_id: UserId,
    at: Timestamp,
) -> Result<Vec<StockMovement>, TransferError> {
    let mut movements = Vec::with_capacity(plan.len());
    for shipment in plan {
        movements.push(
            ship_from(
                tx,
                shipment.product_id,
                shipment.warehouse_id,
                shipment.quantity,
                user_id,
                at,
            )
            .await?,
        );
    }
    Ok(movements)
}

async fn ship_from<T: StockTransaction>(
    tx: &mut T,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity: Quantity,
    user_id: UserId,
    at: Timestamp,
) -> Result<StockMovement, TransferError> {
    let store_error = |e: StockStoreError| TransferError::from_store(MOVE_OUT, e);

    // The allocation was computed from unlocked reads; only the locked row
    // is authoritative.
    let row = tx
        .lock_stock_row(product_id, warehouse_id)
        .await
        .map_err(store_error)?;
    let row = match row {
        Some(row) if row.covers(quantity) => row,
        other => {
            return Err(TransferError::InsufficientStock {
                product_id,
                requested: quantity,
                available: other.map_or(0, |row| row.quantity()),
            });
        }
    };

    tx.decrement_quantity(&row, quantity, at)
        .await
        .map_err(store_error)?;

    let movement = StockMovement {
        id: MovementId::generate(),
        product_id,
        product_name: row.product_name().clone(),
        quantity,
        source: warehouse_id,
        destination: MovementDestination::User(user_id),
        created_at: at,
    };
    tx.append_movement(&movement).await.map_err(store_error)?;
    Ok(movement)
}

async fn abort<T: StockTransaction>(tx: T, request: &'static str, error: TransferError) -> TransferError {
    if let Err(rollback_error) = tx.rollback().await {
        warn!(
            request,
            error = %rollback_error,
            "[engine.rollback] rollback failed, transaction dropped"
        );
    }
    debug!(request, error = %error, "[engine.rollback] transfer rolled back");
    error
}

fn with_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::rng().random_range(0.5..=1.0);
    delay.mul_f64(factor)
}
