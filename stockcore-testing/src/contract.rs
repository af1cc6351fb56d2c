//! Behavioural contracts for storage and ranking backends.
//!
//! Every scenario takes a `make_store` (or `make_cache`) factory and expects
//! each call to return an empty backend. Scenarios report failures as values
//! rather than panicking so the generated tests can name the scenario that
//! broke.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use stockcore::{
    Distance, MovementDestination, MovementId, MovementQuery, ProductId, RankingCache,
    RankingCacheError, StockStore, StockStoreError, StockTransaction, Timestamp, UserId,
    Warehouse, WarehouseCatalog, WarehouseId, ZipCode,
};

use crate::fixtures;

#[derive(Debug)]
pub struct ContractTestFailure {
    scenario: &'static str,
    detail: String,
}

impl ContractTestFailure {
    fn new(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self {
            scenario,
            detail: detail.into(),
        }
    }

    fn store_error(scenario: &'static str, operation: &'static str, error: StockStoreError) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }

    fn cache_error(
        scenario: &'static str,
        operation: &'static str,
        error: RankingCacheError,
    ) -> Self {
        Self::new(
            scenario,
            format!("{operation} operation returned unexpected error: {error}"),
        )
    }

    fn assertion(scenario: &'static str, detail: impl Into<String>) -> Self {
        Self::new(scenario, detail)
    }
}

impl fmt::Display for ContractTestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.scenario, self.detail)
    }
}

impl std::error::Error for ContractTestFailure {}

pub type ContractTestResult = Result<(), ContractTestFailure>;

fn store_step<T>(
    scenario: &'static str,
    operation: &'static str,
    result: Result<T, StockStoreError>,
) -> Result<T, ContractTestFailure> {
    result.map_err(|error| ContractTestFailure::store_error(scenario, operation, error))
}

fn cache_step<T>(
    scenario: &'static str,
    operation: &'static str,
    result: Result<T, RankingCacheError>,
) -> Result<T, ContractTestFailure> {
    result.map_err(|error| ContractTestFailure::cache_error(scenario, operation, error))
}

fn expect_eq<T: PartialEq + fmt::Debug>(
    scenario: &'static str,
    what: &str,
    expected: T,
    observed: T,
) -> ContractTestResult {
    if expected == observed {
        Ok(())
    } else {
        Err(ContractTestFailure::assertion(
            scenario,
            format!("{what}: expected {expected:?}, observed {observed:?}"),
        ))
    }
}

async fn seed_warehouse<S: WarehouseCatalog>(
    scenario: &'static str,
    store: &S,
    zip_code: &str,
) -> Result<Warehouse, ContractTestFailure> {
    let warehouse = fixtures::warehouse(zip_code);
    store_step(scenario, "save_warehouse", store.save_warehouse(&warehouse).await)?;
    Ok(warehouse)
}

async fn seed_stock<S: StockStore>(
    scenario: &'static str,
    store: &S,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    amount: i64,
) -> ContractTestResult {
    let name = fixtures::product_name("Contract Widget");
    store_step(
        scenario,
        "increment_or_create",
        fixtures::stock_up(store, product_id, warehouse_id, &name, amount).await,
    )
}

async fn total<S: StockStore>(
    scenario: &'static str,
    store: &S,
    product_id: ProductId,
) -> Result<i64, ContractTestFailure> {
    store_step(scenario, "total_quantity", store.total_quantity(product_id).await)
}

pub async fn test_missing_row_is_not_locked<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "missing_row_is_not_locked";

    let store = make_store();
    let warehouse = seed_warehouse(SCENARIO, &store, "10001").await?;

    let mut tx = store_step(SCENARIO, "begin", store.begin().await)?;
    let locked = store_step(
        SCENARIO,
        "lock_stock_row",
        tx.lock_stock_row(ProductId::generate(), warehouse.id).await,
    )?;
    store_step(SCENARIO, "rollback", tx.rollback().await)?;

    match locked {
        None => Ok(()),
        Some(row) => Err(ContractTestFailure::assertion(
            SCENARIO,
            format!("expected no row for an unstocked product, locked {row:?}"),
        )),
    }
}

pub async fn test_increment_or_create_accumulates<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "increment_or_create_accumulates";

    let store = make_store();
    let warehouse = seed_warehouse(SCENARIO, &store, "10001").await?;
    let product = ProductId::generate();

    seed_stock(SCENARIO, &store, product, warehouse.id, 4).await?;
    seed_stock(SCENARIO, &store, product, warehouse.id, 6).await?;

    let rows = store_step(
        SCENARIO,
        "stock_rows_by_product",
        store.stock_rows_by_product(product).await,
    )?;
    expect_eq(SCENARIO, "stock rows for the product", 1, rows.len())?;
    expect_eq(SCENARIO, "row quantity", 10, rows[0].quantity)?;
    expect_eq(SCENARIO, "row warehouse", warehouse.id, rows[0].warehouse_id)?;

    let by_warehouse = store_step(
        SCENARIO,
        "stock_rows_by_warehouse",
        store.stock_rows_by_warehouse(warehouse.id).await,
    )?;
    expect_eq(SCENARIO, "stock rows for the warehouse", 1, by_warehouse.len())?;

    expect_eq(SCENARIO, "total quantity", 10, total(SCENARIO, &store, product).await?)
}

pub async fn test_uncommitted_writes_are_private<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "uncommitted_writes_are_private";

    let store = make_store();
    let warehouse = seed_warehouse(SCENARIO, &store, "10001").await?;
    let product = ProductId::generate();
    seed_stock(SCENARIO, &store, product, warehouse.id, 5).await?;

    let mut tx = store_step(SCENARIO, "begin", store.begin().await)?;
    let row = store_step(
        SCENARIO,
        "lock_stock_row",
        tx.lock_stock_row(product, warehouse.id).await,
    )?
    .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row was not found"))?;
    store_step(
        SCENARIO,
        "decrement_quantity",
        tx.decrement_quantity(&row, fixtures::quantity(2), Timestamp::now())
            .await,
    )?;

    expect_eq(
        SCENARIO,
        "total before commit",
        5,
        total(SCENARIO, &store, product).await?,
    )?;

    store_step(SCENARIO, "commit", tx.commit().await)?;

    expect_eq(
        SCENARIO,
        "total after commit",
        3,
        total(SCENARIO, &store, product).await?,
    )
}

pub async fn test_rollback_discards_writes<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "rollback_discards_writes";

    let store = make_store();
    let source = seed_warehouse(SCENARIO, &store, "10001").await?;
    let destination = seed_warehouse(SCENARIO, &store, "10050").await?;
    let product = ProductId::generate();
    seed_stock(SCENARIO, &store, product, source.id, 5).await?;

    let mut tx = store_step(SCENARIO, "begin", store.begin().await)?;
    let row = store_step(
        SCENARIO,
        "lock_stock_row",
        tx.lock_stock_row(product, source.id).await,
    )?
    .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row was not found"))?;
    store_step(
        SCENARIO,
        "decrement_quantity",
        tx.decrement_quantity(&row, fixtures::quantity(2), Timestamp::now())
            .await,
    )?;
    store_step(
        SCENARIO,
        "increment_or_create",
        tx.increment_or_create(
            product,
            destination.id,
            row.product_name(),
            fixtures::quantity(2),
            Timestamp::now(),
        )
        .await,
    )?;
    let movement = fixtures::movement(
        product,
        source.id,
        MovementDestination::Warehouse(destination.id),
        2,
    );
    store_step(SCENARIO, "append_movement", tx.append_movement(&movement).await)?;
    store_step(SCENARIO, "rollback", tx.rollback().await)?;

    expect_eq(SCENARIO, "total", 5, total(SCENARIO, &store, product).await?)?;

    let created = store_step(
        SCENARIO,
        "stock_row",
        store.stock_row(product, destination.id).await,
    )?;
    if created.is_some() {
        return Err(ContractTestFailure::assertion(
            SCENARIO,
            "destination row survived a rollback",
        ));
    }

    let ledger = store_step(
        SCENARIO,
        "movements",
        store.movements(MovementQuery::Product(product)).await,
    )?;
    expect_eq(SCENARIO, "ledger entries", 0, ledger.len())
}

pub async fn test_dropped_transaction_releases_locks<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "dropped_transaction_releases_locks";

    let store = make_store();
    let warehouse = seed_warehouse(SCENARIO, &store, "10001").await?;
    let product = ProductId::generate();
    seed_stock(SCENARIO, &store, product, warehouse.id, 5).await?;

    {
        let mut abandoned = store_step(SCENARIO, "begin", store.begin().await)?;
        let row = store_step(
            SCENARIO,
            "lock_stock_row",
            abandoned.lock_stock_row(product, warehouse.id).await,
        )?
        .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row was not found"))?;
        store_step(
            SCENARIO,
            "decrement_quantity",
            abandoned
                .decrement_quantity(&row, fixtures::quantity(5), Timestamp::now())
                .await,
        )?;
    }

    let relock = async {
        let mut tx = store.begin().await?;
        let row = tx.lock_stock_row(product, warehouse.id).await?;
        tx.rollback().await?;
        Ok::<_, StockStoreError>(row)
    };
    let row = tokio::time::timeout(Duration::from_secs(10), relock)
        .await
        .map_err(|_| {
            ContractTestFailure::assertion(SCENARIO, "row stayed locked after the drop")
        })?;
    let row = store_step(SCENARIO, "lock_stock_row", row)?
        .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row vanished"))?;

    expect_eq(SCENARIO, "quantity after drop", 5, row.quantity())
}

pub async fn test_row_lock_serializes_writers<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "row_lock_serializes_writers";

    let store = make_store();
    let warehouse = seed_warehouse(SCENARIO, &store, "10001").await?;
    let product = ProductId::generate();
    seed_stock(SCENARIO, &store, product, warehouse.id, 10).await?;

    let mut first = store_step(SCENARIO, "begin", store.begin().await)?;
    let held = store_step(
        SCENARIO,
        "lock_stock_row",
        first.lock_stock_row(product, warehouse.id).await,
    )?
    .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row was not found"))?;

    let waiter = async {
        let mut second = store.begin().await?;
        let seen = second.lock_stock_row(product, warehouse.id).await?;
        second.rollback().await?;
        Ok::<_, StockStoreError>(seen)
    };
    let holder = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        first
            .decrement_quantity(&held, fixtures::quantity(3), Timestamp::now())
            .await?;
        first.commit().await
    };

    let (seen, committed) = tokio::join!(waiter, holder);
    store_step(SCENARIO, "commit", committed)?;
    let seen = store_step(SCENARIO, "lock_stock_row", seen)?
        .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "seeded row vanished"))?;

    expect_eq(
        SCENARIO,
        "quantity seen by the waiting writer",
        7,
        seen.quantity(),
    )
}

pub async fn test_ledger_queries<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "ledger_queries";

    let store = make_store();
    let a = seed_warehouse(SCENARIO, &store, "10001").await?;
    let b = seed_warehouse(SCENARIO, &store, "10050").await?;
    let product = ProductId::generate();
    let other_product = ProductId::generate();
    let user = UserId::generate();

    let transfer = fixtures::movement(product, a.id, MovementDestination::Warehouse(b.id), 2);
    let shipment = fixtures::movement(product, b.id, MovementDestination::User(user), 1);
    let other = fixtures::movement(other_product, a.id, MovementDestination::User(user), 4);

    let mut tx = store_step(SCENARIO, "begin", store.begin().await)?;
    for movement in [&transfer, &shipment, &other] {
        store_step(SCENARIO, "append_movement", tx.append_movement(movement).await)?;
    }
    store_step(SCENARIO, "commit", tx.commit().await)?;

    let ids = |movements: Vec<stockcore::StockMovement>| -> BTreeSet<MovementId> {
        movements.into_iter().map(|m| m.id).collect()
    };

    let cases = [
        (
            "by product",
            MovementQuery::Product(product),
            BTreeSet::from([transfer.id, shipment.id]),
        ),
        (
            "by source",
            MovementQuery::Source(a.id),
            BTreeSet::from([transfer.id, other.id]),
        ),
        (
            "by destination warehouse",
            MovementQuery::DestinationWarehouse(b.id),
            BTreeSet::from([transfer.id]),
        ),
        (
            "by destination user",
            MovementQuery::DestinationUser(user),
            BTreeSet::from([shipment.id, other.id]),
        ),
        (
            "all",
            MovementQuery::All,
            BTreeSet::from([transfer.id, shipment.id, other.id]),
        ),
    ];

    for (what, query, expected) in cases {
        let observed = store_step(SCENARIO, "movements", store.movements(query).await)?;
        expect_eq(SCENARIO, what, expected, ids(observed))?;
    }

    let shipped = store_step(
        SCENARIO,
        "movements",
        store.movements(MovementQuery::DestinationUser(user)).await,
    )?;
    let stored = shipped
        .iter()
        .find(|m| m.id == shipment.id)
        .ok_or_else(|| ContractTestFailure::assertion(SCENARIO, "shipment not in ledger"))?;
    expect_eq(SCENARIO, "destination", shipment.destination, stored.destination)?;
    expect_eq(SCENARIO, "quantity", shipment.quantity, stored.quantity)?;
    expect_eq(SCENARIO, "source", shipment.source, stored.source)
}

pub async fn test_stock_by_product_reports_zip_codes<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "stock_by_product_reports_zip_codes";

    let store = make_store();
    let near = seed_warehouse(SCENARIO, &store, "10001").await?;
    let far = seed_warehouse(SCENARIO, &store, "10050").await?;
    let mut closed = fixtures::warehouse("10002");
    closed.deleted_at = Some(Timestamp::now());
    store_step(SCENARIO, "save_warehouse", store.save_warehouse(&closed).await)?;

    let product = ProductId::generate();
    seed_stock(SCENARIO, &store, product, near.id, 3).await?;
    seed_stock(SCENARIO, &store, product, far.id, 4).await?;
    seed_stock(SCENARIO, &store, product, closed.id, 9).await?;

    let stock = store_step(
        SCENARIO,
        "stock_by_product",
        store.stock_by_product(product).await,
    )?;

    let observed: HashMap<WarehouseId, (ZipCode, i64)> = stock
        .into_iter()
        .map(|s| (s.warehouse_id, (s.zip_code, s.quantity)))
        .collect();
    let expected = HashMap::from([
        (near.id, (near.zip_code.clone(), 3)),
        (far.id, (far.zip_code.clone(), 4)),
    ]);
    expect_eq(SCENARIO, "stock of live warehouses", expected, observed)
}

pub async fn test_catalog_separates_main_warehouse<F, S>(make_store: F) -> ContractTestResult
where
    F: Fn() -> S + Send + Sync + Clone + 'static,
    S: StockStore + WarehouseCatalog + 'static,
{
    const SCENARIO: &str = "catalog_separates_main_warehouse";

    let store = make_store();
    let main = fixtures::main_warehouse("10000");
    store_step(SCENARIO, "save_warehouse", store.save_warehouse(&main).await)?;
    let first = seed_warehouse(SCENARIO, &store, "10001").await?;
    let second = seed_warehouse(SCENARIO, &store, "10050").await?;

    let found = store_step(SCENARIO, "main_warehouse", store.main_warehouse().await)?;
    expect_eq(SCENARIO, "main warehouse", Some(main.id), found.map(|w| w.id))?;

    let all: BTreeSet<WarehouseId> =
        store_step(SCENARIO, "warehouses", store.warehouses().await)?
            .into_iter()
            .map(|w| w.id)
            .collect();
    expect_eq(
        SCENARIO,
        "live warehouses",
        BTreeSet::from([main.id, first.id, second.id]),
        all,
    )?;

    let non_main: BTreeSet<WarehouseId> = store_step(
        SCENARIO,
        "non_main_warehouses",
        store.non_main_warehouses().await,
    )?
    .into_iter()
    .map(|w| w.id)
    .collect();
    expect_eq(
        SCENARIO,
        "non-main warehouses",
        BTreeSet::from([first.id, second.id]),
        non_main,
    )?;

    let second_main = fixtures::main_warehouse("10099");
    match store.save_warehouse(&second_main).await {
        Err(StockStoreError::ConstraintViolation { .. }) => Ok(()),
        Err(error) => Err(ContractTestFailure::store_error(
            SCENARIO,
            "save_warehouse",
            error,
        )),
        Ok(()) => Err(ContractTestFailure::assertion(
            SCENARIO,
            "a second live main warehouse was accepted",
        )),
    }
}

fn distances(entries: &[(&ZipCode, u64)]) -> HashMap<ZipCode, Distance> {
    entries
        .iter()
        .map(|(zip, d)| ((*zip).clone(), Distance::new(*d)))
        .collect()
}

async fn ranked_ids<C: RankingCache>(
    scenario: &'static str,
    cache: &C,
    zip: &ZipCode,
) -> Result<Vec<(WarehouseId, u64)>, ContractTestFailure> {
    Ok(
        cache_step(scenario, "nearest_warehouses", cache.nearest_warehouses(zip).await)?
            .into_iter()
            .map(|entry| (entry.warehouse_id, entry.distance.into_inner()))
            .collect(),
    )
}

pub async fn test_update_ranks_upserts<F, C>(make_cache: F) -> ContractTestResult
where
    F: Fn() -> C + Send + Sync + Clone + 'static,
    C: RankingCache + 'static,
{
    const SCENARIO: &str = "update_ranks_upserts";

    let cache = make_cache();
    let zip = fixtures::zip("10001");
    let warehouse = WarehouseId::generate();

    cache_step(
        SCENARIO,
        "update_ranks",
        cache
            .update_ranks(&zip, warehouse, &distances(&[(&zip, 40)]))
            .await,
    )?;
    cache_step(
        SCENARIO,
        "update_ranks",
        cache
            .update_ranks(&zip, warehouse, &distances(&[(&zip, 7)]))
            .await,
    )?;

    expect_eq(
        SCENARIO,
        "ranking after upsert",
        vec![(warehouse, 7)],
        ranked_ids(SCENARIO, &cache, &zip).await?,
    )
}

pub async fn test_rankings_order_by_distance_then_id<F, C>(make_cache: F) -> ContractTestResult
where
    F: Fn() -> C + Send + Sync + Clone + 'static,
    C: RankingCache + 'static,
{
    const SCENARIO: &str = "rankings_order_by_distance_then_id";

    let cache = make_cache();
    let zip = fixtures::zip("10001");
    let mut tied = [WarehouseId::generate(), WarehouseId::generate()];
    tied.sort();
    let far = WarehouseId::generate();
    let near = WarehouseId::generate();

    for (id, score) in [(far, 90), (tied[1], 30), (near, 2), (tied[0], 30)] {
        cache_step(
            SCENARIO,
            "update_ranks",
            cache
                .update_ranks(&zip, id, &distances(&[(&zip, score)]))
                .await,
        )?;
    }

    expect_eq(
        SCENARIO,
        "ranking order",
        vec![(near, 2), (tied[0], 30), (tied[1], 30), (far, 90)],
        ranked_ids(SCENARIO, &cache, &zip).await?,
    )
}

pub async fn test_unknown_zip_has_empty_ranking<F, C>(make_cache: F) -> ContractTestResult
where
    F: Fn() -> C + Send + Sync + Clone + 'static,
    C: RankingCache + 'static,
{
    const SCENARIO: &str = "unknown_zip_has_empty_ranking";

    let cache = make_cache();
    let ranking = ranked_ids(SCENARIO, &cache, &fixtures::zip("99999")).await?;
    expect_eq(SCENARIO, "ranking length", 0, ranking.len())
}

pub async fn test_copy_rankings_mirrors_scores<F, C>(make_cache: F) -> ContractTestResult
where
    F: Fn() -> C + Send + Sync + Clone + 'static,
    C: RankingCache + 'static,
{
    const SCENARIO: &str = "copy_rankings_mirrors_scores";

    let cache = make_cache();
    let home = fixtures::zip("10001");
    let away = fixtures::zip("10050");
    let retired = WarehouseId::generate();
    let replacement = WarehouseId::generate();

    cache_step(
        SCENARIO,
        "update_ranks",
        cache
            .update_ranks(&home, retired, &distances(&[(&home, 0), (&away, 49)]))
            .await,
    )?;
    cache_step(
        SCENARIO,
        "copy_rankings",
        cache.copy_rankings(retired, replacement).await,
    )?;

    let mut expected_home = vec![(retired, 0), (replacement, 0)];
    expected_home.sort_by_key(|(id, _)| *id);
    expect_eq(
        SCENARIO,
        "home ranking",
        expected_home,
        ranked_ids(SCENARIO, &cache, &home).await?,
    )?;

    let mut expected_away = vec![(retired, 49), (replacement, 49)];
    expected_away.sort_by_key(|(id, _)| *id);
    expect_eq(
        SCENARIO,
        "away ranking",
        expected_away,
        ranked_ids(SCENARIO, &cache, &away).await?,
    )
}

pub async fn test_clear_drops_every_ranking<F, C>(make_cache: F) -> ContractTestResult
where
    F: Fn() -> C + Send + Sync + Clone + 'static,
    C: RankingCache + 'static,
{
    const SCENARIO: &str = "clear_drops_every_ranking";

    let cache = make_cache();
    let zip = fixtures::zip("10001");
    cache_step(
        SCENARIO,
        "update_ranks",
        cache
            .update_ranks(&zip, WarehouseId::generate(), &distances(&[(&zip, 3)]))
            .await,
    )?;
    cache_step(SCENARIO, "clear", cache.clear().await)?;

    let ranking = ranked_ids(SCENARIO, &cache, &zip).await?;
    expect_eq(SCENARIO, "ranking length after clear", 0, ranking.len())
}

/// Expands the stock store contract into one `#[tokio::test]` per scenario.
///
/// `make_store` must build a fresh, empty store on every call. Pass
/// `ignore = "reason"` to mark every generated test ignored.
#[macro_export]
macro_rules! stock_store_contract_tests {
    (suite = $suite:ident, make_store = $make_store:expr $(, ignore = $reason:literal)? $(,)?) => {
        mod $suite {
            use super::*;
            use $crate::contract::{
                test_catalog_separates_main_warehouse, test_dropped_transaction_releases_locks,
                test_increment_or_create_accumulates, test_ledger_queries,
                test_missing_row_is_not_locked, test_rollback_discards_writes,
                test_row_lock_serializes_writers, test_stock_by_product_reports_zip_codes,
                test_uncommitted_writes_are_private,
            };

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn missing_row_is_not_locked_contract() {
                test_missing_row_is_not_locked($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn increment_or_create_accumulates_contract() {
                test_increment_or_create_accumulates($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn uncommitted_writes_are_private_contract() {
                test_uncommitted_writes_are_private($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn rollback_discards_writes_contract() {
                test_rollback_discards_writes($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn dropped_transaction_releases_locks_contract() {
                test_dropped_transaction_releases_locks($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn row_lock_serializes_writers_contract() {
                test_row_lock_serializes_writers($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn ledger_queries_contract() {
                test_ledger_queries($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn stock_by_product_reports_zip_codes_contract() {
                test_stock_by_product_reports_zip_codes($make_store)
                    .await
                    .expect("stock store contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn catalog_separates_main_warehouse_contract() {
                test_catalog_separates_main_warehouse($make_store)
                    .await
                    .expect("stock store contract failed");
            }
        }
    };
}

pub use stock_store_contract_tests;

/// Expands the ranking cache contract into one `#[tokio::test]` per
/// scenario. `make_cache` must build an empty cache on every call.
#[macro_export]
macro_rules! ranking_cache_contract_tests {
    (suite = $suite:ident, make_cache = $make_cache:expr $(, ignore = $reason:literal)? $(,)?) => {
        mod $suite {
            use super::*;
            use $crate::contract::{
                test_clear_drops_every_ranking, test_copy_rankings_mirrors_scores,
                test_rankings_order_by_distance_then_id, test_unknown_zip_has_empty_ranking,
                test_update_ranks_upserts,
            };

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn update_ranks_upserts_contract() {
                test_update_ranks_upserts($make_cache)
                    .await
                    .expect("ranking cache contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn rankings_order_by_distance_then_id_contract() {
                test_rankings_order_by_distance_then_id($make_cache)
                    .await
                    .expect("ranking cache contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn unknown_zip_has_empty_ranking_contract() {
                test_unknown_zip_has_empty_ranking($make_cache)
                    .await
                    .expect("ranking cache contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn copy_rankings_mirrors_scores_contract() {
                test_copy_rankings_mirrors_scores($make_cache)
                    .await
                    .expect("ranking cache contract failed");
            }

            #[tokio::test(flavor = "multi_thread")]
            $(#[ignore = $reason])?
            async fn clear_drops_every_ranking_contract() {
                test_clear_drops_every_ranking($make_cache)
                    .await
                    .expect("ranking cache contract failed");
            }
        }
    };
}

pub use ranking_cache_contract_tests;
