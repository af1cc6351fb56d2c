//! Row locking, retries and cancellation under concurrent transfers.

mod common;

use std::time::Duration;

use futures::future::join_all;
use stockcore::{
    MovementQuery, ProductId, StockStore, StockTransaction, TransferEngine, TransferError,
};
use stockcore_memory::{InMemoryStockStore, MemoryStoreConfig};
use stockcore_testing::chaos::{ChaosConfig, ChaosStockStoreExt};
use tokio::sync::oneshot;

use crate::common::{Harness, fast_retry, order, transfer};

fn short_lock_waits() -> Harness {
    Harness::with_store(InMemoryStockStore::with_config(MemoryStoreConfig {
        lock_timeout: Duration::from_millis(50),
    }))
}

#[tokio::test]
async fn developer_observes_lock_timeout_retried_until_row_frees() {
    // Given: another transaction holds the only stocked row for 80ms
    let harness = short_lock_waits();
    let a = harness.warehouse("10010").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    let (locked_tx, locked_rx) = oneshot::channel();

    let store = harness.store.clone();
    let held = a.id;
    let holder = async move {
        let mut tx = store.begin().await.expect("begin");
        let _ = tx.lock_stock_row(product, held).await.expect("lock");
        locked_tx.send(()).expect("signal");
        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.rollback().await.expect("rollback");
    };

    // When: an order for that row arrives while the lock is held
    let engine = harness.engine_with(fast_retry(5));
    let engine = &engine;
    let shipper = async move {
        locked_rx.await.expect("holder locked the row");
        engine.move_out(order(&[(product, 2)], "10010")).await
    };
    let ((), result) = tokio::join!(holder, shipper);

    // Then: the first attempt times out and a later one goes through
    let result = result.expect("retried move out");
    assert!(result.committed);
    assert_eq!(harness.on_hand(product, a.id).await, 3);
}

#[tokio::test]
async fn developer_observes_persistent_lock_timeouts_surface_after_retries() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    let engine = TransferEngine::new(
        harness
            .store
            .clone()
            .with_chaos(ChaosConfig::deterministic().with_lock_timeout_probability(1.0)),
        harness.cache.clone(),
        harness.notifier.clone(),
        fast_retry(3),
    );

    let result = engine.move_out(order(&[(product, 2)], "10010")).await;

    assert!(matches!(result, Err(TransferError::LockTimeout { .. })));
    assert_eq!(harness.on_hand(product, a.id).await, 5);
    assert!(harness.notifier.published().is_empty());
}

#[tokio::test]
async fn developer_observes_commit_conflict_rolls_back_everything() {
    // Given: every commit is rejected by the store
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    let engine = TransferEngine::new(
        harness
            .store
            .clone()
            .with_chaos(ChaosConfig::deterministic().with_conflict_probability(1.0)),
        harness.cache.clone(),
        harness.notifier.clone(),
        fast_retry(2),
    );

    // When: stock is moved between warehouses
    let result = engine.move_in(transfer(product, a.id, b.id, 4)).await;

    // Then: the conflict is reported and neither row nor ledger changed
    assert!(matches!(
        result,
        Err(TransferError::TransactionConflict { .. })
    ));
    assert_eq!(harness.on_hand(product, a.id).await, 5);
    assert!(harness.store_row(product, b.id).await.is_none());
    let ledger = harness
        .engine()
        .movement_history(MovementQuery::All)
        .await
        .expect("ledger");
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn developer_observes_cancelled_transfer_leaves_no_locks_behind() {
    // Given: a row held by another transaction
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    let engine = harness.engine();
    let mut holder = harness.store.begin().await.expect("begin");
    let _ = holder.lock_stock_row(product, a.id).await.expect("lock");

    // When: the caller gives up on a blocked order
    let cancelled = tokio::time::timeout(
        Duration::from_millis(30),
        engine.move_out(order(&[(product, 2)], "10010")),
    )
    .await;
    assert!(cancelled.is_err());
    holder.rollback().await.expect("rollback");

    // Then: the next order gets the row at once and the first left no trace
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        engine.move_out(order(&[(product, 1)], "10010")),
    )
    .await
    .expect("row was released")
    .expect("move out");
    assert_eq!(result.movements.len(), 1);
    assert_eq!(harness.on_hand(product, a.id).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn developer_observes_concurrent_orders_never_oversell() {
    // Given: 8 units over two warehouses
    let harness = short_lock_waits();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    harness.stock(product, b.id, 3).await;
    let engine = harness.engine_with(fast_retry(10));

    // When: 20 customers race for one unit each
    let results = join_all(
        (0..20).map(|_| engine.move_out(order(&[(product, 1)], "10011"))),
    )
    .await;

    // Then: at most 8 succeed and the books balance
    let shipped = results.iter().filter(|r| r.is_ok()).count();
    assert!(shipped >= 1);
    assert!(shipped <= 8);
    for failure in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            failure,
            TransferError::InsufficientStock { .. } | TransferError::LockTimeout { .. }
        ));
    }
    let remaining = engine.total_quantity(product).await.expect("total");
    assert_eq!(remaining, 8 - i64::try_from(shipped).expect("small count"));
    assert!(harness.on_hand(product, a.id).await >= 0);
    assert!(harness.on_hand(product, b.id).await >= 0);
    let ledger = engine
        .movement_history(MovementQuery::Product(product))
        .await
        .expect("ledger");
    assert_eq!(ledger.len(), shipped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn developer_observes_opposing_transfers_conserve_stock() {
    // Given: two warehouses swapping the same product in both directions
    let harness = short_lock_waits();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 10).await;
    harness.stock(product, b.id, 10).await;
    let engine = harness.engine_with(fast_retry(10));

    // When: they run at the same time
    let results = join_all((0..10).map(|n| {
        let request = if n % 2 == 0 {
            transfer(product, a.id, b.id, 1)
        } else {
            transfer(product, b.id, a.id, 1)
        };
        engine.move_in(request)
    }))
    .await;

    // Then: crossed lock orders at worst time out; units are never lost
    for result in &results {
        assert!(matches!(
            result,
            Ok(_) | Err(TransferError::LockTimeout { .. })
        ));
    }
    let moved = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(engine.total_quantity(product).await.expect("total"), 20);
    let ledger = engine
        .movement_history(MovementQuery::Product(product))
        .await
        .expect("ledger");
    assert_eq!(ledger.len(), moved);
}
