//! Inter-warehouse transfers through the engine.

mod common;

use stockcore::{MovementDestination, MovementQuery, ProductId, TransferError, WarehouseId};

use crate::common::{Harness, transfer};

#[tokio::test]
async fn developer_observes_units_moved_between_warehouses() {
    // Given: warehouse A holds 10 units and warehouse B holds none
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 10).await;
    let engine = harness.engine();

    // When: 4 units move from A to B
    let result = engine
        .move_in(transfer(product, a.id, b.id, 4))
        .await
        .expect("move in");

    // Then: A is down 4, B was created with 4, and the total is unchanged
    assert_eq!(harness.on_hand(product, a.id).await, 6);
    assert_eq!(harness.on_hand(product, b.id).await, 4);
    assert_eq!(engine.total_quantity(product).await.expect("total"), 10);

    // And: one ledger entry records the transfer
    assert!(result.committed);
    assert_eq!(result.movements.len(), 1);
    let movement = &result.movements[0];
    assert_eq!(movement.source, a.id);
    assert_eq!(movement.destination, MovementDestination::Warehouse(b.id));
    assert_eq!(movement.quantity.get(), 4);
}

#[tokio::test]
async fn developer_observes_move_in_publishes_no_notification() {
    // Given: stock in one warehouse
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 3).await;

    // When: the stock moves
    let result = harness
        .engine()
        .move_in(transfer(product, a.id, b.id, 3))
        .await
        .expect("move in");

    // Then: the transfer counts as notified but nothing was published
    assert!(result.notified);
    assert!(result.warnings.is_empty());
    assert!(harness.notifier.published().is_empty());
}

#[tokio::test]
async fn developer_observes_destination_row_named_after_source() {
    // Given: a product stocked under a name in A only
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 2).await;

    // When: it moves into B for the first time
    let _ = harness
        .engine()
        .move_in(transfer(product, a.id, b.id, 1))
        .await
        .expect("move in");

    // Then: the new row carries the source's product name
    let source_name = harness
        .store_row(product, a.id)
        .await
        .map(|row| row.product_name);
    let destination_name = harness
        .store_row(product, b.id)
        .await
        .map(|row| row.product_name);
    assert!(destination_name.is_some());
    assert_eq!(source_name, destination_name);
}

#[tokio::test]
async fn developer_observes_same_warehouse_transfer_rejected() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;

    let result = harness
        .engine()
        .move_in(transfer(product, a.id, a.id, 1))
        .await;

    assert!(matches!(result, Err(TransferError::InvalidInput(_))));
    assert_eq!(harness.on_hand(product, a.id).await, 5);
}

#[tokio::test]
async fn developer_observes_insufficient_source_leaves_everything_untouched() {
    // Given: A holds 3 units
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 3).await;
    let engine = harness.engine();

    // When: 5 units are requested
    let result = engine.move_in(transfer(product, a.id, b.id, 5)).await;

    // Then: the request fails with the available amount and nothing changed
    match result {
        Err(TransferError::InsufficientStock {
            product_id,
            requested,
            available,
        }) => {
            assert_eq!(product_id, product);
            assert_eq!(requested.get(), 5);
            assert_eq!(available, 3);
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(harness.on_hand(product, a.id).await, 3);
    assert_eq!(harness.on_hand(product, b.id).await, 0);
    let ledger = engine
        .movement_history(MovementQuery::Product(product))
        .await
        .expect("ledger");
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn developer_observes_unstocked_source_reported_as_not_found() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;

    let result = harness
        .engine()
        .move_in(transfer(ProductId::generate(), a.id, b.id, 1))
        .await;

    assert!(matches!(result, Err(TransferError::NotFound(_))));
}

#[tokio::test]
async fn developer_observes_unknown_destination_reported_as_not_found() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;

    let result = harness
        .engine()
        .move_in(transfer(product, a.id, WarehouseId::generate(), 1))
        .await;

    assert!(matches!(result, Err(TransferError::NotFound(_))));
    assert_eq!(harness.on_hand(product, a.id).await, 5);
}
