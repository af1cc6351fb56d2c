//! Builders for test data.
//!
//! These panic on invalid literals; they are meant for test code only.

use stockcore::{
    MovementDestination, MovementId, NewWarehouse, ProductId, ProductName, Quantity,
    StockMovement, StockStore, StockStoreError, StockTransaction, Timestamp, Warehouse,
    WarehouseId, ZipCode,
};

pub fn zip(raw: &str) -> ZipCode {
    ZipCode::try_new(raw).expect("fixture zip code must be valid")
}

pub fn quantity(value: i64) -> Quantity {
    Quantity::try_new(value).expect("fixture quantity must be positive")
}

pub fn product_name(raw: &str) -> ProductName {
    ProductName::try_new(raw).expect("fixture product name must be valid")
}

/// Registration input for a warehouse named after its zip.
pub fn new_warehouse(zip_code: &str, is_main: bool) -> NewWarehouse {
    NewWarehouse {
        name: format!("Warehouse {zip_code}"),
        street: "1 Dock Road".to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip_code: zip(zip_code),
        is_main,
    }
}

/// A fully stamped warehouse record ready for `save_warehouse`.
pub fn warehouse(zip_code: &str) -> Warehouse {
    new_warehouse(zip_code, false).into_warehouse(Timestamp::now())
}

pub fn main_warehouse(zip_code: &str) -> Warehouse {
    new_warehouse(zip_code, true).into_warehouse(Timestamp::now())
}

/// Puts `amount` units of `product_id` into a warehouse in its own
/// committed transaction.
pub async fn stock_up<S: StockStore>(
    store: &S,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    name: &ProductName,
    amount: i64,
) -> Result<(), StockStoreError> {
    let mut tx = store.begin().await?;
    tx.increment_or_create(product_id, warehouse_id, name, quantity(amount), Timestamp::now())
        .await?;
    tx.commit().await
}

pub fn movement(
    product_id: ProductId,
    source: WarehouseId,
    destination: MovementDestination,
    amount: i64,
) -> StockMovement {
    StockMovement {
        id: MovementId::generate(),
        product_id,
        product_name: product_name("Fixture Widget"),
        quantity: quantity(amount),
        source,
        destination,
        created_at: Timestamp::now(),
    }
}
