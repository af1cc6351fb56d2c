use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction, query};
use stockcore::{
    LockedRow, MovementDestination, MovementId, MovementQuery, Operation, ProductId, ProductName,
    Quantity, StockMovement, StockRowId, StockStore, StockStoreError, StockTransaction, Timestamp,
    UserId, Warehouse, WarehouseCatalog, WarehouseId, WarehouseProduct, WarehouseStock, ZipCode,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{PostgresStockStore, corrupted, map_sqlx_error};

const WAREHOUSE_COLUMNS: &str =
    "id, name, street, city, state, zip_code, is_main, created_at, updated_at, deleted_at";

const STOCK_COLUMNS: &str =
    "id, warehouse_id, product_id, product_name, quantity, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, product_name, quantity, source_warehouse_id, \
     destination_warehouse_id, destination_user_id, created_at";

fn column<'r, T>(row: &'r PgRow, name: &str, operation: Operation) -> Result<T, StockStoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|error| map_sqlx_error(error, operation))
}

fn timestamp(row: &PgRow, name: &str, operation: Operation) -> Result<Timestamp, StockStoreError> {
    column::<DateTime<Utc>>(row, name, operation).map(Timestamp::new)
}

fn product_name(row: &PgRow, operation: Operation) -> Result<ProductName, StockStoreError> {
    let raw: String = column(row, "product_name", operation)?;
    ProductName::try_new(raw).map_err(|error| corrupted(operation, error))
}

fn warehouse_from_row(row: &PgRow) -> Result<Warehouse, StockStoreError> {
    const OP: Operation = Operation::ReadWarehouses;
    let zip: String = column(row, "zip_code", OP)?;

    Ok(Warehouse {
        id: WarehouseId::new(column(row, "id", OP)?),
        name: column(row, "name", OP)?,
        street: column(row, "street", OP)?,
        city: column(row, "city", OP)?,
        state: column(row, "state", OP)?,
        zip_code: ZipCode::try_new(zip).map_err(|error| corrupted(OP, error))?,
        is_main: column(row, "is_main", OP)?,
        created_at: timestamp(row, "created_at", OP)?,
        updated_at: timestamp(row, "updated_at", OP)?,
        deleted_at: column::<Option<DateTime<Utc>>>(row, "deleted_at", OP)?.map(Timestamp::new),
    })
}

fn stock_from_row(row: &PgRow) -> Result<WarehouseProduct, StockStoreError> {
    const OP: Operation = Operation::ReadStock;

    Ok(WarehouseProduct {
        id: StockRowId::new(column(row, "id", OP)?),
        warehouse_id: WarehouseId::new(column(row, "warehouse_id", OP)?),
        product_id: ProductId::new(column(row, "product_id", OP)?),
        product_name: product_name(row, OP)?,
        quantity: column(row, "quantity", OP)?,
        created_at: timestamp(row, "created_at", OP)?,
        updated_at: timestamp(row, "updated_at", OP)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<StockMovement, StockStoreError> {
    const OP: Operation = Operation::ReadMovements;

    let to_warehouse: Option<Uuid> = column(row, "destination_warehouse_id", OP)?;
    let to_user: Option<Uuid> = column(row, "destination_user_id", OP)?;
    let destination = match (to_warehouse, to_user) {
        (Some(id), None) => MovementDestination::Warehouse(WarehouseId::new(id)),
        (None, Some(id)) => MovementDestination::User(UserId::new(id)),
        _ => return Err(corrupted(OP, "movement must have exactly one destination")),
    };
    let quantity: i64 = column(row, "quantity", OP)?;

    Ok(StockMovement {
        id: MovementId::new(column(row, "id", OP)?),
        product_id: ProductId::new(column(row, "product_id", OP)?),
        product_name: product_name(row, OP)?,
        quantity: Quantity::try_new(quantity).map_err(|error| corrupted(OP, error))?,
        source: WarehouseId::new(column(row, "source_warehouse_id", OP)?),
        destination,
        created_at: timestamp(row, "created_at", OP)?,
    })
}

fn millis(duration: std::time::Duration) -> String {
    format!("{}ms", duration.as_millis())
}

impl StockStore for PostgresStockStore {
    type Transaction = PostgresStockTransaction;

    #[instrument(name = "postgres.begin", skip(self))]
    async fn begin(&self) -> Result<Self::Transaction, StockStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)")
            .bind(millis(self.config.lock_timeout))
            .bind(millis(self.config.statement_timeout))
            .execute(&mut *tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::BeginTransaction))?;

        Ok(PostgresStockTransaction {
            tx,
            locked: HashSet::new(),
        })
    }

    async fn total_quantity(&self, product_id: ProductId) -> Result<i64, StockStoreError> {
        let row = query(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT AS total
             FROM warehouse_products WHERE product_id = $1",
        )
        .bind(product_id.into_inner())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::ReadStock))?;

        column(&row, "total", Operation::ReadStock)
    }

    async fn stock_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<WarehouseStock>, StockStoreError> {
        const OP: Operation = Operation::ReadStock;

        let rows = query(
            "SELECT wp.warehouse_id, w.zip_code, wp.quantity
             FROM warehouse_products wp
             JOIN warehouses w ON w.id = wp.warehouse_id
             WHERE wp.product_id = $1 AND w.deleted_at IS NULL
             ORDER BY wp.warehouse_id",
        )
        .bind(product_id.into_inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_sqlx_error(error, OP))?;

        rows.iter()
            .map(|row| {
                let zip: String = column(row, "zip_code", OP)?;
                Ok::<_, StockStoreError>(WarehouseStock {
                    warehouse_id: WarehouseId::new(column(row, "warehouse_id", OP)?),
                    zip_code: ZipCode::try_new(zip).map_err(|error| corrupted(OP, error))?,
                    quantity: column(row, "quantity", OP)?,
                })
            })
            .collect()
    }

    async fn stock_row(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<WarehouseProduct>, StockStoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM warehouse_products
             WHERE product_id = $1 AND warehouse_id = $2"
        );
        let row = query(&sql)
            .bind(product_id.into_inner())
            .bind(warehouse_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadStock))?;

        row.as_ref().map(stock_from_row).transpose()
    }

    async fn stock_rows_by_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<WarehouseProduct>, StockStoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM warehouse_products
             WHERE product_id = $1 ORDER BY warehouse_id"
        );
        query(&sql)
            .bind(product_id.into_inner())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadStock))?
            .iter()
            .map(stock_from_row)
            .collect()
    }

    async fn stock_rows_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<WarehouseProduct>, StockStoreError> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM warehouse_products
             WHERE warehouse_id = $1 ORDER BY product_id"
        );
        query(&sql)
            .bind(warehouse_id.into_inner())
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadStock))?
            .iter()
            .map(stock_from_row)
            .collect()
    }

    #[instrument(name = "postgres.movements", skip(self))]
    async fn movements(&self, query_by: MovementQuery) -> Result<Vec<StockMovement>, StockStoreError> {
        let (filter, id): (&str, Option<Uuid>) = match query_by {
            MovementQuery::All => ("TRUE", None),
            MovementQuery::Product(id) => ("product_id = $1", Some(id.into_inner())),
            MovementQuery::Source(id) => ("source_warehouse_id = $1", Some(id.into_inner())),
            MovementQuery::DestinationWarehouse(id) => {
                ("destination_warehouse_id = $1", Some(id.into_inner()))
            }
            MovementQuery::DestinationUser(id) => {
                ("destination_user_id = $1", Some(id.into_inner()))
            }
        };
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM stock_movements WHERE {filter} ORDER BY seq");

        let mut statement = query(&sql);
        if let Some(id) = id {
            statement = statement.bind(id);
        }

        statement
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadMovements))?
            .iter()
            .map(movement_from_row)
            .collect()
    }
}

impl WarehouseCatalog for PostgresStockStore {
    #[instrument(name = "postgres.save_warehouse", skip(self, warehouse), fields(warehouse_id = %warehouse.id))]
    async fn save_warehouse(&self, warehouse: &Warehouse) -> Result<(), StockStoreError> {
        let sql = format!(
            "INSERT INTO warehouses ({WAREHOUSE_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );
        let _ = query(&sql)
            .bind(warehouse.id.into_inner())
            .bind(&warehouse.name)
            .bind(&warehouse.street)
            .bind(&warehouse.city)
            .bind(&warehouse.state)
            .bind(warehouse.zip_code.as_ref())
            .bind(warehouse.is_main)
            .bind(warehouse.created_at.into_inner())
            .bind(warehouse.updated_at.into_inner())
            .bind(warehouse.deleted_at.map(Timestamp::into_inner))
            .execute(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::SaveWarehouse))?;
        Ok(())
    }

    async fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<Warehouse>, StockStoreError> {
        let sql = format!("SELECT {WAREHOUSE_COLUMNS} FROM warehouses WHERE id = $1");
        query(&sql)
            .bind(warehouse_id.into_inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadWarehouses))?
            .as_ref()
            .map(warehouse_from_row)
            .transpose()
    }

    async fn warehouses(&self) -> Result<Vec<Warehouse>, StockStoreError> {
        self.live_warehouses("TRUE").await
    }

    async fn non_main_warehouses(&self) -> Result<Vec<Warehouse>, StockStoreError> {
        self.live_warehouses("NOT is_main").await
    }

    async fn main_warehouse(&self) -> Result<Option<Warehouse>, StockStoreError> {
        Ok(self.live_warehouses("is_main").await?.into_iter().next())
    }
}

impl PostgresStockStore {
    async fn live_warehouses(&self, filter: &str) -> Result<Vec<Warehouse>, StockStoreError> {
        let sql = format!(
            "SELECT {WAREHOUSE_COLUMNS} FROM warehouses
             WHERE deleted_at IS NULL AND {filter}
             ORDER BY created_at, id"
        );
        query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::ReadWarehouses))?
            .iter()
            .map(warehouse_from_row)
            .collect()
    }
}

/// A database transaction holding `FOR UPDATE` row locks.
///
/// Dropping it without committing rolls back on the server, which releases
/// every lock.
pub struct PostgresStockTransaction {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<(ProductId, WarehouseId)>,
}

impl StockTransaction for PostgresStockTransaction {
    #[instrument(name = "postgres.lock_stock_row", skip(self))]
    async fn lock_stock_row(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<LockedRow>, StockStoreError> {
        const OP: Operation = Operation::LockStockRow;

        let row = query(
            "SELECT product_name, quantity FROM warehouse_products
             WHERE product_id = $1 AND warehouse_id = $2
             FOR UPDATE",
        )
        .bind(product_id.into_inner())
        .bind(warehouse_id.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|error| map_sqlx_error(error, OP))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let _ = self.locked.insert((product_id, warehouse_id));
        let quantity: i64 = column(&row, "quantity", OP)?;
        debug!(quantity, "[postgres.lock_stock_row] row locked");
        Ok(Some(LockedRow::new(
            product_id,
            warehouse_id,
            product_name(&row, OP)?,
            quantity,
        )))
    }

    async fn decrement_quantity(
        &mut self,
        row: &LockedRow,
        quantity: Quantity,
        at: Timestamp,
    ) -> Result<(), StockStoreError> {
        const OP: Operation = Operation::DecrementQuantity;

        if !self.locked.contains(&(row.product_id(), row.warehouse_id())) {
            return Err(StockStoreError::RowNotLocked {
                operation: OP,
                product_id: row.product_id(),
                warehouse_id: row.warehouse_id(),
            });
        }

        let result = query(
            "UPDATE warehouse_products
             SET quantity = quantity - $3, updated_at = $4
             WHERE product_id = $1 AND warehouse_id = $2",
        )
        .bind(row.product_id().into_inner())
        .bind(row.warehouse_id().into_inner())
        .bind(quantity.get())
        .bind(at.into_inner())
        .execute(&mut *self.tx)
        .await
        .map_err(|error| map_sqlx_error(error, OP))?;

        if result.rows_affected() == 1 {
            Ok(())
        } else {
            Err(corrupted(OP, "locked stock row disappeared"))
        }
    }

    async fn increment_or_create(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        product_name: &ProductName,
        quantity: Quantity,
        at: Timestamp,
    ) -> Result<(), StockStoreError> {
        let _ = query(
            "INSERT INTO warehouse_products
                 (id, warehouse_id, product_id, product_name, quantity, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $6)
             ON CONFLICT (warehouse_id, product_id) DO UPDATE
             SET quantity = warehouse_products.quantity + EXCLUDED.quantity,
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(StockRowId::generate().into_inner())
        .bind(warehouse_id.into_inner())
        .bind(product_id.into_inner())
        .bind(product_name.as_ref())
        .bind(quantity.get())
        .bind(at.into_inner())
        .execute(&mut *self.tx)
        .await
        .map_err(|error| map_sqlx_error(error, Operation::IncrementOrCreate))?;

        let _ = self.locked.insert((product_id, warehouse_id));
        Ok(())
    }

    async fn append_movement(&mut self, movement: &StockMovement) -> Result<(), StockStoreError> {
        let sql = format!(
            "INSERT INTO stock_movements ({MOVEMENT_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        let _ = query(&sql)
            .bind(movement.id.into_inner())
            .bind(movement.product_id.into_inner())
            .bind(movement.product_name.as_ref())
            .bind(movement.quantity.get())
            .bind(movement.source.into_inner())
            .bind(movement.destination.warehouse().map(WarehouseId::into_inner))
            .bind(movement.destination.user().map(UserId::into_inner))
            .bind(movement.created_at.into_inner())
            .execute(&mut *self.tx)
            .await
            .map_err(|error| map_sqlx_error(error, Operation::AppendMovement))?;
        Ok(())
    }

    #[instrument(name = "postgres.commit", skip(self), fields(locked_rows = self.locked.len()))]
    async fn commit(self) -> Result<(), StockStoreError> {
        self.tx
            .commit()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::CommitTransaction))
    }

    async fn rollback(self) -> Result<(), StockStoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|error| map_sqlx_error(error, Operation::RollbackTransaction))
    }
}
