use std::collections::HashMap;

use sqlx::{Pool, Postgres, Row, query};
use stockcore::{
    Distance, RankingCache, RankingCacheError, WarehouseDistance, WarehouseId, ZipCode,
};
use tracing::{instrument, warn};
use uuid::Uuid;

/// Rankings stored in the `warehouse_ranks` table, one row per
/// (zip code, warehouse) pair.
#[derive(Debug, Clone)]
pub struct PostgresRankingCache {
    pool: Pool<Postgres>,
}

fn unavailable(operation: &'static str, error: impl std::fmt::Display) -> RankingCacheError {
    warn!(
        operation,
        error = %error,
        "[postgres.ranking] ranking table unavailable"
    );
    RankingCacheError::Unavailable {
        operation,
        detail: error.to_string(),
    }
}

impl PostgresRankingCache {
    pub const fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

impl RankingCache for PostgresRankingCache {
    #[instrument(
        name = "postgres.update_ranks",
        skip(self, distances),
        fields(zip_count = distances.len())
    )]
    async fn update_ranks(
        &self,
        target_zip: &ZipCode,
        warehouse_id: WarehouseId,
        distances: &HashMap<ZipCode, Distance>,
    ) -> Result<(), RankingCacheError> {
        const OP: &str = "update_ranks";

        let mut zips = Vec::with_capacity(distances.len());
        let mut scores = Vec::with_capacity(distances.len());
        for (zip, distance) in distances {
            zips.push(zip.to_string());
            let score =
                i64::try_from(distance.into_inner()).map_err(|error| unavailable(OP, error))?;
            scores.push(score);
        }

        let _ = query(
            "INSERT INTO warehouse_ranks (zip_code, warehouse_id, distance)
             SELECT zip, $2, score FROM UNNEST($1::TEXT[], $3::BIGINT[]) AS t(zip, score)
             ON CONFLICT (zip_code, warehouse_id) DO UPDATE SET distance = EXCLUDED.distance",
        )
        .bind(&zips)
        .bind(warehouse_id.into_inner())
        .bind(&scores)
        .execute(&self.pool)
        .await
        .map_err(|error| unavailable(OP, error))?;
        Ok(())
    }

    async fn nearest_warehouses(
        &self,
        zip: &ZipCode,
    ) -> Result<Vec<WarehouseDistance>, RankingCacheError> {
        const OP: &str = "nearest_warehouses";

        let rows = query(
            "SELECT warehouse_id, distance FROM warehouse_ranks
             WHERE zip_code = $1
             ORDER BY distance, warehouse_id",
        )
        .bind(zip.as_ref())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| unavailable(OP, error))?;

        rows.iter()
            .map(|row| {
                let id: Uuid = row.try_get("warehouse_id").map_err(|e| unavailable(OP, e))?;
                let distance: i64 = row.try_get("distance").map_err(|e| unavailable(OP, e))?;
                let distance = u64::try_from(distance).map_err(|e| unavailable(OP, e))?;
                Ok::<_, RankingCacheError>(WarehouseDistance {
                    warehouse_id: WarehouseId::new(id),
                    distance: Distance::new(distance),
                })
            })
            .collect()
    }

    #[instrument(name = "postgres.copy_rankings", skip(self))]
    async fn copy_rankings(
        &self,
        source: WarehouseId,
        target: WarehouseId,
    ) -> Result<(), RankingCacheError> {
        let _ = query(
            "INSERT INTO warehouse_ranks (zip_code, warehouse_id, distance)
             SELECT zip_code, $2, distance FROM warehouse_ranks WHERE warehouse_id = $1
             ON CONFLICT (zip_code, warehouse_id) DO UPDATE SET distance = EXCLUDED.distance",
        )
        .bind(source.into_inner())
        .bind(target.into_inner())
        .execute(&self.pool)
        .await
        .map_err(|error| unavailable("copy_rankings", error))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), RankingCacheError> {
        let _ = query("DELETE FROM warehouse_ranks")
            .execute(&self.pool)
            .await
            .map_err(|error| unavailable("clear", error))?;
        Ok(())
    }
}
