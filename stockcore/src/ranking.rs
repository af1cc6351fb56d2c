//! Nearest-warehouse ranking cache.
//!
//! For every indexed zip code the cache holds a sorted set of
//! `(warehouse, distance)` pairs. It is an index, not a system of record:
//! everything in it can be recomputed from the warehouse catalog, which is
//! what [`rebuild_rankings`] does.
//!
//! The maintenance protocol keeps the ranking symmetric. When a warehouse is
//! registered its distance to every existing warehouse is written under its
//! own zip, and its distance from each existing warehouse is written under
//! that warehouse's zip.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, instrument};

use crate::errors::RankingCacheError;
use crate::model::{Warehouse, WarehouseDistance};
use crate::types::{Distance, WarehouseId, ZipCode};

/// Sorted-set storage for per-zip warehouse rankings.
///
/// Implementations must order `nearest_warehouses` ascending by distance and
/// break ties by warehouse id, so two backends holding the same pairs return
/// the same sequence.
pub trait RankingCache: Send + Sync {
    /// Upserts `(warehouse_id, score)` into the set of every zip in
    /// `distances`. `target_zip` is the zip of `warehouse_id`.
    fn update_ranks(
        &self,
        target_zip: &ZipCode,
        warehouse_id: WarehouseId,
        distances: &HashMap<ZipCode, Distance>,
    ) -> impl Future<Output = Result<(), RankingCacheError>> + Send;

    /// The full ranking for `zip`; empty if the zip was never indexed.
    fn nearest_warehouses(
        &self,
        zip: &ZipCode,
    ) -> impl Future<Output = Result<Vec<WarehouseDistance>, RankingCacheError>> + Send;

    /// Gives `target` the same score as `source` in every set `source` is in.
    fn copy_rankings(
        &self,
        source: WarehouseId,
        target: WarehouseId,
    ) -> impl Future<Output = Result<(), RankingCacheError>> + Send;

    /// Drops every ranking.
    fn clear(&self) -> impl Future<Output = Result<(), RankingCacheError>> + Send;
}

/// Orders a ranking the way every cache must return it.
pub fn sort_ranking(ranking: &mut [WarehouseDistance]) {
    ranking.sort_by_key(|entry| (entry.distance, entry.warehouse_id));
}

/// Indexes a newly created warehouse.
///
/// `existing` holds the non-main warehouses that were live before `created`
/// was persisted. Main warehouses are not ranked and are ignored here.
#[instrument(
    name = "ranking.index_new_warehouse",
    skip(cache, existing),
    fields(warehouse_id = %created.id, zip_code = %created.zip_code, existing = existing.len())
)]
pub async fn index_new_warehouse<C>(
    cache: &C,
    created: &Warehouse,
    existing: &[Warehouse],
) -> Result<(), RankingCacheError>
where
    C: RankingCache,
{
    if created.is_main {
        debug!("[ranking.index_new_warehouse] main warehouse is not ranked");
        return Ok(());
    }

    let others: Vec<&Warehouse> = existing
        .iter()
        .filter(|w| !w.is_main && w.id != created.id)
        .collect();

    let mut own_distances: HashMap<ZipCode, Distance> = others
        .iter()
        .map(|w| (w.zip_code.clone(), created.zip_code.distance_to(&w.zip_code)))
        .collect();
    own_distances.insert(created.zip_code.clone(), Distance::new(0));
    cache
        .update_ranks(&created.zip_code, created.id, &own_distances)
        .await?;

    if others.is_empty() {
        debug!("[ranking.index_new_warehouse] first ranked warehouse seeded");
        return Ok(());
    }

    for other in others {
        let reverse =
            HashMap::from([(created.zip_code.clone(), other.zip_code.distance_to(&created.zip_code))]);
        cache.update_ranks(&other.zip_code, other.id, &reverse).await?;
    }

    debug!("[ranking.index_new_warehouse] ranking updated in both directions");
    Ok(())
}

/// Clears the cache and replays the maintenance protocol for `warehouses`
/// in creation order. Returns how many warehouses were indexed.
#[instrument(name = "ranking.rebuild", skip_all, fields(warehouses = warehouses.len()))]
pub async fn rebuild_rankings<C>(cache: &C, warehouses: &[Warehouse]) -> Result<usize, RankingCacheError>
where
    C: RankingCache,
{
    cache.clear().await?;

    let mut ordered: Vec<&Warehouse> = warehouses
        .iter()
        .filter(|w| !w.is_main && !w.is_deleted())
        .collect();
    ordered.sort_by_key(|w| (w.created_at, w.id));

    let mut indexed: Vec<Warehouse> = Vec::with_capacity(ordered.len());
    for warehouse in ordered {
        index_new_warehouse(cache, warehouse, &indexed).await?;
        indexed.push(warehouse.clone());
    }

    Ok(indexed.len())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::Timestamp;

    /// Records every upsert; ranking reads are served from the recorded sets.
    #[derive(Default)]
    struct RecordingCache {
        sets: Mutex<HashMap<ZipCode, HashMap<WarehouseId, Distance>>>,
    }

    impl RankingCache for RecordingCache {
        async fn update_ranks(
            &self,
            _target_zip: &ZipCode,
            warehouse_id: WarehouseId,
            distances: &HashMap<ZipCode, Distance>,
        ) -> Result<(), RankingCacheError> {
            let mut sets = self.sets.lock().unwrap();
            for (zip, distance) in distances {
                sets.entry(zip.clone()).or_default().insert(warehouse_id, *distance);
            }
            Ok(())
        }

        async fn nearest_warehouses(
            &self,
            zip: &ZipCode,
        ) -> Result<Vec<WarehouseDistance>, RankingCacheError> {
            let sets = self.sets.lock().unwrap();
            let mut ranking: Vec<_> = sets
                .get(zip)
                .map(|set| {
                    set.iter()
                        .map(|(id, distance)| WarehouseDistance {
                            warehouse_id: *id,
                            distance: *distance,
                        })
                        .collect()
                })
                .unwrap_or_default();
            sort_ranking(&mut ranking);
            Ok(ranking)
        }

        async fn copy_rankings(
            &self,
            _source: WarehouseId,
            _target: WarehouseId,
        ) -> Result<(), RankingCacheError> {
            Ok(())
        }

        async fn clear(&self) -> Result<(), RankingCacheError> {
            self.sets.lock().unwrap().clear();
            Ok(())
        }
    }

    fn warehouse(zip: &str, is_main: bool) -> Warehouse {
        Warehouse {
            id: WarehouseId::generate(),
            name: format!("warehouse {zip}"),
            street: "1 Dock Road".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: ZipCode::try_new(zip).unwrap(),
            is_main,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
            deleted_at: None,
        }
    }

    fn ids(ranking: &[WarehouseDistance]) -> Vec<WarehouseId> {
        ranking.iter().map(|entry| entry.warehouse_id).collect()
    }

    #[tokio::test]
    async fn first_warehouse_only_ranks_itself() {
        let cache = RecordingCache::default();
        let first = warehouse("10001", false);

        index_new_warehouse(&cache, &first, &[]).await.unwrap();

        let ranking = cache.nearest_warehouses(&first.zip_code).await.unwrap();
        assert_eq!(
            ranking,
            vec![WarehouseDistance {
                warehouse_id: first.id,
                distance: Distance::new(0)
            }]
        );
    }

    #[tokio::test]
    async fn ranking_is_written_in_both_directions() {
        let cache = RecordingCache::default();
        let a = warehouse("10001", false);
        let b = warehouse("10005", false);

        index_new_warehouse(&cache, &a, &[]).await.unwrap();
        index_new_warehouse(&cache, &b, std::slice::from_ref(&a)).await.unwrap();

        let from_a = cache.nearest_warehouses(&a.zip_code).await.unwrap();
        let from_b = cache.nearest_warehouses(&b.zip_code).await.unwrap();
        assert_eq!(ids(&from_a), vec![a.id, b.id]);
        assert_eq!(ids(&from_b), vec![b.id, a.id]);
        assert_eq!(from_a[1].distance, Distance::new(4));
        assert_eq!(from_b[1].distance, Distance::new(4));
    }

    #[tokio::test]
    async fn main_warehouses_are_left_out_of_the_ranking() {
        let cache = RecordingCache::default();
        let main = warehouse("10000", true);
        let a = warehouse("10001", false);

        index_new_warehouse(&cache, &main, &[]).await.unwrap();
        index_new_warehouse(&cache, &a, std::slice::from_ref(&main)).await.unwrap();

        assert!(cache.nearest_warehouses(&main.zip_code).await.unwrap().is_empty());
        assert_eq!(ids(&cache.nearest_warehouses(&a.zip_code).await.unwrap()), vec![a.id]);
    }

    #[tokio::test]
    async fn unknown_zip_has_an_empty_ranking() {
        let cache = RecordingCache::default();
        let zip = ZipCode::try_new("99999").unwrap();
        assert!(cache.nearest_warehouses(&zip).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_reproduces_the_incremental_ranking() {
        let cache = RecordingCache::default();
        let warehouses = vec![
            warehouse("10001", false),
            warehouse("10005", false),
            warehouse("20000", false),
            warehouse("10003", false),
        ];
        for (idx, created) in warehouses.iter().enumerate() {
            index_new_warehouse(&cache, created, &warehouses[..idx]).await.unwrap();
        }
        let mut before = Vec::new();
        for w in &warehouses {
            before.push(cache.nearest_warehouses(&w.zip_code).await.unwrap());
        }

        let indexed = rebuild_rankings(&cache, &warehouses).await.unwrap();

        assert_eq!(indexed, 4);
        for (w, expected) in warehouses.iter().zip(before) {
            assert_eq!(cache.nearest_warehouses(&w.zip_code).await.unwrap(), expected);
        }
    }
}
