use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use stockcore::ranking::sort_ranking;
use stockcore::{Distance, RankingCache, RankingCacheError, WarehouseDistance, WarehouseId, ZipCode};

type SortedSets = HashMap<ZipCode, HashMap<WarehouseId, Distance>>;

/// In-memory ranking cache with sorted-set semantics.
///
/// Each zip maps warehouses to their score; re-adding a warehouse replaces
/// its score. Clones share the same sets.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRankingCache {
    sets: Arc<RwLock<SortedSets>>,
}

impl InMemoryRankingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed zip codes.
    pub fn indexed_zips(&self) -> usize {
        self.sets.read().map_or(0, |sets| sets.len())
    }
}

fn unavailable(operation: &'static str) -> RankingCacheError {
    RankingCacheError::Unavailable {
        operation,
        detail: "ranking cache lock poisoned".to_string(),
    }
}

impl RankingCache for InMemoryRankingCache {
    async fn update_ranks(
        &self,
        _target_zip: &ZipCode,
        warehouse_id: WarehouseId,
        distances: &HashMap<ZipCode, Distance>,
    ) -> Result<(), RankingCacheError> {
        let mut sets = self.sets.write().map_err(|_| unavailable("update_ranks"))?;
        for (zip, distance) in distances {
            sets.entry(zip.clone())
                .or_default()
                .insert(warehouse_id, *distance);
        }
        Ok(())
    }

    async fn nearest_warehouses(
        &self,
        zip: &ZipCode,
    ) -> Result<Vec<WarehouseDistance>, RankingCacheError> {
        let sets = self
            .sets
            .read()
            .map_err(|_| unavailable("nearest_warehouses"))?;
        let mut ranking: Vec<WarehouseDistance> = sets
            .get(zip)
            .into_iter()
            .flatten()
            .map(|(warehouse_id, distance)| WarehouseDistance {
                warehouse_id: *warehouse_id,
                distance: *distance,
            })
            .collect();
        drop(sets);
        sort_ranking(&mut ranking);
        Ok(ranking)
    }

    async fn copy_rankings(
        &self,
        source: WarehouseId,
        target: WarehouseId,
    ) -> Result<(), RankingCacheError> {
        let mut sets = self.sets.write().map_err(|_| unavailable("copy_rankings"))?;
        for set in sets.values_mut() {
            if let Some(distance) = set.get(&source).copied() {
                set.insert(target, distance);
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), RankingCacheError> {
        self.sets.write().map_err(|_| unavailable("clear"))?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn zip(value: &str) -> ZipCode {
        ZipCode::try_new(value).unwrap()
    }

    fn id(n: u128) -> WarehouseId {
        WarehouseId::new(Uuid::from_u128(n))
    }

    #[tokio::test]
    async fn re_adding_a_warehouse_replaces_its_score() {
        let cache = InMemoryRankingCache::new();
        let target = zip("10001");

        cache
            .update_ranks(&target, id(1), &HashMap::from([(target.clone(), Distance::new(9))]))
            .await
            .unwrap();
        cache
            .update_ranks(&target, id(1), &HashMap::from([(target.clone(), Distance::new(2))]))
            .await
            .unwrap();

        let ranking = cache.nearest_warehouses(&target).await.unwrap();
        assert_eq!(
            ranking,
            vec![WarehouseDistance {
                warehouse_id: id(1),
                distance: Distance::new(2)
            }]
        );
    }

    #[tokio::test]
    async fn equal_scores_are_ordered_by_warehouse_id() {
        let cache = InMemoryRankingCache::new();
        let target = zip("10001");
        for n in [3, 1, 2] {
            cache
                .update_ranks(&zip("10002"), id(n), &HashMap::from([(target.clone(), Distance::new(1))]))
                .await
                .unwrap();
        }

        let ids: Vec<_> = cache
            .nearest_warehouses(&target)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.warehouse_id)
            .collect();
        assert_eq!(ids, vec![id(1), id(2), id(3)]);
    }

    #[tokio::test]
    async fn clear_forgets_every_zip() {
        let cache = InMemoryRankingCache::new();
        let target = zip("10001");
        cache
            .update_ranks(&target, id(1), &HashMap::from([(target.clone(), Distance::new(0))]))
            .await
            .unwrap();

        cache.clear().await.unwrap();

        assert_eq!(cache.indexed_zips(), 0);
        assert!(cache.nearest_warehouses(&target).await.unwrap().is_empty());
    }
}
