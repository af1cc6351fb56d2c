//! Warehouse registration, ranking upkeep and ranking-driven allocation.

mod common;

use std::collections::HashMap;

use stockcore::{
    CatalogError, Distance, ProductId, RankingCache, TransferEngine, TransferWarning,
    WarehouseDistance, WarehouseId, WarehouseRegistry,
};
use stockcore_memory::{InMemoryNotifier, InMemoryRankingCache};
use stockcore::ranking::sort_ranking;
use stockcore_testing::chaos::{ChaosConfig, ChaosRankingCache};
use stockcore_testing::fixtures;

use crate::common::{Harness, cached_ranking, order};

fn ranked(id: WarehouseId, distance: u64) -> WarehouseDistance {
    WarehouseDistance {
        warehouse_id: id,
        distance: Distance::new(distance),
    }
}

fn sources(result: &stockcore::TransferResult) -> Vec<(WarehouseId, i64)> {
    result
        .movements
        .iter()
        .map(|m| (m.source, m.quantity.get()))
        .collect()
}

#[tokio::test]
async fn developer_observes_rankings_written_in_both_directions() {
    // Given: three warehouses registered one after the other
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let c = harness.warehouse("10040").await;

    // Then: every zip ranks every warehouse by distance
    let from_a = harness
        .cache
        .nearest_warehouses(&a.zip_code)
        .await
        .expect("ranking");
    assert_eq!(from_a, vec![ranked(a.id, 0), ranked(c.id, 30), ranked(b.id, 90)]);

    let from_b = harness
        .cache
        .nearest_warehouses(&b.zip_code)
        .await
        .expect("ranking");
    assert_eq!(from_b, vec![ranked(b.id, 0), ranked(c.id, 60), ranked(a.id, 90)]);
}

#[tokio::test]
async fn developer_observes_main_warehouse_kept_out_of_rankings() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;

    let main = harness
        .registry
        .register(fixtures::new_warehouse("10020", true))
        .await
        .expect("main registration");

    assert!(main.warehouse.is_main);
    let from_a = harness
        .cache
        .nearest_warehouses(&a.zip_code)
        .await
        .expect("ranking");
    assert_eq!(from_a, vec![ranked(a.id, 0)]);
    let from_main = harness
        .cache
        .nearest_warehouses(&main.warehouse.zip_code)
        .await
        .expect("ranking");
    assert!(from_main.is_empty());
}

#[tokio::test]
async fn developer_observes_second_main_warehouse_rejected() {
    let harness = Harness::new();
    let first = harness
        .registry
        .register(fixtures::new_warehouse("10020", true))
        .await
        .expect("main registration");

    let second = harness
        .registry
        .register(fixtures::new_warehouse("10030", true))
        .await;

    assert!(matches!(
        second,
        Err(CatalogError::MainWarehouseExists(id)) if id == first.warehouse.id
    ));
}

#[tokio::test]
async fn developer_observes_registration_survives_cache_outage() {
    // Given: a registry whose ranking cache is down
    let harness = Harness::new();
    let registry = WarehouseRegistry::new(
        harness.store.clone(),
        ChaosRankingCache::new(
            harness.cache.clone(),
            ChaosConfig::deterministic().with_failure_probability(1.0),
        ),
    );

    // When: a warehouse is registered
    let registration = registry
        .register(fixtures::new_warehouse("10010", false))
        .await
        .expect("registration");

    // Then: the catalog has it but the cache does not, until a rebuild
    assert!(!registration.ranked);
    let unranked = harness
        .cache
        .nearest_warehouses(&registration.warehouse.zip_code)
        .await
        .expect("ranking");
    assert!(unranked.is_empty());
    let indexed = harness.registry.rebuild_rankings().await.expect("rebuild");
    assert_eq!(indexed, 1);
    let ranking = harness
        .cache
        .nearest_warehouses(&registration.warehouse.zip_code)
        .await
        .expect("ranking");
    assert_eq!(ranking, vec![ranked(registration.warehouse.id, 0)]);
}

#[tokio::test]
async fn developer_observes_rebuild_restores_cleared_rankings() {
    // Given: an indexed catalog
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let c = harness.warehouse("10040").await;
    let before = harness
        .cache
        .nearest_warehouses(&c.zip_code)
        .await
        .expect("ranking");

    // When: the cache is wiped and rebuilt
    harness.cache.clear().await.expect("clear");
    let cleared = harness
        .cache
        .nearest_warehouses(&c.zip_code)
        .await
        .expect("ranking");
    assert!(cleared.is_empty());
    let indexed = harness.registry.rebuild_rankings().await.expect("rebuild");

    // Then: the same rankings come back
    assert_eq!(indexed, 3);
    let after = harness
        .cache
        .nearest_warehouses(&c.zip_code)
        .await
        .expect("ranking");
    assert_eq!(after, before);
    assert_eq!(after, vec![ranked(c.id, 0), ranked(a.id, 30), ranked(b.id, 60)]);
}

#[tokio::test]
async fn developer_observes_replacement_inherits_rankings() {
    // Given: A and B are ranked, and R is registered far away
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let replacement = harness.warehouse("10500").await;

    // When: R replaces A
    harness
        .registry
        .replace_warehouse(a.id, replacement.id)
        .await
        .expect("replace");

    // Then: R scores what A scored in every ranking A was in
    let from_b = harness
        .cache
        .nearest_warehouses(&b.zip_code)
        .await
        .expect("ranking");
    let mut expected = vec![ranked(b.id, 0), ranked(a.id, 90), ranked(replacement.id, 90)];
    sort_ranking(&mut expected);
    assert_eq!(from_b, expected);
}

#[tokio::test]
async fn developer_observes_replacing_unknown_warehouse_fails() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let unknown = WarehouseId::generate();

    let result = harness.registry.replace_warehouse(unknown, a.id).await;

    assert!(matches!(
        result,
        Err(CatalogError::WarehouseNotFound(id)) if id == unknown
    ));
}

#[tokio::test]
async fn developer_observes_cached_ranking_drives_allocation() {
    // Given: A is next door to the customer but the cache ranks it last
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    harness.stock(product, b.id, 5).await;
    harness
        .cache
        .update_ranks(
            &a.zip_code,
            a.id,
            &HashMap::from([(a.zip_code.clone(), Distance::new(200))]),
        )
        .await
        .expect("rank override");

    // When: a cached-ranking engine ships to A's zip
    let result = harness
        .engine_with(cached_ranking())
        .move_out(order(&[(product, 4)], "10010"))
        .await
        .expect("move out");

    // Then: the ranking, not the computed distance, picked B
    assert_eq!(sources(&result), vec![(b.id, 4)]);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn developer_observes_unindexed_zip_falls_back_to_distance() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    harness.stock(product, b.id, 5).await;

    let result = harness
        .engine_with(cached_ranking())
        .move_out(order(&[(product, 7)], "10095"))
        .await
        .expect("move out");

    assert_eq!(sources(&result), vec![(b.id, 5), (a.id, 2)]);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn developer_observes_cache_outage_degrades_with_warning() {
    // Given: stock in two warehouses and a cache that is down
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;
    let product = ProductId::generate();
    harness.stock(product, a.id, 5).await;
    harness.stock(product, b.id, 5).await;
    let engine = TransferEngine::new(
        harness.store.clone(),
        ChaosRankingCache::new(
            InMemoryRankingCache::new(),
            ChaosConfig::deterministic().with_failure_probability(1.0),
        ),
        InMemoryNotifier::new(),
        cached_ranking(),
    );

    // When: an order ships
    let result = engine
        .move_out(order(&[(product, 6)], "10010"))
        .await
        .expect("move out");

    // Then: the order still ships in full and the outage is reported
    assert!(result.committed);
    assert_eq!(result.movements.iter().map(|m| m.quantity.get()).sum::<i64>(), 6);
    assert_eq!(
        harness.on_hand(product, a.id).await + harness.on_hand(product, b.id).await,
        4
    );
    assert!(matches!(
        result.warnings.as_slice(),
        [TransferWarning::RankingDegraded { .. }]
    ));
}

#[tokio::test]
async fn developer_observes_nearest_warehouse_for_each_zip() {
    let harness = Harness::new();
    let a = harness.warehouse("10010").await;
    let b = harness.warehouse("10100").await;

    let nearest = harness
        .registry
        .nearest_warehouse_zips(&[fixtures::zip("10011"), fixtures::zip("10090")])
        .await
        .expect("lookup");

    assert_eq!(
        nearest,
        HashMap::from([
            (fixtures::zip("10011"), a.zip_code),
            (fixtures::zip("10090"), b.zip_code),
        ])
    );
}

#[tokio::test]
async fn developer_observes_no_nearest_zip_without_warehouses() {
    let harness = Harness::new();

    let nearest = harness
        .registry
        .nearest_warehouse_zips(&[fixtures::zip("10011")])
        .await
        .expect("lookup");

    assert!(nearest.is_empty());
}
