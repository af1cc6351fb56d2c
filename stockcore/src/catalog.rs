//! Warehouse registration and ranking upkeep.
//!
//! Registration writes the warehouse to the catalog first and then indexes
//! it in the ranking cache. The catalog is the system of record: when the
//! cache write fails the warehouse stays registered, the failure is logged,
//! and [`Registration::ranked`] is false until the next rebuild.

use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::allocation::{self, AllocationCandidate};
use crate::errors::CatalogError;
use crate::model::{NewWarehouse, Warehouse};
use crate::ranking::{self, RankingCache};
use crate::store::WarehouseCatalog;
use crate::types::{Timestamp, WarehouseId, ZipCode};

/// Result of registering a warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub warehouse: Warehouse,
    /// Whether the ranking cache was updated.
    pub ranked: bool,
}

/// Registers warehouses and keeps the ranking cache in step with the
/// catalog.
#[derive(Debug, Clone)]
pub struct WarehouseRegistry<S, C> {
    catalog: S,
    cache: C,
}

impl<S, C> WarehouseRegistry<S, C>
where
    S: WarehouseCatalog,
    C: RankingCache,
{
    /// Builds a registry over a catalog and the cache it ranks into.
    pub const fn new(catalog: S, cache: C) -> Self {
        Self { catalog, cache }
    }

    /// The catalog warehouses are stored in.
    pub const fn catalog(&self) -> &S {
        &self.catalog
    }

    /// The ranking cache the registry maintains.
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Persists a new warehouse and ranks it against the existing ones.
    #[instrument(
        name = "registry.register",
        skip(self, new_warehouse),
        fields(zip_code = %new_warehouse.zip_code, is_main = new_warehouse.is_main)
    )]
    pub async fn register(&self, new_warehouse: NewWarehouse) -> Result<Registration, CatalogError> {
        if new_warehouse.is_main {
            if let Some(main) = self.catalog.main_warehouse().await? {
                return Err(CatalogError::MainWarehouseExists(main.id));
            }
        }

        let existing = self.catalog.non_main_warehouses().await?;
        let warehouse = new_warehouse.into_warehouse(Timestamp::now());
        self.catalog.save_warehouse(&warehouse).await?;

        let ranked = match ranking::index_new_warehouse(&self.cache, &warehouse, &existing).await {
            Ok(()) => true,
            Err(error) => {
                warn!(
                    warehouse_id = %warehouse.id,
                    error = %error,
                    "[registry.register] ranking cache not updated, rebuild required"
                );
                false
            }
        };

        info!(warehouse_id = %warehouse.id, ranked, "[registry.register] warehouse registered");
        Ok(Registration { warehouse, ranked })
    }

    /// Recomputes every ranking from the catalog.
    #[instrument(name = "registry.rebuild_rankings", skip(self))]
    pub async fn rebuild_rankings(&self) -> Result<usize, CatalogError> {
        let warehouses = self.catalog.non_main_warehouses().await?;
        let indexed = ranking::rebuild_rankings(&self.cache, &warehouses).await?;
        info!(indexed, "[registry.rebuild_rankings] rankings rebuilt");
        Ok(indexed)
    }

    /// Lets `replacement` inherit every ranking score of `retired`.
    #[instrument(name = "registry.replace_warehouse", skip(self))]
    pub async fn replace_warehouse(
        &self,
        retired: WarehouseId,
        replacement: WarehouseId,
    ) -> Result<(), CatalogError> {
        for id in [retired, replacement] {
            if self.catalog.warehouse(id).await?.is_none() {
                return Err(CatalogError::WarehouseNotFound(id));
            }
        }
        self.cache.copy_rankings(retired, replacement).await?;
        Ok(())
    }

    /// For each requested zip, the zip of the nearest live warehouse.
    ///
    /// Zips are left out of the result when there are no warehouses at all.
    pub async fn nearest_warehouse_zips(
        &self,
        zips: &[ZipCode],
    ) -> Result<HashMap<ZipCode, ZipCode>, CatalogError> {
        let candidates: Vec<AllocationCandidate> = self
            .catalog
            .warehouses()
            .await?
            .into_iter()
            .map(|w| AllocationCandidate {
                warehouse_id: w.id,
                zip_code: w.zip_code,
                available: 0,
            })
            .collect();

        Ok(zips
            .iter()
            .filter_map(|zip| {
                allocation::nearest_warehouse_for_zip(zip, &candidates)
                    .map(|nearest| (zip.clone(), nearest))
            })
            .collect())
    }
}
