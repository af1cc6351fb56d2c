//! Greedy nearest-first allocation.
//!
//! Turns "ship N units of a product to zip Z" into per-warehouse amounts.
//! Candidates are ordered by distance to Z (stable, so equal distances keep
//! their input order) and drained front to back. If all candidates together
//! hold fewer than N units the call fails as a whole; a partial allocation is
//! never returned.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::AllocationError;
use crate::model::{WarehouseDistance, WarehouseStock};
use crate::types::{Distance, Quantity, WarehouseId, ZipCode};

/// A warehouse that may contribute units, with what it currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCandidate {
    pub warehouse_id: WarehouseId,
    pub zip_code: ZipCode,
    pub available: i64,
}

impl From<WarehouseStock> for AllocationCandidate {
    fn from(stock: WarehouseStock) -> Self {
        Self {
            warehouse_id: stock.warehouse_id,
            zip_code: stock.zip_code,
            available: stock.quantity,
        }
    }
}

/// Per-warehouse amounts that together cover a request.
///
/// Entries keep the order in which warehouses were visited, nearest first;
/// the transfer engine locks rows in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    entries: Vec<(WarehouseId, Quantity)>,
}

impl Allocation {
    /// Allocated amounts in visiting order.
    pub fn iter(&self) -> impl Iterator<Item = (WarehouseId, Quantity)> + '_ {
        self.entries.iter().copied()
    }

    /// Amount assigned to `warehouse_id`, if any.
    pub fn get(&self, warehouse_id: WarehouseId) -> Option<Quantity> {
        self.entries
            .iter()
            .find(|(id, _)| *id == warehouse_id)
            .map(|(_, qty)| *qty)
    }

    /// Sum of every assigned amount.
    pub fn total(&self) -> i64 {
        self.entries.iter().map(|(_, qty)| qty.get()).sum()
    }

    /// Number of contributing warehouses.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The allocation as a lookup map, dropping the visiting order.
    pub fn to_map(&self) -> HashMap<WarehouseId, Quantity> {
        self.entries.iter().copied().collect()
    }
}

impl IntoIterator for Allocation {
    type Item = (WarehouseId, Quantity);
    type IntoIter = std::vec::IntoIter<(WarehouseId, Quantity)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Allocates `requested` units nearest-first relative to `target`.
pub fn allocate(
    target: &ZipCode,
    candidates: &[AllocationCandidate],
    requested: Quantity,
) -> Result<Allocation, AllocationError> {
    allocate_in_order(&order_by_distance(target, candidates), requested)
}

/// Allocates `requested` units walking `candidates` in the given order.
///
/// This is the greedy core shared by every ordering strategy, and on its own
/// the unranked fallback used when no proximity information is available.
pub fn allocate_in_order(
    candidates: &[AllocationCandidate],
    requested: Quantity,
) -> Result<Allocation, AllocationError> {
    let available = candidates
        .iter()
        .fold(0i64, |sum, c| sum.saturating_add(c.available.max(0)));
    if available < requested.get() {
        return Err(AllocationError::InsufficientStock {
            requested,
            available,
        });
    }

    let mut remaining = requested.get();
    let mut entries = Vec::new();
    for candidate in candidates {
        if remaining == 0 {
            break;
        }
        let take = candidate.available.min(remaining);
        // Zero or negative availability contributes nothing.
        let Ok(quantity) = Quantity::try_new(take) else {
            continue;
        };
        entries.push((candidate.warehouse_id, quantity));
        remaining -= take;
    }

    Ok(Allocation { entries })
}

/// Candidates sorted ascending by distance to `target`, ties in input order.
pub fn order_by_distance(
    target: &ZipCode,
    candidates: &[AllocationCandidate],
) -> Vec<AllocationCandidate> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|c| target.distance_to(&c.zip_code));
    ordered
}

/// Candidates ordered by a precomputed ranking.
///
/// Ranked candidates come first, in ranking order. Candidates the ranking
/// does not mention follow, ordered by computed distance to `target`.
pub fn order_by_ranking(
    ranking: &[WarehouseDistance],
    target: &ZipCode,
    candidates: &[AllocationCandidate],
) -> Vec<AllocationCandidate> {
    let position: HashMap<WarehouseId, usize> = ranking
        .iter()
        .enumerate()
        .map(|(idx, entry)| (entry.warehouse_id, idx))
        .collect();

    let (mut ranked, unranked): (Vec<_>, Vec<_>) = candidates
        .iter()
        .cloned()
        .partition(|c| position.contains_key(&c.warehouse_id));
    ranked.sort_by_key(|c| position.get(&c.warehouse_id).copied());
    ranked.extend(order_by_distance(target, &unranked));
    ranked
}

/// Zip code of the candidate nearest to `target`; the first one wins ties.
pub fn nearest_warehouse_for_zip(
    target: &ZipCode,
    candidates: &[AllocationCandidate],
) -> Option<ZipCode> {
    candidates
        .iter()
        .min_by_key(|c| target.distance_to(&c.zip_code))
        .map(|c| c.zip_code.clone())
}

/// Distance from `target` to every candidate, in input order.
pub fn distances_from(
    target: &ZipCode,
    candidates: &[AllocationCandidate],
) -> Vec<(WarehouseId, Distance)> {
    candidates
        .iter()
        .map(|c| (c.warehouse_id, target.distance_to(&c.zip_code)))
        .collect()
}
