//! Demo warehouse network for the fulfillment walkthrough.
//!
//! A main distribution center plus four regional sites. Stock arrives at the
//! main site, is rebalanced to the regions with move-ins and leaves through
//! customer orders.

use anyhow::{Context, Result};
use stockcore::{
    NewWarehouse, ProductId, ProductName, Quantity, RankingCache, StockStore, StockStoreError,
    StockTransaction, Timestamp, Warehouse, WarehouseCatalog, WarehouseId, WarehouseRegistry,
    ZipCode,
};
use tracing::info;

/// A site of the demo network.
#[derive(Debug, Clone, Copy)]
pub struct Site {
    pub name: &'static str,
    pub street: &'static str,
    pub city: &'static str,
    pub state: &'static str,
    pub zip_code: &'static str,
    pub is_main: bool,
}

/// The demo network, main site first.
pub const SITES: [Site; 5] = [
    Site {
        name: "Central Distribution",
        street: "400 Freight Way",
        city: "Columbus",
        state: "OH",
        zip_code: "43215",
        is_main: true,
    },
    Site {
        name: "Northeast Fulfillment",
        street: "12 Harbor Street",
        city: "Newark",
        state: "NJ",
        zip_code: "07102",
        is_main: false,
    },
    Site {
        name: "Southeast Fulfillment",
        street: "88 Peachtree Avenue",
        city: "Atlanta",
        state: "GA",
        zip_code: "30303",
        is_main: false,
    },
    Site {
        name: "Midwest Fulfillment",
        street: "7 Lakeshore Drive",
        city: "Chicago",
        state: "IL",
        zip_code: "60601",
        is_main: false,
    },
    Site {
        name: "West Fulfillment",
        street: "350 Mission Street",
        city: "San Francisco",
        state: "CA",
        zip_code: "94105",
        is_main: false,
    },
];

impl Site {
    /// Registration input for this site.
    pub fn to_new_warehouse(self) -> Result<NewWarehouse> {
        let zip_code = ZipCode::try_new(self.zip_code)
            .with_context(|| format!("zip code of {}", self.name))?;
        Ok(NewWarehouse {
            name: self.name.to_string(),
            street: self.street.to_string(),
            city: self.city.to_string(),
            state: self.state.to_string(),
            zip_code,
            is_main: self.is_main,
        })
    }
}

/// The registered demo network.
#[derive(Debug, Clone)]
pub struct Network {
    pub main: Warehouse,
    pub regions: Vec<Warehouse>,
}

impl Network {
    /// Regional site by zip code.
    pub fn region(&self, zip_code: &str) -> Option<&Warehouse> {
        self.regions
            .iter()
            .find(|warehouse| warehouse.zip_code.as_ref() == zip_code)
    }
}

/// Registers every demo site.
pub async fn register_network<S, C>(registry: &WarehouseRegistry<S, C>) -> Result<Network>
where
    S: WarehouseCatalog,
    C: RankingCache,
{
    let mut main = None;
    let mut regions = Vec::new();

    for site in SITES {
        let registration = registry.register(site.to_new_warehouse()?).await?;
        info!(
            name = site.name,
            zip_code = site.zip_code,
            ranked = registration.ranked,
            "[fulfillment] site registered"
        );
        if site.is_main {
            main = Some(registration.warehouse);
        } else {
            regions.push(registration.warehouse);
        }
    }

    let main = main.context("demo network has no main site")?;
    Ok(Network { main, regions })
}

/// Books an inbound delivery at `warehouse_id`.
///
/// Deliveries are outside the transfer engine: they create stock rather
/// than move it, so they go straight through a store transaction.
pub async fn receive_delivery<S>(
    store: &S,
    product_id: ProductId,
    warehouse_id: WarehouseId,
    product_name: &ProductName,
    quantity: Quantity,
) -> Result<(), StockStoreError>
where
    S: StockStore,
{
    let mut tx = store.begin().await?;
    if let Err(error) = tx
        .increment_or_create(product_id, warehouse_id, product_name, quantity, Timestamp::now())
        .await
    {
        tx.rollback().await?;
        return Err(error);
    }
    tx.commit().await?;
    info!(
        product_id = %product_id,
        warehouse_id = %warehouse_id,
        quantity = %quantity,
        "[fulfillment] delivery received"
    );
    Ok(())
}
