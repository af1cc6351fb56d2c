//! Property tests: stock is conserved by move-ins and only leaves the books
//! through recorded shipments.

mod common;

use proptest::prelude::*;
use proptest::test_runner::RngSeed;
use futures::future::join_all;
use stockcore::{MovementDestination, MovementQuery, ProductId, TransferError};

use crate::common::{Harness, fast_retry, order, transfer};

const ZIPS: [&str; 3] = ["10010", "10100", "10040"];

#[derive(Debug, Clone)]
enum Step {
    Transfer { from: usize, to: usize, amount: i64 },
    Ship { zip: usize, amount: i64 },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..ZIPS.len(), 0..ZIPS.len(), 1i64..10)
            .prop_map(|(from, to, amount)| Step::Transfer { from, to, amount }),
        (0..ZIPS.len(), 1i64..15).prop_map(|(zip, amount)| Step::Ship { zip, amount }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 48,
        rng_seed: RngSeed::Fixed(0x5704_c0de),
        ..ProptestConfig::default()
    })]

    #[test]
    fn stock_is_conserved_across_transfers_and_shipments(
        initial in prop::collection::vec(0i64..20, ZIPS.len()),
        steps in prop::collection::vec(step(), 1..12),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let harness = Harness::new();
            let product = ProductId::generate();
            let mut warehouses = Vec::new();
            for (zip, amount) in ZIPS.iter().zip(&initial) {
                let warehouse = harness.warehouse(zip).await;
                if *amount > 0 {
                    harness.stock(product, warehouse.id, *amount).await;
                }
                warehouses.push(warehouse);
            }
            let engine = harness.engine();
            let mut expected_total: i64 = initial.iter().sum();

            for step in &steps {
                match *step {
                    Step::Transfer { from, to, amount } => {
                        let result = engine
                            .move_in(transfer(product, warehouses[from].id, warehouses[to].id, amount))
                            .await;
                        let accepted = matches!(
                            result,
                            Ok(_)
                                | Err(TransferError::InvalidInput(_)
                                    | TransferError::NotFound(_)
                                    | TransferError::InsufficientStock { .. })
                        );
                        prop_assert!(accepted, "unexpected move-in outcome: {:?}", result);
                    }
                    Step::Ship { zip, amount } => {
                        match engine.move_out(order(&[(product, amount)], ZIPS[zip])).await {
                            Ok(result) => {
                                let shipped: i64 =
                                    result.movements.iter().map(|m| m.quantity.get()).sum();
                                prop_assert_eq!(shipped, amount);
                                expected_total -= amount;
                            }
                            Err(TransferError::InsufficientStock { available, .. }) => {
                                prop_assert!(available < amount);
                            }
                            Err(other) => prop_assert!(false, "unexpected failure: {other}"),
                        }
                    }
                }

                let total = engine.total_quantity(product).await.expect("total");
                prop_assert_eq!(total, expected_total);
                for warehouse in &warehouses {
                    prop_assert!(harness.on_hand(product, warehouse.id).await >= 0);
                }
            }

            let ledger = engine
                .movement_history(MovementQuery::Product(product))
                .await
                .expect("ledger");
            let shipped_out: i64 = ledger
                .iter()
                .filter(|m| matches!(m.destination, MovementDestination::User(_)))
                .map(|m| m.quantity.get())
                .sum();
            prop_assert_eq!(initial.iter().sum::<i64>() - shipped_out, expected_total);
            Ok(())
        })?;
    }

    #[test]
    fn stock_is_conserved_under_concurrent_requests(
        initial in prop::collection::vec(0i64..20, ZIPS.len()),
        batch in prop::collection::vec(step(), 2..16),
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_time()
            .build()
            .expect("runtime");
        rt.block_on(async {
            let harness = Harness::new();
            let product = ProductId::generate();
            let mut warehouses = Vec::new();
            for (zip, amount) in ZIPS.iter().zip(&initial) {
                let warehouse = harness.warehouse(zip).await;
                if *amount > 0 {
                    harness.stock(product, warehouse.id, *amount).await;
                }
                warehouses.push(warehouse);
            }
            let engine = harness.engine_with(fast_retry(8));

            let tasks = batch.iter().map(|step| {
                let engine = engine.clone();
                let request = match *step {
                    Step::Transfer { from, to, amount } => Ok(transfer(
                        product,
                        warehouses[from].id,
                        warehouses[to].id,
                        amount,
                    )),
                    Step::Ship { zip, amount } => Err(order(&[(product, amount)], ZIPS[zip])),
                };
                tokio::spawn(async move {
                    match request {
                        Ok(move_in) => (false, engine.move_in(move_in).await),
                        Err(move_out) => (true, engine.move_out(move_out).await),
                    }
                })
            });
            let outcomes = join_all(tasks).await;

            let mut shipped = 0i64;
            let mut shipments = 0usize;
            let mut transfers = 0usize;
            for outcome in outcomes {
                let (is_shipment, result) = outcome.expect("request task");
                match result {
                    Ok(result) if is_shipment => {
                        shipped += result.movements.iter().map(|m| m.quantity.get()).sum::<i64>();
                        shipments += result.movements.len();
                    }
                    Ok(result) => transfers += result.movements.len(),
                    Err(error) => {
                        let tolerated = matches!(
                            error,
                            TransferError::InvalidInput(_)
                                | TransferError::NotFound(_)
                                | TransferError::InsufficientStock { .. }
                                | TransferError::LockTimeout { .. }
                                | TransferError::TransactionConflict { .. }
                        );
                        prop_assert!(tolerated, "unexpected failure: {}", error);
                    }
                }
            }

            for warehouse in &warehouses {
                prop_assert!(harness.on_hand(product, warehouse.id).await >= 0);
            }
            let total = engine.total_quantity(product).await.expect("total");
            prop_assert_eq!(total + shipped, initial.iter().sum::<i64>());

            let ledger = engine
                .movement_history(MovementQuery::Product(product))
                .await
                .expect("ledger");
            let (to_users, to_warehouses): (Vec<_>, Vec<_>) = ledger
                .iter()
                .partition(|m| matches!(m.destination, MovementDestination::User(_)));
            prop_assert_eq!(to_users.len(), shipments);
            prop_assert_eq!(to_users.iter().map(|m| m.quantity.get()).sum::<i64>(), shipped);
            prop_assert_eq!(to_warehouses.len(), transfers);
            Ok(())
        })?;
    }
}
