//! Property-based tests for FIFO allocation.
//!
//! - Quantity conservation: slices plus shortfall equal the request
//! - Cost sum: the allocation cost is the exact sum of per-batch costs
//! - Order: batches are drained strictly oldest first

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::{ItemId, LegalEntityId, StockBatchId, WarehouseId};
use uuid::Uuid;

use super::fifo::FifoPlanner;
use super::types::{BatchSource, StockBatch};
use crate::fixtures::{code, date};

/// Strategy for (quantity, unit cost) pairs: 0.001..1000 units at 0.0001..10000.
fn batch_spec() -> impl Strategy<Value = (Decimal, Decimal)> {
    (1i64..1_000_000i64, 1i64..100_000_000i64)
        .prop_map(|(qty, cost)| (Decimal::new(qty, 3), Decimal::new(cost, 4)))
}

fn batches(specs: &[(Decimal, Decimal)]) -> Vec<StockBatch> {
    let (scope, item, wh) = (LegalEntityId::new(), ItemId::new(), WarehouseId::new());
    (1u64..)
        .zip(specs)
        .map(|(sequence, (quantity, unit_cost_base))| StockBatch {
            id: StockBatchId::new(),
            legal_entity_id: scope,
            item_id: item,
            warehouse_id: wh,
            sequence,
            initial_quantity: *quantity,
            quantity: *quantity,
            unit_cost: *unit_cost_base,
            currency: code("USD"),
            fx_rate_to_base: Decimal::ONE,
            unit_cost_base: *unit_cost_base,
            source_type: BatchSource::SupplyReceipt,
            source_doc_id: Uuid::now_v7(),
            received_on: date(2025, 1, 1),
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Taken quantities plus the shortfall always equal the request.
    #[test]
    fn prop_quantity_is_conserved(
        specs in prop::collection::vec(batch_spec(), 0..8),
        requested in (1i64..5_000_000i64).prop_map(|q| Decimal::new(q, 3)),
    ) {
        let batches = batches(&specs);
        let allocation = FifoPlanner::allocate(&batches, requested);

        prop_assert_eq!(allocation.costed_quantity() + allocation.shortfall, requested);

        let on_hand: Decimal = batches.iter().map(|b| b.quantity).sum();
        prop_assert_eq!(allocation.shortfall, (requested - on_hand).max(Decimal::ZERO));
    }

    /// The allocation cost equals Σ quantity × unit cost of its slices.
    #[test]
    fn prop_cost_is_exact_sum(
        specs in prop::collection::vec(batch_spec(), 1..8),
        requested in (1i64..5_000_000i64).prop_map(|q| Decimal::new(q, 3)),
    ) {
        let batches = batches(&specs);
        let allocation = FifoPlanner::allocate(&batches, requested);

        let expected: Decimal = allocation
            .slices
            .iter()
            .map(|s| s.quantity * s.unit_cost_base.unwrap_or_default())
            .sum();
        prop_assert_eq!(allocation.total_cost_base(), expected);
    }

    /// Every batch before the last one touched is fully drained.
    #[test]
    fn prop_oldest_batches_drain_first(
        specs in prop::collection::vec(batch_spec(), 1..8),
        requested in (1i64..5_000_000i64).prop_map(|q| Decimal::new(q, 3)),
    ) {
        let batches = batches(&specs);
        let allocation = FifoPlanner::allocate(&batches, requested);

        for (slice, batch) in allocation.slices.iter().zip(&batches) {
            prop_assert_eq!(slice.batch_id, Some(batch.id));
            prop_assert!(slice.quantity <= batch.quantity);
        }
        if let Some((_, rest)) = allocation.slices.split_last() {
            for (slice, batch) in rest.iter().zip(&batches) {
                prop_assert_eq!(slice.quantity, batch.quantity);
            }
        }
    }
}
