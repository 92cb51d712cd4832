//! FIFO cost allocation.
//!
//! Batches are consumed oldest first (creation sequence, then id). Each batch
//! keeps the base unit cost fixed at receipt, so a consumption spanning
//! batches received in different currencies is costed without re-converting.

use rust_decimal::Decimal;
use tally_shared::types::{ItemId, LegalEntityId, WarehouseId};
use tracing::{debug, warn};

use super::types::{CostSlice, StockBatch};
use crate::currency::CurrencyService;
use crate::ledger::error::LedgerError;
use crate::store::StockBatchStore;

/// Result of planning a consumption against a set of batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// One costed slice per batch touched, in consumption order.
    pub slices: Vec<CostSlice>,
    /// Quantity the batches could not cover.
    pub shortfall: Decimal,
}

impl Allocation {
    /// Quantity covered by batches.
    #[must_use]
    pub fn costed_quantity(&self) -> Decimal {
        self.slices
            .iter()
            .filter(|s| !s.is_uncosted())
            .map(|s| s.quantity)
            .sum()
    }

    /// Σ `line_cost_base` of all slices.
    #[must_use]
    pub fn total_cost_base(&self) -> Decimal {
        self.slices.iter().map(|s| s.line_cost_base).sum()
    }
}

/// Pure FIFO planning.
pub struct FifoPlanner;

impl FifoPlanner {
    /// Plans taking `requested` units from `batches`, which must already be in
    /// FIFO order.
    #[must_use]
    pub fn allocate(batches: &[StockBatch], requested: Decimal) -> Allocation {
        let mut remaining = requested;
        let mut slices = Vec::new();

        for batch in batches.iter().filter(|b| b.is_open()) {
            if remaining <= Decimal::ZERO {
                break;
            }
            let take = remaining.min(batch.quantity);
            slices.push(CostSlice {
                batch_id: Some(batch.id),
                quantity: take,
                unit_cost_base: Some(batch.unit_cost_base),
                line_cost_base: CurrencyService::line_cost(take, batch.unit_cost_base),
            });
            remaining -= take;
        }

        Allocation {
            slices,
            shortfall: remaining.max(Decimal::ZERO),
        }
    }
}

/// FIFO consumption against the store.
pub struct FifoEngine;

impl FifoEngine {
    /// Takes `quantity` units of an item out of a warehouse.
    ///
    /// Decrements the locked batches and returns one slice per batch. With
    /// `allow_negative`, a shortfall is returned as a trailing uncosted slice.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive quantity
    /// - `InsufficientStock` if the batches cannot cover `quantity` and
    ///   negative stock is not allowed
    pub fn consume<T>(
        tx: &mut T,
        scope: LegalEntityId,
        item_id: ItemId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
        allow_negative: bool,
    ) -> Result<Vec<CostSlice>, LedgerError>
    where
        T: StockBatchStore + ?Sized,
    {
        if quantity <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "quantity to consume must be positive, got {quantity}"
            )));
        }

        let batches = tx.lock_open_batches(scope, item_id, warehouse_id)?;
        let mut allocation = FifoPlanner::allocate(&batches, quantity);

        if allocation.shortfall > Decimal::ZERO {
            if !allow_negative {
                return Err(LedgerError::InsufficientStock {
                    item_id,
                    warehouse_id,
                    available: allocation.costed_quantity(),
                    requested: quantity,
                });
            }
            warn!(
                %item_id,
                %warehouse_id,
                shortfall = %allocation.shortfall,
                "consuming into negative stock"
            );
            allocation.slices.push(CostSlice {
                batch_id: None,
                quantity: allocation.shortfall,
                unit_cost_base: None,
                line_cost_base: Decimal::ZERO,
            });
        }

        for slice in &allocation.slices {
            let Some(batch_id) = slice.batch_id else {
                continue;
            };
            if let Some(batch) = batches.iter().find(|b| b.id == batch_id) {
                let mut updated = batch.clone();
                updated.quantity -= slice.quantity;
                tx.update_batch(&updated)?;
            }
        }

        debug!(
            %item_id,
            %warehouse_id,
            %quantity,
            batches = allocation.slices.len(),
            cost_base = %allocation.total_cost_base(),
            "fifo consumption"
        );
        Ok(allocation.slices)
    }
}
