//! Stock receipts, FIFO issues and write-offs.
//!
//! Every movement written here is paired with an `INVENTORY.STOCK_CHANGED`
//! outbox event in the same transaction. Movement keys make each operation
//! idempotent: replaying a request returns the movements already written.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{
    CurrencyCode, InventoryTransactionId, ItemId, LegalEntityId, StockBatchId, StockMovementId,
    WarehouseId,
};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::events::OutboxEvent;
use super::fifo::FifoEngine;
use super::types::{BatchSource, MovementType, StockBatch, StockMovement};
use crate::currency::{CurrencyConverter, CurrencyService};
use crate::ledger::error::LedgerError;
use crate::ledger::types::DocType;
use crate::store::LedgerTx;

/// Stock entering a warehouse as a new FIFO batch.
#[derive(Debug, Clone)]
pub struct ReceiveRequest {
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Item received.
    pub item_id: ItemId,
    /// Receiving warehouse.
    pub warehouse_id: WarehouseId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Unit cost in `currency`.
    pub unit_cost: Decimal,
    /// Currency of `unit_cost`.
    pub currency: CurrencyCode,
    /// Receipt date; fixes the base unit cost.
    pub received_on: NaiveDate,
    /// Origin of the batch.
    pub source_type: BatchSource,
    /// Movement type to record.
    pub movement_type: MovementType,
    /// Document performing the receipt.
    pub doc_type: DocType,
    /// Document id.
    pub doc_id: Uuid,
    /// Document the stock originally came from, for returns and restocks.
    pub source_doc: Option<(DocType, Uuid)>,
    /// Correlation id shared with sibling movements.
    pub inventory_transaction_id: InventoryTransactionId,
    /// Idempotency key of the movement.
    pub idempotency_key: String,
}

/// Result of a receipt.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// The batch created (or found).
    pub batch: StockBatch,
    /// Its income movement.
    pub movement: StockMovement,
    /// False when the receipt had already been recorded.
    pub created: bool,
}

/// Stock leaving a warehouse at FIFO cost.
#[derive(Debug, Clone)]
pub struct IssueRequest {
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Item issued.
    pub item_id: ItemId,
    /// Issuing warehouse.
    pub warehouse_id: WarehouseId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Movement type to record.
    pub movement_type: MovementType,
    /// Document performing the issue.
    pub doc_type: DocType,
    /// Document id.
    pub doc_id: Uuid,
    /// Correlation id shared by the movements of this issue.
    pub inventory_transaction_id: InventoryTransactionId,
    /// Issue date.
    pub occurred_on: NaiveDate,
    /// Prefix of the movement keys (`<prefix>:<n>`).
    pub key_prefix: String,
    /// Return an uncosted movement instead of failing on a shortfall.
    pub allow_negative: bool,
}

/// Movements written by one issue or write-off.
#[derive(Debug, Clone)]
pub struct StockIssue {
    /// Correlation id of the movements.
    pub inventory_transaction_id: InventoryTransactionId,
    /// One movement per batch touched, plus an uncosted one for a shortfall.
    pub movements: Vec<StockMovement>,
    /// False when the issue had already been recorded.
    pub created: bool,
}

impl StockIssue {
    /// Σ `line_cost_base` of the movements: the amount the matching entry must carry.
    #[must_use]
    pub fn total_cost_base(&self) -> Decimal {
        self.movements.iter().map(|m| m.line_cost_base).sum()
    }
}

/// Stateless inventory service.
pub struct InventoryService;

impl InventoryService {
    /// Records a receipt: one batch, one movement, one outbox event.
    ///
    /// The base unit cost is the unit cost converted at the receipt-date rate
    /// and stays fixed for the life of the batch.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive quantity or negative cost
    /// - `NoExchangeRate` if the cost currency cannot be converted
    #[instrument(skip_all, fields(item_id = %request.item_id, key = %request.idempotency_key))]
    pub fn receive<T>(tx: &mut T, request: &ReceiveRequest) -> Result<Receipt, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        if request.quantity <= Decimal::ZERO {
            return Err(LedgerError::validation("received quantity must be positive"));
        }
        if request.unit_cost < Decimal::ZERO {
            return Err(LedgerError::validation("unit cost cannot be negative"));
        }

        let scope = request.legal_entity_id;
        if let Some(movement) = tx.movement_by_key(scope, &request.idempotency_key)? {
            let batch_id = movement.batch_id.ok_or_else(|| {
                LedgerError::Integrity(format!("receipt movement {} has no batch", movement.id))
            })?;
            let batch = tx
                .find_batch(scope, batch_id)?
                .ok_or_else(|| LedgerError::not_found("StockBatch", batch_id))?;
            debug!("receipt already recorded");
            return Ok(Receipt {
                batch,
                movement,
                created: false,
            });
        }

        let entity = tx
            .legal_entity(scope)?
            .ok_or_else(|| LedgerError::not_found("LegalEntity", scope))?;
        let converter = CurrencyConverter::new(&*tx, entity.base_currency.clone());
        let rate = converter.rate(&request.currency, request.received_on)?;
        let unit_cost_base = if request.currency == entity.base_currency {
            request.unit_cost
        } else {
            CurrencyService::convert(request.unit_cost, rate)
        };

        let batch = StockBatch {
            id: StockBatchId::new(),
            legal_entity_id: scope,
            item_id: request.item_id,
            warehouse_id: request.warehouse_id,
            sequence: tx.next_batch_sequence()?,
            initial_quantity: request.quantity,
            quantity: request.quantity,
            unit_cost: request.unit_cost,
            currency: request.currency.clone(),
            fx_rate_to_base: rate,
            unit_cost_base,
            source_type: request.source_type,
            source_doc_id: request.doc_id,
            received_on: request.received_on,
        };

        let movement = StockMovement {
            id: StockMovementId::new(),
            legal_entity_id: scope,
            item_id: request.item_id,
            warehouse_id: request.warehouse_id,
            batch_id: Some(batch.id),
            quantity: request.quantity,
            movement_type: request.movement_type,
            unit_cost_base: Some(unit_cost_base),
            line_cost_base: CurrencyService::line_cost(request.quantity, unit_cost_base),
            inventory_transaction_id: request.inventory_transaction_id,
            doc_type: request.doc_type,
            doc_id: request.doc_id,
            source_doc_type: request.source_doc.map(|(doc_type, _)| doc_type),
            source_doc_id: request.source_doc.map(|(_, id)| id),
            idempotency_key: request.idempotency_key.clone(),
            occurred_on: request.received_on,
            created_at: Utc::now(),
        };

        tx.insert_batch(batch.clone())?;
        Self::record(tx, &movement)?;

        info!(
            batch_id = %batch.id,
            quantity = %batch.quantity,
            unit_cost_base = %batch.unit_cost_base,
            "stock received"
        );
        Ok(Receipt {
            batch,
            movement,
            created: true,
        })
    }

    /// Issues stock at FIFO cost: one movement per batch touched.
    ///
    /// Movement quantities are negative; `line_cost_base` is the positive cost
    /// taken out of stock.
    ///
    /// # Errors
    ///
    /// Any error of [`FifoEngine::consume`].
    #[instrument(skip_all, fields(item_id = %request.item_id, key = %request.key_prefix))]
    pub fn issue<T>(tx: &mut T, request: &IssueRequest) -> Result<StockIssue, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = request.legal_entity_id;
        if let Some(first) = tx.movement_by_key(scope, &Self::issue_key(&request.key_prefix, 1))? {
            debug!("issue already recorded");
            return Ok(StockIssue {
                inventory_transaction_id: first.inventory_transaction_id,
                movements: tx.movements_for_transaction(first.inventory_transaction_id)?,
                created: false,
            });
        }

        let slices = FifoEngine::consume(
            tx,
            scope,
            request.item_id,
            request.warehouse_id,
            request.quantity,
            request.allow_negative,
        )?;

        let now = Utc::now();
        let mut movements = Vec::with_capacity(slices.len());
        for (n, slice) in (1usize..).zip(&slices) {
            let movement = StockMovement {
                id: StockMovementId::new(),
                legal_entity_id: scope,
                item_id: request.item_id,
                warehouse_id: request.warehouse_id,
                batch_id: slice.batch_id,
                quantity: -slice.quantity,
                movement_type: request.movement_type,
                unit_cost_base: slice.unit_cost_base,
                line_cost_base: slice.line_cost_base,
                inventory_transaction_id: request.inventory_transaction_id,
                doc_type: request.doc_type,
                doc_id: request.doc_id,
                source_doc_type: None,
                source_doc_id: None,
                idempotency_key: Self::issue_key(&request.key_prefix, n),
                occurred_on: request.occurred_on,
                created_at: now,
            };
            Self::record(tx, &movement)?;
            movements.push(movement);
        }

        let issue = StockIssue {
            inventory_transaction_id: request.inventory_transaction_id,
            movements,
            created: true,
        };
        info!(
            inventory_transaction_id = %issue.inventory_transaction_id,
            movements = issue.movements.len(),
            cost_base = %issue.total_cost_base(),
            "stock issued"
        );
        Ok(issue)
    }

    /// Zeroes the remaining quantity of `batches` with REVERSAL movements.
    ///
    /// Used when the document that created the batches is voided.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn write_off<T>(
        tx: &mut T,
        batches: &[StockBatch],
        doc_type: DocType,
        doc_id: Uuid,
        occurred_on: NaiveDate,
    ) -> Result<StockIssue, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let inventory_transaction_id = InventoryTransactionId::new();
        let now = Utc::now();
        let mut movements = Vec::new();

        for batch in batches.iter().filter(|b| b.is_open()) {
            let movement = StockMovement {
                id: StockMovementId::new(),
                legal_entity_id: batch.legal_entity_id,
                item_id: batch.item_id,
                warehouse_id: batch.warehouse_id,
                batch_id: Some(batch.id),
                quantity: -batch.quantity,
                movement_type: MovementType::Reversal,
                unit_cost_base: Some(batch.unit_cost_base),
                line_cost_base: CurrencyService::line_cost(batch.quantity, batch.unit_cost_base),
                inventory_transaction_id,
                doc_type,
                doc_id,
                source_doc_type: Some(doc_type),
                source_doc_id: Some(batch.source_doc_id),
                idempotency_key: Self::write_off_key(batch.id),
                occurred_on,
                created_at: now,
            };

            let mut drained = batch.clone();
            drained.quantity = Decimal::ZERO;
            tx.update_batch(&drained)?;
            Self::record(tx, &movement)?;
            movements.push(movement);
        }

        Ok(StockIssue {
            inventory_transaction_id,
            movements,
            created: true,
        })
    }

    fn record<T>(tx: &mut T, movement: &StockMovement) -> Result<(), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        tx.insert_movement(movement.clone())?;
        tx.push_event(OutboxEvent::stock_changed(movement)?)
    }

    /// Idempotency key of the movement that writes off `batch_id`.
    pub fn write_off_key(batch_id: StockBatchId) -> String {
        format!("write_off:{batch_id}")
    }

    fn issue_key(prefix: &str, n: usize) -> String {
        format!("{prefix}:{n}")
    }
}
