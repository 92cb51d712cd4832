//! Supply receipts: stock in, Dr inventory materials / Cr supplier payables.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{CurrencyCode, InventoryTransactionId, ItemId, LegalEntityId, WarehouseId};
use tracing::instrument;
use uuid::Uuid;

use super::{already_posted, entry_for, movement_keys, movement_parts, posted_generations};
use crate::inventory::{BatchSource, InventoryService, MovementType, ReceiveRequest};
use crate::ledger::accounts;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{LinkRegistry, LinkRole};
use crate::store::LedgerTx;

/// One received item.
#[derive(Debug, Clone)]
pub struct SupplyReceiptLine {
    /// Item.
    pub item_id: ItemId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Landed unit cost in the receipt currency.
    pub unit_cost: Decimal,
}

/// Goods received from a supplier into one warehouse.
#[derive(Debug, Clone)]
pub struct SupplyReceipt {
    /// Receipt id (the posted document id).
    pub id: Uuid,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Receiving warehouse.
    pub warehouse_id: WarehouseId,
    /// Currency of every line.
    pub currency: CurrencyCode,
    /// Receipt date.
    pub received_on: NaiveDate,
    /// Received items.
    pub lines: Vec<SupplyReceiptLine>,
}

/// Supply receipt flow.
pub struct SupplyService;

impl SupplyService {
    /// Receives the stock and posts the receipt.
    ///
    /// The inventory entry is linked to every receipt movement; the last
    /// link absorbs the difference between converting the total and
    /// converting each unit cost, so the links cover the entry exactly.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty receipt or non-positive total
    /// - any error of [`InventoryService::receive`] or [`PostingEngine::post`]
    #[instrument(skip_all, fields(receipt_id = %receipt.id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        receipt: &SupplyReceipt,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = receipt.legal_entity_id;
        if let Some(posted) = already_posted(tx, scope, DocType::SupplyReceipt, receipt.id)? {
            return Ok(posted);
        }
        if receipt.lines.is_empty() {
            return Err(LedgerError::validation("supply receipt has no lines"));
        }

        let generation = posted_generations(tx, scope, DocType::SupplyReceipt, receipt.id)? + 1;
        let keys = movement_keys(DocType::SupplyReceipt, receipt.id, generation);
        let inventory_transaction_id = InventoryTransactionId::new();
        let mut movements = Vec::with_capacity(receipt.lines.len());
        let mut total = Decimal::ZERO;
        for (n, line) in (1usize..).zip(&receipt.lines) {
            let received = InventoryService::receive(
                tx,
                &ReceiveRequest {
                    legal_entity_id: scope,
                    item_id: line.item_id,
                    warehouse_id: receipt.warehouse_id,
                    quantity: line.quantity,
                    unit_cost: line.unit_cost,
                    currency: receipt.currency.clone(),
                    received_on: receipt.received_on,
                    source_type: BatchSource::SupplyReceipt,
                    movement_type: MovementType::Income,
                    doc_type: DocType::SupplyReceipt,
                    doc_id: receipt.id,
                    source_doc: None,
                    inventory_transaction_id,
                    idempotency_key: format!("{keys}:{n}"),
                },
            )?;
            total += line.quantity * line.unit_cost;
            movements.push(received.movement);
        }
        if total <= Decimal::ZERO {
            return Err(LedgerError::validation("supply receipt total must be positive"));
        }

        let context = PostingContext::SupplyReceipt {
            receipt_id: receipt.id,
        };
        let doc_line_id = context.doc_line_id();
        let line = PostingLine::new(context, total, receipt.currency.clone(), receipt.received_on)
            .debit(accounts::INVENTORY_MATERIALS)
            .credit(accounts::ACCOUNTS_PAYABLE_SUPPLIERS)
            .with_description(format!("Supply receipt {}", receipt.id));
        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::SupplyReceipt, receipt.id, vec![line]),
        )?;

        let entry = entry_for(&outcome, &doc_line_id)?;
        let mut parts = movement_parts(&movements);
        if let Some((last, rest)) = parts.split_last_mut() {
            let others: Decimal = rest.iter().map(|p| p.amount_base).sum();
            last.amount_base = entry.amount_base - others;
        }
        LinkRegistry::link_fan_out(tx, scope, entry.id, LinkRole::Inventory, &parts)?;

        Ok(outcome)
    }

    /// Voids the receipt and writes off its (untouched) batches.
    ///
    /// # Errors
    ///
    /// `Conflict` if any batch of the receipt was already consumed.
    #[instrument(skip(tx, reason))]
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        receipt_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(tx, scope, DocType::SupplyReceipt, receipt_id, reason)?;
        if !outcome.already_voided {
            let batches = tx.batches_by_source(scope, BatchSource::SupplyReceipt, receipt_id)?;
            InventoryService::write_off(tx, &batches, DocType::SupplyReceipt, receipt_id, voided_on)?;
        }
        Ok(outcome)
    }
}
