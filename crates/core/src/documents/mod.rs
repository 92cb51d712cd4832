//! Business document flows that drive the posting engine.
//!
//! Each flow writes its domain side effects (stock, cash) and its posting
//! run in the caller's transaction, then links the entries to the events
//! that justify them. Replaying a flow for an already posted document
//! returns the live run without touching stock or cash again.

pub mod acquiring;
pub mod financial;
pub mod payments;
pub mod production;
pub mod sales;
pub mod supply;
pub mod transfers;
pub mod types;


use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::types::{CurrencyCode, InventoryTransactionId, LegalEntityId};
use uuid::Uuid;

use crate::inventory::{
    BatchSource, InventoryService, MovementType, ReceiveRequest, StockIssue, StockMovement,
};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{AccountingEntry, DocType, PostingOutcome, PostingRunKind};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, FanOutPart};
use crate::store::LedgerTx;

pub use acquiring::AcquiringService;
pub use financial::FinancialDocumentService;
pub use payments::{PaymentPosting, PaymentRequest, PaymentService};
pub use production::{MaterialIssue, ProductionCompletion, ProductionConsumption, ProductionService};
pub use sales::{ReturnLine, SaleReturn, SalesDocument, SalesLine, SalesService};
pub use supply::{SupplyReceipt, SupplyReceiptLine, SupplyService};
pub use transfers::{InternalTransfer, InternalTransferPosting, InternalTransferService};
pub use types::{AcquiringEvent, FinancialDocument};

pub(crate) fn base_currency<T>(tx: &T, scope: LegalEntityId) -> Result<CurrencyCode, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    Ok(tx
        .legal_entity(scope)?
        .ok_or_else(|| LedgerError::not_found("LegalEntity", scope))?
        .base_currency)
}

/// The live posting of a document, if it was already posted.
pub(crate) fn already_posted<T>(
    tx: &T,
    scope: LegalEntityId,
    doc_type: DocType,
    doc_id: Uuid,
) -> Result<Option<PostingOutcome>, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    match PostingEngine::live_run(tx, scope, doc_type, doc_id)? {
        Some(run) => Ok(Some(PostingOutcome {
            entries: tx.entries_for_run(run.id)?,
            run,
            created: false,
        })),
        None => Ok(None),
    }
}

/// Number of original runs ever posted for a document, voided ones included.
pub(crate) fn posted_generations<T>(
    tx: &T,
    scope: LegalEntityId,
    doc_type: DocType,
    doc_id: Uuid,
) -> Result<usize, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    Ok(tx
        .runs_for_document(scope, doc_type, doc_id)?
        .iter()
        .filter(|run| run.kind == PostingRunKind::Original)
        .count())
}

/// Movement key prefix for one posting generation of a document.
///
/// A repost after a void gets fresh keys so its stock is moved again
/// instead of replaying the voided generation's movements.
pub(crate) fn movement_keys(doc_type: DocType, doc_id: Uuid, generation: usize) -> String {
    let prefix = format!("{}:{doc_id}", doc_type.as_str().to_ascii_lowercase());
    if generation <= 1 {
        prefix
    } else {
        format!("{prefix}:g{generation}")
    }
}

pub(crate) fn entry_for<'a>(
    outcome: &'a PostingOutcome,
    doc_line_id: &str,
) -> Result<&'a AccountingEntry, LedgerError> {
    outcome
        .entries
        .iter()
        .find(|e| e.doc_line_id() == doc_line_id)
        .ok_or_else(|| LedgerError::Internal(format!("posted run lacks line {doc_line_id}")))
}

/// Fan-out parts for costed movements, one per movement.
pub(crate) fn movement_parts(movements: &[StockMovement]) -> Vec<FanOutPart> {
    movements
        .iter()
        .filter(|m| m.line_cost_base > Decimal::ZERO)
        .map(|m| FanOutPart {
            event: EventRef::StockMovement(m.id),
            amount_base: m.line_cost_base,
            inventory_transaction_id: Some(m.inventory_transaction_id),
            batch_id: m.batch_id,
        })
        .collect()
}

/// Puts issued stock back as REVERSAL_RESTOCK batches at the issued base costs.
pub(crate) fn restock_issued<T>(
    tx: &mut T,
    scope: LegalEntityId,
    issued: &[StockMovement],
    doc_type: DocType,
    doc_id: Uuid,
    restocked_on: NaiveDate,
) -> Result<StockIssue, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    let base = base_currency(tx, scope)?;
    let inventory_transaction_id = InventoryTransactionId::new();
    let mut movements = Vec::new();

    for movement in issued.iter().filter(|m| m.quantity < Decimal::ZERO) {
        let receipt = InventoryService::receive(
            tx,
            &ReceiveRequest {
                legal_entity_id: scope,
                item_id: movement.item_id,
                warehouse_id: movement.warehouse_id,
                quantity: -movement.quantity,
                unit_cost: movement.unit_cost_base.unwrap_or_default(),
                currency: base.clone(),
                received_on: restocked_on,
                source_type: BatchSource::ReversalRestock,
                movement_type: MovementType::Reversal,
                doc_type,
                doc_id,
                source_doc: Some((movement.doc_type, movement.doc_id)),
                inventory_transaction_id,
                idempotency_key: format!("reversal_restock:{}", movement.id),
            },
        )?;
        movements.push(receipt.movement);
    }

    Ok(StockIssue {
        inventory_transaction_id,
        movements,
        created: true,
    })
}
