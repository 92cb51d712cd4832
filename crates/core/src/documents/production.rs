//! Production: materials consumed into WIP, finished goods out of WIP.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{InventoryTransactionId, ItemId, LegalEntityId, WarehouseId};
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    already_posted, base_currency, entry_for, movement_keys, movement_parts, posted_generations,
    restock_issued,
};
use crate::inventory::{BatchSource, InventoryService, IssueRequest, MovementType, ReceiveRequest};
use crate::ledger::accounts;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// One material issued to production.
#[derive(Debug, Clone)]
pub struct MaterialIssue {
    /// Material item.
    pub item_id: ItemId,
    /// Positive quantity.
    pub quantity: Decimal,
}

/// Materials issued to a production order.
///
/// The posted document id is the inventory transaction id, so one order can
/// consume materials several times.
#[derive(Debug, Clone)]
pub struct ProductionConsumption {
    /// Production order.
    pub production_order_id: Uuid,
    /// Correlation id of the issue; also the document id.
    pub inventory_transaction_id: InventoryTransactionId,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Issuing warehouse.
    pub warehouse_id: WarehouseId,
    /// Consumption date.
    pub consumed_on: NaiveDate,
    /// Materials.
    pub materials: Vec<MaterialIssue>,
}

/// Finished goods output of a production order.
#[derive(Debug, Clone)]
pub struct ProductionCompletion {
    /// Production order (the posted document id).
    pub production_order_id: Uuid,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Finished item.
    pub item_id: ItemId,
    /// Receiving warehouse.
    pub warehouse_id: WarehouseId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Unit cost in base currency.
    pub unit_cost_base: Decimal,
    /// Completion date.
    pub completed_on: NaiveDate,
}

/// Production flows.
pub struct ProductionService;

impl ProductionService {
    /// Issues materials at FIFO cost and posts Dr WIP / Cr materials for the
    /// exact sum of the movement costs, fanned out to every movement.
    ///
    /// # Errors
    ///
    /// - `InsufficientStock` if a material is short
    /// - `Validation` for an empty or zero-cost consumption
    #[instrument(skip_all, fields(inventory_transaction_id = %consumption.inventory_transaction_id))]
    pub fn consume<T>(
        tx: &mut T,
        config: &LedgerConfig,
        consumption: &ProductionConsumption,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = consumption.legal_entity_id;
        let doc_id: Uuid = consumption.inventory_transaction_id.into();
        if let Some(posted) = already_posted(tx, scope, DocType::ProductionConsumption, doc_id)? {
            return Ok(posted);
        }
        if consumption.materials.is_empty() {
            return Err(LedgerError::validation("production consumption has no materials"));
        }

        let generation = posted_generations(tx, scope, DocType::ProductionConsumption, doc_id)? + 1;
        let keys = movement_keys(DocType::ProductionConsumption, doc_id, generation);
        let mut movements = Vec::new();
        for (n, material) in (1usize..).zip(&consumption.materials) {
            let issue = InventoryService::issue(
                tx,
                &IssueRequest {
                    legal_entity_id: scope,
                    item_id: material.item_id,
                    warehouse_id: consumption.warehouse_id,
                    quantity: material.quantity,
                    movement_type: MovementType::ProductionInput,
                    doc_type: DocType::ProductionConsumption,
                    doc_id,
                    inventory_transaction_id: consumption.inventory_transaction_id,
                    occurred_on: consumption.consumed_on,
                    key_prefix: format!("{keys}:{n}"),
                    allow_negative: false,
                },
            )?;
            movements.extend(issue.movements);
        }

        let total: Decimal = movements.iter().map(|m| m.line_cost_base).sum();
        if total <= Decimal::ZERO {
            return Err(LedgerError::validation("consumed materials carry no cost"));
        }

        let context = PostingContext::ProductionConsumption {
            production_order_id: consumption.production_order_id,
            inventory_transaction_id: consumption.inventory_transaction_id,
        };
        let doc_line_id = context.doc_line_id();
        let line = PostingLine::new(context, total, base_currency(tx, scope)?, consumption.consumed_on)
            .debit(accounts::WIP_PRODUCTION)
            .credit(accounts::INVENTORY_MATERIALS)
            .with_description(format!(
                "Materials for production order {}",
                consumption.production_order_id
            ));
        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::ProductionConsumption, doc_id, vec![line]),
        )?;

        let entry = entry_for(&outcome, &doc_line_id)?;
        LinkRegistry::link_fan_out(tx, scope, entry.id, LinkRole::Inventory, &movement_parts(&movements))?;

        info!(
            production_order_id = %consumption.production_order_id,
            movements = movements.len(),
            cost_base = %total,
            "production consumption posted"
        );
        Ok(outcome)
    }

    /// Voids a consumption and restocks the consumed quantities at the base
    /// costs they were issued at.
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::void`].
    #[instrument(skip(tx, reason))]
    pub fn void_consumption<T>(
        tx: &mut T,
        scope: LegalEntityId,
        inventory_transaction_id: InventoryTransactionId,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let doc_id: Uuid = inventory_transaction_id.into();
        let outcome = PostingEngine::void(tx, scope, DocType::ProductionConsumption, doc_id, reason)?;
        if !outcome.already_voided {
            let issued: Vec<_> = tx
                .movements_for_transaction(inventory_transaction_id)?
                .into_iter()
                .filter(|m| m.movement_type == MovementType::ProductionInput)
                .collect();
            restock_issued(tx, scope, &issued, DocType::ProductionConsumption, doc_id, voided_on)?;
        }
        Ok(outcome)
    }

    /// Receives finished goods and posts Dr finished goods / Cr WIP.
    ///
    /// # Errors
    ///
    /// Any error of [`InventoryService::receive`] or [`PostingEngine::post`].
    #[instrument(skip_all, fields(production_order_id = %completion.production_order_id))]
    pub fn complete<T>(
        tx: &mut T,
        config: &LedgerConfig,
        completion: &ProductionCompletion,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = completion.legal_entity_id;
        let doc_id = completion.production_order_id;
        if let Some(posted) = already_posted(tx, scope, DocType::ProductionCompletion, doc_id)? {
            return Ok(posted);
        }

        let base = base_currency(tx, scope)?;
        let generation = posted_generations(tx, scope, DocType::ProductionCompletion, doc_id)? + 1;
        let received = InventoryService::receive(
            tx,
            &ReceiveRequest {
                legal_entity_id: scope,
                item_id: completion.item_id,
                warehouse_id: completion.warehouse_id,
                quantity: completion.quantity,
                unit_cost: completion.unit_cost_base,
                currency: base.clone(),
                received_on: completion.completed_on,
                source_type: BatchSource::ProductionOutput,
                movement_type: MovementType::ProductionOutput,
                doc_type: DocType::ProductionCompletion,
                doc_id,
                source_doc: None,
                inventory_transaction_id: InventoryTransactionId::new(),
                idempotency_key: movement_keys(DocType::ProductionCompletion, doc_id, generation),
            },
        )?;

        let context = PostingContext::ProductionCompletion {
            production_order_id: doc_id,
        };
        let doc_line_id = context.doc_line_id();
        let line = PostingLine::new(context, received.movement.line_cost_base, base, completion.completed_on)
            .debit(accounts::INVENTORY_FINISHED_GOODS)
            .credit(accounts::WIP_PRODUCTION)
            .with_description(format!("Output of production order {doc_id}"));
        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::ProductionCompletion, doc_id, vec![line]),
        )?;

        let entry = entry_for(&outcome, &doc_line_id)?;
        let mut request = LinkRequest::full(
            entry.id,
            EventRef::StockMovement(received.movement.id),
            LinkRole::Inventory,
        );
        request.inventory_transaction_id = Some(received.movement.inventory_transaction_id);
        request.batch_id = Some(received.batch.id);
        LinkRegistry::link(tx, scope, &request)?;

        Ok(outcome)
    }

    /// Voids a completion while its output is still untouched.
    ///
    /// # Errors
    ///
    /// `Conflict` once any of the output batch was consumed.
    #[instrument(skip(tx, reason))]
    pub fn void_completion<T>(
        tx: &mut T,
        scope: LegalEntityId,
        production_order_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(
            tx,
            scope,
            DocType::ProductionCompletion,
            production_order_id,
            reason,
        )?;
        if !outcome.already_voided {
            let batches = tx.batches_by_source(scope, BatchSource::ProductionOutput, production_order_id)?;
            InventoryService::write_off(
                tx,
                &batches,
                DocType::ProductionCompletion,
                production_order_id,
                voided_on,
            )?;
        }
        Ok(outcome)
    }
}
