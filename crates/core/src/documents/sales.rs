//! Sales and customer returns.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::types::{CurrencyCode, InventoryTransactionId, ItemId, LegalEntityId, WarehouseId};
use tally_shared::config::LedgerConfig;
use tracing::instrument;
use uuid::Uuid;

use super::{
    already_posted, base_currency, entry_for, movement_keys, movement_parts, posted_generations,
    restock_issued,
};
use crate::currency::CurrencyService;
use crate::inventory::{
    BatchSource, InventoryService, IssueRequest, MovementType, ReceiveRequest, StockMovement,
};
use crate::ledger::accounts;
use crate::ledger::context::{PostingContext, SalesPart};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{LinkRegistry, LinkRole};
use crate::store::LedgerTx;

/// One sold item.
#[derive(Debug, Clone)]
pub struct SalesLine {
    /// Item.
    pub item_id: ItemId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Unit price in the document currency.
    pub unit_price: Decimal,
}

/// A sale shipped from one warehouse.
#[derive(Debug, Clone)]
pub struct SalesDocument {
    /// Document id.
    pub id: Uuid,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Shipping warehouse.
    pub warehouse_id: WarehouseId,
    /// Price currency.
    pub currency: CurrencyCode,
    /// Sale date.
    pub sold_on: NaiveDate,
    /// Sold items.
    pub lines: Vec<SalesLine>,
}

/// One returned item.
#[derive(Debug, Clone)]
pub struct ReturnLine {
    /// Item.
    pub item_id: ItemId,
    /// Positive quantity.
    pub quantity: Decimal,
    /// Refunded unit price in the return currency.
    pub unit_price: Decimal,
}

/// Goods returned against a posted sale.
#[derive(Debug, Clone)]
pub struct SaleReturn {
    /// Return id.
    pub id: Uuid,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// The sale being returned.
    pub sales_document_id: Uuid,
    /// Restocking warehouse.
    pub warehouse_id: WarehouseId,
    /// Refund currency.
    pub currency: CurrencyCode,
    /// Return date.
    pub returned_on: NaiveDate,
    /// Returned items.
    pub lines: Vec<ReturnLine>,
}

/// Sales flows.
pub struct SalesService;

impl SalesService {
    /// Ships the goods at FIFO cost and posts revenue and COGS.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty sale
    /// - `InsufficientStock` if an item is short
    #[instrument(skip_all, fields(sales_document_id = %sale.id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        sale: &SalesDocument,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = sale.legal_entity_id;
        if let Some(posted) = already_posted(tx, scope, DocType::SalesDocument, sale.id)? {
            return Ok(posted);
        }
        if sale.lines.is_empty() {
            return Err(LedgerError::validation("sales document has no lines"));
        }

        let generation = posted_generations(tx, scope, DocType::SalesDocument, sale.id)? + 1;
        let keys = movement_keys(DocType::SalesDocument, sale.id, generation);
        let inventory_transaction_id = InventoryTransactionId::new();
        let mut movements = Vec::new();
        let mut revenue = Decimal::ZERO;
        for (n, line) in (1usize..).zip(&sale.lines) {
            let issue = InventoryService::issue(
                tx,
                &IssueRequest {
                    legal_entity_id: scope,
                    item_id: line.item_id,
                    warehouse_id: sale.warehouse_id,
                    quantity: line.quantity,
                    movement_type: MovementType::Sale,
                    doc_type: DocType::SalesDocument,
                    doc_id: sale.id,
                    inventory_transaction_id,
                    occurred_on: sale.sold_on,
                    key_prefix: format!("{keys}:{n}"),
                    allow_negative: false,
                },
            )?;
            movements.extend(issue.movements);
            revenue += line.quantity * line.unit_price;
        }
        let cogs: Decimal = movements.iter().map(|m| m.line_cost_base).sum();

        let revenue_context = PostingContext::SalesDocument {
            sales_document_id: sale.id,
            part: SalesPart::Revenue,
        };
        let cogs_context = PostingContext::SalesDocument {
            sales_document_id: sale.id,
            part: SalesPart::Cogs,
        };
        let cogs_line_id = cogs_context.doc_line_id();

        let mut lines = vec![
            PostingLine::new(revenue_context, revenue, sale.currency.clone(), sale.sold_on)
                .debit(accounts::ACCOUNTS_RECEIVABLE_MARKETPLACE)
                .credit(accounts::SALES_REVENUE),
        ];
        if cogs > Decimal::ZERO {
            lines.push(
                PostingLine::new(cogs_context, cogs, base_currency(tx, scope)?, sale.sold_on)
                    .debit(accounts::COST_OF_GOODS_SOLD)
                    .credit(accounts::INVENTORY_FINISHED_GOODS),
            );
        }

        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::SalesDocument, sale.id, lines),
        )?;

        if cogs > Decimal::ZERO {
            let entry = entry_for(&outcome, &cogs_line_id)?;
            LinkRegistry::link_fan_out(tx, scope, entry.id, LinkRole::Cogs, &movement_parts(&movements))?;
        }
        Ok(outcome)
    }

    /// Voids a sale and puts the shipped goods back in stock.
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::void`].
    #[instrument(skip(tx, reason))]
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        sales_document_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(tx, scope, DocType::SalesDocument, sales_document_id, reason)?;
        if !outcome.already_voided {
            let shipped = Self::shipped_movements(tx, scope, sales_document_id)?;
            restock_issued(tx, scope, &shipped, DocType::SalesDocument, sales_document_id, voided_on)?;
        }
        Ok(outcome)
    }

    /// Restocks returned goods at the unit cost they were sold at and
    /// posts the refund and the COGS reversal.
    ///
    /// # Errors
    ///
    /// - `Validation` for an empty return or an item the sale never shipped
    /// - `NotFound` if the sale was never shipped
    #[instrument(skip_all, fields(return_id = %sale_return.id))]
    pub fn post_return<T>(
        tx: &mut T,
        config: &LedgerConfig,
        sale_return: &SaleReturn,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = sale_return.legal_entity_id;
        if let Some(posted) = already_posted(tx, scope, DocType::SaleReturn, sale_return.id)? {
            return Ok(posted);
        }
        if sale_return.lines.is_empty() {
            return Err(LedgerError::validation("sale return has no lines"));
        }

        let unit_costs = Self::sold_unit_costs(tx, scope, sale_return.sales_document_id)?;
        let base = base_currency(tx, scope)?;
        let generation = posted_generations(tx, scope, DocType::SaleReturn, sale_return.id)? + 1;
        let keys = movement_keys(DocType::SaleReturn, sale_return.id, generation);
        let inventory_transaction_id = InventoryTransactionId::new();

        let mut movements = Vec::with_capacity(sale_return.lines.len());
        let mut refund = Decimal::ZERO;
        for (n, line) in (1usize..).zip(&sale_return.lines) {
            let unit_cost_base = unit_costs.get(&line.item_id).copied().ok_or_else(|| {
                LedgerError::validation(format!(
                    "item {} was not shipped by sale {}",
                    line.item_id, sale_return.sales_document_id
                ))
            })?;
            let received = InventoryService::receive(
                tx,
                &ReceiveRequest {
                    legal_entity_id: scope,
                    item_id: line.item_id,
                    warehouse_id: sale_return.warehouse_id,
                    quantity: line.quantity,
                    unit_cost: unit_cost_base,
                    currency: base.clone(),
                    received_on: sale_return.returned_on,
                    source_type: BatchSource::SaleReturn,
                    movement_type: MovementType::SaleReturn,
                    doc_type: DocType::SaleReturn,
                    doc_id: sale_return.id,
                    source_doc: Some((DocType::SalesDocument, sale_return.sales_document_id)),
                    inventory_transaction_id,
                    idempotency_key: format!("{keys}:{n}"),
                },
            )?;
            movements.push(received.movement);
            refund += line.quantity * line.unit_price;
        }
        let restocked: Decimal = movements.iter().map(|m| m.line_cost_base).sum();

        let refund_context = PostingContext::SaleReturn {
            return_id: sale_return.id,
            part: SalesPart::Revenue,
        };
        let cogs_context = PostingContext::SaleReturn {
            return_id: sale_return.id,
            part: SalesPart::Cogs,
        };
        let cogs_line_id = cogs_context.doc_line_id();

        let mut lines = vec![
            PostingLine::new(refund_context, refund, sale_return.currency.clone(), sale_return.returned_on)
                .debit(accounts::SALES_RETURNS)
                .credit(accounts::ACCOUNTS_RECEIVABLE_MARKETPLACE),
        ];
        if restocked > Decimal::ZERO {
            lines.push(
                PostingLine::new(cogs_context, restocked, base, sale_return.returned_on)
                    .debit(accounts::INVENTORY_FINISHED_GOODS)
                    .credit(accounts::COST_OF_GOODS_SOLD),
            );
        }

        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::SaleReturn, sale_return.id, lines),
        )?;

        if restocked > Decimal::ZERO {
            let entry = entry_for(&outcome, &cogs_line_id)?;
            LinkRegistry::link_fan_out(tx, scope, entry.id, LinkRole::Refund, &movement_parts(&movements))?;
        }
        Ok(outcome)
    }

    /// Voids a return whose restocked goods are untouched.
    ///
    /// # Errors
    ///
    /// `Conflict` once any restocked batch was consumed.
    #[instrument(skip(tx, reason))]
    pub fn void_return<T>(
        tx: &mut T,
        scope: LegalEntityId,
        return_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(tx, scope, DocType::SaleReturn, return_id, reason)?;
        if !outcome.already_voided {
            let batches = tx.batches_by_source(scope, BatchSource::SaleReturn, return_id)?;
            InventoryService::write_off(tx, &batches, DocType::SaleReturn, return_id, voided_on)?;
        }
        Ok(outcome)
    }

    fn shipped_movements<T>(
        tx: &T,
        scope: LegalEntityId,
        sales_document_id: Uuid,
    ) -> Result<Vec<StockMovement>, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        // The latest generation is the one a live run or a pending void refers to.
        let generation = posted_generations(tx, scope, DocType::SalesDocument, sales_document_id)?;
        let first_key = format!(
            "{}:1:1",
            movement_keys(DocType::SalesDocument, sales_document_id, generation)
        );
        let first = tx
            .movement_by_key(scope, &first_key)?
            .ok_or_else(|| LedgerError::not_found("StockMovement", sales_document_id))?;
        Ok(tx
            .movements_for_transaction(first.inventory_transaction_id)?
            .into_iter()
            .filter(|m| m.movement_type == MovementType::Sale)
            .collect())
    }

    /// Average base unit cost per item shipped by a sale, rounded to 4 dp.
    fn sold_unit_costs<T>(
        tx: &T,
        scope: LegalEntityId,
        sales_document_id: Uuid,
    ) -> Result<HashMap<ItemId, Decimal>, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut totals: HashMap<ItemId, (Decimal, Decimal)> = HashMap::new();
        for movement in Self::shipped_movements(tx, scope, sales_document_id)? {
            let (quantity, cost) = totals.entry(movement.item_id).or_default();
            *quantity -= movement.quantity;
            *cost += movement.line_cost_base;
        }
        Ok(totals
            .into_iter()
            .filter(|(_, (quantity, _))| *quantity > Decimal::ZERO)
            .map(|(item, (quantity, cost))| (item, CurrencyService::round(cost / quantity, 4)))
            .collect())
    }
}
