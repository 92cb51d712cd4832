//! Inventory domain types: FIFO cost layers and stock movements.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    CurrencyCode, InventoryTransactionId, ItemId, LegalEntityId, StockBatchId, StockMovementId,
    WarehouseId,
};
use uuid::Uuid;

use crate::ledger::types::DocType;

/// What created a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchSource {
    /// Goods received from a supplier.
    SupplyReceipt,
    /// Output of a production order.
    ProductionOutput,
    /// Goods returned by a customer.
    SaleReturn,
    /// Stock put back when an issue was voided.
    ReversalRestock,
}

/// A FIFO cost layer.
///
/// `quantity` only ever decreases; batches are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBatch {
    /// Batch id.
    pub id: StockBatchId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Item.
    pub item_id: ItemId,
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Creation order, the FIFO key.
    pub sequence: u64,
    /// Quantity at receipt.
    pub initial_quantity: Decimal,
    /// Remaining quantity.
    pub quantity: Decimal,
    /// Unit cost in receipt currency.
    pub unit_cost: Decimal,
    /// Receipt currency.
    pub currency: CurrencyCode,
    /// Rate to base currency on the receipt date.
    pub fx_rate_to_base: Decimal,
    /// Unit cost in base currency, fixed at receipt.
    pub unit_cost_base: Decimal,
    /// What created the batch.
    pub source_type: BatchSource,
    /// Document that created the batch.
    pub source_doc_id: Uuid,
    /// Receipt date.
    pub received_on: NaiveDate,
}

impl StockBatch {
    /// True while units remain.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Units taken out of this batch so far.
    #[must_use]
    pub fn consumed_quantity(&self) -> Decimal {
        self.initial_quantity - self.quantity
    }
}

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Receipt from a supplier.
    Income,
    /// Generic issue.
    Outcome,
    /// Production output received.
    ProductionOutput,
    /// Materials issued to production.
    ProductionInput,
    /// Goods shipped on a sale.
    Sale,
    /// Goods returned by a customer.
    SaleReturn,
    /// Compensation of an earlier movement after a void.
    Reversal,
}

/// One quantity delta against one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    /// Movement id.
    pub id: StockMovementId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Item.
    pub item_id: ItemId,
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Batch, `None` for an uncosted negative-stock shortfall.
    pub batch_id: Option<StockBatchId>,
    /// Signed quantity delta (negative for issues).
    pub quantity: Decimal,
    /// Movement kind.
    pub movement_type: MovementType,
    /// Unit cost in base currency, `None` when uncosted.
    pub unit_cost_base: Option<Decimal>,
    /// Absolute cost of the movement in base currency.
    pub line_cost_base: Decimal,
    /// Groups the movements of one business action.
    pub inventory_transaction_id: InventoryTransactionId,
    /// Document type that caused the movement.
    pub doc_type: DocType,
    /// Document that caused the movement.
    pub doc_id: Uuid,
    /// Upstream document, e.g. the production order behind a consumption.
    pub source_doc_type: Option<DocType>,
    /// Upstream document id.
    pub source_doc_id: Option<Uuid>,
    /// Unique key making the movement write idempotent.
    pub idempotency_key: String,
    /// Business date.
    pub occurred_on: NaiveDate,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

/// One batch's contribution to a FIFO consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSlice {
    /// Batch consumed; `None` for the uncosted shortfall part.
    pub batch_id: Option<StockBatchId>,
    /// Quantity taken.
    pub quantity: Decimal,
    /// Unit cost in base currency, `None` when uncosted.
    pub unit_cost_base: Option<Decimal>,
    /// `quantity * unit_cost_base`, zero when uncosted.
    pub line_cost_base: Decimal,
}

impl CostSlice {
    /// True for the shortfall part of a negative-stock consumption.
    #[must_use]
    pub fn is_uncosted(&self) -> bool {
        self.batch_id.is_none()
    }
}
