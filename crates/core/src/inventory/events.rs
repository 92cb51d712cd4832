//! `INVENTORY.STOCK_CHANGED` events and the transactional outbox record.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    InventoryTransactionId, ItemId, LegalEntityId, OutboxEventId, StockBatchId, StockMovementId,
    WarehouseId,
};
use uuid::Uuid;

use super::types::{MovementType, StockMovement};
use crate::ledger::error::LedgerError;
use crate::ledger::types::DocType;

/// Event type emitted once per stock movement.
pub const STOCK_CHANGED: &str = "INVENTORY.STOCK_CHANGED";

/// Payload schema version.
pub const STOCK_CHANGED_VERSION: u32 = 1;

/// Payload of an `INVENTORY.STOCK_CHANGED` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangedEvent {
    /// Always `STOCK_CHANGED`.
    pub event_type: String,
    /// Payload schema version.
    pub event_version: u32,
    /// When the movement was written.
    pub occurred_at: DateTime<Utc>,
    /// Warehouse.
    pub warehouse_id: WarehouseId,
    /// Item.
    pub item_id: ItemId,
    /// Movement that caused the event.
    pub movement_id: StockMovementId,
    /// Signed quantity delta.
    pub qty_delta: Decimal,
    /// Movement kind.
    pub movement_type: MovementType,
    /// Correlation id shared by all movements of one action.
    pub inventory_transaction_id: InventoryTransactionId,
    /// Batch, absent for uncosted shortfalls.
    pub batch_id: Option<StockBatchId>,
    /// Upstream document type.
    pub source_doc_type: Option<DocType>,
    /// Upstream document id.
    pub source_doc_id: Option<Uuid>,
    /// Document type that caused the movement.
    pub doc_type: DocType,
    /// Document that caused the movement.
    pub doc_id: Uuid,
}

impl StockChangedEvent {
    /// Builds the payload for a movement.
    #[must_use]
    pub fn from_movement(movement: &StockMovement) -> Self {
        Self {
            event_type: "STOCK_CHANGED".to_string(),
            event_version: STOCK_CHANGED_VERSION,
            occurred_at: movement.created_at,
            warehouse_id: movement.warehouse_id,
            item_id: movement.item_id,
            movement_id: movement.id,
            qty_delta: movement.quantity,
            movement_type: movement.movement_type,
            inventory_transaction_id: movement.inventory_transaction_id,
            batch_id: movement.batch_id,
            source_doc_type: movement.source_doc_type,
            source_doc_id: movement.source_doc_id,
            doc_type: movement.doc_type,
            doc_id: movement.doc_id,
        }
    }
}

/// A domain event persisted in the same transaction as the change it reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Event id.
    pub id: OutboxEventId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Routing key, e.g. [`STOCK_CHANGED`].
    pub event_type: String,
    /// Aggregate the event belongs to (`<warehouseId>:<itemId>` for stock).
    pub aggregate_id: String,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// When the event was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Wraps a stock movement as an outbox event.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Internal` if the payload cannot be serialized.
    pub fn stock_changed(movement: &StockMovement) -> Result<Self, LedgerError> {
        let payload = serde_json::to_value(StockChangedEvent::from_movement(movement))
            .map_err(|e| LedgerError::Internal(format!("stock event payload: {e}")))?;

        Ok(Self {
            id: OutboxEventId::new(),
            legal_entity_id: movement.legal_entity_id,
            event_type: STOCK_CHANGED.to_string(),
            aggregate_id: format!("{}:{}", movement.warehouse_id, movement.item_id),
            payload,
            occurred_at: movement.created_at,
        })
    }
}
