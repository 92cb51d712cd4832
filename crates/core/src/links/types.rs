//! Link types associating accounting entries with domain events.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    AccountingEntryId, AcquiringEventId, InventoryTransactionId, LegalEntityId, LinkId,
    MoneyTransactionId, PostingRunId, StockBatchId, StockMovementId,
};

/// Link family, one per persisted link table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkKind {
    /// Entry to money transaction.
    Cash,
    /// Entry to stock movement.
    Inventory,
    /// Entry to acquiring event.
    Acquiring,
}

/// The domain event a link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum EventRef {
    /// A money transaction.
    MoneyTransaction(MoneyTransactionId),
    /// A stock movement.
    StockMovement(StockMovementId),
    /// An acquiring event.
    AcquiringEvent(AcquiringEventId),
}

impl EventRef {
    /// Link family of this event.
    #[must_use]
    pub const fn kind(&self) -> LinkKind {
        match self {
            Self::MoneyTransaction(_) => LinkKind::Cash,
            Self::StockMovement(_) => LinkKind::Inventory,
            Self::AcquiringEvent(_) => LinkKind::Acquiring,
        }
    }

    /// `Type:id` key used for batched lookups.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::MoneyTransaction(id) => format!("MoneyTransaction:{id}"),
            Self::StockMovement(id) => format!("StockMovement:{id}"),
            Self::AcquiringEvent(id) => format!("AcquiringEvent:{id}"),
        }
    }
}

/// Role an event plays for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkRole {
    /// Cash that settled the entry's principal.
    PaymentPrincipal,
    /// One leg of an internal transfer.
    Transfer,
    /// Fee withheld by a marketplace or acquirer.
    Fee,
    /// Cost of goods shipped.
    Cogs,
    /// Stock received or issued at cost.
    Inventory,
    /// Settled principal of an acquiring event.
    Principal,
    /// Stock returned by a customer.
    Refund,
}

/// One persisted association between an entry and an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Link id.
    pub id: LinkId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Entry side.
    pub entry_id: AccountingEntryId,
    /// Event side.
    pub event: EventRef,
    /// Role.
    pub role: LinkRole,
    /// Share of the entry's base amount carried by this link.
    pub amount_base: Decimal,
    /// Run that created the link (always the entry's run).
    pub posting_run_id: PostingRunId,
    /// Inventory transaction, for inventory links.
    pub inventory_transaction_id: Option<InventoryTransactionId>,
    /// Batch, for inventory links.
    pub batch_id: Option<StockBatchId>,
    /// Link this one compensates, for links created by a reversal run.
    pub compensates_link_id: Option<LinkId>,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

/// Request for a single link.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Entry side.
    pub entry_id: AccountingEntryId,
    /// Event side.
    pub event: EventRef,
    /// Role.
    pub role: LinkRole,
    /// Share of the entry; `None` means the entry's full base amount.
    pub amount_base: Option<Decimal>,
    /// Inventory transaction, for inventory links.
    pub inventory_transaction_id: Option<InventoryTransactionId>,
    /// Batch, for inventory links.
    pub batch_id: Option<StockBatchId>,
}

impl LinkRequest {
    /// Links the whole entry to an event.
    #[must_use]
    pub fn full(entry_id: AccountingEntryId, event: EventRef, role: LinkRole) -> Self {
        Self {
            entry_id,
            event,
            role,
            amount_base: None,
            inventory_transaction_id: None,
            batch_id: None,
        }
    }
}

/// One part of a fan-out link set.
#[derive(Debug, Clone)]
pub struct FanOutPart {
    /// Event side.
    pub event: EventRef,
    /// Share of the entry's base amount.
    pub amount_base: Decimal,
    /// Inventory transaction, for inventory links.
    pub inventory_transaction_id: Option<InventoryTransactionId>,
    /// Batch, for inventory links.
    pub batch_id: Option<StockBatchId>,
}
