//! Typed IDs for type-safe entity references.
//!
//! Using typed IDs prevents accidentally passing a `StockBatchId` where a
//! `StockMovementId` is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to generate typed ID wrappers.
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Creates a new random ID using UUID v7 (time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_id!(LegalEntityId, "Unique identifier for a legal entity (tenant scope).");
typed_id!(PostingRunId, "Unique identifier for an accounting posting run.");
typed_id!(AccountingEntryId, "Unique identifier for an accounting entry.");
typed_id!(LinkId, "Unique identifier for an entry-to-event link.");
typed_id!(ItemId, "Unique identifier for a stock item.");
typed_id!(WarehouseId, "Unique identifier for a warehouse.");
typed_id!(StockBatchId, "Unique identifier for a FIFO stock batch.");
typed_id!(StockMovementId, "Unique identifier for a stock movement.");
typed_id!(
    InventoryTransactionId,
    "Correlation id grouping the stock movements of one business action."
);
typed_id!(FinancialAccountId, "Unique identifier for a bank, wallet, or cash account.");
typed_id!(MoneyTransactionId, "Unique identifier for a money transaction.");
typed_id!(PaymentExecutionId, "Unique identifier for a payment execution.");
typed_id!(StatementLineId, "Unique identifier for an imported statement line.");
typed_id!(CashTransferId, "Unique identifier for a marketplace payout transfer.");
typed_id!(InternalTransferId, "Unique identifier for a transfer between own accounts.");
typed_id!(AcquiringEventId, "Unique identifier for an acquiring settlement event.");
typed_id!(FinancialDocumentId, "Unique identifier for a financial document.");
typed_id!(RecurringJournalId, "Unique identifier for a recurring journal.");
typed_id!(JournalRunId, "Unique identifier for one period of a recurring journal.");
typed_id!(OutboxEventId, "Unique identifier for an outbox event.");
