//! Explain graph types.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    AccountingEntryId, AcquiringEventId, CurrencyCode, FinancialDocumentId, LegalEntityId,
    MoneyTransactionId, PageMeta, PaymentExecutionId, StatementLineId,
};
use uuid::Uuid;

use crate::cash::types::Direction;
use crate::ledger::balance::AccountTurnover;
use crate::ledger::types::DocType;
use crate::links::types::{EventRef, LinkKind, LinkRole};

/// Entity an explain request starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum EntityRef {
    /// Executed payment.
    PaymentExecution(PaymentExecutionId),
    /// Financial document (accrual and recognitions).
    FinancialDocument(FinancialDocumentId),
    /// Imported statement line.
    StatementLine(StatementLineId),
    /// Acquiring settlement.
    AcquiringEvent(AcquiringEventId),
    /// Money transaction.
    MoneyTransaction(MoneyTransactionId),
}

/// Kind of a primary document reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimaryKind {
    /// Financial document.
    FinancialDocument,
    /// Payment execution.
    PaymentExecution,
    /// Statement line.
    StatementLine,
    /// Money transaction.
    MoneyTransaction,
    /// Cash transfer.
    CashTransfer,
    /// Supply receipt.
    SupplyReceipt,
    /// Production order.
    ProductionOrder,
    /// Inventory transaction.
    InventoryTransaction,
    /// Stock movement.
    StockMovement,
    /// Sales document.
    SalesDocument,
    /// Customer return.
    SaleReturn,
    /// Acquiring event.
    AcquiringEvent,
    /// Transfer between own accounts.
    InternalTransfer,
}

impl PrimaryKind {
    /// Type name used in lookup keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FinancialDocument => "FinancialDocument",
            Self::PaymentExecution => "PaymentExecution",
            Self::StatementLine => "StatementLine",
            Self::MoneyTransaction => "MoneyTransaction",
            Self::CashTransfer => "CashTransfer",
            Self::SupplyReceipt => "SupplyReceipt",
            Self::ProductionOrder => "ProductionOrder",
            Self::InventoryTransaction => "InventoryTransaction",
            Self::StockMovement => "StockMovement",
            Self::SalesDocument => "SalesDocument",
            Self::SaleReturn => "SaleReturn",
            Self::AcquiringEvent => "AcquiringEvent",
            Self::InternalTransfer => "InternalTransfer",
        }
    }

    /// `Type:id` key.
    #[must_use]
    pub fn key(self, id: impl Into<Uuid>) -> String {
        format!("{}:{}", self.as_str(), id.into())
    }
}

/// A document an explain item traces back to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryRef {
    /// Document kind.
    pub kind: PrimaryKind,
    /// Document id.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Secondary display text.
    pub subtitle: Option<String>,
}

impl PrimaryRef {
    /// `Type:id` key.
    #[must_use]
    pub fn key(&self) -> String {
        self.kind.key(self.id)
    }
}

/// One link edge of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainLink {
    /// Link family.
    pub kind: LinkKind,
    /// Role.
    pub role: LinkRole,
    /// Event side.
    pub event: EventRef,
    /// Entry side.
    pub entry_id: AccountingEntryId,
    /// Share of the entry carried by the link.
    pub amount_base: Decimal,
}

/// Kind of explain item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExplainItemKind {
    /// The requested entity itself.
    Doc,
    /// A ledger line.
    AccountingEntryLine,
    /// A cash movement.
    MoneyTransaction,
    /// A statement line.
    StatementLine,
}

/// One node of the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainItem {
    /// Item kind.
    pub kind: ExplainItemKind,
    /// Item id.
    pub id: Uuid,
    /// Business or posting date.
    pub occurred_on: NaiveDate,
    /// Base amount, where known.
    pub amount_base: Option<Decimal>,
    /// Original currency.
    pub currency: CurrencyCode,
    /// Cash direction, for cash items.
    pub direction: Option<Direction>,
    /// Debited account, for entry lines.
    pub debit_account: Option<String>,
    /// Credited account, for entry lines.
    pub credit_account: Option<String>,
    /// Document type, for entry lines.
    pub doc_type: Option<DocType>,
    /// Document id, for entry lines.
    pub doc_id: Option<Uuid>,
    /// Line number inside its run, for entry lines.
    pub line_number: Option<u32>,
    /// Stable line key, for entry lines.
    pub doc_line_id: Option<String>,
    /// Display title.
    pub title: String,
    /// Link edges touching the item.
    pub links: Vec<ExplainLink>,
    /// Documents the item traces back to.
    pub primary: Vec<PrimaryRef>,
}

/// What the explain payload was built for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExplainContext {
    /// Drill-down of one account over a date range.
    Account {
        /// Account code.
        account: String,
        /// First posting date.
        from: NaiveDate,
        /// Last posting date.
        to: NaiveDate,
        /// Turnover over the whole range, not just the page.
        turnover: AccountTurnover,
    },
    /// One-hop graph around an entity.
    Entity {
        /// Starting entity.
        entity: EntityRef,
    },
}

/// Read-only explain result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainPayload {
    /// Scope the payload was read in.
    pub legal_entity_id: LegalEntityId,
    /// Request context.
    pub context: ExplainContext,
    /// Items: the entity first, then cash and statement items, then entry
    /// lines by posting date and line number, newest first.
    pub items: Vec<ExplainItem>,
    /// Paging of entry lines, for account drill-downs.
    pub page: Option<PageMeta>,
}
