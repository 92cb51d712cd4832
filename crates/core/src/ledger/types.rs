//! Ledger domain types for posting runs and accounting entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountingEntryId, CurrencyCode, LegalEntityId, PostingRunId};
use uuid::Uuid;

use super::context::PostingContext;

/// Business document types that produce accounting entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    /// Goods received from a supplier.
    SupplyReceipt,
    /// Outgoing payment.
    PaymentExecution,
    /// Sale.
    SalesDocument,
    /// Customer return.
    SaleReturn,
    /// Finished goods output of a production order.
    ProductionCompletion,
    /// Materials issued to a production order.
    ProductionConsumption,
    /// Accrual of a financial document.
    FinancialDocumentAccrual,
    /// Periodic recognition of a financial document.
    FinancialDocumentRecognition,
    /// Marketplace payout moved to the bank.
    MarketplacePayoutTransfer,
    /// Card acquiring settlement.
    AcquiringEvent,
    /// Money moved between two own financial accounts.
    InternalTransfer,
    /// Marketplace fee charged on a wallet statement line.
    StatementLineFee,
}

impl DocType {
    /// Returns the persisted code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SupplyReceipt => "SUPPLY_RECEIPT",
            Self::PaymentExecution => "PAYMENT_EXECUTION",
            Self::SalesDocument => "SALES_DOCUMENT",
            Self::SaleReturn => "SALE_RETURN",
            Self::ProductionCompletion => "PRODUCTION_COMPLETION",
            Self::ProductionConsumption => "PRODUCTION_CONSUMPTION",
            Self::FinancialDocumentAccrual => "FINANCIAL_DOCUMENT_ACCRUAL",
            Self::FinancialDocumentRecognition => "FINANCIAL_DOCUMENT_RECOGNITION",
            Self::MarketplacePayoutTransfer => "MARKETPLACE_PAYOUT_TRANSFER",
            Self::AcquiringEvent => "ACQUIRING_EVENT",
            Self::InternalTransfer => "INTERNAL_TRANSFER",
            Self::StatementLineFee => "STATEMENT_LINE_FEE",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of posting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingRunKind {
    /// First posting (or repost) of a document.
    Original,
    /// Compensating mirror of an original run.
    Reversal,
}

/// A legal entity (tenant) and its reporting currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalEntity {
    /// Entity id, used as the scope of every ledger operation.
    pub id: LegalEntityId,
    /// Display name.
    pub name: String,
    /// Base currency all entries are converted into.
    pub base_currency: CurrencyCode,
}

/// One atomic set of ledger writes for a business document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRun {
    /// Run id.
    pub id: PostingRunId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Document type.
    pub doc_type: DocType,
    /// Document id.
    pub doc_id: Uuid,
    /// Monotonic version per `(doc_type, doc_id)`, starting at 1.
    pub version: u32,
    /// Original or reversal.
    pub kind: PostingRunKind,
    /// For a reversal run: the run it reverses.
    pub reversed_run_id: Option<PostingRunId>,
    /// For an original run: the reversal that voided it.
    pub reversal_run_id: Option<PostingRunId>,
    /// Reason given when voiding (set on both runs).
    pub void_reason: Option<String>,
    /// When the run was written.
    pub posted_at: DateTime<Utc>,
    /// When the original run was voided.
    pub voided_at: Option<DateTime<Utc>>,
}

impl PostingRun {
    /// True for an original run that has not been reversed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.kind == PostingRunKind::Original && self.reversal_run_id.is_none()
    }
}

/// Metadata stored with every accounting entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Stable idempotency key of the line.
    pub doc_line_id: String,
    /// Typed context the line was posted with.
    pub context: PostingContext,
    /// Entry this line mirrors, for reversal entries.
    pub reversal_of_entry_id: Option<AccountingEntryId>,
    /// Run this line mirrors, for reversal entries.
    pub reversal_of_run_id: Option<PostingRunId>,
}

/// One immutable ledger line.
///
/// A line carries a debit account, a credit account, or both; at least one
/// side is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingEntry {
    /// Entry id.
    pub id: AccountingEntryId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Document type.
    pub doc_type: DocType,
    /// Document id.
    pub doc_id: Uuid,
    /// 1-based position inside the run.
    pub line_number: u32,
    /// Accounting date.
    pub posting_date: NaiveDate,
    /// Debited account code.
    pub debit_account: Option<String>,
    /// Credited account code.
    pub credit_account: Option<String>,
    /// Amount in original currency.
    pub amount: Decimal,
    /// Original currency.
    pub currency: CurrencyCode,
    /// Rate applied to reach base currency.
    pub exchange_rate: Decimal,
    /// Amount in the entity's base currency.
    pub amount_base: Decimal,
    /// Idempotency key, context and reversal pointers.
    pub metadata: EntryMetadata,
    /// Run that wrote this entry.
    pub posting_run_id: PostingRunId,
    /// Free-text description.
    pub description: Option<String>,
}

impl AccountingEntry {
    /// Stable idempotency key of this line.
    #[must_use]
    pub fn doc_line_id(&self) -> &str {
        &self.metadata.doc_line_id
    }

    /// True if either side of the entry posts to `account`.
    #[must_use]
    pub fn touches(&self, account: &str) -> bool {
        self.debit_account.as_deref() == Some(account)
            || self.credit_account.as_deref() == Some(account)
    }
}

/// One requested line of a posting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingLine {
    /// Typed context; also determines `doc_line_id`.
    pub context: PostingContext,
    /// Debited account code.
    pub debit_account: Option<String>,
    /// Credited account code.
    pub credit_account: Option<String>,
    /// Positive amount in `currency`.
    pub amount: Decimal,
    /// Original currency.
    pub currency: CurrencyCode,
    /// Accounting date; also the rate date.
    pub posting_date: NaiveDate,
    /// Free-text description.
    pub description: Option<String>,
}

impl PostingLine {
    /// Creates a line without accounts; add them with [`debit`](Self::debit)
    /// and [`credit`](Self::credit).
    #[must_use]
    pub fn new(
        context: PostingContext,
        amount: Decimal,
        currency: CurrencyCode,
        posting_date: NaiveDate,
    ) -> Self {
        Self {
            context,
            debit_account: None,
            credit_account: None,
            amount,
            currency,
            posting_date,
            description: None,
        }
    }

    /// Sets the debit account.
    #[must_use]
    pub fn debit(mut self, account: impl Into<String>) -> Self {
        self.debit_account = Some(account.into());
        self
    }

    /// Sets the credit account.
    #[must_use]
    pub fn credit(mut self, account: impl Into<String>) -> Self {
        self.credit_account = Some(account.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stable idempotency key of this line.
    #[must_use]
    pub fn doc_line_id(&self) -> String {
        self.context.doc_line_id()
    }

    /// True if the stored entry was produced from an identical request line.
    #[must_use]
    pub fn matches_entry(&self, entry: &AccountingEntry) -> bool {
        entry.doc_line_id() == self.doc_line_id()
            && entry.debit_account == self.debit_account
            && entry.credit_account == self.credit_account
            && entry.amount == self.amount
            && entry.currency == self.currency
            && entry.posting_date == self.posting_date
    }
}

/// Request to post a document.
#[derive(Debug, Clone)]
pub struct PostingRequest {
    /// Scope the document belongs to.
    pub legal_entity_id: LegalEntityId,
    /// Document type.
    pub doc_type: DocType,
    /// Document id.
    pub doc_id: Uuid,
    /// Lines to post.
    pub lines: Vec<PostingLine>,
}

impl PostingRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(
        legal_entity_id: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
        lines: Vec<PostingLine>,
    ) -> Self {
        Self {
            legal_entity_id,
            doc_type,
            doc_id,
            lines,
        }
    }
}

/// Result of [`PostingEngine::post`](super::PostingEngine::post).
#[derive(Debug, Clone)]
pub struct PostingOutcome {
    /// The live original run.
    pub run: PostingRun,
    /// Its entries, by line number.
    pub entries: Vec<AccountingEntry>,
    /// False when an existing run was returned.
    pub created: bool,
}

/// Result of voiding a document or run.
#[derive(Debug, Clone)]
pub struct VoidOutcome {
    /// The original run, now reversed.
    pub original: PostingRun,
    /// The reversal run.
    pub reversal: PostingRun,
    /// Entries of the reversal run.
    pub reversal_entries: Vec<AccountingEntry>,
    /// True when the reversal already existed.
    pub already_voided: bool,
}

/// Result of a repost.
#[derive(Debug, Clone)]
pub struct RepostOutcome {
    /// The void step, if a live run existed and differed.
    pub voided: Option<VoidOutcome>,
    /// The fresh posting.
    pub posted: PostingOutcome,
}
