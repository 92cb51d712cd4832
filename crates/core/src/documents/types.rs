//! Documents owned by outer modules that the ledger posts and explains.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    AcquiringEventId, FinancialAccountId, FinancialDocumentId, LegalEntityId, Money,
    StatementLineId,
};

/// A supplier bill or similar document accrued in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialDocument {
    /// Document id.
    pub id: FinancialDocumentId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Document number.
    pub number: String,
    /// Supplier or customer.
    pub counterparty: Option<String>,
    /// Total amount.
    pub amount: Money,
    /// Issue date (the accrual date).
    pub issued_on: NaiveDate,
    /// Account debited on accrual (expense or prepaid asset).
    pub debit_account: String,
    /// Account credited on accrual (usually payables).
    pub credit_account: String,
}

/// A card acquiring settlement reported by the acquirer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquiringEvent {
    /// Event id.
    pub id: AcquiringEventId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Acquiring account the settlement belongs to.
    pub account_id: FinancialAccountId,
    /// Gross card sales settled.
    pub gross: Money,
    /// Commission withheld by the acquirer.
    pub fee: Money,
    /// Settlement date.
    pub settled_on: NaiveDate,
    /// Acquirer statement line reporting the event, if imported.
    pub statement_line_id: Option<StatementLineId>,
}
