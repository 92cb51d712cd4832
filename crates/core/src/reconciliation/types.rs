//! Statement reconciliation types.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    FinancialAccountId, LegalEntityId, Money, MoneyTransactionId, PaymentExecutionId,
    StatementLineId,
};

use crate::cash::types::Direction;

/// Statement source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementProvider {
    /// Bank statement.
    Bank,
    /// Marketplace wallet report.
    Marketplace,
    /// Card acquirer report.
    Acquiring,
}

/// Statement line lifecycle.
///
/// `NEW -> SUGGESTED -> MATCHED -> POSTED`, with `REJECTED` reachable from
/// `NEW` and `SUGGESTED`. Any of the first three may become `SPLIT`, which
/// is terminal; its parts continue as new lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementLineStatus {
    /// Imported, not yet searched.
    New,
    /// Ranked candidates stored.
    Suggested,
    /// A target was confirmed.
    Matched,
    /// Settled against a money transaction.
    Posted,
    /// Dismissed by a user.
    Rejected,
    /// Replaced by child lines that carry its amount.
    Split,
}

impl StatementLineStatus {
    /// True while a match may still be suggested, confirmed, or rejected.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::New | Self::Suggested)
    }
}

/// What a statement line can be matched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "entityId", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTarget {
    /// An executed payment.
    PaymentExecution(PaymentExecutionId),
    /// An existing money transaction.
    MoneyTransaction(MoneyTransactionId),
}

/// One ranked candidate stored on a suggested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    /// Candidate entity.
    pub target: MatchTarget,
    /// Total score.
    pub score: u32,
    /// Absolute distance in days between the line and the candidate.
    pub day_distance: i64,
    /// Candidate amount.
    pub amount: Decimal,
    /// Candidate date.
    pub occurred_on: NaiveDate,
}

/// One imported statement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    /// Line id.
    pub id: StatementLineId,
    /// Owning legal entity (that of the account).
    pub legal_entity_id: LegalEntityId,
    /// Account the statement belongs to.
    pub account_id: FinancialAccountId,
    /// Statement source.
    pub provider: StatementProvider,
    /// Provider's row id, the import dedupe key.
    pub external_id: String,
    /// Direction.
    pub direction: Direction,
    /// Amount.
    pub amount: Money,
    /// Booking date.
    pub occurred_on: NaiveDate,
    /// Payment reference.
    pub reference: Option<String>,
    /// Counterparty name.
    pub counterparty: Option<String>,
    /// Free text.
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: StatementLineStatus,
    /// Ranked candidates from the last suggestion.
    pub suggestions: Vec<MatchCandidate>,
    /// Confirmed target.
    pub matched: Option<MatchTarget>,
    /// Money transaction the line was settled with.
    pub posted_money_transaction_id: Option<MoneyTransactionId>,
    /// Reason given on rejection.
    pub reject_reason: Option<String>,
    /// When the line was posted.
    pub posted_at: Option<DateTime<Utc>>,
    /// Line this one was split from.
    pub parent_line_id: Option<StatementLineId>,
}

/// One row of a statement import.
#[derive(Debug, Clone)]
pub struct StatementLineInput {
    /// Provider's row id.
    pub external_id: String,
    /// Direction.
    pub direction: Direction,
    /// Positive amount in the account currency.
    pub amount: Decimal,
    /// Booking date.
    pub occurred_on: NaiveDate,
    /// Payment reference.
    pub reference: Option<String>,
    /// Counterparty name.
    pub counterparty: Option<String>,
    /// Free text.
    pub description: Option<String>,
}

/// One part of a split line. Unset text fields are inherited from the parent.
#[derive(Debug, Clone)]
pub struct SplitPart {
    /// Positive amount in the line currency.
    pub amount: Decimal,
    /// Payment reference.
    pub reference: Option<String>,
    /// Counterparty name.
    pub counterparty: Option<String>,
    /// Free text.
    pub description: Option<String>,
}

/// Result of an import.
#[derive(Debug, Clone, Default)]
pub struct ImportSummary {
    /// Newly created lines.
    pub imported: Vec<StatementLineId>,
    /// External ids already present.
    pub duplicates: Vec<String>,
}
