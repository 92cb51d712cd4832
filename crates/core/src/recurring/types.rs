//! Recurring journal types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    FinancialDocumentId, JournalRunId, LegalEntityId, Money, PostingRunId, RecurringJournalId,
};

use crate::ledger::context::RecognitionKind;

/// A monthly journal posted once per period between `start_date` and `end_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJournal {
    /// Journal id.
    pub id: RecurringJournalId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Recognition kind.
    pub kind: RecognitionKind,
    /// Document being recognised, if any.
    pub source_document_id: Option<FinancialDocumentId>,
    /// Account debited every period.
    pub debit_account: String,
    /// Account credited every period.
    pub credit_account: String,
    /// Amount per period.
    pub amount: Money,
    /// First day of the first period.
    pub start_date: NaiveDate,
    /// Last day covered, open-ended when `None`.
    pub end_date: Option<NaiveDate>,
    /// Inactive journals are skipped.
    pub active: bool,
    /// Description copied onto entries.
    pub description: String,
}

/// A processed period of a journal, unique on `(journal_id, period_start)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRun {
    /// Run id, also the document id of its posting.
    pub id: JournalRunId,
    /// Journal.
    pub journal_id: RecurringJournalId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// First day of the period.
    pub period_start: NaiveDate,
    /// Last day of the period (the posting date).
    pub period_end: NaiveDate,
    /// Posting run written for the period.
    pub posting_run_id: PostingRunId,
    /// Write timestamp.
    pub created_at: DateTime<Utc>,
}

/// Outcome of one recurring run invocation.
#[derive(Debug, Clone, Default)]
pub struct RecurringRunReport {
    /// Periods posted by this invocation.
    pub posted: Vec<JournalRun>,
    /// `(journal, period_start)` pairs already processed earlier.
    pub skipped: Vec<(RecurringJournalId, NaiveDate)>,
}
