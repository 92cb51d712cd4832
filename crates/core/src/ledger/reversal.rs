//! Reversal entries for voiding posted runs.
//!
//! A reversal never edits the original entries. It produces a mirror set
//! with debit and credit swapped and every amount, currency, rate, base
//! amount, posting date and line number preserved.

use tally_shared::types::{AccountingEntryId, PostingRunId};

use super::context::PostingContext;
use super::types::{AccountingEntry, EntryMetadata, PostingRun};

/// Stateless service for creating reversing entries.
pub struct ReversalService;

impl ReversalService {
    /// Mirrors the entries of `original` under `reversal_run_id`.
    ///
    /// Each mirror line gets the key `reversal:<originalRunId>:<docLineId>`
    /// and points back at the entry it reverses.
    #[must_use]
    pub fn reverse_entries(
        original: &PostingRun,
        entries: &[AccountingEntry],
        reversal_run_id: PostingRunId,
    ) -> Vec<AccountingEntry> {
        entries
            .iter()
            .map(|entry| {
                let context = PostingContext::Reversal {
                    original_run_id: original.id,
                    original_doc_line_id: entry.metadata.doc_line_id.clone(),
                };

                AccountingEntry {
                    id: AccountingEntryId::new(),
                    legal_entity_id: entry.legal_entity_id,
                    doc_type: entry.doc_type,
                    doc_id: entry.doc_id,
                    line_number: entry.line_number,
                    posting_date: entry.posting_date,
                    // Swap debit and credit
                    debit_account: entry.credit_account.clone(),
                    credit_account: entry.debit_account.clone(),
                    amount: entry.amount,
                    currency: entry.currency.clone(),
                    exchange_rate: entry.exchange_rate,
                    amount_base: entry.amount_base,
                    metadata: EntryMetadata {
                        doc_line_id: context.doc_line_id(),
                        context,
                        reversal_of_entry_id: Some(entry.id),
                        reversal_of_run_id: Some(original.id),
                    },
                    posting_run_id: reversal_run_id,
                    description: Some(format!(
                        "Reversal: {}",
                        entry.description.clone().unwrap_or_default()
                    )),
                }
            })
            .collect()
    }
}
