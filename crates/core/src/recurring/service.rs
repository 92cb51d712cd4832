//! Monthly recognition runs.

use chrono::{Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{JournalRunId, LegalEntityId};
use tracing::{debug, info, instrument};

use super::types::{JournalRun, RecurringJournal, RecurringRunReport};
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingRequest};
use crate::ledger::PostingEngine;
use crate::store::LedgerTx;

/// Recurring journal runner.
pub struct RecurringService;

impl RecurringService {
    /// Registers a journal.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount, equal accounts or an end
    ///   date before the start date
    /// - `DuplicateKey` if the journal id exists
    pub fn register<T>(tx: &mut T, journal: RecurringJournal) -> Result<(), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        if journal.amount.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("recurring amount must be positive"));
        }
        if journal.debit_account == journal.credit_account {
            return Err(LedgerError::validation(
                "recurring journal must debit and credit different accounts",
            ));
        }
        if journal.end_date.is_some_and(|end| end < journal.start_date) {
            return Err(LedgerError::validation("recurring journal ends before it starts"));
        }
        tx.insert_journal(journal)
    }

    /// Posts every unprocessed month between `from` and `to` for each active
    /// journal of the entity.
    ///
    /// A month is processed at most once per journal: the run reserves
    /// `(journal_id, period_start)` and later invocations report it as
    /// skipped. Entries are dated on the last day of the month.
    ///
    /// # Errors
    ///
    /// - `Validation` if `from` is after `to`
    /// - any error of [`PostingEngine::post`]
    #[instrument(skip(tx, config))]
    pub fn run<T>(
        tx: &mut T,
        config: &LedgerConfig,
        scope: LegalEntityId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RecurringRunReport, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        if from > to {
            return Err(LedgerError::validation(format!(
                "recurring range starts after it ends: {from} > {to}"
            )));
        }

        let mut report = RecurringRunReport::default();
        for journal in tx.journals(scope)? {
            let first = month_start(journal.start_date).max(month_start(from));
            let last = match journal.end_date {
                Some(end) => month_start(end).min(month_start(to)),
                None => month_start(to),
            };

            let mut period_start = first;
            while period_start <= last {
                if tx.journal_run(journal.id, period_start)?.is_some() {
                    debug!(journal_id = %journal.id, %period_start, "period already processed");
                    report.skipped.push((journal.id, period_start));
                } else {
                    report.posted.push(Self::post_period(tx, config, &journal, period_start)?);
                }
                period_start = next_month(period_start)?;
            }
        }

        info!(
            posted = report.posted.len(),
            skipped = report.skipped.len(),
            "recurring run finished"
        );
        Ok(report)
    }

    fn post_period<T>(
        tx: &mut T,
        config: &LedgerConfig,
        journal: &RecurringJournal,
        period_start: NaiveDate,
    ) -> Result<JournalRun, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let period_end = next_month(period_start)?
            .pred_opt()
            .ok_or_else(|| LedgerError::Internal("period end out of range".to_string()))?;
        let run_id = JournalRunId::new();

        let description = if journal.description.trim().is_empty() {
            format!("Recurring journal {:?} for {}", journal.kind, period_start.format("%Y-%m"))
        } else {
            journal.description.clone()
        };
        let line = PostingLine::new(
            PostingContext::Recognition {
                journal_id: journal.id,
                source_document_id: journal.source_document_id,
                kind: journal.kind,
                period_start,
            },
            journal.amount.amount,
            journal.amount.currency.clone(),
            period_end,
        )
        .debit(journal.debit_account.clone())
        .credit(journal.credit_account.clone())
        .with_description(description);

        let posting = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(
                journal.legal_entity_id,
                DocType::FinancialDocumentRecognition,
                run_id.into(),
                vec![line],
            ),
        )?;

        let run = JournalRun {
            id: run_id,
            journal_id: journal.id,
            legal_entity_id: journal.legal_entity_id,
            period_start,
            period_end,
            posting_run_id: posting.run.id,
            created_at: Utc::now(),
        };
        tx.insert_journal_run(run.clone())?;
        debug!(journal_id = %journal.id, %period_start, run_id = %run.id, "period posted");
        Ok(run)
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Days::new(u64::from(date.day0()))
}

fn next_month(period_start: NaiveDate) -> Result<NaiveDate, LedgerError> {
    period_start
        .checked_add_months(Months::new(1))
        .ok_or_else(|| LedgerError::Internal(format!("no month after {period_start}")))
}
