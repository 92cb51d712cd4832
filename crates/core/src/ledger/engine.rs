//! The posting engine: the single choke point that writes ledger entries.
//!
//! Guarantees, all within the caller's store transaction:
//! 1. At most one live ORIGINAL run per `(doc_type, doc_id)`; posting again
//!    returns the live run after checking the requested lines still match
//! 2. Every run balances in base currency within the configured tolerance
//! 3. Voids add a mirrored REVERSAL run and never edit or delete entries
//! 4. Voiding twice returns the first reversal

use std::collections::HashSet;

use chrono::Utc;
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{AccountingEntryId, LegalEntityId, PostingRunId};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::balance::RunTotals;
use super::error::LedgerError;
use super::guards::VoidGuards;
use super::reversal::ReversalService;
use super::types::{
    AccountingEntry, DocType, EntryMetadata, LegalEntity, PostingLine, PostingOutcome,
    PostingRequest, PostingRun, PostingRunKind, RepostOutcome, VoidOutcome,
};
use crate::currency::CurrencyConverter;
use crate::links::LinkRegistry;
use crate::store::{LedgerTx, StoreResult};

/// Stateless posting engine.
pub struct PostingEngine;

impl PostingEngine {
    /// Posts a document.
    ///
    /// # Errors
    ///
    /// - `Validation` for malformed lines
    /// - `NoExchangeRate` if a line currency cannot be converted
    /// - `Unbalanced` if the run does not balance in base currency
    /// - `Integrity` if a live run exists with different lines
    /// - `DuplicateKey` if a concurrent writer created the run first
    #[instrument(skip_all, fields(doc_type = %request.doc_type, doc_id = %request.doc_id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        request: &PostingRequest,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        Self::validate(request)?;
        let entity = Self::legal_entity(tx, request.legal_entity_id)?;

        let runs = tx.runs_for_document(request.legal_entity_id, request.doc_type, request.doc_id)?;
        if let Some(live) = runs.iter().find(|run| run.is_live()) {
            let entries = tx.entries_for_run(live.id)?;
            Self::verify_replay(request, &entries)?;
            debug!(run_id = %live.id, "document already posted, returning live run");
            return Ok(PostingOutcome {
                run: live.clone(),
                entries,
                created: false,
            });
        }

        let run = PostingRun {
            id: PostingRunId::new(),
            legal_entity_id: request.legal_entity_id,
            doc_type: request.doc_type,
            doc_id: request.doc_id,
            version: Self::next_version(&runs),
            kind: PostingRunKind::Original,
            reversed_run_id: None,
            reversal_run_id: None,
            void_reason: None,
            posted_at: Utc::now(),
            voided_at: None,
        };

        let entries = Self::resolve_entries(tx, &entity, request, run.id)?;

        let totals = RunTotals::from_entries(&entries);
        if !totals.is_balanced(config.balance_tolerance) {
            return Err(LedgerError::Unbalanced {
                debit: totals.debit,
                credit: totals.credit,
            });
        }

        tx.insert_run(run.clone())?;
        tx.insert_entries(&entries)?;

        info!(
            run_id = %run.id,
            version = run.version,
            lines = entries.len(),
            total_base = %totals.debit,
            "posting run created"
        );

        Ok(PostingOutcome {
            run,
            entries,
            created: true,
        })
    }

    /// Voids the live run of a document by writing a reversal run.
    ///
    /// Calling it again after a successful void returns the same reversal.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the document was never posted
    /// - `Conflict` if downstream state depends on the live run
    #[instrument(skip(tx, reason))]
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let runs = tx.runs_for_document(scope, doc_type, doc_id)?;

        if let Some(live) = runs.iter().find(|run| run.is_live()) {
            VoidGuards::check(tx, live)?;
            return Self::reverse(tx, live.clone(), reason);
        }

        let last_original = runs
            .iter()
            .filter(|run| run.kind == PostingRunKind::Original)
            .max_by_key(|run| run.version)
            .ok_or_else(|| LedgerError::not_found("PostingRun", doc_id))?;

        debug!(run_id = %last_original.id, "document already voided, returning reversal");
        Self::existing_reversal(tx, last_original)
    }

    /// Voids a specific run.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the run is not in scope
    /// - `Conflict` for a reversal run or live dependents
    /// - `AlreadyReversed` if the run was reversed and the document has since
    ///   been reposted (a stale request)
    #[instrument(skip(tx, reason))]
    pub fn void_run<T>(
        tx: &mut T,
        scope: LegalEntityId,
        run_id: PostingRunId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let run = tx
            .find_run(scope, run_id)?
            .ok_or_else(|| LedgerError::not_found("PostingRun", run_id))?;

        if run.kind == PostingRunKind::Reversal {
            return Err(LedgerError::conflict(format!(
                "posting run {run_id} is a reversal and cannot be voided"
            )));
        }

        if run.is_live() {
            VoidGuards::check(tx, &run)?;
            return Self::reverse(tx, run, reason);
        }

        let superseded = tx
            .runs_for_document(scope, run.doc_type, run.doc_id)?
            .iter()
            .any(PostingRun::is_live);
        if superseded {
            return Err(LedgerError::AlreadyReversed(run_id));
        }

        Self::existing_reversal(tx, &run)
    }

    /// Replaces the posting of a document: voids the live run (if any) and
    /// posts the corrected lines as a new original run.
    ///
    /// A repost whose lines equal the live run's lines changes nothing.
    ///
    /// # Errors
    ///
    /// Any error of [`post`](Self::post) or [`void`](Self::void).
    #[instrument(skip_all, fields(doc_type = %request.doc_type, doc_id = %request.doc_id))]
    pub fn repost<T>(
        tx: &mut T,
        config: &LedgerConfig,
        request: &PostingRequest,
        reason: &str,
    ) -> Result<RepostOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        Self::validate(request)?;

        let voided = match Self::live_run(tx, request.legal_entity_id, request.doc_type, request.doc_id)? {
            Some(live) => {
                let entries = tx.entries_for_run(live.id)?;
                if Self::verify_replay(request, &entries).is_ok() {
                    debug!(run_id = %live.id, "repost lines unchanged");
                    return Ok(RepostOutcome {
                        voided: None,
                        posted: PostingOutcome {
                            run: live,
                            entries,
                            created: false,
                        },
                    });
                }
                Some(Self::void(
                    tx,
                    request.legal_entity_id,
                    request.doc_type,
                    request.doc_id,
                    reason,
                )?)
            }
            None => None,
        };

        let posted = Self::post(tx, config, request)?;
        Ok(RepostOutcome { voided, posted })
    }

    /// Returns the live original run of a document, if any.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn live_run<T>(
        tx: &T,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
    ) -> StoreResult<Option<PostingRun>>
    where
        T: LedgerTx + ?Sized,
    {
        Ok(tx
            .runs_for_document(scope, doc_type, doc_id)?
            .into_iter()
            .find(PostingRun::is_live))
    }

    /// Returns the live entry with the given `doc_line_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document has no live run or no such line.
    pub fn live_entry<T>(
        tx: &T,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
        doc_line_id: &str,
    ) -> Result<AccountingEntry, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let run = Self::live_run(tx, scope, doc_type, doc_id)?
            .ok_or_else(|| LedgerError::not_found("PostingRun", doc_id))?;
        tx.entries_for_run(run.id)?
            .into_iter()
            .find(|entry| entry.doc_line_id() == doc_line_id)
            .ok_or_else(|| LedgerError::not_found("AccountingEntry", doc_id))
    }

    fn validate(request: &PostingRequest) -> Result<(), LedgerError> {
        if request.lines.is_empty() {
            return Err(LedgerError::validation("posting run must have at least one line"));
        }

        let mut keys = HashSet::with_capacity(request.lines.len());
        for line in &request.lines {
            let key = line.doc_line_id();

            match line.context.doc_type() {
                Some(doc_type) if doc_type == request.doc_type => {}
                Some(doc_type) => {
                    return Err(LedgerError::validation(format!(
                        "line {key} has a {doc_type} context in a {} run",
                        request.doc_type
                    )));
                }
                None => {
                    return Err(LedgerError::validation(format!(
                        "line {key}: reversal lines are only written by void"
                    )));
                }
            }
            if line.amount <= Decimal::ZERO {
                return Err(LedgerError::validation(format!(
                    "line {key}: amount must be positive"
                )));
            }
            if line.debit_account.is_none() && line.credit_account.is_none() {
                return Err(LedgerError::validation(format!(
                    "line {key}: debit or credit account required"
                )));
            }
            if line.debit_account.is_some() && line.debit_account == line.credit_account {
                return Err(LedgerError::validation(format!(
                    "line {key}: debit and credit accounts must differ"
                )));
            }
            if !keys.insert(key.clone()) {
                return Err(LedgerError::validation(format!("duplicate doc line id {key}")));
            }
        }
        Ok(())
    }

    fn verify_replay(
        request: &PostingRequest,
        stored: &[AccountingEntry],
    ) -> Result<(), LedgerError> {
        let mismatch = stored.len() != request.lines.len()
            || request.lines.iter().any(|line: &PostingLine| {
                !stored.iter().any(|entry| line.matches_entry(entry))
            });

        if mismatch {
            error!(
                doc_type = %request.doc_type,
                doc_id = %request.doc_id,
                "stored entries differ from replayed posting"
            );
            return Err(LedgerError::Integrity(format!(
                "stored entries of {} {} differ from the requested lines",
                request.doc_type, request.doc_id
            )));
        }
        Ok(())
    }

    fn resolve_entries<T>(
        tx: &T,
        entity: &LegalEntity,
        request: &PostingRequest,
        run_id: PostingRunId,
    ) -> Result<Vec<AccountingEntry>, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let converter = CurrencyConverter::new(tx, entity.base_currency.clone());

        (1u32..)
            .zip(&request.lines)
            .map(|(line_number, line)| {
                let conversion = converter.to_base(line.amount, &line.currency, line.posting_date)?;
                Ok(AccountingEntry {
                    id: AccountingEntryId::new(),
                    legal_entity_id: request.legal_entity_id,
                    doc_type: request.doc_type,
                    doc_id: request.doc_id,
                    line_number,
                    posting_date: line.posting_date,
                    debit_account: line.debit_account.clone(),
                    credit_account: line.credit_account.clone(),
                    amount: line.amount,
                    currency: line.currency.clone(),
                    exchange_rate: conversion.rate,
                    amount_base: conversion.amount_base,
                    metadata: EntryMetadata {
                        doc_line_id: line.doc_line_id(),
                        context: line.context.clone(),
                        reversal_of_entry_id: None,
                        reversal_of_run_id: None,
                    },
                    posting_run_id: run_id,
                    description: line.description.clone(),
                })
            })
            .collect()
    }

    fn reverse<T>(tx: &mut T, original: PostingRun, reason: &str) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let entries = tx.entries_for_run(original.id)?;
        let links = tx.links_for_run(original.id)?;
        let runs = tx.runs_for_document(original.legal_entity_id, original.doc_type, original.doc_id)?;
        let now = Utc::now();

        let reversal = PostingRun {
            id: PostingRunId::new(),
            legal_entity_id: original.legal_entity_id,
            doc_type: original.doc_type,
            doc_id: original.doc_id,
            version: Self::next_version(&runs),
            kind: PostingRunKind::Reversal,
            reversed_run_id: Some(original.id),
            reversal_run_id: None,
            void_reason: Some(reason.to_string()),
            posted_at: now,
            voided_at: None,
        };
        let reversal_entries = ReversalService::reverse_entries(&original, &entries, reversal.id);

        tx.insert_run(reversal.clone())?;
        tx.insert_entries(&reversal_entries)?;
        LinkRegistry::compensate(tx, &links, &reversal_entries, reversal.id)?;

        let mut voided = original;
        voided.reversal_run_id = Some(reversal.id);
        voided.void_reason = Some(reason.to_string());
        voided.voided_at = Some(now);
        tx.update_run(&voided)?;

        info!(
            run_id = %voided.id,
            reversal_run_id = %reversal.id,
            lines = reversal_entries.len(),
            links = links.len(),
            "posting run voided"
        );

        Ok(VoidOutcome {
            original: voided,
            reversal,
            reversal_entries,
            already_voided: false,
        })
    }

    fn existing_reversal<T>(tx: &T, original: &PostingRun) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let reversal_id = original.reversal_run_id.ok_or_else(|| {
            LedgerError::Internal(format!("run {} is neither live nor reversed", original.id))
        })?;
        let reversal = tx
            .find_run(original.legal_entity_id, reversal_id)?
            .ok_or_else(|| {
                LedgerError::Integrity(format!(
                    "reversal run {reversal_id} of run {} is missing",
                    original.id
                ))
            })?;
        let reversal_entries = tx.entries_for_run(reversal.id)?;

        Ok(VoidOutcome {
            original: original.clone(),
            reversal,
            reversal_entries,
            already_voided: true,
        })
    }

    fn legal_entity<T>(tx: &T, id: LegalEntityId) -> Result<LegalEntity, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        tx.legal_entity(id)?
            .ok_or_else(|| LedgerError::not_found("LegalEntity", id))
    }

    fn next_version(runs: &[PostingRun]) -> u32 {
        runs.iter().map(|run| run.version).max().unwrap_or(0) + 1
    }
}
