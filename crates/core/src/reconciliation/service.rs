//! Statement line workflow: import, suggest, confirm, reject, post.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_shared::config::ReconciliationConfig;
use tally_shared::types::{FinancialAccountId, LegalEntityId, Money, MoneyTransactionId, StatementLineId};
use tracing::{debug, info, instrument};

use super::matcher::{CandidateFacts, Matcher};
use super::types::{
    ImportSummary, MatchTarget, SplitPart, StatementLine, StatementLineInput, StatementLineStatus,
    StatementProvider,
};
use crate::cash::{CashService, Direction, MoneySource, NewMoneyTransaction, PaymentStatus};
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::DocType;
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// A confirmed target resolved to the facts the line is checked against.
struct ResolvedTarget {
    account_id: FinancialAccountId,
    direction: Direction,
    amount: Money,
    occurred_on: NaiveDate,
    money_transaction_id: MoneyTransactionId,
}

/// Stateless reconciliation service.
pub struct ReconciliationService;

impl ReconciliationService {
    /// Imports statement rows for an account, skipping rows whose
    /// `external_id` was already imported.
    ///
    /// # Errors
    ///
    /// - `Validation` for a foreign account or a non-positive amount
    /// - `NotFound` if the account does not exist
    #[instrument(skip(tx, rows), fields(rows = rows.len()))]
    pub fn import_lines<T>(
        tx: &mut T,
        scope: LegalEntityId,
        account_id: FinancialAccountId,
        provider: StatementProvider,
        rows: &[StatementLineInput],
    ) -> Result<ImportSummary, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let account = CashService::account_in_scope(tx, scope, account_id)?;
        let mut summary = ImportSummary::default();

        for row in rows {
            if row.amount <= Decimal::ZERO {
                return Err(LedgerError::validation(format!(
                    "statement row {} has a non-positive amount",
                    row.external_id
                )));
            }
            if tx.statement_line_by_external_id(account.id, &row.external_id)?.is_some() {
                summary.duplicates.push(row.external_id.clone());
                continue;
            }

            let line = StatementLine {
                id: StatementLineId::new(),
                legal_entity_id: scope,
                account_id: account.id,
                provider,
                external_id: row.external_id.clone(),
                direction: row.direction,
                amount: Money::new(row.amount, account.currency.clone()),
                occurred_on: row.occurred_on,
                reference: row.reference.clone(),
                counterparty: row.counterparty.clone(),
                description: row.description.clone(),
                status: StatementLineStatus::New,
                suggestions: Vec::new(),
                matched: None,
                posted_money_transaction_id: None,
                reject_reason: None,
                posted_at: None,
                parent_line_id: None,
            };
            summary.imported.push(line.id);
            tx.insert_statement_line(line)?;
        }

        info!(
            imported = summary.imported.len(),
            duplicates = summary.duplicates.len(),
            "statement imported"
        );
        Ok(summary)
    }

    /// Ranks candidate payments and money transactions for a line.
    ///
    /// The line becomes SUGGESTED when at least one candidate survives,
    /// otherwise it stays NEW.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the line is NEW or SUGGESTED.
    #[instrument(skip(tx, config))]
    pub fn suggest<T>(
        tx: &mut T,
        config: &ReconciliationConfig,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut line = Self::line_in_scope(tx, scope, line_id)?;
        Self::ensure_open(&line)?;

        let window_days = Matcher::window_days(line.provider, config);
        let from = line.occurred_on - Duration::days(window_days);
        let to = line.occurred_on + Duration::days(window_days);

        let mut scored = Vec::new();
        if line.direction == Direction::Out {
            for execution in tx.payment_executions_in_window(line.account_id, from, to)? {
                if execution.legal_entity_id != scope || execution.amount.currency != line.amount.currency {
                    continue;
                }
                let target = MatchTarget::PaymentExecution(execution.id);
                if Self::claimed_by_other(tx, &target, line.id)? {
                    continue;
                }
                let facts = CandidateFacts {
                    target,
                    amount: execution.amount.amount,
                    occurred_on: execution.executed_on,
                    reference: execution.reference.as_deref(),
                    counterparty: execution.counterparty.as_deref(),
                };
                scored.extend(Matcher::score(&line, &facts, window_days));
            }
        }
        for money_tx in tx.money_transactions_in_window(line.account_id, line.direction, from, to)? {
            if money_tx.legal_entity_id != scope || money_tx.amount.currency != line.amount.currency {
                continue;
            }
            let target = MatchTarget::MoneyTransaction(money_tx.id);
            if Self::claimed_by_other(tx, &target, line.id)?
                || Self::posted_by_other(tx, money_tx.id, line.id)?
            {
                continue;
            }
            let facts = CandidateFacts {
                target,
                amount: money_tx.amount.amount,
                occurred_on: money_tx.occurred_on,
                reference: money_tx.reference.as_deref(),
                counterparty: money_tx.counterparty.as_deref(),
            };
            scored.extend(Matcher::score(&line, &facts, window_days));
        }

        line.suggestions = Matcher::rank(scored, config);
        line.status = if line.suggestions.is_empty() {
            StatementLineStatus::New
        } else {
            StatementLineStatus::Suggested
        };
        tx.update_statement_line(&line)?;

        debug!(candidates = line.suggestions.len(), "suggestions stored");
        Ok(line)
    }

    /// Confirms a target for a line.
    ///
    /// # Errors
    ///
    /// - `Validation` if the target belongs to another legal entity or does
    ///   not agree with the line on account, currency, direction, amount or
    ///   date window
    /// - `Conflict` if the line is not open or the target is already
    ///   reconciled with another line
    #[instrument(skip(tx, config))]
    pub fn confirm_match<T>(
        tx: &mut T,
        config: &ReconciliationConfig,
        scope: LegalEntityId,
        line_id: StatementLineId,
        target: MatchTarget,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut line = Self::line_in_scope(tx, scope, line_id)?;
        Self::ensure_open(&line)?;

        let resolved = Self::resolve_target(tx, scope, &target)?;
        Self::check_agrees(&line, &resolved, Matcher::window_days(line.provider, config))?;
        if Self::claimed_by_other(tx, &target, line.id)?
            || Self::posted_by_other(tx, resolved.money_transaction_id, line.id)?
        {
            return Err(LedgerError::conflict(format!(
                "{target:?} is already reconciled with another statement line"
            )));
        }

        line.matched = Some(target);
        line.status = StatementLineStatus::Matched;
        tx.update_statement_line(&line)?;

        info!(?target, "statement line matched");
        Ok(line)
    }

    /// Records a new money transaction for a line that has no internal
    /// counterpart yet and matches the line to it.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the line is NEW or SUGGESTED.
    #[instrument(skip(tx))]
    pub fn match_to_new_transaction<T>(
        tx: &mut T,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut line = Self::line_in_scope(tx, scope, line_id)?;
        Self::ensure_open(&line)?;

        let money_tx = CashService::record(
            tx,
            &NewMoneyTransaction {
                legal_entity_id: scope,
                account_id: line.account_id,
                direction: line.direction,
                amount: line.amount.amount,
                occurred_on: line.occurred_on,
                source: MoneySource::StatementLine(line.id),
                reference: line.reference.clone(),
                counterparty: line.counterparty.clone(),
                idempotency_key: format!("statement_line:{}", line.id),
            },
        )?;

        line.matched = Some(MatchTarget::MoneyTransaction(money_tx.id));
        line.status = StatementLineStatus::Matched;
        tx.update_statement_line(&line)?;
        Ok(line)
    }

    /// Dismisses a line.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the line is NEW or SUGGESTED.
    #[instrument(skip(tx, reason))]
    pub fn reject<T>(
        tx: &mut T,
        scope: LegalEntityId,
        line_id: StatementLineId,
        reason: &str,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut line = Self::line_in_scope(tx, scope, line_id)?;
        Self::ensure_open(&line)?;
        line.status = StatementLineStatus::Rejected;
        line.reject_reason = Some(reason.to_string());
        tx.update_statement_line(&line)?;
        Ok(line)
    }

    /// Splits a line into parts that are reconciled on their own.
    ///
    /// The parent becomes SPLIT and loses its match and suggestions; a money
    /// transaction recorded for the parent alone is voided. Each part becomes
    /// a NEW child line with external id `{parent}#{n}`.
    ///
    /// # Errors
    ///
    /// - `Validation` for fewer than two parts, a non-positive part or parts
    ///   that do not add up to the line amount
    /// - `Conflict` unless the line is NEW, SUGGESTED or MATCHED
    #[instrument(skip(tx, parts), fields(parts = parts.len()))]
    pub fn split_line<T>(
        tx: &mut T,
        scope: LegalEntityId,
        line_id: StatementLineId,
        parts: &[SplitPart],
    ) -> Result<Vec<StatementLine>, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut parent = Self::line_in_scope(tx, scope, line_id)?;
        if !(parent.status.is_open() || parent.status == StatementLineStatus::Matched) {
            return Err(LedgerError::conflict(format!(
                "statement line {line_id} is {:?} and cannot be split",
                parent.status
            )));
        }
        if parts.len() < 2 {
            return Err(LedgerError::validation("a split needs at least two parts"));
        }
        if parts.iter().any(|p| p.amount <= Decimal::ZERO) {
            return Err(LedgerError::validation("split parts must be positive"));
        }
        let total: Decimal = parts.iter().map(|p| p.amount).sum();
        if total != parent.amount.amount {
            return Err(LedgerError::validation(format!(
                "split parts add up to {total}, line amount is {}",
                parent.amount.amount
            )));
        }

        let mut children = Vec::with_capacity(parts.len());
        for (n, part) in (1usize..).zip(parts) {
            let child = StatementLine {
                id: StatementLineId::new(),
                external_id: format!("{}#{n}", parent.external_id),
                amount: Money::new(part.amount, parent.amount.currency.clone()),
                reference: part.reference.clone().or_else(|| parent.reference.clone()),
                counterparty: part.counterparty.clone().or_else(|| parent.counterparty.clone()),
                description: part.description.clone().or_else(|| parent.description.clone()),
                status: StatementLineStatus::New,
                suggestions: Vec::new(),
                matched: None,
                posted_money_transaction_id: None,
                reject_reason: None,
                posted_at: None,
                parent_line_id: Some(parent.id),
                ..parent.clone()
            };
            tx.insert_statement_line(child.clone())?;
            children.push(child);
        }

        // A money transaction recorded just for this line goes with its match.
        if let Some(MatchTarget::MoneyTransaction(id)) = parent.matched {
            let money_tx = CashService::money_transaction_in_scope(tx, scope, id)?;
            if money_tx.source == MoneySource::StatementLine(parent.id) {
                CashService::void(tx, scope, id)?;
            }
        }

        parent.status = StatementLineStatus::Split;
        parent.matched = None;
        parent.suggestions.clear();
        tx.update_statement_line(&parent)?;

        info!(children = children.len(), "statement line split");
        Ok(children)
    }

    /// Settles a matched line against its money transaction.
    ///
    /// The principal entry of the matched payment is linked to the money
    /// transaction (`PAYMENT_PRINCIPAL`). Posting a POSTED line returns it
    /// unchanged.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the line is MATCHED or POSTED.
    #[instrument(skip(tx))]
    pub fn post<T>(
        tx: &mut T,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut line = Self::line_in_scope(tx, scope, line_id)?;
        match line.status {
            StatementLineStatus::Posted => {
                debug!("statement line already posted");
                return Ok(line);
            }
            StatementLineStatus::Matched => {}
            status => {
                return Err(LedgerError::conflict(format!(
                    "statement line {line_id} is {status:?}, expected Matched"
                )));
            }
        }
        let target = line.matched.ok_or_else(|| {
            LedgerError::Integrity(format!("matched statement line {line_id} has no target"))
        })?;

        let money_tx_id = Self::resolve_target(tx, scope, &target)?.money_transaction_id;
        let money_tx = CashService::money_transaction_in_scope(tx, scope, money_tx_id)?;

        if let MoneySource::PaymentExecution(execution_id) = money_tx.source {
            let doc_line_id = PostingContext::PaymentExecution {
                payment_execution_id: execution_id,
            }
            .doc_line_id();
            let entry = PostingEngine::live_entry(
                tx,
                scope,
                DocType::PaymentExecution,
                execution_id.into(),
                &doc_line_id,
            )?;
            LinkRegistry::link(
                tx,
                scope,
                &LinkRequest::full(entry.id, EventRef::MoneyTransaction(money_tx.id), LinkRole::PaymentPrincipal),
            )?;
        }

        line.posted_money_transaction_id = Some(money_tx.id);
        line.status = StatementLineStatus::Posted;
        line.posted_at = Some(Utc::now());
        tx.update_statement_line(&line)?;

        info!(money_transaction_id = %money_tx.id, "statement line posted");
        Ok(line)
    }

    /// Loads a statement line and checks it belongs to `scope`.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing, `Validation` if owned by another legal entity.
    pub fn line_in_scope<T>(
        tx: &T,
        scope: LegalEntityId,
        id: StatementLineId,
    ) -> Result<StatementLine, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let line = tx
            .find_statement_line(id)?
            .ok_or_else(|| LedgerError::not_found("StatementLine", id))?;
        if line.legal_entity_id != scope {
            return Err(LedgerError::validation(format!(
                "statement line {id} belongs to another legal entity"
            )));
        }
        Ok(line)
    }

    fn ensure_open(line: &StatementLine) -> Result<(), LedgerError> {
        if line.status.is_open() {
            Ok(())
        } else {
            Err(LedgerError::conflict(format!(
                "statement line {} is {:?}",
                line.id, line.status
            )))
        }
    }

    fn resolve_target<T>(
        tx: &T,
        scope: LegalEntityId,
        target: &MatchTarget,
    ) -> Result<ResolvedTarget, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        match *target {
            MatchTarget::PaymentExecution(id) => {
                let execution = tx
                    .find_payment_execution(id)?
                    .ok_or_else(|| LedgerError::not_found("PaymentExecution", id))?;
                if execution.legal_entity_id != scope {
                    return Err(LedgerError::validation(format!(
                        "payment execution {id} belongs to another legal entity"
                    )));
                }
                if execution.status != PaymentStatus::Executed {
                    return Err(LedgerError::validation(format!(
                        "payment execution {id} is {:?}",
                        execution.status
                    )));
                }
                Ok(ResolvedTarget {
                    account_id: execution.from_account_id,
                    direction: Direction::Out,
                    amount: execution.amount,
                    occurred_on: execution.executed_on,
                    money_transaction_id: execution.money_transaction_id,
                })
            }
            MatchTarget::MoneyTransaction(id) => {
                let money_tx = CashService::money_transaction_in_scope(tx, scope, id)?;
                if !money_tx.is_active() {
                    return Err(LedgerError::validation(format!("money transaction {id} is voided")));
                }
                Ok(ResolvedTarget {
                    account_id: money_tx.account_id,
                    direction: money_tx.direction,
                    amount: money_tx.amount,
                    occurred_on: money_tx.occurred_on,
                    money_transaction_id: money_tx.id,
                })
            }
        }
    }

    fn check_agrees(
        line: &StatementLine,
        target: &ResolvedTarget,
        window_days: i64,
    ) -> Result<(), LedgerError> {
        if target.account_id != line.account_id {
            return Err(LedgerError::validation("target is on a different financial account"));
        }
        if target.amount.currency != line.amount.currency {
            return Err(LedgerError::validation(format!(
                "target currency {} differs from line currency {}",
                target.amount.currency, line.amount.currency
            )));
        }
        if target.direction != line.direction {
            return Err(LedgerError::validation("target direction differs from the line"));
        }
        if target.amount.amount != line.amount.amount {
            return Err(LedgerError::validation(format!(
                "target amount {} differs from line amount {}",
                target.amount, line.amount
            )));
        }
        let days = line.occurred_on.signed_duration_since(target.occurred_on).num_days().abs();
        if days > window_days {
            return Err(LedgerError::validation(format!(
                "target is {days} days away from the line, window is {window_days}"
            )));
        }
        Ok(())
    }

    fn claimed_by_other<T>(tx: &T, target: &MatchTarget, line_id: StatementLineId) -> Result<bool, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        Ok(tx.statement_lines_matched_to(target)?.iter().any(|other| {
            other.id != line_id
                && matches!(
                    other.status,
                    StatementLineStatus::Matched | StatementLineStatus::Posted
                )
        }))
    }

    fn posted_by_other<T>(
        tx: &T,
        money_transaction_id: MoneyTransactionId,
        line_id: StatementLineId,
    ) -> Result<bool, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        Ok(tx
            .statement_lines_posted_with(money_transaction_id)?
            .iter()
            .any(|other| other.id != line_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::{FinancialAccount, FinancialAccountKind};
    use crate::documents::{PaymentRequest, PaymentService};
    use crate::fixtures::{code, date, ledger_config, seeded_state};
    use crate::ledger::accounts;
    use crate::store::memory::MemoryState;
    use crate::store::{CashStore, LinkStore, StatementStore};
    use rust_decimal_macros::dec;
    use tally_shared::types::PaymentExecutionId;

    fn account(state: &mut MemoryState, scope: LegalEntityId) -> FinancialAccount {
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: "Main bank".to_string(),
            kind: FinancialAccountKind::Bank,
            currency: code("USD"),
            ledger_account: accounts::CASH_BANK.to_string(),
        };
        state.insert_financial_account(account.clone()).unwrap();
        account
    }

    fn row(external_id: &str, amount: Decimal, day: u32) -> StatementLineInput {
        StatementLineInput {
            external_id: external_id.to_string(),
            direction: Direction::Out,
            amount,
            occurred_on: date(2025, 3, day),
            reference: Some("INV-9".to_string()),
            counterparty: None,
            description: None,
        }
    }

    fn pay(state: &mut MemoryState, scope: LegalEntityId, account: &FinancialAccount, day: u32) -> PaymentExecutionId {
        let request = PaymentRequest {
            id: PaymentExecutionId::new(),
            legal_entity_id: scope,
            from_account_id: account.id,
            amount: dec!(250),
            executed_on: date(2025, 3, day),
            reference: Some("INV-9".to_string()),
            counterparty: Some("Supplier".to_string()),
        };
        PaymentService::post(state, &ledger_config(), &request).unwrap();
        request.id
    }

    fn import_one(state: &mut MemoryState, scope: LegalEntityId, account: &FinancialAccount, day: u32) -> StatementLineId {
        ReconciliationService::import_lines(
            state,
            scope,
            account.id,
            StatementProvider::Bank,
            &[row("row-1", dec!(250), day)],
        )
        .unwrap()
        .imported[0]
    }

    #[test]
    fn test_import_skips_known_external_ids() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let rows = [row("a", dec!(1), 1), row("b", dec!(2), 1), row("a", dec!(1), 1)];

        let first = ReconciliationService::import_lines(&mut state, scope, account.id, StatementProvider::Bank, &rows).unwrap();
        let second = ReconciliationService::import_lines(&mut state, scope, account.id, StatementProvider::Bank, &rows).unwrap();

        assert_eq!(first.imported.len(), 2);
        assert_eq!(first.duplicates, vec!["a".to_string()]);
        assert!(second.imported.is_empty());
        assert_eq!(second.duplicates.len(), 3);
    }

    #[test]
    fn test_suggest_prefers_payment_execution() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let execution_id = pay(&mut state, scope, &account, 10);
        let line_id = import_one(&mut state, scope, &account, 11);

        let line = ReconciliationService::suggest(&mut state, &ReconciliationConfig::default(), scope, line_id).unwrap();

        assert_eq!(line.status, StatementLineStatus::Suggested);
        assert_eq!(line.suggestions.len(), 2);
        assert_eq!(line.suggestions[0].target, MatchTarget::PaymentExecution(execution_id));
        assert_eq!(line.suggestions[0].score, 50 + 20 + 20 + 3);
    }

    #[test]
    fn test_suggest_without_candidates_stays_new() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 11);

        let line = ReconciliationService::suggest(&mut state, &ReconciliationConfig::default(), scope, line_id).unwrap();

        assert_eq!(line.status, StatementLineStatus::New);
        assert!(line.suggestions.is_empty());
    }

    #[test]
    fn test_confirm_rejects_amount_mismatch() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let execution_id = pay(&mut state, scope, &account, 10);
        let line_id = ReconciliationService::import_lines(
            &mut state,
            scope,
            account.id,
            StatementProvider::Bank,
            &[row("row-2", dec!(249.99), 10)],
        )
        .unwrap()
        .imported[0];

        let err = ReconciliationService::confirm_match(
            &mut state,
            &ReconciliationConfig::default(),
            scope,
            line_id,
            MatchTarget::PaymentExecution(execution_id),
        )
        .unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let line = state.find_statement_line(line_id).unwrap().unwrap();
        assert_eq!(line.status, StatementLineStatus::New);
    }

    #[test]
    fn test_post_twice_creates_no_duplicate_links() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let execution_id = pay(&mut state, scope, &account, 10);
        let line_id = import_one(&mut state, scope, &account, 10);
        let config = ReconciliationConfig::default();
        ReconciliationService::confirm_match(&mut state, &config, scope, line_id, MatchTarget::PaymentExecution(execution_id))
            .unwrap();

        let first = ReconciliationService::post(&mut state, scope, line_id).unwrap();
        let second = ReconciliationService::post(&mut state, scope, line_id).unwrap();

        assert_eq!(first.status, StatementLineStatus::Posted);
        assert_eq!(first.posted_money_transaction_id, second.posted_money_transaction_id);
        let execution = state.find_payment_execution(execution_id).unwrap().unwrap();
        assert_eq!(first.posted_money_transaction_id, Some(execution.money_transaction_id));
        let links = state
            .links_for_event(scope, &EventRef::MoneyTransaction(execution.money_transaction_id))
            .unwrap();
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_reject_only_open_lines() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 10);

        let rejected = ReconciliationService::reject(&mut state, scope, line_id, "bank fee noise").unwrap();
        let err = ReconciliationService::reject(&mut state, scope, line_id, "again").unwrap_err();

        assert_eq!(rejected.status, StatementLineStatus::Rejected);
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_match_to_new_transaction_then_post() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 10);

        let matched = ReconciliationService::match_to_new_transaction(&mut state, scope, line_id).unwrap();
        let posted = ReconciliationService::post(&mut state, scope, line_id).unwrap();

        let Some(MatchTarget::MoneyTransaction(money_tx_id)) = matched.matched else {
            panic!("expected a money transaction target");
        };
        assert_eq!(posted.posted_money_transaction_id, Some(money_tx_id));
        let money_tx = state.find_money_transaction(money_tx_id).unwrap().unwrap();
        assert_eq!(money_tx.source, MoneySource::StatementLine(line_id));
    }

    fn part(amount: Decimal) -> SplitPart {
        SplitPart {
            amount,
            reference: None,
            counterparty: None,
            description: None,
        }
    }

    #[test]
    fn test_split_line_creates_new_children() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 10);
        ReconciliationService::match_to_new_transaction(&mut state, scope, line_id).unwrap();

        let children =
            ReconciliationService::split_line(&mut state, scope, line_id, &[part(dec!(100)), part(dec!(150))]).unwrap();

        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.status == StatementLineStatus::New));
        assert!(children.iter().all(|c| c.parent_line_id == Some(line_id)));
        assert_eq!(children[0].external_id, "row-1#1");
        assert_eq!(children[1].reference.as_deref(), Some("INV-9"));
        let parent = state.find_statement_line(line_id).unwrap().unwrap();
        assert_eq!(parent.status, StatementLineStatus::Split);
        assert!(parent.matched.is_none());
        let own = state
            .money_transaction_by_key(scope, &format!("statement_line:{line_id}"))
            .unwrap()
            .unwrap();
        assert!(!own.is_active());

        let err = ReconciliationService::post(&mut state, scope, line_id).unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
        ReconciliationService::match_to_new_transaction(&mut state, scope, children[0].id).unwrap();
        let posted = ReconciliationService::post(&mut state, scope, children[0].id).unwrap();
        assert_eq!(posted.status, StatementLineStatus::Posted);
    }

    #[test]
    fn test_split_parts_must_cover_line_amount() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 10);

        let err = ReconciliationService::split_line(&mut state, scope, line_id, &[part(dec!(100)), part(dec!(100))])
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let err = ReconciliationService::split_line(&mut state, scope, line_id, &[part(dec!(250))]).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let line = state.find_statement_line(line_id).unwrap().unwrap();
        assert_eq!(line.status, StatementLineStatus::New);
    }

    #[test]
    fn test_posted_line_cannot_be_split() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let line_id = import_one(&mut state, scope, &account, 10);
        ReconciliationService::match_to_new_transaction(&mut state, scope, line_id).unwrap();
        ReconciliationService::post(&mut state, scope, line_id).unwrap();

        let err = ReconciliationService::split_line(&mut state, scope, line_id, &[part(dec!(100)), part(dec!(150))])
            .unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
    }
}
