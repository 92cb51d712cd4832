//! Transfers between two own financial accounts.
//!
//! Each transfer records an OUT and an IN money transaction and posts both
//! legs through the cash transfer clearing account on one date, so the
//! clearing account nets to zero once both legs are in.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{FinancialAccountId, InternalTransferId, LegalEntityId};
use tracing::{info, instrument};

use super::{already_posted, entry_for};
use crate::cash::{
    CashService, Direction, FinancialAccount, MoneySource, MoneyTransaction, MoneyTransactionStatus,
    NewMoneyTransaction,
};
use crate::ledger::accounts;
use crate::ledger::context::{PostingContext, TransferLeg};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// Money moved from one own account to another in the same currency.
#[derive(Debug, Clone)]
pub struct InternalTransfer {
    /// Transfer id chosen by the caller (the posted document id).
    pub id: InternalTransferId,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Account debited.
    pub from_account_id: FinancialAccountId,
    /// Account credited.
    pub to_account_id: FinancialAccountId,
    /// Positive amount in the accounts' currency.
    pub amount: Decimal,
    /// Transfer date; both legs post on it.
    pub occurred_on: NaiveDate,
    /// Bank reference.
    pub reference: Option<String>,
}

/// A posted internal transfer.
#[derive(Debug, Clone)]
pub struct InternalTransferPosting {
    /// OUT leg on the source account.
    pub out_leg: MoneyTransaction,
    /// IN leg on the destination account.
    pub in_leg: MoneyTransaction,
    /// The INTERNAL_TRANSFER run.
    pub posting: PostingOutcome,
}

/// Internal transfer flow.
pub struct InternalTransferService;

impl InternalTransferService {
    /// Idempotency key of one leg's money transaction.
    #[must_use]
    pub fn leg_key(id: InternalTransferId, leg: TransferLeg) -> String {
        PostingContext::InternalTransfer { transfer_id: id, leg }.doc_line_id()
    }

    /// Records both legs and posts
    /// Dr transfer clearing / Cr source account (out) and
    /// Dr destination account / Cr transfer clearing (in),
    /// each linked `TRANSFER` to its money transaction.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount, the same account on both
    ///   sides, a foreign account or accounts in different currencies
    /// - `Conflict` when the transfer id was already used and voided
    #[instrument(skip_all, fields(transfer_id = %transfer.id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        transfer: &InternalTransfer,
    ) -> Result<InternalTransferPosting, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = transfer.legal_entity_id;
        if transfer.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("transfer amount must be positive"));
        }
        if transfer.from_account_id == transfer.to_account_id {
            return Err(LedgerError::validation("transfer needs two different accounts"));
        }
        let from = CashService::account_in_scope(tx, scope, transfer.from_account_id)?;
        let to = CashService::account_in_scope(tx, scope, transfer.to_account_id)?;
        if from.currency != to.currency {
            return Err(LedgerError::validation(format!(
                "transfer currency mismatch: {} vs {}",
                from.currency, to.currency
            )));
        }

        if let Some(posting) = already_posted(tx, scope, DocType::InternalTransfer, transfer.id.into())? {
            let (out_leg, in_leg) = Self::legs(tx, scope, transfer.id)?;
            return Ok(InternalTransferPosting {
                out_leg,
                in_leg,
                posting,
            });
        }
        if let Some(out) = tx.money_transaction_by_key(scope, &Self::leg_key(transfer.id, TransferLeg::Out))? {
            if out.status == MoneyTransactionStatus::Voided {
                return Err(LedgerError::conflict(format!(
                    "internal transfer {} was voided; post a new transfer",
                    transfer.id
                )));
            }
        }

        let mut record = |account: &FinancialAccount, leg: TransferLeg, direction: Direction| {
            CashService::record(
                tx,
                &NewMoneyTransaction {
                    legal_entity_id: scope,
                    account_id: account.id,
                    direction,
                    amount: transfer.amount,
                    occurred_on: transfer.occurred_on,
                    source: MoneySource::InternalTransfer(transfer.id),
                    reference: transfer.reference.clone(),
                    counterparty: None,
                    idempotency_key: Self::leg_key(transfer.id, leg),
                },
            )
        };
        let out_leg = record(&from, TransferLeg::Out, Direction::Out)?;
        let in_leg = record(&to, TransferLeg::In, Direction::In)?;

        let out_ctx = PostingContext::InternalTransfer {
            transfer_id: transfer.id,
            leg: TransferLeg::Out,
        };
        let in_ctx = PostingContext::InternalTransfer {
            transfer_id: transfer.id,
            leg: TransferLeg::In,
        };
        let (out_line_id, in_line_id) = (out_ctx.doc_line_id(), in_ctx.doc_line_id());
        let lines = vec![
            PostingLine::new(out_ctx, transfer.amount, from.currency.clone(), transfer.occurred_on)
                .debit(accounts::CASH_TRANSFER_CLEARING)
                .credit(from.ledger_account.clone())
                .with_description(format!("Transfer out of {}", from.name)),
            PostingLine::new(in_ctx, transfer.amount, to.currency.clone(), transfer.occurred_on)
                .debit(to.ledger_account.clone())
                .credit(accounts::CASH_TRANSFER_CLEARING)
                .with_description(format!("Transfer into {}", to.name)),
        ];
        let posting = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::InternalTransfer, transfer.id.into(), lines),
        )?;

        for (doc_line_id, money_tx) in [(&out_line_id, &out_leg), (&in_line_id, &in_leg)] {
            let entry = entry_for(&posting, doc_line_id)?;
            LinkRegistry::link(
                tx,
                scope,
                &LinkRequest::full(entry.id, EventRef::MoneyTransaction(money_tx.id), LinkRole::Transfer),
            )?;
        }

        info!(amount = %out_leg.amount, from = %from.id, to = %to.id, "internal transfer posted");
        Ok(InternalTransferPosting {
            out_leg,
            in_leg,
            posting,
        })
    }

    /// Voids a transfer that no statement line has reconciled, cancelling
    /// both money transactions.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the transfer was never posted
    /// - `Conflict` once a leg is matched or posted on a statement
    #[instrument(skip(tx, reason))]
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        id: InternalTransferId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(tx, scope, DocType::InternalTransfer, id.into(), reason)?;
        if !outcome.already_voided {
            let (out_leg, in_leg) = Self::legs(tx, scope, id)?;
            CashService::void(tx, scope, out_leg.id)?;
            CashService::void(tx, scope, in_leg.id)?;
        }
        Ok(outcome)
    }

    /// The OUT and IN money transactions of a transfer.
    ///
    /// # Errors
    ///
    /// `NotFound` if either leg is missing.
    pub fn legs<T>(
        tx: &T,
        scope: LegalEntityId,
        id: InternalTransferId,
    ) -> Result<(MoneyTransaction, MoneyTransaction), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let leg = |leg: TransferLeg| -> Result<MoneyTransaction, LedgerError> {
            tx.money_transaction_by_key(scope, &Self::leg_key(id, leg))?
                .ok_or_else(|| LedgerError::not_found("InternalTransfer", id))
        };
        Ok((leg(TransferLeg::Out)?, leg(TransferLeg::In)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::FinancialAccountKind;
    use crate::fixtures::{code, date, ledger_config, seeded_state};
    use crate::ledger::AccountTurnover;
    use crate::reconciliation::types::{StatementLineInput, StatementProvider};
    use crate::reconciliation::{MatchTarget, ReconciliationService};
    use crate::store::memory::MemoryState;
    use crate::store::{CashStore, LinkStore};
    use rust_decimal_macros::dec;
    use tally_shared::config::ReconciliationConfig;

    fn account(state: &mut MemoryState, scope: LegalEntityId, kind: FinancialAccountKind, currency: &str) -> FinancialAccount {
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: format!("{kind:?} {currency}"),
            kind,
            currency: code(currency),
            ledger_account: match kind {
                FinancialAccountKind::Bank => accounts::CASH_BANK.to_string(),
                _ => accounts::CASH_EQUIVALENTS.to_string(),
            },
        };
        state.insert_financial_account(account.clone()).unwrap();
        account
    }

    fn transfer(scope: LegalEntityId, from: &FinancialAccount, to: &FinancialAccount, amount: Decimal) -> InternalTransfer {
        InternalTransfer {
            id: InternalTransferId::new(),
            legal_entity_id: scope,
            from_account_id: from.id,
            to_account_id: to.id,
            amount,
            occurred_on: date(2025, 5, 2),
            reference: Some("TR-1".to_string()),
        }
    }

    #[test]
    fn test_post_records_legs_and_nets_clearing() {
        let (mut state, scope) = seeded_state();
        let cash = account(&mut state, scope, FinancialAccountKind::Cash, "USD");
        let bank = account(&mut state, scope, FinancialAccountKind::Bank, "USD");
        let doc = transfer(scope, &cash, &bank, dec!(250));

        let first = InternalTransferService::post(&mut state, &ledger_config(), &doc).unwrap();
        let replay = InternalTransferService::post(&mut state, &ledger_config(), &doc).unwrap();

        assert!(first.posting.created);
        assert!(!replay.posting.created);
        assert_eq!(first.out_leg.direction, Direction::Out);
        assert_eq!(first.in_leg.account_id, bank.id);
        assert_eq!(first.out_leg.source, MoneySource::InternalTransfer(doc.id));
        let links = state.links_for_run(first.posting.run.id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.role == LinkRole::Transfer));

        let turnover = AccountTurnover::of(accounts::CASH_TRANSFER_CLEARING, &first.posting.entries);
        assert_eq!(turnover.net(), Decimal::ZERO);
    }

    #[test]
    fn test_post_rejects_currency_mismatch() {
        let (mut state, scope) = seeded_state();
        let cash = account(&mut state, scope, FinancialAccountKind::Cash, "USD");
        let bank = account(&mut state, scope, FinancialAccountKind::Bank, "EUR");

        let err = InternalTransferService::post(&mut state, &ledger_config(), &transfer(scope, &cash, &bank, dec!(10)))
            .unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_void_cancels_legs_and_blocks_repost() {
        let (mut state, scope) = seeded_state();
        let cash = account(&mut state, scope, FinancialAccountKind::Cash, "USD");
        let bank = account(&mut state, scope, FinancialAccountKind::Bank, "USD");
        let doc = transfer(scope, &cash, &bank, dec!(40));
        InternalTransferService::post(&mut state, &ledger_config(), &doc).unwrap();

        let first = InternalTransferService::void(&mut state, scope, doc.id, "duplicate").unwrap();
        let second = InternalTransferService::void(&mut state, scope, doc.id, "duplicate").unwrap();

        assert!(!first.already_voided);
        assert!(second.already_voided);
        let (out_leg, in_leg) = InternalTransferService::legs(&state, scope, doc.id).unwrap();
        assert!(!out_leg.is_active());
        assert!(!in_leg.is_active());
        let err = InternalTransferService::post(&mut state, &ledger_config(), &doc).unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_void_blocked_once_leg_posted_on_statement() {
        let (mut state, scope) = seeded_state();
        let cash = account(&mut state, scope, FinancialAccountKind::Cash, "USD");
        let bank = account(&mut state, scope, FinancialAccountKind::Bank, "USD");
        let doc = transfer(scope, &cash, &bank, dec!(40));
        let posted = InternalTransferService::post(&mut state, &ledger_config(), &doc).unwrap();

        let row = StatementLineInput {
            external_id: "bank-1".to_string(),
            direction: Direction::In,
            amount: dec!(40),
            occurred_on: date(2025, 5, 2),
            reference: Some("TR-1".to_string()),
            counterparty: None,
            description: None,
        };
        let line = ReconciliationService::import_lines(&mut state, scope, bank.id, StatementProvider::Bank, &[row])
            .unwrap()
            .imported[0];
        ReconciliationService::confirm_match(
            &mut state,
            &ReconciliationConfig::default(),
            scope,
            line,
            MatchTarget::MoneyTransaction(posted.in_leg.id),
        )
        .unwrap();
        ReconciliationService::post(&mut state, scope, line).unwrap();

        let err = InternalTransferService::void(&mut state, scope, doc.id, "oops").unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
        assert!(state.find_money_transaction(posted.in_leg.id).unwrap().unwrap().is_active());
    }
}
