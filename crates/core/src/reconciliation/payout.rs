//! Marketplace payouts: a wallet OUT line paired with the bank IN line that
//! received the money.

use tally_shared::config::LedgerConfig;
use tally_shared::types::{CashTransferId, LegalEntityId, MoneyTransactionId, StatementLineId};
use tracing::{info, instrument};

use super::service::ReconciliationService;
use super::types::{StatementLine, StatementLineStatus};
use crate::cash::{CashTransfer, CashTransferStatus, Direction};
use crate::documents::{already_posted, entry_for};
use crate::ledger::accounts;
use crate::ledger::context::{PostingContext, TransferLeg};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// A paired payout and its posting.
#[derive(Debug, Clone)]
pub struct PayoutPairing {
    /// Stored transfer.
    pub transfer: CashTransfer,
    /// The MARKETPLACE_PAYOUT_TRANSFER run.
    pub posting: PostingOutcome,
}

/// Payout pairing.
pub struct PayoutService;

impl PayoutService {
    /// Pairs a posted wallet OUT line with a posted bank IN line.
    ///
    /// Writes one cash transfer and one run with an out leg
    /// (Dr transfer clearing / Cr cash equivalents) and an in leg
    /// (Dr cash equivalents / Cr transfer clearing), each linked `TRANSFER`
    /// to its line's money transaction. Pairing the same lines again returns
    /// the first transfer; pairing them after a void reposts the same transfer.
    ///
    /// # Errors
    ///
    /// - `Validation` if the lines disagree on legal entity, direction,
    ///   currency, amount or reference
    /// - `Conflict` if a line is not POSTED or already belongs to another transfer
    #[instrument(skip(tx, config))]
    pub fn pair_payout<T>(
        tx: &mut T,
        config: &LedgerConfig,
        scope: LegalEntityId,
        wallet_line_id: StatementLineId,
        bank_line_id: StatementLineId,
    ) -> Result<PayoutPairing, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let wallet = ReconciliationService::line_in_scope(tx, scope, wallet_line_id)?;
        let bank = ReconciliationService::line_in_scope(tx, scope, bank_line_id)?;

        let previous = tx
            .cash_transfers_for_line(wallet.id)?
            .into_iter()
            .find(|t| t.from_line_id == wallet.id && t.to_line_id == bank.id);
        if let Some(transfer) = &previous {
            if let Some(posting) =
                already_posted(tx, scope, DocType::MarketplacePayoutTransfer, transfer.id.into())?
            {
                return Ok(PayoutPairing {
                    transfer: transfer.clone(),
                    posting,
                });
            }
        }

        Self::check_pair(&wallet, &bank)?;
        let previous_id = previous.as_ref().map(|p| p.id);
        for line in [&wallet, &bank] {
            if let Some(other) = tx
                .cash_transfers_for_line(line.id)?
                .into_iter()
                .find(|t| t.status == CashTransferStatus::Posted && Some(t.id) != previous_id)
            {
                return Err(LedgerError::conflict(format!(
                    "statement line {} already belongs to cash transfer {}",
                    line.id, other.id
                )));
            }
        }
        let from_money_tx = Self::posted_money_transaction(&wallet)?;
        let to_money_tx = Self::posted_money_transaction(&bank)?;
        let reference = wallet.reference.clone().unwrap_or_default();

        // Both legs share one date so they convert at one rate and the
        // clearing account nets to zero in base currency.
        let transfer = CashTransfer {
            id: previous_id.unwrap_or_else(CashTransferId::new),
            legal_entity_id: scope,
            from_line_id: wallet.id,
            to_line_id: bank.id,
            from_money_transaction_id: from_money_tx,
            to_money_transaction_id: to_money_tx,
            amount: bank.amount.clone(),
            external_reference: reference.clone(),
            transferred_on: wallet.occurred_on.max(bank.occurred_on),
            status: CashTransferStatus::Posted,
        };
        if previous.is_some() {
            tx.update_cash_transfer(&transfer)?;
        } else {
            tx.insert_cash_transfer(transfer.clone())?;
        }

        let out_leg = PostingContext::PayoutTransfer {
            transfer_id: transfer.id,
            leg: TransferLeg::Out,
        };
        let in_leg = PostingContext::PayoutTransfer {
            transfer_id: transfer.id,
            leg: TransferLeg::In,
        };
        let (out_line_id, in_line_id) = (out_leg.doc_line_id(), in_leg.doc_line_id());
        let lines = vec![
            PostingLine::new(out_leg, wallet.amount.amount, wallet.amount.currency.clone(), transfer.transferred_on)
                .debit(accounts::CASH_TRANSFER_CLEARING)
                .credit(accounts::CASH_EQUIVALENTS)
                .with_description(format!("Payout {reference} out of wallet")),
            PostingLine::new(in_leg, bank.amount.amount, bank.amount.currency.clone(), transfer.transferred_on)
                .debit(accounts::CASH_EQUIVALENTS)
                .credit(accounts::CASH_TRANSFER_CLEARING)
                .with_description(format!("Payout {reference} into bank")),
        ];
        let posting = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::MarketplacePayoutTransfer, transfer.id.into(), lines),
        )?;

        for (doc_line_id, money_tx) in [(&out_line_id, from_money_tx), (&in_line_id, to_money_tx)] {
            let entry = entry_for(&posting, doc_line_id)?;
            LinkRegistry::link(
                tx,
                scope,
                &LinkRequest::full(entry.id, EventRef::MoneyTransaction(money_tx), LinkRole::Transfer),
            )?;
        }

        info!(transfer_id = %transfer.id, amount = %transfer.amount, "payout paired");
        Ok(PayoutPairing { transfer, posting })
    }

    /// Voids a payout transfer and cancels it so its lines can be paired again.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown transfer
    /// - `Conflict` if either line is no longer POSTED or another posted
    ///   line was reconciled against one of the legs
    #[instrument(skip(tx, reason))]
    pub fn void_payout<T>(
        tx: &mut T,
        scope: LegalEntityId,
        transfer_id: CashTransferId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut transfer = tx
            .find_cash_transfer(scope, transfer_id)?
            .ok_or_else(|| LedgerError::not_found("CashTransfer", transfer_id))?;
        let outcome = PostingEngine::void(tx, scope, DocType::MarketplacePayoutTransfer, transfer_id.into(), reason)?;
        if transfer.status != CashTransferStatus::Canceled {
            transfer.status = CashTransferStatus::Canceled;
            tx.update_cash_transfer(&transfer)?;
            info!(transfer_id = %transfer.id, "payout voided");
        }
        Ok(outcome)
    }

    fn check_pair(wallet: &StatementLine, bank: &StatementLine) -> Result<(), LedgerError> {
        if wallet.direction != Direction::Out || bank.direction != Direction::In {
            return Err(LedgerError::validation(
                "a payout pairs a wallet OUT line with a bank IN line",
            ));
        }
        if wallet.amount.currency != bank.amount.currency {
            return Err(LedgerError::validation(format!(
                "payout currency mismatch: wallet {} vs bank {}",
                wallet.amount.currency, bank.amount.currency
            )));
        }
        if wallet.amount.amount != bank.amount.amount {
            return Err(LedgerError::validation(format!(
                "payout amount mismatch: wallet {} vs bank {}",
                wallet.amount, bank.amount
            )));
        }
        let reference = wallet.reference.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if reference.is_none() || reference != bank.reference.as_deref().map(str::trim) {
            return Err(LedgerError::validation(
                "payout lines must carry the same external reference",
            ));
        }
        for line in [wallet, bank] {
            if line.status != StatementLineStatus::Posted {
                return Err(LedgerError::conflict(format!(
                    "statement line {} is {:?}, expected Posted",
                    line.id, line.status
                )));
            }
        }
        Ok(())
    }

    fn posted_money_transaction(line: &StatementLine) -> Result<MoneyTransactionId, LedgerError> {
        line.posted_money_transaction_id.ok_or_else(|| {
            LedgerError::Integrity(format!("posted statement line {} has no money transaction", line.id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::{FinancialAccount, FinancialAccountKind};
    use crate::fixtures::{code, date, ledger_config, seeded_state};
    use crate::reconciliation::types::{StatementLineInput, StatementProvider};
    use crate::store::memory::MemoryState;
    use crate::currency::ExchangeRate;
    use crate::ledger::AccountTurnover;
    use crate::store::{CashStore, CurrencyRateStore, LinkStore, StatementStore};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tally_shared::types::FinancialAccountId;

    fn posted_line(
        state: &mut MemoryState,
        scope: LegalEntityId,
        kind: FinancialAccountKind,
        currency: &str,
        direction: Direction,
        amount: Decimal,
    ) -> StatementLineId {
        posted_line_on(state, scope, kind, currency, direction, amount, date(2025, 4, 2))
    }

    fn posted_line_on(
        state: &mut MemoryState,
        scope: LegalEntityId,
        kind: FinancialAccountKind,
        currency: &str,
        direction: Direction,
        amount: Decimal,
        occurred_on: NaiveDate,
    ) -> StatementLineId {
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: format!("{kind:?}"),
            kind,
            currency: code(currency),
            ledger_account: accounts::CASH_EQUIVALENTS.to_string(),
        };
        state.insert_financial_account(account.clone()).unwrap();
        let provider = match kind {
            FinancialAccountKind::MarketplaceWallet => StatementProvider::Marketplace,
            _ => StatementProvider::Bank,
        };
        let row = StatementLineInput {
            external_id: "payout-row".to_string(),
            direction,
            amount,
            occurred_on,
            reference: Some("PAYOUT-77".to_string()),
            counterparty: None,
            description: None,
        };
        let line_id = ReconciliationService::import_lines(state, scope, account.id, provider, &[row])
            .unwrap()
            .imported[0];
        ReconciliationService::match_to_new_transaction(state, scope, line_id).unwrap();
        ReconciliationService::post(state, scope, line_id).unwrap();
        line_id
    }

    #[test]
    fn test_pair_payout_posts_two_legs_once() {
        let (mut state, scope) = seeded_state();
        let wallet = posted_line(&mut state, scope, FinancialAccountKind::MarketplaceWallet, "USD", Direction::Out, dec!(900));
        let bank = posted_line(&mut state, scope, FinancialAccountKind::Bank, "USD", Direction::In, dec!(900));

        let first = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();
        let second = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();

        assert_eq!(first.transfer.id, second.transfer.id);
        assert!(!second.posting.created);
        assert_eq!(first.posting.entries.len(), 2);
        assert_eq!(first.posting.run.doc_type, DocType::MarketplacePayoutTransfer);
        let links = state.links_for_run(first.posting.run.id).unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| l.role == LinkRole::Transfer));
        assert!(state.find_cash_transfer(scope, first.transfer.id).unwrap().is_some());
    }

    #[test]
    fn test_pair_payout_currency_mismatch_rejected() {
        let (mut state, scope) = seeded_state();
        let wallet = posted_line(&mut state, scope, FinancialAccountKind::MarketplaceWallet, "EUR", Direction::Out, dec!(900));
        let bank = posted_line(&mut state, scope, FinancialAccountKind::Bank, "USD", Direction::In, dec!(900));

        let err = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(state.cash_transfers_for_line(wallet).unwrap().is_empty());
    }

    #[test]
    fn test_pair_payout_requires_posted_lines() {
        let (mut state, scope) = seeded_state();
        let wallet = posted_line(&mut state, scope, FinancialAccountKind::MarketplaceWallet, "USD", Direction::Out, dec!(900));
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: "bank".to_string(),
            kind: FinancialAccountKind::Bank,
            currency: code("USD"),
            ledger_account: accounts::CASH_BANK.to_string(),
        };
        state.insert_financial_account(account.clone()).unwrap();
        let row = StatementLineInput {
            external_id: "unposted".to_string(),
            direction: Direction::In,
            amount: dec!(900),
            occurred_on: date(2025, 4, 3),
            reference: Some("PAYOUT-77".to_string()),
            counterparty: None,
            description: None,
        };
        let bank = ReconciliationService::import_lines(&mut state, scope, account.id, StatementProvider::Bank, &[row])
            .unwrap()
            .imported[0];

        let err = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn test_foreign_payout_legs_share_date_and_rate() {
        let (mut state, scope) = seeded_state();
        state
            .upsert_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.25), date(2025, 4, 5)).unwrap())
            .unwrap();
        let wallet = posted_line_on(
            &mut state,
            scope,
            FinancialAccountKind::MarketplaceWallet,
            "EUR",
            Direction::Out,
            dec!(800),
            date(2025, 4, 2),
        );
        let bank = posted_line_on(
            &mut state,
            scope,
            FinancialAccountKind::Bank,
            "EUR",
            Direction::In,
            dec!(800),
            date(2025, 4, 6),
        );

        let paired = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();

        assert_eq!(paired.transfer.transferred_on, date(2025, 4, 6));
        assert_eq!(paired.transfer.status, CashTransferStatus::Posted);
        for entry in &paired.posting.entries {
            assert_eq!(entry.posting_date, date(2025, 4, 6));
            assert_eq!(entry.exchange_rate, dec!(1.25));
            assert_eq!(entry.amount_base, dec!(1000.0000));
        }
        let clearing = AccountTurnover::of(accounts::CASH_TRANSFER_CLEARING, &paired.posting.entries);
        assert_eq!(clearing.net(), Decimal::ZERO);
    }

    #[test]
    fn test_void_payout_allows_pairing_again() {
        let (mut state, scope) = seeded_state();
        let wallet = posted_line(&mut state, scope, FinancialAccountKind::MarketplaceWallet, "USD", Direction::Out, dec!(900));
        let bank = posted_line(&mut state, scope, FinancialAccountKind::Bank, "USD", Direction::In, dec!(900));
        let first = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();

        let voided = PayoutService::void_payout(&mut state, scope, first.transfer.id, "wrong bank line").unwrap();
        let again = PayoutService::void_payout(&mut state, scope, first.transfer.id, "wrong bank line").unwrap();

        assert!(!voided.already_voided);
        assert!(again.already_voided);
        let stored = state.find_cash_transfer(scope, first.transfer.id).unwrap().unwrap();
        assert_eq!(stored.status, CashTransferStatus::Canceled);

        let repaired = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();

        assert_eq!(repaired.transfer.id, first.transfer.id);
        assert!(repaired.posting.created);
        assert_eq!(repaired.posting.run.version, 2);
        assert_eq!(repaired.transfer.status, CashTransferStatus::Posted);
    }

    #[test]
    fn test_void_payout_blocked_when_line_no_longer_posted() {
        let (mut state, scope) = seeded_state();
        let wallet = posted_line(&mut state, scope, FinancialAccountKind::MarketplaceWallet, "USD", Direction::Out, dec!(900));
        let bank = posted_line(&mut state, scope, FinancialAccountKind::Bank, "USD", Direction::In, dec!(900));
        let paired = PayoutService::pair_payout(&mut state, &ledger_config(), scope, wallet, bank).unwrap();
        let mut line = state.find_statement_line(bank).unwrap().unwrap();
        line.status = StatementLineStatus::Rejected;
        state.update_statement_line(&line).unwrap();

        let err = PayoutService::void_payout(&mut state, scope, paired.transfer.id, "undo").unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
        let stored = state.find_cash_transfer(scope, paired.transfer.id).unwrap().unwrap();
        assert_eq!(stored.status, CashTransferStatus::Posted);
    }
}
