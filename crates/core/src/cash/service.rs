//! Money transactions on financial accounts.

use chrono::Utc;
use rust_decimal::Decimal;
use tally_shared::types::{FinancialAccountId, LegalEntityId, Money, MoneyTransactionId};
use tracing::{debug, info};

use super::types::{FinancialAccount, MoneyTransaction, MoneyTransactionStatus, NewMoneyTransaction};
use crate::currency::CurrencyConverter;
use crate::ledger::error::LedgerError;
use crate::store::LedgerTx;

/// Stateless cash service.
pub struct CashService;

impl CashService {
    /// Records a money transaction, idempotent on its key.
    ///
    /// The amount is in the account's currency; its base amount is converted
    /// at the transaction date.
    ///
    /// # Errors
    ///
    /// - `Validation` for a non-positive amount or an account of another scope
    /// - `NoExchangeRate` if the account currency cannot be converted
    pub fn record<T>(tx: &mut T, new: &NewMoneyTransaction) -> Result<MoneyTransaction, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        if new.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("money transaction amount must be positive"));
        }
        let scope = new.legal_entity_id;
        let account = Self::account_in_scope(tx, scope, new.account_id)?;

        if let Some(existing) = tx.money_transaction_by_key(scope, &new.idempotency_key)? {
            debug!(money_transaction_id = %existing.id, "money transaction already recorded");
            return Ok(existing);
        }

        let entity = tx
            .legal_entity(scope)?
            .ok_or_else(|| LedgerError::not_found("LegalEntity", scope))?;
        let conversion = CurrencyConverter::new(&*tx, entity.base_currency)
            .to_base(new.amount, &account.currency, new.occurred_on)?;

        let money_tx = MoneyTransaction {
            id: MoneyTransactionId::new(),
            legal_entity_id: scope,
            account_id: account.id,
            direction: new.direction,
            amount: Money::new(new.amount, account.currency.clone()),
            amount_base: conversion.amount_base,
            occurred_on: new.occurred_on,
            status: MoneyTransactionStatus::Active,
            source: new.source,
            reference: new.reference.clone(),
            counterparty: new.counterparty.clone(),
            idempotency_key: new.idempotency_key.clone(),
            voided_at: None,
        };
        tx.insert_money_transaction(money_tx.clone())?;

        info!(
            money_transaction_id = %money_tx.id,
            direction = ?money_tx.direction,
            amount = %money_tx.amount,
            "money transaction recorded"
        );
        Ok(money_tx)
    }

    /// Marks a money transaction voided. Voiding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the transaction is not in scope.
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        id: MoneyTransactionId,
    ) -> Result<MoneyTransaction, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let mut money_tx = Self::money_transaction_in_scope(tx, scope, id)?;
        if money_tx.status == MoneyTransactionStatus::Voided {
            return Ok(money_tx);
        }
        money_tx.status = MoneyTransactionStatus::Voided;
        money_tx.voided_at = Some(Utc::now());
        tx.update_money_transaction(&money_tx)?;

        info!(money_transaction_id = %id, "money transaction voided");
        Ok(money_tx)
    }

    /// Loads a financial account and checks it belongs to `scope`.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing, `Validation` if owned by another legal entity.
    pub fn account_in_scope<T>(
        tx: &T,
        scope: LegalEntityId,
        id: FinancialAccountId,
    ) -> Result<FinancialAccount, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let account = tx
            .find_financial_account(id)?
            .ok_or_else(|| LedgerError::not_found("FinancialAccount", id))?;
        if account.legal_entity_id != scope {
            return Err(LedgerError::validation(format!(
                "financial account {id} belongs to another legal entity"
            )));
        }
        Ok(account)
    }

    /// Loads a money transaction and checks it belongs to `scope`.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing, `Validation` if owned by another legal entity.
    pub fn money_transaction_in_scope<T>(
        tx: &T,
        scope: LegalEntityId,
        id: MoneyTransactionId,
    ) -> Result<MoneyTransaction, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let money_tx = tx
            .find_money_transaction(id)?
            .ok_or_else(|| LedgerError::not_found("MoneyTransaction", id))?;
        if money_tx.legal_entity_id != scope {
            return Err(LedgerError::validation(format!(
                "money transaction {id} belongs to another legal entity"
            )));
        }
        Ok(money_tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::types::{Direction, FinancialAccountKind, MoneySource};
    use crate::fixtures::{code, date, seeded_state};
    use crate::ledger::accounts;
    use crate::store::CashStore;
    use rust_decimal_macros::dec;

    fn eur_account(scope: LegalEntityId) -> FinancialAccount {
        FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: "EUR bank".to_string(),
            kind: FinancialAccountKind::Bank,
            currency: code("EUR"),
            ledger_account: accounts::CASH_BANK.to_string(),
        }
    }

    fn new_tx(scope: LegalEntityId, account_id: FinancialAccountId, key: &str) -> NewMoneyTransaction {
        NewMoneyTransaction {
            legal_entity_id: scope,
            account_id,
            direction: Direction::Out,
            amount: dec!(50),
            occurred_on: date(2025, 3, 3),
            source: MoneySource::Manual,
            reference: Some("INV-1".to_string()),
            counterparty: None,
            idempotency_key: key.to_string(),
        }
    }

    #[test]
    fn test_record_converts_and_dedupes() {
        let (mut state, scope) = seeded_state();
        let account = eur_account(scope);
        state.insert_financial_account(account.clone()).unwrap();

        let first = CashService::record(&mut state, &new_tx(scope, account.id, "manual:1")).unwrap();
        let second = CashService::record(&mut state, &new_tx(scope, account.id, "manual:1")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.amount.currency, code("EUR"));
        assert_eq!(first.amount_base, dec!(60.0000));
    }

    #[test]
    fn test_record_rejects_foreign_account() {
        let (mut state, scope) = seeded_state();
        let account = eur_account(LegalEntityId::new());
        state.insert_financial_account(account.clone()).unwrap();

        let err = CashService::record(&mut state, &new_tx(scope, account.id, "manual:2")).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_void_twice_is_noop() {
        let (mut state, scope) = seeded_state();
        let account = eur_account(scope);
        state.insert_financial_account(account.clone()).unwrap();
        let recorded = CashService::record(&mut state, &new_tx(scope, account.id, "manual:3")).unwrap();

        let voided = CashService::void(&mut state, scope, recorded.id).unwrap();
        let again = CashService::void(&mut state, scope, recorded.id).unwrap();

        assert!(!voided.is_active());
        assert_eq!(voided.voided_at, again.voided_at);
    }
}
