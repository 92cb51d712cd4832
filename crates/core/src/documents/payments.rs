//! Outgoing payments: cash out of a financial account against supplier payables.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{FinancialAccountId, LegalEntityId, Money, PaymentExecutionId};
use tracing::{info, instrument};

use super::{already_posted, entry_for};
use crate::cash::{
    CashService, Direction, MoneySource, NewMoneyTransaction, PaymentExecution, PaymentStatus,
};
use crate::ledger::accounts;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// A payment to execute.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Execution id chosen by the caller (the posted document id).
    pub id: PaymentExecutionId,
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Account paid from; the amount is in its currency.
    pub from_account_id: FinancialAccountId,
    /// Positive amount.
    pub amount: Decimal,
    /// Execution date.
    pub executed_on: NaiveDate,
    /// Bank reference.
    pub reference: Option<String>,
    /// Payee.
    pub counterparty: Option<String>,
}

/// A posted payment.
#[derive(Debug, Clone)]
pub struct PaymentPosting {
    /// Stored execution.
    pub execution: PaymentExecution,
    /// Its posting run.
    pub posting: PostingOutcome,
}

/// Payment flow.
pub struct PaymentService;

impl PaymentService {
    /// Records the outgoing money transaction and posts
    /// Dr supplier payables / Cr the account's ledger account, linked
    /// `PAYMENT_PRINCIPAL` to the money transaction.
    ///
    /// # Errors
    ///
    /// - `Validation` for a foreign account or non-positive amount
    /// - `NoExchangeRate` if the account currency cannot be converted
    #[instrument(skip_all, fields(payment_execution_id = %request.id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        request: &PaymentRequest,
    ) -> Result<PaymentPosting, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = request.legal_entity_id;
        let account = CashService::account_in_scope(tx, scope, request.from_account_id)?;

        if let Some(posting) = already_posted(tx, scope, DocType::PaymentExecution, request.id.into())? {
            let execution = tx
                .find_payment_execution(request.id)?
                .ok_or_else(|| LedgerError::not_found("PaymentExecution", request.id))?;
            return Ok(PaymentPosting { execution, posting });
        }

        let money_tx = CashService::record(
            tx,
            &NewMoneyTransaction {
                legal_entity_id: scope,
                account_id: account.id,
                direction: Direction::Out,
                amount: request.amount,
                occurred_on: request.executed_on,
                source: MoneySource::PaymentExecution(request.id),
                reference: request.reference.clone(),
                counterparty: request.counterparty.clone(),
                idempotency_key: format!("payment_execution:{}", request.id),
            },
        )?;

        let execution = match tx.find_payment_execution(request.id)? {
            Some(existing) => existing,
            None => {
                let execution = PaymentExecution {
                    id: request.id,
                    legal_entity_id: scope,
                    from_account_id: account.id,
                    amount: Money::new(request.amount, account.currency.clone()),
                    executed_on: request.executed_on,
                    reference: request.reference.clone(),
                    counterparty: request.counterparty.clone(),
                    status: PaymentStatus::Executed,
                    money_transaction_id: money_tx.id,
                };
                tx.insert_payment_execution(execution.clone())?;
                execution
            }
        };

        let context = PostingContext::PaymentExecution {
            payment_execution_id: request.id,
        };
        let doc_line_id = context.doc_line_id();
        let mut line = PostingLine::new(context, request.amount, account.currency.clone(), request.executed_on)
            .debit(accounts::ACCOUNTS_PAYABLE_SUPPLIERS)
            .credit(account.ledger_account.clone());
        if let Some(counterparty) = &request.counterparty {
            line = line.with_description(format!("Payment to {counterparty}"));
        }
        let posting = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::PaymentExecution, request.id.into(), vec![line]),
        )?;

        let entry = entry_for(&posting, &doc_line_id)?;
        LinkRegistry::link(
            tx,
            scope,
            &LinkRequest::full(entry.id, EventRef::MoneyTransaction(money_tx.id), LinkRole::PaymentPrincipal),
        )?;

        info!(amount = %execution.amount, "payment executed");
        Ok(PaymentPosting { execution, posting })
    }

    /// Voids a payment that no statement line has reconciled yet, cancelling
    /// its money transaction.
    ///
    /// # Errors
    ///
    /// `Conflict` once the payment is matched or posted on a statement.
    #[instrument(skip(tx, reason))]
    pub fn void<T>(
        tx: &mut T,
        scope: LegalEntityId,
        id: PaymentExecutionId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let outcome = PostingEngine::void(tx, scope, DocType::PaymentExecution, id.into(), reason)?;
        if !outcome.already_voided {
            if let Some(mut execution) = tx.find_payment_execution(id)? {
                CashService::void(tx, scope, execution.money_transaction_id)?;
                execution.status = PaymentStatus::Canceled;
                tx.update_payment_execution(&execution)?;
            }
        }
        Ok(outcome)
    }
}
