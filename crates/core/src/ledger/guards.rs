//! Dependency checks run before a posting run may be voided.
//!
//! The checks read live downstream state (statement lines, remaining batch
//! quantities, links) rather than document status flags.

use rust_decimal::Decimal;
use tally_shared::types::{
    CashTransferId, InternalTransferId, MoneyTransactionId, PaymentExecutionId, StatementLineId,
};

use super::context::TransferLeg;
use super::error::LedgerError;
use super::types::{DocType, PostingRun};
use crate::documents::InternalTransferService;
use crate::inventory::types::BatchSource;
use crate::inventory::InventoryService;
use crate::links::{EventRef, LinkRole};
use crate::reconciliation::types::{MatchTarget, StatementLineStatus};
use crate::store::{CashStore, LedgerTx, StatementStore, StockBatchStore};

/// Void dependency guards.
pub struct VoidGuards;

impl VoidGuards {
    /// Fails with a conflict if live state depends on `run`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Conflict` naming the blocking dependent.
    pub fn check<T>(tx: &T, run: &PostingRun) -> Result<(), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        match run.doc_type {
            DocType::PaymentExecution => Self::check_payment_unreconciled(tx, run),
            DocType::ProductionCompletion => {
                Self::check_batches_untouched(tx, run, BatchSource::ProductionOutput)
            }
            DocType::SupplyReceipt => Self::check_batches_untouched(tx, run, BatchSource::SupplyReceipt),
            DocType::SaleReturn => Self::check_batches_untouched(tx, run, BatchSource::SaleReturn),
            DocType::MarketplacePayoutTransfer => Self::check_payout_lines(tx, run),
            DocType::InternalTransfer => Self::check_transfer_unreconciled(tx, run),
            DocType::StatementLineFee => Self::check_fee_links(tx, run),
            DocType::SalesDocument
            | DocType::ProductionConsumption
            | DocType::FinancialDocumentAccrual
            | DocType::FinancialDocumentRecognition
            | DocType::AcquiringEvent => Ok(()),
        }
    }

    /// Both payout lines must still be POSTED and no third line may have
    /// been posted against either leg.
    fn check_payout_lines<T>(tx: &T, run: &PostingRun) -> Result<(), LedgerError>
    where
        T: CashStore + StatementStore + ?Sized,
    {
        let scope = run.legal_entity_id;
        let Some(transfer) = tx.find_cash_transfer(scope, CashTransferId::from_uuid(run.doc_id))? else {
            return Ok(());
        };
        let own = [transfer.from_line_id, transfer.to_line_id];
        for line in tx.find_statement_lines(scope, &own)? {
            if line.status != StatementLineStatus::Posted {
                return Err(LedgerError::conflict(format!(
                    "statement line {} of cash transfer {} is {:?}, expected Posted",
                    line.id, transfer.id, line.status
                )));
            }
        }
        Self::check_legs_unreconciled(
            tx,
            &[transfer.from_money_transaction_id, transfer.to_money_transaction_id],
            &own,
        )
    }

    fn check_transfer_unreconciled<T>(tx: &T, run: &PostingRun) -> Result<(), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let id = InternalTransferId::from_uuid(run.doc_id);
        let mut legs = Vec::with_capacity(2);
        for leg in [TransferLeg::Out, TransferLeg::In] {
            let key = InternalTransferService::leg_key(id, leg);
            if let Some(money_tx) = tx.money_transaction_by_key(run.legal_entity_id, &key)? {
                legs.push(money_tx.id);
            }
        }
        Self::check_legs_unreconciled(tx, &legs, &[])
    }

    /// A fee entry may only carry the `FEE` link to its own line's money
    /// transaction.
    fn check_fee_links<T>(tx: &T, run: &PostingRun) -> Result<(), LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let line_id = StatementLineId::from_uuid(run.doc_id);
        let own = tx
            .find_statement_line(line_id)?
            .and_then(|line| line.posted_money_transaction_id)
            .map(EventRef::MoneyTransaction);
        if let Some(link) = tx
            .links_for_run(run.id)?
            .into_iter()
            .find(|link| link.role != LinkRole::Fee || Some(&link.event) != own.as_ref())
        {
            return Err(LedgerError::conflict(format!(
                "fee posting of statement line {line_id} carries a foreign {:?} link {}",
                link.role, link.id
            )));
        }
        Ok(())
    }

    fn check_legs_unreconciled<T>(
        tx: &T,
        legs: &[MoneyTransactionId],
        own_lines: &[StatementLineId],
    ) -> Result<(), LedgerError>
    where
        T: StatementStore + ?Sized,
    {
        for leg in legs {
            let mut lines = tx.statement_lines_matched_to(&MatchTarget::MoneyTransaction(*leg))?;
            lines.extend(tx.statement_lines_posted_with(*leg)?);
            if let Some(line) = lines.iter().find(|line| {
                !own_lines.contains(&line.id)
                    && matches!(
                        line.status,
                        StatementLineStatus::Matched | StatementLineStatus::Posted
                    )
            }) {
                return Err(LedgerError::conflict(format!(
                    "money transaction {leg} is reconciled with statement line {}",
                    line.id
                )));
            }
        }
        Ok(())
    }

    fn check_payment_unreconciled<T>(tx: &T, run: &PostingRun) -> Result<(), LedgerError>
    where
        T: CashStore + StatementStore + ?Sized,
    {
        let execution_id = PaymentExecutionId::from_uuid(run.doc_id);
        let Some(execution) = tx.find_payment_execution(execution_id)? else {
            return Ok(());
        };

        let mut lines = tx.statement_lines_matched_to(&MatchTarget::PaymentExecution(execution.id))?;
        lines.extend(tx.statement_lines_matched_to(&MatchTarget::MoneyTransaction(
            execution.money_transaction_id,
        ))?);
        lines.extend(tx.statement_lines_posted_with(execution.money_transaction_id)?);

        if let Some(line) = lines.iter().find(|line| {
            matches!(
                line.status,
                StatementLineStatus::Matched | StatementLineStatus::Posted
            )
        }) {
            return Err(LedgerError::conflict(format!(
                "payment execution {} is reconciled with statement line {}",
                execution.id, line.id
            )));
        }
        Ok(())
    }

    fn check_batches_untouched<T>(
        tx: &T,
        run: &PostingRun,
        source: BatchSource,
    ) -> Result<(), LedgerError>
    where
        T: StockBatchStore + ?Sized,
    {
        let scope = run.legal_entity_id;
        for batch in tx.batches_by_source(scope, source, run.doc_id)? {
            // A write-off from an earlier void of the same document is not consumption.
            let written_off = tx
                .movement_by_key(scope, &InventoryService::write_off_key(batch.id))?
                .map_or(Decimal::ZERO, |m| -m.quantity);
            let consumed = batch.consumed_quantity() - written_off;
            if !consumed.is_zero() {
                return Err(LedgerError::conflict(format!(
                    "batch {} from {} {} has already been consumed ({} of {})",
                    batch.id, run.doc_type, run.doc_id, consumed, batch.initial_quantity
                )));
            }
        }
        Ok(())
    }
}
