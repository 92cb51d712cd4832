//! Marketplace fees charged directly on a wallet statement.
//!
//! A posted wallet OUT line that is a marketplace fee gets its own run,
//! Dr marketplace fees / Cr the wallet's ledger account, linked `FEE` to the
//! line's money transaction.

use tally_shared::config::LedgerConfig;
use tally_shared::types::{LegalEntityId, StatementLineId};
use tracing::{info, instrument};

use super::service::ReconciliationService;
use super::types::StatementLineStatus;
use crate::cash::{CashService, Direction, FinancialAccountKind};
use crate::documents::{already_posted, entry_for};
use crate::ledger::accounts;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// Fee posting for wallet statement lines.
pub struct MarketplaceFeeService;

impl MarketplaceFeeService {
    /// Posts the fee of a POSTED wallet OUT line. Posting it again returns
    /// the live run.
    ///
    /// # Errors
    ///
    /// - `Validation` unless the line is an OUT line of a marketplace wallet
    /// - `Conflict` unless the line is POSTED
    #[instrument(skip(tx, config))]
    pub fn post_fee<T>(
        tx: &mut T,
        config: &LedgerConfig,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let line = ReconciliationService::line_in_scope(tx, scope, line_id)?;
        let account = CashService::account_in_scope(tx, scope, line.account_id)?;
        if account.kind != FinancialAccountKind::MarketplaceWallet || line.direction != Direction::Out {
            return Err(LedgerError::validation(format!(
                "statement line {line_id} is not a marketplace wallet OUT line"
            )));
        }
        if let Some(posted) = already_posted(tx, scope, DocType::StatementLineFee, line.id.into())? {
            return Ok(posted);
        }
        if line.status != StatementLineStatus::Posted {
            return Err(LedgerError::conflict(format!(
                "statement line {line_id} is {:?}, post it before its fee",
                line.status
            )));
        }
        let money_tx = line.posted_money_transaction_id.ok_or_else(|| {
            LedgerError::Integrity(format!("posted statement line {line_id} has no money transaction"))
        })?;

        let context = PostingContext::StatementLineFee {
            statement_line_id: line.id,
        };
        let doc_line_id = context.doc_line_id();
        let description = line
            .description
            .clone()
            .unwrap_or_else(|| format!("Marketplace fee {}", line.external_id));
        let fee = PostingLine::new(context, line.amount.amount, line.amount.currency.clone(), line.occurred_on)
            .debit(accounts::MARKETPLACE_FEES)
            .credit(account.ledger_account.clone())
            .with_description(description);
        let posting = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::StatementLineFee, line.id.into(), vec![fee]),
        )?;

        let entry = entry_for(&posting, &doc_line_id)?;
        LinkRegistry::link(
            tx,
            scope,
            &LinkRequest::full(entry.id, EventRef::MoneyTransaction(money_tx), LinkRole::Fee),
        )?;

        info!(amount = %line.amount, "marketplace fee posted");
        Ok(posting)
    }

    /// Voids a fee posting.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no fee was posted for the line
    /// - `Conflict` if the fee entry carries links to other events
    #[instrument(skip(tx, reason))]
    pub fn void_fee<T>(
        tx: &mut T,
        scope: LegalEntityId,
        line_id: StatementLineId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        ReconciliationService::line_in_scope(tx, scope, line_id)?;
        PostingEngine::void(tx, scope, DocType::StatementLineFee, line_id.into(), reason)
    }
}
