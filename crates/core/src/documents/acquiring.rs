//! Card acquiring settlements.

use rust_decimal::Decimal;
use tally_shared::config::LedgerConfig;
use tracing::{info, instrument};

use super::entry_for;
use super::types::AcquiringEvent;
use crate::cash::CashService;
use crate::ledger::accounts;
use crate::ledger::context::{AcquiringPart, PostingContext};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest};
use crate::ledger::PostingEngine;
use crate::links::{EventRef, LinkRegistry, LinkRequest, LinkRole};
use crate::store::LedgerTx;

/// Acquiring flow.
pub struct AcquiringService;

impl AcquiringService {
    /// Stores the event (once) and posts the gross settlement to the
    /// acquiring clearing account, with the withheld commission expensed
    /// out of it.
    ///
    /// # Errors
    ///
    /// - `Validation` for a foreign account, non-positive gross, a negative
    ///   fee, a fee above gross or mixed currencies
    /// - `NoExchangeRate` if the settlement currency cannot be converted
    #[instrument(skip_all, fields(acquiring_event_id = %event.id))]
    pub fn post<T>(
        tx: &mut T,
        config: &LedgerConfig,
        event: &AcquiringEvent,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = event.legal_entity_id;
        CashService::account_in_scope(tx, scope, event.account_id)?;
        if event.gross.amount <= Decimal::ZERO {
            return Err(LedgerError::validation("acquiring gross must be positive"));
        }
        if event.fee.amount < Decimal::ZERO || event.fee.amount > event.gross.amount {
            return Err(LedgerError::validation("acquiring fee must lie between zero and gross"));
        }
        if event.fee.currency != event.gross.currency {
            return Err(LedgerError::validation(format!(
                "acquiring fee currency {} differs from gross currency {}",
                event.fee.currency, event.gross.currency
            )));
        }

        if tx.find_acquiring_events(scope, &[event.id])?.is_empty() {
            tx.insert_acquiring_event(event.clone())?;
        }

        let principal = PostingContext::Acquiring {
            event_id: event.id,
            part: AcquiringPart::Principal,
        };
        let fee = PostingContext::Acquiring {
            event_id: event.id,
            part: AcquiringPart::Fee,
        };
        let principal_line_id = principal.doc_line_id();
        let fee_line_id = fee.doc_line_id();

        let mut lines = vec![
            PostingLine::new(principal, event.gross.amount, event.gross.currency.clone(), event.settled_on)
                .debit(accounts::CLEARING_ACQUIRING)
                .credit(accounts::SALES_REVENUE),
        ];
        let has_fee = event.fee.amount > Decimal::ZERO;
        if has_fee {
            lines.push(
                PostingLine::new(fee, event.fee.amount, event.fee.currency.clone(), event.settled_on)
                    .debit(accounts::ACQUIRING_FEES_EXPENSE)
                    .credit(accounts::CLEARING_ACQUIRING),
            );
        }

        let outcome = PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::AcquiringEvent, event.id.into(), lines),
        )?;

        let target = EventRef::AcquiringEvent(event.id);
        let entry = entry_for(&outcome, &principal_line_id)?;
        LinkRegistry::link(tx, scope, &LinkRequest::full(entry.id, target, LinkRole::Principal))?;
        if has_fee {
            let entry = entry_for(&outcome, &fee_line_id)?;
            LinkRegistry::link(tx, scope, &LinkRequest::full(entry.id, target, LinkRole::Fee))?;
        }

        if outcome.created {
            info!(gross = %event.gross, fee = %event.fee, "acquiring settlement posted");
        }
        Ok(outcome)
    }
}
