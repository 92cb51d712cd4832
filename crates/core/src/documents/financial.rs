//! Accrual of supplier bills and similar financial documents.

use tally_shared::config::LedgerConfig;
use tally_shared::types::{FinancialDocumentId, LegalEntityId};
use tracing::instrument;

use super::types::FinancialDocument;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{DocType, PostingLine, PostingOutcome, PostingRequest, VoidOutcome};
use crate::ledger::PostingEngine;
use crate::store::LedgerTx;

/// Financial document flow.
pub struct FinancialDocumentService;

impl FinancialDocumentService {
    /// Stores the document (once) and posts its accrual on the issue date.
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::post`].
    #[instrument(skip_all, fields(document_id = %document.id, number = %document.number))]
    pub fn post_accrual<T>(
        tx: &mut T,
        config: &LedgerConfig,
        document: &FinancialDocument,
    ) -> Result<PostingOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let scope = document.legal_entity_id;
        if tx.find_financial_documents(scope, &[document.id])?.is_empty() {
            tx.insert_financial_document(document.clone())?;
        }

        let mut line = PostingLine::new(
            PostingContext::FinancialDocumentAccrual {
                document_id: document.id,
            },
            document.amount.amount,
            document.amount.currency.clone(),
            document.issued_on,
        )
        .debit(document.debit_account.clone())
        .credit(document.credit_account.clone());
        line = match &document.counterparty {
            Some(counterparty) => line.with_description(format!("{} from {counterparty}", document.number)),
            None => line.with_description(document.number.clone()),
        };

        PostingEngine::post(
            tx,
            config,
            &PostingRequest::new(scope, DocType::FinancialDocumentAccrual, document.id.into(), vec![line]),
        )
    }

    /// Voids the accrual of a document.
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::void`].
    #[instrument(skip(tx, reason))]
    pub fn void_accrual<T>(
        tx: &mut T,
        scope: LegalEntityId,
        document_id: FinancialDocumentId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        PostingEngine::void(tx, scope, DocType::FinancialDocumentAccrual, document_id.into(), reason)
    }
}
