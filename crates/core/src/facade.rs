//! The `Ledger` facade: one store transaction per public operation.
//!
//! Services are stateless and take a transaction handle; this type owns the
//! store and configuration, opens the transaction, and retries operations
//! that lost a uniqueness race so the retry observes the winner's rows.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::config::AppConfig;
use tally_shared::types::{
    AccountingEntryId, CashTransferId, CurrencyCode, FinancialAccountId, FinancialDocumentId,
    InternalTransferId, InventoryTransactionId, LegalEntityId, MoneyTransactionId, PageRequest,
    PaymentExecutionId, PostingRunId, StatementLineId,
};
use tracing::{info_span, warn};
use uuid::Uuid;

use crate::cash::{CashService, FinancialAccount, MoneyTransaction, NewMoneyTransaction};
use crate::currency::ExchangeRate;
use crate::documents::{
    AcquiringEvent, AcquiringService, FinancialDocument, FinancialDocumentService,
    InternalTransfer, InternalTransferPosting, InternalTransferService, PaymentPosting, PaymentRequest, PaymentService, ProductionCompletion, ProductionConsumption,
    ProductionService, SaleReturn, SalesDocument, SalesService, SupplyReceipt, SupplyService,
};
use crate::explain::{EntityRef, ExplainPayload, ExplainService};
use crate::inventory::{
    InventoryService, IssueRequest, OutboxEvent, ReceiveRequest, Receipt, StockIssue,
};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{
    DocType, LegalEntity, PostingOutcome, PostingRequest, RepostOutcome, VoidOutcome,
};
use crate::ledger::{AccountTurnover, PostingEngine};
use crate::links::{FanOutPart, Link, LinkRegistry, LinkRequest, LinkRole};
use crate::reconciliation::{
    ImportSummary, MarketplaceFeeService, MatchTarget, PayoutPairing, PayoutService,
    ReconciliationService, SplitPart, StatementLine, StatementLineInput, StatementProvider,
};
use crate::recurring::{RecurringJournal, RecurringRunReport, RecurringService};
use crate::store::memory::MemoryStore;
use crate::store::{
    AccountingEntryStore, CashStore, CurrencyRateStore, LegalEntityStore, TransactionalStore,
};

/// Entry point of the posting engine.
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    config: AppConfig,
}

impl<S: TransactionalStore> Ledger<S> {
    /// Creates a ledger over `store`.
    #[must_use]
    pub const fn new(store: S, config: AppConfig) -> Self {
        Self { store, config }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Underlying store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Runs `op` in a transaction, retrying retryable failures up to
    /// `ledger.max_write_attempts` times in total.
    fn write<T, F>(&self, operation: &'static str, op: F) -> Result<T, LedgerError>
    where
        F: Fn(&mut S::Tx) -> Result<T, LedgerError>,
    {
        let span = info_span!("ledger_write", operation);
        let _guard = span.enter();
        let attempts = self.config.ledger.max_write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.transaction(&op) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, error = %err, "write lost a race, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn read<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&S::Tx) -> Result<T, LedgerError>,
    {
        self.store.read(op)
    }

    // --- setup ---

    /// Creates a legal entity with the given base currency, or the configured
    /// default when `None`.
    ///
    /// # Errors
    ///
    /// `Validation` if the configured base currency is not a valid code.
    pub fn create_legal_entity(
        &self,
        name: &str,
        base_currency: Option<CurrencyCode>,
    ) -> Result<LegalEntity, LedgerError> {
        let base_currency = match base_currency {
            Some(code) => code,
            None => self
                .config
                .ledger
                .base_currency()
                .map_err(|e| LedgerError::validation(e.to_string()))?,
        };
        let entity = LegalEntity {
            id: LegalEntityId::new(),
            name: name.to_string(),
            base_currency,
        };
        self.write("create_legal_entity", |tx| {
            tx.insert_legal_entity(entity.clone())?;
            Ok(entity.clone())
        })
    }

    /// Stores an exchange rate.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-positive rate or a same-currency pair.
    pub fn upsert_rate(&self, rate: &ExchangeRate) -> Result<(), LedgerError> {
        rate.validate()?;
        self.write("upsert_rate", |tx| tx.upsert_rate(rate.clone()))
    }

    /// Registers a bank, wallet or acquiring account.
    ///
    /// # Errors
    ///
    /// `NotFound` if the legal entity does not exist; `DuplicateKey` if the id is taken.
    pub fn add_financial_account(&self, account: &FinancialAccount) -> Result<(), LedgerError> {
        self.write("add_financial_account", |tx| {
            if tx.legal_entity(account.legal_entity_id)?.is_none() {
                return Err(LedgerError::not_found("legal entity", account.legal_entity_id));
            }
            tx.insert_financial_account(account.clone())
        })
    }

    // --- posting engine ---

    /// See [`PostingEngine::post`].
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::post`].
    pub fn post(&self, request: &PostingRequest) -> Result<PostingOutcome, LedgerError> {
        self.write("post", |tx| PostingEngine::post(tx, &self.config.ledger, request))
    }

    /// See [`PostingEngine::void`].
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::void`].
    pub fn void(
        &self,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void", |tx| PostingEngine::void(tx, scope, doc_type, doc_id, reason))
    }

    /// See [`PostingEngine::void_run`].
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::void_run`].
    pub fn void_run(
        &self,
        scope: LegalEntityId,
        run_id: PostingRunId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_run", |tx| PostingEngine::void_run(tx, scope, run_id, reason))
    }

    /// See [`PostingEngine::repost`].
    ///
    /// # Errors
    ///
    /// Any error of [`PostingEngine::repost`].
    pub fn repost(&self, request: &PostingRequest, reason: &str) -> Result<RepostOutcome, LedgerError> {
        self.write("repost", |tx| {
            PostingEngine::repost(tx, &self.config.ledger, request, reason)
        })
    }

    // --- inventory and cash ---

    /// Receives stock into a new batch without posting.
    ///
    /// # Errors
    ///
    /// Any error of [`InventoryService::receive`].
    pub fn receive_stock(&self, request: &ReceiveRequest) -> Result<Receipt, LedgerError> {
        self.write("receive_stock", |tx| InventoryService::receive(tx, request))
    }

    /// Issues stock FIFO without posting.
    ///
    /// # Errors
    ///
    /// Any error of [`InventoryService::issue`].
    pub fn issue_stock(&self, request: &IssueRequest) -> Result<StockIssue, LedgerError> {
        self.write("issue_stock", |tx| InventoryService::issue(tx, request))
    }

    /// Records a money transaction.
    ///
    /// # Errors
    ///
    /// Any error of [`CashService::record`].
    pub fn record_money_transaction(
        &self,
        new: &NewMoneyTransaction,
    ) -> Result<MoneyTransaction, LedgerError> {
        self.write("record_money_transaction", |tx| CashService::record(tx, new))
    }

    /// Links an entry to an event.
    ///
    /// # Errors
    ///
    /// Any error of [`LinkRegistry::link`].
    pub fn link(&self, scope: LegalEntityId, request: &LinkRequest) -> Result<Link, LedgerError> {
        self.write("link", |tx| LinkRegistry::link(tx, scope, request))
    }

    /// Splits an entry across several events.
    ///
    /// # Errors
    ///
    /// Any error of [`LinkRegistry::link_fan_out`].
    pub fn link_fan_out(
        &self,
        scope: LegalEntityId,
        entry_id: AccountingEntryId,
        role: LinkRole,
        parts: &[FanOutPart],
    ) -> Result<Vec<Link>, LedgerError> {
        self.write("link_fan_out", |tx| {
            LinkRegistry::link_fan_out(tx, scope, entry_id, role, parts)
        })
    }

    // --- documents ---

    /// Posts a supply receipt.
    ///
    /// # Errors
    ///
    /// Any error of [`SupplyService::post`].
    pub fn post_supply_receipt(&self, receipt: &SupplyReceipt) -> Result<PostingOutcome, LedgerError> {
        self.write("post_supply_receipt", |tx| {
            SupplyService::post(tx, &self.config.ledger, receipt)
        })
    }

    /// Voids a supply receipt.
    ///
    /// # Errors
    ///
    /// Any error of [`SupplyService::void`].
    pub fn void_supply_receipt(
        &self,
        scope: LegalEntityId,
        receipt_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_supply_receipt", |tx| {
            SupplyService::void(tx, scope, receipt_id, reason, voided_on)
        })
    }

    /// Issues materials to production and posts their cost.
    ///
    /// # Errors
    ///
    /// Any error of [`ProductionService::consume`].
    pub fn consume(&self, consumption: &ProductionConsumption) -> Result<PostingOutcome, LedgerError> {
        self.write("consume", |tx| {
            ProductionService::consume(tx, &self.config.ledger, consumption)
        })
    }

    /// Voids a consumption and restocks the materials.
    ///
    /// # Errors
    ///
    /// Any error of [`ProductionService::void_consumption`].
    pub fn void_consumption(
        &self,
        scope: LegalEntityId,
        inventory_transaction_id: InventoryTransactionId,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_consumption", |tx| {
            ProductionService::void_consumption(tx, scope, inventory_transaction_id, reason, voided_on)
        })
    }

    /// Receives production output and posts it.
    ///
    /// # Errors
    ///
    /// Any error of [`ProductionService::complete`].
    pub fn complete_production(
        &self,
        completion: &ProductionCompletion,
    ) -> Result<PostingOutcome, LedgerError> {
        self.write("complete_production", |tx| {
            ProductionService::complete(tx, &self.config.ledger, completion)
        })
    }

    /// Voids a production completion.
    ///
    /// # Errors
    ///
    /// Any error of [`ProductionService::void_completion`].
    pub fn void_completion(
        &self,
        scope: LegalEntityId,
        production_order_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_completion", |tx| {
            ProductionService::void_completion(tx, scope, production_order_id, reason, voided_on)
        })
    }

    /// Posts a sale.
    ///
    /// # Errors
    ///
    /// Any error of [`SalesService::post`].
    pub fn post_sale(&self, sale: &SalesDocument) -> Result<PostingOutcome, LedgerError> {
        self.write("post_sale", |tx| SalesService::post(tx, &self.config.ledger, sale))
    }

    /// Voids a sale.
    ///
    /// # Errors
    ///
    /// Any error of [`SalesService::void`].
    pub fn void_sale(
        &self,
        scope: LegalEntityId,
        sales_document_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_sale", |tx| {
            SalesService::void(tx, scope, sales_document_id, reason, voided_on)
        })
    }

    /// Posts a customer return.
    ///
    /// # Errors
    ///
    /// Any error of [`SalesService::post_return`].
    pub fn post_sale_return(&self, sale_return: &SaleReturn) -> Result<PostingOutcome, LedgerError> {
        self.write("post_sale_return", |tx| {
            SalesService::post_return(tx, &self.config.ledger, sale_return)
        })
    }

    /// Voids a customer return.
    ///
    /// # Errors
    ///
    /// Any error of [`SalesService::void_return`].
    pub fn void_sale_return(
        &self,
        scope: LegalEntityId,
        return_id: Uuid,
        reason: &str,
        voided_on: NaiveDate,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_sale_return", |tx| {
            SalesService::void_return(tx, scope, return_id, reason, voided_on)
        })
    }

    /// Executes and posts a payment.
    ///
    /// # Errors
    ///
    /// Any error of [`PaymentService::post`].
    pub fn post_payment(&self, request: &PaymentRequest) -> Result<PaymentPosting, LedgerError> {
        self.write("post_payment", |tx| {
            PaymentService::post(tx, &self.config.ledger, request)
        })
    }

    /// Voids a payment.
    ///
    /// # Errors
    ///
    /// Any error of [`PaymentService::void`].
    pub fn void_payment(
        &self,
        scope: LegalEntityId,
        id: PaymentExecutionId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_payment", |tx| PaymentService::void(tx, scope, id, reason))
    }

    /// Moves money between two own accounts.
    ///
    /// # Errors
    ///
    /// Any error of [`InternalTransferService::post`].
    pub fn post_internal_transfer(
        &self,
        transfer: &InternalTransfer,
    ) -> Result<InternalTransferPosting, LedgerError> {
        self.write("post_internal_transfer", |tx| {
            InternalTransferService::post(tx, &self.config.ledger, transfer)
        })
    }

    /// Voids an internal transfer.
    ///
    /// # Errors
    ///
    /// Any error of [`InternalTransferService::void`].
    pub fn void_internal_transfer(
        &self,
        scope: LegalEntityId,
        id: InternalTransferId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_internal_transfer", |tx| InternalTransferService::void(tx, scope, id, reason))
    }

    /// Posts an acquiring settlement.
    ///
    /// # Errors
    ///
    /// Any error of [`AcquiringService::post`].
    pub fn post_acquiring_event(&self, event: &AcquiringEvent) -> Result<PostingOutcome, LedgerError> {
        self.write("post_acquiring_event", |tx| {
            AcquiringService::post(tx, &self.config.ledger, event)
        })
    }

    /// Accrues a financial document.
    ///
    /// # Errors
    ///
    /// Any error of [`FinancialDocumentService::post_accrual`].
    pub fn post_accrual(&self, document: &FinancialDocument) -> Result<PostingOutcome, LedgerError> {
        self.write("post_accrual", |tx| {
            FinancialDocumentService::post_accrual(tx, &self.config.ledger, document)
        })
    }

    /// Voids the accrual of a financial document.
    ///
    /// # Errors
    ///
    /// Any error of [`FinancialDocumentService::void_accrual`].
    pub fn void_accrual(
        &self,
        scope: LegalEntityId,
        document_id: FinancialDocumentId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_accrual", |tx| {
            FinancialDocumentService::void_accrual(tx, scope, document_id, reason)
        })
    }

    // --- reconciliation ---

    /// Imports statement rows.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::import_lines`].
    pub fn import_statement_lines(
        &self,
        scope: LegalEntityId,
        account_id: FinancialAccountId,
        provider: StatementProvider,
        rows: &[StatementLineInput],
    ) -> Result<ImportSummary, LedgerError> {
        self.write("import_statement_lines", |tx| {
            ReconciliationService::import_lines(tx, scope, account_id, provider, rows)
        })
    }

    /// Stores ranked match candidates on a line.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::suggest`].
    pub fn suggest(&self, scope: LegalEntityId, line_id: StatementLineId) -> Result<StatementLine, LedgerError> {
        self.write("suggest", |tx| {
            ReconciliationService::suggest(tx, &self.config.reconciliation, scope, line_id)
        })
    }

    /// Confirms a match.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::confirm_match`].
    pub fn confirm_match(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
        target: MatchTarget,
    ) -> Result<StatementLine, LedgerError> {
        self.write("confirm_match", |tx| {
            ReconciliationService::confirm_match(tx, &self.config.reconciliation, scope, line_id, target)
        })
    }

    /// Records a new money transaction for a line and matches it.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::match_to_new_transaction`].
    pub fn match_to_new_transaction(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<StatementLine, LedgerError> {
        self.write("match_to_new_transaction", |tx| {
            ReconciliationService::match_to_new_transaction(tx, scope, line_id)
        })
    }

    /// Rejects an open line.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::reject`].
    pub fn reject_statement_line(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
        reason: &str,
    ) -> Result<StatementLine, LedgerError> {
        self.write("reject_statement_line", |tx| {
            ReconciliationService::reject(tx, scope, line_id, reason)
        })
    }

    /// Posts a matched line.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::post`].
    pub fn post_statement_line(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<StatementLine, LedgerError> {
        self.write("post_statement_line", |tx| ReconciliationService::post(tx, scope, line_id))
    }

    /// Pairs a wallet payout with the bank line that received it.
    ///
    /// # Errors
    ///
    /// Any error of [`PayoutService::pair_payout`].
    pub fn pair_payout(
        &self,
        scope: LegalEntityId,
        wallet_line_id: StatementLineId,
        bank_line_id: StatementLineId,
    ) -> Result<PayoutPairing, LedgerError> {
        self.write("pair_payout", |tx| {
            PayoutService::pair_payout(tx, &self.config.ledger, scope, wallet_line_id, bank_line_id)
        })
    }

    /// Voids a payout pairing so its lines can be paired again.
    ///
    /// # Errors
    ///
    /// Any error of [`PayoutService::void_payout`].
    pub fn void_payout(
        &self,
        scope: LegalEntityId,
        transfer_id: CashTransferId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_payout", |tx| PayoutService::void_payout(tx, scope, transfer_id, reason))
    }

    /// Splits a statement line into parts.
    ///
    /// # Errors
    ///
    /// Any error of [`ReconciliationService::split_line`].
    pub fn split_statement_line(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
        parts: &[SplitPart],
    ) -> Result<Vec<StatementLine>, LedgerError> {
        self.write("split_statement_line", |tx| {
            ReconciliationService::split_line(tx, scope, line_id, parts)
        })
    }

    /// Posts the marketplace fee of a wallet statement line.
    ///
    /// # Errors
    ///
    /// Any error of [`MarketplaceFeeService::post_fee`].
    pub fn post_statement_fee(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
    ) -> Result<PostingOutcome, LedgerError> {
        self.write("post_statement_fee", |tx| {
            MarketplaceFeeService::post_fee(tx, &self.config.ledger, scope, line_id)
        })
    }

    /// Voids the fee posting of a wallet statement line.
    ///
    /// # Errors
    ///
    /// Any error of [`MarketplaceFeeService::void_fee`].
    pub fn void_statement_fee(
        &self,
        scope: LegalEntityId,
        line_id: StatementLineId,
        reason: &str,
    ) -> Result<VoidOutcome, LedgerError> {
        self.write("void_statement_fee", |tx| MarketplaceFeeService::void_fee(tx, scope, line_id, reason))
    }

    // --- recurring ---

    /// Registers a recurring journal.
    ///
    /// # Errors
    ///
    /// Any error of [`RecurringService::register`].
    pub fn register_recurring_journal(&self, journal: &RecurringJournal) -> Result<(), LedgerError> {
        self.write("register_recurring_journal", |tx| {
            RecurringService::register(tx, journal.clone())
        })
    }

    /// Posts due recurring periods.
    ///
    /// # Errors
    ///
    /// Any error of [`RecurringService::run`].
    pub fn run_recurring(
        &self,
        scope: LegalEntityId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RecurringRunReport, LedgerError> {
        self.write("run_recurring", |tx| {
            RecurringService::run(tx, &self.config.ledger, scope, from, to)
        })
    }

    // --- reads ---

    /// See [`ExplainService::explain_account`].
    ///
    /// # Errors
    ///
    /// Any error of [`ExplainService::explain_account`].
    pub fn explain_account(
        &self,
        scope: LegalEntityId,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
        page: &PageRequest,
    ) -> Result<ExplainPayload, LedgerError> {
        self.read(|tx| ExplainService::explain_account(tx, scope, account, from, to, page))
    }

    /// See [`ExplainService::explain_entity`].
    ///
    /// # Errors
    ///
    /// Any error of [`ExplainService::explain_entity`].
    pub fn explain_entity(&self, scope: LegalEntityId, entity: EntityRef) -> Result<ExplainPayload, LedgerError> {
        self.read(|tx| ExplainService::explain_entity(tx, scope, entity))
    }

    /// Base-currency balance (debit minus credit) of an account over a range.
    ///
    /// # Errors
    ///
    /// Store errors only.
    pub fn account_balance(
        &self,
        scope: LegalEntityId,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        self.read(|tx| {
            let entries = tx.entries_for_account(scope, account, from, to)?;
            Ok(AccountTurnover::of(account, &entries).net())
        })
    }

    /// Finds a money transaction in scope.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Validation` as [`CashService::money_transaction_in_scope`].
    pub fn money_transaction(
        &self,
        scope: LegalEntityId,
        id: MoneyTransactionId,
    ) -> Result<MoneyTransaction, LedgerError> {
        self.read(|tx| CashService::money_transaction_in_scope(tx, scope, id))
    }
}

impl Ledger<MemoryStore> {
    /// In-memory ledger, for tests and the demo binary.
    #[must_use]
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(MemoryStore::new(), config)
    }

    /// Removes and returns committed outbox events.
    ///
    /// # Errors
    ///
    /// `Internal` if the store lock is poisoned.
    pub fn drain_outbox(&self) -> Result<Vec<OutboxEvent>, LedgerError> {
        self.store.drain_outbox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{code, supply_request};
    use crate::store::memory::MemoryState;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Memory store whose first `failures` transactions lose a uniqueness race.
    #[derive(Debug, Default)]
    struct RacyStore {
        inner: MemoryStore,
        failures: u32,
        calls: AtomicU32,
    }

    impl TransactionalStore for RacyStore {
        type Tx = MemoryState;

        fn transaction<T, F>(&self, f: F) -> Result<T, LedgerError>
        where
            F: FnOnce(&mut Self::Tx) -> Result<T, LedgerError>,
        {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(LedgerError::DuplicateKey("posting run".to_string()));
            }
            self.inner.transaction(f)
        }

        fn read<T, F>(&self, f: F) -> Result<T, LedgerError>
        where
            F: FnOnce(&Self::Tx) -> Result<T, LedgerError>,
        {
            self.inner.read(f)
        }
    }

    fn racy(failures: u32) -> Ledger<RacyStore> {
        Ledger::new(
            RacyStore {
                failures,
                ..RacyStore::default()
            },
            AppConfig::default(),
        )
    }

    #[test]
    fn test_create_legal_entity_uses_configured_base_currency() {
        let ledger = Ledger::in_memory(AppConfig::default());

        let entity = ledger.create_legal_entity("Acme", None).unwrap();

        assert_eq!(entity.base_currency, code("USD"));
    }

    #[test]
    fn test_post_is_idempotent_through_facade() {
        let ledger = Ledger::in_memory(AppConfig::default());
        let entity = ledger.create_legal_entity("Acme", None).unwrap();
        let request = supply_request(entity.id, Uuid::now_v7(), dec!(80), "USD");

        let first = ledger.post(&request).unwrap();
        let second = ledger.post(&request).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.run.id, second.run.id);
    }

    #[test]
    fn test_retryable_error_is_retried() {
        let ledger = racy(2);

        let entity = ledger.create_legal_entity("Acme", None).unwrap();

        assert_eq!(ledger.store().calls.load(Ordering::SeqCst), 3);
        let stored = ledger.store().read(|tx| tx.legal_entity(entity.id)).unwrap();
        assert!(stored.is_some());
    }

    #[test]
    fn test_retries_stop_at_max_attempts() {
        let ledger = racy(5);

        let err = ledger.create_legal_entity("Acme", None).unwrap_err();

        assert_eq!(err.error_code(), "DUPLICATE_KEY");
        assert_eq!(ledger.store().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_add_financial_account_requires_entity() {
        use crate::cash::types::FinancialAccountKind;
        use tally_shared::types::FinancialAccountId;

        let ledger = Ledger::in_memory(AppConfig::default());
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: LegalEntityId::new(),
            kind: FinancialAccountKind::Bank,
            name: "Main".to_string(),
            currency: code("USD"),
            ledger_account: crate::ledger::accounts::CASH_BANK.to_string(),
        };

        let err = ledger.add_financial_account(&account).unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_upsert_rate_rejects_zero_rate() {
        let ledger = Ledger::in_memory(AppConfig::default());
        let rate = ExchangeRate {
            from_currency: code("EUR"),
            to_currency: code("USD"),
            rate: rust_decimal::Decimal::ZERO,
            effective_date: chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };

        let err = ledger.upsert_rate(&rate).unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        let stored = ledger
            .store()
            .read(|tx| tx.latest_rate(&code("EUR"), &code("USD"), rate.effective_date))
            .unwrap();
        assert!(stored.is_none());
    }
}
