//! Storage abstraction for the posting engine.
//!
//! Services never talk to a database directly. They receive a transaction
//! handle implementing the narrow repository traits below; every query takes
//! the caller's legal-entity scope explicitly so tenant isolation is enforced
//! in the query itself.
//!
//! A store must provide:
//! - uniqueness of `(doc_type, doc_id, version)` and of the live original run
//!   per document, reported as [`LedgerError::DuplicateKey`]
//! - serialized access to the batches returned by
//!   [`StockBatchStore::lock_open_batches`] until the transaction ends
//! - all-or-nothing commit of everything written inside one transaction

pub mod memory;

use chrono::NaiveDate;
use tally_shared::types::{
    AccountingEntryId, AcquiringEventId, CashTransferId, CurrencyCode, FinancialAccountId,
    FinancialDocumentId, InventoryTransactionId, ItemId, LegalEntityId, MoneyTransactionId,
    PaymentExecutionId, PostingRunId, RecurringJournalId, StatementLineId, StockBatchId,
    StockMovementId, WarehouseId,
};
use uuid::Uuid;

use crate::cash::types::{CashTransfer, Direction, FinancialAccount, MoneyTransaction, PaymentExecution};
use crate::currency::ExchangeRate;
use crate::documents::types::{AcquiringEvent, FinancialDocument};
use crate::inventory::events::OutboxEvent;
use crate::inventory::types::{BatchSource, StockBatch, StockMovement};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{AccountingEntry, DocType, LegalEntity, PostingRun};
use crate::links::types::{EventRef, Link};
use crate::reconciliation::types::{MatchTarget, StatementLine};
use crate::recurring::types::{JournalRun, RecurringJournal};

pub use memory::MemoryStore;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, LedgerError>;

/// Legal entities (tenants).
pub trait LegalEntityStore {
    /// Finds a legal entity.
    fn legal_entity(&self, id: LegalEntityId) -> StoreResult<Option<LegalEntity>>;
    /// Inserts a legal entity.
    fn insert_legal_entity(&mut self, entity: LegalEntity) -> StoreResult<()>;
}

/// Exchange rates.
pub trait CurrencyRateStore {
    /// Most recent rate `from -> to` effective on or before `on_or_before`.
    fn latest_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        on_or_before: NaiveDate,
    ) -> StoreResult<Option<ExchangeRate>>;
    /// Inserts (or replaces, same pair and date) a rate.
    fn upsert_rate(&mut self, rate: ExchangeRate) -> StoreResult<()>;
}

/// Posting runs.
pub trait PostingRunStore {
    /// All runs of a document, by version ascending.
    fn runs_for_document(
        &self,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
    ) -> StoreResult<Vec<PostingRun>>;
    /// Finds a run in scope.
    fn find_run(&self, scope: LegalEntityId, id: PostingRunId) -> StoreResult<Option<PostingRun>>;
    /// Inserts a run, enforcing the uniqueness rules of the module docs.
    fn insert_run(&mut self, run: PostingRun) -> StoreResult<()>;
    /// Replaces a run (only reversal bookkeeping fields change).
    fn update_run(&mut self, run: &PostingRun) -> StoreResult<()>;
}

/// Accounting entries. Insert-only.
pub trait AccountingEntryStore {
    /// Inserts entries.
    fn insert_entries(&mut self, entries: &[AccountingEntry]) -> StoreResult<()>;
    /// Entries of a run, by line number.
    fn entries_for_run(&self, run_id: PostingRunId) -> StoreResult<Vec<AccountingEntry>>;
    /// Entries of a document across all of its runs.
    fn entries_for_document(
        &self,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
    ) -> StoreResult<Vec<AccountingEntry>>;
    /// Entries touching `account` with posting date in `[from, to]`.
    fn entries_for_account(
        &self,
        scope: LegalEntityId,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AccountingEntry>>;
    /// Batched lookup by id, scoped.
    fn find_entries(
        &self,
        scope: LegalEntityId,
        ids: &[AccountingEntryId],
    ) -> StoreResult<Vec<AccountingEntry>>;
}

/// Entry-to-event links. Insert-only.
pub trait LinkStore {
    /// Inserts a link.
    fn insert_link(&mut self, link: Link) -> StoreResult<()>;
    /// Links attached to any of the given entries.
    fn links_for_entries(&self, ids: &[AccountingEntryId]) -> StoreResult<Vec<Link>>;
    /// Links pointing at an event.
    fn links_for_event(&self, scope: LegalEntityId, event: &EventRef) -> StoreResult<Vec<Link>>;
    /// Links created by a run.
    fn links_for_run(&self, run_id: PostingRunId) -> StoreResult<Vec<Link>>;
}

/// FIFO batches and stock movements.
pub trait StockBatchStore {
    /// Allocates the next batch creation sequence number.
    fn next_batch_sequence(&mut self) -> StoreResult<u64>;
    /// Inserts a batch.
    fn insert_batch(&mut self, batch: StockBatch) -> StoreResult<()>;
    /// Finds a batch.
    fn find_batch(&self, scope: LegalEntityId, id: StockBatchId) -> StoreResult<Option<StockBatch>>;
    /// Open batches of an item in a warehouse in FIFO order, locked until commit.
    fn lock_open_batches(
        &mut self,
        scope: LegalEntityId,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Vec<StockBatch>>;
    /// Persists a decremented batch.
    fn update_batch(&mut self, batch: &StockBatch) -> StoreResult<()>;
    /// Batches created by a source document.
    fn batches_by_source(
        &self,
        scope: LegalEntityId,
        source_type: BatchSource,
        source_doc_id: Uuid,
    ) -> StoreResult<Vec<StockBatch>>;
    /// Inserts a movement.
    fn insert_movement(&mut self, movement: StockMovement) -> StoreResult<()>;
    /// Finds a movement by its idempotency key.
    fn movement_by_key(&self, scope: LegalEntityId, key: &str) -> StoreResult<Option<StockMovement>>;
    /// Movements of one inventory transaction.
    fn movements_for_transaction(
        &self,
        id: InventoryTransactionId,
    ) -> StoreResult<Vec<StockMovement>>;
    /// Batched lookup by id, scoped.
    fn find_movements(
        &self,
        scope: LegalEntityId,
        ids: &[StockMovementId],
    ) -> StoreResult<Vec<StockMovement>>;
}

/// Financial accounts, money transactions, payment executions, cash transfers.
pub trait CashStore {
    /// Inserts a financial account.
    fn insert_financial_account(&mut self, account: FinancialAccount) -> StoreResult<()>;
    /// Finds a financial account (unscoped; callers compare its legal entity).
    fn find_financial_account(&self, id: FinancialAccountId) -> StoreResult<Option<FinancialAccount>>;

    /// Inserts a money transaction.
    fn insert_money_transaction(&mut self, tx: MoneyTransaction) -> StoreResult<()>;
    /// Replaces a money transaction (status changes only).
    fn update_money_transaction(&mut self, tx: &MoneyTransaction) -> StoreResult<()>;
    /// Finds a money transaction (unscoped; callers compare its legal entity).
    fn find_money_transaction(&self, id: MoneyTransactionId) -> StoreResult<Option<MoneyTransaction>>;
    /// Finds a money transaction by idempotency key.
    fn money_transaction_by_key(
        &self,
        scope: LegalEntityId,
        key: &str,
    ) -> StoreResult<Option<MoneyTransaction>>;
    /// Batched lookup by id, scoped.
    fn find_money_transactions(
        &self,
        scope: LegalEntityId,
        ids: &[MoneyTransactionId],
    ) -> StoreResult<Vec<MoneyTransaction>>;
    /// Active money transactions on an account within a date window.
    fn money_transactions_in_window(
        &self,
        account_id: FinancialAccountId,
        direction: Direction,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MoneyTransaction>>;

    /// Inserts a payment execution.
    fn insert_payment_execution(&mut self, execution: PaymentExecution) -> StoreResult<()>;
    /// Replaces a payment execution (status changes only).
    fn update_payment_execution(&mut self, execution: &PaymentExecution) -> StoreResult<()>;
    /// Finds a payment execution (unscoped; callers compare its legal entity).
    fn find_payment_execution(
        &self,
        id: PaymentExecutionId,
    ) -> StoreResult<Option<PaymentExecution>>;
    /// Batched lookup by id, scoped.
    fn find_payment_executions(
        &self,
        scope: LegalEntityId,
        ids: &[PaymentExecutionId],
    ) -> StoreResult<Vec<PaymentExecution>>;
    /// Executed payments from an account within a date window.
    fn payment_executions_in_window(
        &self,
        account_id: FinancialAccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<PaymentExecution>>;

    /// Inserts a cash transfer; `(from_line_id, to_line_id)` is unique.
    fn insert_cash_transfer(&mut self, transfer: CashTransfer) -> StoreResult<()>;
    /// Overwrites a stored cash transfer.
    fn update_cash_transfer(&mut self, transfer: &CashTransfer) -> StoreResult<()>;
    /// Finds a cash transfer.
    fn find_cash_transfer(
        &self,
        scope: LegalEntityId,
        id: CashTransferId,
    ) -> StoreResult<Option<CashTransfer>>;
    /// Cash transfers either leg of which is the given statement line.
    fn cash_transfers_for_line(&self, line_id: StatementLineId) -> StoreResult<Vec<CashTransfer>>;
}

/// Imported statement lines.
pub trait StatementStore {
    /// Inserts a line; `(account_id, external_id)` is unique.
    fn insert_statement_line(&mut self, line: StatementLine) -> StoreResult<()>;
    /// Replaces a line.
    fn update_statement_line(&mut self, line: &StatementLine) -> StoreResult<()>;
    /// Finds a line (unscoped; callers compare its legal entity).
    fn find_statement_line(&self, id: StatementLineId) -> StoreResult<Option<StatementLine>>;
    /// Finds a line by its import dedupe key.
    fn statement_line_by_external_id(
        &self,
        account_id: FinancialAccountId,
        external_id: &str,
    ) -> StoreResult<Option<StatementLine>>;
    /// Batched lookup by id, scoped.
    fn find_statement_lines(
        &self,
        scope: LegalEntityId,
        ids: &[StatementLineId],
    ) -> StoreResult<Vec<StatementLine>>;
    /// Lines currently matched to (or posted against) a target.
    fn statement_lines_matched_to(&self, target: &MatchTarget) -> StoreResult<Vec<StatementLine>>;
    /// Lines whose posting produced the given money transaction.
    fn statement_lines_posted_with(
        &self,
        money_transaction_id: MoneyTransactionId,
    ) -> StoreResult<Vec<StatementLine>>;
}

/// Financial documents and acquiring events owned by outer modules.
pub trait DocumentStore {
    /// Inserts a financial document.
    fn insert_financial_document(&mut self, document: FinancialDocument) -> StoreResult<()>;
    /// Batched lookup by id, scoped.
    fn find_financial_documents(
        &self,
        scope: LegalEntityId,
        ids: &[FinancialDocumentId],
    ) -> StoreResult<Vec<FinancialDocument>>;
    /// Finds a financial document (unscoped; callers compare its legal entity).
    fn find_financial_document(&self, id: FinancialDocumentId) -> StoreResult<Option<FinancialDocument>>;
    /// Inserts an acquiring event.
    fn insert_acquiring_event(&mut self, event: AcquiringEvent) -> StoreResult<()>;
    /// Batched lookup by id, scoped.
    fn find_acquiring_events(
        &self,
        scope: LegalEntityId,
        ids: &[AcquiringEventId],
    ) -> StoreResult<Vec<AcquiringEvent>>;
    /// Finds an acquiring event (unscoped; callers compare its legal entity).
    fn find_acquiring_event(&self, id: AcquiringEventId) -> StoreResult<Option<AcquiringEvent>>;
}

/// Recurring journals and their per-period runs.
pub trait RecurringStore {
    /// Inserts a journal.
    fn insert_journal(&mut self, journal: RecurringJournal) -> StoreResult<()>;
    /// Active journals of a legal entity.
    fn journals(&self, scope: LegalEntityId) -> StoreResult<Vec<RecurringJournal>>;
    /// Finds the run of a journal for a period.
    fn journal_run(
        &self,
        journal_id: RecurringJournalId,
        period_start: NaiveDate,
    ) -> StoreResult<Option<JournalRun>>;
    /// Reserves a period; `(journal_id, period_start)` is unique.
    fn insert_journal_run(&mut self, run: JournalRun) -> StoreResult<()>;
    /// Runs of every journal (active or not) recognising a document.
    fn journal_runs_for_document(
        &self,
        scope: LegalEntityId,
        document_id: FinancialDocumentId,
    ) -> StoreResult<Vec<JournalRun>>;
}

/// Transactional outbox.
pub trait OutboxStore {
    /// Appends an event, committed with the surrounding transaction.
    fn push_event(&mut self, event: OutboxEvent) -> StoreResult<()>;
}

/// Everything a ledger transaction can touch.
pub trait LedgerTx:
    LegalEntityStore
    + CurrencyRateStore
    + PostingRunStore
    + AccountingEntryStore
    + LinkStore
    + StockBatchStore
    + CashStore
    + StatementStore
    + DocumentStore
    + RecurringStore
    + OutboxStore
{
}

impl<T> LedgerTx for T where
    T: LegalEntityStore
        + CurrencyRateStore
        + PostingRunStore
        + AccountingEntryStore
        + LinkStore
        + StockBatchStore
        + CashStore
        + StatementStore
        + DocumentStore
        + RecurringStore
        + OutboxStore
{
}

/// A store able to run closures inside a transaction.
pub trait TransactionalStore: Send + Sync {
    /// Transaction handle type.
    type Tx: LedgerTx;

    /// Runs `f` in a read-write transaction, committing on `Ok` and rolling
    /// back on `Err`.
    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> StoreResult<T>;

    /// Runs `f` against a consistent snapshot without writing.
    fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Self::Tx) -> StoreResult<T>;
}
