//! In-memory store.
//!
//! Transactions are fully serialized: each one runs against a private copy of
//! the state taken under the store mutex and swaps it back in on success, so
//! an `Err` leaves nothing behind. Unique keys are enforced on insert and
//! reported as [`LedgerError::DuplicateKey`].

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use tally_shared::types::{
    AccountingEntryId, AcquiringEventId, CashTransferId, CurrencyCode, FinancialAccountId,
    FinancialDocumentId, InventoryTransactionId, ItemId, LegalEntityId, MoneyTransactionId,
    PaymentExecutionId, PostingRunId, RecurringJournalId, StatementLineId, StockBatchId,
    StockMovementId, WarehouseId,
};
use uuid::Uuid;

use super::{
    AccountingEntryStore, CashStore, CurrencyRateStore, DocumentStore, LegalEntityStore,
    LinkStore, OutboxStore, PostingRunStore, RecurringStore, StatementStore, StockBatchStore,
    StoreResult, TransactionalStore,
};
use crate::cash::types::{
    CashTransfer, Direction, FinancialAccount, MoneyTransaction, PaymentExecution, PaymentStatus,
};
use crate::currency::ExchangeRate;
use crate::documents::types::{AcquiringEvent, FinancialDocument};
use crate::inventory::events::OutboxEvent;
use crate::inventory::types::{BatchSource, StockBatch, StockMovement};
use crate::ledger::error::LedgerError;
use crate::ledger::types::{AccountingEntry, DocType, LegalEntity, PostingRun, PostingRunKind};
use crate::links::types::{EventRef, Link};
use crate::reconciliation::types::{MatchTarget, StatementLine};
use crate::recurring::types::{JournalRun, RecurringJournal};

type RateKey = (CurrencyCode, CurrencyCode, NaiveDate);

/// Complete state of a [`MemoryStore`]; also its transaction handle.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    legal_entities: BTreeMap<LegalEntityId, LegalEntity>,
    rates: BTreeMap<RateKey, ExchangeRate>,
    runs: BTreeMap<PostingRunId, PostingRun>,
    entries: BTreeMap<AccountingEntryId, AccountingEntry>,
    links: Vec<Link>,
    batch_sequence: u64,
    batches: BTreeMap<StockBatchId, StockBatch>,
    movements: BTreeMap<StockMovementId, StockMovement>,
    financial_accounts: BTreeMap<FinancialAccountId, FinancialAccount>,
    money_transactions: BTreeMap<MoneyTransactionId, MoneyTransaction>,
    payment_executions: BTreeMap<PaymentExecutionId, PaymentExecution>,
    cash_transfers: BTreeMap<CashTransferId, CashTransfer>,
    statement_lines: BTreeMap<StatementLineId, StatementLine>,
    financial_documents: BTreeMap<FinancialDocumentId, FinancialDocument>,
    acquiring_events: BTreeMap<AcquiringEventId, AcquiringEvent>,
    journals: BTreeMap<RecurringJournalId, RecurringJournal>,
    journal_runs: BTreeMap<(RecurringJournalId, NaiveDate), JournalRun>,
    outbox: Vec<OutboxEvent>,
}

impl MemoryState {
    /// Outbox events written so far and not yet drained.
    #[must_use]
    pub fn outbox(&self) -> &[OutboxEvent] {
        &self.outbox
    }
}

/// Thread-safe in-memory [`TransactionalStore`].
///
/// Meant for tests and embedding, not volume: every write clones the whole
/// [`MemoryState`], so write cost grows with the data held, and the outbox
/// keeps every event until [`Ledger::drain_outbox`](crate::Ledger::drain_outbox)
/// empties it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the committed outbox events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Internal` if the store lock is poisoned.
    pub fn drain_outbox(&self) -> StoreResult<Vec<OutboxEvent>> {
        let mut state = self.lock()?;
        Ok(std::mem::take(&mut state.outbox))
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LedgerError::Internal("memory store lock poisoned".to_string()))
    }
}

impl TransactionalStore for MemoryStore {
    type Tx = MemoryState;

    fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> StoreResult<T>,
    {
        let mut state = self.lock()?;
        let mut working = state.clone();
        let value = f(&mut working)?;
        *state = working;
        Ok(value)
    }

    fn read<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Self::Tx) -> StoreResult<T>,
    {
        let state = self.lock()?;
        f(&state)
    }
}

fn duplicate(what: impl std::fmt::Display) -> LedgerError {
    LedgerError::DuplicateKey(what.to_string())
}

fn missing(entity: &'static str, id: impl Into<Uuid>) -> LedgerError {
    LedgerError::not_found(entity, id)
}

impl LegalEntityStore for MemoryState {
    fn legal_entity(&self, id: LegalEntityId) -> StoreResult<Option<LegalEntity>> {
        Ok(self.legal_entities.get(&id).cloned())
    }

    fn insert_legal_entity(&mut self, entity: LegalEntity) -> StoreResult<()> {
        if self.legal_entities.contains_key(&entity.id) {
            return Err(duplicate(format_args!("legal entity {}", entity.id)));
        }
        self.legal_entities.insert(entity.id, entity);
        Ok(())
    }
}

impl CurrencyRateStore for MemoryState {
    fn latest_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        on_or_before: NaiveDate,
    ) -> StoreResult<Option<ExchangeRate>> {
        let lower = (from.clone(), to.clone(), NaiveDate::MIN);
        let upper = (from.clone(), to.clone(), on_or_before);
        Ok(self
            .rates
            .range(lower..=upper)
            .next_back()
            .map(|(_, rate)| rate.clone()))
    }

    fn upsert_rate(&mut self, rate: ExchangeRate) -> StoreResult<()> {
        let key = (
            rate.from_currency.clone(),
            rate.to_currency.clone(),
            rate.effective_date,
        );
        self.rates.insert(key, rate);
        Ok(())
    }
}

impl PostingRunStore for MemoryState {
    fn runs_for_document(
        &self,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
    ) -> StoreResult<Vec<PostingRun>> {
        let mut runs: Vec<_> = self
            .runs
            .values()
            .filter(|r| r.legal_entity_id == scope && r.doc_type == doc_type && r.doc_id == doc_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.version);
        Ok(runs)
    }

    fn find_run(&self, scope: LegalEntityId, id: PostingRunId) -> StoreResult<Option<PostingRun>> {
        Ok(self
            .runs
            .get(&id)
            .filter(|r| r.legal_entity_id == scope)
            .cloned())
    }

    fn insert_run(&mut self, run: PostingRun) -> StoreResult<()> {
        let same_doc = |r: &&PostingRun| {
            r.legal_entity_id == run.legal_entity_id
                && r.doc_type == run.doc_type
                && r.doc_id == run.doc_id
        };

        if self.runs.values().filter(same_doc).any(|r| r.version == run.version) {
            return Err(duplicate(format_args!(
                "posting run {} {} version {}",
                run.doc_type, run.doc_id, run.version
            )));
        }
        if run.is_live() && self.runs.values().filter(same_doc).any(PostingRun::is_live) {
            return Err(duplicate(format_args!(
                "live posting run for {} {}",
                run.doc_type, run.doc_id
            )));
        }
        if run.kind == PostingRunKind::Reversal
            && self
                .runs
                .values()
                .any(|r| r.kind == PostingRunKind::Reversal && r.reversed_run_id == run.reversed_run_id)
        {
            return Err(duplicate(format_args!(
                "reversal of posting run {:?}",
                run.reversed_run_id
            )));
        }

        self.runs.insert(run.id, run);
        Ok(())
    }

    fn update_run(&mut self, run: &PostingRun) -> StoreResult<()> {
        let stored = self
            .runs
            .get_mut(&run.id)
            .ok_or_else(|| missing("PostingRun", run.id))?;
        *stored = run.clone();
        Ok(())
    }
}

impl AccountingEntryStore for MemoryState {
    fn insert_entries(&mut self, entries: &[AccountingEntry]) -> StoreResult<()> {
        for entry in entries {
            if self.entries.contains_key(&entry.id) {
                return Err(duplicate(format_args!("accounting entry {}", entry.id)));
            }
            self.entries.insert(entry.id, entry.clone());
        }
        Ok(())
    }

    fn entries_for_run(&self, run_id: PostingRunId) -> StoreResult<Vec<AccountingEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.posting_run_id == run_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.line_number);
        Ok(entries)
    }

    fn entries_for_document(
        &self,
        scope: LegalEntityId,
        doc_type: DocType,
        doc_id: Uuid,
    ) -> StoreResult<Vec<AccountingEntry>> {
        let mut entries: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.legal_entity_id == scope && e.doc_type == doc_type && e.doc_id == doc_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.posting_run_id, e.line_number));
        Ok(entries)
    }

    fn entries_for_account(
        &self,
        scope: LegalEntityId,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<AccountingEntry>> {
        Ok(self
            .entries
            .values()
            .filter(|e| {
                e.legal_entity_id == scope
                    && e.touches(account)
                    && e.posting_date >= from
                    && e.posting_date <= to
            })
            .cloned()
            .collect())
    }

    fn find_entries(
        &self,
        scope: LegalEntityId,
        ids: &[AccountingEntryId],
    ) -> StoreResult<Vec<AccountingEntry>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|e| e.legal_entity_id == scope)
            .cloned()
            .collect())
    }
}

impl LinkStore for MemoryState {
    fn insert_link(&mut self, link: Link) -> StoreResult<()> {
        if self.links.iter().any(|l| l.id == link.id) {
            return Err(duplicate(format_args!("link {}", link.id)));
        }
        self.links.push(link);
        Ok(())
    }

    fn links_for_entries(&self, ids: &[AccountingEntryId]) -> StoreResult<Vec<Link>> {
        Ok(self
            .links
            .iter()
            .filter(|l| ids.contains(&l.entry_id))
            .cloned()
            .collect())
    }

    fn links_for_event(&self, scope: LegalEntityId, event: &EventRef) -> StoreResult<Vec<Link>> {
        Ok(self
            .links
            .iter()
            .filter(|l| l.legal_entity_id == scope && l.event == *event)
            .cloned()
            .collect())
    }

    fn links_for_run(&self, run_id: PostingRunId) -> StoreResult<Vec<Link>> {
        Ok(self
            .links
            .iter()
            .filter(|l| l.posting_run_id == run_id)
            .cloned()
            .collect())
    }
}

impl StockBatchStore for MemoryState {
    fn next_batch_sequence(&mut self) -> StoreResult<u64> {
        self.batch_sequence += 1;
        Ok(self.batch_sequence)
    }

    fn insert_batch(&mut self, batch: StockBatch) -> StoreResult<()> {
        if self.batches.contains_key(&batch.id) {
            return Err(duplicate(format_args!("stock batch {}", batch.id)));
        }
        self.batches.insert(batch.id, batch);
        Ok(())
    }

    fn find_batch(&self, scope: LegalEntityId, id: StockBatchId) -> StoreResult<Option<StockBatch>> {
        Ok(self
            .batches
            .get(&id)
            .filter(|b| b.legal_entity_id == scope)
            .cloned())
    }

    fn lock_open_batches(
        &mut self,
        scope: LegalEntityId,
        item_id: ItemId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Vec<StockBatch>> {
        // The whole state is held by this transaction, so the read is already exclusive.
        let mut batches: Vec<_> = self
            .batches
            .values()
            .filter(|b| {
                b.legal_entity_id == scope
                    && b.item_id == item_id
                    && b.warehouse_id == warehouse_id
                    && b.is_open()
            })
            .cloned()
            .collect();
        batches.sort_by_key(|b| (b.sequence, b.id));
        Ok(batches)
    }

    fn update_batch(&mut self, batch: &StockBatch) -> StoreResult<()> {
        let stored = self
            .batches
            .get_mut(&batch.id)
            .ok_or_else(|| missing("StockBatch", batch.id))?;
        *stored = batch.clone();
        Ok(())
    }

    fn batches_by_source(
        &self,
        scope: LegalEntityId,
        source_type: BatchSource,
        source_doc_id: Uuid,
    ) -> StoreResult<Vec<StockBatch>> {
        let mut batches: Vec<_> = self
            .batches
            .values()
            .filter(|b| {
                b.legal_entity_id == scope
                    && b.source_type == source_type
                    && b.source_doc_id == source_doc_id
            })
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.sequence);
        Ok(batches)
    }

    fn insert_movement(&mut self, movement: StockMovement) -> StoreResult<()> {
        if self.movements.values().any(|m| {
            m.legal_entity_id == movement.legal_entity_id
                && m.idempotency_key == movement.idempotency_key
        }) {
            return Err(duplicate(format_args!(
                "stock movement {}",
                movement.idempotency_key
            )));
        }
        self.movements.insert(movement.id, movement);
        Ok(())
    }

    fn movement_by_key(&self, scope: LegalEntityId, key: &str) -> StoreResult<Option<StockMovement>> {
        Ok(self
            .movements
            .values()
            .find(|m| m.legal_entity_id == scope && m.idempotency_key == key)
            .cloned())
    }

    fn movements_for_transaction(
        &self,
        id: InventoryTransactionId,
    ) -> StoreResult<Vec<StockMovement>> {
        Ok(self
            .movements
            .values()
            .filter(|m| m.inventory_transaction_id == id)
            .cloned()
            .collect())
    }

    fn find_movements(
        &self,
        scope: LegalEntityId,
        ids: &[StockMovementId],
    ) -> StoreResult<Vec<StockMovement>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.movements.get(id))
            .filter(|m| m.legal_entity_id == scope)
            .cloned()
            .collect())
    }
}

impl CashStore for MemoryState {
    fn insert_financial_account(&mut self, account: FinancialAccount) -> StoreResult<()> {
        if self.financial_accounts.contains_key(&account.id) {
            return Err(duplicate(format_args!("financial account {}", account.id)));
        }
        self.financial_accounts.insert(account.id, account);
        Ok(())
    }

    fn find_financial_account(&self, id: FinancialAccountId) -> StoreResult<Option<FinancialAccount>> {
        Ok(self.financial_accounts.get(&id).cloned())
    }

    fn insert_money_transaction(&mut self, tx: MoneyTransaction) -> StoreResult<()> {
        if self.money_transactions.values().any(|m| {
            m.legal_entity_id == tx.legal_entity_id && m.idempotency_key == tx.idempotency_key
        }) {
            return Err(duplicate(format_args!(
                "money transaction {}",
                tx.idempotency_key
            )));
        }
        self.money_transactions.insert(tx.id, tx);
        Ok(())
    }

    fn update_money_transaction(&mut self, tx: &MoneyTransaction) -> StoreResult<()> {
        let stored = self
            .money_transactions
            .get_mut(&tx.id)
            .ok_or_else(|| missing("MoneyTransaction", tx.id))?;
        *stored = tx.clone();
        Ok(())
    }

    fn find_money_transaction(&self, id: MoneyTransactionId) -> StoreResult<Option<MoneyTransaction>> {
        Ok(self.money_transactions.get(&id).cloned())
    }

    fn money_transaction_by_key(
        &self,
        scope: LegalEntityId,
        key: &str,
    ) -> StoreResult<Option<MoneyTransaction>> {
        Ok(self
            .money_transactions
            .values()
            .find(|m| m.legal_entity_id == scope && m.idempotency_key == key)
            .cloned())
    }

    fn find_money_transactions(
        &self,
        scope: LegalEntityId,
        ids: &[MoneyTransactionId],
    ) -> StoreResult<Vec<MoneyTransaction>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.money_transactions.get(id))
            .filter(|m| m.legal_entity_id == scope)
            .cloned()
            .collect())
    }

    fn money_transactions_in_window(
        &self,
        account_id: FinancialAccountId,
        direction: Direction,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<MoneyTransaction>> {
        Ok(self
            .money_transactions
            .values()
            .filter(|m| {
                m.account_id == account_id
                    && m.direction == direction
                    && m.is_active()
                    && m.occurred_on >= from
                    && m.occurred_on <= to
            })
            .cloned()
            .collect())
    }

    fn insert_payment_execution(&mut self, execution: PaymentExecution) -> StoreResult<()> {
        if self.payment_executions.contains_key(&execution.id) {
            return Err(duplicate(format_args!("payment execution {}", execution.id)));
        }
        self.payment_executions.insert(execution.id, execution);
        Ok(())
    }

    fn update_payment_execution(&mut self, execution: &PaymentExecution) -> StoreResult<()> {
        let stored = self
            .payment_executions
            .get_mut(&execution.id)
            .ok_or_else(|| missing("PaymentExecution", execution.id))?;
        *stored = execution.clone();
        Ok(())
    }

    fn find_payment_execution(
        &self,
        id: PaymentExecutionId,
    ) -> StoreResult<Option<PaymentExecution>> {
        Ok(self.payment_executions.get(&id).cloned())
    }

    fn find_payment_executions(
        &self,
        scope: LegalEntityId,
        ids: &[PaymentExecutionId],
    ) -> StoreResult<Vec<PaymentExecution>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.payment_executions.get(id))
            .filter(|p| p.legal_entity_id == scope)
            .cloned()
            .collect())
    }

    fn payment_executions_in_window(
        &self,
        account_id: FinancialAccountId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<PaymentExecution>> {
        Ok(self
            .payment_executions
            .values()
            .filter(|p| {
                p.from_account_id == account_id
                    && p.status == PaymentStatus::Executed
                    && p.executed_on >= from
                    && p.executed_on <= to
            })
            .cloned()
            .collect())
    }

    fn insert_cash_transfer(&mut self, transfer: CashTransfer) -> StoreResult<()> {
        if self.cash_transfers.values().any(|t| {
            t.from_line_id == transfer.from_line_id && t.to_line_id == transfer.to_line_id
        }) {
            return Err(duplicate(format_args!(
                "cash transfer {} -> {}",
                transfer.from_line_id, transfer.to_line_id
            )));
        }
        self.cash_transfers.insert(transfer.id, transfer);
        Ok(())
    }

    fn update_cash_transfer(&mut self, transfer: &CashTransfer) -> StoreResult<()> {
        let stored = self
            .cash_transfers
            .get_mut(&transfer.id)
            .ok_or_else(|| missing("CashTransfer", transfer.id))?;
        *stored = transfer.clone();
        Ok(())
    }

    fn find_cash_transfer(
        &self,
        scope: LegalEntityId,
        id: CashTransferId,
    ) -> StoreResult<Option<CashTransfer>> {
        Ok(self
            .cash_transfers
            .get(&id)
            .filter(|t| t.legal_entity_id == scope)
            .cloned())
    }

    fn cash_transfers_for_line(&self, line_id: StatementLineId) -> StoreResult<Vec<CashTransfer>> {
        Ok(self
            .cash_transfers
            .values()
            .filter(|t| t.from_line_id == line_id || t.to_line_id == line_id)
            .cloned()
            .collect())
    }
}

impl StatementStore for MemoryState {
    fn insert_statement_line(&mut self, line: StatementLine) -> StoreResult<()> {
        if self
            .statement_lines
            .values()
            .any(|l| l.account_id == line.account_id && l.external_id == line.external_id)
        {
            return Err(duplicate(format_args!(
                "statement line {} on account {}",
                line.external_id, line.account_id
            )));
        }
        self.statement_lines.insert(line.id, line);
        Ok(())
    }

    fn update_statement_line(&mut self, line: &StatementLine) -> StoreResult<()> {
        let stored = self
            .statement_lines
            .get_mut(&line.id)
            .ok_or_else(|| missing("StatementLine", line.id))?;
        *stored = line.clone();
        Ok(())
    }

    fn find_statement_line(&self, id: StatementLineId) -> StoreResult<Option<StatementLine>> {
        Ok(self.statement_lines.get(&id).cloned())
    }

    fn statement_line_by_external_id(
        &self,
        account_id: FinancialAccountId,
        external_id: &str,
    ) -> StoreResult<Option<StatementLine>> {
        Ok(self
            .statement_lines
            .values()
            .find(|l| l.account_id == account_id && l.external_id == external_id)
            .cloned())
    }

    fn find_statement_lines(
        &self,
        scope: LegalEntityId,
        ids: &[StatementLineId],
    ) -> StoreResult<Vec<StatementLine>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.statement_lines.get(id))
            .filter(|l| l.legal_entity_id == scope)
            .cloned()
            .collect())
    }

    fn statement_lines_matched_to(&self, target: &MatchTarget) -> StoreResult<Vec<StatementLine>> {
        Ok(self
            .statement_lines
            .values()
            .filter(|l| l.matched.as_ref() == Some(target))
            .cloned()
            .collect())
    }

    fn statement_lines_posted_with(
        &self,
        money_transaction_id: MoneyTransactionId,
    ) -> StoreResult<Vec<StatementLine>> {
        Ok(self
            .statement_lines
            .values()
            .filter(|l| l.posted_money_transaction_id == Some(money_transaction_id))
            .cloned()
            .collect())
    }
}

impl DocumentStore for MemoryState {
    fn insert_financial_document(&mut self, document: FinancialDocument) -> StoreResult<()> {
        if self.financial_documents.contains_key(&document.id) {
            return Err(duplicate(format_args!("financial document {}", document.id)));
        }
        self.financial_documents.insert(document.id, document);
        Ok(())
    }

    fn find_financial_documents(
        &self,
        scope: LegalEntityId,
        ids: &[FinancialDocumentId],
    ) -> StoreResult<Vec<FinancialDocument>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.financial_documents.get(id))
            .filter(|d| d.legal_entity_id == scope)
            .cloned()
            .collect())
    }

    fn find_financial_document(&self, id: FinancialDocumentId) -> StoreResult<Option<FinancialDocument>> {
        Ok(self.financial_documents.get(&id).cloned())
    }

    fn insert_acquiring_event(&mut self, event: AcquiringEvent) -> StoreResult<()> {
        if self.acquiring_events.contains_key(&event.id) {
            return Err(duplicate(format_args!("acquiring event {}", event.id)));
        }
        self.acquiring_events.insert(event.id, event);
        Ok(())
    }

    fn find_acquiring_events(
        &self,
        scope: LegalEntityId,
        ids: &[AcquiringEventId],
    ) -> StoreResult<Vec<AcquiringEvent>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.acquiring_events.get(id))
            .filter(|e| e.legal_entity_id == scope)
            .cloned()
            .collect())
    }

    fn find_acquiring_event(&self, id: AcquiringEventId) -> StoreResult<Option<AcquiringEvent>> {
        Ok(self.acquiring_events.get(&id).cloned())
    }
}

impl RecurringStore for MemoryState {
    fn insert_journal(&mut self, journal: RecurringJournal) -> StoreResult<()> {
        if self.journals.contains_key(&journal.id) {
            return Err(duplicate(format_args!("recurring journal {}", journal.id)));
        }
        self.journals.insert(journal.id, journal);
        Ok(())
    }

    fn journals(&self, scope: LegalEntityId) -> StoreResult<Vec<RecurringJournal>> {
        Ok(self
            .journals
            .values()
            .filter(|j| j.legal_entity_id == scope && j.active)
            .cloned()
            .collect())
    }

    fn journal_run(
        &self,
        journal_id: RecurringJournalId,
        period_start: NaiveDate,
    ) -> StoreResult<Option<JournalRun>> {
        Ok(self.journal_runs.get(&(journal_id, period_start)).cloned())
    }

    fn insert_journal_run(&mut self, run: JournalRun) -> StoreResult<()> {
        let key = (run.journal_id, run.period_start);
        if self.journal_runs.contains_key(&key) {
            return Err(duplicate(format_args!(
                "journal run {} for {}",
                run.journal_id, run.period_start
            )));
        }
        self.journal_runs.insert(key, run);
        Ok(())
    }

    fn journal_runs_for_document(
        &self,
        scope: LegalEntityId,
        document_id: FinancialDocumentId,
    ) -> StoreResult<Vec<JournalRun>> {
        Ok(self
            .journal_runs
            .values()
            .filter(|run| run.legal_entity_id == scope)
            .filter(|run| {
                self.journals
                    .get(&run.journal_id)
                    .is_some_and(|j| j.source_document_id == Some(document_id))
            })
            .cloned()
            .collect())
    }
}

impl OutboxStore for MemoryState {
    fn push_event(&mut self, event: OutboxEvent) -> StoreResult<()> {
        self.outbox.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(scope: LegalEntityId, doc_id: Uuid, version: u32) -> PostingRun {
        PostingRun {
            id: PostingRunId::new(),
            legal_entity_id: scope,
            doc_type: DocType::SupplyReceipt,
            doc_id,
            version,
            kind: PostingRunKind::Original,
            reversed_run_id: None,
            reversal_run_id: None,
            void_reason: None,
            posted_at: Utc::now(),
            voided_at: None,
        }
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = MemoryStore::new();
        let entity = LegalEntity {
            id: LegalEntityId::new(),
            name: "Acme".to_string(),
            base_currency: code("USD"),
        };
        let id = entity.id;

        let result: StoreResult<()> = store.transaction(|tx| {
            tx.insert_legal_entity(entity)?;
            Err(LedgerError::validation("abort"))
        });

        assert!(result.is_err());
        let found = store.read(|tx| tx.legal_entity(id)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_second_live_run_is_duplicate() {
        let mut state = MemoryState::default();
        let scope = LegalEntityId::new();
        let doc_id = Uuid::now_v7();

        state.insert_run(run(scope, doc_id, 1)).unwrap();
        let err = state.insert_run(run(scope, doc_id, 2)).unwrap_err();

        assert!(err.is_retryable());
    }

    #[test]
    fn test_same_version_is_duplicate() {
        let mut state = MemoryState::default();
        let scope = LegalEntityId::new();
        let doc_id = Uuid::now_v7();
        let mut first = run(scope, doc_id, 1);
        first.reversal_run_id = Some(PostingRunId::new());
        state.insert_run(first).unwrap();

        let err = state.insert_run(run(scope, doc_id, 1)).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateKey(_)));
    }

    #[test]
    fn test_latest_rate_on_or_before() {
        let mut state = MemoryState::default();
        for (day, rate) in [(1, dec!(1.10)), (10, dec!(1.20)), (20, dec!(1.30))] {
            state
                .upsert_rate(ExchangeRate::new(code("EUR"), code("USD"), rate, date(2025, 1, day)).unwrap())
                .unwrap();
        }

        let rate = |d| state.latest_rate(&code("EUR"), &code("USD"), d).unwrap().map(|r| r.rate);
        assert_eq!(rate(date(2024, 12, 31)), None);
        assert_eq!(rate(date(2025, 1, 1)), Some(dec!(1.10)));
        assert_eq!(rate(date(2025, 1, 15)), Some(dec!(1.20)));
        assert_eq!(rate(date(2025, 2, 1)), Some(dec!(1.30)));
        assert_eq!(state.latest_rate(&code("USD"), &code("EUR"), date(2025, 2, 1)).unwrap(), None);
    }

    #[test]
    fn test_drain_outbox_empties_it() {
        let store = MemoryStore::new();
        let event = OutboxEvent {
            id: tally_shared::types::OutboxEventId::new(),
            legal_entity_id: LegalEntityId::new(),
            event_type: "TEST".to_string(),
            aggregate_id: "a".to_string(),
            payload: serde_json::Value::Null,
            occurred_at: Utc::now(),
        };
        store.transaction(|tx| tx.push_event(event)).unwrap();

        assert_eq!(store.drain_outbox().unwrap().len(), 1);
        assert!(store.drain_outbox().unwrap().is_empty());
    }
}
