//! Read-only drill-down from ledger lines to the documents behind them.
//!
//! Every query is scoped: entities of another legal entity are rejected and
//! batched lookups only return rows of the caller's scope.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use tally_shared::types::{
    AcquiringEventId, CashTransferId, CurrencyCode, FinancialDocumentId, LegalEntityId,
    MoneyTransactionId, PageRequest, PageResponse, PaymentExecutionId, StatementLineId,
    StockMovementId,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::types::{
    EntityRef, ExplainContext, ExplainItem, ExplainItemKind, ExplainLink, ExplainPayload,
    PrimaryKind, PrimaryRef,
};
use crate::cash::types::{MoneySource, MoneyTransaction};
use crate::ledger::balance::AccountTurnover;
use crate::ledger::context::PostingContext;
use crate::ledger::error::LedgerError;
use crate::ledger::types::{AccountingEntry, DocType};
use crate::links::types::{EventRef, Link};
use crate::reconciliation::types::{MatchTarget, StatementLine};
use crate::store::LedgerTx;

/// Explain queries.
pub struct ExplainService;

impl ExplainService {
    /// Entries touching `account` with posting date in `[from, to]`, newest
    /// first, one page at a time, each with its links and primary documents.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty account code or an inverted range.
    #[instrument(skip(tx, page), fields(page = page.page(), per_page = page.per_page()))]
    pub fn explain_account<T>(
        tx: &T,
        scope: LegalEntityId,
        account: &str,
        from: NaiveDate,
        to: NaiveDate,
        page: &PageRequest,
    ) -> Result<ExplainPayload, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        if account.trim().is_empty() {
            return Err(LedgerError::validation("account is required"));
        }
        if to < from {
            return Err(LedgerError::validation(format!(
                "explain range ends before it starts: {from} > {to}"
            )));
        }

        let mut entries = tx.entries_for_account(scope, account, from, to)?;
        newest_first(&mut entries);
        let turnover = AccountTurnover::of(account, &entries);
        let page = PageResponse::paginate(entries, page);

        let graph = Graph::load(tx, scope, &page.data, &[])?;
        let PageResponse { data: items, meta } = page.map(|entry| graph.entry_item(&entry));

        Ok(ExplainPayload {
            legal_entity_id: scope,
            context: ExplainContext::Account {
                account: account.to_string(),
                from,
                to,
                turnover,
            },
            items,
            page: Some(meta),
        })
    }

    /// One-hop graph around an entity: the entity, its cash and statement
    /// neighbours, and every ledger line posted for or linked to it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entity does not exist
    /// - `Validation` if it belongs to another legal entity
    #[instrument(skip(tx))]
    pub fn explain_entity<T>(
        tx: &T,
        scope: LegalEntityId,
        entity: EntityRef,
    ) -> Result<ExplainPayload, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let hood = match entity {
            EntityRef::PaymentExecution(id) => Self::payment_execution(tx, scope, id)?,
            EntityRef::FinancialDocument(id) => Self::financial_document(tx, scope, id)?,
            EntityRef::StatementLine(id) => Self::statement_line(tx, scope, id)?,
            EntityRef::AcquiringEvent(id) => Self::acquiring_event(tx, scope, id)?,
            EntityRef::MoneyTransaction(id) => Self::money_transaction(tx, scope, id)?,
        };
        let Neighbourhood {
            head,
            money_txs,
            statement_lines,
            mut entries,
        } = hood;

        let mut seen = HashSet::new();
        entries.retain(|e| seen.insert(e.id));
        newest_first(&mut entries);
        let graph = Graph::load(tx, scope, &entries, &money_txs)?;

        let mut items: Vec<ExplainItem> = head.into_iter().collect();
        items.extend(money_txs.iter().map(|m| graph.money_item(m)));
        items.extend(statement_lines.iter().map(statement_item));
        items.extend(entries.iter().map(|e| graph.entry_item(e)));
        debug!(items = items.len(), "entity explained");

        Ok(ExplainPayload {
            legal_entity_id: scope,
            context: ExplainContext::Entity { entity },
            items,
            page: None,
        })
    }

    fn payment_execution<T>(
        tx: &T,
        scope: LegalEntityId,
        id: PaymentExecutionId,
    ) -> Result<Neighbourhood, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let execution = tx
            .find_payment_execution(id)?
            .ok_or_else(|| LedgerError::not_found("payment execution", id))?;
        ensure_scope(execution.legal_entity_id, scope, "payment execution")?;

        let money_txs = tx.find_money_transactions(scope, &[execution.money_transaction_id])?;
        let mut entries = tx.entries_for_document(scope, DocType::PaymentExecution, id.into())?;
        entries.extend(linked_entries(tx, scope, &money_events(&money_txs))?);

        let head = doc_item(
            id.into(),
            execution.executed_on,
            &execution.amount.currency,
            format!("PaymentExecution {}", execution.amount),
        );
        Ok(Neighbourhood {
            head: Some(head),
            money_txs,
            statement_lines: tx.statement_lines_matched_to(&MatchTarget::PaymentExecution(id))?,
            entries,
        })
    }

    fn financial_document<T>(
        tx: &T,
        scope: LegalEntityId,
        id: FinancialDocumentId,
    ) -> Result<Neighbourhood, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let document = tx
            .find_financial_document(id)?
            .ok_or_else(|| LedgerError::not_found("financial document", id))?;
        ensure_scope(document.legal_entity_id, scope, "financial document")?;

        let mut entries =
            tx.entries_for_document(scope, DocType::FinancialDocumentAccrual, id.into())?;
        for run in tx.journal_runs_for_document(scope, id)? {
            entries.extend(tx.entries_for_document(
                scope,
                DocType::FinancialDocumentRecognition,
                run.id.into(),
            )?);
        }

        let head = doc_item(
            id.into(),
            document.issued_on,
            &document.amount.currency,
            format!("FinancialDocument {}", document.number),
        );
        Ok(Neighbourhood {
            head: Some(head),
            money_txs: Vec::new(),
            statement_lines: Vec::new(),
            entries,
        })
    }

    fn statement_line<T>(
        tx: &T,
        scope: LegalEntityId,
        id: StatementLineId,
    ) -> Result<Neighbourhood, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let line = tx
            .find_statement_line(id)?
            .ok_or_else(|| LedgerError::not_found("statement line", id))?;
        ensure_scope(line.legal_entity_id, scope, "statement line")?;

        let mut money_ids: Vec<MoneyTransactionId> =
            line.posted_money_transaction_id.into_iter().collect();
        match line.matched {
            Some(MatchTarget::MoneyTransaction(mt)) => money_ids.push(mt),
            Some(MatchTarget::PaymentExecution(pe)) => {
                if let Some(execution) = tx.find_payment_execution(pe)? {
                    money_ids.push(execution.money_transaction_id);
                }
            }
            None => {}
        }
        money_ids.sort();
        money_ids.dedup();
        let money_txs = tx.find_money_transactions(scope, &money_ids)?;

        let mut entries = linked_entries(tx, scope, &money_events(&money_txs))?;
        for transfer in tx.cash_transfers_for_line(id)? {
            entries.extend(tx.entries_for_document(
                scope,
                DocType::MarketplacePayoutTransfer,
                transfer.id.into(),
            )?);
        }

        Ok(Neighbourhood {
            head: None,
            money_txs,
            statement_lines: vec![line],
            entries,
        })
    }

    fn acquiring_event<T>(
        tx: &T,
        scope: LegalEntityId,
        id: AcquiringEventId,
    ) -> Result<Neighbourhood, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let event = tx
            .find_acquiring_event(id)?
            .ok_or_else(|| LedgerError::not_found("acquiring event", id))?;
        ensure_scope(event.legal_entity_id, scope, "acquiring event")?;

        let mut entries = tx.entries_for_document(scope, DocType::AcquiringEvent, id.into())?;
        entries.extend(linked_entries(tx, scope, &[EventRef::AcquiringEvent(id)])?);
        let statement_lines = match event.statement_line_id {
            Some(line_id) => tx.find_statement_lines(scope, &[line_id])?,
            None => Vec::new(),
        };

        let head = doc_item(
            id.into(),
            event.settled_on,
            &event.gross.currency,
            format!("AcquiringEvent {} (fee {})", event.gross, event.fee.amount),
        );
        Ok(Neighbourhood {
            head: Some(head),
            money_txs: Vec::new(),
            statement_lines,
            entries,
        })
    }

    fn money_transaction<T>(
        tx: &T,
        scope: LegalEntityId,
        id: MoneyTransactionId,
    ) -> Result<Neighbourhood, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let money_tx = tx
            .find_money_transaction(id)?
            .ok_or_else(|| LedgerError::not_found("money transaction", id))?;
        ensure_scope(money_tx.legal_entity_id, scope, "money transaction")?;

        let entries = linked_entries(tx, scope, &[EventRef::MoneyTransaction(id)])?;
        let mut statement_lines = tx.statement_lines_posted_with(id)?;
        statement_lines.retain(|l| l.legal_entity_id == scope);

        Ok(Neighbourhood {
            head: None,
            money_txs: vec![money_tx],
            statement_lines,
            entries,
        })
    }
}

/// Raw material of an entity explain before links and primaries are loaded.
struct Neighbourhood {
    head: Option<ExplainItem>,
    money_txs: Vec<MoneyTransaction>,
    statement_lines: Vec<StatementLine>,
    entries: Vec<AccountingEntry>,
}

/// Links and resolved primary documents around a set of entries.
struct Graph {
    links: Vec<Link>,
    money_txs: HashMap<MoneyTransactionId, MoneyTransaction>,
    statement_line_of_event: HashMap<AcquiringEventId, StatementLineId>,
    primary: HashMap<String, PrimaryRef>,
}

impl Graph {
    fn load<T>(
        tx: &T,
        scope: LegalEntityId,
        entries: &[AccountingEntry],
        extra_money_txs: &[MoneyTransaction],
    ) -> Result<Self, LedgerError>
    where
        T: LedgerTx + ?Sized,
    {
        let entry_ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        let mut links = if entry_ids.is_empty() {
            Vec::new()
        } else {
            tx.links_for_entries(&entry_ids)?
        };
        links.retain(|l| l.legal_entity_id == scope);

        let mut money_ids: BTreeSet<MoneyTransactionId> =
            extra_money_txs.iter().map(|m| m.id).collect();
        let mut acquiring_ids = BTreeSet::new();
        for link in &links {
            match link.event {
                EventRef::MoneyTransaction(id) => {
                    money_ids.insert(id);
                }
                EventRef::AcquiringEvent(id) => {
                    acquiring_ids.insert(id);
                }
                EventRef::StockMovement(_) => {}
            }
        }
        let money_ids: Vec<_> = money_ids.into_iter().collect();
        let money_txs: HashMap<_, _> = tx
            .find_money_transactions(scope, &money_ids)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let acquiring_ids: Vec<_> = acquiring_ids.into_iter().collect();
        let statement_line_of_event: HashMap<_, _> = tx
            .find_acquiring_events(scope, &acquiring_ids)?
            .into_iter()
            .filter_map(|e| e.statement_line_id.map(|line| (e.id, line)))
            .collect();

        let mut wanted = BTreeSet::new();
        wanted.extend(entries.iter().filter_map(direct_primary));
        wanted.extend(links.iter().map(|l| event_primary(&l.event)));
        wanted.extend(money_txs.values().filter_map(money_source_primary));
        wanted.extend(
            statement_line_of_event
                .values()
                .map(|line| (PrimaryKind::StatementLine, line.into_inner())),
        );
        let primary = resolve(tx, scope, &wanted)?;

        Ok(Self {
            links,
            money_txs,
            statement_line_of_event,
            primary,
        })
    }

    fn entry_item(&self, entry: &AccountingEntry) -> ExplainItem {
        let links: Vec<&Link> = self.links.iter().filter(|l| l.entry_id == entry.id).collect();

        let mut keys: Vec<(PrimaryKind, Uuid)> = direct_primary(entry).into_iter().collect();
        for link in &links {
            keys.push(event_primary(&link.event));
            match link.event {
                EventRef::MoneyTransaction(id) => {
                    keys.extend(self.money_txs.get(&id).and_then(money_source_primary));
                }
                EventRef::AcquiringEvent(id) => {
                    if let Some(line) = self.statement_line_of_event.get(&id) {
                        keys.push((PrimaryKind::StatementLine, line.into_inner()));
                    }
                }
                EventRef::StockMovement(_) => {}
            }
        }

        ExplainItem {
            kind: ExplainItemKind::AccountingEntryLine,
            id: entry.id.into(),
            occurred_on: entry.posting_date,
            amount_base: Some(entry.amount_base),
            currency: entry.currency.clone(),
            direction: None,
            debit_account: entry.debit_account.clone(),
            credit_account: entry.credit_account.clone(),
            doc_type: Some(entry.doc_type),
            doc_id: Some(entry.doc_id),
            line_number: Some(entry.line_number),
            doc_line_id: Some(entry.doc_line_id().to_string()),
            title: format!("{} {}", entry.doc_type, entry.doc_id),
            links: links.into_iter().map(explain_link).collect(),
            primary: self.lookup(keys),
        }
    }

    fn money_item(&self, money_tx: &MoneyTransaction) -> ExplainItem {
        let event = EventRef::MoneyTransaction(money_tx.id);
        let mut keys = vec![(PrimaryKind::MoneyTransaction, money_tx.id.into_inner())];
        keys.extend(money_source_primary(money_tx));

        ExplainItem {
            kind: ExplainItemKind::MoneyTransaction,
            id: money_tx.id.into(),
            occurred_on: money_tx.occurred_on,
            amount_base: Some(money_tx.amount_base),
            currency: money_tx.amount.currency.clone(),
            direction: Some(money_tx.direction),
            debit_account: None,
            credit_account: None,
            doc_type: None,
            doc_id: None,
            line_number: None,
            doc_line_id: None,
            title: format!("{:?} {}", money_tx.direction, money_tx.amount),
            links: self
                .links
                .iter()
                .filter(|l| l.event == event)
                .map(explain_link)
                .collect(),
            primary: self.lookup(keys),
        }
    }

    /// Resolved refs for `keys`, first occurrence wins, unknown keys dropped.
    fn lookup(&self, keys: Vec<(PrimaryKind, Uuid)>) -> Vec<PrimaryRef> {
        let mut seen = HashSet::new();
        keys.into_iter()
            .filter(|key| seen.insert(*key))
            .filter_map(|(kind, id)| self.primary.get(&kind.key(id)).cloned())
            .collect()
    }
}

/// One batched lookup per document kind, indexed by `Type:id`.
fn resolve<T>(
    tx: &T,
    scope: LegalEntityId,
    wanted: &BTreeSet<(PrimaryKind, Uuid)>,
) -> Result<HashMap<String, PrimaryRef>, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    let ids_of = |kind: PrimaryKind| -> Vec<Uuid> {
        wanted
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect()
    };
    let mut refs = Vec::with_capacity(wanted.len());

    let ids: Vec<_> = ids_of(PrimaryKind::FinancialDocument)
        .into_iter()
        .map(FinancialDocumentId::from_uuid)
        .collect();
    for document in tx.find_financial_documents(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::FinancialDocument,
            document.id.into(),
            format!("FinancialDocument {}", document.number),
            Some(document.amount.to_string()),
        ));
    }

    let ids: Vec<_> = ids_of(PrimaryKind::PaymentExecution)
        .into_iter()
        .map(PaymentExecutionId::from_uuid)
        .collect();
    for execution in tx.find_payment_executions(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::PaymentExecution,
            execution.id.into(),
            format!("PaymentExecution {}", execution.id),
            Some(format!("{} @ {}", execution.amount, execution.executed_on)),
        ));
    }

    let ids: Vec<_> = ids_of(PrimaryKind::StatementLine)
        .into_iter()
        .map(StatementLineId::from_uuid)
        .collect();
    for line in tx.find_statement_lines(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::StatementLine,
            line.id.into(),
            format!("StatementLine {}", line.external_id),
            line.description.clone(),
        ));
    }

    let ids: Vec<_> = ids_of(PrimaryKind::MoneyTransaction)
        .into_iter()
        .map(MoneyTransactionId::from_uuid)
        .collect();
    for money_tx in tx.find_money_transactions(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::MoneyTransaction,
            money_tx.id.into(),
            format!("MoneyTransaction {:?} {}", money_tx.direction, money_tx.amount),
            money_tx.reference.clone(),
        ));
    }

    let ids: Vec<_> = ids_of(PrimaryKind::AcquiringEvent)
        .into_iter()
        .map(AcquiringEventId::from_uuid)
        .collect();
    for event in tx.find_acquiring_events(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::AcquiringEvent,
            event.id.into(),
            format!("AcquiringEvent {}", event.gross),
            Some(format!("fee {} @ {}", event.fee, event.settled_on)),
        ));
    }

    let ids: Vec<_> = ids_of(PrimaryKind::StockMovement)
        .into_iter()
        .map(StockMovementId::from_uuid)
        .collect();
    for movement in tx.find_movements(scope, &ids)? {
        refs.push(primary_ref(
            PrimaryKind::StockMovement,
            movement.id.into(),
            format!("StockMovement {:?} {}", movement.movement_type, movement.quantity),
            Some(format!("{} {}", movement.doc_type, movement.doc_id)),
        ));
    }

    for id in ids_of(PrimaryKind::CashTransfer) {
        if let Some(transfer) = tx.find_cash_transfer(scope, CashTransferId::from_uuid(id))? {
            refs.push(primary_ref(
                PrimaryKind::CashTransfer,
                id,
                format!("CashTransfer {}", transfer.external_reference),
                Some(transfer.amount.to_string()),
            ));
        }
    }

    // Documents owned outside the ledger: only their identity is known here.
    for kind in [
        PrimaryKind::SupplyReceipt,
        PrimaryKind::ProductionOrder,
        PrimaryKind::InventoryTransaction,
        PrimaryKind::SalesDocument,
        PrimaryKind::SaleReturn,
        PrimaryKind::InternalTransfer,
    ] {
        for id in ids_of(kind) {
            refs.push(primary_ref(kind, id, format!("{} {id}", kind.as_str()), None));
        }
    }

    Ok(refs.into_iter().map(|r| (r.key(), r)).collect())
}

fn primary_ref(kind: PrimaryKind, id: Uuid, title: String, subtitle: Option<String>) -> PrimaryRef {
    PrimaryRef {
        kind,
        id,
        title,
        subtitle,
    }
}

/// The document an entry was posted for.
fn direct_primary(entry: &AccountingEntry) -> Option<(PrimaryKind, Uuid)> {
    let kind = match entry.doc_type {
        DocType::SupplyReceipt => PrimaryKind::SupplyReceipt,
        DocType::PaymentExecution => PrimaryKind::PaymentExecution,
        DocType::SalesDocument => PrimaryKind::SalesDocument,
        DocType::SaleReturn => PrimaryKind::SaleReturn,
        DocType::ProductionCompletion => PrimaryKind::ProductionOrder,
        DocType::ProductionConsumption => PrimaryKind::InventoryTransaction,
        DocType::FinancialDocumentAccrual => PrimaryKind::FinancialDocument,
        DocType::MarketplacePayoutTransfer => PrimaryKind::CashTransfer,
        DocType::AcquiringEvent => PrimaryKind::AcquiringEvent,
        DocType::InternalTransfer => PrimaryKind::InternalTransfer,
        DocType::StatementLineFee => PrimaryKind::StatementLine,
        // Recognition runs are keyed by journal run; the document is in the context.
        // Reversal lines carry a reversal context and resolve to nothing.
        DocType::FinancialDocumentRecognition => {
            return recognised_document(&entry.metadata.context)
                .map(|id| (PrimaryKind::FinancialDocument, id.into_inner()));
        }
    };
    Some((kind, entry.doc_id))
}

fn recognised_document(context: &PostingContext) -> Option<FinancialDocumentId> {
    match context {
        PostingContext::Recognition {
            source_document_id, ..
        } => *source_document_id,
        _ => None,
    }
}

fn event_primary(event: &EventRef) -> (PrimaryKind, Uuid) {
    match *event {
        EventRef::MoneyTransaction(id) => (PrimaryKind::MoneyTransaction, id.into_inner()),
        EventRef::StockMovement(id) => (PrimaryKind::StockMovement, id.into_inner()),
        EventRef::AcquiringEvent(id) => (PrimaryKind::AcquiringEvent, id.into_inner()),
    }
}

fn money_source_primary(money_tx: &MoneyTransaction) -> Option<(PrimaryKind, Uuid)> {
    match money_tx.source {
        MoneySource::PaymentExecution(id) => Some((PrimaryKind::PaymentExecution, id.into_inner())),
        MoneySource::StatementLine(id) => Some((PrimaryKind::StatementLine, id.into_inner())),
        MoneySource::InternalTransfer(id) => Some((PrimaryKind::InternalTransfer, id.into_inner())),
        MoneySource::Manual => None,
    }
}

fn money_events(money_txs: &[MoneyTransaction]) -> Vec<EventRef> {
    money_txs
        .iter()
        .map(|m| EventRef::MoneyTransaction(m.id))
        .collect()
}

fn linked_entries<T>(
    tx: &T,
    scope: LegalEntityId,
    events: &[EventRef],
) -> Result<Vec<AccountingEntry>, LedgerError>
where
    T: LedgerTx + ?Sized,
{
    let mut ids = Vec::new();
    for event in events {
        ids.extend(tx.links_for_event(scope, event)?.into_iter().map(|l| l.entry_id));
    }
    ids.sort();
    ids.dedup();
    tx.find_entries(scope, &ids)
}

fn ensure_scope(owner: LegalEntityId, scope: LegalEntityId, what: &str) -> Result<(), LedgerError> {
    if owner != scope {
        return Err(LedgerError::validation(format!(
            "{what} belongs to another legal entity"
        )));
    }
    Ok(())
}

/// Posting date descending, then line number descending.
fn newest_first(entries: &mut [AccountingEntry]) {
    entries.sort_by(|a, b| {
        b.posting_date
            .cmp(&a.posting_date)
            .then_with(|| b.line_number.cmp(&a.line_number))
    });
}

fn explain_link(link: &Link) -> ExplainLink {
    ExplainLink {
        kind: link.event.kind(),
        role: link.role,
        event: link.event,
        entry_id: link.entry_id,
        amount_base: link.amount_base,
    }
}

fn doc_item(
    id: Uuid,
    occurred_on: NaiveDate,
    currency: &CurrencyCode,
    title: String,
) -> ExplainItem {
    ExplainItem {
        kind: ExplainItemKind::Doc,
        id,
        occurred_on,
        amount_base: None,
        currency: currency.clone(),
        direction: None,
        debit_account: None,
        credit_account: None,
        doc_type: None,
        doc_id: None,
        line_number: None,
        doc_line_id: None,
        title,
        links: Vec::new(),
        primary: Vec::new(),
    }
}

fn statement_item(line: &StatementLine) -> ExplainItem {
    ExplainItem {
        kind: ExplainItemKind::StatementLine,
        id: line.id.into(),
        occurred_on: line.occurred_on,
        amount_base: None,
        currency: line.amount.currency.clone(),
        direction: Some(line.direction),
        debit_account: None,
        credit_account: None,
        doc_type: None,
        doc_id: None,
        line_number: None,
        doc_line_id: None,
        title: format!("StatementLine {} {:?}", line.external_id, line.status),
        links: Vec::new(),
        primary: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cash::{FinancialAccount, FinancialAccountKind};
    use crate::documents::{
        AcquiringEvent, AcquiringService, FinancialDocument, FinancialDocumentService,
        PaymentRequest, PaymentService,
    };
    use crate::fixtures::{code, date, ledger_config, seeded_state};
    use crate::ledger::accounts;
    use crate::ledger::context::RecognitionKind;
    use crate::ledger::types::LegalEntity;
    use crate::links::LinkRole;
    use crate::recurring::{RecurringJournal, RecurringService};
    use crate::store::memory::MemoryState;
    use crate::store::{CashStore, LegalEntityStore};
    use rust_decimal_macros::dec;
    use tally_shared::types::{FinancialAccountId, Money, RecurringJournalId};

    fn account(state: &mut MemoryState, scope: LegalEntityId) -> FinancialAccount {
        let account = FinancialAccount {
            id: FinancialAccountId::new(),
            legal_entity_id: scope,
            name: "acquirer".to_string(),
            kind: FinancialAccountKind::Acquiring,
            currency: code("USD"),
            ledger_account: accounts::CASH_EQUIVALENTS.to_string(),
        };
        state.insert_financial_account(account.clone()).unwrap();
        account
    }

    fn settle(state: &mut MemoryState, scope: LegalEntityId, gross: rust_decimal::Decimal, on: NaiveDate) -> AcquiringEvent {
        let account = account(state, scope);
        let event = AcquiringEvent {
            id: AcquiringEventId::new(),
            legal_entity_id: scope,
            account_id: account.id,
            gross: Money::new(gross, code("USD")),
            fee: Money::new(dec!(10), code("USD")),
            settled_on: on,
            statement_line_id: None,
        };
        AcquiringService::post(state, &ledger_config(), &event).unwrap();
        event
    }

    #[test]
    fn test_account_lines_newest_first_and_paged() {
        let (mut state, scope) = seeded_state();
        let early = settle(&mut state, scope, dec!(500), date(2025, 3, 1));
        let late = settle(&mut state, scope, dec!(700), date(2025, 3, 5));

        let payload = ExplainService::explain_account(
            &state,
            scope,
            accounts::CLEARING_ACQUIRING,
            date(2025, 3, 1),
            date(2025, 3, 31),
            &PageRequest::new(1, 3),
        )
        .unwrap();

        let order: Vec<_> = payload
            .items
            .iter()
            .map(|i| (i.occurred_on, i.line_number.unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![(date(2025, 3, 5), 2), (date(2025, 3, 5), 1), (date(2025, 3, 1), 2)]
        );
        let meta = payload.page.unwrap();
        assert_eq!(meta.total, 4);
        assert_eq!(meta.total_pages, 2);
        match payload.context {
            ExplainContext::Account { turnover, .. } => {
                assert_eq!(turnover.debit_total, dec!(1200));
                assert_eq!(turnover.credit_total, dec!(20));
            }
            other => panic!("unexpected context {other:?}"),
        }
        assert!(payload.items[0]
            .primary
            .iter()
            .any(|p| p.kind == PrimaryKind::AcquiringEvent && p.id == late.id.into_inner()));
        assert!(payload.items[2]
            .primary
            .iter()
            .any(|p| p.id == early.id.into_inner()));
    }

    #[test]
    fn test_payment_execution_graph() {
        let (mut state, scope) = seeded_state();
        let account = account(&mut state, scope);
        let request = PaymentRequest {
            id: PaymentExecutionId::new(),
            legal_entity_id: scope,
            from_account_id: account.id,
            amount: dec!(80),
            executed_on: date(2025, 4, 1),
            reference: Some("INV-9".to_string()),
            counterparty: None,
        };
        PaymentService::post(&mut state, &ledger_config(), &request).unwrap();

        let payload =
            ExplainService::explain_entity(&state, scope, EntityRef::PaymentExecution(request.id)).unwrap();

        let kinds: Vec<_> = payload.items.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ExplainItemKind::Doc,
                ExplainItemKind::MoneyTransaction,
                ExplainItemKind::AccountingEntryLine
            ]
        );
        let entry = &payload.items[2];
        assert_eq!(entry.links.len(), 1);
        assert_eq!(entry.links[0].role, LinkRole::PaymentPrincipal);
        assert!(entry
            .primary
            .iter()
            .any(|p| p.key() == PrimaryKind::PaymentExecution.key(request.id)));
        assert_eq!(payload.items[1].links.len(), 1);
    }

    #[test]
    fn test_financial_document_includes_recognitions() {
        let (mut state, scope) = seeded_state();
        let document = FinancialDocument {
            id: FinancialDocumentId::new(),
            legal_entity_id: scope,
            number: "INS-2025".to_string(),
            counterparty: None,
            amount: Money::new(dec!(1200), code("USD")),
            issued_on: date(2025, 1, 1),
            debit_account: accounts::PREPAID_EXPENSE_ASSET.to_string(),
            credit_account: accounts::ACCOUNTS_PAYABLE_SUPPLIERS.to_string(),
        };
        FinancialDocumentService::post_accrual(&mut state, &ledger_config(), &document).unwrap();
        RecurringService::register(
            &mut state,
            RecurringJournal {
                id: RecurringJournalId::new(),
                legal_entity_id: scope,
                kind: RecognitionKind::Prepaid,
                source_document_id: Some(document.id),
                debit_account: accounts::OPERATING_EXPENSES.to_string(),
                credit_account: accounts::PREPAID_EXPENSE_ASSET.to_string(),
                amount: Money::new(dec!(100), code("USD")),
                start_date: date(2025, 1, 1),
                end_date: None,
                active: true,
                description: String::new(),
            },
        )
        .unwrap();
        RecurringService::run(&mut state, &ledger_config(), scope, date(2025, 1, 1), date(2025, 2, 28)).unwrap();

        let payload =
            ExplainService::explain_entity(&state, scope, EntityRef::FinancialDocument(document.id)).unwrap();

        let lines: Vec<_> = payload
            .items
            .iter()
            .filter(|i| i.kind == ExplainItemKind::AccountingEntryLine)
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].occurred_on, date(2025, 2, 28));
        assert_eq!(lines[2].doc_type, Some(DocType::FinancialDocumentAccrual));
        assert!(lines
            .iter()
            .all(|l| l.primary.iter().any(|p| p.kind == PrimaryKind::FinancialDocument)));
    }

    #[test]
    fn test_foreign_entity_rejected() {
        let (mut state, scope) = seeded_state();
        let other = LegalEntityId::new();
        state
            .insert_legal_entity(LegalEntity {
                id: other,
                name: "Other".to_string(),
                base_currency: code("USD"),
            })
            .unwrap();
        let event = settle(&mut state, other, dec!(100), date(2025, 3, 1));

        let err =
            ExplainService::explain_entity(&state, scope, EntityRef::AcquiringEvent(event.id)).unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_unknown_entity_not_found() {
        let (state, scope) = seeded_state();

        let err = ExplainService::explain_entity(
            &state,
            scope,
            EntityRef::MoneyTransaction(MoneyTransactionId::new()),
        )
        .unwrap_err();

        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let (state, scope) = seeded_state();

        let err = ExplainService::explain_account(
            &state,
            scope,
            accounts::CASH_BANK,
            date(2025, 2, 1),
            date(2025, 1, 1),
            &PageRequest::default(),
        )
        .unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
