//! Shared builders for unit tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_shared::config::LedgerConfig;
use tally_shared::types::{AccountingEntryId, CurrencyCode, LegalEntityId, PostingRunId};
use uuid::Uuid;

use crate::currency::ExchangeRate;
use crate::ledger::accounts;
use crate::ledger::context::PostingContext;
use crate::ledger::types::{
    AccountingEntry, DocType, EntryMetadata, LegalEntity, PostingLine, PostingRequest,
};
use crate::store::memory::MemoryState;
use crate::store::{CurrencyRateStore, LegalEntityStore};

pub fn code(s: &str) -> CurrencyCode {
    s.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ledger_config() -> LedgerConfig {
    LedgerConfig::default()
}

/// A USD legal entity with EUR->USD at 1.20 from 2025-01-01.
pub fn seeded_state() -> (MemoryState, LegalEntityId) {
    let mut state = MemoryState::default();
    let scope = LegalEntityId::new();
    state
        .insert_legal_entity(LegalEntity {
            id: scope,
            name: "Test Entity".to_string(),
            base_currency: code("USD"),
        })
        .unwrap();
    state
        .upsert_rate(ExchangeRate::new(code("EUR"), code("USD"), dec!(1.20), date(2025, 1, 1)).unwrap())
        .unwrap();
    (state, scope)
}

/// Supply receipt request: Dr materials / Cr payables.
pub fn supply_request(scope: LegalEntityId, doc_id: Uuid, amount: Decimal, currency: &str) -> PostingRequest {
    let line = PostingLine::new(
        PostingContext::SupplyReceipt { receipt_id: doc_id },
        amount,
        code(currency),
        date(2025, 1, 10),
    )
    .debit(accounts::INVENTORY_MATERIALS)
    .credit(accounts::ACCOUNTS_PAYABLE_SUPPLIERS);
    PostingRequest::new(scope, DocType::SupplyReceipt, doc_id, vec![line])
}

/// A stored USD entry Dr materials / Cr payables.
pub fn entry(scope: LegalEntityId, run_id: PostingRunId, line_number: u32, amount: Decimal) -> AccountingEntry {
    let doc_id = Uuid::now_v7();
    let context = PostingContext::SupplyReceipt { receipt_id: doc_id };
    AccountingEntry {
        id: AccountingEntryId::new(),
        legal_entity_id: scope,
        doc_type: DocType::SupplyReceipt,
        doc_id,
        line_number,
        posting_date: date(2025, 1, 10),
        debit_account: Some(accounts::INVENTORY_MATERIALS.to_string()),
        credit_account: Some(accounts::ACCOUNTS_PAYABLE_SUPPLIERS.to_string()),
        amount,
        currency: code("USD"),
        exchange_rate: Decimal::ONE,
        amount_base: amount,
        metadata: EntryMetadata {
            doc_line_id: context.doc_line_id(),
            context,
            reversal_of_entry_id: None,
            reversal_of_run_id: None,
        },
        posting_run_id: run_id,
        description: None,
    }
}
