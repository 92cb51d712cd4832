//! Shared setup for ledger integration tests.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::cash::{Direction, FinancialAccount, FinancialAccountKind};
use tally_core::currency::ExchangeRate;
use tally_core::documents::{SupplyReceipt, SupplyReceiptLine};
use tally_core::ledger::accounts;
use tally_core::reconciliation::{StatementLineInput, StatementProvider};
use tally_core::store::memory::MemoryStore;
use tally_core::Ledger;
use tally_shared::config::AppConfig;
use tally_shared::types::{
    CurrencyCode, FinancialAccountId, ItemId, LegalEntityId, StatementLineId, WarehouseId,
};
use uuid::Uuid;

pub fn code(s: &str) -> CurrencyCode {
    s.parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// In-memory ledger with one USD entity and EUR->USD at 1.20 from 2025-01-01.
pub fn ledger() -> (Ledger<MemoryStore>, LegalEntityId) {
    let ledger = Ledger::in_memory(AppConfig::default());
    let entity = ledger.create_legal_entity("Integration Co", None).unwrap();
    ledger
        .upsert_rate(&ExchangeRate::new(code("EUR"), code("USD"), dec!(1.20), date(2025, 1, 1)).unwrap())
        .unwrap();
    (ledger, entity.id)
}

pub fn receipt(
    scope: LegalEntityId,
    warehouse_id: WarehouseId,
    item_id: ItemId,
    unit_cost: Decimal,
    currency: &str,
    received_on: NaiveDate,
) -> SupplyReceipt {
    SupplyReceipt {
        id: Uuid::now_v7(),
        legal_entity_id: scope,
        warehouse_id,
        currency: code(currency),
        received_on,
        lines: vec![SupplyReceiptLine {
            item_id,
            quantity: dec!(1),
            unit_cost,
        }],
    }
}

pub fn account(
    ledger: &Ledger<MemoryStore>,
    scope: LegalEntityId,
    kind: FinancialAccountKind,
    currency: &str,
) -> FinancialAccount {
    let account = FinancialAccount {
        id: FinancialAccountId::new(),
        legal_entity_id: scope,
        name: format!("{kind:?} {currency}"),
        kind,
        currency: code(currency),
        ledger_account: match kind {
            FinancialAccountKind::Bank => accounts::CASH_BANK.to_string(),
            _ => accounts::CASH_EQUIVALENTS.to_string(),
        },
    };
    ledger.add_financial_account(&account).unwrap();
    account
}

pub fn row(external_id: &str, direction: Direction, amount: Decimal, occurred_on: NaiveDate) -> StatementLineInput {
    StatementLineInput {
        external_id: external_id.to_string(),
        direction,
        amount,
        occurred_on,
        reference: Some("REF-1".to_string()),
        counterparty: None,
        description: None,
    }
}

/// Imports one row and returns its line id.
pub fn import(
    ledger: &Ledger<MemoryStore>,
    scope: LegalEntityId,
    account: &FinancialAccount,
    provider: StatementProvider,
    input: StatementLineInput,
) -> StatementLineId {
    ledger
        .import_statement_lines(scope, account.id, provider, &[input])
        .unwrap()
        .imported[0]
}
