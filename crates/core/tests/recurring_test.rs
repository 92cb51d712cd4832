//! Recurring journals run through the ledger facade.

mod common;

use common::{code, date, ledger};
use rust_decimal_macros::dec;
use tally_core::ledger::accounts;
use tally_core::ledger::RecognitionKind;
use tally_core::recurring::RecurringJournal;
use tally_shared::types::{Money, RecurringJournalId};

#[test]
fn test_running_twice_posts_nothing_new() {
    let (ledger, scope) = ledger();
    ledger
        .register_recurring_journal(&RecurringJournal {
            id: RecurringJournalId::new(),
            legal_entity_id: scope,
            kind: RecognitionKind::Depreciation,
            source_document_id: None,
            debit_account: accounts::OPERATING_EXPENSES.to_string(),
            credit_account: accounts::PREPAID_EXPENSE_ASSET.to_string(),
            amount: Money::new(dec!(50), code("EUR")),
            start_date: date(2025, 1, 1),
            end_date: Some(date(2025, 12, 31)),
            active: true,
            description: "Monthly depreciation".to_string(),
        })
        .unwrap();

    let first = ledger.run_recurring(scope, date(2025, 1, 1), date(2025, 3, 31)).unwrap();
    let second = ledger.run_recurring(scope, date(2025, 1, 1), date(2025, 3, 31)).unwrap();

    assert_eq!(first.posted.len(), 3);
    assert!(second.posted.is_empty());
    assert_eq!(second.skipped.len(), 3);
    let expense = ledger
        .account_balance(scope, accounts::OPERATING_EXPENSES, date(2025, 1, 1), date(2025, 12, 31))
        .unwrap();
    assert_eq!(expense, dec!(180));
}
