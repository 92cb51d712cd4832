//! Property-based tests for the posting engine.
//!
//! - Every created run balances in base currency
//! - A void nets every touched account back to zero
//! - Replaying a posting never creates a second run

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::LegalEntityId;
use uuid::Uuid;

use super::accounts;
use super::balance::{AccountTurnover, RunTotals};
use super::context::{PostingContext, SalesPart};
use super::engine::PostingEngine;
use super::types::{DocType, PostingLine, PostingRequest};
use crate::currency::CurrencyService;
use crate::fixtures::{code, date, ledger_config, seeded_state};
use crate::store::PostingRunStore;

/// Strategy to generate positive amounts (0.01 to 100,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate a currency with a seeded rate.
fn currency() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("USD"), Just("EUR")]
}

fn sale(
    scope: LegalEntityId,
    doc_id: Uuid,
    revenue: (Decimal, &str),
    cogs: (Decimal, &str),
) -> PostingRequest {
    let line = |part, (amount, currency): (Decimal, &str), debit, credit| {
        PostingLine::new(
            PostingContext::SalesDocument {
                sales_document_id: doc_id,
                part,
            },
            amount,
            code(currency),
            date(2025, 3, 1),
        )
        .debit(debit)
        .credit(credit)
    };
    PostingRequest::new(
        scope,
        DocType::SalesDocument,
        doc_id,
        vec![
            line(
                SalesPart::Revenue,
                revenue,
                accounts::ACCOUNTS_RECEIVABLE_MARKETPLACE,
                accounts::SALES_REVENUE,
            ),
            line(
                SalesPart::Cogs,
                cogs,
                accounts::COST_OF_GOODS_SOLD,
                accounts::INVENTORY_FINISHED_GOODS,
            ),
        ],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* two-sided lines, the created run's base debits equal its base
    /// credits and each base amount is the rounded conversion of the line.
    #[test]
    fn prop_posted_run_balances(
        revenue in positive_amount(),
        revenue_currency in currency(),
        cogs in positive_amount(),
        cogs_currency in currency(),
    ) {
        let (mut state, scope) = seeded_state();
        let request = sale(scope, Uuid::now_v7(), (revenue, revenue_currency), (cogs, cogs_currency));

        let outcome = PostingEngine::post(&mut state, &ledger_config(), &request).unwrap();

        let totals = RunTotals::from_entries(&outcome.entries);
        prop_assert_eq!(totals.debit, totals.credit);
        for entry in &outcome.entries {
            prop_assert_eq!(entry.amount_base, CurrencyService::convert(entry.amount, entry.exchange_rate));
        }
    }

    /// *For any* posted run, original plus reversal leaves every account at zero.
    #[test]
    fn prop_void_nets_accounts_to_zero(
        revenue in positive_amount(),
        revenue_currency in currency(),
        cogs in positive_amount(),
    ) {
        let (mut state, scope) = seeded_state();
        let doc_id = Uuid::now_v7();
        let request = sale(scope, doc_id, (revenue, revenue_currency), (cogs, "USD"));
        let posted = PostingEngine::post(&mut state, &ledger_config(), &request).unwrap();

        let voided = PostingEngine::void(&mut state, scope, DocType::SalesDocument, doc_id, "prop").unwrap();

        let mut all = posted.entries.clone();
        all.extend(voided.reversal_entries);
        for account in [
            accounts::ACCOUNTS_RECEIVABLE_MARKETPLACE,
            accounts::SALES_REVENUE,
            accounts::COST_OF_GOODS_SOLD,
            accounts::INVENTORY_FINISHED_GOODS,
        ] {
            prop_assert_eq!(AccountTurnover::of(account, &all).net(), Decimal::ZERO);
        }
    }

    /// *For any* number of replays, exactly one run exists for the document.
    #[test]
    fn prop_replay_creates_one_run(
        amount in positive_amount(),
        replays in 1usize..6,
    ) {
        let (mut state, scope) = seeded_state();
        let doc_id = Uuid::now_v7();
        let request = sale(scope, doc_id, (amount, "USD"), (amount, "EUR"));
        let config = ledger_config();

        let first = PostingEngine::post(&mut state, &config, &request).unwrap();
        for _ in 0..replays {
            let again = PostingEngine::post(&mut state, &config, &request).unwrap();
            prop_assert_eq!(again.run.id, first.run.id);
        }

        let runs = state.runs_for_document(scope, DocType::SalesDocument, doc_id).unwrap();
        prop_assert_eq!(runs.len(), 1);
    }
}
