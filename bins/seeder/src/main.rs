//! Seeds an in-memory Tally ledger with a sample scenario.
//!
//! Receives materials in two currencies, consumes them into production, pays
//! a supplier, reconciles the bank statement and runs a recurring journal,
//! then prints the explain payload of the WIP account as JSON.
//!
//! Usage: cargo run --bin seeder

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_core::cash::{Direction, FinancialAccount, FinancialAccountKind};
use tally_core::currency::ExchangeRate;
use tally_core::documents::{
    MaterialIssue, PaymentRequest, ProductionConsumption, SupplyReceipt, SupplyReceiptLine,
};
use tally_core::ledger::{RecognitionKind, accounts};
use tally_core::reconciliation::{StatementLineInput, StatementProvider};
use tally_core::recurring::RecurringJournal;
use tally_core::store::MemoryStore;
use tally_core::Ledger;
use tally_shared::config::LoggingConfig;
use tally_shared::types::{
    CurrencyCode, FinancialAccountId, InventoryTransactionId, ItemId, LegalEntityId, Money,
    PageRequest, PaymentExecutionId, RecurringJournalId, WarehouseId,
};
use tally_shared::AppConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    let ledger = Ledger::in_memory(config);
    let entity = ledger.create_legal_entity("Demo Manufacturing", None)?;
    let scope = entity.id;
    info!(legal_entity_id = %scope, base_currency = %entity.base_currency, "legal entity created");

    let eur = currency("EUR")?;
    ledger.upsert_rate(&ExchangeRate::new(
        eur.clone(),
        entity.base_currency.clone(),
        Decimal::new(120, 2),
        day(2025, 1, 1)?,
    )?)?;

    let (warehouse, item) = (WarehouseId::new(), ItemId::new());
    for (unit_cost, code, received_on) in [
        (Decimal::from(100), entity.base_currency.clone(), day(2025, 1, 5)?),
        (Decimal::from(100), eur.clone(), day(2025, 1, 6)?),
    ] {
        let posted = ledger.post_supply_receipt(&SupplyReceipt {
            id: Uuid::now_v7(),
            legal_entity_id: scope,
            warehouse_id: warehouse,
            currency: code,
            received_on,
            lines: vec![SupplyReceiptLine {
                item_id: item,
                quantity: Decimal::ONE,
                unit_cost,
            }],
        })?;
        info!(run_id = %posted.run.id, "supply receipt posted");
    }

    let consumed = ledger.consume(&ProductionConsumption {
        production_order_id: Uuid::now_v7(),
        inventory_transaction_id: InventoryTransactionId::new(),
        legal_entity_id: scope,
        warehouse_id: warehouse,
        consumed_on: day(2025, 2, 1)?,
        materials: vec![MaterialIssue {
            item_id: item,
            quantity: Decimal::from(2),
        }],
    })?;
    info!(run_id = %consumed.run.id, cost = %consumed.entries[0].amount_base, "materials consumed");

    reconcile_payment(&ledger, scope, &entity.base_currency)?;

    ledger.register_recurring_journal(&RecurringJournal {
        id: RecurringJournalId::new(),
        legal_entity_id: scope,
        kind: RecognitionKind::Depreciation,
        source_document_id: None,
        debit_account: accounts::OPERATING_EXPENSES.to_string(),
        credit_account: accounts::PREPAID_EXPENSE_ASSET.to_string(),
        amount: Money::new(Decimal::from(50), entity.base_currency.clone()),
        start_date: day(2025, 1, 1)?,
        end_date: None,
        active: true,
        description: "Equipment depreciation".to_string(),
    })?;
    let report = ledger.run_recurring(scope, day(2025, 1, 1)?, day(2025, 3, 31)?)?;
    info!(posted = report.posted.len(), "recurring journals processed");

    let events = ledger.drain_outbox()?;
    info!(events = events.len(), "outbox drained");

    let payload = ledger.explain_account(
        scope,
        accounts::WIP_PRODUCTION,
        day(2025, 1, 1)?,
        day(2025, 12, 31)?,
        &PageRequest::default(),
    )?;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

/// Pays a supplier from the bank, imports the statement row and posts it.
fn reconcile_payment(
    ledger: &Ledger<MemoryStore>,
    scope: LegalEntityId,
    base: &CurrencyCode,
) -> anyhow::Result<()> {
    let bank = FinancialAccount {
        id: FinancialAccountId::new(),
        legal_entity_id: scope,
        name: "Operating bank".to_string(),
        kind: FinancialAccountKind::Bank,
        currency: base.clone(),
        ledger_account: accounts::CASH_BANK.to_string(),
    };
    ledger.add_financial_account(&bank)?;

    let paid_on = day(2025, 2, 10)?;
    let payment = ledger.post_payment(&PaymentRequest {
        id: PaymentExecutionId::new(),
        legal_entity_id: scope,
        from_account_id: bank.id,
        amount: Decimal::from(250),
        executed_on: paid_on,
        reference: Some("INV-1001".to_string()),
        counterparty: Some("Acme Supplies".to_string()),
    })?;

    let summary = ledger.import_statement_lines(
        scope,
        bank.id,
        StatementProvider::Bank,
        &[StatementLineInput {
            external_id: "stmt-2025-02-11-001".to_string(),
            direction: Direction::Out,
            amount: Decimal::from(250),
            occurred_on: day(2025, 2, 11)?,
            reference: Some("INV-1001".to_string()),
            counterparty: Some("Acme Supplies".to_string()),
            description: None,
        }],
    )?;
    let line_id = *summary.imported.first().context("statement row was not imported")?;

    let line = ledger.suggest(scope, line_id)?;
    let best = line.suggestions.first().context("no match candidates for the statement row")?;
    ledger.confirm_match(scope, line_id, best.target)?;
    let posted = ledger.post_statement_line(scope, line_id)?;
    info!(
        payment_execution_id = %payment.execution.id,
        statement_line_id = %posted.id,
        "payment reconciled"
    );

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn currency(code: &str) -> anyhow::Result<CurrencyCode> {
    code.parse().with_context(|| format!("invalid currency code {code}"))
}

fn day(year: i32, month: u32, day: u32) -> anyhow::Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).with_context(|| format!("invalid date {year}-{month}-{day}"))
}
