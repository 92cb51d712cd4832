//! Cash domain types: financial accounts, money transactions, payments, transfers.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    CashTransferId, CurrencyCode, FinancialAccountId, InternalTransferId, LegalEntityId, Money,
    MoneyTransactionId, PaymentExecutionId, StatementLineId,
};

/// Kind of financial account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinancialAccountKind {
    /// Bank current account.
    Bank,
    /// Marketplace seller wallet.
    MarketplaceWallet,
    /// Card acquiring settlement account.
    Acquiring,
    /// Petty cash.
    Cash,
}

/// A bank, wallet, or cash account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialAccount {
    /// Account id.
    pub id: FinancialAccountId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Display name.
    pub name: String,
    /// Kind.
    pub kind: FinancialAccountKind,
    /// Account currency.
    pub currency: CurrencyCode,
    /// Ledger account code the balance is carried on.
    pub ledger_account: String,
}

/// Cash movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Money in.
    In,
    /// Money out.
    Out,
}

/// Money transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoneyTransactionStatus {
    /// Counts towards balances.
    Active,
    /// Cancelled by a void; kept for audit.
    Voided,
}

/// Back-reference to what created a money transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "sourceType", content = "sourceId", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MoneySource {
    /// Executed payment.
    PaymentExecution(PaymentExecutionId),
    /// Statement line recorded without a prior internal transaction.
    StatementLine(StatementLineId),
    /// One leg of a transfer between own accounts.
    InternalTransfer(InternalTransferId),
    /// Entered manually.
    Manual,
}

/// One cash movement on a financial account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyTransaction {
    /// Transaction id.
    pub id: MoneyTransactionId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Account moved.
    pub account_id: FinancialAccountId,
    /// Direction.
    pub direction: Direction,
    /// Amount in account currency.
    pub amount: Money,
    /// Amount in the legal entity's base currency.
    pub amount_base: Decimal,
    /// Business date.
    pub occurred_on: NaiveDate,
    /// Status.
    pub status: MoneyTransactionStatus,
    /// What created it.
    pub source: MoneySource,
    /// Counterparty reference, e.g. bank reference or order number.
    pub reference: Option<String>,
    /// Counterparty name.
    pub counterparty: Option<String>,
    /// Unique key making creation idempotent.
    pub idempotency_key: String,
    /// When it was voided.
    pub voided_at: Option<DateTime<Utc>>,
}

impl MoneyTransaction {
    /// True unless voided.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == MoneyTransactionStatus::Active
    }
}

/// Payment execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Money left the account.
    Executed,
    /// Voided.
    Canceled,
}

/// An executed outgoing payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentExecution {
    /// Execution id.
    pub id: PaymentExecutionId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Account paid from.
    pub from_account_id: FinancialAccountId,
    /// Amount paid.
    pub amount: Money,
    /// Execution date.
    pub executed_on: NaiveDate,
    /// Bank reference.
    pub reference: Option<String>,
    /// Payee.
    pub counterparty: Option<String>,
    /// Status.
    pub status: PaymentStatus,
    /// Money transaction created on execution.
    pub money_transaction_id: MoneyTransactionId,
}

/// Cash transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashTransferStatus {
    /// Paired and posted.
    Posted,
    /// Voided; the lines may be paired again.
    Canceled,
}

/// A marketplace payout moved from a wallet to a bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashTransfer {
    /// Transfer id.
    pub id: CashTransferId,
    /// Owning legal entity.
    pub legal_entity_id: LegalEntityId,
    /// Wallet statement line (OUT).
    pub from_line_id: StatementLineId,
    /// Bank statement line (IN).
    pub to_line_id: StatementLineId,
    /// Wallet money transaction.
    pub from_money_transaction_id: MoneyTransactionId,
    /// Bank money transaction.
    pub to_money_transaction_id: MoneyTransactionId,
    /// Amount moved.
    pub amount: Money,
    /// Shared external reference of both lines.
    pub external_reference: String,
    /// Posting date of both legs, the later of the two line dates.
    pub transferred_on: NaiveDate,
    /// Status.
    pub status: CashTransferStatus,
}

/// Input for recording a money transaction.
#[derive(Debug, Clone)]
pub struct NewMoneyTransaction {
    /// Scope.
    pub legal_entity_id: LegalEntityId,
    /// Account moved.
    pub account_id: FinancialAccountId,
    /// Direction.
    pub direction: Direction,
    /// Amount.
    pub amount: Decimal,
    /// Business date.
    pub occurred_on: NaiveDate,
    /// What created it.
    pub source: MoneySource,
    /// Counterparty reference.
    pub reference: Option<String>,
    /// Counterparty name.
    pub counterparty: Option<String>,
    /// Unique key.
    pub idempotency_key: String,
}
