//! Financial accounts and money transactions.

pub mod service;
pub mod types;

pub use service::CashService;
pub use types::{
    CashTransfer, CashTransferStatus, Direction, FinancialAccount, FinancialAccountKind, MoneySource, MoneyTransaction,
    MoneyTransactionStatus, NewMoneyTransaction, PaymentExecution, PaymentStatus,
};
