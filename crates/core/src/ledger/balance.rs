//! Run balance and account totals in base currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::AccountingEntry;
use crate::currency::CurrencyService;

/// Debit and credit totals of a set of entries, in base currency.
///
/// A line with both sides contributes to both totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunTotals {
    /// Sum of base amounts of lines with a debit side.
    pub debit: Decimal,
    /// Sum of base amounts of lines with a credit side.
    pub credit: Decimal,
}

impl RunTotals {
    /// Adds one line.
    pub fn add(&mut self, has_debit: bool, has_credit: bool, amount_base: Decimal) {
        if has_debit {
            self.debit += amount_base;
        }
        if has_credit {
            self.credit += amount_base;
        }
    }

    /// Totals of stored entries.
    #[must_use]
    pub fn from_entries(entries: &[AccountingEntry]) -> Self {
        let mut totals = Self::default();
        for entry in entries {
            totals.add(
                entry.debit_account.is_some(),
                entry.credit_account.is_some(),
                entry.amount_base,
            );
        }
        totals
    }

    /// True if debit and credit agree within `tolerance`.
    #[must_use]
    pub fn is_balanced(&self, tolerance: Decimal) -> bool {
        CurrencyService::within_tolerance(self.debit, self.credit, tolerance)
    }
}

/// Turnover of one account over a set of entries, in base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTurnover {
    /// Account code.
    pub account: String,
    /// Base amount debited.
    pub debit_total: Decimal,
    /// Base amount credited.
    pub credit_total: Decimal,
}

impl AccountTurnover {
    /// Sums the entries touching `account`.
    #[must_use]
    pub fn of(account: &str, entries: &[AccountingEntry]) -> Self {
        let mut turnover = Self {
            account: account.to_string(),
            debit_total: Decimal::ZERO,
            credit_total: Decimal::ZERO,
        };
        for entry in entries {
            if entry.debit_account.as_deref() == Some(account) {
                turnover.debit_total += entry.amount_base;
            }
            if entry.credit_account.as_deref() == Some(account) {
                turnover.credit_total += entry.amount_base;
            }
        }
        turnover
    }

    /// Debit minus credit.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.debit_total - self.credit_total
    }
}
