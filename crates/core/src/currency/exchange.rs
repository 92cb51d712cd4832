//! Exchange rate records.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::CurrencyCode;

use crate::ledger::error::LedgerError;

/// Exchange rate between two currencies, effective from `effective_date`
/// until superseded by a later rate for the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// Source currency code.
    pub from_currency: CurrencyCode,
    /// Target currency code.
    pub to_currency: CurrencyCode,
    /// Exchange rate (1 from_currency = rate to_currency).
    pub rate: Decimal,
    /// Date this rate is effective.
    pub effective_date: NaiveDate,
}

impl ExchangeRate {
    /// Creates a validated exchange rate.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive rate or identical currencies.
    pub fn new(
        from_currency: CurrencyCode,
        to_currency: CurrencyCode,
        rate: Decimal,
        effective_date: NaiveDate,
    ) -> Result<Self, LedgerError> {
        let rate = Self {
            from_currency,
            to_currency,
            rate,
            effective_date,
        };
        rate.validate()?;
        Ok(rate)
    }

    /// Checks a rate built outside [`ExchangeRate::new`], e.g. deserialized.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive rate or identical currencies.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.rate <= Decimal::ZERO {
            return Err(LedgerError::validation("exchange rate must be positive"));
        }
        if self.from_currency == self.to_currency {
            return Err(LedgerError::validation(
                "source and target currencies must be different",
            ));
        }
        Ok(())
    }

    /// Returns the inverse rate, `None` for a zero rate.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        Some(Self {
            from_currency: self.to_currency.clone(),
            to_currency: self.from_currency.clone(),
            rate: Decimal::ONE.checked_div(self.rate)?,
            effective_date: self.effective_date,
        })
    }
}
