//! Base-currency conversion against stored rates.
//!
//! The effective rate for a date is the most recent rate dated on or before
//! it. The base currency always converts at exactly 1 and its amounts are
//! returned unchanged, so base-currency costs sum without rounding drift.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::types::CurrencyCode;

use super::service::CurrencyService;
use crate::ledger::error::LedgerError;
use crate::store::CurrencyRateStore;

/// Rate and converted amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conversion {
    /// Rate applied (1 for base currency).
    pub rate: Decimal,
    /// Amount in base currency.
    pub amount_base: Decimal,
}

/// Converts amounts into a legal entity's base currency.
pub struct CurrencyConverter<'a, R: ?Sized> {
    rates: &'a R,
    base_currency: CurrencyCode,
}

impl<'a, R> CurrencyConverter<'a, R>
where
    R: CurrencyRateStore + ?Sized,
{
    /// Creates a converter for `base_currency`.
    pub fn new(rates: &'a R, base_currency: CurrencyCode) -> Self {
        Self {
            rates,
            base_currency,
        }
    }

    /// The base currency.
    #[must_use]
    pub fn base_currency(&self) -> &CurrencyCode {
        &self.base_currency
    }

    /// Rate from `currency` to base currency effective on `date`.
    ///
    /// Falls back to the inverse of a stored `base -> currency` rate when no
    /// direct rate exists.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoExchangeRate` if neither direction has a rate
    /// on or before `date`.
    pub fn rate(&self, currency: &CurrencyCode, date: NaiveDate) -> Result<Decimal, LedgerError> {
        if *currency == self.base_currency {
            return Ok(Decimal::ONE);
        }

        if let Some(direct) = self.rates.latest_rate(currency, &self.base_currency, date)? {
            return Ok(direct.rate);
        }

        if let Some(inverse) = self
            .rates
            .latest_rate(&self.base_currency, currency, date)?
            .and_then(|rate| rate.inverse())
        {
            return Ok(inverse.rate);
        }

        Err(LedgerError::NoExchangeRate {
            from: currency.to_string(),
            to: self.base_currency.to_string(),
            date,
        })
    }

    /// Converts `amount` of `currency` into base currency on `date`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NoExchangeRate` if no rate applies.
    pub fn to_base(
        &self,
        amount: Decimal,
        currency: &CurrencyCode,
        date: NaiveDate,
    ) -> Result<Conversion, LedgerError> {
        if *currency == self.base_currency {
            return Ok(Conversion {
                rate: Decimal::ONE,
                amount_base: amount,
            });
        }

        let rate = self.rate(currency, date)?;
        Ok(Conversion {
            rate,
            amount_base: CurrencyService::convert(amount, rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::ExchangeRate;
    use crate::store::StoreResult;
    use rust_decimal_macros::dec;

    struct Rates(Vec<ExchangeRate>);

    impl CurrencyRateStore for Rates {
        fn latest_rate(
            &self,
            from: &CurrencyCode,
            to: &CurrencyCode,
            on_or_before: NaiveDate,
        ) -> StoreResult<Option<ExchangeRate>> {
            Ok(self
                .0
                .iter()
                .filter(|r| {
                    &r.from_currency == from && &r.to_currency == to && r.effective_date <= on_or_before
                })
                .max_by_key(|r| r.effective_date)
                .cloned())
        }

        fn upsert_rate(&mut self, rate: ExchangeRate) -> StoreResult<()> {
            self.0.push(rate);
            Ok(())
        }
    }

    fn code(s: &str) -> CurrencyCode {
        s.parse().unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn rates() -> Rates {
        Rates(vec![
            ExchangeRate::new(code("EUR"), code("USD"), dec!(1.10), date(1)).unwrap(),
            ExchangeRate::new(code("EUR"), code("USD"), dec!(1.20), date(10)).unwrap(),
            ExchangeRate::new(code("USD"), code("JPY"), dec!(160), date(1)).unwrap(),
        ])
    }

    #[test]
    fn test_base_currency_is_one_and_unrounded() {
        let rates = rates();
        let converter = CurrencyConverter::new(&rates, code("USD"));
        let conversion = converter.to_base(dec!(10.123456), &code("USD"), date(5)).unwrap();
        assert_eq!(conversion.rate, Decimal::ONE);
        assert_eq!(conversion.amount_base, dec!(10.123456));
    }

    #[test]
    fn test_uses_latest_rate_on_or_before_date() {
        let rates = rates();
        let converter = CurrencyConverter::new(&rates, code("USD"));
        assert_eq!(converter.rate(&code("EUR"), date(9)).unwrap(), dec!(1.10));
        assert_eq!(converter.rate(&code("EUR"), date(10)).unwrap(), dec!(1.20));
        assert_eq!(converter.rate(&code("EUR"), date(31)).unwrap(), dec!(1.20));
    }

    #[test]
    fn test_rate_before_first_quote_is_missing() {
        let rates = Rates(vec![
            ExchangeRate::new(code("EUR"), code("USD"), dec!(1.2), date(10)).unwrap(),
        ]);
        let converter = CurrencyConverter::new(&rates, code("USD"));
        let err = converter.rate(&code("EUR"), date(9)).unwrap_err();
        assert!(matches!(err, LedgerError::NoExchangeRate { .. }));
    }

    #[test]
    fn test_inverse_fallback() {
        let rates = rates();
        let converter = CurrencyConverter::new(&rates, code("USD"));
        let conversion = converter.to_base(dec!(16000), &code("JPY"), date(2)).unwrap();
        assert_eq!(conversion.amount_base, dec!(100.0000));
    }

    #[test]
    fn test_converts_with_bankers_rounding() {
        let rates = rates();
        let converter = CurrencyConverter::new(&rates, code("USD"));
        // 0.000125 * 1.20 = 0.00015, a midpoint at 4 dp
        let conversion = converter.to_base(dec!(0.000125), &code("EUR"), date(10)).unwrap();
        assert_eq!(conversion.amount_base, dec!(0.0002));
        assert_eq!(conversion.rate, dec!(1.20));
    }
}
