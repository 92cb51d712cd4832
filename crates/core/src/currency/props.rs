//! Property-based tests for currency arithmetic.
//!
//! - Banker's rounding of converted amounts
//! - Rate lookup through the converter

use proptest::prelude::*;
use rust_decimal::Decimal;

use super::converter::CurrencyConverter;
use super::service::CurrencyService;
use crate::fixtures::{code, date, seeded_state};

/// Strategy to generate positive decimal amounts (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy to generate positive exchange rates (0.0001 to 10000.0000).
fn positive_rate() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|v| Decimal::new(v, 4))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// *For any* amount and rate, convert() has at most 4 decimal places.
    #[test]
    fn prop_convert_rounds_to_4_decimals(
        amount in positive_amount(),
        rate in positive_rate(),
    ) {
        let result = CurrencyService::convert(amount, rate);
        let scaled = result * Decimal::from(10000);
        prop_assert_eq!(scaled, scaled.round(), "{} has more than 4 decimal places", result);
    }

    /// *For any* amount and rate, convert() is within half a unit of the
    /// fourth decimal of the exact product.
    #[test]
    fn prop_convert_error_is_bounded(
        amount in positive_amount(),
        rate in positive_rate(),
    ) {
        let exact = amount * rate;
        let result = CurrencyService::convert(amount, rate);
        prop_assert!((result - exact).abs() <= Decimal::new(5, 5));
    }

    /// *For any* amount, converting at rate 1 preserves it.
    #[test]
    fn prop_unit_rate_preserves_amount(amount in positive_amount()) {
        prop_assert_eq!(CurrencyService::convert(amount, Decimal::ONE), amount);
    }

    /// *For any* positive amount and rate, the result is non-negative.
    #[test]
    fn prop_positive_inputs_non_negative_output(
        amount in positive_amount(),
        rate in positive_rate(),
    ) {
        prop_assert!(CurrencyService::convert(amount, rate) >= Decimal::ZERO);
    }

    /// *For any* amount, the converter applies the seeded EUR rate on or
    /// after its effective date.
    #[test]
    fn prop_converter_uses_effective_rate(
        amount in positive_amount(),
        day in 1u32..=28,
    ) {
        let (state, _) = seeded_state();
        let converter = CurrencyConverter::new(&state, code("USD"));

        let conversion = converter.to_base(amount, &code("EUR"), date(2025, 2, day)).unwrap();

        prop_assert_eq!(conversion.rate, Decimal::new(120, 2));
        prop_assert_eq!(conversion.amount_base, CurrencyService::convert(amount, conversion.rate));
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// 2.5 rounds to 2 (nearest even).
    #[test]
    fn test_bankers_rounding_2_5() {
        assert_eq!(CurrencyService::round(dec!(2.5), 0), dec!(2));
    }

    /// 3.5 rounds to 4 (nearest even).
    #[test]
    fn test_bankers_rounding_3_5() {
        assert_eq!(CurrencyService::round(dec!(3.5), 0), dec!(4));
    }

    /// 2.25 rounds to 2.2 at one decimal.
    #[test]
    fn test_bankers_rounding_2_25() {
        assert_eq!(CurrencyService::round(dec!(2.25), 1), dec!(2.2));
    }

    /// Conversion ties at the fifth decimal go to the even neighbour.
    #[test]
    fn test_convert_tie_goes_to_even() {
        assert_eq!(CurrencyService::convert(dec!(0.00125), dec!(1)), dec!(0.0012));
        assert_eq!(CurrencyService::convert(dec!(0.00135), dec!(1)), dec!(0.0014));
    }
}
