//! Decimal arithmetic shared by every money calculation in the ledger.
//!
//! All rounding uses Banker's Rounding (`MidpointNearestEven`) at four
//! decimal places, the precision base amounts are stored with.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

/// Decimal places of converted base amounts.
pub const BASE_AMOUNT_SCALE: u32 = 4;

/// Stateless money arithmetic.
pub struct CurrencyService;

impl CurrencyService {
    /// Converts `amount` with `rate` and rounds to four decimal places.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_decimal_macros::dec;
    /// use tally_core::currency::CurrencyService;
    ///
    /// assert_eq!(CurrencyService::convert(dec!(100), dec!(1.2)), dec!(120.0000));
    /// assert_eq!(CurrencyService::convert(dec!(0.000125), dec!(1.2)), dec!(0.0002));
    /// ```
    #[must_use]
    pub fn convert(amount: Decimal, rate: Decimal) -> Decimal {
        Self::round(amount * rate, BASE_AMOUNT_SCALE)
    }

    /// Rounds with Banker's Rounding.
    #[must_use]
    pub fn round(value: Decimal, decimal_places: u32) -> Decimal {
        value.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointNearestEven)
    }

    /// Cost of `quantity` units at `unit_cost`, exact (no rounding) so that
    /// per-batch costs sum to the posted total.
    #[must_use]
    pub fn line_cost(quantity: Decimal, unit_cost: Decimal) -> Decimal {
        quantity * unit_cost
    }

    /// True if `a` and `b` differ by at most `tolerance`.
    #[must_use]
    pub fn within_tolerance(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
        (a - b).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case(dec!(100), dec!(1.5), dec!(150.0000))]
    #[case(dec!(100), dec!(1.23456789), dec!(123.4568))]
    #[case(dec!(100.50), Decimal::ONE, dec!(100.5000))]
    #[case(dec!(1), dec!(0.00005), dec!(0.0000))]
    #[case(dec!(1), dec!(0.00015), dec!(0.0002))]
    fn test_convert(#[case] amount: Decimal, #[case] rate: Decimal, #[case] expected: Decimal) {
        assert_eq!(CurrencyService::convert(amount, rate), expected);
    }

    #[test]
    fn test_round_midpoint_to_even() {
        assert_eq!(CurrencyService::round(dec!(2.5), 0), dec!(2));
        assert_eq!(CurrencyService::round(dec!(3.5), 0), dec!(4));
        assert_eq!(CurrencyService::round(dec!(2.25), 1), dec!(2.2));
        assert_eq!(CurrencyService::round(dec!(2.35), 1), dec!(2.4));
    }

    #[test]
    fn test_line_cost_is_exact() {
        assert_eq!(
            CurrencyService::line_cost(dec!(3), dec!(33.33335)),
            dec!(100.00005)
        );
    }

    #[test]
    fn test_within_tolerance() {
        assert!(CurrencyService::within_tolerance(dec!(100.00), dec!(100.01), dec!(0.01)));
        assert!(CurrencyService::within_tolerance(dec!(100.01), dec!(100.00), dec!(0.01)));
        assert!(!CurrencyService::within_tolerance(dec!(100.00), dec!(100.02), dec!(0.01)));
    }
}
