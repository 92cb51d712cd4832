use rust_decimal_macros::dec;

use crate::config::AppConfig;

const VARS: [&str; 5] = [
    "TALLY__LEDGER__BASE_CURRENCY",
    "TALLY__LEDGER__BALANCE_TOLERANCE",
    "TALLY__RECONCILIATION__BANK_WINDOW_DAYS",
    "TALLY__LOGGING__FILTER",
    "RUN_MODE",
];

#[test]
fn test_load_defaults() {
    let config = temp_env::with_vars_unset(VARS, || AppConfig::load().unwrap());

    assert_eq!(config.ledger.base_currency, "USD");
    assert_eq!(config.ledger.balance_tolerance, dec!(0.01));
    assert_eq!(config.ledger.max_write_attempts, 3);
    assert_eq!(config.reconciliation.bank_window_days, 5);
    assert_eq!(config.reconciliation.marketplace_window_days, 14);
    assert_eq!(config.reconciliation.max_candidates, 3);
    assert_eq!(config.reconciliation.min_score, 50);
    assert_eq!(config.logging.filter, "info");
    assert!(!config.logging.json);
}

#[test]
fn test_load_env_overrides() {
    let config = temp_env::with_vars(
        [
            ("TALLY__LEDGER__BASE_CURRENCY", Some("EUR")),
            ("TALLY__LEDGER__BALANCE_TOLERANCE", Some("0.05")),
            ("TALLY__RECONCILIATION__BANK_WINDOW_DAYS", Some("7")),
            ("TALLY__LOGGING__FILTER", Some("tally_core=debug")),
            ("RUN_MODE", None),
        ],
        || AppConfig::load().unwrap(),
    );

    assert_eq!(config.ledger.base_currency, "EUR");
    assert_eq!(config.ledger.balance_tolerance, dec!(0.05));
    assert_eq!(config.reconciliation.bank_window_days, 7);
    assert_eq!(config.reconciliation.marketplace_window_days, 14);
    assert_eq!(config.logging.filter, "tally_core=debug");
}

#[test]
fn test_base_currency_parse() {
    let config = AppConfig::default();
    assert_eq!(config.ledger.base_currency().unwrap().as_str(), "USD");

    let mut config = AppConfig::default();
    config.ledger.base_currency = "dollars".to_string();
    assert!(config.ledger.base_currency().is_err());
}
