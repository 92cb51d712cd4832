//! Application configuration management.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{CurrencyCode, InvalidCurrencyCode};

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Ledger posting configuration.
    pub ledger: LedgerConfig,
    /// Statement reconciliation configuration.
    pub reconciliation: ReconciliationConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Ledger posting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Base (reporting) currency assigned to new legal entities.
    pub base_currency: String,
    /// Maximum allowed difference between debit and credit totals of a run.
    pub balance_tolerance: Decimal,
    /// How many times a write is retried after losing a uniqueness race.
    pub max_write_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            balance_tolerance: Decimal::new(1, 2),
            max_write_attempts: 3,
        }
    }
}

impl LedgerConfig {
    /// Parses the configured base currency.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured code is not a three-letter code.
    pub fn base_currency(&self) -> Result<CurrencyCode, InvalidCurrencyCode> {
        self.base_currency.parse()
    }
}

/// Statement reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Candidate search window (days either side) for bank statements.
    pub bank_window_days: i64,
    /// Candidate search window for marketplace and acquiring statements.
    pub marketplace_window_days: i64,
    /// Number of ranked candidates kept on a suggested line.
    pub max_candidates: usize,
    /// Candidates scoring below this are discarded.
    pub min_score: u32,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            bank_window_days: 5,
            marketplace_window_days: 14,
            max_candidates: 3,
            min_score: 50,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// Sources, lowest priority first: `config/default`, `config/{RUN_MODE}`,
    /// then `TALLY__SECTION__KEY` environment variables (a `.env` file is
    /// read into the environment first).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("TALLY").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
