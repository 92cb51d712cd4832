//! Multi-currency handling and exchange rates.

pub mod converter;
pub mod exchange;
pub mod service;

#[cfg(test)]
mod props;

pub use converter::{Conversion, CurrencyConverter};
pub use exchange::ExchangeRate;
pub use service::CurrencyService;
