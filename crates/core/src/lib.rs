//! Core accounting logic for Tally.
//!
//! This crate holds the posting engine and everything that feeds it. Storage
//! is abstracted behind the traits in [`store`]; an in-memory implementation
//! ships for tests and demos.
//!
//! # Modules
//!
//! - `ledger` - Posting runs, idempotent posting, voids and reposts
//! - `currency` - Exchange rates and base-currency conversion
//! - `inventory` - FIFO stock batches, movements and outbox events
//! - `cash` - Financial accounts, money transactions and payments
//! - `links` - Entry to event link registry
//! - `documents` - Document flows that turn business events into postings
//! - `reconciliation` - Statement import, matching and payout pairing
//! - `recurring` - Monthly recognition journals
//! - `explain` - Read-only drill-down from accounts and documents
//! - `facade` - The [`Ledger`] entry point

pub mod cash;
pub mod currency;
pub mod documents;
pub mod explain;
pub mod facade;
pub mod inventory;
pub mod ledger;
pub mod links;
pub mod reconciliation;
pub mod recurring;
pub mod store;

#[cfg(test)]
mod fixtures;

pub use facade::Ledger;
pub use ledger::LedgerError;
