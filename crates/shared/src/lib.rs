//! Shared types, errors, and configuration for Tally.
//!
//! This crate provides common types used across all other crates:
//! - Money and currency codes with decimal precision
//! - Typed IDs for type-safe entity references
//! - Pagination types for list queries
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

#[cfg(test)]
mod config_tests;
#[cfg(test)]
mod error_tests;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
