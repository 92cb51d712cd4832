//! Ledger error types.
//!
//! Every failure surfaced by the posting engine, the FIFO engine, the link
//! registry and the reconciliation workflow maps onto one of four categories
//! (validation, conflict, insufficient stock, integrity) plus not-found and
//! storage failures. Any error aborts the surrounding store transaction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tally_shared::AppError;
use tally_shared::types::{ItemId, PostingRunId, WarehouseId};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Malformed input, rejected before any write.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Run does not balance in base currency.
    #[error("Posting run is not balanced. Debit: {debit}, Credit: {credit}")]
    Unbalanced {
        /// Total debit amount in base currency.
        debit: Decimal,
        /// Total credit amount in base currency.
        credit: Decimal,
    },

    /// No exchange rate found for the currency pair on or before the given date.
    #[error("No exchange rate found for {from} to {to} on {date}")]
    NoExchangeRate {
        /// Source currency code.
        from: String,
        /// Target currency code.
        to: String,
        /// Date for which the rate was requested.
        date: NaiveDate,
    },

    // ========== Stock Errors ==========
    /// FIFO consumption cannot be satisfied from open batches.
    #[error("Insufficient stock for item {item_id} in warehouse {warehouse_id}: available {available}, requested {requested}")]
    InsufficientStock {
        /// The item being consumed.
        item_id: ItemId,
        /// The warehouse being consumed from.
        warehouse_id: WarehouseId,
        /// Quantity on hand across open batches.
        available: Decimal,
        /// Quantity requested.
        requested: Decimal,
    },

    // ========== State Errors ==========
    /// Operation conflicts with current state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Posting run was already reversed and superseded.
    #[error("Posting run {0} has already been reversed")]
    AlreadyReversed(PostingRunId),

    /// Entity not found in the caller's scope.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// Entity id.
        id: Uuid,
    },

    // ========== Integrity Errors ==========
    /// Stored ledger data disagrees with recomputed data.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    // ========== Storage Errors ==========
    /// A uniqueness constraint was violated by a concurrent writer.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unbalanced { .. } => "UNBALANCED_RUN",
            Self::NoExchangeRate { .. } => "NO_EXCHANGE_RATE",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::Conflict(_) => "CONFLICT",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Integrity(_) => "INTEGRITY_ERROR",
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - validation errors
            Self::Validation(_) | Self::Unbalanced { .. } | Self::NoExchangeRate { .. } => 400,

            // 404 Not Found
            Self::NotFound { .. } => 404,

            // 409 Conflict
            Self::Conflict(_) | Self::AlreadyReversed(_) | Self::DuplicateKey(_) => 409,

            // 422 Unprocessable - caller may retry with negative stock allowed
            Self::InsufficientStock { .. } => 422,

            // 500 Internal Server Error
            Self::Integrity(_) | Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only a lost uniqueness race qualifies: the retry observes the winner's
    /// row and returns it.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::Validation(_)
            | LedgerError::Unbalanced { .. }
            | LedgerError::NoExchangeRate { .. } => Self::Validation(message),
            LedgerError::InsufficientStock { .. } => Self::BusinessRule(message),
            LedgerError::Conflict(_)
            | LedgerError::AlreadyReversed(_)
            | LedgerError::DuplicateKey(_) => Self::Conflict(message),
            LedgerError::NotFound { .. } => Self::NotFound(message),
            LedgerError::Integrity(_) => Self::Integrity(message),
            LedgerError::Database(_) => Self::Database(message),
            LedgerError::Internal(_) => Self::Internal(message),
        }
    }
}
