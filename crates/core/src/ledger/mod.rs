//! Double-entry posting.
//!
//! This module implements the core ledger functionality:
//! - Posting runs and immutable accounting entries
//! - Typed posting contexts and their stable line keys
//! - Balance checks in base currency
//! - Voids as mirrored reversal runs, guarded by live dependents
//! - Error types for ledger operations

pub mod accounts;
pub mod balance;
pub mod context;
pub mod engine;
pub mod error;
pub mod guards;
pub mod reversal;
pub mod types;

#[cfg(test)]
mod engine_props;

pub use balance::{AccountTurnover, RunTotals};
pub use context::{AcquiringPart, PostingContext, RecognitionKind, SalesPart, TransferLeg};
pub use engine::PostingEngine;
pub use error::LedgerError;
pub use guards::VoidGuards;
pub use reversal::ReversalService;
pub use types::{
    AccountingEntry, DocType, EntryMetadata, LegalEntity, PostingLine, PostingOutcome,
    PostingRequest, PostingRun, PostingRunKind, RepostOutcome, VoidOutcome,
};
