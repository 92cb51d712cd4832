//! Bank, marketplace and acquirer statement reconciliation.
//!
//! Imported lines are matched to internal cash (payment executions or money
//! transactions), posted against them, and marketplace payouts are paired
//! with the bank line that received the money. Lines can be split into
//! parts before matching, and wallet fee lines get their own posting.

pub mod fees;
pub mod matcher;
pub mod payout;
pub mod service;
pub mod types;

pub use fees::MarketplaceFeeService;
pub use matcher::{CandidateFacts, Matcher};
pub use payout::{PayoutPairing, PayoutService};
pub use service::ReconciliationService;
pub use types::{
    ImportSummary, MatchCandidate, MatchTarget, SplitPart, StatementLine, StatementLineInput,
    StatementLineStatus, StatementProvider,
};
