//! Explain graph: traces ledger lines back to the cash, stock and documents
//! behind them. Read-only.

pub mod service;
pub mod types;

pub use service::ExplainService;
pub use types::{
    EntityRef, ExplainContext, ExplainItem, ExplainItemKind, ExplainLink, ExplainPayload,
    PrimaryKind, PrimaryRef,
};
