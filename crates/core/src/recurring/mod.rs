//! Recurring journals: fixed monthly recognitions (prepaid expenses,
//! amortisation, depreciation) posted once per journal and period.

pub mod service;
pub mod types;

pub use service::RecurringService;
pub use types::{JournalRun, RecurringJournal, RecurringRunReport};
