//! Links between accounting entries and the cash, inventory and acquiring
//! events that justify them.

pub mod registry;
pub mod types;

pub use registry::LinkRegistry;
pub use types::{EventRef, FanOutPart, Link, LinkKind, LinkRequest, LinkRole};
