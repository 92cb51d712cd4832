//! FIFO inventory costing.
//!
//! - Cost layers (batches) fixed in base currency at receipt
//! - FIFO consumption across batches
//! - Stock movements and their `INVENTORY.STOCK_CHANGED` events

pub mod events;
pub mod fifo;
pub mod service;
pub mod types;

#[cfg(test)]
mod fifo_props;

pub use events::{OutboxEvent, STOCK_CHANGED, StockChangedEvent};
pub use fifo::{Allocation, FifoEngine, FifoPlanner};
pub use service::{InventoryService, IssueRequest, ReceiveRequest, Receipt, StockIssue};
pub use types::{BatchSource, CostSlice, MovementType, StockBatch, StockMovement};
