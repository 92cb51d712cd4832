//! Chart-of-accounts codes used by the built-in posting flows.
//!
//! Codes are plain strings so that tenants can post to accounts outside
//! this list through [`PostingEngine::post`](super::PostingEngine::post).

/// Trade payables to suppliers.
pub const ACCOUNTS_PAYABLE_SUPPLIERS: &str = "ACCOUNTS_PAYABLE_SUPPLIERS";
/// Receivables due from marketplaces.
pub const ACCOUNTS_RECEIVABLE_MARKETPLACE: &str = "ACCOUNTS_RECEIVABLE_MARKETPLACE";
/// Card acquiring commission expense.
pub const ACQUIRING_FEES_EXPENSE: &str = "ACQUIRING_FEES_EXPENSE";
/// Bank current accounts.
pub const CASH_BANK: &str = "CASH_BANK";
/// Marketplace wallets and other cash equivalents.
pub const CASH_EQUIVALENTS: &str = "CASH_EQUIVALENTS";
/// Clearing account for money in transit between own accounts.
pub const CASH_TRANSFER_CLEARING: &str = "CASH_TRANSFER_CLEARING";
/// Clearing account for acquiring settlements.
pub const CLEARING_ACQUIRING: &str = "CLEARING_ACQUIRING";
/// Cost of goods sold.
pub const COST_OF_GOODS_SOLD: &str = "COST_OF_GOODS_SOLD";
/// Finished goods inventory.
pub const INVENTORY_FINISHED_GOODS: &str = "INVENTORY_FINISHED_GOODS";
/// Raw materials inventory.
pub const INVENTORY_MATERIALS: &str = "INVENTORY_MATERIALS";
/// Marketplace commissions and fees.
pub const MARKETPLACE_FEES: &str = "MARKETPLACE_FEES";
/// General operating expenses.
pub const OPERATING_EXPENSES: &str = "OPERATING_EXPENSES";
/// Prepaid expenses awaiting recognition.
pub const PREPAID_EXPENSE_ASSET: &str = "PREPAID_EXPENSE_ASSET";
/// Sales revenue.
pub const SALES_REVENUE: &str = "SALES_REVENUE";
/// Sales returns (contra revenue).
pub const SALES_RETURNS: &str = "SALES_RETURNS";
/// Work in progress.
pub const WIP_PRODUCTION: &str = "WIP_PRODUCTION";
