//! Typed posting contexts.
//!
//! Each accounting line carries exactly one context variant describing the
//! business event that produced it. The context also owns the format of the
//! line's `doc_line_id`, the durable idempotency handle that must be
//! reconstructible from `(doc_type, doc_id, purpose)`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_shared::types::{
    AcquiringEventId, CashTransferId, FinancialDocumentId, InternalTransferId,
    InventoryTransactionId, PaymentExecutionId, PostingRunId, RecurringJournalId, StatementLineId,
};
use uuid::Uuid;

use super::types::DocType;

/// Part of a sales document or sale return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalesPart {
    /// Revenue recognition (or its reversal on return).
    Revenue,
    /// Cost of goods sold.
    Cogs,
}

/// Leg of an internal cash transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferLeg {
    /// Money leaving the source account.
    Out,
    /// Money arriving at the destination account.
    In,
}

/// Part of an acquiring settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquiringPart {
    /// Settled principal.
    Principal,
    /// Acquirer commission.
    Fee,
}

/// Kind of periodic recognition performed by a recurring journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecognitionKind {
    /// Prepaid expense recognised over its service period.
    Prepaid,
    /// Amortisation of an intangible asset.
    Amortization,
    /// Depreciation of a fixed asset.
    Depreciation,
    /// Any other fixed monthly journal.
    Generic,
}

impl RecognitionKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Prepaid => "prepaid",
            Self::Amortization => "amort",
            Self::Depreciation => "depr",
            Self::Generic => "recurring",
        }
    }
}

/// Closed set of posting contexts, one per document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostingContext {
    /// Goods received from a supplier.
    SupplyReceipt {
        /// Receipt document id.
        receipt_id: Uuid,
    },
    /// Outgoing payment executed from a financial account.
    PaymentExecution {
        /// Payment execution id.
        payment_execution_id: PaymentExecutionId,
    },
    /// Sale shipped to a customer or marketplace.
    SalesDocument {
        /// Sales document id.
        sales_document_id: Uuid,
        /// Revenue or COGS line.
        part: SalesPart,
    },
    /// Goods returned by a customer.
    SaleReturn {
        /// Return document id.
        return_id: Uuid,
        /// Revenue or COGS line.
        part: SalesPart,
    },
    /// Finished goods produced.
    ProductionCompletion {
        /// Production order id.
        production_order_id: Uuid,
    },
    /// Materials issued to production.
    ProductionConsumption {
        /// Production order id.
        production_order_id: Uuid,
        /// Inventory transaction grouping the issue movements.
        inventory_transaction_id: InventoryTransactionId,
    },
    /// Supplier bill or other financial document accrued.
    FinancialDocumentAccrual {
        /// Financial document id.
        document_id: FinancialDocumentId,
    },
    /// Periodic recognition generated by a recurring journal.
    Recognition {
        /// Journal id.
        journal_id: RecurringJournalId,
        /// Document being recognised, if any.
        source_document_id: Option<FinancialDocumentId>,
        /// Recognition kind.
        kind: RecognitionKind,
        /// First day of the recognised period.
        period_start: NaiveDate,
    },
    /// Marketplace payout moved from wallet to bank.
    PayoutTransfer {
        /// Cash transfer id.
        transfer_id: CashTransferId,
        /// Out or in leg.
        leg: TransferLeg,
    },
    /// Money moved between two own accounts.
    InternalTransfer {
        /// Internal transfer id.
        transfer_id: InternalTransferId,
        /// Out or in leg.
        leg: TransferLeg,
    },
    /// Marketplace fee of a wallet statement line.
    StatementLineFee {
        /// Statement line id.
        statement_line_id: StatementLineId,
    },
    /// Card acquiring settlement.
    Acquiring {
        /// Acquiring event id.
        event_id: AcquiringEventId,
        /// Principal or fee line.
        part: AcquiringPart,
    },
    /// Mirror of a line from a reversed run.
    Reversal {
        /// Run being reversed.
        original_run_id: PostingRunId,
        /// `doc_line_id` of the mirrored line.
        original_doc_line_id: String,
    },
}

impl PostingContext {
    /// Document type this context belongs to, `None` for reversal mirrors.
    #[must_use]
    pub fn doc_type(&self) -> Option<DocType> {
        let doc_type = match self {
            Self::SupplyReceipt { .. } => DocType::SupplyReceipt,
            Self::PaymentExecution { .. } => DocType::PaymentExecution,
            Self::SalesDocument { .. } => DocType::SalesDocument,
            Self::SaleReturn { .. } => DocType::SaleReturn,
            Self::ProductionCompletion { .. } => DocType::ProductionCompletion,
            Self::ProductionConsumption { .. } => DocType::ProductionConsumption,
            Self::FinancialDocumentAccrual { .. } => DocType::FinancialDocumentAccrual,
            Self::Recognition { .. } => DocType::FinancialDocumentRecognition,
            Self::PayoutTransfer { .. } => DocType::MarketplacePayoutTransfer,
            Self::Acquiring { .. } => DocType::AcquiringEvent,
            Self::InternalTransfer { .. } => DocType::InternalTransfer,
            Self::StatementLineFee { .. } => DocType::StatementLineFee,
            Self::Reversal { .. } => return None,
        };
        Some(doc_type)
    }

    /// Stable idempotency key of the line.
    #[must_use]
    pub fn doc_line_id(&self) -> String {
        match self {
            Self::SupplyReceipt { receipt_id } => format!("supply_receipt:{receipt_id}:total"),
            Self::PaymentExecution {
                payment_execution_id,
            } => format!("payment_execution:{payment_execution_id}:principal"),
            Self::SalesDocument {
                sales_document_id,
                part,
            } => format!("sales_document:{sales_document_id}:{}", sales_suffix(*part)),
            Self::SaleReturn { return_id, part } => {
                format!("sale_return:{return_id}:{}", sales_suffix(*part))
            }
            Self::ProductionCompletion {
                production_order_id,
            } => format!("production_completion:{production_order_id}:output"),
            Self::ProductionConsumption {
                inventory_transaction_id,
                ..
            } => format!("production_consumption:{inventory_transaction_id}:materials"),
            Self::FinancialDocumentAccrual { document_id } => {
                format!("financial_document:{document_id}:accrual")
            }
            Self::Recognition {
                journal_id,
                source_document_id,
                kind,
                period_start,
            } => {
                let period = format!("{:04}-{:02}", period_start.year(), period_start.month());
                match source_document_id {
                    Some(document_id) => format!("{}:{document_id}:{period}", kind.prefix()),
                    None => format!("recurring:{journal_id}:{period}"),
                }
            }
            Self::PayoutTransfer { transfer_id, leg } => {
                format!("cash_transfer:{transfer_id}:{}", leg.suffix())
            }
            Self::InternalTransfer { transfer_id, leg } => {
                format!("internal_transfer:{transfer_id}:{}", leg.suffix())
            }
            Self::StatementLineFee { statement_line_id } => {
                format!("statement_line_fee:{statement_line_id}:fee")
            }
            Self::Acquiring { event_id, part } => {
                let part = match part {
                    AcquiringPart::Principal => "principal",
                    AcquiringPart::Fee => "fee",
                };
                format!("acquiring_event:{event_id}:{part}")
            }
            Self::Reversal {
                original_run_id,
                original_doc_line_id,
            } => format!("reversal:{original_run_id}:{original_doc_line_id}"),
        }
    }
}

impl TransferLeg {
    const fn suffix(self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::In => "in",
        }
    }
}

const fn sales_suffix(part: SalesPart) -> &'static str {
    match part {
        SalesPart::Revenue => "revenue",
        SalesPart::Cogs => "cogs",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_receipt_key() {
        let receipt_id = Uuid::nil();
        let ctx = PostingContext::SupplyReceipt { receipt_id };
        assert_eq!(
            ctx.doc_line_id(),
            "supply_receipt:00000000-0000-0000-0000-000000000000:total"
        );
        assert_eq!(ctx.doc_type(), Some(DocType::SupplyReceipt));
    }

    #[test]
    fn test_recognition_key_uses_source_document_when_present() {
        let journal_id = RecurringJournalId::new();
        let document_id = FinancialDocumentId::new();
        let period_start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        let with_doc = PostingContext::Recognition {
            journal_id,
            source_document_id: Some(document_id),
            kind: RecognitionKind::Prepaid,
            period_start,
        };
        assert_eq!(with_doc.doc_line_id(), format!("prepaid:{document_id}:2025-03"));

        let without_doc = PostingContext::Recognition {
            journal_id,
            source_document_id: None,
            kind: RecognitionKind::Generic,
            period_start,
        };
        assert_eq!(
            without_doc.doc_line_id(),
            format!("recurring:{journal_id}:2025-03")
        );
    }

    #[test]
    fn test_reversal_key_is_prefixed() {
        let run = PostingRunId::new();
        let ctx = PostingContext::Reversal {
            original_run_id: run,
            original_doc_line_id: "supply_receipt:x:total".to_string(),
        };
        assert_eq!(ctx.doc_line_id(), format!("reversal:{run}:supply_receipt:x:total"));
        assert_eq!(ctx.doc_type(), None);
    }

    #[test]
    fn test_transfer_and_fee_keys() {
        let transfer_id = InternalTransferId::new();
        let out = PostingContext::InternalTransfer {
            transfer_id,
            leg: TransferLeg::Out,
        };
        assert_eq!(out.doc_line_id(), format!("internal_transfer:{transfer_id}:out"));
        assert_eq!(out.doc_type(), Some(DocType::InternalTransfer));

        let statement_line_id = StatementLineId::new();
        let fee = PostingContext::StatementLineFee { statement_line_id };
        assert_eq!(fee.doc_line_id(), format!("statement_line_fee:{statement_line_id}:fee"));
        assert_eq!(fee.doc_type(), Some(DocType::StatementLineFee));
    }

    #[test]
    fn test_context_serializes_with_type_tag() {
        let ctx = PostingContext::PayoutTransfer {
            transfer_id: CashTransferId::new(),
            leg: TransferLeg::Out,
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["type"], "PAYOUT_TRANSFER");
        assert_eq!(json["leg"], "OUT");
    }
}
