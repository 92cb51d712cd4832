use super::*;
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

#[test]
fn test_typed_id_creation() {
    let id = PostingRunId::new();
    assert!(!id.to_string().is_empty());
}

#[test]
fn test_typed_id_from_uuid() {
    let uuid = Uuid::new_v4();
    let id = StockBatchId::from_uuid(uuid);
    assert_eq!(id.into_inner(), uuid);
}

#[test]
fn test_typed_id_display() {
    let uuid = Uuid::new_v4();
    let id = LegalEntityId::from_uuid(uuid);
    assert_eq!(format!("{}", id), uuid.to_string());
}

#[test]
fn test_typed_id_from_str() {
    let uuid = Uuid::new_v4();
    let id = StatementLineId::from_str(&uuid.to_string()).unwrap();
    assert_eq!(id.into_inner(), uuid);
}

#[test]
fn test_typed_id_from_str_error() {
    assert!(MoneyTransactionId::from_str("invalid").is_err());
}

#[test]
fn test_typed_ids_are_time_ordered() {
    let first = AccountingEntryId::new();
    let second = AccountingEntryId::new();
    assert!(first.into_inner() < second.into_inner());
}

#[test]
fn test_typed_ids_are_unique() {
    let ids: HashSet<InventoryTransactionId> =
        (0..1000).map(|_| InventoryTransactionId::new()).collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn test_typed_id_serde_transparent() {
    let uuid = Uuid::new_v4();
    let id = ItemId::from_uuid(uuid);
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{uuid}\""));
}
