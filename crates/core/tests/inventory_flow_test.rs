//! Stock flows through the ledger facade: FIFO costing, outbox events and
//! void guards.

mod common;

use common::{date, ledger, receipt};
use rust_decimal_macros::dec;
use tally_core::documents::{MaterialIssue, ProductionConsumption};
use tally_core::inventory::{STOCK_CHANGED, StockChangedEvent};
use tally_core::ledger::accounts;
use tally_shared::types::{InventoryTransactionId, ItemId, WarehouseId};
use uuid::Uuid;

fn consumption(
    scope: tally_shared::types::LegalEntityId,
    warehouse_id: WarehouseId,
    item_id: ItemId,
) -> ProductionConsumption {
    ProductionConsumption {
        production_order_id: Uuid::now_v7(),
        inventory_transaction_id: InventoryTransactionId::new(),
        legal_entity_id: scope,
        warehouse_id,
        consumed_on: date(2025, 2, 1),
        materials: vec![MaterialIssue {
            item_id,
            quantity: dec!(2),
        }],
    }
}

#[test]
fn test_receive_then_consume_posts_fifo_cost() {
    let (ledger, scope) = ledger();
    let (wh, item) = (WarehouseId::new(), ItemId::new());
    ledger.post_supply_receipt(&receipt(scope, wh, item, dec!(100), "USD", date(2025, 1, 5))).unwrap();
    ledger.post_supply_receipt(&receipt(scope, wh, item, dec!(100), "EUR", date(2025, 1, 6))).unwrap();

    let posted = ledger.consume(&consumption(scope, wh, item)).unwrap();

    assert_eq!(posted.entries.len(), 1);
    assert_eq!(posted.entries[0].amount_base, dec!(220));
    let wip = ledger
        .account_balance(scope, accounts::WIP_PRODUCTION, date(2025, 1, 1), date(2025, 12, 31))
        .unwrap();
    assert_eq!(wip, dec!(220));
}

#[test]
fn test_one_outbox_event_per_movement() {
    let (ledger, scope) = ledger();
    let (wh, item) = (WarehouseId::new(), ItemId::new());
    ledger.post_supply_receipt(&receipt(scope, wh, item, dec!(100), "USD", date(2025, 1, 5))).unwrap();
    ledger.post_supply_receipt(&receipt(scope, wh, item, dec!(100), "EUR", date(2025, 1, 6))).unwrap();
    assert_eq!(ledger.drain_outbox().unwrap().len(), 2);
    let request = consumption(scope, wh, item);

    ledger.consume(&request).unwrap();

    let events = ledger.drain_outbox().unwrap();
    assert_eq!(events.len(), 2);
    for event in &events {
        assert_eq!(event.event_type, STOCK_CHANGED);
        assert_eq!(event.aggregate_id, format!("{wh}:{item}"));
        let payload: StockChangedEvent = serde_json::from_value(event.payload.clone()).unwrap();
        assert_eq!(payload.inventory_transaction_id, request.inventory_transaction_id);
        assert_eq!(payload.qty_delta, dec!(-1));
    }
    assert!(ledger.drain_outbox().unwrap().is_empty());
}

#[test]
fn test_failed_consumption_leaves_no_trace() {
    let (ledger, scope) = ledger();
    let (wh, item) = (WarehouseId::new(), ItemId::new());
    ledger.post_supply_receipt(&receipt(scope, wh, item, dec!(100), "USD", date(2025, 1, 5))).unwrap();
    ledger.drain_outbox().unwrap();

    let err = ledger.consume(&consumption(scope, wh, item)).unwrap_err();

    assert_eq!(err.error_code(), "INSUFFICIENT_STOCK");
    assert!(ledger.drain_outbox().unwrap().is_empty());
    let wip = ledger
        .account_balance(scope, accounts::WIP_PRODUCTION, date(2025, 1, 1), date(2025, 12, 31))
        .unwrap();
    assert_eq!(wip, dec!(0));
}

#[test]
fn test_void_blocked_only_for_consumed_batches() {
    let (ledger, scope) = ledger();
    let (wh, item) = (WarehouseId::new(), ItemId::new());
    let older = receipt(scope, wh, item, dec!(100), "USD", date(2025, 1, 5));
    let newer = receipt(scope, wh, item, dec!(100), "EUR", date(2025, 1, 6));
    ledger.post_supply_receipt(&older).unwrap();
    ledger.post_supply_receipt(&newer).unwrap();
    let mut request = consumption(scope, wh, item);
    request.materials[0].quantity = dec!(1);
    let posted = ledger.consume(&request).unwrap();
    assert_eq!(posted.entries[0].amount_base, dec!(100));

    let err = ledger
        .void_supply_receipt(scope, older.id, "wrong supplier", date(2025, 2, 2))
        .unwrap_err();
    let voided = ledger
        .void_supply_receipt(scope, newer.id, "wrong supplier", date(2025, 2, 2))
        .unwrap();

    assert_eq!(err.error_code(), "CONFLICT");
    assert!(!voided.already_voided);
}
