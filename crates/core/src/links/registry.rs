//! Link registry: the single writer of entry-to-event links.
//!
//! Rules enforced per `(entry, role)`:
//! - linking the same event twice returns the first link
//! - the linked amounts never exceed the entry's base amount
//! - a fan-out must cover the entry exactly
//! - one event may not be attached to two entries of the same run (fan-in)

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tally_shared::types::{AccountingEntryId, LegalEntityId, LinkId, PostingRunId};
use tracing::debug;

use super::types::{FanOutPart, Link, LinkRequest, LinkRole};
use crate::ledger::error::LedgerError;
use crate::ledger::types::AccountingEntry;
use crate::store::{AccountingEntryStore, LinkStore};

/// Stateless link registry.
pub struct LinkRegistry;

impl LinkRegistry {
    /// Attaches an event to an entry.
    ///
    /// Without an explicit amount the link covers the entry's full base amount.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the entry is not in scope
    /// - `Validation` for a non-positive amount, an over-allocation, or fan-in
    pub fn link<T>(tx: &mut T, scope: LegalEntityId, request: &LinkRequest) -> Result<Link, LedgerError>
    where
        T: LinkStore + AccountingEntryStore + ?Sized,
    {
        let entry = Self::entry(tx, scope, request.entry_id)?;
        let existing = tx.links_for_entries(&[entry.id])?;

        if let Some(found) = existing
            .iter()
            .find(|l| l.event == request.event && l.role == request.role)
        {
            debug!(link_id = %found.id, "link already present");
            return Ok(found.clone());
        }

        let amount = request.amount_base.unwrap_or(entry.amount_base);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "link amount must be positive, got {amount}"
            )));
        }

        let linked: Decimal = existing
            .iter()
            .filter(|l| l.role == request.role)
            .map(|l| l.amount_base)
            .sum();
        if linked + amount > entry.amount_base {
            return Err(LedgerError::validation(format!(
                "{:?} links on entry {} would reach {} of {}",
                request.role,
                entry.id,
                linked + amount,
                entry.amount_base
            )));
        }

        let fan_in = tx
            .links_for_event(scope, &request.event)?
            .into_iter()
            .any(|l| {
                l.role == request.role
                    && l.posting_run_id == entry.posting_run_id
                    && l.entry_id != entry.id
            });
        if fan_in {
            return Err(LedgerError::validation(format!(
                "{} is already linked as {:?} to another entry of run {}",
                request.event.key(),
                request.role,
                entry.posting_run_id
            )));
        }

        let link = Link {
            id: LinkId::new(),
            legal_entity_id: scope,
            entry_id: entry.id,
            event: request.event,
            role: request.role,
            amount_base: amount,
            posting_run_id: entry.posting_run_id,
            inventory_transaction_id: request.inventory_transaction_id,
            batch_id: request.batch_id,
            compensates_link_id: None,
            created_at: Utc::now(),
        };
        tx.insert_link(link.clone())?;

        debug!(
            link_id = %link.id,
            entry_id = %entry.id,
            event = %link.event.key(),
            amount_base = %link.amount_base,
            "link created"
        );
        Ok(link)
    }

    /// Attaches several events to one entry; their amounts must sum to the
    /// entry's base amount exactly.
    ///
    /// # Errors
    ///
    /// - `Validation` if the parts are empty or do not cover the entry exactly
    /// - any error of [`link`](Self::link)
    pub fn link_fan_out<T>(
        tx: &mut T,
        scope: LegalEntityId,
        entry_id: AccountingEntryId,
        role: LinkRole,
        parts: &[FanOutPart],
    ) -> Result<Vec<Link>, LedgerError>
    where
        T: LinkStore + AccountingEntryStore + ?Sized,
    {
        let entry = Self::entry(tx, scope, entry_id)?;
        if parts.is_empty() {
            return Err(LedgerError::validation("fan-out needs at least one part"));
        }

        let total: Decimal = parts.iter().map(|p| p.amount_base).sum();
        if total != entry.amount_base {
            return Err(LedgerError::validation(format!(
                "fan-out parts sum to {total}, entry {} is {}",
                entry.id, entry.amount_base
            )));
        }

        parts
            .iter()
            .map(|part| {
                Self::link(
                    tx,
                    scope,
                    &LinkRequest {
                        entry_id,
                        event: part.event,
                        role,
                        amount_base: Some(part.amount_base),
                        inventory_transaction_id: part.inventory_transaction_id,
                        batch_id: part.batch_id,
                    },
                )
            })
            .collect()
    }

    /// Writes one compensating link per original link, attached to the
    /// reversal entry that mirrors the original entry.
    ///
    /// # Errors
    ///
    /// Returns `Integrity` if a linked entry has no mirror in `reversal_entries`.
    pub fn compensate<T>(
        tx: &mut T,
        original_links: &[Link],
        reversal_entries: &[AccountingEntry],
        reversal_run_id: PostingRunId,
    ) -> Result<Vec<Link>, LedgerError>
    where
        T: LinkStore + ?Sized,
    {
        let mirrors: HashMap<AccountingEntryId, AccountingEntryId> = reversal_entries
            .iter()
            .filter_map(|e| e.metadata.reversal_of_entry_id.map(|orig| (orig, e.id)))
            .collect();

        let mut created = Vec::with_capacity(original_links.len());
        for original in original_links {
            let mirror = mirrors.get(&original.entry_id).ok_or_else(|| {
                LedgerError::Integrity(format!(
                    "link {} points at entry {} which has no reversal",
                    original.id, original.entry_id
                ))
            })?;

            let link = Link {
                id: LinkId::new(),
                entry_id: *mirror,
                posting_run_id: reversal_run_id,
                compensates_link_id: Some(original.id),
                created_at: Utc::now(),
                ..original.clone()
            };
            tx.insert_link(link.clone())?;
            created.push(link);
        }
        Ok(created)
    }

    /// Base amount already linked to an entry under `role`.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn linked_amount<T>(
        tx: &T,
        entry_id: AccountingEntryId,
        role: LinkRole,
    ) -> Result<Decimal, LedgerError>
    where
        T: LinkStore + ?Sized,
    {
        Ok(tx
            .links_for_entries(&[entry_id])?
            .iter()
            .filter(|l| l.role == role)
            .map(|l| l.amount_base)
            .sum())
    }

    fn entry<T>(tx: &T, scope: LegalEntityId, id: AccountingEntryId) -> Result<AccountingEntry, LedgerError>
    where
        T: AccountingEntryStore + ?Sized,
    {
        tx.find_entries(scope, &[id])?
            .pop()
            .ok_or_else(|| LedgerError::not_found("AccountingEntry", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::links::types::EventRef;
    use crate::store::memory::MemoryState;
    use rust_decimal_macros::dec;
    use tally_shared::types::{MoneyTransactionId, StockMovementId};

    fn setup(amount: Decimal) -> (MemoryState, LegalEntityId, AccountingEntry) {
        let mut state = MemoryState::default();
        let scope = LegalEntityId::new();
        let entry = fixtures::entry(scope, PostingRunId::new(), 1, amount);
        state.insert_entries(std::slice::from_ref(&entry)).unwrap();
        (state, scope, entry)
    }

    fn movement_part(amount: Decimal) -> FanOutPart {
        FanOutPart {
            event: EventRef::StockMovement(StockMovementId::new()),
            amount_base: amount,
            inventory_transaction_id: None,
            batch_id: None,
        }
    }

    #[test]
    fn test_link_is_idempotent() {
        let (mut state, scope, entry) = setup(dec!(100));
        let request = LinkRequest::full(
            entry.id,
            EventRef::MoneyTransaction(MoneyTransactionId::new()),
            LinkRole::PaymentPrincipal,
        );

        let first = LinkRegistry::link(&mut state, scope, &request).unwrap();
        let second = LinkRegistry::link(&mut state, scope, &request).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.amount_base, dec!(100));
        assert_eq!(state.links_for_entries(&[entry.id]).unwrap().len(), 1);
    }

    #[test]
    fn test_link_rejects_over_allocation() {
        let (mut state, scope, entry) = setup(dec!(100));
        let mut request = LinkRequest::full(
            entry.id,
            EventRef::MoneyTransaction(MoneyTransactionId::new()),
            LinkRole::PaymentPrincipal,
        );
        request.amount_base = Some(dec!(70));
        LinkRegistry::link(&mut state, scope, &request).unwrap();

        request.event = EventRef::MoneyTransaction(MoneyTransactionId::new());
        request.amount_base = Some(dec!(30.01));
        let err = LinkRegistry::link(&mut state, scope, &request).unwrap_err();

        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert_eq!(
            LinkRegistry::linked_amount(&state, entry.id, LinkRole::PaymentPrincipal).unwrap(),
            dec!(70)
        );
    }

    #[test]
    fn test_fan_out_requires_exact_sum() {
        let (mut state, scope, entry) = setup(dec!(220));

        let short = [movement_part(dec!(100)), movement_part(dec!(119.99))];
        assert!(LinkRegistry::link_fan_out(&mut state, scope, entry.id, LinkRole::Inventory, &short).is_err());
        assert!(state.links_for_entries(&[entry.id]).unwrap().is_empty());

        let exact = [movement_part(dec!(100)), movement_part(dec!(120))];
        let links = LinkRegistry::link_fan_out(&mut state, scope, entry.id, LinkRole::Inventory, &exact).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(
            LinkRegistry::linked_amount(&state, entry.id, LinkRole::Inventory).unwrap(),
            dec!(220)
        );
    }

    #[test]
    fn test_fan_in_within_run_rejected() {
        let (mut state, scope, entry) = setup(dec!(50));
        let sibling = fixtures::entry(scope, entry.posting_run_id, 2, dec!(50));
        state.insert_entries(std::slice::from_ref(&sibling)).unwrap();
        let event = EventRef::MoneyTransaction(MoneyTransactionId::new());

        LinkRegistry::link(&mut state, scope, &LinkRequest::full(entry.id, event, LinkRole::Transfer)).unwrap();
        let err = LinkRegistry::link(&mut state, scope, &LinkRequest::full(sibling.id, event, LinkRole::Transfer))
            .unwrap_err();

        assert!(err.to_string().contains("already linked"));
    }

    #[test]
    fn test_link_out_of_scope_entry_not_found() {
        let (mut state, _, entry) = setup(dec!(10));
        let request = LinkRequest::full(
            entry.id,
            EventRef::MoneyTransaction(MoneyTransactionId::new()),
            LinkRole::PaymentPrincipal,
        );

        let err = LinkRegistry::link(&mut state, LegalEntityId::new(), &request).unwrap_err();
        assert_eq!(err.http_status_code(), 404);
    }
}
