//! Per-image identifiers for accounts and commodities
//!
//! Identifiers are 1-based and dense. [`IdentifierMap`] hands them out while
//! an image is written; [`ResolutionTable`] maps them back while it is read.
//! Neither outlives the save or load pass that built it, and nothing is
//! written back onto the shared objects being saved.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ledger_math::CommodityRef;

use super::error::{CodecError, CodecResult, EntityKind};
use crate::account::{Account, AccountRef};

/// Identifier written where a reference is absent (no parent, no commodity)
pub const NO_IDENT: u32 = u32::MAX;

/// Save-side identifier assignment
#[derive(Debug, Default)]
pub(crate) struct IdentifierMap {
    accounts: HashMap<*const RefCell<Account>, u32>,
    commodities: HashMap<String, u32>,
}

impl IdentifierMap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Assign the next account identifier, or return the one already given
    pub(crate) fn assign_account(&mut self, account: &AccountRef) -> u32 {
        let next = self.accounts.len() as u32 + 1;
        *self.accounts.entry(Rc::as_ptr(account)).or_insert(next)
    }

    pub(crate) fn account(&self, account: &AccountRef) -> CodecResult<u32> {
        self.accounts
            .get(&Rc::as_ptr(account))
            .copied()
            .ok_or_else(|| CodecError::UnknownAccount(account.borrow().fullname()))
    }

    /// Assign the next commodity identifier, or return the one already given
    pub(crate) fn assign_commodity(&mut self, symbol: &str) -> u32 {
        let next = self.commodities.len() as u32 + 1;
        *self.commodities.entry(symbol.to_string()).or_insert(next)
    }

    pub(crate) fn commodity(&self, commodity: &CommodityRef) -> CodecResult<u32> {
        self.commodities
            .get(commodity.symbol())
            .copied()
            .ok_or_else(|| CodecError::UnknownCommodity(commodity.symbol().to_string()))
    }
}

/// Load-side lookup from identifier to object
#[derive(Debug)]
pub(crate) struct ResolutionTable<T> {
    entity: EntityKind,
    items: Vec<T>,
}

impl<T: Clone> ResolutionTable<T> {
    pub(crate) fn new(entity: EntityKind) -> Self {
        Self { entity, items: Vec::new() }
    }

    /// Identifier the next pushed object must carry
    pub(crate) fn next_ident(&self) -> u32 {
        self.items.len() as u32 + 1
    }

    pub(crate) fn push(&mut self, item: T) -> u32 {
        self.items.push(item);
        self.items.len() as u32
    }

    /// Look up `ident`, read at `offset`
    pub(crate) fn resolve(&self, ident: u32, offset: u64) -> CodecResult<T> {
        ident
            .checked_sub(1)
            .and_then(|index| self.items.get(index as usize))
            .cloned()
            .ok_or_else(|| {
                CodecError::corrupt(
                    self.entity,
                    offset,
                    format!("identifier {ident} outside 1..={}", self.items.len()),
                )
            })
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use ledger_math::Commodity;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_accounts_keyed_by_identity() {
        let a = Account::new_root("").into_ref();
        let b = Account::new_root("").into_ref();
        let mut map = IdentifierMap::new();

        assert_eq!(map.assign_account(&a), 1);
        assert_eq!(map.assign_account(&b), 2);
        assert_eq!(map.assign_account(&a), 1);
        assert_eq!(map.account(&b).unwrap(), 2);

        let stray = Account::new_root("Stray").into_ref();
        assert!(matches!(map.account(&stray), Err(CodecError::UnknownAccount(_))));
    }

    #[test]
    fn test_commodities_keyed_by_symbol() {
        let mut map = IdentifierMap::new();
        assert_eq!(map.assign_commodity("EUR"), 1);
        assert_eq!(map.assign_commodity("USD"), 2);

        let usd = Arc::new(Commodity::new("USD"));
        assert_eq!(map.commodity(&usd).unwrap(), 2);
        let gbp = Arc::new(Commodity::new("GBP"));
        assert!(matches!(map.commodity(&gbp), Err(CodecError::UnknownCommodity(s)) if s == "GBP"));
    }

    #[test]
    fn test_resolution_rejects_out_of_range() {
        let mut table = ResolutionTable::new(EntityKind::Commodity);
        assert_eq!(table.next_ident(), 1);
        table.push("a");
        table.push("b");

        assert_eq!(table.resolve(2, 0).unwrap(), "b");
        for ident in [0, 3, NO_IDENT] {
            let err = table.resolve(ident, 40).unwrap_err();
            assert!(matches!(
                err,
                CodecError::Corrupt { entity: EntityKind::Commodity, offset: 40, .. }
            ));
        }
    }
}
