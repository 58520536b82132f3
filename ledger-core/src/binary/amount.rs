//! Amounts as a commodity identifier followed by a quantity payload

use std::io::{Read, Write};

use ledger_math::{Amount, CommodityRef, Quantity};

use super::error::{CodecResult, EntityKind};
use super::ident::{IdentifierMap, ResolutionTable, NO_IDENT};
use super::primitive::{Decoder, Encoder};

/// An amount read from an image whose commodity is not yet resolved
#[derive(Debug, Clone)]
pub(crate) struct RawAmount {
    commodity: u32,
    offset: u64,
    quantity: Quantity,
}

impl RawAmount {
    /// Whether the payload occupies a pool slot
    pub(crate) fn needs_slot(&self) -> bool {
        self.quantity.slots() > 0
    }

    /// Bind the commodity identifier against a complete commodity table
    pub(crate) fn resolve(self, commodities: &ResolutionTable<CommodityRef>) -> CodecResult<Amount> {
        let commodity = match self.commodity {
            NO_IDENT => None,
            ident => Some(commodities.resolve(ident, self.offset)?),
        };
        Ok(Amount::from_quantity(self.quantity, commodity))
    }
}

impl<W: Write> Encoder<W> {
    pub(crate) fn write_amount(&mut self, amount: &Amount, idents: &IdentifierMap) -> CodecResult<()> {
        let ident = match amount.commodity() {
            Some(commodity) => idents.commodity(commodity)?,
            None => NO_IDENT,
        };
        self.write_u32(ident)?;
        let slots = amount.write_quantity(self.inner_mut())?;
        self.add_quantity_slots(slots);
        Ok(())
    }
}

impl<R: Read> Decoder<R> {
    pub(crate) fn read_raw_amount(&mut self) -> CodecResult<RawAmount> {
        let offset = self.offset();
        let commodity = self.read_u32(EntityKind::Amount)?;
        let quantity =
            Amount::read_quantity(&mut *self).map_err(|e| self.io_error(EntityKind::Amount, e))?;
        Ok(RawAmount { commodity, offset, quantity })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ledger_math::{Commodity, CommodityPool};
    use rust_decimal::Decimal;

    use super::*;
    use crate::binary::error::CodecError;

    #[test]
    fn test_amount_resolves_commodity() {
        let mut pool = CommodityPool::new();
        let amount = pool.parse_amount("-3.50 USD").unwrap();
        let usd = pool.find("USD").unwrap();

        let mut idents = IdentifierMap::new();
        idents.assign_commodity("USD");
        let mut enc = Encoder::new(Vec::new(), false);
        enc.write_amount(&amount, &idents).unwrap();
        enc.write_amount(&Amount::null(), &idents).unwrap();
        assert_eq!(enc.quantity_slots(), 1);

        let bytes = enc.inner_mut().clone();
        let mut table = ResolutionTable::new(EntityKind::Commodity);
        table.push(usd.clone());

        let mut dec = Decoder::new(bytes.as_slice(), false);
        let first = dec.read_raw_amount().unwrap();
        assert!(first.needs_slot());
        let restored = first.resolve(&table).unwrap();
        assert_eq!(restored, amount);
        assert!(Arc::ptr_eq(restored.commodity().unwrap(), &usd));

        let second = dec.read_raw_amount().unwrap();
        assert!(!second.needs_slot());
        assert!(second.resolve(&table).unwrap().is_null());
    }

    #[test]
    fn test_dangling_commodity_is_corrupt() {
        let eur = Arc::new(Commodity::new("EUR"));
        let amount = Amount::with_commodity(Decimal::new(5, 0), Some(eur));
        let mut idents = IdentifierMap::new();
        idents.assign_commodity("EUR");
        let mut enc = Encoder::new(Vec::new(), false);
        enc.write_amount(&amount, &idents).unwrap();

        let bytes = enc.inner_mut().clone();
        let empty = ResolutionTable::new(EntityKind::Commodity);
        let raw = Decoder::new(bytes.as_slice(), false).read_raw_amount().unwrap();
        assert!(matches!(raw.resolve(&empty), Err(CodecError::Corrupt { offset: 0, .. })));
    }

    #[test]
    fn test_unregistered_commodity_fails_on_save() {
        let amount = Amount::with_commodity(Decimal::new(1, 0), Some(Arc::new(Commodity::new("X"))));
        let mut enc = Encoder::new(Vec::new(), false);
        let err = enc.write_amount(&amount, &IdentifierMap::new()).unwrap_err();
        assert!(matches!(err, CodecError::UnknownCommodity(s) if s == "X"));
    }
}
