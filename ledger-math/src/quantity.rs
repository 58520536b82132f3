//! Binary encoding of amount quantities
//!
//! Quantities are written as a tag byte followed, for non-null values, by a
//! flag byte, the precision and the little-endian magnitudes of numerator and
//! denominator. Commodity references are not part of the payload; callers
//! encode those separately and rebind them with [`Amount::from_quantity`].
//!
//! Every non-null quantity occupies one pool slot on load. The slot count
//! returned by [`Amount::write_quantity`] is what a cache writer must add to
//! its quantity total so the reader can size its pool exactly.

use std::io::{self, Read, Write};

use num_bigint::{BigInt, BigUint, Sign};
use num_rational::BigRational;
use num_traits::Zero;

use crate::amount::{Amount, Precision};
use crate::commodity::CommodityRef;

/// Bytes of pool space reserved per stored quantity
pub const QUANTITY_SLOT_SIZE: usize = std::mem::size_of::<BigRational>();

const TAG_NULL: u8 = 0;
const TAG_VALUE: u8 = 1;

const FLAG_NEGATIVE: u8 = 0x01;
const FLAG_KEEP_PRECISION: u8 = 0x02;

/// A decoded quantity payload, not yet bound to a commodity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quantity {
    /// Exact value, `None` for a null amount
    pub value: Option<BigRational>,
    /// Decimal places the value was written with
    pub precision: Precision,
    /// Whether full precision is kept when displaying
    pub keep_precision: bool,
}

impl Quantity {
    /// Pool slots this quantity occupies
    pub fn slots(&self) -> usize {
        usize::from(self.value.is_some())
    }
}

impl Amount {
    /// Write the quantity payload, returning the pool slots it needs on load
    pub fn write_quantity<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<usize> {
        let Some(value) = &self.quantity else {
            out.write_all(&[TAG_NULL])?;
            return Ok(0);
        };

        let mut flags = 0u8;
        if value.numer().sign() == Sign::Minus {
            flags |= FLAG_NEGATIVE;
        }
        if self.keep_precision {
            flags |= FLAG_KEEP_PRECISION;
        }

        out.write_all(&[TAG_VALUE, flags])?;
        out.write_all(&self.precision.to_le_bytes())?;
        write_magnitude(out, value.numer().magnitude())?;
        write_magnitude(out, value.denom().magnitude())?;
        Ok(1)
    }

    /// Read a quantity payload written by [`Amount::write_quantity`]
    pub fn read_quantity<R: Read + ?Sized>(input: &mut R) -> io::Result<Quantity> {
        let mut tag = [0u8; 1];
        input.read_exact(&mut tag)?;
        match tag[0] {
            TAG_NULL => Ok(Quantity::default()),
            TAG_VALUE => {
                let mut head = [0u8; 3];
                input.read_exact(&mut head)?;
                let flags = head[0];
                let precision = Precision::from_le_bytes([head[1], head[2]]);

                let numer = read_magnitude(input)?;
                let denom = read_magnitude(input)?;
                if denom.is_zero() {
                    return Err(invalid_data("quantity has a zero denominator"));
                }

                let sign = if flags & FLAG_NEGATIVE != 0 { Sign::Minus } else { Sign::Plus };
                let value = BigRational::new(
                    BigInt::from_biguint(sign, numer),
                    BigInt::from_biguint(Sign::Plus, denom),
                );
                Ok(Quantity {
                    value: Some(value),
                    precision,
                    keep_precision: flags & FLAG_KEEP_PRECISION != 0,
                })
            }
            other => Err(invalid_data(&format!("unknown quantity tag {other:#04x}"))),
        }
    }

    /// Split this amount into its quantity payload
    pub fn quantity(&self) -> Quantity {
        Quantity {
            value: self.quantity.clone(),
            precision: self.precision,
            keep_precision: self.keep_precision,
        }
    }

    /// Rebuild an amount from a decoded quantity and its commodity
    pub fn from_quantity(quantity: Quantity, commodity: Option<CommodityRef>) -> Self {
        Self {
            quantity: quantity.value,
            commodity,
            precision: quantity.precision,
            keep_precision: quantity.keep_precision,
        }
    }
}

fn write_magnitude<W: Write + ?Sized>(out: &mut W, magnitude: &BigUint) -> io::Result<()> {
    let bytes = magnitude.to_bytes_le();
    let len = u32::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "quantity magnitude too large"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&bytes)
}

fn read_magnitude<R: Read + ?Sized>(input: &mut R) -> io::Result<BigUint> {
    let mut len = [0u8; 4];
    input.read_exact(&mut len)?;
    let len = u32::from_le_bytes(len) as u64;

    let mut bytes = Vec::new();
    input.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated quantity magnitude"));
    }
    Ok(BigUint::from_bytes_le(&bytes))
}

fn invalid_data(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(amount: &Amount) -> (Quantity, usize, usize) {
        let mut buf = Vec::new();
        let slots = amount.write_quantity(&mut buf).unwrap();
        let mut cursor = Cursor::new(&buf);
        let quantity = Amount::read_quantity(&mut cursor).unwrap();
        assert_eq!(cursor.position() as usize, buf.len());
        (quantity, slots, buf.len())
    }

    #[test]
    fn test_null_quantity_takes_no_slot() {
        let (quantity, slots, len) = round_trip(&Amount::null());
        assert_eq!(quantity, Quantity::default());
        assert_eq!(slots, 0);
        assert_eq!(quantity.slots(), 0);
        assert_eq!(len, 1);
    }

    #[test]
    fn test_negative_fraction_keeps_precision() {
        let amount = Amount::parse("-3.50").unwrap();
        let (quantity, slots, _) = round_trip(&amount);
        assert_eq!(slots, 1);
        assert_eq!(quantity.slots(), 1);
        assert_eq!(quantity.precision, 2);
        assert_eq!(Amount::from_quantity(quantity, None), amount);
    }

    #[test]
    fn test_huge_values_survive() {
        let numer = BigInt::from(10).pow(40) + BigInt::from(1);
        let mut amount = Amount::from_rational(BigRational::new(numer, BigInt::from(-3)));
        amount.set_keep_precision(true);
        let (quantity, _, _) = round_trip(&amount);
        assert!(quantity.keep_precision);
        assert_eq!(amount.sign(), -1);
        assert_eq!(Amount::from_quantity(quantity, None), amount);
    }

    #[test]
    fn test_zero_denominator_is_rejected() {
        let bytes = [TAG_VALUE, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, 0, 0];
        let err = Amount::read_quantity(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_truncated_payload_is_eof() {
        let bytes = [TAG_VALUE, 0, 0, 0, 4, 0, 0, 0, 5];
        let err = Amount::read_quantity(&mut Cursor::new(&bytes[..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_unknown_tag() {
        let err = Amount::read_quantity(&mut Cursor::new(&[9u8][..])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
