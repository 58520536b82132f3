//! Amount module providing exact quantities with commodity support
//!
//! This module implements the Amount type which holds an exact BigRational
//! value. An amount is a quantity paired with an optional commodity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::commodity::{CommodityFlags, CommodityRef};

/// Precision type for tracking decimal places
pub type Precision = u16;

/// Errors raised while building amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Text that is not a decimal number
    #[error("Cannot parse amount from string: {0}")]
    ParseError(String),
}

/// Result type for amount operations
pub type AmountResult<T> = Result<T, AmountError>;

/// An amount represents an arbitrary precision number with optional commodity
#[derive(Clone)]
pub struct Amount {
    /// The exact rational value
    pub(crate) quantity: Option<BigRational>,

    /// Optional commodity reference
    pub(crate) commodity: Option<CommodityRef>,

    /// Number of decimal places the amount was written with
    pub(crate) precision: Precision,

    /// Whether to keep full precision when displaying
    pub(crate) keep_precision: bool,
}

impl Amount {
    /// Create a null amount (uninitialized)
    pub fn null() -> Self {
        Self { quantity: None, commodity: None, precision: 0, keep_precision: false }
    }

    /// Create an amount from a BigRational value
    pub fn from_rational(rational: BigRational) -> Self {
        Self { quantity: Some(rational), commodity: None, precision: 0, keep_precision: false }
    }

    /// Create an amount from an integer
    pub fn from_i64(value: i64) -> Self {
        Self::from_rational(BigRational::from_integer(BigInt::from(value)))
    }

    /// Create an amount from a rust_decimal::Decimal
    pub fn from_decimal(decimal: Decimal) -> Self {
        let scale = decimal.scale();
        let numerator = BigInt::from(decimal.mantissa());
        let denominator = BigInt::from(10).pow(scale);

        Self {
            quantity: Some(BigRational::new(numerator, denominator)),
            commodity: None,
            precision: scale as Precision,
            keep_precision: false,
        }
    }

    /// Create a new amount with a specific commodity
    pub fn with_commodity(value: Decimal, commodity: Option<CommodityRef>) -> Self {
        let mut amount = Self::from_decimal(value);
        amount.commodity = commodity;
        amount
    }

    /// Create an exact amount that preserves full precision
    pub fn exact(value_str: &str) -> AmountResult<Self> {
        let mut amount = Self::parse(value_str)?;
        amount.keep_precision = true;
        Ok(amount)
    }

    /// Parse a bare number such as `-3.50`
    pub fn parse(value_str: &str) -> AmountResult<Self> {
        let decimal = value_str
            .trim()
            .parse::<Decimal>()
            .map_err(|e| AmountError::ParseError(format!("{value_str}: {e}")))?;
        Ok(Self::from_decimal(decimal))
    }

    /// Check if this amount is null (uninitialized)
    pub fn is_null(&self) -> bool {
        self.quantity.is_none()
    }

    /// Check if this amount is exactly zero
    pub fn is_zero(&self) -> bool {
        self.quantity.as_ref().map_or(true, Zero::is_zero)
    }

    /// Get the sign of this amount: -1, 0, or 1
    pub fn sign(&self) -> i32 {
        match &self.quantity {
            Some(q) if q.is_positive() => 1,
            Some(q) if q.is_negative() => -1,
            _ => 0,
        }
    }

    /// Get the negated value of this amount
    pub fn negated(&self) -> Self {
        let mut result = self.clone();
        if let Some(q) = &mut result.quantity {
            *q = -q.clone();
        }
        result
    }

    /// Get the precision of this amount
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Check if this amount keeps full precision
    pub fn keep_precision(&self) -> bool {
        self.keep_precision
    }

    /// Set whether to keep full precision
    pub fn set_keep_precision(&mut self, keep: bool) {
        self.keep_precision = keep;
    }

    /// Precision used when rendering: the wider of the amount's own and its commodity's
    pub fn display_precision(&self) -> Precision {
        match &self.commodity {
            Some(c) if !self.keep_precision => self.precision.max(c.precision()),
            _ => self.precision,
        }
    }

    /// Get the commodity reference
    pub fn commodity(&self) -> Option<&CommodityRef> {
        self.commodity.as_ref()
    }

    /// Check if this amount has a commodity
    pub fn has_commodity(&self) -> bool {
        self.commodity.is_some()
    }

    /// Set the commodity for this amount
    pub fn set_commodity(&mut self, commodity: CommodityRef) {
        self.commodity = Some(commodity);
    }

    /// Render the quantity with the display precision, without commodity
    pub fn quantity_string(&self) -> String {
        let Some(q) = &self.quantity else {
            return "<null>".to_string();
        };

        let precision = u32::from(self.display_precision());
        let scale = BigInt::from(10).pow(precision);
        let scaled = (q * BigRational::from_integer(scale)).round().to_integer();

        let negative = scaled.is_negative();
        let digits = scaled.abs().to_string();
        let mut rendered = if precision == 0 {
            digits
        } else {
            let width = precision as usize + 1;
            let padded = format!("{digits:0>width$}");
            let (int_part, frac_part) = padded.split_at(padded.len() - precision as usize);
            format!("{int_part}.{frac_part}")
        };
        if negative {
            rendered.insert(0, '-');
        }
        rendered
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::null()
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        let same_commodity = match (&self.commodity, &other.commodity) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_commodity && self.quantity == other.quantity
    }
}

impl Eq for Amount {}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quantity = self.quantity_string();
        match &self.commodity {
            None => write!(f, "{quantity}"),
            Some(c) => {
                let sep = if c.has_flags(CommodityFlags::STYLE_SEPARATED) { " " } else { "" };
                if c.has_flags(CommodityFlags::STYLE_SUFFIXED) {
                    write!(f, "{quantity}{sep}{}", c.symbol())
                } else {
                    write!(f, "{}{sep}{quantity}", c.symbol())
                }
            }
        }
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "AMOUNT(<null>)");
        }
        write!(f, "AMOUNT({self})")?;
        if f.alternate() {
            write!(f, " [prec:{}, keep:{}", self.precision, self.keep_precision)?;
            if let Some(rational) = &self.quantity {
                write!(f, ", raw:{rational}")?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<BigRational> for Amount {
    fn from(value: BigRational) -> Self {
        Self::from_rational(value)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
