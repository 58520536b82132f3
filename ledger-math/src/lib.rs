//! Arbitrary precision mathematical operations for Ledger
//!
//! This crate provides the quantity representation used throughout Ledger:
//! `Amount` (a BigRational paired with an optional commodity), `Commodity`
//! definitions with their price history, the symbol-keyed `CommodityPool`,
//! and the binary quantity codec used by the journal cache.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod amount;
pub mod commodity;
pub mod quantity;

// Re-export main types
pub use amount::{Amount, AmountError, AmountResult, Precision};
pub use commodity::{
    whole_seconds, Commodity, CommodityFlags, CommodityPool, CommodityRef, PriceData, PriceTime,
};
pub use quantity::{Quantity, QUANTITY_SLOT_SIZE};

// Re-export for convenience
pub use num_bigint::BigInt;
pub use num_rational::BigRational;
