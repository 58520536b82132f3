//! Binary journal cache
//!
//! A cache image stores a whole [`Journal`](crate::journal::Journal) so it can
//! be restored without parsing the source text again. The layout, after the
//! magic number and version stamp, is:
//!
//! 1. the source files the journal was read from, with modification times
//! 2. the account tree, in pre-order
//! 3. the string pool holding entry codes, payees and transaction notes
//! 4. entry, transaction and quantity counts used to size the entry pool
//! 5. the commodity table with price histories
//! 6. the entries and their transactions
//!
//! Accounts and commodities are referenced by per-image identifiers. All
//! integers are little-endian.

mod amount;
pub mod config;
pub mod error;
pub mod freshness;
mod ident;
mod primitive;
mod reader;
pub mod strings;
mod writer;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use ledger_math::PriceTime;

pub use config::CodecConfig;
pub use error::{CodecError, CodecResult, EntityKind};
pub use freshness::{validate, SourceRecord, StaleReason};
pub use ident::NO_IDENT;
pub use primitive::MAX_STRING_LEN;
pub use reader::{BinaryReader, ImageFormat, LoadOutcome};
pub use strings::{pooled_string_fields, PooledField};
pub use writer::{BinaryWriter, SaveSummary};

/// First word of every cache image
pub const MAGIC: u32 = 0xFFEE_D765;
/// Layout version; any other value is rejected
pub const FORMAT_VERSION: u32 = 0x0003_0001;
/// Bit set in the version of images carrying string guards
pub const GUARDED_VARIANT: u32 = 0x8000_0000;
/// Guard word written before a string
pub const GUARD_BEFORE: u16 = 0x3001;
/// Guard word written after a string
pub const GUARD_AFTER: u16 = 0x3002;

pub(crate) fn date_to_timestamp(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)).timestamp()
}

pub(crate) fn timestamp_to_date(secs: i64) -> Option<NaiveDate> {
    timestamp_to_time(secs).map(|t| t.date_naive())
}

pub(crate) fn timestamp_to_time(secs: i64) -> Option<PriceTime> {
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dates_are_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(date_to_timestamp(date), 1_704_067_200);
        assert_eq!(timestamp_to_date(1_704_067_200), Some(date));
    }

    #[test]
    fn test_guarded_version_differs() {
        assert_ne!(FORMAT_VERSION, FORMAT_VERSION | GUARDED_VARIANT);
        assert_ne!(GUARD_BEFORE, GUARD_AFTER);
    }
}
