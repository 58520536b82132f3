//! Core accounting engine for Ledger
//!
//! This crate provides the journal object graph used for double-entry
//! bookkeeping (accounts, entries and their transactions) together with
//! the binary cache that stores a whole journal on disk and restores it
//! without parsing the source text again.

#![warn(clippy::all)]
#![warn(missing_docs)]

/// Module for hierarchical account structure
pub mod account;

/// Module for the binary journal cache
pub mod binary;

/// Module for entry representation
pub mod entry;

/// Module for journal data structure
pub mod journal;

/// Module for the pooled entry block of cache-loaded journals
pub mod pool;

/// Module for transaction representation
pub mod transaction;

pub use account::{Account, AccountRef};
pub use binary::{BinaryReader, BinaryWriter, CodecConfig, CodecError, LoadOutcome};
pub use entry::{Entry, EntryRef, EntryState};
pub use journal::Journal;
pub use transaction::{Transaction, TransactionFlags};
