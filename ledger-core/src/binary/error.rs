//! Error types for the binary journal cache

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Kind of record being encoded or decoded when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Magic number and format version
    Header,
    /// Source file list
    SourceFile,
    /// Account tree
    Account,
    /// Pooled strings of entries and transactions
    StringPool,
    /// Entry, transaction and quantity counts
    PoolCounts,
    /// Commodity table
    Commodity,
    /// Entry record
    Entry,
    /// Transaction record
    Transaction,
    /// Amount payload
    Amount,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Header => "header",
            EntityKind::SourceFile => "source file",
            EntityKind::Account => "account",
            EntityKind::StringPool => "string pool",
            EntityKind::PoolCounts => "pool counts",
            EntityKind::Commodity => "commodity",
            EntityKind::Entry => "entry",
            EntityKind::Transaction => "transaction",
            EntityKind::Amount => "amount",
        };
        f.write_str(name)
    }
}

/// Errors raised while saving or loading a cache image
#[derive(Error, Debug)]
pub enum CodecError {
    /// The underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The image contents are inconsistent
    #[error("Corrupt {entity} at offset {offset}: {detail}")]
    Corrupt {
        /// Record being decoded
        entity: EntityKind,
        /// Byte offset in the image
        offset: u64,
        /// What was wrong
        detail: String,
    },

    /// A guard word did not match, meaning writer and reader disagree on layout
    #[error("Guard mismatch in {entity} at offset {offset}: expected {expected:#06x}, found {found:#06x}")]
    GuardMismatch {
        /// Record being decoded
        entity: EntityKind,
        /// Byte offset of the guard word
        offset: u64,
        /// Guard word that should be present
        expected: u16,
        /// Word actually read
        found: u16,
    },

    /// A string is too long for the length prefix
    #[error("Cannot encode {entity} string of {len} bytes (limit is 65535)")]
    OversizedString {
        /// Record being encoded
        entity: EntityKind,
        /// Length of the string in bytes
        len: usize,
    },

    /// A count does not fit its on-disk width
    #[error("Too many {entity} records to encode: {count}")]
    CountOverflow {
        /// Kind of record being counted
        entity: EntityKind,
        /// The count that overflowed
        count: usize,
    },

    /// A transaction posts to an account outside the journal's tree
    #[error("Account not found in journal: {0}")]
    UnknownAccount(String),

    /// An amount refers to a commodity missing from the journal's table
    #[error("Commodity not found in journal: {0}")]
    UnknownCommodity(String),

    /// A listed source file could not be inspected while saving
    #[error("Cannot stat source file {}: {source}", path.display())]
    SourceStat {
        /// Path of the source file
        path: PathBuf,
        /// Underlying failure
        source: io::Error,
    },

    /// The target journal already owns a pooled entry block
    #[error("Journal already holds entries loaded from a cache")]
    PoolInUse,

    /// A loaded commodity clashes with one already defined
    #[error("Commodity already defined: {0}")]
    CommodityConflict(String),
}

/// Result type for cache operations
pub type CodecResult<T> = Result<T, CodecError>;

impl CodecError {
    pub(crate) fn corrupt(entity: EntityKind, offset: u64, detail: impl Into<String>) -> Self {
        CodecError::Corrupt { entity, offset, detail: detail.into() }
    }

    /// Whether this error reports damaged or inconsistent image contents
    pub fn is_corruption(&self) -> bool {
        matches!(self, CodecError::Corrupt { .. } | CodecError::GuardMismatch { .. })
    }
}
