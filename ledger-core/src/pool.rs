//! Arena storage for entries and transactions loaded from a cache image
//!
//! A pool is sized once from the counts recorded in the image header and is
//! filled in read order. Each region refuses to grow past its declared size,
//! and a completed load must have used every slot it declared. Entries refer
//! to their transactions as a contiguous index range, so a whole pool is
//! released at once when the owning journal is dropped.

use std::fmt;
use std::mem::size_of;
use std::ops::Range;

use chrono::NaiveDate;
use ledger_math::QUANTITY_SLOT_SIZE;
use thiserror::Error;

use crate::account::AccountRef;
use crate::entry::{EntryRef, EntryState};
use crate::transaction::Transaction;

/// Handle to an entry stored in an [`EntryPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    /// Position of the entry within its pool
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Entry header stored in a pool
#[derive(Debug, Clone)]
pub struct PooledEntry {
    /// Entry date
    pub date: NaiveDate,
    /// Cleared/pending state
    pub state: EntryState,
    /// Short code, empty when absent
    pub code: String,
    /// Payee/description
    pub payee: String,
    transactions: Range<u32>,
}

impl PooledEntry {
    /// Number of transactions belonging to this entry
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

/// Region of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRegion {
    /// Entry headers
    Entries,
    /// Transactions
    Transactions,
    /// Quantity payload slots
    Quantities,
}

impl fmt::Display for PoolRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolRegion::Entries => "entry",
            PoolRegion::Transactions => "transaction",
            PoolRegion::Quantities => "quantity",
        };
        write!(f, "{name}")
    }
}

/// Errors raised when a pool is used past or short of its declared size
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// A region was asked for more slots than it declared
    #[error("{region} region exhausted after {capacity} slots")]
    Exhausted {
        /// Region that ran out
        region: PoolRegion,
        /// Slots the region declared
        capacity: u32,
    },
    /// A region finished with slots left over
    #[error("{region} region used {used} of {capacity} declared slots")]
    Underused {
        /// Region left short
        region: PoolRegion,
        /// Slots handed out
        used: u32,
        /// Slots the region declared
        capacity: u32,
    },
}

/// Slot counts for the three regions of a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolCounts {
    /// Number of entries
    pub entries: u32,
    /// Number of transactions across all entries
    pub transactions: u32,
    /// Number of non-null quantity payloads
    pub quantities: u32,
}

impl PoolCounts {
    /// Estimated footprint of a pool of these counts.
    ///
    /// Quantities live inside their amounts, so the quantity region is only
    /// a counter; it is charged at `QUANTITY_SLOT_SIZE` per payload to
    /// reflect the decoded numbers the transactions carry.
    pub fn byte_size(&self) -> usize {
        self.entries as usize * size_of::<PooledEntry>()
            + self.transactions as usize * size_of::<Transaction>()
            + self.quantities as usize * QUANTITY_SLOT_SIZE
    }
}

/// Fixed-size block of pooled entries and transactions
#[derive(Debug, Default)]
pub struct EntryPool {
    capacity: PoolCounts,
    entries: Vec<PooledEntry>,
    transactions: Vec<Transaction>,
    quantities: u32,
}

impl EntryPool {
    /// Allocate a pool holding exactly `counts` items
    pub fn with_counts(counts: PoolCounts) -> Self {
        Self {
            capacity: counts,
            entries: Vec::with_capacity(counts.entries as usize),
            transactions: Vec::with_capacity(counts.transactions as usize),
            quantities: 0,
        }
    }

    /// Declared slot counts
    pub fn capacity(&self) -> PoolCounts {
        self.capacity
    }

    /// Slots handed out so far
    pub fn usage(&self) -> PoolCounts {
        PoolCounts {
            entries: self.entries.len() as u32,
            transactions: self.transactions.len() as u32,
            quantities: self.quantities,
        }
    }

    /// Estimated footprint of this pool, see [`PoolCounts::byte_size`]
    pub fn byte_size(&self) -> usize {
        self.capacity.byte_size()
    }

    /// Count one quantity payload against the declared total
    pub fn claim_quantity(&mut self) -> Result<(), PoolError> {
        if self.quantities == self.capacity.quantities {
            return Err(PoolError::Exhausted {
                region: PoolRegion::Quantities,
                capacity: self.capacity.quantities,
            });
        }
        self.quantities += 1;
        Ok(())
    }

    /// Store the next transaction. Transactions of one entry must be pushed
    /// back to back, before the entry itself.
    pub fn push_transaction(&mut self, transaction: Transaction) -> Result<(), PoolError> {
        if self.transactions.len() as u32 == self.capacity.transactions {
            return Err(PoolError::Exhausted {
                region: PoolRegion::Transactions,
                capacity: self.capacity.transactions,
            });
        }
        self.transactions.push(transaction);
        Ok(())
    }

    /// Index the next pushed transaction will receive
    pub fn next_transaction(&self) -> u32 {
        self.transactions.len() as u32
    }

    /// Store an entry owning every transaction pushed since `first_transaction`
    pub fn push_entry(
        &mut self,
        date: NaiveDate,
        state: EntryState,
        code: String,
        payee: String,
        first_transaction: u32,
    ) -> Result<EntryId, PoolError> {
        if self.entries.len() as u32 == self.capacity.entries {
            return Err(PoolError::Exhausted {
                region: PoolRegion::Entries,
                capacity: self.capacity.entries,
            });
        }
        let id = EntryId(self.entries.len() as u32);
        let first = first_transaction.min(self.next_transaction());
        self.entries.push(PooledEntry {
            date,
            state,
            code,
            payee,
            transactions: first..self.next_transaction(),
        });
        Ok(id)
    }

    /// Repoint transactions whose account `retarget` maps to a replacement
    pub(crate) fn retarget_accounts(
        &mut self,
        retarget: impl Fn(&AccountRef) -> Option<AccountRef>,
    ) {
        for transaction in &mut self.transactions {
            if let Some(account) = retarget(&transaction.account) {
                transaction.account = account;
            }
        }
    }

    /// Verify every declared slot was used
    pub fn finish(&self) -> Result<(), PoolError> {
        let used = self.usage();
        let regions = [
            (PoolRegion::Entries, used.entries, self.capacity.entries),
            (PoolRegion::Transactions, used.transactions, self.capacity.transactions),
            (PoolRegion::Quantities, used.quantities, self.capacity.quantities),
        ];
        for (region, used, capacity) in regions {
            if used != capacity {
                return Err(PoolError::Underused { region, used, capacity });
            }
        }
        Ok(())
    }

    /// Look up a pooled entry
    pub fn get(&self, id: EntryId) -> Option<&PooledEntry> {
        self.entries.get(id.index())
    }

    /// View of a pooled entry
    pub fn entry(&self, id: EntryId) -> Option<EntryRef<'_>> {
        self.get(id).map(|e| EntryRef::Pooled(e, self))
    }

    /// Transactions belonging to `entry`
    pub fn transactions_of(&self, entry: &PooledEntry) -> &[Transaction] {
        let range = entry.transactions.start as usize..entry.transactions.end as usize;
        self.transactions.get(range).unwrap_or(&[])
    }

    /// Handles of all stored entries, in insertion order
    pub fn ids(&self) -> impl Iterator<Item = EntryId> {
        (0..self.entries.len() as u32).map(EntryId)
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
