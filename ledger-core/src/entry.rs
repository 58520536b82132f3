//! Entry representation: one dated accounting event
//!
//! Entries built by the text parser own their transactions. Entries loaded
//! from a cache image live in the journal's [`EntryPool`](crate::pool::EntryPool)
//! and are reached through [`EntryRef`], which hides the difference.

use std::fmt;

use chrono::NaiveDate;

use crate::pool::{EntryPool, PooledEntry};
use crate::transaction::Transaction;

/// Entry state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryState {
    /// Uncleared
    #[default]
    Uncleared,
    /// Cleared (*)
    Cleared,
    /// Pending (!)
    Pending,
}

impl EntryState {
    /// Numeric code used in the cache image
    pub fn code(self) -> u32 {
        match self {
            EntryState::Uncleared => 0,
            EntryState::Cleared => 1,
            EntryState::Pending => 2,
        }
    }

    /// Inverse of [`EntryState::code`]
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(EntryState::Uncleared),
            1 => Some(EntryState::Cleared),
            2 => Some(EntryState::Pending),
            _ => None,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            EntryState::Uncleared => "",
            EntryState::Cleared => " *",
            EntryState::Pending => " !",
        }
    }
}

/// An individually owned entry, as produced by the text parser
#[derive(Debug, Clone)]
pub struct Entry {
    /// Entry date
    pub date: NaiveDate,
    /// Cleared/pending state
    pub state: EntryState,
    /// Short code (check number etc.), empty when absent
    pub code: String,
    /// Payee/description
    pub payee: String,
    /// Transactions of this entry
    pub transactions: Vec<Transaction>,
}

impl Entry {
    /// Create a new entry with required fields
    pub fn new(date: NaiveDate, payee: impl Into<String>) -> Self {
        Self {
            date,
            state: EntryState::default(),
            code: String::new(),
            payee: payee.into(),
            transactions: Vec::new(),
        }
    }

    /// Set the state
    pub fn with_state(mut self, state: EntryState) -> Self {
        self.state = state;
        self
    }

    /// Set the code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = code.into();
        self
    }

    /// Add a transaction to this entry
    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Builder-style variant of [`Entry::add_transaction`]
    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transactions.push(transaction);
        self
    }
}

/// Borrowed view of an entry regardless of where it is stored
#[derive(Debug, Clone, Copy)]
pub enum EntryRef<'a> {
    /// Entry owned by the journal's entry list
    Owned(&'a Entry),
    /// Entry stored in a pooled block
    Pooled(&'a PooledEntry, &'a EntryPool),
}

impl<'a> EntryRef<'a> {
    /// Entry date
    pub fn date(self) -> NaiveDate {
        match self {
            EntryRef::Owned(e) => e.date,
            EntryRef::Pooled(e, _) => e.date,
        }
    }

    /// Cleared/pending state
    pub fn state(self) -> EntryState {
        match self {
            EntryRef::Owned(e) => e.state,
            EntryRef::Pooled(e, _) => e.state,
        }
    }

    /// Short code, empty when absent
    pub fn code(self) -> &'a str {
        match self {
            EntryRef::Owned(e) => &e.code,
            EntryRef::Pooled(e, _) => &e.code,
        }
    }

    /// Payee/description
    pub fn payee(self) -> &'a str {
        match self {
            EntryRef::Owned(e) => &e.payee,
            EntryRef::Pooled(e, _) => &e.payee,
        }
    }

    /// Transactions of this entry, in order
    pub fn transactions(self) -> &'a [Transaction] {
        match self {
            EntryRef::Owned(e) => &e.transactions,
            EntryRef::Pooled(e, pool) => pool.transactions_of(e),
        }
    }

    /// Whether this entry lives in a pooled block
    pub fn is_pooled(self) -> bool {
        matches!(self, EntryRef::Pooled(..))
    }
}

impl fmt::Display for EntryRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.date().format("%Y/%m/%d"), self.state().marker())?;
        if !self.code().is_empty() {
            write!(f, " ({})", self.code())?;
        }
        writeln!(f, " {}", self.payee())?;
        for transaction in self.transactions() {
            writeln!(f, "    {transaction}")?;
        }
        Ok(())
    }
}
