//! Journal data structure holding accounts, commodities and entries

use std::fmt;
use std::path::PathBuf;

use ledger_math::CommodityPool;

use crate::account::{find_account, Account, AccountRef};
use crate::entry::{Entry, EntryRef};
use crate::pool::{EntryId, EntryPool};

/// Storage slot of one journal entry
#[derive(Debug, Clone)]
pub enum EntrySlot {
    /// Individually owned entry, as built by the text parser
    Owned(Entry),
    /// Entry living in the journal's pooled block
    Pooled(EntryId),
}

/// Main journal containing the account tree, commodities and entries
#[derive(Debug)]
pub struct Journal {
    /// Source files this journal was read from, primary file first
    pub sources: Vec<PathBuf>,
    /// Root of the account tree
    pub master: AccountRef,
    /// Commodity table
    pub commodities: CommodityPool,
    entries: Vec<EntrySlot>,
    pool: Option<EntryPool>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            master: Account::new_root("").into_ref(),
            commodities: CommodityPool::new(),
            entries: Vec::new(),
            pool: None,
        }
    }
}

impl Journal {
    /// Create a new empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an individually owned entry
    pub fn add_entry(&mut self, entry: Entry) {
        self.entries.push(EntrySlot::Owned(entry));
    }

    /// All entries in journal order
    pub fn entries(&self) -> impl Iterator<Item = EntryRef<'_>> + '_ {
        self.entries.iter().filter_map(move |slot| match slot {
            EntrySlot::Owned(entry) => Some(EntryRef::Owned(entry)),
            EntrySlot::Pooled(id) => self.pool.as_ref().and_then(|pool| pool.entry(*id)),
        })
    }

    /// Number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of transactions across all entries
    pub fn transaction_count(&self) -> usize {
        self.entries().map(|e| e.transactions().len()).sum()
    }

    /// Number of accounts below the master account
    pub fn account_count(&self) -> usize {
        self.master.borrow().subtree_size() - 1
    }

    /// Find an account by colon-separated path, optionally creating it
    pub fn find_account(&self, path: &str, auto_create: bool) -> Option<AccountRef> {
        find_account(&self.master, path, auto_create)
    }

    /// Pooled block backing cache-loaded entries, if any
    pub fn pool(&self) -> Option<&EntryPool> {
        self.pool.as_ref()
    }

    /// Take ownership of a filled pool and append its entries.
    ///
    /// A journal owns at most one pool; the pool is handed back if one is
    /// already attached.
    pub fn attach_pool(&mut self, pool: EntryPool) -> Result<usize, EntryPool> {
        if self.pool.is_some() {
            return Err(pool);
        }
        let added = pool.len();
        self.entries.extend(pool.ids().map(EntrySlot::Pooled));
        self.pool = Some(pool);
        Ok(added)
    }

    /// Format all entries and write them to the given writer
    pub fn write_entries(&self, writer: &mut impl fmt::Write) -> fmt::Result {
        for (i, entry) in self.entries().enumerate() {
            if i != 0 {
                writeln!(writer)?;
            }
            write!(writer, "{entry}")?;
        }
        Ok(())
    }

    /// Format all entries and return them as a String
    pub fn format_entries(&self) -> String {
        let mut buffer = String::new();
        // writing into a String cannot fail
        let _ = self.write_entries(&mut buffer);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use insta::assert_snapshot;

    use super::*;
    use crate::entry::EntryState;
    use crate::pool::PoolCounts;
    use crate::transaction::Transaction;

    fn sample_journal() -> Journal {
        let mut journal = Journal::new();
        let ssb = journal.find_account("Actif:SSB", true).unwrap();
        let fees = journal.find_account("Dépense:SSB:Commissions", true).unwrap();

        let stk = journal.commodities.parse_amount("125 STK").unwrap();
        let paid = journal.commodities.parse_amount("-1672.42 $").unwrap();
        journal.add_entry(
            Entry::new(NaiveDate::from_ymd_opt(1999, 11, 1).unwrap(), "Achat")
                .with_state(EntryState::Cleared)
                .with_transaction(Transaction::new(ssb.clone(), stk))
                .with_transaction(Transaction::new(ssb.clone(), paid)),
        );

        let sold = journal.commodities.parse_amount("-125 STK").unwrap();
        let fee = journal.commodities.parse_amount("55.07 $").unwrap();
        journal.add_entry(
            Entry::new(NaiveDate::from_ymd_opt(1999, 11, 4).unwrap(), "Vente")
                .with_state(EntryState::Cleared)
                .with_code("102")
                .with_transaction(Transaction::new(ssb, sold))
                .with_transaction(Transaction::new(fees, fee).with_note("broker")),
        );
        journal
    }

    #[test]
    fn test_format_entries() {
        let journal = sample_journal();
        assert_snapshot!(journal.format_entries(), @r###"
        1999/11/01 * Achat
            Actif:SSB  125 STK
            Actif:SSB  -1672.42 $

        1999/11/04 * (102) Vente
            Actif:SSB  -125 STK
            Dépense:SSB:Commissions  55.07 $  ; broker
        "###);
    }

    #[test]
    fn test_counts() {
        let journal = sample_journal();
        assert_eq!(journal.entry_count(), 2);
        assert_eq!(journal.transaction_count(), 4);
        assert_eq!(journal.account_count(), 5);
        assert_eq!(journal.commodities.len(), 2);
    }

    #[test]
    fn test_attach_pool_once() {
        let mut journal = sample_journal();
        let mut pool =
            EntryPool::with_counts(PoolCounts { entries: 1, transactions: 0, quantities: 0 });
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        pool.push_entry(date, EntryState::Pending, String::new(), "Pooled".into(), 0).unwrap();

        assert_eq!(journal.attach_pool(pool).ok(), Some(1));
        assert_eq!(journal.entry_count(), 3);
        let last = journal.entries().last().unwrap();
        assert!(last.is_pooled());
        assert_eq!(last.payee(), "Pooled");

        let again = EntryPool::with_counts(PoolCounts::default());
        assert!(journal.attach_pool(again).is_err());
    }
}
