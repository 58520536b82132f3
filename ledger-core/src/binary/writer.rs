//! Writing a journal to a cache image

use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use ledger_math::CommodityPool;
use log::{debug, info};
use tempfile::NamedTempFile;

use super::config::CodecConfig;
use super::error::{CodecResult, EntityKind};
use super::freshness::SourceRecord;
use super::ident::{IdentifierMap, NO_IDENT};
use super::primitive::Encoder;
use super::{date_to_timestamp, MAGIC};
use crate::account::AccountRef;
use crate::entry::EntryRef;
use crate::journal::Journal;

/// What a save wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Accounts written, the root included
    pub accounts: usize,
    /// Commodities written
    pub commodities: usize,
    /// Entries written
    pub entries: usize,
    /// Transactions written
    pub transactions: usize,
    /// Pool slots needed for quantities
    pub quantities: u64,
    /// Size of the string pool in bytes
    pub string_pool_bytes: u64,
}

/// Serializes journals into cache images
///
/// Saving reads the journal only. Identifiers are assigned in a map local
/// to each call, so the same journal may be saved any number of times.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    config: CodecConfig,
}

impl BinaryWriter {
    /// Create a writer with the given options
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Write `journal` to `out`, recording the current modification times of `sources`
    pub fn save<W: Write + Seek>(
        &self,
        out: &mut W,
        journal: &Journal,
        sources: &[PathBuf],
    ) -> CodecResult<SaveSummary> {
        let records: Vec<SourceRecord> =
            sources.iter().map(|path| SourceRecord::capture(path)).collect::<CodecResult<_>>()?;
        self.save_records(out, journal, &records)
    }

    /// Write `journal` to `out` with an explicit source file list
    pub fn save_records<W: Write + Seek>(
        &self,
        out: &mut W,
        journal: &Journal,
        records: &[SourceRecord],
    ) -> CodecResult<SaveSummary> {
        let mut enc = Encoder::new(out, self.config.guards);
        let mut idents = IdentifierMap::new();

        enc.write_u32(MAGIC)?;
        enc.write_u32(self.config.format_version())?;
        enc.write_sources(records)?;

        let accounts = write_accounts(&mut enc, &journal.master, &mut idents)?;

        let pool_size = enc.reserve_u32()?;
        let pool_start = enc.position()?;
        for entry in journal.entries() {
            enc.write_entry_strings(entry)?;
        }
        let string_pool_bytes = enc.position()? - pool_start;
        enc.patch_u32(EntityKind::StringPool, pool_size, string_pool_bytes)?;
        debug!("Wrote {accounts} accounts and a string pool of {string_pool_bytes} bytes");

        let entries = journal.entry_count();
        let transactions = journal.transaction_count();
        enc.write_count(EntityKind::Entry, entries)?;
        enc.write_count(EntityKind::Transaction, transactions)?;
        let quantity_count = enc.reserve_u32()?;

        let commodities = write_commodities(&mut enc, &journal.commodities, &mut idents)?;
        for entry in journal.entries() {
            write_entry(&mut enc, entry, &idents)?;
        }

        let quantities = enc.quantity_slots();
        enc.patch_u32(EntityKind::PoolCounts, quantity_count, quantities)?;
        enc.flush()?;

        info!(
            "Saved cache image: {entries} entries, {transactions} transactions, \
             {commodities} commodities"
        );
        Ok(SaveSummary {
            accounts,
            commodities,
            entries,
            transactions,
            quantities,
            string_pool_bytes,
        })
    }

    /// Write `journal` to the file at `path`.
    ///
    /// The image is written to a temporary file next to `path` and renamed
    /// over it once complete, so a failed save never leaves a partial image.
    pub fn save_to_path(
        &self,
        path: &Path,
        journal: &Journal,
        sources: &[PathBuf],
    ) -> CodecResult<SaveSummary> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir)?;
        let summary = {
            let mut out = BufWriter::new(temp.as_file_mut());
            let summary = self.save(&mut out, journal, sources)?;
            out.flush()?;
            summary
        };
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| e.error)?;
        debug!("Renamed cache image into place at {}", path.display());
        Ok(summary)
    }
}

fn write_accounts<W: Write>(
    enc: &mut Encoder<W>,
    master: &AccountRef,
    idents: &mut IdentifierMap,
) -> CodecResult<usize> {
    let count = master.borrow().subtree_size();
    enc.write_count(EntityKind::Account, count)?;

    let mut stack = vec![(master.clone(), NO_IDENT)];
    while let Some((account_ref, parent)) = stack.pop() {
        let ident = idents.assign_account(&account_ref);
        let account = account_ref.borrow();
        enc.write_u32(ident)?;
        enc.write_u32(parent)?;
        enc.write_string(EntityKind::Account, account.name())?;
        enc.write_string(EntityKind::Account, account.note.as_deref().unwrap_or(""))?;
        enc.write_u16(account.depth)?;
        enc.write_count(EntityKind::Account, account.child_count())?;
        // reversed so children pop in name order
        stack.extend(account.children.values().rev().map(|child| (child.clone(), ident)));
    }
    Ok(count)
}

fn write_commodities<W: Write>(
    enc: &mut Encoder<W>,
    commodities: &CommodityPool,
    idents: &mut IdentifierMap,
) -> CodecResult<usize> {
    enc.write_count(EntityKind::Commodity, commodities.len())?;

    // every identifier exists before any price history refers to one
    for commodity in commodities.iter() {
        idents.assign_commodity(commodity.symbol());
    }

    for commodity in commodities.iter() {
        enc.write_u32(idents.commodity(commodity)?)?;
        enc.write_string(EntityKind::Commodity, commodity.symbol())?;
        enc.write_string(EntityKind::Commodity, commodity.name())?;
        enc.write_string(EntityKind::Commodity, commodity.note())?;
        enc.write_u16(commodity.precision())?;
        enc.write_u32(commodity.flags().bits())?;

        let history = commodity.history();
        enc.write_count(EntityKind::Commodity, history.len())?;
        for (when, price) in &history {
            enc.write_i64(when.timestamp())?;
            enc.write_amount(price, idents)?;
        }
        enc.write_i64(commodity.last_lookup().timestamp())?;
        enc.write_amount(&commodity.conversion(), idents)?;
    }
    Ok(commodities.len())
}

fn write_entry<W: Write>(
    enc: &mut Encoder<W>,
    entry: EntryRef<'_>,
    idents: &IdentifierMap,
) -> CodecResult<()> {
    enc.write_i64(date_to_timestamp(entry.date()))?;
    enc.write_u32(entry.state().code())?;
    enc.write_count(EntityKind::Transaction, entry.transactions().len())?;

    for transaction in entry.transactions() {
        enc.write_u32(idents.account(&transaction.account)?)?;
        enc.write_amount(&transaction.amount, idents)?;
        match &transaction.cost {
            Some(cost) => {
                enc.write_u8(1)?;
                enc.write_amount(cost, idents)?;
            }
            None => enc.write_u8(0)?,
        }
        enc.write_u16(transaction.flags.bits())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::NaiveDate;
    use ledger_math::Amount;

    use super::*;
    use crate::account::Account;
    use crate::binary::error::CodecError;
    use crate::binary::FORMAT_VERSION;
    use crate::entry::Entry;
    use crate::transaction::Transaction;

    fn coffee_journal() -> Journal {
        let mut journal = Journal::new();
        let bank = journal.find_account("Assets:Bank", true).unwrap();
        let amount = journal.commodities.parse_amount("-3.50 USD").unwrap();
        journal.add_entry(
            Entry::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "Coffee Shop")
                .with_transaction(Transaction::new(bank, amount)),
        );
        journal
    }

    #[test]
    fn test_header_and_summary() {
        let journal = coffee_journal();
        let mut out = Cursor::new(Vec::new());
        let summary = BinaryWriter::default().save(&mut out, &journal, &[]).unwrap();

        assert_eq!(
            summary,
            SaveSummary {
                accounts: 3,
                commodities: 1,
                entries: 1,
                transactions: 1,
                quantities: 1,
                // empty code, "Coffee Shop", empty note
                string_pool_bytes: 1 + 12 + 1,
            }
        );

        let bytes = out.into_inner();
        assert_eq!(&bytes[..4], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &FORMAT_VERSION.to_le_bytes());
        assert_eq!(&bytes[8..10], &[0, 0]);
    }

    #[test]
    fn test_empty_journal_layout() {
        let mut out = Cursor::new(Vec::new());
        BinaryWriter::default().save(&mut out, &Journal::new(), &[]).unwrap();
        let dump: Vec<String> = out
            .into_inner()
            .chunks(16)
            .map(|row| row.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" "))
            .collect();
        insta::assert_snapshot!(dump.join("\n"), @r###"
        65 d7 ee ff 01 00 03 00 00 00 01 00 00 00 01 00
        00 00 ff ff ff ff 00 00 00 00 00 00 00 00 00 00
        00 00 00 00 00 00 00 00 00 00 00 00 00 00 00 00
        00 00
        "###);
    }

    #[test]
    fn test_save_leaves_journal_untouched() {
        let journal = coffee_journal();
        let writer = BinaryWriter::default();
        let mut first = Cursor::new(Vec::new());
        let mut second = Cursor::new(Vec::new());
        writer.save(&mut first, &journal, &[]).unwrap();
        writer.save(&mut second, &journal, &[]).unwrap();

        assert_eq!(first.into_inner(), second.into_inner());
        assert_eq!(journal.find_account("Assets:Bank", false).unwrap().borrow().ident, 0);
    }

    #[test]
    fn test_foreign_account_is_rejected() {
        let mut journal = coffee_journal();
        let stray = Account::new_root("Elsewhere").into_ref();
        journal.add_entry(
            Entry::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), "Stray")
                .with_transaction(Transaction::new(stray, Amount::from_i64(1))),
        );
        let err = BinaryWriter::default().save(&mut Cursor::new(Vec::new()), &journal, &[]);
        assert!(matches!(err, Err(CodecError::UnknownAccount(_))));
    }

    #[test]
    fn test_oversized_payee_aborts_save() {
        let mut journal = Journal::new();
        journal.add_entry(Entry::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "p".repeat(70_000)));
        let err = BinaryWriter::default().save(&mut Cursor::new(Vec::new()), &journal, &[]);
        assert!(matches!(
            err,
            Err(CodecError::OversizedString { entity: EntityKind::StringPool, len: 70_000 })
        ));
    }
}
