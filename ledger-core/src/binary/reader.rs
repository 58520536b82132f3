//! Reading a journal back from a cache image

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use ledger_math::{Commodity, CommodityFlags, CommodityRef, PriceData, PriceTime};
use log::{debug, info};

use super::amount::RawAmount;
use super::config::CodecConfig;
use super::error::{CodecError, CodecResult, EntityKind};
use super::freshness::{self, SourceRecord, StaleReason};
use super::ident::{ResolutionTable, NO_IDENT};
use super::primitive::Decoder;
use super::strings::{EntryStrings, StringPool};
use super::{timestamp_to_date, timestamp_to_time, FORMAT_VERSION, GUARDED_VARIANT, MAGIC};
use crate::account::{Account, AccountRef};
use crate::entry::EntryState;
use crate::journal::Journal;
use crate::pool::{EntryPool, PoolCounts};
use crate::transaction::{Transaction, TransactionFlags};

// smallest possible encodings, used to reject counts the image cannot hold
const MIN_ACCOUNT_LEN: u64 = 4 + 4 + 1 + 1 + 2 + 4;
const MIN_COMMODITY_LEN: u64 = 4 + 1 + 1 + 1 + 2 + 4 + 4 + 8 + MIN_AMOUNT_LEN;
const MIN_PRICE_LEN: u64 = 8 + MIN_AMOUNT_LEN;
const MIN_ENTRY_LEN: u64 = 8 + 4 + 4;
const MIN_TRANSACTION_LEN: u64 = 4 + MIN_AMOUNT_LEN + 1 + 2;
const MIN_AMOUNT_LEN: u64 = 4 + 1;
const MIN_QUANTITY_LEN: u64 = 1 + 1 + 2 + 4 + 4;

/// Which variant of the format an image uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Strings without guard words
    Plain,
    /// Every string bracketed by guard words
    Guarded,
}

impl ImageFormat {
    /// Identify the image at the current position of `stream`.
    ///
    /// The stream is left where it was. Returns `None` for anything that is
    /// not a cache image of this version.
    pub fn detect<R: Read + Seek>(stream: &mut R) -> CodecResult<Option<Self>> {
        let start = stream.stream_position()?;
        let header = read_header(stream)?;
        stream.seek(SeekFrom::Start(start))?;
        Ok(match header {
            Some((MAGIC, FORMAT_VERSION)) => Some(ImageFormat::Plain),
            Some((MAGIC, version)) if version == FORMAT_VERSION | GUARDED_VARIANT => {
                Some(ImageFormat::Guarded)
            }
            _ => None,
        })
    }

    /// `base` adjusted to read this variant
    pub fn config(self, base: CodecConfig) -> CodecConfig {
        base.with_guards(self == ImageFormat::Guarded)
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Plain => f.write_str("plain"),
            ImageFormat::Guarded => f.write_str("guarded"),
        }
    }
}

/// Result of a load attempt that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The journal now holds this many more entries
    Loaded(usize),
    /// The stream does not hold an image of this format; it was rewound
    FormatMismatch,
    /// The image is out of date for the requested primary file
    Stale(StaleReason),
}

impl LoadOutcome {
    /// Entries loaded, 0 when the cache was not usable
    pub fn entry_count(&self) -> usize {
        match self {
            LoadOutcome::Loaded(count) => *count,
            _ => 0,
        }
    }
}

/// Restores journals from cache images
#[derive(Debug, Clone, Default)]
pub struct BinaryReader {
    config: CodecConfig,
}

impl BinaryReader {
    /// Create a reader with the given options
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    /// Check for a matching magic number and version.
    ///
    /// On success the header has been consumed; otherwise the stream is put
    /// back where it was.
    pub fn test<R: Read + Seek>(&self, stream: &mut R) -> CodecResult<bool> {
        let start = stream.stream_position()?;
        match read_header(stream)? {
            Some((MAGIC, version)) if version == self.config.format_version() => Ok(true),
            _ => {
                stream.seek(SeekFrom::Start(start))?;
                Ok(false)
            }
        }
    }

    /// Load an image into `journal`, returning the number of entries read.
    ///
    /// Returns 0 when the stream holds no usable image: another format, or a
    /// cache that is stale for `expected`.
    pub fn load<R: Read + Seek>(
        &self,
        stream: &mut R,
        journal: &mut Journal,
        expected: Option<&Path>,
        master: Option<&AccountRef>,
    ) -> CodecResult<usize> {
        self.load_outcome(stream, journal, expected, master).map(|outcome| outcome.entry_count())
    }

    /// Load an image into `journal`, reporting why nothing was loaded.
    ///
    /// Freshness is checked only when `expected` names the primary source
    /// file. With a `master` account, the image's root is discarded and its
    /// children are attached to `master`, which becomes the journal's master.
    /// On error the journal is left as it was.
    pub fn load_outcome<R: Read + Seek>(
        &self,
        stream: &mut R,
        journal: &mut Journal,
        expected: Option<&Path>,
        master: Option<&AccountRef>,
    ) -> CodecResult<LoadOutcome> {
        if journal.pool().is_some() {
            return Err(CodecError::PoolInUse);
        }
        if !self.test(stream)? {
            debug!(
                "Stream does not hold a version {:#010x} cache image",
                self.config.format_version()
            );
            return Ok(LoadOutcome::FormatMismatch);
        }

        let mut dec = self.decoder(stream)?;
        let sources = dec.read_sources()?;
        if let Some(expected) = expected {
            if let Err(reason) = freshness::validate(&sources, expected, &self.config) {
                info!("Cache is stale: {reason}");
                return Ok(LoadOutcome::Stale(reason));
            }
        }

        let image = read_image(&mut dec, master)?;
        let loaded = image.commit(journal, sources)?;
        info!("Loaded {loaded} entries from cache");
        Ok(LoadOutcome::Loaded(loaded))
    }

    /// Read the source file list of an image without loading it.
    ///
    /// The stream is left where it was. Returns `None` if the stream does not
    /// hold an image of this format.
    pub fn read_sources<R: Read + Seek>(
        &self,
        stream: &mut R,
    ) -> CodecResult<Option<Vec<SourceRecord>>> {
        let start = stream.stream_position()?;
        if !self.test(stream)? {
            return Ok(None);
        }
        let sources = self.decoder(stream)?.read_sources();
        stream.seek(SeekFrom::Start(start))?;
        sources.map(Some)
    }

    fn decoder<'s, R: Read + Seek>(&self, stream: &'s mut R) -> io::Result<Decoder<&'s mut R>> {
        let position = stream.stream_position()?;
        let end = stream.seek(SeekFrom::End(0))?;
        stream.seek(SeekFrom::Start(position))?;
        Ok(Decoder::new(stream, self.config.guards).starting_at(position, Some(end)))
    }
}

fn read_header<R: Read>(stream: &mut R) -> CodecResult<Option<(u32, u32)>> {
    let mut header = [0u8; 8];
    match stream.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    Ok(Some((magic, version)))
}

/// Everything read from an image, not yet handed to a journal
struct LoadedImage {
    root: AccountRef,
    root_children: Vec<AccountRef>,
    commodities: Vec<CommodityRef>,
    pool: EntryPool,
}

impl LoadedImage {
    fn commit(mut self, journal: &mut Journal, sources: Vec<SourceRecord>) -> CodecResult<usize> {
        let clash =
            self.commodities.iter().find(|c| journal.commodities.find(c.symbol()).is_some());
        if let Some(existing) = clash {
            return Err(CodecError::CommodityConflict(existing.symbol().to_string()));
        }
        if journal.pool().is_some() {
            return Err(CodecError::PoolInUse);
        }

        let merged = graft_children(&self.root, self.root_children);
        if !merged.is_empty() {
            debug!("Merged {} loaded accounts into existing ones", merged.len());
            self.pool.retarget_accounts(|account| merged.get(&Rc::as_ptr(account)).cloned());
        }
        journal.master = self.root;
        for commodity in self.commodities {
            journal.commodities.insert(commodity);
        }
        journal.sources.extend(sources.into_iter().map(|record| record.path));
        journal.attach_pool(self.pool).map_err(|_| CodecError::PoolInUse)
    }
}

/// Attach loaded accounts below `root`. A loaded account whose name is
/// already taken is merged into the existing one: its children move over and
/// it is returned in the map, keyed by address, so references to it can be
/// redirected.
fn graft_children(
    root: &AccountRef,
    children: Vec<AccountRef>,
) -> HashMap<*const RefCell<Account>, AccountRef> {
    let mut merged = HashMap::new();
    let mut pending: Vec<_> = children.into_iter().map(|child| (root.clone(), child)).collect();
    while let Some((parent, child)) = pending.pop() {
        let existing = parent.borrow().child(child.borrow().name());
        match existing {
            Some(existing) => {
                let grandchildren = std::mem::take(&mut child.borrow_mut().children);
                {
                    let mut target = existing.borrow_mut();
                    if target.note.is_none() {
                        target.note = child.borrow().note.clone();
                    }
                }
                pending.extend(grandchildren.into_values().map(|g| (existing.clone(), g)));
                merged.insert(Rc::as_ptr(&child), existing);
            }
            None => {
                child.borrow_mut().parent = Some(Rc::downgrade(&parent));
                parent.borrow_mut().add_child(child);
            }
        }
    }
    merged
}

fn read_image<R: Read>(
    dec: &mut Decoder<R>,
    master: Option<&AccountRef>,
) -> CodecResult<LoadedImage> {
    let (accounts, root_children) = read_accounts(dec, master)?;
    let root = accounts.resolve(1, dec.offset())?;

    let pool_len = dec.read_u32(EntityKind::StringPool)?;
    let pool_offset = dec.offset();
    let pool_bytes = dec.read_bytes(EntityKind::StringPool, pool_len as usize)?;
    let mut strings = StringPool::new(pool_bytes, pool_offset, dec.guards());

    let counts = PoolCounts {
        entries: dec.read_u32(EntityKind::PoolCounts)?,
        transactions: dec.read_u32(EntityKind::PoolCounts)?,
        quantities: dec.read_u32(EntityKind::PoolCounts)?,
    };
    let least = u64::from(counts.entries) * MIN_ENTRY_LEN
        + u64::from(counts.transactions) * MIN_TRANSACTION_LEN
        + u64::from(counts.quantities) * MIN_QUANTITY_LEN;
    dec.ensure_room(EntityKind::PoolCounts, least, 1)?;

    let mut pool = EntryPool::with_counts(counts);
    debug!(
        "Allocated entry pool for {} entries, {} transactions and {} quantities (about {} bytes)",
        counts.entries,
        counts.transactions,
        counts.quantities,
        pool.byte_size()
    );

    let commodities = read_commodities(dec, &mut pool)?;
    for _ in 0..counts.entries {
        read_entry(dec, &mut strings, &mut pool, &accounts, &commodities)?;
    }

    strings.finish()?;
    pool.finish().map_err(|e| dec.corrupt(EntityKind::PoolCounts, e.to_string()))?;
    debug!("Resolved {} accounts and {} commodities", accounts.len(), commodities.len());

    Ok(LoadedImage { root, root_children, commodities: commodities.into_items(), pool })
}

struct AccountRecord {
    ident: u32,
    parent: u32,
    name: String,
    note: String,
    depth: u16,
    children: u32,
}

impl AccountRecord {
    fn into_account(self, parent: Option<&AccountRef>) -> AccountRef {
        let mut account = Account::new_root(self.name);
        account.parent = parent.map(Rc::downgrade);
        account.depth = self.depth;
        account.ident = self.ident;
        account.note = (!self.note.is_empty()).then_some(self.note);
        account.into_ref()
    }
}

fn read_account_record<R: Read>(
    dec: &mut Decoder<R>,
    table: &ResolutionTable<AccountRef>,
) -> CodecResult<AccountRecord> {
    let offset = dec.offset();
    let ident = dec.read_u32(EntityKind::Account)?;
    if ident != table.next_ident() {
        return Err(CodecError::corrupt(
            EntityKind::Account,
            offset,
            format!("identifier {ident} out of sequence, expected {}", table.next_ident()),
        ));
    }
    Ok(AccountRecord {
        ident,
        parent: dec.read_u32(EntityKind::Account)?,
        name: dec.read_string(EntityKind::Account)?,
        note: dec.read_string(EntityKind::Account)?,
        depth: dec.read_u16(EntityKind::Account)?,
        children: dec.read_u32(EntityKind::Account)?,
    })
}

/// Read the account tree. Children of the root are returned separately so
/// the root, which may be the caller's master account, is not modified
/// until the whole image has been read.
fn read_accounts<R: Read>(
    dec: &mut Decoder<R>,
    master: Option<&AccountRef>,
) -> CodecResult<(ResolutionTable<AccountRef>, Vec<AccountRef>)> {
    let count = dec.read_u32(EntityKind::Account)?;
    if count == 0 {
        return Err(dec.corrupt(EntityKind::Account, "image has no root account"));
    }
    dec.ensure_room(EntityKind::Account, u64::from(count), MIN_ACCOUNT_LEN)?;

    let mut table = ResolutionTable::new(EntityKind::Account);
    let offset = dec.offset();
    let record = read_account_record(dec, &table)?;
    if record.parent != NO_IDENT {
        return Err(CodecError::corrupt(EntityKind::Account, offset, "root account has a parent"));
    }
    let root_ident = record.ident;
    let root_children_count = record.children;
    let root = match master {
        Some(master) => master.clone(),
        None => record.into_account(None),
    };
    table.push(root.clone());

    let mut root_children = Vec::new();
    let mut stack = vec![(root, root_ident, root_children_count)];
    let mut read = 1u32;
    while let Some((parent, parent_ident, remaining)) = stack.last_mut() {
        if *remaining == 0 {
            stack.pop();
            continue;
        }
        *remaining -= 1;
        let (parent, parent_ident) = (parent.clone(), *parent_ident);

        if read == count {
            return Err(dec.corrupt(EntityKind::Account, format!("more than {count} accounts")));
        }
        let offset = dec.offset();
        let record = read_account_record(dec, &table)?;
        read += 1;
        if record.parent != parent_ident {
            return Err(CodecError::corrupt(
                EntityKind::Account,
                offset,
                format!("parent {} does not match enclosing account {parent_ident}", record.parent),
            ));
        }

        let children = record.children;
        let ident = record.ident;
        let account = record.into_account(Some(&parent));
        table.push(account.clone());
        if stack.len() == 1 {
            root_children.push(account.clone());
        } else {
            parent.borrow_mut().add_child(account.clone());
        }
        stack.push((account, ident, children));
    }

    if read != count {
        return Err(dec.corrupt(EntityKind::Account, format!("found {read} of {count} accounts")));
    }
    Ok((table, root_children))
}

/// Read an amount, taking a pool slot for its quantity
fn read_pooled_amount<R: Read>(
    dec: &mut Decoder<R>,
    pool: &mut EntryPool,
) -> CodecResult<RawAmount> {
    let raw = dec.read_raw_amount()?;
    if raw.needs_slot() {
        pool.claim_quantity().map_err(|e| dec.corrupt(EntityKind::Amount, e.to_string()))?;
    }
    Ok(raw)
}

fn read_time<R: Read>(dec: &mut Decoder<R>, entity: EntityKind) -> CodecResult<PriceTime> {
    let secs = dec.read_i64(entity)?;
    timestamp_to_time(secs)
        .ok_or_else(|| dec.corrupt(entity, format!("timestamp {secs} out of range")))
}

struct PendingPrices {
    history: Vec<(PriceTime, RawAmount)>,
    last_lookup: PriceTime,
    conversion: RawAmount,
}

/// Read the commodity table. Price amounts are bound only once every
/// commodity is known, since they may refer to any of them.
fn read_commodities<R: Read>(
    dec: &mut Decoder<R>,
    pool: &mut EntryPool,
) -> CodecResult<ResolutionTable<CommodityRef>> {
    let count = dec.read_u32(EntityKind::Commodity)?;
    dec.ensure_room(EntityKind::Commodity, u64::from(count), MIN_COMMODITY_LEN)?;

    let mut table = ResolutionTable::new(EntityKind::Commodity);
    let mut pending = Vec::new();
    let mut symbols = HashSet::new();

    for _ in 0..count {
        let offset = dec.offset();
        let ident = dec.read_u32(EntityKind::Commodity)?;
        if ident != table.next_ident() {
            return Err(CodecError::corrupt(
                EntityKind::Commodity,
                offset,
                format!("identifier {ident} out of sequence, expected {}", table.next_ident()),
            ));
        }

        let symbol = dec.read_string(EntityKind::Commodity)?;
        if symbol.is_empty() || !symbols.insert(symbol.clone()) {
            return Err(CodecError::corrupt(
                EntityKind::Commodity,
                offset,
                format!("invalid or repeated symbol {symbol:?}"),
            ));
        }
        let mut commodity = Commodity::new(symbol);
        commodity.set_name(dec.read_string(EntityKind::Commodity)?);
        commodity.set_note(dec.read_string(EntityKind::Commodity)?);
        commodity.set_precision(dec.read_u16(EntityKind::Commodity)?);
        commodity.set_flags(CommodityFlags::from_bits_retain(dec.read_u32(EntityKind::Commodity)?));

        let history_len = dec.read_u32(EntityKind::Commodity)?;
        dec.ensure_room(EntityKind::Commodity, u64::from(history_len), MIN_PRICE_LEN)?;
        let mut history = Vec::with_capacity(history_len as usize);
        for _ in 0..history_len {
            let when = read_time(dec, EntityKind::Commodity)?;
            history.push((when, read_pooled_amount(dec, pool)?));
        }
        let last_lookup = read_time(dec, EntityKind::Commodity)?;
        let conversion = read_pooled_amount(dec, pool)?;

        table.push(Arc::new(commodity));
        pending.push(PendingPrices { history, last_lookup, conversion });
    }

    for (commodity, prices) in table.iter().zip(pending) {
        let history = prices
            .history
            .into_iter()
            .map(|(when, price)| Ok((when, price.resolve(&table)?)))
            .collect::<CodecResult<BTreeMap<_, _>>>()?;
        commodity.replace_prices(PriceData {
            history,
            last_lookup: prices.last_lookup,
            conversion: prices.conversion.resolve(&table)?,
        });
    }
    Ok(table)
}

fn read_entry<R: Read>(
    dec: &mut Decoder<R>,
    strings: &mut StringPool,
    pool: &mut EntryPool,
    accounts: &ResolutionTable<AccountRef>,
    commodities: &ResolutionTable<CommodityRef>,
) -> CodecResult<()> {
    let secs = dec.read_i64(EntityKind::Entry)?;
    let date = timestamp_to_date(secs)
        .ok_or_else(|| dec.corrupt(EntityKind::Entry, format!("date {secs} out of range")))?;
    let state_code = dec.read_u32(EntityKind::Entry)?;
    let state = EntryState::from_code(state_code)
        .ok_or_else(|| dec.corrupt(EntityKind::Entry, format!("unknown state {state_code}")))?;

    let count = dec.read_u32(EntityKind::Entry)?;
    let free = pool.capacity().transactions - pool.usage().transactions;
    if count > free {
        return Err(dec.corrupt(
            EntityKind::Entry,
            format!("{count} transactions exceed the {free} left in the pool"),
        ));
    }

    let EntryStrings { code, payee, notes } = strings.next_entry(count as usize)?;
    let first = pool.next_transaction();
    for note in notes {
        let offset = dec.offset();
        let account = accounts.resolve(dec.read_u32(EntityKind::Transaction)?, offset)?;
        let amount = read_pooled_amount(dec, pool)?.resolve(commodities)?;
        let cost = match dec.read_u8(EntityKind::Transaction)? {
            0 => None,
            1 => Some(read_pooled_amount(dec, pool)?.resolve(commodities)?),
            other => {
                return Err(dec.corrupt(EntityKind::Transaction, format!("bad cost marker {other}")))
            }
        };
        let bits = dec.read_u16(EntityKind::Transaction)?;
        let flags = TransactionFlags::from_bits(bits).ok_or_else(|| {
            dec.corrupt(EntityKind::Transaction, format!("unknown flags {bits:#06x}"))
        })?;

        let transaction = Transaction { account, amount, cost, flags, note };
        pool.push_transaction(transaction)
            .map_err(|e| dec.corrupt(EntityKind::Transaction, e.to_string()))?;
    }
    pool.push_entry(date, state, code, payee, first)
        .map_err(|e| dec.corrupt(EntityKind::Entry, e.to_string()))?;
    Ok(())
}
