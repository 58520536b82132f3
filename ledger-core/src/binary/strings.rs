//! String pool shared by pooled entries and their transactions
//!
//! Entry codes, payees and transaction notes are not stored with their
//! records. They are gathered into one region written ahead of the entries,
//! in the order given by [`pooled_string_fields`]. The writer and the reader
//! both walk that function, so the two sides cannot drift apart.

use std::io::{Cursor, Write};

use super::error::{CodecResult, EntityKind};
use super::primitive::{Decoder, Encoder};
use crate::entry::EntryRef;

/// One string slot of a pooled entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledField {
    /// The entry's code
    Code,
    /// The entry's payee
    Payee,
    /// Note of the transaction at this position
    Note(usize),
}

/// Order in which an entry's strings appear in the pool
pub fn pooled_string_fields(transaction_count: usize) -> impl Iterator<Item = PooledField> {
    [PooledField::Code, PooledField::Payee]
        .into_iter()
        .chain((0..transaction_count).map(PooledField::Note))
}

fn field_value<'a>(entry: EntryRef<'a>, field: PooledField) -> &'a str {
    match field {
        PooledField::Code => entry.code(),
        PooledField::Payee => entry.payee(),
        PooledField::Note(i) => entry.transactions().get(i).map_or("", |t| t.note.as_str()),
    }
}

/// Strings of one entry taken from the pool
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct EntryStrings {
    pub(crate) code: String,
    pub(crate) payee: String,
    pub(crate) notes: Vec<String>,
}

impl EntryStrings {
    fn set(&mut self, field: PooledField, value: String) {
        match field {
            PooledField::Code => self.code = value,
            PooledField::Payee => self.payee = value,
            PooledField::Note(_) => self.notes.push(value),
        }
    }
}

impl<W: Write> Encoder<W> {
    pub(crate) fn write_entry_strings(&mut self, entry: EntryRef<'_>) -> CodecResult<()> {
        for field in pooled_string_fields(entry.transactions().len()) {
            self.write_string(EntityKind::StringPool, field_value(entry, field))?;
        }
        Ok(())
    }
}

/// Cursor over the raw bytes of a string pool
pub(crate) struct StringPool {
    decoder: Decoder<Cursor<Vec<u8>>>,
    len: u64,
}

impl StringPool {
    /// Wrap the pool bytes, which started at `offset` in the image
    pub(crate) fn new(bytes: Vec<u8>, offset: u64, guards: bool) -> Self {
        let len = bytes.len() as u64;
        let decoder =
            Decoder::new(Cursor::new(bytes), guards).starting_at(offset, Some(offset + len));
        Self { decoder, len }
    }

    /// Take the strings of the next entry
    pub(crate) fn next_entry(&mut self, transaction_count: usize) -> CodecResult<EntryStrings> {
        let mut strings =
            EntryStrings { notes: Vec::with_capacity(transaction_count), ..Default::default() };
        for field in pooled_string_fields(transaction_count) {
            let value = self.decoder.read_string(EntityKind::StringPool)?;
            strings.set(field, value);
        }
        Ok(strings)
    }

    /// Verify every byte of the pool was consumed
    pub(crate) fn finish(self) -> CodecResult<()> {
        let unread = self.decoder.remaining().unwrap_or(0);
        if unread != 0 {
            return Err(self.decoder.corrupt(
                EntityKind::StringPool,
                format!("{unread} of {} bytes left unread", self.len),
            ));
        }
        Ok(())
    }
}
