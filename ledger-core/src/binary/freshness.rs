//! Source file records and cache freshness checks
//!
//! An image records the files it was built from together with their
//! modification times, in whole seconds since the Unix epoch. The image is
//! fresh for a primary file when that file is listed first and no listed file
//! has been modified since.

use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::config::CodecConfig;
use super::error::{CodecError, CodecResult, EntityKind};
use super::primitive::{Decoder, Encoder};

/// A source file and the modification time it had when the image was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    /// Path as given when the image was written
    pub path: PathBuf,
    /// Modification time in seconds since the Unix epoch
    pub mtime: i64,
}

impl SourceRecord {
    /// Record `path` with its current modification time
    pub fn capture(path: &Path) -> CodecResult<Self> {
        let mtime = modified_seconds(path)
            .map_err(|source| CodecError::SourceStat { path: path.to_path_buf(), source })?;
        Ok(Self { path: path.to_path_buf(), mtime })
    }
}

/// Modification time of `path` in whole seconds since the Unix epoch
pub fn modified_seconds(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(seconds_since_epoch(modified))
}

fn seconds_since_epoch(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

/// Why an image cannot be used for a given primary file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The image was built for a different primary file
    PrimaryMismatch {
        /// Primary file the caller asked for
        expected: PathBuf,
        /// Primary file recorded in the image
        recorded: PathBuf,
    },
    /// A source file changed after the image was written
    Modified {
        /// The changed file
        path: PathBuf,
        /// Modification time stored in the image
        recorded: i64,
        /// Modification time now
        current: i64,
    },
    /// A source file can no longer be inspected
    Missing {
        /// The unreadable file
        path: PathBuf,
    },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::PrimaryMismatch { expected, recorded } => write!(
                f,
                "cache was built for {}, not {}",
                recorded.display(),
                expected.display()
            ),
            StaleReason::Modified { path, recorded, current } => {
                write!(f, "{} modified at {current}, cache has {recorded}", path.display())
            }
            StaleReason::Missing { path } => write!(f, "{} cannot be read", path.display()),
        }
    }
}

/// Check recorded sources against the file system
pub fn validate(
    records: &[SourceRecord],
    expected: &Path,
    config: &CodecConfig,
) -> Result<(), StaleReason> {
    if let Some(first) = records.first() {
        if first.path != expected {
            return Err(StaleReason::PrimaryMismatch {
                expected: expected.to_path_buf(),
                recorded: first.path.clone(),
            });
        }
    }
    for record in records {
        match modified_seconds(&record.path) {
            Ok(current) if current > record.mtime => {
                return Err(StaleReason::Modified {
                    path: record.path.clone(),
                    recorded: record.mtime,
                    current,
                });
            }
            Ok(_) => {}
            Err(_) if config.missing_source_is_stale => {
                return Err(StaleReason::Missing { path: record.path.clone() });
            }
            Err(_) => {}
        }
    }
    Ok(())
}

// path string + mtime
const MIN_SOURCE_RECORD_LEN: u64 = 1 + 8;

impl<W: Write> Encoder<W> {
    pub(crate) fn write_sources(&mut self, records: &[SourceRecord]) -> CodecResult<()> {
        let count = u16::try_from(records.len()).map_err(|_| CodecError::CountOverflow {
            entity: EntityKind::SourceFile,
            count: records.len(),
        })?;
        self.write_u16(count)?;
        for record in records {
            self.write_string(EntityKind::SourceFile, &record.path.to_string_lossy())?;
            self.write_i64(record.mtime)?;
        }
        Ok(())
    }
}

impl<R: Read> Decoder<R> {
    pub(crate) fn read_sources(&mut self) -> CodecResult<Vec<SourceRecord>> {
        let count = self.read_u16(EntityKind::SourceFile)?;
        self.ensure_room(EntityKind::SourceFile, u64::from(count), MIN_SOURCE_RECORD_LEN)?;
        (0..count)
            .map(|_| {
                let path = PathBuf::from(self.read_string(EntityKind::SourceFile)?);
                let mtime = self.read_i64(EntityKind::SourceFile)?;
                Ok(SourceRecord { path, mtime })
            })
            .collect()
    }
}
