//! Journal fixtures with automatic cleanup.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use logbook_core::{Entry, Journal, Options};
use tempfile::TempDir;

/// A scratch directory holding one named journal.
///
/// The fixture owns the directory; journals are opened and closed against
/// it freely, which is what recovery tests need.
pub struct TestJournal {
    /// The temporary directory (removed on drop).
    pub dir: TempDir,
    /// The journal name.
    pub name: String,
}

impl TestJournal {
    /// Creates a fixture for a journal named `test`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("test")
    }

    /// Creates a fixture for a journal with the given name.
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp directory"),
            name: name.to_owned(),
        }
    }

    /// Opens the journal with the given options.
    pub fn open(&self, opts: Options) -> logbook_core::Result<Journal> {
        Journal::open(self.dir.path(), &self.name, opts)
    }

    /// Opens the journal with full checking, panicking on failure.
    #[must_use]
    pub fn open_checked(&self) -> Journal {
        self.open(Options::new().check(true))
            .expect("failed to open journal")
    }

    /// Opens the journal without checking, panicking on failure.
    #[must_use]
    pub fn open_unchecked(&self) -> Journal {
        self.open(Options::new().check(false))
            .expect("failed to open journal")
    }

    /// Path of the journal's data file.
    #[must_use]
    pub fn dat_path(&self) -> PathBuf {
        self.dir.path().join(format!("{}.dat", self.name))
    }

    /// Path of the journal's index file.
    #[must_use]
    pub fn idx_path(&self) -> PathBuf {
        self.dir.path().join(format!("{}.idx", self.name))
    }
}

impl Default for TestJournal {
    fn default() -> Self {
        Self::new()
    }
}

/// Appends one entry per seqnum in `range`, with timestamps produced by
/// `timestamp` and a small payload derived from the seqnum.
///
/// Panics if the append fails; tests that expect failures append by hand.
pub fn append_numbered(
    journal: &Journal,
    range: RangeInclusive<u64>,
    timestamp: impl Fn(u64) -> u64,
) {
    for seqnum in range {
        let mut entries = vec![Entry::with_fields(
            seqnum,
            timestamp(seqnum),
            seqnum.to_le_bytes().to_vec(),
        )];
        journal
            .append(&mut entries)
            .unwrap_or_else(|e| panic!("append of seqnum {seqnum} failed: {e}"));
    }
}
