//! # Logbook Core
//!
//! An embedded, append-only journal engine. A journal stores variable
//! length records identified by a dense, monotonically increasing sequence
//! number (seqnum) and indexed by a monotonic non-decreasing timestamp.
//! Entries can be appended, read and searched; the tail can be reverted
//! (rollback) and the head dropped (purge); nothing is ever updated in
//! place.
//!
//! A journal is two files and no in-memory structures beyond its bounds:
//! an append-only data file and a dense index used to speed up lookups.
//! Read performance relies on the filesystem cache.
//!
//! ## Data file (`name.dat`)
//!
//! ```text
//!     header        record1          data1          record2       data2
//! ┌──────┴──────┐┌─────┴─────┐┌────────┴────────┐┌─────┴─────┐┌─────┴─────┐...
//!   magic number   seqnum1        raw bytes 1      seqnum2     raw bytes 2
//!   format         timestamp1                      timestamp2
//!   etc            length1                         length2
//!                  checksum1                       checksum2
//! ```
//!
//! ## Index file (`name.idx`)
//!
//! ```text
//!      header      record1       record2
//! ┌──────┴──────┐┌─────┴─────┐┌─────┴─────┐...
//!   magic number   seqnum1      seqnum2
//!   format         timestamp1   timestamp2
//!   etc            pos1         pos2
//! ```
//!
//! Any record is addressable by seqnum with pure arithmetic because the
//! index header and records have fixed sizes and seqnums have no gaps.
//! Timestamp lookups binary-search the index. The index is derived data:
//! if it is missing or does not match the data file it is rebuilt at open
//! time.
//!
//! ## Recovery
//!
//! Opening a journal repairs it: torn tails in either file are zero-filled,
//! and data records flushed before a crash but not yet indexed are
//! re-indexed. Genuine corruption (checksum mismatch, broken sequence) is
//! never repaired silently; the open fails instead.
//!
//! ## Example
//!
//! ```no_run
//! use logbook_core::{Entry, Journal, Options, SearchMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let journal = Journal::open("/var/lib/myapp", "events", Options::new())?;
//!
//! let mut entries = vec![Entry::new(b"hello".to_vec())];
//! journal.append(&mut entries)?;
//!
//! let first = journal.search(entries[0].timestamp, SearchMode::Lower)?;
//! let read = journal.read(first, 10)?;
//! assert_eq!(read[0].data, b"hello");
//!
//! journal.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod crc;
mod dat;
mod error;
mod fileio;
mod idx;
mod journal;
mod types;

pub mod format;

pub use config::Options;
pub use crc::crc32;
pub use error::{strerror, AppendError, Error, Result};
pub use journal::{Journal, NAME_MAX_LEN};
pub use types::{Entry, RecordView, SearchMode, State, Stats};

/// Returns the library version (semantic version, e.g. `1.1.0`).
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
