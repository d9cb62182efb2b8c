//! Data file management.
//!
//! The data file is the journal's source of truth: a fixed header followed
//! by checksummed, padded records. Opening the file scans the tail and
//! repairs partial writes by zero-filling them; with full checking enabled
//! the whole file is walked and verified record by record.
//!
//! ## Recovery policy
//!
//! - A truncated or zeroed record at the tail is a crash mid-write: the
//!   region is zero-filled and the scan stops (tolerated).
//! - A record whose declared payload length overruns the end of file is
//!   treated the same way, zero-filled from the record start.
//! - A record that breaks the sequence or decreases the timestamp means
//!   the file is not a journal: the open fails (fatal).
//! - A checksum mismatch on a well-formed record is data corruption: the
//!   open fails so the damage cannot be silently absorbed (fatal).

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fileio;
use crate::format::{entry_checksum, DatRecord, Header, HEADER_SIZE, RECORD_SIZE};
use crate::types::{Entry, State};

/// Creates a new data file containing only the header.
///
/// Fails if the file already exists.
pub(crate) fn create(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|_| Error::OpenDat)?;

    fileio::write_all_at(&file, &Header::new_dat().encode(), 0).map_err(|_| Error::OpenDat)?;
    Ok(())
}

/// Opens the data file, validates the header and scans the tail.
///
/// Returns the locked file handle and the recovered state. In non-check
/// mode only the first record is read, so `seqnum2`/`timestamp2` are left
/// at zero for the index cross-check to establish.
pub(crate) fn open(path: &Path, check: bool) -> Result<(File, State)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|_| Error::OpenDat)?;

    file.try_lock_exclusive().map_err(|_| Error::Lock)?;

    let len = fileio::file_size(&file).map_err(|_| Error::ReadDat)?;
    let mut state = State::default();

    let mut header_buf = [0u8; HEADER_SIZE];
    match fileio::read_exact_at(&file, &mut header_buf, 0) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::FmtDat),
        Err(_) => return Err(Error::ReadDat),
    }
    if !Header::decode(&header_buf).is_valid() {
        return Err(Error::FmtDat);
    }

    let mut pos = HEADER_SIZE as u64;

    if pos == len {
        return Ok((file, state));
    }

    if pos + RECORD_SIZE as u64 > len {
        repair_tail(&file, pos)?;
        return Ok((file, state));
    }

    // First record. A malformed one means the journal is simply empty with
    // a torn tail, not corrupt.
    let record = match read_record(&file, pos, true) {
        Ok(record) => record,
        Err(Error::FmtDat) => {
            repair_tail(&file, pos)?;
            return Ok((file, state));
        }
        Err(e) => return Err(e),
    };

    if record.seqnum == 0 {
        repair_tail(&file, pos)?;
        return Ok((file, state));
    }

    state.seqnum1 = record.seqnum;
    state.timestamp1 = record.timestamp;
    pos += record.stored_len();

    if !check {
        return Ok((file, state));
    }

    state.seqnum2 = record.seqnum;
    state.timestamp2 = record.timestamp;

    while pos + RECORD_SIZE as u64 <= len {
        let record = match read_record(&file, pos, true) {
            Ok(record) => record,
            Err(Error::FmtDat) => {
                repair_tail(&file, pos)?;
                return Ok((file, state));
            }
            Err(e) => return Err(e),
        };

        // A zeroed envelope is a rolled-back or torn record.
        if record.seqnum == 0 {
            repair_tail(&file, pos)?;
            return Ok((file, state));
        }

        if record.seqnum != state.seqnum2 + 1 || record.timestamp < state.timestamp2 {
            return Err(Error::FmtDat);
        }

        pos += record.stored_len();
        state.seqnum2 = record.seqnum;
        state.timestamp2 = record.timestamp;
    }

    Ok((file, state))
}

/// Zero-fills the data file from `pos` to its end.
fn repair_tail(file: &File, pos: u64) -> Result<()> {
    let len = fileio::file_size(file).map_err(|_| Error::ReadDat)?;
    if len > pos {
        warn!(offset = pos, bytes = len - pos, "zero-filling data tail");
    }
    fileio::zero_fill(file, pos).map_err(|_| Error::WriteDat)
}

/// Reads the data record at `pos`, optionally verifying its checksum
/// against the stored payload.
///
/// A record that cannot be fully read (envelope or payload overrunning the
/// end of file) yields [`Error::FmtDat`]; an unused record (seqnum 0) is
/// never checksum-verified.
pub(crate) fn read_record(file: &File, pos: u64, verify_checksum: bool) -> Result<DatRecord> {
    let mut buf = [0u8; RECORD_SIZE];
    let n = fileio::read_at_most(file, &mut buf, pos).map_err(|_| Error::ReadDat)?;
    if n != RECORD_SIZE {
        return Err(Error::FmtDat);
    }

    let record = DatRecord::decode(&buf);

    if !verify_checksum || record.seqnum == 0 {
        return Ok(record);
    }

    let mut checksum = record.fields_checksum();
    let mut remaining = u64::from(record.data_len);
    let mut data_pos = pos + RECORD_SIZE as u64;
    let mut chunk = [0u8; 8192];

    while remaining > 0 {
        let want = (remaining as usize).min(chunk.len());
        let got = fileio::read_at_most(file, &mut chunk[..want], data_pos)
            .map_err(|_| Error::ReadDat)?;
        if got != want {
            return Err(Error::FmtDat);
        }
        checksum = crate::crc::crc32(&chunk[..want], checksum);
        data_pos += want as u64;
        remaining -= want as u64;
    }

    if checksum != record.checksum {
        return Err(Error::Checksum);
    }

    Ok(record)
}

/// Appends `entry` at `dat_end` and advances the caller's state snapshot.
///
/// Returns the new end-of-data offset. The record envelope, payload and
/// pad are written in a single positional write.
pub(crate) fn append_entry(
    file: &File,
    dat_end: u64,
    entry: &Entry,
    state: &mut State,
) -> Result<u64> {
    if state.seqnum2 != 0 && entry.seqnum != state.seqnum2 + 1 {
        return Err(Error::BrokenSequence);
    }

    if entry.timestamp < state.timestamp2 {
        return Err(Error::InvalidTimestamp);
    }

    let record = DatRecord {
        seqnum: entry.seqnum,
        timestamp: entry.timestamp,
        data_len: entry.data.len() as u32,
        checksum: entry_checksum(entry.seqnum, entry.timestamp, &entry.data),
    };

    let mut buf = Vec::with_capacity(record.stored_len() as usize);
    buf.extend_from_slice(&record.encode());
    buf.extend_from_slice(&entry.data);
    buf.resize(record.stored_len() as usize, 0);

    fileio::write_all_at(file, &buf, dat_end).map_err(|_| Error::WriteDat)?;

    if state.seqnum1 == 0 {
        state.seqnum1 = entry.seqnum;
        state.timestamp1 = entry.timestamp;
        debug!(seqnum = entry.seqnum, "first entry written");
    }
    state.seqnum2 = entry.seqnum;
    state.timestamp2 = entry.timestamp;

    Ok(dat_end + record.stored_len())
}
