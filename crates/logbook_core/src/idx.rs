//! Index file management.
//!
//! The index is dense: one fixed-size record per entry, so the slot of a
//! seqnum is pure arithmetic over the first seqnum. It is derived data and
//! is reconciled against the data file every time the journal opens:
//!
//! - the first index record must agree with the first data record,
//! - the zeroed tail left by a rollback or a torn write is skipped (and
//!   re-zeroed so the invariant "everything after the last record is zero"
//!   holds),
//! - data records flushed after the last index flush are re-indexed, which
//!   turns a crash between the two flushes into a consistent open.
//!
//! When any of this fails the caller deletes the file and rebuilds it from
//! scratch by re-running the open with full checking.

use std::fs::{File, OpenOptions};
use std::path::Path;

use fs2::FileExt;
use tracing::debug;

use crate::dat;
use crate::error::{Error, Result};
use crate::fileio;
use crate::format::{Header, IdxRecord, HEADER_SIZE, RECORD_SIZE};
use crate::types::State;

/// Creates a new index file containing only the header.
///
/// Fails if the file already exists.
pub(crate) fn create(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|_| Error::OpenIdx)?;

    fileio::write_all_at(&file, &Header::new_idx().encode(), 0).map_err(|_| Error::OpenIdx)?;
    Ok(())
}

/// Returns the byte offset of the index slot for `seqnum`.
pub(crate) fn slot_pos(state: &State, seqnum: u64) -> u64 {
    debug_assert!(state.seqnum1 <= seqnum);
    let diff = if state.seqnum1 == 0 {
        0
    } else {
        seqnum - state.seqnum1
    };
    HEADER_SIZE as u64 + diff * RECORD_SIZE as u64
}

/// Opens the index file and cross-checks it against the data file.
///
/// On entry `state` holds what the data scan established (`seqnum1`,
/// `timestamp1`, and in check mode the tail too). On success the last
/// entry is published into `state` and the end-of-data offset is returned
/// along with the locked file handle.
pub(crate) fn open(
    dat_file: &File,
    path: &Path,
    state: &mut State,
    check: bool,
) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|_| Error::OpenIdx)?;

    file.try_lock_exclusive().map_err(|_| Error::Lock)?;

    let len = fileio::file_size(&file).map_err(|_| Error::ReadIdx)?;

    let mut header_buf = [0u8; HEADER_SIZE];
    match fileio::read_exact_at(&file, &mut header_buf, 0) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(Error::FmtIdx),
        Err(_) => return Err(Error::ReadIdx),
    }
    if !Header::decode(&header_buf).is_valid() {
        return Err(Error::FmtIdx);
    }

    let mut pos = HEADER_SIZE as u64;
    let mut record_0 = IdxRecord::default();

    if pos + RECORD_SIZE as u64 <= len {
        record_0 = read_slot(&file, pos)?;
        pos += RECORD_SIZE as u64;

        if record_0.seqnum != state.seqnum1 || record_0.timestamp != state.timestamp1 {
            return Err(Error::FmtIdx);
        }
        if record_0.seqnum != 0 && record_0.pos != HEADER_SIZE as u64 {
            return Err(Error::FmtIdx);
        }
    }

    let mut record_n = record_0;

    if record_0.seqnum == 0 {
        // No index records yet; nothing to walk.
    } else if check {
        // Forward walk verifying every slot against the data file.
        while pos + RECORD_SIZE as u64 <= len {
            let aux = read_slot(&file, pos)?;
            if aux.seqnum == 0 {
                break;
            }
            pos += RECORD_SIZE as u64;

            if aux.seqnum != record_n.seqnum + 1
                || aux.timestamp < record_n.timestamp
                || aux.pos < record_n.pos + RECORD_SIZE as u64
            {
                return Err(Error::FmtIdx);
            }

            let record_dat =
                dat::read_record(dat_file, aux.pos, true).map_err(|_| Error::FmtIdx)?;
            if aux.seqnum != record_dat.seqnum || aux.timestamp != record_dat.timestamp {
                return Err(Error::FmtIdx);
            }

            record_n = aux;
        }
    } else {
        // Skip to the last complete slot, then walk back over the zeroed
        // tail a rollback may have left.
        let rem = (len - HEADER_SIZE as u64) % RECORD_SIZE as u64;
        pos = len - rem;

        while pos > HEADER_SIZE as u64 {
            record_n = read_slot(&file, pos - RECORD_SIZE as u64)?;
            if record_n.seqnum != 0 {
                break;
            }
            pos -= RECORD_SIZE as u64;
        }
    }

    // Everything after the last live record must read back as zeros.
    if len > pos {
        debug!(offset = pos, bytes = len - pos, "zero-filling index tail");
    }
    fileio::zero_fill(&file, pos).map_err(|_| Error::WriteIdx)?;

    if record_0.seqnum == 0 {
        // Fresh or fully zeroed index: seed it with the first data record.
        if state.seqnum1 != 0 {
            record_0 = IdxRecord {
                seqnum: state.seqnum1,
                timestamp: state.timestamp1,
                pos: HEADER_SIZE as u64,
            };
            state.seqnum2 = state.seqnum1;
            state.timestamp2 = state.timestamp1;
            append_record(&file, state, &record_0)?;
            record_n = record_0;
        }
    } else {
        if record_n.seqnum < record_0.seqnum || record_n.timestamp < record_0.timestamp {
            return Err(Error::FmtIdx);
        }
        // The slot count and the minimum data position both follow from
        // the seqnum span; saturation only matters for garbage slots,
        // which then fail the comparison.
        let diff = record_n.seqnum - record_0.seqnum;
        let expected_end = diff
            .saturating_add(1)
            .saturating_mul(RECORD_SIZE as u64)
            .saturating_add(HEADER_SIZE as u64);
        if pos != expected_end {
            return Err(Error::FmtIdx);
        }
        let min_pos = diff
            .saturating_mul(RECORD_SIZE as u64)
            .saturating_add(HEADER_SIZE as u64);
        if record_n.pos < min_pos {
            return Err(Error::FmtIdx);
        }
        state.seqnum2 = record_n.seqnum;
        state.timestamp2 = record_n.timestamp;
    }

    if state.seqnum1 == 0 {
        return Ok((file, HEADER_SIZE as u64));
    }

    // Validate the last indexed record against the data file and locate
    // the end of data.
    let dat_len = fileio::file_size(dat_file).map_err(|_| Error::ReadDat)?;
    let mut dat_pos = record_n.pos;

    let record_dat = dat::read_record(dat_file, dat_pos, true).map_err(|_| Error::FmtIdx)?;
    if record_dat.seqnum != record_n.seqnum || record_dat.timestamp != record_n.timestamp {
        return Err(Error::FmtIdx);
    }
    dat_pos += record_dat.stored_len();

    let mut dat_end = dat_pos;
    let mut reindexed = 0u64;

    // Data flushed after the last index flush: verify and re-index it.
    while dat_pos + RECORD_SIZE as u64 <= dat_len {
        let record_dat = match dat::read_record(dat_file, dat_pos, true) {
            Ok(record) => record,
            Err(Error::FmtDat) => break,
            Err(e) => return Err(e),
        };

        if record_dat.seqnum == 0 {
            break;
        }

        if record_dat.seqnum != state.seqnum2 + 1 || record_dat.timestamp < state.timestamp2 {
            return Err(Error::FmtDat);
        }

        let slot = IdxRecord {
            seqnum: record_dat.seqnum,
            timestamp: record_dat.timestamp,
            pos: dat_pos,
        };

        let stored = record_dat.stored_len();
        if dat_pos + stored > dat_len {
            break;
        }
        dat_pos += stored;

        state.seqnum2 = record_dat.seqnum;
        state.timestamp2 = record_dat.timestamp;
        dat_end = dat_pos;

        append_record(&file, state, &slot)?;
        reindexed += 1;
    }

    if reindexed > 0 {
        debug!(records = reindexed, "re-indexed data records not covered by the index");
    }

    // Whatever remains past the last good record is a torn tail.
    fileio::zero_fill(dat_file, dat_pos).map_err(|_| Error::WriteDat)?;

    Ok((file, dat_end))
}

/// Writes the index record for the journal's current last entry.
///
/// The record's seqnum must match `state.seqnum2`; the slot is derived
/// from the first seqnum.
pub(crate) fn append_record(file: &File, state: &State, record: &IdxRecord) -> Result<()> {
    if record.seqnum != state.seqnum2 {
        return Err(Error::Generic);
    }

    let pos = slot_pos(state, record.seqnum);
    fileio::write_all_at(file, &record.encode(), pos).map_err(|_| Error::WriteIdx)
}

/// Reads the index record for `seqnum`.
///
/// The first entry's record is synthesized from the state (its data record
/// always sits right after the data header), saving one file access.
pub(crate) fn read_record(file: &File, state: &State, seqnum: u64) -> Result<IdxRecord> {
    if state.seqnum1 == 0 || seqnum < state.seqnum1 || state.seqnum2 < seqnum {
        return Err(Error::Generic);
    }

    if seqnum == state.seqnum1 {
        return Ok(IdxRecord {
            seqnum: state.seqnum1,
            timestamp: state.timestamp1,
            pos: HEADER_SIZE as u64,
        });
    }

    let record = read_slot(file, slot_pos(state, seqnum))?;
    if record.seqnum != seqnum {
        return Err(Error::Generic);
    }
    Ok(record)
}

fn read_slot(file: &File, pos: u64) -> Result<IdxRecord> {
    let mut buf = [0u8; RECORD_SIZE];
    fileio::read_exact_at(file, &mut buf, pos).map_err(|_| Error::ReadIdx)?;
    Ok(IdxRecord::decode(&buf))
}
