//! Journal handle and operations.
//!
//! ## Concurrency
//!
//! The handle is built for one writer thread and any number of reader
//! threads sharing it behind an `Arc`:
//!
//! - The **state mutex** protects the four-field bounds snapshot. It is
//!   held only to copy or publish the snapshot, never across I/O.
//! - The **file mutex** (a read–write lock) keeps the file layout coherent
//!   for readers: `read`/`read_buffered`/`search`/`stats` take it shared,
//!   `rollback`/`purge` take it exclusively. `append` only extends the
//!   data file and publishes state afterwards, so readers stay safe
//!   against it by construction.
//! - The **writer mutex** owns the end-of-data cursor and serializes
//!   writers; the single-writer pattern makes it uncontended.
//!
//! Lock order is always file mutex, then writer mutex, then state mutex.
//!
//! ## Durability
//!
//! All writes are positional and unbuffered, so the "data before index"
//! ordering is the write ordering itself. With fsync mode enabled the data
//! file is forced to stable storage after each append batch and after a
//! rollback, at the cost of throughput.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Options;
use crate::dat;
use crate::error::{AppendError, Error, Result};
use crate::fileio;
use crate::format::{padding, DatRecord, Header, IdxRecord, HEADER_SIZE, RECORD_SIZE};
use crate::idx;
use crate::types::{Entry, RecordView, SearchMode, State, Stats};

/// Maximum length of a journal name.
pub const NAME_MAX_LEN: usize = 32;

/// The two files of an open journal.
struct Files {
    dat: File,
    idx: File,
}

/// An open journal.
///
/// A journal named `N` in directory `D` owns `D/N.dat` and `D/N.idx`
/// (and transiently `D/N.tmp` during a purge). Both files carry an
/// exclusive advisory lock while the journal is open, so a second open of
/// the same journal fails with [`Error::Lock`].
///
/// Dropping the handle releases the locks and closes the files; use
/// [`Journal::close`] to observe the outcome explicitly.
pub struct Journal {
    name: String,
    path: PathBuf,
    dat_path: PathBuf,
    idx_path: PathBuf,
    fsync: AtomicBool,
    state: Mutex<State>,
    /// `None` once closed (explicitly or by a failed destructive op).
    files: RwLock<Option<Files>>,
    /// End-of-data offset; the append cursor.
    dat_end: Mutex<u64>,
}

fn is_valid_path(path: &Path) -> bool {
    // An empty path means the current working directory.
    path.as_os_str().is_empty() || path.is_dir()
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= NAME_MAX_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl Journal {
    /// Opens a journal, creating its files if they do not exist.
    ///
    /// Recovery runs as part of the open: torn tails are zero-filled, an
    /// index lagging behind the data file is completed, and a missing or
    /// inconsistent index is rebuilt from the data (one attempt). With
    /// `opts.check` enabled both files are verified record by record.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPath`] / [`Error::InvalidName`] on bad arguments.
    /// - [`Error::Lock`] when another handle holds the journal.
    /// - [`Error::FmtDat`] / [`Error::Checksum`] when the data file fails
    ///   validation; index errors only surface if the rebuild also fails.
    ///
    /// On error nothing stays open; there is no handle to close.
    pub fn open(path: impl AsRef<Path>, name: &str, opts: Options) -> Result<Self> {
        let path = path.as_ref();

        if !is_valid_path(path) {
            return Err(Error::InvalidPath);
        }
        if !is_valid_name(name) {
            return Err(Error::InvalidName);
        }

        let dat_path = path.join(format!("{name}.dat"));
        let idx_path = path.join(format!("{name}.idx"));

        // A journal is keyed by its data file: without one, any index
        // lying around is stale.
        if !dat_path.exists() {
            let _ = fs::remove_file(&idx_path);
            dat::create(&dat_path)?;
            debug!(name, "created data file");
        }
        if !idx_path.exists() {
            idx::create(&idx_path)?;
            debug!(name, "created index file");
        }

        let (dat_file, mut state) = dat::open(&dat_path, opts.check)?;

        let (idx_file, dat_end) = match idx::open(&dat_file, &idx_path, &mut state, opts.check) {
            Ok(pair) => pair,
            Err(e) if e.is_idx_class() => {
                // The checked retry re-derives the tail, so any state the
                // failed attempt half-established is overwritten.
                warn!(name, error = %e, "index inconsistent, rebuilding");
                fs::remove_file(&idx_path).map_err(|_| Error::OpenIdx)?;
                idx::create(&idx_path)?;
                idx::open(&dat_file, &idx_path, &mut state, true)?
            }
            Err(e) => return Err(e),
        };

        debug!(
            name,
            seqnum1 = state.seqnum1,
            seqnum2 = state.seqnum2,
            dat_end,
            "journal open"
        );

        Ok(Self {
            name: name.to_owned(),
            path: path.to_path_buf(),
            dat_path,
            idx_path,
            fsync: AtomicBool::new(opts.fsync),
            state: Mutex::new(state),
            files: RwLock::new(Some(Files {
                dat: dat_file,
                idx: idx_file,
            })),
            dat_end: Mutex::new(dat_end),
        })
    }

    /// Closes the journal, releasing the file locks.
    ///
    /// Safe to call on a handle that a failed destructive operation
    /// already closed internally.
    pub fn close(self) -> Result<()> {
        let mut files = self.files.write();
        *files = None;
        self.state.lock().reset();
        Ok(())
    }

    /// Enables or disables fsync mode at runtime.
    pub fn set_fsync(&self, enabled: bool) {
        self.fsync.store(enabled, Ordering::Relaxed);
    }

    /// Returns the journal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the directory holding the journal files.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of the journal bounds.
    ///
    /// All four fields are zero exactly when the journal is empty.
    #[must_use]
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Appends entries to the journal.
    ///
    /// An entry seqnum of 0 is replaced with the next sequence number; a
    /// timestamp of 0 is replaced with `max(now_ms, last timestamp)`, so
    /// monotonicity survives a wall clock stepping backwards. Assigned
    /// values are written back into `entries`.
    ///
    /// The batch is not atomic: entries are appended in order and on the
    /// first failure the already-written prefix is kept, flushed and
    /// published. [`AppendError`] reports both the first error and the
    /// number of entries written.
    ///
    /// # Errors
    ///
    /// [`Error::BrokenSequence`] when a non-zero seqnum is not the next
    /// one, [`Error::InvalidTimestamp`] when a non-zero timestamp is below
    /// the last stored one, or a write error.
    pub fn append(&self, entries: &mut [Entry]) -> Result<usize, AppendError> {
        let fail = |written, source| AppendError { written, source };

        let files_guard = self.files.read();
        let files = files_guard
            .as_ref()
            .ok_or_else(|| fail(0, Error::Generic))?;

        if entries.is_empty() {
            return Ok(0);
        }

        let mut dat_end = self.dat_end.lock();
        let mut state = *self.state.lock();

        let mut written = 0;
        let mut first_error = None;

        for entry in entries.iter_mut() {
            if entry.seqnum == 0 {
                entry.seqnum = state.seqnum2 + 1;
            }
            if entry.timestamp == 0 {
                entry.timestamp = now_millis().max(state.timestamp2);
            }

            let slot = IdxRecord {
                seqnum: entry.seqnum,
                timestamp: entry.timestamp,
                pos: *dat_end,
            };

            match dat::append_entry(&files.dat, *dat_end, entry, &mut state) {
                Ok(new_end) => *dat_end = new_end,
                Err(e) => {
                    first_error = Some(e);
                    break;
                }
            }

            // The data record is durable before its index slot exists, so
            // a crash here is recovered by the open-time re-index walk.
            if let Err(e) = idx::append_record(&files.idx, &state, &slot) {
                first_error = Some(e);
                break;
            }

            written += 1;
        }

        if written == 0 {
            return match first_error {
                None => Ok(0),
                Some(e) => Err(fail(0, e)),
            };
        }

        if self.fsync.load(Ordering::Relaxed) && files.dat.sync_data().is_err() {
            first_error.get_or_insert(Error::WriteDat);
        }

        *self.state.lock() = state;

        match first_error {
            None => Ok(written),
            Some(e) => Err(fail(written, e)),
        }
    }

    /// Reads up to `max` entries starting at `seqnum`, copying each
    /// payload into an owned buffer.
    ///
    /// Returns fewer than `max` entries when the journal tail is reached.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when `seqnum` is 0 or outside the stored range,
    /// [`Error::InvalidArgument`] when `max` is 0.
    pub fn read(&self, seqnum: u64, max: usize) -> Result<Vec<Entry>> {
        if max == 0 {
            return Err(Error::InvalidArgument);
        }

        let files_guard = self.files.read();
        let files = files_guard.as_ref().ok_or(Error::Generic)?;
        let state = *self.state.lock();

        if seqnum == 0 || state.seqnum1 == 0 || seqnum < state.seqnum1 || state.seqnum2 < seqnum {
            return Err(Error::NotFound);
        }

        let last = state.seqnum2.min(seqnum.saturating_add(max as u64 - 1));
        let mut entries = Vec::with_capacity((last - seqnum + 1) as usize);

        for sn in seqnum..=last {
            let slot = idx::read_record(&files.idx, &state, sn)?;
            let record = dat::read_record(&files.dat, slot.pos, false)?;
            if record.seqnum != sn {
                return Err(Error::Generic);
            }

            let mut data = vec![0u8; record.data_len as usize];
            fileio::read_exact_at(&files.dat, &mut data, slot.pos + RECORD_SIZE as u64)
                .map_err(|_| Error::ReadDat)?;

            entries.push(Entry {
                seqnum: record.seqnum,
                timestamp: record.timestamp,
                data,
            });
        }

        Ok(entries)
    }

    /// Reads up to `max` entries starting at `seqnum` with a single
    /// positional read into `buf`, returning views that alias the buffer.
    ///
    /// When the buffer cannot hold everything, the trailing view has
    /// `data == None`: its header fields tell the caller how much buffer a
    /// retry from that seqnum needs (`data_len` plus the record size).
    /// Views before it are complete.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `max` is 0 or `buf` is smaller than
    /// one record envelope; [`Error::NotFound`] when `seqnum` is 0 or
    /// outside the stored range.
    pub fn read_buffered<'b>(
        &self,
        seqnum: u64,
        max: usize,
        buf: &'b mut [u8],
    ) -> Result<Vec<RecordView<'b>>> {
        if max == 0 || buf.len() < RECORD_SIZE {
            return Err(Error::InvalidArgument);
        }

        let files_guard = self.files.read();
        let files = files_guard.as_ref().ok_or(Error::Generic)?;
        let state = *self.state.lock();

        if seqnum == 0 || state.seqnum1 == 0 || seqnum < state.seqnum1 || state.seqnum2 < seqnum {
            return Err(Error::NotFound);
        }

        let start = idx::read_record(&files.idx, &state, seqnum)?.pos;

        // Bound the read by the end slot when it exists; otherwise read as
        // much as the buffer holds and let the parse stop at the tail.
        let read_len = if seqnum.saturating_add(max as u64) <= state.seqnum2 {
            let end = idx::read_record(&files.idx, &state, seqnum + max as u64)?.pos;
            ((end - start) as usize).min(buf.len())
        } else {
            buf.len()
        };

        let got = fileio::read_at_most(&files.dat, &mut buf[..read_len], start)
            .map_err(|_| Error::ReadDat)?;
        if got < RECORD_SIZE {
            return Err(Error::ReadDat);
        }

        let buf: &'b [u8] = &buf[..got];
        let mut views: Vec<RecordView<'b>> = Vec::new();
        let mut off = 0;
        let mut seq = seqnum - 1;

        while views.len() < max && seq < state.seqnum2 {
            if buf.len() - off < RECORD_SIZE {
                // The read ended mid-envelope. Surrender the payload of
                // the previous view so the caller learns the buffer was
                // too small for the next record.
                if let Some(last) = views.last_mut() {
                    last.data = None;
                }
                break;
            }

            let envelope: &[u8; RECORD_SIZE] = buf[off..off + RECORD_SIZE]
                .try_into()
                .expect("slice length");
            let record = DatRecord::decode(envelope);
            off += RECORD_SIZE;
            debug_assert_eq!(record.seqnum, seq + 1);

            let data_len = record.data_len as usize;
            if buf.len() - off < data_len {
                views.push(RecordView {
                    seqnum: record.seqnum,
                    timestamp: record.timestamp,
                    data_len: record.data_len,
                    data: None,
                });
                break;
            }

            let data = &buf[off..off + data_len];
            off += data_len;
            off += (padding(record.data_len) as usize).min(buf.len() - off);

            views.push(RecordView {
                seqnum: record.seqnum,
                timestamp: record.timestamp,
                data_len: record.data_len,
                data: Some(data),
            });
            seq = record.seqnum;
        }

        Ok(views)
    }

    /// Returns statistics for the seqnum range `[seqnum1, seqnum2]`,
    /// clamped to the stored range.
    ///
    /// A range disjoint from the journal yields all-zero statistics.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] when `seqnum2 < seqnum1`.
    pub fn stats(&self, seqnum1: u64, seqnum2: u64) -> Result<Stats> {
        if seqnum2 < seqnum1 {
            return Err(Error::InvalidArgument);
        }

        let files_guard = self.files.read();
        let files = files_guard.as_ref().ok_or(Error::Generic)?;
        let state = *self.state.lock();

        if state.seqnum1 == 0 || seqnum2 < state.seqnum1 || state.seqnum2 < seqnum1 {
            return Ok(Stats::default());
        }

        let sn1 = seqnum1.clamp(state.seqnum1, state.seqnum2);
        let sn2 = seqnum2.clamp(state.seqnum1, state.seqnum2);

        let record1 = idx::read_record(&files.idx, &state, sn1)?;
        let record2 = idx::read_record(&files.idx, &state, sn2)?;

        if record2.pos < record1.pos + (record2.seqnum - record1.seqnum) * RECORD_SIZE as u64 {
            return Err(Error::Generic);
        }

        // One data access to size the last entry; its checksum is an
        // open-time concern.
        let record_dat = dat::read_record(&files.dat, record2.pos, false)?;
        if record_dat.seqnum != sn2 {
            return Err(Error::Generic);
        }

        let num_entries = sn2 - sn1 + 1;
        Ok(Stats {
            min_seqnum: record1.seqnum,
            max_seqnum: record2.seqnum,
            min_timestamp: record1.timestamp,
            max_timestamp: record2.timestamp,
            num_entries,
            data_size: record2.pos - record1.pos + record_dat.stored_len(),
            index_size: num_entries * RECORD_SIZE as u64,
        })
    }

    /// Searches for the seqnum matching `timestamp`.
    ///
    /// [`SearchMode::Lower`] finds the first entry whose timestamp is not
    /// less than `timestamp`; [`SearchMode::Upper`] the first whose
    /// timestamp is greater. Binary search over the index: each probe is
    /// one positional read of an index record, and ties are resolved
    /// towards the first occurrence.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the journal is empty or no entry
    /// satisfies the condition.
    pub fn search(&self, timestamp: u64, mode: SearchMode) -> Result<u64> {
        let files_guard = self.files.read();
        let files = files_guard.as_ref().ok_or(Error::Generic)?;
        let state = *self.state.lock();

        if state.seqnum1 == 0 {
            return Err(Error::NotFound);
        }

        match mode {
            SearchMode::Lower if state.timestamp2 < timestamp => return Err(Error::NotFound),
            SearchMode::Upper if state.timestamp2 <= timestamp => return Err(Error::NotFound),
            _ => {}
        }

        match mode {
            SearchMode::Lower if timestamp <= state.timestamp1 => return Ok(state.seqnum1),
            SearchMode::Upper if timestamp < state.timestamp1 => return Ok(state.seqnum1),
            _ => {}
        }

        let (mut sn1, mut sn2) = (state.seqnum1, state.seqnum2);
        let (mut ts1, mut ts2) = (state.timestamp1, state.timestamp2);

        while sn1 + 1 < sn2 && ts1 != ts2 {
            let sn = sn1 + (sn2 - sn1) / 2;
            let ts = idx::read_record(&files.idx, &state, sn)?.timestamp;

            if ts < timestamp {
                (sn1, ts1) = (sn, ts);
            } else if timestamp < ts || mode == SearchMode::Lower {
                (sn2, ts2) = (sn, ts);
            } else {
                (sn1, ts1) = (sn, ts);
            }
        }

        Ok(sn2)
    }

    /// Removes every entry with a seqnum greater than `seqnum` and
    /// returns how many were removed.
    ///
    /// Index slots are zeroed from the tail down and flushed before the
    /// data region is zeroed, so a crash in between can never leave a live
    /// index slot pointing at removed data. Rolling back below the first
    /// seqnum empties the journal. A no-op when `seqnum` is at or past the
    /// tail.
    ///
    /// # Errors
    ///
    /// On failure the journal is left closed and must be reopened; the
    /// next open completes the repair.
    pub fn rollback(&self, seqnum: u64) -> Result<u64> {
        let mut files_guard = self.files.write();
        let files = files_guard.as_ref().ok_or(Error::Generic)?;
        let mut dat_end = self.dat_end.lock();

        match self.rollback_locked(files, &mut dat_end, seqnum) {
            Ok(removed) => Ok(removed),
            Err(e) => {
                *files_guard = None;
                self.state.lock().reset();
                *dat_end = HEADER_SIZE as u64;
                Err(e)
            }
        }
    }

    fn rollback_locked(&self, files: &Files, dat_end: &mut u64, seqnum: u64) -> Result<u64> {
        let state = *self.state.lock();

        if state.seqnum2 <= seqnum {
            return Ok(0);
        }

        let removed = state.seqnum2 - seqnum.max(state.seqnum1 - 1);

        let mut new_dat_end = HEADER_SIZE as u64;
        let mut new_timestamp2 = 0;

        if seqnum >= state.seqnum1 {
            new_timestamp2 = idx::read_record(&files.idx, &state, seqnum)?.timestamp;
            new_dat_end = idx::read_record(&files.idx, &state, seqnum + 1)?.pos;
        }

        // Zero the index slots from the tail down.
        let zeros = [0u8; RECORD_SIZE];
        let mut csn = state.seqnum2;
        while csn > seqnum && csn >= state.seqnum1 {
            let pos = idx::slot_pos(&state, csn);
            fileio::write_all_at(&files.idx, &zeros, pos).map_err(|_| Error::WriteIdx)?;
            csn -= 1;
        }

        {
            let mut published = self.state.lock();
            if seqnum < state.seqnum1 {
                published.reset();
            } else {
                published.seqnum2 = seqnum;
                published.timestamp2 = new_timestamp2;
            }
        }
        *dat_end = new_dat_end;

        // Only now zero the data region the removed entries occupied.
        fileio::zero_fill(&files.dat, new_dat_end).map_err(|_| Error::WriteDat)?;

        if self.fsync.load(Ordering::Relaxed) && files.dat.sync_data().is_err() {
            return Err(Error::WriteDat);
        }

        info!(name = %self.name, seqnum, removed, "rollback complete");
        Ok(removed)
    }

    /// Removes every entry with a seqnum less than `seqnum` and returns
    /// how many were removed.
    ///
    /// The surviving suffix is rewritten through `name.tmp`: the byte
    /// range is copied behind a fresh header, the temp file is renamed
    /// over the data file, and the index is recreated from the data. A
    /// no-op when `seqnum` is at or below the first stored seqnum; a
    /// `seqnum` past the tail removes everything.
    ///
    /// # Errors
    ///
    /// Failures before the rename leave the on-disk journal unchanged;
    /// afterwards the next open reconciles (the index is rebuilt from the
    /// data file). Either way the handle is left closed on error and must
    /// be reopened.
    pub fn purge(&self, seqnum: u64) -> Result<u64> {
        let mut files_guard = self.files.write();
        if files_guard.is_none() {
            return Err(Error::Generic);
        }
        let mut dat_end = self.dat_end.lock();

        let state = *self.state.lock();
        if state.seqnum1 == 0 || seqnum <= state.seqnum1 {
            return Ok(0);
        }

        match self.purge_locked(&mut files_guard, &mut dat_end, state, seqnum) {
            Ok(removed) => Ok(removed),
            Err(e) => {
                *files_guard = None;
                self.state.lock().reset();
                *dat_end = HEADER_SIZE as u64;
                Err(e)
            }
        }
    }

    fn purge_locked(
        &self,
        files_guard: &mut Option<Files>,
        dat_end: &mut u64,
        state: State,
        seqnum: u64,
    ) -> Result<u64> {
        // Past the tail: drop everything and start over with fresh files.
        if state.seqnum2 < seqnum {
            let removed = state.seqnum2 - state.seqnum1 + 1;

            *files_guard = None;
            self.state.lock().reset();

            let _ = fs::remove_file(&self.dat_path);
            let _ = fs::remove_file(&self.idx_path);
            dat::create(&self.dat_path)?;
            idx::create(&self.idx_path)?;

            let (dat_file, mut new_state) = dat::open(&self.dat_path, false)?;
            let (idx_file, new_end) = idx::open(&dat_file, &self.idx_path, &mut new_state, false)?;

            *files_guard = Some(Files {
                dat: dat_file,
                idx: idx_file,
            });
            *self.state.lock() = new_state;
            *dat_end = new_end;

            info!(name = %self.name, removed, "purged all entries");
            return Ok(removed);
        }

        let removed = seqnum - state.seqnum1;
        let tmp_path = self.path.join(format!("{}.tmp", self.name));

        {
            let files = files_guard.as_ref().ok_or(Error::Generic)?;

            let pos = idx::read_record(&files.idx, &state, seqnum)?.pos;
            let record = dat::read_record(&files.dat, pos, true)?;
            if record.seqnum != seqnum {
                return Err(Error::FmtIdx);
            }

            // Copy the surviving suffix behind a fresh header.
            let tmp = File::create(&tmp_path).map_err(|_| Error::TmpFile)?;
            fileio::write_all_at(&tmp, &Header::new_dat().encode(), 0)
                .map_err(|_| Error::TmpFile)?;
            fileio::copy_range(&files.dat, pos, *dat_end, &tmp, HEADER_SIZE as u64)
                .map_err(|_| Error::TmpFile)?;
        }

        // Swap the files: close, drop the index, move the temp file in,
        // then let the reopen rebuild the index from the data.
        *files_guard = None;
        self.state.lock().reset();

        let _ = fs::remove_file(&self.idx_path);
        fs::rename(&tmp_path, &self.dat_path).map_err(|_| Error::TmpFile)?;
        idx::create(&self.idx_path)?;

        let (dat_file, mut new_state) = dat::open(&self.dat_path, false)?;
        let (idx_file, new_end) = idx::open(&dat_file, &self.idx_path, &mut new_state, false)?;

        *files_guard = Some(Files {
            dat: dat_file,
            idx: idx_file,
        });
        *self.state.lock() = new_state;
        *dat_end = new_end;

        info!(name = %self.name, seqnum, removed, "purge complete");
        Ok(removed)
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
