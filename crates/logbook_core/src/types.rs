//! User-visible value types.

/// A journal entry.
///
/// On append, a `seqnum` of 0 means "assign the next sequence number" and
/// a `timestamp` of 0 means "assign the current wall-clock time in
/// milliseconds"; both fields are written back with the assigned values.
/// Entries returned by reads always carry the stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Sequence number.
    pub seqnum: u64,
    /// Timestamp; user-defined units, non-decreasing with seqnum.
    pub timestamp: u64,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl Entry {
    /// Creates an entry with system-assigned seqnum and timestamp.
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            seqnum: 0,
            timestamp: 0,
            data,
        }
    }

    /// Creates a fully specified entry.
    #[must_use]
    pub fn with_fields(seqnum: u64, timestamp: u64, data: Vec<u8>) -> Self {
        Self {
            seqnum,
            timestamp,
            data,
        }
    }
}

/// A borrowed view of one entry, produced by the buffered read.
///
/// The payload aliases the caller's buffer. `data` is `None` on the
/// trailing view when the buffer could not hold the payload: the header
/// fields are still populated so the caller can size a larger buffer
/// (`data_len` plus the fixed record size) and retry from `seqnum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordView<'a> {
    /// Sequence number.
    pub seqnum: u64,
    /// Timestamp.
    pub timestamp: u64,
    /// Payload length in bytes.
    pub data_len: u32,
    /// Payload bytes, or `None` if they did not fit in the buffer.
    pub data: Option<&'a [u8]>,
}

impl RecordView<'_> {
    /// Returns whether the payload was fully captured in the buffer.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.data.is_some()
    }
}

/// Bounds of a journal: first and last seqnum with their timestamps.
///
/// All four fields are zero exactly when the journal is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct State {
    /// First stored seqnum (0 when empty).
    pub seqnum1: u64,
    /// Timestamp of the first entry.
    pub timestamp1: u64,
    /// Last stored seqnum (0 when empty).
    pub seqnum2: u64,
    /// Timestamp of the last entry.
    pub timestamp2: u64,
}

impl State {
    /// Returns whether the journal holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.seqnum1 == 0
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Statistics over a seqnum range, as returned by `Journal::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Smallest seqnum in the clamped range.
    pub min_seqnum: u64,
    /// Largest seqnum in the clamped range.
    pub max_seqnum: u64,
    /// Timestamp of the first entry in the range.
    pub min_timestamp: u64,
    /// Timestamp of the last entry in the range.
    pub max_timestamp: u64,
    /// Number of entries in the range.
    pub num_entries: u64,
    /// Bytes the range occupies in the data file (records, payloads, pads).
    pub data_size: u64,
    /// Bytes the range occupies in the index file.
    pub index_size: u64,
}

/// Search mode for timestamp lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Find the first entry whose timestamp is not less than the value.
    Lower,
    /// Find the first entry whose timestamp is greater than the value.
    Upper,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_state_is_all_zeros() {
        assert!(State::default().is_empty());

        let mut state = State {
            seqnum1: 1,
            timestamp1: 2,
            seqnum2: 3,
            timestamp2: 4,
        };
        assert!(!state.is_empty());
        state.reset();
        assert_eq!(state, State::default());
    }

    #[test]
    fn entry_constructors() {
        let e = Entry::new(vec![1, 2, 3]);
        assert_eq!(e.seqnum, 0);
        assert_eq!(e.timestamp, 0);

        let e = Entry::with_fields(10, 3, vec![]);
        assert_eq!(e.seqnum, 10);
        assert_eq!(e.timestamp, 3);
        assert!(e.data.is_empty());
    }

    #[test]
    fn record_view_completeness() {
        let payload = [1u8, 2, 3];
        let complete = RecordView {
            seqnum: 1,
            timestamp: 1,
            data_len: 3,
            data: Some(&payload),
        };
        let partial = RecordView {
            seqnum: 2,
            timestamp: 1,
            data_len: 100,
            data: None,
        };
        assert!(complete.is_complete());
        assert!(!partial.is_complete());
    }
}
