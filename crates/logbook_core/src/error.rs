//! Error types for the journal engine.
//!
//! The error set is closed and every kind maps to a stable negative
//! integer code, so embedders that surface errors across a process or
//! language boundary can rely on the numbers. [`strerror`] covers the full
//! numeric set, including codes that safe Rust cannot produce (allocation
//! failure aborts, and an owned payload cannot disagree with its length).

use thiserror::Error;

/// Result type for journal operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur in journal operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Generic error (closed handle, internal inconsistency).
    #[error("Generic error")]
    Generic,

    /// Invalid argument.
    #[error("Invalid argument")]
    InvalidArgument,

    /// The journal directory does not exist or is not a directory.
    #[error("Invalid directory")]
    InvalidPath,

    /// The journal name is empty, too long or contains invalid characters.
    #[error("Invalid journal name")]
    InvalidName,

    /// The data file cannot be created or opened.
    #[error("Cannot open dat file")]
    OpenDat,

    /// Error reading the data file.
    #[error("Error reading dat file")]
    ReadDat,

    /// Error writing to the data file.
    #[error("Error writing to dat file")]
    WriteDat,

    /// The index file cannot be created or opened.
    #[error("Cannot open idx file")]
    OpenIdx,

    /// Error reading the index file.
    #[error("Error reading idx file")]
    ReadIdx,

    /// Error writing to the index file.
    #[error("Error writing to idx file")]
    WriteIdx,

    /// The data file content is not a valid journal.
    #[error("Invalid dat file")]
    FmtDat,

    /// The index file content does not match the data file.
    #[error("Invalid idx file")]
    FmtIdx,

    /// An appended entry's seqnum is neither 0 nor the next in sequence.
    #[error("Broken sequence")]
    BrokenSequence,

    /// An appended entry's timestamp is less than the last stored one.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// No entry matches the requested seqnum or timestamp.
    #[error("No results")]
    NotFound,

    /// The temporary file used by purge cannot be created or written.
    #[error("Error creating temp file")]
    TmpFile,

    /// A stored record's checksum does not match its content.
    #[error("Checksum mismatch")]
    Checksum,

    /// The advisory file lock is held by another process.
    #[error("Error locking file")]
    Lock,
}

impl Error {
    /// Returns the stable negative integer code of this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Generic => -1,
            Self::InvalidArgument => -2,
            Self::InvalidPath => -4,
            Self::InvalidName => -5,
            Self::OpenDat => -6,
            Self::ReadDat => -7,
            Self::WriteDat => -8,
            Self::OpenIdx => -9,
            Self::ReadIdx => -10,
            Self::WriteIdx => -11,
            Self::FmtDat => -12,
            Self::FmtIdx => -13,
            Self::BrokenSequence => -14,
            Self::InvalidTimestamp => -15,
            Self::NotFound => -17,
            Self::TmpFile => -18,
            Self::Checksum => -19,
            Self::Lock => -20,
        }
    }

    /// Returns whether this error is in the index class that triggers the
    /// single open-time index rebuild.
    #[must_use]
    pub(crate) const fn is_idx_class(self) -> bool {
        matches!(
            self,
            Self::OpenIdx | Self::ReadIdx | Self::WriteIdx | Self::FmtIdx
        )
    }
}

/// Error raised by a batched append, carrying how many entries were
/// written (and durably flushed) before the first failure.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{source} ({written} entries written)")]
pub struct AppendError {
    /// Number of entries written before the failure.
    pub written: usize,
    /// The first error encountered.
    pub source: Error,
}

impl From<AppendError> for Error {
    fn from(e: AppendError) -> Self {
        e.source
    }
}

/// Returns the textual description of an error code.
///
/// Covers the whole closed set of codes, including the ones that have no
/// [`Error`] variant in this implementation. Codes greater than or equal
/// to zero mean success.
#[must_use]
pub fn strerror(code: i32) -> &'static str {
    if code >= 0 {
        return "Success";
    }

    match code {
        -1 => "Generic error",
        -2 => "Invalid argument",
        -3 => "Out of memory",
        -4 => "Invalid directory",
        -5 => "Invalid journal name",
        -6 => "Cannot open dat file",
        -7 => "Error reading dat file",
        -8 => "Error writing to dat file",
        -9 => "Cannot open idx file",
        -10 => "Error reading idx file",
        -11 => "Error writing to idx file",
        -12 => "Invalid dat file",
        -13 => "Invalid idx file",
        -14 => "Broken sequence",
        -15 => "Invalid timestamp",
        -16 => "Data not found",
        -17 => "No results",
        -18 => "Error creating temp file",
        -19 => "Checksum mismatch",
        -20 => "Error locking file",
        _ => "Unknown error",
    }
}
