//! On-disk format of the journal files.
//!
//! A journal is a pair of files. The data file holds the entries:
//!
//! ```text
//! | header (128) | record1 (24) | payload1 + pad | record2 (24) | payload2 + pad | ...
//! ```
//!
//! The index file holds one fixed-size record per entry, so the slot of a
//! seqnum is pure arithmetic:
//!
//! ```text
//! | header (128) | idx record1 (24) | idx record2 (24) | ...
//! ```
//!
//! All multi-byte integers are little-endian and the structures are tightly
//! packed. Payloads are padded with zero bytes up to the next pointer-size
//! multiple; pad bytes are not covered by the checksum.
//!
//! These types are public so that external inspection tooling (and the
//! corruption helpers in the test kit) can parse and forge the files.

use crate::crc::crc32;

/// Magic number at the start of both journal files.
pub const MAGIC: u64 = 0x211A_BF1A_6264_6C00;

/// Current file format version.
pub const FORMAT_1: u32 = 1;

/// Size in bytes of the informational text field in a file header.
pub const TEXT_LEN: usize = 116;

/// Size in bytes of a file header (data and index files alike).
pub const HEADER_SIZE: usize = 128;

/// Size in bytes of a data record envelope and of an index record.
pub const RECORD_SIZE: usize = 24;

/// Informational text written into data file headers.
pub const DAT_TEXT: &str = "\nThis is a logbook data file.\nDo not edit it.\n";

/// Informational text written into index file headers.
pub const IDX_TEXT: &str = "\nThis is a logbook index file.\nDo not edit it.\n";

/// Number of zero bytes appended after a payload so that the next record
/// starts on a pointer-size boundary.
#[must_use]
pub const fn padding(data_len: u32) -> u32 {
    const WORD: u32 = std::mem::size_of::<usize>() as u32;
    let round_up = (data_len.wrapping_add(WORD - 1)) & !(WORD - 1);
    round_up.wrapping_sub(data_len)
}

/// Checksum of a journal entry: CRC-32 chained over the little-endian
/// seqnum, timestamp and payload length, then the payload bytes.
#[must_use]
pub fn entry_checksum(seqnum: u64, timestamp: u64, data: &[u8]) -> u32 {
    let crc = crc32(&seqnum.to_le_bytes(), 0);
    let crc = crc32(&timestamp.to_le_bytes(), crc);
    let crc = crc32(&(data.len() as u32).to_le_bytes(), crc);
    crc32(data, crc)
}

/// Fixed-size header of a journal file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Magic number ([`MAGIC`] in a well-formed file).
    pub magic: u64,
    /// File format version.
    pub format: u32,
    /// Informational text, zero-padded.
    pub text: [u8; TEXT_LEN],
}

impl Header {
    /// Creates a header for a data file.
    #[must_use]
    pub fn new_dat() -> Self {
        Self::with_text(DAT_TEXT)
    }

    /// Creates a header for an index file.
    #[must_use]
    pub fn new_idx() -> Self {
        Self::with_text(IDX_TEXT)
    }

    fn with_text(text: &str) -> Self {
        let mut buf = [0u8; TEXT_LEN];
        let len = text.len().min(TEXT_LEN);
        buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        Self {
            magic: MAGIC,
            format: FORMAT_1,
            text: buf,
        }
    }

    /// Returns whether the magic number and format version are the expected ones.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.format == FORMAT_1
    }

    /// Encodes the header into its on-disk representation.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.magic.to_le_bytes());
        buf[8..12].copy_from_slice(&self.format.to_le_bytes());
        buf[12..].copy_from_slice(&self.text);
        buf
    }

    /// Decodes a header from its on-disk representation.
    #[must_use]
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        let magic = u64::from_le_bytes(buf[0..8].try_into().expect("slice length"));
        let format = u32::from_le_bytes(buf[8..12].try_into().expect("slice length"));
        let mut text = [0u8; TEXT_LEN];
        text.copy_from_slice(&buf[12..]);
        Self {
            magic,
            format,
            text,
        }
    }
}

/// Envelope of an entry in the data file, immediately followed by
/// `data_len` payload bytes and the pad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatRecord {
    /// Sequence number (0 marks an unused, zero-filled slot).
    pub seqnum: u64,
    /// Entry timestamp.
    pub timestamp: u64,
    /// Payload length in bytes.
    pub data_len: u32,
    /// CRC-32 over the three fields above and the payload.
    pub checksum: u32,
}

impl DatRecord {
    /// Byte length of the record, its payload and the trailing pad.
    #[must_use]
    pub const fn stored_len(&self) -> u64 {
        RECORD_SIZE as u64 + self.data_len as u64 + padding(self.data_len) as u64
    }

    /// Checksum of the fixed fields alone; the payload is chained on top
    /// with [`crc32`] when it is read in pieces.
    #[must_use]
    pub fn fields_checksum(&self) -> u32 {
        let crc = crc32(&self.seqnum.to_le_bytes(), 0);
        let crc = crc32(&self.timestamp.to_le_bytes(), crc);
        crc32(&self.data_len.to_le_bytes(), crc)
    }

    /// Encodes the record into its on-disk representation.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.seqnum.to_le_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[16..20].copy_from_slice(&self.data_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decodes a record from its on-disk representation.
    #[must_use]
    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            seqnum: u64::from_le_bytes(buf[0..8].try_into().expect("slice length")),
            timestamp: u64::from_le_bytes(buf[8..16].try_into().expect("slice length")),
            data_len: u32::from_le_bytes(buf[16..20].try_into().expect("slice length")),
            checksum: u32::from_le_bytes(buf[20..24].try_into().expect("slice length")),
        }
    }
}

/// Record of the index file, locating one entry in the data file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdxRecord {
    /// Sequence number (0 marks an unused, zero-filled slot).
    pub seqnum: u64,
    /// Entry timestamp.
    pub timestamp: u64,
    /// Byte offset of the entry's data record in the data file.
    pub pos: u64,
}

impl IdxRecord {
    /// Encodes the record into its on-disk representation.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.seqnum.to_le_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[16..24].copy_from_slice(&self.pos.to_le_bytes());
        buf
    }

    /// Decodes a record from its on-disk representation.
    #[must_use]
    pub fn decode(buf: &[u8; RECORD_SIZE]) -> Self {
        Self {
            seqnum: u64::from_le_bytes(buf[0..8].try_into().expect("slice length")),
            timestamp: u64::from_le_bytes(buf[8..16].try_into().expect("slice length")),
            pos: u64::from_le_bytes(buf[16..24].try_into().expect("slice length")),
        }
    }
}
