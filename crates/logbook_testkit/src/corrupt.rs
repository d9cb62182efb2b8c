//! Raw-file corruption helpers.
//!
//! Crash and recovery tests damage the journal files the way real
//! failures do: truncation (torn write at the tail), garbage bytes and
//! flipped bits (bad sectors), and forged records (stale or malicious
//! content). All helpers operate on closed files by path.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use logbook_core::format::{entry_checksum, padding, DatRecord, RECORD_SIZE};

/// Returns the file length in bytes.
#[must_use]
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).expect("failed to stat file").len()
}

/// Truncates the file to `len` bytes.
pub fn truncate(path: &Path, len: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("failed to open file");
    file.set_len(len).expect("failed to truncate file");
}

/// Appends raw bytes at the end of the file.
pub fn append_bytes(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .expect("failed to open file");
    file.write_all(bytes).expect("failed to append bytes");
}

/// Overwrites `bytes` at `offset`.
pub fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("failed to open file");
    file.seek(SeekFrom::Start(offset)).expect("failed to seek");
    file.write_all(bytes).expect("failed to overwrite bytes");
}

/// Inverts the byte at `offset`.
pub fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("failed to open file");
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).expect("failed to seek");
    file.read_exact(&mut byte).expect("failed to read byte");
    file.seek(SeekFrom::Start(offset)).expect("failed to seek");
    file.write_all(&[!byte[0]]).expect("failed to write byte");
}

/// Encodes a complete, correctly checksummed data record (envelope,
/// payload and pad), ready to be appended to a data file.
#[must_use]
pub fn forge_dat_record(seqnum: u64, timestamp: u64, data: &[u8]) -> Vec<u8> {
    forge_dat_record_with_checksum(seqnum, timestamp, data, entry_checksum(seqnum, timestamp, data))
}

/// Encodes a data record with an explicit checksum, valid or not.
#[must_use]
pub fn forge_dat_record_with_checksum(
    seqnum: u64,
    timestamp: u64,
    data: &[u8],
    checksum: u32,
) -> Vec<u8> {
    let record = DatRecord {
        seqnum,
        timestamp,
        data_len: data.len() as u32,
        checksum,
    };
    let total = RECORD_SIZE + data.len() + padding(data.len() as u32) as usize;
    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(&record.encode());
    bytes.extend_from_slice(data);
    bytes.resize(total, 0);
    bytes
}
