//! Property-based test generators.

use logbook_core::Entry;
use proptest::prelude::*;

/// Strategy for valid journal names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9_]{1,32}").expect("invalid regex")
}

/// Strategy for entry payloads.
pub fn payload_strategy(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Strategy for a batch of appendable entries.
///
/// Timestamps are built from non-negative increments so they are
/// non-decreasing, which is what the engine requires; seqnums are left at
/// 0 for the engine to assign.
pub fn batch_strategy(max_entries: usize, max_payload: usize) -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(
        (0u64..1_000, payload_strategy(max_payload)),
        1..=max_entries,
    )
    .prop_map(|parts| {
        let mut timestamp = 1u64;
        parts
            .into_iter()
            .map(|(delta, data)| {
                timestamp += delta;
                Entry::with_fields(0, timestamp, data)
            })
            .collect()
    })
}

/// Strategy for a first seqnum: journals may start anywhere except 0.
pub fn first_seqnum_strategy() -> impl Strategy<Value = u64> {
    1u64..1_000_000
}
