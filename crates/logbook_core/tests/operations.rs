//! End-to-end tests of the journal operations.

use logbook_core::{Entry, Error, Options, SearchMode};
use logbook_testkit::{append_numbered, TestJournal};

/// Timestamps grouped in runs of ten: 20..29 -> 20, 30..39 -> 30, ...
fn stepped(seqnum: u64) -> u64 {
    seqnum - (seqnum % 10)
}

#[test]
fn append_assigns_and_verifies_fields() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    // Mixed batch: explicit first entry with a far-future timestamp, then
    // system-assigned fields (auto timestamps clamp up to the last stored
    // one, so they assign exactly that value here).
    let far = 4_000_000_000_000u64;
    let mut entries = vec![
        Entry::with_fields(10, far, b"explicit".to_vec()),
        Entry::new(b"auto one".to_vec()),
        Entry::with_fields(12, 0, b"auto timestamp".to_vec()),
        Entry::with_fields(0, far + 7, b"auto seqnum".to_vec()),
    ];
    assert_eq!(journal.append(&mut entries).unwrap(), 4);

    assert_eq!(entries[1].seqnum, 11);
    assert_eq!(entries[2].seqnum, 12);
    assert_eq!(entries[3].seqnum, 13);
    assert_eq!(entries[1].timestamp, far);
    assert_eq!(entries[2].timestamp, far);

    let state = journal.state();
    assert_eq!(state.seqnum1, 10);
    assert_eq!(state.timestamp1, far);
    assert_eq!(state.seqnum2, 13);
    assert_eq!(state.timestamp2, far + 7);
}

#[test]
fn append_empty_batch_is_a_noop() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    assert_eq!(journal.append(&mut []).unwrap(), 0);
    assert!(journal.state().is_empty());
}

#[test]
fn append_rejects_gaps_and_time_regressions() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    journal
        .append(&mut [Entry::with_fields(5, 100, vec![1])])
        .unwrap();

    let err = journal
        .append(&mut [Entry::with_fields(7, 101, vec![2])])
        .unwrap_err();
    assert_eq!(err.source, Error::BrokenSequence);
    assert_eq!(err.written, 0);

    let err = journal
        .append(&mut [Entry::with_fields(6, 99, vec![2])])
        .unwrap_err();
    assert_eq!(err.source, Error::InvalidTimestamp);

    // Equal timestamps are legitimate.
    assert_eq!(
        journal
            .append(&mut [Entry::with_fields(6, 100, vec![2])])
            .unwrap(),
        1
    );
}

#[test]
fn auto_timestamps_never_regress() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    // A stored timestamp far in the future: auto-assignment must not go
    // below it even though the wall clock is behind.
    let future = u64::MAX / 2;
    journal
        .append(&mut [Entry::with_fields(1, future, vec![])])
        .unwrap();

    let mut entries = vec![Entry::new(vec![])];
    journal.append(&mut entries).unwrap();
    assert_eq!(entries[0].timestamp, future);
}

#[test]
fn stats_over_the_full_range() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);

    let stats = journal.stats(0, 10_000_000).unwrap();
    assert_eq!(stats.min_seqnum, 20);
    assert_eq!(stats.max_seqnum, 314);
    assert_eq!(stats.min_timestamp, 20);
    assert_eq!(stats.max_timestamp, 310);
    assert_eq!(stats.num_entries, 295);
    assert_eq!(stats.index_size, 295 * 24);
    // Every entry is a 24-byte envelope plus an 8-byte payload.
    assert_eq!(stats.data_size, 295 * 32);
}

#[test]
fn stats_clamps_and_handles_disjoint_ranges() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=40, stepped);

    let stats = journal.stats(25, 30).unwrap();
    assert_eq!(stats.min_seqnum, 25);
    assert_eq!(stats.max_seqnum, 30);
    assert_eq!(stats.num_entries, 6);

    // Disjoint ranges are not an error, they are empty.
    let empty = journal.stats(100, 200).unwrap();
    assert_eq!(empty.num_entries, 0);
    assert_eq!(empty.data_size, 0);

    assert_eq!(journal.stats(30, 25).unwrap_err(), Error::InvalidArgument);
}

#[test]
fn search_lower_and_upper() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);

    assert_eq!(journal.search(25, SearchMode::Lower).unwrap(), 30);
    assert_eq!(journal.search(25, SearchMode::Upper).unwrap(), 30);
    assert_eq!(journal.search(30, SearchMode::Lower).unwrap(), 30);
    assert_eq!(journal.search(30, SearchMode::Upper).unwrap(), 40);
    assert_eq!(
        journal.search(311, SearchMode::Lower).unwrap_err(),
        Error::NotFound
    );

    // Below the first timestamp both modes land on the first entry.
    assert_eq!(journal.search(0, SearchMode::Lower).unwrap(), 20);
    assert_eq!(journal.search(0, SearchMode::Upper).unwrap(), 20);
    assert_eq!(journal.search(20, SearchMode::Lower).unwrap(), 20);

    // At the last timestamp only LOWER can answer.
    assert_eq!(journal.search(310, SearchMode::Lower).unwrap(), 310);
    assert_eq!(
        journal.search(310, SearchMode::Upper).unwrap_err(),
        Error::NotFound
    );
}

#[test]
fn search_with_constant_timestamps() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 1..=50, |_| 7);

    assert_eq!(journal.search(7, SearchMode::Lower).unwrap(), 1);
    assert_eq!(journal.search(6, SearchMode::Upper).unwrap(), 1);
    assert_eq!(
        journal.search(7, SearchMode::Upper).unwrap_err(),
        Error::NotFound
    );
    assert_eq!(
        journal.search(8, SearchMode::Lower).unwrap_err(),
        Error::NotFound
    );
}

#[test]
fn search_empty_journal() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    assert_eq!(
        journal.search(1, SearchMode::Lower).unwrap_err(),
        Error::NotFound
    );
}

#[test]
fn buffered_read_zero_copy() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    let mut entries = vec![
        Entry::with_fields(1, 1, vec![0xA1; 5]),
        Entry::with_fields(2, 2, vec![0xB2; 16]),
        Entry::with_fields(3, 3, vec![0xC3; 7]),
    ];
    journal.append(&mut entries).unwrap();

    // Stored sizes: 32 (5 + 3 pad), 40, 32 (7 + 1 pad).
    let mut buf = vec![0u8; 104];
    let views = journal.read_buffered(1, 3, &mut buf).unwrap();
    assert_eq!(views.len(), 3);
    assert!(views.iter().all(|v| v.is_complete()));
    assert_eq!(views[0].data.unwrap(), &[0xA1; 5][..]);
    assert_eq!(views[1].data.unwrap(), &[0xB2; 16][..]);
    assert_eq!(views[2].data.unwrap(), &[0xC3; 7][..]);
    assert_eq!(views[2].seqnum, 3);

    // Bounded by the end slot when the range is fully indexed.
    let mut buf = vec![0u8; 4096];
    let views = journal.read_buffered(1, 2, &mut buf).unwrap();
    assert_eq!(views.len(), 2);

    // Reading past the tail stops at the last entry.
    let mut buf = vec![0u8; 4096];
    let views = journal.read_buffered(3, 10, &mut buf).unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].seqnum, 3);
}

#[test]
fn buffered_read_signals_small_buffers() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    let mut entries = vec![
        Entry::with_fields(1, 1, vec![0xA1; 5]),
        Entry::with_fields(2, 2, vec![0xB2; 16]),
        Entry::with_fields(3, 3, vec![0xC3; 7]),
    ];
    journal.append(&mut entries).unwrap();

    // The second envelope fits but its payload does not: the trailing
    // view carries the header so the caller can size a retry.
    let mut buf = vec![0u8; 61];
    let views = journal.read_buffered(1, 3, &mut buf).unwrap();
    assert_eq!(views.len(), 2);
    assert!(views[0].is_complete());
    let partial = &views[1];
    assert!(!partial.is_complete());
    assert_eq!(partial.seqnum, 2);
    assert_eq!(partial.data_len, 16);

    // The read ends mid-envelope: the previous entry is surrendered too.
    let mut buf = vec![0u8; 42];
    let views = journal.read_buffered(1, 3, &mut buf).unwrap();
    assert_eq!(views.len(), 1);
    assert!(!views[0].is_complete());
    assert_eq!(views[0].seqnum, 1);

    // A buffer smaller than one envelope is a caller bug.
    let mut buf = vec![0u8; 16];
    assert_eq!(
        journal.read_buffered(1, 1, &mut buf).unwrap_err(),
        Error::InvalidArgument
    );
}

#[test]
fn rollback_removes_the_tail() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);

    assert_eq!(journal.rollback(100).unwrap(), 214);

    let state = journal.state();
    assert_eq!(state.seqnum1, 20);
    assert_eq!(state.timestamp1, 20);
    assert_eq!(state.seqnum2, 100);
    assert_eq!(state.timestamp2, 100);

    assert_eq!(journal.read(101, 1).unwrap_err(), Error::NotFound);
    assert_eq!(journal.read(100, 1).unwrap()[0].seqnum, 100);

    // The next append continues right after the new tail.
    let mut entries = vec![Entry::new(vec![9])];
    journal.append(&mut entries).unwrap();
    assert_eq!(entries[0].seqnum, 101);
    assert!(entries[0].timestamp >= 100);
}

#[test]
fn rollback_edge_cases() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    // Empty journal: nothing to remove.
    assert_eq!(journal.rollback(0).unwrap(), 0);

    append_numbered(&journal, 10..=19, |sn| sn);

    // At or past the tail: no-op.
    assert_eq!(journal.rollback(19).unwrap(), 0);
    assert_eq!(journal.rollback(500).unwrap(), 0);

    // Below the first seqnum: removes everything.
    assert_eq!(journal.rollback(3).unwrap(), 10);
    assert!(journal.state().is_empty());
    assert_eq!(journal.read(10, 1).unwrap_err(), Error::NotFound);

    // The journal is usable again, from any starting seqnum.
    journal
        .append(&mut [Entry::with_fields(77, 1, vec![])])
        .unwrap();
    assert_eq!(journal.state().seqnum1, 77);
}

#[test]
fn rollback_survives_reopen() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);
    journal.rollback(100).unwrap();
    journal.close().unwrap();

    let journal = fixture.open_checked();
    let state = journal.state();
    assert_eq!(state.seqnum2, 100);
    assert_eq!(state.timestamp2, 100);
}

#[test]
fn purge_removes_the_head() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);

    assert_eq!(journal.purge(100).unwrap(), 80);

    let state = journal.state();
    assert_eq!(state.seqnum1, 100);
    assert_eq!(state.timestamp1, 100);
    assert_eq!(state.seqnum2, 314);
    assert_eq!(state.timestamp2, 310);

    assert_eq!(journal.read(99, 1).unwrap_err(), Error::NotFound);
    let read = journal.read(101, 1).unwrap();
    assert_eq!(read[0].seqnum, 101);
    assert_eq!(read[0].data, 101u64.to_le_bytes().to_vec());

    // The temp file does not outlive the operation.
    assert!(!fixture.dir.path().join("test.tmp").exists());
}

#[test]
fn purge_survives_reopen_with_check() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 20..=314, stepped);
    journal.purge(100).unwrap();
    journal.close().unwrap();

    let journal = fixture.open_checked();
    let state = journal.state();
    assert_eq!(state.seqnum1, 100);
    assert_eq!(state.seqnum2, 314);
    assert!(journal.read(101, 1).is_ok());
}

#[test]
fn purge_edge_cases() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    assert_eq!(journal.purge(10).unwrap(), 0);

    append_numbered(&journal, 10..=19, |sn| sn);

    // At or below the first seqnum: no-op.
    assert_eq!(journal.purge(10).unwrap(), 0);
    assert_eq!(journal.purge(5).unwrap(), 0);
    assert_eq!(journal.state().seqnum1, 10);
}

#[test]
fn purge_past_the_tail_removes_everything() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();
    append_numbered(&journal, 10..=19, |sn| sn);

    assert_eq!(journal.purge(1000).unwrap(), 10);
    assert!(journal.state().is_empty());

    // Fresh files: the journal accepts a new first seqnum.
    journal
        .append(&mut [Entry::with_fields(1, 1, vec![])])
        .unwrap();
    assert_eq!(journal.state().seqnum1, 1);
}

#[test]
fn second_open_fails_with_lock_error() {
    let fixture = TestJournal::new();
    let journal = fixture.open_checked();

    assert_eq!(
        fixture.open(Options::new()).unwrap_err(),
        Error::Lock
    );

    journal.close().unwrap();
    let journal = fixture.open_checked();
    drop(journal);
}

#[test]
fn fsync_mode_round_trips() {
    let fixture = TestJournal::new();
    let journal = fixture.open(Options::new().fsync(true)).unwrap();

    append_numbered(&journal, 1..=5, |sn| sn);
    journal.set_fsync(false);
    append_numbered(&journal, 6..=10, |sn| sn);
    journal.set_fsync(true);
    assert_eq!(journal.rollback(8).unwrap(), 2);

    assert_eq!(journal.state().seqnum2, 8);
}

#[test]
fn readers_proceed_while_the_writer_appends() {
    let fixture = TestJournal::new();
    let journal = std::sync::Arc::new(fixture.open_checked());
    append_numbered(&journal, 1..=50, |sn| sn);

    let reader = {
        let journal = std::sync::Arc::clone(&journal);
        std::thread::spawn(move || {
            for _ in 0..500 {
                let state = journal.state();
                if state.seqnum2 != 0 {
                    let entries = journal.read(state.seqnum2, 1).unwrap();
                    assert_eq!(entries[0].seqnum, state.seqnum2);
                    assert!(journal.search(25, SearchMode::Lower).unwrap() <= state.seqnum2);
                    assert!(journal.stats(1, state.seqnum2).unwrap().num_entries > 0);
                }
            }
        })
    };

    for sn in 51..=150 {
        journal
            .append(&mut [Entry::with_fields(sn, sn, vec![0u8; 16])])
            .unwrap();
    }

    reader.join().unwrap();
    assert_eq!(journal.state().seqnum2, 150);
}

#[test]
fn version_and_strerror() {
    assert!(!logbook_core::version().is_empty());
    assert_eq!(logbook_core::strerror(0), "Success");
    assert_eq!(
        logbook_core::strerror(Error::NotFound.code()),
        "No results"
    );
}
