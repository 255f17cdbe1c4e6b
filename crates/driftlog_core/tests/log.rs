//! Integration tests for the segmented log.

use driftlog_core::{CommitLog, Config, Log, Record, DEFAULT_MAX_STORE_BYTES};
use driftlog_storage::{ENTRY_WIDTH, LEN_WIDTH};
use proptest::prelude::*;
use std::io::Read;
use std::sync::Arc;
use tempfile::tempdir;

fn payload_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..40)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn offsets_are_dense_and_reads_are_exact(payloads in payload_strategy()) {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().max_store_bytes(128).max_index_bytes(ENTRY_WIDTH * 4)).unwrap();

        for (i, value) in payloads.iter().enumerate() {
            let offset = log.append(Record::new(value.clone())).unwrap();
            prop_assert_eq!(offset, i as u64);
        }

        for (i, value) in payloads.iter().enumerate() {
            let record = log.read(i as u64).unwrap();
            prop_assert_eq!(record.offset, i as u64);
            prop_assert_eq!(&record.value, value);
        }

        let past = payloads.len() as u64;
        prop_assert_eq!(log.read(past).unwrap_err().out_of_range_offset(), Some(past));
        prop_assert_eq!(log.highest_offset().unwrap(), past - 1);
    }

    #[test]
    fn reopen_recovers_every_record(payloads in payload_strategy()) {
        let dir = tempdir().unwrap();
        let config = Config::new().max_store_bytes(96).max_index_bytes(ENTRY_WIDTH * 3);

        let log = Log::open(dir.path(), config).unwrap();
        for value in &payloads {
            log.append(Record::new(value.clone())).unwrap();
        }
        log.close().unwrap();

        let log = Log::open(dir.path(), config).unwrap();
        for (i, value) in payloads.iter().enumerate() {
            prop_assert_eq!(&log.read(i as u64).unwrap().value, value);
        }
        prop_assert_eq!(log.append(Record::new(b"next".to_vec())).unwrap(), payloads.len() as u64);
    }
}

#[test]
fn segments_stay_contiguous() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH * 2)).unwrap();
    for _ in 0..7 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }

    let segments = log.segments();
    assert!(segments.len() > 1);
    for pair in segments.windows(2) {
        assert_eq!(pair[0].next_offset, pair[1].base_offset);
    }
    assert_eq!(segments.last().unwrap().next_offset, 7);
}

#[test]
fn store_limit_triggers_rollover() {
    let dir = tempdir().unwrap();
    let record_width = LEN_WIDTH + 8 + 11;
    let log = Log::open(dir.path(), Config::new().max_store_bytes(record_width * 2)).unwrap();

    for _ in 0..3 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }

    let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset).collect();
    assert_eq!(bases, vec![0, 2]);
}

#[test]
fn truncate_then_reopen() {
    let dir = tempdir().unwrap();
    let config = Config::new().max_index_bytes(ENTRY_WIDTH);

    let log = Log::open(dir.path(), config).unwrap();
    for _ in 0..3 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }
    log.truncate(1).unwrap();
    log.close().unwrap();

    let log = Log::open(dir.path(), config).unwrap();
    assert_eq!(log.lowest_offset().unwrap(), 1);
    assert!(log.read(0).unwrap_err().is_out_of_range());
    assert_eq!(log.read(2).unwrap().offset, 2);
}

#[test]
fn reader_streams_all_segments() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH)).unwrap();
    for i in 0..3u8 {
        log.append(Record::new(vec![i; 4])).unwrap();
    }

    let mut bytes = Vec::new();
    log.reader().read_to_end(&mut bytes).unwrap();

    let mut values = Vec::new();
    let mut rest = bytes.as_slice();
    while !rest.is_empty() {
        let (len, tail) = rest.split_at(LEN_WIDTH as usize);
        let len = u64::from_be_bytes(len.try_into().unwrap()) as usize;
        let (entry, tail) = tail.split_at(len);
        values.push(Record::decode(entry).unwrap());
        rest = tail;
    }

    assert_eq!(values.len(), 3);
    for (i, record) in values.iter().enumerate() {
        assert_eq!(record.offset, i as u64);
        assert_eq!(record.value, vec![i as u8; 4]);
    }
}

#[test]
fn concurrent_appends_get_unique_offsets() {
    let dir = tempdir().unwrap();
    let log: Arc<dyn CommitLog> = Arc::new(
        Log::open(dir.path(), Config::new().max_store_bytes(DEFAULT_MAX_STORE_BYTES)).unwrap(),
    );

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let log = Arc::clone(&log);
            std::thread::spawn(move || {
                (0..25)
                    .map(|i| log.append(Record::new(vec![t, i])).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut offsets: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    offsets.sort_unstable();
    assert_eq!(offsets, (0..100).collect::<Vec<_>>());

    for offset in offsets {
        assert_eq!(log.read(offset).unwrap().offset, offset);
    }
}

#[test]
fn dropped_log_reopens_where_it_left_off() {
    let dir = tempdir().unwrap();

    let log = Log::open(dir.path(), Config::default()).unwrap();
    for _ in 0..3 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }
    drop(log);

    let log = Log::open(dir.path(), Config::default()).unwrap();
    assert_eq!(log.highest_offset().unwrap(), 2);
    for offset in 0..3 {
        assert_eq!(log.read(offset).unwrap().offset, offset);
    }
    assert_eq!(log.append(Record::new(b"next".to_vec())).unwrap(), 3);
}

#[test]
fn crashed_log_keeps_appended_records() {
    let dir = tempdir().unwrap();
    let config = Config::new().max_index_bytes(ENTRY_WIDTH * 2);

    let log = Log::open(dir.path(), config).unwrap();
    for i in 0..5u8 {
        log.append(Record::new(vec![i; 4])).unwrap();
    }
    // Skips close and every destructor, like a killed process
    std::mem::forget(log);

    let log = Log::open(dir.path(), config).unwrap();
    let bases: Vec<u64> = log.segments().iter().map(|s| s.base_offset).collect();
    assert_eq!(bases, vec![0, 2, 4]);
    assert_eq!(log.highest_offset().unwrap(), 4);
    for i in 0..5u8 {
        assert_eq!(log.read(u64::from(i)).unwrap().value, vec![i; 4]);
    }
    assert_eq!(log.append(Record::new(b"next".to_vec())).unwrap(), 5);
}

#[test]
fn failed_truncate_keeps_remaining_segments() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH * 2)).unwrap();
    for _ in 0..5 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }

    // A directory where the store file was makes its removal fail
    let store = dir.path().join("0.store");
    std::fs::remove_file(&store).unwrap();
    std::fs::create_dir(&store).unwrap();

    assert!(log.truncate(2).is_err());
    assert_eq!(log.read(2).unwrap().offset, 2);
    assert_eq!(log.read(4).unwrap().offset, 4);
    assert_eq!(log.append(Record::new(b"next".to_vec())).unwrap(), 5);
}

#[test]
fn truncate_skips_files_already_gone() {
    let dir = tempdir().unwrap();
    let log = Log::open(dir.path(), Config::new().max_index_bytes(ENTRY_WIDTH * 2)).unwrap();
    for _ in 0..5 {
        log.append(Record::new(b"hello world".to_vec())).unwrap();
    }

    std::fs::remove_file(dir.path().join("0.store")).unwrap();
    log.truncate(2).unwrap();

    assert_eq!(log.lowest_offset().unwrap(), 2);
    assert!(log.read(1).unwrap_err().is_out_of_range());
    assert_eq!(log.read(2).unwrap().offset, 2);
    assert_eq!(log.append(Record::new(b"next".to_vec())).unwrap(), 5);
}
