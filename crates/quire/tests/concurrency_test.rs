//! Reader/writer exclusion and optimistic concurrency under real threads
//!
//! Each aggregate admits up to `max_readers` concurrent readers or a single
//! writer. These tests hold streams open to pin read permits and use short
//! lock timeouts to observe blocking without hanging the suite.

use quire::prelude::*;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const SHORT_TIMEOUT: Duration = Duration::from_millis(100);

fn config(temp_dir: &TempDir) -> StoreConfig {
    StoreConfig::new(temp_dir.path()).with_sync_mode(SyncMode::None)
}

fn record(i: u64) -> EventRecord {
    EventRecord::new("Ticked", SchemaVersion::new(1, 0), json!({ "i": i }))
}

fn seeded(store: &FileEventStore, count: u64) -> AggregateId {
    let id = AggregateId::new();
    store
        .append(AppendRequest::new(id, 0, (0..count).map(record).collect()))
        .unwrap();
    id
}

fn is_timeout<T>(result: &Result<T>) -> bool {
    matches!(result, Err(QuireError::LockTimeout { .. }))
}

#[test]
fn test_readers_up_to_limit_do_not_block() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileEventStore::open(
        config(&temp_dir)
            .with_max_readers(3)
            .with_lock_timeout(SHORT_TIMEOUT),
    )
    .unwrap();
    let id = seeded(&store, 2);

    let streams: Vec<_> = (0..3).map(|_| store.read_all(&id).unwrap()).collect();
    assert_eq!(store.lock_manager().available_permits(&id), 0);

    // The fourth reader has to wait and gives up at the timeout.
    assert!(is_timeout(&store.read_all(&id)));

    let mut streams = streams.into_iter();
    drop(streams.next());
    assert_eq!(store.read_all(&id).unwrap().count(), 2);

    for stream in streams {
        assert_eq!(stream.count(), 2);
    }
    assert_eq!(store.lock_manager().available_permits(&id), 3);
}

#[test]
fn test_blocked_reader_proceeds_when_a_permit_returns() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileEventStore::open(config(&temp_dir).with_max_readers(1)).unwrap());
    let id = seeded(&store, 1);

    let held = store.read_all(&id).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let handle = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            let count = store.read_all(&id).unwrap().count();
            done_tx.send(count).unwrap();
        })
    };

    assert!(done_rx.recv_timeout(SHORT_TIMEOUT).is_err());
    drop(held);
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
    handle.join().unwrap();
}

#[test]
fn test_writer_waits_for_readers() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileEventStore::open(config(&temp_dir).with_lock_timeout(SHORT_TIMEOUT)).unwrap();
    let id = seeded(&store, 2);
    let path = store.paths().resolve(&id);
    let before = std::fs::read(&path).unwrap();

    let reader = store.read_all(&id).unwrap();
    let result = store.append(AppendRequest::new(id, 2, vec![record(2)]));
    assert!(is_timeout(&result));
    assert_eq!(std::fs::read(&path).unwrap(), before);

    // A timed-out writer gives back the permits it had already drained.
    assert_eq!(
        store.lock_manager().available_permits(&id),
        store.lock_manager().max_readers() - 1
    );

    drop(reader);
    assert_eq!(store.append(AppendRequest::new(id, 2, vec![record(2)])).unwrap(), 3);
}

#[test]
fn test_writer_excludes_new_readers() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileEventStore::open(config(&temp_dir).with_lock_timeout(SHORT_TIMEOUT)).unwrap();
    let id = seeded(&store, 1);

    let writer = store.lock_manager().acquire_write(&id).unwrap();
    assert!(is_timeout(&store.read_all(&id)));
    assert!(is_timeout(&store.current_version(&id)));
    assert!(is_timeout(&store.append(AppendRequest::new(id, 1, vec![record(1)]))));

    writer.release();
    assert_eq!(store.read_all(&id).unwrap().count(), 1);
}

#[test]
fn test_aggregates_lock_independently() {
    let temp_dir = TempDir::new().unwrap();
    let store = FileEventStore::open(config(&temp_dir).with_lock_timeout(SHORT_TIMEOUT)).unwrap();
    let busy = seeded(&store, 1);
    let idle = seeded(&store, 1);

    let _writer = store.lock_manager().acquire_write(&busy).unwrap();
    assert_eq!(store.read_all(&idle).unwrap().count(), 1);
    assert_eq!(store.append(AppendRequest::new(idle, 1, vec![record(1)])).unwrap(), 2);
}

#[test]
fn test_racing_writers_exactly_one_wins() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileEventStore::open(config(&temp_dir)).unwrap());
    let id = seeded(&store, 3);

    let num_writers = 8;
    let barrier = Arc::new(Barrier::new(num_writers));
    let handles: Vec<_> = (0..num_writers)
        .map(|w| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.append(AppendRequest::new(id, 3, vec![record(100 + w as u64)]))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_conflict()))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(conflicts, num_writers - 1);
    assert_eq!(store.current_version(&id).unwrap(), 4);
}

#[test]
fn test_retrying_writers_lose_no_updates() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileEventStore::open(config(&temp_dir)).unwrap());
    let id = AggregateId::new();

    let num_writers = 6;
    let appends_per_writer = 10;
    let conflicts = Arc::new(AtomicU64::new(0));
    let barrier = Arc::new(Barrier::new(num_writers));

    let handles: Vec<_> = (0..num_writers)
        .map(|w| {
            let store = Arc::clone(&store);
            let conflicts = Arc::clone(&conflicts);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..appends_per_writer {
                    loop {
                        let seen = store.current_version(&id).unwrap();
                        let event = EventRecord::new(
                            "Incremented",
                            SchemaVersion::new(1, 0),
                            json!({ "writer": w, "n": n }),
                        );
                        match store.append(AppendRequest::new(id, seen, vec![event])) {
                            Ok(_) => break,
                            Err(e) if e.is_conflict() => {
                                conflicts.fetch_add(1, Ordering::Relaxed);
                            }
                            Err(e) => panic!("append failed: {}", e),
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let total = (num_writers * appends_per_writer) as u64;
    assert_eq!(store.current_version(&id).unwrap(), total);

    let events: Vec<StoredEvent> = store
        .read_all(&id)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(events.len() as u64, total);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64);
    }

    // Each writer's own events keep their order.
    for w in 0..num_writers {
        let ns: Vec<u64> = events
            .iter()
            .filter(|e| e.record.payload["writer"] == json!(w))
            .map(|e| e.record.payload["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, (0..appends_per_writer as u64).collect::<Vec<_>>());
    }
}

#[test]
fn test_readers_during_appends_see_committed_prefixes() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileEventStore::open(config(&temp_dir)).unwrap());
    let id = seeded(&store, 1);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for v in 1..40u64 {
                store.append(AppendRequest::new(id, v, vec![record(v)])).unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..20 {
                    let events: Vec<StoredEvent> = store
                        .read_all(&id)
                        .unwrap()
                        .collect::<Result<_>>()
                        .unwrap();
                    assert!(!events.is_empty());
                    for (i, event) in events.iter().enumerate() {
                        assert_eq!(event.sequence, i as u64);
                        assert_eq!(event.record.payload["i"], json!(i));
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.current_version(&id).unwrap(), 40);
}

#[test]
fn test_separate_stores_on_one_root_exclude_each_other() {
    let temp_dir = TempDir::new().unwrap();
    // Two independently opened stores stand in for two processes.
    let first = FileEventStore::open(config(&temp_dir)).unwrap();
    let second = FileEventStore::open(config(&temp_dir).with_lock_timeout(SHORT_TIMEOUT)).unwrap();
    let id = seeded(&first, 2);

    let reader = first.read_all(&id).unwrap();
    assert!(is_timeout(&second.append(AppendRequest::new(id, 2, vec![record(2)]))));
    // Shared file locks admit readers from both sides.
    assert_eq!(second.read_all(&id).unwrap().count(), 2);

    drop(reader);
    assert_eq!(second.append(AppendRequest::new(id, 2, vec![record(2)])).unwrap(), 3);
    assert!(first
        .append(AppendRequest::new(id, 2, vec![record(2)]))
        .unwrap_err()
        .is_conflict());
}
