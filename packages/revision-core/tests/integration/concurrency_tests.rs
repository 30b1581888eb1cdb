//! Concurrent writers: id allocation, conflicts and version numbering.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use ntest::timeout;
use revision_core::{ConflictPolicy, Operation, RecordKey, VersionError, VersioningConfig};

use super::helpers::{engine, engine_with, record, user, LiveTable};

#[timeout(5000)]
#[test]
fn test_concurrent_begins_allocate_unique_ids() {
    let engine = Arc::new(engine());
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..50).map(|_| engine.begin().unwrap()).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(seen.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(seen.len(), 400);
}

#[timeout(5000)]
#[test]
fn test_writers_on_different_records_proceed_in_parallel() {
    let engine = Arc::new(engine());
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4i64)
        .map(|id| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let live = LiveTable::new();
                barrier.wait();
                for round in 0..20 {
                    live.write_one(&engine, "user", id, Some(user(id, &format!("v{}", round))));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for id in 0..4 {
        let numbers: Vec<u64> = engine
            .list_versions(&record("user", id))
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, (1..=20).collect::<Vec<u64>>());
    }
}

#[timeout(1000)]
#[test]
fn test_fail_fast_conflict_on_same_record() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));

    let first = engine.begin().unwrap();
    let second = engine.begin().unwrap();
    live.write(&engine, first, "user", 1, Some(user(1, "b"))).unwrap();

    let err = live
        .write(&engine, second, "user", 1, Some(user(1, "c")))
        .unwrap_err();
    assert!(matches!(
        err,
        VersionError::ConcurrentModification { holder, requester, .. }
            if holder == first.as_u64() && requester == second.as_u64()
    ));
    assert!(err.is_retryable());

    // Other records are unaffected.
    live.write(&engine, second, "user", 2, Some(user(2, "z"))).unwrap();
    live.commit(&engine, first).unwrap();
    live.commit(&engine, second).unwrap();
    assert_eq!(engine.list_versions(&record("user", 1)).unwrap().len(), 2);
}

#[timeout(5000)]
#[test]
fn test_wait_policy_serializes_same_record_writers() {
    let engine = Arc::new(engine_with(VersioningConfig {
        conflict_policy: ConflictPolicy::Wait { timeout_ms: 2000 },
        ..Default::default()
    }));
    let key = RecordKey::single(1);

    let setup = engine.begin().unwrap();
    engine
        .notify_change(setup, key.clone(), "user", Operation::Insert, None, Some(&user(1, "a")))
        .unwrap();
    engine.commit(setup).unwrap();

    let first = engine.begin().unwrap();
    engine
        .notify_change(
            first,
            key.clone(),
            "user",
            Operation::Update,
            Some(&user(1, "a")),
            Some(&user(1, "b")),
        )
        .unwrap();

    let waiter = {
        let engine = Arc::clone(&engine);
        let key = key.clone();
        thread::spawn(move || {
            let second = engine.begin().unwrap();
            engine
                .notify_change(
                    second,
                    key,
                    "user",
                    Operation::Update,
                    Some(&user(1, "b")),
                    Some(&user(1, "c")),
                )
                .unwrap();
            engine.commit(second).unwrap()
        })
    };

    thread::sleep(Duration::from_millis(50));
    let committed = engine.commit(first).unwrap();
    assert_eq!(committed[0].version_number, 2);

    let later = waiter.join().unwrap();
    assert_eq!(later[0].version_number, 3);
    assert_eq!(later[0].snapshot, user(1, "c"));
}

#[timeout(1000)]
#[test]
fn test_rollback_leaves_no_version_gap() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));

    let aborted = engine.begin().unwrap();
    live.write(&engine, aborted, "user", 1, Some(user(1, "b"))).unwrap();
    engine.rollback(aborted).unwrap();

    {
        let guard = engine.begin_guard().unwrap();
        guard
            .notify_change(
                RecordKey::single(1),
                "user",
                Operation::Update,
                Some(&user(1, "a")),
                Some(&user(1, "dropped")),
            )
            .unwrap();
        // Dropped without commit: rolled back.
    }
    assert!(engine.active_transactions().unwrap().is_empty());

    let entries = live.write_one(&engine, "user", 1, Some(user(1, "c")));
    assert_eq!(entries[0].version_number, 2);
    assert!(engine.transaction(aborted).is_err());

    let numbers: Vec<u64> = engine
        .list_versions(&record("user", 1))
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[timeout(1000)]
#[test]
fn test_guard_commit() {
    let engine = engine();
    let guard = engine.begin_guard().unwrap();
    let id = guard.id();
    guard
        .notify_change(RecordKey::single(7), "user", Operation::Insert, None, Some(&user(7, "g")))
        .unwrap();
    let entries = guard.commit().unwrap();
    assert_eq!(entries[0].transaction_id, id);
    assert_eq!(engine.latest(&record("user", 7)).unwrap().snapshot, user(7, "g"));
}

#[timeout(1000)]
#[test]
fn test_changes_after_finalize_are_rejected() {
    let engine = engine();
    let tx = engine.begin().unwrap();
    engine.rollback(tx).unwrap();
    let result = engine.notify_change(
        tx,
        RecordKey::single(1),
        "user",
        Operation::Insert,
        None,
        Some(&user(1, "late")),
    );
    assert!(matches!(
        result,
        Err(VersionError::InvalidTransactionState { .. })
    ));
}
