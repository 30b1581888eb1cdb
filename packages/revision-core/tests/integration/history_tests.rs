//! End-to-end history scenarios.

use std::collections::BTreeMap;

use ntest::timeout;
use revision_core::transaction::ChangeOutcome;
use revision_core::{
    FieldValue, Operation, RecordKey, RevertAction, TransactionId, VersionError, VersioningConfig,
};

use super::helpers::{engine, engine_with, record, snapshot, user, LiveTable};

/// insert → unchanged update → update → delete → revert to version 1.
#[timeout(1000)]
#[test]
fn test_record_lifecycle_and_resurrection() {
    let engine = engine();
    let live = LiveTable::new();
    let a = record("user", 1);

    let tx1 = engine.begin().unwrap();
    live.write(&engine, tx1, "user", 1, Some(user(1, "x"))).unwrap();
    let v1 = live.commit(&engine, tx1).unwrap();
    assert_eq!(v1.len(), 1);
    assert_eq!(v1[0].version_number, 1);
    assert_eq!(v1[0].operation, Operation::Insert);

    let tx2 = engine.begin().unwrap();
    let outcome = live.write(&engine, tx2, "user", 1, Some(user(1, "x"))).unwrap();
    assert_eq!(outcome, ChangeOutcome::Suppressed);
    assert!(live.commit(&engine, tx2).unwrap().is_empty());
    assert_eq!(engine.latest(&a).unwrap().version_number, 1);

    let tx3 = engine.begin().unwrap();
    live.write(&engine, tx3, "user", 1, Some(user(1, "y"))).unwrap();
    let v2 = live.commit(&engine, tx3).unwrap();
    assert_eq!(v2[0].version_number, 2);
    assert_eq!(v2[0].operation, Operation::Update);
    let changes = engine.changes_in(tx3).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field_names(), vec!["name"]);
    let name = changes[0].field("name").unwrap();
    assert_eq!(name.old, Some(FieldValue::from("x")));
    assert_eq!(name.new, Some(FieldValue::from("y")));

    let tx4 = engine.begin().unwrap();
    live.write(&engine, tx4, "user", 1, None).unwrap();
    let v3 = live.commit(&engine, tx4).unwrap();
    assert_eq!(v3[0].version_number, 3);
    assert_eq!(v3[0].operation, Operation::Delete);
    assert_eq!(v3[0].snapshot.get("name"), Some(&FieldValue::from("y")));
    assert!(live.get(&a).is_none());

    let plan = engine.revert(&a, 1, false).unwrap();
    assert_eq!(plan.records.len(), 1);
    assert_eq!(plan.records[0].action, RevertAction::Resurrect);
    assert_eq!(plan.records[0].snapshot, user(1, "x"));

    let applied = engine
        .apply_revert(&plan, Some("admin"), |batch| {
            live.apply(batch);
            Ok::<(), VersionError>(())
        })
        .unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].operation, Operation::Insert);
    assert_eq!(applied[0].version_number, 4);
    assert_eq!(live.get(&a), Some(user(1, "x")));

    let numbers: Vec<u64> = engine
        .list_versions(&a)
        .unwrap()
        .iter()
        .map(|v| v.version_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

#[timeout(1000)]
#[test]
fn test_excluded_fields_never_version() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "x")));

    let mut touched = user(1, "x");
    touched.insert("last_seen".to_string(), FieldValue::Int(1_700_000_000));
    let tx = engine.begin().unwrap();
    let outcome = live.write(&engine, tx, "user", 1, Some(touched)).unwrap();
    assert_eq!(outcome, ChangeOutcome::Suppressed);
    assert!(live.commit(&engine, tx).unwrap().is_empty());

    let history = engine.list_versions(&record("user", 1)).unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].snapshot.contains_key("last_seen"));
}

#[timeout(1000)]
#[test]
fn test_same_record_changes_coalesce_within_transaction() {
    let engine = engine();
    let tx = engine.begin().unwrap();
    let key = RecordKey::single(1);

    engine
        .notify_change(tx, key.clone(), "user", Operation::Insert, None, Some(&user(1, "a")))
        .unwrap();
    let outcome = engine
        .notify_change(
            tx,
            key.clone(),
            "user",
            Operation::Update,
            Some(&user(1, "a")),
            Some(&user(1, "b")),
        )
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Coalesced);

    let entries = engine.commit(tx).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, Operation::Insert);
    assert_eq!(entries[0].snapshot, user(1, "b"));
}

#[timeout(1000)]
#[test]
fn test_insert_after_round_trip_update_is_rejected() {
    let engine = engine();
    let key = RecordKey::single(1);
    let setup = engine.begin().unwrap();
    engine
        .notify_change(setup, key.clone(), "user", Operation::Insert, None, Some(&user(1, "a")))
        .unwrap();
    engine.commit(setup).unwrap();

    let tx = engine.begin().unwrap();
    engine
        .notify_change(
            tx,
            key.clone(),
            "user",
            Operation::Update,
            Some(&user(1, "a")),
            Some(&user(1, "b")),
        )
        .unwrap();
    let outcome = engine
        .notify_change(
            tx,
            key.clone(),
            "user",
            Operation::Update,
            Some(&user(1, "b")),
            Some(&user(1, "a")),
        )
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Suppressed);

    let result =
        engine.notify_change(tx, key, "user", Operation::Insert, None, Some(&user(1, "c")));
    assert!(matches!(result, Err(VersionError::InvalidChange { .. })));

    assert!(engine.commit(tx).unwrap().is_empty());
    assert_eq!(engine.list_versions(&record("user", 1)).unwrap().len(), 1);
}

#[timeout(1000)]
#[test]
fn test_insert_then_delete_in_one_transaction_leaves_no_trace() {
    let engine = engine();
    let tx = engine.begin().unwrap();
    let key = RecordKey::single(1);
    engine
        .notify_change(tx, key.clone(), "user", Operation::Insert, None, Some(&user(1, "a")))
        .unwrap();
    engine
        .notify_change(tx, key, "user", Operation::Delete, Some(&user(1, "a")), None)
        .unwrap();

    assert!(engine.commit(tx).unwrap().is_empty());
    assert!(matches!(
        engine.list_versions(&record("user", 1)),
        Err(VersionError::UnknownRecord { .. })
    ));
    assert!(engine.transaction(tx).is_err());
}

#[timeout(1000)]
#[test]
fn test_empty_transactions_recorded_when_configured() {
    let engine = engine_with(VersioningConfig {
        record_empty_transactions: true,
        ..Default::default()
    });
    let tx = engine.begin().unwrap();
    engine
        .set_context(tx, Some("cron"), BTreeMap::new())
        .unwrap();
    assert!(engine.commit(tx).unwrap().is_empty());

    let row = engine.transaction(tx).unwrap();
    assert_eq!(row.actor.as_deref(), Some("cron"));
    assert!(engine.list_changes(tx).unwrap().is_empty());
    assert!(engine.changed_types(tx).unwrap().is_empty());
}

#[timeout(1000)]
#[test]
fn test_transaction_log_records_actor_and_context() {
    let engine = engine();
    let live = LiveTable::new();

    let tx = engine.begin().unwrap();
    let mut context = BTreeMap::new();
    context.insert("request".to_string(), serde_json::json!("r-17"));
    engine.set_context(tx, Some("alice"), context).unwrap();
    live.write(&engine, tx, "user", 1, Some(user(1, "a"))).unwrap();
    live.write(
        &engine,
        tx,
        "author",
        1,
        Some(snapshot(&[("id", FieldValue::Int(1)), ("name", FieldValue::from("ann"))])),
    )
    .unwrap();
    live.commit(&engine, tx).unwrap();

    let row = engine.transaction(tx).unwrap();
    assert_eq!(row.actor.as_deref(), Some("alice"));
    assert_eq!(row.context.get("request"), Some(&serde_json::json!("r-17")));
    assert_eq!(engine.changed_types(tx).unwrap(), vec!["author", "user"]);
    assert_eq!(engine.transactions_by_actor("alice").len(), 1);
    assert!(engine.transactions_by_actor("bob").is_empty());
}

#[timeout(1000)]
#[test]
fn test_commit_twice_and_unknown_ids_fail() {
    let engine = engine();
    let tx = engine.begin().unwrap();
    engine.commit(tx).unwrap();

    assert!(matches!(
        engine.commit(tx),
        Err(VersionError::InvalidTransactionState { .. })
    ));
    assert!(matches!(
        engine.rollback(tx),
        Err(VersionError::InvalidTransactionState { .. })
    ));
    assert!(matches!(
        engine.commit(TransactionId(999)),
        Err(VersionError::InvalidTransactionState { transaction_id: 999, .. })
    ));
}

#[timeout(1000)]
#[test]
fn test_disabled_engine_ignores_changes() {
    let engine = engine_with(VersioningConfig {
        enabled: false,
        ..Default::default()
    });
    let tx = engine.begin().unwrap();
    let outcome = engine
        .notify_change(tx, RecordKey::single(1), "user", Operation::Insert, None, Some(&user(1, "a")))
        .unwrap();
    assert_eq!(outcome, ChangeOutcome::Disabled);
    assert!(engine.commit(tx).unwrap().is_empty());
    assert!(engine.transactions().is_empty());
}

#[timeout(1000)]
#[test]
fn test_version_navigation() {
    let engine = engine();
    let live = LiveTable::new();
    let a = record("user", 1);
    live.write_one(&engine, "user", 1, Some(user(1, "a")));
    live.write_one(&engine, "user", 1, Some(user(1, "b")));
    live.write_one(&engine, "user", 1, Some(user(1, "c")));

    assert!(engine.previous(&a, 1).unwrap().is_none());
    assert_eq!(engine.previous(&a, 3).unwrap().unwrap().version_number, 2);
    assert_eq!(engine.next(&a, 1).unwrap().unwrap().version_number, 2);
    assert!(engine.next(&a, 3).unwrap().is_none());

    let at_second = engine.version_at(&a, TransactionId(2)).unwrap().unwrap();
    assert_eq!(at_second.snapshot, user(1, "b"));

    let diff = engine.diff_versions(&a, 1, 3).unwrap();
    assert_eq!(diff.field("name").unwrap().new, Some(FieldValue::from("c")));
    assert_eq!(engine.diff_versions(&a, 3, 1).unwrap(), diff.inverted());
}

#[timeout(1000)]
#[test]
fn test_failed_host_write_rolls_back() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));

    let tx = engine.begin().unwrap();
    live.write(&engine, tx, "user", 1, Some(user(1, "b"))).unwrap();
    let result = engine.commit_with(tx, |_| Err("constraint violated"));
    assert!(matches!(result, Err(VersionError::Storage(ref m)) if m == "constraint violated"));

    assert_eq!(engine.list_versions(&record("user", 1)).unwrap().len(), 1);
    assert!(engine.transaction(tx).is_err());
    assert!(engine.active_transactions().unwrap().is_empty());

    // The claim was released: another transaction can write the record.
    let retry = engine.begin().unwrap();
    live.write(&engine, retry, "user", 1, Some(user(1, "b"))).unwrap();
    let entries = live.commit(&engine, retry).unwrap();
    assert_eq!(entries[0].version_number, 2);
}
