//! Revert planning and application through the engine.

use std::convert::Infallible;

use ntest::timeout;
use revision_core::{diff, CancelFlag, RevertAction, TransactionId, VersionError};

use super::helpers::{article, author, comment, engine, node, record, user, LiveTable};

fn apply(
    engine: &revision_core::VersioningEngine,
    live: &LiveTable,
    plan: &revision_core::RevertPlan,
) -> Vec<revision_core::VersionEntry> {
    engine
        .apply_revert(plan, Some("reverter"), |batch| {
            live.apply(batch);
            Ok::<(), Infallible>(())
        })
        .unwrap()
}

#[timeout(1000)]
#[test]
fn test_revert_to_current_version_is_noop() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));
    live.write_one(&engine, "user", 1, Some(user(1, "b")));

    let plan = engine.revert(&record("user", 1), 2, false).unwrap();
    assert!(plan.is_noop());

    let applied = apply(&engine, &live, &plan);
    assert!(applied.is_empty());
    assert_eq!(engine.list_versions(&record("user", 1)).unwrap().len(), 2);
}

#[timeout(1000)]
#[test]
fn test_revert_round_trip_leaves_empty_diff() {
    let engine = engine();
    let live = LiveTable::new();
    let a = record("user", 1);
    live.write_one(&engine, "user", 1, Some(user(1, "a")));
    live.write_one(&engine, "user", 1, Some(user(1, "b")));
    live.write_one(&engine, "user", 1, Some(user(1, "c")));

    let plan = engine.revert(&a, 1, false).unwrap();
    assert_eq!(plan.records[0].action, RevertAction::Restore);
    let applied = apply(&engine, &live, &plan);
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].version_number, 4);

    let target = engine.get_version(&a, 1).unwrap();
    let current = live.get(&a).unwrap();
    assert!(diff(&current, &target.snapshot).is_empty());
    assert!(engine.diff_versions(&a, 1, 4).unwrap().is_empty());

    // The reverting transaction is attributed.
    let row = engine.transaction(applied[0].transaction_id).unwrap();
    assert_eq!(row.actor.as_deref(), Some("reverter"));
    assert_eq!(
        row.context.get("revert_of"),
        Some(&serde_json::json!("user(1)"))
    );
}

/// article updated in tx 5, its author updated later in tx 6.
#[timeout(1000)]
#[test]
fn test_cascade_uses_related_version_at_cutoff() {
    let engine = engine();
    let live = LiveTable::new();
    let a = record("article", 1);
    let b = record("author", 1);

    live.write_one(&engine, "author", 1, Some(author(1, "ann"))); // tx 1
    live.write_one(&engine, "article", 1, Some(article(1, "draft", 1))); // tx 2
    live.write_one(&engine, "author", 1, Some(author(1, "anne"))); // tx 3
    live.write_one(&engine, "article", 1, Some(article(1, "second", 1))); // tx 4
    live.write_one(&engine, "article", 1, Some(article(1, "final", 1))); // tx 5
    live.write_one(&engine, "author", 1, Some(author(1, "annie"))); // tx 6

    let target = engine.version_at(&a, TransactionId(5)).unwrap().unwrap();
    assert_eq!(target.transaction_id, TransactionId(5));

    live.write_one(&engine, "article", 1, Some(article(1, "edited", 1))); // tx 7

    let plan = engine.revert(&a, target.version_number, true).unwrap();
    assert_eq!(plan.cutoff, TransactionId(5));

    let related = plan.get(&b).unwrap();
    assert_eq!(related.target_version, 2);
    assert_eq!(related.snapshot, author(1, "anne"));

    apply(&engine, &live, &plan);
    assert_eq!(live.get(&a), Some(article(1, "final", 1)));
    assert_eq!(live.get(&b), Some(author(1, "anne")));
}

#[timeout(1000)]
#[test]
fn test_cyclic_cascade_visits_each_record_once() {
    let engine = engine();
    let live = LiveTable::new();

    let tx = engine.begin().unwrap();
    live.write(&engine, tx, "node", 1, Some(node(1, "a", Some(2)))).unwrap();
    live.write(&engine, tx, "node", 2, Some(node(2, "b", Some(1)))).unwrap();
    live.commit(&engine, tx).unwrap();

    let tx = engine.begin().unwrap();
    live.write(&engine, tx, "node", 1, Some(node(1, "a2", Some(2)))).unwrap();
    live.write(&engine, tx, "node", 2, Some(node(2, "b2", Some(1)))).unwrap();
    live.commit(&engine, tx).unwrap();

    let plan = engine.revert(&record("node", 1), 1, true).unwrap();
    let visited: Vec<_> = plan.records.iter().map(|r| r.record.clone()).collect();
    assert_eq!(visited, vec![record("node", 1), record("node", 2)]);

    let applied = apply(&engine, &live, &plan);
    assert_eq!(applied.len(), 2);
    assert_eq!(live.get(&record("node", 2)), Some(node(2, "b", Some(1))));
}

#[timeout(1000)]
#[test]
fn test_cascade_resurrects_deleted_children() {
    let engine = engine();
    let live = LiveTable::new();

    let tx = engine.begin().unwrap();
    live.write(&engine, tx, "author", 1, Some(author(1, "ann"))).unwrap();
    live.write(&engine, tx, "article", 1, Some(article(1, "a", 1))).unwrap();
    live.write(&engine, tx, "comment", 1, Some(comment(1, "hi", 1))).unwrap();
    live.commit(&engine, tx).unwrap();

    live.write_one(&engine, "comment", 1, None);
    live.write_one(&engine, "article", 1, Some(article(1, "b", 1)));

    let plan = engine.revert(&record("article", 1), 1, true).unwrap();
    let child = plan.get(&record("comment", 1)).unwrap();
    assert_eq!(child.action, RevertAction::Resurrect);

    let applied = apply(&engine, &live, &plan);
    assert_eq!(applied.len(), 2);
    assert_eq!(live.get(&record("comment", 1)), Some(comment(1, "hi", 1)));
}

#[timeout(1000)]
#[test]
fn test_unresolved_dependency_aborts_whole_revert() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "article", 1, Some(article(1, "orphan", 99)));
    live.write_one(&engine, "article", 1, Some(article(1, "orphan 2", 99)));

    let result = engine.revert(&record("article", 1), 1, true);
    assert!(matches!(
        result,
        Err(VersionError::UnresolvedDependency { ref field, .. }) if field == "author_id"
    ));
    assert_eq!(engine.list_versions(&record("article", 1)).unwrap().len(), 2);
}

#[timeout(1000)]
#[test]
fn test_cancelled_revert_plans_nothing() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));

    let cancel = CancelFlag::new();
    cancel.cancel();
    let result = engine.revert_with_cancel(&record("user", 1), 1, true, &cancel);
    assert!(matches!(result, Err(VersionError::Cancelled)));
}

#[timeout(1000)]
#[test]
fn test_revert_unknown_version() {
    let engine = engine();
    let live = LiveTable::new();
    live.write_one(&engine, "user", 1, Some(user(1, "a")));

    assert!(matches!(
        engine.revert(&record("user", 1), 5, false),
        Err(VersionError::UnknownVersion { version: 5, .. })
    ));
    assert!(matches!(
        engine.revert(&record("user", 2), 1, false),
        Err(VersionError::UnknownRecord { .. })
    ));
}
