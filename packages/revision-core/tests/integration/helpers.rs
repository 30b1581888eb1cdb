//! Shared fixtures: a registry, snapshot builders and a tiny live table
//! standing in for the host's storage.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use revision_core::store::CommitBatch;
use revision_core::transaction::ChangeOutcome;
use revision_core::{
    FieldValue, Operation, RecordId, RecordKey, RecordRegistry, RecordType, RelationshipEdge,
    Result, Snapshot, TransactionId, VersionEntry, VersioningConfig, VersioningEngine,
};

/// Registry used across the suite.
///
/// `article -> author` is a forward edge, `article -> comment` an inverse
/// one, and `node.peer_id` lets two nodes reference each other.
pub fn registry() -> Arc<RecordRegistry> {
    Arc::new(
        RecordRegistry::from_types([
            RecordType::new("user", ["id"])
                .field("name")
                .field("email")
                .exclude("last_seen"),
            RecordType::new("author", ["id"]).field("name"),
            RecordType::new("article", ["id"])
                .field("title")
                .field("author_id")
                .relationship(RelationshipEdge::one("article", "author_id", "author"))
                .relationship(RelationshipEdge::inverse("article", "comment", "article_id")),
            RecordType::new("comment", ["id"]).field("body").field("article_id"),
            RecordType::new("node", ["id"])
                .field("label")
                .field("peer_id")
                .relationship(RelationshipEdge::one("node", "peer_id", "node")),
        ])
        .unwrap(),
    )
}

pub fn engine() -> VersioningEngine {
    engine_with(VersioningConfig::default())
}

pub fn engine_with(config: VersioningConfig) -> VersioningEngine {
    VersioningEngine::new(config, registry()).unwrap()
}

pub fn snapshot(fields: &[(&str, FieldValue)]) -> Snapshot {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn record(record_type: &str, id: i64) -> RecordId {
    RecordId::new(record_type, RecordKey::single(id))
}

pub fn user(id: i64, name: &str) -> Snapshot {
    snapshot(&[("id", FieldValue::Int(id)), ("name", FieldValue::from(name))])
}

pub fn author(id: i64, name: &str) -> Snapshot {
    snapshot(&[("id", FieldValue::Int(id)), ("name", FieldValue::from(name))])
}

pub fn article(id: i64, title: &str, author_id: i64) -> Snapshot {
    snapshot(&[
        ("id", FieldValue::Int(id)),
        ("title", FieldValue::from(title)),
        ("author_id", FieldValue::Int(author_id)),
    ])
}

pub fn comment(id: i64, body: &str, article_id: i64) -> Snapshot {
    snapshot(&[
        ("id", FieldValue::Int(id)),
        ("body", FieldValue::from(body)),
        ("article_id", FieldValue::Int(article_id)),
    ])
}

pub fn node(id: i64, label: &str, peer_id: Option<i64>) -> Snapshot {
    snapshot(&[
        ("id", FieldValue::Int(id)),
        ("label", FieldValue::from(label)),
        ("peer_id", peer_id.map_or(FieldValue::Null, FieldValue::Int)),
    ])
}

/// In-memory stand-in for the host's tables.
///
/// Writes are reported to the engine with images taken from the table;
/// the table itself only changes inside the commit's host write.
#[derive(Default)]
pub struct LiveTable {
    rows: Mutex<HashMap<RecordId, Snapshot>>,
}

impl LiveTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, record: &RecordId) -> Option<Snapshot> {
        self.rows.lock().unwrap().get(record).cloned()
    }

    /// Reports a write of `after` (or a delete) to the engine.
    pub fn write(
        &self,
        engine: &VersioningEngine,
        tx: TransactionId,
        record_type: &str,
        id: i64,
        after: Option<Snapshot>,
    ) -> Result<ChangeOutcome> {
        let target = record(record_type, id);
        let before = self.get(&target);
        let operation = match (&before, &after) {
            (None, _) => Operation::Insert,
            (Some(_), Some(_)) => Operation::Update,
            (Some(_), None) => Operation::Delete,
        };
        engine.notify_change(
            tx,
            target.key,
            record_type,
            operation,
            before.as_ref(),
            after.as_ref(),
        )
    }

    /// Commits `tx`, applying its batch to the table.
    pub fn commit(&self, engine: &VersioningEngine, tx: TransactionId) -> Result<Vec<VersionEntry>> {
        engine.commit_with(tx, |batch| {
            self.apply(batch);
            Ok::<(), Infallible>(())
        })
    }

    /// Writes one record in its own transaction.
    pub fn write_one(
        &self,
        engine: &VersioningEngine,
        record_type: &str,
        id: i64,
        after: Option<Snapshot>,
    ) -> Vec<VersionEntry> {
        let tx = engine.begin().unwrap();
        self.write(engine, tx, record_type, id, after).unwrap();
        self.commit(engine, tx).unwrap()
    }

    pub fn apply(&self, batch: &CommitBatch) {
        let mut rows = self.rows.lock().unwrap();
        for entry in &batch.entries {
            match entry.operation {
                Operation::Delete => rows.remove(&entry.record),
                _ => rows.insert(entry.record.clone(), entry.snapshot.clone()),
            };
        }
    }
}
