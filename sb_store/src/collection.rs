//! Collection — generic async accessor over one redb-backed document table.
//!
//! Each collection is a single database file holding one `documents` table
//! that maps an internal `u64` sequence number to a JSON-serialized object.
//! The sequence number is storage-internal identity only: it is assigned on
//! insert, never read back into records, and never exposed to callers.
//! Logical keys (`id` fields, compound attribute sets) live inside the
//! documents themselves.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::query::Query;

const DOCUMENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("documents");

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// How an upsert resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Existing documents matched the query; this many were overwritten.
    Updated(u64),
    /// Nothing matched and the document was appended.
    Inserted,
}

/// Typed handle over one document collection.
///
/// All operations are async; writes are serialized by the engine's
/// single-writer transaction, so an `update` cannot interleave with another
/// writer between its lookup and its write.
pub struct Collection<T> {
    db: Arc<Database>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Collection<T>
where
    T: DeserializeOwned,
{
    /// Open (or create) a persistent collection at the given path.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(map_err!(Open))?;
        let collection = Self {
            db: Arc::new(db),
            _record: PhantomData,
        };
        collection.ensure_table()?;
        debug!(?path, "collection opened");
        Ok(collection)
    }

    /// Create an ephemeral in-memory collection (for testing).
    pub async fn in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let collection = Self {
            db: Arc::new(db),
            _record: PhantomData,
        };
        collection.ensure_table()?;
        debug!("in-memory collection opened");
        Ok(collection)
    }

    /// Create the documents table if it doesn't exist yet.
    fn ensure_table(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Find the first document whose top-level `id` field equals `id`.
    pub async fn find(&self, id: &str) -> StoreResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let doc: Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if doc.get("id").and_then(Value::as_str) == Some(id) {
                let record = serde_json::from_value(doc).map_err(map_err!(Deserialize))?;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// All documents matching `query`, in insertion order.
    ///
    /// An empty query returns the whole collection.
    pub async fn search(&self, query: &Query) -> StoreResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let doc: Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if let Value::Object(fields) = doc {
                if query.matches(&fields) {
                    let record = serde_json::from_value(Value::Object(fields))
                        .map_err(map_err!(Deserialize))?;
                    results.push(record);
                }
            }
        }
        Ok(results)
    }

    /// Append a document at the next sequence number.
    ///
    /// No key inspection happens here: inserting a document whose `id`
    /// already exists produces a second document.
    pub async fn insert(&self, record: &impl Serialize) -> StoreResult<()> {
        let doc = to_document(record)?;
        let data = serde_json::to_vec(&doc).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            let seq = next_seq(&table)?;
            table.insert(seq, data.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Upsert by query: overwrite every match, or append when nothing matches.
    ///
    /// Overwriting is a shallow merge with `$set` semantics. Top-level fields
    /// present in `data` replace the stored values; fields absent from `data`
    /// keep their stored values, including fields outside `T`'s shape. The
    /// lookup and the write happen inside one write transaction, so two
    /// concurrent upserts on the same key cannot both append.
    pub async fn update(
        &self,
        query: &Query,
        data: &impl Serialize,
    ) -> StoreResult<UpdateOutcome> {
        let patch = to_document(data)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            let matches = collect_matches(&table, query)?;
            if matches.is_empty() {
                let data = serde_json::to_vec(&patch).map_err(map_err!(Serialize))?;
                let seq = next_seq(&table)?;
                table.insert(seq, data.as_slice()).map_err(map_err!(Write))?;
                outcome = UpdateOutcome::Inserted;
            } else {
                let matched = matches.len() as u64;
                for (seq, mut fields) in matches {
                    for (field, value) in &patch {
                        fields.insert(field.clone(), value.clone());
                    }
                    let data = serde_json::to_vec(&Value::Object(fields))
                        .map_err(map_err!(Serialize))?;
                    table.insert(seq, data.as_slice()).map_err(map_err!(Write))?;
                }
                outcome = UpdateOutcome::Updated(matched);
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(outcome)
    }

    /// Rewrite every match in place with `f`, inside one write transaction.
    ///
    /// Unlike [`update`](Self::update) there is no insert fallback; returns
    /// how many documents matched.
    pub async fn modify(
        &self,
        query: &Query,
        mut f: impl FnMut(&mut Map<String, Value>),
    ) -> StoreResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let matched;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            let matches = collect_matches(&table, query)?;
            matched = matches.len() as u64;
            for (seq, mut fields) in matches {
                f(&mut fields);
                let data =
                    serde_json::to_vec(&Value::Object(fields)).map_err(map_err!(Serialize))?;
                table.insert(seq, data.as_slice()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(matched)
    }

    /// Remove every match; removing nothing is not an error.
    pub async fn delete(&self, query: &Query) -> StoreResult<u64> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
            let keys: Vec<u64> = collect_matches(&table, query)?
                .into_iter()
                .map(|(seq, _)| seq)
                .collect();
            removed = keys.len() as u64;
            for key in keys {
                table.remove(key).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(removed)
    }

    /// Number of documents currently stored.
    pub async fn count(&self) -> StoreResult<u64> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DOCUMENTS).map_err(map_err!(Table))?;
        let mut count = 0;
        for entry in table.iter().map_err(map_err!(Read))? {
            entry.map_err(map_err!(Read))?;
            count += 1;
        }
        Ok(count)
    }
}

/// Serialize a record and require it to be a JSON object.
fn to_document(record: &impl Serialize) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(record).map_err(map_err!(Serialize))? {
        Value::Object(fields) => Ok(fields),
        _ => Err(StoreError::InvalidDocument),
    }
}

/// Sequence number for the next append: one past the highest key in use.
fn next_seq(table: &impl ReadableTable<u64, &'static [u8]>) -> StoreResult<u64> {
    Ok(match table.last().map_err(map_err!(Read))? {
        Some((key, _)) => key.value() + 1,
        None => 0,
    })
}

/// Collect `(sequence, fields)` for every document matching `query`.
fn collect_matches(
    table: &impl ReadableTable<u64, &'static [u8]>,
    query: &Query,
) -> StoreResult<Vec<(u64, Map<String, Value>)>> {
    let mut matches = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, value) = entry.map_err(map_err!(Read))?;
        let doc: Value = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
        if let Value::Object(fields) = doc {
            if query.matches(&fields) {
                matches.push((key.value(), fields));
            }
        }
    }
    Ok(matches)
}
