//! Hierarchical document store consumed by the chat service.
//!
//! The store is a schemaless JSON tree addressed by `/`-separated paths. It
//! supports point reads, atomic multi-path write batches (including a
//! store-side counter increment), sortable push keys and change
//! notifications. Two backends are provided: [`MemoryStore`] and
//! [`PgDocumentStore`].

mod memory;
pub mod path;
mod postgres;
mod push_key;

pub use memory::MemoryStore;
pub use postgres::{PgDocumentStore, CHANGE_CHANNEL};
pub use push_key::PushKeyGenerator;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

/// Buffered change events per subscriber before it starts lagging.
pub const CHANGE_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Store database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store is closed")]
    Closed,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set(Value),
    Delete,
    Increment(i64),
}

/// An ordered set of writes applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<(String, WriteOp)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        let op = if value.is_null() {
            WriteOp::Delete
        } else {
            WriteOp::Set(value)
        };
        self.ops.push((path.into(), op));
        self
    }

    pub fn set_serialized<T: Serialize>(
        &mut self,
        path: impl Into<String>,
        value: &T,
    ) -> StoreResult<&mut Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(path, value))
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push((path.into(), WriteOp::Delete));
        self
    }

    pub fn increment(&mut self, path: impl Into<String>, delta: i64) -> &mut Self {
        self.ops.push((path.into(), WriteOp::Increment(delta)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[(String, WriteOp)] {
        &self.ops
    }

    /// Ops with normalized paths, validated before anything is written.
    pub fn into_normalized(self) -> StoreResult<Vec<(String, WriteOp)>> {
        self.ops
            .into_iter()
            .map(|(p, op)| Ok((path::normalize(&p)?, op)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub path: String,
}

impl StoreChange {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Whether this change can alter what a reader of `watched` sees.
    pub fn affects(&self, watched: &str) -> bool {
        path::overlaps(&self.path, watched)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()>;

    fn push_key(&self) -> String;

    fn changes(&self) -> broadcast::Receiver<StoreChange>;

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.set(path, value);
        self.apply(batch).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        for (key, value) in fields {
            batch.set(path::join(path, &key), value);
        }
        self.apply(batch).await
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(path);
        self.apply(batch).await
    }
}

/// Read and deserialize the node at `path`.
pub async fn read_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> StoreResult<Option<T>> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Read the children of `path` as `(key, record)` pairs in key order.
///
/// Children that do not deserialize as `T` are skipped.
pub async fn read_children<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    path: &str,
) -> StoreResult<Vec<(String, T)>> {
    let Some(Value::Object(map)) = store.get(path).await? else {
        return Ok(Vec::new());
    };

    let mut children: Vec<(String, T)> = map
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(record) => Some((key, record)),
            Err(e) => {
                tracing::debug!(path = %path, key = %key, error = %e, "Skipping malformed record");
                None
            }
        })
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_null_set_becomes_delete() {
        let mut batch = WriteBatch::new();
        batch.set("a", Value::Null).set("b", json!(1)).increment("c", 2);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0].1, WriteOp::Delete);
        assert_eq!(batch.ops()[2].1, WriteOp::Increment(2));
    }

    #[test]
    fn test_batch_normalization_rejects_bad_paths() {
        let mut batch = WriteBatch::new();
        batch.set("/a//b/", json!(1));
        let ops = batch.into_normalized().unwrap();
        assert_eq!(ops[0].0, "a/b");

        let mut bad = WriteBatch::new();
        bad.set("a/../b", json!(1));
        assert!(bad.into_normalized().is_err());
    }

    #[test]
    fn test_change_affects() {
        let change = StoreChange::new("messages/room1/key1/read");
        assert!(change.affects("messages/room1"));
        assert!(!change.affects("messages/room2"));
        assert!(!change.affects("userChats/u1"));
    }
}
