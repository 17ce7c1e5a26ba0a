use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use super::path;
use super::push_key::PushKeyGenerator;
use super::{DocumentStore, StoreChange, StoreResult, WriteBatch, WriteOp, CHANGE_BUFFER};

/// In-process store holding the whole tree behind a single lock.
///
/// Batches are applied under one write guard, so they are atomic with respect
/// to every other reader and writer of the same store.
pub struct MemoryStore {
    root: RwLock<Value>,
    keys: PushKeyGenerator,
    changes: broadcast::Sender<StoreChange>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_contents(Value::Null)
    }

    pub fn with_contents(root: Value) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            root: RwLock::new(path::prune(root)),
            keys: PushKeyGenerator::new(),
            changes,
            writes: AtomicU64::new(0),
        }
    }

    /// Number of individual path writes applied so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Value {
        self.root.read().await.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = path::normalize(path)?;
        let root = self.root.read().await;
        Ok(path::lookup(&root, &path).cloned())
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let ops = batch.into_normalized()?;
        if ops.is_empty() {
            return Ok(());
        }

        {
            let mut root = self.root.write().await;
            for (target, op) in &ops {
                match op {
                    WriteOp::Set(value) => path::write(&mut root, target, value.clone()),
                    WriteOp::Delete => path::write(&mut root, target, Value::Null),
                    WriteOp::Increment(delta) => {
                        let next = path::counter_value(&root, target) + delta;
                        path::write(&mut root, target, Value::from(next));
                    }
                }
            }
        }

        self.writes.fetch_add(ops.len() as u64, Ordering::SeqCst);
        trace!(writes = ops.len(), "Applied write batch");

        let mut notified: Vec<&str> = Vec::with_capacity(ops.len());
        for (target, _) in &ops {
            if !notified.contains(&target.as_str()) {
                notified.push(target);
                // no receivers is not an error
                let _ = self.changes.send(StoreChange::new(target.clone()));
            }
        }

        Ok(())
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        store
            .set("chatRooms/r1", json!({"lastMessage": "hi", "participants": ["a", "b"]}))
            .await
            .unwrap();

        let room = store.get("chatRooms/r1").await.unwrap().unwrap();
        assert_eq!(room["lastMessage"], "hi");
        assert_eq!(
            store.get("chatRooms/r1/participants").await.unwrap(),
            Some(json!(["a", "b"]))
        );

        store.remove("chatRooms/r1").await.unwrap();
        assert!(store.get("chatRooms/r1").await.unwrap().is_none());
        assert!(store.get("chatRooms").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_replaces_only_named_fields() {
        let store = MemoryStore::new();
        store.set("u/1", json!({"a": 1, "b": 2})).await.unwrap();

        let mut fields = serde_json::Map::new();
        fields.insert("b".to_string(), json!(3));
        fields.insert("c/d".to_string(), json!(true));
        store.update("u/1", fields).await.unwrap();

        assert_eq!(
            store.get("u/1").await.unwrap(),
            Some(json!({"a": 1, "b": 3, "c": {"d": true}}))
        );
    }

    #[tokio::test]
    async fn test_increment_from_missing_and_existing() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.increment("counts/x", 1).increment("counts/x", 1);
        store.apply(batch).await.unwrap();
        assert_eq!(store.get("counts/x").await.unwrap(), Some(json!(2)));

        store.set("counts/y", json!("nope")).await.unwrap();
        let mut batch = WriteBatch::new();
        batch.increment("counts/y", 5);
        store.apply(batch).await.unwrap();
        assert_eq!(store.get("counts/y").await.unwrap(), Some(json!(5)));
    }

    #[tokio::test]
    async fn test_invalid_batch_writes_nothing() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set("ok", json!(1)).set("a/../b", json!(2));
        assert!(store.apply(batch).await.is_err());
        assert!(store.get("ok").await.unwrap().is_none());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_changes_are_broadcast_per_path() {
        let store = MemoryStore::new();
        let mut rx = store.changes();

        let mut batch = WriteBatch::new();
        batch.set("a/1", json!(1)).set("a/1", json!(2)).set("b", json!(3));
        store.apply(batch).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), StoreChange::new("a/1"));
        assert_eq!(rx.recv().await.unwrap(), StoreChange::new("b"));
        assert!(rx.try_recv().is_err());
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_push_keys_are_unique() {
        let store = MemoryStore::new();
        let a = store.push_key();
        let b = store.push_key();
        assert_ne!(a, b);
        assert!(a < b);
    }
}
