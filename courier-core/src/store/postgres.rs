use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgListener, PgPool};
use sqlx::{Postgres, Transaction};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::path;
use super::push_key::PushKeyGenerator;
use super::{
    DocumentStore, StoreChange, StoreError, StoreResult, WriteBatch, WriteOp, CHANGE_BUFFER,
};
use crate::db::Database;

/// Postgres notification channel carrying changed paths.
pub const CHANGE_CHANNEL: &str = "courier_changes";

/// Store backed by the `nodes` table.
///
/// Every leaf of the tree is one row keyed by its full path; objects exist
/// only implicitly through their descendants. Arrays are stored as single
/// leaves. Each batch runs in one transaction and notifies
/// [`CHANGE_CHANNEL`] for every written path, so notifications are only
/// delivered for committed writes.
pub struct PgDocumentStore {
    pool: PgPool,
    keys: PushKeyGenerator,
    changes: broadcast::Sender<StoreChange>,
    listener: Option<JoinHandle<()>>,
}

impl PgDocumentStore {
    /// Open the store and start forwarding change notifications.
    pub async fn connect(db: &Database) -> StoreResult<Self> {
        let pool = db.pool().clone();
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        info!(channel = CHANGE_CHANNEL, "Listening for store changes");

        let forward = changes.clone();
        let handle = tokio::spawn(async move {
            forward_notifications(listener, forward).await;
        });

        Ok(Self {
            pool,
            keys: PushKeyGenerator::new(),
            changes,
            listener: Some(handle),
        })
    }

    /// Open the store without a change listener. Subscriptions on such a
    /// store only deliver their initial snapshot.
    pub fn without_listener(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            pool,
            keys: PushKeyGenerator::new(),
            changes,
            listener: None,
        }
    }

    async fn clear(
        tx: &mut Transaction<'_, Postgres>,
        target: &str,
        include_self: bool,
    ) -> StoreResult<()> {
        if target.is_empty() {
            sqlx::query("DELETE FROM nodes").execute(&mut **tx).await?;
            return Ok(());
        }

        sqlx::query("DELETE FROM nodes WHERE path LIKE $1")
            .bind(format!("{}/%", path::escape_like(target)))
            .execute(&mut **tx)
            .await?;

        if include_self {
            sqlx::query("DELETE FROM nodes WHERE path = $1")
                .bind(target)
                .execute(&mut **tx)
                .await?;
        }

        let ancestors = path::ancestors(target);
        if !ancestors.is_empty() {
            sqlx::query("DELETE FROM nodes WHERE path = ANY($1)")
                .bind(ancestors)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    async fn insert_tree(
        tx: &mut Transaction<'_, Postgres>,
        target: &str,
        value: Value,
    ) -> StoreResult<()> {
        for (leaf_path, leaf) in path::flatten(target, value) {
            if leaf_path.is_empty() {
                return Err(StoreError::InvalidPath(
                    "the root can only hold an object".to_string(),
                ));
            }
            sqlx::query(
                r#"
                INSERT INTO nodes (path, value, updated_at)
                VALUES ($1, $2, NOW())
                ON CONFLICT (path) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
                "#,
            )
            .bind(&leaf_path)
            .bind(&leaf)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn increment(
        tx: &mut Transaction<'_, Postgres>,
        target: &str,
        delta: i64,
    ) -> StoreResult<()> {
        if target.is_empty() {
            return Err(StoreError::InvalidPath(
                "the root cannot be incremented".to_string(),
            ));
        }

        Self::clear(tx, target, false).await?;

        sqlx::query(
            r#"
            INSERT INTO nodes (path, value, updated_at)
            VALUES ($1, to_jsonb($2::bigint), NOW())
            ON CONFLICT (path) DO UPDATE SET
                value = to_jsonb(
                    CASE
                        WHEN jsonb_typeof(nodes.value) = 'number'
                             AND (nodes.value #>> '{}') ~ '^-?[0-9]+$'
                        THEN (nodes.value #>> '{}')::bigint
                        ELSE 0
                    END + $2::bigint
                ),
                updated_at = NOW()
            "#,
        )
        .bind(target)
        .bind(delta)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

async fn forward_notifications(mut listener: PgListener, changes: broadcast::Sender<StoreChange>) {
    loop {
        match listener.recv().await {
            Ok(notification) => {
                debug!(path = %notification.payload(), "Store change notification");
                let _ = changes.send(StoreChange::new(notification.payload()));
            }
            Err(e) => {
                // recv reconnects on the next call
                warn!(error = %e, "Store change listener interrupted, reconnecting");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

impl Drop for PgDocumentStore {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let target = path::normalize(path)?;

        let rows: Vec<(String, Value)> = if target.is_empty() {
            sqlx::query_as("SELECT path, value FROM nodes")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as("SELECT path, value FROM nodes WHERE path = $1 OR path LIKE $2")
                .bind(&target)
                .bind(format!("{}/%", path::escape_like(&target)))
                .fetch_all(&self.pool)
                .await?
        };

        Ok(path::unflatten(&target, rows))
    }

    async fn apply(&self, batch: WriteBatch) -> StoreResult<()> {
        let ops = batch.into_normalized()?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for (target, op) in &ops {
            match op {
                WriteOp::Set(value) => {
                    Self::clear(&mut tx, target, true).await?;
                    Self::insert_tree(&mut tx, target, value.clone()).await?;
                }
                WriteOp::Delete => {
                    Self::clear(&mut tx, target, true).await?;
                }
                WriteOp::Increment(delta) => {
                    Self::increment(&mut tx, target, *delta).await?;
                }
            }

            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANGE_CHANNEL)
                .bind(target)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await.map_err(|e| {
            error!(error = %e, writes = ops.len(), "Failed to commit write batch");
            StoreError::Database(e)
        })?;

        Ok(())
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
