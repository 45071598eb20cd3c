//! Worker liveness registry (§3 `WorkerView`; heartbeat/GC use in §4.F/§4.G).
//!
//! Grounded on the same `SqlJobStore` shape as `store.rs` — an upsert on
//! heartbeat (unique on `hostname`) and a cutoff-based delete for the
//! maintenance GC sweep, mirroring `casparian_sentinel`'s worker-table
//! bookkeeping conventions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use cbuild_db::DbPool;
use cbuild_ids::WorkerId;
use cbuild_protocol::error::StoreError;
use cbuild_protocol::job::WorkerView;

use crate::store::{backend_err, parse_timestamp};

#[async_trait]
pub trait WorkerStore: Send + Sync {
    /// Inserts or refreshes the row for `hostname`, returning its id.
    async fn heartbeat(&self, hostname: &str) -> Result<WorkerId, StoreError>;
    async fn list(&self) -> Result<Vec<WorkerView>, StoreError>;
    /// Deletes workers whose last heartbeat predates `now - max_silence`.
    /// Returns the number removed.
    async fn delete_stale(&self, max_silence: Duration) -> Result<u64, StoreError>;
}

pub struct SqlWorkerStore {
    db: DbPool,
}

impl SqlWorkerStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WorkerStore for SqlWorkerStore {
    async fn heartbeat(&self, hostname: &str) -> Result<WorkerId, StoreError> {
        let now = Utc::now();
        let existing: Option<String> = sqlx::query("SELECT id FROM workers WHERE hostname = ?")
            .bind(hostname)
            .fetch_optional(&self.db.pool)
            .await
            .map_err(backend_err)?
            .map(|r| r.try_get::<String, _>("id"))
            .transpose()
            .map_err(backend_err)?;

        let id = match existing {
            Some(id) => {
                sqlx::query("UPDATE workers SET updated_at = ? WHERE id = ?")
                    .bind(now.to_rfc3339())
                    .bind(&id)
                    .execute(&self.db.pool)
                    .await
                    .map_err(backend_err)?;
                id
            }
            None => {
                let id = WorkerId::new();
                sqlx::query(
                    "INSERT INTO workers (id, hostname, created_at, updated_at) VALUES (?, ?, ?, ?)",
                )
                .bind(id.to_string())
                .bind(hostname)
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .execute(&self.db.pool)
                .await
                .map_err(backend_err)?;
                id.to_string()
            }
        };

        id.parse()
            .map_err(|e| StoreError::Backend(format!("bad worker id: {e}")))
    }

    async fn list(&self) -> Result<Vec<WorkerView>, StoreError> {
        let rows = sqlx::query("SELECT id, hostname, created_at, updated_at FROM workers ORDER BY hostname ASC")
            .fetch_all(&self.db.pool)
            .await
            .map_err(backend_err)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(backend_err)?;
                let created_at: String = row.try_get("created_at").map_err(backend_err)?;
                let updated_at: String = row.try_get("updated_at").map_err(backend_err)?;
                Ok(WorkerView {
                    id: id.parse().map_err(|e| StoreError::Backend(format!("bad worker id: {e}")))?,
                    hostname: row.try_get("hostname").map_err(backend_err)?,
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    async fn delete_stale(&self, max_silence: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_silence).unwrap();
        let result = sqlx::query("DELETE FROM workers WHERE updated_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.db.pool)
            .await
            .map_err(backend_err)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> SqlWorkerStore {
        let db = DbPool::connect("sqlite::memory:").await.unwrap();
        cbuild_db::migrate(&db).await.unwrap();
        SqlWorkerStore::new(db)
    }

    #[tokio::test]
    async fn heartbeat_is_idempotent_per_hostname() {
        let store = setup().await;
        let first = store.heartbeat("worker-a").await.unwrap();
        let second = store.heartbeat("worker-a").await.unwrap();
        assert_eq!(first, second);

        let workers = store.list().await.unwrap();
        assert_eq!(workers.len(), 1);
    }

    #[tokio::test]
    async fn delete_stale_removes_workers_past_the_cutoff() {
        let store = setup().await;
        store.heartbeat("stale-worker").await.unwrap();

        sqlx::query("UPDATE workers SET updated_at = ? WHERE hostname = ?")
            .bind((Utc::now() - chrono::Duration::minutes(5)).to_rfc3339())
            .bind("stale-worker")
            .execute(&store.db.pool)
            .await
            .unwrap();

        let removed = store.delete_stale(Duration::from_secs(30)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.list().await.unwrap().is_empty());
    }
}
