//! `JobStore` trait and its `sqlx::Any`-backed implementation (§4.C).
//!
//! `reserve_pending` is grounded directly on
//! `artifactory/build_jobs_repository.go`'s `ReservePendingBuild`: the
//! Postgres path issues the exact `UPDATE ... WHERE id = (SELECT ... FOR
//! UPDATE SKIP LOCKED) RETURNING id` statement from that file. SQLite has
//! no `SKIP LOCKED`, so the SQLite path instead follows
//! `casparian_sentinel/src/db/queue.rs`'s `pop_job`: select a candidate
//! inside a transaction, then claim it with a conditional `UPDATE ... WHERE
//! id = ? AND status = ?` and treat zero rows affected as "lost the race".

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use cbuild_db::{Backend, DbPool};
use cbuild_ids::{ArtifactId, AuditEntryId, JobId};
use cbuild_protocol::error::StoreError;
use cbuild_protocol::job::{BuildFlag, JobStatus, RequestFlagView};
use cbuild_protocol::query::{JobQuery, Page, SortField, StatusFilter};

use crate::model::{Artifact, AuditEntry, Job, NewJob};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF: Duration = Duration::from_secs(60);
pub const MAX_BUILD_DURATION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct JobCounts {
    pub queued: i64,
    pub building: i64,
    pub failed: i64,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get_by_key(
        &self,
        commit_hash: &str,
        target: &str,
        fingerprint: &str,
    ) -> Result<Option<Job>, StoreError>;
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError>;
    async fn save(&self, job: &mut Job) -> Result<(), StoreError>;
    async fn delete(&self, id: JobId) -> Result<(), StoreError>;
    async fn list(&self, query: &JobQuery) -> Result<Page<Job>, StoreError>;
    async fn reserve_pending(&self) -> Result<Option<Job>, StoreError>;
    async fn timeout_in_progress(&self, max_duration: Duration) -> Result<u64, StoreError>;
    async fn list_audit(&self, job_id: JobId) -> Result<Vec<AuditEntry>, StoreError>;
    async fn sample_counts(&self) -> Result<JobCounts, StoreError>;
}

pub struct SqlJobStore {
    db: DbPool,
}

impl SqlJobStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn load_artifacts(&self, job_id: &str) -> Result<Vec<Artifact>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, slug, filename, size, created_at FROM artifacts WHERE job_id = ? ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.db.pool)
        .await
        .map_err(backend_err)?;

        rows.iter().map(row_to_artifact).collect()
    }

    async fn row_to_job_with_children(&self, row: &sqlx::any::AnyRow) -> Result<Job, StoreError> {
        let id: String = row.try_get("id").map_err(backend_err)?;
        let artifacts = self.load_artifacts(&id).await?;
        row_to_job(row, artifacts)
    }
}

pub(crate) fn backend_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid timestamp {raw:?}: {e}")))
}

fn row_to_artifact(row: &sqlx::any::AnyRow) -> Result<Artifact, StoreError> {
    let id: String = row.try_get("id").map_err(backend_err)?;
    let created_at: String = row.try_get("created_at").map_err(backend_err)?;
    Ok(Artifact {
        id: ArtifactId::from_str(&id)
            .map_err(|e| StoreError::Backend(format!("bad artifact id: {e}")))?,
        slug: row.try_get("slug").map_err(backend_err)?,
        filename: row.try_get("filename").map_err(backend_err)?,
        size: row.try_get("size").map_err(backend_err)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_job(row: &sqlx::any::AnyRow, artifacts: Vec<Artifact>) -> Result<Job, StoreError> {
    let id: String = row.try_get("id").map_err(backend_err)?;
    let status: String = row.try_get("status").map_err(backend_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(backend_err)?;
    let option_flags: String = row.try_get("option_flags").map_err(backend_err)?;
    let build_flags: String = row.try_get("build_flags").map_err(backend_err)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(backend_err)?;
    let ended_at: Option<String> = row.try_get("ended_at").map_err(backend_err)?;
    let created_at: String = row.try_get("created_at").map_err(backend_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(backend_err)?;

    Ok(Job {
        id: JobId::from_str(&id).map_err(|e| StoreError::Backend(format!("bad job id: {e}")))?,
        status: JobStatus::from_str(&status)
            .map_err(|e| StoreError::Backend(format!("bad status: {e}")))?,
        attempts: attempts as u32,
        release: row.try_get("release").map_err(backend_err)?,
        commit_hash: row.try_get("commit_hash").map_err(backend_err)?,
        target: row.try_get("target").map_err(backend_err)?,
        option_flags: serde_json::from_str::<Vec<RequestFlagView>>(&option_flags)
            .map_err(|e| StoreError::Backend(format!("bad option_flags json: {e}")))?,
        build_flags: serde_json::from_str::<Vec<BuildFlag>>(&build_flags)
            .map_err(|e| StoreError::Backend(format!("bad build_flags json: {e}")))?,
        container_image: row.try_get("container_image").map_err(backend_err)?,
        fingerprint: row.try_get("fingerprint").map_err(backend_err)?,
        started_at: started_at.as_deref().map(parse_timestamp).transpose()?,
        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        artifacts,
        pending_audit: Vec::new(),
        pending_artifacts: Vec::new(),
    })
}

/// `in-progress` expands to `{Waiting, InProgress}` per §4.C; the rest map
/// 1:1 onto a single status.
fn status_filter_clause(filter: StatusFilter) -> Vec<&'static str> {
    match filter {
        StatusFilter::All => vec![],
        StatusFilter::Success => vec!["success"],
        StatusFilter::Error => vec!["error"],
        StatusFilter::Queued => vec!["waiting"],
        StatusFilter::Building => vec!["in_progress"],
        StatusFilter::InProgress => vec!["waiting", "in_progress"],
    }
}

/// `Duration` sorts by `ended_at - started_at` computed at the SQL level
/// (§4.C); both columns are stored as RFC3339 text, so each backend needs
/// its own cast before subtracting.
fn sort_column(field: SortField, backend: Backend) -> &'static str {
    match (field, backend) {
        (SortField::CreatedAt, _) => "created_at",
        (SortField::UpdatedAt, _) => "updated_at",
        (SortField::StartedAt, _) => "started_at",
        (SortField::EndedAt, _) => "ended_at",
        (SortField::Duration, Backend::Postgres) => {
            "(ended_at::timestamptz - started_at::timestamptz)"
        }
        (SortField::Duration, Backend::Sqlite) => {
            "(julianday(ended_at) - julianday(started_at))"
        }
    }
}

#[async_trait]
impl JobStore for SqlJobStore {
    async fn get_by_key(
        &self,
        commit_hash: &str,
        target: &str,
        fingerprint: &str,
    ) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM jobs WHERE commit_hash = ? AND target = ? AND fingerprint = ?",
        )
        .bind(commit_hash)
        .bind(target)
        .bind(fingerprint)
        .fetch_optional(&self.db.pool)
        .await
        .map_err(backend_err)?;

        match row {
            Some(row) => Ok(Some(self.row_to_job_with_children(&row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.db.pool)
            .await
            .map_err(backend_err)?;

        match row {
            Some(row) => Ok(Some(self.row_to_job_with_children(&row).await?)),
            None => Ok(None),
        }
    }

    async fn create(&self, new_job: NewJob) -> Result<Job, StoreError> {
        let id = JobId::new();
        let now = Utc::now();
        let option_flags_json =
            serde_json::to_string(&new_job.option_flags).map_err(|e| StoreError::Backend(e.to_string()))?;
        let build_flags_json =
            serde_json::to_string(&new_job.build_flags).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut tx = self.db.pool.begin().await.map_err(backend_err)?;

        sqlx::query(
            "INSERT INTO jobs (id, status, attempts, release, commit_hash, target, option_flags, build_flags, container_image, fingerprint, started_at, ended_at, created_at, updated_at) \
             VALUES (?, ?, 0, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?)",
        )
        .bind(id.to_string())
        .bind(JobStatus::Waiting.as_str())
        .bind(&new_job.release)
        .bind(&new_job.commit_hash)
        .bind(&new_job.target)
        .bind(&option_flags_json)
        .bind(&build_flags_json)
        .bind(&new_job.container_image)
        .bind(&new_job.fingerprint)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        insert_audit(&mut tx, id, &new_job.initial_audit, now).await?;

        tx.commit().await.map_err(backend_err)?;

        Ok(Job {
            id,
            status: JobStatus::Waiting,
            attempts: 0,
            release: new_job.release,
            commit_hash: new_job.commit_hash,
            target: new_job.target,
            option_flags: new_job.option_flags,
            build_flags: new_job.build_flags,
            container_image: new_job.container_image,
            fingerprint: new_job.fingerprint,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
            artifacts: Vec::new(),
            pending_audit: Vec::new(),
            pending_artifacts: Vec::new(),
        })
    }

    async fn save(&self, job: &mut Job) -> Result<(), StoreError> {
        let now = Utc::now();
        let option_flags_json =
            serde_json::to_string(&job.option_flags).map_err(|e| StoreError::Backend(e.to_string()))?;
        let build_flags_json =
            serde_json::to_string(&job.build_flags).map_err(|e| StoreError::Backend(e.to_string()))?;

        let mut tx = self.db.pool.begin().await.map_err(backend_err)?;

        sqlx::query(
            "UPDATE jobs SET status = ?, attempts = ?, option_flags = ?, build_flags = ?, \
             container_image = ?, started_at = ?, ended_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(job.status.as_str())
        .bind(job.attempts as i64)
        .bind(&option_flags_json)
        .bind(&build_flags_json)
        .bind(&job.container_image)
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.ended_at.map(|t| t.to_rfc3339()))
        .bind(now.to_rfc3339())
        .bind(job.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend_err)?;

        for artifact in job.pending_artifacts.drain(..) {
            sqlx::query(
                "INSERT INTO artifacts (id, job_id, slug, filename, size, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(artifact.id.to_string())
            .bind(job.id.to_string())
            .bind(&artifact.slug)
            .bind(&artifact.filename)
            .bind(artifact.size)
            .bind(artifact.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        }

        for pending in job.pending_audit.drain(..) {
            insert_audit(&mut tx, job.id, &pending, now).await?;
        }

        tx.commit().await.map_err(backend_err)?;
        job.updated_at = now;
        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        let mut tx = self.db.pool.begin().await.map_err(backend_err)?;
        sqlx::query("DELETE FROM audit_entries WHERE job_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        sqlx::query("DELETE FROM artifacts WHERE job_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        tx.commit().await.map_err(backend_err)
    }

    async fn list(&self, query: &JobQuery) -> Result<Page<Job>, StoreError> {
        let limit = query.clamped_limit();
        let mut conditions: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(filter) = query.status {
            let statuses = status_filter_clause(filter);
            if !statuses.is_empty() {
                let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
                conditions.push(format!("status IN ({placeholders})"));
                binds.extend(statuses.iter().map(|s| s.to_string()));
            }
        }
        if !query.target.is_empty() {
            let placeholders = query.target.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            conditions.push(format!("target IN ({placeholders})"));
            binds.extend(query.target.iter().cloned());
        }
        if !query.release.is_empty() {
            let placeholders = query.release.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            conditions.push(format!("release IN ({placeholders})"));
            binds.extend(query.release.iter().cloned());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as total FROM jobs {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query
            .fetch_one(&self.db.pool)
            .await
            .map_err(backend_err)?
            .try_get("total")
            .map_err(backend_err)?;

        let order_dir = if query.sort_desc { "DESC" } else { "ASC" };
        let list_sql = format!(
            "SELECT * FROM jobs {where_clause} ORDER BY {} {order_dir} LIMIT ? OFFSET ?",
            sort_column(query.sort, self.db.backend)
        );
        let mut list_query = sqlx::query(&list_sql);
        for bind in &binds {
            list_query = list_query.bind(bind);
        }
        list_query = list_query.bind(limit as i64).bind(query.offset as i64);

        let rows = list_query
            .fetch_all(&self.db.pool)
            .await
            .map_err(backend_err)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(self.row_to_job_with_children(row).await?);
        }

        Ok(Page::new(items, total, limit, query.offset))
    }

    async fn reserve_pending(&self) -> Result<Option<Job>, StoreError> {
        let now = Utc::now();
        let backoff_cutoff = now - chrono::Duration::from_std(BACKOFF).unwrap();

        let reserved_id = match self.db.backend {
            Backend::Postgres => {
                let row = sqlx::query(
                    "UPDATE jobs SET status = ?, started_at = ? \
                     WHERE id = ( \
                         SELECT id FROM jobs \
                         WHERE status = ? AND (ended_at IS NULL OR ended_at < ?) \
                         ORDER BY created_at ASC \
                         LIMIT 1 \
                         FOR UPDATE SKIP LOCKED \
                     ) \
                     RETURNING id",
                )
                .bind(JobStatus::InProgress.as_str())
                .bind(now.to_rfc3339())
                .bind(JobStatus::Waiting.as_str())
                .bind(backoff_cutoff.to_rfc3339())
                .fetch_optional(&self.db.pool)
                .await
                .map_err(backend_err)?;
                row.map(|r| r.try_get::<String, _>("id"))
                    .transpose()
                    .map_err(backend_err)?
            }
            Backend::Sqlite => {
                let mut tx = self.db.pool.begin().await.map_err(backend_err)?;
                let candidate: Option<String> = sqlx::query(
                    "SELECT id FROM jobs WHERE status = ? AND (ended_at IS NULL OR ended_at < ?) \
                     ORDER BY created_at ASC LIMIT 1",
                )
                .bind(JobStatus::Waiting.as_str())
                .bind(backoff_cutoff.to_rfc3339())
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend_err)?
                .map(|r| r.try_get::<String, _>("id"))
                .transpose()
                .map_err(backend_err)?;

                let Some(candidate_id) = candidate else {
                    tx.commit().await.map_err(backend_err)?;
                    return Ok(None);
                };

                let rows_affected = sqlx::query(
                    "UPDATE jobs SET status = ?, started_at = ? WHERE id = ? AND status = ?",
                )
                .bind(JobStatus::InProgress.as_str())
                .bind(now.to_rfc3339())
                .bind(&candidate_id)
                .bind(JobStatus::Waiting.as_str())
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?
                .rows_affected();

                tx.commit().await.map_err(backend_err)?;

                if rows_affected == 0 {
                    None
                } else {
                    Some(candidate_id)
                }
            }
        };

        match reserved_id {
            Some(id) => self.find_by_id(
                JobId::from_str(&id).map_err(|e| StoreError::Backend(format!("bad job id: {e}")))?,
            )
            .await,
            None => Ok(None),
        }
    }

    async fn timeout_in_progress(&self, max_duration: Duration) -> Result<u64, StoreError> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(max_duration).unwrap();

        let stuck_ids: Vec<String> = sqlx::query(
            "SELECT id FROM jobs WHERE status = ? AND started_at < ?",
        )
        .bind(JobStatus::InProgress.as_str())
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.db.pool)
        .await
        .map_err(backend_err)?
        .iter()
        .map(|r| r.try_get::<String, _>("id"))
        .collect::<Result<_, _>>()
        .map_err(backend_err)?;

        if stuck_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.pool.begin().await.map_err(backend_err)?;
        for id in &stuck_ids {
            sqlx::query("UPDATE jobs SET status = ?, ended_at = ?, updated_at = ? WHERE id = ?")
                .bind(JobStatus::Error.as_str())
                .bind(now.to_rfc3339())
                .bind(now.to_rfc3339())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(backend_err)?;

            let job_id = JobId::from_str(id)
                .map_err(|e| StoreError::Backend(format!("bad job id: {e}")))?;
            insert_audit(
                &mut tx,
                job_id,
                &crate::model::PendingAudit {
                    request_ip: None,
                    from_status: Some(JobStatus::InProgress),
                    to_status: JobStatus::Error,
                    stdout: Some(String::new()),
                },
                now,
            )
            .await?;
        }
        tx.commit().await.map_err(backend_err)?;

        tracing::warn!(count = stuck_ids.len(), "swept stuck in-progress builds");
        Ok(stuck_ids.len() as u64)
    }

    async fn list_audit(&self, job_id: JobId) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, job_id, request_ip, from_status, to_status, stdout, created_at \
             FROM audit_entries WHERE job_id = ? ORDER BY created_at ASC",
        )
        .bind(job_id.to_string())
        .fetch_all(&self.db.pool)
        .await
        .map_err(backend_err)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(backend_err)?;
                let from_status: Option<String> = row.try_get("from_status").map_err(backend_err)?;
                let to_status: String = row.try_get("to_status").map_err(backend_err)?;
                let created_at: String = row.try_get("created_at").map_err(backend_err)?;
                Ok(AuditEntry {
                    id: AuditEntryId::from_str(&id)
                        .map_err(|e| StoreError::Backend(format!("bad audit id: {e}")))?,
                    job_id,
                    request_ip: row.try_get("request_ip").map_err(backend_err)?,
                    from_status: from_status
                        .as_deref()
                        .map(JobStatus::from_str)
                        .transpose()
                        .map_err(|e| StoreError::Backend(format!("bad status: {e}")))?,
                    to_status: JobStatus::from_str(&to_status)
                        .map_err(|e| StoreError::Backend(format!("bad status: {e}")))?,
                    stdout: row.try_get("stdout").map_err(backend_err)?,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn sample_counts(&self) -> Result<JobCounts, StoreError> {
        let row = sqlx::query(
            "SELECT \
                (SELECT COUNT(*) FROM jobs WHERE status = ?) as queued, \
                (SELECT COUNT(*) FROM jobs WHERE status = ?) as building, \
                (SELECT COUNT(*) FROM jobs WHERE status = ?) as failed",
        )
        .bind(JobStatus::Waiting.as_str())
        .bind(JobStatus::InProgress.as_str())
        .bind(JobStatus::Error.as_str())
        .fetch_one(&self.db.pool)
        .await
        .map_err(backend_err)?;

        Ok(JobCounts {
            queued: row.try_get("queued").map_err(backend_err)?,
            building: row.try_get("building").map_err(backend_err)?,
            failed: row.try_get("failed").map_err(backend_err)?,
        })
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    job_id: JobId,
    pending: &crate::model::PendingAudit,
    created_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO audit_entries (id, job_id, request_ip, from_status, to_status, stdout, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(AuditEntryId::new().to_string())
    .bind(job_id.to_string())
    .bind(&pending.request_ip)
    .bind(pending.from_status.map(|s| s.as_str().to_string()))
    .bind(pending.to_status.as_str())
    .bind(&pending.stdout)
    .bind(created_at.to_rfc3339())
    .execute(&mut *tx)
    .await
    .map_err(backend_err)?;
    Ok(())
}
