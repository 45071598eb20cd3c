//! Schema creation. Written portably (TEXT/INTEGER columns, RFC3339
//! timestamps) so the same statements run against SQLite or Postgres via
//! `AnyPool`, the way `casparian_sentinel`'s test harness constructs its
//! queue table inline rather than through a migration-file runner.

use crate::{BackendError, DbPool};

const CREATE_JOBS: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    release TEXT NOT NULL,
    commit_hash TEXT NOT NULL,
    target TEXT NOT NULL,
    option_flags TEXT NOT NULL,
    build_flags TEXT NOT NULL,
    container_image TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(commit_hash, target, fingerprint)
)
"#;

const CREATE_ARTIFACTS: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    slug TEXT NOT NULL,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at TEXT NOT NULL
)
"#;

const CREATE_AUDIT_ENTRIES: &str = r#"
CREATE TABLE IF NOT EXISTS audit_entries (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    request_ip TEXT,
    from_status TEXT,
    to_status TEXT NOT NULL,
    stdout TEXT,
    created_at TEXT NOT NULL
)
"#;

const CREATE_WORKERS: &str = r#"
CREATE TABLE IF NOT EXISTS workers (
    id TEXT PRIMARY KEY,
    hostname TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
"#;

pub async fn migrate(db: &DbPool) -> Result<(), BackendError> {
    for statement in [
        CREATE_JOBS,
        CREATE_ARTIFACTS,
        CREATE_AUDIT_ENTRIES,
        CREATE_WORKERS,
    ] {
        sqlx::query(statement)
            .execute(&db.pool)
            .await
            .map_err(|e| BackendError::Migration(e.to_string()))?;
    }
    Ok(())
}
