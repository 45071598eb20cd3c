//! Database backend abstraction for the Job Store (§4.C).
//!
//! A thin pool wrapper over `sqlx`'s backend-agnostic `Any` driver, so
//! `cbuild_store` can issue SQL against either SQLite (tests, small
//! deployments) or Postgres (production, `FOR UPDATE SKIP LOCKED`-capable)
//! without a generic parameter threaded through every query. Backend
//! detection and the `BackendError` shape follow `casparian_db`'s
//! `DatabaseType::from_url` / `BackendError`; the pool itself follows
//! `casparian_sentinel`'s direct `sqlx::Pool` usage rather than
//! `casparian_db`'s DuckDB-specific connection type, since this service
//! needs row-level locking semantics DuckDB's single-writer model doesn't
//! provide.

pub mod migrate;

pub use migrate::migrate;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use thiserror::Error;

/// Which concrete engine a connection URL names. `reserve_pending`'s SQL
/// text differs between the two (`FOR UPDATE SKIP LOCKED` is Postgres-only);
/// everything else is written portably against `AnyPool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Some(Self::Postgres)
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unrecognized database URL scheme: {0}")]
    UnknownScheme(String),
    #[error("database connection error: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(String),
}

/// A connected pool plus the backend it talks to, so callers building SQL
/// can branch once at the call site instead of re-detecting per query.
pub struct DbPool {
    pub pool: AnyPool,
    pub backend: Backend,
}

impl DbPool {
    pub async fn connect(database_url: &str) -> Result<Self, BackendError> {
        sqlx::any::install_default_drivers();
        let backend = Backend::from_url(database_url)
            .ok_or_else(|| BackendError::UnknownScheme(database_url.to_string()))?;
        // A bare `sqlite::memory:` database is private per-connection; cap
        // the pool at one connection so pooled callers all see the same
        // in-memory database instead of silently distinct empty ones.
        let max_connections = match backend {
            Backend::Sqlite if database_url.contains(":memory:") => 1,
            _ => 10,
        };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        tracing::info!(?backend, "connected to job store database");
        Ok(Self { pool, backend })
    }
}
