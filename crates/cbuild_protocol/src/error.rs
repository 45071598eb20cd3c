//! Typed error taxonomy (§7). Input validation errors carry the offending
//! token so callers can report it back to the client; they never reach the
//! store.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("release not supported: {0}")]
    ReleaseNotSupported(String),
    #[error("target not supported: {0}")]
    TargetNotSupported(String),
    #[error("option flag not supported: {name}={value}")]
    OptionFlagNotSupported { name: String, value: String },
}

/// Failures from the persistent Job Store. Surfaced to API callers as 503;
/// never silently swallowed (§7). The concrete backend (e.g. sqlx) is named
/// only as a string so this crate stays independent of the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job store backend error: {0}")]
    Backend(String),
    #[error(
        "composite failure: build attempt failed ({build_error}) and the post-attempt save also failed ({save_error})"
    )]
    CompositeSaveFailure {
        build_error: String,
        save_error: String,
    },
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("job not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}
