//! Bearer-token auth contract for admin endpoints (§6.1, §3).
//!
//! Token *issuance* and the credential store behind it are non-goals
//! (spec.md §1) — HTTP transport isn't this crate's concern either. What
//! remains in scope is the bearer-token *shape* (`AccessKey-SecretKey`,
//! grounded on `original_source/auth/auth.go`'s `generateCredentials`/
//! `Authenticate`) and the `AuthValidator` trait the admin routes' external
//! collaborator must satisfy.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication failed")]
    Failed,
    #[error("token expired")]
    Expired,
    #[error("malformed bearer token")]
    Malformed,
}

/// `"{access_key}-{secret_key}"` as carried in `Authorization: Bearer …`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_key: String,
    pub secret_key: String,
}

impl BearerToken {
    /// Splits on the first `-`; `original_source/auth/auth.go` generates a
    /// fixed-length alphanumeric access key with no `-` in its alphabet, so
    /// this unambiguously separates the two parts.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let (access_key, secret_key) = raw.split_once('-').ok_or(AuthError::Malformed)?;
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(AuthError::Malformed);
        }
        Ok(Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

/// A persisted credential record (§3 `AuthToken`). Construction and storage
/// are the issuance collaborator's concern, not this crate's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub access_key: String,
    pub secret_key_hash: String,
    pub user: String,
    pub valid_until: Option<DateTime<Utc>>,
}

/// What an admin route needs to authenticate a bearer token: look up the
/// token by access key and compare against the bcrypt-hashed secret. A
/// constant-time comparison against a fixed dummy hash on lookup miss
/// (`original_source/auth/auth.go`'s fallback) is the implementation's
/// responsibility, not this trait's.
#[async_trait::async_trait]
pub trait AuthValidator: Send + Sync {
    async fn find_by_access_key(&self, access_key: &str) -> Option<AuthToken>;

    /// Compares a plaintext secret key against its stored hash. Left to the
    /// implementor (bcrypt in the original service) — this crate only
    /// defines where the comparison plugs in.
    fn verify_secret(&self, secret_key: &str, secret_key_hash: &str) -> bool;

    async fn authenticate(&self, token: &BearerToken) -> Result<(), AuthError> {
        let record = self.find_by_access_key(&token.access_key).await;
        let Some(record) = record else {
            return Err(AuthError::Failed);
        };
        if !self.verify_secret(&token.secret_key, &record.secret_key_hash) {
            return Err(AuthError::Failed);
        }
        if let Some(valid_until) = record.valid_until {
            if valid_until <= Utc::now() {
                return Err(AuthError::Expired);
            }
        }
        Ok(())
    }
}
