//! Loading, the atomic snapshot holder, and the background refresher (§4.A).
//!
//! Grounded on `targets/remote_sha.go` (fetch-a-tag's-sha contract) and
//! `targets/updater.go` (sleep/re-resolve/store loop) from the original
//! Go service, translated into a `tokio::spawn`ed loop over an
//! `arc_swap::ArcSwap` instead of a package-level mutable singleton.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::snapshot::{self, CatalogLoadError, TargetsDef};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Resolves a release's commit sha from wherever it's hosted (a VCS tag
/// listing, typically). Non-goal per spec.md §1: the VCS client itself is
/// a narrow external collaborator, this trait is its contract.
#[async_trait]
pub trait RemoteShaResolver: Send + Sync {
    async fn fetch(&self, release_ref: &str) -> Result<String, String>;
}

/// Process-wide shared catalog snapshot, published by atomic pointer swap.
/// Readers never block; a reader observing the previous pointer sees a
/// complete prior snapshot, never a mixed view (§4.A, §9).
pub struct Catalog {
    current: ArcSwap<TargetsDef>,
}

impl Catalog {
    /// Resolves every release with no explicit `sha` via `resolver`, then
    /// finalizes version parsing. A release that still has no sha afterward
    /// is a fatal load error (§4.A).
    pub async fn load(
        mut raw: TargetsDef,
        resolver: &dyn RemoteShaResolver,
    ) -> Result<Self, CatalogLoadError> {
        let refs_needing_resolution: Vec<String> = raw
            .releases
            .iter()
            .filter(|(_, r)| r.sha.is_none())
            .map(|(r, _)| r.clone())
            .collect();

        for release_ref in &refs_needing_resolution {
            let sha =
                resolver
                    .fetch(release_ref)
                    .await
                    .map_err(|message| CatalogLoadError::RemoteFetch {
                        release_ref: release_ref.clone(),
                        message,
                    })?;
            let release = raw.releases.get_mut(release_ref).unwrap();
            release.sha = Some(sha);
            release.remote_backed = true;
        }

        for (release_ref, release) in &raw.releases {
            if release.sha.is_none() {
                return Err(CatalogLoadError::UnresolvedSha(release_ref.clone()));
            }
        }

        let finalized = snapshot::finalize(raw)?;
        Ok(Self {
            current: ArcSwap::from_pointee(finalized),
        })
    }

    pub fn snapshot(&self) -> Arc<TargetsDef> {
        self.current.load_full()
    }

    /// Re-resolves every remote-backed release's sha and publishes the
    /// result as a new snapshot. A release with an explicitly pinned `sha`
    /// (`remote_backed == false`) is left untouched. Never mutates the
    /// currently-published snapshot in place (§4.A).
    pub async fn refresh(&self, resolver: &dyn RemoteShaResolver) -> Result<(), CatalogLoadError> {
        let mut next = (*self.current.load_full()).clone();
        for (release_ref, release) in next.releases.iter_mut() {
            if !release.remote_backed {
                continue;
            }
            match resolver.fetch(release_ref).await {
                Ok(sha) => release.sha = Some(sha),
                Err(message) => {
                    tracing::warn!(release_ref, %message, "catalog refresh: sha fetch failed, keeping previous value");
                }
            }
        }
        let finalized = snapshot::finalize(next)?;
        self.current.store(Arc::new(finalized));
        Ok(())
    }
}

/// Spawns the 5-minute refresh loop (§4.G). Runs until `shutdown` resolves.
pub fn spawn_refresher(
    catalog: Arc<Catalog>,
    resolver: Arc<dyn RemoteShaResolver>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {
                    if let Err(error) = catalog.refresh(resolver.as_ref()).await {
                        tracing::error!(%error, "catalog refresh failed");
                    } else {
                        tracing::info!("catalog snapshot refreshed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
