//! Narrow collaborator contracts the driver builds an attempt around.
//!
//! Container runtime, VCS client, and object storage internals are
//! non-goals (spec.md §1) — these traits are the seams an embedder plugs
//! its own implementation into, grounded on the interfaces
//! `original_source/source/downloader.go`, `firmware/builder.go`, and
//! `storage/handler.go` expose in the original service.

use async_trait::async_trait;

use crate::recorder::BuildLogRecorder;

/// Fetches a commit into a scratch workspace the implementation owns.
/// The source repository URL itself is the implementation's own
/// configuration, not a per-call parameter (§1 Non-goals).
#[async_trait]
pub trait SourceDownloader: Send + Sync {
    async fn download(&self, commit_hash: &str, recorder: &BuildLogRecorder) -> Result<(), String>;
}

/// Runs the firmware build inside a container image (§4.E, §5 supplement
/// for `extra_options` rendering).
#[async_trait]
pub trait FirmwareBuilder: Send + Sync {
    /// Best-effort cache warm; a failure here is logged and never fails
    /// the attempt (§5 supplement, `processor/worker.go`'s `PullImage`).
    async fn pull_image(&self, container_image: &str) -> Result<(), String>;

    async fn build(
        &self,
        container_image: &str,
        target: &str,
        extra_options: &str,
        recorder: &BuildLogRecorder,
    ) -> Result<Vec<u8>, String>;
}

/// Persists the built firmware blob under `filename`.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn upload(&self, data: &[u8], filename: &str) -> Result<(), String>;
}
