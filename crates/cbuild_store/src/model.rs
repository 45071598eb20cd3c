//! The Job Store's own entity shapes (§3). Distinct from
//! `cbuild_protocol::job::JobView`: the view is what crosses the API
//! boundary (decorated with download URLs, no audit trail attached); these
//! are what the store persists and cascades.

use chrono::{DateTime, Utc};

use cbuild_ids::{ArtifactId, AuditEntryId, JobId};
use cbuild_protocol::job::{BuildFlag, JobStatus, RequestFlagView};

#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: ArtifactId,
    pub slug: String,
    pub filename: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub job_id: JobId,
    pub request_ip: Option<String>,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub stdout: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An audit row not yet assigned an id/timestamp — appended by `save`/`create`.
#[derive(Debug, Clone)]
pub struct PendingAudit {
    pub request_ip: Option<String>,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub stdout: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub attempts: u32,
    pub release: String,
    pub commit_hash: String,
    pub target: String,
    pub option_flags: Vec<RequestFlagView>,
    pub build_flags: Vec<BuildFlag>,
    pub container_image: String,
    pub fingerprint: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub artifacts: Vec<Artifact>,
    /// Audit rows queued by a state transition but not yet flushed by
    /// `save`. Drained (and the id assigned) on a successful save.
    pub pending_audit: Vec<PendingAudit>,
    /// Artifacts queued by `push_artifact` but not yet inserted. Drained on
    /// a successful save; `artifacts` always holds the full known set.
    pub pending_artifacts: Vec<Artifact>,
}

impl Job {
    pub fn push_audit(
        &mut self,
        to_status: JobStatus,
        request_ip: Option<String>,
        stdout: Option<String>,
    ) {
        self.pending_audit.push(PendingAudit {
            request_ip,
            from_status: Some(self.status),
            to_status,
            stdout,
        });
    }

    pub fn push_artifact(&mut self, slug: String, filename: String, size: i64) {
        let artifact = Artifact {
            id: ArtifactId::new(),
            slug,
            filename,
            size,
            created_at: Utc::now(),
        };
        self.artifacts.push(artifact.clone());
        self.pending_artifacts.push(artifact);
    }
}

/// Everything the Coordinator supplies to create a brand-new Job; the store
/// assigns `id`/`created_at`/`updated_at` and persists the initial audit row.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub release: String,
    pub commit_hash: String,
    pub target: String,
    pub option_flags: Vec<RequestFlagView>,
    pub build_flags: Vec<BuildFlag>,
    pub container_image: String,
    pub fingerprint: String,
    pub initial_audit: PendingAudit,
}
