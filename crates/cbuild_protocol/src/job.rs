//! Job, Artifact, Audit entry, and Worker views (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cbuild_ids::{ArtifactId, AuditEntryId, JobId, WorkerId};

/// The authoritative state machine of §4.D.
///
/// ```text
/// Void  ──submit──▶ Waiting
/// Waiting ──reserve──▶ InProgress
/// InProgress ──success──▶ Success           (terminal until delete)
/// InProgress ──fail, attempts<MAX──▶ Waiting
/// InProgress ──fail, attempts≥MAX──▶ Error  (terminal until restart)
/// Error ──submit──▶ Waiting  (attempts reset)
/// InProgress ──timeout sweep──▶ Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    InProgress,
    Success,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::InProgress => "in_progress",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid job status: {0}")]
pub struct JobStatusParseError(String);

impl std::str::FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobStatus::Waiting),
            "in_progress" => Ok(JobStatus::InProgress),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(JobStatusParseError(other.to_string())),
        }
    }
}

/// A single (name, value) effective compiler flag, after catalog resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFlag {
    pub key: String,
    pub value: String,
}

/// A stored output blob owned by a Job (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactView {
    pub id: ArtifactId,
    pub slug: String,
    pub filename: String,
    pub size: i64,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

/// An append-only audit log row (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntryView {
    pub id: AuditEntryId,
    pub job_id: JobId,
    pub request_ip: Option<String>,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub stdout: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A full Job projection, as returned by the Coordinator (§4.D).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
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
    pub artifacts: Vec<ArtifactView>,
}

/// The user-submitted form of an option flag, echoed back on the Job (§3: `option_flags`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlagView {
    pub name: String,
    pub value: String,
}

/// A registered worker executor (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: WorkerId,
    pub hostname: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
