//! The request-side of the Job state machine (§4.D).
//!
//! Grounded on `original_source/artifactory/artifactory.go`:
//! `CreateBuildJob`'s existing-job branch (restart-from-`Error` vs.
//! idempotent-return) maps directly onto [`Coordinator::submit`].

use std::sync::Arc;

use cbuild_catalog::Catalog;
use cbuild_fingerprint::{fingerprint, OptionFlag};
use cbuild_ids::JobId;
use cbuild_protocol::error::CoordinatorError;
use cbuild_protocol::job::{ArtifactView, AuditEntryView, JobView, RequestFlagView};
use cbuild_protocol::query::{JobQuery, Page};
use cbuild_protocol::request::BuildRequest;
use cbuild_store::{Job, JobStore, NewJob, PendingAudit};

pub struct Coordinator {
    store: Arc<dyn JobStore>,
    catalog: Arc<Catalog>,
    /// Prefix joined with an artifact's filename to form its download URL
    /// (§6.2); configuration loading itself is out of scope here.
    download_url_prefix: String,
}

impl Coordinator {
    pub fn new(store: Arc<dyn JobStore>, catalog: Arc<Catalog>, download_url_prefix: String) -> Self {
        Self {
            store,
            catalog,
            download_url_prefix,
        }
    }

    /// Validates `release`, then `target`, then each flag in order,
    /// returning the first failure (§6.1 validation order).
    fn validate(&self, request: &BuildRequest) -> Result<(String, String), CoordinatorError> {
        let snapshot = self.catalog.snapshot();
        if !snapshot.is_ref_supported(&request.release) {
            return Err(CoordinatorError::Catalog(
                cbuild_protocol::error::CatalogError::ReleaseNotSupported(request.release.clone()),
            ));
        }
        if !snapshot.is_target_supported(&request.target, &request.release) {
            return Err(CoordinatorError::Catalog(
                cbuild_protocol::error::CatalogError::TargetNotSupported(request.target.clone()),
            ));
        }
        for flag in &request.flags {
            if !snapshot.is_option_supported(&request.target, &flag.name, &flag.value) {
                return Err(CoordinatorError::Catalog(
                    cbuild_protocol::error::CatalogError::OptionFlagNotSupported {
                        name: flag.name.clone(),
                        value: flag.value.clone(),
                    },
                ));
            }
        }
        let commit_hash = snapshot
            .resolve_commit(&request.release)
            .expect("release validated above");
        let option_flags: Vec<OptionFlag> = request
            .flags
            .iter()
            .map(|f| OptionFlag::new(f.name.clone(), f.value.clone()))
            .collect();
        let key_fingerprint = fingerprint(&request.target, &option_flags);
        Ok((commit_hash, key_fingerprint))
    }

    pub async fn submit(
        &self,
        request: &BuildRequest,
        requester_ip: Option<String>,
    ) -> Result<JobView, CoordinatorError> {
        let (commit_hash, key_fingerprint) = self.validate(request)?;

        let existing = self
            .store
            .get_by_key(&commit_hash, &request.target, &key_fingerprint)
            .await?;

        if let Some(mut job) = existing {
            if job.status == cbuild_protocol::job::JobStatus::Error {
                job.attempts = 0;
                job.push_audit(
                    cbuild_protocol::job::JobStatus::Waiting,
                    requester_ip,
                    None,
                );
                job.status = cbuild_protocol::job::JobStatus::Waiting;
                self.store.save(&mut job).await?;
                tracing::info!(job_id = %job.id, "restarted job from error");
            }
            return Ok(self.to_view(&job));
        }

        let snapshot = self.catalog.snapshot();
        let build_flags = snapshot.resolve_build_flags(&request.target, &request.flags)?;
        let container_image = snapshot
            .build_container(&request.release)
            .expect("release validated above");

        let new_job = NewJob {
            release: request.release.clone(),
            commit_hash,
            target: request.target.clone(),
            option_flags: request
                .flags
                .iter()
                .map(|f| RequestFlagView {
                    name: f.name.clone(),
                    value: f.value.clone(),
                })
                .collect(),
            build_flags,
            container_image,
            fingerprint: key_fingerprint,
            initial_audit: PendingAudit {
                request_ip: requester_ip,
                from_status: None,
                to_status: cbuild_protocol::job::JobStatus::Waiting,
            },
        };

        let created = self.store.create(new_job).await?;
        tracing::info!(job_id = %created.id, "created job");
        Ok(self.to_view(&created))
    }

    pub async fn get(&self, request: &BuildRequest) -> Result<JobView, CoordinatorError> {
        let (commit_hash, key_fingerprint) = self.validate(request)?;
        let job = self
            .store
            .get_by_key(&commit_hash, &request.target, &key_fingerprint)
            .await?
            .ok_or(CoordinatorError::NotFound)?;
        Ok(self.to_view(&job))
    }

    pub async fn list(&self, query: &JobQuery) -> Result<Page<JobView>, CoordinatorError> {
        let page = self.store.list(query).await?;
        let items = page.items.iter().map(|j| self.to_view(j)).collect();
        Ok(Page::new(items, page.total, page.limit, page.offset))
    }

    pub async fn get_logs(&self, job_id: JobId) -> Result<Vec<AuditEntryView>, CoordinatorError> {
        let entries = self.store.list_audit(job_id).await?;
        Ok(entries
            .into_iter()
            .map(|e| AuditEntryView {
                id: e.id,
                job_id: e.job_id,
                request_ip: e.request_ip,
                from_status: e.from_status,
                to_status: e.to_status,
                stdout: e.stdout,
                created_at: e.created_at,
            })
            .collect())
    }

    pub async fn delete(&self, job_id: JobId) -> Result<(), CoordinatorError> {
        self.store.delete(job_id).await?;
        Ok(())
    }

    fn to_view(&self, job: &Job) -> JobView {
        JobView {
            id: job.id,
            status: job.status,
            attempts: job.attempts,
            release: job.release.clone(),
            commit_hash: job.commit_hash.clone(),
            target: job.target.clone(),
            option_flags: job.option_flags.clone(),
            build_flags: job.build_flags.clone(),
            container_image: job.container_image.clone(),
            fingerprint: job.fingerprint.clone(),
            started_at: job.started_at,
            ended_at: job.ended_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
            artifacts: job
                .artifacts
                .iter()
                .map(|a| ArtifactView {
                    id: a.id,
                    slug: a.slug.clone(),
                    filename: a.filename.clone(),
                    size: a.size,
                    download_url: format!("{}/{}", self.download_url_prefix, a.filename),
                    created_at: a.created_at,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbuild_catalog::{Catalog, RemoteShaResolver, TargetsDef};
    use cbuild_db::DbPool;
    use cbuild_protocol::request::RequestFlag;
    use cbuild_store::SqlJobStore;
    use std::collections::BTreeMap;

    struct NoopResolver;

    #[async_trait::async_trait]
    impl RemoteShaResolver for NoopResolver {
        async fn fetch(&self, _release_ref: &str) -> Result<String, String> {
            unreachable!("fixture releases always carry an explicit sha")
        }
    }

    async fn fixture() -> Coordinator {
        let db = DbPool::connect("sqlite::memory:").await.unwrap();
        cbuild_db::migrate(&db).await.unwrap();
        let store = Arc::new(SqlJobStore::new(db));

        let mut def = TargetsDef::default();
        def.releases.insert(
            "v1.2.3".to_string(),
            cbuild_catalog::Release {
                sha: Some("3ca63cbb".to_string()),
                exclude_targets: vec![],
                build_container: "edgetx/build:v1.2.3".to_string(),
                version: "1.2.3".to_string(),
                parsed_version: None,
                remote_backed: false,
            },
        );
        def.option_flags.insert(
            "language".to_string(),
            cbuild_catalog::OptionFlagDef {
                build_flag: "TRANSLATIONS".to_string(),
                values: vec!["FR".to_string()],
            },
        );
        def.option_flags.insert(
            "foo".to_string(),
            cbuild_catalog::OptionFlagDef {
                build_flag: "FOO".to_string(),
                values: vec!["BAR".to_string()],
            },
        );
        def.targets.insert(
            "mydreamradio".to_string(),
            cbuild_catalog::Target {
                description: "test".to_string(),
                tags: vec![],
                build_flags: BTreeMap::new(),
                version_constraint: None,
                parsed_constraint: None,
            },
        );
        let catalog = Arc::new(Catalog::load(def, &NoopResolver).await.unwrap());

        Coordinator::new(store, catalog, "https://downloads.example/firmware".to_string())
    }

    fn s1_request() -> BuildRequest {
        BuildRequest {
            release: "v1.2.3".to_string(),
            target: "mydreamradio".to_string(),
            flags: vec![
                RequestFlag::new("language", "FR"),
                RequestFlag::new("foo", "BAR"),
            ],
        }
    }

    #[tokio::test]
    async fn submit_creates_a_waiting_job() {
        let coordinator = fixture().await;
        let view = coordinator.submit(&s1_request(), Some("127.0.0.1".into())).await.unwrap();
        assert_eq!(view.status, cbuild_protocol::job::JobStatus::Waiting);
        assert_eq!(view.commit_hash, "3ca63cbb");
    }

    #[tokio::test]
    async fn submit_is_idempotent_for_reordered_flags() {
        let coordinator = fixture().await;
        let first = coordinator.submit(&s1_request(), None).await.unwrap();

        let reordered = BuildRequest {
            release: "v1.2.3".to_string(),
            target: "mydreamradio".to_string(),
            flags: vec![
                RequestFlag::new("foo", "BAR"),
                RequestFlag::new("language", "FR"),
            ],
        };
        let second = coordinator.submit(&reordered, None).await.unwrap();
        assert_eq!(first.id, second.id);

        let logs = coordinator.get_logs(first.id).await.unwrap();
        assert_eq!(logs.len(), 1, "no new audit entry on idempotent resubmit");
    }

    #[tokio::test]
    async fn submit_rejects_unsupported_release() {
        let coordinator = fixture().await;
        let request = BuildRequest {
            release: "v9.9.9".to_string(),
            ..s1_request()
        };
        let err = coordinator.submit(&request, None).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Catalog(cbuild_protocol::error::CatalogError::ReleaseNotSupported(_))
        ));
    }

    #[tokio::test]
    async fn restart_from_error_resets_attempts_and_appends_one_audit_entry() {
        let coordinator = fixture().await;
        let created = coordinator.submit(&s1_request(), None).await.unwrap();

        let mut job = coordinator
            .store
            .find_by_id(created.id)
            .await
            .unwrap()
            .unwrap();
        job.status = cbuild_protocol::job::JobStatus::Error;
        job.attempts = 3;
        job.push_audit(cbuild_protocol::job::JobStatus::Error, None, Some(String::new()));
        coordinator.store.save(&mut job).await.unwrap();

        let restarted = coordinator
            .submit(&s1_request(), Some("10.0.0.1".into()))
            .await
            .unwrap();
        assert_eq!(restarted.id, created.id);
        assert_eq!(restarted.status, cbuild_protocol::job::JobStatus::Waiting);
        assert_eq!(restarted.attempts, 0);

        let logs = coordinator.get_logs(created.id).await.unwrap();
        assert_eq!(logs.last().unwrap().to_status, cbuild_protocol::job::JobStatus::Waiting);
        assert_eq!(logs.last().unwrap().from_status, Some(cbuild_protocol::job::JobStatus::Error));
    }

    #[tokio::test]
    async fn get_returns_not_found_for_unsubmitted_request() {
        let coordinator = fixture().await;
        let err = coordinator.get(&s1_request()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound));
    }
}
