//! Single build-attempt execution (§4.E).
//!
//! Grounded on `original_source/artifactory/artifactory.go`'s `Build`
//! method: attempt bookkeeping, then download -> build -> upload, with
//! `onBuildFailure`'s status-and-audit logic folded into
//! [`BuildDriver::fail_attempt`]. Pulling the build image is a one-time
//! startup concern (`cbuild_worker::Worker::prewarm`), not repeated per
//! attempt here. Composite failure (the
//! attempt fails *and* the post-attempt save also fails) is reported
//! distinctly, matching the original's `"failed to process build: %s and
//! failed to update job: %s"` branch.

pub mod recorder;
pub mod traits;

pub use recorder::BuildLogRecorder;
pub use traits::{ArtifactStorage, FirmwareBuilder, SourceDownloader};

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use cbuild_catalog::render_extra_options;
use cbuild_protocol::error::StoreError;
use cbuild_protocol::job::JobStatus;
use cbuild_store::{Job, JobStore, PendingAudit, MAX_ATTEMPTS};

#[derive(Debug, Error)]
pub enum DriverError {
    /// The attempt itself failed (download/build/upload); the job's state
    /// was nonetheless saved successfully (Waiting for a retry, or Error
    /// if attempts are exhausted).
    #[error("build attempt failed: {0}")]
    Attempt(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct BuildDriver {
    store: Arc<dyn JobStore>,
    source: Arc<dyn SourceDownloader>,
    builder: Arc<dyn FirmwareBuilder>,
    storage: Arc<dyn ArtifactStorage>,
}

impl BuildDriver {
    pub fn new(
        store: Arc<dyn JobStore>,
        source: Arc<dyn SourceDownloader>,
        builder: Arc<dyn FirmwareBuilder>,
        storage: Arc<dyn ArtifactStorage>,
    ) -> Self {
        Self {
            store,
            source,
            builder,
            storage,
        }
    }

    /// Runs one attempt against a job already reserved (`status =
    /// InProgress`, per `reserve_pending`). Returns the persisted job on
    /// success; on a failed attempt that was still saved successfully,
    /// returns [`DriverError::Attempt`] carrying the underlying cause —
    /// the caller should log it and move on, not treat it as fatal.
    pub async fn run_attempt(&self, mut job: Job) -> Result<Job, DriverError> {
        let recorder = BuildLogRecorder::new();

        job.attempts += 1;
        job.started_at = Some(Utc::now());
        job.pending_audit.push(PendingAudit {
            request_ip: None,
            from_status: Some(JobStatus::Waiting),
            to_status: JobStatus::InProgress,
            stdout: None,
        });

        if let Err(error) = self.source.download(&job.commit_hash, &recorder).await {
            return self.fail_attempt(job, &recorder, error).await;
        }

        let extra_options = render_extra_options(&job.build_flags);
        let firmware = match self
            .builder
            .build(&job.container_image, &job.target, &extra_options, &recorder)
            .await
        {
            Ok(bytes) => bytes,
            Err(error) => return self.fail_attempt(job, &recorder, error).await,
        };

        let filename = format!("{}-{}.bin", job.commit_hash, job.fingerprint);
        if let Err(error) = self.storage.upload(&firmware, &filename).await {
            return self.fail_attempt(job, &recorder, error).await;
        }

        job.push_artifact("firmware".to_string(), filename, firmware.len() as i64);
        job.push_audit(JobStatus::Success, None, Some(recorder.logs()));
        job.status = JobStatus::Success;
        job.ended_at = Some(Utc::now());

        self.store.save(&mut job).await?;
        Ok(job)
    }

    async fn fail_attempt(
        &self,
        mut job: Job,
        recorder: &BuildLogRecorder,
        build_error: String,
    ) -> Result<Job, DriverError> {
        job.ended_at = Some(Utc::now());
        let new_status = if job.attempts >= MAX_ATTEMPTS {
            JobStatus::Error
        } else {
            JobStatus::Waiting
        };
        job.push_audit(new_status, None, Some(recorder.logs()));
        job.status = new_status;

        match self.store.save(&mut job).await {
            Ok(()) => Err(DriverError::Attempt(build_error)),
            Err(save_error) => Err(DriverError::Store(StoreError::CompositeSaveFailure {
                build_error,
                save_error: save_error.to_string(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cbuild_db::DbPool;
    use cbuild_protocol::job::RequestFlagView;
    use cbuild_store::{NewJob, SqlJobStore};
    use std::sync::Mutex;

    struct OkDownloader;
    #[async_trait]
    impl SourceDownloader for OkDownloader {
        async fn download(&self, _commit_hash: &str, recorder: &BuildLogRecorder) -> Result<(), String> {
            recorder.add_stdout("cloned\n");
            Ok(())
        }
    }

    struct FailingDownloader;
    #[async_trait]
    impl SourceDownloader for FailingDownloader {
        async fn download(&self, _commit_hash: &str, _recorder: &BuildLogRecorder) -> Result<(), String> {
            Err("git fetch failed".to_string())
        }
    }

    struct OkBuilder;
    #[async_trait]
    impl FirmwareBuilder for OkBuilder {
        async fn pull_image(&self, _container_image: &str) -> Result<(), String> {
            Ok(())
        }
        async fn build(
            &self,
            _container_image: &str,
            _target: &str,
            _extra_options: &str,
            recorder: &BuildLogRecorder,
        ) -> Result<Vec<u8>, String> {
            recorder.add_stdout("built\n");
            Ok(vec![0xDE, 0xAD, 0xBE, 0xEF])
        }
    }

    struct OkStorage {
        uploaded: Mutex<Vec<String>>,
    }
    impl OkStorage {
        fn new() -> Self {
            Self {
                uploaded: Mutex::new(Vec::new()),
            }
        }
    }
    #[async_trait]
    impl ArtifactStorage for OkStorage {
        async fn upload(&self, _data: &[u8], filename: &str) -> Result<(), String> {
            self.uploaded.lock().unwrap().push(filename.to_string());
            Ok(())
        }
    }

    async fn reserved_job(store: &SqlJobStore) -> Job {
        store
            .create(NewJob {
                release: "v1.2.3".to_string(),
                commit_hash: "3ca63cbb".to_string(),
                target: "mydreamradio".to_string(),
                option_flags: vec![RequestFlagView {
                    name: "language".into(),
                    value: "FR".into(),
                }],
                build_flags: vec![],
                container_image: "edgetx/build:v1.2.3".to_string(),
                fingerprint: "fp1".to_string(),
                initial_audit: PendingAudit {
                    request_ip: None,
                    from_status: None,
                    to_status: JobStatus::Waiting,
                },
            })
            .await
            .unwrap();
        store.reserve_pending().await.unwrap().unwrap()
    }

    async fn store() -> Arc<SqlJobStore> {
        let db = DbPool::connect("sqlite::memory:").await.unwrap();
        cbuild_db::migrate(&db).await.unwrap();
        Arc::new(SqlJobStore::new(db))
    }

    #[tokio::test]
    async fn successful_attempt_persists_artifact_and_marks_success() {
        let store = store().await;
        let job = reserved_job(&store).await;
        let driver = BuildDriver::new(
            store.clone(),
            Arc::new(OkDownloader),
            Arc::new(OkBuilder),
            Arc::new(OkStorage::new()),
        );

        let finished = driver.run_attempt(job).await.unwrap();
        assert_eq!(finished.status, JobStatus::Success);
        assert_eq!(finished.artifacts.len(), 1);
        assert_eq!(finished.artifacts[0].filename, "3ca63cbb-fp1.bin");

        let logs = store.list_audit(finished.id).await.unwrap();
        assert_eq!(logs.last().unwrap().to_status, JobStatus::Success);
        assert!(logs.last().unwrap().stdout.as_deref().unwrap().contains("built"));
    }

    #[tokio::test]
    async fn failed_download_requeues_as_waiting_below_max_attempts() {
        let store = store().await;
        let job = reserved_job(&store).await;
        let driver = BuildDriver::new(
            store.clone(),
            Arc::new(FailingDownloader),
            Arc::new(OkBuilder),
            Arc::new(OkStorage::new()),
        );

        let err = driver.run_attempt(job).await.unwrap_err();
        assert!(matches!(err, DriverError::Attempt(msg) if msg == "git fetch failed"));

        let reloaded = store.find_by_id(
            store.list(&Default::default()).await.unwrap().items[0].id,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(reloaded.status, JobStatus::Waiting);
        assert_eq!(reloaded.attempts, 1);
    }

    #[tokio::test]
    async fn failed_attempt_at_max_attempts_becomes_terminal_error() {
        let store = store().await;
        let mut job = reserved_job(&store).await;
        job.attempts = MAX_ATTEMPTS - 1;
        store.save(&mut job).await.unwrap();
        let job = store.find_by_id(job.id).await.unwrap().unwrap();

        let driver = BuildDriver::new(
            store.clone(),
            Arc::new(FailingDownloader),
            Arc::new(OkBuilder),
            Arc::new(OkStorage::new()),
        );

        let err = driver.run_attempt(job).await.unwrap_err();
        assert!(matches!(err, DriverError::Attempt(_)));

        let reloaded = store.find_by_id(
            store.list(&Default::default()).await.unwrap().items[0].id,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(reloaded.status, JobStatus::Error);
        assert_eq!(reloaded.attempts, MAX_ATTEMPTS);
    }

    struct AlwaysFailingSaveStore;
    #[async_trait]
    impl JobStore for AlwaysFailingSaveStore {
        async fn get_by_key(&self, _: &str, _: &str, _: &str) -> Result<Option<Job>, StoreError> {
            unimplemented!("not exercised by run_attempt")
        }
        async fn find_by_id(&self, _: cbuild_ids::JobId) -> Result<Option<Job>, StoreError> {
            unimplemented!()
        }
        async fn create(&self, _: NewJob) -> Result<Job, StoreError> {
            unimplemented!()
        }
        async fn save(&self, _job: &mut Job) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
        async fn delete(&self, _: cbuild_ids::JobId) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn list(
            &self,
            _: &cbuild_protocol::query::JobQuery,
        ) -> Result<cbuild_protocol::query::Page<Job>, StoreError> {
            unimplemented!()
        }
        async fn reserve_pending(&self) -> Result<Option<Job>, StoreError> {
            unimplemented!()
        }
        async fn timeout_in_progress(&self, _: std::time::Duration) -> Result<u64, StoreError> {
            unimplemented!()
        }
        async fn list_audit(&self, _: cbuild_ids::JobId) -> Result<Vec<cbuild_store::AuditEntry>, StoreError> {
            unimplemented!()
        }
        async fn sample_counts(&self) -> Result<cbuild_store::JobCounts, StoreError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn composite_failure_when_save_also_fails_after_attempt_failure() {
        let backing = store().await;
        let job = reserved_job(&backing).await;

        let driver = BuildDriver::new(
            Arc::new(AlwaysFailingSaveStore),
            Arc::new(FailingDownloader),
            Arc::new(OkBuilder),
            Arc::new(OkStorage::new()),
        );

        let err = driver.run_attempt(job).await.unwrap_err();
        assert!(matches!(
            err,
            DriverError::Store(StoreError::CompositeSaveFailure { .. })
        ));
    }
}
