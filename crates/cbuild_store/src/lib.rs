//! Persistent repository of jobs, artifacts, and the audit log (§4.C).

pub mod model;
pub mod store;
pub mod worker_store;

pub use model::{Artifact, AuditEntry, Job, NewJob, PendingAudit};
pub use store::{JobCounts, JobStore, SqlJobStore, BACKOFF, MAX_ATTEMPTS, MAX_BUILD_DURATION};
pub use worker_store::{SqlWorkerStore, WorkerStore};

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cbuild_db::DbPool;
    use cbuild_protocol::job::{JobStatus, RequestFlagView};
    use cbuild_protocol::query::JobQuery;

    use crate::model::{NewJob, PendingAudit};
    use crate::store::{JobStore, SqlJobStore};

    async fn setup() -> SqlJobStore {
        let db = DbPool::connect("sqlite::memory:").await.unwrap();
        cbuild_db::migrate(&db).await.unwrap();
        SqlJobStore::new(db)
    }

    fn sample_new_job(target: &str, fingerprint: &str) -> NewJob {
        NewJob {
            release: "v1.2.3".to_string(),
            commit_hash: "3ca63cbb".to_string(),
            target: target.to_string(),
            option_flags: vec![RequestFlagView {
                name: "language".into(),
                value: "FR".into(),
            }],
            build_flags: vec![],
            container_image: "edgetx/build:v1.2.3".to_string(),
            fingerprint: fingerprint.to_string(),
            initial_audit: PendingAudit {
                request_ip: Some("127.0.0.1".to_string()),
                from_status: None,
                to_status: JobStatus::Waiting,
            },
        }
    }

    #[tokio::test]
    async fn create_then_get_by_key_round_trips() {
        let store = setup().await;
        let created = store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();
        assert_eq!(created.status, JobStatus::Waiting);
        assert_eq!(created.attempts, 0);

        let fetched = store
            .get_by_key("3ca63cbb", "mydreamradio", "fp1")
            .await
            .unwrap()
            .expect("job exists");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.option_flags.len(), 1);

        let logs = store.list_audit(created.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].to_status, JobStatus::Waiting);
        assert_eq!(logs[0].from_status, None);
    }

    #[tokio::test]
    async fn reserve_pending_returns_exactly_one_job_to_two_racers() {
        let store = setup().await;
        store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();

        let a = store.reserve_pending().await.unwrap();
        let b = store.reserve_pending().await.unwrap();

        assert!(a.is_some());
        assert!(b.is_none());
        assert_eq!(a.unwrap().status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn reserve_pending_skips_jobs_within_backoff() {
        let store = setup().await;
        let mut job = store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();

        job.status = JobStatus::InProgress;
        job.ended_at = Some(chrono::Utc::now());
        job.push_audit(JobStatus::Waiting, None, Some("transient failure".into()));
        job.status = JobStatus::Waiting;
        store.save(&mut job).await.unwrap();

        let reserved = store.reserve_pending().await.unwrap();
        assert!(reserved.is_none(), "job just failed should be backed off");
    }

    #[tokio::test]
    async fn timeout_in_progress_flips_stuck_jobs_to_error() {
        let store = setup().await;
        let mut job = store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();
        job.status = JobStatus::InProgress;
        job.started_at = Some(chrono::Utc::now() - chrono::Duration::minutes(16));
        store.save(&mut job).await.unwrap();

        let swept = store
            .timeout_in_progress(Duration::from_secs(15 * 60))
            .await
            .unwrap();
        assert_eq!(swept, 1);

        let reloaded = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn list_filters_by_status_and_paginates() {
        let store = setup().await;
        store.create(sample_new_job("radio_a", "fp1")).await.unwrap();
        let mut job_b = store.create(sample_new_job("radio_b", "fp2")).await.unwrap();
        job_b.status = JobStatus::Success;
        job_b.push_audit(JobStatus::Success, None, Some("ok".into()));
        store.save(&mut job_b).await.unwrap();

        let page = store
            .list(&JobQuery {
                status: Some(cbuild_protocol::query::StatusFilter::Success),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].target, "radio_b");
    }

    #[tokio::test]
    async fn list_sorts_by_duration() {
        let store = setup().await;
        let start = chrono::Utc::now() - chrono::Duration::hours(1);

        let mut short_job = store.create(sample_new_job("radio_short", "fp1")).await.unwrap();
        short_job.status = JobStatus::Success;
        short_job.started_at = Some(start);
        short_job.ended_at = Some(start + chrono::Duration::seconds(30));
        short_job.push_audit(JobStatus::Success, None, Some("ok".into()));
        store.save(&mut short_job).await.unwrap();

        let mut long_job = store.create(sample_new_job("radio_long", "fp2")).await.unwrap();
        long_job.status = JobStatus::Success;
        long_job.started_at = Some(start);
        long_job.ended_at = Some(start + chrono::Duration::minutes(10));
        long_job.push_audit(JobStatus::Success, None, Some("ok".into()));
        store.save(&mut long_job).await.unwrap();

        let ascending = store
            .list(&JobQuery {
                sort: cbuild_protocol::query::SortField::Duration,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ascending.items[0].target, "radio_short");
        assert_eq!(ascending.items[1].target, "radio_long");

        let descending = store
            .list(&JobQuery {
                sort: cbuild_protocol::query::SortField::Duration,
                sort_desc: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(descending.items[0].target, "radio_long");
        assert_eq!(descending.items[1].target, "radio_short");
    }

    #[tokio::test]
    async fn save_persists_artifacts_and_appends_audit() {
        let store = setup().await;
        let mut job = store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();
        job.push_artifact("firmware".into(), "3ca63cbb-fp1.bin".into(), 1024);
        job.status = JobStatus::Success;
        job.push_audit(JobStatus::Success, None, Some("build ok".into()));
        store.save(&mut job).await.unwrap();

        let reloaded = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.artifacts.len(), 1);
        assert_eq!(reloaded.artifacts[0].filename, "3ca63cbb-fp1.bin");

        let logs = store.list_audit(job.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].to_status, JobStatus::Success);
    }

    #[tokio::test]
    async fn delete_cascades_artifacts_and_audit() {
        let store = setup().await;
        let job = store.create(sample_new_job("mydreamradio", "fp1")).await.unwrap();
        store.delete(job.id).await.unwrap();

        assert!(store.find_by_id(job.id).await.unwrap().is_none());
        assert!(store.list_audit(job.id).await.unwrap().is_empty());
    }
}
