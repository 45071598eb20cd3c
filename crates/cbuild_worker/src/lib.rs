//! Long-lived worker loop (§4.F).
//!
//! Grounded on `original_source/processor/worker.go`'s `Run`/`Stop`/
//! `PullImage`/`executeJob` for the loop shape and deadline handling, and
//! on `casparian_worker/src/worker.rs` for the `running`/in-progress-flag
//! idiom translated into async Rust (a `tokio::time::timeout` in place of
//! the original's `context.WithTimeout` + goroutine race).

pub mod cancel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use cbuild_driver::{BuildDriver, DriverError, FirmwareBuilder};
use cbuild_store::{JobStore, WorkerStore, MAX_BUILD_DURATION};

pub use cancel::CancellationToken;

/// How often an idle worker re-polls for a pending job (§5 backpressure).
pub const RESERVE_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// How often the worker refreshes its liveness row (§4.F).
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
/// Grace period `stop` waits for an in-flight attempt before giving up (§4.F).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(4 * 60);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker did not shut down within the grace period")]
    ForcedShutdown,
}

/// Reserves and executes jobs one at a time, heartbeats its liveness, and
/// stops accepting new work on a cancellation signal (§4.F).
pub struct Worker {
    store: Arc<dyn JobStore>,
    worker_store: Arc<dyn WorkerStore>,
    driver: Arc<BuildDriver>,
    builder: Arc<dyn FirmwareBuilder>,
    hostname: String,
    in_progress: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        worker_store: Arc<dyn WorkerStore>,
        driver: Arc<BuildDriver>,
        builder: Arc<dyn FirmwareBuilder>,
        hostname: String,
    ) -> Self {
        Self {
            store,
            worker_store,
            driver,
            builder,
            hostname,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolves the local hostname via the same means the operating
    /// system reports it under, for when the caller has no override.
    pub fn local_hostname() -> String {
        gethostname::gethostname().to_string_lossy().to_string()
    }

    /// Pre-warms the build container cache so the first real build isn't
    /// slowed by a cold pull. Best-effort: a failure here is logged as a
    /// warning and never stops the worker from starting (§4.F).
    pub async fn prewarm(&self, container_image: &str) {
        match tokio::time::timeout(MAX_BUILD_DURATION, self.builder.pull_image(container_image)).await {
            Ok(Ok(())) => tracing::info!(%container_image, "pre-warmed build image"),
            Ok(Err(error)) => tracing::warn!(%container_image, %error, "pre-warm pull failed"),
            Err(_elapsed) => tracing::warn!(%container_image, "pre-warm pull timed out"),
        }
    }

    /// Runs the reserve/build loop until `shutdown` is cancelled. Spawns a
    /// sibling heartbeat task that upserts this worker's liveness row
    /// every [`HEARTBEAT_INTERVAL`].
    pub async fn run(&self, shutdown: CancellationToken) {
        if let Err(error) = self.worker_store.heartbeat(&self.hostname).await {
            tracing::error!(%error, "initial heartbeat failed");
        }
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            self.worker_store.clone(),
            self.hostname.clone(),
            shutdown.clone(),
        ));

        while !shutdown.is_cancelled() {
            self.in_progress.store(true, Ordering::SeqCst);
            match self.store.reserve_pending().await {
                Ok(Some(job)) => {
                    let job_id = job.id;
                    match tokio::time::timeout(MAX_BUILD_DURATION, self.driver.run_attempt(job)).await {
                        Ok(Ok(finished)) => {
                            tracing::info!(%job_id, status = %finished.status, "processed build job")
                        }
                        Ok(Err(DriverError::Attempt(cause))) => {
                            tracing::warn!(%job_id, %cause, "build attempt failed")
                        }
                        Ok(Err(DriverError::Store(error))) => {
                            tracing::error!(%job_id, %error, "build attempt failed to persist")
                        }
                        Err(_elapsed) => tracing::error!(%job_id, "job timed out"),
                    }
                }
                Ok(None) => tokio::time::sleep(RESERVE_POLL_INTERVAL).await,
                Err(error) => {
                    tracing::error!(%error, "failed to reserve next build job");
                    tokio::time::sleep(RESERVE_POLL_INTERVAL).await;
                }
            }
            self.in_progress.store(false, Ordering::SeqCst);
        }

        heartbeat_task.abort();
    }

    /// Signals `run` to stop initiating new reservations, then waits for
    /// the current attempt (if any) to finish, up to [`SHUTDOWN_GRACE`].
    pub async fn stop(&self, shutdown: &CancellationToken) -> Result<(), WorkerError> {
        shutdown.cancel();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.in_progress.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() >= deadline {
                return Err(WorkerError::ForcedShutdown);
            }
            tracing::info!("waiting for worker shutdown...");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        Ok(())
    }
}

async fn heartbeat_loop(worker_store: Arc<dyn WorkerStore>, hostname: String, shutdown: CancellationToken) {
    while !shutdown.is_cancelled() {
        tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        if let Err(error) = worker_store.heartbeat(&hostname).await {
            tracing::error!(%error, "heartbeat failed");
        }
    }
}
