//! Periodic background tasks (§4.G).
//!
//! Grounded on `casparian_sentinel/src/{lib.rs,metrics.rs}`: the teacher
//! runs its sweeps and sampling as independent `tokio::spawn`ed loops
//! sharing one shutdown signal, and exposes a plain-data metrics struct
//! behind a narrow interface rather than pulling in a metrics crate.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use cbuild_store::{JobCounts, JobStore, WorkerStore, MAX_BUILD_DURATION};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const WORKER_GC_INTERVAL: Duration = Duration::from_secs(10);
pub const WORKER_MAX_SILENCE: Duration = Duration::from_secs(30);
pub const METRICS_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Publishes sampled gauges to whatever collector the embedder wires up.
/// Exposition itself (e.g. a `/metrics` text endpoint) is a non-goal; this
/// is only the narrow seam the sampler writes through, matching
/// `casparian_sentinel/src/metrics.rs`'s atomics-based `Metrics` struct
/// kept behind the crate boundary rather than exposed directly.
pub trait MetricsSink: Send + Sync {
    fn record_gauge(&self, name: &str, value: i64);
}

/// Spawns the 1 s stuck-build sweeper: anything still `InProgress` past
/// [`MAX_BUILD_DURATION`] is transitioned to `Error` (§4.G, §5).
pub fn spawn_sweeper(store: Arc<dyn JobStore>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                    match store.timeout_in_progress(MAX_BUILD_DURATION).await {
                        Ok(0) => {}
                        Ok(swept) => tracing::info!(swept, "swept stuck builds"),
                        Err(error) => tracing::error!(%error, "stuck-build sweep failed"),
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

/// Spawns the 10 s worker-liveness GC: rows silent past
/// [`WORKER_MAX_SILENCE`] are removed (§4.G).
pub fn spawn_worker_gc(
    worker_store: Arc<dyn WorkerStore>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(WORKER_GC_INTERVAL) => {
                    match worker_store.delete_stale(WORKER_MAX_SILENCE).await {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, "garbage-collected stale workers"),
                        Err(error) => tracing::error!(%error, "worker GC failed"),
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

/// Spawns the 30 s metrics sampler: publishes `build_jobs_queued`,
/// `build_jobs_building`, `build_jobs_failed` gauges (§4.G, §5).
pub fn spawn_metrics_sampler(
    store: Arc<dyn JobStore>,
    sink: Arc<dyn MetricsSink>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(METRICS_SAMPLE_INTERVAL) => {
                    match store.sample_counts().await {
                        Ok(JobCounts { queued, building, failed }) => {
                            sink.record_gauge("build_jobs_queued", queued);
                            sink.record_gauge("build_jobs_building", building);
                            sink.record_gauge("build_jobs_failed", failed);
                        }
                        Err(error) => tracing::error!(%error, "metrics sample failed"),
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
