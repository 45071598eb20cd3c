//! Cloud firmware build service CLI entrypoint (§6.6).
//!
//! Grounded on `casparian/src/main.rs`'s subcommand dispatch (one
//! `#[command(flatten)]` args struct per role) and
//! `original_source/cmd/{server,worker}/main.go`'s wiring and
//! signal-driven graceful shutdown.

mod adapters;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;

use cbuild_catalog::{Catalog, TargetsDef};
use cbuild_config::{CommonArgs, MaintenanceArgs, ServerArgs, StorageKind, WorkerArgs};
use cbuild_coordinator::Coordinator;
use cbuild_db::DbPool;
use cbuild_driver::{ArtifactStorage, BuildDriver, FirmwareBuilder, SourceDownloader};
use cbuild_store::{SqlJobStore, SqlWorkerStore};

use adapters::builder::PodmanFirmwareBuilder;
use adapters::resolver::GitRemoteShaResolver;
use adapters::source::GitSourceDownloader;
use adapters::storage::{FileSystemArtifactStorage, S3ArtifactStorage};

#[derive(Parser, Debug)]
#[command(name = "cbuild", about = "Cloud firmware build service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the job coordinator for an embedding HTTP layer (§4.D, §6.1).
    /// HTTP transport/routing is out of scope here; this wires the store,
    /// catalog, and coordinator and holds the process open.
    Server {
        #[command(flatten)]
        args: ServerArgs,
    },
    /// Run a long-lived build worker (§4.F).
    Worker {
        #[command(flatten)]
        args: WorkerArgs,
    },
    /// Run the periodic maintenance tasks (§4.G).
    Maintenance {
        #[command(flatten)]
        args: MaintenanceArgs,
    },
}

async fn open_store(common: &CommonArgs) -> anyhow::Result<DbPool> {
    let db = DbPool::connect(&common.database_url).await?;
    cbuild_db::migrate(&db).await?;
    Ok(db)
}

async fn load_catalog(common: &CommonArgs) -> anyhow::Result<Arc<Catalog>> {
    let raw = tokio::fs::read_to_string(&common.catalog_path).await?;
    let def: TargetsDef = serde_json::from_str(&raw)?;
    let resolver = GitRemoteShaResolver {
        repository: common.source_repository.clone(),
    };
    let catalog = Catalog::load(def, &resolver).await?;
    Ok(Arc::new(catalog))
}

fn build_storage(common: &CommonArgs) -> anyhow::Result<Arc<dyn ArtifactStorage>> {
    match common.storage_type {
        StorageKind::FileSystemStorage => Ok(Arc::new(FileSystemArtifactStorage {
            root: common.storage_path.clone(),
        })),
        StorageKind::S3 => {
            let bucket = common
                .storage_s3_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--storage-s3-bucket is required for S3 storage"))?;
            let endpoint = common
                .storage_s3_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--storage-s3-url is required for S3 storage"))?;
            Ok(Arc::new(S3ArtifactStorage {
                endpoint,
                bucket,
                client: reqwest::Client::new(),
            }))
        }
    }
}

async fn run_server(args: ServerArgs) -> anyhow::Result<()> {
    let db = open_store(&args.common).await?;
    let store = Arc::new(SqlJobStore::new(db));
    let catalog = load_catalog(&args.common).await?;
    let coordinator = Coordinator::new(store, catalog, args.common.download_url.clone());

    tracing::info!(
        listen_ip = %args.listen_ip,
        port = args.port,
        "coordinator ready; mount an HTTP layer over it to serve §6.1"
    );
    let _ = &coordinator;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> anyhow::Result<()> {
    let db = open_store(&args.common).await?;
    let store = Arc::new(SqlJobStore::new(db));

    let worker_db = open_store(&args.common).await?;
    let worker_store: Arc<dyn cbuild_store::WorkerStore> = Arc::new(SqlWorkerStore::new(worker_db));

    let workdir = std::env::temp_dir().join("cbuild-worker");
    let source: Arc<dyn SourceDownloader> = Arc::new(GitSourceDownloader {
        repository: args.common.source_repository.clone(),
        workdir: workdir.clone(),
    });
    let builder: Arc<dyn FirmwareBuilder> = Arc::new(PodmanFirmwareBuilder {
        workdir: workdir.clone(),
    });
    let storage = build_storage(&args.common)?;

    let driver = Arc::new(BuildDriver::new(store.clone(), source, builder.clone(), storage));
    let hostname = args.hostname.unwrap_or_else(cbuild_worker::Worker::local_hostname);
    let worker = Arc::new(cbuild_worker::Worker::new(store, worker_store, driver, builder, hostname));

    worker.prewarm(&args.build_image).await;

    let shutdown = cbuild_worker::CancellationToken::new();
    let run_handle = {
        let worker = worker.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down worker...");
    if let Err(error) = worker.stop(&shutdown).await {
        tracing::error!(%error, "worker did not shut down cleanly");
    }
    run_handle.await?;
    Ok(())
}

async fn run_maintenance(args: MaintenanceArgs) -> anyhow::Result<()> {
    let db = open_store(&args.common).await?;
    let store = Arc::new(SqlJobStore::new(db));
    let worker_db = open_store(&args.common).await?;
    let worker_store: Arc<dyn cbuild_store::WorkerStore> = Arc::new(SqlWorkerStore::new(worker_db));
    let catalog = load_catalog(&args.common).await?;
    let resolver: Arc<dyn cbuild_catalog::RemoteShaResolver> = Arc::new(GitRemoteShaResolver {
        repository: args.common.source_repository.clone(),
    });
    let metrics: Arc<dyn cbuild_maintenance::MetricsSink> = Arc::new(TracingMetricsSink);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = vec![
        cbuild_maintenance::spawn_sweeper(store.clone(), shutdown_rx.clone()),
        cbuild_maintenance::spawn_worker_gc(worker_store, shutdown_rx.clone()),
        cbuild_maintenance::spawn_metrics_sampler(store, metrics, shutdown_rx.clone()),
        cbuild_catalog::refresh::spawn_refresher(catalog, resolver, shutdown_rx),
    ];

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down maintenance tasks...");
    shutdown_tx.send(true).ok();
    for handle in handles {
        handle.await?;
    }
    Ok(())
}

struct TracingMetricsSink;
impl cbuild_maintenance::MetricsSink for TracingMetricsSink {
    fn record_gauge(&self, name: &str, value: i64) {
        tracing::info!(gauge = name, value, "metrics sample");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cbuild_logging::init("cbuild=info");
    let cli = Cli::parse();

    match cli.command {
        Commands::Server { args } => run_server(args).await,
        Commands::Worker { args } => run_worker(args).await,
        Commands::Maintenance { args } => run_maintenance(args).await,
    }
}
