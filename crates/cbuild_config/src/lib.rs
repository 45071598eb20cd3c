//! Shared CLI/env configuration (§6.6).
//!
//! Grounded on `casparian_sentinel`'s and `casparian_worker`'s `clap::Parser`
//! args structs (env-backed defaults via `casparian_protocol::defaults`) and
//! on `original_source/config/options.go`'s env-var surface
//! (`DATABASE_URL`, `BUILD_IMAGE`, `SOURCE_REPOSITORY`, `DOWNLOAD_URL`,
//! `STORAGE_TYPE`, ...), translated from viper/cobra binding into `clap`'s
//! `env` attribute. Config loading *mechanics* (file discovery, layered
//! merge) are a non-goal; this is the flat, directly-parseable shape.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Object-storage backend selector (§6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageKind {
    FileSystemStorage,
    S3,
}

/// Flags shared by every `cbuild` subcommand (§6.6).
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Job store connection string (sqlite:/... | postgres://...).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
    pub database_url: String,

    /// Path to the catalog's JSON targets definition (§4.A).
    #[arg(long, env = "CATALOG_PATH", default_value = "targets.json")]
    pub catalog_path: PathBuf,

    /// Artifact download URL prefix, emitted in `artifacts[].download_url` (§6.2).
    #[arg(long, env = "DOWNLOAD_URL", default_value = "http://localhost:3000")]
    pub download_url: String,

    /// Object-storage backend.
    #[arg(long, env = "STORAGE_TYPE", value_enum, default_value_t = StorageKind::FileSystemStorage)]
    pub storage_type: StorageKind,

    /// Local filesystem storage root, used when `storage_type = FILE_SYSTEM_STORAGE`.
    #[arg(long, env = "STORAGE_PATH", default_value = "/tmp")]
    pub storage_path: PathBuf,

    /// S3 bucket name, used when `storage_type = S3`.
    #[arg(long, env = "STORAGE_S3_BUCKET")]
    pub storage_s3_bucket: Option<String>,

    /// S3-compatible endpoint URL, used when `storage_type = S3`.
    #[arg(long, env = "STORAGE_S3_URL")]
    pub storage_s3_url: Option<String>,

    /// Source repository to clone commits from (§6.4).
    #[arg(long, env = "SOURCE_REPOSITORY")]
    pub source_repository: String,
}

/// `cbuild server` flags: HTTP bind address (§6.1).
#[derive(Parser, Debug, Clone)]
pub struct ServerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[arg(long, env = "LISTEN_IP", default_value = "0.0.0.0")]
    pub listen_ip: String,

    #[arg(short = 'p', long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
}

/// `cbuild worker` flags (§4.F). Hostname defaulting to the OS hostname is
/// a runtime fallback at construction, not a config source — see
/// `cbuild_worker::Worker::local_hostname`.
#[derive(Parser, Debug, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Worker liveness hostname; defaults to the OS hostname if unset.
    #[arg(long, env = "WORKER_HOSTNAME")]
    pub hostname: Option<String>,

    /// Build container image to pre-warm on startup.
    #[arg(long, env = "BUILD_IMAGE")]
    pub build_image: String,
}

/// `cbuild maintenance` flags (§4.G). No fields beyond the common set today;
/// kept as its own struct so a maintenance-only knob can be added later
/// without disturbing the other subcommands.
#[derive(Parser, Debug, Clone)]
pub struct MaintenanceArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}
