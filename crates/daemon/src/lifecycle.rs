// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and shutdown: construct the archive, repository,
//! dispatcher, archiver, engine, and scheduler, and wire them together.

use std::sync::Arc;

use jm_archive::{Archive, ArchiveError, FsArchive, S3Archive, SqliteArchive};
use jm_core::{Cluster, ClusterRegistry, SystemClock};
use jm_engine::{Archiver, LifecycleEngine, Scheduler};
use jm_metrics::{MetricBackendRegistry, MetricDispatch};
use jm_storage::{JobRepository, RepoError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::env::{ArchiveKind, DaemonConfig};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("malformed cluster config {path}: {error}")]
    ClusterConfig { path: String, error: serde_json::Error },

    #[error("no cluster configuration found; the daemon cannot validate jobs")]
    NoClusters,

    #[error("archive kind s3 requires an s3_bucket")]
    MissingBucket,
}

/// A fully wired daemon. HTTP and bus listeners are spawned separately
/// by the binary so embedders (and tests) can drive the parts directly.
pub struct Daemon {
    pub config: DaemonConfig,
    pub repo: Arc<JobRepository>,
    pub registry: Arc<ClusterRegistry>,
    pub dispatch: Arc<MetricDispatch>,
    pub archive: Archive,
    pub engine: Arc<LifecycleEngine>,
    pub archiver: Archiver,
    pub scheduler: Arc<Scheduler<SystemClock>>,
    pub tasks: Vec<JoinHandle<()>>,
    pub shutdown_token: CancellationToken,
}

/// Build every component and start the background workers.
pub async fn startup(
    config: DaemonConfig,
    backends: MetricBackendRegistry,
) -> Result<Daemon, LifecycleError> {
    let (archive, clusters) = open_archive(&config).await?;
    if clusters.is_empty() {
        return Err(LifecycleError::NoClusters);
    }
    for cluster in &clusters {
        if backends.for_cluster(&cluster.name).is_err() {
            warn!(cluster = %cluster.name, "no metric backend registered; metric loads will fail");
        }
    }
    let registry = Arc::new(ClusterRegistry::new(clusters));

    let repo = Arc::new(JobRepository::open(&config.db_path)?);
    let dispatch = Arc::new(MetricDispatch::new(Arc::clone(&registry), backends));

    let shutdown_token = CancellationToken::new();
    let archiver = Archiver::spawn(
        Arc::clone(&repo),
        Arc::clone(&dispatch),
        archive.clone(),
        config.archiver.clone(),
        shutdown_token.clone(),
    );
    let engine = Arc::new(LifecycleEngine::new(
        Arc::clone(&repo),
        Arc::clone(&registry),
        archiver.handle(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&repo),
        archive.clone(),
        archiver.handle(),
        SystemClock,
        config.scheduler.clone(),
    ));
    let tasks = Arc::clone(&scheduler).spawn(shutdown_token.clone());

    info!(
        clusters = registry.clusters().len(),
        db = %config.db_path.display(),
        http = %config.http_addr,
        bus = ?config.bus_addr,
        "daemon ready"
    );

    Ok(Daemon {
        config,
        repo,
        registry,
        dispatch,
        archive,
        engine,
        archiver,
        scheduler,
        tasks,
        shutdown_token,
    })
}

/// Stop the periodic tasks, drain the archiver, and wait for the loops
/// to exit.
pub async fn shutdown(daemon: Daemon) {
    info!("daemon shutting down");
    daemon.shutdown_token.cancel();
    daemon.archiver.shutdown(daemon.config.drain_timeout).await;
    for task in daemon.tasks {
        let _ = task.await;
    }
    info!("daemon stopped");
}

async fn open_archive(config: &DaemonConfig) -> Result<(Archive, Vec<Cluster>), LifecycleError> {
    match config.archive_kind {
        ArchiveKind::Fs => {
            let archive = FsArchive::init(&config.archive_root)?;
            let clusters = archive.load_clusters()?;
            Ok((Archive::Fs(Arc::new(archive)), clusters))
        }
        ArchiveKind::Sqlite => {
            let archive = SqliteArchive::open(&config.archive_root)?;
            let clusters = load_cluster_dir(config)?;
            Ok((Archive::Sqlite(Arc::new(archive)), clusters))
        }
        ArchiveKind::S3 => {
            let bucket = config.s3_bucket.clone().ok_or(LifecycleError::MissingBucket)?;
            let archive =
                S3Archive::connect(bucket, config.s3_prefix.clone(), config.s3_region.clone())
                    .await?;
            let clusters = load_cluster_dir(config)?;
            Ok((Archive::S3(Arc::new(archive)), clusters))
        }
    }
}

/// Read `<dir>/*.json` topology files for archives that cannot carry
/// their own `cluster.json`.
fn load_cluster_dir(config: &DaemonConfig) -> Result<Vec<Cluster>, LifecycleError> {
    let Some(dir) = &config.cluster_config_dir else {
        return Ok(Vec::new());
    };
    let mut clusters = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            let raw = std::fs::read_to_string(&path)?;
            let cluster = serde_json::from_str(&raw).map_err(|error| {
                LifecycleError::ClusterConfig { path: path.display().to_string(), error }
            })?;
            clusters.push(cluster);
        }
    }
    clusters.sort_by(|a: &Cluster, b: &Cluster| a.name.cmp(&b.name));
    Ok(clusters)
}
