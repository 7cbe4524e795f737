// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: a TOML file overlaid by `JM_*` environment
//! variables. Environment access is centralized here.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use jm_engine::{ArchiverConfig, SchedulerConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    BadValue { key: &'static str, value: String },
}

/// Which archive backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveKind {
    Fs,
    Sqlite,
    S3,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// SQLite file holding the job metadata.
    pub db_path: PathBuf,
    pub archive_kind: ArchiveKind,
    /// Filesystem root (fs) or database file (sqlite).
    pub archive_root: PathBuf,
    pub s3_bucket: Option<String>,
    pub s3_prefix: String,
    pub s3_region: Option<String>,
    /// Directory of per-cluster topology JSON files; required for
    /// non-filesystem archives (the fs archive carries its own).
    pub cluster_config_dir: Option<PathBuf>,
    pub http_addr: SocketAddr,
    /// Line-protocol event-stream listener; `None` disables the bus.
    pub bus_addr: Option<SocketAddr>,
    /// Deadline propagated to metric-backend and archive calls.
    pub request_timeout: Duration,
    /// How long shutdown waits for the archiver to drain.
    pub drain_timeout: Duration,
    pub log_file: Option<PathBuf>,
    pub archiver: ArchiverConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("jobmon.db"),
            archive_kind: ArchiveKind::Fs,
            archive_root: PathBuf::from("archive"),
            s3_bucket: None,
            s3_prefix: String::new(),
            s3_region: None,
            cluster_config_dir: None,
            http_addr: default_http_addr(),
            bus_addr: None,
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
            log_file: None,
            archiver: ArchiverConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// File-level view of the configuration; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    archive_kind: Option<ArchiveKind>,
    archive_root: Option<PathBuf>,
    s3_bucket: Option<String>,
    s3_prefix: Option<String>,
    s3_region: Option<String>,
    cluster_config_dir: Option<PathBuf>,
    http_addr: Option<SocketAddr>,
    bus_addr: Option<SocketAddr>,
    request_timeout_ms: Option<u64>,
    drain_timeout_ms: Option<u64>,
    log_file: Option<PathBuf>,
    archive_workers: Option<usize>,
    archive_queue_depth: Option<usize>,
    retention_age_secs: Option<i64>,
    retention_omit_tagged: Option<bool>,
    retention_clean_archive: Option<bool>,
    compression_batch: Option<usize>,
    duration_refresh_secs: Option<u64>,
    cache_sync_secs: Option<u64>,
    cache_retention_secs: Option<i64>,
    retry_max_attempts: Option<u32>,
}

impl DaemonConfig {
    /// Resolve the configuration: defaults, then the config file (path
    /// from `JM_CONFIG`, default `jobmon.toml` if present), then `JM_*`
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let file_path = env_var("JM_CONFIG").map(PathBuf::from);
        let file = match file_path {
            Some(path) => Some(std::fs::read_to_string(path)?),
            None => match std::fs::read_to_string("jobmon.toml") {
                Ok(raw) => Some(raw),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            },
        };
        if let Some(raw) = file {
            config.apply_file(toml::from_str::<FileConfig>(&raw)?);
        }
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.archive_kind {
            self.archive_kind = v;
        }
        if let Some(v) = file.archive_root {
            self.archive_root = v;
        }
        if file.s3_bucket.is_some() {
            self.s3_bucket = file.s3_bucket;
        }
        if let Some(v) = file.s3_prefix {
            self.s3_prefix = v;
        }
        if file.s3_region.is_some() {
            self.s3_region = file.s3_region;
        }
        if file.cluster_config_dir.is_some() {
            self.cluster_config_dir = file.cluster_config_dir;
        }
        if let Some(v) = file.http_addr {
            self.http_addr = v;
        }
        if file.bus_addr.is_some() {
            self.bus_addr = file.bus_addr;
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.drain_timeout_ms {
            self.drain_timeout = Duration::from_millis(ms);
        }
        if file.log_file.is_some() {
            self.log_file = file.log_file;
        }
        if let Some(v) = file.archive_workers {
            self.archiver.workers = v;
        }
        if let Some(v) = file.archive_queue_depth {
            self.archiver.queue_depth = v;
        }
        if file.retention_age_secs.is_some() {
            self.scheduler.retention_age = file.retention_age_secs;
        }
        if let Some(v) = file.retention_omit_tagged {
            self.scheduler.retention_omit_tagged = v;
        }
        if let Some(v) = file.retention_clean_archive {
            self.scheduler.retention_clean_archive = v;
        }
        if let Some(v) = file.compression_batch {
            self.scheduler.compression_batch = v;
        }
        if let Some(secs) = file.duration_refresh_secs {
            self.scheduler.duration_refresh_interval =
                (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = file.cache_sync_secs {
            self.scheduler.cache_sync_interval = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = file.cache_retention_secs {
            self.scheduler.cache_retention = secs;
        }
        if let Some(v) = file.retry_max_attempts {
            self.scheduler.retry_max_attempts = v;
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("JM_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("JM_ARCHIVE_KIND") {
            self.archive_kind = match v.as_str() {
                "fs" => ArchiveKind::Fs,
                "sqlite" => ArchiveKind::Sqlite,
                "s3" => ArchiveKind::S3,
                _ => return Err(ConfigError::BadValue { key: "JM_ARCHIVE_KIND", value: v }),
            };
        }
        if let Some(v) = env_var("JM_ARCHIVE_ROOT") {
            self.archive_root = PathBuf::from(v);
        }
        if let Some(v) = env_var("JM_S3_BUCKET") {
            self.s3_bucket = Some(v);
        }
        if let Some(v) = env_var("JM_S3_PREFIX") {
            self.s3_prefix = v;
        }
        if let Some(v) = env_var("JM_S3_REGION") {
            self.s3_region = Some(v);
        }
        if let Some(v) = env_var("JM_CLUSTER_CONFIG_DIR") {
            self.cluster_config_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("JM_HTTP_ADDR") {
            self.http_addr = parse_env("JM_HTTP_ADDR", &v)?;
        }
        if let Some(v) = env_var("JM_BUS_ADDR") {
            self.bus_addr = Some(parse_env("JM_BUS_ADDR", &v)?);
        }
        if let Some(v) = env_var("JM_REQUEST_TIMEOUT_MS") {
            self.request_timeout = Duration::from_millis(parse_env("JM_REQUEST_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = env_var("JM_DRAIN_TIMEOUT_MS") {
            self.drain_timeout = Duration::from_millis(parse_env("JM_DRAIN_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = env_var("JM_LOG_FILE") {
            self.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("JM_ARCHIVE_WORKERS") {
            self.archiver.workers = parse_env("JM_ARCHIVE_WORKERS", &v)?;
        }
        if let Some(v) = env_var("JM_ARCHIVE_QUEUE_DEPTH") {
            self.archiver.queue_depth = parse_env("JM_ARCHIVE_QUEUE_DEPTH", &v)?;
        }
        if let Some(v) = env_var("JM_RETENTION_AGE_SECS") {
            self.scheduler.retention_age = Some(parse_env("JM_RETENTION_AGE_SECS", &v)?);
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::BadValue { key, value: value.to_string() })
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
