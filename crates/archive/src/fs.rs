// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem archive backend.
//!
//! Layout: `<root>/version.txt`, `<root>/<cluster>/cluster.json`, and per
//! job `<root>/<cluster>/<jobId/1000>/<jobId%1000>/<startTime>/{meta.json,
//! data.json[.zst]}`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jm_core::{Cluster, Job, JobData, MetricScope};
use tracing::{debug, warn};

use crate::format::{
    self, parse_version, record_path, ARCHIVE_VERSION, DATA_FILE, DATA_FILE_ZST, META_FILE,
};
use crate::{ArchiveBackend, ArchiveError, JobRef};

pub struct FsArchive {
    root: PathBuf,
}

impl FsArchive {
    /// Open an archive root, creating it (and `version.txt`) if empty.
    /// An existing root with an incompatible version is refused.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        let version_file = root.join("version.txt");
        if version_file.exists() {
            parse_version(&fs::read_to_string(&version_file)?)?;
        } else {
            fs::write(&version_file, format!("{ARCHIVE_VERSION}\n"))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read every `<cluster>/cluster.json` under the root.
    pub fn load_clusters(&self) -> Result<Vec<Cluster>, ArchiveError> {
        let mut clusters = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let config = entry.path().join("cluster.json");
            if !config.is_file() {
                continue;
            }
            let cluster: Cluster = serde_json::from_str(&fs::read_to_string(&config)?)?;
            clusters.push(cluster);
        }
        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    /// Write one cluster's topology file (bootstrap and tests).
    pub fn store_cluster(&self, cluster: &Cluster) -> Result<(), ArchiveError> {
        let dir = self.root.join(&cluster.name);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join("cluster.json"), &serde_json::to_vec_pretty(cluster)?)?;
        Ok(())
    }

    fn record_dir(&self, job: &JobRef) -> PathBuf {
        self.root.join(record_path(job))
    }
}

/// Stage to `<path>.tmp`, fsync, rename. A failed write never leaves a
/// partial target; the stage file is removed on error.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(ArchiveError::Io)
}

#[async_trait]
impl ArchiveBackend for FsArchive {
    async fn load_meta(&self, job: &JobRef) -> Result<Job, ArchiveError> {
        let path = self.record_dir(job).join(META_FILE);
        let raw = fs::read_to_string(&path)
            .map_err(|e| io_not_found(e, job))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn load_data(
        &self,
        job: &JobRef,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
    ) -> Result<JobData, ArchiveError> {
        let dir = self.record_dir(job);
        let plain = dir.join(DATA_FILE);
        let raw = if plain.is_file() {
            fs::read(&plain)?
        } else {
            let compressed = fs::read(dir.join(DATA_FILE_ZST)).map_err(|e| io_not_found(e, job))?;
            format::decompress(&compressed)?
        };
        let data: JobData = serde_json::from_slice(&raw)?;
        Ok(format::filter_data(data, metrics, scopes))
    }

    async fn store_meta(&self, job: &Job) -> Result<(), ArchiveError> {
        let job_ref = JobRef::from(job);
        let dir = self.record_dir(&job_ref);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(job)?)?;
        debug!(%job_ref, "archived job meta");
        Ok(())
    }

    async fn store_data(&self, job: &JobRef, data: &JobData) -> Result<(), ArchiveError> {
        let dir = self.record_dir(job);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(DATA_FILE), &serde_json::to_vec(data)?)?;
        debug!(job_ref = %job, "archived job data");
        Ok(())
    }

    async fn exists(&self, job: &JobRef) -> bool {
        let dir = self.record_dir(job);
        dir.join(META_FILE).is_file()
            && (dir.join(DATA_FILE).is_file() || dir.join(DATA_FILE_ZST).is_file())
    }

    async fn clean(&self, before: i64) -> Result<u64, ArchiveError> {
        let mut removed = 0;
        for job_ref in self.iter_refs().await? {
            if job_ref.start_time < before {
                fs::remove_dir_all(self.record_dir(&job_ref))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn compress_last(&self, n: usize) -> Result<u64, ArchiveError> {
        let mut refs = self.iter_refs().await?;
        refs.sort_by_key(|r| r.start_time);
        let mut compressed = 0;
        for job_ref in refs {
            if compressed as usize >= n {
                break;
            }
            let dir = self.record_dir(&job_ref);
            let plain = dir.join(DATA_FILE);
            if !plain.is_file() {
                continue;
            }
            let packed = format::compress(&fs::read(&plain)?)?;
            write_atomic(&dir.join(DATA_FILE_ZST), &packed)?;
            fs::remove_file(&plain)?;
            compressed += 1;
        }
        Ok(compressed)
    }

    async fn iter_refs(&self) -> Result<Vec<JobRef>, ArchiveError> {
        let mut refs = Vec::new();
        for cluster_entry in fs::read_dir(&self.root)? {
            let cluster_entry = cluster_entry?;
            if !cluster_entry.file_type()?.is_dir() {
                continue;
            }
            let cluster = cluster_entry.file_name().to_string_lossy().to_string();
            for b1 in read_subdirs(&cluster_entry.path())? {
                let Ok(high) = b1.name.parse::<i64>() else { continue };
                for b2 in read_subdirs(&b1.path)? {
                    let Ok(low) = b2.name.parse::<i64>() else { continue };
                    for ts in read_subdirs(&b2.path)? {
                        let Ok(start_time) = ts.name.parse::<i64>() else {
                            warn!(path = %ts.path.display(), "skipping malformed archive entry");
                            continue;
                        };
                        if ts.path.join(META_FILE).is_file() {
                            refs.push(JobRef {
                                cluster: cluster.clone(),
                                job_id: high * 1000 + low,
                                start_time,
                            });
                        }
                    }
                }
            }
        }
        Ok(refs)
    }
}

fn io_not_found(e: std::io::Error, job: &JobRef) -> ArchiveError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ArchiveError::NotFound(job.clone())
    } else {
        ArchiveError::Io(e)
    }
}

struct SubDir {
    name: String,
    path: PathBuf,
}

fn read_subdirs(path: &Path) -> Result<Vec<SubDir>, ArchiveError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(SubDir {
                name: entry.file_name().to_string_lossy().to_string(),
                path: entry.path(),
            });
        }
    }
    Ok(dirs)
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
