// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S3 archive backend: same layout as the filesystem backend, expressed
//! as object keys under a configurable prefix.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use jm_core::{Job, JobData, MetricScope};
use tracing::debug;

use crate::format::{
    self, parse_version, record_path, ARCHIVE_VERSION, DATA_FILE, DATA_FILE_ZST, META_FILE,
};
use crate::{ArchiveBackend, ArchiveError, JobRef};

pub struct S3Archive {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

fn object_error(e: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::ObjectStore(e.to_string())
}

impl S3Archive {
    /// Connect using the default AWS credential chain and verify (or
    /// create) the `version.txt` object.
    pub async fn connect(
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        region: Option<String>,
    ) -> Result<Self, ArchiveError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        let archive = Self {
            client: aws_sdk_s3::Client::new(&config),
            bucket: bucket.into(),
            prefix: prefix.into(),
        };

        let version_key = archive.key("version.txt");
        match archive.get(&version_key).await {
            Ok(raw) => {
                parse_version(&String::from_utf8_lossy(&raw))?;
            }
            Err(ArchiveError::ObjectStore(_)) => {
                archive.put(&version_key, format!("{ARCHIVE_VERSION}\n").into_bytes()).await?;
            }
            Err(e) => return Err(e),
        }
        Ok(archive)
    }

    fn key(&self, rel: &str) -> String {
        if self.prefix.is_empty() {
            rel.to_string()
        } else {
            format!("{}/{rel}", self.prefix.trim_end_matches('/'))
        }
    }

    fn record_key(&self, job: &JobRef, file: &str) -> String {
        self.key(&format!("{}/{file}", record_path(job)))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ArchiveError> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(object_error)?;
        let bytes = out.body.collect().await.map_err(object_error)?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ArchiveError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(object_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ArchiveError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(object_error)?;
        Ok(())
    }

    async fn head(&self, key: &str) -> bool {
        self.client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .is_ok()
    }

    /// All keys under the archive prefix, via paginated listing.
    async fn list_keys(&self) -> Result<Vec<String>, ArchiveError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(self.key(""));
            if let Some(token) = continuation.take() {
                req = req.continuation_token(token);
            }
            let out = req.send().await.map_err(object_error)?;
            for object in out.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }
            match out.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    fn parse_ref(&self, key: &str) -> Option<JobRef> {
        let rel = key.strip_prefix(&self.key(""))?.trim_start_matches('/');
        let mut parts = rel.split('/');
        let cluster = parts.next()?;
        let high: i64 = parts.next()?.parse().ok()?;
        let low: i64 = parts.next()?.parse().ok()?;
        let start_time: i64 = parts.next()?.parse().ok()?;
        if parts.next()? != META_FILE {
            return None;
        }
        Some(JobRef { cluster: cluster.to_string(), job_id: high * 1000 + low, start_time })
    }
}

#[async_trait]
impl ArchiveBackend for S3Archive {
    async fn load_meta(&self, job: &JobRef) -> Result<Job, ArchiveError> {
        let raw = self
            .get(&self.record_key(job, META_FILE))
            .await
            .map_err(|_| ArchiveError::NotFound(job.clone()))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn load_data(
        &self,
        job: &JobRef,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
    ) -> Result<JobData, ArchiveError> {
        let raw = match self.get(&self.record_key(job, DATA_FILE)).await {
            Ok(raw) => raw,
            Err(_) => {
                let packed = self
                    .get(&self.record_key(job, DATA_FILE_ZST))
                    .await
                    .map_err(|_| ArchiveError::NotFound(job.clone()))?;
                format::decompress(&packed)?
            }
        };
        let data: JobData = serde_json::from_slice(&raw)?;
        Ok(format::filter_data(data, metrics, scopes))
    }

    async fn store_meta(&self, job: &Job) -> Result<(), ArchiveError> {
        let job_ref = JobRef::from(job);
        self.put(&self.record_key(&job_ref, META_FILE), serde_json::to_vec_pretty(job)?).await?;
        debug!(%job_ref, "archived job meta to s3");
        Ok(())
    }

    async fn store_data(&self, job: &JobRef, data: &JobData) -> Result<(), ArchiveError> {
        self.put(&self.record_key(job, DATA_FILE), serde_json::to_vec(data)?).await
    }

    async fn exists(&self, job: &JobRef) -> bool {
        self.head(&self.record_key(job, META_FILE)).await
            && (self.head(&self.record_key(job, DATA_FILE)).await
                || self.head(&self.record_key(job, DATA_FILE_ZST)).await)
    }

    async fn clean(&self, before: i64) -> Result<u64, ArchiveError> {
        let mut removed = 0;
        for job_ref in self.iter_refs().await? {
            if job_ref.start_time >= before {
                continue;
            }
            self.delete(&self.record_key(&job_ref, META_FILE)).await?;
            let _ = self.delete(&self.record_key(&job_ref, DATA_FILE)).await;
            let _ = self.delete(&self.record_key(&job_ref, DATA_FILE_ZST)).await;
            removed += 1;
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
            let plain_key = self.record_key(&job_ref, DATA_FILE);
            let Ok(raw) = self.get(&plain_key).await else { continue };
            let packed = format::compress(&raw)?;
            self.put(&self.record_key(&job_ref, DATA_FILE_ZST), packed).await?;
            self.delete(&plain_key).await?;
            compressed += 1;
        }
        Ok(compressed)
    }

    async fn iter_refs(&self) -> Result<Vec<JobRef>, ArchiveError> {
        let keys = self.list_keys().await?;
        Ok(keys.iter().filter_map(|k| self.parse_ref(k)).collect())
    }
}
