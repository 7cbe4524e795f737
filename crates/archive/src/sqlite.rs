// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Embedded table-store archive backend.
//!
//! Meta and data live in two tables keyed by `(cluster, job_id,
//! start_time)`. Writes are transactional, which gives the same atomicity
//! as the filesystem backend's rename.

use std::path::Path;

use async_trait::async_trait;
use jm_core::{Job, JobData, MetricScope};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::format::{self, parse_version, ARCHIVE_VERSION};
use crate::{ArchiveBackend, ArchiveError, JobRef};

pub struct SqliteArchive {
    conn: Mutex<Connection>,
}

impl SqliteArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        Self::from_conn(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, ArchiveError> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    fn from_conn(conn: Connection) -> Result<Self, ArchiveError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS archive_meta (
                cluster TEXT NOT NULL,
                job_id INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                meta TEXT NOT NULL,
                PRIMARY KEY (cluster, job_id, start_time)
            );

            CREATE TABLE IF NOT EXISTS archive_data (
                cluster TEXT NOT NULL,
                job_id INTEGER NOT NULL,
                start_time INTEGER NOT NULL,
                data BLOB NOT NULL,
                compressed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (cluster, job_id, start_time)
            );

            CREATE TABLE IF NOT EXISTS archive_version (
                version INTEGER NOT NULL
            );
            "#,
        )?;
        let found: Option<i64> = conn
            .query_row("SELECT version FROM archive_version LIMIT 1", [], |row| row.get(0))
            .optional()?;
        match found {
            None => {
                conn.execute("INSERT INTO archive_version (version) VALUES (?1)", [ARCHIVE_VERSION])?;
            }
            Some(v) => {
                parse_version(&v.to_string())?;
            }
        }
        Ok(Self { conn: Mutex::new(conn) })
    }
}

#[async_trait]
impl ArchiveBackend for SqliteArchive {
    async fn load_meta(&self, job: &JobRef) -> Result<Job, ArchiveError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT meta FROM archive_meta
                 WHERE cluster = ?1 AND job_id = ?2 AND start_time = ?3",
                params![job.cluster, job.job_id, job.start_time],
                |row| row.get(0),
            )
            .optional()?;
        let raw = raw.ok_or_else(|| ArchiveError::NotFound(job.clone()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn load_data(
        &self,
        job: &JobRef,
        metrics: Option<&[String]>,
        scopes: Option<&[MetricScope]>,
    ) -> Result<JobData, ArchiveError> {
        let conn = self.conn.lock();
        let row: Option<(Vec<u8>, bool)> = conn
            .query_row(
                "SELECT data, compressed FROM archive_data
                 WHERE cluster = ?1 AND job_id = ?2 AND start_time = ?3",
                params![job.cluster, job.job_id, job.start_time],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (raw, compressed) = row.ok_or_else(|| ArchiveError::NotFound(job.clone()))?;
        let raw = if compressed { format::decompress(&raw)? } else { raw };
        let data: JobData = serde_json::from_slice(&raw)?;
        Ok(format::filter_data(data, metrics, scopes))
    }

    async fn store_meta(&self, job: &Job) -> Result<(), ArchiveError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO archive_meta (cluster, job_id, start_time, meta)
             VALUES (?1, ?2, ?3, ?4)",
            params![job.cluster, job.job_id, job.start_time, serde_json::to_string(job)?],
        )?;
        Ok(())
    }

    async fn store_data(&self, job: &JobRef, data: &JobData) -> Result<(), ArchiveError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO archive_data (cluster, job_id, start_time, data, compressed)
             VALUES (?1, ?2, ?3, ?4, 0)",
            params![job.cluster, job.job_id, job.start_time, serde_json::to_vec(data)?],
        )?;
        Ok(())
    }

    async fn exists(&self, job: &JobRef) -> bool {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT 1 FROM archive_meta m
             JOIN archive_data d
               ON d.cluster = m.cluster AND d.job_id = m.job_id AND d.start_time = m.start_time
             WHERE m.cluster = ?1 AND m.job_id = ?2 AND m.start_time = ?3",
            params![job.cluster, job.job_id, job.start_time],
            |_| Ok(()),
        )
        .optional()
        .map(|r| r.is_some())
        .unwrap_or(false)
    }

    async fn clean(&self, before: i64) -> Result<u64, ArchiveError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let n = tx.execute("DELETE FROM archive_meta WHERE start_time < ?1", params![before])?;
        tx.execute("DELETE FROM archive_data WHERE start_time < ?1", params![before])?;
        tx.commit()?;
        Ok(n as u64)
    }

    async fn compress_last(&self, n: usize) -> Result<u64, ArchiveError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let rows: Vec<(String, i64, i64, Vec<u8>)> = {
            let mut stmt = tx.prepare(
                "SELECT cluster, job_id, start_time, data FROM archive_data
                 WHERE compressed = 0 ORDER BY start_time ASC LIMIT ?1",
            )?;
            let mapped = stmt.query_map(params![n as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            rows
        };
        let mut compressed = 0;
        for (cluster, job_id, start_time, raw) in rows {
            let packed = format::compress(&raw)?;
            tx.execute(
                "UPDATE archive_data SET data = ?1, compressed = 1
                 WHERE cluster = ?2 AND job_id = ?3 AND start_time = ?4",
                params![packed, cluster, job_id, start_time],
            )?;
            compressed += 1;
        }
        tx.commit()?;
        Ok(compressed)
    }

    async fn iter_refs(&self) -> Result<Vec<JobRef>, ArchiveError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT cluster, job_id, start_time FROM archive_meta ORDER BY start_time",
        )?;
        let mapped = stmt.query_map([], |row| {
            Ok(JobRef { cluster: row.get(0)?, job_id: row.get(1)?, start_time: row.get(2)? })
        })?;
        let mut refs = Vec::new();
        for row in mapped {
            refs.push(row?);
        }
        Ok(refs)
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
