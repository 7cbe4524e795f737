// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job cache: a staging table for running jobs.
//!
//! Running jobs land in `job_cache` first so the main table's secondary
//! indexes and tag foreign keys only pay off for jobs that matter (they
//! stopped, were tagged, or were promoted explicitly). Cache ids are
//! allocated above [`crate::CACHE_ID_OFFSET`] and promotion assigns a
//! fresh id from the `job` table's sequence, so an internal id always
//! identifies exactly one row in exactly one table.

use jm_core::Job;
use rusqlite::params;
use tracing::debug;

use crate::error::RepoError;
use crate::repo::{insert_job, not_found, query_many, query_one, JobRepository, JOB_SELECT};

impl JobRepository {
    /// Insert a freshly started job into the cache. Returns the cache id.
    pub fn start(&self, job: &Job) -> Result<i64, RepoError> {
        job.validate()?;
        let conn = self.conn.lock();
        let id = insert_job(&conn, "job_cache", job)?;
        debug!(id, job_id = job.job_id, cluster = %job.cluster, "job started (cached)");
        Ok(id)
    }

    /// Look up a cached job by its internal id.
    pub fn find_cached_by_id(&self, id: i64) -> Result<Job, RepoError> {
        let conn = self.conn.lock();
        query_one(&conn, "job_cache", "id = ?1", params![id])
    }

    /// Exact-match lookup of a cached running job.
    pub fn find_cached(
        &self,
        job_id: i64,
        cluster: &str,
        start_time: Option<i64>,
    ) -> Result<Job, RepoError> {
        let conn = self.conn.lock();
        match start_time {
            Some(st) => query_one(
                &conn,
                "job_cache",
                "job_id = ?1 AND cluster = ?2 AND start_time = ?3",
                params![job_id, cluster, st],
            ),
            None => query_one(&conn, "job_cache", "job_id = ?1 AND cluster = ?2", params![job_id, cluster]),
        }
    }

    /// Move a row from `job_cache` to `job`, returning the new internal id.
    ///
    /// The move is one transaction: the cache row is gone the moment the
    /// promoted row is visible.
    pub fn promote_cached(&self, id: i64) -> Result<i64, RepoError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let sql = format!("SELECT {JOB_SELECT} FROM job_cache WHERE id = ?1");
        let job = tx.query_row(&sql, params![id], crate::repo::job_from_row).map_err(not_found)?;
        let new_id = insert_job(&tx, "job", &job)?;
        tx.execute("DELETE FROM job_cache WHERE id = ?1", params![id])?;
        tx.commit()?;
        debug!(old_id = id, new_id, "cached job promoted");
        Ok(new_id)
    }

    /// Promote cached rows that started before `before` into the main
    /// table (periodic flush). Fresh rows stay cached so a prompt stop
    /// still gets the cheap promotion path. Returns the number of
    /// promoted rows.
    pub fn sync_cache(&self, before: i64) -> Result<u64, RepoError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let jobs = query_many(&tx, "job_cache", "start_time < ?1", params![before])?;
        let count = jobs.len() as u64;
        for job in &jobs {
            insert_job(&tx, "job", job)?;
            if let Some(id) = job.id {
                tx.execute("DELETE FROM job_cache WHERE id = ?1", params![id])?;
            }
        }
        tx.commit()?;
        if count > 0 {
            debug!(count, before, "job cache flushed");
        }
        Ok(count)
    }

    /// Remove one cache row (a started job withdrawn before any flush).
    pub fn delete_cached_by_id(&self, id: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM job_cache WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Number of rows currently staged in the cache.
    pub fn cached_count(&self) -> Result<u64, RepoError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM job_cache", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
