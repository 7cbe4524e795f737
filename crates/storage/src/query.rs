// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filtered, paginated job listing.

use jm_core::{Job, JobState};
use rusqlite::ToSql;

use crate::error::RepoError;
use crate::repo::{job_from_row, JobRepository, JOB_SELECT};

/// Filter for `GET /jobs/` style listings. All fields are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub cluster: Option<String>,
    pub project: Option<String>,
    pub user: Option<String>,
    pub start_time_from: Option<i64>,
    pub start_time_to: Option<i64>,
}

/// Pagination window; `page` is 1-based.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub items_per_page: u32,
    pub page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { items_per_page: 25, page: 1 }
    }
}

impl JobFilter {
    fn build(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut sql = String::from("1=1");
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(state) = self.state {
            args.push(Box::new(state.to_string()));
            sql.push_str(&format!(" AND state = ?{}", args.len()));
        }
        if let Some(ref cluster) = self.cluster {
            args.push(Box::new(cluster.clone()));
            sql.push_str(&format!(" AND cluster = ?{}", args.len()));
        }
        if let Some(ref project) = self.project {
            args.push(Box::new(project.clone()));
            sql.push_str(&format!(" AND project = ?{}", args.len()));
        }
        if let Some(ref user) = self.user {
            args.push(Box::new(user.clone()));
            sql.push_str(&format!(" AND user = ?{}", args.len()));
        }
        if let Some(from) = self.start_time_from {
            args.push(Box::new(from));
            sql.push_str(&format!(" AND start_time >= ?{}", args.len()));
        }
        if let Some(to) = self.start_time_to {
            args.push(Box::new(to));
            sql.push_str(&format!(" AND start_time <= ?{}", args.len()));
        }
        (sql, args)
    }
}

impl JobRepository {
    /// List committed jobs matching the filter, newest first.
    pub fn query_jobs(&self, filter: &JobFilter, page: Page) -> Result<Vec<Job>, RepoError> {
        let (predicate, mut args) = filter.build();
        let limit = page.items_per_page.max(1);
        let offset = (page.page.max(1) - 1) * limit;
        args.push(Box::new(limit as i64));
        let limit_idx = args.len();
        args.push(Box::new(offset as i64));
        let offset_idx = args.len();
        let sql = format!(
            "SELECT {JOB_SELECT} FROM job WHERE {predicate}
             ORDER BY start_time DESC LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
        );
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(refs.as_slice(), job_from_row)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Total number of committed jobs matching the filter.
    pub fn count_jobs(&self, filter: &JobFilter) -> Result<u64, RepoError> {
        let (predicate, args) = filter.build();
        let sql = format!("SELECT COUNT(*) FROM job WHERE {predicate}");
        let conn = self.conn.lock();
        let refs: Vec<&dyn ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let n: i64 = conn.query_row(&sql, refs.as_slice(), |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
