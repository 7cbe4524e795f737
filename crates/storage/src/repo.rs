// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job repository: row mapping and the main `job` table operations.

use std::path::Path;

use indexmap::IndexMap;
use jm_core::{Job, JobState, MonitoringStatus, Resource, SharedMode};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::RepoError;
use crate::schema;

/// Column list shared by every job SELECT; order must match
/// [`job_from_row`].
pub(crate) const JOB_SELECT: &str = r#"id, job_id, cluster, subcluster, "partition",
    array_job_id, user, project, start_time, duration, walltime, num_nodes,
    num_hwthreads, num_acc, smt, shared, state, monitoring_status, energy,
    resources, meta_data, footprint, energy_footprint"#;

/// SQLite-backed metadata repository.
///
/// The connection sits behind a mutex; every operation is a short
/// transaction, so callers never block on external I/O while holding it.
pub struct JobRepository {
    pub(crate) conn: Mutex<Connection>,
}

impl JobRepository {
    /// Open (and initialize) the repository at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory repository, for tests and ephemeral deployments.
    pub fn in_memory() -> Result<Self, RepoError> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Look up a committed job by its internal id, tags included.
    pub fn find_by_id(&self, id: i64) -> Result<Job, RepoError> {
        let conn = self.conn.lock();
        let mut job = query_one(&conn, "job", "id = ?1", params![id])?;
        job.tags = crate::tags::tags_for_job(&conn, id)?;
        Ok(job)
    }

    /// Exact-match lookup of a running job for stop/delete.
    pub fn find_running(
        &self,
        job_id: i64,
        cluster: &str,
        start_time: Option<i64>,
    ) -> Result<Job, RepoError> {
        let conn = self.conn.lock();
        match start_time {
            Some(st) => query_one(
                &conn,
                "job",
                "job_id = ?1 AND cluster = ?2 AND state = 'running' AND start_time = ?3",
                params![job_id, cluster, st],
            ),
            None => query_one(
                &conn,
                "job",
                "job_id = ?1 AND cluster = ?2 AND state = 'running'",
                params![job_id, cluster],
            ),
        }
    }

    /// Every historical entry for `(job_id, cluster)` in both tables.
    /// Used by the duplicate-window check.
    pub fn find_all(&self, job_id: i64, cluster: &str) -> Result<Vec<Job>, RepoError> {
        let conn = self.conn.lock();
        let mut jobs = query_many(
            &conn,
            "job",
            "job_id = ?1 AND cluster = ?2",
            params![job_id, cluster],
        )?;
        jobs.extend(query_many(
            &conn,
            "job_cache",
            "job_id = ?1 AND cluster = ?2",
            params![job_id, cluster],
        )?);
        Ok(jobs)
    }

    /// Insert a job directly into the main table (used when tags are
    /// present at start). Returns the generated internal id.
    pub fn start_direct(&self, job: &Job) -> Result<i64, RepoError> {
        job.validate()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id = insert_job(&tx, "job", job)?;
        for tag in &job.tags {
            let tag_id = crate::tags::create_or_get_tag(&tx, &tag.tag_type, &tag.name, &tag.scope)?;
            crate::tags::link(&tx, id, tag_id)?;
        }
        tx.commit()?;
        debug!(id, job_id = job.job_id, cluster = %job.cluster, "job started (direct)");
        Ok(id)
    }

    /// Finalize a job row on stop.
    pub fn stop(
        &self,
        id: i64,
        duration: i64,
        state: JobState,
        monitoring_status: MonitoringStatus,
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE job SET duration = ?1, state = ?2, monitoring_status = ?3 WHERE id = ?4",
            params![duration, state.to_string(), u8::from(monitoring_status), id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    pub fn update_monitoring_status(
        &self,
        id: i64,
        status: MonitoringStatus,
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE job SET monitoring_status = ?1 WHERE id = ?2",
            params![u8::from(status), id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    pub fn update_duration(&self, id: i64, duration: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE job SET duration = ?1 WHERE id = ?2",
            params![duration, id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    pub fn update_footprint(
        &self,
        id: i64,
        footprint: &IndexMap<String, f64>,
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE job SET footprint = ?1 WHERE id = ?2",
            params![serde_json::to_string(footprint)?, id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    pub fn update_energy(
        &self,
        id: i64,
        total: f64,
        per_metric: &IndexMap<String, f64>,
    ) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE job SET energy = ?1, energy_footprint = ?2 WHERE id = ?3",
            params![total, serde_json::to_string(per_metric)?, id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Upsert one entry in the free-form metadata map.
    pub fn update_metadata(&self, id: i64, key: &str, value: &str) -> Result<(), RepoError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let raw: Option<String> = tx
            .query_row("SELECT meta_data FROM job WHERE id = ?1", params![id], |row| row.get(0))
            .map_err(not_found)?;
        let mut map: std::collections::HashMap<String, String> = match raw {
            Some(s) => serde_json::from_str(&s)?,
            None => Default::default(),
        };
        map.insert(key.to_string(), value.to_string());
        tx.execute(
            "UPDATE job SET meta_data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&map)?, id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete one job row; tag links go with it. The archive is untouched.
    pub fn delete_by_id(&self, id: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM job WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Delete all jobs started before `ts`; optionally keep tagged ones.
    pub fn delete_before(&self, ts: i64, omit_tagged: bool) -> Result<u64, RepoError> {
        let conn = self.conn.lock();
        let n = if omit_tagged {
            conn.execute(
                "DELETE FROM job WHERE start_time < ?1
                 AND id NOT IN (SELECT job_id FROM jobtag)",
                params![ts],
            )?
        } else {
            conn.execute("DELETE FROM job WHERE start_time < ?1", params![ts])?
        };
        Ok(n as u64)
    }

    /// All committed jobs currently in the running state.
    pub fn running_jobs(&self) -> Result<Vec<Job>, RepoError> {
        let conn = self.conn.lock();
        query_many(&conn, "job", "state = 'running'", params![])
    }

    /// All committed jobs with the given monitoring status (retry sweeps).
    pub fn jobs_with_status(&self, status: MonitoringStatus) -> Result<Vec<Job>, RepoError> {
        let conn = self.conn.lock();
        query_many(&conn, "job", "monitoring_status = ?1", params![u8::from(status)])
    }
}

pub(crate) fn not_found(e: rusqlite::Error) -> RepoError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => RepoError::NotFound,
        other => RepoError::Db(other),
    }
}

pub(crate) fn query_one(
    conn: &Connection,
    table: &str,
    predicate: &str,
    args: impl rusqlite::Params,
) -> Result<Job, RepoError> {
    let sql = format!("SELECT {JOB_SELECT} FROM {table} WHERE {predicate}");
    conn.query_row(&sql, args, job_from_row).map_err(not_found)
}

pub(crate) fn query_many(
    conn: &Connection,
    table: &str,
    predicate: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<Job>, RepoError> {
    let sql = format!("SELECT {JOB_SELECT} FROM {table} WHERE {predicate} ORDER BY start_time");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args, job_from_row)?;
    let mut jobs = Vec::new();
    for row in rows {
        jobs.push(row?);
    }
    Ok(jobs)
}

pub(crate) fn insert_job(conn: &Connection, table: &str, job: &Job) -> Result<i64, RepoError> {
    let sql = format!(
        r#"INSERT INTO {table} (job_id, cluster, subcluster, "partition", array_job_id,
            user, project, start_time, duration, walltime, num_nodes, num_hwthreads,
            num_acc, smt, shared, state, monitoring_status, energy, resources,
            meta_data, footprint, energy_footprint)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                   ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"#
    );
    conn.execute(
        &sql,
        params![
            job.job_id,
            job.cluster,
            job.sub_cluster,
            job.partition,
            job.array_job_id,
            job.user,
            job.project,
            job.start_time,
            job.duration,
            job.walltime,
            job.num_nodes,
            job.num_hwthreads,
            job.num_acc,
            job.smt,
            job.shared.to_string(),
            job.state.to_string(),
            u8::from(job.monitoring_status),
            job.energy,
            serde_json::to_string(&job.resources)?,
            job.meta_data.as_ref().map(serde_json::to_string).transpose()?,
            json_if_nonempty(&job.footprint)?,
            json_if_nonempty(&job.energy_footprint)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn json_if_nonempty(map: &IndexMap<String, f64>) -> Result<Option<String>, RepoError> {
    if map.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(map)?))
    }
}

fn corrupt(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

pub(crate) fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let shared_raw: String = row.get(15)?;
    let shared = match shared_raw.as_str() {
        "none" => SharedMode::None,
        "single" => SharedMode::Single,
        "multi" => SharedMode::Multi,
        other => return Err(corrupt(15, format!("invalid shared mode: {other}"))),
    };
    let state_raw: String = row.get(16)?;
    let state = JobState::parse(&state_raw)
        .ok_or_else(|| corrupt(16, format!("invalid job state: {state_raw}")))?;
    let status_raw: u8 = row.get(17)?;
    let monitoring_status = MonitoringStatus::try_from(status_raw).map_err(|e| corrupt(17, e))?;

    let resources_raw: String = row.get(19)?;
    let resources: Vec<Resource> =
        serde_json::from_str(&resources_raw).map_err(|e| corrupt(19, e.to_string()))?;
    let meta_data = row
        .get::<_, Option<String>>(20)?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(20, e.to_string()))?;
    let footprint = row
        .get::<_, Option<String>>(21)?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(21, e.to_string()))?
        .unwrap_or_default();
    let energy_footprint = row
        .get::<_, Option<String>>(22)?
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| corrupt(22, e.to_string()))?
        .unwrap_or_default();

    Ok(Job {
        id: Some(row.get(0)?),
        job_id: row.get(1)?,
        cluster: row.get(2)?,
        sub_cluster: row.get(3)?,
        partition: row.get(4)?,
        array_job_id: row.get(5)?,
        user: row.get(6)?,
        project: row.get(7)?,
        start_time: row.get(8)?,
        duration: row.get(9)?,
        walltime: row.get(10)?,
        num_nodes: row.get(11)?,
        num_hwthreads: row.get(12)?,
        num_acc: row.get(13)?,
        smt: row.get(14)?,
        shared,
        state,
        monitoring_status,
        energy: row.get(18)?,
        resources,
        meta_data,
        footprint,
        energy_footprint,
        tags: Vec::new(),
        statistics: IndexMap::new(),
    })
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
