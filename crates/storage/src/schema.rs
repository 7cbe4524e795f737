// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schema creation and version gate.

use crate::error::RepoError;
use rusqlite::Connection;

/// Current metadata schema revision. Stored in the `version` table;
/// migration tooling is external, a mismatch is a hard error.
pub const SCHEMA_VERSION: i64 = 2;

/// `job_cache` ids start above this offset so the two tables never hand
/// out the same internal id. An id below the offset is always a `job`
/// row, above always a cache row.
pub const CACHE_ID_OFFSET: i64 = 1_000_000_000;

const JOB_COLUMNS: &str = r#"
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id INTEGER NOT NULL,
    cluster TEXT NOT NULL,
    subcluster TEXT NOT NULL DEFAULT '',
    "partition" TEXT NOT NULL DEFAULT '',
    array_job_id INTEGER NOT NULL DEFAULT 0,
    user TEXT NOT NULL,
    project TEXT NOT NULL DEFAULT '',
    start_time INTEGER NOT NULL,
    duration INTEGER NOT NULL DEFAULT 0,
    walltime INTEGER NOT NULL DEFAULT 0,
    num_nodes INTEGER NOT NULL,
    num_hwthreads INTEGER NOT NULL DEFAULT 0,
    num_acc INTEGER NOT NULL DEFAULT 0,
    smt INTEGER NOT NULL DEFAULT 0,
    shared TEXT NOT NULL DEFAULT 'none',
    state TEXT NOT NULL,
    monitoring_status INTEGER NOT NULL DEFAULT 1,
    energy REAL NOT NULL DEFAULT 0,
    resources TEXT NOT NULL,
    meta_data TEXT,
    footprint TEXT,
    energy_footprint TEXT
"#;

pub(crate) fn init(conn: &Connection) -> Result<(), RepoError> {
    conn.execute_batch(&format!(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS job ({job_cols});
        CREATE TABLE IF NOT EXISTS job_cache ({job_cols});

        CREATE UNIQUE INDEX IF NOT EXISTS idx_job_identity
            ON job (job_id, cluster, start_time);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_job_cache_identity
            ON job_cache (job_id, cluster, start_time);
        CREATE INDEX IF NOT EXISTS idx_job_state ON job (state);
        CREATE INDEX IF NOT EXISTS idx_job_cluster_start ON job (cluster, start_time);
        CREATE INDEX IF NOT EXISTS idx_job_project ON job (project);
        CREATE INDEX IF NOT EXISTS idx_job_user ON job (user);

        CREATE TABLE IF NOT EXISTS tag (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL,
            name TEXT NOT NULL,
            scope TEXT NOT NULL DEFAULT 'global',
            UNIQUE (type, name, scope)
        );

        CREATE TABLE IF NOT EXISTS jobtag (
            job_id INTEGER NOT NULL REFERENCES job (id) ON DELETE CASCADE,
            tag_id INTEGER NOT NULL REFERENCES tag (id) ON DELETE CASCADE,
            PRIMARY KEY (job_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS node (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL,
            cluster TEXT NOT NULL,
            cpus_allocated INTEGER NOT NULL DEFAULT 0,
            memory_allocated INTEGER NOT NULL DEFAULT 0,
            gpus_allocated INTEGER NOT NULL DEFAULT 0,
            jobs_running INTEGER NOT NULL DEFAULT 0,
            node_state TEXT NOT NULL,
            health_state TEXT NOT NULL,
            time_stamp INTEGER NOT NULL,
            UNIQUE (hostname, cluster)
        );

        CREATE TABLE IF NOT EXISTS version (
            version INTEGER NOT NULL
        );
        "#,
        job_cols = JOB_COLUMNS,
    ))?;

    // Seed the cache sequence so cache ids live in their own range.
    conn.execute(
        "INSERT INTO sqlite_sequence (name, seq)
         SELECT 'job_cache', ?1
         WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = 'job_cache')",
        [CACHE_ID_OFFSET],
    )?;

    let found: Option<i64> =
        conn.query_row("SELECT version FROM version LIMIT 1", [], |row| row.get(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

    match found {
        None => {
            conn.execute("INSERT INTO version (version) VALUES (?1)", [SCHEMA_VERSION])?;
            Ok(())
        }
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(v) => Err(RepoError::SchemaVersion { found: v, expected: SCHEMA_VERSION }),
    }
}
