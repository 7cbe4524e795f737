// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tag rows and the job↔tag link table.

use jm_core::{Tag, TagScope};
use rusqlite::{params, Connection};

use crate::error::RepoError;
use crate::repo::{not_found, JobRepository};

pub(crate) fn create_or_get_tag(
    conn: &Connection,
    tag_type: &str,
    name: &str,
    scope: &str,
) -> Result<i64, RepoError> {
    if let Some(id) = conn
        .query_row(
            "SELECT id FROM tag WHERE type = ?1 AND name = ?2 AND scope = ?3",
            params![tag_type, name, scope],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?
    {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO tag (type, name, scope) VALUES (?1, ?2, ?3)",
        params![tag_type, name, scope],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn link(conn: &Connection, job_id: i64, tag_id: i64) -> Result<(), RepoError> {
    conn.execute(
        "INSERT OR IGNORE INTO jobtag (job_id, tag_id) VALUES (?1, ?2)",
        params![job_id, tag_id],
    )?;
    Ok(())
}

pub(crate) fn tags_for_job(conn: &Connection, job_id: i64) -> Result<Vec<Tag>, RepoError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.type, t.name, t.scope FROM tag t
         JOIN jobtag jt ON jt.tag_id = t.id WHERE jt.job_id = ?1
         ORDER BY t.type, t.name",
    )?;
    let rows = stmt.query_map(params![job_id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            tag_type: row.get(1)?,
            name: row.get(2)?,
            scope: row.get(3)?,
        })
    })?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

impl JobRepository {
    /// Create the tag if it does not exist and attach it to a committed
    /// job. Cached jobs must be promoted before tagging.
    ///
    /// Scope rules: `global` is open to everyone, `admin` requires admin
    /// rights, and a username scope must match the acting user.
    pub fn add_tag_or_create(
        &self,
        acting_user: &str,
        is_admin: bool,
        job_id: i64,
        tag_type: &str,
        name: &str,
        scope: &str,
    ) -> Result<i64, RepoError> {
        match TagScope::parse(scope) {
            TagScope::Global => {}
            TagScope::Admin if is_admin => {}
            TagScope::User(ref owner) if owner == acting_user => {}
            _ => return Err(RepoError::TagScopeDenied(scope.to_string())),
        }
        let conn = self.conn.lock();
        // The job must exist in the main table for the link to hold.
        conn.query_row("SELECT id FROM job WHERE id = ?1", params![job_id], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(not_found)?;
        let tag_id = create_or_get_tag(&conn, tag_type, name, scope)?;
        link(&conn, job_id, tag_id)?;
        Ok(tag_id)
    }

    /// Detach one tag from one job. The tag row itself is kept.
    pub fn remove_job_tag(&self, job_id: i64, tag_id: i64) -> Result<(), RepoError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM jobtag WHERE job_id = ?1 AND tag_id = ?2",
            params![job_id, tag_id],
        )?;
        if n == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    /// Delete a tag everywhere: all links plus the tag row.
    pub fn remove_tag_globally(
        &self,
        tag_type: &str,
        name: &str,
        scope: &str,
    ) -> Result<(), RepoError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let tag_id: i64 = tx
            .query_row(
                "SELECT id FROM tag WHERE type = ?1 AND name = ?2 AND scope = ?3",
                params![tag_type, name, scope],
                |row| row.get(0),
            )
            .map_err(not_found)?;
        tx.execute("DELETE FROM jobtag WHERE tag_id = ?1", params![tag_id])?;
        tx.execute("DELETE FROM tag WHERE id = ?1", params![tag_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Resolve a tag id by its identity tuple.
    pub fn find_tag(&self, tag_type: &str, name: &str, scope: &str) -> Result<i64, RepoError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id FROM tag WHERE type = ?1 AND name = ?2 AND scope = ?3",
            params![tag_type, name, scope],
            |row| row.get(0),
        )
        .map_err(not_found)
    }
}

#[cfg(test)]
#[path = "tags_tests.rs"]
mod tests;
