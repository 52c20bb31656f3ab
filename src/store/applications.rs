//! Queries for the `applications` table.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{AppRecord, AppStatus, StorageError};

const SELECT_COLUMNS: &str = "SELECT id, app_name, version, status, last_updated, package_path,
    retired_at FROM applications";

impl ToSql for AppStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AppStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: StorageError| FromSqlError::Other(Box::new(e)))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AppRecord> {
    Ok(AppRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        status: row.get(3)?,
        last_updated: row.get(4)?,
        package_path: row.get(5)?,
        retired_at: row.get(6)?,
    })
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<AppRecord>, StorageError> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE app_name = ?1"))?;
    Ok(stmt.query_row(params![name], row_to_record).optional()?)
}

pub fn require_by_name(conn: &Connection, name: &str) -> Result<AppRecord, StorageError> {
    find_by_name(conn, name)?.ok_or_else(|| StorageError::NotFound(name.to_string()))
}

pub fn get(conn: &Connection, id: i64) -> Result<AppRecord, StorageError> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
    stmt.query_row(params![id], row_to_record)
        .optional()?
        .ok_or_else(|| StorageError::NotFound(format!("id {id}")))
}

/// Insert the row if absent and return it, with whether it was created.
pub fn get_or_create(
    conn: &Connection,
    name: &str,
    now: &str,
) -> Result<(AppRecord, bool), StorageError> {
    let inserted = conn.execute(
        "INSERT INTO applications (app_name, last_updated) VALUES (?1, ?2)
         ON CONFLICT(app_name) DO NOTHING",
        params![name, now],
    )?;
    let record = require_by_name(conn, name)?;
    Ok((record, inserted == 1))
}

pub fn update_status(
    conn: &Connection,
    id: i64,
    status: AppStatus,
    version: Option<i64>,
    now: &str,
) -> Result<AppRecord, StorageError> {
    let current = get(conn, id)?;

    match version {
        Some(requested) if requested < current.version => {
            return Err(StorageError::VersionRegression {
                id,
                current: current.version,
                requested,
            });
        }
        Some(requested) => {
            conn.execute(
                "UPDATE applications SET status = ?1, version = ?2, last_updated = ?3
                 WHERE id = ?4",
                params![status, requested, now, id],
            )?;
        }
        None => {
            conn.execute(
                "UPDATE applications SET status = ?1, last_updated = ?2 WHERE id = ?3",
                params![status, now, id],
            )?;
        }
    }

    get(conn, id)
}

/// Set status `analyzed`, incrementing the version in place when `bump` is set.
pub fn mark_analyzed(
    conn: &Connection,
    id: i64,
    bump: bool,
    now: &str,
) -> Result<AppRecord, StorageError> {
    let updated = conn.execute(
        "UPDATE applications
         SET status = ?1, version = version + ?2, last_updated = ?3
         WHERE id = ?4",
        params![AppStatus::Analyzed, i64::from(bump), now, id],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("id {id}")));
    }
    get(conn, id)
}

pub fn mark_packaged(
    conn: &Connection,
    id: i64,
    package_path: &str,
    now: &str,
) -> Result<AppRecord, StorageError> {
    let updated = conn.execute(
        "UPDATE applications SET package_path = ?1, status = ?2, last_updated = ?3 WHERE id = ?4",
        params![package_path, AppStatus::Packaged, now, id],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(format!("id {id}")));
    }
    get(conn, id)
}

pub fn list(conn: &Connection, include_retired: bool) -> Result<Vec<AppRecord>, StorageError> {
    let sql = if include_retired {
        format!("{SELECT_COLUMNS} ORDER BY app_name")
    } else {
        format!("{SELECT_COLUMNS} WHERE retired_at IS NULL ORDER BY app_name")
    };
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt.query_map([], row_to_record)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Set or clear `retired_at` for an application.
pub fn set_retired(
    conn: &Connection,
    name: &str,
    retired_at: Option<&str>,
) -> Result<AppRecord, StorageError> {
    let updated = conn.execute(
        "UPDATE applications SET retired_at = ?1 WHERE app_name = ?2",
        params![retired_at, name],
    )?;
    if updated == 0 {
        return Err(StorageError::NotFound(name.to_string()));
    }
    require_by_name(conn, name)
}
