//! Queries for the `file_hashes` table.

use rusqlite::{params, Connection};

use super::StorageError;
use crate::fingerprint::Fingerprint;

pub fn load(conn: &Connection, app_id: i64) -> Result<Fingerprint, StorageError> {
    let mut stmt =
        conn.prepare_cached("SELECT file_path, file_hash FROM file_hashes WHERE app_id = ?1")?;
    let rows = stmt.query_map(params![app_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    Ok(rows.collect::<Result<Fingerprint, _>>()?)
}

/// Delete every stored hash for the application and insert `fingerprint`.
/// Callers run this inside a transaction.
pub fn replace(
    conn: &Connection,
    app_id: i64,
    fingerprint: &Fingerprint,
) -> Result<(), StorageError> {
    conn.execute("DELETE FROM file_hashes WHERE app_id = ?1", params![app_id])?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO file_hashes (app_id, file_path, file_hash) VALUES (?1, ?2, ?3)",
    )?;
    for (path, digest) in fingerprint.iter() {
        stmt.execute(params![app_id, path, digest])?;
    }
    Ok(())
}

pub fn count(conn: &Connection, app_id: i64) -> Result<i64, StorageError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM file_hashes WHERE app_id = ?1",
        params![app_id],
        |row| row.get(0),
    )?)
}
