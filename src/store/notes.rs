//! Queries for the `notes` table.

use rusqlite::{params, Connection};

use super::{AppRecord, Note, StorageError};

pub fn insert(
    conn: &Connection,
    app: &AppRecord,
    text: &str,
    now: &str,
) -> Result<Note, StorageError> {
    conn.execute(
        "INSERT INTO notes (app_id, created_at, note) VALUES (?1, ?2, ?3)",
        params![app.id, now, text],
    )?;
    Ok(Note {
        id: conn.last_insert_rowid(),
        app_name: app.name.clone(),
        created_at: now.to_string(),
        note: text.to_string(),
    })
}

pub fn list_for_app(conn: &Connection, app: &AppRecord) -> Result<Vec<Note>, StorageError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, created_at, note FROM notes WHERE app_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![app.id], |row| {
        Ok(Note {
            id: row.get(0)?,
            app_name: app.name.clone(),
            created_at: row.get(1)?,
            note: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
