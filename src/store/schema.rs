//! Canonical schema and connection PRAGMAs.
//!
//! The schema is applied once when the store is opened, before any worker
//! touches it. Every statement is idempotent.

use rusqlite::Connection;

use super::StorageError;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_name TEXT NOT NULL UNIQUE,
    version INTEGER NOT NULL DEFAULT 1 CHECK (version >= 1),
    status TEXT NOT NULL DEFAULT 'new'
        CHECK (status IN ('new', 'analyzed', 'packaged')),
    last_updated TEXT NOT NULL,
    package_path TEXT,
    retired_at TEXT
);

-- Replaced wholesale on every analysis pass.
CREATE TABLE IF NOT EXISTS file_hashes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
    file_path TEXT NOT NULL,
    file_hash TEXT NOT NULL,
    UNIQUE (app_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_file_hashes_app
    ON file_hashes(app_id);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    app_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    note TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_app
    ON notes(app_id, created_at);
"#;

/// Apply connection PRAGMAs. WAL is skipped for in-memory databases.
pub fn apply_pragmas(conn: &Connection, in_memory: bool) -> Result<(), StorageError> {
    if !in_memory {
        // journal_mode answers with a row, so it can't go through execute_batch.
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    }
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
