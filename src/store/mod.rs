//! Version/status store backed by SQLite
//!
//! One canonical schema (see [`schema`]) holds the application records, their
//! last-analyzed fingerprints and free-form notes. Every other part of the
//! crate goes through [`Store`]; nothing else opens the database.
//!
//! The store owns a single connection behind a mutex. Each public operation
//! acquires it for exactly one unit of work, and multi-statement operations
//! run inside an immediate transaction, so two workers can never interleave
//! on the same application row.
//!
//! # Example
//!
//! ```no_run
//! use repkeeper::store::{AppStatus, Store};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), repkeeper::store::StorageError> {
//! let store = Store::open(Path::new("metadata/repkeeper.db"))?;
//! let app = store.get_or_create("billing")?;
//! assert_eq!(app.status, AppStatus::New);
//! # Ok(())
//! # }
//! ```

pub mod applications;
pub mod fingerprints;
pub mod notes;
pub mod schema;
mod types;

pub use types::{AppRecord, AppStatus, Note};

use crate::fingerprint::Fingerprint;
use rusqlite::{Connection, TransactionBehavior};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to prepare database location {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Refusing to lower version of application {id} from {current} to {requested}")]
    VersionRegression {
        id: i64,
        current: i64,
        requested: i64,
    },

    #[error("Invalid status value: {0}")]
    InvalidStatus(String),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        schema::apply_pragmas(&conn, false)?;
        schema::apply_schema(&conn)?;
        info!(path = %path.display(), "Store opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        schema::apply_pragmas(&conn, true)?;
        schema::apply_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let guard = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&guard)
    }

    /// Run `f` inside an immediate transaction; commits only if `f` succeeds.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let mut guard = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Fetch the record for `name`, creating it (version 1, status `new`) on
    /// first discovery.
    pub fn get_or_create(&self, name: &str) -> Result<AppRecord, StorageError> {
        let (record, created) =
            self.with_transaction(|conn| applications::get_or_create(conn, name, &now()))?;
        if created {
            info!(app = %name, id = record.id, "Created application record");
        }
        Ok(record)
    }

    /// Set the status and, when given, the version. Always refreshes
    /// `last_updated`.
    pub fn update_status(
        &self,
        id: i64,
        status: AppStatus,
        version: Option<i64>,
    ) -> Result<AppRecord, StorageError> {
        self.with_transaction(|conn| applications::update_status(conn, id, status, version, &now()))
    }

    pub fn stored_fingerprint(&self, id: i64) -> Result<Fingerprint, StorageError> {
        self.with_conn(|conn| fingerprints::load(conn, id))
    }

    /// Replace the stored fingerprint as one atomic unit.
    pub fn replace_fingerprint(
        &self,
        id: i64,
        fingerprint: &Fingerprint,
    ) -> Result<(), StorageError> {
        self.with_transaction(|conn| {
            applications::get(conn, id)?;
            fingerprints::replace(conn, id, fingerprint)
        })
    }

    /// Persist an analysis pass: new fingerprint, status `analyzed`, and a
    /// version increment of exactly one when `bump_version` is set.
    pub fn record_analysis(
        &self,
        id: i64,
        fingerprint: &Fingerprint,
        bump_version: bool,
    ) -> Result<AppRecord, StorageError> {
        let record = self.with_transaction(|conn| {
            applications::get(conn, id)?;
            fingerprints::replace(conn, id, fingerprint)?;
            applications::mark_analyzed(conn, id, bump_version, &now())
        })?;
        debug!(
            app = %record.name,
            version = record.version,
            files = fingerprint.len(),
            bumped = bump_version,
            "Analysis recorded"
        );
        Ok(record)
    }

    pub fn mark_packaged(&self, id: i64, archive: &Path) -> Result<AppRecord, StorageError> {
        let archive = archive.to_string_lossy();
        self.with_transaction(|conn| applications::mark_packaged(conn, id, &archive, &now()))
    }

    pub fn get(&self, id: i64) -> Result<AppRecord, StorageError> {
        self.with_conn(|conn| applications::get(conn, id))
    }

    pub fn find(&self, name: &str) -> Result<Option<AppRecord>, StorageError> {
        self.with_conn(|conn| applications::find_by_name(conn, name))
    }

    /// All records ordered by name, retired ones included.
    pub fn list(&self) -> Result<Vec<AppRecord>, StorageError> {
        self.with_conn(|conn| applications::list(conn, true))
    }

    pub fn list_active(&self) -> Result<Vec<AppRecord>, StorageError> {
        self.with_conn(|conn| applications::list(conn, false))
    }

    pub fn add_note(&self, name: &str, text: &str) -> Result<Note, StorageError> {
        self.with_transaction(|conn| {
            let app = applications::require_by_name(conn, name)?;
            notes::insert(conn, &app, text, &now())
        })
    }

    pub fn notes(&self, name: &str) -> Result<Vec<Note>, StorageError> {
        self.with_conn(|conn| {
            let app = applications::require_by_name(conn, name)?;
            notes::list_for_app(conn, &app)
        })
    }

    /// Mark an application as retired. Its history is kept and the
    /// workflow stops processing it.
    pub fn retire(&self, name: &str) -> Result<AppRecord, StorageError> {
        self.with_transaction(|conn| applications::set_retired(conn, name, Some(&now())))
    }

    pub fn reinstate(&self, name: &str) -> Result<AppRecord, StorageError> {
        self.with_transaction(|conn| applications::set_retired(conn, name, None))
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
