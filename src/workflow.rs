//! Run orchestration
//!
//! A run discovers the immediate subdirectories of the apps directory and
//! drives each through one pass of:
//!
//! ```text
//!   get_or_create ─► fingerprint ─► detect ─┬─ new ──────► record (v1) ──┐
//!                                           ├─ changed ──► record (v+1) ─┤
//!                                           ├─ analyzed ─────────────────┤
//!                                           └─ unchanged ─► done         │
//!                                                                        ▼
//!                                     done ◄─ emit plan ◄─ mark_packaged ◄─ package
//! ```
//!
//! An application left in `analyzed` by an earlier packaging failure is
//! packaged again at its current version on the next run, without a bump.
//!
//! A tree with unreadable entries fails its application before anything is
//! recorded, so a read error is never mistaken for removed content.
//!
//! Failures are isolated per application: a vanished directory or a failed
//! archive is recorded in the [`RunSummary`] and the run moves on. Storage
//! failures abort the run, since nothing after them can be trusted.
//!
//! Processing is blocking filesystem and SQLite work, so each application
//! runs on tokio's blocking pool, bounded by a semaphore of `jobs` permits.

use crate::config::RepkeeperConfig;
use crate::detect::{self, ChangeSet};
use crate::fingerprint::{FingerprintError, SkippedEntry, TreeFingerprinter};
use crate::packager::{Packager, PackagingError};
use crate::plan::{self, PlanError};
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use crate::store::{AppRecord, AppStatus, StorageError, Store};
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Errors that end a whole run
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("Applications directory not found: {0}")]
    AppsDirectoryMissing(PathBuf),

    #[error("Failed to list applications in {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Errors confined to one application
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Application directory not found: {0}")]
    NotFound(PathBuf),

    #[error(transparent)]
    Fingerprint(FingerprintError),

    #[error("Could not read {} in {name}: {}", .paths.len(), .paths.join(", "))]
    Unreadable { name: String, paths: Vec<String> },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Packaging(#[from] PackagingError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("Worker for {name} stopped unexpectedly: {message}")]
    Worker { name: String, message: String },
}

impl From<FingerprintError> for ProcessError {
    fn from(err: FingerprintError) -> Self {
        match err {
            FingerprintError::RootNotFound(path) => ProcessError::NotFound(path),
            other => ProcessError::Fingerprint(other),
        }
    }
}

/// What a pass did to one application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppAction {
    /// First sighting, packaged as version 1
    Created,
    /// Content changed, version bumped and packaged
    Updated,
    /// Unchanged but never packaged successfully, packaged again
    Repackaged,
    Unchanged,
    /// Retired in the store, not processed
    Retired,
}

impl fmt::Display for AppAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppAction::Created => "created",
            AppAction::Updated => "updated",
            AppAction::Repackaged => "repackaged",
            AppAction::Unchanged => "unchanged",
            AppAction::Retired => "retired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppOutcome {
    pub name: String,
    pub action: AppAction,
    pub version: i64,
    pub status: AppStatus,
    pub archive: Option<PathBuf>,
    pub plan: Option<PathBuf>,
    pub changes: ChangeSet,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub outcomes: Vec<AppOutcome>,
    pub failures: Vec<AppFailure>,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn count(&self, action: AppAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }
}

/// Immediate subdirectories of `apps_dir`, sorted by name.
///
/// Hidden directories and symlinks are ignored.
pub fn discover_applications(apps_dir: &Path) -> Result<Vec<String>, WorkflowError> {
    if !apps_dir.is_dir() {
        return Err(WorkflowError::AppsDirectoryMissing(apps_dir.to_path_buf()));
    }
    let io_err = |source: io::Error| WorkflowError::Io {
        path: apps_dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(apps_dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.starts_with('.') => {}
            Ok(name) => names.push(name),
            Err(raw) => {
                warn!(name = ?raw, "Skipping application with non UTF-8 name");
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Drives applications through detection, versioning and packaging
#[derive(Clone)]
pub struct Manager {
    config: Arc<RepkeeperConfig>,
    store: Arc<Store>,
    packager: Arc<Packager>,
    progress: Arc<dyn ProgressHandler>,
}

impl Manager {
    pub fn new(config: RepkeeperConfig, store: Arc<Store>) -> Self {
        let packager = Packager::new(config.output_directory.clone());
        Self {
            config: Arc::new(config),
            store,
            packager: Arc::new(packager),
            progress: Arc::new(NoOpHandler),
        }
    }

    pub fn with_progress(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub fn config(&self) -> &RepkeeperConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// One pass over a single application.
    pub fn process_application(&self, name: &str) -> Result<AppOutcome, ProcessError> {
        let source_dir = self.config.apps_directory.join(name);
        if !source_dir.is_dir() {
            return Err(ProcessError::NotFound(source_dir));
        }

        let record = self.store.get_or_create(name)?;
        if record.is_retired() {
            debug!(app = %name, "Skipping retired application");
            return Ok(self.outcome(&record, AppAction::Retired, ChangeSet::default(), Vec::new()));
        }

        let scan = TreeFingerprinter::new(&source_dir).fingerprint()?;
        if !scan.is_complete() {
            let paths: Vec<String> = scan.unreadable().map(|e| e.path.clone()).collect();
            warn!(
                app = %name,
                unreadable = paths.len(),
                "Tree could not be read completely, leaving version untouched"
            );
            return Err(ProcessError::Unreadable {
                name: name.to_string(),
                paths,
            });
        }
        let stored = self.store.stored_fingerprint(record.id)?;
        let changed = detect::detect(&scan.fingerprint, &stored);
        let changes = detect::diff(&scan.fingerprint, &stored);

        let (record, action) = match record.status {
            AppStatus::New => {
                let record = self.store.record_analysis(record.id, &scan.fingerprint, false)?;
                (record, AppAction::Created)
            }
            _ if changed => {
                info!(
                    app = %name,
                    added = changes.added.len(),
                    removed = changes.removed.len(),
                    modified = changes.modified.len(),
                    "Changes detected"
                );
                let record = self.store.record_analysis(record.id, &scan.fingerprint, true)?;
                (record, AppAction::Updated)
            }
            AppStatus::Analyzed => {
                info!(app = %name, version = record.version, "Retrying packaging");
                (record, AppAction::Repackaged)
            }
            AppStatus::Packaged => {
                debug!(app = %name, version = record.version, "No changes");
                return Ok(self.outcome(&record, AppAction::Unchanged, changes, scan.skipped));
            }
        };

        let archive = match self.packager.package(name, record.version, &source_dir) {
            Ok(archive) => archive,
            Err(err) => {
                error!(
                    app = %name,
                    version = record.version,
                    error = %err,
                    "Packaging failed, application left in analyzed state"
                );
                return Err(err.into());
            }
        };
        let record = self.store.mark_packaged(record.id, &archive.path)?;
        let plan_path = plan::emit(name, record.version, &self.config.deployment_plans_directory)?;

        let mut outcome = self.outcome(&record, action, changes, scan.skipped);
        outcome.archive = Some(archive.path);
        outcome.plan = Some(plan_path);
        Ok(outcome)
    }

    fn outcome(
        &self,
        record: &AppRecord,
        action: AppAction,
        changes: ChangeSet,
        skipped: Vec<SkippedEntry>,
    ) -> AppOutcome {
        AppOutcome {
            name: record.name.clone(),
            action,
            version: record.version,
            status: record.status,
            archive: None,
            plan: None,
            changes,
            skipped,
        }
    }

    /// Discover every application and process them.
    pub async fn run(&self) -> Result<RunSummary, WorkflowError> {
        let names = discover_applications(&self.config.apps_directory)?;
        self.run_apps(names).await
    }

    /// Process the given applications with at most `jobs` in flight.
    pub async fn run_apps(&self, names: Vec<String>) -> Result<RunSummary, WorkflowError> {
        let started = Instant::now();
        let total = names.len();
        self.progress.on_progress(&ProgressEvent::RunStarted {
            apps_dir: self.config.apps_directory.clone(),
            total,
        });

        let semaphore = Arc::new(Semaphore::new(self.config.jobs.max(1)));
        let abort = Arc::new(AtomicBool::new(false));
        let mut tasks = JoinSet::new();

        for (index, name) in names.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            if abort.load(Ordering::SeqCst) {
                break;
            }

            let manager = self.clone();
            let abort = abort.clone();
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    manager.process_tracked(&name, index + 1, total)
                }))
                .unwrap_or_else(|payload| {
                    Err(ProcessError::Worker {
                        name: name.clone(),
                        message: panic_message(payload.as_ref()),
                    })
                });
                if matches!(result, Err(ProcessError::Storage(_))) {
                    abort.store(true, Ordering::SeqCst);
                }
                (name, result)
            });
        }

        let mut summary = RunSummary::default();
        let mut fatal: Option<StorageError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (name, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    error!(error = %err, "Worker task was cancelled");
                    continue;
                }
            };

            match result {
                Ok(outcome) => summary.outcomes.push(outcome),
                Err(ProcessError::Storage(err)) => {
                    error!(app = %name, error = %err, "Storage failure, aborting run");
                    fatal.get_or_insert(err);
                }
                Err(err) => summary.failures.push(AppFailure {
                    name,
                    error: err.to_string(),
                }),
            }
        }

        if let Some(err) = fatal {
            return Err(WorkflowError::Storage(err));
        }

        summary.outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        summary.failures.sort_by(|a, b| a.name.cmp(&b.name));
        summary.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        self.progress.on_progress(&ProgressEvent::RunCompleted {
            processed: summary.outcomes.len(),
            failed: summary.failures.len(),
            total_time: started.elapsed(),
        });
        Ok(summary)
    }

    fn process_tracked(
        &self,
        name: &str,
        index: usize,
        total: usize,
    ) -> Result<AppOutcome, ProcessError> {
        let started = Instant::now();
        self.progress.on_progress(&ProgressEvent::AppStarted {
            name: name.to_string(),
            index,
            total,
        });

        let result = self.process_application(name);
        match &result {
            Ok(outcome) => self.progress.on_progress(&ProgressEvent::AppCompleted {
                name: name.to_string(),
                action: outcome.action,
                version: outcome.version,
                duration: started.elapsed(),
            }),
            Err(err) => self.progress.on_progress(&ProgressEvent::AppFailed {
                name: name.to_string(),
                error: err.to_string(),
            }),
        }
        result
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
