//! repkeeper - change detection and versioned packaging for application trees
//!
//! repkeeper watches a directory whose immediate subdirectories are
//! applications. For each one it computes a content fingerprint, compares it
//! with the fingerprint recorded in SQLite, and when the content changed it
//! bumps the application's version, writes `{app}_v{version}.tar.gz` and
//! emits a deployment plan.
//!
//! # Example Usage
//!
//! ```no_run
//! use repkeeper::{Manager, RepkeeperConfig, Store};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RepkeeperConfig::load(None)?;
//! let store = Arc::new(Store::open(&config.database_path)?);
//! let summary = Manager::new(config, store).run().await?;
//!
//! for outcome in &summary.outcomes {
//!     println!("{} v{} {}", outcome.name, outcome.version, outcome.action);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`hash`]: streaming SHA-256 of file contents
//! - [`fingerprint`]: per-tree mapping of relative path to digest
//! - [`detect`]: comparing fingerprints
//! - [`store`]: versions, statuses, fingerprints and notes in SQLite
//! - [`packager`]: staged tar.gz archives
//! - [`plan`]: deployment plan documents
//! - [`workflow`]: the per-application state machine and concurrent runs
//! - [`discrepancy`]: read-only consistency report

pub mod cli;
pub mod config;
pub mod detect;
pub mod discrepancy;
pub mod fingerprint;
pub mod hash;
pub mod packager;
pub mod plan;
pub mod progress;
pub mod store;
pub mod util;
pub mod workflow;

pub use config::{ConfigError, RepkeeperConfig};
pub use detect::ChangeSet;
pub use discrepancy::{DiscrepancyAnalyzer, DiscrepancyReport, Finding};
pub use fingerprint::{Fingerprint, FingerprintError, TreeFingerprinter};
pub use packager::{Packager, PackagingError};
pub use store::{AppRecord, AppStatus, Note, StorageError, Store};
pub use util::{init_logging, LoggingConfig};
pub use workflow::{AppAction, AppOutcome, Manager, ProcessError, RunSummary, WorkflowError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "repkeeper");
    }
}
