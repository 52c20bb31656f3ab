//! Deployment plan documents
//!
//! A plan is a fixed Markdown checklist parameterized only by application
//! name and version, so re-emitting a plan for the same version always
//! produces the same file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
#[error("Failed to write deployment plan {path}: {source}")]
pub struct PlanError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

pub fn plan_file_name(app_name: &str, version: i64) -> String {
    format!("{}_v{}_deployment_plan.md", app_name, version)
}

pub fn render(app_name: &str, version: i64) -> String {
    format!(
        "# Deployment Plan: {app_name} v{version}

**Deployment Date:** YYYY-MM-DD

---

## Pre-Deployment Checklist

- [ ] Backup databases
- [ ] Notify stakeholders
- [ ] Staging environment verified
- [ ] Archive `{archive}` checksum recorded

---

## Deployment Steps

1. Deploy `{archive}` to production servers.
2. Run smoke tests.
3. Monitor logs and performance metrics.

---

## Rollback Plan

- Revert to version {previous}.
- Restore database from backup if necessary.

---

## Notes

- Add any relevant notes here.
",
        archive = crate::packager::archive_name(app_name, version),
        previous = previous_version(version),
    )
}

fn previous_version(version: i64) -> String {
    if version > 1 {
        format!("v{}", version - 1)
    } else {
        "the previous release (none recorded)".to_string()
    }
}

/// Write the plan to `{plans_dir}/{app}_v{version}_deployment_plan.md`,
/// replacing any existing file for the same version.
pub fn emit(app_name: &str, version: i64, plans_dir: &Path) -> Result<PathBuf, PlanError> {
    let path = plans_dir.join(plan_file_name(app_name, version));
    let write = || -> io::Result<()> {
        fs::create_dir_all(plans_dir)?;
        fs::write(&path, render(app_name, version))
    };
    write().map_err(|source| PlanError {
        path: path.clone(),
        source,
    })?;

    info!(app = %app_name, version, plan = %path.display(), "Generated deployment plan");
    Ok(path)
}
