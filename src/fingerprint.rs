//! Directory tree fingerprinting
//!
//! A [`Fingerprint`] maps every regular file under an application root to the
//! digest of its content. Paths are relative to the root and always use `/`
//! as the separator, so fingerprints compare equal across hosts.
//!
//! Symlinks are never followed. They are skipped and reported alongside
//! unreadable entries in [`FingerprintScan::skipped`].

use crate::hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("Directory does not exist: {0}")]
    RootNotFound(PathBuf),
    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Mapping from relative file path to content digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint {
    entries: BTreeMap<String, String>,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, digest: impl Into<String>) {
        self.entries.insert(path.into(), digest.into());
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.entries.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_str()))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Fingerprint {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Why an entry was left out of a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Symlink,
    /// Sockets, FIFOs and device nodes
    Special,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: SkipReason,
}

/// Result of walking one tree
#[derive(Debug, Clone, Default)]
pub struct FingerprintScan {
    pub fingerprint: Fingerprint,
    pub skipped: Vec<SkippedEntry>,
}

impl FingerprintScan {
    /// Entries whose content could not be read. A scan with any of these
    /// does not describe the tree completely.
    pub fn unreadable(&self) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped
            .iter()
            .filter(|entry| matches!(entry.reason, SkipReason::Unreadable(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.unreadable().next().is_none()
    }
}

pub struct TreeFingerprinter {
    root: PathBuf,
}

impl TreeFingerprinter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn fingerprint(&self) -> Result<FingerprintScan, FingerprintError> {
        if !self.root.exists() {
            return Err(FingerprintError::RootNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(FingerprintError::NotADirectory(self.root.clone()));
        }

        debug!(root = %self.root.display(), "Fingerprinting directory");
        let mut scan = FingerprintScan::default();

        for result in WalkDir::new(&self.root).min_depth(1).follow_links(false) {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| self.relative(p))
                        .filter(|p| !p.is_empty())
                        .unwrap_or_else(|| ".".to_string());
                    warn!(path = %path, error = %err, "Failed to read directory entry");
                    scan.skipped.push(SkippedEntry {
                        path,
                        reason: SkipReason::Unreadable(err.to_string()),
                    });
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let rel_path = self.relative(entry.path());
            if file_type.is_symlink() {
                debug!(path = %rel_path, "Skipping symlink");
                scan.skipped.push(SkippedEntry {
                    path: rel_path,
                    reason: SkipReason::Symlink,
                });
                continue;
            }
            if !file_type.is_file() {
                debug!(path = %rel_path, "Skipping special file");
                scan.skipped.push(SkippedEntry {
                    path: rel_path,
                    reason: SkipReason::Special,
                });
                continue;
            }

            if entry.path().to_str().is_none() {
                warn!(path = %rel_path, "Skipping file with non UTF-8 name");
                scan.skipped.push(SkippedEntry {
                    path: rel_path,
                    reason: SkipReason::Unreadable("file name is not valid UTF-8".to_string()),
                });
                continue;
            }

            match hash::hash_file(entry.path()) {
                Ok(digest) => {
                    trace!(path = %rel_path, digest = %digest, "Hashed file");
                    scan.fingerprint.insert(rel_path, digest);
                }
                Err(err) => {
                    warn!(path = %rel_path, error = %err, "Failed to hash file");
                    scan.skipped.push(SkippedEntry {
                        path: rel_path,
                        reason: SkipReason::Unreadable(err.to_string()),
                    });
                }
            }
        }

        debug!(
            root = %self.root.display(),
            files = scan.fingerprint.len(),
            skipped = scan.skipped.len(),
            "Fingerprint complete"
        );
        Ok(scan)
    }

    fn relative(&self, path: &Path) -> String {
        to_posix(path.strip_prefix(&self.root).unwrap_or(path))
    }
}

/// Joins the normal components of `path` with `/`.
pub fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
