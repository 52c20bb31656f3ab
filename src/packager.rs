//! Versioned tar.gz packaging
//!
//! An application is never archived from its live tree. The packager first
//! copies the source into a private staging directory (a fresh
//! [`tempfile::TempDir`] per call), then archives the staged copy as
//! `{app}_v{version}.tar.gz` rooted at `{app}/`.
//!
//! The archive is written to a temporary file next to its final location and
//! renamed into place once complete, so an interrupted or failed run never
//! leaves a truncated archive behind under the final name. Staging and
//! partial files are removed on every exit path.

use crate::fingerprint::{to_posix, Fingerprint};
use crate::hash;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum PackagingError {
    #[error("Source directory does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to stage {path}: {source}")]
    Staging { path: PathBuf, source: io::Error },

    #[error("Failed to write archive {path}: {source}")]
    Archive { path: PathBuf, source: io::Error },

    #[error("Failed to read archive {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Archive {path} is not rooted at a single directory (found {found})")]
    UnexpectedLayout { path: PathBuf, found: String },
}

/// An archive written by [`Packager::package`]
#[derive(Debug, Clone, Serialize)]
pub struct PackagedArchive {
    pub path: PathBuf,
    pub files: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Contents of an archive read back by [`verify_archive`]
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveContents {
    pub root: String,
    pub fingerprint: Fingerprint,
}

pub fn archive_name(app_name: &str, version: i64) -> String {
    format!("{}_v{}.tar.gz", app_name, version)
}

pub struct Packager {
    output_dir: PathBuf,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn archive_path(&self, app_name: &str, version: i64) -> PathBuf {
        self.output_dir.join(archive_name(app_name, version))
    }

    pub fn package(
        &self,
        app_name: &str,
        version: i64,
        source_dir: &Path,
    ) -> Result<PackagedArchive, PackagingError> {
        if !source_dir.is_dir() {
            return Err(PackagingError::SourceNotFound(source_dir.to_path_buf()));
        }

        let staging = tempfile::Builder::new()
            .prefix("repkeeper-stage-")
            .tempdir()
            .map_err(|source| PackagingError::Staging {
                path: std::env::temp_dir(),
                source,
            })?;
        let staged_root = staging.path().join(app_name);
        let (files, skipped) = stage_tree(source_dir, &staged_root)?;
        debug!(
            app = %app_name,
            staging = %staging.path().display(),
            files,
            skipped,
            "Staged application"
        );

        let archive_path = self.archive_path(app_name, version);
        let archive_err = |source: io::Error| PackagingError::Archive {
            path: archive_path.clone(),
            source,
        };

        fs::create_dir_all(&self.output_dir).map_err(archive_err)?;
        let partial = tempfile::Builder::new()
            .prefix(&format!(".{}.", archive_name(app_name, version)))
            .suffix(".tmp")
            .tempfile_in(&self.output_dir)
            .map_err(archive_err)?;

        write_archive(partial.as_file(), app_name, &staged_root).map_err(archive_err)?;
        partial.as_file().sync_all().map_err(archive_err)?;
        partial
            .persist(&archive_path)
            .map_err(|e| archive_err(e.error))?;

        let bytes = fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        info!(
            app = %app_name,
            version,
            archive = %archive_path.display(),
            files,
            bytes,
            "Created archive"
        );

        Ok(PackagedArchive {
            path: archive_path,
            files,
            skipped,
            bytes,
        })
    }
}

/// Copy regular files and directories from `source` into `dest`.
/// Returns (files copied, entries skipped). Any entry that cannot be read
/// fails staging; only symlinks and special files are skipped.
fn stage_tree(source: &Path, dest: &Path) -> Result<(usize, usize), PackagingError> {
    let staging_err = |path: &Path, source: io::Error| PackagingError::Staging {
        path: path.to_path_buf(),
        source,
    };

    fs::create_dir_all(dest).map_err(|e| staging_err(dest, e))?;
    let mut files = 0;
    let mut skipped = 0;

    for result in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = result.map_err(|err| {
            let path = err.path().unwrap_or(source).to_path_buf();
            let message = err.to_string();
            let io_err = err
                .into_io_error()
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message));
            PackagingError::Staging {
                path,
                source: io_err,
            }
        })?;

        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| staging_err(&target, e))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target).map_err(|e| staging_err(entry.path(), e))?;
            files += 1;
        } else {
            debug!(path = %to_posix(rel), "Not staging symlink or special file");
            skipped += 1;
        }
    }

    Ok((files, skipped))
}

fn write_archive(out: &File, app_name: &str, staged_root: &Path) -> io::Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);
    builder.follow_symlinks(false);
    builder.append_dir_all(app_name, staged_root)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Read an archive back and fingerprint its files relative to its top-level
/// directory.
pub fn verify_archive(path: &Path) -> Result<ArchiveContents, PackagingError> {
    let read_err = |source: io::Error| PackagingError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut root: Option<String> = None;
    let mut fingerprint = Fingerprint::new();

    for entry in archive.entries().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let entry_path = entry.path().map_err(read_err)?.into_owned();
        if entry_path.to_str().is_none() {
            return Err(read_err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry name is not valid UTF-8: {}", entry_path.display()),
            )));
        }

        let mut components = entry_path.components().filter_map(|c| match c {
            Component::Normal(part) => part.to_str().map(str::to_string),
            _ => None,
        });
        let Some(top) = components.next() else {
            continue;
        };

        match &root {
            None => root = Some(top),
            Some(existing) if *existing != top => {
                return Err(PackagingError::UnexpectedLayout {
                    path: path.to_path_buf(),
                    found: format!("{}, {}", existing, top),
                });
            }
            Some(_) => {}
        }

        if entry.header().entry_type().is_file() {
            let rel = components.collect::<Vec<_>>().join("/");
            let digest = hash::hash_reader(entry).map_err(read_err)?;
            fingerprint.insert(rel, digest);
        }
    }

    Ok(ArchiveContents {
        root: root.unwrap_or_default(),
        fingerprint,
    })
}
