//! Discrepancy analysis
//!
//! Compares the applications directory with the store and inspects each
//! application tree for missing files and leftover TODO/FIXME markers. The
//! analysis only reads; it never registers applications or touches versions.

use crate::config::RepkeeperConfig;
use crate::fingerprint::to_posix;
use crate::store::{StorageError, Store};
use crate::workflow::{discover_applications, WorkflowError};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

const REQUIREMENTS_FILE: &str = "requirements.txt";

#[derive(Debug, Error)]
pub enum DiscrepancyError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to write report {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// Directory exists but the store has never seen it
    UnregisteredDirectory,
    /// Active record whose directory is gone
    MissingDirectory,
    MissingRequiredFile { file: String },
    MissingRequirementsFile,
    /// A `TODO` or `FIXME` line; `marker` is the word that matched
    TodoMarker {
        marker: String,
        file: String,
        line: usize,
        text: String,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::UnregisteredDirectory => {
                write!(f, "Directory is not registered in the database")
            }
            Finding::MissingDirectory => {
                write!(f, "Registered application has no directory")
            }
            Finding::MissingRequiredFile { file } => write!(f, "Missing {}", file),
            Finding::MissingRequirementsFile => {
                write!(f, "Python application without {}", REQUIREMENTS_FILE)
            }
            Finding::TodoMarker { file, line, text, .. } => {
                write!(f, "{}:{}: {}", file, line, text)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppFindings {
    pub name: String,
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscrepancyReport {
    pub applications: Vec<AppFindings>,
}

impl DiscrepancyReport {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn total(&self) -> usize {
        self.applications.iter().map(|a| a.findings.len()).sum()
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Discrepancy Analysis Report\n\n");
        if self.is_empty() {
            out.push_str("No discrepancies found.\n");
            return out;
        }

        for app in &self.applications {
            let _ = writeln!(out, "## Application: {}\n", app.name);
            for finding in &app.findings {
                match finding {
                    Finding::TodoMarker { marker, .. } => {
                        let _ = writeln!(out, "- {}: `{}`", marker, finding);
                    }
                    _ => {
                        let _ = writeln!(out, "- {}", finding);
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> Result<(), DiscrepancyError> {
        let write = || -> io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, self.to_markdown())
        };
        write().map_err(|source| DiscrepancyError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!(report = %path.display(), findings = self.total(), "Wrote discrepancy report");
        Ok(())
    }
}

fn todo_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(TODO|FIXME)\b").expect("valid regex"))
}

pub struct DiscrepancyAnalyzer<'a> {
    apps_dir: PathBuf,
    store: &'a Store,
    required_files: Vec<String>,
    text_extensions: BTreeSet<String>,
}

impl<'a> DiscrepancyAnalyzer<'a> {
    pub fn new(config: &RepkeeperConfig, store: &'a Store) -> Self {
        Self {
            apps_dir: config.apps_directory.clone(),
            store,
            required_files: config.required_files.clone(),
            text_extensions: config
                .text_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn analyze(&self) -> Result<DiscrepancyReport, DiscrepancyError> {
        let on_disk = discover_applications(&self.apps_dir)?;
        let records = self.store.list_active()?;
        let known: BTreeSet<String> = self.store.list()?.into_iter().map(|r| r.name).collect();
        let mut by_app: BTreeMap<String, Vec<Finding>> = BTreeMap::new();

        for name in &on_disk {
            let mut findings = Vec::new();
            if !known.contains(name) {
                findings.push(Finding::UnregisteredDirectory);
            }
            findings.extend(self.inspect_tree(name, &self.apps_dir.join(name)));
            if !findings.is_empty() {
                by_app.insert(name.clone(), findings);
            }
        }

        let present: BTreeSet<&String> = on_disk.iter().collect();
        for record in records {
            if !present.contains(&record.name) {
                by_app
                    .entry(record.name)
                    .or_default()
                    .push(Finding::MissingDirectory);
            }
        }

        let report = DiscrepancyReport {
            applications: by_app
                .into_iter()
                .map(|(name, findings)| AppFindings { name, findings })
                .collect(),
        };
        debug!(
            applications = report.applications.len(),
            findings = report.total(),
            "Discrepancy analysis complete"
        );
        Ok(report)
    }

    fn inspect_tree(&self, name: &str, dir: &Path) -> Vec<Finding> {
        let mut findings = Vec::new();

        for file in &self.required_files {
            if !dir.join(file).is_file() {
                findings.push(Finding::MissingRequiredFile { file: file.clone() });
            }
        }

        if name.to_ascii_lowercase().contains("python") && !dir.join(REQUIREMENTS_FILE).is_file() {
            findings.push(Finding::MissingRequirementsFile);
        }

        findings.extend(self.scan_markers(dir));
        findings
    }

    fn scan_markers(&self, dir: &Path) -> Vec<Finding> {
        let mut findings = Vec::new();
        let mut entries: Vec<_> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file() && self.is_text(e.path()))
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let contents = match fs::read_to_string(entry.path()) {
                Ok(contents) => contents,
                Err(err) => {
                    debug!(path = %entry.path().display(), error = %err, "Not scanning file");
                    continue;
                }
            };
            let rel = to_posix(entry.path().strip_prefix(dir).unwrap_or(entry.path()));
            for (index, line) in contents.lines().enumerate() {
                if let Some(found) = todo_pattern().find(line) {
                    findings.push(Finding::TodoMarker {
                        marker: found.as_str().to_string(),
                        file: rel.clone(),
                        line: index + 1,
                        text: line.trim().to_string(),
                    });
                }
            }
        }
        findings
    }

    fn is_text(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.text_extensions.contains(&e.to_ascii_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        config: RepkeeperConfig,
        store: Store,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = RepkeeperConfig {
            apps_directory: temp.path().join("apps"),
            ..RepkeeperConfig::default()
        };
        fs::create_dir_all(&config.apps_directory).unwrap();
        Fixture {
            _temp: temp,
            config,
            store: Store::open_in_memory().unwrap(),
        }
    }

    fn app(fx: &Fixture, name: &str, files: &[(&str, &str)]) {
        let dir = fx.config.apps_directory.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (path, contents) in files {
            let path = dir.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
    }

    fn findings_for<'r>(report: &'r DiscrepancyReport, name: &str) -> &'r [Finding] {
        report
            .applications
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.findings.as_slice())
            .unwrap_or(&[])
    }

    #[test]
    fn test_clean_registered_app_has_no_findings() {
        let fx = fixture();
        app(&fx, "web", &[("README.md", "# web\n")]);
        fx.store.get_or_create("web").unwrap();

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert!(report.is_empty());
        assert!(report.to_markdown().contains("No discrepancies found."));
    }

    #[test]
    fn test_unregistered_and_missing_directories() {
        let fx = fixture();
        app(&fx, "new-app", &[("README.md", "")]);
        fx.store.get_or_create("gone").unwrap();

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert_eq!(
            findings_for(&report, "new-app"),
            &[Finding::UnregisteredDirectory]
        );
        assert_eq!(findings_for(&report, "gone"), &[Finding::MissingDirectory]);
    }

    #[test]
    fn test_retired_app_without_directory_is_not_reported() {
        let fx = fixture();
        fx.store.get_or_create("old").unwrap();
        fx.store.retire("old").unwrap();

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_missing_required_and_requirements_files() {
        let fx = fixture();
        app(&fx, "python-worker", &[("main.py", "print('x')\n")]);
        fx.store.get_or_create("python-worker").unwrap();

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert_eq!(
            findings_for(&report, "python-worker"),
            &[
                Finding::MissingRequiredFile {
                    file: "README.md".to_string()
                },
                Finding::MissingRequirementsFile,
            ]
        );
    }

    #[test]
    fn test_todo_markers_in_text_files_only() {
        let fx = fixture();
        app(
            &fx,
            "api",
            &[
                ("README.md", "# api\n"),
                ("src/handler.rs", "fn a() {}\n// TODO: retry on timeout\n"),
                ("notes.txt", "FIXME later\nTODOS are fine\n"),
                ("image.bin", "TODO in binary"),
            ],
        );
        fx.store.get_or_create("api").unwrap();

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert_eq!(
            findings_for(&report, "api"),
            &[
                Finding::TodoMarker {
                    marker: "FIXME".to_string(),
                    file: "notes.txt".to_string(),
                    line: 1,
                    text: "FIXME later".to_string(),
                },
                Finding::TodoMarker {
                    marker: "TODO".to_string(),
                    file: "src/handler.rs".to_string(),
                    line: 2,
                    text: "// TODO: retry on timeout".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_analysis_does_not_register_apps() {
        let fx = fixture();
        app(&fx, "web", &[("README.md", "")]);

        DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        assert!(fx.store.find("web").unwrap().is_none());
    }

    #[test]
    fn test_markdown_and_write() {
        let fx = fixture();
        app(&fx, "web", &[]);

        let report = DiscrepancyAnalyzer::new(&fx.config, &fx.store).analyze().unwrap();
        let markdown = report.to_markdown();
        assert!(markdown.starts_with("# Discrepancy Analysis Report"));
        assert!(markdown.contains("## Application: web"));
        assert!(markdown.contains("- Missing README.md"));

        let path = fx._temp.path().join("reports/discrepancy_report.md");
        report.write_to(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), markdown);
    }

    #[test]
    fn test_markdown_labels_markers_by_kind() {
        let fx = fixture();
        app(
            &fx,
            "api",
            &[("README.md", ""), ("notes.txt", "FIXME later\n# TODO: docs\n")],
        );
        fx.store.get_or_create("api").unwrap();

        let markdown = DiscrepancyAnalyzer::new(&fx.config, &fx.store)
            .analyze()
            .unwrap()
            .to_markdown();
        assert!(markdown.contains("- FIXME: `notes.txt:1: FIXME later`"));
        assert!(markdown.contains("- TODO: `notes.txt:2: # TODO: docs`"));
        assert!(!markdown.contains("- TODO: `notes.txt:1"));
    }
}
