//! Output formatting for multiple formats
//!
//! Every command result can be rendered as JSON, YAML or human-readable
//! text. JSON and YAML serialize the result types directly; the human
//! renderings are hand-laid tables and trees.
//!
//! # Example
//!
//! ```ignore
//! use repkeeper::cli::output::{OutputFormat, OutputFormatter};
//!
//! let formatter = OutputFormatter::new(OutputFormat::Json);
//! println!("{}", formatter.format_run(&summary)?);
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::config::RepkeeperConfig;
use crate::fingerprint::FingerprintScan;
use crate::packager::ArchiveContents;
use crate::store::{AppRecord, Note};
use crate::workflow::{AppAction, RunSummary};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format (human-friendly, version-control friendly)
    Yaml,
    /// Human-readable formatted text
    Human,
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn serialize<T: Serialize + ?Sized>(&self, value: &T, what: &str) -> Result<Option<String>> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to JSON", what)),
            OutputFormat::Yaml => serde_yaml::to_string(value)
                .map(Some)
                .with_context(|| format!("Failed to serialize {} to YAML", what)),
            OutputFormat::Human => Ok(None),
        }
    }

    pub fn format_run(&self, summary: &RunSummary) -> Result<String> {
        if let Some(out) = self.serialize(summary, "run summary")? {
            return Ok(out);
        }

        let mut output = String::new();
        if summary.has_failures() {
            output.push_str("\u{26A0} Run completed with failures\n");
        } else {
            output.push_str("\u{2713} Run complete\n");
        }
        let _ = writeln!(output, "{}\n", RULE);

        if summary.outcomes.is_empty() && summary.failures.is_empty() {
            output.push_str("No applications found.\n");
        }

        for outcome in &summary.outcomes {
            let _ = write!(
                output,
                "{:<24} v{:<4} {:<11}",
                outcome.name, outcome.version, outcome.action
            );
            if let Some(ref archive) = outcome.archive {
                let _ = write!(output, " {}", archive.display());
            }
            output.push('\n');

            if outcome.action == AppAction::Updated {
                let changes = &outcome.changes;
                let _ = writeln!(
                    output,
                    "\u{2514}\u{2500} +{} -{} ~{}",
                    changes.added.len(),
                    changes.removed.len(),
                    changes.modified.len()
                );
            }
            if !outcome.skipped.is_empty() {
                let _ = writeln!(
                    output,
                    "\u{2514}\u{2500} {} entries skipped",
                    outcome.skipped.len()
                );
            }
        }

        if !summary.failures.is_empty() {
            output.push_str("\n\u{26A0} Failures:\n");
            for failure in &summary.failures {
                let _ = writeln!(output, "  - {}: {}", failure.name, failure.error);
            }
        }

        let _ = writeln!(
            output,
            "\n{} created, {} updated, {} repackaged, {} unchanged, {} failed in {}ms",
            summary.count(AppAction::Created),
            summary.count(AppAction::Updated),
            summary.count(AppAction::Repackaged),
            summary.count(AppAction::Unchanged),
            summary.failures.len(),
            summary.duration_ms
        );
        Ok(output)
    }

    pub fn format_status(&self, records: &[AppRecord]) -> Result<String> {
        if let Some(out) = self.serialize(records, "application records")? {
            return Ok(out);
        }

        if records.is_empty() {
            return Ok("No applications recorded.\n".to_string());
        }

        let mut output = String::new();
        let _ = writeln!(
            output,
            "{:<24} {:>7}  {:<9} {:<26} ARCHIVE",
            "APPLICATION", "VERSION", "STATUS", "UPDATED"
        );
        for record in records {
            let status = if record.is_retired() {
                format!("{} (retired)", record.status)
            } else {
                record.status.to_string()
            };
            let _ = writeln!(
                output,
                "{:<24} {:>7}  {:<9} {:<26} {}",
                record.name,
                record.version,
                status,
                record.last_updated,
                record.package_path.as_deref().unwrap_or("-")
            );
        }
        Ok(output)
    }

    pub fn format_fingerprint(&self, scan: &FingerprintScan) -> Result<String> {
        let value = serde_json::json!({
            "files": scan.fingerprint,
            "skipped": scan.skipped,
        });
        if let Some(out) = self.serialize(&value, "fingerprint")? {
            return Ok(out);
        }

        let mut output = String::new();
        for (path, digest) in scan.fingerprint.iter() {
            let _ = writeln!(output, "{}  {}", digest, path);
        }
        for skipped in &scan.skipped {
            let _ = writeln!(output, "# skipped {} ({:?})", skipped.path, skipped.reason);
        }
        let _ = writeln!(output, "\n{} files", scan.fingerprint.len());
        Ok(output)
    }

    pub fn format_archive(&self, contents: &ArchiveContents) -> Result<String> {
        if let Some(out) = self.serialize(contents, "archive contents")? {
            return Ok(out);
        }

        let mut output = String::new();
        let _ = writeln!(output, "Root: {}/", contents.root);
        for (path, digest) in contents.fingerprint.iter() {
            let _ = writeln!(output, "{}  {}", digest, path);
        }
        let _ = writeln!(output, "\n{} files", contents.fingerprint.len());
        Ok(output)
    }

    pub fn format_notes(&self, app: &str, notes: &[Note]) -> Result<String> {
        if let Some(out) = self.serialize(notes, "notes")? {
            return Ok(out);
        }

        if notes.is_empty() {
            return Ok(format!("No notes for {}.\n", app));
        }
        let mut output = format!("Notes for {}:\n", app);
        for note in notes {
            let _ = writeln!(output, "  [{}] {}", note.created_at, note.note);
        }
        Ok(output)
    }

    pub fn format_config(&self, config: &RepkeeperConfig) -> Result<String> {
        let map: BTreeMap<String, String> = config.to_display_map().into_iter().collect();
        if let Some(out) = self.serialize(&map, "config")? {
            return Ok(out);
        }
        Ok(config.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ChangeSet;
    use crate::fingerprint::Fingerprint;
    use crate::store::AppStatus;
    use crate::workflow::{AppFailure, AppOutcome};
    use std::path::PathBuf;

    fn summary() -> RunSummary {
        RunSummary {
            outcomes: vec![AppOutcome {
                name: "foo".to_string(),
                action: AppAction::Updated,
                version: 2,
                status: AppStatus::Packaged,
                archive: Some(PathBuf::from("dist/foo_v2.tar.gz")),
                plan: Some(PathBuf::from("plans/foo_v2_deployment_plan.md")),
                changes: ChangeSet {
                    added: vec![],
                    removed: vec!["b.txt".to_string()],
                    modified: vec!["a.txt".to_string()],
                },
                skipped: vec![],
            }],
            failures: vec![AppFailure {
                name: "bar".to_string(),
                error: "Application directory not found: apps/bar".to_string(),
            }],
            duration_ms: 12,
        }
    }

    fn record() -> AppRecord {
        AppRecord {
            id: 1,
            name: "foo".to_string(),
            version: 2,
            status: AppStatus::Packaged,
            last_updated: "2024-05-01T10:00:00+00:00".to_string(),
            package_path: Some("dist/foo_v2.tar.gz".to_string()),
            retired_at: None,
        }
    }

    #[test]
    fn test_json_format() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_run(&summary()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["outcomes"][0]["action"], "updated");
        assert_eq!(parsed["outcomes"][0]["status"], "packaged");
        assert_eq!(parsed["failures"][0]["name"], "bar");
    }

    #[test]
    fn test_yaml_format() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_status(&[record()]).unwrap();

        assert!(output.contains("name: foo"));
        assert!(output.contains("version: 2"));
        assert!(output.contains("status: packaged"));
    }

    #[test]
    fn test_human_run_format() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_run(&summary()).unwrap();

        assert!(output.contains("Run completed with failures"));
        assert!(output.contains("foo"));
        assert!(output.contains("+0 -1 ~1"));
        assert!(output.contains("bar: Application directory not found"));
        assert!(output.contains("0 created, 1 updated"));
    }

    #[test]
    fn test_human_status_format() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let mut retired = record();
        retired.name = "old".to_string();
        retired.retired_at = Some("2024-06-01T00:00:00+00:00".to_string());

        let output = formatter.format_status(&[record(), retired]).unwrap();
        assert!(output.starts_with("APPLICATION"));
        assert!(output.contains("dist/foo_v2.tar.gz"));
        assert!(output.contains("packaged (retired)"));

        let empty = formatter.format_status(&[]).unwrap();
        assert_eq!(empty, "No applications recorded.\n");
    }

    #[test]
    fn test_fingerprint_json_format() {
        let scan = FingerprintScan {
            fingerprint: [("a.txt".to_string(), "abc".to_string())]
                .into_iter()
                .collect::<Fingerprint>(),
            skipped: vec![],
        };
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_fingerprint(&scan).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["files"]["a.txt"], "abc");
    }

    #[test]
    fn test_config_formats() {
        let config = RepkeeperConfig::default();
        let human = OutputFormatter::new(OutputFormat::Human)
            .format_config(&config)
            .unwrap();
        assert!(human.contains("Repkeeper Configuration:"));

        let json = OutputFormatter::new(OutputFormat::Json)
            .format_config(&config)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["jobs"], "1");
    }
}
