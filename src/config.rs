//! Configuration management for repkeeper
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults
//! 2. A configuration file: the path given with `--config`, otherwise
//!    `./repkeeper.yaml` when it exists. The format follows the extension
//!    (`.yaml`/`.yml`, `.toml` or `.json`).
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! - `REPKEEPER_APPS_DIR`: directory holding one subdirectory per application - default: "apps"
//! - `REPKEEPER_OUTPUT_DIR`: where archives are written - default: "dist"
//! - `REPKEEPER_PLANS_DIR`: where deployment plans are written - default: "deployment_plans"
//! - `REPKEEPER_DATABASE`: SQLite database path - default: "repkeeper.db"
//! - `REPKEEPER_LOG_LEVEL`: logging level - default: "info"
//! - `REPKEEPER_JOBS`: applications processed concurrently - default: "1"
//!
//! # Example
//!
//! ```no_run
//! use repkeeper::RepkeeperConfig;
//! use std::path::Path;
//!
//! let config = RepkeeperConfig::load(Some(Path::new("repkeeper.yaml"))).unwrap();
//! println!("{}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default values for configuration
const DEFAULT_APPS_DIRECTORY: &str = "apps";
const DEFAULT_OUTPUT_DIRECTORY: &str = "dist";
const DEFAULT_PLANS_DIRECTORY: &str = "deployment_plans";
const DEFAULT_DATABASE_PATH: &str = "repkeeper.db";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_JOBS: usize = 1;
const MAX_JOBS: usize = 64;
const DEFAULT_REQUIRED_FILES: &[&str] = &["README.md"];
const DEFAULT_TEXT_EXTENSIONS: &[&str] = &["py", "js", "ts", "rs", "txt", "md"];

/// File picked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "repkeeper.yaml";

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported configuration format: {0} (expected .yaml, .yml, .toml or .json)")]
    UnsupportedFormat(PathBuf),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Resolved configuration for a repkeeper invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepkeeperConfig {
    /// Directory whose immediate subdirectories are the managed applications
    pub apps_directory: PathBuf,

    /// Archive output directory
    pub output_directory: PathBuf,

    /// Deployment plan output directory
    pub deployment_plans_directory: PathBuf,

    /// SQLite database file
    pub database_path: PathBuf,

    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Number of applications processed concurrently
    pub jobs: usize,

    /// Files every application is expected to carry
    pub required_files: Vec<String>,

    /// Extensions scanned for TODO/FIXME markers
    pub text_extensions: Vec<String>,
}

impl Default for RepkeeperConfig {
    fn default() -> Self {
        Self {
            apps_directory: PathBuf::from(DEFAULT_APPS_DIRECTORY),
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            deployment_plans_directory: PathBuf::from(DEFAULT_PLANS_DIRECTORY),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            jobs: DEFAULT_JOBS,
            required_files: DEFAULT_REQUIRED_FILES.iter().map(|s| s.to_string()).collect(),
            text_extensions: DEFAULT_TEXT_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl RepkeeperConfig {
    /// Load defaults, then the configuration file, then environment overrides.
    ///
    /// An explicit `path` must exist. Without one, `./repkeeper.yaml` is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                Self::from_file(path)?
            }
            None => {
                let implicit = Path::new(DEFAULT_CONFIG_FILE);
                if implicit.is_file() {
                    Self::from_file(implicit)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        config.log_level = config.log_level.to_lowercase();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let config = match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?
            }
            Some("toml") => toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
            Some("json") => {
                serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = env::var("REPKEEPER_APPS_DIR") {
            self.apps_directory = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("REPKEEPER_OUTPUT_DIR") {
            self.output_directory = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("REPKEEPER_PLANS_DIR") {
            self.deployment_plans_directory = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("REPKEEPER_DATABASE") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(level) = env::var("REPKEEPER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(jobs) = env::var("REPKEEPER_JOBS") {
            self.jobs = jobs.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::ParseError {
                    field: "REPKEEPER_JOBS".to_string(),
                    error: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Validates the configuration
    ///
    /// Checks that:
    /// - All configured paths are non-empty
    /// - `jobs` is between 1 and 64
    /// - Log level is valid
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("apps_directory", &self.apps_directory),
            ("output_directory", &self.output_directory),
            ("deployment_plans_directory", &self.deployment_plans_directory),
            ("database_path", &self.database_path),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        if self.jobs == 0 {
            return Err(ConfigError::ValidationFailed(
                "jobs must be at least 1".to_string(),
            ));
        }
        if self.jobs > MAX_JOBS {
            return Err(ConfigError::ValidationFailed(format!(
                "jobs cannot exceed {}",
                MAX_JOBS
            )));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        map.insert(
            "apps_directory".to_string(),
            self.apps_directory.display().to_string(),
        );
        map.insert(
            "output_directory".to_string(),
            self.output_directory.display().to_string(),
        );
        map.insert(
            "deployment_plans_directory".to_string(),
            self.deployment_plans_directory.display().to_string(),
        );
        map.insert(
            "database_path".to_string(),
            self.database_path.display().to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());
        map.insert("jobs".to_string(), self.jobs.to_string());
        map.insert("required_files".to_string(), self.required_files.join(", "));
        map.insert(
            "text_extensions".to_string(),
            self.text_extensions.join(", "),
        );

        map
    }
}

impl fmt::Display for RepkeeperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Repkeeper Configuration:")?;
        writeln!(f, "  Apps Directory: {}", self.apps_directory.display())?;
        writeln!(f, "  Output Directory: {}", self.output_directory.display())?;
        writeln!(
            f,
            "  Plans Directory: {}",
            self.deployment_plans_directory.display()
        )?;
        writeln!(f, "  Database: {}", self.database_path.display())?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  Jobs: {}", self.jobs)?;
        writeln!(f, "  Required Files: {}", self.required_files.join(", "))?;
        writeln!(f, "  Text Extensions: {}", self.text_extensions.join(", "))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "REPKEEPER_APPS_DIR",
        "REPKEEPER_OUTPUT_DIR",
        "REPKEEPER_PLANS_DIR",
        "REPKEEPER_DATABASE",
        "REPKEEPER_LOG_LEVEL",
        "REPKEEPER_JOBS",
    ];

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn remove(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clear_env() -> Vec<EnvGuard> {
        ENV_KEYS.iter().map(|k| EnvGuard::remove(k)).collect()
    }

    #[test]
    fn test_default_configuration() {
        let config = RepkeeperConfig::default();

        assert_eq!(config.apps_directory, PathBuf::from(DEFAULT_APPS_DIRECTORY));
        assert_eq!(config.output_directory, PathBuf::from(DEFAULT_OUTPUT_DIRECTORY));
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.jobs, DEFAULT_JOBS);
        assert_eq!(config.required_files, vec!["README.md"]);
        assert!(config.text_extensions.contains(&"py".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_yaml_file() {
        let _guards = clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repkeeper.yaml");
        fs::write(
            &path,
            "apps_directory: /srv/apps\noutput_directory: /srv/dist\nlog_level: INFO\njobs: 4\n",
        )
        .unwrap();

        let config = RepkeeperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.apps_directory, PathBuf::from("/srv/apps"));
        assert_eq!(config.output_directory, PathBuf::from("/srv/dist"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.jobs, 4);
        // Unset keys keep their defaults
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE_PATH));
    }

    #[test]
    #[serial]
    fn test_load_toml_and_json_files() {
        let _guards = clear_env();
        let temp_dir = TempDir::new().unwrap();

        let toml_path = temp_dir.path().join("repkeeper.toml");
        fs::write(&toml_path, "database_path = \"meta/apps.db\"\njobs = 2\n").unwrap();
        let config = RepkeeperConfig::load(Some(&toml_path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("meta/apps.db"));
        assert_eq!(config.jobs, 2);

        let json_path = temp_dir.path().join("repkeeper.json");
        fs::write(&json_path, r#"{"required_files": ["README.md", "LICENSE"]}"#).unwrap();
        let config = RepkeeperConfig::load(Some(&json_path)).unwrap();
        assert_eq!(config.required_files, vec!["README.md", "LICENSE"]);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let _guards = clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repkeeper.yaml");
        fs::write(&path, "apps_directory: from-file\njobs: 2\n").unwrap();

        let _overrides = vec![
            EnvGuard::set("REPKEEPER_APPS_DIR", "from-env"),
            EnvGuard::set("REPKEEPER_JOBS", "8"),
            EnvGuard::set("REPKEEPER_LOG_LEVEL", "debug"),
        ];

        let config = RepkeeperConfig::load(Some(&path)).unwrap();
        assert_eq!(config.apps_directory, PathBuf::from("from-env"));
        assert_eq!(config.jobs, 8);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_jobs_env() {
        let _guards = clear_env();
        let _jobs = EnvGuard::set("REPKEEPER_JOBS", "many");

        let err = RepkeeperConfig::load(None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ParseError { ref field, .. } if field == "REPKEEPER_JOBS"
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err =
            RepkeeperConfig::load(Some(Path::new("/nonexistent/repkeeper.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repkeeper.ini");
        fs::write(&path, "jobs=1").unwrap();

        let err = RepkeeperConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("repkeeper.yaml");
        fs::write(&path, "jobs: [not, a, number]\n").unwrap();

        let err = RepkeeperConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_configuration_validation_invalid_jobs() {
        let mut config = RepkeeperConfig::default();
        config.jobs = 0;
        assert!(config.validate().is_err());

        config.jobs = MAX_JOBS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_invalid_log_level() {
        let mut config = RepkeeperConfig::default();
        config.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configuration_validation_empty_path() {
        let mut config = RepkeeperConfig::default();
        config.database_path = PathBuf::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("database_path"));
    }

    #[test]
    fn test_config_display() {
        let config = RepkeeperConfig::default();
        let display = format!("{}", config);
        assert!(display.contains("Repkeeper Configuration:"));
        assert!(display.contains("Apps Directory: apps"));

        let map = config.to_display_map();
        assert_eq!(map.get("jobs").map(String::as_str), Some("1"));
    }
}
