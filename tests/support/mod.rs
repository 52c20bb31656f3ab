//! Shared fixtures for integration tests

#![allow(dead_code)]

use repkeeper::{Manager, RepkeeperConfig, Store};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A throwaway apps/dist/plans/database layout under one temp directory
pub struct Workspace {
    pub temp: TempDir,
    pub config: RepkeeperConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let root = temp.path();
        let config = RepkeeperConfig {
            apps_directory: root.join("apps"),
            output_directory: root.join("dist"),
            deployment_plans_directory: root.join("plans"),
            database_path: root.join("meta/repkeeper.db"),
            ..RepkeeperConfig::default()
        };
        fs::create_dir_all(&config.apps_directory).expect("create apps dir");
        Self { temp, config }
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn app_dir(&self, app: &str) -> PathBuf {
        self.config.apps_directory.join(app)
    }

    pub fn write(&self, app: &str, rel: &str, contents: &str) {
        let path = self.app_dir(app).join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
        fs::write(path, contents).expect("write file");
    }

    pub fn remove(&self, app: &str, rel: &str) {
        fs::remove_file(self.app_dir(app).join(rel)).expect("remove file");
    }

    pub fn archive(&self, app: &str, version: i64) -> PathBuf {
        self.config
            .output_directory
            .join(format!("{}_v{}.tar.gz", app, version))
    }

    pub fn plan(&self, app: &str, version: i64) -> PathBuf {
        self.config
            .deployment_plans_directory
            .join(format!("{}_v{}_deployment_plan.md", app, version))
    }

    pub fn open_store(&self) -> Arc<Store> {
        Arc::new(Store::open(&self.config.database_path).expect("open store"))
    }

    pub fn manager(&self) -> Manager {
        Manager::new(self.config.clone(), self.open_store())
    }

    /// Writes a YAML configuration pointing at this workspace.
    pub fn write_config(&self) -> PathBuf {
        let path = self.root().join("repkeeper.yaml");
        let yaml = serde_yaml::to_string(&self.config).expect("serialize config");
        fs::write(&path, yaml).expect("write config");
        path
    }
}

pub fn output_dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
