//! Record types persisted by the store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::StorageError;

/// Lifecycle state of an application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    New,
    Analyzed,
    Packaged,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::New => "new",
            AppStatus::Analyzed => "analyzed",
            AppStatus::Packaged => "packaged",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AppStatus::New),
            "analyzed" => Ok(AppStatus::Analyzed),
            "packaged" => Ok(AppStatus::Packaged),
            other => Err(StorageError::InvalidStatus(other.to_string())),
        }
    }
}

/// One row of the `applications` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppRecord {
    pub id: i64,
    pub name: String,
    pub version: i64,
    pub status: AppStatus,
    pub last_updated: String,
    pub package_path: Option<String>,
    pub retired_at: Option<String>,
}

impl AppRecord {
    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: i64,
    pub app_name: String,
    pub created_at: String,
    pub note: String,
}
