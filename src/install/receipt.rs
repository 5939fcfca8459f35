//! Install receipt: what one install put on disk
//!
//! Stored as `uninstall.json` in the install directory. Uninstall, repair and
//! status detection all work from it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::InstallerError;
use super::manifest::{InstallManifest, PrivilegeLevel, TaskSelection};

pub const RECEIPT_FILE: &str = "uninstall.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub app_id: Uuid,
    pub app_name: String,
    pub version: String,
    pub publisher: String,
    pub scope: PrivilegeLevel,
    pub install_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub shortcuts: Vec<PathBuf>,
    pub tasks: Vec<String>,
    pub installed_at: DateTime<Utc>,
}

impl InstallReceipt {
    pub fn new(
        manifest: &InstallManifest,
        scope: PrivilegeLevel,
        install_dir: &Path,
        selection: &TaskSelection,
    ) -> Self {
        Self {
            app_id: manifest.app_id,
            app_name: manifest.name.clone(),
            version: manifest.version.clone(),
            publisher: manifest.publisher.clone(),
            scope,
            install_dir: install_dir.to_path_buf(),
            files: Vec::new(),
            shortcuts: Vec::new(),
            tasks: selection.ids().map(str::to_string).collect(),
            installed_at: Utc::now(),
        }
    }

    pub fn path_in(install_dir: &Path) -> PathBuf {
        install_dir.join(RECEIPT_FILE)
    }

    /// Read the receipt in `install_dir`, if there is one
    pub fn load(install_dir: &Path) -> Result<Option<Self>, InstallerError> {
        let path = Self::path_in(install_dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(InstallerError::Receipt {
                    path,
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| InstallerError::Receipt {
                path,
                reason: e.to_string(),
            })
    }

    /// Write the receipt atomically
    pub fn save(&self) -> Result<PathBuf, InstallerError> {
        let path = Self::path_in(&self.install_dir);
        let err = |reason: String| InstallerError::Receipt {
            path: path.clone(),
            reason,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| err(e.to_string()))?;
        let mut temp =
            tempfile::NamedTempFile::new_in(&self.install_dir).map_err(|e| err(e.to_string()))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| err(e.to_string()))?;
        temp.as_file().sync_all().map_err(|e| err(e.to_string()))?;
        temp.persist(&path).map_err(|e| err(e.error.to_string()))?;

        Ok(path)
    }

    /// `YYYYMMDD`, the format the Windows uninstall list expects
    pub fn install_date(&self) -> String {
        self.installed_at.format("%Y%m%d").to_string()
    }
}
