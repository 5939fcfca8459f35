//! Static installer configuration
//!
//! `installer.toml` is embedded into the setup binary at build time and
//! turned into an [`InstallManifest`] once at startup. A packaged
//! `installer.toml` next to the setup program takes precedence over the
//! embedded copy, and `--config <file>` over both.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::install::{
    Architecture, DriverNotice, InstallManifest, InstallTask, InstallerError, PrivilegeLevel,
};

const EMBEDDED: &str = include_str!("../installer.toml");

/// File name of the configuration shipped beside the setup program
pub const CONFIG_FILE: &str = "installer.toml";

fn default_true() -> bool {
    true
}

/// Top-level installer configuration (mirrors `installer.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerConfig {
    pub app: AppConfig,
    pub setup: SetupConfig,
    pub driver: DriverConfig,
    #[serde(default)]
    pub tasks: Vec<InstallTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub version: String,
    pub publisher: String,
    /// Upgrade identity; must stay the same across releases
    pub id: Uuid,
    /// Executable file stem; the platform suffix is appended
    pub executable: String,
    pub homepage_url: String,
    pub support_url: String,
    pub update_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupConfig {
    pub default_dir: String,
    pub min_os_version: String,
    pub architectures: Vec<Architecture>,
    #[serde(default)]
    pub privileges: PrivilegeLevel,
    #[serde(default = "default_true")]
    pub launch_after_install: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    pub name: String,
    pub download_url: String,
    pub prompt: String,
}

impl InstallerConfig {
    /// The copy compiled into this binary
    pub fn embedded() -> Result<Self> {
        toml::from_str(EMBEDDED).context("Failed to parse embedded installer.toml")
    }

    /// Load `path`; without one, the packaged copy beside the running
    /// program, then the embedded one
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::read(path);
        }
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::load_beside(exe_dir.as_deref())
    }

    /// `dir/installer.toml` when present, otherwise the embedded copy
    pub fn load_beside(dir: Option<&Path>) -> Result<Self> {
        if let Some(path) = dir.map(|d| d.join(CONFIG_FILE))
            && path.is_file()
        {
            debug!("Using packaged configuration {}", path.display());
            return Self::read(&path);
        }
        Self::embedded()
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Executable file name on the running platform
    pub fn executable_name(&self) -> String {
        let stem = &self.app.executable;
        let suffix = std::env::consts::EXE_SUFFIX;
        if suffix.is_empty() || stem.ends_with(suffix) {
            stem.clone()
        } else {
            format!("{stem}{suffix}")
        }
    }

    /// Build and validate the manifest
    pub fn to_manifest(&self) -> Result<InstallManifest, InstallerError> {
        let manifest = InstallManifest {
            name: self.app.name.clone(),
            version: self.app.version.clone(),
            publisher: self.app.publisher.clone(),
            homepage_url: self.app.homepage_url.clone(),
            support_url: self.app.support_url.clone(),
            update_url: self.app.update_url.clone(),
            app_id: self.app.id,
            executable: self.executable_name(),
            min_os_version: self.setup.min_os_version.clone(),
            architectures: self.setup.architectures.iter().copied().collect(),
            privileges: self.setup.privileges,
            tasks: self.tasks.clone(),
            default_dir: self.setup.default_dir.clone(),
            launch_after_install: self.setup.launch_after_install,
            driver: DriverNotice {
                name: self.driver.name.clone(),
                download_url: self.driver.download_url.clone(),
                prompt: self.driver.prompt.clone(),
            },
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize installer configuration")
    }
}
