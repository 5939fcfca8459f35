//! Install manifest: the read-only description of what gets installed
//!
//! Built once from the static installer configuration and consumed read-only
//! by every stage of an install session.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::InstallerError;
use super::platform::OsVersion;

/// Task id for the optional desktop shortcut
pub const DESKTOP_ICON: &str = "desktopicon";

/// Task id for the optional "run at sign-in" shortcut
pub const STARTUP_ICON: &str = "startupicon";

/// CPU architectures an installer may be allowed to run on
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    X86,
    Arm64,
}

impl Architecture {
    /// Architecture of the running process, if it is one we know about
    pub fn current() -> Option<Self> {
        Self::from_rust_arch(std::env::consts::ARCH)
    }

    /// Map a `std::env::consts::ARCH` value
    pub fn from_rust_arch(arch: &str) -> Option<Self> {
        match arch {
            "x86_64" => Some(Self::X64),
            "x86" => Some(Self::X86),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::X64 => "x64",
            Self::X86 => "x86",
            Self::Arm64 => "arm64",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Architecture {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x64" | "x86_64" | "amd64" => Ok(Self::X64),
            "x86" | "i686" => Ok(Self::X86),
            "arm64" | "aarch64" => Ok(Self::Arm64),
            _ => Err(InstallerError::InvalidManifest(format!(
                "'{s}' is not a valid architecture name"
            ))),
        }
    }
}

/// Where the application is installed and who may run the installer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PrivilegeLevel {
    /// Current user only, no elevation
    #[default]
    PerUser,
    /// All users, requires elevation
    PerMachine,
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerUser => write!(f, "per-user"),
            Self::PerMachine => write!(f, "per-machine"),
        }
    }
}

/// Optional, user-selectable install-time action
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InstallTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub default_enabled: bool,
}

/// External driver the application needs but does not bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverNotice {
    pub name: String,
    pub download_url: String,
    pub prompt: String,
}

/// Everything the installer knows about the application it installs
#[derive(Debug, Clone)]
pub struct InstallManifest {
    pub name: String,
    pub version: String,
    pub publisher: String,
    pub homepage_url: String,
    pub support_url: String,
    pub update_url: String,
    /// Stable across versions; identifies previous installs for upgrades
    pub app_id: Uuid,
    /// Executable file name inside the install directory
    pub executable: String,
    pub min_os_version: String,
    pub architectures: BTreeSet<Architecture>,
    pub privileges: PrivilegeLevel,
    pub tasks: Vec<InstallTask>,
    /// Install directory token, e.g. `{autopf}\VoiceReplacer`
    pub default_dir: String,
    pub launch_after_install: bool,
    pub driver: DriverNotice,
}

impl InstallManifest {
    /// Reject manifests that cannot produce a working install
    pub fn validate(&self) -> Result<(), InstallerError> {
        let invalid = |msg: String| Err(InstallerError::InvalidManifest(msg));

        for (field, value) in [
            ("name", &self.name),
            ("version", &self.version),
            ("executable", &self.executable),
            ("default_dir", &self.default_dir),
        ] {
            if value.trim().is_empty() {
                return invalid(format!("{field} must not be empty"));
            }
        }

        if self.executable.contains(['/', '\\']) {
            return invalid(format!(
                "executable '{}' must be a file name, not a path",
                self.executable
            ));
        }

        if self.app_id.is_nil() {
            return invalid("app id must not be the nil UUID".to_string());
        }

        if self.architectures.is_empty() {
            return invalid("at least one architecture must be allowed".to_string());
        }

        for (field, value) in [
            ("homepage_url", &self.homepage_url),
            ("support_url", &self.support_url),
            ("update_url", &self.update_url),
            ("driver.download_url", &self.driver.download_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return invalid(format!("{field} '{value}' is not a valid URL: {e}"));
            }
        }

        OsVersion::parse(&self.min_os_version)?;

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return invalid("task ids must not be empty".to_string());
            }
            if !seen.insert(task.id.as_str()) {
                return invalid(format!("duplicate task id '{}'", task.id));
            }
        }

        Ok(())
    }

    /// Look up a task by id
    pub fn task(&self, id: &str) -> Option<&InstallTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Comma-separated list of allowed architectures, for messages
    pub fn architectures_display(&self) -> String {
        self.architectures
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Tasks the user picked for one install session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskSelection {
    selected: BTreeSet<String>,
    pub launch_after_install: bool,
}

impl TaskSelection {
    /// Each task at its default state
    pub fn defaults(manifest: &InstallManifest) -> Self {
        Self {
            selected: manifest
                .tasks
                .iter()
                .filter(|t| t.default_enabled)
                .map(|t| t.id.clone())
                .collect(),
            launch_after_install: manifest.launch_after_install,
        }
    }

    /// Exactly the given tasks; unknown ids are rejected
    pub fn from_ids<I, S>(manifest: &InstallManifest, ids: I) -> Result<Self, InstallerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selection = Self {
            selected: BTreeSet::new(),
            launch_after_install: manifest.launch_after_install,
        };
        for id in ids {
            let id = id.as_ref().trim();
            if id.is_empty() {
                continue;
            }
            if manifest.task(id).is_none() {
                return Err(InstallerError::UnknownTask(id.to_string()));
            }
            selection.selected.insert(id.to_string());
        }
        Ok(selection)
    }

    pub fn set(&mut self, id: &str, enabled: bool) {
        if enabled {
            self.selected.insert(id.to_string());
        } else {
            self.selected.remove(id);
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn manifest() -> InstallManifest {
        InstallManifest {
            name: "VoiceReplacer".to_string(),
            version: "1.2.0".to_string(),
            publisher: "VoiceReplacer Project".to_string(),
            homepage_url: "https://example.org/voicereplacer".to_string(),
            support_url: "https://example.org/voicereplacer/issues".to_string(),
            update_url: "https://example.org/voicereplacer/releases".to_string(),
            app_id: Uuid::parse_str("7c1e4b52-93a8-4f0d-b6e2-5a9d3c8f1e47")
                .expect("fixture uuid"),
            executable: "VoiceReplacer.exe".to_string(),
            min_os_version: "10.0".to_string(),
            architectures: [Architecture::X64, Architecture::Arm64].into_iter().collect(),
            privileges: PrivilegeLevel::PerUser,
            tasks: vec![
                InstallTask {
                    id: DESKTOP_ICON.to_string(),
                    description: "Create a desktop shortcut".to_string(),
                    default_enabled: false,
                },
                InstallTask {
                    id: STARTUP_ICON.to_string(),
                    description: "Start VoiceReplacer when you sign in".to_string(),
                    default_enabled: true,
                },
            ],
            default_dir: "{autopf}\\VoiceReplacer".to_string(),
            launch_after_install: true,
            driver: DriverNotice {
                name: "VB-Audio Virtual Cable".to_string(),
                download_url: "https://vb-audio.com/Cable/".to_string(),
                prompt: "Open the VB-Audio download page?".to_string(),
            },
        }
    }
}
