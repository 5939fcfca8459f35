//! Install directory tokens and shortcut folders
//!
//! `{autopf}` and friends resolve against a [`KnownFolders`] set, which is
//! detected per privilege level on the real system and rooted in a scratch
//! directory for dry runs and tests.

use std::path::{Component, Path, PathBuf};

use super::error::InstallerError;
use super::manifest::{InstallManifest, PrivilegeLevel};

/// Folders an install writes into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownFolders {
    /// `{autopf}`: program files for the active privilege level
    pub program_files: PathBuf,
    /// `{userpf}`
    pub user_programs: PathBuf,
    /// `{commonpf}`
    pub common_programs: PathBuf,
    /// `{localappdata}`
    pub local_app_data: PathBuf,
    /// Start Menu "Programs" folder (or the XDG applications dir)
    pub start_menu: PathBuf,
    pub desktop: PathBuf,
    /// Entries here run at sign-in
    pub startup: PathBuf,
}

fn missing(what: &str) -> InstallerError {
    InstallerError::System(format!("Could not determine {what} directory"))
}

impl KnownFolders {
    /// Detect the real folders for the given privilege level
    pub fn detect(scope: PrivilegeLevel) -> Result<Self, InstallerError> {
        detect_folders(scope)
    }

    /// All folders below `root`; nothing outside it is touched
    pub fn under_root(root: &Path) -> Self {
        Self {
            program_files: root.join("programs"),
            user_programs: root.join("programs"),
            common_programs: root.join("common-programs"),
            local_app_data: root.join("local"),
            start_menu: root.join("start-menu"),
            desktop: root.join("desktop"),
            startup: root.join("startup"),
        }
    }

    /// Resolve an install directory token such as `{autopf}\VoiceReplacer`
    ///
    /// Both separators are accepted after the token. A value without a
    /// leading token is used as a literal path, made absolute against the
    /// current directory since it ends up in shortcuts and the receipt.
    pub fn resolve_dir(&self, token: &str) -> Result<PathBuf, InstallerError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(InstallerError::InvalidManifest(
                "install directory must not be empty".to_string(),
            ));
        }

        let Some(stripped) = token.strip_prefix('{') else {
            return std::path::absolute(token).map_err(|e| {
                InstallerError::InvalidManifest(format!("cannot resolve install directory '{token}': {e}"))
            });
        };

        let end = stripped.find('}').ok_or_else(|| {
            InstallerError::InvalidManifest(format!("unterminated directory token in '{token}'"))
        })?;

        let mut dir = match &stripped[..end] {
            "autopf" => self.program_files.clone(),
            "userpf" => self.user_programs.clone(),
            "commonpf" => self.common_programs.clone(),
            "localappdata" => self.local_app_data.clone(),
            other => {
                return Err(InstallerError::InvalidManifest(format!(
                    "unknown directory token '{{{other}}}'"
                )));
            }
        };

        for part in stripped[end + 1..].split(['/', '\\']).filter(|p| !p.is_empty()) {
            if Path::new(part)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
            {
                return Err(InstallerError::InvalidManifest(format!(
                    "'{part}' is not allowed in install directory '{token}'"
                )));
            }
            dir.push(part);
        }

        Ok(dir)
    }

    /// The application's own Start Menu folder
    pub fn start_menu_group(&self, manifest: &InstallManifest) -> PathBuf {
        self.start_menu.join(&manifest.name)
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        fn env_dir(var: &str, fallback: &str) -> PathBuf {
            std::env::var_os(var)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fallback))
        }

        fn detect_folders(scope: PrivilegeLevel) -> Result<KnownFolders, InstallerError> {
            let local_app_data = dirs::data_local_dir().ok_or_else(|| missing("local app data"))?;
            let user_programs = local_app_data.join("Programs");
            let common_programs = env_dir("ProgramFiles", r"C:\Program Files");

            let folders = match scope {
                PrivilegeLevel::PerUser => {
                    let roaming = dirs::data_dir().ok_or_else(|| missing("roaming app data"))?;
                    let start_menu = roaming
                        .join("Microsoft")
                        .join("Windows")
                        .join("Start Menu")
                        .join("Programs");
                    KnownFolders {
                        program_files: user_programs.clone(),
                        user_programs,
                        common_programs,
                        local_app_data,
                        startup: start_menu.join("Startup"),
                        start_menu,
                        desktop: dirs::desktop_dir().ok_or_else(|| missing("desktop"))?,
                    }
                }
                PrivilegeLevel::PerMachine => {
                    let start_menu = env_dir("ProgramData", r"C:\ProgramData")
                        .join("Microsoft")
                        .join("Windows")
                        .join("Start Menu")
                        .join("Programs");
                    KnownFolders {
                        program_files: common_programs.clone(),
                        user_programs,
                        common_programs,
                        local_app_data,
                        startup: start_menu.join("Startup"),
                        start_menu,
                        desktop: env_dir("PUBLIC", r"C:\Users\Public").join("Desktop"),
                    }
                }
            };
            Ok(folders)
        }
    } else {
        fn detect_folders(scope: PrivilegeLevel) -> Result<KnownFolders, InstallerError> {
            let local_app_data = dirs::data_local_dir().ok_or_else(|| missing("local data"))?;
            let user_programs = local_app_data.join("opt");
            let common_programs = PathBuf::from("/opt");
            let desktop = dirs::desktop_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
                .ok_or_else(|| missing("desktop"))?;

            let folders = match scope {
                PrivilegeLevel::PerUser => KnownFolders {
                    program_files: user_programs.clone(),
                    user_programs,
                    common_programs,
                    start_menu: dirs::data_dir()
                        .ok_or_else(|| missing("data"))?
                        .join("applications"),
                    startup: dirs::config_dir()
                        .ok_or_else(|| missing("config"))?
                        .join("autostart"),
                    local_app_data,
                    desktop,
                },
                PrivilegeLevel::PerMachine => KnownFolders {
                    program_files: common_programs.clone(),
                    user_programs,
                    common_programs,
                    local_app_data,
                    start_menu: PathBuf::from("/usr/share/applications"),
                    startup: PathBuf::from("/etc/xdg/autostart"),
                    desktop,
                },
            };
            Ok(folders)
        }
    }
}
