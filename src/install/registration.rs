//! Uninstaller registration
//!
//! Registration makes the install visible to the OS "uninstall a program"
//! facility: the setup binary is copied next to the application as its
//! uninstaller, the receipt is written, and on Windows the `Uninstall`
//! registry key is filled in.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::error::InstallerError;
use super::manifest::{InstallManifest, PrivilegeLevel};
use super::receipt::InstallReceipt;

/// File name of the uninstaller inside the install directory
#[cfg(target_os = "windows")]
pub const UNINSTALLER_NAME: &str = "unins000.exe";
#[cfg(not(target_os = "windows"))]
pub const UNINSTALLER_NAME: &str = "uninstall";

/// Single registry-style value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValue {
    Str(String),
    Dword(u32),
}

/// Contents of the OS uninstall entry for one install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallEntry {
    /// Key name under `...\CurrentVersion\Uninstall`
    pub key: String,
    pub values: Vec<(&'static str, EntryValue)>,
}

/// Registry key name for an app id, in the `{GUID}_is1` form
pub fn uninstall_key_name(manifest: &InstallManifest) -> String {
    format!(
        "{{{}}}_is1",
        manifest.app_id.hyphenated().to_string().to_uppercase()
    )
}

impl UninstallEntry {
    pub fn new(manifest: &InstallManifest, receipt: &InstallReceipt, uninstaller: &Path) -> Self {
        use EntryValue::{Dword, Str};

        let uninstaller = format!("\"{}\"", uninstaller.display());
        let program = receipt.install_dir.join(&manifest.executable);

        Self {
            key: uninstall_key_name(manifest),
            values: vec![
                (
                    "DisplayName",
                    Str(format!("{} version {}", manifest.name, manifest.version)),
                ),
                ("DisplayVersion", Str(manifest.version.clone())),
                ("Publisher", Str(manifest.publisher.clone())),
                ("URLInfoAbout", Str(manifest.homepage_url.clone())),
                ("HelpLink", Str(manifest.support_url.clone())),
                ("URLUpdateInfo", Str(manifest.update_url.clone())),
                (
                    "InstallLocation",
                    Str(receipt.install_dir.display().to_string()),
                ),
                ("DisplayIcon", Str(program.display().to_string())),
                ("UninstallString", Str(format!("{uninstaller} uninstall"))),
                (
                    "QuietUninstallString",
                    Str(format!("{uninstaller} uninstall --silent")),
                ),
                ("InstallDate", Str(receipt.install_date())),
                ("NoModify", Dword(1)),
                ("NoRepair", Dword(1)),
            ],
        }
    }
}

/// Copy the running setup binary (or `source`) into the install directory
pub fn install_uninstaller(
    source: Option<&Path>,
    install_dir: &Path,
) -> Result<PathBuf, InstallerError> {
    let source = match source {
        Some(path) => path.to_path_buf(),
        None => std::env::current_exe()
            .map_err(|e| InstallerError::Registration(format!("cannot locate setup binary: {e}")))?,
    };
    let target = install_dir.join(UNINSTALLER_NAME);

    if same_file(&source, &target) {
        // Repair launched from the installed uninstaller
        return Ok(target);
    }

    fs::copy(&source, &target).map_err(|e| {
        InstallerError::Registration(format!(
            "failed to copy {} to {}: {e}",
            source.display(),
            target.display()
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
            .map_err(|e| InstallerError::Registration(e.to_string()))?;
    }

    Ok(target)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Write the receipt and the OS uninstall entry
pub fn register(
    manifest: &InstallManifest,
    receipt: &InstallReceipt,
    uninstaller: &Path,
) -> Result<(), InstallerError> {
    let path = receipt.save()?;
    info!("Wrote install receipt {}", path.display());

    let entry = UninstallEntry::new(manifest, receipt, uninstaller);
    write_entry(&entry, receipt.scope)
}

/// Remove the OS uninstall entry; failures are logged, not raised
pub fn unregister(manifest: &InstallManifest, scope: PrivilegeLevel) {
    if let Err(e) = remove_entry(&uninstall_key_name(manifest), scope) {
        warn!("Failed to remove uninstall entry: {e}");
    }
}

#[cfg(target_os = "windows")]
fn write_entry(entry: &UninstallEntry, scope: PrivilegeLevel) -> Result<(), InstallerError> {
    super::windows::registry::write_uninstall_entry(entry, scope)?;
    info!("Registered uninstall entry {}", entry.key);
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn write_entry(entry: &UninstallEntry, _scope: PrivilegeLevel) -> Result<(), InstallerError> {
    // The receipt is the only uninstall record outside Windows
    log::debug!("No system uninstall list on this platform ({})", entry.key);
    Ok(())
}

#[cfg(target_os = "windows")]
fn remove_entry(key: &str, scope: PrivilegeLevel) -> Result<(), InstallerError> {
    super::windows::registry::remove_uninstall_entry(key, scope)
}

#[cfg(not(target_os = "windows"))]
fn remove_entry(_key: &str, _scope: PrivilegeLevel) -> Result<(), InstallerError> {
    Ok(())
}
