//! Registry operations for the Windows uninstall list.

use winreg::RegKey;
use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ};

use super::super::error::InstallerError;
use super::super::manifest::PrivilegeLevel;
use super::super::platform::OsVersion;
use super::super::registration::{EntryValue, UninstallEntry};

const UNINSTALL_ROOT: &str = r"Software\Microsoft\Windows\CurrentVersion\Uninstall";
const CURRENT_VERSION: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";

fn hive(scope: PrivilegeLevel) -> RegKey {
    match scope {
        PrivilegeLevel::PerUser => RegKey::predef(HKEY_CURRENT_USER),
        PrivilegeLevel::PerMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
    }
}

/// Create or overwrite the uninstall key for an install
pub(crate) fn write_uninstall_entry(
    entry: &UninstallEntry,
    scope: PrivilegeLevel,
) -> Result<(), InstallerError> {
    let path = format!(r"{UNINSTALL_ROOT}\{}", entry.key);
    let (key, _) = hive(scope).create_subkey(&path).map_err(|e| {
        InstallerError::Registration(format!("failed to create registry key {path}: {e}"))
    })?;

    for (name, value) in &entry.values {
        let result = match value {
            EntryValue::Str(s) => key.set_value(name, s),
            EntryValue::Dword(d) => key.set_value(name, d),
        };
        result.map_err(|e| {
            InstallerError::Registration(format!("failed to set registry value {name}: {e}"))
        })?;
    }

    Ok(())
}

/// Delete the uninstall key; a key that is already gone is fine
pub(crate) fn remove_uninstall_entry(key: &str, scope: PrivilegeLevel) -> Result<(), InstallerError> {
    let path = format!(r"{UNINSTALL_ROOT}\{key}");
    match hive(scope).delete_subkey_all(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallerError::Registration(format!(
            "failed to delete registry key {path}: {e}"
        ))),
    }
}

/// `major.minor.build` from the registry
pub(crate) fn os_version() -> Option<OsVersion> {
    let key = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey_with_flags(CURRENT_VERSION, KEY_READ)
        .ok()?;
    let major: u32 = key.get_value("CurrentMajorVersionNumber").ok()?;
    let minor: u32 = key.get_value("CurrentMinorVersionNumber").ok()?;
    let build: String = key.get_value("CurrentBuildNumber").unwrap_or_else(|_| "0".to_string());
    OsVersion::parse(&format!("{major}.{minor}.{build}")).ok()
}
