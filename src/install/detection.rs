//! Installation state detection
//!
//! Determines if the application is installed, partially installed, or not
//! installed by checking the receipt, the executable and every recorded
//! shortcut.

use std::path::Path;

use super::manifest::InstallManifest;
use super::receipt::InstallReceipt;

/// Installation state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    /// No receipt and no executable
    NotInstalled,
    /// Something is missing or belongs to another app (repair needed)
    PartiallyInstalled,
    /// Receipt, executable and all recorded shortcuts present
    FullyInstalled,
}

/// Check the install in `install_dir`
pub fn check_installation_state(manifest: &InstallManifest, install_dir: &Path) -> InstallationState {
    let executable_ok = install_dir.join(&manifest.executable).is_file();

    let receipt = match InstallReceipt::load(install_dir) {
        Ok(receipt) => receipt,
        Err(e) => {
            log::warn!("{e}");
            return InstallationState::PartiallyInstalled;
        }
    };

    match receipt {
        None if !executable_ok => InstallationState::NotInstalled,
        None => InstallationState::PartiallyInstalled,
        Some(receipt) => {
            let ours = receipt.app_id == manifest.app_id;
            let shortcuts_ok = receipt.shortcuts.iter().all(|p| p.exists());
            if ours && executable_ok && shortcuts_ok {
                InstallationState::FullyInstalled
            } else {
                InstallationState::PartiallyInstalled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::install::manifest::fixtures::manifest;
    use crate::install::manifest::{PrivilegeLevel, TaskSelection};
    use tempfile::TempDir;

    fn receipt_with_shortcut(dir: &Path, shortcut: &Path) {
        let m = manifest();
        let mut receipt = InstallReceipt::new(&m, PrivilegeLevel::PerUser, dir, &TaskSelection::defaults(&m));
        receipt.shortcuts.push(shortcut.to_path_buf());
        receipt.save().expect("save");
    }

    #[test]
    fn empty_directory_is_not_installed() {
        let tmp = TempDir::new().expect("tempdir");
        assert_eq!(
            check_installation_state(&manifest(), tmp.path()),
            InstallationState::NotInstalled
        );
    }

    #[test]
    fn complete_install_is_detected() {
        let tmp = TempDir::new().expect("tempdir");
        let shortcut = tmp.path().join("VoiceReplacer.desktop");
        fs::write(tmp.path().join("VoiceReplacer.exe"), "app").expect("exe");
        fs::write(&shortcut, "entry").expect("shortcut");
        receipt_with_shortcut(tmp.path(), &shortcut);

        assert_eq!(
            check_installation_state(&manifest(), tmp.path()),
            InstallationState::FullyInstalled
        );

        fs::remove_file(&shortcut).expect("remove shortcut");
        assert_eq!(
            check_installation_state(&manifest(), tmp.path()),
            InstallationState::PartiallyInstalled
        );
    }

    #[test]
    fn executable_without_receipt_is_partial() {
        let tmp = TempDir::new().expect("tempdir");
        fs::write(tmp.path().join("VoiceReplacer.exe"), "app").expect("exe");
        assert_eq!(
            check_installation_state(&manifest(), tmp.path()),
            InstallationState::PartiallyInstalled
        );
    }
}
