//! Uninstallation and cleanup
//!
//! Works from the install receipt. Every removal is attempted; a failure is
//! logged and recorded in the report, and cleanup continues with the next
//! item.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::error::InstallerError;
use super::layout::KnownFolders;
use super::manifest::{InstallManifest, TaskSelection};
use super::receipt::InstallReceipt;
use super::registration::{self, UNINSTALLER_NAME};
use super::shortcuts::{self, ShortcutWriter};
use super::staging;

/// What an uninstall removed and what it could not
#[derive(Debug, Default)]
pub struct UninstallReport {
    pub receipt_found: bool,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// The running uninstaller is deleted after this process exits
    pub deferred: Option<PathBuf>,
}

impl UninstallReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn remove_file(&mut self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("Removed {}", path.display());
                self.removed.push(path.to_path_buf());
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {e}", path.display());
                self.failed.push((path.to_path_buf(), e.to_string()));
            }
        }
    }

    fn remove_dir_if_empty(&mut self, dir: &Path) {
        let empty = fs::read_dir(dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            return;
        }
        match fs::remove_dir(dir) {
            Ok(()) => self.removed.push(dir.to_path_buf()),
            Err(e) => warn!("Failed to remove {}: {e}", dir.display()),
        }
    }
}

/// Remove the install in `install_dir`
///
/// Without a receipt, the default executable, uninstaller and shortcut
/// locations are removed instead.
pub fn uninstall(
    manifest: &InstallManifest,
    install_dir: &Path,
    folders: &KnownFolders,
    writer: &dyn ShortcutWriter,
) -> Result<UninstallReport, InstallerError> {
    info!("Uninstalling {} from {}", manifest.name, install_dir.display());

    let mut report = UninstallReport::default();
    let receipt = match InstallReceipt::load(install_dir) {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!("{e}; falling back to default locations");
            None
        }
    };

    if let Some(receipt) = &receipt
        && receipt.app_id != manifest.app_id
    {
        return Err(InstallerError::ForeignInstall {
            install_dir: install_dir.to_path_buf(),
            found: format!("{} {} ({})", receipt.app_name, receipt.version, receipt.app_id),
        });
    }

    let uninstaller = install_dir.join(UNINSTALLER_NAME);
    let (scope, files, shortcut_paths) = match receipt {
        Some(receipt) => {
            report.receipt_found = true;
            (receipt.scope, receipt.files, receipt.shortcuts)
        }
        None => {
            warn!("No install receipt in {}", install_dir.display());
            let all_tasks = TaskSelection::from_ids(manifest, manifest.tasks.iter().map(|t| t.id.as_str()))?;
            let shortcuts = shortcuts::plan_shortcuts(manifest, folders, &all_tasks, install_dir, &uninstaller)
                .iter()
                .map(|s| s.path(writer))
                .collect();
            (
                manifest.privileges,
                vec![install_dir.join(&manifest.executable), uninstaller.clone()],
                shortcuts,
            )
        }
    };

    for shortcut in &shortcut_paths {
        report.remove_file(shortcut);
    }
    report.remove_dir_if_empty(&folders.start_menu_group(manifest));

    registration::unregister(manifest, scope);

    let running = std::env::current_exe().ok().and_then(|p| fs::canonicalize(p).ok());
    for file in &files {
        let is_running = running.is_some() && fs::canonicalize(file).ok() == running;
        if is_running {
            report.deferred = Some(file.clone());
            continue;
        }
        report.remove_file(file);
        // Left over when an upgrade could not drop it
        report.remove_file(&staging::backup_path(file));
    }

    report.remove_file(&InstallReceipt::path_in(install_dir));

    match report.deferred.clone() {
        Some(running) => delete_after_exit(&running, install_dir, &mut report),
        None => report.remove_dir_if_empty(install_dir),
    }

    info!(
        "{} uninstalled: {} removed, {} failed",
        manifest.name,
        report.removed.len(),
        report.failed.len()
    );
    Ok(report)
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        /// A running executable cannot be deleted on Windows; hand it to a
        /// detached `cmd` that waits for this process to go away first
        fn delete_after_exit(file: &Path, install_dir: &Path, report: &mut UninstallReport) {
            use std::os::windows::process::CommandExt;
            use std::process::{Command, Stdio};

            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            const DETACHED_PROCESS: u32 = 0x0000_0008;

            let script = format!(
                "ping 127.0.0.1 -n 3 > nul & del /f /q \"{}\" & rmdir \"{}\"",
                file.display(),
                install_dir.display()
            );
            let spawned = Command::new("cmd")
                .args(["/C", &script])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .creation_flags(CREATE_NO_WINDOW | DETACHED_PROCESS)
                .spawn();
            if let Err(e) = spawned {
                warn!("Failed to schedule removal of {}: {e}", file.display());
                report.failed.push((file.to_path_buf(), e.to_string()));
                report.deferred = None;
            }
        }
    } else {
        /// Unlinking a running executable is fine here
        fn delete_after_exit(file: &Path, install_dir: &Path, report: &mut UninstallReport) {
            report.deferred = None;
            report.remove_file(file);
            report.remove_dir_if_empty(install_dir);
        }
    }
}
