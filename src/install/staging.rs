//! Copying the application binary into the install directory
//!
//! Overwrite policy is "ignore version": an existing file is always replaced,
//! no version comparison gates the copy. The new file is written to a temp
//! sibling and renamed over the target so a reader never sees a half-written
//! executable. The previous file is kept as a backup until the session
//! commits, which is what rollback restores. A backup that cannot be removed
//! at commit (the old executable is still running on Windows) stays behind
//! at [`backup_path`] until the next upgrade or the uninstall.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::error::InstallerError;

/// One file written by the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    /// Previous version, moved aside until commit
    pub backup: Option<PathBuf>,
}

impl StagedFile {
    /// Drop the backup of the replaced file
    pub fn commit(&self) {
        if let Some(backup) = &self.backup
            && let Err(e) = fs::remove_file(backup)
        {
            warn!("Failed to remove backup {} (left for uninstall): {e}", backup.display());
        }
    }

    /// Undo the copy: restore the previous file, or remove the new one
    pub fn rollback(&self) {
        let result = match &self.backup {
            Some(backup) => fs::rename(backup, &self.path),
            None => fs::remove_file(&self.path),
        };
        match result {
            Ok(()) => info!("Rolled back {}", self.path.display()),
            Err(e) => warn!("Failed to roll back {}: {e}", self.path.display()),
        }
    }
}

/// Where the previous version of `path` is parked during an upgrade
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".old");
    path.with_file_name(name)
}

/// Copy `source` to `dest_dir/file_name`, replacing whatever is there
pub async fn stage_file(
    source: &Path,
    dest_dir: &Path,
    file_name: &str,
) -> Result<StagedFile, InstallerError> {
    let source = source.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    let file_name = file_name.to_string();

    tokio::task::spawn_blocking(move || copy_replacing(&source, &dest_dir, &file_name))
        .await
        .map_err(|e| InstallerError::System(format!("staging task failed: {e}")))?
}

fn copy_replacing(
    source: &Path,
    dest_dir: &Path,
    file_name: &str,
) -> Result<StagedFile, InstallerError> {
    if !source.is_file() {
        return Err(InstallerError::SourceMissing(source.to_path_buf()));
    }

    fs::create_dir_all(dest_dir).map_err(|e| InstallerError::stage(dest_dir, e))?;

    let target = dest_dir.join(file_name);

    let mut temp = tempfile::Builder::new()
        .prefix(".staging-")
        .tempfile_in(dest_dir)
        .map_err(|e| InstallerError::stage(&target, e))?;

    {
        let mut input = fs::File::open(source).map_err(|e| InstallerError::stage(source, e))?;
        io::copy(&mut input, temp.as_file_mut()).map_err(|e| InstallerError::stage(&target, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| InstallerError::stage(&target, e))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o755))
            .map_err(|e| InstallerError::stage(&target, e))?;
    }

    let backup = if target.exists() {
        let backup = backup_path(&target);
        if backup.exists() {
            fs::remove_file(&backup).map_err(|e| InstallerError::stage(&backup, e))?;
        }
        fs::rename(&target, &backup).map_err(|e| InstallerError::stage(&target, e))?;
        debug!("Moved previous {} aside", target.display());
        Some(backup)
    } else {
        None
    };

    if let Err(e) = temp.persist(&target) {
        // Put the previous version back before reporting
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, &target);
        }
        return Err(InstallerError::stage(&target, e.error));
    }

    info!("Staged {} -> {}", source.display(), target.display());
    Ok(StagedFile {
        path: target,
        backup,
    })
}
