//! Launch-and-forget process boundary
//!
//! Neither the browser nor the installed application is waited on; their
//! exit status is never observed.

use std::path::Path;
use std::process::{Command, Stdio};

use log::debug;

use super::error::InstallerError;

pub trait Launcher {
    /// Hand a URL to the system's default handler
    fn open_url(&self, url: &str) -> Result<(), InstallerError>;

    /// Start a program without waiting for it
    fn spawn_detached(&self, program: &Path, working_dir: &Path) -> Result<(), InstallerError>;
}

/// Real launcher: `opener` for URLs, a detached child for programs
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn open_url(&self, url: &str) -> Result<(), InstallerError> {
        opener::open_browser(url)
            .map_err(|e| InstallerError::System(format!("failed to open {url}: {e}")))
    }

    fn spawn_detached(&self, program: &Path, working_dir: &Path) -> Result<(), InstallerError> {
        let mut command = Command::new(program);
        command
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            command.creation_flags(DETACHED_PROCESS);
        }

        let child = command.spawn().map_err(|e| {
            InstallerError::System(format!("failed to start {}: {e}", program.display()))
        })?;
        debug!("Started {} (pid {})", program.display(), child.id());
        Ok(())
    }
}
