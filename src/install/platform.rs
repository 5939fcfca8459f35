//! Host platform detection and install preconditions
//!
//! The installer refuses to start on a CPU architecture the manifest does not
//! allow, or on an OS older than its minimum version.

use std::cmp::Ordering;
use std::fmt;

use log::{debug, info};

use super::error::InstallerError;
use super::manifest::{Architecture, InstallManifest, PrivilegeLevel};

/// Dotted numeric OS version (`10.0.19045`)
#[derive(Debug, Clone)]
pub struct OsVersion(Vec<u32>);

impl OsVersion {
    pub fn parse(s: &str) -> Result<Self, InstallerError> {
        let parts = s
            .trim()
            .split('.')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| InstallerError::InvalidManifest(format!("'{s}' is not an OS version")))?;
        Ok(Self(parts))
    }

    fn component(&self, i: usize) -> u32 {
        self.0.get(i).copied().unwrap_or(0)
    }
}

impl PartialEq for OsVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OsVersion {}

impl PartialOrd for OsVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OsVersion {
    // Missing trailing components count as zero, so 10.0 == 10.0.0
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{joined}")
    }
}

/// What the installer knows about the machine it runs on
#[derive(Debug, Clone)]
pub struct HostPlatform {
    /// Raw `std::env::consts::ARCH`
    pub arch_name: &'static str,
    pub arch: Option<Architecture>,
    /// `None` where the OS version cannot be determined
    pub os_version: Option<OsVersion>,
}

impl HostPlatform {
    pub fn detect() -> Self {
        Self {
            arch_name: std::env::consts::ARCH,
            arch: Architecture::current(),
            os_version: detect_os_version(),
        }
    }
}

#[cfg(target_os = "windows")]
fn detect_os_version() -> Option<OsVersion> {
    super::windows::os_version()
}

#[cfg(not(target_os = "windows"))]
fn detect_os_version() -> Option<OsVersion> {
    // Minimum versions in the manifest are Windows versions
    None
}

/// Refuse to start on an unsupported architecture or OS version
pub fn check_preconditions(
    manifest: &InstallManifest,
    host: &HostPlatform,
) -> Result<(), InstallerError> {
    let supported = host
        .arch
        .is_some_and(|arch| manifest.architectures.contains(&arch));
    if !supported {
        return Err(InstallerError::UnsupportedArchitecture {
            found: host.arch_name.to_string(),
            allowed: manifest.architectures_display(),
        });
    }

    let required = OsVersion::parse(&manifest.min_os_version)?;
    match &host.os_version {
        Some(found) if *found < required => {
            return Err(InstallerError::UnsupportedOsVersion {
                app: manifest.name.clone(),
                required: required.to_string(),
                found: found.to_string(),
            });
        }
        Some(found) => info!("OS version {found} satisfies minimum {required}"),
        None => debug!("OS version unknown, skipping minimum version check"),
    }

    Ok(())
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        /// Whether the current process runs with administrator rights
        pub fn is_elevated() -> bool {
            super::windows::is_elevated()
        }
    } else if #[cfg(unix)] {
        /// Whether the current process runs as root
        pub fn is_elevated() -> bool {
            unsafe { libc::geteuid() == 0 }
        }
    } else {
        pub fn is_elevated() -> bool {
            false
        }
    }
}

/// Per-machine installs need elevation up front
pub fn check_privileges(scope: PrivilegeLevel) -> Result<(), InstallerError> {
    if scope == PrivilegeLevel::PerMachine && !is_elevated() {
        return Err(InstallerError::PermissionDenied);
    }
    Ok(())
}
