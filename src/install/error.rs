//! Installer error taxonomy.

use std::path::PathBuf;

use super::session::SessionState;

/// Errors raised by the install, repair and uninstall pipelines
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    #[error("unsupported CPU architecture '{found}' (supported: {allowed})")]
    UnsupportedArchitecture { found: String, allowed: String },

    #[error("{app} requires OS version {required} or later, found {found}")]
    UnsupportedOsVersion {
        app: String,
        required: String,
        found: String,
    },

    #[error(
        "a per-machine install requires administrator privileges; re-run elevated or pass --scope user"
    )]
    PermissionDenied,

    #[error("application binary not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("failed to stage {}: {source}", .path.display())]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create shortcut {}: {reason}", .path.display())]
    Shortcut { path: PathBuf, reason: String },

    #[error("failed to register uninstaller: {0}")]
    Registration(String),

    #[error("invalid install session transition {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    #[error("invalid install manifest: {0}")]
    InvalidManifest(String),

    #[error("unknown install task '{0}'")]
    UnknownTask(String),

    #[error("{} contains a different application ({found})", .install_dir.display())]
    ForeignInstall { install_dir: PathBuf, found: String },

    #[error("install receipt {}: {reason}", .path.display())]
    Receipt { path: PathBuf, reason: String },

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error("{0}")]
    System(String),
}

impl InstallerError {
    pub(crate) fn stage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Stage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shortcut(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::Shortcut {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
