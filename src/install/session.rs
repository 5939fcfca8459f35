//! Install session state machine
//!
//! ```text
//! Initializing -> FilesStaged -> ShortcutsCreated -> PostInstallPromptShown -> Completed
//! ```
//!
//! Repair sessions and silent installs skip the prompt state and go straight
//! from `ShortcutsCreated` to `Completed`. Every other transition is
//! rejected, which is what makes the post-install prompt a one-shot.

use std::fmt;

use log::debug;

use super::error::InstallerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    FilesStaged,
    ShortcutsCreated,
    PostInstallPromptShown,
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "initializing",
            Self::FilesStaged => "files staged",
            Self::ShortcutsCreated => "shortcuts created",
            Self::PostInstallPromptShown => "post-install prompt shown",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// What kind of run a session is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionKind {
    /// Nothing of ours was in the install directory
    Install,
    /// A previous version with the same app id was found
    Upgrade { from: String },
    /// Re-stage and re-create shortcuts for the installed version
    Repair,
}

impl SessionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade { .. } => "upgrade",
            Self::Repair => "repair",
        }
    }
}

#[derive(Debug)]
pub struct InstallSession {
    kind: SessionKind,
    interactive: bool,
    state: SessionState,
}

impl InstallSession {
    pub fn new(kind: SessionKind, interactive: bool) -> Self {
        Self {
            kind,
            interactive,
            state: SessionState::Initializing,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    /// Whether this session passes through `PostInstallPromptShown`
    pub fn expects_prompt(&self) -> bool {
        self.interactive && self.kind != SessionKind::Repair
    }

    /// Fail unless `next` is reachable from the current state
    pub fn check(&self, next: SessionState) -> Result<(), InstallerError> {
        use SessionState::*;

        let allowed = match (self.state, next) {
            (Initializing, FilesStaged) => true,
            (FilesStaged, ShortcutsCreated) => true,
            (ShortcutsCreated, PostInstallPromptShown) => self.expects_prompt(),
            (ShortcutsCreated, Completed) => !self.expects_prompt(),
            (PostInstallPromptShown, Completed) => true,
            _ => false,
        };

        if !allowed {
            return Err(InstallerError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(())
    }

    /// Move to `next`, or fail without changing state
    pub fn advance(&mut self, next: SessionState) -> Result<(), InstallerError> {
        self.check(next)?;
        debug!("Session {}: {} -> {}", self.kind.label(), self.state, next);
        self.state = next;
        Ok(())
    }
}
