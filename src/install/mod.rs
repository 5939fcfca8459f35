//! VoiceReplacer installation library
//!
//! Stages the application binary, creates shortcuts, registers the
//! uninstaller and asks once about the VB-Audio driver download. The same
//! pieces drive repair, uninstall and status.

mod detection;
mod environment;
mod error;
mod launcher;
mod layout;
mod manifest;
mod orchestrator;
mod platform;
mod progress;
mod prompt;
mod receipt;
mod registration;
pub mod runners;
mod session;
mod shortcuts;
mod staging;
mod uninstall;
mod wizard;
#[cfg(target_os = "windows")]
mod windows;

// Public exports
pub use detection::{InstallationState, check_installation_state};
pub use environment::{is_cli_environment, is_desktop_environment, is_interactive};
pub use error::InstallerError;
pub use launcher::{Launcher, SystemLauncher};
pub use layout::KnownFolders;
pub use manifest::{
    Architecture, DESKTOP_ICON, DriverNotice, InstallManifest, InstallTask, PrivilegeLevel,
    STARTUP_ICON, TaskSelection,
};
pub use orchestrator::{
    InstallPlan, InstallationResult, InstallerOrchestrator, PostInstallOutcome, RunMode,
};
pub use platform::{HostPlatform, OsVersion, check_preconditions, check_privileges, is_elevated};
pub use progress::{BarProgress, InstallProgress, LogProgress, ProgressSink};
pub use prompt::{ConsolePrompter, Prompter};
pub use receipt::{InstallReceipt, RECEIPT_FILE};
pub use registration::{UNINSTALLER_NAME, UninstallEntry, uninstall_key_name};
pub use session::{InstallSession, SessionKind, SessionState};
pub use shortcuts::{
    DesktopEntryWriter, Shortcut, ShortcutKind, ShortcutWriter, plan_shortcuts, platform_writer,
};
pub use staging::{StagedFile, stage_file};
pub use uninstall::{UninstallReport, uninstall};
