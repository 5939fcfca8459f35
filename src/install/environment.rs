//! Environment detection for CLI vs desktop
//!
//! Decides whether the post-install question is asked with a native dialog
//! or on the terminal, and whether anyone is there to answer at all.

use std::io::IsTerminal;

/// Check if running in a CLI environment
///
/// Returns `true` if any of:
/// - SSH connection detected (SSH_CONNECTION or SSH_CLIENT env vars)
/// - No GUI available (no DISPLAY or WAYLAND_DISPLAY on Linux/BSD)
/// - stdout is a terminal
pub fn is_cli_environment() -> bool {
    if std::env::var_os("SSH_CONNECTION").is_some() || std::env::var_os("SSH_CLIENT").is_some() {
        return true;
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd"))]
    {
        if std::env::var_os("DISPLAY").is_none() && std::env::var_os("WAYLAND_DISPLAY").is_none() {
            return true;
        }
    }

    std::io::stdout().is_terminal()
}

/// Inverse of [`is_cli_environment`]
pub fn is_desktop_environment() -> bool {
    !is_cli_environment()
}

/// Whether a person can answer prompts
///
/// A desktop session can always show a dialog. On a terminal, stdin has to
/// be attached to it.
pub fn is_interactive() -> bool {
    is_desktop_environment() || std::io::stdin().is_terminal()
}
