//! The one yes/no question an install asks
//!
//! [`Prompter`] is the seam between the orchestrator and whatever can ask the
//! user: a native message box on a Windows desktop, `inquire` on a terminal.

use inquire::Confirm;

use super::error::InstallerError;

pub trait Prompter {
    /// Ask a yes/no question; `Ok(true)` means yes
    fn confirm(&self, title: &str, message: &str) -> Result<bool, InstallerError>;
}

/// Terminal prompt through `inquire`
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn confirm(&self, title: &str, message: &str) -> Result<bool, InstallerError> {
        println!("\n{title}\n");
        let question = message.trim_end();
        Confirm::new(question)
            .with_default(true)
            .prompt()
            .map_err(|e| InstallerError::Prompt(e.to_string()))
    }
}

/// Windows message box
#[cfg(target_os = "windows")]
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePrompter;

#[cfg(target_os = "windows")]
impl Prompter for NativePrompter {
    fn confirm(&self, title: &str, message: &str) -> Result<bool, InstallerError> {
        Ok(super::windows::dialog::confirm(title, message))
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "windows")] {
        /// Prompter that suits the current environment
        pub fn for_environment() -> Box<dyn Prompter> {
            if super::environment::is_desktop_environment() {
                Box::new(NativePrompter)
            } else {
                Box::new(ConsolePrompter)
            }
        }
    } else {
        /// Prompter that suits the current environment
        pub fn for_environment() -> Box<dyn Prompter> {
            Box::new(ConsolePrompter)
        }
    }
}
