//! Install progress events and their rendering

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

/// One progress update
#[derive(Debug, Clone, PartialEq)]
pub struct InstallProgress {
    pub step: String,
    pub progress: f32, // 0.0 to 1.0
    pub message: String,
    pub is_error: bool,
}

impl InstallProgress {
    pub fn new(step: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            is_error: false,
        }
    }

    pub fn error(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            progress: 0.0,
            message: message.into(),
            is_error: true,
        }
    }

    pub fn complete(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(step, 1.0, message)
    }
}

/// Receives progress updates from the orchestrator
pub trait ProgressSink {
    fn report(&self, progress: InstallProgress);

    /// Called once when the session ends, successfully or not
    fn finish(&self) {}
}

/// Terminal progress bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        // A bad template only costs the styling
        if let Ok(style) = ProgressStyle::default_bar().template("[{bar:50.cyan/blue}] {pos:>3}%  {msg}") {
            bar.set_style(style.progress_chars("█▓░"));
        }
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, progress: InstallProgress) {
        if self.bar.is_finished() {
            return;
        }
        if progress.is_error {
            self.bar
                .set_message(format!("❌ [{}] {}", progress.step, progress.message));
            return;
        }
        self.bar.set_position((progress.progress * 100.0) as u64);
        self.bar
            .set_message(format!("[{}] {}", progress.step, progress.message));
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Progress written to the log only, for silent runs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: InstallProgress) {
        if progress.is_error {
            error!("[{}] {}", progress.step, progress.message);
        } else {
            info!(
                "[{}] {:>3}% {}",
                progress.step,
                (progress.progress * 100.0) as u8,
                progress.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_clamped() {
        assert_eq!(InstallProgress::new("stage", 1.7, "x").progress, 1.0);
        assert_eq!(InstallProgress::new("stage", -0.2, "x").progress, 0.0);
        assert_eq!(InstallProgress::complete("done", "x").progress, 1.0);
        assert!(InstallProgress::error("stage", "boom").is_error);
    }
}
