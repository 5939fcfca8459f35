//! Install pipeline: stage, shortcuts, registration, post-install prompt
//!
//! One [`InstallerOrchestrator`] drives one install session. Steps run
//! sequentially and each one is gated by the session state machine, so the
//! driver-download question can be asked at most once and only after the
//! files and shortcuts are in place.
//!
//! Staging, shortcut and registration failures are fatal and roll back what
//! this session created. Shortcuts an upgrade drops are only removed once
//! the session completes. The prompt and both launches are fire-and-forget:
//! their failures are logged and never fail the install.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::error::InstallerError;
use super::launcher::{Launcher, SystemLauncher};
use super::layout::KnownFolders;
use super::manifest::{InstallManifest, PrivilegeLevel, TaskSelection};
use super::progress::{InstallProgress, LogProgress, ProgressSink};
use super::prompt::{self, Prompter};
use super::receipt::InstallReceipt;
use super::registration::{self, UNINSTALLER_NAME};
use super::session::{InstallSession, SessionKind, SessionState};
use super::shortcuts::{self, ShortcutWriter};
use super::staging::{self, StagedFile};

/// Whether a person is present to answer questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Interactive,
    /// Unattended: no prompt and no launch after install
    Silent,
}

/// What happened at the post-install check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostInstallOutcome {
    /// Silent run or repair; nothing was shown
    Suppressed,
    Declined,
    /// The download page was requested; whether a browser came up is not tracked
    Opened,
}

/// Summary of a finished install session
#[derive(Debug, Clone)]
pub struct InstallationResult {
    pub kind: SessionKind,
    pub install_dir: PathBuf,
    pub executable: PathBuf,
    pub uninstaller: PathBuf,
    pub shortcuts: Vec<PathBuf>,
    pub receipt_path: PathBuf,
    pub post_install: PostInstallOutcome,
}

/// What an install would do, without doing it
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub kind: SessionKind,
    pub install_dir: PathBuf,
    pub executable: PathBuf,
    pub uninstaller: PathBuf,
    pub shortcuts: Vec<PathBuf>,
    /// Shortcuts of the previous install that the new selection drops
    pub stale_shortcuts: Vec<PathBuf>,
}

pub struct InstallerOrchestrator {
    manifest: InstallManifest,
    folders: KnownFolders,
    scope: PrivilegeLevel,
    selection: TaskSelection,
    mode: RunMode,
    repair: bool,
    uninstaller_source: Option<PathBuf>,
    prompter: Box<dyn Prompter>,
    launcher: Box<dyn Launcher>,
    writer: Box<dyn ShortcutWriter>,
    progress: Box<dyn ProgressSink>,

    session: InstallSession,
    install_dir: Option<PathBuf>,
    dir_created: bool,
    previous: Option<InstallReceipt>,
    staged: Vec<StagedFile>,
    shortcuts: Vec<PathBuf>,
    uninstaller: Option<PathBuf>,
    uninstaller_created: bool,
    receipt_path: Option<PathBuf>,
}

impl InstallerOrchestrator {
    pub fn new(manifest: InstallManifest, folders: KnownFolders, selection: TaskSelection) -> Self {
        Self {
            scope: manifest.privileges,
            manifest,
            folders,
            selection,
            mode: RunMode::Interactive,
            repair: false,
            uninstaller_source: None,
            prompter: prompt::for_environment(),
            launcher: Box::new(SystemLauncher),
            writer: shortcuts::platform_writer(),
            progress: Box::new(LogProgress),
            session: InstallSession::new(SessionKind::Install, true),
            install_dir: None,
            dir_created: false,
            previous: None,
            staged: Vec::new(),
            shortcuts: Vec::new(),
            uninstaller: None,
            uninstaller_created: false,
            receipt_path: None,
        }
    }

    pub fn with_scope(mut self, scope: PrivilegeLevel) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self.session = InstallSession::new(SessionKind::Install, mode == RunMode::Interactive);
        self
    }

    /// Re-stage and re-create shortcuts without the post-install prompt
    pub fn repair(mut self) -> Self {
        self.repair = true;
        self
    }

    /// Binary copied in as the uninstaller; defaults to the running executable
    pub fn with_uninstaller_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.uninstaller_source = Some(path.into());
        self
    }

    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_shortcut_writer(mut self, writer: Box<dyn ShortcutWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn kind(&self) -> &SessionKind {
        self.session.kind()
    }

    pub fn manifest(&self) -> &InstallManifest {
        &self.manifest
    }

    pub fn set_launch_after_install(&mut self, enabled: bool) {
        self.selection.launch_after_install = enabled;
    }

    /// Inspect the target directory and decide what kind of session this is
    fn detect_kind(&self, install_dir: &Path) -> Result<(SessionKind, Option<InstallReceipt>), InstallerError> {
        let previous = InstallReceipt::load(install_dir)?;

        if let Some(receipt) = &previous
            && receipt.app_id != self.manifest.app_id
        {
            return Err(InstallerError::ForeignInstall {
                install_dir: install_dir.to_path_buf(),
                found: format!("{} {} ({})", receipt.app_name, receipt.version, receipt.app_id),
            });
        }

        let kind = match &previous {
            _ if self.repair => SessionKind::Repair,
            Some(receipt) => SessionKind::Upgrade {
                from: receipt.version.clone(),
            },
            None => SessionKind::Install,
        };
        Ok((kind, previous))
    }

    /// Copy the application binary into the resolved install directory
    ///
    /// The existing executable, whatever its version, is replaced.
    pub async fn stage_files(
        &mut self,
        source: &Path,
        dest_dir_token: &str,
    ) -> Result<PathBuf, InstallerError> {
        self.session.check(SessionState::FilesStaged)?;

        let install_dir = self.folders.resolve_dir(dest_dir_token)?;
        let (kind, previous) = self.detect_kind(&install_dir)?;
        match &kind {
            SessionKind::Upgrade { from } => {
                info!("Upgrading {} from {from} to {}", self.manifest.name, self.manifest.version)
            }
            SessionKind::Repair => info!("Repairing {} {}", self.manifest.name, self.manifest.version),
            SessionKind::Install => info!("Installing {} {}", self.manifest.name, self.manifest.version),
        }
        self.session = InstallSession::new(kind, self.mode == RunMode::Interactive);

        self.progress.report(InstallProgress::new(
            "stage",
            0.1,
            format!("Copying {}", self.manifest.executable),
        ));

        let dir_existed = install_dir.exists();
        let staged = match staging::stage_file(source, &install_dir, &self.manifest.executable).await {
            Ok(staged) => staged,
            Err(e) => {
                self.progress.report(InstallProgress::error("stage", e.to_string()));
                if !dir_existed {
                    let _ = fs::remove_dir(&install_dir);
                }
                return Err(e);
            }
        };

        let path = staged.path.clone();
        self.staged.push(staged);
        self.dir_created = !dir_existed;
        self.install_dir = Some(install_dir);
        self.previous = previous;
        self.session.advance(SessionState::FilesStaged)?;
        self.progress
            .report(InstallProgress::new("stage", 0.35, "Application files copied"));

        Ok(path)
    }

    fn staged_dir(&self, next: SessionState) -> Result<PathBuf, InstallerError> {
        self.install_dir
            .clone()
            .ok_or(InstallerError::InvalidTransition {
                from: self.session.state(),
                to: next,
            })
    }

    /// Create the Start Menu entries and the shortcuts the selected tasks ask for
    pub fn create_shortcuts(&mut self) -> Result<Vec<PathBuf>, InstallerError> {
        self.session.check(SessionState::ShortcutsCreated)?;
        let install_dir = self.staged_dir(SessionState::ShortcutsCreated)?;

        self.progress
            .report(InstallProgress::new("shortcuts", 0.4, "Creating shortcuts"));

        let planned = shortcuts::plan_shortcuts(
            &self.manifest,
            &self.folders,
            &self.selection,
            &install_dir,
            &install_dir.join(UNINSTALLER_NAME),
        );

        let created = match shortcuts::write_shortcuts(self.writer.as_ref(), &planned) {
            Ok(created) => created,
            Err((e, created)) => {
                self.shortcuts = created;
                self.progress
                    .report(InstallProgress::error("shortcuts", e.to_string()));
                self.rollback();
                return Err(e);
            }
        };

        self.shortcuts = created.clone();
        self.session.advance(SessionState::ShortcutsCreated)?;
        self.progress
            .report(InstallProgress::new("shortcuts", 0.6, "Shortcuts created"));

        Ok(created)
    }

    fn remove_stale_shortcuts(&self) {
        let Some(previous) = &self.previous else {
            return;
        };
        let keep: HashSet<&PathBuf> = self.shortcuts.iter().collect();
        for stale in previous.shortcuts.iter().filter(|p| !keep.contains(p)) {
            match fs::remove_file(stale) {
                Ok(()) => info!("Removed shortcut {} no longer selected", stale.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {e}", stale.display()),
            }
        }
    }

    /// Install the uninstaller and record the install with the OS
    pub fn register_uninstaller(&mut self) -> Result<PathBuf, InstallerError> {
        if self.session.state() != SessionState::ShortcutsCreated || self.receipt_path.is_some() {
            return Err(InstallerError::Registration(format!(
                "cannot register while {}",
                self.session.state()
            )));
        }
        let install_dir = self.staged_dir(SessionState::ShortcutsCreated)?;

        self.progress.report(InstallProgress::new(
            "register",
            0.7,
            "Registering uninstaller",
        ));

        match self.write_registration(&install_dir) {
            Ok(path) => {
                self.progress
                    .report(InstallProgress::new("register", 0.85, "Uninstaller registered"));
                Ok(path)
            }
            Err(e) => {
                self.progress
                    .report(InstallProgress::error("register", e.to_string()));
                self.rollback();
                Err(e)
            }
        }
    }

    fn write_registration(&mut self, install_dir: &Path) -> Result<PathBuf, InstallerError> {
        let target = install_dir.join(UNINSTALLER_NAME);
        let existed = target.exists();
        let uninstaller =
            registration::install_uninstaller(self.uninstaller_source.as_deref(), install_dir)?;
        self.uninstaller_created = !existed;
        self.uninstaller = Some(uninstaller.clone());

        let mut receipt = InstallReceipt::new(&self.manifest, self.scope, install_dir, &self.selection);
        receipt.files = self.staged.iter().map(|s| s.path.clone()).collect();
        receipt.files.push(uninstaller.clone());
        receipt.shortcuts = self.shortcuts.clone();

        registration::register(&self.manifest, &receipt, &uninstaller)?;
        let path = InstallReceipt::path_in(install_dir);
        self.receipt_path = Some(path.clone());
        Ok(path)
    }

    /// Ask once whether to open the driver download page
    ///
    /// Never fails the install: a prompt that cannot be shown counts as "no",
    /// and a URL that cannot be opened is only logged.
    pub fn run_post_install_check(&mut self) -> Result<PostInstallOutcome, InstallerError> {
        if !self.session.expects_prompt() {
            self.session.check(SessionState::Completed)?;
            info!("Post-install prompt suppressed ({} {})", self.session.kind().label(), self.mode_label());
            return Ok(PostInstallOutcome::Suppressed);
        }

        self.session.advance(SessionState::PostInstallPromptShown)?;
        // Keep the bar from drawing over the question
        self.progress.finish();

        let title = format!("{} Setup", self.manifest.name);
        let answer = match self.prompter.confirm(&title, &self.manifest.driver.prompt) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Post-install prompt failed, treating as no: {e}");
                false
            }
        };

        if !answer {
            info!("{} download declined", self.manifest.driver.name);
            return Ok(PostInstallOutcome::Declined);
        }

        let url = &self.manifest.driver.download_url;
        match self.launcher.open_url(url) {
            Ok(()) => info!("Opened {url}"),
            Err(e) => warn!("{e}"),
        }
        Ok(PostInstallOutcome::Opened)
    }

    fn mode_label(&self) -> &'static str {
        match self.mode {
            RunMode::Interactive => "interactive",
            RunMode::Silent => "silent",
        }
    }

    /// Finish the session: drop the shortcuts the new selection no longer
    /// wants and the backups of replaced files
    pub fn complete(&mut self) -> Result<(), InstallerError> {
        self.session.advance(SessionState::Completed)?;
        self.remove_stale_shortcuts();
        for staged in &self.staged {
            staged.commit();
        }
        self.progress.report(InstallProgress::complete(
            "complete",
            format!("{} {} installed", self.manifest.name, self.manifest.version),
        ));
        self.progress.finish();
        Ok(())
    }

    /// Start the installed application without waiting for it
    ///
    /// Returns whether a launch was attempted.
    pub fn finalize_launch(&self) -> bool {
        if self.session.state() != SessionState::Completed
            || self.mode == RunMode::Silent
            || !self.selection.launch_after_install
        {
            return false;
        }
        let Some(install_dir) = &self.install_dir else {
            return false;
        };

        let program = install_dir.join(&self.manifest.executable);
        if let Err(e) = self.launcher.spawn_detached(&program, install_dir) {
            warn!("{e}");
        }
        true
    }

    /// Undo what this session created, newest first
    fn rollback(&mut self) {
        warn!("Rolling back {}", self.manifest.name);

        let previous: HashSet<PathBuf> = self
            .previous
            .as_ref()
            .map(|r| r.shortcuts.iter().cloned().collect())
            .unwrap_or_default();
        for shortcut in self.shortcuts.drain(..).rev() {
            if previous.contains(&shortcut) {
                continue;
            }
            if let Err(e) = fs::remove_file(&shortcut) {
                warn!("Failed to remove {}: {e}", shortcut.display());
            }
        }

        if self.uninstaller_created
            && let Some(uninstaller) = self.uninstaller.take()
            && let Err(e) = fs::remove_file(&uninstaller)
        {
            warn!("Failed to remove {}: {e}", uninstaller.display());
        }

        if let Some(dir) = &self.install_dir {
            self.restore_receipt(dir);
        }

        for staged in self.staged.drain(..).rev() {
            staged.rollback();
        }

        if self.dir_created
            && let Some(dir) = &self.install_dir
        {
            // Only succeeds if nothing else landed there
            let _ = fs::remove_dir(dir);
        }
        self.progress.finish();
    }

    /// Put back the receipt this session found, or drop the one it wrote
    fn restore_receipt(&self, install_dir: &Path) {
        match &self.previous {
            Some(previous) => {
                if let Err(e) = previous.save() {
                    warn!("Failed to restore install receipt: {e}");
                }
            }
            None => {
                let path = InstallReceipt::path_in(install_dir);
                match fs::remove_file(&path) {
                    Ok(()) => info!("Removed {}", path.display()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!("Failed to remove {}: {e}", path.display()),
                }
            }
        }
    }

    /// Run the whole pipeline
    ///
    /// Launching the application afterwards is left to the caller
    /// ([`Self::finalize_launch`]), which may still ask the user.
    pub async fn run(
        &mut self,
        source: &Path,
        dest_dir_token: &str,
    ) -> Result<InstallationResult, InstallerError> {
        let executable = self.stage_files(source, dest_dir_token).await?;
        let shortcuts = self.create_shortcuts()?;
        let receipt_path = self.register_uninstaller()?;
        let post_install = self.run_post_install_check()?;
        self.complete()?;

        Ok(InstallationResult {
            kind: self.session.kind().clone(),
            install_dir: self.staged_dir(SessionState::Completed)?,
            executable,
            uninstaller: self
                .uninstaller
                .clone()
                .ok_or_else(|| InstallerError::Registration("uninstaller missing".to_string()))?,
            shortcuts,
            receipt_path,
            post_install,
        })
    }

    /// Resolve everything an install would touch, for `--dry-run`
    pub fn plan(&self, dest_dir_token: &str) -> Result<InstallPlan, InstallerError> {
        let install_dir = self.folders.resolve_dir(dest_dir_token)?;
        let (kind, previous) = self.detect_kind(&install_dir)?;
        let uninstaller = install_dir.join(UNINSTALLER_NAME);

        let shortcuts: Vec<PathBuf> = shortcuts::plan_shortcuts(
            &self.manifest,
            &self.folders,
            &self.selection,
            &install_dir,
            &uninstaller,
        )
        .iter()
        .map(|s| s.path(self.writer.as_ref()))
        .collect();

        let stale_shortcuts = previous
            .map(|r| {
                r.shortcuts
                    .into_iter()
                    .filter(|p| !shortcuts.contains(p))
                    .collect()
            })
            .unwrap_or_default();

        Ok(InstallPlan {
            kind,
            executable: install_dir.join(&self.manifest.executable),
            uninstaller,
            install_dir,
            shortcuts,
            stale_shortcuts,
        })
    }
}


#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::fakes::{RecordingLauncher, ScriptedPrompter};
    use super::*;
    use crate::install::manifest::fixtures::manifest;
    use crate::install::manifest::{DESKTOP_ICON, STARTUP_ICON};
    use crate::install::shortcuts::{DesktopEntryWriter, Shortcut, ShortcutKind};
    use tempfile::TempDir;

    const TOKEN: &str = "{autopf}\\VoiceReplacer";

    struct Fixture {
        tmp: TempDir,
        source: PathBuf,
        setup: PathBuf,
        prompter: ScriptedPrompter,
        launcher: RecordingLauncher,
    }

    impl Fixture {
        fn new(answer: bool) -> Self {
            let tmp = TempDir::new().expect("tempdir");
            let source = tmp.path().join("build").join("VoiceReplacer.exe");
            fs::create_dir_all(source.parent().expect("parent")).expect("mkdir");
            fs::write(&source, "app v1").expect("write app");
            let setup = tmp.path().join("build").join("setup.exe");
            fs::write(&setup, "setup").expect("write setup");
            Self {
                tmp,
                source,
                setup,
                prompter: ScriptedPrompter::answering(answer),
                launcher: RecordingLauncher::default(),
            }
        }

        fn root(&self) -> PathBuf {
            self.tmp.path().join("root")
        }

        fn install_dir(&self) -> PathBuf {
            self.root().join("programs").join("VoiceReplacer")
        }

        fn orchestrator(&self, selection: TaskSelection, mode: RunMode) -> InstallerOrchestrator {
            let m = manifest();
            InstallerOrchestrator::new(m, KnownFolders::under_root(&self.root()), selection)
                .with_mode(mode)
                .with_uninstaller_source(&self.setup)
                .with_prompter(Box::new(self.prompter.clone()))
                .with_launcher(Box::new(self.launcher.clone()))
                .with_shortcut_writer(Box::new(DesktopEntryWriter))
        }

        fn urls(&self) -> Vec<String> {
            self.launcher.urls.borrow().clone()
        }

        fn asked(&self) -> usize {
            self.prompter.asked.borrow().len()
        }
    }

    fn executables(dir: &Path) -> usize {
        fs::read_dir(dir)
            .expect("read dir")
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().starts_with("VoiceReplacer"))
                    .unwrap_or(false)
            })
            .count()
    }

    #[tokio::test]
    async fn yes_opens_the_download_page_exactly_once() {
        let fx = Fixture::new(true);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);

        let result = orch.run(&fx.source, TOKEN).await.expect("install");

        assert_eq!(result.post_install, PostInstallOutcome::Opened);
        assert_eq!(fx.asked(), 1);
        assert_eq!(fx.urls(), vec!["https://vb-audio.com/Cable/".to_string()]);
        assert_eq!(orch.state(), SessionState::Completed);
        assert_eq!(result.kind, SessionKind::Install);
        assert_eq!(executables(&fx.install_dir()), 1);
        assert!(result.receipt_path.is_file());
        assert!(result.uninstaller.is_file());
    }

    #[tokio::test]
    async fn no_opens_nothing() {
        let fx = Fixture::new(false);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);

        let result = orch.run(&fx.source, TOKEN).await.expect("install");
        assert_eq!(result.post_install, PostInstallOutcome::Declined);
        assert_eq!(fx.asked(), 1);
        assert!(fx.urls().is_empty());
    }

    #[tokio::test]
    async fn prompt_cannot_be_shown_twice() {
        let fx = Fixture::new(true);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        orch.stage_files(&fx.source, TOKEN).await.expect("stage");
        orch.create_shortcuts().expect("shortcuts");
        orch.register_uninstaller().expect("register");
        orch.run_post_install_check().expect("first prompt");

        assert!(matches!(
            orch.run_post_install_check(),
            Err(InstallerError::InvalidTransition { .. })
        ));
        assert_eq!(fx.asked(), 1);
        assert_eq!(fx.urls().len(), 1);
    }

    #[tokio::test]
    async fn prompt_failure_and_url_failure_do_not_fail_the_install() {
        let mut fx = Fixture::new(true);
        fx.prompter.answer = Err("no console".to_string());
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        let result = orch.run(&fx.source, TOKEN).await.expect("install");
        assert_eq!(result.post_install, PostInstallOutcome::Declined);

        let mut fx = Fixture::new(true);
        fx.launcher.fail = true;
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        let result = orch.run(&fx.source, TOKEN).await.expect("install");
        assert_eq!(result.post_install, PostInstallOutcome::Opened);
        assert_eq!(fx.urls().len(), 1);
    }

    #[tokio::test]
    async fn silent_install_suppresses_prompt_and_launch() {
        let fx = Fixture::new(true);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Silent);

        let result = orch.run(&fx.source, TOKEN).await.expect("install");
        assert_eq!(result.post_install, PostInstallOutcome::Suppressed);
        assert_eq!(fx.asked(), 0);
        assert!(fx.urls().is_empty());
        assert!(!orch.finalize_launch());
        assert!(fx.launcher.programs.borrow().is_empty());
    }

    #[tokio::test]
    async fn repair_never_prompts() {
        let fx = Fixture::new(true);
        let selection = TaskSelection::defaults(&manifest());
        fx.orchestrator(selection.clone(), RunMode::Silent)
            .run(&fx.source, TOKEN)
            .await
            .expect("install");

        let mut orch = fx.orchestrator(selection, RunMode::Interactive).repair();
        let result = orch.run(&fx.source, TOKEN).await.expect("repair");
        assert_eq!(result.kind, SessionKind::Repair);
        assert_eq!(result.post_install, PostInstallOutcome::Suppressed);
        assert_eq!(fx.asked(), 0);
    }

    #[tokio::test]
    async fn desktop_shortcut_follows_its_task() {
        let fx = Fixture::new(false);
        let m = manifest();
        let with_desktop = TaskSelection::from_ids(&m, [DESKTOP_ICON]).expect("ids");
        let result = fx
            .orchestrator(with_desktop, RunMode::Silent)
            .run(&fx.source, TOKEN)
            .await
            .expect("install");

        let desktop = fx.root().join("desktop").join("VoiceReplacer.desktop");
        assert!(desktop.is_file());
        assert!(result.shortcuts.contains(&desktop));
        assert!(!fx.root().join("startup").join("VoiceReplacer.desktop").exists());
    }

    #[tokio::test]
    async fn upgrade_replaces_binary_and_drops_deselected_shortcuts() {
        let fx = Fixture::new(false);
        let m = manifest();
        let both = TaskSelection::from_ids(&m, [DESKTOP_ICON, STARTUP_ICON]).expect("ids");
        fx.orchestrator(both, RunMode::Silent)
            .run(&fx.source, TOKEN)
            .await
            .expect("first install");
        let desktop = fx.root().join("desktop").join("VoiceReplacer.desktop");
        assert!(desktop.is_file());

        fs::write(&fx.source, "app v2").expect("new build");
        let startup_only = TaskSelection::from_ids(&m, [STARTUP_ICON]).expect("ids");
        let mut orch = fx.orchestrator(startup_only, RunMode::Silent);
        let result = orch.run(&fx.source, TOKEN).await.expect("upgrade");

        assert_eq!(
            result.kind,
            SessionKind::Upgrade {
                from: "1.2.0".to_string()
            }
        );
        assert!(!desktop.exists());
        assert_eq!(
            fs::read_to_string(&result.executable).expect("read"),
            "app v2"
        );
        assert_eq!(executables(&fx.install_dir()), 1);
    }

    fn both_shortcut_tasks() -> TaskSelection {
        TaskSelection::from_ids(&manifest(), [DESKTOP_ICON, STARTUP_ICON]).expect("ids")
    }

    fn startup_only() -> TaskSelection {
        TaskSelection::from_ids(&manifest(), [STARTUP_ICON]).expect("ids")
    }

    #[tokio::test]
    async fn failed_upgrade_leaves_previous_install_intact() {
        let fx = Fixture::new(false);
        fx.orchestrator(both_shortcut_tasks(), RunMode::Silent)
            .run(&fx.source, TOKEN)
            .await
            .expect("first install");
        let desktop = fx.root().join("desktop").join("VoiceReplacer.desktop");
        let before = InstallReceipt::load(&fx.install_dir()).expect("load").expect("receipt");

        fs::write(&fx.source, "app v2").expect("new build");
        let mut orch = fx
            .orchestrator(startup_only(), RunMode::Silent)
            .with_uninstaller_source(fx.tmp.path().join("missing-setup.exe"));
        let err = orch.run(&fx.source, TOKEN).await.unwrap_err();

        assert!(matches!(err, InstallerError::Registration(_)));
        assert!(desktop.is_file());
        assert_eq!(
            fs::read_to_string(fx.install_dir().join("VoiceReplacer.exe")).expect("read"),
            "app v1"
        );
        assert_eq!(
            InstallReceipt::load(&fx.install_dir()).expect("load"),
            Some(before)
        );
        assert_eq!(
            crate::install::detection::check_installation_state(&manifest(), &fx.install_dir()),
            crate::install::detection::InstallationState::FullyInstalled
        );
    }

    #[tokio::test]
    async fn rollback_after_registration_restores_the_previous_receipt() {
        let fx = Fixture::new(false);
        fx.orchestrator(both_shortcut_tasks(), RunMode::Silent)
            .run(&fx.source, TOKEN)
            .await
            .expect("first install");

        let mut next = manifest();
        next.version = "2.0.0".to_string();
        let mut orch = InstallerOrchestrator::new(
            next,
            KnownFolders::under_root(&fx.root()),
            startup_only(),
        )
        .with_mode(RunMode::Silent)
        .with_uninstaller_source(&fx.setup)
        .with_shortcut_writer(Box::new(DesktopEntryWriter));
        orch.stage_files(&fx.source, TOKEN).await.expect("stage");
        orch.create_shortcuts().expect("shortcuts");
        orch.register_uninstaller().expect("register");
        let written = InstallReceipt::load(&fx.install_dir()).expect("load").expect("receipt");
        assert_eq!(written.version, "2.0.0");

        orch.rollback();

        let restored = InstallReceipt::load(&fx.install_dir()).expect("load").expect("receipt");
        assert_eq!(restored.version, "1.2.0");
        assert_eq!(restored.shortcuts.len(), 4);
        assert!(fx.root().join("desktop").join("VoiceReplacer.desktop").is_file());
    }

    #[tokio::test]
    async fn failed_first_install_drops_its_receipt() {
        let fx = Fixture::new(false);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Silent);
        orch.stage_files(&fx.source, TOKEN).await.expect("stage");
        orch.create_shortcuts().expect("shortcuts");
        orch.register_uninstaller().expect("register");

        orch.rollback();

        assert!(!InstallReceipt::path_in(&fx.install_dir()).exists());
        assert!(!fx.install_dir().join("VoiceReplacer.exe").exists());
    }

    #[tokio::test]
    async fn foreign_install_is_refused() {
        let fx = Fixture::new(false);
        let mut other = manifest();
        other.app_id = uuid::Uuid::new_v4();
        other.name = "OtherApp".to_string();
        fs::create_dir_all(fx.install_dir()).expect("mkdir");
        InstallReceipt::new(
            &other,
            PrivilegeLevel::PerUser,
            &fx.install_dir(),
            &TaskSelection::defaults(&other),
        )
        .save()
        .expect("save foreign receipt");

        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Silent);
        let err = orch.run(&fx.source, TOKEN).await.unwrap_err();
        assert!(matches!(err, InstallerError::ForeignInstall { .. }));
        assert!(!fx.install_dir().join("VoiceReplacer.exe").exists());
    }

    #[tokio::test]
    async fn missing_source_is_fatal_and_leaves_nothing() {
        let fx = Fixture::new(true);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        let err = orch
            .run(&fx.tmp.path().join("missing.exe"), TOKEN)
            .await
            .unwrap_err();

        assert!(matches!(err, InstallerError::SourceMissing(_)));
        assert_eq!(orch.state(), SessionState::Initializing);
        assert!(!fx.install_dir().exists());
        assert_eq!(fx.asked(), 0);
    }

    struct BrokenStartupWriter;

    impl ShortcutWriter for BrokenStartupWriter {
        fn extension(&self) -> &'static str {
            "desktop"
        }

        fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<(), InstallerError> {
            if shortcut.kind == ShortcutKind::Startup {
                return Err(InstallerError::shortcut(path, "access denied"));
            }
            fs::write(path, "entry").map_err(|e| InstallerError::shortcut(path, e))
        }
    }

    #[tokio::test]
    async fn shortcut_failure_rolls_back_the_session() {
        let fx = Fixture::new(true);
        let mut orch = fx
            .orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive)
            .with_shortcut_writer(Box::new(BrokenStartupWriter));

        let err = orch.run(&fx.source, TOKEN).await.unwrap_err();
        assert!(matches!(err, InstallerError::Shortcut { .. }));
        assert!(!fx.install_dir().join("VoiceReplacer.exe").exists());
        assert!(
            !fx.root()
                .join("start-menu")
                .join("VoiceReplacer")
                .join("VoiceReplacer.desktop")
                .exists()
        );
        assert_eq!(fx.asked(), 0);
    }

    #[tokio::test]
    async fn steps_out_of_order_are_rejected() {
        let fx = Fixture::new(true);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);

        assert!(matches!(
            orch.create_shortcuts(),
            Err(InstallerError::InvalidTransition { .. })
        ));
        assert!(orch.run_post_install_check().is_err());
        assert!(orch.complete().is_err());
        assert!(!orch.finalize_launch());
        assert_eq!(fx.asked(), 0);
    }

    #[tokio::test]
    async fn launch_after_install_is_detached_and_optional() {
        let fx = Fixture::new(false);
        let mut orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        let result = orch.run(&fx.source, TOKEN).await.expect("install");

        assert!(orch.finalize_launch());
        assert_eq!(*fx.launcher.programs.borrow(), vec![result.executable.clone()]);

        orch.set_launch_after_install(false);
        assert!(!orch.finalize_launch());
        assert_eq!(fx.launcher.programs.borrow().len(), 1);
    }

    #[test]
    fn plan_lists_shortcuts_without_touching_disk() {
        let fx = Fixture::new(true);
        let orch = fx.orchestrator(TaskSelection::defaults(&manifest()), RunMode::Interactive);
        let plan = orch.plan(TOKEN).expect("plan");

        assert_eq!(plan.kind, SessionKind::Install);
        assert_eq!(plan.executable, fx.install_dir().join("VoiceReplacer.exe"));
        assert_eq!(plan.shortcuts.len(), 3);
        assert!(plan.stale_shortcuts.is_empty());
        assert!(!fx.root().exists());
    }
}
