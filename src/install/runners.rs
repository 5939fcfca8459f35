//! Top-level runners for install, repair, uninstall and status
//!
//! These sit at the `anyhow` boundary: they turn CLI arguments into an
//! orchestrated session and report the outcome on the terminal.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{info, warn};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::detection::{InstallationState, check_installation_state};
use super::environment;
use super::layout::KnownFolders;
use super::manifest::{InstallManifest, PrivilegeLevel, TaskSelection};
use super::orchestrator::{InstallerOrchestrator, RunMode};
use super::platform::{self, HostPlatform};
use super::progress::{BarProgress, LogProgress, ProgressSink};
use super::prompt;
use super::receipt::InstallReceipt;
use super::shortcuts;
use super::uninstall;
use super::wizard;
use crate::cli::{InstallArgs, RepairArgs, TargetArgs};

fn say(stdout: &mut StandardStream, color: Color, bold: bool, msg: &str) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(bold));
    let _ = writeln!(stdout, "{msg}");
    let _ = stdout.reset();
}

/// Refuse to run on an unsupported host
fn preflight(manifest: &InstallManifest, scope: PrivilegeLevel) -> Result<KnownFolders> {
    let host = HostPlatform::detect();
    info!(
        "Host: {} {} (OS version {})",
        std::env::consts::OS,
        host.arch_name,
        host.os_version
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    );
    platform::check_preconditions(manifest, &host)?;
    platform::check_privileges(scope)?;
    Ok(KnownFolders::detect(scope)?)
}

/// The application binary shipped next to this setup program
fn default_binary(manifest: &InstallManifest) -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate setup program")?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Setup program has no parent directory"))?;
    Ok(dir.join(&manifest.executable))
}

fn scope_of(target: &TargetArgs, manifest: &InstallManifest) -> PrivilegeLevel {
    target.scope.map(Into::into).unwrap_or(manifest.privileges)
}

/// Unattended when asked for, or when nobody is there to answer
fn run_mode(silent: bool, interactive: bool) -> RunMode {
    if silent {
        RunMode::Silent
    } else if !interactive {
        warn!("No console or desktop to ask on; running unattended");
        RunMode::Silent
    } else {
        RunMode::Interactive
    }
}

/// Tasks from the flags; `ask` runs only when the flags leave the choice open
/// and `use_wizard` is set
fn selection_for<F>(
    manifest: &InstallManifest,
    args: &InstallArgs,
    use_wizard: bool,
    ask: F,
) -> Result<TaskSelection>
where
    F: FnOnce(&InstallManifest) -> Result<TaskSelection>,
{
    let mut selection = if args.no_tasks {
        TaskSelection::from_ids(manifest, Vec::<String>::new())?
    } else if let Some(ids) = &args.tasks {
        TaskSelection::from_ids(manifest, ids)?
    } else if use_wizard {
        ask(manifest)?
    } else {
        TaskSelection::defaults(manifest)
    };

    if args.no_launch {
        selection.launch_after_install = false;
    }
    Ok(selection)
}

/// Install or upgrade
pub async fn run_install(manifest: InstallManifest, args: &InstallArgs) -> Result<()> {
    let scope = scope_of(&args.target, &manifest);
    let folders = preflight(&manifest, scope)?;
    let token = args
        .target
        .dir
        .clone()
        .unwrap_or_else(|| manifest.default_dir.clone());
    let binary = match &args.binary {
        Some(path) => path.clone(),
        None => default_binary(&manifest)?,
    };

    let mode = run_mode(args.silent, environment::is_interactive());
    let interactive = mode == RunMode::Interactive;

    if interactive && environment::is_cli_environment() {
        let install_dir = folders.resolve_dir(&token)?;
        wizard::show_welcome(&manifest, &install_dir);
    }

    let selection = selection_for(
        &manifest,
        args,
        interactive && environment::is_cli_environment(),
        wizard::select_tasks,
    )?;
    let progress: Box<dyn ProgressSink> = if interactive && environment::is_cli_environment() {
        Box::new(BarProgress::new())
    } else {
        Box::new(LogProgress)
    };

    let mut orchestrator = InstallerOrchestrator::new(manifest.clone(), folders, selection.clone())
        .with_scope(scope)
        .with_mode(mode)
        .with_progress(progress);

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    if args.dry_run {
        let plan = orchestrator.plan(&token)?;
        say(&mut stdout, Color::Cyan, true, &format!("🔍 Dry run: {} {}", plan.kind.label(), manifest.name));
        let _ = writeln!(stdout, "   Binary:      {}", binary.display());
        let _ = writeln!(stdout, "   Executable:  {}", plan.executable.display());
        let _ = writeln!(stdout, "   Uninstaller: {}", plan.uninstaller.display());
        for shortcut in &plan.shortcuts {
            let _ = writeln!(stdout, "   Shortcut:    {}", shortcut.display());
        }
        for stale in &plan.stale_shortcuts {
            let _ = writeln!(stdout, "   Remove:      {}", stale.display());
        }
        return Ok(());
    }

    let result = orchestrator
        .run(&binary, &token)
        .await
        .with_context(|| format!("{} installation failed", manifest.name))?;

    if interactive {
        wizard::show_completion(&manifest, &result);
        if selection.launch_after_install && environment::is_cli_environment() {
            orchestrator.set_launch_after_install(wizard::confirm_launch(&manifest, true));
        }
    } else {
        say(
            &mut stdout,
            Color::Green,
            true,
            &format!("✅ {} installed to {}", manifest.name, result.install_dir.display()),
        );
    }

    if orchestrator.finalize_launch() {
        info!("Started {}", result.executable.display());
    }
    Ok(())
}

/// Re-stage the executable and re-create the recorded shortcuts
pub async fn run_repair(manifest: InstallManifest, args: &RepairArgs) -> Result<()> {
    let (install_dir, receipt) = locate_install(&manifest, &args.target)?;
    let Some(receipt) = receipt else {
        bail!(
            "{} is not installed in {}; run `install` instead",
            manifest.name,
            install_dir.display()
        );
    };

    let scope = args.target.scope.map(Into::into).unwrap_or(receipt.scope);
    let folders = preflight(&manifest, scope)?;
    let binary = match &args.binary {
        Some(path) => path.clone(),
        None => default_binary(&manifest)?,
    };

    let known: Vec<&str> = receipt
        .tasks
        .iter()
        .map(String::as_str)
        .filter(|id| manifest.task(id).is_some())
        .collect();
    let selection = TaskSelection::from_ids(&manifest, known)?;

    let token = install_dir.to_string_lossy().into_owned();
    let mut orchestrator = InstallerOrchestrator::new(manifest.clone(), folders, selection)
        .with_scope(scope)
        .repair();
    let result = orchestrator
        .run(&binary, &token)
        .await
        .with_context(|| format!("{} repair failed", manifest.name))?;

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    say(
        &mut stdout,
        Color::Green,
        true,
        &format!(
            "✅ Repaired {} ({} shortcuts)",
            result.install_dir.display(),
            result.shortcuts.len()
        ),
    );
    Ok(())
}

/// Find the install to operate on
///
/// An explicit `--dir` wins. Otherwise the directory this program runs from
/// is used when it holds our receipt (the uninstaller case), and the
/// default install directory after that.
fn locate_install(manifest: &InstallManifest, target: &TargetArgs) -> Result<(PathBuf, Option<InstallReceipt>)> {
    let scope = scope_of(target, manifest);

    if let Some(dir) = &target.dir {
        let dir = KnownFolders::detect(scope)?.resolve_dir(dir)?;
        let receipt = InstallReceipt::load(&dir)?;
        return Ok((dir, receipt));
    }

    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        && let Ok(Some(receipt)) = InstallReceipt::load(&dir)
        && receipt.app_id == manifest.app_id
    {
        return Ok((dir, Some(receipt)));
    }

    let dir = KnownFolders::detect(scope)?.resolve_dir(&manifest.default_dir)?;
    let receipt = InstallReceipt::load(&dir)?;
    Ok((dir, receipt))
}

/// Run uninstallation
pub async fn run_uninstall(manifest: InstallManifest, silent: bool, target: &TargetArgs) -> Result<()> {
    let (install_dir, receipt) = locate_install(&manifest, target)?;
    let scope = receipt
        .as_ref()
        .map(|r| r.scope)
        .unwrap_or_else(|| scope_of(target, &manifest));
    platform::check_privileges(scope)?;
    let folders = KnownFolders::detect(scope)?;

    if !silent && environment::is_interactive() {
        let question = format!(
            "Are you sure you want to completely remove {} and all of its components?",
            manifest.name
        );
        let confirmed = prompt::for_environment()
            .confirm(&format!("{} Uninstall", manifest.name), &question)
            .unwrap_or(false);
        if !confirmed {
            info!("Uninstall cancelled");
            return Ok(());
        }
    }

    let writer = shortcuts::platform_writer();
    let report = uninstall::uninstall(&manifest, &install_dir, &folders, writer.as_ref())
        .context("Uninstallation failed")?;

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    if report.is_clean() {
        say(
            &mut stdout,
            Color::Green,
            true,
            &format!("✅ {} was removed from your computer", manifest.name),
        );
    } else {
        say(
            &mut stdout,
            Color::Yellow,
            true,
            &format!("⚠ {} was removed, but some items could not be:", manifest.name),
        );
        for (path, reason) in &report.failed {
            let _ = writeln!(stdout, "   {} ({reason})", path.display());
        }
    }
    Ok(())
}

/// Print the install state; `Ok(true)` when fully installed
pub async fn run_status(manifest: InstallManifest, target: &TargetArgs) -> Result<bool> {
    let (install_dir, receipt) = locate_install(&manifest, target)?;
    let state = check_installation_state(&manifest, &install_dir);

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let (color, label) = match state {
        InstallationState::FullyInstalled => (Color::Green, "installed"),
        InstallationState::PartiallyInstalled => (Color::Yellow, "partially installed (run repair)"),
        InstallationState::NotInstalled => (Color::Red, "not installed"),
    };
    say(&mut stdout, color, true, &format!("{}: {label}", manifest.name));
    let _ = writeln!(stdout, "   Location: {}", install_dir.display());
    if let Some(receipt) = receipt {
        let _ = writeln!(stdout, "   Version:  {}", receipt.version);
        let _ = writeln!(stdout, "   Scope:    {}", receipt.scope);
        let _ = writeln!(
            stdout,
            "   Since:    {}",
            receipt.installed_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    Ok(state == InstallationState::FullyInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::manifest::fixtures::manifest;
    use crate::install::manifest::{DESKTOP_ICON, STARTUP_ICON};

    fn no_wizard(_: &InstallManifest) -> Result<TaskSelection> {
        panic!("wizard must not run");
    }

    #[test]
    fn silent_flag_or_missing_console_runs_unattended() {
        assert_eq!(run_mode(true, true), RunMode::Silent);
        assert_eq!(run_mode(true, false), RunMode::Silent);
        assert_eq!(run_mode(false, false), RunMode::Silent);
        assert_eq!(run_mode(false, true), RunMode::Interactive);
    }

    #[test]
    fn no_tasks_clears_every_task_without_asking() {
        let m = manifest();
        let args = InstallArgs {
            no_tasks: true,
            ..Default::default()
        };
        let selection = selection_for(&m, &args, true, no_wizard).expect("selection");
        assert_eq!(selection.ids().count(), 0);
        assert!(selection.launch_after_install);
    }

    #[test]
    fn explicit_tasks_win_over_the_wizard() {
        let m = manifest();
        let args = InstallArgs {
            tasks: Some(vec![DESKTOP_ICON.to_string()]),
            ..Default::default()
        };
        let selection = selection_for(&m, &args, true, no_wizard).expect("selection");
        assert!(selection.is_selected(DESKTOP_ICON));
        assert!(!selection.is_selected(STARTUP_ICON));
    }

    #[test]
    fn unknown_task_is_rejected() {
        let args = InstallArgs {
            tasks: Some(vec!["quicklaunch".to_string()]),
            ..Default::default()
        };
        assert!(selection_for(&manifest(), &args, false, no_wizard).is_err());
    }

    #[test]
    fn no_launch_turns_off_launch_after_install() {
        let m = manifest();
        let args = InstallArgs {
            no_launch: true,
            ..Default::default()
        };
        let selection = selection_for(&m, &args, false, no_wizard).expect("selection");
        assert!(!selection.launch_after_install);
        assert_eq!(selection.ids().count(), TaskSelection::defaults(&m).ids().count());
    }

    #[test]
    fn defaults_apply_without_a_console() {
        let m = manifest();
        let selection =
            selection_for(&m, &InstallArgs::default(), false, no_wizard).expect("selection");
        assert_eq!(selection, TaskSelection::defaults(&m));
    }

    #[test]
    fn wizard_decides_when_flags_are_absent() {
        let m = manifest();
        let selection = selection_for(&m, &InstallArgs::default(), true, |m| {
            Ok(TaskSelection::from_ids(m, [DESKTOP_ICON])?)
        })
        .expect("selection");
        assert!(selection.is_selected(DESKTOP_ICON));
        assert!(!selection.is_selected(STARTUP_ICON));
    }
}
