//! Interactive installation wizard

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use inquire::Confirm;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use super::manifest::{InstallManifest, TaskSelection};
use super::orchestrator::{InstallationResult, PostInstallOutcome};
use super::session::SessionKind;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn rule(stdout: &mut StandardStream) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)));
    let _ = writeln!(stdout, "{RULE}");
    let _ = stdout.reset();
}

/// Display welcome banner
pub fn show_welcome(manifest: &InstallManifest, install_dir: &Path) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    let _ = writeln!(stdout);
    rule(&mut stdout);

    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
    let _ = writeln!(stdout, "\n                    {} {} Setup", manifest.name, manifest.version);
    let _ = stdout.reset();
    let _ = writeln!(stdout, "\n                 {}\n", manifest.publisher);

    rule(&mut stdout);

    let _ = writeln!(stdout, "\nThis will install:");
    let _ = writeln!(stdout, "  • {}", manifest.executable);
    let _ = writeln!(stdout, "  • Start Menu shortcuts and an uninstaller");
    let _ = writeln!(stdout, "\nDestination: {}\n", install_dir.display());
}

/// Ask about each optional task, starting from its default
pub fn select_tasks(manifest: &InstallManifest) -> Result<TaskSelection> {
    let mut selection = TaskSelection::defaults(manifest);

    for task in &manifest.tasks {
        let enabled = Confirm::new(&task.description)
            .with_default(task.default_enabled)
            .prompt()
            .map_err(|e| anyhow::anyhow!("Prompt cancelled: {}", e))?;
        selection.set(&task.id, enabled);
    }

    println!("\n📋 Installation Summary:");
    for task in &manifest.tasks {
        let state = if selection.is_selected(&task.id) { "Yes" } else { "No" };
        println!("  • {}: {state}", task.description);
    }
    println!();

    let proceed = Confirm::new("Proceed with these settings?")
        .with_default(true)
        .prompt()
        .map_err(|e| anyhow::anyhow!("Prompt cancelled: {}", e))?;

    if !proceed {
        return Err(anyhow::anyhow!("Installation cancelled by user"));
    }

    Ok(selection)
}

/// Finish-page "launch now" checkbox
pub fn confirm_launch(manifest: &InstallManifest, default: bool) -> bool {
    Confirm::new(&format!("Launch {} now?", manifest.name))
        .with_default(default)
        .prompt()
        .unwrap_or(false)
}

/// Display installation completion summary
pub fn show_completion(manifest: &InstallManifest, result: &InstallationResult) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    let _ = writeln!(stdout);
    rule(&mut stdout);

    let headline = match result.kind {
        SessionKind::Install => "INSTALLATION COMPLETE".to_string(),
        SessionKind::Upgrade { ref from } => format!("UPGRADED FROM {from}"),
        SessionKind::Repair => "REPAIR COMPLETE".to_string(),
    };
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = writeln!(stdout, "\n                    ✓ {headline}\n");
    let _ = stdout.reset();

    rule(&mut stdout);

    let _ = writeln!(stdout, "\nInstalled:");
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
    let _ = writeln!(stdout, "  ✓ {}", result.executable.display());
    for shortcut in &result.shortcuts {
        let _ = writeln!(stdout, "  ✓ {}", shortcut.display());
    }
    let _ = stdout.reset();

    if result.post_install != PostInstallOutcome::Opened {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = writeln!(
            stdout,
            "\n  ⚠ {} requires {}: {}",
            manifest.name, manifest.driver.name, manifest.driver.download_url
        );
        let _ = stdout.reset();
    }

    let _ = writeln!(stdout, "\nInstallation location:");
    let _ = writeln!(stdout, "  {}\n", result.install_dir.display());
    rule(&mut stdout);
}
