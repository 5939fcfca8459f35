//! Start Menu, desktop and startup shortcuts
//!
//! What gets created is decided by [`plan_shortcuts`]; how a shortcut file is
//! written is platform specific and lives behind [`ShortcutWriter`].

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::error::InstallerError;
use super::layout::KnownFolders;
use super::manifest::{DESKTOP_ICON, InstallManifest, STARTUP_ICON, TaskSelection};

/// Where a shortcut is placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKind {
    StartMenu,
    StartMenuUninstall,
    Desktop,
    Startup,
}

/// A shortcut to create; `file_stem` excludes the platform extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub kind: ShortcutKind,
    pub dir: PathBuf,
    pub file_stem: String,
    pub target: PathBuf,
    pub arguments: Vec<String>,
    pub working_dir: PathBuf,
    pub description: String,
}

impl Shortcut {
    pub fn path(&self, writer: &dyn ShortcutWriter) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.file_stem, writer.extension()))
    }
}

/// Writes one shortcut file
pub trait ShortcutWriter {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<(), InstallerError>;
}

/// Decide which shortcuts a selection produces
///
/// The program and uninstaller Start Menu entries are unconditional; the
/// desktop and startup shortcuts follow their tasks.
pub fn plan_shortcuts(
    manifest: &InstallManifest,
    folders: &KnownFolders,
    selection: &TaskSelection,
    install_dir: &Path,
    uninstaller: &Path,
) -> Vec<Shortcut> {
    let program = install_dir.join(&manifest.executable);
    let group = folders.start_menu_group(manifest);
    let app = |kind, dir: &Path| Shortcut {
        kind,
        dir: dir.to_path_buf(),
        file_stem: manifest.name.clone(),
        target: program.clone(),
        arguments: Vec::new(),
        working_dir: install_dir.to_path_buf(),
        description: format!("{} {}", manifest.name, manifest.version),
    };

    let mut shortcuts = vec![
        app(ShortcutKind::StartMenu, &group),
        Shortcut {
            kind: ShortcutKind::StartMenuUninstall,
            dir: group.clone(),
            file_stem: format!("Uninstall {}", manifest.name),
            target: uninstaller.to_path_buf(),
            arguments: vec!["uninstall".to_string()],
            working_dir: install_dir.to_path_buf(),
            description: format!("Remove {} from this computer", manifest.name),
        },
    ];

    if selection.is_selected(DESKTOP_ICON) {
        shortcuts.push(app(ShortcutKind::Desktop, &folders.desktop));
    }
    if selection.is_selected(STARTUP_ICON) {
        shortcuts.push(app(ShortcutKind::Startup, &folders.startup));
    }

    shortcuts
}

/// Write every planned shortcut, returning the paths created
///
/// Stops at the first failure; the paths written before it are returned in
/// the error's companion vector so the caller can roll them back.
pub fn write_shortcuts(
    writer: &dyn ShortcutWriter,
    shortcuts: &[Shortcut],
) -> Result<Vec<PathBuf>, (InstallerError, Vec<PathBuf>)> {
    let mut created = Vec::with_capacity(shortcuts.len());
    for shortcut in shortcuts {
        let path = shortcut.path(writer);
        if let Err(e) = fs::create_dir_all(&shortcut.dir) {
            return Err((InstallerError::shortcut(&path, e), created));
        }
        if let Err(e) = writer.write(&path, shortcut) {
            return Err((e, created));
        }
        info!("Created {:?} shortcut {}", shortcut.kind, path.display());
        created.push(path);
    }
    Ok(created)
}

/// freedesktop.org `.desktop` launcher entries
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopEntryWriter;

fn quote_exec_arg(arg: &str) -> String {
    let escaped = arg
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('`', "\\`")
        .replace('$', "\\$");
    // Exec is also a string value; its escapes are decoded before the quoting
    format!("\"{escaped}\"").replace('\\', "\\\\")
}

impl ShortcutWriter for DesktopEntryWriter {
    fn extension(&self) -> &'static str {
        "desktop"
    }

    fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<(), InstallerError> {
        let exec = std::iter::once(shortcut.target.to_string_lossy().into_owned())
            .chain(shortcut.arguments.iter().cloned())
            .map(|a| quote_exec_arg(&a))
            .collect::<Vec<_>>()
            .join(" ");

        let content = format!(
            "[Desktop Entry]\nType=Application\nName={}\nComment={}\nExec={}\nPath={}\nTerminal=false\n",
            shortcut.file_stem,
            shortcut.description,
            exec,
            shortcut.working_dir.display(),
        );

        fs::write(path, content).map_err(|e| InstallerError::shortcut(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755))
                .map_err(|e| InstallerError::shortcut(path, e))?;
        }

        Ok(())
    }
}

/// Windows `.lnk` files, written through the WScript.Shell COM object
#[cfg(target_os = "windows")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellLinkWriter;

#[cfg(target_os = "windows")]
impl ShortcutWriter for ShellLinkWriter {
    fn extension(&self) -> &'static str {
        "lnk"
    }

    fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<(), InstallerError> {
        use std::process::Command;

        // PowerShell single-quoted strings escape ' as ''
        let quote = |s: &str| format!("'{}'", s.replace('\'', "''"));
        let arguments = shortcut
            .arguments
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(" ");

        let script = format!(
            "$s = (New-Object -ComObject WScript.Shell).CreateShortcut({}); \
             $s.TargetPath = {}; $s.Arguments = {}; $s.WorkingDirectory = {}; \
             $s.Description = {}; $s.IconLocation = {}; $s.Save()",
            quote(&path.to_string_lossy()),
            quote(&shortcut.target.to_string_lossy()),
            quote(&arguments),
            quote(&shortcut.working_dir.to_string_lossy()),
            quote(&shortcut.description),
            quote(&format!("{},0", shortcut.target.to_string_lossy())),
        );

        let powershell =
            which::which("powershell").unwrap_or_else(|_| PathBuf::from("powershell.exe"));
        let output = Command::new(powershell)
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(&script)
            .output()
            .map_err(|e| InstallerError::shortcut(path, format!("failed to run PowerShell: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(InstallerError::shortcut(path, stderr.trim()));
        }

        Ok(())
    }
}

/// Native writer for the running platform
pub fn platform_writer() -> Box<dyn ShortcutWriter> {
    #[cfg(target_os = "windows")]
    {
        Box::new(ShellLinkWriter)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(DesktopEntryWriter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::manifest::fixtures::manifest;
    use tempfile::TempDir;

    fn plan(selection: &TaskSelection, root: &Path) -> Vec<Shortcut> {
        let folders = KnownFolders::under_root(root);
        let install_dir = root.join("programs").join("VoiceReplacer");
        plan_shortcuts(
            &manifest(),
            &folders,
            selection,
            &install_dir,
            &install_dir.join("unins000.exe"),
        )
    }

    fn kinds(shortcuts: &[Shortcut]) -> Vec<ShortcutKind> {
        shortcuts.iter().map(|s| s.kind).collect()
    }

    #[test]
    fn start_menu_entries_are_unconditional() {
        let m = manifest();
        let none = TaskSelection::from_ids(&m, Vec::<String>::new()).expect("empty");
        assert_eq!(
            kinds(&plan(&none, Path::new("/r"))),
            vec![ShortcutKind::StartMenu, ShortcutKind::StartMenuUninstall]
        );
    }

    #[test]
    fn optional_shortcuts_follow_tasks() {
        let m = manifest();

        let defaults = TaskSelection::defaults(&m);
        assert_eq!(
            kinds(&plan(&defaults, Path::new("/r"))),
            vec![
                ShortcutKind::StartMenu,
                ShortcutKind::StartMenuUninstall,
                ShortcutKind::Startup
            ]
        );

        let both = TaskSelection::from_ids(&m, [DESKTOP_ICON, STARTUP_ICON]).expect("ids");
        let shortcuts = plan(&both, Path::new("/r"));
        assert!(kinds(&shortcuts).contains(&ShortcutKind::Desktop));
        let desktop = shortcuts
            .iter()
            .find(|s| s.kind == ShortcutKind::Desktop)
            .expect("desktop shortcut");
        assert_eq!(desktop.dir, Path::new("/r").join("desktop"));
    }

    #[test]
    fn uninstall_entry_targets_the_uninstaller() {
        let m = manifest();
        let shortcuts = plan(&TaskSelection::defaults(&m), Path::new("/r"));
        let uninstall = &shortcuts[1];
        assert_eq!(uninstall.file_stem, "Uninstall VoiceReplacer");
        assert!(uninstall.target.ends_with("unins000.exe"));
        assert_eq!(uninstall.arguments, vec!["uninstall".to_string()]);
    }

    #[test]
    fn desktop_entries_are_written_with_quoted_exec() {
        let tmp = TempDir::new().expect("tempdir");
        let m = manifest();
        let shortcuts = plan(&TaskSelection::defaults(&m), tmp.path());

        let created = write_shortcuts(&DesktopEntryWriter, &shortcuts).expect("write");
        assert_eq!(created.len(), shortcuts.len());
        for path in &created {
            assert!(path.is_file(), "{} missing", path.display());
        }

        let uninstall = fs::read_to_string(&created[1]).expect("read");
        assert!(uninstall.starts_with("[Desktop Entry]\n"));
        assert!(uninstall.contains("Name=Uninstall VoiceReplacer\n"));
        assert!(uninstall.contains("unins000.exe\" \"uninstall\"\n"));
    }

    #[test]
    fn exec_arguments_escape_shell_specials() {
        assert_eq!(quote_exec_arg("a b"), "\"a b\"");
        assert_eq!(quote_exec_arg("$HOME\"x"), r#""\\$HOME\\"x""#);
        assert_eq!(quote_exec_arg(r"C:\apps"), r#""C:\\\\apps""#);
        assert_eq!(quote_exec_arg("a`b"), r#""a\\`b""#);
    }

    struct FailingWriter;

    impl ShortcutWriter for FailingWriter {
        fn extension(&self) -> &'static str {
            "lnk"
        }

        fn write(&self, path: &Path, shortcut: &Shortcut) -> Result<(), InstallerError> {
            if shortcut.kind == ShortcutKind::StartMenuUninstall {
                return Err(InstallerError::shortcut(path, "disk full"));
            }
            fs::write(path, "ok").map_err(|e| InstallerError::shortcut(path, e))
        }
    }

    #[test]
    fn failure_reports_what_was_already_created() {
        let tmp = TempDir::new().expect("tempdir");
        let m = manifest();
        let shortcuts = plan(&TaskSelection::defaults(&m), tmp.path());

        let (err, created) = write_shortcuts(&FailingWriter, &shortcuts).unwrap_err();
        assert!(matches!(err, InstallerError::Shortcut { .. }));
        assert_eq!(created.len(), 1);
        assert!(created[0].is_file());
    }
}
