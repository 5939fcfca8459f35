//! Build-time packaging of the distributable setup archive
//!
//! `dist/<Name>-<Version>-setup.zip` holds the application binary, the setup
//! program and the `installer.toml` it was built with, so the setup program
//! finds everything it needs next to itself after extraction. A `.sha256`
//! sidecar carries the archive digest.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::info;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;

use crate::config::{CONFIG_FILE, InstallerConfig};

/// Used when a project file has no version
pub const FALLBACK_VERSION: &str = "0.1.0";

/// Files written by [`create_setup_archive`]
#[derive(Debug, Clone)]
pub struct PackageOutput {
    pub archive: PathBuf,
    pub checksum_file: PathBuf,
    pub sha256: String,
}

/// `[project].version` (pyproject) or `[package].version` (Cargo)
pub fn read_project_version(path: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let table: toml::Table = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let version = ["project", "package"].iter().find_map(|section| {
        table
            .get(*section)
            .and_then(|s| s.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    Ok(version)
}

/// `--version`, else the project file, else the configured version
pub fn resolve_version(
    flag: Option<&str>,
    project: Option<&Path>,
    configured: &str,
) -> Result<String> {
    if let Some(version) = flag {
        return Ok(version.to_string());
    }
    match project {
        Some(path) => Ok(read_project_version(path)?.unwrap_or_else(|| FALLBACK_VERSION.to_string())),
        None => Ok(configured.to_string()),
    }
}

/// Name the application binary gets inside the archive
///
/// The configured stem plus the built binary's own extension, so a Windows
/// build packaged on another host still ends in `.exe`.
fn packaged_name(stem: &str, binary: &Path) -> String {
    match binary.extension().and_then(|e| e.to_str()) {
        Some(ext) if !stem.ends_with(&format!(".{ext}")) => format!("{stem}.{ext}"),
        _ => stem.to_string(),
    }
}

fn add_file<W: Write + io::Seek>(
    zip: &mut zip::ZipWriter<W>,
    name: &str,
    source: &Path,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .with_context(|| format!("Failed to add {name} to archive"))?;
    let mut input =
        File::open(source).with_context(|| format!("Failed to open {}", source.display()))?;
    io::copy(&mut input, zip).with_context(|| format!("Failed to write {name} to archive"))?;
    Ok(())
}

/// Write the setup archive and its checksum into `out_dir`
pub fn create_setup_archive(
    config: &InstallerConfig,
    app_binary: &Path,
    setup_binary: &Path,
    out_dir: &Path,
) -> Result<PackageOutput> {
    for (what, path) in [("application", app_binary), ("setup", setup_binary)] {
        if !path.is_file() {
            bail!("{what} binary not found: {}", path.display());
        }
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let archive = out_dir.join(format!("{}-{}-setup.zip", config.app.name, config.app.version));
    let file = File::create(&archive)
        .with_context(|| format!("Failed to create {}", archive.display()))?;
    let mut zip = zip::ZipWriter::new(file);

    let executable = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);
    let data = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let app_name = packaged_name(&config.app.executable, app_binary);
    add_file(&mut zip, &app_name, app_binary, executable)?;

    let setup_name = setup_binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("{}-setup", config.app.name));
    add_file(&mut zip, &setup_name, setup_binary, executable)?;

    zip.start_file(CONFIG_FILE, data)
        .context("Failed to add installer.toml to archive")?;
    zip.write_all(config.to_toml()?.as_bytes())
        .context("Failed to write installer.toml to archive")?;

    zip.finish().context("Failed to finish archive")?;

    let (checksum_file, sha256) = write_checksum(&archive)?;
    info!("Packaged {} (sha256 {sha256})", archive.display());

    Ok(PackageOutput {
        archive,
        checksum_file,
        sha256,
    })
}

/// Write `<archive>.sha256` in `sha256sum` format
fn write_checksum(archive: &Path) -> Result<(PathBuf, String)> {
    let mut hasher = Sha256::new();
    let mut input =
        File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    io::copy(&mut input, &mut hasher).context("Failed to hash archive")?;
    let digest = hex::encode(hasher.finalize());

    let file_name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let checksum_file = archive.with_extension("zip.sha256");
    fs::write(&checksum_file, format!("{digest}  {file_name}\n"))
        .with_context(|| format!("Failed to write {}", checksum_file.display()))?;

    Ok((checksum_file, digest))
}

/// Remove `build/` and `dist/` under `root`; returns what was removed
pub fn clean(root: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in ["build", "dist"] {
        let dir = root.join(name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
            info!("Removed {}", dir.display());
            removed.push(dir);
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use tempfile::TempDir;

    fn config() -> InstallerConfig {
        InstallerConfig::embedded().expect("embedded config")
    }

    #[test]
    fn archive_contains_app_setup_and_config() {
        let tmp = TempDir::new().expect("tempdir");
        let app = tmp.path().join("VoiceReplacer.exe");
        let setup = tmp.path().join("voicereplacer-setup.exe");
        fs::write(&app, "app-bytes").expect("app");
        fs::write(&setup, "setup-bytes").expect("setup");

        let out = create_setup_archive(&config(), &app, &setup, &tmp.path().join("dist"))
            .expect("package");
        assert_eq!(
            out.archive,
            tmp.path().join("dist").join("VoiceReplacer-0.1.0-setup.zip")
        );

        let mut archive = zip::ZipArchive::new(File::open(&out.archive).expect("open"))
            .expect("read zip");
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "VoiceReplacer.exe".to_string(),
                "installer.toml".to_string(),
                "voicereplacer-setup.exe".to_string()
            ]
        );

        let mut content = String::new();
        archive
            .by_name("VoiceReplacer.exe")
            .expect("app entry")
            .read_to_string(&mut content)
            .expect("read entry");
        assert_eq!(content, "app-bytes");
    }

    #[test]
    fn extracted_setup_installs_the_packaged_version() {
        let tmp = TempDir::new().expect("tempdir");
        let app = tmp.path().join("VoiceReplacer.exe");
        let setup = tmp.path().join("voicereplacer-setup.exe");
        fs::write(&app, "app").expect("app");
        fs::write(&setup, "setup").expect("setup");

        let mut config = config();
        config.app.version = "0.4.2".to_string();
        let out = create_setup_archive(&config, &app, &setup, &tmp.path().join("dist"))
            .expect("package");

        let extracted = tmp.path().join("extracted");
        zip::ZipArchive::new(File::open(&out.archive).expect("open"))
            .expect("read zip")
            .extract(&extracted)
            .expect("extract");

        let loaded = InstallerConfig::load_beside(Some(&extracted)).expect("load");
        assert_eq!(loaded.to_manifest().expect("manifest").version, "0.4.2");
    }

    #[test]
    fn checksum_sidecar_matches_archive() {
        let tmp = TempDir::new().expect("tempdir");
        let app = tmp.path().join("VoiceReplacer");
        let setup = tmp.path().join("voicereplacer-setup");
        fs::write(&app, "app").expect("app");
        fs::write(&setup, "setup").expect("setup");

        let out = create_setup_archive(&config(), &app, &setup, &tmp.path().join("dist"))
            .expect("package");

        let digest = hex::encode(Sha256::digest(fs::read(&out.archive).expect("read")));
        assert_eq!(out.sha256, digest);
        assert_eq!(
            fs::read_to_string(&out.checksum_file).expect("sidecar"),
            format!("{digest}  VoiceReplacer-0.1.0-setup.zip\n")
        );
    }

    #[test]
    fn missing_binary_fails() {
        let tmp = TempDir::new().expect("tempdir");
        let missing = tmp.path().join("missing.exe");
        assert!(create_setup_archive(&config(), &missing, &missing, tmp.path()).is_err());
        assert!(!tmp.path().join("VoiceReplacer-0.1.0-setup.zip").exists());
    }

    #[test]
    fn version_comes_from_flag_then_project_then_config() {
        let tmp = TempDir::new().expect("tempdir");
        let pyproject = tmp.path().join("pyproject.toml");
        fs::write(&pyproject, "[project]\nname = \"voicereplacer\"\nversion = \"0.4.2\"\n")
            .expect("pyproject");
        let cargo = tmp.path().join("Cargo.toml");
        fs::write(&cargo, "[package]\nname = \"vr\"\nversion = \"1.3.0\"\n").expect("cargo");
        let bare = tmp.path().join("bare.toml");
        fs::write(&bare, "[tool.black]\nline-length = 100\n").expect("bare");

        assert_eq!(
            resolve_version(Some("9.9.9"), Some(&pyproject), "0.1.0").expect("flag"),
            "9.9.9"
        );
        assert_eq!(resolve_version(None, Some(&pyproject), "0.0.1").expect("py"), "0.4.2");
        assert_eq!(resolve_version(None, Some(&cargo), "0.0.1").expect("cargo"), "1.3.0");
        assert_eq!(
            resolve_version(None, Some(&bare), "0.0.1").expect("bare"),
            FALLBACK_VERSION
        );
        assert_eq!(resolve_version(None, None, "0.0.1").expect("config"), "0.0.1");
    }

    #[test]
    fn clean_removes_build_and_dist() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("dist").join("x")).expect("dist");
        fs::create_dir_all(tmp.path().join("build")).expect("build");
        fs::write(tmp.path().join("keep.txt"), "k").expect("keep");

        let removed = clean(tmp.path()).expect("clean");
        assert_eq!(removed.len(), 2);
        assert!(!tmp.path().join("dist").exists());
        assert!(tmp.path().join("keep.txt").exists());
        assert!(clean(tmp.path()).expect("again").is_empty());
    }

    #[test]
    fn packaged_name_keeps_binary_extension() {
        assert_eq!(packaged_name("VoiceReplacer", Path::new("out/app.exe")), "VoiceReplacer.exe");
        assert_eq!(packaged_name("VoiceReplacer", Path::new("out/app")), "VoiceReplacer");
        assert_eq!(packaged_name("VoiceReplacer.exe", Path::new("a.exe")), "VoiceReplacer.exe");
    }
}
