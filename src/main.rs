use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use voicereplacer_setup::cli::{self, Cmd, InstallArgs};
use voicereplacer_setup::config::InstallerConfig;
use voicereplacer_setup::install::runners;
use voicereplacer_setup::package;

fn main() {
    let args = cli::Args::parse();

    // Initialize logger with custom format
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    match rt.block_on(real_main(args)) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

async fn real_main(args: cli::Args) -> Result<i32> {
    let config = InstallerConfig::load(args.config.as_deref())?;

    match args.sub.unwrap_or(Cmd::Install(InstallArgs::default())) {
        Cmd::Install(install) => {
            runners::run_install(config.to_manifest()?, &install).await?;
        }
        Cmd::Repair(repair) => {
            runners::run_repair(config.to_manifest()?, &repair).await?;
        }
        Cmd::Uninstall { silent, target } => {
            runners::run_uninstall(config.to_manifest()?, silent, &target).await?;
        }
        Cmd::Status { target } => {
            let installed = runners::run_status(config.to_manifest()?, &target).await?;
            return Ok(if installed { 0 } else { 1 });
        }
        Cmd::Manifest => {
            config.to_manifest()?;
            print!("{}", config.to_toml()?);
        }
        Cmd::Package(pkg) => {
            let mut config = config;
            config.app.version = package::resolve_version(
                pkg.version.as_deref(),
                pkg.project.as_deref(),
                &config.app.version,
            )?;
            let setup = match pkg.setup {
                Some(path) => path,
                None => std::env::current_exe().context("Failed to locate setup program")?,
            };
            let out = package::create_setup_archive(&config, &pkg.binary, &setup, &pkg.out)?;
            println!("{}", out.archive.display());
            println!("{}", out.checksum_file.display());
        }
        Cmd::Clean { root } => {
            if package::clean(&root)?.is_empty() {
                info!("Nothing to clean in {}", root.display());
            }
        }
    }
    Ok(0)
}
