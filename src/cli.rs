use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::install::PrivilegeLevel;

#[derive(Parser, Debug)]
#[command(version, about = "VoiceReplacer setup")]
pub struct Args {
    /// Installer configuration to use instead of the embedded one
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Sub‑commands (install if omitted)
    #[command(subcommand)]
    pub sub: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Install or upgrade the application
    Install(InstallArgs),
    /// Re-copy the application and re-create its shortcuts
    Repair(RepairArgs),
    /// Remove the application
    Uninstall {
        /// No confirmation
        #[arg(long, alias = "unattended")]
        silent: bool,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Report whether the application is installed (exit 0 = fully installed)
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Print the effective installer configuration
    Manifest,
    /// Build the distributable setup archive
    Package(PackageArgs),
    /// Remove build and dist output directories
    Clean {
        /// Project root containing build/ and dist/
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
}

/// Which install to operate on
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Install directory or token, e.g. `{autopf}\VoiceReplacer`
    #[arg(long)]
    pub dir: Option<String>,

    #[arg(long, value_enum)]
    pub scope: Option<Scope>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct InstallArgs {
    /// Application binary to install (default: next to this setup program)
    #[arg(long)]
    pub binary: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// No wizard, no post-install prompt, no launch
    #[arg(long, alias = "unattended")]
    pub silent: bool,

    /// Comma-separated task ids to enable, e.g. `desktopicon,startupicon`
    #[arg(long, value_delimiter = ',', conflicts_with = "no_tasks")]
    pub tasks: Option<Vec<String>>,

    /// Enable no optional tasks
    #[arg(long)]
    pub no_tasks: bool,

    /// Do not start the application after installing
    #[arg(long)]
    pub no_launch: bool,

    /// Show what would be installed without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RepairArgs {
    #[arg(long)]
    pub binary: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PackageArgs {
    /// Built application binary
    #[arg(long)]
    pub binary: PathBuf,

    /// Setup binary to bundle (default: this program)
    #[arg(long)]
    pub setup: Option<PathBuf>,

    #[arg(long, default_value = "dist")]
    pub out: PathBuf,

    /// Version override
    #[arg(long)]
    pub version: Option<String>,

    /// pyproject.toml or Cargo.toml to read the version from
    #[arg(long)]
    pub project: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    Machine,
}

impl From<Scope> for PrivilegeLevel {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::User => PrivilegeLevel::PerUser,
            Scope::Machine => PrivilegeLevel::PerMachine,
        }
    }
}
