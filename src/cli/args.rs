//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// cachepack - build an offline npm cache archive
///
/// Installs packages through a local registry proxy and zips whatever the
/// proxy stored, so the archive can seed an offline registry later.
#[derive(Parser, Debug)]
#[command(name = "cachepack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CACHEPACK_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install packages through the registry proxy and archive its cache
    Install(InstallArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Print shell completions to stdout
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Package specs to install (e.g. `left-pad`, `react@18`)
    pub packages: Vec<String>,

    /// Read additional package specs from a file, one per line
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Directory the archive is written to (default: from config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Registry storage directory to archive (default: from config)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Registry proxy configuration file (default: from config)
    #[arg(long)]
    pub registry_config: Option<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
