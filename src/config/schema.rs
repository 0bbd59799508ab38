//! Configuration schema for cachepack
//!
//! Configuration is stored at `~/.config/cachepack/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// npm and verdaccio install as `.cmd` shims on Windows, which a bare name
// does not resolve to
#[cfg(windows)]
const DEFAULT_PACKAGE_MANAGER: &str = "npm.cmd";
#[cfg(not(windows))]
const DEFAULT_PACKAGE_MANAGER: &str = "npm";

#[cfg(windows)]
const DEFAULT_REGISTRY: &str = "verdaccio.cmd";
#[cfg(not(windows))]
const DEFAULT_REGISTRY: &str = "verdaccio";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Local registry proxy settings
    pub registry: RegistryConfig,

    /// Package manager invocation settings
    pub package_manager: PackageManagerConfig,

    /// Cache store and archive locations
    pub storage: StorageConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append every pipeline message to the run log
    pub run_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
            run_log: true,
        }
    }
}

/// Registry proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Program that starts the proxy
    pub program: String,

    /// Arguments placed before `--config <config_path>`
    pub args: Vec<String>,

    /// Proxy configuration file, passed as `--config <path>`
    pub config_path: PathBuf,

    /// Address every install is pointed at
    pub url: String,

    /// Output substring that signals the proxy is ready to serve
    pub ready_marker: String,

    /// Give up waiting for the marker after N seconds (0 = wait forever)
    pub boot_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_REGISTRY.to_string(),
            args: vec![],
            config_path: PathBuf::from("config.yaml"),
            url: "http://localhost:4873/".to_string(),
            ready_marker: "Plugin successfully loaded: audit".to_string(),
            boot_timeout_secs: 120,
        }
    }
}

/// Package manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerConfig {
    /// Package manager executable
    pub program: String,

    /// Arguments placed before every subcommand
    pub args: Vec<String>,

    /// Flags appended to every install (must keep the manifest untouched)
    pub install_flags: Vec<String>,

    /// Arguments that clear the package manager's own cache
    pub clean_args: Vec<String>,
}

impl Default for PackageManagerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PACKAGE_MANAGER.to_string(),
            args: vec![],
            install_flags: vec!["--no-save".to_string()],
            clean_args: vec![
                "cache".to_string(),
                "clean".to_string(),
                "--force".to_string(),
            ],
        }
    }
}

/// Cache store and archive locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory the proxy writes fetched packages to
    pub cache_dir: PathBuf,

    /// Directory the archive is written into
    pub output_dir: PathBuf,

    /// Archive file name inside `output_dir`
    pub archive_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("storage"),
            output_dir: PathBuf::from("."),
            archive_name: "storage.zip".to_string(),
        }
    }
}
