//! Error types for cachepack
//!
//! All modules use `CachepackResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for cachepack operations
pub type CachepackResult<T> = Result<T, CachepackError>;

/// All errors that can occur in cachepack
#[derive(Error, Debug)]
pub enum CachepackError {
    // Registry errors
    #[error("Registry proxy failed to boot: {reason}")]
    RegistryBoot { reason: String },

    #[error("Registry proxy did not report readiness within {timeout:?}")]
    RegistryBootTimeout { timeout: Duration },

    // Archive errors
    #[error("Failed to write archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // Package list errors
    #[error("No packages to install")]
    NoPackages,

    #[error("Failed to read package list {path}: {source}")]
    PackageListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Interrupted")]
    Interrupted,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CachepackError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this error aborts a pipeline run (as opposed to being reported and skipped)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RegistryBoot { .. } | Self::RegistryBootTimeout { .. } | Self::Archive { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RegistryBoot { .. } => {
                Some("Check registry.program and registry.ready_marker in the config (cachepack config show)")
            }
            Self::RegistryBootTimeout { .. } => {
                Some("Raise registry.boot_timeout_secs, or set it to 0 to wait indefinitely")
            }
            Self::NoPackages => Some("Pass package names as arguments or use --file <packages>"),
            Self::CommandFailed { .. } => Some("Is the program installed and on PATH?"),
            Self::Interrupted => Some("The registry proxy was stopped; rerun to build the archive"),
            _ => None,
        }
    }
}
