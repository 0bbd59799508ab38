//! Install-cache pipeline
//!
//! Drives an npm-compatible package manager through a local registry proxy
//! and bundles whatever the proxy cached into a single archive:
//!
//! ```text
//! clear npm cache -> delete stale store/archive -> boot registry
//!   -> install each package -> stop registry -> zip store -> delete store
//! ```
//!
//! Every step is awaited before the next starts, so all messages from one
//! step reach the [`Reporter`] before the next step's first message.

mod archive;
mod install;
mod message;
mod orchestrator;
mod process;
mod registry;
mod reporter;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use archive::{ArchiveReport, Archiver};
pub use install::{InstallLoop, InstallSummary, PackageManager};
pub use message::{InstallStep, MessageLevel, MessageSource, PipelineMessage};
pub use orchestrator::{install_cache, Pipeline, PipelineConfig};
pub use process::{
    ManagedProcess, OutputLine, OutputStream, ProcessEvent, ProcessExit, ProcessSpec,
    ProcessState,
};
pub use registry::{MarkerProbe, ReadinessProbe, RegistryHandle, RegistrySupervisor};
pub use reporter::{FanOut, Reporter, SharedReporter};
pub use state::PipelineState;

use std::io;
use std::path::Path;

/// Forward one line of process output: stdout as Minor, stderr as Error.
///
/// Whitespace-only lines are dropped.
pub(crate) fn relay_output(reporter: &dyn Reporter, source: MessageSource, line: &OutputLine) {
    let text = line.text.trim_end();
    if text.trim().is_empty() {
        return;
    }
    let level = match line.stream {
        OutputStream::Stdout => MessageLevel::Minor,
        OutputStream::Stderr => MessageLevel::Error,
    };
    reporter.emit(level, source, text);
}

/// Remove a file or directory tree. Returns `Ok(false)` if nothing was there.
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let removed = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match removed {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
