//! End-to-end install-cache run

use super::archive::Archiver;
use super::install::{InstallLoop, PackageManager};
use super::message::MessageSource;
use super::process::ManagedProcess;
use super::registry::RegistrySupervisor;
use super::reporter::SharedReporter;
use super::state::PipelineState;
use super::{relay_output, remove_if_exists};
use crate::config::schema::{PackageManagerConfig, RegistryConfig};
use crate::config::Config;
use crate::error::{CachepackError, CachepackResult};
use crate::packages::PackageSpec;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Everything a run needs to know about paths and external programs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Store the registry proxy writes into; archived, then deleted
    pub cache_dir: PathBuf,
    /// Where the archive is written
    pub archive_path: PathBuf,
    pub registry: RegistryConfig,
    pub package_manager: PackageManagerConfig,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.storage.cache_dir.clone(),
            archive_path: config.storage.output_dir.join(&config.storage.archive_name),
            registry: config.registry.clone(),
            package_manager: config.package_manager.clone(),
        }
    }

    /// Keep the archive file name but write it into `dir`
    pub fn with_output_dir(mut self, dir: &Path) -> Self {
        let name = self
            .archive_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("storage.zip"));
        self.archive_path = dir.join(name);
        self
    }

    pub fn registry_config_path(&self) -> &Path {
        &self.registry.config_path
    }
}

/// One install-cache run.
///
/// A `Pipeline` is single-use: [`run`](Self::run) drives it from `Idle` to
/// `Complete` or `Failed` and cannot be repeated.
pub struct Pipeline {
    config: PipelineConfig,
    reporter: SharedReporter,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, reporter: SharedReporter) -> Self {
        Self {
            config,
            reporter,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build the cache for `packages` and return the archive path.
    ///
    /// Only a registry that never becomes ready and a failed archive write
    /// abort the run. Everything else is reported and skipped.
    pub async fn run(&mut self, packages: &[PackageSpec]) -> CachepackResult<PathBuf> {
        if self.state != PipelineState::Idle {
            return Err(CachepackError::Internal(format!(
                "pipeline already ran (state: {})",
                self.state
            )));
        }

        info!("Building cache for {} packages", packages.len());
        let result = self.drive(packages).await;

        match &result {
            Ok(path) => {
                info!("Cache written to {}", path.display());
                advance(&mut self.state, PipelineState::Complete);
            }
            Err(e) => {
                warn!("Pipeline failed during {}: {}", self.state, e);
                advance(&mut self.state, PipelineState::Failed);
            }
        }
        result
    }

    async fn drive(&mut self, packages: &[PackageSpec]) -> CachepackResult<PathBuf> {
        let package_manager = PackageManager::from_config(&self.config.package_manager);
        let archiver = Archiver::new(&self.config.cache_dir, &self.config.archive_path);

        self.reporter.major("Starting cache install.");

        advance(&mut self.state, PipelineState::CleaningCache);
        self.clean_package_cache(&package_manager).await;

        advance(&mut self.state, PipelineState::RemovingStaleArtifacts);
        self.remove_stale_artifacts().await;

        advance(&mut self.state, PipelineState::StartingRegistry);
        self.reporter.major("Booting registry proxy.");
        let supervisor = RegistrySupervisor::from_config(&self.config.registry);
        let mut registry = match supervisor.start(&self.reporter).await {
            Ok(handle) => handle,
            Err(e) => {
                self.reporter.error(MessageSource::Registry, &e.to_string());
                return Err(e);
            }
        };

        self.reporter.major("Starting package installs.");
        let install_loop = InstallLoop::new(package_manager, &self.config.registry.url);
        let state = &mut self.state;
        let summary = install_loop
            .run(packages, &self.reporter, |index| {
                advance(state, PipelineState::InstallingPackages { index })
            })
            .await;
        debug!(
            "Installed {}/{} packages",
            summary.succeeded(),
            summary.total
        );

        advance(&mut self.state, PipelineState::StoppingRegistry);
        self.reporter.major("Stopping registry proxy.");
        if let Err(e) = registry.stop().await {
            self.reporter.error(
                MessageSource::Registry,
                &format!("Could not confirm the registry exited: {}", e),
            );
        }
        drop(registry);

        advance(&mut self.state, PipelineState::Archiving);
        self.reporter.major("Bundling the cache into a zip file.");
        let report = match archiver.write_archive().await {
            Ok(report) => report,
            Err(e) => {
                self.reporter.error(MessageSource::Archiver, &e.to_string());
                return Err(e);
            }
        };
        self.reporter.minor(
            MessageSource::Archiver,
            &format!(
                "{} entries, {} bytes, sha256 {}",
                report.entries, report.bytes, report.sha256
            ),
        );

        advance(&mut self.state, PipelineState::Finalizing);
        self.reporter.major("Deleting temporary files.");
        if let Err(e) = archiver.remove_cache_dir().await {
            self.reporter.error(
                MessageSource::Pipeline,
                &format!("Could not delete {}: {}", archiver.cache_dir().display(), e),
            );
        }

        self.reporter
            .complete(&format!("Cache created at {}!", report.path.display()));
        Ok(report.path)
    }

    /// The package manager's own cache must be empty, or installs are served
    /// from it and never reach the registry proxy.
    async fn clean_package_cache(&self, package_manager: &PackageManager) {
        self.reporter.major("Clearing npm cache.");

        let spec = package_manager.clean_command();
        let mut process = match ManagedProcess::spawn(&spec) {
            Ok(process) => process,
            Err(e) => {
                self.reporter.error(
                    MessageSource::Pipeline,
                    &format!("Could not start `{}`: {}", spec, e),
                );
                return;
            }
        };

        let reporter = self.reporter.as_ref();
        match process
            .run_to_exit(|line| relay_output(reporter, MessageSource::PackageManager, &line))
            .await
        {
            Ok(exit) if !exit.success() => self.reporter.error(
                MessageSource::Pipeline,
                &format!("`{}` finished with {}", spec, exit),
            ),
            Ok(_) => {}
            Err(e) => self.reporter.error(MessageSource::Pipeline, &e.to_string()),
        }
    }

    async fn remove_stale_artifacts(&self) {
        self.reporter.major("Deleting old files.");

        for path in [&self.config.cache_dir, &self.config.archive_path] {
            match remove_if_exists(path).await {
                Ok(true) => debug!("Removed stale {}", path.display()),
                Ok(false) => {}
                Err(e) => self.reporter.error(
                    MessageSource::Pipeline,
                    &format!("Could not delete {}: {}", path.display(), e),
                ),
            }
        }
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal pipeline transition {} -> {}",
        state,
        next
    );
    debug!("Pipeline: {} -> {}", state, next);
    *state = next;
}

/// Build a cache archive in `output_dir` using the default configuration
pub async fn install_cache(
    packages: &[PackageSpec],
    output_dir: impl AsRef<Path>,
    reporter: SharedReporter,
) -> CachepackResult<PathBuf> {
    let config = PipelineConfig::from_config(&Config::default()).with_output_dir(output_dir.as_ref());
    Pipeline::new(config, reporter).run(packages).await
}
