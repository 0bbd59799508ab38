//! Sequential package installs against the local registry

use super::message::{InstallStep, MessageSource};
use super::process::{ManagedProcess, ProcessSpec};
use super::relay_output;
use super::reporter::SharedReporter;
use crate::config::schema::PackageManagerConfig;
use crate::packages::PackageSpec;
use tracing::{debug, warn};

/// How to invoke the package manager
#[derive(Debug, Clone)]
pub struct PackageManager {
    program: String,
    args: Vec<String>,
    install_flags: Vec<String>,
    clean_args: Vec<String>,
}

impl PackageManager {
    pub fn from_config(config: &PackageManagerConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            install_flags: config.install_flags.clone(),
            clean_args: config.clean_args.clone(),
        }
    }

    /// `<program> <args..> install <package> --registry <url> <flags..>`
    pub fn install_command(&self, package: &PackageSpec, registry_url: &str) -> ProcessSpec {
        ProcessSpec::new(&self.program)
            .args(self.args.iter().cloned())
            .args(["install", package.as_str(), "--registry", registry_url])
            .args(self.install_flags.iter().cloned())
    }

    /// `<program> <args..> <clean_args..>`
    pub fn clean_command(&self) -> ProcessSpec {
        ProcessSpec::new(&self.program)
            .args(self.args.iter().cloned())
            .args(self.clean_args.iter().cloned())
    }
}

/// Outcome of an install loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub total: usize,
    pub failed: Vec<PackageSpec>,
}

impl InstallSummary {
    pub fn succeeded(&self) -> usize {
        self.total - self.failed.len()
    }
}

/// Installs packages one at a time, one process each
pub struct InstallLoop {
    package_manager: PackageManager,
    registry_url: String,
}

impl InstallLoop {
    pub fn new(package_manager: PackageManager, registry_url: impl Into<String>) -> Self {
        Self {
            package_manager,
            registry_url: registry_url.into(),
        }
    }

    /// Install every package in order.
    ///
    /// `on_advance` is called with each index before its install starts. A
    /// package that fails to spawn or exits non-zero is reported and the loop
    /// moves on; it never aborts the run.
    pub async fn run(
        &self,
        packages: &[PackageSpec],
        reporter: &SharedReporter,
        mut on_advance: impl FnMut(usize),
    ) -> InstallSummary {
        let total = packages.len();
        let mut failed = Vec::new();

        for (index, package) in packages.iter().enumerate() {
            on_advance(index);
            reporter.install_started(InstallStep {
                position: index + 1,
                total,
                package: package.to_string(),
            });

            if !self.install_one(package, reporter).await {
                failed.push(package.clone());
            }
        }

        let mut summary = format!("Finished installing {} packages.", total);
        if !failed.is_empty() {
            summary.push_str(&format!(" {} failed.", failed.len()));
        }
        reporter.major(&summary);

        InstallSummary { total, failed }
    }

    /// Run one install to completion. Returns whether it succeeded.
    async fn install_one(&self, package: &PackageSpec, reporter: &SharedReporter) -> bool {
        let spec = self
            .package_manager
            .install_command(package, &self.registry_url);

        let mut process = match ManagedProcess::spawn(&spec) {
            Ok(process) => process,
            Err(e) => {
                warn!("Could not start install of {}: {}", package, e);
                reporter.error(
                    MessageSource::Pipeline,
                    &format!("Could not start `{}`: {}", spec, e),
                );
                return false;
            }
        };

        let exit = process
            .run_to_exit(|line| relay_output(reporter.as_ref(), MessageSource::PackageManager, &line))
            .await;

        match exit {
            Ok(exit) if exit.success() => {
                debug!("Installed {}", package);
                true
            }
            Ok(exit) => {
                reporter.error(
                    MessageSource::Pipeline,
                    &format!("Install of {} failed with {}", package, exit),
                );
                false
            }
            Err(e) => {
                reporter.error(
                    MessageSource::Pipeline,
                    &format!("Lost track of install of {}: {}", package, e),
                );
                false
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::message::MessageLevel;
    use crate::pipeline::testing::{collector, fake_npm, recorded_installs};
    use tempfile::TempDir;

    const URL: &str = "http://localhost:4873/";

    fn fake_manager(script: &std::path::Path) -> PackageManager {
        PackageManager::from_config(&PackageManagerConfig {
            program: "sh".to_string(),
            args: vec![script.display().to_string()],
            ..PackageManagerConfig::default()
        })
    }

    fn specs(names: &[&str]) -> Vec<PackageSpec> {
        names.iter().map(|n| PackageSpec::from(*n)).collect()
    }

    #[test]
    fn install_command_points_at_registry() {
        let pm = PackageManager::from_config(&PackageManagerConfig {
            program: "npm".to_string(),
            ..PackageManagerConfig::default()
        });
        let spec = pm.install_command(&PackageSpec::from("left-pad"), URL);
        assert_eq!(
            spec.to_string(),
            "npm install left-pad --registry http://localhost:4873/ --no-save"
        );
        assert_eq!(pm.clean_command().to_string(), "npm cache clean --force");
    }

    #[tokio::test]
    async fn installs_each_package_in_order_one_at_a_time() {
        let temp = TempDir::new().unwrap();
        let script = fake_npm(temp.path(), &temp.path().join("storage"));
        let (reporter, seen) = collector();
        let mut advanced = Vec::new();

        let summary = InstallLoop::new(fake_manager(&script), URL)
            .run(&specs(&["a", "b", "a"]), &reporter, |i| advanced.push(i))
            .await;

        assert_eq!(summary.total, 3);
        assert!(summary.failed.is_empty());
        assert_eq!(advanced, vec![0, 1, 2]);

        let installs = recorded_installs(temp.path());
        assert_eq!(
            installs,
            vec![
                format!("a --registry {URL} --no-save"),
                format!("b --registry {URL} --no-save"),
                format!("a --registry {URL} --no-save"),
            ]
        );

        let majors: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.level() == MessageLevel::Major)
            .map(|m| m.text().to_string())
            .collect();
        assert_eq!(
            majors,
            vec![
                "Installing a (1/3)",
                "Installing b (2/3)",
                "Installing a (3/3)",
                "Finished installing 3 packages.",
            ]
        );

        let steps: Vec<(usize, usize)> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.install_step())
            .map(|s| (s.position, s.total))
            .collect();
        assert_eq!(steps, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn failed_install_is_reported_and_skipped() {
        let temp = TempDir::new().unwrap();
        let script = fake_npm(temp.path(), &temp.path().join("storage"));
        let (reporter, seen) = collector();

        let summary = InstallLoop::new(fake_manager(&script), URL)
            .run(&specs(&["broken-pkg", "ok"]), &reporter, |_| {})
            .await;

        assert_eq!(summary.failed, specs(&["broken-pkg"]));
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(recorded_installs(temp.path()).len(), 2);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|m| m.level() == MessageLevel::Error
            && m.source() == MessageSource::PackageManager
            && m.text().contains("404 Not Found")));
        assert!(seen
            .iter()
            .any(|m| m.level() == MessageLevel::Minor && m.text() == "added 1 package in 0.1s"));
        assert_eq!(
            seen.last().unwrap().text(),
            "Finished installing 2 packages. 1 failed."
        );
    }

    #[tokio::test]
    async fn empty_list_spawns_nothing() {
        let temp = TempDir::new().unwrap();
        let script = fake_npm(temp.path(), &temp.path().join("storage"));
        let (reporter, seen) = collector();

        let summary = InstallLoop::new(fake_manager(&script), URL)
            .run(&[], &reporter, |_| panic!("nothing to advance to"))
            .await;

        assert_eq!(summary, InstallSummary::default());
        assert!(recorded_installs(temp.path()).is_empty());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].text(), "Finished installing 0 packages.");
    }

    #[tokio::test]
    async fn missing_package_manager_fails_each_package() {
        let (reporter, seen) = collector();
        let pm = PackageManager::from_config(&PackageManagerConfig {
            program: "cachepack-no-such-npm".to_string(),
            ..PackageManagerConfig::default()
        });

        let summary = InstallLoop::new(pm, URL)
            .run(&specs(&["a", "b"]), &reporter, |_| {})
            .await;

        assert_eq!(summary.failed.len(), 2);
        let errors = seen
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.level() == MessageLevel::Error)
            .count();
        assert_eq!(errors, 2);
    }
}
