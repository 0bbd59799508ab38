//! Install command - build a cache archive for a list of packages

use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::{CachepackError, CachepackResult};
use crate::packages::{load_package_file, PackageSpec};
use crate::pipeline::{FanOut, Pipeline, PipelineConfig, SharedReporter};
use crate::runlog::RunLog;
use crate::ui::{self, ConsoleReporter, UiContext};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> CachepackResult<()> {
    let packages = collect_packages(&args).await?;
    let config = apply_overrides(config, &args);
    let pipeline_config = PipelineConfig::from_config(&config);
    debug!("Pipeline config: {:?}", pipeline_config);

    let ctx = UiContext::detect();
    ui::intro(&ctx, "cachepack");

    let console = Arc::new(ConsoleReporter::new(ctx.clone()));
    let run_log = Arc::new(RunLog::new(&config));
    run_log.event(
        "run.started",
        serde_json::json!({
            "packages": packages.iter().map(PackageSpec::as_str).collect::<Vec<_>>(),
            "archive": pipeline_config.archive_path,
        }),
    );

    let console_sink: SharedReporter = console.clone();
    let log_sink: SharedReporter = run_log.clone();
    let reporter: SharedReporter = Arc::new(FanOut::new(vec![console_sink, log_sink]));

    let mut pipeline = Pipeline::new(pipeline_config, reporter);
    let result = tokio::select! {
        result = pipeline.run(&packages) => result,
        _ = tokio::signal::ctrl_c() => Err(CachepackError::Interrupted),
    };

    run_log.event(
        "run.finished",
        serde_json::json!({
            "outcome": run_outcome(&result),
            "state": pipeline.state().to_string(),
            "ok": result.is_ok(),
            "errors": console.error_count(),
        }),
    );
    run_log.finish().await;

    match result {
        Ok(path) => {
            info!("Archive ready at {}", path.display());
            Ok(())
        }
        Err(e) => {
            console.fail(&format!("Cache install stopped while {}", pipeline.state()));
            Err(e)
        }
    }
}

/// How a run ended, for the run log. An interrupted run never reaches a
/// terminal pipeline state, so its state alone cannot tell.
fn run_outcome(result: &CachepackResult<PathBuf>) -> &'static str {
    match result {
        Ok(_) => "complete",
        Err(CachepackError::Interrupted) => "interrupted",
        Err(_) => "failed",
    }
}

/// Positional packages first, then the package file, in order
async fn collect_packages(args: &InstallArgs) -> CachepackResult<Vec<PackageSpec>> {
    let mut packages: Vec<PackageSpec> = args
        .packages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(PackageSpec::from)
        .collect();

    if let Some(ref file) = args.file {
        let from_file = load_package_file(file).await?;
        debug!("Read {} packages from {}", from_file.len(), file.display());
        packages.extend(from_file);
    }

    if packages.is_empty() {
        return Err(CachepackError::NoPackages);
    }
    Ok(packages)
}

fn apply_overrides(config: &Config, args: &InstallArgs) -> Config {
    let mut config = config.clone();
    if let Some(ref dir) = args.output {
        config.storage.output_dir = dir.clone();
    }
    if let Some(ref dir) = args.cache_dir {
        config.storage.cache_dir = dir.clone();
    }
    if let Some(ref path) = args.registry_config {
        config.registry.config_path = path.clone();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(packages: &[&str], file: Option<PathBuf>) -> InstallArgs {
        InstallArgs {
            packages: packages.iter().map(|s| s.to_string()).collect(),
            file,
            output: None,
            cache_dir: None,
            registry_config: None,
        }
    }

    #[tokio::test]
    async fn merges_positional_and_file_packages() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("packages.txt");
        std::fs::write(&file, "react@18\n\n  lodash  \n").unwrap();

        let packages = collect_packages(&args(&["left-pad", " "], Some(file)))
            .await
            .unwrap();
        let names: Vec<&str> = packages.iter().map(PackageSpec::as_str).collect();
        assert_eq!(names, vec!["left-pad", "react@18", "lodash"]);
    }

    #[tokio::test]
    async fn nothing_to_install_is_an_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "\n   \n").unwrap();

        let err = collect_packages(&args(&[], Some(file))).await.unwrap_err();
        assert!(matches!(err, CachepackError::NoPackages));
    }

    #[tokio::test]
    async fn missing_package_file_is_reported() {
        let err = collect_packages(&args(&["a"], Some(PathBuf::from("/nonexistent/pkgs"))))
            .await
            .unwrap_err();
        assert!(matches!(err, CachepackError::PackageListRead { .. }));
    }

    #[test]
    fn outcome_tells_interrupts_from_failures() {
        assert_eq!(run_outcome(&Ok(PathBuf::from("storage.zip"))), "complete");
        assert_eq!(run_outcome(&Err(CachepackError::Interrupted)), "interrupted");
        assert_eq!(run_outcome(&Err(CachepackError::NoPackages)), "failed");
    }

    #[test]
    fn overrides_replace_config_paths() {
        let mut install = args(&["a"], None);
        install.output = Some(PathBuf::from("dist"));
        install.cache_dir = Some(PathBuf::from("/tmp/storage"));
        install.registry_config = Some(PathBuf::from("verdaccio.yaml"));

        let config = apply_overrides(&Config::default(), &install);
        assert_eq!(config.storage.output_dir, PathBuf::from("dist"));
        assert_eq!(config.storage.cache_dir, PathBuf::from("/tmp/storage"));
        assert_eq!(config.registry.config_path, PathBuf::from("verdaccio.yaml"));
        assert_eq!(config.storage.archive_name, "storage.zip");
    }
}
