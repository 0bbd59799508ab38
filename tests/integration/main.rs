//! Integration tests for cachepack

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn cachepack(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("cachepack");
        cmd.env("XDG_STATE_HOME", home.path().join("state"))
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("CI", "1")
            .env_remove("CACHEPACK_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        cachepack(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("offline npm cache"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        cachepack(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("cachepack"));
    }

    #[test]
    fn config_path_honours_flag() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("custom.toml");
        cachepack(&home)
            .args(["config", "path", "-c"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        cachepack(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[registry]"))
            .stdout(predicate::str::contains("Plugin successfully loaded: audit"));
    }

    #[test]
    fn config_init_then_show_roundtrips() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("cfg").join("config.toml");

        cachepack(&home)
            .args(["config", "init", "-c"])
            .arg(&path)
            .assert()
            .success();
        assert!(path.exists());

        cachepack(&home)
            .args(["config", "show", "-c"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("storage.zip"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let home = TempDir::new().unwrap();
        let path = home.path().join("bad.toml");
        std::fs::write(&path, "[registry\nurl = 3").unwrap();

        cachepack(&home)
            .args(["config", "show", "-c"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn install_without_packages_fails() {
        let home = TempDir::new().unwrap();
        cachepack(&home)
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No packages"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn install_with_blank_package_file_fails() {
        let home = TempDir::new().unwrap();
        let list = home.path().join("packages.txt");
        std::fs::write(&list, "\n\n   \n").unwrap();

        cachepack(&home)
            .args(["install", "--file"])
            .arg(&list)
            .assert()
            .failure()
            .stderr(predicate::str::contains("No packages"));
    }

    #[test]
    fn completions_print_script() {
        let home = TempDir::new().unwrap();
        cachepack(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cachepack"));
    }
}

#[cfg(unix)]
mod install_tests {
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;
    use std::fs::File;
    use std::path::Path;
    use tempfile::TempDir;

    /// Config that points the pipeline at stand-in shell scripts
    fn write_fixture(root: &Path) -> std::path::PathBuf {
        let storage = root.join("storage");
        let npm = root.join("npm.sh");
        std::fs::write(
            &npm,
            format!(
                r#"
case "$1" in
  cache) exit 0 ;;
  install)
    case "$2" in
      broken*) echo "npm ERR! 404 Not Found - GET $4$2" >&2; exit 1 ;;
    esac
    mkdir -p '{storage}/'"$2"
    echo stub > '{storage}/'"$2"'/package.tgz'
    echo "added 1 package"
    ;;
esac
"#,
                storage = storage.display()
            ),
        )
        .unwrap();

        let registry = root.join("registry.sh");
        std::fs::write(
            &registry,
            "echo ' warn --- Plugin successfully loaded: audit'\nexec sleep 30\n",
        )
        .unwrap();

        let config = root.join("config.toml");
        std::fs::write(
            &config,
            format!(
                r#"
[general]
run_log = true

[registry]
program = "sh"
args = ["{registry}"]
boot_timeout_secs = 10

[package_manager]
program = "sh"
args = ["{npm}"]

[storage]
cache_dir = "{storage}"
output_dir = "{out}"
"#,
                registry = registry.display(),
                npm = npm.display(),
                storage = storage.display(),
                out = root.join("out").display(),
            ),
        )
        .unwrap();
        config
    }

    #[test]
    fn install_builds_archive() {
        let home = TempDir::new().unwrap();
        let config = write_fixture(home.path());

        cargo_bin_cmd!("cachepack")
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("CI", "1")
            .arg("-c")
            .arg(&config)
            .args(["install", "left-pad", "broken-pkg", "is-odd"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache created at"))
            .stdout(predicate::str::contains("404 Not Found"));

        let archive_path = home.path().join("out").join("storage.zip");
        let archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["is-odd/", "is-odd/package.tgz", "left-pad/", "left-pad/package.tgz"]
        );
        assert!(!home.path().join("storage").exists());

        // XDG_STATE_HOME only moves the state dir on Linux
        if cfg!(target_os = "linux") {
            let log_path = home.path().join("state").join("cachepack").join("runs.log");
            let log = std::fs::read_to_string(log_path).unwrap();
            let finished: serde_json::Value = log
                .lines()
                .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
                .find(|e| e["event"] == "run.finished")
                .unwrap();
            assert_eq!(finished["data"]["outcome"], "complete");
        }
    }

    #[test]
    fn install_with_nothing_cached_writes_empty_archive() {
        let home = TempDir::new().unwrap();
        let config = write_fixture(home.path());

        cargo_bin_cmd!("cachepack")
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("CI", "1")
            .arg("-c")
            .arg(&config)
            .args(["install", "broken-only"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache created at"));

        let archive_path = home.path().join("out").join("storage.zip");
        let archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 0);
    }

    #[test]
    fn install_fails_when_archive_cannot_be_written() {
        let home = TempDir::new().unwrap();
        let config = write_fixture(home.path());
        let blocker = home.path().join("blocker");
        std::fs::write(&blocker, "in the way").unwrap();

        cargo_bin_cmd!("cachepack")
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("CI", "1")
            .arg("-c")
            .arg(&config)
            .args(["install", "left-pad", "--output"])
            .arg(&blocker)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to write archive"));

        assert!(blocker.is_file());
        assert!(home.path().join("storage").join("left-pad").exists());
    }
}
