//! Shared fixtures for pipeline tests

use super::message::PipelineMessage;
use super::reporter::SharedReporter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Reporter that records every message
pub(crate) fn collector() -> (SharedReporter, Arc<Mutex<Vec<PipelineMessage>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reporter: SharedReporter =
        Arc::new(move |msg: PipelineMessage| sink.lock().unwrap().push(msg));
    (reporter, seen)
}

/// Write a shell script to run as `sh <path>` (avoids exec'ing a file just written)
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// A stand-in package manager.
///
/// `cache clean` succeeds quietly. `install <pkg>` appends the package to
/// `installs.log`, refuses to run concurrently with itself, writes a tarball
/// stub into `cache_dir/<pkg>/`, and fails with a 404 for any package whose
/// name starts with `broken`.
pub(crate) fn fake_npm(dir: &Path, cache_dir: &Path) -> PathBuf {
    let log = dir.join("installs.log");
    let lock = dir.join("install.lock");
    let body = format!(
        r#"
case "$1" in
  cache)
    echo "npm WARN using --force Recommended protections disabled."
    exit 0
    ;;
  install)
    if [ -e '{lock}' ]; then echo "CONCURRENT $2" >> '{log}'; fi
    touch '{lock}'
    echo "$2 $3 $4 $5" >> '{log}'
    sleep 0.05
    rm -f '{lock}'
    case "$2" in
      broken*)
        echo "npm ERR! 404 Not Found - GET $4$2" >&2
        exit 1
        ;;
    esac
    mkdir -p '{cache}/'"$2"
    echo stub > '{cache}/'"$2"'/package.tgz'
    echo "added 1 package in 0.1s"
    exit 0
    ;;
esac
exit 64
"#,
        lock = lock.display(),
        log = log.display(),
        cache = cache_dir.display(),
    );
    write_script(dir, "npm.sh", &body)
}

/// Lines recorded by [`fake_npm`]
pub(crate) fn recorded_installs(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("installs.log"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// A stand-in registry proxy that records its pid, prints `marker` and then idles
pub(crate) fn fake_registry(dir: &Path, marker: &str) -> PathBuf {
    let body = format!(
        "echo $$ > '{pid}'\necho ' warn --- config file - $2'\necho ' warn --- {marker}'\nexec sleep 30\n",
        pid = dir.join("registry.pid").display(),
    );
    write_script(dir, "registry.sh", &body)
}

/// Whether the process recorded by [`fake_registry`] still exists
#[cfg(unix)]
pub(crate) fn registry_alive(dir: &Path) -> bool {
    let pid: libc::pid_t = std::fs::read_to_string(dir.join("registry.pid"))
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    process_alive(pid)
}

/// Whether `pid` exists and is not a zombie waiting to be reaped
#[cfg(unix)]
pub(crate) fn process_alive(pid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only checks for existence
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    // Orphans killed with the group linger as zombies until init reaps them
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Poll until `pid` is gone, for up to two seconds
#[cfg(unix)]
pub(crate) async fn wait_until_gone(pid: libc::pid_t) -> bool {
    for _ in 0..100 {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

/// Poll for a pid written by a test script
#[cfg(unix)]
pub(crate) async fn read_pid_file(path: &Path) -> i32 {
    for _ in 0..100 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("no pid written to {}", path.display());
}
