//! Bundling the cache store into a single zip file

use crate::error::{CachepackError, CachepackResult};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// What ended up in a written archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub path: PathBuf,
    /// Number of members (files and directories)
    pub entries: usize,
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the archive file
    pub sha256: String,
}

/// Writes `cache_dir` into a zip at `archive_path`.
///
/// Members are stored relative to `cache_dir`, so extracting the archive
/// into a fresh directory reproduces the store without an extra prefix.
#[derive(Debug, Clone)]
pub struct Archiver {
    cache_dir: PathBuf,
    archive_path: PathBuf,
}

impl Archiver {
    pub fn new(cache_dir: impl Into<PathBuf>, archive_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            archive_path: archive_path.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    /// Write the archive. A partially written file is removed on failure.
    pub async fn write_archive(&self) -> CachepackResult<ArchiveReport> {
        let source = self.cache_dir.clone();
        let dest = self.archive_path.clone();

        let result = tokio::task::spawn_blocking(move || write_zip(&source, &dest))
            .await
            .map_err(|e| CachepackError::Internal(format!("archive task failed: {}", e)))?;

        match result {
            Ok(report) => {
                info!(
                    "Wrote {} ({} entries, {} bytes)",
                    report.path.display(),
                    report.entries,
                    report.bytes
                );
                Ok(report)
            }
            Err(reason) => {
                let partial = tokio::fs::symlink_metadata(&self.archive_path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if partial {
                    if let Err(e) = tokio::fs::remove_file(&self.archive_path).await {
                        debug!("Could not remove partial archive: {}", e);
                    }
                }
                Err(CachepackError::Archive {
                    path: self.archive_path.clone(),
                    reason,
                })
            }
        }
    }

    /// Delete the cache directory once its contents are archived
    pub async fn remove_cache_dir(&self) -> io::Result<bool> {
        super::remove_if_exists(&self.cache_dir).await
    }
}

fn write_zip(source: &Path, dest: &Path) -> Result<ArchiveReport, String> {
    // A store that was never created means nothing was cached
    let source_exists = match std::fs::symlink_metadata(source) {
        Ok(meta) if meta.is_dir() => true,
        Ok(_) => return Err(format!("{} is not a directory", source.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(format!("reading {}: {}", source.display(), e)),
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("creating {}: {}", parent.display(), e))?;
    }

    let file = File::create(dest).map_err(|e| format!("creating file: {}", e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut entries = 0;

    let walk = WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter(|_| source_exists);
    for entry in walk {
        let entry = entry.map_err(|e| format!("walking {}: {}", source.display(), e))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| format!("{}: {}", entry.path().display(), e))?;
        let name = member_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{}/", name), options)
                .map_err(|e| format!("adding {}: {}", name, e))?;
        } else if entry.file_type().is_file() {
            zip.start_file(name.as_str(), options)
                .map_err(|e| format!("adding {}: {}", name, e))?;
            let mut input =
                File::open(entry.path()).map_err(|e| format!("reading {}: {}", name, e))?;
            io::copy(&mut input, &mut zip).map_err(|e| format!("writing {}: {}", name, e))?;
        } else {
            debug!("Skipping {} (not a regular file)", entry.path().display());
            continue;
        }
        entries += 1;
    }

    zip.finish().map_err(|e| format!("finalizing: {}", e))?;

    let (bytes, sha256) = digest_file(dest).map_err(|e| format!("hashing archive: {}", e))?;
    Ok(ArchiveReport {
        path: dest.to_path_buf(),
        entries,
        bytes,
        sha256,
    })
}

/// Zip member names always use `/`, whatever the host separator
fn member_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn digest_file(path: &Path) -> io::Result<(u64, String)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes = io::copy(&mut file, &mut hasher)?;
    Ok((bytes, hex::encode(hasher.finalize())))
}
