//! Package lists
//!
//! A package list is an ordered sequence of specifiers in the order the
//! caller wants them installed. Duplicates are kept and installed again.

use crate::error::{CachepackError, CachepackResult};
use std::fmt;
use std::path::Path;

/// One package to install, e.g. `left-pad` or `react@18.2.0`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageSpec(String);

impl PackageSpec {
    pub fn new(spec: impl Into<String>) -> Self {
        Self(spec.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageSpec {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageSpec {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Parse a newline-delimited list: one trimmed entry per line, blank lines skipped
pub fn parse_package_list(text: &str) -> Vec<PackageSpec> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PackageSpec::from)
        .collect()
}

/// Read and parse a package list file
pub async fn load_package_file(path: &Path) -> CachepackResult<Vec<PackageSpec>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CachepackError::PackageListRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(parse_package_list(&text))
}
