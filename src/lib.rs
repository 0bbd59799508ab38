//! cachepack - offline npm cache builder
//!
//! Installs a list of packages through a local registry proxy, then bundles
//! the proxy's storage into a zip archive that can seed an offline registry.

pub mod cli;
pub mod config;
pub mod error;
pub mod packages;
pub mod pipeline;
pub mod runlog;
pub mod ui;

pub use error::{CachepackError, CachepackResult};
