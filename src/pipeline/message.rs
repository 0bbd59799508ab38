//! Progress messages emitted by the pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// How prominently a message should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    /// Relayed output from an external program
    Minor,
    /// A pipeline step starting or finishing
    Major,
    /// Something went wrong (recoverable or not)
    Error,
    /// The run finished and the archive exists
    Complete,
}

/// Logical origin of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSource {
    PackageManager,
    Registry,
    Pipeline,
    Archiver,
}

impl MessageSource {
    /// Short tag used when rendering
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PackageManager => "npm",
            Self::Registry => "verdaccio",
            Self::Pipeline => "cachepack",
            Self::Archiver => "archiver",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Error => write!(f, "error"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Position of one install within the install loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallStep {
    /// 1-based
    pub position: usize,
    pub total: usize,
    pub package: String,
}

/// A single observable pipeline event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
    level: MessageLevel,
    source: MessageSource,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    install_step: Option<InstallStep>,
}

impl PipelineMessage {
    pub fn new(level: MessageLevel, source: MessageSource, text: impl Into<String>) -> Self {
        Self {
            level,
            source,
            text: text.into(),
            install_step: None,
        }
    }

    /// The Major message that starts install `step`
    pub fn install_started(step: InstallStep) -> Self {
        let text = format!(
            "Installing {} ({}/{})",
            step.package, step.position, step.total
        );
        Self {
            install_step: Some(step),
            ..Self::new(MessageLevel::Major, MessageSource::Pipeline, text)
        }
    }

    /// Set only on messages that start a package install
    pub fn install_step(&self) -> Option<&InstallStep> {
        self.install_step.as_ref()
    }

    pub fn level(&self) -> MessageLevel {
        self.level
    }

    pub fn source(&self) -> MessageSource {
        self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.text)
    }
}
