//! Pipeline state machine

use std::fmt;

/// Where a pipeline run currently is.
///
/// Runs move strictly forward through the variants in declaration order.
/// `InstallingPackages` may repeat with a growing index, and any
/// non-terminal state may jump to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    CleaningCache,
    RemovingStaleArtifacts,
    StartingRegistry,
    InstallingPackages { index: usize },
    StoppingRegistry,
    Archiving,
    Finalizing,
    Complete,
    Failed,
}

impl PipelineState {
    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::CleaningCache => 1,
            Self::RemovingStaleArtifacts => 2,
            Self::StartingRegistry => 3,
            Self::InstallingPackages { .. } => 4,
            Self::StoppingRegistry => 5,
            Self::Archiving => 6,
            Self::Finalizing => 7,
            Self::Complete | Self::Failed => 8,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_advance_to(&self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed) => true,
            (Self::InstallingPackages { index: a }, Self::InstallingPackages { index: b }) => b > *a,
            (Self::Finalizing, Self::Complete) => true,
            (_, Self::Complete) => false,
            _ => next.rank() == self.rank() + 1 || self.skips_install_to(next),
        }
    }

    /// An empty package list goes straight from booting to stopping the registry
    fn skips_install_to(&self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::StartingRegistry, Self::StoppingRegistry)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::CleaningCache => write!(f, "cleaning cache"),
            Self::RemovingStaleArtifacts => write!(f, "removing stale artifacts"),
            Self::StartingRegistry => write!(f, "starting registry"),
            Self::InstallingPackages { index } => write!(f, "installing package #{}", index + 1),
            Self::StoppingRegistry => write!(f, "stopping registry"),
            Self::Archiving => write!(f, "archiving"),
            Self::Finalizing => write!(f, "finalizing"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
