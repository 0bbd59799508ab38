//! Message sinks
//!
//! A [`Reporter`] receives every [`PipelineMessage`] as it happens. There is
//! no buffering and no filtering: presentation is left entirely to the sink.

use super::message::{InstallStep, MessageLevel, MessageSource, PipelineMessage};
use std::sync::Arc;

/// Observer for pipeline messages
pub trait Reporter: Send + Sync {
    /// Deliver one message
    fn report(&self, message: PipelineMessage);

    /// Build and deliver a message
    fn emit(&self, level: MessageLevel, source: MessageSource, text: &str) {
        self.report(PipelineMessage::new(level, source, text));
    }

    fn minor(&self, source: MessageSource, text: &str) {
        self.emit(MessageLevel::Minor, source, text);
    }

    fn major(&self, text: &str) {
        self.emit(MessageLevel::Major, MessageSource::Pipeline, text);
    }

    fn error(&self, source: MessageSource, text: &str) {
        self.emit(MessageLevel::Error, source, text);
    }

    fn complete(&self, text: &str) {
        self.emit(MessageLevel::Complete, MessageSource::Pipeline, text);
    }

    fn install_started(&self, step: InstallStep) {
        self.report(PipelineMessage::install_started(step));
    }
}

/// Shared handle to a reporter, cloned into relay tasks
pub type SharedReporter = Arc<dyn Reporter>;

impl<F> Reporter for F
where
    F: Fn(PipelineMessage) + Send + Sync,
{
    fn report(&self, message: PipelineMessage) {
        self(message)
    }
}

/// Delivers each message to several reporters, in order
pub struct FanOut {
    sinks: Vec<SharedReporter>,
}

impl FanOut {
    pub fn new(sinks: Vec<SharedReporter>) -> Self {
        Self { sinks }
    }
}

impl Reporter for FanOut {
    fn report(&self, message: PipelineMessage) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.report(message.clone());
            }
            last.report(message);
        }
    }
}
