//! Terminal rendering of pipeline messages

use super::context::UiContext;
use super::output::{outro_error, outro_success, remark, step_error};
use super::progress::{InstallProgress, TaskSpinner};
use crate::pipeline::{MessageLevel, PipelineMessage, Reporter};
use console::style;
use std::sync::{Mutex, MutexGuard};

/// Reporter that draws the run in the terminal.
///
/// Each major step gets a spinner that is closed when the next step starts.
/// The install loop gets a progress bar instead. Relayed program output
/// updates the active spinner or bar, or is printed dimmed in plain mode.
pub struct ConsoleReporter {
    ctx: UiContext,
    state: Mutex<ConsoleState>,
}

struct ConsoleState {
    spinner: TaskSpinner,
    step: Option<String>,
    install: Option<InstallProgress>,
    errors: usize,
}

impl ConsoleState {
    fn close_step(&mut self) {
        if let Some(install) = self.install.take() {
            install.finish();
        }
        if let Some(step) = self.step.take() {
            self.spinner.stop(&step);
        }
    }
}

impl ConsoleReporter {
    pub fn new(ctx: UiContext) -> Self {
        let spinner = TaskSpinner::new(&ctx);
        Self {
            ctx,
            state: Mutex::new(ConsoleState {
                spinner,
                step: None,
                install: None,
                errors: 0,
            }),
        }
    }

    /// Number of error messages seen so far
    pub fn error_count(&self) -> usize {
        self.lock().errors
    }

    /// Close the display after the run aborted
    pub fn fail(&self, reason: &str) {
        let mut state = self.lock();
        if let Some(install) = state.install.take() {
            install.finish();
        }
        if let Some(step) = state.step.take() {
            state.spinner.stop_error(&step);
        }
        outro_error(&self.ctx, reason);
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, message: PipelineMessage) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let text = message.text();

        match message.level() {
            MessageLevel::Major => {
                if let Some(install_step) = message.install_step() {
                    if let Some(step) = state.step.take() {
                        state.spinner.stop(&step);
                    }
                    let total = install_step.total as u64;
                    let install = state
                        .install
                        .get_or_insert_with(|| InstallProgress::new(&self.ctx, total));
                    install.start_package(install_step.position as u64, total, &install_step.package);
                } else {
                    state.close_step();
                    state.spinner.start(text);
                    state.step = Some(text.to_string());
                }
            }
            MessageLevel::Minor => {
                let line = format!("[{}] {}", message.source(), text);
                if let Some(ref install) = state.install {
                    install.on_output(&line);
                } else if state.spinner.is_active() {
                    state.spinner.message(&line);
                } else {
                    remark(&self.ctx, &line);
                }
            }
            MessageLevel::Error => {
                state.errors += 1;
                let line = format!("[{}] {}", message.source(), text);
                match state.install {
                    Some(ref install) => install.println(&format!(
                        "  {} {}",
                        style("✗").red(),
                        style(&line).red()
                    )),
                    None => step_error(&self.ctx, &line),
                }
            }
            MessageLevel::Complete => {
                state.close_step();
                outro_success(&self.ctx, text);
            }
        }
    }
}
