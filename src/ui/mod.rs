//! Terminal UI
//!
//! Uses `cliclack` and `indicatif` for spinners and progress bars, with
//! automatic fallback to plain line output in CI and non-interactive
//! environments.

mod context;
mod output;
mod progress;
mod reporter;
mod theme;

pub use context::UiContext;
pub use output::{intro, key_value, outro_error, outro_success, remark, step_error, step_ok};
pub use progress::{InstallProgress, TaskSpinner};
pub use reporter::ConsoleReporter;
pub use theme::{init_theme, PipelineTheme};
