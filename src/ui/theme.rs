//! cliclack theme for pipeline runs

use cliclack::ThemeState;
use console::{style, Style};

/// Spinner frames shared by step spinners and the install bar
pub(crate) const SPINNER_TICKS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

/// Fill characters shared by every progress bar
pub(crate) const BAR_CHARS: &str = "━╸─";

/// Theme for a cache run.
///
/// A run that stops with an error is red, an interrupted run is yellow, and
/// finished steps fade so the running step stands out.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineTheme;

impl cliclack::Theme for PipelineTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Style::new().blue(),
            ThemeState::Submit => Style::new().dim(),
            ThemeState::Cancel => Style::new().yellow(),
            ThemeState::Error(_) => Style::new().red(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Submit => Style::new().green(),
            ThemeState::Cancel => Style::new().yellow().bold(),
            ThemeState::Error(_) => Style::new().red().bold(),
            ThemeState::Active => Style::new().blue().bold(),
        }
    }

    fn error_symbol(&self) -> String {
        style("✗").red().bold().to_string()
    }

    fn remark_symbol(&self) -> String {
        style("│").dim().to_string()
    }

    fn spinner_chars(&self) -> String {
        SPINNER_TICKS.to_string()
    }

    fn progress_chars(&self) -> String {
        BAR_CHARS.to_string()
    }
}

pub fn init_theme() {
    cliclack::set_theme(PipelineTheme);
}
