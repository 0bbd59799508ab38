//! Progress indicators with CI fallback

use super::context::UiContext;
use super::theme::{BAR_CHARS, SPINNER_TICKS};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// A step spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.spinner.is_some()
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Replace the message of a running spinner. No output in plain mode.
    pub fn message(&mut self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.start(message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if !self.interactive {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress bar over the package install loop.
///
/// Fed with the loop's install steps; draws an indicatif bar in interactive
/// mode, plain lines in CI.
pub struct InstallProgress {
    bar: Option<ProgressBar>,
}

impl InstallProgress {
    pub fn new(ctx: &UiContext, total: u64) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(total);
            let template = "  {spinner:.blue} Installing  {bar:20.blue/dim} {pos}/{len} {prefix:.bold} {msg:.dim}  {elapsed:.dim}";
            let style = ProgressStyle::default_bar()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_chars(SPINNER_TICKS)
                .progress_chars(BAR_CHARS);
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar }
    }

    /// Show that install `position` (1-based) of `total` has started
    pub fn start_package(&self, position: u64, total: u64, package: &str) {
        match self.bar {
            Some(ref bar) => {
                bar.set_length(total);
                bar.set_position(position.saturating_sub(1));
                bar.set_prefix(package.to_string());
                bar.set_message(String::new());
            }
            None => println!("  [{}/{}] {}", position, total, package),
        }
    }

    /// Show a line of package manager output under the bar
    pub fn on_output(&self, line: &str) {
        if let Some(ref bar) = self.bar {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return;
            }
            bar.set_message(truncate(trimmed, 60));
        }
    }

    /// Print a line above the bar without tearing it
    pub fn println(&self, line: &str) {
        match self.bar {
            Some(ref bar) => bar.println(line),
            None => println!("{}", line),
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", head)
}
