//! Transfer spinner.

use std::cell::RefCell;
use std::time::Duration;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use compsync_core::remote::{ProgressReporter, TransferProgress};

use crate::style;

/// Shows one spinner per file while it downloads.
#[derive(Default)]
pub struct SpinnerReporter {
    current: RefCell<Option<ProgressBar>>,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn spinner(filename: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
            spinner.set_style(
                template.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.set_message(format!("Downloading {}...", filename));
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

impl ProgressReporter for SpinnerReporter {
    fn on_progress(&self, progress: &TransferProgress) {
        let mut current = self.current.borrow_mut();
        let spinner = current.get_or_insert_with(|| Self::spinner(&progress.filename));
        spinner.set_message(format!(
            "Downloading {} ({})",
            progress.filename,
            HumanBytes(progress.bytes_written)
        ));
    }

    fn on_finish(&self, progress: &TransferProgress, success: bool) {
        if let Some(spinner) = self.current.borrow_mut().take() {
            spinner.finish_and_clear();
        }
        if success {
            eprintln!(
                "{} {}",
                style::success(&progress.filename),
                style::dim(&HumanBytes(progress.bytes_written).to_string())
            );
        } else {
            eprintln!("{}", style::error(&progress.filename));
        }
    }
}
