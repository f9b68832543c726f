//! Shared styling utilities for console output.

use console::Style;

use compsync_core::SyncState;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Colored label for a terminal run state.
pub fn state(state: SyncState) -> String {
    let style = match state {
        SyncState::Done => Style::new().green().bold(),
        SyncState::PartialFailure => Style::new().yellow().bold(),
        _ => Style::new().dim(),
    };
    style.apply_to(state.to_string()).to_string()
}
