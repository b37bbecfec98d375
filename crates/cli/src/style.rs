//! Shared styling utilities for terminal output.

use comfy_table::{Cell, Color};
use console::Style;

use codeowners_sync_core::reconciler::PlanAction;

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

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Colour a unified diff line by line.
pub fn diff(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with("+++") || line.starts_with("---") {
                Style::new().bold().apply_to(line).to_string()
            } else if line.starts_with('+') {
                Style::new().green().apply_to(line).to_string()
            } else if line.starts_with('-') {
                Style::new().red().apply_to(line).to_string()
            } else if line.starts_with("@@") {
                Style::new().cyan().apply_to(line).to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Table cell for a planned action.
pub fn action_cell(action: PlanAction) -> Cell {
    match action {
        PlanAction::Create => Cell::new("+ create").fg(Color::Green),
        PlanAction::Update => Cell::new("~ update").fg(Color::Yellow),
        PlanAction::NoOp => Cell::new("= no-op"),
    }
}
