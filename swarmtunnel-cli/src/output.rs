//! Console output helpers and interactive prompts.
//!
//! Progress lines go to stdout; every helper has a `_to` variant that writes
//! to any writer so formatting can be tested.

use dialoguer::console::style;
use dialoguer::{Confirm, Input, theme::ColorfulTheme};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use swarmtunnel_core::InstallPrompt;

const HEADER_WIDTH: usize = 60;

/// Draws a boxed header with the given title.
pub fn print_header(title: &str) {
    let _ = print_header_to(&mut io::stdout(), title);
}

/// Draws a boxed header to a writer (for testing).
pub fn print_header_to<W: Write>(w: &mut W, title: &str) -> io::Result<()> {
    let border = "─".repeat(HEADER_WIDTH);
    writeln!(w, "┌{}┐", border)?;
    writeln!(w, "│ {:<width$} │", title, width = HEADER_WIDTH - 2)?;
    writeln!(w, "└{}┘", border)?;
    writeln!(w)?;
    Ok(())
}

/// Prints a progress line prefixed with an arrow.
pub fn print_step(message: &str) {
    let _ = print_step_to(&mut io::stdout(), message);
}

pub fn print_step_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(w, "{} {}", style("→").cyan().bold(), message)
}

/// Prints a success message with a green checkmark.
pub fn print_success(message: &str) {
    let _ = print_success_to(&mut io::stdout(), message);
}

pub fn print_success_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(w, "{} {}", style("✓").green().bold(), style(message).green())
}

/// Prints a warning with a yellow exclamation mark.
pub fn print_warning(message: &str) {
    let _ = print_warning_to(&mut io::stdout(), message);
}

pub fn print_warning_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(w, "{} {}", style("!").yellow().bold(), style(message).yellow())
}

/// Prints an error message with a red X to stderr.
pub fn print_error(message: &str) {
    let _ = print_error_to(&mut io::stderr(), message);
}

pub fn print_error_to<W: Write>(w: &mut W, message: &str) -> io::Result<()> {
    writeln!(w, "{} {}", style("✗").red().bold(), style(message).red())
}

/// Prints an aligned `label: value` line.
pub fn print_field(label: &str, value: &str) {
    let _ = print_field_to(&mut io::stdout(), label, value);
}

pub fn print_field_to<W: Write>(w: &mut W, label: &str, value: &str) -> io::Result<()> {
    writeln!(w, "  {:<18} {}", format!("{label}:"), style(value).bold())
}

/// Whether prompts can be shown.
pub fn is_interactive() -> bool {
    io::stdin().is_terminal() && io::stderr().is_terminal()
}

/// Yes/no question; non-interactive sessions get `default`.
pub fn confirm(question: &str, default: bool) -> bool {
    if !is_interactive() {
        return default;
    }
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(default)
        .interact()
        .unwrap_or(default)
}

/// Console answers for the SwarmUI installer.
pub struct ConsolePrompt;

impl InstallPrompt for ConsolePrompt {
    fn use_existing(&self) -> bool {
        confirm("SwarmUI was not found. Do you already have it installed elsewhere?", false)
    }

    fn existing_path(&self) -> Option<PathBuf> {
        if !is_interactive() {
            return None;
        }
        let answer: String = Input::with_theme(&ColorfulTheme::default())
            .with_prompt("Path to your SwarmUI folder (empty to cancel)")
            .allow_empty(true)
            .interact_text()
            .ok()?;
        let answer = answer.trim().trim_matches('"');
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}
