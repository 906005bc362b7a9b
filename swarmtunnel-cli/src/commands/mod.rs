pub mod cleanup;
pub mod config;
pub mod install;
pub mod start;
pub mod uninstall;

use anyhow::{Context, Result};
use swarmtunnel_core::{CleanupReport, Settings};

use crate::config::ConfigLoader;
use crate::output;

/// Effective settings for this run, rooted at the current directory.
pub fn load_settings() -> Result<Settings> {
    let config = ConfigLoader::load()?;
    let work_dir = std::env::current_dir().context("Failed to read the current directory")?;
    Ok(config.into_settings(work_dir))
}

/// Print what a cleanup removed and what needs manual attention.
fn print_cleanup_report(report: &CleanupReport) {
    for entry in report.removed() {
        output::print_success(&format!("Removed {}: {}", entry.component, entry.path.display()));
    }
    for entry in report.failures() {
        output::print_error(&format!(
            "Could not remove {}: {}",
            entry.component,
            entry.path.display()
        ));
        for step in swarmtunnel_core::cleanup::manual_steps(&entry.path) {
            println!("    {step}");
        }
    }
}
