use anyhow::{Result, bail};
use clap::Args;
use swarmtunnel_core::Uninstaller;

use super::{load_settings, print_cleanup_report};
use crate::output;

#[derive(Args)]
pub struct UninstallArgs {
    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn run(args: UninstallArgs) -> Result<()> {
    let settings = load_settings()?;

    output::print_header("Uninstall SwarmTunnel");
    output::print_field("SwarmUI", &settings.swarmui_dir.display().to_string());
    output::print_field("cloudflared", &settings.cloudflared_dir.display().to_string());
    output::print_field("Logs", &settings.log_dir.display().to_string());
    println!();

    if !should_proceed(args.yes, output::is_interactive(), || {
        output::confirm("Remove all of the above?", false)
    }) {
        output::print_warning("Uninstall cancelled");
        return Ok(());
    }

    let report = Uninstaller::new(&settings).uninstall().await;
    print_cleanup_report(&report);

    let removed = report.removed().count();
    if !report.is_clean() {
        bail!(
            "Removed {removed} item(s); {} need manual removal",
            report.failures().count()
        );
    }
    output::print_success(&format!("Uninstall complete ({removed} item(s) removed)"));
    Ok(())
}

/// `--yes` and non-interactive sessions go ahead; a person at the terminal
/// has to answer yes, and pressing Enter cancels.
fn should_proceed(yes: bool, interactive: bool, ask: impl FnOnce() -> bool) -> bool {
    yes || !interactive || ask()
}
