use anyhow::{Result, bail};
use swarmtunnel_core::Uninstaller;

use super::{load_settings, print_cleanup_report};
use crate::output;

pub async fn run() -> Result<()> {
    let settings = load_settings()?;
    output::print_step("Removing SwarmUI and stray cloudflared downloads");

    let report = Uninstaller::new(&settings).cleanup().await;
    print_cleanup_report(&report);

    if !report.is_clean() {
        bail!("Cleanup finished with issues; see the steps above");
    }
    output::print_success("Cleanup complete");
    Ok(())
}
