use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use swarmtunnel_core::{
    CloudflaredInstall, CloudflaredInstaller, HttpProbe, SetupOutcome, Settings, SwarmUiInstall,
    SwarmUiInstaller, Uninstaller,
};

use super::{load_settings, print_cleanup_report};
use crate::output::{self, ConsolePrompt};

#[derive(Args)]
pub struct InstallArgs {
    /// Clone SwarmUI even if an installation can be found
    #[arg(long, visible_alias = "no-swarmui-check")]
    pub skip_swarmui_check: bool,

    /// Download cloudflared even if one is already available
    #[arg(long, visible_alias = "force-cloudflared")]
    pub force_cloudflared_install: bool,

    /// Remove the installed components again afterwards
    #[arg(long)]
    pub cleanup: bool,
}

pub async fn run(args: InstallArgs) -> Result<()> {
    let mut settings = load_settings()?;
    settings.skip_swarmui_check |= args.skip_swarmui_check;
    settings.force_cloudflared_install |= args.force_cloudflared_install;

    output::print_header("SwarmTunnel installer");
    if settings.skip_swarmui_check {
        output::print_warning("SwarmUI detection disabled, a fresh copy will be cloned");
    }
    if settings.force_cloudflared_install {
        output::print_warning("cloudflared will be downloaded even if one is available");
    }

    install_all(&settings).await?;

    if args.cleanup {
        output::print_step("Cleaning up installed components");
        let report = Uninstaller::new(&settings).cleanup().await;
        print_cleanup_report(&report);
    }
    Ok(())
}

/// Install SwarmUI, then cloudflared. Returns the SwarmUI directory in use.
pub async fn install_all(settings: &Settings) -> Result<PathBuf> {
    let probe = HttpProbe::new().context("Failed to create HTTP client")?;

    output::print_step("Checking SwarmUI");
    let swarmui = SwarmUiInstaller::new(settings)
        .install(settings.skip_swarmui_check, &ConsolePrompt, &probe)
        .await
        .context("SwarmUI installation failed")?;
    report_swarmui(&swarmui);

    output::print_step("Checking cloudflared");
    let client = reqwest::Client::new();
    let cloudflared = CloudflaredInstaller::new(settings, client)
        .install(settings.force_cloudflared_install)
        .await
        .context("cloudflared installation failed")?;
    match cloudflared {
        CloudflaredInstall::AlreadyInstalled(location) => output::print_success(&format!(
            "cloudflared already installed ({}): {}",
            location.describe(),
            location.path().display()
        )),
        CloudflaredInstall::Installed(path) => {
            output::print_success(&format!("cloudflared installed: {}", path.display()))
        }
    }

    output::print_success("Installation complete. Run 'swarmtunnel start' next");
    Ok(swarmui.dir().to_path_buf())
}

fn report_swarmui(install: &SwarmUiInstall) {
    match install {
        SwarmUiInstall::AlreadyInstalled(dir) => {
            output::print_success(&format!("SwarmUI already installed: {}", dir.display()))
        }
        SwarmUiInstall::UsingExisting(dir) => {
            output::print_success(&format!("Using existing SwarmUI: {}", dir.display()))
        }
        SwarmUiInstall::Cloned { dir, setup } => {
            output::print_success(&format!("SwarmUI cloned into {}", dir.display()));
            match setup {
                SetupOutcome::Ready => output::print_success("SwarmUI first-run setup finished"),
                SetupOutcome::NoLauncher => {
                    output::print_warning("No platform launcher found; SwarmUI still needs building")
                }
                SetupOutcome::TimedOut => output::print_warning(
                    "SwarmUI did not come up in time; finish its setup in the browser, then run 'swarmtunnel start'",
                ),
                SetupOutcome::LaunchFailed(error) => {
                    output::print_warning(&format!("Could not run the SwarmUI launcher: {error}"))
                }
            }
        }
    }
}
