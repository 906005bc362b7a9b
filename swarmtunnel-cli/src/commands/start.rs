use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use swarmtunnel_core::tunnel::{probe_version, remove_ingress_file, write_ingress_file};
use swarmtunnel_core::webui::{self, check_dotnet};
use swarmtunnel_core::{
    BuildStatus, CloudflaredLocator, HttpProbe, LaunchError, ManagedProcess, Settings,
    SwarmUiLauncher, TunnelConfig, TunnelError, TunnelEvent, TunnelManager,
};
use tracing::{debug, info, warn};

use super::install::install_all;
use super::load_settings;
use crate::output;

/// Lines of child output shown when a process dies during startup.
const FAILURE_TAIL: usize = 20;

#[derive(Args)]
pub struct StartArgs {
    /// Only use the SwarmUI directory, never search elsewhere
    #[arg(long)]
    pub force_local_swarmui: bool,

    /// Only use the cloudflared in the cloudflared directory
    #[arg(long)]
    pub force_local_cloudflared: bool,
}

pub async fn run(args: StartArgs) -> Result<()> {
    let mut settings = load_settings()?;
    settings.force_local_swarmui |= args.force_local_swarmui;
    settings.force_local_cloudflared |= args.force_local_cloudflared;

    print_banner(&settings);

    let cloudflared = check_dependencies(&mut settings).await?;
    let launcher = SwarmUiLauncher::from_settings(&settings);
    check_build(&launcher)?;

    // Listen before anything is spawned so an early Ctrl-C still cleans up.
    let signal = shutdown_signal();
    tokio::pin!(signal);

    let mut stack = RunningStack::new(settings.timeouts.shutdown_grace);
    let started =
        bring_up_until(&settings, &launcher, cloudflared, &mut stack, &mut signal).await;
    let public_url = match started {
        Ok(Some(url)) => url,
        Ok(None) => {
            stack.shutdown().await;
            output::print_success("Stopped before startup finished");
            return Ok(());
        }
        Err(e) => {
            stack.shutdown().await;
            return Err(e);
        }
    };

    println!();
    output::print_success("SwarmUI is online");
    output::print_field("Local URL", &launcher.url());
    output::print_field("Public URL", &public_url);
    output::print_field("Logs", &settings.log_dir.display().to_string());
    println!();
    output::print_step("Press Ctrl-C to stop");

    let reason = stack.supervise(&mut signal).await;
    stack.shutdown().await;

    match reason {
        StopReason::Signal => {
            output::print_success("Stopped");
            Ok(())
        }
        StopReason::SwarmUiExited(status) => bail!("SwarmUI exited unexpectedly ({status})"),
        StopReason::TunnelClosed => bail!("cloudflared exited unexpectedly"),
    }
}

fn print_banner(settings: &Settings) {
    output::print_header("SwarmTunnel");
    output::print_field("Working directory", &settings.work_dir.display().to_string());
    output::print_field("SwarmUI", &settings.swarmui_dir.display().to_string());
    output::print_field("cloudflared", &settings.cloudflared_dir.display().to_string());
    output::print_field("Logs", &settings.log_dir.display().to_string());
    if settings.force_local_swarmui {
        output::print_warning("Test mode: only the local SwarmUI directory is used");
    }
    if settings.force_local_cloudflared {
        output::print_warning("Test mode: only the local cloudflared is used");
    }
    if settings.ignore_system_cloudflared {
        output::print_warning("Ignoring cloudflared on the system PATH");
    }
    println!();
}

/// SwarmUI directory to run, honoring force-local mode.
fn detect_swarmui(settings: &Settings) -> Option<PathBuf> {
    if settings.force_local_swarmui {
        webui::is_installed(&settings.swarmui_dir).then(|| settings.swarmui_dir.clone())
    } else {
        let home = dirs::home_dir();
        webui::discover(&settings.swarmui_dir, &settings.work_dir, home.as_deref())
    }
}

fn detect_cloudflared(settings: &Settings) -> bool {
    let locator = CloudflaredLocator::from_settings(settings);
    if settings.force_local_cloudflared {
        locator.locate_local().is_some()
    } else {
        locator.is_installed()
    }
}

/// Make sure SwarmUI, cloudflared and .NET are available, offering to run
/// the installer. Returns the cloudflared binary to run.
async fn check_dependencies(settings: &mut Settings) -> Result<PathBuf> {
    output::print_step("Checking dependencies");

    let mut swarmui = detect_swarmui(settings);
    let mut has_cloudflared = detect_cloudflared(settings);

    if swarmui.is_none() || !has_cloudflared {
        if swarmui.is_none() {
            output::print_warning(&format!(
                "SwarmUI not found at {}",
                settings.swarmui_dir.display()
            ));
        }
        if !has_cloudflared {
            output::print_warning("cloudflared not found");
        }
        if !output::confirm("Run the installer now?", false) {
            bail!("Missing dependencies. Run 'swarmtunnel install' first");
        }

        let installed = install_all(settings).await?;
        swarmui = Some(installed);
        has_cloudflared = detect_cloudflared(settings);
        if !has_cloudflared {
            bail!("cloudflared is still missing after installation");
        }
    }

    if let Some(dir) = swarmui
        && dir != settings.swarmui_dir
    {
        info!(dir = %dir.display(), "Using discovered SwarmUI");
        output::print_field("Using SwarmUI", &dir.display().to_string());
        settings.swarmui_dir = dir;
    }

    let dotnet = check_dotnet().await?;
    output::print_success(&format!(".NET SDK {dotnet}"));

    let binary =
        CloudflaredLocator::from_settings(settings).resolve(settings.force_local_cloudflared);
    match probe_version(&binary).await {
        Some(version) => output::print_success(&format!("cloudflared {version}")),
        None => warn!(binary = %binary.display(), "Could not read cloudflared version"),
    }
    Ok(binary)
}

fn check_build(launcher: &SwarmUiLauncher) -> Result<()> {
    match launcher.build_status() {
        BuildStatus::Launcher(script) => {
            debug!(script = %script.display(), "Using launch script");
        }
        BuildStatus::Executable(exe) => {
            debug!(exe = %exe.display(), "Using published executable");
        }
        BuildStatus::SourceOnly(_) => output::print_warning(
            "SwarmUI has sources but no launch script or build; the start may fail",
        ),
        BuildStatus::Missing => {
            return Err(LaunchError::NotBuilt(launcher.dir().to_path_buf()).into());
        }
    }
    Ok(())
}

/// [`bring_up`] unless `stop` resolves first, in which case `Ok(None)`.
/// Whatever was started by then is already recorded in `stack`.
async fn bring_up_until(
    settings: &Settings,
    launcher: &SwarmUiLauncher,
    cloudflared: PathBuf,
    stack: &mut RunningStack,
    stop: impl Future<Output = ()>,
) -> Result<Option<String>> {
    tokio::select! {
        result = bring_up(settings, launcher, cloudflared, stack) => result.map(Some),
        () = stop => Ok(None),
    }
}

/// Start or reuse SwarmUI, then open the tunnel. Returns the public URL.
async fn bring_up(
    settings: &Settings,
    launcher: &SwarmUiLauncher,
    cloudflared: PathBuf,
    stack: &mut RunningStack,
) -> Result<String> {
    let probe = HttpProbe::new().context("Failed to create HTTP client")?;

    if launcher.is_running(&probe).await {
        output::print_success(&format!(
            "SwarmUI already running at {}; it will be left running on exit",
            launcher.url()
        ));
    } else {
        output::print_step("Starting SwarmUI");
        let process = launcher.launch().await.map_err(launch_failure)?;
        let process = stack.swarmui.insert(process);
        output::print_step("Waiting for SwarmUI to answer (the first start can take a while)");
        launcher
            .wait_until_ready(&probe, process)
            .await
            .map_err(launch_failure)?;
        output::print_success("SwarmUI is ready");
    }

    let config_path = settings.tunnel_config_path();
    write_ingress_file(&config_path, settings.port)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    stack.tunnel_config = Some(config_path);

    output::print_step("Starting Cloudflare tunnel");
    let tunnel = stack
        .tunnel
        .insert(TunnelManager::new(TunnelConfig::from_settings(settings, cloudflared)));
    tunnel.start().await.map_err(tunnel_failure)?;
    let url = tunnel.wait_for_url().await.map_err(tunnel_failure)?;
    Ok(url)
}

fn print_output_tail(name: &str, output: &[String]) {
    if output.is_empty() {
        return;
    }
    eprintln!("Last output from {name}:");
    let start = output.len().saturating_sub(FAILURE_TAIL);
    for line in &output[start..] {
        eprintln!("  {line}");
    }
}

fn launch_failure(e: LaunchError) -> anyhow::Error {
    if let LaunchError::ExitedEarly { output, .. } = &e {
        print_output_tail("SwarmUI", output);
    }
    anyhow::Error::new(e).context("Failed to start SwarmUI")
}

fn tunnel_failure(e: TunnelError) -> anyhow::Error {
    if let TunnelError::ExitedEarly { output, .. } = &e {
        print_output_tail("cloudflared", output);
    }
    anyhow::Error::new(e).context("Failed to start the tunnel")
}

#[derive(Debug, PartialEq)]
enum StopReason {
    Signal,
    SwarmUiExited(String),
    TunnelClosed,
}

/// Processes and files owned by this run.
struct RunningStack {
    /// `None` when an already running SwarmUI is reused.
    swarmui: Option<ManagedProcess>,
    tunnel: Option<TunnelManager>,
    tunnel_config: Option<PathBuf>,
    grace: Duration,
}

impl RunningStack {
    fn new(grace: Duration) -> Self {
        Self {
            swarmui: None,
            tunnel: None,
            tunnel_config: None,
            grace,
        }
    }

    /// Wait for `stop` or for an owned child to go away, reporting tunnel
    /// events meanwhile.
    async fn supervise(&mut self, stop: impl Future<Output = ()>) -> StopReason {
        tokio::pin!(stop);

        loop {
            tokio::select! {
                () = &mut stop => return StopReason::Signal,
                status = wait_for_exit(&mut self.swarmui) => {
                    return StopReason::SwarmUiExited(status);
                }
                event = next_tunnel_event(&mut self.tunnel) => match event {
                    None => return StopReason::TunnelClosed,
                    Some(TunnelEvent::Disconnected { reason }) => {
                        output::print_warning(&format!("Tunnel connection lost: {reason}"));
                    }
                    Some(TunnelEvent::Connected { url }) => {
                        output::print_field("Public URL", &url);
                    }
                    Some(event) => debug!(?event, "Tunnel event"),
                },
            }
        }
    }

    /// Stop owned processes and remove the tunnel config. Consumes the
    /// stack so it runs once.
    async fn shutdown(self) {
        output::print_step("Shutting down");

        if let Some(mut tunnel) = self.tunnel
            && let Err(e) = tunnel.stop(self.grace).await
        {
            warn!(error = %e, "Failed to stop cloudflared");
        }
        if let Some(mut process) = self.swarmui
            && let Err(e) = process.terminate(self.grace).await
        {
            warn!(error = %e, "Failed to stop SwarmUI");
        }
        if let Some(path) = self.tunnel_config
            && let Err(e) = remove_ingress_file(&path)
        {
            warn!(path = %path.display(), error = %e, "Failed to remove tunnel config");
        }
    }
}

async fn wait_for_exit(process: &mut Option<ManagedProcess>) -> String {
    match process {
        Some(process) => match process.wait().await {
            Ok(status) => status.to_string(),
            Err(e) => e.to_string(),
        },
        None => std::future::pending().await,
    }
}

async fn next_tunnel_event(tunnel: &mut Option<TunnelManager>) -> Option<TunnelEvent> {
    match tunnel {
        Some(tunnel) => tunnel.next_event().await,
        None => std::future::pending().await,
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
