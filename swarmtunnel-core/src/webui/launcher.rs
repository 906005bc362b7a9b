//! SwarmUI subprocess startup.
//!
//! Picks a launcher script or the published executable, relays its output
//! to the SwarmUI log and waits for the web UI to answer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::detect::{self, BuildStatus};
use crate::error::LaunchError;
use crate::platform::Os;
use crate::process::ManagedProcess;
use crate::readiness::{ReadinessProbe, wait_for_service};
use crate::settings::Settings;

/// How long to wait for trailing output from a launcher that already exited.
const OUTPUT_SETTLE: Duration = Duration::from_millis(500);

/// Program and arguments used to start SwarmUI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<PathBuf>,
}

impl LaunchCommand {
    /// Pick how to start the SwarmUI in `dir` on `os`.
    ///
    /// Windows runs any launcher batch file found under `dir` through
    /// `cmd /C`; macOS and Linux run their launcher script from the root
    /// through bash. Everything else falls back to the published executable.
    pub fn for_dir(dir: &Path, os: Os) -> Self {
        let script = match os {
            Os::Windows => detect::find_launch_script(dir).filter(|p| {
                p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("bat"))
            }),
            Os::MacOs => Some(dir.join("launch-macos.sh")).filter(|p| p.exists()),
            Os::Linux => Some(dir.join("launch-linux.sh")).filter(|p| p.exists()),
        };

        match (script, os) {
            (Some(script), Os::Windows) => Self {
                program: PathBuf::from("cmd"),
                args: vec![PathBuf::from("/C"), script],
            },
            (Some(script), _) => Self {
                program: PathBuf::from("/bin/bash"),
                args: vec![script],
            },
            (None, os) => Self {
                program: detect::executable_path(dir, os),
                args: Vec::new(),
            },
        }
    }
}

/// Starts SwarmUI and waits for it to serve.
#[derive(Debug, Clone)]
pub struct SwarmUiLauncher {
    dir: PathBuf,
    os: Os,
    port: u16,
    log_path: PathBuf,
    startup_grace: Duration,
    ready_timeout: Duration,
    ready_interval: Duration,
    running_timeout: Duration,
    running_interval: Duration,
}

impl SwarmUiLauncher {
    pub fn from_settings(settings: &Settings) -> Self {
        let t = &settings.timeouts;
        Self {
            dir: settings.swarmui_dir.clone(),
            os: settings.platform.os,
            port: settings.port,
            log_path: settings.swarmui_log(),
            startup_grace: t.service_grace,
            ready_timeout: t.service_ready,
            ready_interval: t.service_ready_interval,
            running_timeout: t.already_running,
            running_interval: t.already_running_interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn build_status(&self) -> BuildStatus {
        detect::check_build(&self.dir, self.os)
    }

    /// Fully configured command, without spawning it.
    pub fn command(&self) -> Command {
        let launch = LaunchCommand::for_dir(&self.dir, self.os);
        debug!(program = %launch.program.display(), args = ?launch.args, "SwarmUI launch command");

        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args)
            .current_dir(&self.dir)
            .env("ASPNETCORE_ENVIRONMENT", "Production")
            .env("ASPNETCORE_URLS", format!("http://*:{}", self.port))
            .env("DOTNET_CLI_TELEMETRY_OPTOUT", "1");
        cmd
    }

    /// Quick check for a SwarmUI somebody else already started.
    pub async fn is_running(&self, probe: &dyn ReadinessProbe) -> bool {
        wait_for_service(probe, &self.url(), self.running_timeout, self.running_interval).await
    }

    /// Spawn SwarmUI and make sure it survives the startup grace.
    pub async fn launch(&self) -> Result<ManagedProcess, LaunchError> {
        if !self.dir.is_dir() {
            return Err(LaunchError::NotInstalled(self.dir.clone()));
        }
        if !self.build_status().is_startable() {
            return Err(LaunchError::NotBuilt(self.dir.clone()));
        }

        info!(dir = %self.dir.display(), "Starting SwarmUI");
        let mut process = ManagedProcess::spawn("swarmui", self.command(), &self.log_path)
            .await
            .map_err(LaunchError::SpawnFailed)?;

        tokio::time::sleep(self.startup_grace).await;
        if let Some(status) = process.try_status().map_err(LaunchError::SpawnFailed)? {
            let output = process.collect_output(OUTPUT_SETTLE).await;
            warn!(status = %status, lines = output.len(), "SwarmUI exited during startup");
            return Err(LaunchError::ExitedEarly {
                status: status.to_string(),
                output,
            });
        }

        info!(pid = ?process.id(), "SwarmUI started");
        Ok(process)
    }

    /// Poll until SwarmUI answers, failing early if the process exits.
    pub async fn wait_until_ready(
        &self,
        probe: &dyn ReadinessProbe,
        process: &mut ManagedProcess,
    ) -> Result<(), LaunchError> {
        let url = self.url();
        let outcome = tokio::select! {
            ready = wait_for_service(probe, &url, self.ready_timeout, self.ready_interval) => Ok(ready),
            status = process.wait() => Err(status),
        };

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(LaunchError::NotReady {
                url,
                timeout: self.ready_timeout,
            }),
            Err(status) => {
                let status = status.map_err(LaunchError::SpawnFailed)?;
                Err(LaunchError::ExitedEarly {
                    status: status.to_string(),
                    output: process.collect_output(OUTPUT_SETTLE).await,
                })
            }
        }
    }
}

/// Check that the .NET SDK runs; returns its version.
pub async fn check_dotnet() -> Result<String, LaunchError> {
    check_dotnet_with(Path::new("dotnet")).await
}

pub async fn check_dotnet_with(dotnet: &Path) -> Result<String, LaunchError> {
    let output = Command::new(dotnet)
        .arg("--version")
        .output()
        .await
        .map_err(|_| LaunchError::DotnetMissing)?;
    if !output.status.success() {
        return Err(LaunchError::DotnetMissing);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
