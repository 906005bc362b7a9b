//! SwarmUI installation: reuse an existing checkout or clone and set up a
//! fresh one.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;
use tracing::{info, warn};

use crate::cleanup::fix_permissions;
use crate::error::InstallError;
use crate::platform::Os;
use crate::readiness::{ReadinessProbe, wait_for_service};
use crate::settings::Settings;
use crate::webui::detect::{self, LAUNCH_SCRIPTS, SOLUTION_FILE};
use crate::webui::lan::enable_lan_binding;

/// Diagnostics file in the temp dir recording the last clone.
pub const CLONE_RECORD_FILE: &str = "swarmtunnel_last_clone.txt";

/// Questions asked when no SwarmUI could be found.
pub trait InstallPrompt: Send + Sync {
    /// Whether the user already has SwarmUI somewhere else.
    fn use_existing(&self) -> bool;

    /// Path to that installation; `None` cancels.
    fn existing_path(&self) -> Option<PathBuf>;
}

/// Answers "no" to everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl InstallPrompt for NonInteractive {
    fn use_existing(&self) -> bool {
        false
    }

    fn existing_path(&self) -> Option<PathBuf> {
        None
    }
}

/// How the first run of the bundled launcher went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// No platform launcher in the checkout; the clone counts as installed.
    NoLauncher,
    /// The launcher brought the web UI up.
    Ready,
    /// The web UI did not answer in time.
    TimedOut,
    /// The launcher could not be started.
    LaunchFailed(String),
}

/// Result of [`SwarmUiInstaller::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwarmUiInstall {
    /// Found by discovery.
    AlreadyInstalled(PathBuf),
    /// The user pointed at a checkout elsewhere.
    UsingExisting(PathBuf),
    /// Freshly cloned into the SwarmUI dir.
    Cloned { dir: PathBuf, setup: SetupOutcome },
}

impl SwarmUiInstall {
    /// Directory SwarmUI lives in now.
    pub fn dir(&self) -> &Path {
        match self {
            Self::AlreadyInstalled(dir) | Self::UsingExisting(dir) => dir,
            Self::Cloned { dir, .. } => dir,
        }
    }
}

pub struct SwarmUiInstaller {
    dir: PathBuf,
    work_dir: PathBuf,
    home: Option<PathBuf>,
    repo: String,
    os: Os,
    port: u16,
    enable_lan: bool,
    install_log: PathBuf,
    clone_record: PathBuf,
    git: PathBuf,
    interactive_user: Option<String>,
    ready_timeout: Duration,
    ready_interval: Duration,
}

impl SwarmUiInstaller {
    pub fn new(settings: &Settings) -> Self {
        Self {
            dir: settings.swarmui_dir.clone(),
            work_dir: settings.work_dir.clone(),
            home: dirs::home_dir(),
            repo: settings.swarmui_repo.clone(),
            os: settings.platform.os,
            port: settings.port,
            enable_lan: settings.enable_lan,
            install_log: settings.install_log(),
            clone_record: std::env::temp_dir().join(CLONE_RECORD_FILE),
            git: PathBuf::from("git"),
            interactive_user: settings.interactive_user.clone(),
            ready_timeout: settings.timeouts.installer_ready,
            ready_interval: settings.timeouts.installer_ready_interval,
        }
    }

    /// Use another git executable.
    pub fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Search `home` instead of the user's home directory.
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Write the clone record somewhere other than the temp dir.
    pub fn with_clone_record(mut self, path: impl Into<PathBuf>) -> Self {
        self.clone_record = path.into();
        self
    }

    /// Find SwarmUI, or clone it when `skip_check` is set or nothing was
    /// found and the user has no installation to offer.
    pub async fn install(
        &self,
        skip_check: bool,
        prompt: &dyn InstallPrompt,
        probe: &dyn ReadinessProbe,
    ) -> Result<SwarmUiInstall, InstallError> {
        if skip_check {
            info!("Skipping SwarmUI detection check, proceeding with installation");
        } else {
            if let Some(dir) = detect::discover(&self.dir, &self.work_dir, self.home.as_deref()) {
                info!(dir = %dir.display(), "SwarmUI already installed");
                return Ok(SwarmUiInstall::AlreadyInstalled(dir));
            }
            if let Some(dir) = self.ask_for_existing(prompt) {
                info!(dir = %dir.display(), "Using existing SwarmUI");
                return Ok(SwarmUiInstall::UsingExisting(dir));
            }
        }

        self.check_git().await?;
        match self.clone_and_set_up(probe).await {
            Ok(setup) => Ok(SwarmUiInstall::Cloned {
                dir: self.dir.clone(),
                setup,
            }),
            Err(e) => {
                warn!(error = %e, "Failed to install SwarmUI");
                self.remove_partial_clone().await;
                Err(e)
            }
        }
    }

    fn ask_for_existing(&self, prompt: &dyn InstallPrompt) -> Option<PathBuf> {
        if !prompt.use_existing() {
            return None;
        }
        let selected = prompt.existing_path()?;
        if selected.is_dir() && selected.join(SOLUTION_FILE).exists() {
            Some(selected)
        } else {
            warn!(
                path = %selected.display(),
                "Selected folder doesn't look like a SwarmUI installation, installing into the project instead"
            );
            None
        }
    }

    async fn check_git(&self) -> Result<(), InstallError> {
        let output = Command::new(&self.git)
            .arg("--version")
            .output()
            .await
            .map_err(|_| InstallError::GitNotFound)?;
        if !output.status.success() {
            return Err(InstallError::GitNotFound);
        }
        info!(version = %String::from_utf8_lossy(&output.stdout).trim(), "Found git");
        Ok(())
    }

    async fn clone_and_set_up(
        &self,
        probe: &dyn ReadinessProbe,
    ) -> Result<SetupOutcome, InstallError> {
        info!(repo = %self.repo, dir = %self.dir.display(), "Cloning SwarmUI repository");
        let status = Command::new(&self.git)
            .args(["clone", "--depth", "1"])
            .arg(&self.repo)
            .arg(&self.dir)
            .stdin(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(InstallError::CloneFailed {
                repo: self.repo.clone(),
                status,
            });
        }
        if !self.dir.join(".git").exists() {
            return Err(InstallError::IncompleteClone(self.dir.clone()));
        }

        if let Err(e) = self.record_clone() {
            warn!(error = %e, "Could not record clone location");
        }

        if self.os == Os::Windows {
            match fix_permissions(&self.dir, self.interactive_user.as_deref()).await {
                Ok(true) => {}
                Ok(false) => warn!("Some permission fixes failed; uninstall may need manual steps"),
                Err(e) => warn!(error = %e, "Could not fix permissions"),
            }
        }

        let has_launcher = LAUNCH_SCRIPTS.iter().any(|name| self.dir.join(name).exists());
        if !has_launcher {
            self.mark_installed();
        }

        if self.enable_lan
            && let Err(e) = enable_lan_binding(&self.dir, self.port)
        {
            warn!(error = %e, "Could not enable LAN binding");
        }

        Ok(self.run_platform_launcher(probe).await)
    }

    /// Remember where the clone went, in the temp dir and the install log.
    fn record_clone(&self) -> std::io::Result<()> {
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ");
        let clone_path = std::path::absolute(&self.dir)?;
        let cwd = std::path::absolute(&self.work_dir)?;

        std::fs::write(
            &self.clone_record,
            format!(
                "timestamp={stamp}\nclone_path={}\ncwd={}\n",
                clone_path.display(),
                cwd.display()
            ),
        )?;

        if let Some(parent) = self.install_log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.install_log)?;
        writeln!(
            log,
            "[{stamp}] clone_path={} cwd={}",
            clone_path.display(),
            cwd.display()
        )
    }

    fn platform_launcher(&self) -> Option<(PathBuf, Vec<PathBuf>)> {
        let (name, program) = match self.os {
            Os::Windows => ("launch-windows.bat", "cmd"),
            Os::MacOs => ("launch-macos.sh", "/bin/bash"),
            Os::Linux => ("launch-linux.sh", "/bin/bash"),
        };
        let script = self.dir.join(name);
        if !script.exists() {
            return None;
        }
        let args = if self.os == Os::Windows {
            vec![PathBuf::from("/C"), script]
        } else {
            vec![script]
        };
        Some((PathBuf::from(program), args))
    }

    /// Start the bundled launcher, which builds SwarmUI and runs its first
    /// time setup, and wait for the web UI. The launcher keeps running.
    async fn run_platform_launcher(&self, probe: &dyn ReadinessProbe) -> SetupOutcome {
        let Some((program, args)) = self.platform_launcher() else {
            return SetupOutcome::NoLauncher;
        };

        let mut cmd = Command::new(&program);
        cmd.args(&args).current_dir(&self.dir).stdin(Stdio::null());
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.install_log)
            .and_then(|log| Ok((log.try_clone()?, log)))
        {
            Ok((out, err)) => {
                cmd.stdout(out).stderr(err);
            }
            Err(e) => warn!(error = %e, "Could not open install log for launcher output"),
        }
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(child) => info!(pid = ?child.id(), script = ?args.last(), "Launched SwarmUI installer"),
            Err(e) => {
                warn!(error = %e, "Launching platform installer failed");
                return SetupOutcome::LaunchFailed(e.to_string());
            }
        }

        let url = format!("http://localhost:{}", self.port);
        info!(url = %url, "Waiting for SwarmUI web UI to become available");
        if wait_for_service(probe, &url, self.ready_timeout, self.ready_interval).await {
            self.mark_installed();
            SetupOutcome::Ready
        } else {
            warn!("Timed out waiting for SwarmUI web UI; finish the installer manually");
            SetupOutcome::TimedOut
        }
    }

    fn mark_installed(&self) {
        match detect::write_installed_marker(&self.dir) {
            Ok(()) => info!(dir = %self.dir.display(), "SwarmUI installed"),
            Err(e) => warn!(error = %e, "Could not write installed marker file"),
        }
    }

    async fn remove_partial_clone(&self) {
        if self.dir.exists()
            && let Err(e) = tokio::fs::remove_dir_all(&self.dir).await
        {
            warn!(dir = %self.dir.display(), error = %e, "Could not remove partial clone");
        }
    }
}
