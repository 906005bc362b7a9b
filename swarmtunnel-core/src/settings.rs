//! Resolved runtime settings shared by the installer, launcher and cleanup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::platform::Platform;

/// Port SwarmUI listens on.
pub const DEFAULT_PORT: u16 = 7801;

/// Upstream SwarmUI repository.
pub const SWARMUI_REPO: &str = "https://github.com/mcmonkeyprojects/SwarmUI.git";

/// Release download base for cloudflared binaries.
pub const CLOUDFLARED_BASE_URL: &str =
    "https://github.com/cloudflare/cloudflared/releases/latest/download";

/// Name of the sentinel file written once SwarmUI setup completed.
pub const INSTALLED_MARKER: &str = ".installed";

/// Timing knobs for polling loops and process startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    /// How long to look for an already-running SwarmUI.
    pub already_running: Duration,
    /// Poll interval for the already-running check.
    pub already_running_interval: Duration,
    /// How long to wait for a freshly started SwarmUI.
    pub service_ready: Duration,
    /// Poll interval while waiting for SwarmUI.
    pub service_ready_interval: Duration,
    /// How long the installer waits for the first-run launcher.
    pub installer_ready: Duration,
    /// Poll interval while the installer waits.
    pub installer_ready_interval: Duration,
    /// How long to scan cloudflared output for the public URL.
    pub tunnel_url: Duration,
    /// Delay before checking that SwarmUI survived startup.
    pub service_grace: Duration,
    /// Delay before checking that cloudflared survived startup.
    pub tunnel_grace: Duration,
    /// Time a child gets to exit after a polite stop.
    pub shutdown_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            already_running: Duration::from_secs(5),
            already_running_interval: Duration::from_secs(1),
            service_ready: Duration::from_secs(120),
            service_ready_interval: Duration::from_secs(2),
            installer_ready: Duration::from_secs(60 * 60),
            installer_ready_interval: Duration::from_secs(5),
            tunnel_url: Duration::from_secs(30),
            service_grace: Duration::from_secs(3),
            tunnel_grace: Duration::from_secs(2),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Everything a command needs to know about where things live and how to
/// behave. Directories are absolute once [`Settings::absolutize`] ran.
#[derive(Debug, Clone)]
pub struct Settings {
    pub swarmui_dir: PathBuf,
    pub cloudflared_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Directory downloads are staged in and stray binaries are looked for.
    pub work_dir: PathBuf,
    pub port: u16,
    pub swarmui_repo: String,
    pub cloudflared_base_url: String,
    pub platform: Platform,
    pub skip_swarmui_check: bool,
    pub force_cloudflared_install: bool,
    pub force_local_swarmui: bool,
    pub force_local_cloudflared: bool,
    pub ignore_system_cloudflared: bool,
    pub enable_lan: bool,
    /// Account that should own the checkout after permission repair.
    pub interactive_user: Option<String>,
    pub timeouts: Timeouts,
}

impl Settings {
    /// Settings rooted at `work_dir` with directories taken from the
    /// environment and every flag off.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            swarmui_dir: swarmtunnel_paths::swarmui_dir(),
            cloudflared_dir: swarmtunnel_paths::cloudflared_dir(),
            log_dir: swarmtunnel_paths::log_dir(),
            work_dir: work_dir.into(),
            port: DEFAULT_PORT,
            swarmui_repo: SWARMUI_REPO.to_string(),
            cloudflared_base_url: CLOUDFLARED_BASE_URL.to_string(),
            platform: Platform::current(),
            skip_swarmui_check: false,
            force_cloudflared_install: false,
            force_local_swarmui: false,
            force_local_cloudflared: false,
            ignore_system_cloudflared: false,
            enable_lan: true,
            interactive_user: None,
            timeouts: Timeouts::default(),
        }
    }

    /// Settings whose directories all live under `root` (used by tests and
    /// by callers that want an isolated install).
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            swarmui_dir: root.join("SwarmUI"),
            cloudflared_dir: root.join("cloudflared"),
            log_dir: root.join("logs"),
            ..Self::new(root)
        }
    }

    /// Make every directory absolute relative to the work dir.
    pub fn absolutize(mut self) -> Self {
        self.swarmui_dir = swarmtunnel_paths::absolutize(&self.swarmui_dir, &self.work_dir);
        self.cloudflared_dir = swarmtunnel_paths::absolutize(&self.cloudflared_dir, &self.work_dir);
        self.log_dir = swarmtunnel_paths::absolutize(&self.log_dir, &self.work_dir);
        self
    }

    /// Local URL SwarmUI answers on.
    pub fn service_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub fn installed_marker(&self) -> PathBuf {
        self.swarmui_dir.join(INSTALLED_MARKER)
    }

    pub fn tunnel_config_path(&self) -> PathBuf {
        self.log_dir.join("tunnel_config.yml")
    }

    pub fn swarmui_log(&self) -> PathBuf {
        self.log_dir.join("swarmui.log")
    }

    pub fn cloudflared_log(&self) -> PathBuf {
        self.log_dir.join("cloudflared.log")
    }

    pub fn install_log(&self) -> PathBuf {
        self.log_dir.join("swarmtunnel_install.log")
    }
}
