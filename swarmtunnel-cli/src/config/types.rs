use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use swarmtunnel_core::settings::{CLOUDFLARED_BASE_URL, SWARMUI_REPO};
use swarmtunnel_core::{DEFAULT_PORT, Platform, Settings, Timeouts};
use swarmtunnel_paths::{DEFAULT_CLOUDFLARED_DIR, DEFAULT_LOG_DIR, DEFAULT_SWARMUI_DIR};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSwarmTunnelConfig {
    #[serde(default)]
    pub paths: RawPathsConfig,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub tunnel: RawTunnelConfig,

    #[serde(default)]
    pub install: RawInstallConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPathsConfig {
    pub swarmui_dir: Option<PathBuf>,
    pub cloudflared_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServiceConfig {
    pub port: Option<u16>,
    pub ready_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    pub force_local: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTunnelConfig {
    pub url_timeout_secs: Option<u64>,
    pub ignore_system_cloudflared: Option<bool>,
    pub force_local: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawInstallConfig {
    pub swarmui_repo: Option<String>,
    pub cloudflared_base_url: Option<String>,
    pub skip_swarmui_check: Option<bool>,
    pub force_cloudflared_install: Option<bool>,
    pub enable_lan: Option<bool>,
    pub interactive_user: Option<String>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SwarmTunnelConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub tunnel: TunnelSection,

    #[serde(default)]
    pub install: InstallSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// SwarmUI checkout, relative to the working directory unless absolute
    pub swarmui_dir: PathBuf,

    /// Directory the cloudflared binary is installed into
    pub cloudflared_dir: PathBuf,

    /// Process and install logs
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            swarmui_dir: PathBuf::from(DEFAULT_SWARMUI_DIR),
            cloudflared_dir: PathBuf::from(DEFAULT_CLOUDFLARED_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Port SwarmUI listens on
    pub port: u16,

    /// How long `start` waits for the web UI to answer
    pub ready_timeout_secs: u64,

    /// Time children get to exit before they are killed
    pub shutdown_grace_secs: u64,

    /// Only use the SwarmUI directory, never search for one
    pub force_local: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            port: DEFAULT_PORT,
            ready_timeout_secs: timeouts.service_ready.as_secs(),
            shutdown_grace_secs: timeouts.shutdown_grace.as_secs(),
            force_local: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelSection {
    /// How long to wait for cloudflared to print the public URL
    pub url_timeout_secs: u64,

    /// Skip cloudflared found on PATH
    pub ignore_system_cloudflared: bool,

    /// Only use the cloudflared in the cloudflared directory
    pub force_local: bool,
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            url_timeout_secs: Timeouts::default().tunnel_url.as_secs(),
            ignore_system_cloudflared: false,
            force_local: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallSection {
    pub swarmui_repo: String,
    pub cloudflared_base_url: String,

    /// Clone SwarmUI even if one can be found
    pub skip_swarmui_check: bool,

    /// Download cloudflared even if one can be found
    pub force_cloudflared_install: bool,

    /// Patch launchers so SwarmUI listens on all interfaces
    pub enable_lan: bool,

    /// Account that should own the checkout after permission repair
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive_user: Option<String>,
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            swarmui_repo: SWARMUI_REPO.to_string(),
            cloudflared_base_url: CLOUDFLARED_BASE_URL.to_string(),
            skip_swarmui_check: false,
            force_cloudflared_install: false,
            enable_lan: true,
            interactive_user: None,
        }
    }
}

impl SwarmTunnelConfig {
    /// Runtime settings rooted at `work_dir`, with directories made absolute.
    pub fn into_settings(self, work_dir: PathBuf) -> Settings {
        let timeouts = Timeouts {
            service_ready: Duration::from_secs(self.service.ready_timeout_secs),
            shutdown_grace: Duration::from_secs(self.service.shutdown_grace_secs),
            tunnel_url: Duration::from_secs(self.tunnel.url_timeout_secs),
            ..Timeouts::default()
        };

        Settings {
            swarmui_dir: self.paths.swarmui_dir,
            cloudflared_dir: self.paths.cloudflared_dir,
            log_dir: self.paths.log_dir,
            work_dir,
            port: self.service.port,
            swarmui_repo: self.install.swarmui_repo,
            cloudflared_base_url: self.install.cloudflared_base_url,
            platform: Platform::current(),
            skip_swarmui_check: self.install.skip_swarmui_check,
            force_cloudflared_install: self.install.force_cloudflared_install,
            force_local_swarmui: self.service.force_local,
            force_local_cloudflared: self.tunnel.force_local,
            ignore_system_cloudflared: self.tunnel.ignore_system_cloudflared,
            enable_lan: self.install.enable_lan,
            interactive_user: self.install.interactive_user,
            timeouts,
        }
        .absolutize()
    }
}
