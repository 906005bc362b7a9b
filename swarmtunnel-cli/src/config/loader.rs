use super::types::{
    InstallSection, PathsConfig, RawInstallConfig, RawPathsConfig, RawServiceConfig,
    RawSwarmTunnelConfig, RawTunnelConfig, ServiceConfig, SwarmTunnelConfig, TunnelSection,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use swarmtunnel_core::cleanup::permissions::INTERACTIVE_USER_ENV;
use swarmtunnel_paths::{CLOUDFLARED_DIR_ENV, LOG_DIR_ENV, SWARMUI_DIR_ENV};

pub const PROJECT_CONFIG_DIR_ENV: &str = "SWARMTUNNEL_PROJECT_CONFIG_DIR";
pub const SKIP_SWARMUI_CHECK_ENV: &str = "SWARMTUNNEL_SKIP_SWARMUI_CHECK";
pub const FORCE_CLOUDFLARED_INSTALL_ENV: &str = "SWARMTUNNEL_FORCE_CLOUDFLARED_INSTALL";
pub const FORCE_LOCAL_SWARMUI_ENV: &str = "SWARMTUNNEL_FORCE_LOCAL_SWARMUI";
pub const FORCE_LOCAL_CLOUDFLARED_ENV: &str = "SWARMTUNNEL_FORCE_LOCAL_CLOUDFLARED";
pub const IGNORE_SYSTEM_CLOUDFLARED_ENV: &str = "SWARMTUNNEL_IGNORE_SYSTEM_CLOUDFLARED";
pub const ENABLE_LAN_ENV: &str = "SWARMTUNNEL_ENABLE_LAN";

/// Variables [`ConfigLoader::load`] layers over the config files.
pub const OVERRIDE_ENV_VARS: [&str; 10] = [
    SWARMUI_DIR_ENV,
    CLOUDFLARED_DIR_ENV,
    LOG_DIR_ENV,
    SKIP_SWARMUI_CHECK_ENV,
    FORCE_CLOUDFLARED_INSTALL_ENV,
    FORCE_LOCAL_SWARMUI_ENV,
    FORCE_LOCAL_CLOUDFLARED_ENV,
    IGNORE_SYSTEM_CLOUDFLARED_ENV,
    ENABLE_LAN_ENV,
    INTERACTIVE_USER_ENV,
];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<SwarmTunnelConfig> {
        Self::load_from(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Load from explicit file locations; missing files are skipped.
    pub fn load_from(user_path: &Path, project_path: &Path) -> Result<SwarmTunnelConfig> {
        let mut raw = RawSwarmTunnelConfig::default();

        // Layer 1: User config
        if let Some(user_config) = Self::read_raw(user_path)? {
            raw = Self::merge_raw(raw, user_config);
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        // Layer 3: Environment
        raw = Self::merge_raw(raw, Self::from_env());

        Ok(Self::finalize(raw))
    }

    /// Get user config path (`<config_dir>/config.toml`)
    pub fn user_config_path() -> PathBuf {
        swarmtunnel_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with SWARMTUNNEL_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var(PROJECT_CONFIG_DIR_ENV) {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".swarmtunnel/config.toml")
        }
    }

    /// Override variables set in the current environment.
    pub fn env_overrides() -> Vec<&'static str> {
        OVERRIDE_ENV_VARS
            .into_iter()
            .filter(|name| std::env::var_os(name).is_some())
            .collect()
    }

    fn read_raw(path: &Path) -> Result<Option<RawSwarmTunnelConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Overrides taken from environment variables
    fn from_env() -> RawSwarmTunnelConfig {
        RawSwarmTunnelConfig {
            paths: RawPathsConfig {
                swarmui_dir: swarmtunnel_paths::env_dir(SWARMUI_DIR_ENV),
                cloudflared_dir: swarmtunnel_paths::env_dir(CLOUDFLARED_DIR_ENV),
                log_dir: swarmtunnel_paths::env_dir(LOG_DIR_ENV),
            },
            service: RawServiceConfig {
                force_local: env_flag(FORCE_LOCAL_SWARMUI_ENV),
                ..Default::default()
            },
            tunnel: RawTunnelConfig {
                ignore_system_cloudflared: env_flag(IGNORE_SYSTEM_CLOUDFLARED_ENV),
                force_local: env_flag(FORCE_LOCAL_CLOUDFLARED_ENV),
                ..Default::default()
            },
            install: RawInstallConfig {
                skip_swarmui_check: env_flag(SKIP_SWARMUI_CHECK_ENV),
                force_cloudflared_install: env_flag(FORCE_CLOUDFLARED_INSTALL_ENV),
                enable_lan: env_flag(ENABLE_LAN_ENV),
                interactive_user: std::env::var(INTERACTIVE_USER_ENV)
                    .ok()
                    .map(|user| user.trim().to_string())
                    .filter(|user| !user.is_empty()),
                ..Default::default()
            },
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(
        base: RawSwarmTunnelConfig,
        overlay: RawSwarmTunnelConfig,
    ) -> RawSwarmTunnelConfig {
        RawSwarmTunnelConfig {
            paths: RawPathsConfig {
                swarmui_dir: overlay.paths.swarmui_dir.or(base.paths.swarmui_dir),
                cloudflared_dir: overlay.paths.cloudflared_dir.or(base.paths.cloudflared_dir),
                log_dir: overlay.paths.log_dir.or(base.paths.log_dir),
            },
            service: RawServiceConfig {
                port: overlay.service.port.or(base.service.port),
                ready_timeout_secs: overlay
                    .service
                    .ready_timeout_secs
                    .or(base.service.ready_timeout_secs),
                shutdown_grace_secs: overlay
                    .service
                    .shutdown_grace_secs
                    .or(base.service.shutdown_grace_secs),
                force_local: overlay.service.force_local.or(base.service.force_local),
            },
            tunnel: RawTunnelConfig {
                url_timeout_secs: overlay.tunnel.url_timeout_secs.or(base.tunnel.url_timeout_secs),
                ignore_system_cloudflared: overlay
                    .tunnel
                    .ignore_system_cloudflared
                    .or(base.tunnel.ignore_system_cloudflared),
                force_local: overlay.tunnel.force_local.or(base.tunnel.force_local),
            },
            install: RawInstallConfig {
                swarmui_repo: overlay.install.swarmui_repo.or(base.install.swarmui_repo),
                cloudflared_base_url: overlay
                    .install
                    .cloudflared_base_url
                    .or(base.install.cloudflared_base_url),
                skip_swarmui_check: overlay
                    .install
                    .skip_swarmui_check
                    .or(base.install.skip_swarmui_check),
                force_cloudflared_install: overlay
                    .install
                    .force_cloudflared_install
                    .or(base.install.force_cloudflared_install),
                enable_lan: overlay.install.enable_lan.or(base.install.enable_lan),
                interactive_user: overlay
                    .install
                    .interactive_user
                    .or(base.install.interactive_user),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawSwarmTunnelConfig) -> SwarmTunnelConfig {
        let paths = PathsConfig::default();
        let service = ServiceConfig::default();
        let tunnel = TunnelSection::default();
        let install = InstallSection::default();

        SwarmTunnelConfig {
            paths: PathsConfig {
                swarmui_dir: raw.paths.swarmui_dir.unwrap_or(paths.swarmui_dir),
                cloudflared_dir: raw.paths.cloudflared_dir.unwrap_or(paths.cloudflared_dir),
                log_dir: raw.paths.log_dir.unwrap_or(paths.log_dir),
            },
            service: ServiceConfig {
                port: raw.service.port.unwrap_or(service.port),
                ready_timeout_secs: raw
                    .service
                    .ready_timeout_secs
                    .unwrap_or(service.ready_timeout_secs),
                shutdown_grace_secs: raw
                    .service
                    .shutdown_grace_secs
                    .unwrap_or(service.shutdown_grace_secs),
                force_local: raw.service.force_local.unwrap_or(service.force_local),
            },
            tunnel: TunnelSection {
                url_timeout_secs: raw.tunnel.url_timeout_secs.unwrap_or(tunnel.url_timeout_secs),
                ignore_system_cloudflared: raw
                    .tunnel
                    .ignore_system_cloudflared
                    .unwrap_or(tunnel.ignore_system_cloudflared),
                force_local: raw.tunnel.force_local.unwrap_or(tunnel.force_local),
            },
            install: InstallSection {
                swarmui_repo: raw.install.swarmui_repo.unwrap_or(install.swarmui_repo),
                cloudflared_base_url: raw
                    .install
                    .cloudflared_base_url
                    .unwrap_or(install.cloudflared_base_url),
                skip_swarmui_check: raw
                    .install
                    .skip_swarmui_check
                    .unwrap_or(install.skip_swarmui_check),
                force_cloudflared_install: raw
                    .install
                    .force_cloudflared_install
                    .unwrap_or(install.force_cloudflared_install),
                enable_lan: raw.install.enable_lan.unwrap_or(install.enable_lan),
                interactive_user: raw.install.interactive_user,
            },
        }
    }
}

/// Boolean environment switch: `None` when unset, `false` only for `0`.
fn env_flag(var: &str) -> Option<bool> {
    std::env::var(var).ok().map(|value| parse_flag(&value))
}

fn parse_flag(value: &str) -> bool {
    value.trim() != "0"
}
