//! Directory resolution for swarmtunnel.
//!
//! Install locations are driven by environment variables so that launchers,
//! CI jobs and tests can relocate them without touching config files. The
//! user config directory follows XDG, matching tools like gh and docker.

use std::path::{Path, PathBuf};

/// Overrides the SwarmUI checkout directory.
pub const SWARMUI_DIR_ENV: &str = "SWARMUI_DIR";
/// Overrides the directory holding the cloudflared binary.
pub const CLOUDFLARED_DIR_ENV: &str = "SWARMTUNNEL_CLOUDFLARED_DIR";
/// Overrides the directory for process and install logs.
pub const LOG_DIR_ENV: &str = "SWARMTUNNEL_LOG_DIR";

pub const DEFAULT_SWARMUI_DIR: &str = "SwarmUI";
pub const DEFAULT_CLOUDFLARED_DIR: &str = "cloudflared";
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Read a directory override, trimming whitespace left by external launchers.
///
/// Returns `None` when `var` is unset or blank.
pub fn env_dir(var: &str) -> Option<PathBuf> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(PathBuf::from(value.trim())),
        _ => None,
    }
}

fn dir_from_env(var: &str, default: &str) -> PathBuf {
    env_dir(var).unwrap_or_else(|| PathBuf::from(default))
}

/// Get the SwarmUI install directory.
///
/// Returns `$SWARMUI_DIR` if set, otherwise `SwarmUI` (relative to the
/// working directory).
///
/// # Examples
///
/// ```
/// use swarmtunnel_paths::swarmui_dir;
///
/// let marker = swarmui_dir().join(".installed");
/// ```
pub fn swarmui_dir() -> PathBuf {
    dir_from_env(SWARMUI_DIR_ENV, DEFAULT_SWARMUI_DIR)
}

/// Get the directory the cloudflared binary is installed into.
///
/// Returns `$SWARMTUNNEL_CLOUDFLARED_DIR` if set, otherwise `cloudflared`.
pub fn cloudflared_dir() -> PathBuf {
    dir_from_env(CLOUDFLARED_DIR_ENV, DEFAULT_CLOUDFLARED_DIR)
}

/// Get the log directory.
///
/// Returns `$SWARMTUNNEL_LOG_DIR` if set, otherwise `logs`.
pub fn log_dir() -> PathBuf {
    dir_from_env(LOG_DIR_ENV, DEFAULT_LOG_DIR)
}

/// Get the swarmtunnel config directory.
///
/// Returns `$XDG_CONFIG_HOME/swarmtunnel` if set, otherwise
/// `~/.config/swarmtunnel`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("swarmtunnel")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/swarmtunnel")
    } else {
        PathBuf::from(".config/swarmtunnel")
    }
}

/// Resolve `path` against `base` unless it is already absolute.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
