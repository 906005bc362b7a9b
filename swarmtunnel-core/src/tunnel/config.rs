//! Tunnel configuration and the ingress file written for each run

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::settings::Settings;

/// Name recorded in the ingress file.
pub const TUNNEL_NAME: &str = "swarmui-tunnel";

/// How to run cloudflared for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelConfig {
    pub binary: PathBuf,
    pub local_port: u16,
    pub log_path: PathBuf,
    /// Time the process gets to fail fast before it is considered started.
    pub startup_grace: Duration,
    /// How long to wait for the quick tunnel URL.
    pub url_timeout: Duration,
}

impl TunnelConfig {
    pub fn from_settings(settings: &Settings, binary: PathBuf) -> Self {
        Self {
            binary,
            local_port: settings.port,
            log_path: settings.cloudflared_log(),
            startup_grace: settings.timeouts.tunnel_grace,
            url_timeout: settings.timeouts.tunnel_url,
        }
    }

    pub fn service_url(&self) -> String {
        format!("http://localhost:{}", self.local_port)
    }
}

/// Ingress file content pointing every request at the local port.
pub fn ingress_config(local_port: u16) -> String {
    format!(
        "tunnel: {TUNNEL_NAME}\n\ningress:\n  - service: http://localhost:{local_port}\n"
    )
}

/// Write the ingress file, creating its directory.
pub fn write_ingress_file(path: &Path, local_port: u16) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, ingress_config(local_port))?;
    debug!(path = %path.display(), "Wrote tunnel config");
    Ok(())
}

/// Remove the ingress file; a missing file is not an error.
pub fn remove_ingress_file(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ingress_config_targets_port() {
        assert_eq!(
            ingress_config(7801),
            "tunnel: swarmui-tunnel\n\ningress:\n  - service: http://localhost:7801\n"
        );
    }

    #[test]
    fn write_then_remove_ingress_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs").join("tunnel_config.yml");

        write_ingress_file(&path, 9000).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("http://localhost:9000"));

        assert!(remove_ingress_file(&path).unwrap());
        assert!(!path.exists());
        assert!(!remove_ingress_file(&path).unwrap());
    }

    #[test]
    fn from_settings_uses_tunnel_timeouts() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::rooted_at(temp.path());
        let config = TunnelConfig::from_settings(&settings, PathBuf::from("cloudflared"));

        assert_eq!(config.local_port, settings.port);
        assert_eq!(config.url_timeout, Duration::from_secs(30));
        assert_eq!(config.startup_grace, Duration::from_secs(2));
        assert_eq!(config.log_path, settings.cloudflared_log());
        assert_eq!(config.service_url(), "http://localhost:7801");
    }
}
