//! cloudflared binary location, invocation and output parsing

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::manager::TunnelError;
use super::state::LogLevel;
use crate::platform::{Os, cloudflared_binary_name};
use crate::settings::Settings;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

static QUICK_TUNNEL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://[a-zA-Z0-9-]+\.trycloudflare\.com").expect("quick tunnel pattern is valid")
});

/// Where a usable cloudflared binary was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudflaredLocation {
    /// On the system or user `PATH`.
    SystemPath(PathBuf),
    /// Loose in the working directory.
    WorkingDir(PathBuf),
    /// In the project's cloudflared directory.
    Local(PathBuf),
}

impl CloudflaredLocation {
    pub fn path(&self) -> &Path {
        match self {
            Self::SystemPath(p) | Self::WorkingDir(p) | Self::Local(p) => p,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::SystemPath(_) => "system PATH",
            Self::WorkingDir(_) => "current directory",
            Self::Local(_) => "local directory",
        }
    }
}

/// Finds cloudflared the same way for the installer and the launcher.
#[derive(Debug, Clone)]
pub struct CloudflaredLocator {
    cloudflared_dir: PathBuf,
    work_dir: PathBuf,
    os: Os,
    ignore_system: bool,
}

impl CloudflaredLocator {
    pub fn new(cloudflared_dir: PathBuf, work_dir: PathBuf, os: Os, ignore_system: bool) -> Self {
        Self {
            cloudflared_dir,
            work_dir,
            os,
            ignore_system,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.cloudflared_dir.clone(),
            settings.work_dir.clone(),
            settings.platform.os,
            settings.ignore_system_cloudflared,
        )
    }

    pub fn binary_name(&self) -> &'static str {
        cloudflared_binary_name(self.os)
    }

    /// Path the installer puts cloudflared at.
    pub fn local_path(&self) -> PathBuf {
        self.cloudflared_dir.join(self.binary_name())
    }

    /// Search `PATH` (unless ignored), then the working directory, then the
    /// cloudflared directory.
    pub fn locate(&self) -> Option<CloudflaredLocation> {
        if !self.ignore_system
            && let Ok(path) = which::which(self.binary_name())
        {
            return Some(CloudflaredLocation::SystemPath(path));
        }

        // With the default layout this path is the cloudflared directory
        // itself, which is_executable rejects.
        let in_work_dir = self.work_dir.join(self.binary_name());
        if is_executable(&in_work_dir, self.os) {
            return Some(CloudflaredLocation::WorkingDir(in_work_dir));
        }

        self.locate_local().map(CloudflaredLocation::Local)
    }

    /// Only consult the project's cloudflared directory.
    pub fn locate_local(&self) -> Option<PathBuf> {
        let path = self.local_path();
        is_executable(&path, self.os).then_some(path)
    }

    pub fn is_installed(&self) -> bool {
        self.locate().is_some()
    }

    /// Best candidate to execute; the bare binary name when nothing was
    /// found, leaving resolution to the OS.
    pub fn resolve(&self, local_only: bool) -> PathBuf {
        let found = if local_only {
            self.locate_local()
        } else {
            self.locate().map(|l| l.path().to_path_buf())
        };
        found.unwrap_or_else(|| PathBuf::from(self.binary_name()))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path, _os: Os) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path, _os: Os) -> bool {
    path.is_file()
}

/// Run `<binary> --version` and return the version token.
pub async fn probe_version(binary: &Path) -> Option<String> {
    let mut cmd = Command::new(binary);
    cmd.arg("--version").kill_on_drop(true);
    let output = tokio::time::timeout(VERSION_TIMEOUT, cmd.output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_version(&String::from_utf8_lossy(&output.stdout))
}

/// Parse version from cloudflared --version output.
/// Example: "cloudflared version 2024.1.0 (built 2024-01-15-1234)"
pub fn parse_version(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(2)
        .map(String::from)
}

/// Command for a quick tunnel to the local port.
pub fn tunnel_command(binary: &Path, local_port: u16) -> Command {
    let mut cmd = Command::new(binary);
    cmd.arg("tunnel")
        .arg("--url")
        .arg(format!("http://localhost:{}", local_port));
    cmd
}

/// Parse a quick tunnel URL from cloudflared output
///
/// cloudflared prints the URL in a box like:
/// `INF |  https://random-words.trycloudflare.com  |`
pub fn parse_quick_tunnel_url(line: &str) -> Option<String> {
    QUICK_TUNNEL_URL.find(line).map(|m| m.as_str().to_string())
}

/// Parse log level from cloudflared output
///
/// Lines look like `2024-01-01T00:00:00Z INF message`, older builds omit the
/// timestamp.
pub fn parse_log_level(line: &str) -> Option<(LogLevel, &str)> {
    let mut offset = 0;
    for token in line.split_whitespace().take(2) {
        let start = offset + line[offset..].find(token)?;
        offset = start + token.len();
        let level = match token {
            "INF" => LogLevel::Info,
            "WRN" => LogLevel::Warn,
            "ERR" => LogLevel::Error,
            "DBG" => LogLevel::Debug,
            _ => continue,
        };
        return Some((level, line[offset..].trim()));
    }
    None
}

/// Check if line indicates successful connection
pub fn is_connection_registered(line: &str) -> bool {
    (line.contains("Connection") && line.contains("registered"))
        || line.contains("Registered tunnel connection")
}

/// Check if line indicates connection lost
pub fn is_connection_lost(line: &str) -> bool {
    line.contains("Unregistered") || line.contains("connection lost")
}

/// Read lines until one carries a quick tunnel URL.
///
/// Fails with [`TunnelError::Terminated`] when the stream ends first and
/// [`TunnelError::UrlTimeout`] when `timeout` elapses.
pub async fn scan_for_url(
    lines: &mut mpsc::Receiver<String>,
    timeout: Duration,
) -> Result<String, TunnelError> {
    let scan = async {
        while let Some(line) = lines.recv().await {
            debug!(line = %line, "cloudflared");
            if let Some(url) = parse_quick_tunnel_url(&line) {
                return Ok(url);
            }
        }
        Err(TunnelError::Terminated)
    };

    tokio::time::timeout(timeout, scan)
        .await
        .map_err(|_| TunnelError::UrlTimeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_quick_tunnel_url_from_box() {
        let line = "2024-05-01T10:00:00Z INF |  https://random-words-here.trycloudflare.com            |";
        assert_eq!(
            parse_quick_tunnel_url(line),
            Some("https://random-words-here.trycloudflare.com".to_string())
        );
    }

    #[test]
    fn parse_quick_tunnel_url_plain() {
        let line = "Your quick Tunnel is https://test-tunnel.trycloudflare.com";
        assert_eq!(
            parse_quick_tunnel_url(line),
            Some("https://test-tunnel.trycloudflare.com".to_string())
        );
    }

    #[test]
    fn parse_quick_tunnel_url_ignores_other_hosts() {
        assert!(parse_quick_tunnel_url("Starting tunnel connector").is_none());
        assert!(parse_quick_tunnel_url("see https://www.cloudflare.com/terms").is_none());
        assert!(parse_quick_tunnel_url("https://api.trycloudflare.com/tunnel failed").is_some());
    }

    #[test]
    fn parse_log_level_with_timestamp() {
        let (level, msg) = parse_log_level("2024-05-01T10:00:00Z ERR Connection failed").unwrap();
        assert_eq!(level, LogLevel::Error);
        assert_eq!(msg, "Connection failed");
    }

    #[test]
    fn parse_log_level_without_timestamp() {
        let (level, msg) = parse_log_level("INF Starting tunnel").unwrap();
        assert_eq!(level, LogLevel::Info);
        assert_eq!(msg, "Starting tunnel");
    }

    #[test]
    fn parse_log_level_unknown() {
        assert!(parse_log_level("Some random text").is_none());
        assert!(parse_log_level("").is_none());
    }

    #[test]
    fn connection_markers() {
        assert!(is_connection_registered("INF Connection 0 registered connIndex=0"));
        assert!(is_connection_registered("INF Registered tunnel connection connIndex=0"));
        assert!(!is_connection_registered("INF Starting tunnel"));
        assert!(is_connection_lost("ERR Unregistered tunnel connection"));
    }

    #[test]
    fn parse_version_extracts_version_number() {
        let output = "cloudflared version 2024.1.0 (built 2024-01-15-1234 lzNLoIi6)\n";
        assert_eq!(parse_version(output), Some("2024.1.0".to_string()));
        assert_eq!(parse_version(""), None);
    }

    #[tokio::test]
    async fn scan_for_url_skips_noise() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send("INF Requesting new quick Tunnel on trycloudflare.com...".to_string())
            .await
            .unwrap();
        tx.send("INF |  https://a-b-c.trycloudflare.com  |".to_string())
            .await
            .unwrap();

        let url = scan_for_url(&mut rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(url, "https://a-b-c.trycloudflare.com");
    }

    #[tokio::test]
    async fn scan_for_url_reports_closed_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        tx.send("ERR failed to request quick Tunnel".to_string()).await.unwrap();
        drop(tx);

        let result = scan_for_url(&mut rx, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TunnelError::Terminated)));
    }

    #[tokio::test]
    async fn scan_for_url_times_out() {
        let (_tx, mut rx) = mpsc::channel::<String>(16);
        let result = scan_for_url(&mut rx, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TunnelError::UrlTimeout(_))));
    }

    #[test]
    fn tunnel_command_targets_local_port() {
        let cmd = tunnel_command(Path::new("/opt/cloudflared"), 7801);
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/opt/cloudflared");
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().to_string()).collect();
        assert_eq!(args, ["tunnel", "--url", "http://localhost:7801"]);
    }

    #[cfg(unix)]
    #[test]
    fn locator_prefers_work_dir_then_local_dir() {
        use crate::testing::write_script;

        let temp = TempDir::new().unwrap();
        let work = temp.path().to_path_buf();
        let local_dir = work.join("tools");
        let locator = CloudflaredLocator::new(local_dir.clone(), work.clone(), Os::Linux, true);

        assert!(locator.locate().is_none());
        assert!(!locator.is_installed());

        write_script(&local_dir, "cloudflared", "exit 0");
        assert_eq!(
            locator.locate(),
            Some(CloudflaredLocation::Local(local_dir.join("cloudflared")))
        );

        write_script(&work, "cloudflared", "exit 0");
        assert_eq!(
            locator.locate(),
            Some(CloudflaredLocation::WorkingDir(work.join("cloudflared")))
        );
    }

    #[cfg(unix)]
    #[test]
    fn locator_skips_default_dir_named_like_binary() {
        use crate::testing::write_script;

        let temp = TempDir::new().unwrap();
        let work = temp.path().to_path_buf();
        let local_dir = work.join("cloudflared");
        let binary = write_script(&local_dir, "cloudflared", "exit 0");

        let locator = CloudflaredLocator::new(local_dir, work, Os::Linux, true);
        assert_eq!(locator.locate(), Some(CloudflaredLocation::Local(binary)));
    }

    #[cfg(unix)]
    #[test]
    fn locator_rejects_non_executable_files() {
        let temp = TempDir::new().unwrap();
        let local_dir = temp.path().join("cloudflared");
        std::fs::create_dir_all(&local_dir).unwrap();
        std::fs::write(local_dir.join("cloudflared"), "not a binary").unwrap();

        let locator =
            CloudflaredLocator::new(local_dir, temp.path().to_path_buf(), Os::Linux, true);
        assert!(locator.locate_local().is_none());
        assert!(locator.locate().is_none());
        assert_eq!(locator.resolve(true), PathBuf::from("cloudflared"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_version_runs_binary() {
        use crate::testing::write_script;

        let temp = TempDir::new().unwrap();
        let binary = write_script(
            temp.path(),
            "cloudflared",
            "echo 'cloudflared version 2025.2.1 (built 2025-02-01)'",
        );
        assert_eq!(probe_version(&binary).await, Some("2025.2.1".to_string()));
    }
}
